// App host
//
// The long-lived dispatcher object: protocol, signal registry, pages, session
// hooks and the session id counter, constructed once and shared by every
// connection the transport host accepts.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::layout::{Layout, PageItem, Pages, Route};
use crate::message::{
    ClientConnected, ClientDisconnected, CommandKind, Event, EventKind, Message, Payload, Protocol,
};
use crate::scheduler::Scheduler;
use crate::session::{Session, SessionId};
use crate::signal::{callback_fn, Callback, SignalRegistry};
use crate::transport::Connection;
use crate::{Result, SundashError};

/// Extension point invoked in lockstep with session open and close.
#[async_trait]
pub trait SessionHook: Send + Sync {
    /// Runs before the layout is materialized. An error ends the session.
    async fn on_session_open(&self, session: &Arc<Session>) -> Result<()>;

    /// Runs during teardown, before the layout is released. A cancelled
    /// session runs it afterwards, on a task of its own.
    async fn on_session_close(&self, session: &Arc<Session>);
}

pub struct App {
    protocol: Arc<Protocol>,
    registry: Arc<SignalRegistry>,
    pages: Arc<Pages>,
    hooks: Vec<Arc<dyn SessionHook>>,
    scheduler: Option<Arc<Scheduler>>,
    sessions: DashMap<SessionId, Arc<Session>>,
    next_session: AtomicU64,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub fn registry(&self) -> &Arc<SignalRegistry> {
        &self.registry
    }

    pub fn pages(&self) -> &Arc<Pages> {
        &self.pages
    }

    pub fn scheduler(&self) -> Option<&Arc<Scheduler>> {
        self.scheduler.as_ref()
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|s| Arc::clone(s.value()))
    }

    /// Spawn background work (the scheduler, when configured).
    pub fn start(&self) -> Option<JoinHandle<()>> {
        self.scheduler.as_ref().map(|scheduler| scheduler.spawn())
    }

    /// Serve one accepted connection until it closes.
    ///
    /// Returns `Ok(())` when the client went away, the error that ended the
    /// session otherwise. Either way teardown has completed on return.
    pub async fn serve_connection(self: &Arc<Self>, conn: Connection) -> Result<()> {
        let id = SessionId::new(self.next_session.fetch_add(1, Ordering::SeqCst) + 1);
        let session = Session::new(id, conn, Arc::clone(&self.protocol));
        info!(target: "sundash", session = %id, peer = %session.peer(), "Session opened");

        let app = Arc::clone(self);
        let scoped = Arc::clone(&session);
        session.scope(app.run_session(scoped)).await
    }

    async fn run_session(self: Arc<Self>, session: Arc<Session>) -> Result<()> {
        let id = session.id();
        self.sessions.insert(id, Arc::clone(&session));
        let layout = Layout::new(
            Arc::clone(&session),
            Arc::clone(&self.pages),
            Arc::clone(&self.registry),
        );
        let mut guard = SessionGuard {
            app: Arc::clone(&self),
            session: Arc::clone(&session),
            layout: Arc::clone(&layout),
            closing: false,
        };

        let outcome = match self.drive(&session, &layout).await {
            Err(SundashError::SessionClosed(_)) => Ok(()),
            other => other,
        };

        guard.closing = true;
        self.close_hooks(&session).await;
        drop(guard);
        session.close().await;

        match &outcome {
            Ok(()) => info!(target: "sundash", session = %id, "Session closed"),
            Err(e) => error!(target: "sundash", session = %id, error = %e, "Session terminated"),
        }
        outcome
    }

    async fn drive(&self, session: &Arc<Session>, layout: &Arc<Layout>) -> Result<()> {
        for hook in &self.hooks {
            hook.on_session_open(session).await?;
        }
        layout.open().await?;
        self.registry
            .dispatch(&lifecycle(ClientConnected::KIND, session.id()))
            .await?;

        // One event at a time: everything for this session is dispatched here.
        loop {
            let event = session.listen_event().await?;
            self.registry.dispatch(&event).await?;
        }
    }

    /// Session hooks, then `ClientDisconnected` callbacks.
    async fn close_hooks(&self, session: &Arc<Session>) {
        for hook in &self.hooks {
            hook.on_session_close(session).await;
        }
        let id = session.id();
        if let Err(e) = self.registry.dispatch(&lifecycle(ClientDisconnected::KIND, id)).await {
            warn!(target: "sundash", session = %id, error = %e, "Disconnect callbacks failed");
        }
    }
}

/// Releases what a session holds in shared state, even when its future is
/// dropped before reaching the end of `run_session`.
struct SessionGuard {
    app: Arc<App>,
    session: Arc<Session>,
    layout: Arc<Layout>,
    // Set once the close hooks have started.
    closing: bool,
}

impl SessionGuard {
    fn release(&self) {
        let id = self.session.id();
        if let Some(scheduler) = &self.app.scheduler {
            scheduler.deregister(id);
        }
        self.layout.teardown();
        self.session.mark_closed();
        self.app.sessions.remove(&id);
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
        if self.closing {
            return;
        }
        warn!(target: "sundash", session = %self.session.id(), "Session cancelled");

        // The session task is gone: finish the async steps on a new one.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let app = Arc::clone(&self.app);
        let scoped = Arc::clone(&self.session);
        runtime.spawn(Arc::clone(&self.session).scope(async move {
            app.close_hooks(&scoped).await;
            scoped.close().await;
        }));
    }
}

fn lifecycle(kind: &str, session: SessionId) -> Event {
    Event::new(kind, Payload::new()).with_session(session)
}

/// Startup-time declaration of an `App`.
#[derive(Default)]
pub struct AppBuilder {
    protocol: Protocol,
    pages: Pages,
    registry: SignalRegistry,
    hooks: Vec<Arc<dyn SessionHook>>,
    tick_period: Option<Duration>,
    error: Option<SundashError>,
}

impl AppBuilder {
    pub fn page<I, T>(mut self, route: impl Into<Route>, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<PageItem>,
    {
        let result = self.pages.add_page(route, items);
        self.keep_error(result)
    }

    pub fn default_route(mut self, route: &str) -> Self {
        let result = self.pages.set_default(route);
        self.keep_error(result)
    }

    /// Process-wide callback for events of kind `E`, on every session.
    ///
    /// The session the event came from is available through `Session::current()`.
    pub fn on<E, F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        E: EventKind,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let callback = callback_fn(name, move |event: Event| {
            let fut = event.decode::<E>().map(&f);
            async move { fut?.await }
        });
        self.subscribe(E::KIND, callback)
    }

    pub fn subscribe(self, kind: impl Into<String>, callback: Arc<dyn Callback>) -> Self {
        self.registry.subscribe(kind, callback);
        self
    }

    pub fn register_event<E: EventKind>(mut self) -> Self {
        let result = self.protocol.register_event::<E>();
        self.keep_error(result)
    }

    pub fn register_command<C: CommandKind>(mut self) -> Self {
        let result = self.protocol.register_command::<C>();
        self.keep_error(result)
    }

    pub fn hook(mut self, hook: Arc<dyn SessionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Inject `EverySecond` into every open session each `period`.
    pub fn scheduler(mut self, period: Duration) -> Self {
        self.tick_period = Some(period);
        self
    }

    pub fn build(self) -> Result<App> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.pages.is_empty() {
            return Err(SundashError::InvalidDeclaration(
                "an app needs at least one page".into(),
            ));
        }
        if self.tick_period.is_some_and(|period| period.is_zero()) {
            return Err(SundashError::InvalidDeclaration(
                "scheduler period must be positive".into(),
            ));
        }

        let mut hooks = self.hooks;
        let scheduler = self.tick_period.map(|period| Arc::new(Scheduler::new(period)));
        if let Some(scheduler) = &scheduler {
            hooks.push(Arc::clone(scheduler) as Arc<dyn SessionHook>);
        }

        Ok(App {
            protocol: Arc::new(self.protocol),
            registry: Arc::new(self.registry),
            pages: Arc::new(self.pages),
            hooks,
            scheduler,
            sessions: DashMap::new(),
            next_session: AtomicU64::new(0),
        })
    }

    fn keep_error(mut self, result: Result<()>) -> Self {
        if let Err(e) = result {
            if self.error.is_none() {
                self.error = Some(e);
            }
        }
        self
    }
}
