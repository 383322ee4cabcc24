// Signal registry: event kind -> ordered callbacks
//
// One registry lives for the whole process (owned by `App`). Free callbacks are
// subscribed once at startup; component callbacks are subscribed per session
// by the layout and removed again at teardown.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error};

use crate::message::Event;
use crate::{Result, SundashError};

/// Anything that can handle a dispatched event.
#[async_trait]
pub trait Callback: Send + Sync {
    async fn handle(&self, event: Event) -> Result<()>;

    /// Whether `event` is meant for this callback at all.
    ///
    /// Subscribers that decline are skipped and not counted as invoked.
    fn accepts(&self, _event: &Event) -> bool {
        true
    }

    /// Name used in logs.
    fn name(&self) -> &str {
        "callback"
    }
}

type BoxedHandler = Box<dyn Fn(Event) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Callback backed by a closure.
pub struct FnCallback {
    name: String,
    f: BoxedHandler,
}

#[async_trait]
impl Callback for FnCallback {
    async fn handle(&self, event: Event) -> Result<()> {
        (self.f)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap an async closure as a callback.
pub fn callback_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Callback>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnCallback {
        name: name.into(),
        f: Box::new(move |event| f(event).boxed()),
    })
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    callback: Arc<dyn Callback>,
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that accepted the event and ran.
    pub invoked: usize,
    pub failed: usize,
}

/// Process-wide subscription table
#[derive(Default)]
pub struct SignalRegistry {
    // Event kind -> subscribers in subscription order
    subscriptions: DashMap<String, Vec<Subscription>>,
    next_id: AtomicU64,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: impl Into<String>, callback: Arc<dyn Callback>) -> SubscriptionId {
        let kind = kind.into();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        debug!(target: "sundash", subscription = %id, kind = %kind, callback = callback.name(), "Subscribed");
        self.subscriptions
            .entry(kind)
            .or_default()
            .push(Subscription { id, callback });
        id
    }

    /// Remove a subscription. Unknown ids are ignored; returns whether one was removed.
    pub fn unsubscribe(&self, kind: &str, id: SubscriptionId) -> bool {
        let mut removed = false;
        if let Some(mut subs) = self.subscriptions.get_mut(kind) {
            let before = subs.len();
            subs.retain(|sub| sub.id != id);
            removed = subs.len() != before;
        }
        self.subscriptions.remove_if(kind, |_, subs| subs.is_empty());
        removed
    }

    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.subscriptions.get(kind).map(|s| s.len()).unwrap_or(0)
    }

    /// Total number of live subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback subscribed to the event's kind, one at a time.
    ///
    /// A failing callback is logged and the rest still run. Once all of them
    /// ran, the first programmer error (if any) is returned so the caller can
    /// end the session; every other failure only shows up in the report.
    pub async fn dispatch(&self, event: &Event) -> Result<DispatchReport> {
        // Snapshot so callbacks may (un)subscribe while we iterate.
        let subscribers: Vec<Subscription> = match self.subscriptions.get(event.kind()) {
            Some(subs) => subs.value().clone(),
            None => return Ok(DispatchReport::default()),
        };

        let mut report = DispatchReport::default();
        let mut fatal: Option<SundashError> = None;
        for sub in subscribers {
            if !sub.callback.accepts(event) {
                continue;
            }
            report.invoked += 1;
            if let Err(e) = sub.callback.handle(event.clone()).await {
                report.failed += 1;
                error!(
                    target: "sundash",
                    kind = %event.kind(),
                    session = ?event.session().map(|s| s.get()),
                    callback = sub.callback.name(),
                    error = %e,
                    "Callback failed"
                );
                if fatal.is_none() && e.is_programmer_error() {
                    fatal = Some(e);
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
