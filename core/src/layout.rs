// Layout: routed pages and their per-session materialization
//
// `Pages` is the application's declaration (route -> component classes) and is
// shared by every session. A `Layout` is one session's live page: fresh
// component instances plus the subscriptions that bind them to the registry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::component::{BoundCallback, Component, ComponentClass};
use crate::message::{ClearLayout, Payload, UpdateLayout};
use crate::session::Session;
use crate::signal::{SignalRegistry, SubscriptionId};
use crate::{Result, SundashError};

pub type Route = String;

/// One entry of a raw page.
#[derive(Clone)]
pub enum PageItem {
    Component(Arc<ComponentClass>),
    Html(String),
}

impl From<ComponentClass> for PageItem {
    fn from(class: ComponentClass) -> Self {
        Self::Component(Arc::new(class))
    }
}

impl From<Arc<ComponentClass>> for PageItem {
    fn from(class: Arc<ComponentClass>) -> Self {
        Self::Component(class)
    }
}

impl From<&str> for PageItem {
    fn from(html: &str) -> Self {
        Self::Html(html.to_string())
    }
}

impl From<String> for PageItem {
    fn from(html: String) -> Self {
        Self::Html(html)
    }
}

/// Route -> ordered component classes
#[derive(Debug, Default)]
pub struct Pages {
    routes: Vec<(Route, Vec<Arc<ComponentClass>>)>,
    default_route: Option<Route>,
}

impl Pages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a page. The first page added becomes the default.
    pub fn add_page<I, T>(&mut self, route: impl Into<Route>, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<PageItem>,
    {
        let route = route.into();
        let mut classes = Vec::new();
        for item in items {
            let class = match item.into() {
                PageItem::Component(class) => class,
                PageItem::Html(html) => Arc::new(ComponentClass::literal(html)),
            };
            class.check()?;
            classes.push(class);
        }

        match self.routes.iter_mut().find(|(r, _)| *r == route) {
            Some(slot) => slot.1 = classes,
            None => self.routes.push((route.clone(), classes)),
        }
        if self.default_route.is_none() {
            self.default_route = Some(route);
        }
        Ok(())
    }

    pub fn set_default(&mut self, route: &str) -> Result<()> {
        if !self.contains(route) {
            return Err(SundashError::UnknownRoute(route.to_string()));
        }
        self.default_route = Some(route.to_string());
        Ok(())
    }

    pub fn default_route(&self) -> Option<&str> {
        self.default_route.as_deref()
    }

    pub fn contains(&self, route: &str) -> bool {
        self.page(route).is_some()
    }

    pub fn page(&self, route: &str) -> Option<&[Arc<ComponentClass>]> {
        self.routes
            .iter()
            .find(|(r, _)| r == route)
            .map(|(_, classes)| classes.as_slice())
    }

    pub fn routes(&self) -> Vec<&str> {
        self.routes.iter().map(|(r, _)| r.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Default)]
struct LayoutState {
    route: Option<Route>,
    components: Vec<Arc<Component>>,
    // (event kind, id) of every activated component callback
    subscriptions: Vec<(String, SubscriptionId)>,
    torn_down: bool,
}

/// One session's live page
pub struct Layout {
    session: Arc<Session>,
    pages: Arc<Pages>,
    registry: Arc<SignalRegistry>,
    // Held across a whole materialization so page changes never interleave.
    switching: tokio::sync::Mutex<()>,
    // Never held across an await; teardown must work from synchronous code.
    state: Mutex<LayoutState>,
}

impl Layout {
    pub fn new(session: Arc<Session>, pages: Arc<Pages>, registry: Arc<SignalRegistry>) -> Arc<Self> {
        Arc::new(Self {
            session,
            pages,
            registry,
            switching: tokio::sync::Mutex::new(()),
            state: Mutex::new(LayoutState::default()),
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn current_route(&self) -> Option<Route> {
        self.state().route.clone()
    }

    pub fn components(&self) -> Vec<Arc<Component>> {
        self.state().components.clone()
    }

    /// Number of component callbacks currently subscribed for this session.
    pub fn subscription_count(&self) -> usize {
        self.state().subscriptions.len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.state().torn_down
    }

    /// Instantiate the current (or default) route and activate its callbacks.
    ///
    /// Returns the command carrying the full page; nothing is sent.
    pub async fn materialize(self: &Arc<Self>) -> Result<UpdateLayout> {
        let _switching = self.switching.lock().await;
        let route = match self.current_route() {
            Some(route) => route,
            None => self
                .pages
                .default_route()
                .map(str::to_string)
                .ok_or_else(|| SundashError::UnknownRoute(String::new()))?,
        };
        self.materialize_route(&route).await
    }

    /// Materialize and send the initial `UpdateLayout`.
    pub async fn open(self: &Arc<Self>) -> Result<()> {
        let update = self.materialize().await?;
        self.session.send_command(&update).await
    }

    /// Replace the current page with `route` and send the new `UpdateLayout`.
    ///
    /// An unknown route leaves the current page untouched.
    pub async fn switch_page(self: &Arc<Self>, route: &str) -> Result<()> {
        let update = {
            let _switching = self.switching.lock().await;
            self.materialize_route(route).await?
        };
        info!(target: "sundash", session = %self.session.id(), route = %route, "Page switched");
        self.session.send_command(&update).await
    }

    /// Drop the current page and tell the client to empty its view.
    ///
    /// The client acknowledges with `LayoutClean`. A later `materialize`
    /// starts again from the default route.
    pub async fn clear(&self) -> Result<()> {
        {
            let _switching = self.switching.lock().await;
            let mut state = self.state();
            if state.torn_down {
                return Err(SundashError::SessionClosed(self.session.id()));
            }
            let released = self.release(&mut state);
            state.route = None;
            debug!(target: "sundash", session = %self.session.id(), released, "Layout cleared");
        }
        self.session.send_command(&ClearLayout {}).await
    }

    /// Unsubscribe every component callback and drop the components. Idempotent.
    ///
    /// Synchronous so it can run while a session future is being dropped.
    pub fn teardown(&self) {
        let mut state = self.state();
        if state.torn_down {
            return;
        }
        let released = self.release(&mut state);
        state.torn_down = true;
        debug!(target: "sundash", session = %self.session.id(), released, "Layout torn down");
    }

    async fn materialize_route(self: &Arc<Self>, route: &str) -> Result<UpdateLayout> {
        if self.is_torn_down() {
            return Err(SundashError::SessionClosed(self.session.id()));
        }
        let classes = self
            .pages
            .page(route)
            .ok_or_else(|| SundashError::UnknownRoute(route.to_string()))?;

        let components: Vec<Arc<Component>> = classes
            .iter()
            .map(|class| Component::instantiate(Arc::clone(class), Arc::clone(&self.session)))
            .collect();

        // Flattened into one namespace: on a name collision the last component wins.
        let mut html = String::new();
        let mut vars = Payload::new();
        for component in &components {
            html.push_str(&component.render().await);
            vars.extend(component.vars().await);
        }

        let mut state = self.state();
        if state.torn_down {
            // Torn down while rendering: the new instances never go live.
            for component in &components {
                component.deactivate();
            }
            return Err(SundashError::SessionClosed(self.session.id()));
        }
        self.release(&mut state);
        for component in &components {
            for binding in component.class().callbacks() {
                let callback = Arc::new(BoundCallback::new(binding, component, self));
                let id = self.registry.subscribe(binding.kind(), callback);
                state.subscriptions.push((binding.kind().to_string(), id));
            }
        }

        debug!(
            target: "sundash",
            session = %self.session.id(),
            route = %route,
            components = components.len(),
            subscriptions = state.subscriptions.len(),
            "Layout materialized"
        );
        state.route = Some(route.to_string());
        state.components = components;
        Ok(UpdateLayout { html, vars })
    }

    fn state(&self) -> MutexGuard<'_, LayoutState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, state: &mut LayoutState) -> usize {
        let released = state.subscriptions.len();
        for (kind, id) in state.subscriptions.drain(..) {
            self.registry.unsubscribe(&kind, id);
        }
        for component in state.components.drain(..) {
            component.deactivate();
        }
        released
    }
}
