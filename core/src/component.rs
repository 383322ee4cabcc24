// Components
//
// A `ComponentClass` is the declaration: template, variables and the callbacks
// its instances want. It is built once at startup and shared. A `Component` is
// one live instance of a class, owned by exactly one session's layout.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::html;
use crate::layout::Layout;
use crate::message::{Event, EventKind, Payload, SetVar};
use crate::session::{Session, SessionId};
use crate::signal::Callback;
use crate::{Result, SundashError};

type Handler =
    Arc<dyn Fn(ComponentContext, Event) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Initial value of a declared variable.
#[derive(Clone)]
pub enum VarDefault {
    Value(Value),
    /// Evaluated each time a component is instantiated.
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl VarDefault {
    fn produce(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Factory(f) => f(),
        }
    }
}

impl fmt::Debug for VarDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "Value({})", v),
            Self::Factory(_) => write!(f, "Factory(..)"),
        }
    }
}

/// A declared `(event kind, method)` pair, bound to instances at activation.
#[derive(Clone)]
pub struct CallbackBinding {
    kind: String,
    method: String,
    handler: Handler,
}

impl CallbackBinding {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

/// Component declaration
pub struct ComponentClass {
    name: String,
    html: String,
    vars: Vec<(String, VarDefault)>,
    callbacks: Vec<CallbackBinding>,
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("name", &self.name)
            .field("vars", &self.vars)
            .field(
                "callbacks",
                &self
                    .callbacks
                    .iter()
                    .map(|c| (c.kind.as_str(), c.method.as_str()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ComponentClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            html: String::new(),
            vars: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    /// Plain HTML page item: no variables, no callbacks.
    pub fn literal(html: impl Into<String>) -> Self {
        Self::new("HtmlLiteral").html(html)
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn var(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.declare(name.into(), VarDefault::Value(value.into()))
    }

    /// Variable whose default is computed at instantiation.
    pub fn var_with<F, V>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        self.declare(name.into(), VarDefault::Factory(Arc::new(move || f().into())))
    }

    /// Declare one variable per field of a serializable record.
    pub fn vars_from<T: Serialize>(mut self, vars: &T) -> Result<Self> {
        match serde_json::to_value(vars)? {
            Value::Object(map) => {
                for (name, value) in map {
                    self = self.declare(name, VarDefault::Value(value));
                }
                Ok(self)
            }
            other => Err(SundashError::InvalidDeclaration(format!(
                "vars of `{}` must serialize to an object, got {}",
                self.name, other
            ))),
        }
    }

    fn declare(mut self, name: String, default: VarDefault) -> Self {
        match self.vars.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = default,
            None => self.vars.push((name, default)),
        }
        self
    }

    /// Declare a callback for events of kind `E`.
    pub fn on<E, F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        E: EventKind,
        F: Fn(ComponentContext, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |ctx, event: Event| match event.decode::<E>() {
            Ok(typed) => handler(ctx, typed).boxed(),
            Err(e) => async move { Err(e) }.boxed(),
        });
        self.callbacks.push(CallbackBinding {
            kind: E::KIND.to_string(),
            method: method.into(),
            handler,
        });
        self
    }

    /// Declare a callback on a kind name, receiving the raw event.
    pub fn on_event<F, Fut>(mut self, kind: impl Into<String>, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ComponentContext, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |ctx, event| handler(ctx, event).boxed());
        self.callbacks.push(CallbackBinding {
            kind: kind.into(),
            method: method.into(),
            handler,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &str {
        &self.html
    }

    pub fn declared_vars(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|(n, _)| n.as_str())
    }

    pub fn callbacks(&self) -> &[CallbackBinding] {
        &self.callbacks
    }

    /// Every template placeholder must name a declared variable.
    pub fn check(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SundashError::InvalidDeclaration(
                "component name must not be empty".into(),
            ));
        }
        for placeholder in html::placeholders(&self.html) {
            if !self.vars.iter().any(|(n, _)| *n == placeholder) {
                return Err(SundashError::InvalidDeclaration(format!(
                    "template of `{}` uses undeclared variable `{}`",
                    self.name, placeholder
                )));
            }
        }
        Ok(())
    }
}

/// Live component instance
pub struct Component {
    class: Arc<ComponentClass>,
    session: Arc<Session>,
    vars: RwLock<Payload>,
    active: AtomicBool,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("class", &self.class.name)
            .field("session", &self.session.id())
            .field("active", &self.is_active())
            .finish()
    }
}

impl Component {
    pub(crate) fn instantiate(class: Arc<ComponentClass>, session: Arc<Session>) -> Arc<Self> {
        let vars = class
            .vars
            .iter()
            .map(|(name, default)| (name.clone(), default.produce()))
            .collect();
        Arc::new(Self {
            class,
            session,
            vars: RwLock::new(vars),
            active: AtomicBool::new(true),
        })
    }

    pub fn name(&self) -> &str {
        &self.class.name
    }

    pub fn class(&self) -> &Arc<ComponentClass> {
        &self.class
    }

    /// The session owning this instance.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub async fn get(&self, name: &str) -> Option<Value> {
        self.vars.read().await.get(name).cloned()
    }

    pub async fn vars(&self) -> Payload {
        self.vars.read().await.clone()
    }

    /// Update a declared variable and push it to the owning session.
    pub async fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        {
            let mut vars = self.vars.write().await;
            match vars.get_mut(name) {
                Some(slot) => *slot = value.clone(),
                None => {
                    return Err(SundashError::UnknownVariable {
                        component: self.class.name.clone(),
                        name: name.to_string(),
                    })
                }
            }
        }
        self.session
            .send_command(&SetVar {
                name: name.to_string(),
                value,
            })
            .await
    }

    /// Template with the current values substituted.
    pub async fn render(&self) -> String {
        let vars = self.vars.read().await;
        html::render_template(&self.class.html, &vars)
    }
}

/// What a component callback gets to work with.
#[derive(Clone)]
pub struct ComponentContext {
    component: Arc<Component>,
    layout: Arc<Layout>,
}

impl ComponentContext {
    pub(crate) fn new(component: Arc<Component>, layout: Arc<Layout>) -> Self {
        Self { component, layout }
    }

    pub fn component(&self) -> &Arc<Component> {
        &self.component
    }

    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    pub fn session(&self) -> &Arc<Session> {
        self.component.session()
    }

    pub async fn get(&self, name: &str) -> Option<Value> {
        self.component.get(name).await
    }

    pub async fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.component.set(name, value).await
    }

    pub async fn switch_page(&self, route: &str) -> Result<()> {
        self.layout.switch_page(route).await
    }

    pub async fn clear_layout(&self) -> Result<()> {
        self.layout.clear().await
    }
}

/// A declared callback bound to one live instance.
///
/// Fires only for events of the owning session while the instance is active.
pub(crate) struct BoundCallback {
    name: String,
    owner: SessionId,
    component: Weak<Component>,
    layout: Weak<Layout>,
    handler: Handler,
}

impl BoundCallback {
    pub(crate) fn new(
        binding: &CallbackBinding,
        component: &Arc<Component>,
        layout: &Arc<Layout>,
    ) -> Self {
        Self {
            name: format!("{}.{}", component.name(), binding.method),
            owner: component.session().id(),
            component: Arc::downgrade(component),
            layout: Arc::downgrade(layout),
            handler: Arc::clone(&binding.handler),
        }
    }
}

#[async_trait]
impl Callback for BoundCallback {
    fn accepts(&self, event: &Event) -> bool {
        event.session() == Some(self.owner)
            && self.layout.strong_count() > 0
            && self.component.upgrade().is_some_and(|c| c.is_active())
    }

    async fn handle(&self, event: Event) -> Result<()> {
        if event.session() != Some(self.owner) {
            return Ok(());
        }
        let (Some(component), Some(layout)) = (self.component.upgrade(), self.layout.upgrade())
        else {
            return Ok(());
        };
        if !component.is_active() {
            return Ok(());
        }
        (self.handler)(ComponentContext::new(component, layout), event).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
