// Sundash Core Library
// Server-driven UI: sessions, signals, components and layouts

pub mod app;
pub mod component;
pub mod html;
pub mod layout;
pub mod message;
pub mod scheduler;
pub mod session;
pub mod signal;
pub mod telemetry;
pub mod transport;

// Export core types
pub use app::{App, AppBuilder, SessionHook};
pub use component::{Component, ComponentClass, ComponentContext};
pub use layout::{Layout, PageItem, Pages, Route};
pub use message::{
    ButtonClick, ClearLayout, ClientConnected, ClientDisconnected, Command, CommandKind,
    EverySecond, Event, EventKind, InputUpdated, LayoutClean, LayoutUpdated, Message, Payload,
    Protocol, SetVar, UpdateLayout, VarSet,
};
pub use scheduler::Scheduler;
pub use session::{Session, SessionId};
pub use signal::{callback_fn, Callback, DispatchReport, SignalRegistry, SubscriptionId};
pub use transport::{Connection, FrameSink, FrameSource};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SundashError {
    #[error("Protocol decode error: {reason} (frame: {frame:?})")]
    ProtocolDecode { frame: String, reason: String },

    #[error("Session {0} closed")]
    SessionClosed(SessionId),

    #[error("Component `{component}` has no variable `{name}`")]
    UnknownVariable { component: String, name: String },

    #[error("Unknown route: `{0}`")]
    UnknownRoute(String),

    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(String),

    #[error("Callback error: {0}")]
    Callback(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl SundashError {
    pub(crate) fn decode(frame: &str, reason: impl Into<String>) -> Self {
        Self::ProtocolDecode {
            frame: frame.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors that point at a bug in the embedding application.
    ///
    /// Raised from a callback they end the offending session instead of being
    /// logged and skipped.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownVariable { .. } | Self::InvalidDeclaration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SundashError>;
