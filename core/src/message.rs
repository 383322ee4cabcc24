// Message model
//
// Two disjoint families travel over a session: Events (client -> server) and
// Commands (server -> client). On the wire every message is a single line
// `<KindName> <JSON object>`.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::SessionId;
use crate::{Result, SundashError};

/// Flat field name -> value mapping carried by every message.
pub type Payload = serde_json::Map<String, Value>;

/// A named, serializable record. `KIND` is the name used on the wire.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: &'static str;
}

/// Client -> server message.
pub trait EventKind: Message {
    /// Server-synthesized kinds are rejected when a client sends them.
    const INBOUND: bool = true;
}

/// Server -> client message.
pub trait CommandKind: Message {}

macro_rules! message_kind {
    ($ty:ident => event) => {
        impl Message for $ty {
            const KIND: &'static str = stringify!($ty);
        }
        impl EventKind for $ty {}
    };
    ($ty:ident => internal event) => {
        impl Message for $ty {
            const KIND: &'static str = stringify!($ty);
        }
        impl EventKind for $ty {
            const INBOUND: bool = false;
        }
    };
    ($ty:ident => command) => {
        impl Message for $ty {
            const KIND: &'static str = stringify!($ty);
        }
        impl CommandKind for $ty {}
    };
}

// =========================
// Built-in events
// =========================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ButtonClick {
    pub button_id: String,
}
message_kind!(ButtonClick => event);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputUpdated {
    pub name: String,
    pub value: String,
}
message_kind!(InputUpdated => event);

/// Client acknowledgement: an `UpdateLayout` was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutUpdated {}
message_kind!(LayoutUpdated => event);

/// Client acknowledgement: a `SetVar` was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VarSet {}
message_kind!(VarSet => event);

/// Client acknowledgement: a `ClearLayout` was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutClean {}
message_kind!(LayoutClean => event);

/// Periodic tick injected by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EverySecond {}
message_kind!(EverySecond => internal event);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConnected {}
message_kind!(ClientConnected => internal event);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientDisconnected {}
message_kind!(ClientDisconnected => internal event);

// =========================
// Built-in commands
// =========================

/// Full page replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateLayout {
    pub html: String,
    #[serde(default)]
    pub vars: Payload,
}
message_kind!(UpdateLayout => command);

/// Incremental update of a single variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetVar {
    pub name: String,
    pub value: Value,
}
message_kind!(SetVar => command);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClearLayout {}
message_kind!(ClearLayout => command);

// =========================
// Dynamic records
// =========================

/// An inbound event as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: String,
    payload: Payload,
    session: Option<SessionId>,
}

impl Event {
    pub fn new(kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            payload,
            session: None,
        }
    }

    pub fn from_typed<E: EventKind>(event: &E) -> Result<Self> {
        Ok(Self::new(E::KIND, to_payload(event)?))
    }

    /// Decode the payload into the declared type for this kind.
    pub fn decode<E: EventKind>(&self) -> Result<E> {
        if self.kind != E::KIND {
            return Err(SundashError::decode(
                &self.kind,
                format!("expected event kind `{}`", E::KIND),
            ));
        }
        from_payload(&self.payload)
    }

    pub fn is<E: EventKind>(&self) -> bool {
        self.kind == E::KIND
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Session the event was delivered on, if any.
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }
}

/// An outbound command.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    kind: String,
    payload: Payload,
}

impl Command {
    pub fn new(kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn from_typed<C: CommandKind>(command: &C) -> Result<Self> {
        Ok(Self::new(C::KIND, to_payload(command)?))
    }

    pub fn decode<C: CommandKind>(&self) -> Result<C> {
        if self.kind != C::KIND {
            return Err(SundashError::decode(
                &self.kind,
                format!("expected command kind `{}`", C::KIND),
            ));
        }
        from_payload(&self.payload)
    }

    pub fn is<C: CommandKind>(&self) -> bool {
        self.kind == C::KIND
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Payload copy for logging: `html` fields and long strings are replaced
    /// by `...` at any depth.
    pub fn elided_payload(&self) -> Payload {
        self.payload
            .iter()
            .map(|(key, value)| (key.clone(), elide(key, value)))
            .collect()
    }
}

fn elide(key: &str, value: &Value) -> Value {
    match value {
        Value::String(s) if key == "html" || s.len() > MAX_LOGGED_FIELD_LEN => {
            Value::String("...".into())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), elide(k, v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| elide(key, v)).collect()),
        other => other.clone(),
    }
}

const MAX_LOGGED_FIELD_LEN: usize = 120;

fn to_payload<M: Message>(message: &M) -> Result<Payload> {
    match serde_json::to_value(message)? {
        Value::Object(map) => Ok(map),
        other => Err(SundashError::InvalidDeclaration(format!(
            "{} must serialize to a JSON object, got {}",
            M::KIND,
            other
        ))),
    }
}

fn from_payload<M: Message>(payload: &Payload) -> Result<M> {
    Ok(serde_json::from_value(Value::Object(payload.clone()))?)
}

// =========================
// Framing
// =========================

pub fn encode_frame(kind: &str, payload: &Payload) -> Result<String> {
    Ok(format!("{} {}", kind, serde_json::to_string(payload)?))
}

fn split_frame(frame: &str) -> Result<(&str, Payload)> {
    let (kind, data) = frame
        .split_once(' ')
        .ok_or_else(|| SundashError::decode(frame, "missing payload separator"))?;
    if kind.is_empty() {
        return Err(SundashError::decode(frame, "empty kind name"));
    }
    let value: Value = serde_json::from_str(data)
        .map_err(|e| SundashError::decode(frame, format!("invalid JSON payload: {}", e)))?;
    match value {
        Value::Object(map) => Ok((kind, map)),
        _ => Err(SundashError::decode(frame, "payload must be a JSON object")),
    }
}

// =========================
// Kind registries
// =========================

type Validator = fn(&Payload) -> Result<()>;

fn validate<M: Message>(payload: &Payload) -> Result<()> {
    from_payload::<M>(payload).map(|_| ())
}

#[derive(Clone, Copy)]
struct KindEntry {
    validate: Validator,
    inbound: bool,
}

/// Name -> declared type lookup for one message family.
pub struct KindRegistry {
    family: &'static str,
    kinds: HashMap<String, KindEntry>,
}

impl KindRegistry {
    fn new(family: &'static str) -> Self {
        Self {
            family,
            kinds: HashMap::new(),
        }
    }

    fn insert<M: Message>(&mut self, inbound: bool) {
        self.kinds.insert(
            M::KIND.to_string(),
            KindEntry {
                validate: validate::<M>,
                inbound,
            },
        );
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn resolve(&self, frame: &str, kind: &str) -> Result<KindEntry> {
        self.kinds.get(kind).copied().ok_or_else(|| {
            SundashError::decode(frame, format!("unknown {} kind `{}`", self.family, kind))
        })
    }
}

/// Both kind registries plus the frame codec built on them.
pub struct Protocol {
    events: KindRegistry,
    commands: KindRegistry,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol {
    /// Protocol with every built-in kind registered.
    pub fn new() -> Self {
        let mut events = KindRegistry::new("event");
        events.insert::<ButtonClick>(ButtonClick::INBOUND);
        events.insert::<InputUpdated>(InputUpdated::INBOUND);
        events.insert::<LayoutUpdated>(LayoutUpdated::INBOUND);
        events.insert::<VarSet>(VarSet::INBOUND);
        events.insert::<LayoutClean>(LayoutClean::INBOUND);
        events.insert::<EverySecond>(EverySecond::INBOUND);
        events.insert::<ClientConnected>(ClientConnected::INBOUND);
        events.insert::<ClientDisconnected>(ClientDisconnected::INBOUND);

        let mut commands = KindRegistry::new("command");
        commands.insert::<UpdateLayout>(false);
        commands.insert::<SetVar>(false);
        commands.insert::<ClearLayout>(false);

        Self { events, commands }
    }

    pub fn register_event<E: EventKind>(&mut self) -> Result<()> {
        check_kind_name(E::KIND, &self.commands)?;
        self.events.insert::<E>(E::INBOUND);
        Ok(())
    }

    pub fn register_command<C: CommandKind>(&mut self) -> Result<()> {
        check_kind_name(C::KIND, &self.events)?;
        self.commands.insert::<C>(false);
        Ok(())
    }

    pub fn events(&self) -> &KindRegistry {
        &self.events
    }

    pub fn commands(&self) -> &KindRegistry {
        &self.commands
    }

    /// Decode an inbound frame. Only client-facing event kinds are accepted.
    pub fn parse_event(&self, frame: &str) -> Result<Event> {
        let (kind, payload) = split_frame(frame)?;
        let entry = self.events.resolve(frame, kind)?;
        if !entry.inbound {
            return Err(SundashError::decode(
                frame,
                format!("event kind `{}` is server-only", kind),
            ));
        }
        (entry.validate)(&payload).map_err(|e| SundashError::decode(frame, e.to_string()))?;
        Ok(Event::new(kind, payload))
    }

    /// Decode an outbound frame, e.g. on the client side of a connection.
    pub fn parse_command(&self, frame: &str) -> Result<Command> {
        let (kind, payload) = split_frame(frame)?;
        let entry = self.commands.resolve(frame, kind)?;
        (entry.validate)(&payload).map_err(|e| SundashError::decode(frame, e.to_string()))?;
        Ok(Command::new(kind, payload))
    }

    pub fn encode_command(&self, command: &Command) -> Result<String> {
        self.commands.resolve(command.kind(), command.kind())?;
        encode_frame(command.kind(), command.payload())
    }

    pub fn encode_event(&self, event: &Event) -> Result<String> {
        self.events.resolve(event.kind(), event.kind())?;
        encode_frame(event.kind(), event.payload())
    }
}

fn check_kind_name(kind: &str, other_family: &KindRegistry) -> Result<()> {
    if kind.is_empty() || kind.chars().any(char::is_whitespace) {
        return Err(SundashError::InvalidDeclaration(format!(
            "kind name `{}` must be non-empty and contain no whitespace",
            kind
        )));
    }
    if other_family.contains(kind) {
        return Err(SundashError::InvalidDeclaration(format!(
            "kind `{}` is already registered as a {}",
            kind, other_family.family
        )));
    }
    Ok(())
}
