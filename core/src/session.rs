// Session: the server side of one client connection
//
// A session owns both halves of its transport. The read loop pulls typed
// events out of it with `listen_event`; anything holding the session can push
// commands with `send_command`. Server-synthesized events (scheduler ticks)
// go through the inbox so they are dispatched inside the session's own task.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::message::{Command, CommandKind, Event, Payload, Protocol};
use crate::transport::{Connection, FrameSink, FrameSource};
use crate::{Result, SundashError};

/// Monotonic session identifier, unique for the lifetime of an `App`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const INBOX_CAPACITY: usize = 64;

tokio::task_local! {
    static CURRENT_SESSION: Arc<Session>;
}

pub struct Session {
    id: SessionId,
    peer: String,
    protocol: Arc<Protocol>,
    source: Mutex<Box<dyn FrameSource>>,
    sink: Mutex<Box<dyn FrameSink>>,
    inbox_tx: mpsc::Sender<Event>,
    inbox_rx: Mutex<mpsc::Receiver<Event>>,
    closed: AtomicBool,
    sink_closed: AtomicBool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    pub fn new(id: SessionId, conn: Connection, protocol: Arc<Protocol>) -> Arc<Self> {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        Arc::new(Self {
            id,
            peer: conn.peer,
            protocol,
            source: Mutex::new(conn.source),
            sink: Mutex::new(conn.sink),
            inbox_tx,
            inbox_rx: Mutex::new(inbox_rx),
            closed: AtomicBool::new(false),
            sink_closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for the next event: an injected one or a decoded inbound frame.
    ///
    /// Transport closure (normal or not) surfaces as `SessionClosed`; a frame
    /// that does not decode surfaces as `ProtocolDecode`.
    pub async fn listen_event(&self) -> Result<Event> {
        if self.is_closed() {
            return Err(SundashError::SessionClosed(self.id));
        }
        let mut source = self.source.lock().await;
        let mut inbox = self.inbox_rx.lock().await;

        let event = tokio::select! {
            Some(event) = inbox.recv() => event,
            frame = source.receive_frame() => match frame {
                Ok(Some(frame)) => self.protocol.parse_event(&frame)?,
                Ok(None) => return Err(SundashError::SessionClosed(self.id)),
                Err(e) => {
                    debug!(target: "sundash", session = %self.id, error = %e, "Transport read failed");
                    return Err(SundashError::SessionClosed(self.id));
                }
            },
        };

        let event = event.with_session(self.id);
        info!(
            target: "sundash",
            session = %self.id,
            kind = %event.kind(),
            payload = %payload_json(event.payload()),
            "E >>"
        );
        Ok(event)
    }

    pub async fn send_command<C: CommandKind>(&self, command: &C) -> Result<()> {
        self.send(Command::from_typed(command)?).await
    }

    /// Encode and write one command frame.
    pub async fn send(&self, command: Command) -> Result<()> {
        if self.is_closed() {
            return Err(SundashError::SessionClosed(self.id));
        }
        let frame = self.protocol.encode_command(&command)?;

        {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.send_frame(frame).await {
                self.closed.store(true, Ordering::SeqCst);
                warn!(target: "sundash", session = %self.id, error = %e, "Transport write failed");
                return Err(SundashError::SessionClosed(self.id));
            }
        }

        info!(
            target: "sundash",
            session = %self.id,
            kind = %command.kind(),
            payload = %payload_json(&command.elided_payload()),
            "C <<"
        );
        Ok(())
    }

    /// Queue a server-synthesized event without waiting.
    ///
    /// Returns `false` when the session is closed or its inbox is full.
    pub fn inject(&self, event: Event) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.inbox_tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                debug!(target: "sundash", session = %self.id, kind = %event.kind(), "Inbox full, event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Stop accepting sends and injected events; the sink stays open.
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Mark the session closed and close the sink. Safe to call twice.
    pub async fn close(&self) {
        self.mark_closed();
        if self.sink_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.sink.lock().await.close().await {
            debug!(target: "sundash", session = %self.id, error = %e, "Closing sink failed");
        }
    }

    /// The session whose task is currently running, if any.
    ///
    /// The binding is task-local: tasks spawned from a callback do not inherit it.
    pub fn current() -> Option<Arc<Session>> {
        CURRENT_SESSION.try_with(Arc::clone).ok()
    }

    /// Run `fut` with this session bound as the current one.
    pub async fn scope<F: Future>(self: Arc<Self>, fut: F) -> F::Output {
        CURRENT_SESSION.scope(self, fut).await
    }
}

fn payload_json(payload: &Payload) -> String {
    serde_json::to_string(payload).unwrap_or_default()
}
