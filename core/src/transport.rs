// Transport seam
//
// The core never touches a socket. A host accepts the connection and hands the
// core a `Connection`: a frame source owned by the session read loop and a
// frame sink shared by everything that sends commands.

use async_trait::async_trait;

use crate::Result;

/// Inbound half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next inbound frame, `Ok(None)` once the peer closed normally.
    ///
    /// Must be cancel-safe: the session races it against injected events.
    async fn receive_frame(&mut self) -> Result<Option<String>>;
}

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: String) -> Result<()>;

    /// Called once when the session ends.
    async fn close(&mut self) -> Result<()>;
}

/// An accepted connection, ready to be served as a session.
pub struct Connection {
    pub source: Box<dyn FrameSource>,
    pub sink: Box<dyn FrameSink>,
    /// Peer description used in logs.
    pub peer: String,
}

impl Connection {
    pub fn new(
        source: impl FrameSource + 'static,
        sink: impl FrameSink + 'static,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            source: Box::new(source),
            sink: Box::new(sink),
            peer: peer.into(),
        }
    }
}

/// Channel-backed transport. The `MemoryClient` plays the browser.
pub mod memory {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::{Connection, FrameSink, FrameSource};
    use crate::{Result, SundashError};

    /// Create a connected pair with `capacity` frames buffered per direction.
    pub fn connection(capacity: usize) -> (Connection, MemoryClient) {
        let (client_tx, server_rx) = mpsc::channel(capacity);
        let (server_tx, client_rx) = mpsc::channel(capacity);
        let conn = Connection::new(
            MemorySource { rx: server_rx },
            MemorySink {
                tx: Some(server_tx),
            },
            "memory",
        );
        let client = MemoryClient {
            tx: Some(client_tx),
            rx: client_rx,
        };
        (conn, client)
    }

    struct MemorySource {
        rx: mpsc::Receiver<String>,
    }

    #[async_trait]
    impl FrameSource for MemorySource {
        async fn receive_frame(&mut self) -> Result<Option<String>> {
            Ok(self.rx.recv().await)
        }
    }

    struct MemorySink {
        tx: Option<mpsc::Sender<String>>,
    }

    #[async_trait]
    impl FrameSink for MemorySink {
        async fn send_frame(&mut self, frame: String) -> Result<()> {
            let tx = self
                .tx
                .as_ref()
                .ok_or_else(|| SundashError::Transport("sink closed".into()))?;
            tx.send(frame)
                .await
                .map_err(|_| SundashError::Transport("client disconnected".into()))
        }

        async fn close(&mut self) -> Result<()> {
            self.tx = None;
            Ok(())
        }
    }

    /// Client end of an in-memory connection.
    pub struct MemoryClient {
        tx: Option<mpsc::Sender<String>>,
        rx: mpsc::Receiver<String>,
    }

    impl MemoryClient {
        pub async fn send(&self, frame: impl Into<String>) -> Result<()> {
            let tx = self
                .tx
                .as_ref()
                .ok_or_else(|| SundashError::Transport("client already disconnected".into()))?;
            tx.send(frame.into())
                .await
                .map_err(|_| SundashError::Transport("server side gone".into()))
        }

        /// Next frame from the server; `None` once the server closed the sink.
        pub async fn recv(&mut self) -> Option<String> {
            self.rx.recv().await
        }

        /// Like `recv`, but gives up after `timeout`.
        pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<String> {
            tokio::time::timeout(timeout, self.rx.recv())
                .await
                .ok()
                .flatten()
        }

        pub fn try_recv(&mut self) -> Option<String> {
            self.rx.try_recv().ok()
        }

        /// Close the client -> server direction; the session sees a normal closure.
        pub fn disconnect(&mut self) {
            self.tx = None;
        }
    }
}
