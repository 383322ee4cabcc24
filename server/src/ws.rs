// WebSocket transport
//
// Adapts an upgraded axum socket to the core's frame seam: each text message
// is one frame. The read half feeds the session loop, the write half is
// shared by everything that sends commands.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use sundash_core::{App, Connection, FrameSink, FrameSource, Result, SundashError};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app): State<Arc<App>>,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> impl IntoResponse {
    let peer = peer
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, app, peer))
}

async fn handle_socket(socket: WebSocket, app: Arc<App>, peer: String) {
    info!(target: "sundash", peer = %peer, "WebSocket connection opened");
    if let Err(e) = app.serve_connection(connection(socket, peer.clone())).await {
        warn!(target: "sundash", peer = %peer, error = %e, "WebSocket session failed");
    }
    info!(target: "sundash", peer = %peer, "WebSocket connection closed");
}

/// Wrap an upgraded socket as a core `Connection`.
pub fn connection(socket: WebSocket, peer: impl Into<String>) -> Connection {
    let (sink, stream) = socket.split();
    Connection::new(WsSource { stream }, WsSink { sink }, peer)
}

struct WsSource {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn receive_frame(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(Message::Binary(data))) => {
                    debug!(target: "sundash", len = data.len(), "Binary frame ignored");
                }
                // Ping/pong are answered by the socket itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(SundashError::Transport(e.to_string())),
            }
        }
    }
}

struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_frame(&mut self, frame: String) -> Result<()> {
        self.sink
            .send(Message::Text(frame))
            .await
            .map_err(|e| SundashError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| SundashError::Transport(e.to_string()))
    }
}
