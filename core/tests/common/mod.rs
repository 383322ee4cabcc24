// Shared helpers for core integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sundash_core::transport::memory::{self, MemoryClient};
use sundash_core::{App, Command, Protocol};
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(2);
pub const QUIET: Duration = Duration::from_millis(150);

/// Serve a fresh in-memory connection on `app`; the client plays the browser.
pub fn connect(app: &Arc<App>) -> (MemoryClient, JoinHandle<sundash_core::Result<()>>) {
    let (conn, client) = memory::connection(64);
    let app = Arc::clone(app);
    let handle = tokio::spawn(async move { app.serve_connection(conn).await });
    (client, handle)
}

pub async fn next_command(client: &mut MemoryClient) -> Command {
    let frame = client.recv_timeout(WAIT).await.expect("timely frame");
    Protocol::new()
        .parse_command(&frame)
        .expect("valid command frame")
}

pub async fn assert_quiet(client: &mut MemoryClient) {
    let frame = client.recv_timeout(QUIET).await;
    assert!(frame.is_none(), "unexpected frame: {:?}", frame);
}
