// Sundash Server
//
// Hosts an `App` over HTTP: the HTML shell at `/`, bundled assets under
// `/static/`, and one WebSocket session per connection at `/ws`.

pub mod config;
mod static_assets;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Path,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use sundash_core::App;

pub use config::ServerConfig;

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("bind to {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// HTTP host for one `App`
pub struct SundashServer {
    config: ServerConfig,
    app: Arc<App>,
}

impl SundashServer {
    pub fn new(config: ServerConfig, app: Arc<App>) -> Self {
        Self { config, app }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> Router {
        router(Arc::clone(&self.app))
    }

    /// Bind the configured address and serve until the process stops.
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.addr();
        info!(target: "sundash", addr = %addr, "Starting Sundash server");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        start_server(listener, self.app).await
    }
}

/// Serve `app` on an already bound listener.
pub async fn start_server(listener: TcpListener, app: Arc<App>) -> Result<()> {
    let local = listener.local_addr()?;
    info!(target: "sundash", url = %format!("http://{}", local), "Sundash server ready");
    axum::serve(
        listener,
        router(app).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/static/*asset", get(static_asset_handler))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

async fn index_handler() -> Html<&'static str> {
    Html(static_assets::INDEX_HTML)
}

async fn static_asset_handler(Path(asset): Path<String>) -> impl IntoResponse {
    match static_assets::get(asset.as_str()) {
        Some(asset) => {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static(asset.content_type),
            );
            (StatusCode::OK, headers, asset.body).into_response()
        }
        None => (StatusCode::NOT_FOUND, b"Not found".as_slice()).into_response(),
    }
}
