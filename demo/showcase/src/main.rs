mod apps;

use std::sync::Arc;

use clap::Parser;
use sundash_server::{ServerConfig, SundashServer};
use tracing::info;

use apps::Demo;

#[derive(Parser, Debug)]
#[command(name = "sundash-showcase", about = "Run one of the Sundash demo apps")]
struct Cli {
    /// Demo to serve
    #[arg(value_enum, default_value_t = Demo::Counter)]
    demo: Demo,

    /// Override the configured host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Defaults + env + optional TOML overlay, then command line
    let mut config = ServerConfig::load()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    sundash_core::telemetry::init_logging(&config.log_filter);
    info!(
        target: "showcase",
        demo = ?cli.demo,
        url = %format!("http://{}", config.addr()),
        "Starting Sundash showcase"
    );

    let app = Arc::new(apps::build(cli.demo, config.tick_period())?);
    let _scheduler = app.start();

    SundashServer::new(config, app).serve().await?;
    Ok(())
}
