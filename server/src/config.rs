use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use sundash_core::telemetry::DEFAULT_FILTER;

use crate::{Result, ServerError};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_TICK_MS: u64 = 1000;

/// Server configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Period of the `EverySecond` tick.
    pub tick_interval_ms: u64,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tick_interval_ms: DEFAULT_TICK_MS,
            log_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `SUNDASH_HOST`, `SUNDASH_PORT`, `SUNDASH_TICK_MS`
    /// and `SUNDASH_LOG`. Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            host: var("SUNDASH_HOST").unwrap_or(default.host),
            port: var("SUNDASH_PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(default.port),
            tick_interval_ms: var("SUNDASH_TICK_MS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(default.tick_interval_ms),
            log_filter: var("SUNDASH_LOG").unwrap_or(default.log_filter),
        }
    }

    /// Env-driven config with the TOML file (path via `SUNDASH_CONFIG` or
    /// `./sundash.toml`) overlaid on top. A missing file is not an error.
    pub fn load() -> Result<Self> {
        let config = Self::from_env();
        let path = std::env::var("SUNDASH_CONFIG").unwrap_or_else(|_| "sundash.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::debug!(target: "sundash", path = %path, "No TOML config found; using defaults/env");
            return Ok(config);
        }
        let text = fs::read_to_string(p)
            .map_err(|e| ServerError::Config(format!("failed to read {}: {}", path, e)))?;
        config.overlay_toml(&text)
    }

    /// Apply the keys present in `text` on top of `self`.
    pub fn overlay_toml(self, text: &str) -> Result<Self> {
        let file: ServerToml =
            toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        file.overlay(self)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerToml {
    host: Option<String>,
    port: Option<u16>,
    tick_interval_ms: Option<u64>,
    log_filter: Option<String>,
}

impl ServerToml {
    fn overlay(self, mut base: ServerConfig) -> Result<ServerConfig> {
        if let Some(v) = self.host {
            base.host = v;
        }
        if let Some(v) = self.port {
            base.port = v;
        }
        if let Some(v) = self.tick_interval_ms {
            if v == 0 {
                return Err(ServerError::Config("tick_interval_ms must be positive".into()));
            }
            base.tick_interval_ms = v;
        }
        if let Some(v) = self.log_filter {
            base.log_filter = v;
        }
        Ok(base)
    }
}
