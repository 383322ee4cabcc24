// Logging setup
//
// Everything in the crate logs through `tracing` with the `sundash` target;
// binaries call `init_logging` once at startup.

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the configuration provide one.
pub const DEFAULT_FILTER: &str = "info,sundash=info";

/// Install a fmt subscriber. `RUST_LOG` wins over `filter`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging(filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
