//! Structured logging setup.
//!
//! `RUST_LOG` takes precedence over the configured level, so a single run can be
//! made more verbose without editing the bench file:
//!
//! ```text
//! RUST_LOG=rat_bench::sync=trace,info rat_bench run --config config/bench.toml
//! ```

use crate::config::ApplicationConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber from the application settings.
///
/// Returns `false` if a subscriber was already installed (tests, repeated calls).
pub fn init_from_config(app: &ApplicationConfig) -> bool {
    init(&app.log_level, app.log_json)
}

/// Install the global subscriber at `level`, as JSON lines or human-readable text.
pub fn init(level: &str, json: bool) -> bool {
    let filter = default_filter(level);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .is_ok()
    }
}

