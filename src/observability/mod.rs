//! # Observability
//!
//! Structured logging for the control plane using the tracing ecosystem.
//! The filter comes from `RUST_LOG` when set, otherwise from the configured
//! default level. JSON output is available for log shippers.

mod logging;

pub use logging::log_config_info;

use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Initialize the global tracing subscriber.
///
/// Call once at startup, before any spans or events are emitted.
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = if config.json_logs {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| Error::internal(format!("Failed to initialize tracing: {}", e)))
}
