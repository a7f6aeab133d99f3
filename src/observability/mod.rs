//! Observability module for Tributary.
//!
//! Logging goes through `tracing`; counters go through the `metrics` facade
//! and are no-ops until the host installs a recorder.

use crate::config::ObservabilityConfig;
use crate::error::{Result, TributaryError};
use metrics::counter;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
///
/// Logs go to stderr so that command output on stdout stays machine-readable.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| TributaryError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| TributaryError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    debug!("Observability initialized");
    Ok(())
}

/// Record an event folded into the graph.
pub fn record_event_applied(kind: &'static str) {
    counter!("tributary_events_applied_total", "kind" => kind).increment(1);
}

/// Record a data-quality warning raised while building.
pub fn record_build_warning(kind: &'static str) {
    counter!("tributary_build_warnings_total", "kind" => kind).increment(1);
}

/// Record a graph query.
pub fn record_query(kind: &'static str) {
    counter!("tributary_queries_total", "kind" => kind).increment(1);
}
