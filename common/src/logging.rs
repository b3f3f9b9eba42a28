//! Structured logging initialization
//!
//! Provides consistent logging initialization across all school-db-ops components.
//! Logs go to stderr so stdout stays free for status dumps and reports.

use crate::config::ConfigExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Guard that keeps the tracing subscriber active.
/// Drop this at the end of main to flush logs.
pub struct LogGuard;

/// Initialize structured logging for a component.
///
/// Returns a guard that should be held for the lifetime of the program.
/// Set `LOG_FORMAT=json` for JSON lines.
///
/// # Example
/// ```ignore
/// let _guard = init_logging("replication-setup");
/// info!("Starting up...");
/// ```
pub fn init_logging(component: &str) -> LogGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = String::env_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json");

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }

    tracing::debug!(component, "Logging initialized");

    LogGuard
}
