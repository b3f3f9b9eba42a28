//! Bounded polling
//!
//! Replaces fixed sleeps with probes that retry on an interval until a
//! deadline passes.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// How long to keep probing and how often.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn from_secs(timeout: u64, interval: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout),
            interval: Duration::from_secs(interval),
        }
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("Timed out after {elapsed:?} waiting for {what}{}", last_error_suffix(.last_error))]
    Timeout {
        what: String,
        elapsed: Duration,
        last_error: Option<String>,
    },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|e| format!(" (last error: {})", e))
        .unwrap_or_default()
}

/// Probe until it yields a value or the policy's timeout expires.
///
/// `Ok(Some(v))` finishes the wait. `Ok(None)` and `Err(_)` both mean "not
/// yet"; the most recent error is kept for the timeout report. The probe
/// always runs at least once.
pub async fn poll_until<T, E, F, Fut>(
    what: &str,
    policy: &RetryPolicy,
    mut probe: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let mut last_error = None;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match probe().await {
            Ok(Some(value)) => {
                debug!(what, attempts, elapsed = ?start.elapsed(), "Wait satisfied");
                return Ok(value);
            }
            Ok(None) => {}
            Err(e) => last_error = Some(e.to_string()),
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            return Err(WaitError::Timeout {
                what: what.to_string(),
                elapsed,
                last_error,
            });
        }

        debug!(what, attempts, elapsed = ?elapsed, "Not ready yet");
        sleep(policy.interval.min(policy.timeout - elapsed)).await;
    }
}
