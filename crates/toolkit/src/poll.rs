//! Bounded polling with backoff.
//!
//! Used by the engine in poll mode to wait for an asynchronous effect (for
//! example a certificate registration propagating through the global
//! configuration) instead of stopping at the first unobserved step.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Why polling gave up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    /// Condition still false after every attempt.
    #[error("{name} not observed after {attempts} attempts")]
    Exhausted { name: String, attempts: u32 },

    /// Cancelled before the condition held.
    #[error("{name} polling cancelled")]
    Cancelled { name: String },
}

/// Polling limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Maximum number of checks.
    pub max_attempts: u32,
    /// Delay before the second check, in seconds.
    pub initial_delay_secs: u64,
    /// Upper bound for the delay, in seconds.
    pub max_delay_secs: u64,
    /// Delay multiplier between checks.
    pub backoff_multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_secs: 30,
            max_delay_secs: 300,
            backoff_multiplier: 2.0,
        }
    }
}

impl PollConfig {
    /// Delay after the given (zero-based) failed check.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.min(16)).unwrap_or(16);
        #[allow(clippy::cast_precision_loss)]
        let delay_secs = self.initial_delay_secs as f64 * self.backoff_multiplier.powi(exp);
        #[allow(clippy::cast_precision_loss)]
        let capped = delay_secs.min(self.max_delay_secs as f64);
        Duration::try_from_secs_f64(capped.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Run `check` until it returns `true`, the attempts run out, or `cancel` fires.
///
/// Returns the number of checks performed on success.
///
/// # Errors
///
/// Returns [`PollError::Exhausted`] or [`PollError::Cancelled`].
pub async fn poll_until<F, Fut>(
    config: &PollConfig,
    cancel: &CancellationToken,
    name: &str,
    mut check: F,
) -> Result<u32, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let max_attempts = config.max_attempts.max(1);

    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled {
                name: name.to_string(),
            });
        }
        if check().await {
            return Ok(attempt + 1);
        }
        if attempt + 1 == max_attempts {
            break;
        }

        let delay = config.delay_for_attempt(attempt);
        info!(
            "{name} not observed yet (attempt {}/{max_attempts}), checking again in {delay:?}",
            attempt + 1
        );
        tokio::select! {
            () = cancel.cancelled() => {
                return Err(PollError::Cancelled { name: name.to_string() });
            }
            () = tokio::time::sleep(delay) => {}
        }
    }

    Err(PollError::Exhausted {
        name: name.to_string(),
        attempts: max_attempts,
    })
}
