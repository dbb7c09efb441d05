//! Retry utilities with exponential backoff.
//!
//! Server-side apply against a cluster that is still settling hits webhook
//! races, etcd conflicts and throttling. This module retries such transient
//! failures with deterministic exponential backoff and gives up immediately
//! on errors that a repeat cannot fix.
//!
//! # Example
//!
//! ```ignore
//! use kyma_bootstrap::retry::{retry_with_backoff, RetryConfig};
//!
//! let applied = retry_with_backoff(
//!     &RetryConfig::with_max_attempts(4),
//!     "apply Namespace/kcp-system",
//!     || cluster.apply(&document, &options),
//! ).await?;
//! ```

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::Error;

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first (values below 1 behave
    /// as a single attempt)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a total number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }
}

/// Execute an async operation, retrying transient failures with backoff.
///
/// The delay starts at `initial_delay` and is multiplied by
/// `backoff_multiplier` after each failure, capped at `max_delay`.
/// Errors whose [`Error::is_retryable`] is false are returned immediately.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation_name` - Name for logging purposes
/// * `operation` - The async operation to retry
///
/// # Returns
/// The result of the operation, or the last error once the attempt budget
/// is spent or a definitive error occurs.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = %operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_retryable() {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed with a non-retryable error"
                    );
                    return Err(e);
                }

                if attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max attempts"
                    );
                    return Err(e);
                }

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;

                // Exponential backoff, capped at max_delay
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}
