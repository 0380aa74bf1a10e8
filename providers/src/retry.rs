//! Fixed-delay bounded retry.
//!
//! # Retry Policy
//!
//! - Max retries: 2 (3 total attempts)
//! - Delay between attempts: 3 seconds, constant (no backoff, no jitter)
//! - Every failure is retried; the caller decides what is worth wrapping
//!
//! Only idempotent, side-effect-free operations go through here. Chat
//! completions are billed per call and are never retried.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the initial attempt).
    pub max_retries: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Every attempt failed. Carries the error from the final attempt.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E: Display> Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last_error)
    }
}

/// Run `operation` until it succeeds or the policy is exhausted.
///
/// `operation` receives the 1-based attempt number.
pub async fn retry_fixed<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let total = policy.total_attempts();
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < total => {
                tracing::debug!(
                    attempt,
                    total,
                    delay_ms = policy.delay.as_millis(),
                    error = %error,
                    "Attempt failed; retrying after fixed delay"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }
        }
    }
}
