//! Bounded fixed-delay retry.
//!
//! [`retry_until`] keeps calling an attempt function until it reports a
//! result, the attempt budget runs out, or the [`CancellationToken`] is
//! triggered. The policy belongs to the caller; nothing here keeps state
//! between calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Worst-case wall time spent sleeping.
    pub fn budget(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Ready(T),
    Exhausted { attempts: u32 },
    Cancelled,
}

/// Call `attempt` until it yields `Ok(Some(_))`.
///
/// `Ok(None)` means "not yet". An `Err` is logged and counts as a used
/// attempt. The delay is only slept between attempts, never after the
/// last one.
pub async fn retry_until<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut attempt: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: std::fmt::Display,
{
    for n in 1..=policy.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(what, attempt = n, "Retry cancelled");
                return RetryOutcome::Cancelled;
            }
            result = attempt(n) => match result {
                Ok(Some(value)) => {
                    tracing::debug!(what, attempt = n, "Retry succeeded");
                    return RetryOutcome::Ready(value);
                }
                Ok(None) => {
                    tracing::trace!(what, attempt = n, "Not ready yet");
                }
                Err(e) => {
                    tracing::warn!(what, attempt = n, error = %e, "Attempt failed");
                }
            }
        }

        if n == policy.max_attempts {
            break;
        }

        // Wait before the next attempt, respecting cancellation.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }

    tracing::warn!(what, attempts = policy.max_attempts, "Retry budget exhausted");
    RetryOutcome::Exhausted {
        attempts: policy.max_attempts,
    }
}
