//! Linear backoff for the initial server connection.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Retry schedule: after the Nth failure wait `N * step`, giving up after
/// `max_retries` retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.step * retry
    }

    /// Worst case time spent sleeping before giving up
    pub fn total_delay(&self) -> Duration {
        (1..=self.max_retries).map(|n| self.delay_for(n)).sum()
    }
}

/// Outcome of an exhausted retry loop
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Calls made, including the first
    pub attempts: u32,
    pub last_error: E,
}

/// Run `operation` until it succeeds or the policy is exhausted.
///
/// The first call is not a retry; a policy with `max_retries = 10` makes at
/// most 11 calls and sleeps 1, 2, ..., 10 steps in between.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retries = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if retries > 0 {
                    debug!("{} succeeded after {} retries", label, retries);
                }
                return Ok(value);
            }
            Err(err) if retries >= policy.max_retries => {
                return Err(RetryExhausted {
                    attempts: retries + 1,
                    last_error: err,
                });
            }
            Err(err) => {
                retries += 1;
                let delay = policy.delay_for(retries);
                warn!(
                    "{} failed ({}); retry {}/{} in {:?}",
                    label, err, retries, policy.max_retries, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
