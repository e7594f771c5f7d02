use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::Backoff;

/// Bounded retry schedule for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    /// Single attempt, never retried.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::exponential(self.initial_delay, self.max_delay)
            .with_max_attempts(self.max_attempts.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200), Duration::from_secs(2))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned on exhaustion.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut backoff = policy.backoff();
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) => match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        operation,
                        attempt = backoff.current_attempt(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}
