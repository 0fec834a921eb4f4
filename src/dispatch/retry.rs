//! Fixed-delay retry of a whole operation.

use rollcall_core::RollcallError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How many times an operation runs and how long to wait in between.
///
/// # Example
///
/// ```rust
/// use rollcall::dispatch::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy {
///     max_attempts: 3,
///     backoff_delay: Duration::from_secs(1),
/// };
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Constant delay between attempts.
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts, one second apart.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// `operation` receives the 1-based attempt number. `on_retry` is told
    /// about every failure that will be followed by another attempt, before
    /// the delay starts. The error of the last attempt is returned.
    pub async fn run<T, F, Fut, R>(&self, mut operation: F, mut on_retry: R) -> Result<T, RollcallError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RollcallError>>,
        R: FnMut(u32, &RollcallError),
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    on_retry(attempt, &err);
                    sleep(self.backoff_delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_second_attempt() {
        let policy = RetryPolicy::default();
        let retries = Cell::new(0);
        let start = tokio::time::Instant::now();

        let result = policy
            .run(
                |attempt| async move {
                    if attempt < 2 {
                        Err(RollcallError::DispatchProtocolMismatch("nope".into()))
                    } else {
                        Ok(attempt)
                    }
                },
                |_, _| retries.set(retries.get() + 1),
            )
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(retries.get(), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(10),
        };
        let calls = Cell::new(0);
        let result: Result<(), _> = policy
            .run(
                |attempt| {
                    calls.set(calls.get() + 1);
                    async move { Err(RollcallError::ProbeFailure { attempts: attempt, last_error: "x".into() }) }
                },
                |_, _| {},
            )
            .await;

        assert_eq!(calls.get(), 3);
        assert!(matches!(result, Err(RollcallError::ProbeFailure { attempts: 3, .. })));
    }
}
