//! Async retry with fixed or exponential backoff.
//!
//! The closure returns `Result<T, Failure<E>>`; a [`Failure::Skip`]
//! aborts the loop immediately and the inner error is handed back
//! unwrapped as [`RetryError::Skipped`]. Exhausting the attempt budget
//! yields [`RetryError::MaxRetry`] carrying the last error observed.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How an attempt failed.
#[derive(Debug)]
pub enum Failure<E> {
    /// Transient failure; the retrier may try again.
    Retryable(E),
    /// Permanent failure; abort immediately.
    Skip(E),
}

/// Marks an error as non-retryable.
pub fn skip<E>(err: E) -> Failure<E> {
    Failure::Skip(err)
}

impl<E> From<E> for Failure<E> {
    fn from(err: E) -> Self {
        Failure::Retryable(err)
    }
}

/// Terminal outcome of a retry loop.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// All attempts failed; carries the last error.
    #[error("failed max retries")]
    MaxRetry(E),
    /// An attempt failed with a non-retryable error.
    #[error("aborted")]
    Skipped(E),
    /// The cancellation token fired between attempts.
    #[error("cancelled")]
    Cancelled,
}

impl<E> RetryError<E> {
    /// The inner error, when one exists.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::MaxRetry(e) | Self::Skipped(e) => Some(e),
            Self::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    Fixed(Duration),
    Exponential(Duration),
}

impl Strategy {
    fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(d) => d,
            // base * 2^attempt, saturating well past any sane budget
            Self::Exponential(base) => base.saturating_mul(1u32 << attempt.min(16)),
        }
    }
}

/// Configurable retry loop.
#[derive(Debug, Clone)]
pub struct Retrier {
    max_attempts: u32,
    strategy: Strategy,
    cancel: Option<CancellationToken>,
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Retrier {
    /// Fixed one-second backoff, five attempts.
    pub fn new() -> Self {
        Self {
            max_attempts: 5,
            strategy: Strategy::Fixed(Duration::from_secs(1)),
            cancel: None,
        }
    }

    /// Exponential backoff starting at one second, five attempts.
    pub fn exponential() -> Self {
        Self {
            max_attempts: 5,
            strategy: Strategy::Exponential(Duration::from_secs(1)),
            cancel: None,
        }
    }

    /// Overrides the attempt budget.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Overrides the backoff base interval.
    pub fn base_delay(mut self, base: Duration) -> Self {
        self.strategy = match self.strategy {
            Strategy::Fixed(_) => Strategy::Fixed(base),
            Strategy::Exponential(_) => Strategy::Exponential(base),
        };
        self
    }

    /// Aborts the loop when the token fires.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Runs `f` until it succeeds, aborts or exhausts the budget.
    pub async fn run<T, E, F, Fut>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure<E>>>,
    {
        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            if let Some(cancel) = &self.cancel {
                if cancel.is_cancelled() {
                    return Err(RetryError::Cancelled);
                }
            }

            match f().await {
                Ok(value) => return Ok(value),
                Err(Failure::Skip(e)) => return Err(RetryError::Skipped(e)),
                Err(Failure::Retryable(e)) => last_err = Some(e),
            }

            if attempt + 1 < self.max_attempts {
                let delay = self.strategy.delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
                match &self.cancel {
                    Some(cancel) => {
                        tokio::select! {
                            () = cancel.cancelled() => return Err(RetryError::Cancelled),
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => tokio::time::sleep(delay).await,
                }
            }
        }

        match last_err {
            Some(e) => Err(RetryError::MaxRetry(e)),
            // max_attempts == 0: nothing ever ran
            None => Err(RetryError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> Retrier {
        Retrier::new().base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let result: Result<u32, RetryError<&str>> = fast().run(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<&str>> = fast()
            .run(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Failure::Retryable("transient"))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<&str>> = fast()
            .max_attempts(3)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Failure::Retryable("still broken"))
            })
            .await;
        assert!(matches!(result, Err(RetryError::MaxRetry("still broken"))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn skip_aborts_immediately_and_unwraps() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<&str>> = fast()
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(skip("permanent"))
            })
            .await;
        assert!(matches!(result, Err(RetryError::Skipped("permanent"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<(), RetryError<&str>> = Retrier::new()
            .cancel_token(token)
            .run(|| async { Err(Failure::Retryable("nope")) })
            .await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[test]
    fn exponential_delays_double() {
        let strategy = Strategy::Exponential(Duration::from_secs(1));
        assert_eq!(strategy.delay(0), Duration::from_secs(1));
        assert_eq!(strategy.delay(1), Duration::from_secs(2));
        assert_eq!(strategy.delay(3), Duration::from_secs(8));
    }
}
