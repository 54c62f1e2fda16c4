use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use tracing::{error, warn};

use crate::clock::Clock;
use crate::settings::RetrySettings;

/// How a failed remote call should be treated by [`RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Quota exhausted; retry after an escalating cooldown.
    RateLimited,
    /// Network or parse failure; retry immediately.
    Transient,
    /// Retrying cannot help; propagate to the caller.
    Fatal,
}

/// Classification hook for errors flowing through [`RetryPolicy`].
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

/// Bounded retries with rate-limit-aware backoff and a neutral fallback on exhaustion.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
    backoff_step: Duration,
    clock: Arc<dyn Clock>,
}

impl RetryPolicy {
    pub fn new(settings: &RetrySettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_backoff: Duration::from_secs(settings.base_backoff_secs),
            backoff_step: Duration::from_secs(settings.backoff_step_secs),
            clock,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Cooldown after the rate-limited attempt `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt + self.base_backoff
    }

    /// Run `call` until it succeeds, a fatal error occurs, or attempts are exhausted.
    ///
    /// Exhaustion is not an error: the value produced by `fallback` is returned instead.
    /// Only [`ErrorClass::Fatal`] errors are propagated.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        fallback: impl FnOnce() -> T,
        mut call: F,
    ) -> Result<T, E>
    where
        E: Classify + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        for attempt in 0..self.max_attempts {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let last = attempt + 1 == self.max_attempts;
            match err.class() {
                ErrorClass::Fatal => return Err(err),
                ErrorClass::RateLimited if last => {
                    error!(
                        %label,
                        %err,
                        attempts = self.max_attempts,
                        "rate limited on final retry; using fallback"
                    );
                }
                ErrorClass::RateLimited => {
                    let cooldown = self.backoff(attempt);
                    warn!(
                        %label,
                        %err,
                        attempt,
                        cooldown = %humantime::format_duration(cooldown),
                        "rate limited; backing off"
                    );
                    self.clock.sleep(cooldown).await;
                }
                ErrorClass::Transient if last => {
                    error!(
                        %label,
                        %err,
                        attempts = self.max_attempts,
                        "final retry failed; using fallback"
                    );
                }
                ErrorClass::Transient => {
                    warn!(%label, %err, attempt, "call failed; retrying");
                }
            }
        }
        Ok(fallback())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::cell::Cell;

    #[derive(Debug)]
    struct TestError(ErrorClass);

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }

    impl Classify for TestError {
        fn class(&self) -> ErrorClass {
            self.0
        }
    }

    fn policy(clock: &Arc<ManualClock>) -> RetryPolicy {
        RetryPolicy::new(&RetrySettings::default(), clock.clone())
    }

    #[test]
    fn permanent_rate_limit_falls_back_after_five_attempts() {
        let clock = Arc::new(ManualClock::at_timestamp(0));
        let calls = Cell::new(0u32);
        let result: Result<Vec<u8>, TestError> =
            futures::executor::block_on(policy(&clock).run("test", Vec::new, || {
                calls.set(calls.get() + 1);
                async { Err(TestError(ErrorClass::RateLimited)) }
            }));

        assert!(result.unwrap().is_empty());
        assert_eq!(calls.get(), 5);
        let secs: Vec<u64> = clock.sleeps().iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![60, 360, 660, 960]);
    }

    #[test]
    fn transient_errors_retry_without_sleeping() {
        let clock = Arc::new(ManualClock::at_timestamp(0));
        let calls = Cell::new(0u32);
        let result: Result<u32, TestError> =
            futures::executor::block_on(policy(&clock).run("test", || 0, || {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move {
                    if attempt < 3 {
                        Err(TestError(ErrorClass::Transient))
                    } else {
                        Ok(attempt)
                    }
                }
            }));

        assert_eq!(result.unwrap(), 3);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn transient_exhaustion_returns_fallback() {
        let clock = Arc::new(ManualClock::at_timestamp(0));
        let calls = Cell::new(0u32);
        let result: Result<&str, TestError> =
            futures::executor::block_on(policy(&clock).run("test", || "fallback", || {
                calls.set(calls.get() + 1);
                async { Err(TestError(ErrorClass::Transient)) }
            }));

        assert_eq!(result.unwrap(), "fallback");
        assert_eq!(calls.get(), 5);
    }

    #[test]
    fn fatal_errors_propagate_immediately() {
        let clock = Arc::new(ManualClock::at_timestamp(0));
        let calls = Cell::new(0u32);
        let result: Result<(), TestError> =
            futures::executor::block_on(policy(&clock).run("test", || (), || {
                calls.set(calls.get() + 1);
                async { Err(TestError(ErrorClass::Fatal)) }
            }));

        assert!(matches!(result, Err(TestError(ErrorClass::Fatal))));
        assert_eq!(calls.get(), 1);
        assert!(clock.sleeps().is_empty());
    }
}
