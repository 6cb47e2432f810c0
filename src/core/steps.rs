//! Named, retryable workflow steps
//!
//! A chat request runs as a short sequence of named steps. The [`StepRunner`]
//! decides how a step is executed: the binary uses [`LocalStepRunner`], which
//! runs steps in-process with a timeout and exponential backoff between
//! attempts. A step closure may be invoked more than once, so it must be safe
//! to re-run.

use std::future::Future;
use std::time::Duration;

use super::memory::MemoryError;

pub const FETCH_HISTORY: &str = "fetch-history";
pub const AI_INFERENCE: &str = "ai-inference";
pub const SAVE_TO_DB: &str = "save-to-db";

/// Error from a single step attempt
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),
}

/// A step that exhausted its attempts
#[derive(Debug, thiserror::Error)]
#[error("Step '{step}' failed after {attempts} attempt(s): {source}")]
pub struct StepFailed {
    pub step: &'static str,
    pub attempts: u32,
    #[source]
    pub source: StepError,
}

/// Executes a named step, possibly more than once
///
/// Steps own everything they capture, so the runner may hold them across
/// awaits and the returned future stays `Send`.
pub trait StepRunner: Send + Sync {
    fn run<T, F, Fut>(
        &self,
        name: &'static str,
        step: F,
    ) -> impl Future<Output = Result<T, StepFailed>> + Send
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, StepError>> + Send + 'static;
}

/// Retry policy for [`LocalStepRunner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPolicy {
    /// Total attempts per step, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub initial_backoff: Duration,
    /// Upper bound on a single attempt
    pub timeout: Duration,
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            timeout: Duration::from_secs(30),
        }
    }
}

/// In-process step runner
#[derive(Debug, Clone, Default)]
pub struct LocalStepRunner {
    policy: StepPolicy,
}

impl LocalStepRunner {
    pub fn new(policy: StepPolicy) -> Self {
        Self {
            policy: StepPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
        }
    }

    pub fn policy(&self) -> &StepPolicy {
        &self.policy
    }
}

impl StepRunner for LocalStepRunner {
    fn run<T, F, Fut>(
        &self,
        name: &'static str,
        step: F,
    ) -> impl Future<Output = Result<T, StepFailed>> + Send
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, StepError>> + Send + 'static,
    {
        async move {
            let policy = self.policy;
            let mut backoff = policy.initial_backoff;
            let mut attempt = 0;

            loop {
                attempt += 1;

                let result = match tokio::time::timeout(policy.timeout, step()).await {
                    Ok(result) => result,
                    Err(_) => Err(StepError::TimedOut(policy.timeout)),
                };

                match result {
                    Ok(value) => {
                        tracing::debug!(step = name, attempt, "Step completed");
                        return Ok(value);
                    }
                    Err(e) if attempt < policy.max_attempts => {
                        tracing::warn!(
                            step = name,
                            attempt,
                            error = %e,
                            "Step failed, retrying in {:?}",
                            backoff
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    }
                    Err(e) => {
                        tracing::error!(step = name, attempt, error = %e, "Step failed");
                        return Err(StepFailed {
                            step: name,
                            attempts: attempt,
                            source: e,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> StepPolicy {
        StepPolicy {
            max_attempts,
            initial_backoff: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_step_succeeds_first_time() {
        let runner = LocalStepRunner::new(fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = tokio_test::assert_ok!(
            runner
                .run(FETCH_HISTORY, move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, StepError>(42) }
                })
                .await
        );

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_step_retries_until_success() {
        let runner = LocalStepRunner::new(fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = runner
            .run(SAVE_TO_DB, move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(StepError::Memory(MemoryError::Database(sqlx::Error::PoolTimedOut)))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_step_gives_up_after_max_attempts() {
        let runner = LocalStepRunner::new(fast_policy(2));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = runner
            .run(SAVE_TO_DB, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(StepError::Memory(MemoryError::Database(
                        sqlx::Error::PoolClosed,
                    )))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.step, SAVE_TO_DB);
        assert_eq!(err.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_step_times_out() {
        let runner = LocalStepRunner::new(StepPolicy {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            timeout: Duration::from_millis(10),
        });

        let err = runner
            .run(FETCH_HISTORY, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StepError>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err.source, StepError::TimedOut(_)));
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let runner = LocalStepRunner::new(fast_policy(0));
        assert_eq!(runner.policy().max_attempts, 1);
    }
}
