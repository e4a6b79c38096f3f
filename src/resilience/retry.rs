//! Shared retry policy: capped exponential backoff with jitter.
//!
//! One [`RetryPolicy`] serves every backend. Each call runs the state machine
//!
//! ```text
//! Attempting(n) --ok--------------------------> Succeeded
//! Attempting(n) --fatal-----------------------> Failed
//! Attempting(n) --retryable, n == max---------> Failed (exhausted)
//! Attempting(n) --retryable, n <  max---------> Backoff(n, delay) --> Attempting(n+1)
//! ```
//!
//! Sleeps go through the injected [`Clock`], so tests never wait for real.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first; never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Where a single `run` currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Failed { attempts: u32, exhausted: bool },
}

/// Source of the jitter factor applied to computed delays.
pub trait Jitter: Send + Sync + std::fmt::Debug {
    /// A factor in `[0.5, 1.0]`.
    fn factor(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn factor(&self) -> f64 {
        rand::thread_rng().gen_range(0.5..=1.0)
    }
}

/// Always `1.0`; used when jitter is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn factor(&self) -> f64 {
        1.0
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn Jitter>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(mut config: RetryConfig) -> Self {
        config.max_attempts = config.max_attempts.max(1);
        let jitter: Arc<dyn Jitter> = if config.jitter {
            Arc::new(RandomJitter)
        } else {
            Arc::new(NoJitter)
        };
        Self {
            config,
            clock: Arc::new(SystemClock),
            jitter,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before attempt `attempt + 1`, after attempt `attempt` (1-based) failed.
    ///
    /// A provider hint replaces the computed delay and is not jittered; both are
    /// capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        if let Some(ms) = retry_after_ms {
            return Duration::from_millis(ms).min(self.config.max_delay);
        }
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        let exp = self
            .config
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay);
        exp.mul_f64(self.jitter.factor().clamp(0.5, 1.0))
    }

    /// Transition out of `Attempting { attempt }` given that attempt's outcome.
    pub fn after_attempt<T>(&self, attempt: u32, outcome: &Result<T>) -> RetryState {
        match outcome {
            Ok(_) => RetryState::Succeeded { attempts: attempt },
            Err(e) if !e.is_retryable() => RetryState::Failed {
                attempts: attempt,
                exhausted: false,
            },
            Err(_) if attempt >= self.config.max_attempts => RetryState::Failed {
                attempts: attempt,
                exhausted: true,
            },
            Err(e) => RetryState::Backoff {
                attempt,
                delay: self.backoff_delay(attempt, e.retry_after_ms()),
            },
        }
    }

    /// Runs `operation` until it succeeds, fails fatally or runs out of
    /// attempts. The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = RetryState::Attempting { attempt: 1 };
        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    let outcome = operation(attempt).await;
                    match (self.after_attempt(attempt, &outcome), outcome) {
                        (next @ RetryState::Backoff { delay, .. }, Err(e)) => {
                            warn!(
                                attempt,
                                max_attempts = self.config.max_attempts,
                                delay_ms = delay.as_millis() as u64,
                                failure = e.kind(),
                                error = %e,
                                "backend call failed, backing off"
                            );
                            next
                        }
                        (RetryState::Failed { attempts, exhausted: true }, Err(e)) => {
                            info!(attempts, error = %e, "retries exhausted");
                            return Err(Error::RetryExhausted {
                                attempts,
                                last: Box::new(e),
                            });
                        }
                        (RetryState::Succeeded { attempts }, outcome) if attempts > 1 => {
                            info!(attempts, "backend call succeeded after retry");
                            return outcome;
                        }
                        (_, outcome) => return outcome,
                    }
                }
                RetryState::Backoff { attempt, delay } => {
                    self.clock.sleep(delay).await;
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Succeeded { .. } | RetryState::Failed { .. } => {
                    unreachable!("terminal retry states return from the attempting arm")
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::FailureClass;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FixedJitter(f64);

    impl Jitter for FixedJitter {
        fn factor(&self) -> f64 {
            self.0
        }
    }

    fn policy(max_attempts: u32) -> (RetryPolicy, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let policy = RetryPolicy::new(
            RetryConfig::new()
                .with_max_attempts(max_attempts)
                .with_base_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_millis(1000))
                .with_jitter(false),
        )
        .with_clock(clock.clone());
        (policy, clock)
    }

    fn transient() -> Error {
        Error::backend(FailureClass::Transient, "openai", "gpt-4o", "503", None)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let (policy, _) = policy(10);
        let delays: Vec<u64> = (1..=6)
            .map(|n| policy.backoff_delay(n, None).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
        assert_eq!(policy.backoff_delay(64, None), Duration::from_millis(1000));
    }

    #[test]
    fn test_retry_after_hint_replaces_delay() {
        let (policy, _) = policy(10);
        assert_eq!(policy.backoff_delay(1, Some(700)), Duration::from_millis(700));
        assert_eq!(policy.backoff_delay(1, Some(90_000)), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let (policy, _) = policy(10);
        let low = policy.clone().with_jitter(Arc::new(FixedJitter(0.5)));
        assert_eq!(low.backoff_delay(2, None), Duration::from_millis(100));

        let random = policy.with_jitter(Arc::new(RandomJitter));
        for _ in 0..100 {
            let d = random.backoff_delay(3, None);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_state_transitions() {
        let (policy, _) = policy(3);
        assert_eq!(
            policy.after_attempt(1, &Ok::<_, Error>(())),
            RetryState::Succeeded { attempts: 1 }
        );
        assert_eq!(
            policy.after_attempt::<()>(1, &Err(transient())),
            RetryState::Backoff {
                attempt: 1,
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(
            policy.after_attempt::<()>(3, &Err(transient())),
            RetryState::Failed {
                attempts: 3,
                exhausted: true
            }
        );
        let fatal = Error::backend(FailureClass::Fatal, "openai", "gpt-4o", "401", None);
        assert_eq!(
            policy.after_attempt::<()>(1, &Err(fatal)),
            RetryState::Failed {
                attempts: 1,
                exhausted: false
            }
        );
    }

    #[tokio::test]
    async fn test_run_succeeds_after_transient_failures() {
        let (policy, clock) = policy(5);
        let calls = AtomicU32::new(0);
        let out = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(transient())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn test_run_exhausts_attempts() {
        let (policy, clock) = policy(4);
        let calls = AtomicU32::new(0);
        let err = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(transient()) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(clock.sleeps().len(), 3);
        match err {
            Error::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert_eq!(last.failure_class(), Some(FailureClass::Transient));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_honours_rate_limit_hint() {
        let (policy, clock) = policy(2);
        let _ = policy
            .run(|_| async {
                Err::<(), _>(Error::backend(
                    FailureClass::RateLimited,
                    "openai",
                    "gpt-4o",
                    "429",
                    Some(250),
                ))
            })
            .await;
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250)]);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let (policy, clock) = policy(5);
        let calls = AtomicU32::new(0);
        let err = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(Error::backend(
                        FailureClass::Fatal,
                        "anthropic",
                        "claude",
                        "invalid x-api-key",
                        None,
                    ))
                }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());
        assert_eq!(err.failure_class(), Some(FailureClass::Fatal));
    }
}
