//! Retry Executor
//!
//! Runs an async operation up to `max_attempts` times with capped exponential
//! backoff and random jitter. Cancellation is checked before every attempt and
//! before every sleep, and interrupts both the attempt and the sleep.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ConfigError, FetchError, Result};

// == Constants ==
/// Hard ceiling for any computed sleep.
pub const MAX_SLEEP: Duration = Duration::from_secs(24 * 60 * 60);

/// Maps an attempt number (1-based) to a delay in seconds.
pub type BackoffFn = Arc<dyn Fn(u32) -> f64 + Send + Sync>;
/// Decides whether an error is worth another attempt.
pub type RetryPredicate = Arc<dyn Fn(&FetchError) -> bool + Send + Sync>;

// == Retry Policy ==
/// Immutable retry settings.
///
/// The default policy makes 4 attempts, waits `2^attempt` seconds capped at
/// 60s plus up to 0.5s of jitter, and retries only connectivity failures and
/// timeouts.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    retryable: RetryPredicate,
    backoff: BackoffFn,
    max_delay: Duration,
    jitter: Duration,
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    pub fn is_retryable(&self, error: &FetchError) -> bool {
        (self.retryable)(error)
    }

    // == Delay ==
    /// Sleep before the attempt following failed attempt `attempt`.
    ///
    /// `jitter_fraction` is a sample from `[0, 1)`. Backoff values that are
    /// NaN fall back to `max_delay`; the sum is clamped to [`MAX_SLEEP`].
    pub fn delay_for_attempt(&self, attempt: u32, jitter_fraction: f64) -> Duration {
        let cap = self.max_delay.as_secs_f64();
        let raw = (self.backoff)(attempt);
        let base = if raw.is_nan() { cap } else { raw.clamp(0.0, cap) };

        let fraction = if jitter_fraction.is_finite() {
            jitter_fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let total = base + self.jitter.as_secs_f64() * fraction;

        if !total.is_finite() {
            return MAX_SLEEP;
        }
        Duration::from_secs_f64(total.clamp(0.0, MAX_SLEEP.as_secs_f64()))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            retryable: Arc::new(FetchError::is_retryable),
            backoff: Arc::new(exponential_backoff),
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_millis(500),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

/// `2^attempt` seconds.
pub fn exponential_backoff(attempt: u32) -> f64 {
    2f64.powf(attempt as f64)
}

// == Builder ==
/// Builds a validated [`RetryPolicy`], starting from the defaults.
#[derive(Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.policy.max_delay = max_delay;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.policy.jitter = jitter;
        self
    }

    pub fn backoff(mut self, backoff: impl Fn(u32) -> f64 + Send + Sync + 'static) -> Self {
        self.policy.backoff = Arc::new(backoff);
        self
    }

    pub fn retry_if(
        mut self,
        predicate: impl Fn(&FetchError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.policy.retryable = Arc::new(predicate);
        self
    }

    /// # Errors
    /// Zero attempts, or a delay setting above [`MAX_SLEEP`].
    pub fn build(self) -> std::result::Result<RetryPolicy, ConfigError> {
        if self.policy.max_attempts == 0 {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        for (field, value) in [
            ("max_delay", self.policy.max_delay),
            ("jitter", self.policy.jitter),
        ] {
            if value > MAX_SLEEP {
                return Err(ConfigError::InvalidDuration {
                    field,
                    reason: format!("must not exceed {}s", MAX_SLEEP.as_secs()),
                });
            }
        }
        Ok(self.policy)
    }
}

// == Execute ==
/// Runs `operation` under `policy` until it succeeds, fails permanently, runs
/// out of attempts or `cancel` fires.
///
/// `operation` receives the 1-based attempt number. The last error is returned
/// as is when attempts run out.
pub async fn execute<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            outcome = operation(attempt) => outcome,
        };

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !policy.is_retryable(&error) {
            debug!(attempt, error = %error, "Non-retryable failure");
            return Err(error);
        }
        if attempt >= policy.max_attempts() {
            warn!(attempt, error = %error, "Giving up after final attempt");
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt, rand::random::<f64>());
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        warn!(
            attempt,
            max_attempts = policy.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
