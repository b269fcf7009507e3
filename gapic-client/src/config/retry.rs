//! Retry policies and the retrying call executor.
//!
//! The retry system consists of:
//! - [`RetryPolicy`]: which status codes to retry and how to back off
//! - [`ExponentialBackoff`]: iterator yielding sleep durations with jitter
//! - [`execute`]: runs an attempt factory under a policy, an idempotency
//!   gate, and an optional overall deadline
//!
//! # Which errors retry
//!
//! An attempt is retried only when its status code appears in the policy's
//! `retryable_codes`. Transport-level failures surface as
//! [`Code::Unavailable`] and so retry under the default policy; errors such
//! as `InvalidArgument` or `NotFound` return immediately.
//!
//! Whatever error finally ends the call is returned exactly as the last
//! attempt produced it, never wrapped in a retry-specific error.
//!
//! # Idempotency
//!
//! Methods declared [`Idempotency::NonIdempotent`] make a single attempt
//! regardless of the policy, unless the policy sets
//! [`retry_non_idempotent`](RetryPolicy::retry_non_idempotent). Retrying a
//! non-idempotent method is an explicit decision, never a default.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ConfigError;
use crate::error::ClientError;
use crate::method::Idempotency;
use gapic_core::Code;

/// Default backoff values, following the gRPC connection backoff
/// specification.
pub mod defaults {
    use std::time::Duration;

    use gapic_core::Code;

    /// Delay before the first retry.
    pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

    /// Multiplier for exponential backoff.
    pub const MULTIPLIER: f64 = 1.6;

    /// Jitter factor (0.2 means +/- 20%).
    pub const JITTER: f64 = 0.2;

    /// Ceiling on the delay between retries.
    pub const MAX_BACKOFF: Duration = Duration::from_secs(120);

    /// Total attempts, counting the initial one.
    pub const MAX_ATTEMPTS: u32 = 4;

    /// Status codes retried when a policy does not name its own.
    pub const RETRYABLE_CODES: &[Code] = &[Code::DeadlineExceeded, Code::Unavailable];
}

/// Configuration for retry behavior.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use gapic_client::RetryPolicy;
/// use gapic_core::Code;
///
/// // Use defaults
/// let policy = RetryPolicy::default();
///
/// // Custom configuration
/// let policy = RetryPolicy::new()
///     .max_attempts(6)
///     .initial_backoff(Duration::from_millis(100))
///     .max_backoff(Duration::from_secs(30))
///     .retryable_codes(&[Code::Unavailable, Code::Aborted]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Status codes that permit another attempt.
    pub retryable_codes: Vec<Code>,

    /// Delay before the first retry.
    pub initial_backoff: Duration,

    /// Ceiling on the delay between retries. No delay exceeds this value.
    pub max_backoff: Duration,

    /// Multiplier for exponential backoff. Must be >= 1.0.
    pub multiplier: f64,

    /// Jitter factor for randomizing delays, between 0.0 and 1.0.
    /// A value of 0.2 keeps each delay within +/- 20% of the schedule.
    pub jitter: f64,

    /// Total number of attempts, counting the initial one. Must be >= 1.
    pub max_attempts: u32,

    /// Permit retries for non-idempotent methods. Off by default; turning
    /// this on accepts that a retried call may duplicate side effects.
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retryable_codes: defaults::RETRYABLE_CODES.to_vec(),
            initial_backoff: defaults::INITIAL_BACKOFF,
            max_backoff: defaults::MAX_BACKOFF,
            multiplier: defaults::MULTIPLIER,
            jitter: defaults::JITTER,
            max_attempts: defaults::MAX_ATTEMPTS,
            retry_non_idempotent: false,
        }
    }
}

impl RetryPolicy {
    /// Create a new RetryPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a retry policy that never retries.
    ///
    /// Useful for disabling retries while keeping the retry infrastructure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Create a retry policy for aggressive retrying.
    ///
    /// Uses short delays suitable for latency-sensitive operations.
    /// - Initial backoff: 50ms
    /// - Max backoff: 1 second
    /// - Max attempts: 6
    pub fn aggressive() -> Self {
        Self {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            max_attempts: 6,
            ..Default::default()
        }
    }

    /// Create a retry policy for patient retrying.
    ///
    /// Uses long delays suitable for background operations.
    /// - Initial backoff: 2 seconds
    /// - Max backoff: 5 minutes
    /// - Max attempts: 11
    pub fn patient() -> Self {
        Self {
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(300),
            max_attempts: 11,
            ..Default::default()
        }
    }

    /// Set the status codes that permit another attempt.
    pub fn retryable_codes(mut self, codes: &[Code]) -> Self {
        self.retryable_codes = codes.to_vec();
        self
    }

    /// Set the total number of attempts, counting the initial one.
    ///
    /// # Panics
    ///
    /// Panics if `max_attempts` is zero.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        assert!(max_attempts >= 1, "max_attempts must be at least 1");
        self.max_attempts = max_attempts;
        self
    }

    /// Set the delay before the first retry.
    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Set the ceiling on the delay between retries.
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Set the backoff multiplier.
    ///
    /// # Panics
    ///
    /// Panics if `multiplier` is less than 1.0.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        assert!(multiplier >= 1.0, "multiplier must be >= 1.0");
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter factor.
    ///
    /// # Panics
    ///
    /// Panics if `jitter` is not between 0.0 and 1.0.
    pub fn jitter(mut self, jitter: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&jitter),
            "jitter must be between 0.0 and 1.0"
        );
        self.jitter = jitter;
        self
    }

    /// Permit retries for non-idempotent methods.
    pub fn retry_non_idempotent(mut self, allow: bool) -> Self {
        self.retry_non_idempotent = allow;
        self
    }

    /// Whether an attempt that failed with `code` may be retried.
    pub fn should_retry(&self, code: Code) -> bool {
        self.retryable_codes.contains(&code)
    }

    /// Validate the policy configuration.
    ///
    /// The builder methods uphold these rules already; this catches policies
    /// assembled from raw fields.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_attempts < 1 {
            return Err("max_attempts must be at least 1");
        }
        if self.initial_backoff > self.max_backoff {
            return Err("initial_backoff must not exceed max_backoff");
        }
        if self.multiplier < 1.0 {
            return Err("multiplier must be >= 1.0");
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("jitter must be between 0.0 and 1.0");
        }
        Ok(())
    }

    /// Create an ExponentialBackoff iterator from this policy.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.clone())
    }
}

/// Exponential backoff iterator with jitter.
///
/// Yields increasing sleep durations following
/// `initial_backoff * multiplier^(attempt - 1)`, clamped to the policy's
/// `max_backoff`, with +/- jitter applied.
///
/// # Example
///
/// ```
/// use gapic_client::RetryPolicy;
///
/// let policy = RetryPolicy::new().jitter(0.0); // No jitter for predictable output
/// let mut backoff = policy.backoff();
///
/// // First delay is the initial backoff
/// let delay1 = backoff.next_delay();
/// // Subsequent delays increase exponentially
/// let delay2 = backoff.next_delay();
/// assert!(delay2 >= delay1);
/// ```
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    /// Current delay without jitter, stored as f64 to avoid rounding errors.
    current_delay_secs: f64,
    /// The attempt currently in flight, starting at 1.
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new ExponentialBackoff from a RetryPolicy.
    pub fn new(policy: RetryPolicy) -> Self {
        let current_delay_secs = policy.initial_backoff.as_secs_f64();
        Self {
            policy,
            current_delay_secs,
            attempt: 1,
        }
    }

    /// Reset the backoff to its initial state.
    pub fn reset(&mut self) {
        self.current_delay_secs = self.policy.initial_backoff.as_secs_f64();
        self.attempt = 1;
    }

    /// The attempt currently in flight, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the policy allows an attempt after the current one.
    pub fn can_retry(&self) -> bool {
        self.attempt < self.policy.max_attempts
    }

    /// Get the next delay duration, applying jitter.
    ///
    /// Returns the delay to wait before the next attempt and advances the
    /// internal state.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay_secs;

        // Apply jitter: delay * (1 + jitter * random(-1, 1))
        let jittered = if self.policy.jitter > 0.0 {
            let jitter_range = self.policy.jitter * 2.0;
            let random_factor = rand::random::<f64>() * jitter_range - self.policy.jitter;
            delay * (1.0 + random_factor)
        } else {
            delay
        };

        // Clamp to max_backoff
        let clamped = jittered.min(self.policy.max_backoff.as_secs_f64());

        // Update for next iteration
        self.current_delay_secs = (self.current_delay_secs * self.policy.multiplier)
            .min(self.policy.max_backoff.as_secs_f64());
        self.attempt += 1;

        Duration::from_secs_f64(clamped.max(0.0))
    }
}

/// Run an attempt factory under a retry policy.
///
/// The factory is called with the attempt number, starting at 1. Attempts
/// continue while the policy allows them: the previous error's code must be
/// retryable under the policy, the attempt budget must not be exhausted,
/// and `idempotency` must permit a retry. When `deadline` is set, no sleep
/// is started that would end past it; the call then fails with the last
/// attempt's error.
///
/// The returned error is always the terminal attempt's error, verbatim.
///
/// ```ignore
/// let policy = RetryPolicy::default();
/// let response = execute(&policy, Idempotency::Idempotent, None, |_attempt| {
///     client.invoke(&request)
/// })
/// .await?;
/// ```
pub async fn execute<F, Fut, T>(
    policy: &RetryPolicy,
    idempotency: Idempotency,
    deadline: Option<Instant>,
    mut f: F,
) -> Result<T, ClientError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    if let Err(reason) = policy.validate() {
        return Err(ClientError::Config(ConfigError::InvalidValue {
            option: "retry".to_string(),
            reason: reason.to_string(),
        }));
    }

    let may_retry = idempotency.is_idempotent() || policy.retry_non_idempotent;
    let mut backoff = policy.backoff();

    loop {
        let error = match f(backoff.attempt()).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !may_retry || !backoff.can_retry() || !policy.should_retry(error.code()) {
            return Err(error);
        }

        let delay = backoff.next_delay();
        if let Some(deadline) = deadline {
            if Instant::now() + delay >= deadline {
                return Err(error);
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            error = %error,
            attempt = backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "retrying after transient error"
        );
        tokio::time::sleep(delay).await;
    }
}
