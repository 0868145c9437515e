//! Retry policy types and configuration.

use std::time::Duration;

use super::error::PolicyError;

/// Default base backoff unit.
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(250);

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Initial delay used for block-explorer verification.
///
/// Explorers take a long time to index a freshly deployed contract, so the
/// first verification attempt is pushed back.
pub const EXPLORER_INITIAL_DELAY: Duration = Duration::from_secs(10);

/// Base backoff used for block-explorer verification.
pub const EXPLORER_BASE_BACKOFF: Duration = Duration::from_secs(5);

/// Retry budget used for block-explorer verification.
pub const EXPLORER_MAX_RETRIES: u32 = 10;

/// A retry policy describing how to retry a failed operation.
///
/// Policies are pure data. They describe the retry schedule but don't execute
/// it, which makes them easy to test and clone. The executor lives in
/// [`RetryExecutor`](super::RetryExecutor).
///
/// The delay before retry `i` (0-indexed) is `base_backoff * 2^i`. Growth is
/// unbounded unless [`with_max_delay`](Self::with_max_delay) is used; a caller
/// picking a large retry budget accepts correspondingly long waits.
///
/// # Examples
///
/// ```rust
/// use backoff_verify::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential(Duration::from_millis(100))
///     .with_max_retries(3)
///     .with_initial_delay(Duration::from_secs(1));
///
/// assert_eq!(policy.max_retries(), 3);
/// assert_eq!(policy.initial_delay(), Duration::from_secs(1));
/// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(400)));
/// assert_eq!(policy.delay_for_attempt(3), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(try_from = "super::config::PolicyConfig")
)]
pub struct RetryPolicy {
    base_backoff: Duration,
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Option<Duration>,
    jitter: JitterStrategy,
}

/// Strategy for adding randomness to delays.
///
/// Any strategy other than `None` may shorten a wait below the exponential
/// schedule. The randomness only applies with the `jitter` feature; without
/// it every strategy behaves like `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JitterStrategy {
    /// No jitter applied.
    #[default]
    None,
    /// Add ±percentage randomness to delay.
    Proportional(f64),
    /// Random delay between 0 and calculated delay.
    Full,
}

/// Information about a failed attempt, passed to retry hooks.
#[derive(Debug, Clone)]
pub struct RetryEvent<'a, E> {
    /// Which attempt just failed (1-indexed).
    pub attempt: u32,
    /// The error from the failed attempt.
    pub error: &'a E,
    /// Delay before the next attempt.
    pub next_delay: Duration,
    /// Total elapsed time since the executor was invoked.
    pub elapsed: Duration,
}

impl Default for RetryPolicy {
    /// 250ms base backoff, 5 retries, no initial delay.
    fn default() -> Self {
        Self::exponential(DEFAULT_BASE_BACKOFF)
    }
}

impl RetryPolicy {
    /// Create an exponential policy with the default retry budget and no
    /// initial delay.
    pub fn exponential(base_backoff: Duration) -> Self {
        Self {
            base_backoff,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::ZERO,
            max_delay: None,
            jitter: JitterStrategy::None,
        }
    }

    /// Policy for polling a block explorer until it has indexed a deployment.
    ///
    /// 10s initial delay, 5s base backoff, 10 retries.
    ///
    /// ```rust
    /// use backoff_verify::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::block_explorer();
    /// assert_eq!(policy.initial_delay(), Duration::from_secs(10));
    /// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_secs(5)));
    /// assert_eq!(policy.max_retries(), 10);
    /// ```
    pub fn block_explorer() -> Self {
        Self::exponential(EXPLORER_BASE_BACKOFF)
            .with_max_retries(EXPLORER_MAX_RETRIES)
            .with_initial_delay(EXPLORER_INITIAL_DELAY)
    }

    /// Build a policy from raw millisecond values, rejecting negative inputs
    /// before anything runs.
    ///
    /// ```rust
    /// use backoff_verify::{PolicyError, RetryPolicy};
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::from_millis(250, 5, 0).unwrap();
    /// assert_eq!(policy, RetryPolicy::default());
    ///
    /// assert!(matches!(
    ///     RetryPolicy::from_millis(250, -1, 0),
    ///     Err(PolicyError::InvalidRetryCount(-1))
    /// ));
    /// ```
    pub fn from_millis(
        base_backoff_ms: i64,
        max_retries: i64,
        initial_delay_ms: i64,
    ) -> Result<Self, PolicyError> {
        let base_backoff = millis("base_backoff_ms", base_backoff_ms)?;
        let initial_delay = millis("initial_delay_ms", initial_delay_ms)?;
        let max_retries =
            u32::try_from(max_retries).map_err(|_| PolicyError::InvalidRetryCount(max_retries))?;

        Ok(Self::exponential(base_backoff)
            .with_max_retries(max_retries)
            .with_initial_delay(initial_delay))
    }

    /// Set the maximum number of retry attempts.
    ///
    /// This does not include the initial attempt. `with_max_retries(3)` means
    /// up to 4 total attempts, and `with_max_retries(0)` means exactly one.
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the one-time delay before the first attempt.
    pub fn with_initial_delay(mut self, d: Duration) -> Self {
        self.initial_delay = d;
        self
    }

    /// Cap every backoff delay at `d`.
    ///
    /// ```rust
    /// use backoff_verify::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(Duration::from_millis(100))
    ///     .with_max_retries(10)
    ///     .with_max_delay(Duration::from_millis(500));
    ///
    /// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(400)));
    /// assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(500)));
    /// ```
    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = Some(d);
        self
    }

    /// Add proportional jitter to delays.
    ///
    /// `0.25` means the actual delay lands within ±25% of the calculated one.
    /// The factor is clamped to `0.0..=1.0`; NaN is treated as zero.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        let factor = if factor.is_nan() { 0.0 } else { factor };
        self.jitter = JitterStrategy::Proportional(factor.clamp(0.0, 1.0));
        self
    }

    /// Use full jitter: each delay is random between zero and the calculated one.
    pub fn with_full_jitter(mut self) -> Self {
        self.jitter = JitterStrategy::Full;
        self
    }

    /// Get the base backoff unit.
    pub fn base_backoff(&self) -> Duration {
        self.base_backoff
    }

    /// Get the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the initial delay.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Get the maximum delay cap.
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Get the jitter strategy.
    pub fn jitter(&self) -> &JitterStrategy {
        &self.jitter
    }

    /// Total number of times an always-failing operation runs under this policy.
    pub fn max_attempts(&self) -> u64 {
        u64::from(self.max_retries) + 1
    }

    /// Calculate the delay after failed attempt N (0-indexed), before jitter.
    ///
    /// Returns None once the retry budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }

        let delay = exponential(self.base_backoff, attempt);
        Some(match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        })
    }

    /// Calculate the delay with jitter applied.
    ///
    /// This is used internally by the retry executor.
    #[doc(hidden)]
    pub fn delay_with_jitter(&self, attempt: u32) -> Option<Duration> {
        let base_delay = self.delay_for_attempt(attempt)?;
        Some(self.jitter.apply(base_delay, self.max_delay))
    }
}

impl JitterStrategy {
    /// Apply jitter to a base delay, then re-apply the optional cap.
    pub fn apply(&self, base_delay: Duration, max_delay: Option<Duration>) -> Duration {
        let jittered = match self {
            JitterStrategy::None => base_delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Proportional(factor) => {
                use rand::Rng;
                let base_millis = base_delay.as_millis() as f64;
                let jitter_range = base_millis * factor;
                let min = (base_millis - jitter_range).max(0.0);
                let max = base_millis + jitter_range;
                if max <= min {
                    base_delay
                } else {
                    Duration::from_millis(rand::rng().random_range(min..=max) as u64)
                }
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Proportional(_) => base_delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Full => {
                use rand::Rng;
                let max_millis = u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX);
                if max_millis == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::rng().random_range(0..=max_millis))
                }
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Full => base_delay,
        };

        match max_delay {
            Some(max) => jittered.min(max),
            None => jittered,
        }
    }
}

/// `base * 2^attempt`, saturating at `Duration::MAX`.
fn exponential(base: Duration, attempt: u32) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;

    if base.is_zero() {
        return Duration::ZERO;
    }
    let Some(factor) = 1u128.checked_shl(attempt) else {
        return Duration::MAX;
    };
    let nanos = base.as_nanos().saturating_mul(factor);
    match u64::try_from(nanos / NANOS_PER_SEC) {
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}

fn millis(field: &'static str, value: i64) -> Result<Duration, PolicyError> {
    u64::try_from(value)
        .map(Duration::from_millis)
        .map_err(|_| PolicyError::NegativeDuration { field, value })
}
