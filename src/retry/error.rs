//! Error types for retry operations.

use std::time::Duration;

/// Error returned when a policy is built from invalid raw values.
///
/// Raised before the wrapped operation ever runs, so a bad configuration
/// never shows up as a confusing failure in the middle of a retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// A millisecond field was negative.
    NegativeDuration {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: i64,
    },
    /// The retry count was negative or does not fit in a `u32`.
    InvalidRetryCount(i64),
    /// The jitter factor was not a finite number in `0.0..=1.0`.
    InvalidJitter(f64),
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegativeDuration { field, value } => {
                write!(f, "{} must not be negative, got {}", field, value)
            }
            Self::InvalidRetryCount(n) => {
                write!(f, "max_retries must be between 0 and {}, got {}", u32::MAX, n)
            }
            Self::InvalidJitter(factor) => {
                write!(f, "jitter factor must be within 0.0..=1.0, got {}", factor)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// Error returned when all retry attempts are exhausted.
///
/// Carries the final error along with metadata about the retry sequence.
/// Returned by [`RetryExecutor::execute_reporting`](super::RetryExecutor::execute_reporting);
/// the plain `execute` hands back the final error untouched.
///
/// # Examples
///
/// ```rust
/// use backoff_verify::{RetryExecutor, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let policy = RetryPolicy::exponential(Duration::from_millis(1)).with_max_retries(2);
///
/// let exhausted = RetryExecutor::new(policy)
///     .execute_reporting(|| async { Err::<(), _>("always fails") })
///     .await
///     .unwrap_err();
///
/// assert_eq!(exhausted.final_error, "always fails");
/// assert_eq!(exhausted.attempts, 3); // 1 initial + 2 retries
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// The error from the final attempt.
    pub final_error: E,
    /// Total number of attempts made (initial + retries).
    pub attempts: u32,
    /// Total time spent, including the initial delay.
    pub total_duration: Duration,
}

impl<E> RetryExhausted<E> {
    /// Create a new RetryExhausted error.
    pub fn new(final_error: E, attempts: u32, total_duration: Duration) -> Self {
        Self {
            final_error,
            attempts,
            total_duration,
        }
    }

    /// Extract the final error, discarding metadata.
    pub fn into_error(self) -> E {
        self.final_error
    }

    /// Get a reference to the final error.
    pub fn error(&self) -> &E {
        &self.final_error
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed after {} attempts ({:?}): {}",
            self.attempts, self.total_duration, self.final_error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.final_error)
    }
}

/// Error returned by a cancellable retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupted<E> {
    /// The cancellation token fired before the operation settled.
    Cancelled {
        /// Attempts that ran before cancellation.
        attempts: u32,
    },
    /// The final permitted attempt failed.
    Failed(E),
}

impl<E> Interrupted<E> {
    /// Returns true if the loop was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Get the operation's error if the loop ran to exhaustion.
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Cancelled { .. } => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for Interrupted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled { attempts } => {
                write!(f, "retry cancelled after {} attempts", attempts)
            }
            Self::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Interrupted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Cancelled { .. } => None,
            Self::Failed(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_retry_exhausted_display() {
        let err = RetryExhausted::new("explorer has not indexed", 11, Duration::from_secs(90));
        let display = format!("{}", err);
        assert!(display.contains("failed after 11 attempts"));
        assert!(display.contains("explorer has not indexed"));
    }

    #[test]
    fn test_retry_exhausted_into_error() {
        let err = RetryExhausted::new("test error", 5, Duration::from_secs(1));
        assert_eq!(err.error(), &"test error");
        assert_eq!(err.into_error(), "test error");
    }

    #[test]
    fn test_retry_exhausted_source() {
        use std::error::Error;

        let inner = std::io::Error::other("boom");
        let err = RetryExhausted::new(inner, 2, Duration::ZERO);
        assert_eq!(err.source().unwrap().to_string(), "boom");
    }

    #[test]
    fn test_interrupted_cancelled() {
        let err: Interrupted<String> = Interrupted::Cancelled { attempts: 2 };
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "retry cancelled after 2 attempts");
        assert!(err.into_failure().is_none());
    }

    #[test]
    fn test_interrupted_failed() {
        let err = Interrupted::Failed("failed".to_string());
        assert!(!err.is_cancelled());
        assert_eq!(format!("{}", err), "failed");
        assert_eq!(err.into_failure(), Some("failed".to_string()));
    }

    #[test]
    fn test_policy_error_display() {
        let err = PolicyError::NegativeDuration {
            field: "base_backoff_ms",
            value: -5,
        };
        assert_eq!(err.to_string(), "base_backoff_ms must not be negative, got -5");
        assert!(PolicyError::InvalidJitter(2.0).to_string().contains("2"));
    }
}
