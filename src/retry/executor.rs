//! The retry loop.
//!
//! Every public entry point funnels into a single loop: an optional one-time
//! initial delay, then attempt, then either return or sleep for the next
//! backoff. Waits are `tokio` timers, so only the calling task is suspended.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::{Interrupted, RetryExhausted};
use super::policy::{RetryEvent, RetryPolicy};

/// Runs an asynchronous operation under a [`RetryPolicy`].
///
/// The operation is a factory closure: each attempt calls it again and awaits
/// a fresh future, so whatever it does must be safe to repeat. Polling a block
/// explorer for a verification result is the typical case.
///
/// The executor holds only its policy. Separate invocations share nothing and
/// may run concurrently.
///
/// # Example
///
/// ```rust
/// use backoff_verify::{RetryExecutor, RetryPolicy};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let calls = &AtomicU32::new(0);
/// let executor = RetryExecutor::new(RetryPolicy::exponential(Duration::from_millis(1)));
///
/// let value = executor
///     .execute(move || async move {
///         if calls.fetch_add(1, Ordering::SeqCst) < 2 {
///             Err("not indexed yet")
///         } else {
///             Ok(42)
///         }
///     })
///     .await;
///
/// assert_eq!(value, Ok(42));
/// assert_eq!(calls.load(Ordering::SeqCst), 3);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl From<RetryPolicy> for RetryExecutor {
    fn from(policy: RetryPolicy) -> Self {
        Self::new(policy)
    }
}

impl RetryExecutor {
    /// Create an executor for the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy this executor runs.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds or the retry budget is spent.
    ///
    /// The error from the final attempt is returned exactly as the operation
    /// produced it.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.drive(operation, |_: &E| true, |_: &RetryEvent<'_, E>| {}, &Uninterrupted)
            .await
            .map_err(Halt::into_error)
    }

    /// Like [`execute`](Self::execute), but only retries errors for which
    /// `should_retry` returns true. Other errors propagate immediately.
    pub async fn execute_if<T, E, F, Fut, P>(&self, operation: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        self.drive(operation, should_retry, |_: &RetryEvent<'_, E>| {}, &Uninterrupted)
            .await
            .map_err(Halt::into_error)
    }

    /// Like [`execute`](Self::execute), calling `on_retry` before each backoff wait.
    ///
    /// The hook is synchronous and should not block; use it for logging. It
    /// does not run for the terminal failure.
    pub async fn execute_with_hooks<T, E, F, Fut, H>(&self, operation: F, on_retry: H) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        H: FnMut(&RetryEvent<'_, E>),
    {
        self.drive(operation, |_: &E| true, on_retry, &Uninterrupted)
            .await
            .map_err(Halt::into_error)
    }

    /// Like [`execute`](Self::execute), but the terminal error carries the
    /// attempt count and total elapsed time.
    pub async fn execute_reporting<T, E, F, Fut>(
        &self,
        operation: F,
    ) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.drive(operation, |_: &E| true, |_: &RetryEvent<'_, E>| {}, &Uninterrupted)
            .await
            .map_err(Halt::into_exhausted)
    }

    /// Like [`execute_reporting`](Self::execute_reporting) with a retry hook.
    pub async fn execute_reporting_with_hooks<T, E, F, Fut, H>(
        &self,
        operation: F,
        on_retry: H,
    ) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        H: FnMut(&RetryEvent<'_, E>),
    {
        self.drive(operation, |_: &E| true, on_retry, &Uninterrupted)
            .await
            .map_err(Halt::into_exhausted)
    }

    /// Run `operation` until it succeeds, the budget is spent, or `token` fires.
    ///
    /// The token is checked before every attempt, and every wait races against
    /// it. An attempt already in flight is not interrupted.
    pub async fn execute_cancellable<T, E, F, Fut>(
        &self,
        operation: F,
        token: &CancellationToken,
    ) -> Result<T, Interrupted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.drive(operation, |_: &E| true, |_: &RetryEvent<'_, E>| {}, token)
            .await
            .map_err(|halt| match halt {
                Halt::Failed { error, .. } => Interrupted::Failed(error),
                Halt::Interrupted { attempts, .. } => Interrupted::Cancelled { attempts },
            })
    }

    async fn drive<T, E, F, Fut, P, H, I>(
        &self,
        mut operation: F,
        should_retry: P,
        mut on_retry: H,
        interrupt: &I,
    ) -> Result<T, Halt<E, I::Reason>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        H: FnMut(&RetryEvent<'_, E>),
        I: Interrupt,
    {
        let start = Instant::now();

        let initial_delay = self.policy.initial_delay();
        if !initial_delay.is_zero() {
            if let Err(reason) = interrupt.pause(initial_delay).await {
                return Err(Halt::interrupted(reason, 0));
            }
        }

        let mut attempt = 0u32;
        loop {
            if let Err(reason) = interrupt.check() {
                return Err(Halt::interrupted(reason, attempt));
            }

            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let next_delay = if should_retry(&error) {
                self.policy.delay_with_jitter(attempt)
            } else {
                None
            };
            let Some(delay) = next_delay else {
                return Err(Halt::failed(error, attempt + 1, start));
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "attempt failed, backing off"
            );

            on_retry(&RetryEvent {
                attempt: attempt + 1,
                error: &error,
                next_delay: delay,
                elapsed: start.elapsed(),
            });
            drop(error);

            attempt += 1;
            if let Err(reason) = interrupt.pause(delay).await {
                return Err(Halt::interrupted(reason, attempt));
            }
        }
    }
}

/// Run `operation` with exponential backoff from raw millisecond values.
///
/// `backoff_retry(op, 250, 5, 0)` is equivalent to
/// `RetryExecutor::default().execute(op)`. Negative values are rejected up
/// front; the operation's own error comes back untouched.
///
/// ```rust
/// use backoff_verify::{backoff_retry, BackoffError};
///
/// # tokio_test::block_on(async {
/// let result = backoff_retry(|| async { Ok::<_, &str>("ok") }, 250, 5, 0).await;
/// assert_eq!(result, Ok("ok"));
///
/// let result = backoff_retry(|| async { Ok::<_, &str>(()) }, 250, -1, 0).await;
/// assert!(matches!(result, Err(BackoffError::Policy(_))));
/// # });
/// ```
pub async fn backoff_retry<T, E, F, Fut>(
    operation: F,
    base_backoff_ms: i64,
    max_retries: i64,
    initial_delay_ms: i64,
) -> Result<T, BackoffError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let policy = RetryPolicy::from_millis(base_backoff_ms, max_retries, initial_delay_ms)
        .map_err(BackoffError::Policy)?;
    RetryExecutor::new(policy)
        .execute(operation)
        .await
        .map_err(BackoffError::Operation)
}

/// Error returned by [`backoff_retry`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffError<E> {
    /// The raw policy values were invalid; the operation never ran.
    Policy(super::error::PolicyError),
    /// The operation's error from its final attempt.
    Operation(E),
}

impl<E: std::fmt::Display> std::fmt::Display for BackoffError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Policy(e) => write!(f, "invalid retry policy: {}", e),
            Self::Operation(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BackoffError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Policy(e) => Some(e),
            Self::Operation(e) => Some(e),
        }
    }
}

/// Why the loop stopped without a value.
enum Halt<E, R> {
    Failed {
        error: E,
        attempts: u32,
        elapsed: Duration,
    },
    Interrupted {
        reason: R,
        attempts: u32,
    },
}

impl<E, R> Halt<E, R> {
    fn failed(error: E, attempts: u32, start: Instant) -> Self {
        Self::Failed {
            error,
            attempts,
            elapsed: start.elapsed(),
        }
    }

    fn interrupted(reason: R, attempts: u32) -> Self {
        Self::Interrupted { reason, attempts }
    }
}

impl<E> Halt<E, Infallible> {
    fn into_error(self) -> E {
        match self {
            Self::Failed { error, .. } => error,
            Self::Interrupted { reason, .. } => match reason {},
        }
    }

    fn into_exhausted(self) -> RetryExhausted<E> {
        match self {
            Self::Failed {
                error,
                attempts,
                elapsed,
            } => RetryExhausted::new(error, attempts, elapsed),
            Self::Interrupted { reason, .. } => match reason {},
        }
    }
}

/// A source of interruption for the retry loop's suspension points.
trait Interrupt {
    type Reason;

    fn check(&self) -> Result<(), Self::Reason>;

    async fn pause(&self, delay: Duration) -> Result<(), Self::Reason>;
}

/// Never interrupts; plain sleeps.
struct Uninterrupted;

impl Interrupt for Uninterrupted {
    type Reason = Infallible;

    fn check(&self) -> Result<(), Infallible> {
        Ok(())
    }

    async fn pause(&self, delay: Duration) -> Result<(), Infallible> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

/// Marker reason for a fired cancellation token.
struct Cancelled;

impl Interrupt for CancellationToken {
    type Reason = Cancelled;

    fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    async fn pause(&self, delay: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
