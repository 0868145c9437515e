//! Exponential-backoff retries for asynchronous operations.
//!
//! - [`RetryPolicy`] is plain data: base backoff, retry budget, one-time
//!   initial delay, plus an opt-in cap and jitter.
//! - [`RetryExecutor`] runs an operation under a policy: sleep the initial
//!   delay once, attempt, and on failure wait `base * 2^i` before attempt
//!   `i + 1`, until the operation succeeds or `max_retries + 1` attempts
//!   have failed.
//!
//! # Quick Start
//!
//! ```rust
//! use backoff_verify::{RetryExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::exponential(Duration::from_millis(10))
//!     .with_max_retries(3);
//!
//! let result = RetryExecutor::new(policy)
//!     .execute(|| async { Ok::<_, String>(42) })
//!     .await;
//!
//! assert_eq!(result, Ok(42));
//! # });
//! ```
//!
//! # Jitter Support
//!
//! Delays follow the exponential schedule exactly unless jitter is requested.
//! Enable the `jitter` feature for randomized delays:
//!
//! ```toml
//! backoff-verify = { version = "...", features = ["jitter"] }
//! ```
//!
//! # Error Types
//!
//! - [`PolicyError`]: raw policy values were invalid
//! - [`RetryExhausted`]: the final error plus attempt metadata
//! - [`Interrupted`]: a cancellable loop was cancelled or exhausted

#[cfg(feature = "serde")]
mod config;
mod error;
#[cfg(feature = "async")]
mod executor;
mod policy;

pub use error::{Interrupted, PolicyError, RetryExhausted};
#[cfg(feature = "async")]
pub use executor::{backoff_retry, BackoffError, RetryExecutor};
pub use policy::{
    JitterStrategy, RetryEvent, RetryPolicy, DEFAULT_BASE_BACKOFF, DEFAULT_MAX_RETRIES,
    EXPLORER_BASE_BACKOFF, EXPLORER_INITIAL_DELAY, EXPLORER_MAX_RETRIES,
};
