//! # backoff-verify
//!
//! Deploy smart contracts and upgradeable proxies, then verify them on a block
//! explorer, retrying verification with exponential backoff while the explorer
//! catches up with the chain.
//!
//! The reusable piece is the retry executor in [`retry`]. The deploy tasks in
//! [`deploy`] sequence a [`ContractProvider`](deploy::ContractProvider) and a
//! [`Verifier`](deploy::Verifier) that callers supply; compiling, signing, and
//! RPC live behind those traits.
//!
//! ## Quick Example
//!
//! ```rust
//! use backoff_verify::{backoff_retry, BackoffError};
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! # tokio_test::block_on(async {
//! let polls = &AtomicU32::new(0);
//!
//! // 1ms base backoff, up to 5 retries, no initial delay
//! let result = backoff_retry(
//!     move || async move {
//!         match polls.fetch_add(1, Ordering::SeqCst) {
//!             0 | 1 => Err("contract not indexed yet"),
//!             _ => Ok("verified"),
//!         }
//!     },
//!     1,
//!     5,
//!     0,
//! )
//! .await;
//!
//! assert_eq!(result, Ok("verified"));
//! assert_eq!(polls.load(Ordering::SeqCst), 3);
//! # });
//! ```
//!
//! ## Features
//!
//! - `async` (default): the executor and deploy tasks, on `tokio`
//! - `tracing`: log retries and deployment steps through `tracing`
//! - `jitter`: randomized backoff delays
//! - `serde`: deserialize a [`RetryPolicy`] from config

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod args;
#[cfg(feature = "async")]
pub mod deploy;
pub mod retry;
#[cfg(feature = "async")]
pub mod testing;

// Re-exports
pub use args::{ArgumentError, ConstructorArg};
pub use retry::{Interrupted, JitterStrategy, PolicyError, RetryEvent, RetryExhausted, RetryPolicy};
#[cfg(feature = "async")]
pub use retry::{backoff_retry, BackoffError, RetryExecutor};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::args::{parse_arguments, split_string_array, AbiType, ConstructorArg};
    #[cfg(feature = "async")]
    pub use crate::deploy::{
        deploy_proxy, deploy_smart_contract, verify_deployment, ContractProvider, DeployContract,
        DeployError, DeployProxy, Deployment, Verifier,
    };
    #[cfg(feature = "async")]
    pub use crate::retry::RetryExecutor;
    pub use crate::retry::{RetryExhausted, RetryPolicy};
}
