//! Test doubles for retry and deploy flows.
//!
//! - [`FlakyOperation`]: an operation that fails a scripted number of times
//!   and records when each call happened, for checking attempt counts and
//!   backoff spacing.
//! - [`MockChain`]: an in-memory [`ContractProvider`] and [`Verifier`] with a
//!   scriptable explorer indexing lag.
//!
//! Call times come from `tokio::time::Instant`, so tests running with a paused
//! clock observe exact, virtual delays.
//!
//! # Example
//!
//! ```rust
//! use backoff_verify::testing::FlakyOperation;
//! use backoff_verify::{RetryExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let op = FlakyOperation::failing_times(2);
//! let executor = RetryExecutor::new(RetryPolicy::exponential(Duration::from_millis(1)));
//!
//! assert_eq!(executor.execute(|| op.call()).await, Ok(3));
//! assert_eq!(op.calls(), 3);
//! # });
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::{ready, Ready};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::args::{AbiType, ConstructorArg};
use crate::deploy::{ContractProvider, Deployment, Verifier};

/// Error produced by a failing [`FlakyOperation`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlakyError {
    /// Which call failed (1-indexed).
    pub call: u32,
}

impl fmt::Display for FlakyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scripted failure on call {}", self.call)
    }
}

impl std::error::Error for FlakyError {}

/// An operation that fails a fixed number of times, then succeeds.
///
/// Successful calls resolve to their 1-indexed call number.
#[derive(Debug)]
pub struct FlakyOperation {
    failures: Option<u32>,
    calls: AtomicU32,
    origin: Instant,
    started: Mutex<Vec<Instant>>,
}

impl FlakyOperation {
    /// Fail the first `n` calls, succeed afterwards.
    pub fn failing_times(n: u32) -> Self {
        Self::scripted(Some(n))
    }

    /// Fail every call.
    pub fn always_failing() -> Self {
        Self::scripted(None)
    }

    fn scripted(failures: Option<u32>) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            origin: Instant::now(),
            started: Mutex::new(Vec::new()),
        }
    }

    /// Run one attempt.
    pub fn call(&self) -> Ready<Result<u32, FlakyError>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.started).push(Instant::now());

        match self.failures {
            Some(n) if call > n => ready(Ok(call)),
            _ => ready(Err(FlakyError { call })),
        }
    }

    /// Number of attempts made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// When each call happened, relative to construction.
    pub fn call_offsets(&self) -> Vec<Duration> {
        lock(&self.started)
            .iter()
            .map(|t| t.duration_since(self.origin))
            .collect()
    }

    /// Time between consecutive calls.
    pub fn gaps(&self) -> Vec<Duration> {
        let started = lock(&self.started);
        started
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]))
            .collect()
    }
}

/// Error produced by [`MockChain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockError {
    /// No contract with this name was registered.
    UnknownContract(String),
    /// The explorer has not indexed the contract at this address yet.
    NotIndexed(String),
}

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockError::UnknownContract(name) => write!(f, "unknown contract: {}", name),
            MockError::NotIndexed(address) => {
                write!(f, "contract at {} is not indexed yet", address)
            }
        }
    }
}

impl std::error::Error for MockError {}

/// A contract deployed or verified on a [`MockChain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    /// Contract name. Empty for verifications.
    pub name: String,
    /// Address of the contract.
    pub address: String,
    /// Constructor arguments it was deployed or verified with.
    pub arguments: Vec<ConstructorArg>,
}

/// In-memory contract provider and block explorer.
///
/// Contracts must be registered with [`with_contract`](Self::with_contract)
/// before they can be deployed. Deployed addresses are sequential. The
/// initializer encoding is the readable `Name.function(arg,arg)` rather than
/// real calldata.
#[derive(Debug)]
pub struct MockChain {
    contracts: HashMap<String, Vec<AbiType>>,
    verification_failures: Option<u32>,
    verify_attempts: AtomicU32,
    deployments: Mutex<Vec<Recorded>>,
    verified: Mutex<Vec<Recorded>>,
}

impl MockChain {
    /// An empty chain whose explorer accepts verification immediately.
    pub fn new() -> Self {
        Self {
            contracts: HashMap::new(),
            verification_failures: Some(0),
            verify_attempts: AtomicU32::new(0),
            deployments: Mutex::new(Vec::new()),
            verified: Mutex::new(Vec::new()),
        }
    }

    /// Register a contract and its constructor parameter types.
    pub fn with_contract(mut self, name: impl Into<String>, inputs: Vec<AbiType>) -> Self {
        self.contracts.insert(name.into(), inputs);
        self
    }

    /// Reject the first `n` verification attempts as not indexed.
    pub fn failing_verification(mut self, n: u32) -> Self {
        self.verification_failures = Some(n);
        self
    }

    /// Reject every verification attempt.
    pub fn rejecting_verification(mut self) -> Self {
        self.verification_failures = None;
        self
    }

    /// Verification attempts made so far, successful or not.
    pub fn verify_attempts(&self) -> u32 {
        self.verify_attempts.load(Ordering::SeqCst)
    }

    /// Every deployment, in order.
    pub fn deployments(&self) -> Vec<Recorded> {
        lock(&self.deployments).clone()
    }

    /// Every successful verification, in order.
    pub fn verified(&self) -> Vec<Recorded> {
        lock(&self.verified).clone()
    }

    fn inputs(&self, name: &str) -> Result<&Vec<AbiType>, MockError> {
        self.contracts
            .get(name)
            .ok_or_else(|| MockError::UnknownContract(name.to_owned()))
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractProvider for MockChain {
    type Error = MockError;

    async fn constructor_inputs(&self, name: &str) -> Result<Vec<AbiType>, MockError> {
        self.inputs(name).cloned()
    }

    async fn encode_initializer(
        &self,
        name: &str,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, MockError> {
        self.inputs(name)?;
        Ok(format!("{}.{}({})", name, function, args.join(",")).into_bytes())
    }

    async fn deploy(&self, name: &str, args: &[ConstructorArg]) -> Result<Deployment, MockError> {
        self.inputs(name)?;
        let mut deployments = lock(&self.deployments);
        let address = format!("0x{:040x}", deployments.len() + 1);
        deployments.push(Recorded {
            name: name.to_owned(),
            address: address.clone(),
            arguments: args.to_vec(),
        });
        Ok(Deployment { address })
    }
}

impl Verifier for MockChain {
    type Error = MockError;

    async fn verify(&self, address: &str, constructor_args: &[ConstructorArg]) -> Result<(), MockError> {
        let attempt = self.verify_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match self.verification_failures {
            Some(n) if attempt > n => {
                lock(&self.verified).push(Recorded {
                    name: String::new(),
                    address: address.to_owned(),
                    arguments: constructor_args.to_vec(),
                });
                Ok(())
            }
            _ => Err(MockError::NotIndexed(address.to_owned())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_flaky_operation_script() {
        let op = FlakyOperation::failing_times(1);

        assert_eq!(op.call().await, Err(FlakyError { call: 1 }));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(op.call().await, Ok(2));
        assert_eq!(op.calls(), 2);
        assert_eq!(op.gaps(), vec![Duration::from_millis(30)]);
    }

    #[tokio::test]
    async fn test_always_failing() {
        let op = FlakyOperation::always_failing();
        for expected in 1..=5 {
            assert_eq!(op.call().await, Err(FlakyError { call: expected }));
        }
    }

    #[tokio::test]
    async fn test_mock_chain_sequential_addresses() {
        let chain = MockChain::new().with_contract("A", Vec::new());

        let first = chain.deploy("A", &[]).await.unwrap();
        let second = chain.deploy("A", &[]).await.unwrap();

        assert_eq!(first.address, format!("0x{:040x}", 1));
        assert_eq!(second.address, format!("0x{:040x}", 2));
        assert_eq!(first.address.len(), 42);
    }

    #[tokio::test]
    async fn test_mock_chain_verification_lag() {
        let chain = MockChain::new().failing_verification(2);

        assert!(chain.verify("0x01", &[]).await.is_err());
        assert!(chain.verify("0x01", &[]).await.is_err());
        assert!(chain.verify("0x01", &[]).await.is_ok());
        assert_eq!(chain.verify_attempts(), 3);
        assert_eq!(chain.verified().len(), 1);
    }
}
