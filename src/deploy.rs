//! Contract and proxy deployment with block-explorer verification.
//!
//! Compiling, signing, and talking to a node are left to a
//! [`ContractProvider`]; publishing source to an explorer is left to a
//! [`Verifier`]. This module sequences the two and wraps verification in a
//! [`RetryExecutor`], because explorers lag behind the chain and reject
//! verification of a contract they have not indexed yet.
//!
//! # Example
//!
//! ```rust
//! use backoff_verify::args::{split_string_array, AbiType};
//! use backoff_verify::deploy::{deploy_smart_contract, DeployContract};
//! use backoff_verify::testing::MockChain;
//! use backoff_verify::RetryPolicy;
//!
//! # tokio_test::block_on(async {
//! let chain = MockChain::new().with_contract("Token", vec![AbiType::String, AbiType::Uint256]);
//! let request = DeployContract::new("Token")
//!     .with_arguments(split_string_array("Gold,1000"))
//!     .with_verification(true);
//!
//! let address = deploy_smart_contract(&chain, &chain, &request, &RetryPolicy::default())
//!     .await
//!     .unwrap();
//!
//! assert_eq!(chain.verify_attempts(), 1);
//! assert_eq!(chain.deployments()[0].address, address);
//! # });
//! ```

use std::fmt;
use std::future::Future;

use crate::args::{parse_arguments, AbiType, ArgumentError, ConstructorArg};
use crate::retry::{RetryEvent, RetryExecutor, RetryExhausted, RetryPolicy};

/// Proxy contract deployed by [`deploy_proxy`] unless told otherwise.
pub const DEFAULT_PROXY_NAME: &str = "TransparentUpgradeableProxy";

/// Announced before every verification attempt.
const VERIFYING_NOTICE: &str = "Verifying deployed smart contract (potentially a retry)";

/// A contract that has been deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    /// Address the contract lives at.
    pub address: String,
}

/// Compiles, deploys, and encodes calls for named contracts.
pub trait ContractProvider {
    /// Error raised by the provider.
    type Error;

    /// The constructor parameter types of contract `name`, in order.
    fn constructor_inputs(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Vec<AbiType>, Self::Error>> + Send;

    /// ABI-encode a call to `function` on contract `name`.
    fn encode_initializer(
        &self,
        name: &str,
        function: &str,
        args: &[String],
    ) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send;

    /// Deploy contract `name` and wait until the deployment is mined.
    fn deploy(
        &self,
        name: &str,
        args: &[ConstructorArg],
    ) -> impl Future<Output = Result<Deployment, Self::Error>> + Send;
}

/// Publishes a deployed contract's source to a block explorer.
///
/// Implementations must tolerate being called repeatedly for the same address.
pub trait Verifier {
    /// Error raised when the explorer rejects or cannot yet see the contract.
    type Error;

    /// Verify the contract at `address` built with `constructor_args`.
    fn verify(
        &self,
        address: &str,
        constructor_args: &[ConstructorArg],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Request to deploy a single contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployContract {
    /// Contract name (not the file name).
    pub name: String,
    /// Raw constructor argument values.
    pub arguments: Vec<String>,
    /// Verify on a block explorer after deployment.
    pub verify: bool,
}

impl DeployContract {
    /// Deploy `name` with no arguments and no verification.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            verify: false,
        }
    }

    /// Set the raw constructor arguments.
    pub fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Toggle verification.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

/// Request to deploy an upgradeable proxy in front of an existing contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployProxy {
    /// Address that owns the proxy and may change its implementation.
    pub proxy_owner: String,
    /// Name of the implementation contract.
    pub name: String,
    /// Name of the proxy contract.
    pub proxy_name: String,
    /// Address of the implementation contract.
    pub address: String,
    /// Initializer function called through the proxy on deployment.
    pub initializer_function: String,
    /// Raw initializer argument values.
    pub arguments: Vec<String>,
    /// Verify the proxy on a block explorer after deployment.
    pub verify: bool,
}

impl DeployProxy {
    /// Proxy `address` (an instance of `name`) owned by `proxy_owner`, calling
    /// `initializer_function` with no arguments.
    pub fn new(
        proxy_owner: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        initializer_function: impl Into<String>,
    ) -> Self {
        Self {
            proxy_owner: proxy_owner.into(),
            name: name.into(),
            proxy_name: DEFAULT_PROXY_NAME.to_owned(),
            address: address.into(),
            initializer_function: initializer_function.into(),
            arguments: Vec::new(),
            verify: false,
        }
    }

    /// Use a proxy contract other than [`DEFAULT_PROXY_NAME`].
    pub fn with_proxy_name(mut self, proxy_name: impl Into<String>) -> Self {
        self.proxy_name = proxy_name.into();
        self
    }

    /// Set the raw initializer arguments.
    pub fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Toggle verification.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

/// Errors raised by the deploy tasks.
#[derive(Debug)]
pub enum DeployError<P, V> {
    /// Constructor arguments did not match the contract.
    Arguments(ArgumentError),
    /// The contract provider failed.
    Provider(P),
    /// Verification kept failing until the retry budget ran out.
    Verification {
        /// Address of the deployed, unverified contract.
        address: String,
        /// The final verification error and retry metadata.
        source: RetryExhausted<V>,
    },
}

impl<P: fmt::Display, V: fmt::Display> fmt::Display for DeployError<P, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployError::Arguments(e) => write!(f, "{}", e),
            DeployError::Provider(e) => write!(f, "error deploying contract: {}", e),
            DeployError::Verification { address, source } => {
                write!(f, "error verifying contract at {}: {}", address, source)
            }
        }
    }
}

impl<P, V> std::error::Error for DeployError<P, V>
where
    P: std::error::Error + 'static,
    V: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeployError::Arguments(e) => Some(e),
            DeployError::Provider(e) => Some(e),
            DeployError::Verification { source, .. } => Some(source),
        }
    }
}

impl<P, V> From<ArgumentError> for DeployError<P, V> {
    fn from(e: ArgumentError) -> Self {
        DeployError::Arguments(e)
    }
}

/// Deploy a contract and, if requested, verify it. Returns its address.
pub async fn deploy_smart_contract<C, V>(
    provider: &C,
    verifier: &V,
    request: &DeployContract,
    policy: &RetryPolicy,
) -> Result<String, DeployError<C::Error, V::Error>>
where
    C: ContractProvider,
    V: Verifier,
{
    let inputs = provider
        .constructor_inputs(&request.name)
        .await
        .map_err(DeployError::Provider)?;
    let arguments = parse_arguments(&request.arguments, &inputs)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        "Deploying smart contract {} with arguments {}",
        request.name,
        render(&arguments)
    );

    let deployment = provider
        .deploy(&request.name, &arguments)
        .await
        .map_err(DeployError::Provider)?;

    #[cfg(feature = "tracing")]
    tracing::debug!("Deployed smart contract to address {}", deployment.address);

    if request.verify {
        verify_deployment(verifier, &deployment.address, &arguments, policy)
            .await
            .map_err(|source| DeployError::Verification {
                address: deployment.address.clone(),
                source,
            })?;
    }
    Ok(deployment.address)
}

/// Deploy a proxy to an existing contract and, if requested, verify the
/// proxy. Returns the proxy's address.
///
/// The proxy is constructed with `[address, proxy_owner, initializer_data]`,
/// where the initializer data encodes the call to `initializer_function`.
pub async fn deploy_proxy<C, V>(
    provider: &C,
    verifier: &V,
    request: &DeployProxy,
    policy: &RetryPolicy,
) -> Result<String, DeployError<C::Error, V::Error>>
where
    C: ContractProvider,
    V: Verifier,
{
    #[cfg(feature = "tracing")]
    tracing::debug!(
        "Deploying proxy to smart contract {} at {} with initializer function {} and arguments {:?}",
        request.name,
        request.address,
        request.initializer_function,
        request.arguments
    );

    let initializer_data = provider
        .encode_initializer(
            &request.name,
            &request.initializer_function,
            &request.arguments,
        )
        .await
        .map_err(DeployError::Provider)?;

    let proxy_arguments = [
        ConstructorArg::Text(request.address.clone()),
        ConstructorArg::Text(request.proxy_owner.clone()),
        ConstructorArg::Bytes(initializer_data),
    ];
    let proxy = provider
        .deploy(&request.proxy_name, &proxy_arguments)
        .await
        .map_err(DeployError::Provider)?;

    #[cfg(feature = "tracing")]
    tracing::debug!("Deployed proxy to address {}", proxy.address);

    if request.verify {
        verify_deployment(verifier, &proxy.address, &proxy_arguments, policy)
            .await
            .map_err(|source| DeployError::Verification {
                address: proxy.address.clone(),
                source,
            })?;
    }
    Ok(proxy.address)
}

/// Verify a deployed contract, retrying under `policy` while the explorer
/// catches up. Use [`RetryPolicy::block_explorer`] for public networks.
pub async fn verify_deployment<V: Verifier>(
    verifier: &V,
    address: &str,
    constructor_args: &[ConstructorArg],
    policy: &RetryPolicy,
) -> Result<(), RetryExhausted<V::Error>> {
    let result = RetryExecutor::new(policy.clone())
        .execute_reporting_with_hooks(
            move || {
                notice(VERIFYING_NOTICE);
                verifier.verify(address, constructor_args)
            },
            |_event: &RetryEvent<'_, V::Error>| {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    attempt = _event.attempt,
                    next_delay_ms = _event.next_delay.as_millis() as u64,
                    "Verification of {} not accepted yet, retrying",
                    address
                );
            },
        )
        .await;

    if let Err(ref exhausted) = result {
        let hint = format!(
            "Verification of {} failed after {} attempts; retry it manually once the \
             block explorer has indexed the contract",
            address, exhausted.attempts
        );
        #[cfg(feature = "tracing")]
        tracing::warn!("{}", hint);
        #[cfg(not(feature = "tracing"))]
        eprintln!("{}", hint);
    }
    result
}

/// Operator-facing message that is shown even without verbose logging.
fn notice(message: &str) {
    #[cfg(feature = "tracing")]
    tracing::info!("{}", message);
    #[cfg(not(feature = "tracing"))]
    eprintln!("{}", message);
}

#[cfg(feature = "tracing")]
fn render(arguments: &[ConstructorArg]) -> String {
    let rendered: Vec<String> = arguments.iter().map(ToString::to_string).collect();
    rendered.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockChain, MockError};
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::exponential(Duration::from_millis(10)).with_max_retries(3)
    }

    fn token_chain() -> MockChain {
        MockChain::new()
            .with_contract("Token", vec![AbiType::String, AbiType::Uint256])
            .with_contract(DEFAULT_PROXY_NAME, Vec::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_without_verification() {
        let chain = token_chain();
        let request =
            DeployContract::new("Token").with_arguments(vec!["Gold".into(), "1000".into()]);

        let address = deploy_smart_contract(&chain, &chain, &request, &fast_policy())
            .await
            .unwrap();

        let deployments = chain.deployments();
        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].address, address);
        assert_eq!(deployments[0].name, "Token");
        assert_eq!(chain.verify_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arity_mismatch_fails_before_deploying() {
        let chain = token_chain();
        let request = DeployContract::new("Token").with_arguments(vec!["Gold".into()]);

        let err = deploy_smart_contract(&chain, &chain, &request, &fast_policy())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::Arguments(ArgumentError::ArityMismatch {
                required: 2,
                provided: 1
            })
        ));
        assert!(chain.deployments().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_contract_is_provider_error() {
        let chain = token_chain();
        let request = DeployContract::new("Missing");

        let err = deploy_smart_contract(&chain, &chain, &request, &fast_policy())
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Provider(MockError::UnknownContract(ref n)) if n == "Missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verification_retried_until_indexed() {
        let chain = token_chain().failing_verification(2);
        let request = DeployContract::new("Token")
            .with_arguments(vec!["Gold".into(), "1000".into()])
            .with_verification(true);

        let address = deploy_smart_contract(&chain, &chain, &request, &fast_policy())
            .await
            .unwrap();

        assert_eq!(chain.verify_attempts(), 3);
        let verified = chain.verified();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].address, address);
        assert_eq!(
            verified[0].arguments,
            chain.deployments()[0].arguments,
            "verification uses the parsed constructor arguments"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_verification_exhausted() {
        let chain = token_chain().rejecting_verification();
        let request = DeployContract::new("Token")
            .with_arguments(vec!["Gold".into(), "1000".into()])
            .with_verification(true);

        let err = deploy_smart_contract(&chain, &chain, &request, &fast_policy())
            .await
            .unwrap_err();

        match err {
            DeployError::Verification { address, source } => {
                assert_eq!(address, chain.deployments()[0].address);
                assert_eq!(source.attempts, 4);
                assert!(matches!(source.final_error, MockError::NotIndexed(_)));
            }
            other => panic!("expected verification error, got {:?}", other),
        }
        assert_eq!(chain.verify_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_constructed_with_initializer_data() {
        let chain = token_chain();
        let request = DeployProxy::new("0xowner", "Token", "0ximpl", "initialize")
            .with_arguments(vec!["Gold".into(), "7".into()])
            .with_verification(true);

        let proxy = deploy_proxy(&chain, &chain, &request, &fast_policy())
            .await
            .unwrap();

        let deployments = chain.deployments();
        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].name, DEFAULT_PROXY_NAME);
        assert_eq!(deployments[0].address, proxy);
        assert_eq!(
            deployments[0].arguments,
            vec![
                ConstructorArg::Text("0ximpl".into()),
                ConstructorArg::Text("0xowner".into()),
                ConstructorArg::Bytes(b"Token.initialize(Gold,7)".to_vec()),
            ]
        );
        assert_eq!(chain.verified()[0].arguments, deployments[0].arguments);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_proxy_name() {
        let chain = token_chain().with_contract("MyProxy", Vec::new());
        let request =
            DeployProxy::new("0xowner", "Token", "0ximpl", "initialize").with_proxy_name("MyProxy");

        deploy_proxy(&chain, &chain, &request, &fast_policy())
            .await
            .unwrap();

        assert_eq!(chain.deployments()[0].name, "MyProxy");
        assert_eq!(chain.verify_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explorer_policy_waits_before_first_verification() {
        let chain = token_chain().failing_verification(1);
        let start = tokio::time::Instant::now();

        verify_deployment(&chain, "0x01", &[], &RetryPolicy::block_explorer())
            .await
            .unwrap();

        // 10s initial delay, then one 5s backoff
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(15), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(16), "{:?}", elapsed);
        assert_eq!(chain.verify_attempts(), 2);
    }

    #[test]
    fn test_deploy_error_display() {
        let err: DeployError<MockError, MockError> = DeployError::Verification {
            address: "0x01".into(),
            source: RetryExhausted::new(
                MockError::NotIndexed("0x01".into()),
                11,
                Duration::from_secs(60),
            ),
        };
        let display = err.to_string();
        assert!(display.contains("0x01"));
        assert!(display.contains("failed after 11 attempts"));
    }
}
