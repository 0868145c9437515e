//! Deploys a contract and a proxy to an in-memory chain whose explorer lags,
//! logging each verification attempt.
//!
//! Run with: cargo run --example verify_with_retry --features tracing

use std::time::Duration;

use backoff_verify::args::{split_string_array, AbiType};
use backoff_verify::deploy::{deploy_proxy, deploy_smart_contract, DeployContract, DeployProxy};
use backoff_verify::testing::MockChain;
use backoff_verify::RetryPolicy;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let chain = MockChain::new()
        .with_contract("Token", vec![AbiType::String, AbiType::Uint256])
        .with_contract("TransparentUpgradeableProxy", Vec::new())
        .failing_verification(2);

    // Same shape as the explorer policy, scaled down to keep the demo short
    let policy = RetryPolicy::exponential(Duration::from_millis(50))
        .with_max_retries(10)
        .with_initial_delay(Duration::from_millis(100));

    let request = DeployContract::new("Token")
        .with_arguments(split_string_array("Gold,1000000"))
        .with_verification(true);

    let token = match deploy_smart_contract(&chain, &chain, &request, &policy).await {
        Ok(address) => address,
        Err(e) => {
            tracing::error!("Deployment failed: {}", e);
            return;
        }
    };
    tracing::info!("Token deployed and verified at {}", token);

    let proxy = DeployProxy::new("0x00000000000000000000000000000000000000aa", "Token", &token, "initialize")
        .with_arguments(split_string_array("Gold,1000000"))
        .with_verification(true);

    match deploy_proxy(&chain, &chain, &proxy, &policy).await {
        Ok(address) => tracing::info!("Proxy deployed and verified at {}", address),
        Err(e) => tracing::error!("Proxy deployment failed: {}", e),
    }

    tracing::info!(
        "{} verification attempts for {} deployments",
        chain.verify_attempts(),
        chain.deployments().len()
    );
}
