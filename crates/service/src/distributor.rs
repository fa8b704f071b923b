//! Distributor Contract Client
//!
//! Reads the distributor's root/round/reward and reward token balance, and
//! submits `setRoot` updates.

use crate::config::PushConfig;
use airdrop_claims::ArtifactHead;
use alloy::{
    network::EthereumWallet,
    primitives::{Address, B256, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    sol,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument};

// Generate contract bindings from ABI
sol! {
    #[sol(rpc)]
    contract HourlyMerkleDistributor {
        function token() external view returns (address);
        function merkleRoot() external view returns (bytes32);
        function round() external view returns (uint64);
        function rewardAmount() external view returns (uint256);
        function setRoot(bytes32 newRoot, uint64 newRound) external;
    }

    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
    }
}

/// Snapshot of the distributor's public state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributorState {
    /// Reward token paid out on claim
    pub token: Address,
    /// Current `merkleRoot()` and `round()`
    pub head: ArtifactHead,
    /// Per-account `rewardAmount()` in wei
    pub reward_amount: U256,
}

/// Why a root update did not land.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u128, max_gwei: u64 },

    #[error("Failed to send setRoot: {0}")]
    Send(String),

    #[error("Failed to get receipt for {tx_hash}: {message}")]
    Receipt { tx_hash: B256, message: String },

    #[error("Transaction reverted: {0}")]
    Reverted(B256),
}

impl PushError {
    /// Hash of the sent transaction, if it got that far.
    #[must_use]
    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            Self::Receipt { tx_hash, .. } | Self::Reverted(tx_hash) => Some(*tx_hash),
            Self::GasPriceTooHigh { .. } | Self::Send(_) => None,
        }
    }
}

/// Distributor reads and the single write the rebuilder performs.
#[async_trait]
pub trait Distributor: Send + Sync {
    fn address(&self) -> Address;

    /// token, root, round and reward
    async fn state(&self) -> Result<DistributorState>;

    /// Just root and round, re-read right before a push
    async fn head(&self) -> Result<ArtifactHead>;

    /// Distributor's balance of the reward `token`
    async fn token_balance(&self, token: Address) -> Result<U256>;

    /// Submit `setRoot(head.root, head.round)` and wait for the receipt.
    async fn set_root(
        &self,
        signer: &PrivateKeySigner,
        head: ArtifactHead,
    ) -> Result<B256, PushError>;
}

/// [`Distributor`] backed by a JSON-RPC provider.
pub struct RpcDistributor {
    rpc_url: reqwest::Url,
    address: Address,
    provider: DynProvider,
    config: PushConfig,
}

impl RpcDistributor {
    #[must_use]
    pub fn new(
        rpc_url: reqwest::Url,
        address: Address,
        provider: DynProvider,
        config: PushConfig,
    ) -> Self {
        Self {
            rpc_url,
            address,
            provider,
            config,
        }
    }
}

#[async_trait]
impl Distributor for RpcDistributor {
    fn address(&self) -> Address {
        self.address
    }

    #[instrument(skip(self), fields(distributor = %self.address))]
    async fn state(&self) -> Result<DistributorState> {
        let contract = HourlyMerkleDistributor::new(self.address, &self.provider);

        // independent reads, issued together
        let (token, root, round, reward_amount) = tokio::try_join!(
            async { contract.token().call().await.context("token()") },
            async { contract.merkleRoot().call().await.context("merkleRoot()") },
            async { contract.round().call().await.context("round()") },
            async { contract.rewardAmount().call().await.context("rewardAmount()") },
        )?;

        debug!(%token, %root, round, %reward_amount, "Read distributor state");

        Ok(DistributorState {
            token,
            head: ArtifactHead::new(round, root),
            reward_amount,
        })
    }

    async fn head(&self) -> Result<ArtifactHead> {
        let contract = HourlyMerkleDistributor::new(self.address, &self.provider);
        let (root, round) = tokio::try_join!(
            async { contract.merkleRoot().call().await.context("merkleRoot()") },
            async { contract.round().call().await.context("round()") },
        )?;
        Ok(ArtifactHead::new(round, root))
    }

    async fn token_balance(&self, token: Address) -> Result<U256> {
        IERC20::new(token, &self.provider)
            .balanceOf(self.address)
            .call()
            .await
            .context("balanceOf()")
    }

    #[instrument(skip(self, signer), fields(round = head.round, root = %head.root))]
    async fn set_root(
        &self,
        signer: &PrivateKeySigner,
        head: ArtifactHead,
    ) -> Result<B256, PushError> {
        // Build provider with wallet
        let wallet = EthereumWallet::from(signer.clone());
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.rpc_url.clone());

        // Check current gas price
        let gas_price = provider
            .get_gas_price()
            .await
            .map_err(|e| PushError::Send(format!("eth_gasPrice: {e}")))?;
        let max_gas_price_wei = u128::from(self.config.max_gas_price_gwei) * 1_000_000_000;
        if gas_price > max_gas_price_wei {
            return Err(PushError::GasPriceTooHigh {
                current_gwei: gas_price / 1_000_000_000,
                max_gwei: self.config.max_gas_price_gwei,
            });
        }

        let contract = HourlyMerkleDistributor::new(self.address, &provider);

        info!(signer = %signer.address(), "Submitting setRoot");

        let pending_tx = contract
            .setRoot(head.root, head.round)
            .send()
            .await
            .map_err(|e| PushError::Send(e.to_string()))?;
        let tx_hash = *pending_tx.tx_hash();

        info!(tx_hash = %tx_hash, "Transaction submitted");

        let receipt = pending_tx
            .with_required_confirmations(self.config.confirmations.max(1))
            .get_receipt()
            .await
            .map_err(|e| PushError::Receipt {
                tx_hash,
                message: e.to_string(),
            })?;

        if !receipt.status() {
            return Err(PushError::Reverted(tx_hash));
        }

        info!(
            tx_hash = %tx_hash,
            gas_used = receipt.gas_used,
            "Transaction confirmed"
        );

        Ok(tx_hash)
    }
}
