//! JSON-RPC chain access used by the scanner and the rebuild engine.

use alloy::{
    primitives::{Address, Bytes},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{Filter, Log},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::instrument;

/// Read-only chain queries.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Deployed bytecode at `address` (empty when nothing is deployed)
    async fn code_at(&self, address: Address) -> Result<Bytes>;

    /// Current head block number
    async fn head_block(&self) -> Result<u64>;

    /// `eth_getLogs` for a fully specified filter
    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>>;
}

/// [`ChainReader`] over an HTTP JSON-RPC endpoint.
#[derive(Clone)]
pub struct RpcChain {
    provider: DynProvider,
}

impl RpcChain {
    #[must_use]
    pub fn new(rpc_url: reqwest::Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();
        Self { provider }
    }

    #[must_use]
    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }
}

#[async_trait]
impl ChainReader for RpcChain {
    #[instrument(skip(self))]
    async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.provider
            .get_code_at(address)
            .await
            .with_context(|| format!("eth_getCode({address})"))
    }

    async fn head_block(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .context("eth_blockNumber")
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.provider.get_logs(filter).await.context("eth_getLogs")
    }
}
