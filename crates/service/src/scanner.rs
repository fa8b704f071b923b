//! Mint Log Scanner
//!
//! Resolves the accounts that minted from the NFT contract inside the trailing
//! block window. Mints are ERC-721 `Transfer` events whose indexed `from` is
//! the zero address; the filter matches on topics so no transaction bodies
//! are fetched.

use crate::chain::ChainReader;
use crate::config::ScanConfig;
use airdrop_claims::EligibleSet;
use alloy::{
    primitives::{Address, B256},
    rpc::types::{Filter, Log},
    sol,
    sol_types::SolEvent,
};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

// ERC-721 transfer; `from == address(0)` marks a mint
sol! {
    event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
}

/// Scan failures. Any of these aborts the rebuild.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("No contract code at NFT address {0}")]
    NoCode(Address),

    #[error("Failed to query chain: {0}")]
    Rpc(String),

    #[error("Log range {from}..={to} failed after {attempts} attempts: {message}")]
    Chunk {
        from: u64,
        to: u64,
        attempts: u32,
        message: String,
    },
}

/// Result of one window scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MintScan {
    pub eligible: EligibleSet,
    pub from_block: u64,
    pub to_block: u64,
    /// Mint logs seen, before deduplication
    pub mint_logs: usize,
}

/// Split `[from, to]` into inclusive sub-ranges of at most `chunk_size` blocks.
#[must_use]
pub fn chunk_ranges(from: u64, to: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let span = chunk_size.max(1);
    let mut ranges = Vec::new();
    let mut current = from;

    while current <= to {
        let end = current.saturating_add(span - 1).min(to);
        ranges.push((current, end));
        if end == u64::MAX {
            break;
        }
        current = end + 1;
    }

    ranges
}

/// Run `op` until it succeeds or `retries` extra attempts are spent.
///
/// On failure returns the number of attempts made and the last error.
pub async fn with_retry<T, F, Fut>(
    retries: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T, (u32, anyhow::Error)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt > retries => return Err((attempt, e)),
            Err(e) => {
                warn!(attempt, error = %e, "Attempt failed, retrying");
                sleep(backoff).await;
            }
        }
    }
}

/// Fetch every range in order and concatenate the results.
///
/// Fail-closed: the first range that exhausts its retries fails the whole
/// fetch, so callers never see a partial result.
pub async fn fetch_chunked<T, F, Fut>(
    ranges: &[(u64, u64)],
    config: &ScanConfig,
    mut fetch: F,
) -> Result<Vec<T>, ScanError>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<T>>>,
{
    let mut merged = Vec::new();

    for &(from, to) in ranges {
        let items = with_retry(config.retries, config.retry_backoff, || fetch(from, to))
            .await
            .map_err(|(attempts, e)| ScanError::Chunk {
                from,
                to,
                attempts,
                message: format!("{e:#}"),
            })?;

        debug!(from, to, count = items.len(), "Fetched log range");
        merged.extend(items);
    }

    Ok(merged)
}

/// Recipient of a mint log: the low 20 bytes of the third topic.
#[must_use]
pub fn recipient(log: &Log) -> Option<Address> {
    log.topics().get(2).map(|topic| Address::from_word(*topic))
}

/// Mint filter without a block range.
#[must_use]
pub fn mint_filter(nft: Address) -> Filter {
    Filter::new()
        .address(nft)
        .event_signature(Transfer::SIGNATURE_HASH)
        .topic1(B256::ZERO)
}

/// Mint scanner over a [`ChainReader`].
pub struct LogScanner<'a> {
    chain: &'a dyn ChainReader,
    config: &'a ScanConfig,
}

impl<'a> LogScanner<'a> {
    #[must_use]
    pub fn new(chain: &'a dyn ChainReader, config: &'a ScanConfig) -> Self {
        Self { chain, config }
    }

    /// Accounts that minted from `nft` in `[head - window, head]`.
    ///
    /// # Errors
    /// Returns an error if the NFT has no code, the head cannot be read, or
    /// any log range fails.
    #[instrument(skip(self))]
    pub async fn scan_mints(&self, nft: Address, window: u64) -> Result<MintScan, ScanError> {
        let code = self
            .chain
            .code_at(nft)
            .await
            .map_err(|e| ScanError::Rpc(format!("{e:#}")))?;
        if code.is_empty() {
            return Err(ScanError::NoCode(nft));
        }

        let to_block = self
            .chain
            .head_block()
            .await
            .map_err(|e| ScanError::Rpc(format!("{e:#}")))?;
        let from_block = to_block.saturating_sub(window);

        info!(from_block, to_block, "Scanning mints");

        let base = mint_filter(nft);
        let ranges = chunk_ranges(from_block, to_block, self.config.chunk_size);
        let logs = fetch_chunked(&ranges, self.config, |from, to| {
            let filter = base.clone().from_block(from).to_block(to);
            async move { self.chain.logs(&filter).await }
        })
        .await?;

        let mut eligible = EligibleSet::new();
        for log in &logs {
            match recipient(log) {
                Some(to) => {
                    eligible.insert(to);
                }
                None => warn!(
                    tx = ?log.transaction_hash,
                    topics = log.topics().len(),
                    "Skipping mint log without recipient topic"
                ),
            }
        }

        info!(
            mint_logs = logs.len(),
            minters = eligible.len(),
            "Mint scan complete"
        );

        Ok(MintScan {
            eligible,
            from_block,
            to_block,
            mint_logs: logs.len(),
        })
    }
}
