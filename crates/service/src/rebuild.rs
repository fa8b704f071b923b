//! Rebuild Engine
//!
//! One rebuild: scan the mint window, build the round's artifact, reconcile it
//! against the stores and the distributor, then publish. Only configuration
//! problems, missing contracts, failed distributor reads and failed scans are
//! errors; everything else ends up as a warning on an `ok` result.

use crate::chain::{ChainReader, RpcChain};
use crate::config::{ConfigError, RebuildConfig, ScanConfig};
use crate::distributor::{Distributor, RpcDistributor};
use crate::publisher::{PushOutcome, Publisher};
use crate::scanner::{LogScanner, ScanError};
use crate::storage::{stores_from_config, ArtifactStore};
use airdrop_claims::{
    reconcile, ProofsPayload, RebuildReason, RebuildResult, ReconcileInput, Reconciliation,
    ReportBuilder,
};
use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Hard failures of a rebuild.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No contract code at {role} address {address}")]
    TargetNotFound { role: &'static str, address: Address },

    #[error("Distributor read failed: {0}")]
    Rpc(String),

    #[error("Mint scan failed: {0}")]
    Scan(ScanError),
}

impl RebuildError {
    /// Stable label for metrics and API error bodies.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::TargetNotFound { .. } => "target-not-found",
            Self::Rpc(_) => "rpc",
            Self::Scan(_) => "scan",
        }
    }
}

impl From<ScanError> for RebuildError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::NoCode(address) => Self::TargetNotFound {
                role: "nft",
                address,
            },
            other => Self::Scan(other),
        }
    }
}

/// Round containing `unix_secs`.
#[must_use]
pub const fn round_for(unix_secs: u64, period_secs: u64) -> u64 {
    if period_secs == 0 {
        return unix_secs;
    }
    unix_secs / period_secs
}

/// Rebuild parameters that do not involve a seam.
#[derive(Debug, Clone)]
pub struct RebuildSettings {
    pub nft_address: Address,
    pub blocks_per_round: u64,
    pub round_period_secs: u64,
    pub fallback_reward: U256,
    pub scan: ScanConfig,
}

impl From<&RebuildConfig> for RebuildSettings {
    fn from(config: &RebuildConfig) -> Self {
        Self {
            nft_address: config.nft_address,
            blocks_per_round: config.blocks_per_round,
            round_period_secs: config.round_period_secs,
            fallback_reward: config.fallback_reward,
            scan: config.scan.clone(),
        }
    }
}

/// Runs rebuilds against a fixed chain, distributor and set of stores.
pub struct Rebuilder {
    chain: Arc<dyn ChainReader>,
    distributor: Arc<dyn Distributor>,
    publisher: Publisher,
    settings: RebuildSettings,
}

impl Rebuilder {
    /// Wire the JSON-RPC chain, distributor and configured stores.
    #[must_use]
    pub fn connect(config: &RebuildConfig) -> Self {
        let chain = RpcChain::new(config.rpc_url.clone());
        let distributor: Arc<dyn Distributor> = Arc::new(RpcDistributor::new(
            config.rpc_url.clone(),
            config.distributor_address,
            chain.provider().clone(),
            config.push.clone(),
        ));

        Self::with_parts(
            Arc::new(chain),
            distributor,
            stores_from_config(&config.storage),
            config.signer.clone(),
            RebuildSettings::from(config),
        )
    }

    #[must_use]
    pub fn with_parts(
        chain: Arc<dyn ChainReader>,
        distributor: Arc<dyn Distributor>,
        stores: Vec<Arc<dyn ArtifactStore>>,
        signer: crate::config::SignerMode,
        settings: RebuildSettings,
    ) -> Self {
        let publisher = Publisher::new(stores, Arc::clone(&distributor), signer);
        Self {
            chain,
            distributor,
            publisher,
            settings,
        }
    }

    /// Rebuild for the current wall-clock round.
    ///
    /// # Errors
    /// See [`Rebuilder::run_at`].
    pub async fn run(&self) -> Result<RebuildResult, RebuildError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        self.run_at(now).await
    }

    /// Rebuild for the round containing `unix_secs`.
    ///
    /// # Errors
    /// Returns an error if a contract is missing, the distributor cannot be
    /// read, or the mint scan fails.
    #[allow(clippy::cast_precision_loss)]
    #[instrument(skip(self))]
    pub async fn run_at(&self, unix_secs: u64) -> Result<RebuildResult, RebuildError> {
        let result = self.rebuild(unix_secs).await;

        match &result {
            Ok(result) => {
                metrics::counter!("airdrop_rebuilds_total", "reason" => result.reason.as_str())
                    .increment(1);
                metrics::gauge!("airdrop_eligible_accounts").set(result.count as f64);
                metrics::gauge!("airdrop_round").set(result.round as f64);

                info!(
                    reason = %result.reason,
                    updated = result.updated,
                    count = result.count,
                    round = result.round,
                    root = %result.file_root,
                    warnings = result.warnings.len(),
                    "Rebuild complete"
                );
            }
            Err(e) => {
                metrics::counter!("airdrop_rebuild_failures_total", "kind" => e.kind())
                    .increment(1);
                warn!(kind = e.kind(), error = %e, "Rebuild failed");
            }
        }

        result
    }

    async fn rebuild(&self, unix_secs: u64) -> Result<RebuildResult, RebuildError> {
        let round = round_for(unix_secs, self.settings.round_period_secs);
        let distributor_address = self.distributor.address();

        let code = self
            .chain
            .code_at(distributor_address)
            .await
            .map_err(|e| RebuildError::Rpc(format!("{e:#}")))?;
        if code.is_empty() {
            return Err(RebuildError::TargetNotFound {
                role: "distributor",
                address: distributor_address,
            });
        }

        let scanner = LogScanner::new(self.chain.as_ref(), &self.settings.scan);
        let (state, scan) = tokio::join!(
            self.distributor.state(),
            scanner.scan_mints(self.settings.nft_address, self.settings.blocks_per_round),
        );
        let scan = scan?;
        let state = state.map_err(|e| RebuildError::Rpc(format!("{e:#}")))?;

        let fallback = state.reward_amount.is_zero();
        let reward_amount = if fallback {
            self.settings.fallback_reward
        } else {
            state.reward_amount
        };

        let payload = ProofsPayload::build(&scan.eligible, reward_amount, round);
        let computed = payload.head();
        let count = scan.eligible.len();

        let mut report = ReportBuilder::new(computed, count, reward_amount)
            .window(scan.from_block, scan.to_block)
            .onchain(state.head);
        if fallback {
            report.warn(format!(
                "distributor rewardAmount() is zero, using fallback {reward_amount}"
            ));
        }
        if count > 0 {
            self.check_funding(state.token, reward_amount, count, &mut report)
                .await;
        }

        let survey = self.publisher.survey(&mut report).await;
        let plan = reconcile(&ReconcileInput {
            computed,
            eligible: count,
            published: survey.published(),
            onchain: state.head,
        });

        info!(
            round,
            count,
            mint_logs = scan.mint_logs,
            token = %state.token,
            root = %computed.root,
            onchain_round = state.head.round,
            onchain_root = %state.head.root,
            classification = ?plan.classification,
            "Reconciled"
        );

        if plan.write_artifact {
            self.publisher
                .write_artifact(&payload, &survey, &mut report)
                .await;
        }

        let reason = match plan.classification {
            Reconciliation::Empty => RebuildReason::Empty,
            Reconciliation::Unchanged | Reconciliation::NeedsArtifactUpdate => {
                RebuildReason::Unchanged
            }
            Reconciliation::NeedsOnchainPush => {
                match self.publisher.push_root(computed, &mut report).await {
                    PushOutcome::Pushed(tx_hash) => {
                        info!(%tx_hash, "Distributor root updated");
                        RebuildReason::Pushed
                    }
                    PushOutcome::AlreadyCurrent => RebuildReason::Unchanged,
                    PushOutcome::NoSigner => RebuildReason::NoSigner,
                    PushOutcome::Failed => RebuildReason::PushFailed,
                }
            }
        };

        Ok(report.finish(reason))
    }

    /// Warn when the distributor cannot pay out every claim of the round.
    async fn check_funding(
        &self,
        token: Address,
        reward_amount: U256,
        count: usize,
        report: &mut ReportBuilder,
    ) {
        let required = reward_amount.saturating_mul(U256::from(count));
        match self.distributor.token_balance(token).await {
            Ok(balance) if balance < required => report.warn(format!(
                "distributor token balance {balance} below required {required}"
            )),
            Ok(balance) => debug!(%token, %balance, %required, "Distributor funded"),
            Err(e) => report.warn(format!("token balance read failed: {e:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignerMode;
    use crate::testing::{FakeChain, FakeDistributor, MemoryStore};
    use airdrop_claims::{ArtifactHead, EMPTY_ROOT};
    use alloy::primitives::{address, B256};
    use alloy::signers::local::PrivateKeySigner;
    use std::time::Duration;

    const NFT: Address = address!("1111111111111111111111111111111111111111");
    const DISTRIBUTOR: Address = address!("d1d1d1d1d1d1d1d1d1d1d1d1d1d1d1d1d1d1d1d1");
    // round 500000
    const NOW: u64 = 500_000 * 3600 + 120;

    fn reward() -> U256 {
        U256::from(10u64).pow(U256::from(18u64))
    }

    fn settings() -> RebuildSettings {
        RebuildSettings {
            nft_address: NFT,
            blocks_per_round: 300,
            round_period_secs: 3600,
            fallback_reward: U256::from(5u64) * reward(),
            scan: ScanConfig {
                chunk_size: 1000,
                retries: 0,
                retry_backoff: Duration::from_millis(1),
            },
        }
    }

    fn three_minters() -> FakeChain {
        FakeChain::new(10_000)
            .with_code(NFT)
            .with_code(DISTRIBUTOR)
            .with_mint(NFT, Address::repeat_byte(0x0c), 9_800)
            .with_mint(NFT, Address::repeat_byte(0x0a), 9_900)
            .with_mint(NFT, Address::repeat_byte(0x0b), 9_950)
            .with_mint(NFT, Address::repeat_byte(0x0a), 9_990)
    }

    fn genesis_distributor() -> Arc<FakeDistributor> {
        Arc::new(FakeDistributor::new(
            DISTRIBUTOR,
            ArtifactHead::new(0, B256::ZERO),
            reward(),
        ))
    }

    struct Harness {
        rebuilder: Rebuilder,
        distributor: Arc<FakeDistributor>,
        store: Arc<MemoryStore>,
    }

    fn harness(
        chain: FakeChain,
        distributor: Arc<FakeDistributor>,
        store: MemoryStore,
        signer: SignerMode,
    ) -> Harness {
        let store = Arc::new(store);
        let rebuilder = Rebuilder::with_parts(
            Arc::new(chain),
            distributor.clone(),
            vec![store.clone() as Arc<dyn ArtifactStore>],
            signer,
            settings(),
        );
        Harness {
            rebuilder,
            distributor,
            store,
        }
    }

    fn signer() -> SignerMode {
        SignerMode::Signer(PrivateKeySigner::random())
    }

    #[test]
    fn test_round_for() {
        assert_eq!(round_for(NOW, 3600), 500_000);
        assert_eq!(round_for(3599, 3600), 0);
        assert_eq!(round_for(3600, 3600), 1);
    }

    #[test]
    fn test_error_kinds() {
        let missing = RebuildError::from(ScanError::NoCode(NFT));
        assert_eq!(missing.kind(), "target-not-found");
        assert_eq!(RebuildError::Rpc("timeout".into()).kind(), "rpc");
        assert_eq!(
            RebuildError::from(ConfigError::Missing("RPC_URL")).kind(),
            "config"
        );
    }

    #[tokio::test]
    async fn test_pushes_new_root() {
        let h = harness(
            three_minters(),
            genesis_distributor(),
            MemoryStore::new("local"),
            signer(),
        );

        let result = h.rebuilder.run_at(NOW).await.unwrap();

        assert!(result.ok);
        assert!(result.updated);
        assert_eq!(result.reason, RebuildReason::Pushed);
        assert_eq!(result.count, 3);
        assert_eq!(result.round, 500_000);
        assert!(result.tx_hash.is_some());
        assert!(result.artifact_written);
        assert_eq!(result.from_block, 9_700);
        assert_eq!(result.to_block, 10_000);

        let stored = h.store.payload().unwrap();
        assert_eq!(stored.root, result.file_root);
        assert!(stored.invalid_claims().is_empty());
        assert_eq!(h.distributor.pushes(), vec![stored.head()]);
    }

    #[tokio::test]
    async fn test_second_run_is_unchanged() {
        let h = harness(
            three_minters(),
            genesis_distributor(),
            MemoryStore::new("local"),
            signer(),
        );

        let first = h.rebuilder.run_at(NOW).await.unwrap();
        let second = h.rebuilder.run_at(NOW + 60).await.unwrap();

        assert_eq!(second.reason, RebuildReason::Unchanged);
        assert!(!second.updated);
        assert!(!second.artifact_written);
        assert_eq!(second.file_root, first.file_root);
        assert_eq!(h.store.writes(), 1);
        assert_eq!(h.distributor.pushes().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_window_never_pushes() {
        let chain = FakeChain::new(10_000).with_code(NFT).with_code(DISTRIBUTOR);
        let h = harness(chain, genesis_distributor(), MemoryStore::new("local"), signer());

        let result = h.rebuilder.run_at(NOW).await.unwrap();

        assert_eq!(result.reason, RebuildReason::Empty);
        assert!(!result.updated);
        assert_eq!(result.count, 0);
        assert_eq!(result.file_root, EMPTY_ROOT);
        assert!(h.distributor.pushes().is_empty());

        let stored = h.store.payload().unwrap();
        assert!(stored.claims.is_empty());
        assert_eq!(stored.round, 500_000);
    }

    #[tokio::test]
    async fn test_no_signer_still_writes_artifact() {
        let h = harness(
            three_minters(),
            genesis_distributor(),
            MemoryStore::new("local"),
            SignerMode::NoSigner,
        );

        let result = h.rebuilder.run_at(NOW).await.unwrap();

        assert!(result.ok);
        assert!(!result.updated);
        assert_eq!(result.reason, RebuildReason::NoSigner);
        assert!(result.artifact_written);
        assert!(h.distributor.pushes().is_empty());
    }

    #[tokio::test]
    async fn test_in_sync_is_unchanged_without_io() {
        let seeded = harness(
            three_minters(),
            genesis_distributor(),
            MemoryStore::new("seed"),
            SignerMode::NoSigner,
        );
        seeded.rebuilder.run_at(NOW).await.unwrap();
        let payload = seeded.store.payload().unwrap();

        let distributor = Arc::new(FakeDistributor::new(DISTRIBUTOR, payload.head(), reward()));
        let h = harness(
            three_minters(),
            distributor,
            MemoryStore::new("local").holding(&payload),
            signer(),
        );

        let result = h.rebuilder.run_at(NOW).await.unwrap();

        assert_eq!(result.reason, RebuildReason::Unchanged);
        assert_eq!(h.store.writes(), 0);
        assert!(h.distributor.pushes().is_empty());
        assert_eq!(result.onchain_root, Some(payload.root));
    }

    #[tokio::test]
    async fn test_push_failure_keeps_result_ok() {
        let distributor = Arc::new(
            FakeDistributor::new(DISTRIBUTOR, ArtifactHead::new(0, B256::ZERO), reward())
                .failing_push("nonce too low"),
        );
        let h = harness(three_minters(), distributor, MemoryStore::new("local"), signer());

        let result = h.rebuilder.run_at(NOW).await.unwrap();

        assert!(result.ok);
        assert!(!result.updated);
        assert_eq!(result.reason, RebuildReason::PushFailed);
        assert!(result.artifact_written);
        assert!(result.warnings.iter().any(|w| w.contains("nonce too low")));
    }

    #[tokio::test]
    async fn test_retry_after_failed_push() {
        let store = MemoryStore::new("local");
        let distributor = genesis_distributor();
        let h = harness(three_minters(), distributor, store, SignerMode::NoSigner);
        h.rebuilder.run_at(NOW).await.unwrap();
        let payload = h.store.payload().unwrap();

        // artifact already published, distributor still behind
        let retry = harness(
            three_minters(),
            genesis_distributor(),
            MemoryStore::new("local").holding(&payload),
            signer(),
        );
        let result = retry.rebuilder.run_at(NOW).await.unwrap();

        assert_eq!(result.reason, RebuildReason::Pushed);
        assert!(!result.artifact_written);
        assert_eq!(retry.distributor.pushes(), vec![payload.head()]);
    }

    #[tokio::test]
    async fn test_storage_failure_is_warning() {
        let h = harness(
            three_minters(),
            genesis_distributor(),
            MemoryStore::new("local").failing_writes(),
            signer(),
        );

        let result = h.rebuilder.run_at(NOW).await.unwrap();

        assert!(result.ok);
        assert_eq!(result.reason, RebuildReason::Pushed);
        assert!(!result.artifact_written);
        assert!(result.warnings.iter().any(|w| w.contains("local write failed")));
    }

    #[tokio::test]
    async fn test_zero_reward_uses_fallback() {
        let distributor = Arc::new(FakeDistributor::new(
            DISTRIBUTOR,
            ArtifactHead::new(0, B256::ZERO),
            U256::ZERO,
        ));
        let h = harness(
            three_minters(),
            distributor,
            MemoryStore::new("local"),
            SignerMode::NoSigner,
        );

        let result = h.rebuilder.run_at(NOW).await.unwrap();

        assert_eq!(result.reward_amount, U256::from(5u64) * reward());
        assert!(result.warnings.iter().any(|w| w.contains("fallback")));
        let stored = h.store.payload().unwrap();
        assert!(stored.claims.iter().all(|c| c.amount == result.reward_amount));
    }

    #[tokio::test]
    async fn test_underfunded_distributor_warns() {
        let distributor = Arc::new(
            FakeDistributor::new(DISTRIBUTOR, ArtifactHead::new(0, B256::ZERO), reward())
                .with_balance(U256::from(2u64) * reward()),
        );
        let h = harness(three_minters(), distributor, MemoryStore::new("local"), signer());

        let result = h.rebuilder.run_at(NOW).await.unwrap();

        // funding is reported, never blocks the push
        assert_eq!(result.reason, RebuildReason::Pushed);
        let expected = format!(
            "distributor token balance {} below required {}",
            U256::from(2u64) * reward(),
            U256::from(3u64) * reward()
        );
        assert_eq!(result.warnings, vec![expected]);
    }

    #[tokio::test]
    async fn test_funded_distributor_has_no_warning() {
        let distributor = Arc::new(
            FakeDistributor::new(DISTRIBUTOR, ArtifactHead::new(0, B256::ZERO), reward())
                .with_balance(U256::from(3u64) * reward()),
        );
        let h = harness(three_minters(), distributor, MemoryStore::new("local"), signer());

        let result = h.rebuilder.run_at(NOW).await.unwrap();

        assert_eq!(result.reason, RebuildReason::Pushed);
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_balance_read_failure_is_warning() {
        let distributor = Arc::new(
            FakeDistributor::new(DISTRIBUTOR, ArtifactHead::new(0, B256::ZERO), reward())
                .failing_balance(),
        );
        let h = harness(
            three_minters(),
            distributor,
            MemoryStore::new("local"),
            SignerMode::NoSigner,
        );

        let result = h.rebuilder.run_at(NOW).await.unwrap();

        assert_eq!(result.reason, RebuildReason::NoSigner);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("token balance read failed")));
    }

    #[tokio::test]
    async fn test_missing_distributor_code() {
        let chain = FakeChain::new(10_000).with_code(NFT);
        let h = harness(chain, genesis_distributor(), MemoryStore::new("local"), signer());

        let result = h.rebuilder.run_at(NOW).await;

        assert!(matches!(
            result,
            Err(RebuildError::TargetNotFound { role: "distributor", .. })
        ));
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_missing_nft_code() {
        let chain = FakeChain::new(10_000).with_code(DISTRIBUTOR);
        let h = harness(chain, genesis_distributor(), MemoryStore::new("local"), signer());

        let result = h.rebuilder.run_at(NOW).await;

        assert!(matches!(
            result,
            Err(RebuildError::TargetNotFound { role: "nft", .. })
        ));
    }

    #[tokio::test]
    async fn test_distributor_read_failure() {
        let distributor = Arc::new(
            FakeDistributor::new(DISTRIBUTOR, ArtifactHead::new(0, B256::ZERO), reward())
                .failing_reads(),
        );
        let h = harness(three_minters(), distributor, MemoryStore::new("local"), signer());

        let result = h.rebuilder.run_at(NOW).await;

        assert!(matches!(result, Err(RebuildError::Rpc(_))));
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_scan_failure_writes_nothing() {
        let chain = three_minters().failing_logs_from(9_900);
        let h = harness(chain, genesis_distributor(), MemoryStore::new("local"), signer());

        let result = h.rebuilder.run_at(NOW).await;

        assert!(matches!(result, Err(RebuildError::Scan(_))));
        assert_eq!(h.store.writes(), 0);
        assert!(h.distributor.pushes().is_empty());
    }

    #[tokio::test]
    async fn test_stale_state_read_skips_duplicate_push() {
        let seeded = harness(
            three_minters(),
            genesis_distributor(),
            MemoryStore::new("seed"),
            SignerMode::NoSigner,
        );
        seeded.rebuilder.run_at(NOW).await.unwrap();
        let head = seeded.store.payload().unwrap().head();

        // another run landed setRoot between our state read and our push
        let distributor = Arc::new(
            FakeDistributor::new(DISTRIBUTOR, head, reward())
                .with_stale_state(ArtifactHead::new(0, B256::ZERO)),
        );
        let h = harness(three_minters(), distributor, MemoryStore::new("local"), signer());

        let result = h.rebuilder.run_at(NOW).await.unwrap();

        assert_eq!(result.reason, RebuildReason::Unchanged);
        assert!(!result.updated);
        assert!(h.distributor.pushes().is_empty());
    }
}
