//! Artifact and Root Publisher
//!
//! Writes the proofs artifact to every stale destination and moves the
//! distributor root when the signer allows it. Storage problems and failed
//! transactions are recorded as warnings on the report; they never fail a
//! rebuild.

use crate::config::SignerMode;
use crate::distributor::Distributor;
use crate::storage::ArtifactStore;
use airdrop_claims::{needs_onchain_push, ArtifactHead, ProofsPayload, ReportBuilder};
use alloy::primitives::B256;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// What each destination held before this rebuild.
#[derive(Debug, Clone, Default)]
pub struct Survey {
    /// Per store, in store order; `None` = empty or unreadable
    heads: Vec<Option<ArtifactHead>>,
}

impl Survey {
    /// Head every destination agrees on.
    ///
    /// `None` when there are no destinations, any destination is empty or
    /// unreadable, or the destinations disagree.
    #[must_use]
    pub fn published(&self) -> Option<ArtifactHead> {
        let first = (*self.heads.first()?)?;
        self.heads
            .iter()
            .all(|head| *head == Some(first))
            .then_some(first)
    }

    /// Indices of the destinations that do not hold `computed`.
    #[must_use]
    pub fn stale(&self, computed: ArtifactHead) -> Vec<usize> {
        self.heads
            .iter()
            .enumerate()
            .filter(|(_, head)| **head != Some(computed))
            .map(|(index, _)| index)
            .collect()
    }
}

/// Outcome of a push attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// `setRoot` confirmed
    Pushed(B256),
    /// The re-read head already matched; nothing was sent
    AlreadyCurrent,
    /// No signer configured
    NoSigner,
    /// Transaction not sent, not confirmed, or reverted
    Failed,
}

/// Fans an artifact out to the stores and owns the push.
pub struct Publisher {
    stores: Vec<Arc<dyn ArtifactStore>>,
    distributor: Arc<dyn Distributor>,
    signer: SignerMode,
}

impl Publisher {
    #[must_use]
    pub fn new(
        stores: Vec<Arc<dyn ArtifactStore>>,
        distributor: Arc<dyn Distributor>,
        signer: SignerMode,
    ) -> Self {
        Self {
            stores,
            distributor,
            signer,
        }
    }

    /// Read the artifact currently held by each destination.
    pub async fn survey(&self, report: &mut ReportBuilder) -> Survey {
        if self.stores.is_empty() {
            storage_warning(report, "no storage destination configured".to_string());
            return Survey::default();
        }

        let mut heads = Vec::with_capacity(self.stores.len());
        for store in &self.stores {
            let head = match store.read().await {
                Ok(payload) => payload.map(|p| p.head()),
                Err(e) => {
                    storage_warning(
                        report,
                        format!("{} read failed ({}): {e}", store.name(), store.location()),
                    );
                    None
                }
            };
            debug!(store = store.name(), ?head, "Surveyed destination");
            heads.push(head);
        }

        Survey { heads }
    }

    /// Write `payload` to every destination `survey` marks stale.
    #[instrument(skip_all, fields(round = payload.round, root = %payload.root))]
    pub async fn write_artifact(
        &self,
        payload: &ProofsPayload,
        survey: &Survey,
        report: &mut ReportBuilder,
    ) {
        let json = match payload.to_json_pretty() {
            Ok(json) => json,
            Err(e) => {
                storage_warning(report, format!("artifact serialization failed: {e}"));
                return;
            }
        };

        for index in survey.stale(payload.head()) {
            let Some(store) = self.stores.get(index) else {
                continue;
            };
            match store.write(&json).await {
                Ok(location) => {
                    info!(store = store.name(), %location, "Artifact written");
                    report.stored_at(location);
                }
                Err(e) => storage_warning(report, format!("{} write failed: {e}", store.name())),
            }
        }
    }

    /// Move the distributor to `computed`.
    ///
    /// Re-reads the on-chain head first so a root set by a concurrent run is
    /// not submitted twice. A failed re-read does not block the push.
    #[instrument(skip_all, fields(round = computed.round, root = %computed.root))]
    pub async fn push_root(&self, computed: ArtifactHead, report: &mut ReportBuilder) -> PushOutcome {
        let signer = match &self.signer {
            SignerMode::NoSigner => {
                info!("On-chain root is behind but no signer is configured");
                return PushOutcome::NoSigner;
            }
            SignerMode::Signer(signer) => signer,
        };

        match self.distributor.head().await {
            Ok(head) if !needs_onchain_push(&computed, &head) => {
                report.warn(format!(
                    "on-chain root already set for round {} before submission",
                    head.round
                ));
                return PushOutcome::AlreadyCurrent;
            }
            Ok(_) => {}
            Err(e) => report.warn(format!("could not re-read on-chain root: {e:#}")),
        }

        match self.distributor.set_root(signer, computed).await {
            Ok(tx_hash) => {
                report.set_tx_hash(tx_hash);
                PushOutcome::Pushed(tx_hash)
            }
            Err(e) => {
                if let Some(tx_hash) = e.tx_hash() {
                    report.set_tx_hash(tx_hash);
                }
                report.warn(format!("setRoot failed: {e}"));
                PushOutcome::Failed
            }
        }
    }
}

fn storage_warning(report: &mut ReportBuilder, warning: String) {
    metrics::counter!("airdrop_storage_warnings_total").increment(1);
    report.warn(warning);
}
