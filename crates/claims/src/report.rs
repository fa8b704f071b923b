//! Rebuild Result
//!
//! The structured outcome returned to whatever triggered a rebuild.

use crate::artifact::ArtifactHead;
use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};

/// Why a rebuild ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildReason {
    /// No eligible accounts this round
    Empty,
    /// Distributor already holds the computed root
    Unchanged,
    /// Root update confirmed on-chain
    Pushed,
    /// Push needed but no signer configured
    NoSigner,
    /// Push needed, transaction failed or reverted
    PushFailed,
}

impl RebuildReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Unchanged => "unchanged",
            Self::Pushed => "pushed",
            Self::NoSigner => "no-signer",
            Self::PushFailed => "push-failed",
        }
    }
}

impl std::fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildResult {
    pub ok: bool,
    /// The distributor root was changed by this rebuild
    pub updated: bool,
    pub reason: RebuildReason,
    /// At least one storage destination was written
    pub artifact_written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    /// Eligible accounts
    pub count: usize,
    pub round: u64,
    pub file_root: B256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onchain_root: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onchain_round: Option<u64>,
    /// Per-account amount in wei
    #[serde(with = "u256_string")]
    pub reward_amount: U256,
    pub from_block: u64,
    pub to_block: u64,
    /// Destinations actually written
    pub storage_locations: Vec<String>,
    /// Non-fatal problems encountered along the way
    pub warnings: Vec<String>,
}

/// Accumulates component outcomes into a [`RebuildResult`].
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    computed: ArtifactHead,
    count: usize,
    reward_amount: U256,
    window: (u64, u64),
    onchain: Option<ArtifactHead>,
    tx_hash: Option<B256>,
    storage_locations: Vec<String>,
    warnings: Vec<String>,
}

impl ReportBuilder {
    #[must_use]
    pub fn new(computed: ArtifactHead, count: usize, reward_amount: U256) -> Self {
        Self {
            computed,
            count,
            reward_amount,
            window: (0, 0),
            onchain: None,
            tx_hash: None,
            storage_locations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn window(mut self, from_block: u64, to_block: u64) -> Self {
        self.window = (from_block, to_block);
        self
    }

    #[must_use]
    pub fn onchain(mut self, onchain: ArtifactHead) -> Self {
        self.onchain = Some(onchain);
        self
    }

    pub fn set_tx_hash(&mut self, tx_hash: B256) {
        self.tx_hash = Some(tx_hash);
    }

    pub fn stored_at(&mut self, location: impl Into<String>) {
        self.storage_locations.push(location.into());
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::warn!(%warning, "Rebuild warning");
        self.warnings.push(warning);
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Close the report. `updated` is only ever true for [`RebuildReason::Pushed`].
    #[must_use]
    pub fn finish(self, reason: RebuildReason) -> RebuildResult {
        RebuildResult {
            ok: true,
            updated: reason == RebuildReason::Pushed,
            reason,
            artifact_written: !self.storage_locations.is_empty(),
            tx_hash: self.tx_hash,
            count: self.count,
            round: self.computed.round,
            file_root: self.computed.root,
            onchain_root: self.onchain.map(|head| head.root),
            onchain_round: self.onchain.map(|head| head.round),
            reward_amount: self.reward_amount,
            from_block: self.window.0,
            to_block: self.window.1,
            storage_locations: self.storage_locations,
            warnings: self.warnings,
        }
    }
}

mod u256_string {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        U256::from_str_radix(&s, 10).map_err(serde::de::Error::custom)
    }
}
