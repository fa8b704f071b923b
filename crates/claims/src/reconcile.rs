//! Root Reconciliation
//!
//! Compares a freshly computed `(round, root)` against the last published
//! artifact and the distributor's on-chain state, and decides what has to be
//! written where.

use crate::artifact::ArtifactHead;
use serde::Serialize;

/// Classification of one rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reconciliation {
    /// No eligible accounts; the distributor is never updated
    Empty,
    /// Artifact and distributor already hold the computed head
    Unchanged,
    /// Artifact is stale, distributor is in sync
    NeedsArtifactUpdate,
    /// Distributor root or round is behind the computed head
    NeedsOnchainPush,
}

/// Everything the decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileInput {
    /// Freshly computed head
    pub computed: ArtifactHead,
    /// Number of eligible accounts behind `computed`
    pub eligible: usize,
    /// Head every storage destination already holds, if they agree
    pub published: Option<ArtifactHead>,
    /// Distributor `merkleRoot()` / `round()`
    pub onchain: ArtifactHead,
}

/// What the publisher has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub classification: Reconciliation,
    /// (Re)write the artifact to stale destinations
    pub write_artifact: bool,
    /// Submit `setRoot(root, round)`
    pub push_root: bool,
}

/// Whether the distributor must be moved to `computed`.
///
/// The round comparison is strict: recomputing inside the same round only
/// pushes when the root itself changed.
#[must_use]
pub fn needs_onchain_push(computed: &ArtifactHead, onchain: &ArtifactHead) -> bool {
    computed.root != onchain.root || computed.round > onchain.round
}

/// Decide the plan for one rebuild.
#[must_use]
pub fn reconcile(input: &ReconcileInput) -> ReconcilePlan {
    let write_artifact = input.published != Some(input.computed);

    if input.eligible == 0 {
        return ReconcilePlan {
            classification: Reconciliation::Empty,
            write_artifact,
            push_root: false,
        };
    }

    let push_root = needs_onchain_push(&input.computed, &input.onchain);

    let classification = if push_root {
        Reconciliation::NeedsOnchainPush
    } else if write_artifact {
        Reconciliation::NeedsArtifactUpdate
    } else {
        Reconciliation::Unchanged
    };

    ReconcilePlan {
        classification,
        write_artifact,
        push_root,
    }
}
