//! # Airdrop Claims
//!
//! Deterministic core of the hourly mint airdrop:
//! - `(account, amount, round)` claim leaves, byte-compatible with the distributor
//! - sorted-pair Merkle roots and proofs
//! - the proofs artifact published for claimants
//! - reconciliation of a computed root against published and on-chain state
//! - the rebuild result reported back to triggers

pub mod artifact;
pub mod eligible;
pub mod leaf;
pub mod merkle;
pub mod reconcile;
pub mod report;

pub use artifact::{ArtifactHead, ClaimEntry, ClaimsError, ProofsPayload};
pub use eligible::EligibleSet;
pub use leaf::{encode_leaf, leaf_hash};
pub use merkle::{hash_sorted_pair, MerkleTree, EMPTY_ROOT};
pub use reconcile::{needs_onchain_push, reconcile, ReconcileInput, ReconcilePlan, Reconciliation};
pub use report::{RebuildReason, RebuildResult, ReportBuilder};
