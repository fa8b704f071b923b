//! Claims Artifact
//!
//! The proofs file published for each round and read by claimants.
//!
//! Wire format (stable, consumed by the claim front-end):
//! ```json
//! {
//!   "round": 500000,
//!   "root": "0x…64 hex…",
//!   "claims": [
//!     { "account": "0x…40 hex, EIP-55…", "amount": "1000000000000000000", "proof": ["0x…"] }
//!   ]
//! }
//! ```

use crate::eligible::EligibleSet;
use crate::leaf::leaf_hash;
use crate::merkle::{self, MerkleTree, EMPTY_ROOT};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from artifact handling.
#[derive(Error, Debug)]
pub enum ClaimsError {
    #[error("Invalid artifact JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Duplicate account {0} in artifact")]
    DuplicateAccount(Address),

    #[error("Account {0} not found in artifact")]
    AccountNotFound(Address),

    #[error("Proof for {account} does not match root {root}")]
    ProofMismatch { account: Address, root: B256 },
}

/// One account's claim and its proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEntry {
    /// Recipient address
    #[serde(with = "checksum_address")]
    pub account: Address,

    /// Claimable amount in wei
    #[serde(with = "u256_decimal")]
    pub amount: U256,

    /// Sibling path from the claim leaf to the root
    #[serde(with = "proof_vec_serde")]
    pub proof: Vec<B256>,
}

impl ClaimEntry {
    /// Leaf this entry commits to in `round`.
    #[must_use]
    pub fn leaf(&self, round: u64) -> B256 {
        leaf_hash(self.account, self.amount, round)
    }
}

/// Identity of a published artifact, used for idempotence checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactHead {
    pub round: u64,
    #[serde(with = "hex_bytes32")]
    pub root: B256,
}

impl ArtifactHead {
    #[must_use]
    pub const fn new(round: u64, root: B256) -> Self {
        Self { round, root }
    }
}

/// Full proofs payload for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofsPayload {
    /// Round the leaves were built for
    pub round: u64,

    /// Merkle root over every claim leaf
    #[serde(with = "hex_bytes32")]
    pub root: B256,

    /// Claims ordered by account
    pub claims: Vec<ClaimEntry>,
}

impl ProofsPayload {
    /// Build the payload for `eligible` accounts, each receiving `amount`.
    ///
    /// An empty set yields [`EMPTY_ROOT`] and no claims.
    #[must_use]
    pub fn build(eligible: &EligibleSet, amount: U256, round: u64) -> Self {
        let accounts = eligible.to_vec();
        let leaves: Vec<B256> = accounts
            .iter()
            .map(|account| leaf_hash(*account, amount, round))
            .collect();

        let tree = MerkleTree::new(leaves);
        let root = tree.root();

        let claims = accounts
            .into_iter()
            .zip(tree.proofs())
            .map(|(account, proof)| ClaimEntry {
                account,
                amount,
                proof,
            })
            .collect();

        tracing::debug!(round, count = eligible.len(), root = %root, "Built proofs payload");

        Self {
            round,
            root,
            claims,
        }
    }

    /// Payload for a round with no eligible accounts.
    #[must_use]
    pub fn empty(round: u64) -> Self {
        Self {
            round,
            root: EMPTY_ROOT,
            claims: Vec::new(),
        }
    }

    #[must_use]
    pub fn head(&self) -> ArtifactHead {
        ArtifactHead::new(self.round, self.root)
    }

    /// Find the claim for `account`.
    #[must_use]
    pub fn claim_for(&self, account: &Address) -> Option<&ClaimEntry> {
        self.claims.iter().find(|claim| &claim.account == account)
    }

    /// Check that `account`'s proof re-derives the root.
    ///
    /// # Errors
    /// Returns an error if the account is absent or its proof does not match.
    pub fn verify_claim(&self, account: &Address) -> Result<&ClaimEntry, ClaimsError> {
        let claim = self
            .claim_for(account)
            .ok_or(ClaimsError::AccountNotFound(*account))?;

        if merkle::verify(claim.leaf(self.round), &claim.proof, self.root) {
            Ok(claim)
        } else {
            Err(ClaimsError::ProofMismatch {
                account: *account,
                root: self.root,
            })
        }
    }

    /// Accounts whose proof fails, in artifact order.
    #[must_use]
    pub fn invalid_claims(&self) -> Vec<Address> {
        self.claims
            .iter()
            .filter(|claim| !merkle::verify(claim.leaf(self.round), &claim.proof, self.root))
            .map(|claim| claim.account)
            .collect()
    }

    /// Serialize the way it is published.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, ClaimsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a published artifact, rejecting duplicate accounts.
    ///
    /// # Errors
    /// Returns an error on malformed JSON or a repeated account.
    pub fn from_json(json: &str) -> Result<Self, ClaimsError> {
        let payload: Self = serde_json::from_str(json)?;

        let mut seen = EligibleSet::new();
        for claim in &payload.claims {
            if !seen.insert(claim.account) {
                return Err(ClaimsError::DuplicateAccount(claim.account));
            }
        }

        Ok(payload)
    }
}

// Hex encoding helpers for serde

mod hex_bytes32 {
    use alloy_primitives::B256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &B256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<B256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_hex32(&s).map_err(serde::de::Error::custom)
    }
}

mod proof_vec_serde {
    use alloy_primitives::B256;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S>(data: &Vec<B256>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let hex_strings: Vec<String> = data
            .iter()
            .map(|h| format!("0x{}", hex::encode(h)))
            .collect();
        hex_strings.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<B256>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_strings: Vec<String> = Vec::deserialize(deserializer)?;
        hex_strings
            .iter()
            .map(|s| super::parse_hex32(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

mod checksum_address {
    use alloy_primitives::Address;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(address: &Address, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&address.to_checksum(None))
    }

    // any casing is accepted on the way in
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Address, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.trim().parse().map_err(serde::de::Error::custom)
    }
}

mod u256_decimal {
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

fn parse_hex32(s: &str) -> Result<B256, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| format!("invalid hex: {e}"))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| "expected 32 bytes".to_string())?;
    Ok(B256::from(bytes))
}
