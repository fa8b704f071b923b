//! Claim Leaf Encoding
//!
//! A leaf commits to one claimable entry. The byte layout is shared with the
//! distributor's on-chain verifier and matches Solidity's
//! `keccak256(abi.encodePacked(address account, uint256 amount, uint64 round))`:
//!
//! | offset | width | field                     |
//! |--------|-------|---------------------------|
//! | 0      | 20    | account                   |
//! | 20     | 32    | amount, big-endian        |
//! | 52     | 8     | round, big-endian         |
//!
//! Changing any field order, width or the hash function invalidates every proof
//! already issued, and requires a distributor upgrade.

use alloy_primitives::{keccak256, Address, B256, U256};

/// Packed leaf preimage length in bytes
pub const LEAF_PREIMAGE_LEN: usize = 20 + 32 + 8;

/// Tightly packed `(account, amount, round)` preimage.
#[must_use]
pub fn encode_leaf(account: Address, amount: U256, round: u64) -> [u8; LEAF_PREIMAGE_LEN] {
    let mut packed = [0u8; LEAF_PREIMAGE_LEN];
    packed[..20].copy_from_slice(account.as_slice());
    packed[20..52].copy_from_slice(&amount.to_be_bytes::<32>());
    packed[52..].copy_from_slice(&round.to_be_bytes());
    packed
}

/// Leaf hash for one claim.
#[must_use]
pub fn leaf_hash(account: Address, amount: U256, round: u64) -> B256 {
    keccak256(encode_leaf(account, amount, round))
}
