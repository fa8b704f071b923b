//! Eligible account set for one round.

use alloy_primitives::Address;
use std::collections::BTreeSet;

/// Deduplicated recipients, ordered ascending by address bytes.
///
/// Ordering by bytes is the same as ordering the lowercase hex form, so the
/// tree layout does not depend on log delivery order or address casing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibleSet {
    accounts: BTreeSet<Address>,
}

impl EligibleSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an account, returning whether it was new.
    pub fn insert(&mut self, account: Address) -> bool {
        self.accounts.insert(account)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    #[must_use]
    pub fn contains(&self, account: &Address) -> bool {
        self.accounts.contains(account)
    }

    /// Accounts in canonical order
    #[must_use]
    pub fn to_vec(&self) -> Vec<Address> {
        self.accounts.iter().copied().collect()
    }
}

impl FromIterator<Address> for EligibleSet {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self {
            accounts: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for EligibleSet {
    type Item = Address;
    type IntoIter = std::collections::btree_set::IntoIter<Address>;

    fn into_iter(self) -> Self::IntoIter {
        self.accounts.into_iter()
    }
}
