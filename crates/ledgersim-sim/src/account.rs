//! Simulated actor accounts.

use std::collections::BTreeSet;

use ledgersim_types::{ADDRESS_LENGTH, Address};

use crate::SimRng;

/// An account that random operations may act on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimAccount {
    pub address: Address,
}

impl SimAccount {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

/// Generates `n` distinct random accounts, in generation order.
pub fn random_accounts(rng: &mut SimRng, n: usize) -> Vec<SimAccount> {
    let mut seen = BTreeSet::new();
    let mut accounts = Vec::with_capacity(n);
    while accounts.len() < n {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        rng.fill_bytes(&mut bytes);
        let address = Address::from_bytes(bytes);
        if seen.insert(address) {
            accounts.push(SimAccount::new(address));
        }
    }
    accounts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accounts_are_distinct_and_reproducible() {
        let a = random_accounts(&mut SimRng::new(11), 64);
        let b = random_accounts(&mut SimRng::new(11), 64);
        assert_eq!(a, b);
        let unique: BTreeSet<_> = a.iter().collect();
        assert_eq!(unique.len(), 64);
    }
}
