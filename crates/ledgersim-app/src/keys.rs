//! Store names, key layouts and module accounts.
//!
//! Every store is an ordered byte map, so keys are built as a fixed ASCII
//! prefix followed by fixed-width components (20-byte addresses, big-endian
//! integers). Big-endian components keep numeric order equal to byte order.

use ledgersim_types::{ADDRESS_LENGTH, Address, ModuleName, Timestamp};

use crate::AppError;

// ============================================================================
// Stores
// ============================================================================

pub const BANK_STORE: &str = "bank";
pub const STAKING_STORE: &str = "staking";
pub const DISTRIBUTION_STORE: &str = "distribution";
pub const SLASHING_STORE: &str = "slashing";
pub const GOV_STORE: &str = "gov";

pub const STORE_NAMES: [&str; 5] = [
    BANK_STORE,
    STAKING_STORE,
    DISTRIBUTION_STORE,
    SLASHING_STORE,
    GOV_STORE,
];

// ============================================================================
// Module accounts
// ============================================================================

pub const FEE_COLLECTOR: ModuleName = ModuleName::new("fee_collector");
pub const DISTRIBUTION: ModuleName = ModuleName::new("distribution");
pub const BONDED_POOL: ModuleName = ModuleName::new("bonded_tokens_pool");
pub const NOT_BONDED_POOL: ModuleName = ModuleName::new("not_bonded_tokens_pool");
pub const GOV: ModuleName = ModuleName::new("gov");

pub const MODULE_ACCOUNTS: [ModuleName; 5] =
    [FEE_COLLECTOR, DISTRIBUTION, BONDED_POOL, NOT_BONDED_POOL, GOV];

pub fn is_module_account(addr: &Address) -> bool {
    MODULE_ACCOUNTS.iter().any(|m| m.address() == *addr)
}

// ============================================================================
// Key prefixes
// ============================================================================

/// Module parameters; one per store.
pub const PARAMS_KEY: &[u8] = b"params";

pub const BALANCE_PREFIX: &[u8] = b"balance/";
pub const SUPPLY_KEY: &[u8] = b"supply";

pub const VALIDATOR_PREFIX: &[u8] = b"validator/";
pub const DELEGATION_PREFIX: &[u8] = b"delegation/";
pub const UNBONDING_PREFIX: &[u8] = b"ubd/";
pub const REDELEGATION_PREFIX: &[u8] = b"red/";
/// Completion time → `(delegator, validator)` pairs, in insertion order.
pub const UNBONDING_QUEUE_PREFIX: &[u8] = b"ubdq/";
/// Completion time → `(delegator, src, dst)` triples, in insertion order.
pub const REDELEGATION_QUEUE_PREFIX: &[u8] = b"redq/";

pub const COMMUNITY_POOL_KEY: &[u8] = b"community_pool";
pub const VALIDATOR_REWARDS_PREFIX: &[u8] = b"rewards/";
pub const WITHDRAW_ADDRESS_PREFIX: &[u8] = b"withdraw_addr/";

pub const SIGNING_INFO_PREFIX: &[u8] = b"signing_info/";

pub const NEXT_PROPOSAL_ID_KEY: &[u8] = b"next_proposal_id";
pub const PROPOSAL_PREFIX: &[u8] = b"proposal/";
pub const DEPOSIT_PREFIX: &[u8] = b"deposit/";
pub const VOTE_PREFIX: &[u8] = b"vote/";

// ============================================================================
// Key builders
// ============================================================================

pub fn address_key(prefix: &[u8], addr: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + ADDRESS_LENGTH);
    key.extend_from_slice(prefix);
    key.extend_from_slice(addr.as_bytes());
    key
}

pub fn pair_key(prefix: &[u8], a: &Address, b: &Address) -> Vec<u8> {
    let mut key = address_key(prefix, a);
    key.extend_from_slice(b.as_bytes());
    key
}

pub fn triple_key(prefix: &[u8], a: &Address, b: &Address, c: &Address) -> Vec<u8> {
    let mut key = pair_key(prefix, a, b);
    key.extend_from_slice(c.as_bytes());
    key
}

pub fn time_key(prefix: &[u8], time: Timestamp) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(&time.as_secs().to_be_bytes());
    key
}

pub fn proposal_key(id: u64) -> Vec<u8> {
    id_key(PROPOSAL_PREFIX, id)
}

pub fn id_key(prefix: &[u8], id: u64) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn id_address_key(prefix: &[u8], id: u64, addr: &Address) -> Vec<u8> {
    let mut key = id_key(prefix, id);
    key.extend_from_slice(addr.as_bytes());
    key
}

/// Reads the address stored right after `prefix` in `key`.
pub fn address_after(prefix: &[u8], key: &[u8]) -> Result<Address, AppError> {
    key.strip_prefix(prefix)
        .and_then(|rest| rest.get(..ADDRESS_LENGTH))
        .and_then(|bytes| <[u8; ADDRESS_LENGTH]>::try_from(bytes).ok())
        .map(Address::from_bytes)
        .ok_or_else(|| AppError::CorruptKey(hex(key)))
}

/// Reads the big-endian time stored right after `prefix` in `key`.
pub fn time_after(prefix: &[u8], key: &[u8]) -> Result<Timestamp, AppError> {
    key.strip_prefix(prefix)
        .and_then(|rest| <[u8; 8]>::try_from(rest).ok())
        .map(|bytes| Timestamp::from_secs(u64::from_be_bytes(bytes)))
        .ok_or_else(|| AppError::CorruptKey(hex(key)))
}

fn hex(key: &[u8]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_keys_sort_by_time() {
        let early = time_key(UNBONDING_QUEUE_PREFIX, Timestamp::from_secs(255));
        let late = time_key(UNBONDING_QUEUE_PREFIX, Timestamp::from_secs(256));
        assert!(early < late);
        assert_eq!(
            time_after(UNBONDING_QUEUE_PREFIX, &late).unwrap(),
            Timestamp::from_secs(256)
        );
    }

    #[test]
    fn queue_prefixes_do_not_shadow_records() {
        assert!(!UNBONDING_PREFIX.starts_with(UNBONDING_QUEUE_PREFIX));
        assert!(!REDELEGATION_PREFIX.starts_with(REDELEGATION_QUEUE_PREFIX));
        assert!(!pair_key(UNBONDING_PREFIX, &Address::default(), &Address::default())
            .starts_with(UNBONDING_QUEUE_PREFIX));
    }

    #[test]
    fn address_round_trips_through_keys() {
        let addr = Address::from_bytes([7; ADDRESS_LENGTH]);
        let key = address_key(BALANCE_PREFIX, &addr);
        assert_eq!(address_after(BALANCE_PREFIX, &key).unwrap(), addr);
        assert!(address_after(BALANCE_PREFIX, b"balance/short").is_err());
    }

    #[test]
    fn module_accounts_are_recognized() {
        assert!(is_module_account(&GOV.address()));
        assert!(!is_module_account(&Address::from_bytes([1; ADDRESS_LENGTH])));
    }
}
