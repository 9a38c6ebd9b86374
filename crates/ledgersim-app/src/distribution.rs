//! Fee distribution, rewards and the community pool.
//!
//! Fees collected during a block are allocated at the start of the next
//! one: the community tax goes to the community pool, the rest is split
//! across bonded validators by tokens. Each validator's share is divided
//! into its commission and a reward pool its delegators withdraw from in
//! proportion to their shares. Rounding dust goes to the community pool.

use ledgersim_store::{KvStoreExt, MemKv, MultiStore};
use ledgersim_types::{Address, Amount};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::keys::{
    COMMUNITY_POOL_KEY, DISTRIBUTION, DISTRIBUTION_STORE, FEE_COLLECTOR, PARAMS_KEY,
    VALIDATOR_REWARDS_PREFIX, WITHDRAW_ADDRESS_PREFIX, address_key, is_module_account,
};
use crate::staking::mul_div;
use crate::{AppError, TxError, bank, staking};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionParams {
    pub community_tax_bps: u32,
}

impl Default for DistributionParams {
    fn default() -> Self {
        Self {
            community_tax_bps: 200,
        }
    }
}

/// Undistributed rewards of one validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRewards {
    pub validator: Address,
    pub commission: Amount,
    /// Rewards owed to the validator's delegators.
    pub pool: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawAddress {
    pub delegator: Address,
    pub withdraw_to: Address,
}

fn kv(ms: &MultiStore) -> Result<&MemKv, AppError> {
    Ok(ms.store(DISTRIBUTION_STORE)?)
}

fn kv_mut(ms: &mut MultiStore) -> Result<&mut MemKv, AppError> {
    Ok(ms.store_mut(DISTRIBUTION_STORE)?)
}

pub fn params(ms: &MultiStore) -> Result<DistributionParams, AppError> {
    Ok(kv(ms)?.get_typed(PARAMS_KEY)?.unwrap_or_default())
}

pub(crate) fn set_params(ms: &mut MultiStore, params: &DistributionParams) -> Result<(), AppError> {
    kv_mut(ms)?.set_typed(PARAMS_KEY.to_vec(), params)?;
    Ok(())
}

pub fn community_pool(ms: &MultiStore) -> Result<Amount, AppError> {
    Ok(kv(ms)?.get_typed(COMMUNITY_POOL_KEY)?.unwrap_or(0))
}

pub(crate) fn set_community_pool(ms: &mut MultiStore, amount: Amount) -> Result<(), AppError> {
    kv_mut(ms)?.set_typed(COMMUNITY_POOL_KEY.to_vec(), &amount)?;
    Ok(())
}

pub fn rewards(ms: &MultiStore, validator: &Address) -> Result<ValidatorRewards, AppError> {
    Ok(kv(ms)?
        .get_typed(&address_key(VALIDATOR_REWARDS_PREFIX, validator))?
        .unwrap_or(ValidatorRewards {
            validator: *validator,
            commission: 0,
            pool: 0,
        }))
}

pub(crate) fn set_rewards(ms: &mut MultiStore, rewards: &ValidatorRewards) -> Result<(), AppError> {
    let key = address_key(VALIDATOR_REWARDS_PREFIX, &rewards.validator);
    kv_mut(ms)?.set_typed(key, rewards)?;
    Ok(())
}

pub fn all_rewards(ms: &MultiStore) -> Result<Vec<ValidatorRewards>, AppError> {
    Ok(kv(ms)?
        .collect_prefix(VALIDATOR_REWARDS_PREFIX)?
        .into_iter()
        .map(|(_, r)| r)
        .collect())
}

pub(crate) fn init_validator(ms: &mut MultiStore, validator: &Address) -> Result<(), AppError> {
    let current = rewards(ms, validator)?;
    set_rewards(ms, &current)
}

pub fn withdraw_address(ms: &MultiStore, delegator: &Address) -> Result<Address, AppError> {
    let entry: Option<WithdrawAddress> =
        kv(ms)?.get_typed(&address_key(WITHDRAW_ADDRESS_PREFIX, delegator))?;
    Ok(entry.map_or(*delegator, |e| e.withdraw_to))
}

pub fn withdraw_addresses(ms: &MultiStore) -> Result<Vec<WithdrawAddress>, AppError> {
    Ok(kv(ms)?
        .collect_prefix(WITHDRAW_ADDRESS_PREFIX)?
        .into_iter()
        .map(|(_, w)| w)
        .collect())
}

pub fn set_withdraw_address(
    ms: &mut MultiStore,
    delegator: &Address,
    withdraw_to: &Address,
) -> Result<(), TxError> {
    if is_module_account(withdraw_to) {
        return Err(TxError::rejected(format!(
            "{withdraw_to} is a module account"
        )));
    }
    let entry = WithdrawAddress {
        delegator: *delegator,
        withdraw_to: *withdraw_to,
    };
    kv_mut(ms)?.set_typed(address_key(WITHDRAW_ADDRESS_PREFIX, delegator), &entry)?;
    Ok(())
}

/// Allocates everything in the fee collector. Runs at the start of a block.
pub fn allocate_fees(ms: &mut MultiStore) -> Result<(), AppError> {
    let fees = bank::balance(ms, &FEE_COLLECTOR.address())?;
    if fees == 0 {
        return Ok(());
    }
    bank::send(ms, &FEE_COLLECTOR.address(), &DISTRIBUTION.address(), fees)?;

    let tax = mul_div(fees, u64::from(params(ms)?.community_tax_bps), 10_000).min(fees);
    let to_validators = fees - tax;

    let bonded: Vec<_> = staking::validators(ms)?
        .into_iter()
        .filter(staking::Validator::is_bonded)
        .collect();
    let bonded_tokens: u128 = bonded.iter().map(|v| u128::from(v.tokens)).sum();

    let mut distributed: Amount = 0;
    if bonded_tokens > 0 {
        for v in &bonded {
            let weighted = u128::from(to_validators) * u128::from(v.tokens) / bonded_tokens;
            let share = u64::try_from(weighted).unwrap_or(to_validators);
            let commission = mul_div(share, u64::from(v.commission_bps), 10_000);
            let mut r = rewards(ms, &v.operator)?;
            r.commission += commission;
            r.pool += share - commission;
            set_rewards(ms, &r)?;
            distributed += share;
        }
    }

    let community = community_pool(ms)?;
    set_community_pool(ms, community + (fees - distributed))?;
    debug!(fees, tax, distributed, validators = bonded.len(), "fees allocated");
    Ok(())
}

/// Pays the delegation's share of its validator's reward pool to the
/// delegator's withdraw address. Returns the amount paid.
pub fn withdraw_delegation_rewards(
    ms: &mut MultiStore,
    delegator: &Address,
    validator: &Address,
) -> Result<Amount, TxError> {
    let d = staking::delegation(ms, delegator, validator)?
        .ok_or_else(|| {
            TxError::rejected(format!("no delegation from {delegator} to {validator}"))
        })?;
    let v = staking::validator(ms, validator)?
        .ok_or_else(|| {
            TxError::rejected(format!("validator {validator} not found"))
        })?;
    if v.delegator_shares == 0 {
        return Ok(0);
    }

    let mut r = rewards(ms, validator)?;
    let payout = mul_div(r.pool, d.shares, v.delegator_shares).min(r.pool);
    if payout == 0 {
        return Ok(0);
    }
    r.pool -= payout;
    set_rewards(ms, &r)?;
    let to = withdraw_address(ms, delegator)?;
    bank::send(ms, &DISTRIBUTION.address(), &to, payout)?;
    Ok(payout)
}

/// Withdraws pending rewards before a delegation's shares change.
pub(crate) fn settle_delegation_rewards(
    ms: &mut MultiStore,
    delegator: &Address,
    validator: &Address,
) -> Result<Amount, TxError> {
    if staking::delegation(ms, delegator, validator)?.is_none() {
        return Ok(0);
    }
    withdraw_delegation_rewards(ms, delegator, validator)
}

pub fn withdraw_validator_commission(
    ms: &mut MultiStore,
    operator: &Address,
) -> Result<Amount, TxError> {
    if staking::validator(ms, operator)?.is_none() {
        return Err(TxError::rejected(format!("validator {operator} not found")));
    }
    let mut r = rewards(ms, operator)?;
    if r.commission == 0 {
        return Err(TxError::rejected("no commission to withdraw"));
    }
    let payout = r.commission;
    r.commission = 0;
    set_rewards(ms, &r)?;
    let to = withdraw_address(ms, operator)?;
    bank::send(ms, &DISTRIBUTION.address(), &to, payout)?;
    Ok(payout)
}

/// Pays out the community pool.
pub fn spend_community_pool(
    ms: &mut MultiStore,
    recipient: &Address,
    amount: Amount,
) -> Result<(), TxError> {
    let pool = community_pool(ms)?;
    if pool < amount {
        return Err(TxError::rejected(format!(
            "community pool holds {pool}, cannot spend {amount}"
        )));
    }
    set_community_pool(ms, pool - amount)?;
    bank::send(ms, &DISTRIBUTION.address(), recipient, amount)?;
    Ok(())
}

/// Withdraws every commission and every delegation reward, as done before
/// exporting state for a new chain.
pub fn withdraw_all(ms: &mut MultiStore) -> Result<(), AppError> {
    for v in staking::validators(ms)? {
        if rewards(ms, &v.operator)?.commission > 0 {
            withdraw_validator_commission(ms, &v.operator)?;
        }
    }
    for d in staking::delegations(ms)? {
        withdraw_delegation_rewards(ms, &d.delegator, &d.validator)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::STORE_NAMES;
    use ledgersim_types::ADDRESS_LENGTH;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; ADDRESS_LENGTH])
    }

    /// Two bonded validators with 300 and 100 tokens, 10% commission each.
    fn ledger() -> MultiStore {
        let mut ms = MultiStore::with_stores(STORE_NAMES);
        for b in 1..=3 {
            bank::mint(&mut ms, &addr(b), 1_000).unwrap();
        }
        staking::create_validator(&mut ms, &addr(1), 300, 1_000, "a").unwrap();
        staking::create_validator(&mut ms, &addr(2), 100, 1_000, "b").unwrap();
        staking::apply_validator_set_updates(&mut ms).unwrap();
        ms
    }

    fn books_balance(ms: &MultiStore) -> bool {
        let owed: Amount = all_rewards(ms)
            .unwrap()
            .iter()
            .map(|r| r.commission + r.pool)
            .sum();
        bank::balance(ms, &DISTRIBUTION.address()).unwrap() == community_pool(ms).unwrap() + owed
    }

    #[test]
    fn fees_split_between_tax_commission_and_delegators() {
        let mut ms = ledger();
        bank::send(&mut ms, &addr(3), &FEE_COLLECTOR.address(), 1_000).unwrap();
        allocate_fees(&mut ms).unwrap();

        // 2% tax = 20; 980 split 735 / 245.
        let a = rewards(&ms, &addr(1)).unwrap();
        let b = rewards(&ms, &addr(2)).unwrap();
        assert_eq!((a.commission, a.pool), (73, 662));
        assert_eq!((b.commission, b.pool), (24, 221));
        assert_eq!(community_pool(&ms).unwrap(), 20);
        assert_eq!(bank::balance(&ms, &FEE_COLLECTOR.address()).unwrap(), 0);
        assert!(books_balance(&ms));
    }

    #[test]
    fn without_bonded_validators_everything_goes_to_the_community_pool() {
        let mut ms = MultiStore::with_stores(STORE_NAMES);
        bank::mint(&mut ms, &FEE_COLLECTOR.address(), 500).unwrap();
        allocate_fees(&mut ms).unwrap();
        assert_eq!(community_pool(&ms).unwrap(), 500);
        assert!(books_balance(&ms));
    }

    #[test]
    fn rewards_follow_the_withdraw_address() {
        let mut ms = ledger();
        bank::send(&mut ms, &addr(3), &FEE_COLLECTOR.address(), 1_000).unwrap();
        allocate_fees(&mut ms).unwrap();

        set_withdraw_address(&mut ms, &addr(1), &addr(3)).unwrap();
        let before = bank::balance(&ms, &addr(3)).unwrap();
        let paid = withdraw_delegation_rewards(&mut ms, &addr(1), &addr(1)).unwrap();
        assert_eq!(paid, 662);
        assert_eq!(bank::balance(&ms, &addr(3)).unwrap(), before + 662);
        assert!(books_balance(&ms));

        assert!(set_withdraw_address(&mut ms, &addr(1), &DISTRIBUTION.address()).is_err());
    }

    #[test]
    fn delegating_settles_pending_rewards_first() {
        let mut ms = ledger();
        bank::send(&mut ms, &addr(3), &FEE_COLLECTOR.address(), 1_000).unwrap();
        allocate_fees(&mut ms).unwrap();

        let before = bank::balance(&ms, &addr(2)).unwrap();
        staking::delegate(&mut ms, &addr(2), &addr(2), 100).unwrap();
        assert_eq!(bank::balance(&ms, &addr(2)).unwrap(), before + 221 - 100);
        assert_eq!(rewards(&ms, &addr(2)).unwrap().pool, 0);
    }

    #[test]
    fn zero_height_preparation_empties_rewards() {
        let mut ms = ledger();
        bank::send(&mut ms, &addr(3), &FEE_COLLECTOR.address(), 1_000).unwrap();
        allocate_fees(&mut ms).unwrap();
        withdraw_all(&mut ms).unwrap();
        for r in all_rewards(&ms).unwrap() {
            assert_eq!((r.commission, r.pool), (0, 0));
        }
        assert!(books_balance(&ms));
        assert_eq!(
            bank::balance(&ms, &DISTRIBUTION.address()).unwrap(),
            community_pool(&ms).unwrap()
        );
    }
}
