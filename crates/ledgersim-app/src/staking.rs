//! Validators, delegations, unbonding and redelegation.
//!
//! Bonded validators hold their tokens in the bonded pool module account;
//! unbonded validators and maturing undelegations hold theirs in the
//! not-bonded pool. Every status change moves the validator's tokens between
//! the two pools, which is what `staking/module-accounts` checks.
//!
//! Delegator shares convert to tokens at the validator's current exchange
//! rate `tokens / delegator_shares`; slashing lowers the rate.

use ledgersim_store::{KvStore, KvStoreExt, MemKv, MultiStore};
use ledgersim_types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::keys::{
    BONDED_POOL, DELEGATION_PREFIX, NOT_BONDED_POOL, PARAMS_KEY, REDELEGATION_PREFIX,
    REDELEGATION_QUEUE_PREFIX, STAKING_STORE, UNBONDING_PREFIX, UNBONDING_QUEUE_PREFIX,
    VALIDATOR_PREFIX, address_key, pair_key, time_after, time_key, triple_key,
};
use crate::{AppError, TxError, bank, distribution};

/// Upper bound on a validator's commission, in basis points.
pub const MAX_COMMISSION_BPS: u32 = 10_000;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingParams {
    pub max_validators: u32,
    pub unbonding_time_secs: u64,
}

impl Default for StakingParams {
    fn default() -> Self {
        Self {
            max_validators: 100,
            unbonding_time_secs: 60 * 60 * 24 * 21,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondStatus {
    Unbonded,
    Bonded,
}

impl BondStatus {
    /// Module account holding the tokens of validators in this status.
    pub fn pool(self) -> Address {
        match self {
            BondStatus::Bonded => BONDED_POOL.address(),
            BondStatus::Unbonded => NOT_BONDED_POOL.address(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub operator: Address,
    pub tokens: Amount,
    pub delegator_shares: u64,
    pub status: BondStatus,
    pub jailed: bool,
    pub commission_bps: u32,
    pub moniker: String,
}

impl Validator {
    pub fn new(operator: Address, commission_bps: u32, moniker: impl Into<String>) -> Self {
        Self {
            operator,
            tokens: 0,
            delegator_shares: 0,
            status: BondStatus::Unbonded,
            jailed: false,
            commission_bps,
            moniker: moniker.into(),
        }
    }

    pub fn is_bonded(&self) -> bool {
        self.status == BondStatus::Bonded
    }

    /// Tokens currently backing `shares`, rounded down.
    pub fn tokens_from_shares(&self, shares: u64) -> Amount {
        if self.delegator_shares == 0 {
            return 0;
        }
        mul_div(self.tokens, shares, self.delegator_shares)
    }

    /// Shares issued for a deposit of `amount`, rounded down.
    ///
    /// `None` when existing shares are backed by no tokens at all: the
    /// exchange rate is undefined and the validator cannot take delegations.
    pub fn shares_from_tokens(&self, amount: Amount) -> Option<u64> {
        match (self.tokens, self.delegator_shares) {
            (_, 0) => Some(amount),
            (0, _) => None,
            (tokens, shares) => Some(mul_div(shares, amount, tokens)),
        }
    }
}

/// `a * b / c` in 128-bit arithmetic, saturating on the way back to `u64`.
pub(crate) fn mul_div(a: u64, b: u64, c: u64) -> u64 {
    let wide = u128::from(a) * u128::from(b) / u128::from(c);
    u64::try_from(wide).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: Address,
    pub validator: Address,
    pub shares: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingEntry {
    pub completion_time: Timestamp,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    pub delegator: Address,
    pub validator: Address,
    pub entries: Vec<UnbondingEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedelegationEntry {
    pub completion_time: Timestamp,
    /// Shares issued by the destination validator.
    pub shares: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redelegation {
    pub delegator: Address,
    pub src: Address,
    pub dst: Address,
    pub entries: Vec<RedelegationEntry>,
}

// ============================================================================
// Store access
// ============================================================================

fn kv(ms: &MultiStore) -> Result<&MemKv, AppError> {
    Ok(ms.store(STAKING_STORE)?)
}

fn kv_mut(ms: &mut MultiStore) -> Result<&mut MemKv, AppError> {
    Ok(ms.store_mut(STAKING_STORE)?)
}

pub fn params(ms: &MultiStore) -> Result<StakingParams, AppError> {
    Ok(kv(ms)?.get_typed(PARAMS_KEY)?.unwrap_or_default())
}

pub(crate) fn set_params(ms: &mut MultiStore, params: &StakingParams) -> Result<(), AppError> {
    kv_mut(ms)?.set_typed(PARAMS_KEY.to_vec(), params)?;
    Ok(())
}

pub fn validator(ms: &MultiStore, operator: &Address) -> Result<Option<Validator>, AppError> {
    Ok(kv(ms)?.get_typed(&address_key(VALIDATOR_PREFIX, operator))?)
}

pub(crate) fn set_validator(ms: &mut MultiStore, v: &Validator) -> Result<(), AppError> {
    kv_mut(ms)?.set_typed(address_key(VALIDATOR_PREFIX, &v.operator), v)?;
    Ok(())
}

/// All validators, ordered by operator address.
pub fn validators(ms: &MultiStore) -> Result<Vec<Validator>, AppError> {
    Ok(values(kv(ms)?.collect_prefix(VALIDATOR_PREFIX)?))
}

pub fn delegation(
    ms: &MultiStore,
    delegator: &Address,
    validator: &Address,
) -> Result<Option<Delegation>, AppError> {
    let key = pair_key(DELEGATION_PREFIX, delegator, validator);
    Ok(kv(ms)?.get_typed(&key)?)
}

/// Stores `d`, deleting it once no shares remain.
pub(crate) fn set_delegation(ms: &mut MultiStore, d: &Delegation) -> Result<(), AppError> {
    let key = pair_key(DELEGATION_PREFIX, &d.delegator, &d.validator);
    if d.shares == 0 {
        kv_mut(ms)?.delete(&key);
    } else {
        kv_mut(ms)?.set_typed(key, d)?;
    }
    Ok(())
}

pub fn delegations(ms: &MultiStore) -> Result<Vec<Delegation>, AppError> {
    Ok(values(kv(ms)?.collect_prefix(DELEGATION_PREFIX)?))
}

pub fn delegations_of(ms: &MultiStore, delegator: &Address) -> Result<Vec<Delegation>, AppError> {
    Ok(values(
        kv(ms)?.collect_prefix(&address_key(DELEGATION_PREFIX, delegator))?,
    ))
}

pub fn unbonding(
    ms: &MultiStore,
    delegator: &Address,
    validator: &Address,
) -> Result<Option<UnbondingDelegation>, AppError> {
    let key = pair_key(UNBONDING_PREFIX, delegator, validator);
    Ok(kv(ms)?.get_typed(&key)?)
}

pub(crate) fn set_unbonding(
    ms: &mut MultiStore,
    ubd: &UnbondingDelegation,
) -> Result<(), AppError> {
    let key = pair_key(UNBONDING_PREFIX, &ubd.delegator, &ubd.validator);
    if ubd.entries.is_empty() {
        kv_mut(ms)?.delete(&key);
    } else {
        kv_mut(ms)?.set_typed(key, ubd)?;
    }
    Ok(())
}

pub fn unbondings(ms: &MultiStore) -> Result<Vec<UnbondingDelegation>, AppError> {
    Ok(values(kv(ms)?.collect_prefix(UNBONDING_PREFIX)?))
}

pub fn redelegation(
    ms: &MultiStore,
    delegator: &Address,
    src: &Address,
    dst: &Address,
) -> Result<Option<Redelegation>, AppError> {
    let key = triple_key(REDELEGATION_PREFIX, delegator, src, dst);
    Ok(kv(ms)?.get_typed(&key)?)
}

pub(crate) fn set_redelegation(ms: &mut MultiStore, red: &Redelegation) -> Result<(), AppError> {
    let key = triple_key(REDELEGATION_PREFIX, &red.delegator, &red.src, &red.dst);
    if red.entries.is_empty() {
        kv_mut(ms)?.delete(&key);
    } else {
        kv_mut(ms)?.set_typed(key, red)?;
    }
    Ok(())
}

pub fn redelegations(ms: &MultiStore) -> Result<Vec<Redelegation>, AppError> {
    Ok(values(kv(ms)?.collect_prefix(REDELEGATION_PREFIX)?))
}

fn values<T>(entries: Vec<(Vec<u8>, T)>) -> Vec<T> {
    entries.into_iter().map(|(_, v)| v).collect()
}

pub(crate) fn push_unbonding_queue(
    ms: &mut MultiStore,
    at: Timestamp,
    delegator: Address,
    validator: Address,
) -> Result<(), AppError> {
    let key = time_key(UNBONDING_QUEUE_PREFIX, at);
    let store = kv_mut(ms)?;
    let mut pairs: Vec<(Address, Address)> = store.get_typed(&key)?.unwrap_or_default();
    pairs.push((delegator, validator));
    store.set_typed(key, &pairs)?;
    Ok(())
}

pub(crate) fn push_redelegation_queue(
    ms: &mut MultiStore,
    at: Timestamp,
    delegator: Address,
    src: Address,
    dst: Address,
) -> Result<(), AppError> {
    let key = time_key(REDELEGATION_QUEUE_PREFIX, at);
    let store = kv_mut(ms)?;
    let mut triples: Vec<(Address, Address, Address)> = store.get_typed(&key)?.unwrap_or_default();
    triples.push((delegator, src, dst));
    store.set_typed(key, &triples)?;
    Ok(())
}

/// Removes and returns every queue entry due at or before `now`.
fn pop_due<T: serde::de::DeserializeOwned>(
    ms: &mut MultiStore,
    prefix: &[u8],
    now: Timestamp,
) -> Result<Vec<T>, AppError> {
    let mut due_keys = Vec::new();
    for key in kv(ms)?.keys_with_prefix(prefix) {
        if time_after(prefix, &key)? > now {
            break;
        }
        due_keys.push(key);
    }

    let store = kv_mut(ms)?;
    let mut due = Vec::new();
    for key in due_keys {
        let batch: Vec<T> = store.get_typed(&key)?.unwrap_or_default();
        store.delete(&key);
        due.extend(batch);
    }
    Ok(due)
}

// ============================================================================
// Messages
// ============================================================================

fn require_validator(ms: &MultiStore, operator: &Address) -> Result<Validator, TxError> {
    validator(ms, operator)?.ok_or_else(|| {
        TxError::rejected(format!("validator {operator} not found"))
    })
}

fn check_commission(commission_bps: u32) -> Result<(), TxError> {
    if commission_bps > MAX_COMMISSION_BPS {
        return Err(TxError::rejected(format!(
            "commission {commission_bps} bps exceeds {MAX_COMMISSION_BPS}"
        )));
    }
    Ok(())
}

pub fn create_validator(
    ms: &mut MultiStore,
    operator: &Address,
    self_delegation: Amount,
    commission_bps: u32,
    moniker: &str,
) -> Result<(), TxError> {
    if validator(ms, operator)?.is_some() {
        return Err(TxError::rejected(format!(
            "validator {operator} already exists"
        )));
    }
    check_commission(commission_bps)?;
    if self_delegation == 0 {
        return Err(TxError::rejected("self-delegation must be positive"));
    }

    set_validator(ms, &Validator::new(*operator, commission_bps, moniker))?;
    distribution::init_validator(ms, operator)?;
    delegate(ms, operator, operator, self_delegation)?;
    debug!(%operator, self_delegation, "validator created");
    Ok(())
}

pub fn edit_validator(
    ms: &mut MultiStore,
    operator: &Address,
    commission_bps: Option<u32>,
    moniker: Option<&str>,
) -> Result<(), TxError> {
    let mut v = require_validator(ms, operator)?;
    if let Some(rate) = commission_bps {
        check_commission(rate)?;
        v.commission_bps = rate;
    }
    if let Some(name) = moniker {
        v.moniker = name.to_string();
    }
    set_validator(ms, &v)?;
    Ok(())
}

/// Bonds `amount` from `delegator` to `validator`; returns the shares issued.
pub fn delegate(
    ms: &mut MultiStore,
    delegator: &Address,
    validator: &Address,
    amount: Amount,
) -> Result<u64, TxError> {
    let mut v = require_validator(ms, validator)?;
    if amount == 0 {
        return Err(TxError::rejected("delegation amount must be positive"));
    }
    let shares = v
        .shares_from_tokens(amount)
        .ok_or_else(|| {
            TxError::rejected(format!(
                "validator {validator} has no tokens backing its shares"
            ))
        })?;
    if shares == 0 {
        return Err(TxError::rejected("delegation too small to issue shares"));
    }

    distribution::settle_delegation_rewards(ms, delegator, validator)?;
    bank::send(ms, delegator, &v.status.pool(), amount)?;

    v.tokens += amount;
    v.delegator_shares += shares;
    set_validator(ms, &v)?;

    let mut d = delegation(ms, delegator, validator)?.unwrap_or(Delegation {
        delegator: *delegator,
        validator: *validator,
        shares: 0,
    });
    d.shares += shares;
    set_delegation(ms, &d)?;
    Ok(shares)
}

/// Removes `shares` from a delegation and the validator; returns the tokens
/// they were worth. Tokens stay in the validator's current pool.
fn remove_shares(
    ms: &mut MultiStore,
    v: &mut Validator,
    delegator: &Address,
    shares: u64,
) -> Result<Amount, TxError> {
    let mut d = delegation(ms, delegator, &v.operator)?
        .ok_or_else(|| {
            TxError::rejected(format!("no delegation from {delegator} to {}", v.operator))
        })?;
    if shares == 0 || shares > d.shares {
        return Err(TxError::rejected(format!(
            "cannot remove {shares} shares from a delegation of {}",
            d.shares
        )));
    }
    let amount = v.tokens_from_shares(shares);
    if amount == 0 {
        return Err(TxError::rejected("shares are worth no tokens"));
    }

    distribution::settle_delegation_rewards(ms, delegator, &v.operator)?;

    d.shares -= shares;
    set_delegation(ms, &d)?;
    v.tokens -= amount;
    v.delegator_shares -= shares;
    Ok(amount)
}

/// Starts unbonding `shares`; the tokens are paid out once the unbonding
/// time has passed. Returns the amount unbonding.
pub fn undelegate(
    ms: &mut MultiStore,
    now: Timestamp,
    delegator: &Address,
    validator: &Address,
    shares: u64,
) -> Result<Amount, TxError> {
    let mut v = require_validator(ms, validator)?;
    let amount = remove_shares(ms, &mut v, delegator, shares)?;
    if v.is_bonded() {
        bank::send(
            ms,
            &BONDED_POOL.address(),
            &NOT_BONDED_POOL.address(),
            amount,
        )?;
    }
    set_validator(ms, &v)?;

    let completion_time = now.saturating_add_secs(params(ms)?.unbonding_time_secs);
    let mut ubd = unbonding(ms, delegator, validator)?.unwrap_or(UnbondingDelegation {
        delegator: *delegator,
        validator: *validator,
        entries: Vec::new(),
    });
    ubd.entries.push(UnbondingEntry {
        completion_time,
        amount,
    });
    set_unbonding(ms, &ubd)?;
    push_unbonding_queue(ms, completion_time, *delegator, *validator)?;
    Ok(amount)
}

/// Moves `shares` worth of stake from `src` to `dst` immediately.
///
/// A delegator cannot redelegate away from a validator while a redelegation
/// into that validator is still maturing.
pub fn begin_redelegate(
    ms: &mut MultiStore,
    now: Timestamp,
    delegator: &Address,
    src: &Address,
    dst: &Address,
    shares: u64,
) -> Result<u64, TxError> {
    if src == dst {
        return Err(TxError::rejected("cannot redelegate to the same validator"));
    }
    let mut src_v = require_validator(ms, src)?;
    let mut dst_v = require_validator(ms, dst)?;

    let incoming = kv(ms)?
        .collect_prefix::<Redelegation>(&address_key(REDELEGATION_PREFIX, delegator))?
        .into_iter()
        .any(|(_, red)| red.dst == *src && !red.entries.is_empty());
    if incoming {
        return Err(TxError::rejected(format!(
            "redelegation into {src} is still maturing"
        )));
    }

    // Validate the destination before touching any state.
    let preview = src_v.tokens_from_shares(shares);
    match dst_v.shares_from_tokens(preview) {
        Some(n) if n > 0 => {}
        _ => {
            return Err(TxError::rejected(format!(
                "validator {dst} cannot take the redelegation"
            )));
        }
    }

    distribution::settle_delegation_rewards(ms, delegator, dst)?;
    let amount = remove_shares(ms, &mut src_v, delegator, shares)?;
    let new_shares = dst_v
        .shares_from_tokens(amount)
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            TxError::rejected(format!("validator {dst} cannot take the redelegation"))
        })?;

    if src_v.status != dst_v.status {
        bank::send(ms, &src_v.status.pool(), &dst_v.status.pool(), amount)?;
    }
    dst_v.tokens += amount;
    dst_v.delegator_shares += new_shares;
    set_validator(ms, &src_v)?;
    set_validator(ms, &dst_v)?;

    let mut d = delegation(ms, delegator, dst)?.unwrap_or(Delegation {
        delegator: *delegator,
        validator: *dst,
        shares: 0,
    });
    d.shares += new_shares;
    set_delegation(ms, &d)?;

    let completion_time = now.saturating_add_secs(params(ms)?.unbonding_time_secs);
    let mut red = redelegation(ms, delegator, src, dst)?.unwrap_or(Redelegation {
        delegator: *delegator,
        src: *src,
        dst: *dst,
        entries: Vec::new(),
    });
    red.entries.push(RedelegationEntry {
        completion_time,
        shares: new_shares,
    });
    set_redelegation(ms, &red)?;
    push_redelegation_queue(ms, completion_time, *delegator, *src, *dst)?;
    Ok(new_shares)
}

// ============================================================================
// Slashing hooks
// ============================================================================

/// Burns `fraction_bps` of the validator's tokens and jails it. Returns the
/// amount burned.
pub fn slash_and_jail(
    ms: &mut MultiStore,
    operator: &Address,
    fraction_bps: u32,
) -> Result<Amount, TxError> {
    let mut v = require_validator(ms, operator)?;
    let burned = mul_div(v.tokens, u64::from(fraction_bps), 10_000);
    bank::burn(ms, &v.status.pool(), burned)?;
    v.tokens -= burned;
    v.jailed = true;
    set_validator(ms, &v)?;
    Ok(burned)
}

pub fn set_jailed(ms: &mut MultiStore, operator: &Address, jailed: bool) -> Result<(), TxError> {
    let mut v = require_validator(ms, operator)?;
    v.jailed = jailed;
    set_validator(ms, &v)?;
    Ok(())
}

/// Voting power of `voter`: the tokens behind their delegations to bonded
/// validators.
pub fn voting_power(ms: &MultiStore, voter: &Address) -> Result<Amount, AppError> {
    let mut power: Amount = 0;
    for d in delegations_of(ms, voter)? {
        if let Some(v) = validator(ms, &d.validator)? {
            if v.is_bonded() {
                power = power.saturating_add(v.tokens_from_shares(d.shares));
            }
        }
    }
    Ok(power)
}

// ============================================================================
// Block processing
// ============================================================================

/// Matures unbondings and redelegations, then recomputes the bonded set.
/// Returns the number of bonded validators.
pub fn end_block(ms: &mut MultiStore, now: Timestamp) -> Result<usize, AppError> {
    complete_unbondings(ms, now)?;
    complete_redelegations(ms, now)?;
    apply_validator_set_updates(ms)
}

fn complete_unbondings(ms: &mut MultiStore, now: Timestamp) -> Result<(), AppError> {
    let due: Vec<(Address, Address)> = pop_due(ms, UNBONDING_QUEUE_PREFIX, now)?;
    for (delegator, validator) in due {
        let Some(mut ubd) = unbonding(ms, &delegator, &validator)? else {
            continue;
        };
        let (matured, pending): (Vec<_>, Vec<_>) = ubd
            .entries
            .into_iter()
            .partition(|e| e.completion_time <= now);
        ubd.entries = pending;
        set_unbonding(ms, &ubd)?;

        let payout: Amount = matured.iter().map(|e| e.amount).sum();
        if payout > 0 {
            bank::send(ms, &NOT_BONDED_POOL.address(), &delegator, payout)?;
            debug!(%delegator, %validator, payout, "unbonding completed");
        }
    }
    Ok(())
}

fn complete_redelegations(ms: &mut MultiStore, now: Timestamp) -> Result<(), AppError> {
    let due: Vec<(Address, Address, Address)> = pop_due(ms, REDELEGATION_QUEUE_PREFIX, now)?;
    for (delegator, src, dst) in due {
        if let Some(mut red) = redelegation(ms, &delegator, &src, &dst)? {
            red.entries.retain(|e| e.completion_time > now);
            set_redelegation(ms, &red)?;
        }
    }
    Ok(())
}

/// Bonds the `max_validators` unjailed validators with the most tokens
/// (ties broken by operator address) and unbonds everyone else.
pub fn apply_validator_set_updates(ms: &mut MultiStore) -> Result<usize, AppError> {
    let max = params(ms)?.max_validators as usize;
    let mut all = validators(ms)?;

    let mut ranked: Vec<&Validator> = all.iter().filter(|v| !v.jailed && v.tokens > 0).collect();
    ranked.sort_by(|a, b| {
        b.tokens.cmp(&a.tokens).then(a.operator.cmp(&b.operator))
    });
    let bonded: std::collections::BTreeSet<Address> =
        ranked.into_iter().take(max).map(|v| v.operator).collect();

    for v in &mut all {
        let wanted = if bonded.contains(&v.operator) {
            BondStatus::Bonded
        } else {
            BondStatus::Unbonded
        };
        if v.status != wanted {
            if v.tokens > 0 {
                bank::send(ms, &v.status.pool(), &wanted.pool(), v.tokens)?;
            }
            debug!(
                operator = %v.operator,
                from = ?v.status,
                to = ?wanted,
                "validator status changed"
            );
            v.status = wanted;
            set_validator(ms, v)?;
        }
    }
    Ok(bonded.len())
}

pub fn bonded_count(ms: &MultiStore) -> Result<usize, AppError> {
    Ok(validators(ms)?.iter().filter(|v| v.is_bonded()).count())
}
