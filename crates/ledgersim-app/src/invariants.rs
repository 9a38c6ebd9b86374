//! Ledger invariants.
//!
//! Each invariant balances a module account against the records that claim
//! its funds. They are registered with the harness as `module/route` and
//! also run once over every imported genesis.

use ledgersim_sim::{InvariantRegistry, InvariantReport};
use ledgersim_store::MultiStore;
use ledgersim_types::Address;

use crate::keys::{BONDED_POOL, DISTRIBUTION, GOV, NOT_BONDED_POOL};
use crate::staking::BondStatus;
use crate::{AppError, SimApp, bank, distribution, gov, staking};

/// A ledger invariant over raw stores.
pub type StoreInvariant = fn(&MultiStore) -> Result<InvariantReport, AppError>;

/// `(module, route, check)` for every ledger invariant.
pub const ALL: [(&str, &str, StoreInvariant); 5] = [
    ("bank", "total-supply", total_supply),
    ("staking", "module-accounts", staking_module_accounts),
    ("staking", "delegator-shares", delegator_shares),
    ("distribution", "module-account", distribution_module_account),
    ("gov", "module-account", gov_module_account),
];

/// Registry of every ledger invariant for simulation runs.
pub fn registry() -> InvariantRegistry<SimApp> {
    let mut registry = InvariantRegistry::new();
    for (module, route, check) in ALL {
        registry.register(module, route, move |app: &SimApp| {
            evaluate(check, app.stores())
        });
    }
    registry
}

fn evaluate(check: StoreInvariant, ms: &MultiStore) -> InvariantReport {
    check(ms).unwrap_or_else(|e| {
        InvariantReport::broken(format!("cannot read state: {e}"))
    })
}

/// Runs every invariant over `ms`; returns the first broken one as
/// `(module/route, message)`.
pub fn check_stores(ms: &MultiStore) -> Option<(String, String)> {
    ALL.iter().find_map(|(module, route, check)| {
        let report = evaluate(*check, ms);
        report
            .broken
            .then(|| (format!("{module}/{route}"), report.message))
    })
}

fn balance(ms: &MultiStore, addr: &Address) -> Result<u128, AppError> {
    Ok(u128::from(bank::balance(ms, addr)?))
}

/// The recorded supply equals the sum of all balances.
pub fn total_supply(ms: &MultiStore) -> Result<InvariantReport, AppError> {
    let sum: u128 = bank::balances(ms)?.values().map(|b| u128::from(*b)).sum();
    let supply = u128::from(bank::supply(ms)?);
    Ok(InvariantReport::check(
        sum != supply,
        format!("sum of balances: {sum}\nsupply: {supply}"),
    ))
}

/// Pools hold exactly the tokens of the validators in them plus pending
/// unbondings.
pub fn staking_module_accounts(ms: &MultiStore) -> Result<InvariantReport, AppError> {
    let mut bonded: u128 = 0;
    let mut not_bonded: u128 = 0;
    for v in staking::validators(ms)? {
        match v.status {
            BondStatus::Bonded => bonded += u128::from(v.tokens),
            BondStatus::Unbonded => not_bonded += u128::from(v.tokens),
        }
    }
    for ubd in staking::unbondings(ms)? {
        not_bonded += ubd
            .entries
            .iter()
            .map(|e| u128::from(e.amount))
            .sum::<u128>();
    }

    let bonded_pool = balance(ms, &BONDED_POOL.address())?;
    let not_bonded_pool = balance(ms, &NOT_BONDED_POOL.address())?;
    Ok(InvariantReport::check(
        bonded != bonded_pool || not_bonded != not_bonded_pool,
        format!(
            "bonded pool: {bonded_pool} (validators: {bonded})\n\
             not bonded pool: {not_bonded_pool} (validators and unbondings: {not_bonded})"
        ),
    ))
}

/// Each validator's issued shares equal the sum of its delegations.
pub fn delegator_shares(ms: &MultiStore) -> Result<InvariantReport, AppError> {
    let validators = staking::validators(ms)?;
    let mut issued: std::collections::BTreeMap<Address, u128> =
        validators.iter().map(|v| (v.operator, 0)).collect();
    for d in staking::delegations(ms)? {
        match issued.get_mut(&d.validator) {
            Some(total) => *total += u128::from(d.shares),
            None => {
                return Ok(InvariantReport::broken(format!(
                    "delegation from {} to missing validator {}",
                    d.delegator, d.validator
                )));
            }
        }
    }

    let mut lines = Vec::new();
    for v in &validators {
        let delegated = issued.get(&v.operator).copied().unwrap_or(0);
        if delegated != u128::from(v.delegator_shares) {
            lines.push(format!(
                "validator {}: shares {} != delegations {delegated}",
                v.operator, v.delegator_shares
            ));
        }
    }
    Ok(InvariantReport::check(!lines.is_empty(), lines.join("\n")))
}

/// The distribution account holds the community pool and every
/// outstanding reward.
pub fn distribution_module_account(ms: &MultiStore) -> Result<InvariantReport, AppError> {
    let mut owed = u128::from(distribution::community_pool(ms)?);
    for r in distribution::all_rewards(ms)? {
        owed += u128::from(r.commission) + u128::from(r.pool);
    }
    let held = balance(ms, &DISTRIBUTION.address())?;
    Ok(InvariantReport::check(
        owed != held,
        format!("distribution account: {held}\ncommunity pool and rewards: {owed}"),
    ))
}

/// The gov account holds exactly the open deposits.
pub fn gov_module_account(ms: &MultiStore) -> Result<InvariantReport, AppError> {
    let deposits: u128 = gov::deposits(ms)?
        .iter()
        .map(|d| u128::from(d.amount))
        .sum();
    let held = balance(ms, &GOV.address())?;
    Ok(InvariantReport::check(
        deposits != held,
        format!("gov account: {held}\ndeposits: {deposits}"),
    ))
}
