//! Genesis state: import, export and random generation.
//!
//! The genesis document is the JSON rendering of [`GenesisState`]. Export
//! and import are inverses over every store key except the staking
//! maturity queues, which import rebuilds from the unbonding and
//! redelegation entries.

use std::collections::{BTreeMap, BTreeSet};

use ledgersim_sim::{ParamResolver, SimAccount, SimConfig, SimError, SimRng};
use ledgersim_store::MultiStore;
use ledgersim_types::{Address, Amount};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::distribution::{DistributionParams, ValidatorRewards, WithdrawAddress};
use crate::gov::{Deposit, GovParams, Proposal, Vote};
use crate::keys::NOT_BONDED_POOL;
use crate::slashing::{SigningInfo, SlashingParams};
use crate::staking::{
    BondStatus, Delegation, Redelegation, StakingParams, UnbondingDelegation, Validator,
};
use crate::{AppError, bank, distribution, gov, slashing, staking};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankGenesis {
    pub balances: BTreeMap<Address, Amount>,
    pub supply: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingGenesis {
    pub params: StakingParams,
    pub validators: Vec<Validator>,
    pub delegations: Vec<Delegation>,
    pub unbonding_delegations: Vec<UnbondingDelegation>,
    pub redelegations: Vec<Redelegation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionGenesis {
    pub params: DistributionParams,
    pub community_pool: Amount,
    pub validator_rewards: Vec<ValidatorRewards>,
    pub withdraw_addresses: Vec<WithdrawAddress>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlashingGenesis {
    pub params: SlashingParams,
    pub signing_infos: Vec<SigningInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovGenesis {
    pub params: GovParams,
    pub next_proposal_id: u64,
    pub proposals: Vec<Proposal>,
    pub deposits: Vec<Deposit>,
    pub votes: Vec<Vote>,
}

impl Default for GovGenesis {
    fn default() -> Self {
        Self {
            params: GovParams::default(),
            next_proposal_id: 1,
            proposals: Vec::new(),
            deposits: Vec::new(),
            votes: Vec::new(),
        }
    }
}

/// Complete application state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisState {
    pub bank: BankGenesis,
    pub staking: StakingGenesis,
    pub distribution: DistributionGenesis,
    pub slashing: SlashingGenesis,
    pub gov: GovGenesis,
}

impl GenesisState {
    pub fn from_value(value: &Value) -> Result<Self, AppError> {
        Ok(Self::deserialize(value)?)
    }

    pub fn to_value(&self) -> Result<Value, AppError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Structural checks that do not need a store. Pool balances are
    /// checked by the invariants once the state is loaded.
    pub fn validate(&self) -> Result<(), AppError> {
        let total = self
            .bank
            .balances
            .values()
            .try_fold(0u64, |acc, b| acc.checked_add(*b))
            .ok_or_else(|| {
                AppError::InvalidGenesis("balances overflow the supply".to_string())
            })?;
        if total != self.bank.supply {
            return Err(AppError::InvalidGenesis(format!(
                "supply {} does not match balances {total}",
                self.bank.supply
            )));
        }

        let mut operators = BTreeSet::new();
        for v in &self.staking.validators {
            if !operators.insert(v.operator) {
                return Err(AppError::InvalidGenesis(format!(
                    "duplicate validator {}",
                    v.operator
                )));
            }
        }
        for d in &self.staking.delegations {
            if !operators.contains(&d.validator) {
                return Err(AppError::InvalidGenesis(format!(
                    "delegation from {} to unknown validator {}",
                    d.delegator, d.validator
                )));
            }
        }
        if self.staking.params.max_validators == 0 {
            return Err(AppError::InvalidGenesis(
                "max_validators must be positive".to_string(),
            ));
        }
        if self.gov.next_proposal_id == 0 {
            return Err(AppError::InvalidGenesis(
                "proposal ids start at 1".to_string(),
            ));
        }
        let next_id = self.gov.next_proposal_id;
        if let Some(p) = self.gov.proposals.iter().find(|p| p.id >= next_id) {
            return Err(AppError::InvalidGenesis(format!(
                "proposal {} is not below next id {}",
                p.id, self.gov.next_proposal_id
            )));
        }
        Ok(())
    }
}

/// Reads the complete state out of `ms`.
pub fn export(ms: &MultiStore) -> Result<GenesisState, AppError> {
    Ok(GenesisState {
        bank: BankGenesis {
            balances: bank::balances(ms)?,
            supply: bank::supply(ms)?,
        },
        staking: StakingGenesis {
            params: staking::params(ms)?,
            validators: staking::validators(ms)?,
            delegations: staking::delegations(ms)?,
            unbonding_delegations: staking::unbondings(ms)?,
            redelegations: staking::redelegations(ms)?,
        },
        distribution: DistributionGenesis {
            params: distribution::params(ms)?,
            community_pool: distribution::community_pool(ms)?,
            validator_rewards: distribution::all_rewards(ms)?,
            withdraw_addresses: distribution::withdraw_addresses(ms)?,
        },
        slashing: SlashingGenesis {
            params: slashing::params(ms)?,
            signing_infos: slashing::signing_infos(ms)?,
        },
        gov: GovGenesis {
            params: gov::params(ms)?,
            next_proposal_id: gov::next_proposal_id(ms)?,
            proposals: gov::proposals(ms)?,
            deposits: gov::deposits(ms)?,
            votes: gov::votes(ms)?,
        },
    })
}

/// Writes `genesis` into empty stores.
pub fn init(ms: &mut MultiStore, genesis: &GenesisState) -> Result<(), AppError> {
    genesis.validate()?;

    for (addr, amount) in &genesis.bank.balances {
        bank::set_balance(ms, addr, *amount)?;
    }
    bank::set_supply(ms, genesis.bank.supply)?;

    let st = &genesis.staking;
    staking::set_params(ms, &st.params)?;
    for v in &st.validators {
        staking::set_validator(ms, v)?;
    }
    for d in &st.delegations {
        staking::set_delegation(ms, d)?;
    }
    for ubd in &st.unbonding_delegations {
        staking::set_unbonding(ms, ubd)?;
        for e in &ubd.entries {
            staking::push_unbonding_queue(ms, e.completion_time, ubd.delegator, ubd.validator)?;
        }
    }
    for red in &st.redelegations {
        staking::set_redelegation(ms, red)?;
        for e in &red.entries {
            staking::push_redelegation_queue(
                ms,
                e.completion_time,
                red.delegator,
                red.src,
                red.dst,
            )?;
        }
    }

    let dist = &genesis.distribution;
    distribution::set_params(ms, &dist.params)?;
    distribution::set_community_pool(ms, dist.community_pool)?;
    for r in &dist.validator_rewards {
        distribution::set_rewards(ms, r)?;
    }
    for w in &dist.withdraw_addresses {
        distribution::set_withdraw_address(ms, &w.delegator, &w.withdraw_to)
            .map_err(AppError::from)?;
    }

    slashing::set_params(ms, &genesis.slashing.params)?;
    for info in &genesis.slashing.signing_infos {
        slashing::set_signing_info(ms, info)?;
    }

    let g = &genesis.gov;
    gov::set_params(ms, &g.params)?;
    gov::set_next_proposal_id(ms, g.next_proposal_id)?;
    for p in &g.proposals {
        gov::set_proposal(ms, p)?;
    }
    for d in &g.deposits {
        gov::set_deposit(ms, d)?;
    }
    for v in &g.votes {
        gov::set_vote(ms, v)?;
    }

    debug!(
        accounts = genesis.bank.balances.len(),
        validators = st.validators.len(),
        proposals = g.proposals.len(),
        "genesis loaded"
    );
    Ok(())
}

// ============================================================================
// Random genesis
// ============================================================================

/// Draws module parameters and funds `accounts`; the first
/// `initially_bonded` of them become validators with a self-delegation.
/// Every parameter is drawn through `resolver` so a run records it.
pub fn random_genesis(
    rng: &mut SimRng,
    accounts: &[SimAccount],
    _config: &SimConfig,
    resolver: &mut ParamResolver<'_>,
) -> Result<Value, SimError> {
    let staking_params = StakingParams {
        max_validators: resolver.resolve("max_validators", rng, |r| {
            u32::try_from(r.next_u64_inclusive(1, 250)).unwrap_or(250)
        })?,
        unbonding_time_secs: resolver.resolve("unbonding_time", rng, |r| {
            r.next_u64_inclusive(60, 60 * 60 * 24 * 3)
        })?,
    };
    let distribution_params = DistributionParams {
        community_tax_bps: resolver.resolve("community_tax_bps", rng, |r| {
            u32::try_from(r.next_u64_inclusive(1, 30) * 100).unwrap_or(200)
        })?,
    };
    let slashing_params = SlashingParams {
        slash_fraction_bps: resolver.resolve("slash_fraction_double_sign_bps", rng, |r| {
            u32::try_from(r.next_u64_inclusive(10, 500)).unwrap_or(500)
        })?,
        jail_duration_secs: resolver.resolve("downtime_jail_duration", rng, |r| {
            r.next_u64_inclusive(60, 60 * 60)
        })?,
    };
    let gov_params = GovParams {
        min_deposit: resolver.resolve("min_deposit", rng, |r| {
            r.next_u64_inclusive(1_000, 100_000)
        })?,
        max_deposit_period_secs: resolver.resolve("max_deposit_period", rng, |r| {
            r.next_u64_inclusive(60, 60 * 60 * 2)
        })?,
        voting_period_secs: resolver.resolve("voting_period", rng, |r| {
            r.next_u64_inclusive(60, 60 * 60 * 2)
        })?,
    };

    let initial_stake: Amount = resolver.resolve("initial_stake", rng, |r| {
        r.next_u64_inclusive(100_000, 1_000_000)
    })?;
    let max_bonded = accounts.len() as u64;
    let initially_bonded: u64 = resolver.resolve("initially_bonded_validators", rng, |r| {
        if max_bonded == 0 {
            0
        } else {
            r.next_u64_inclusive(1, max_bonded.min(250))
        }
    })?;
    let initially_bonded = usize::try_from(initially_bonded)
        .unwrap_or(usize::MAX)
        .min(accounts.len());

    let mut balances = BTreeMap::new();
    let mut validators = Vec::with_capacity(initially_bonded);
    let mut delegations = Vec::with_capacity(initially_bonded);
    let mut validator_rewards = Vec::with_capacity(initially_bonded);
    let mut bonded_total: Amount = 0;

    for (i, account) in accounts.iter().enumerate() {
        let mut spendable = initial_stake;
        if i < initially_bonded {
            let self_bond = initial_stake / 2;
            spendable -= self_bond;
            bonded_total += self_bond;
            let commission = u32::try_from(rng.next_u64_inclusive(0, 2_000)).unwrap_or(0);
            let mut v = Validator::new(account.address, commission, format!("validator-{i}"));
            v.tokens = self_bond;
            v.delegator_shares = self_bond;
            v.status = BondStatus::Unbonded;
            validators.push(v);
            delegations.push(Delegation {
                delegator: account.address,
                validator: account.address,
                shares: self_bond,
            });
            validator_rewards.push(ValidatorRewards {
                validator: account.address,
                commission: 0,
                pool: 0,
            });
        }
        balances.insert(account.address, spendable);
    }
    if bonded_total > 0 {
        balances.insert(NOT_BONDED_POOL.address(), bonded_total);
    }
    let supply = balances.values().sum();

    let genesis = GenesisState {
        bank: BankGenesis { balances, supply },
        staking: StakingGenesis {
            params: staking_params,
            validators,
            delegations,
            ..StakingGenesis::default()
        },
        distribution: DistributionGenesis {
            params: distribution_params,
            validator_rewards,
            ..DistributionGenesis::default()
        },
        slashing: SlashingGenesis {
            params: slashing_params,
            signing_infos: Vec::new(),
        },
        gov: GovGenesis {
            params: gov_params,
            ..GovGenesis::default()
        },
    };
    genesis
        .to_value()
        .map_err(|e| SimError::Genesis(e.to_string()))
}
