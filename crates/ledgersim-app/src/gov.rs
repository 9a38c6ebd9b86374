//! Governance proposals, deposits, votes and tallying.
//!
//! A proposal starts in its deposit period; once its deposits reach the
//! minimum it enters the voting period. Deposits are held by the gov module
//! account until the proposal ends: refunded after a tally, burned when the
//! deposit period expires or the proposal is vetoed.

use ledgersim_store::{KvStore, KvStoreExt, MemKv, MultiStore};
use ledgersim_types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::keys::{
    DEPOSIT_PREFIX, GOV, GOV_STORE, NEXT_PROPOSAL_ID_KEY, PARAMS_KEY, PROPOSAL_PREFIX,
    VOTE_PREFIX, id_address_key, id_key, proposal_key,
};
use crate::{AppError, TxError, bank, distribution, staking};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovParams {
    pub min_deposit: Amount,
    pub max_deposit_period_secs: u64,
    pub voting_period_secs: u64,
}

impl Default for GovParams {
    fn default() -> Self {
        Self {
            min_deposit: 10_000,
            max_deposit_period_secs: 60 * 60 * 48,
            voting_period_secs: 60 * 60 * 48,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamChangeEntry {
    pub subspace: String,
    pub key: String,
    /// JSON-rendered value.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalContent {
    Text {
        title: String,
        description: String,
    },
    ParameterChange {
        title: String,
        changes: Vec<ParamChangeEntry>,
    },
    CommunityPoolSpend {
        title: String,
        recipient: Address,
        amount: Amount,
    },
}

impl ProposalContent {
    pub fn kind(&self) -> &'static str {
        match self {
            ProposalContent::Text { .. } => "text",
            ProposalContent::ParameterChange { .. } => "parameter_change",
            ProposalContent::CommunityPoolSpend { .. } => "community_pool_spend",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    DepositPeriod,
    VotingPeriod,
    Passed,
    Rejected,
    /// Passed, but its content could not be applied.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TallyResult {
    pub yes: Amount,
    pub abstain: Amount,
    pub no: Amount,
    pub no_with_veto: Amount,
}

impl TallyResult {
    pub fn total(&self) -> u128 {
        u128::from(self.yes)
            + u128::from(self.abstain)
            + u128::from(self.no)
            + u128::from(self.no_with_veto)
    }

    /// More than half of the voted power said yes.
    pub fn passes(&self) -> bool {
        let total = self.total();
        total > 0 && u128::from(self.yes) * 2 > total
    }

    /// More than a third of the voted power vetoed.
    pub fn vetoed(&self) -> bool {
        let total = self.total();
        total > 0 && u128::from(self.no_with_veto) * 3 > total
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub content: ProposalContent,
    pub proposer: Address,
    pub status: ProposalStatus,
    pub submit_time: Timestamp,
    pub deposit_end_time: Timestamp,
    pub total_deposit: Amount,
    pub voting_start_time: Option<Timestamp>,
    pub voting_end_time: Option<Timestamp>,
    pub final_tally: Option<TallyResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteOption {
    Yes,
    Abstain,
    No,
    NoWithVeto,
}

impl VoteOption {
    pub const ALL: [VoteOption; 4] = [
        VoteOption::Yes,
        VoteOption::Abstain,
        VoteOption::No,
        VoteOption::NoWithVeto,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub proposal_id: u64,
    pub depositor: Address,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: u64,
    pub voter: Address,
    pub option: VoteOption,
}

// ============================================================================
// Store access
// ============================================================================

fn kv(ms: &MultiStore) -> Result<&MemKv, AppError> {
    Ok(ms.store(GOV_STORE)?)
}

fn kv_mut(ms: &mut MultiStore) -> Result<&mut MemKv, AppError> {
    Ok(ms.store_mut(GOV_STORE)?)
}

pub fn params(ms: &MultiStore) -> Result<GovParams, AppError> {
    Ok(kv(ms)?.get_typed(PARAMS_KEY)?.unwrap_or_default())
}

pub(crate) fn set_params(ms: &mut MultiStore, params: &GovParams) -> Result<(), AppError> {
    kv_mut(ms)?.set_typed(PARAMS_KEY.to_vec(), params)?;
    Ok(())
}

pub fn next_proposal_id(ms: &MultiStore) -> Result<u64, AppError> {
    Ok(kv(ms)?.get_typed(NEXT_PROPOSAL_ID_KEY)?.unwrap_or(1))
}

pub(crate) fn set_next_proposal_id(ms: &mut MultiStore, id: u64) -> Result<(), AppError> {
    kv_mut(ms)?.set_typed(NEXT_PROPOSAL_ID_KEY.to_vec(), &id)?;
    Ok(())
}

pub fn proposal(ms: &MultiStore, id: u64) -> Result<Option<Proposal>, AppError> {
    Ok(kv(ms)?.get_typed(&proposal_key(id))?)
}

pub(crate) fn set_proposal(ms: &mut MultiStore, p: &Proposal) -> Result<(), AppError> {
    kv_mut(ms)?.set_typed(proposal_key(p.id), p)?;
    Ok(())
}

pub fn proposals(ms: &MultiStore) -> Result<Vec<Proposal>, AppError> {
    Ok(kv(ms)?
        .collect_prefix(PROPOSAL_PREFIX)?
        .into_iter()
        .map(|(_, p)| p)
        .collect())
}

pub fn proposals_with_status(
    ms: &MultiStore,
    status: ProposalStatus,
) -> Result<Vec<Proposal>, AppError> {
    Ok(proposals(ms)?
        .into_iter()
        .filter(|p| p.status == status)
        .collect())
}

pub fn deposits(ms: &MultiStore) -> Result<Vec<Deposit>, AppError> {
    Ok(kv(ms)?
        .collect_prefix(DEPOSIT_PREFIX)?
        .into_iter()
        .map(|(_, d)| d)
        .collect())
}

fn deposits_of(ms: &MultiStore, id: u64) -> Result<Vec<(Vec<u8>, Deposit)>, AppError> {
    Ok(kv(ms)?.collect_prefix(&id_key(DEPOSIT_PREFIX, id))?)
}

pub(crate) fn set_deposit(ms: &mut MultiStore, d: &Deposit) -> Result<(), AppError> {
    let key = id_address_key(DEPOSIT_PREFIX, d.proposal_id, &d.depositor);
    kv_mut(ms)?.set_typed(key, d)?;
    Ok(())
}

pub fn votes(ms: &MultiStore) -> Result<Vec<Vote>, AppError> {
    Ok(kv(ms)?
        .collect_prefix(VOTE_PREFIX)?
        .into_iter()
        .map(|(_, v)| v)
        .collect())
}

pub(crate) fn set_vote(ms: &mut MultiStore, v: &Vote) -> Result<(), AppError> {
    kv_mut(ms)?.set_typed(id_address_key(VOTE_PREFIX, v.proposal_id, &v.voter), v)?;
    Ok(())
}

// ============================================================================
// Messages
// ============================================================================

/// Submits a proposal with an initial deposit; returns its id.
pub fn submit_proposal(
    ms: &mut MultiStore,
    now: Timestamp,
    proposer: &Address,
    content: ProposalContent,
    initial_deposit: Amount,
) -> Result<u64, TxError> {
    let params = params(ms)?;
    let id = next_proposal_id(ms)?;
    set_next_proposal_id(ms, id + 1)?;

    set_proposal(
        ms,
        &Proposal {
            id,
            content,
            proposer: *proposer,
            status: ProposalStatus::DepositPeriod,
            submit_time: now,
            deposit_end_time: now.saturating_add_secs(params.max_deposit_period_secs),
            total_deposit: 0,
            voting_start_time: None,
            voting_end_time: None,
            final_tally: None,
        },
    )?;
    if initial_deposit > 0 {
        deposit(ms, now, id, proposer, initial_deposit)?;
    }
    Ok(id)
}

/// Adds a deposit; the proposal enters voting once the minimum is reached.
pub fn deposit(
    ms: &mut MultiStore,
    now: Timestamp,
    id: u64,
    depositor: &Address,
    amount: Amount,
) -> Result<(), TxError> {
    let mut p = proposal(ms, id)?
        .ok_or_else(|| TxError::rejected(format!("proposal {id} not found")))?;
    if p.status != ProposalStatus::DepositPeriod {
        return Err(TxError::rejected(format!(
            "proposal {id} is not taking deposits"
        )));
    }
    if amount == 0 {
        return Err(TxError::rejected("deposit must be positive"));
    }

    bank::send(ms, depositor, &GOV.address(), amount)?;
    let key = id_address_key(DEPOSIT_PREFIX, id, depositor);
    let existing: Option<Deposit> = kv(ms)?.get_typed(&key)?;
    set_deposit(
        ms,
        &Deposit {
            proposal_id: id,
            depositor: *depositor,
            amount: existing.map_or(0, |d| d.amount) + amount,
        },
    )?;

    p.total_deposit += amount;
    let params = params(ms)?;
    if p.total_deposit >= params.min_deposit {
        p.status = ProposalStatus::VotingPeriod;
        p.voting_start_time = Some(now);
        p.voting_end_time = Some(now.saturating_add_secs(params.voting_period_secs));
        info!(proposal = id, kind = p.content.kind(), "proposal entered voting period");
    }
    set_proposal(ms, &p)?;
    Ok(())
}

pub fn vote(
    ms: &mut MultiStore,
    id: u64,
    voter: &Address,
    option: VoteOption,
) -> Result<(), TxError> {
    let p = proposal(ms, id)?.ok_or_else(|| TxError::rejected(format!("proposal {id} not found")))?;
    if p.status != ProposalStatus::VotingPeriod {
        return Err(TxError::rejected(format!(
            "proposal {id} is not in its voting period"
        )));
    }
    set_vote(
        ms,
        &Vote {
            proposal_id: id,
            voter: *voter,
            option,
        },
    )?;
    Ok(())
}

// ============================================================================
// Block processing
// ============================================================================

/// Ends expired deposit periods and tallies finished votes.
pub fn end_block(ms: &mut MultiStore, now: Timestamp) -> Result<(), AppError> {
    for p in proposals_with_status(ms, ProposalStatus::DepositPeriod)? {
        if p.deposit_end_time <= now {
            settle_deposits(ms, p.id, false)?;
            kv_mut(ms)?.delete(&proposal_key(p.id));
            info!(proposal = p.id, "deposit period expired; deposits burned");
        }
    }

    for mut p in proposals_with_status(ms, ProposalStatus::VotingPeriod)? {
        if p.voting_end_time.is_some_and(|end| end <= now) {
            let tally = tally(ms, p.id)?;
            let vetoed = tally.vetoed();
            p.status = if vetoed || !tally.passes() {
                ProposalStatus::Rejected
            } else {
                match execute(ms, &p.content) {
                    Ok(()) => ProposalStatus::Passed,
                    Err(reason) => {
                        info!(proposal = p.id, %reason, "proposal passed but failed to apply");
                        ProposalStatus::Failed
                    }
                }
            };
            settle_deposits(ms, p.id, !vetoed)?;
            p.final_tally = Some(tally);
            info!(
                proposal = p.id,
                status = ?p.status,
                yes = tally.yes,
                no = tally.no,
                "proposal tallied"
            );
            set_proposal(ms, &p)?;
        }
    }
    Ok(())
}

/// Refunds or burns every deposit on a proposal and deletes the records.
fn settle_deposits(ms: &mut MultiStore, id: u64, refund: bool) -> Result<(), AppError> {
    for (key, d) in deposits_of(ms, id)? {
        if refund {
            bank::send(ms, &GOV.address(), &d.depositor, d.amount)?;
        } else {
            bank::burn(ms, &GOV.address(), d.amount)?;
        }
        kv_mut(ms)?.delete(&key);
    }
    Ok(())
}

/// Weighs each vote by the voter's bonded stake and deletes the votes.
fn tally(ms: &mut MultiStore, id: u64) -> Result<TallyResult, AppError> {
    let votes: Vec<(Vec<u8>, Vote)> = kv(ms)?.collect_prefix(&id_key(VOTE_PREFIX, id))?;
    let mut result = TallyResult::default();
    for (key, v) in votes {
        let power = staking::voting_power(ms, &v.voter)?;
        let bucket = match v.option {
            VoteOption::Yes => &mut result.yes,
            VoteOption::Abstain => &mut result.abstain,
            VoteOption::No => &mut result.no,
            VoteOption::NoWithVeto => &mut result.no_with_veto,
        };
        *bucket = bucket.saturating_add(power);
        kv_mut(ms)?.delete(&key);
    }
    Ok(result)
}

/// Applies a passed proposal. Parameter changes are all-or-nothing.
fn execute(ms: &mut MultiStore, content: &ProposalContent) -> Result<(), String> {
    match content {
        ProposalContent::Text { .. } => Ok(()),
        ProposalContent::ParameterChange { changes, .. } => {
            let mut params = staking::params(ms).map_err(|e| e.to_string())?;
            for change in changes {
                apply_param_change(&mut params, change)?;
            }
            staking::set_params(ms, &params).map_err(|e| e.to_string())
        }
        ProposalContent::CommunityPoolSpend {
            recipient,
            amount,
            ..
        } => {
            distribution::spend_community_pool(ms, recipient, *amount)
                .map_err(|e| e.to_string())
        }
    }
}

fn apply_param_change(
    params: &mut staking::StakingParams,
    change: &ParamChangeEntry,
) -> Result<(), String> {
    match (change.subspace.as_str(), change.key.as_str()) {
        ("staking", "MaxValidators") => {
            let n: u32 = change
                .value
                .parse()
                .map_err(|e| format!("bad MaxValidators {:?}: {e}", change.value))?;
            if n == 0 {
                return Err("MaxValidators must be positive".to_string());
            }
            params.max_validators = n;
        }
        ("staking", "UnbondingTime") => {
            let secs: u64 = change
                .value
                .trim_matches('"')
                .parse()
                .map_err(|e| format!("bad UnbondingTime {:?}: {e}", change.value))?;
            params.unbonding_time_secs = secs;
        }
        (subspace, key) => return Err(format!("unknown parameter {subspace}/{key}")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::STORE_NAMES;
    use ledgersim_types::ADDRESS_LENGTH;
    use test_case::test_case;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; ADDRESS_LENGTH])
    }

    fn ledger() -> MultiStore {
        let mut ms = MultiStore::with_stores(STORE_NAMES);
        for b in 1..=3 {
            bank::mint(&mut ms, &addr(b), 100_000).unwrap();
        }
        staking::create_validator(&mut ms, &addr(1), 600, 0, "a").unwrap();
        staking::create_validator(&mut ms, &addr(2), 400, 0, "b").unwrap();
        staking::apply_validator_set_updates(&mut ms).unwrap();
        ms
    }

    fn text() -> ProposalContent {
        ProposalContent::Text {
            title: "t".into(),
            description: "d".into(),
        }
    }

    fn gov_balance_matches(ms: &MultiStore) -> bool {
        let held: Amount = deposits(ms).unwrap().iter().map(|d| d.amount).sum();
        bank::balance(ms, &GOV.address()).unwrap() == held
    }

    #[test]
    fn minimum_deposit_opens_voting() {
        let mut ms = ledger();
        let t0 = Timestamp::from_secs(0);
        let id = submit_proposal(&mut ms, t0, &addr(3), text(), 4_000).unwrap();
        assert_eq!(proposal(&ms, id).unwrap().unwrap().status, ProposalStatus::DepositPeriod);

        deposit(&mut ms, t0, id, &addr(1), 6_000).unwrap();
        let p = proposal(&ms, id).unwrap().unwrap();
        assert_eq!(p.status, ProposalStatus::VotingPeriod);
        assert_eq!(p.total_deposit, 10_000);
        assert!(gov_balance_matches(&ms));
    }

    #[test]
    fn expired_deposit_period_burns_deposits() {
        let mut ms = ledger();
        let id = submit_proposal(&mut ms, Timestamp::from_secs(0), &addr(3), text(), 100).unwrap();
        let supply = bank::supply(&ms).unwrap();

        end_block(&mut ms, Timestamp::from_secs(60 * 60 * 48)).unwrap();
        assert!(proposal(&ms, id).unwrap().is_none());
        assert_eq!(bank::supply(&ms).unwrap(), supply - 100);
        assert!(gov_balance_matches(&ms));
    }

    #[test_case(VoteOption::Yes, VoteOption::No, ProposalStatus::Passed ; "majority yes")]
    #[test_case(VoteOption::No, VoteOption::Yes, ProposalStatus::Rejected ; "majority no")]
    #[test_case(VoteOption::Abstain, VoteOption::Yes, ProposalStatus::Rejected ; "abstain counts")]
    fn tally_is_weighted_by_stake(big: VoteOption, small: VoteOption, expected: ProposalStatus) {
        let mut ms = ledger();
        let t0 = Timestamp::from_secs(0);
        let id = submit_proposal(&mut ms, t0, &addr(3), text(), 10_000).unwrap();
        vote(&mut ms, id, &addr(1), big).unwrap();
        vote(&mut ms, id, &addr(2), small).unwrap();

        let deposit_holder = bank::balance(&ms, &addr(3)).unwrap();
        end_block(&mut ms, Timestamp::from_secs(60 * 60 * 48)).unwrap();
        let p = proposal(&ms, id).unwrap().unwrap();
        assert_eq!(p.status, expected);
        assert_eq!(p.final_tally.unwrap().total(), 1_000);
        assert_eq!(bank::balance(&ms, &addr(3)).unwrap(), deposit_holder + 10_000);
        assert!(votes(&ms).unwrap().is_empty());
    }

    #[test]
    fn passed_parameter_change_updates_staking() {
        let mut ms = ledger();
        let content = ProposalContent::ParameterChange {
            title: "p".into(),
            changes: vec![
                ParamChangeEntry {
                    subspace: "staking".into(),
                    key: "MaxValidators".into(),
                    value: "7".into(),
                },
                ParamChangeEntry {
                    subspace: "staking".into(),
                    key: "UnbondingTime".into(),
                    value: "\"3600\"".into(),
                },
            ],
        };
        let id =
            submit_proposal(&mut ms, Timestamp::from_secs(0), &addr(3), content, 10_000).unwrap();
        vote(&mut ms, id, &addr(1), VoteOption::Yes).unwrap();
        end_block(&mut ms, Timestamp::from_secs(60 * 60 * 48)).unwrap();

        assert_eq!(proposal(&ms, id).unwrap().unwrap().status, ProposalStatus::Passed);
        let params = staking::params(&ms).unwrap();
        assert_eq!(params.max_validators, 7);
        assert_eq!(params.unbonding_time_secs, 3_600);
    }

    #[test]
    fn overdrawn_community_spend_fails_but_refunds() {
        let mut ms = ledger();
        let content = ProposalContent::CommunityPoolSpend {
            title: "c".into(),
            recipient: addr(3),
            amount: 1,
        };
        let id =
            submit_proposal(&mut ms, Timestamp::from_secs(0), &addr(3), content, 10_000).unwrap();
        vote(&mut ms, id, &addr(1), VoteOption::Yes).unwrap();
        end_block(&mut ms, Timestamp::from_secs(60 * 60 * 48)).unwrap();

        assert_eq!(proposal(&ms, id).unwrap().unwrap().status, ProposalStatus::Failed);
        assert_eq!(bank::balance(&ms, &GOV.address()).unwrap(), 0);
    }

    #[test]
    fn veto_burns_deposits() {
        let mut ms = ledger();
        let id =
            submit_proposal(&mut ms, Timestamp::from_secs(0), &addr(3), text(), 10_000).unwrap();
        vote(&mut ms, id, &addr(1), VoteOption::NoWithVeto).unwrap();
        let supply = bank::supply(&ms).unwrap();
        end_block(&mut ms, Timestamp::from_secs(60 * 60 * 48)).unwrap();
        assert_eq!(proposal(&ms, id).unwrap().unwrap().status, ProposalStatus::Rejected);
        assert_eq!(bank::supply(&ms).unwrap(), supply - 10_000);
    }
}
