//! Proposal submission, deposits and the votes that follow a submission.

use ledgersim_sim::{
    FutureOperation, Operation, OperationContext, OperationError, OperationOutcome, OperationResult,
    ParamChange, SimRng, operation,
};
use ledgersim_types::{Address, Height};

use super::{balance, deliver, pick_account, random_amount, random_text, read};
use crate::gov::{ParamChangeEntry, ProposalContent, ProposalStatus, VoteOption};
use crate::msg::Msg;
use crate::{SimApp, distribution, gov};

/// Votes land within this many blocks of the submission.
const MAX_VOTE_DELAY_BLOCKS: u64 = 10;

pub(super) fn submit_text_proposal() -> Box<dyn Operation<SimApp>> {
    operation("gov/submit_text_proposal", |rng, app: &mut SimApp, ctx| {
        let content = ProposalContent::Text {
            title: random_text(rng, 10),
            description: random_text(rng, 40),
        };
        submit(rng, app, ctx, content)
    })
}

pub(super) fn submit_community_spend_proposal() -> Box<dyn Operation<SimApp>> {
    operation("gov/submit_community_spend_proposal", |rng, app: &mut SimApp, ctx| {
        let pool = read(distribution::community_pool(app.stores()))?;
        let recipient = pick_account(rng, ctx.accounts)?;
        // May ask for more than the pool holds by the time it passes.
        let amount = rng.next_u64_inclusive(1, pool.max(1));
        let content = ProposalContent::CommunityPoolSpend {
            title: random_text(rng, 10),
            recipient,
            amount,
        };
        submit(rng, app, ctx, content)
    })
}

pub(super) fn submit_param_change_proposal(
    changes: Vec<ParamChange>,
) -> Box<dyn Operation<SimApp>> {
    operation("gov/submit_param_change_proposal", move |rng, app: &mut SimApp, ctx| {
        if changes.is_empty() {
            return Err(OperationError::skip("no parameters to change"));
        }
        let count = rng.next_usize(changes.len()) + 1;
        let mut picked: Vec<usize> = (0..changes.len()).collect();
        rng.shuffle(&mut picked);
        let entries = picked[..count]
            .iter()
            .map(|&i| {
                let change = &changes[i];
                ParamChangeEntry {
                    subspace: change.subspace().to_string(),
                    key: change.key().to_string(),
                    value: change.simulate_value(rng),
                }
            })
            .collect();
        let content = ProposalContent::ParameterChange {
            title: random_text(rng, 10),
            changes: entries,
        };
        submit(rng, app, ctx, content)
    })
}

/// Submits `content` with a random initial deposit and schedules votes
/// from a random subset of accounts over the next blocks.
fn submit(
    rng: &mut SimRng,
    app: &mut SimApp,
    ctx: &OperationContext<'_>,
    content: ProposalContent,
) -> OperationResult<SimApp> {
    let proposer = pick_account(rng, ctx.accounts)?;
    let available = balance(app, &proposer)?;
    let min_deposit = read(gov::params(app.stores()))?.min_deposit;
    let initial_deposit = rng.next_u64_inclusive(0, available.min(min_deposit.saturating_mul(2)));
    let kind = content.kind();

    let response = deliver(
        rng,
        app,
        proposer,
        available - initial_deposit,
        Msg::SubmitProposal {
            proposer,
            content,
            initial_deposit,
        },
    )?;
    let proposal_id = response
        .proposal_id
        .ok_or_else(|| OperationError::fatal("submitted proposal has no id"))?;

    let mut outcome = OperationOutcome::new(format!(
        "{proposer} submitted {kind} proposal {proposal_id} with deposit {initial_deposit}"
    ));
    let mut voters: Vec<_> = ctx.accounts.iter().map(|a| a.address).collect();
    rng.shuffle(&mut voters);
    let n_voters = rng.next_usize(voters.len() + 1);
    let height = ctx.header.height.as_u64();
    for voter in voters.into_iter().take(n_voters) {
        let at = Height::new(height + rng.next_u64_inclusive(1, MAX_VOTE_DELAY_BLOCKS));
        let option = VoteOption::ALL[rng.next_usize(VoteOption::ALL.len())];
        outcome = outcome.with_future(FutureOperation::at(at, vote(proposal_id, voter, option)));
    }
    Ok(outcome)
}

/// A vote follow-up; skips when the proposal is no longer in voting.
fn vote(proposal_id: u64, voter: Address, option: VoteOption) -> Box<dyn Operation<SimApp>> {
    operation("gov/vote", move |rng, app: &mut SimApp, _ctx| {
        let status = read(gov::proposal(app.stores(), proposal_id))?.map(|p| p.status);
        if status != Some(ProposalStatus::VotingPeriod) {
            return Err(OperationError::skip(format!(
                "proposal {proposal_id} is not in voting"
            )));
        }
        let spendable = balance(app, &voter)?;
        deliver(
            rng,
            app,
            voter,
            spendable,
            Msg::Vote {
                proposal_id,
                voter,
                option,
            },
        )?;
        Ok(OperationOutcome::new(format!(
            "{voter} voted {option:?} on {proposal_id}"
        )))
    })
}

pub(super) fn deposit() -> Box<dyn Operation<SimApp>> {
    operation("gov/deposit", |rng, app: &mut SimApp, ctx| {
        let open = read(gov::proposals_with_status(
            app.stores(),
            ProposalStatus::DepositPeriod,
        ))?;
        let proposal_id = rng
            .choose(&open)
            .map(|p| p.id)
            .ok_or_else(|| OperationError::skip("no proposal in its deposit period"))?;
        let depositor = pick_account(rng, ctx.accounts)?;
        let available = balance(app, &depositor)?;
        let min_deposit = read(gov::params(app.stores()))?.min_deposit;
        let amount = random_amount(rng, available.min(min_deposit))?;
        deliver(
            rng,
            app,
            depositor,
            available - amount,
            Msg::Deposit {
                proposal_id,
                depositor,
                amount,
            },
        )?;
        Ok(OperationOutcome::new(format!(
            "{depositor} deposited {amount} on {proposal_id}"
        )))
    })
}
