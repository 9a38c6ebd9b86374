use ledgersim_sim::{Operation, OperationError, OperationOutcome, operation};

use super::{balance, deliver, pick_account, read};
use crate::msg::Msg;
use crate::{SimApp, distribution, staking};

pub(super) fn set_withdraw_address() -> Box<dyn Operation<SimApp>> {
    operation("distribution/set_withdraw_address", |rng, app: &mut SimApp, ctx| {
        let delegator = pick_account(rng, ctx.accounts)?;
        let withdraw_to = pick_account(rng, ctx.accounts)?;
        let spendable = balance(app, &delegator)?;
        deliver(
            rng,
            app,
            delegator,
            spendable,
            Msg::SetWithdrawAddress {
                delegator,
                withdraw_to,
            },
        )?;
        Ok(OperationOutcome::new(format!(
            "{delegator} withdraws to {withdraw_to}"
        )))
    })
}

pub(super) fn withdraw_delegator_reward() -> Box<dyn Operation<SimApp>> {
    operation("distribution/withdraw_delegator_reward", |rng, app: &mut SimApp, ctx| {
        let delegator = pick_account(rng, ctx.accounts)?;
        let delegations = read(staking::delegations_of(app.stores(), &delegator))?;
        let validator = rng
            .choose(&delegations)
            .map(|d| d.validator)
            .ok_or_else(|| OperationError::skip("account has no delegations"))?;
        let spendable = balance(app, &delegator)?;
        deliver(
            rng,
            app,
            delegator,
            spendable,
            Msg::WithdrawDelegatorReward {
                delegator,
                validator,
            },
        )?;
        Ok(OperationOutcome::new(format!(
            "{delegator} withdrew rewards from {validator}"
        )))
    })
}

pub(super) fn withdraw_validator_commission() -> Box<dyn Operation<SimApp>> {
    operation("distribution/withdraw_validator_commission", |rng, app: &mut SimApp, _ctx| {
        let validators = read(staking::validators(app.stores()))?;
        let operator = rng
            .choose(&validators)
            .map(|v| v.operator)
            .ok_or_else(|| OperationError::skip("no validators"))?;
        let commission = read(distribution::rewards(app.stores(), &operator))?.commission;
        if commission == 0 {
            return Err(OperationError::skip("no commission to withdraw"));
        }
        let spendable = balance(app, &operator)?;
        let msg = Msg::WithdrawValidatorCommission { operator };
        deliver(rng, app, operator, spendable, msg)?;
        Ok(OperationOutcome::new(format!(
            "{operator} withdrew commission {commission}"
        )))
    })
}
