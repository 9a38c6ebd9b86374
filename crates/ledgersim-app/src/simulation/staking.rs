use ledgersim_sim::{Operation, OperationError, OperationOutcome, ParamChange, SimRng, operation};

use super::{balance, deliver, pick_account, random_amount, random_text, read};
use crate::msg::Msg;
use crate::staking::MAX_COMMISSION_BPS;
use crate::{SimApp, staking};

/// Commission rates drawn for new and edited validators stay at or below
/// 20%.
const MAX_SIMULATED_COMMISSION_BPS: u64 = 2_000;

/// Staking parameters governance proposals may change during a run.
pub fn param_changes() -> Vec<ParamChange> {
    vec![
        ParamChange::new("staking", "MaxValidators", |rng| {
            format!("{}", rng.next_u64_inclusive(1, 250))
        }),
        ParamChange::new("staking", "UnbondingTime", |rng| {
            format!("\"{}\"", rng.next_u64_inclusive(60, 60 * 60 * 24 * 6))
        }),
    ]
}

fn random_commission(rng: &mut SimRng) -> u32 {
    let bps = rng.next_u64_inclusive(0, MAX_SIMULATED_COMMISSION_BPS);
    u32::try_from(bps).unwrap_or(MAX_COMMISSION_BPS)
}

pub(super) fn create_validator() -> Box<dyn Operation<SimApp>> {
    operation("staking/create_validator", |rng, app: &mut SimApp, ctx| {
        let operator = pick_account(rng, ctx.accounts)?;
        if read(staking::validator(app.stores(), &operator))?.is_some() {
            return Err(OperationError::skip("account already runs a validator"));
        }
        let available = balance(app, &operator)?;
        let self_delegation = random_amount(rng, available)?;
        let msg = Msg::CreateValidator {
            operator,
            self_delegation,
            commission_bps: random_commission(rng),
            moniker: random_text(rng, 8),
        };
        deliver(rng, app, operator, available - self_delegation, msg)?;
        Ok(OperationOutcome::new(format!(
            "{operator} created a validator with {self_delegation}"
        )))
    })
}

pub(super) fn edit_validator() -> Box<dyn Operation<SimApp>> {
    operation("staking/edit_validator", |rng, app: &mut SimApp, _ctx| {
        let validators = read(staking::validators(app.stores()))?;
        let operator = rng
            .choose(&validators)
            .map(|v| v.operator)
            .ok_or_else(|| OperationError::skip("no validators"))?;
        let commission_bps = rng.next_bool().then(|| random_commission(rng));
        let moniker = rng.next_bool().then(|| random_text(rng, 8));
        let spendable = balance(app, &operator)?;
        deliver(
            rng,
            app,
            operator,
            spendable,
            Msg::EditValidator {
                operator,
                commission_bps,
                moniker,
            },
        )?;
        Ok(OperationOutcome::new(format!(
            "{operator} edited its validator"
        )))
    })
}

pub(super) fn delegate() -> Box<dyn Operation<SimApp>> {
    operation("staking/delegate", |rng, app: &mut SimApp, ctx| {
        let validators = read(staking::validators(app.stores()))?;
        let validator = rng
            .choose(&validators)
            .map(|v| v.operator)
            .ok_or_else(|| OperationError::skip("no validators"))?;
        let delegator = pick_account(rng, ctx.accounts)?;
        let available = balance(app, &delegator)?;
        let amount = random_amount(rng, available)?;
        deliver(
            rng,
            app,
            delegator,
            available - amount,
            Msg::Delegate {
                delegator,
                validator,
                amount,
            },
        )?;
        Ok(OperationOutcome::new(format!(
            "{delegator} delegated {amount} to {validator}"
        )))
    })
}

pub(super) fn undelegate() -> Box<dyn Operation<SimApp>> {
    operation("staking/undelegate", |rng, app: &mut SimApp, ctx| {
        let delegator = pick_account(rng, ctx.accounts)?;
        let delegations = read(staking::delegations_of(app.stores(), &delegator))?;
        let d = rng
            .choose(&delegations)
            .ok_or_else(|| OperationError::skip("account has no delegations"))?;
        let (validator, shares) = (d.validator, rng.next_u64_inclusive(1, d.shares));
        let spendable = balance(app, &delegator)?;
        deliver(
            rng,
            app,
            delegator,
            spendable,
            Msg::Undelegate {
                delegator,
                validator,
                shares,
            },
        )?;
        Ok(OperationOutcome::new(format!(
            "{delegator} undelegated {shares} shares from {validator}"
        )))
    })
}

pub(super) fn begin_redelegate() -> Box<dyn Operation<SimApp>> {
    operation("staking/begin_redelegate", |rng, app: &mut SimApp, ctx| {
        let delegator = pick_account(rng, ctx.accounts)?;
        let delegations = read(staking::delegations_of(app.stores(), &delegator))?;
        let d = rng
            .choose(&delegations)
            .ok_or_else(|| OperationError::skip("account has no delegations"))?;
        let (src, shares) = (d.validator, rng.next_u64_inclusive(1, d.shares));

        let targets: Vec<_> = read(staking::validators(app.stores()))?
            .into_iter()
            .map(|v| v.operator)
            .filter(|op| *op != src)
            .collect();
        let dst = *rng
            .choose(&targets)
            .ok_or_else(|| OperationError::skip("no other validator"))?;

        let spendable = balance(app, &delegator)?;
        deliver(
            rng,
            app,
            delegator,
            spendable,
            Msg::BeginRedelegate {
                delegator,
                src,
                dst,
                shares,
            },
        )?;
        Ok(OperationOutcome::new(format!(
            "{delegator} redelegated {shares} shares from {src} to {dst}"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_changes_render_the_wire_format() {
        let mut rng = SimRng::new(8);
        let changes = param_changes();
        let max: u32 = changes[0].simulate_value(&mut rng).parse().unwrap();
        assert!((1..=250).contains(&max));

        let unbonding = changes[1].simulate_value(&mut rng);
        assert!(unbonding.starts_with('"') && unbonding.ends_with('"'));
        assert_eq!(changes[1].composite_key(), "staking/UnbondingTime");
    }
}
