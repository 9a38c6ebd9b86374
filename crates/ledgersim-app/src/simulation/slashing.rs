use ledgersim_sim::{Operation, OperationError, OperationOutcome, operation};

use super::{balance, deliver, read};
use crate::msg::Msg;
use crate::{SimApp, staking};

pub(super) fn unjail() -> Box<dyn Operation<SimApp>> {
    operation("slashing/unjail", |rng, app: &mut SimApp, _ctx| {
        let jailed: Vec<_> = read(staking::validators(app.stores()))?
            .into_iter()
            .filter(|v| v.jailed)
            .map(|v| v.operator)
            .collect();
        let operator = *rng
            .choose(&jailed)
            .ok_or_else(|| OperationError::skip("no jailed validators"))?;
        let spendable = balance(app, &operator)?;
        deliver(rng, app, operator, spendable, Msg::Unjail { operator })?;
        Ok(OperationOutcome::new(format!("{operator} unjailed")))
    })
}

/// Double-sign evidence against a random bonded validator.
pub(super) fn equivocation() -> Box<dyn Operation<SimApp>> {
    operation("slashing/equivocation", |rng, app: &mut SimApp, _ctx| {
        let bonded: Vec<_> = read(staking::validators(app.stores()))?
            .into_iter()
            .filter(|v| v.is_bonded() && !v.jailed)
            .map(|v| v.operator)
            .collect();
        let validator = *rng
            .choose(&bonded)
            .ok_or_else(|| OperationError::skip("no bonded validators"))?;
        let burned = app.apply_evidence(&validator)?;
        Ok(OperationOutcome::new(format!(
            "{validator} slashed {burned}"
        )))
    })
}
