use ledgersim_sim::{Operation, OperationError, OperationOutcome, operation};

use super::{balance, deliver, pick_account, random_amount};
use crate::SimApp;
use crate::msg::Msg;

const MAX_MULTISEND_OUTPUTS: u64 = 5;

pub(super) fn send() -> Box<dyn Operation<SimApp>> {
    operation("bank/send", |rng, app: &mut SimApp, ctx| {
        if ctx.accounts.len() < 2 {
            return Err(OperationError::skip("need two accounts"));
        }
        let from = pick_account(rng, ctx.accounts)?;
        let mut to = pick_account(rng, ctx.accounts)?;
        while to == from {
            to = pick_account(rng, ctx.accounts)?;
        }

        let available = balance(app, &from)?;
        let amount = random_amount(rng, available)?;
        let msg = Msg::Send { from, to, amount };
        deliver(rng, app, from, available - amount, msg)?;
        Ok(OperationOutcome::new(format!(
            "{from} sent {amount} to {to}"
        )))
    })
}

/// One input split across up to five outputs.
pub(super) fn single_input_multisend() -> Box<dyn Operation<SimApp>> {
    operation("bank/multisend", |rng, app: &mut SimApp, ctx| {
        let from = pick_account(rng, ctx.accounts)?;
        let available = balance(app, &from)?;
        let amount = random_amount(rng, available)?;

        let n = rng.next_u64_inclusive(1, MAX_MULTISEND_OUTPUTS.min(amount));
        let mut outputs = Vec::new();
        let mut remaining = amount;
        for i in 0..n {
            let share = if i + 1 == n {
                remaining
            } else {
                // Leave at least one token for each later output.
                rng.next_u64_inclusive(1, remaining - (n - 1 - i))
            };
            remaining -= share;
            outputs.push((pick_account(rng, ctx.accounts)?, share));
        }

        let msg = Msg::MultiSend {
            inputs: vec![(from, amount)],
            outputs,
        };
        deliver(rng, app, from, available - amount, msg)?;
        Ok(OperationOutcome::new(format!(
            "{from} multisent {amount} to {n} outputs"
        )))
    })
}
