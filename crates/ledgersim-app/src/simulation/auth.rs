use ledgersim_sim::{Operation, OperationError, OperationOutcome, operation};

use super::{balance, pick_account, random_amount};
use crate::SimApp;
use crate::msg::{Fee, Tx};

/// A message-less transaction that only pays a fee.
pub(super) fn deduct_fee() -> Box<dyn Operation<SimApp>> {
    operation("auth/deduct_fee", |rng, app: &mut SimApp, ctx| {
        let payer = pick_account(rng, ctx.accounts)?;
        let available = balance(app, &payer)?;
        let amount = random_amount(rng, available)?;
        let gas = rng.next_u64_inclusive(10_000, 200_000);
        app.deliver_tx(&Tx::new(payer, Fee::new(amount, gas), Vec::new()))
            .map_err(OperationError::from)?;
        Ok(OperationOutcome::new(format!("{payer} paid fee {amount}")))
    })
}
