//! Randomized operations, invariants and genesis for harness runs.
//!
//! Each module contributes operations that build a random but plausible
//! message for the current state and deliver it as a transaction. A
//! message the ledger rejects is a skip; an internal ledger error is fatal.

mod auth;
mod bank;
mod distribution;
mod gov;
mod slashing;
mod staking;

use ledgersim_sim::{
    GenesisSource, OperationError, OperationSet, ParamChange, SimAccount, SimRng, SimulationInputs,
};
use ledgersim_types::{Address, Amount};

use crate::msg::{Fee, Msg, Tx, TxResponse};
use crate::{SimApp, genesis, invariants};

pub use staking::param_changes;

/// Genesis, operations and invariants for a run of [`SimApp`].
pub fn simulation_inputs() -> SimulationInputs<SimApp> {
    SimulationInputs {
        genesis: GenesisSource::random(genesis::random_genesis),
        operations: operations(),
        invariants: invariants::registry(),
    }
}

/// Every weighted operation with its parameter name and default weight.
pub fn operations() -> OperationSet<SimApp> {
    let changes: Vec<ParamChange> = param_changes();
    OperationSet::new()
        .with("op_weight_deduct_fee", 5, auth::deduct_fee())
        .with("op_weight_msg_send", 100, bank::send())
        .with(
            "op_weight_single_input_msg_multisend",
            10,
            bank::single_input_multisend(),
        )
        .with(
            "op_weight_msg_set_withdraw_address",
            50,
            distribution::set_withdraw_address(),
        )
        .with(
            "op_weight_msg_withdraw_delegation_reward",
            50,
            distribution::withdraw_delegator_reward(),
        )
        .with(
            "op_weight_msg_withdraw_validator_commission",
            50,
            distribution::withdraw_validator_commission(),
        )
        .with(
            "op_weight_submit_voting_slashing_text_proposal",
            5,
            gov::submit_text_proposal(),
        )
        .with(
            "op_weight_submit_voting_slashing_community_spend_proposal",
            5,
            gov::submit_community_spend_proposal(),
        )
        .with(
            "op_weight_submit_voting_slashing_param_change_proposal",
            5,
            gov::submit_param_change_proposal(changes),
        )
        .with("op_weight_msg_deposit", 100, gov::deposit())
        .with(
            "op_weight_msg_create_validator",
            100,
            staking::create_validator(),
        )
        .with("op_weight_msg_edit_validator", 5, staking::edit_validator())
        .with("op_weight_msg_delegate", 100, staking::delegate())
        .with("op_weight_msg_undelegate", 100, staking::undelegate())
        .with(
            "op_weight_msg_begin_redelegate",
            100,
            staking::begin_redelegate(),
        )
        .with("op_weight_msg_unjail", 100, slashing::unjail())
        .with("op_weight_equivocation", 2, slashing::equivocation())
}

// ============================================================================
// Shared helpers
// ============================================================================

fn pick_account(rng: &mut SimRng, accounts: &[SimAccount]) -> Result<Address, OperationError> {
    rng.choose(accounts)
        .map(|a| a.address)
        .ok_or_else(|| OperationError::skip("no accounts"))
}

/// Uniform amount in `[1, max]`; skips when `max` is zero.
fn random_amount(rng: &mut SimRng, max: Amount) -> Result<Amount, OperationError> {
    if max == 0 {
        return Err(OperationError::skip("nothing to spend"));
    }
    Ok(rng.next_u64_inclusive(1, max))
}

/// A fee payable from `spendable`: free one time in ten, otherwise up to a
/// tenth of what is left.
fn random_fee(rng: &mut SimRng, spendable: Amount) -> Fee {
    let gas = rng.next_u64_inclusive(10_000, 200_000);
    if spendable < 10 || rng.next_bool_with_probability(0.1) {
        return Fee::new(0, gas);
    }
    Fee::new(rng.next_u64_inclusive(1, spendable / 10), gas)
}

fn random_text(rng: &mut SimRng, len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    (0..len)
        .map(|_| char::from(ALPHABET[rng.next_usize(ALPHABET.len())]))
        .collect()
}

fn balance(app: &SimApp, addr: &Address) -> Result<Amount, OperationError> {
    crate::bank::balance(app.stores(), addr).map_err(|e| OperationError::fatal(e.to_string()))
}

fn read<T>(result: Result<T, crate::AppError>) -> Result<T, OperationError> {
    result.map_err(|e| OperationError::fatal(e.to_string()))
}

/// Delivers `msg` signed by `signer` with a random fee from `spendable`.
fn deliver(
    rng: &mut SimRng,
    app: &mut SimApp,
    signer: Address,
    spendable: Amount,
    msg: Msg,
) -> Result<TxResponse, OperationError> {
    let fee = random_fee(rng, spendable);
    Ok(app.deliver_tx(&Tx::single(signer, fee, msg))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersim_sim::{AppParams, ParamResolver};

    #[test]
    fn every_route_is_registered_once() {
        let ops = operations();
        let mut routes: Vec<&str> = ops.iter().map(|o| o.route()).collect();
        let total = routes.len();
        routes.sort_unstable();
        routes.dedup();
        assert_eq!(routes.len(), total);
        assert_eq!(total, 17);
    }

    #[test]
    fn default_weights_resolve_and_are_recorded() {
        let overrides = AppParams::new();
        let mut resolver = ParamResolver::new(&overrides);
        let registry = operations()
            .resolve(&mut resolver, &mut SimRng::new(1))
            .unwrap();
        assert_eq!(registry.total_weight(), 887);
        assert_eq!(resolver.resolved()["op_weight_msg_send"], serde_json::json!(100));
    }

    #[test]
    fn fees_never_exceed_a_tenth_of_the_budget() {
        let mut rng = SimRng::new(3);
        for _ in 0..200 {
            let fee = random_fee(&mut rng, 1_000);
            assert!(fee.amount <= 100);
            assert!(fee.gas > 0);
        }
        assert!(random_fee(&mut rng, 9).is_zero());
    }
}
