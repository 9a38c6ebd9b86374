//! Fee handling that runs before a transaction's messages.
//!
//! Every transaction pays its fee to the fee collector up front. The
//! minimum gas price is a mempool policy of the local node: it is checked
//! when a transaction is admitted, never when it is delivered in a block.

use ledgersim_store::MultiStore;
use ledgersim_types::Amount;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::keys::FEE_COLLECTOR;
use crate::msg::{Fee, Tx};
use crate::{TxError, bank};

/// Whether a transaction is being admitted to the mempool or executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Check,
    Deliver,
}

/// Runs the ante stage for `tx`.
pub fn ante_handle(
    ms: &mut MultiStore,
    tx: &Tx,
    mode: ExecMode,
    min_gas_price: Decimal,
) -> Result<(), TxError> {
    if mode == ExecMode::Check {
        ensure_sufficient_mempool_fees(&tx.fee, min_gas_price)?;
    }
    if !tx.fee.is_zero() {
        deduct_fees(ms, tx)?;
    }
    Ok(())
}

/// `ceil(min_gas_price × gas)`; unpayable when the product overflows.
pub fn required_fee(min_gas_price: Decimal, gas: u64) -> Amount {
    min_gas_price
        .checked_mul(Decimal::from(gas))
        .and_then(|fee| fee.ceil().to_u64())
        .unwrap_or(Amount::MAX)
}

pub fn ensure_sufficient_mempool_fees(fee: &Fee, min_gas_price: Decimal) -> Result<(), TxError> {
    if min_gas_price.is_zero() {
        return Ok(());
    }
    let required = required_fee(min_gas_price, fee.gas);
    if fee.amount < required {
        return Err(TxError::rejected(format!(
            "insufficient fees; got: {} required: {required}",
            fee.amount
        )));
    }
    Ok(())
}

/// Moves the fee from the signer to the fee collector.
pub fn deduct_fees(ms: &mut MultiStore, tx: &Tx) -> Result<(), TxError> {
    if tx.fee.gas == 0 {
        return Err(TxError::rejected(format!(
            "invalid fee {}: no gas",
            tx.fee.amount
        )));
    }
    let available = bank::balance(ms, &tx.signer)?;
    if available < tx.fee.amount {
        return Err(TxError::rejected(format!(
            "insufficient funds to pay for fees; {available} < {}",
            tx.fee.amount
        )));
    }
    bank::send(ms, &tx.signer, &FEE_COLLECTOR.address(), tx.fee.amount)
}
