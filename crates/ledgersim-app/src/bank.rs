//! Balances and total supply.

use std::collections::BTreeMap;

use ledgersim_store::{KvStoreExt, MemKv, MultiStore};
use ledgersim_types::{Address, Amount};

use crate::keys::{BALANCE_PREFIX, BANK_STORE, SUPPLY_KEY, address_after, address_key};
use crate::{AppError, TxError};

fn kv(ms: &MultiStore) -> Result<&MemKv, AppError> {
    Ok(ms.store(BANK_STORE)?)
}

fn kv_mut(ms: &mut MultiStore) -> Result<&mut MemKv, AppError> {
    Ok(ms.store_mut(BANK_STORE)?)
}

pub fn balance(ms: &MultiStore, addr: &Address) -> Result<Amount, AppError> {
    Ok(kv(ms)?
        .get_typed(&address_key(BALANCE_PREFIX, addr))?
        .unwrap_or(0))
}

pub(crate) fn set_balance(
    ms: &mut MultiStore,
    addr: &Address,
    amount: Amount,
) -> Result<(), AppError> {
    kv_mut(ms)?.set_typed(address_key(BALANCE_PREFIX, addr), &amount)?;
    Ok(())
}

pub fn supply(ms: &MultiStore) -> Result<Amount, AppError> {
    Ok(kv(ms)?.get_typed(SUPPLY_KEY)?.unwrap_or(0))
}

pub(crate) fn set_supply(ms: &mut MultiStore, supply: Amount) -> Result<(), AppError> {
    kv_mut(ms)?.set_typed(SUPPLY_KEY.to_vec(), &supply)?;
    Ok(())
}

/// Every balance entry, including zero balances and module accounts.
pub fn balances(ms: &MultiStore) -> Result<BTreeMap<Address, Amount>, AppError> {
    kv(ms)?
        .collect_prefix::<Amount>(BALANCE_PREFIX)?
        .into_iter()
        .map(|(key, amount)| {
            Ok((address_after(BALANCE_PREFIX, &key)?, amount))
        })
        .collect()
}

/// Moves `amount` from `from` to `to`.
pub fn send(
    ms: &mut MultiStore,
    from: &Address,
    to: &Address,
    amount: Amount,
) -> Result<(), TxError> {
    let available = balance(ms, from)?;
    if available < amount {
        return Err(TxError::rejected(format!(
            "insufficient funds: {from} has {available}, needs {amount}"
        )));
    }
    set_balance(ms, from, available - amount)?;
    let received = balance(ms, to)?;
    set_balance(ms, to, received + amount)?;
    Ok(())
}

/// Moves funds from several inputs to several outputs; totals must match.
pub fn multi_send(
    ms: &mut MultiStore,
    inputs: &[(Address, Amount)],
    outputs: &[(Address, Amount)],
) -> Result<(), TxError> {
    let total_in: u128 = inputs.iter().map(|(_, a)| u128::from(*a)).sum();
    let total_out: u128 = outputs.iter().map(|(_, a)| u128::from(*a)).sum();
    if total_in != total_out {
        return Err(TxError::rejected(format!(
            "multisend inputs {total_in} do not match outputs {total_out}"
        )));
    }
    if inputs.is_empty() || outputs.is_empty() {
        return Err(TxError::rejected("multisend needs inputs and outputs"));
    }

    for (addr, amount) in inputs {
        let available = balance(ms, addr)?;
        if available < *amount {
            return Err(TxError::rejected(format!(
                "insufficient funds: {addr} has {available}, needs {amount}"
            )));
        }
        set_balance(ms, addr, available - amount)?;
    }
    for (addr, amount) in outputs {
        let received = balance(ms, addr)?;
        set_balance(ms, addr, received + amount)?;
    }
    Ok(())
}

/// Creates new tokens.
pub fn mint(ms: &mut MultiStore, to: &Address, amount: Amount) -> Result<(), AppError> {
    let received = balance(ms, to)?;
    set_balance(ms, to, received + amount)?;
    let total = supply(ms)?;
    set_supply(ms, total + amount)
}

/// Destroys tokens held by `from`.
pub fn burn(ms: &mut MultiStore, from: &Address, amount: Amount) -> Result<(), TxError> {
    let available = balance(ms, from)?;
    if available < amount {
        return Err(TxError::rejected(format!(
            "cannot burn {amount} from {from}: balance {available}"
        )));
    }
    set_balance(ms, from, available - amount)?;
    let total = supply(ms)?;
    set_supply(ms, total.saturating_sub(amount))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::STORE_NAMES;
    use ledgersim_types::ADDRESS_LENGTH;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; ADDRESS_LENGTH])
    }

    fn funded() -> MultiStore {
        let mut ms = MultiStore::with_stores(STORE_NAMES);
        mint(&mut ms, &addr(1), 100).unwrap();
        mint(&mut ms, &addr(2), 50).unwrap();
        ms
    }

    #[test]
    fn send_moves_funds_and_keeps_supply() {
        let mut ms = funded();
        send(&mut ms, &addr(1), &addr(3), 40).unwrap();
        assert_eq!(balance(&ms, &addr(1)).unwrap(), 60);
        assert_eq!(balance(&ms, &addr(3)).unwrap(), 40);
        assert_eq!(supply(&ms).unwrap(), 150);
    }

    #[test]
    fn self_send_is_a_no_op() {
        let mut ms = funded();
        send(&mut ms, &addr(1), &addr(1), 100).unwrap();
        assert_eq!(balance(&ms, &addr(1)).unwrap(), 100);
    }

    #[test]
    fn overdraft_is_rejected() {
        let mut ms = funded();
        let err = send(&mut ms, &addr(2), &addr(1), 51).unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(balance(&ms, &addr(2)).unwrap(), 50);
    }

    #[test]
    fn multi_send_requires_balanced_totals() {
        let mut ms = funded();
        let err = multi_send(&mut ms, &[(addr(1), 10)], &[(addr(2), 9)]).unwrap_err();
        assert!(err.is_rejection());

        multi_send(&mut ms, &[(addr(1), 10)], &[(addr(2), 4), (addr(3), 6)]).unwrap();
        assert_eq!(balance(&ms, &addr(2)).unwrap(), 54);
        assert_eq!(balance(&ms, &addr(3)).unwrap(), 6);
    }

    #[test]
    fn burn_reduces_supply() {
        let mut ms = funded();
        burn(&mut ms, &addr(1), 30).unwrap();
        assert_eq!(supply(&ms).unwrap(), 120);
        assert!(burn(&mut ms, &addr(2), 51).is_err());
        let total: Amount = balances(&ms).unwrap().values().sum();
        assert_eq!(total, supply(&ms).unwrap());
    }
}
