//! Equivocation evidence, jailing and unjailing.

use ledgersim_store::{KvStoreExt, MemKv, MultiStore};
use ledgersim_types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::keys::{PARAMS_KEY, SIGNING_INFO_PREFIX, SLASHING_STORE, address_key};
use crate::{AppError, TxError, staking};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingParams {
    /// Share of tokens burned for double signing, in basis points.
    pub slash_fraction_bps: u32,
    pub jail_duration_secs: u64,
}

impl Default for SlashingParams {
    fn default() -> Self {
        Self {
            slash_fraction_bps: 500,
            jail_duration_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningInfo {
    pub validator: Address,
    pub jailed_until: Timestamp,
}

fn kv(ms: &MultiStore) -> Result<&MemKv, AppError> {
    Ok(ms.store(SLASHING_STORE)?)
}

fn kv_mut(ms: &mut MultiStore) -> Result<&mut MemKv, AppError> {
    Ok(ms.store_mut(SLASHING_STORE)?)
}

pub fn params(ms: &MultiStore) -> Result<SlashingParams, AppError> {
    Ok(kv(ms)?.get_typed(PARAMS_KEY)?.unwrap_or_default())
}

pub(crate) fn set_params(ms: &mut MultiStore, params: &SlashingParams) -> Result<(), AppError> {
    kv_mut(ms)?.set_typed(PARAMS_KEY.to_vec(), params)?;
    Ok(())
}

pub fn signing_info(ms: &MultiStore, validator: &Address) -> Result<Option<SigningInfo>, AppError> {
    let key = address_key(SIGNING_INFO_PREFIX, validator);
    Ok(kv(ms)?.get_typed(&key)?)
}

pub(crate) fn set_signing_info(ms: &mut MultiStore, info: &SigningInfo) -> Result<(), AppError> {
    kv_mut(ms)?.set_typed(address_key(SIGNING_INFO_PREFIX, &info.validator), info)?;
    Ok(())
}

pub fn signing_infos(ms: &MultiStore) -> Result<Vec<SigningInfo>, AppError> {
    Ok(kv(ms)?
        .collect_prefix(SIGNING_INFO_PREFIX)?
        .into_iter()
        .map(|(_, i)| i)
        .collect())
}

/// Slashes and jails a bonded validator for double signing. Returns the
/// amount burned.
pub fn handle_equivocation(
    ms: &mut MultiStore,
    now: Timestamp,
    validator: &Address,
) -> Result<Amount, TxError> {
    let v = staking::validator(ms, validator)?
        .ok_or_else(|| {
            TxError::rejected(format!("validator {validator} not found"))
        })?;
    if !v.is_bonded() || v.jailed {
        return Err(TxError::rejected(format!(
            "validator {validator} is not in the active set"
        )));
    }

    let params = params(ms)?;
    let burned = staking::slash_and_jail(ms, validator, params.slash_fraction_bps)?;
    set_signing_info(
        ms,
        &SigningInfo {
            validator: *validator,
            jailed_until: now.saturating_add_secs(params.jail_duration_secs),
        },
    )?;
    info!(%validator, burned, "validator slashed for equivocation");
    Ok(burned)
}

/// Releases a jailed validator once its jail time has passed. The operator
/// must still have a self-delegation worth at least one token.
pub fn unjail(ms: &mut MultiStore, now: Timestamp, operator: &Address) -> Result<(), TxError> {
    let v = staking::validator(ms, operator)?
        .ok_or_else(|| {
            TxError::rejected(format!("validator {operator} not found"))
        })?;
    if !v.jailed {
        return Err(TxError::rejected(format!(
            "validator {operator} is not jailed"
        )));
    }
    if let Some(info) = signing_info(ms, operator)? {
        if now < info.jailed_until {
            return Err(TxError::rejected(format!(
                "validator {operator} jailed until {}",
                info.jailed_until
            )));
        }
    }
    let self_bond = staking::delegation(ms, operator, operator)?
        .map_or(0, |d| v.tokens_from_shares(d.shares));
    if self_bond == 0 {
        return Err(TxError::rejected(format!(
            "validator {operator} has no self-delegation"
        )));
    }
    staking::set_jailed(ms, operator, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank;
    use crate::keys::STORE_NAMES;
    use ledgersim_types::ADDRESS_LENGTH;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; ADDRESS_LENGTH])
    }

    fn ledger() -> MultiStore {
        let mut ms = MultiStore::with_stores(STORE_NAMES);
        bank::mint(&mut ms, &addr(1), 1_000).unwrap();
        staking::create_validator(&mut ms, &addr(1), 1_000, 0, "a").unwrap();
        staking::apply_validator_set_updates(&mut ms).unwrap();
        ms
    }

    #[test]
    fn equivocation_jails_until_the_jail_time_passes() {
        let mut ms = ledger();
        let t0 = Timestamp::from_secs(1_000);
        assert_eq!(handle_equivocation(&mut ms, t0, &addr(1)).unwrap(), 50);
        assert!(staking::validator(&ms, &addr(1)).unwrap().unwrap().jailed);

        // Jailed validators cannot be slashed twice.
        assert!(handle_equivocation(&mut ms, t0, &addr(1)).unwrap_err().is_rejection());

        assert!(unjail(&mut ms, Timestamp::from_secs(1_599), &addr(1)).is_err());
        unjail(&mut ms, Timestamp::from_secs(1_600), &addr(1)).unwrap();
        assert!(!staking::validator(&ms, &addr(1)).unwrap().unwrap().jailed);
    }

    #[test]
    fn unjail_requires_a_jailed_validator() {
        let mut ms = ledger();
        assert!(unjail(&mut ms, Timestamp::from_secs(0), &addr(1)).unwrap_err().is_rejection());
        assert!(unjail(&mut ms, Timestamp::from_secs(0), &addr(9)).unwrap_err().is_rejection());
    }
}
