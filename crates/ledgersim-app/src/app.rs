//! The reference ledger application.

use std::collections::BTreeSet;

use ledgersim_sim::{Application, EndBlockResponse, ExportOptions, ExportedState, StoreSpec};
use ledgersim_store::{KvRead, MultiStore};
use ledgersim_types::{Address, BlockHeader, CommitId, Height, Timestamp};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::ante::{ExecMode, ante_handle};
use crate::genesis::{self, GenesisState};
use crate::gov;
use crate::keys::{
    BANK_STORE, DISTRIBUTION_STORE, GOV_STORE, MODULE_ACCOUNTS, REDELEGATION_QUEUE_PREFIX,
    SLASHING_STORE, STAKING_STORE, STORE_NAMES, UNBONDING_QUEUE_PREFIX, is_module_account,
};
use crate::msg::{Msg, Tx, TxResponse};
use crate::{AppError, TxError, bank, distribution, invariants, slashing, staking};

pub const APP_NAME: &str = "SimApp";

/// A bank/staking/distribution/slashing/gov ledger over in-memory stores.
#[derive(Debug, Clone)]
pub struct SimApp {
    stores: MultiStore,
    header: BlockHeader,
    last_commit: CommitId,
    min_gas_price: Decimal,
}

impl SimApp {
    pub fn new() -> Self {
        Self {
            stores: MultiStore::with_stores(STORE_NAMES),
            header: BlockHeader::new(Height::new(0), Timestamp::from_secs(0)),
            last_commit: CommitId::default(),
            min_gas_price: Decimal::ZERO,
        }
    }

    /// Sets the local mempool's minimum gas price.
    pub fn with_min_gas_price(mut self, price: Decimal) -> Self {
        self.min_gas_price = price;
        self
    }

    pub fn stores(&self) -> &MultiStore {
        &self.stores
    }

    pub fn header(&self) -> BlockHeader {
        self.header
    }

    /// Validates `tx` for mempool admission against a scratch copy of the
    /// state. Never changes state.
    pub fn check_tx(&self, tx: &Tx) -> Result<(), TxError> {
        let mut scratch = self.stores.cache_wrap();
        self.run_tx(&mut scratch, tx, ExecMode::Check).map(|_| ())
    }

    /// Executes `tx` in the current block. Either every message applies or
    /// none does, fee included.
    pub fn deliver_tx(&mut self, tx: &Tx) -> Result<TxResponse, TxError> {
        let mut cache = self.stores.cache_wrap();
        let response = self.run_tx(&mut cache, tx, ExecMode::Deliver)?;
        self.stores.write(cache);
        Ok(response)
    }

    /// Applies double-sign evidence against `validator` in the current
    /// block. Returns the amount slashed.
    pub fn apply_evidence(&mut self, validator: &Address) -> Result<u64, TxError> {
        let mut cache = self.stores.cache_wrap();
        let burned = slashing::handle_equivocation(&mut cache, self.header.time, validator)?;
        self.stores.write(cache);
        Ok(burned)
    }

    fn run_tx(&self, ms: &mut MultiStore, tx: &Tx, mode: ExecMode) -> Result<TxResponse, TxError> {
        for msg in &tx.msgs {
            if !msg.is_single_signer() || msg.signer() != Some(tx.signer) {
                return Err(TxError::rejected(format!(
                    "message not signed by {}",
                    tx.signer
                )));
            }
        }
        ante_handle(ms, tx, mode, self.min_gas_price)?;

        let mut response = TxResponse {
            proposal_id: None,
            messages: tx.msgs.len(),
        };
        for msg in &tx.msgs {
            if let Some(id) = self.handle_msg(ms, msg)? {
                response.proposal_id = Some(id);
            }
        }
        Ok(response)
    }

    fn handle_msg(&self, ms: &mut MultiStore, msg: &Msg) -> Result<Option<u64>, TxError> {
        let now = self.header.time;
        match msg {
            Msg::Send { from, to, amount } => bank::send(ms, from, to, *amount)?,
            Msg::MultiSend { inputs, outputs } => bank::multi_send(ms, inputs, outputs)?,
            Msg::CreateValidator {
                operator,
                self_delegation,
                commission_bps,
                moniker,
            } => staking::create_validator(
                ms,
                operator,
                *self_delegation,
                *commission_bps,
                moniker,
            )?,
            Msg::EditValidator {
                operator,
                commission_bps,
                moniker,
            } => staking::edit_validator(ms, operator, *commission_bps, moniker.as_deref())?,
            Msg::Delegate {
                delegator,
                validator,
                amount,
            } => {
                staking::delegate(ms, delegator, validator, *amount)?;
            }
            Msg::Undelegate {
                delegator,
                validator,
                shares,
            } => {
                staking::undelegate(ms, now, delegator, validator, *shares)?;
            }
            Msg::BeginRedelegate {
                delegator,
                src,
                dst,
                shares,
            } => {
                staking::begin_redelegate(ms, now, delegator, src, dst, *shares)?;
            }
            Msg::Unjail { operator } => slashing::unjail(ms, now, operator)?,
            Msg::SetWithdrawAddress {
                delegator,
                withdraw_to,
            } => distribution::set_withdraw_address(ms, delegator, withdraw_to)?,
            Msg::WithdrawDelegatorReward {
                delegator,
                validator,
            } => {
                distribution::withdraw_delegation_rewards(ms, delegator, validator)?;
            }
            Msg::WithdrawValidatorCommission { operator } => {
                distribution::withdraw_validator_commission(ms, operator)?;
            }
            Msg::SubmitProposal {
                proposer,
                content,
                initial_deposit,
            } => {
                let id =
                    gov::submit_proposal(ms, now, proposer, content.clone(), *initial_deposit)?;
                return Ok(Some(id));
            }
            Msg::Deposit {
                proposal_id,
                depositor,
                amount,
            } => gov::deposit(ms, now, *proposal_id, depositor, *amount)?,
            Msg::Vote {
                proposal_id,
                voter,
                option,
            } => gov::vote(ms, *proposal_id, voter, *option)?,
        }
        Ok(None)
    }

    fn commit_id_at(&self, version: u64) -> CommitId {
        CommitId::new(version, self.stores.commit_hash(version))
    }
}

impl Default for SimApp {
    fn default() -> Self {
        Self::new()
    }
}

impl Application for SimApp {
    type Error = AppError;

    fn name(&self) -> &str {
        APP_NAME
    }

    #[instrument(skip_all, fields(height = %header.height))]
    fn init_chain(&mut self, app_state: &Value, header: BlockHeader) -> Result<(), AppError> {
        let genesis = GenesisState::from_value(app_state)?;
        let mut stores = MultiStore::with_stores(STORE_NAMES);
        genesis::init(&mut stores, &genesis)?;
        let bonded = staking::apply_validator_set_updates(&mut stores)?;
        if let Some((route, message)) = invariants::check_stores(&stores) {
            return Err(AppError::InvalidGenesis(format!(
                "invariant {route} broken: {message}"
            )));
        }

        self.stores = stores;
        self.header = header;
        self.last_commit = self.commit_id_at(header.height.as_u64().saturating_sub(1));
        info!(bonded, accounts = genesis.bank.balances.len(), "chain initialized");
        Ok(())
    }

    fn begin_block(&mut self, header: &BlockHeader) -> Result<(), AppError> {
        self.header = *header;
        distribution::allocate_fees(&mut self.stores)
    }

    fn end_block(&mut self, header: &BlockHeader) -> Result<EndBlockResponse, AppError> {
        gov::end_block(&mut self.stores, header.time)?;
        let bonded_validators = staking::end_block(&mut self.stores, header.time)?;
        Ok(EndBlockResponse { bonded_validators })
    }

    fn commit(&mut self) -> CommitId {
        self.last_commit = self.commit_id_at(self.header.height.as_u64());
        debug!(version = self.last_commit.version, "committed");
        self.last_commit
    }

    fn last_commit_id(&self) -> CommitId {
        self.last_commit
    }

    fn bonded_validators(&self) -> Result<usize, AppError> {
        staking::bonded_count(&self.stores)
    }

    fn export_state(&self, options: &ExportOptions) -> Result<ExportedState, AppError> {
        let mut stores = self.stores.cache_wrap();
        if options.for_zero_height {
            prepare_for_zero_height(&mut stores, &options.jail_whitelist)?;
        }
        let state = genesis::export(&stores)?;
        let validators = state
            .staking
            .validators
            .iter()
            .filter(|v| v.is_bonded())
            .map(|v| v.operator)
            .collect();
        Ok(ExportedState {
            app_state: state.to_value()?,
            height: self.header.height.as_u64(),
            time: self.header.time,
            validators,
        })
    }

    fn store_specs(&self) -> Vec<StoreSpec> {
        vec![
            StoreSpec::new(BANK_STORE),
            StoreSpec::new(STAKING_STORE)
                .ignoring(UNBONDING_QUEUE_PREFIX)
                .ignoring(REDELEGATION_QUEUE_PREFIX),
            StoreSpec::new(DISTRIBUTION_STORE),
            StoreSpec::new(SLASHING_STORE),
            StoreSpec::new(GOV_STORE),
        ]
    }

    fn kv_store(&self, name: &str) -> Option<&dyn KvRead> {
        self.stores.store(name).ok().map(|s| s as &dyn KvRead)
    }

    fn module_accounts(&self) -> BTreeSet<Address> {
        MODULE_ACCOUNTS.iter().map(|m| m.address()).collect()
    }

    fn account_addresses(&self) -> Result<Vec<Address>, AppError> {
        Ok(bank::balances(&self.stores)?
            .into_keys()
            .filter(|a| !is_module_account(a))
            .collect())
    }
}

/// Settles every reward and optionally jails validators outside
/// `whitelist`, so the exported state can seed a chain at height zero.
fn prepare_for_zero_height(ms: &mut MultiStore, whitelist: &[Address]) -> Result<(), AppError> {
    distribution::withdraw_all(ms)?;
    if !whitelist.is_empty() {
        let allowed: BTreeSet<&Address> = whitelist.iter().collect();
        for v in staking::validators(ms)? {
            if !allowed.contains(&v.operator) && !v.jailed {
                staking::set_jailed(ms, &v.operator, true)?;
            }
        }
    }
    staking::apply_validator_set_updates(ms)?;
    Ok(())
}
