//! A minimal ledger used to exercise the driver end to end.
//!
//! Balances and a validator counter live in the `bank` store; pending
//! proposals are appended to a queue key that export omits and import
//! rebuilds empty, so it must be excluded from the export/import diff.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ledgersim_sim::{
    Application, EndBlockResponse, ExportOptions, ExportedState, FutureOperation,
    GenesisSource, InvariantRegistry, InvariantReport, OperationError, OperationOutcome,
    OperationSet, SimulationInputs, StoreSpec, operation,
};
use ledgersim_store::{KvRead, KvStore, KvStoreExt, MultiStore, StoreError};
use ledgersim_types::{Address, BlockHeader, CommitId, Height, Timestamp};
use serde::{Deserialize, Serialize};

pub const BANK: &str = "bank";
pub const QUEUE: &str = "queue";
const BALANCE_PREFIX: &[u8] = b"bal/";
const SUPPLY_KEY: &[u8] = b"supply";
const VALIDATORS_KEY: &[u8] = b"validators";
pub const PENDING_PREFIX: &[u8] = b"q/";
const PENDING_KEY: &[u8] = b"q/pending";

#[derive(Debug, Serialize, Deserialize)]
pub struct TestGenesis {
    pub balances: BTreeMap<Address, u64>,
    pub validators: u64,
}

pub struct TestApp {
    stores: MultiStore,
    header: BlockHeader,
    last_commit: CommitId,
    /// `(proposed_at, voted_at)` for every executed vote.
    pub vote_log: Vec<(u64, u64)>,
    leak: Option<Arc<AtomicU64>>,
}

impl TestApp {
    pub fn new() -> Self {
        Self {
            stores: MultiStore::with_stores([BANK, QUEUE]),
            header: BlockHeader::new(Height::new(0), Timestamp::from_secs(0)),
            last_commit: CommitId::default(),
            vote_log: Vec::new(),
            leak: None,
        }
    }

    /// An app whose commit hash depends on state shared across instances.
    pub fn leaky(counter: Arc<AtomicU64>) -> Self {
        Self {
            leak: Some(counter),
            ..Self::new()
        }
    }

    fn bank(&self) -> &ledgersim_store::MemKv {
        self.stores.store(BANK).expect("bank store mounted")
    }

    fn bank_mut(&mut self) -> &mut ledgersim_store::MemKv {
        self.stores.store_mut(BANK).expect("bank store mounted")
    }

    fn balance_key(addr: &Address) -> Vec<u8> {
        let mut key = BALANCE_PREFIX.to_vec();
        key.extend_from_slice(addr.as_bytes());
        key
    }

    pub fn balance(&self, addr: &Address) -> u64 {
        self.bank()
            .get_typed(&Self::balance_key(addr))
            .expect("decodes")
            .unwrap_or(0)
    }

    fn set_balance(&mut self, addr: &Address, amount: u64) {
        self.bank_mut()
            .set_typed(Self::balance_key(addr), &amount)
            .expect("encodes");
    }

    pub fn supply(&self) -> u64 {
        self.bank()
            .get_typed(SUPPLY_KEY)
            .expect("decodes")
            .unwrap_or(0)
    }

    pub fn balances(&self) -> BTreeMap<Address, u64> {
        self.try_balances().expect("decodes")
    }

    fn try_balances(&self) -> Result<BTreeMap<Address, u64>, StoreError> {
        Ok(self
            .bank()
            .collect_prefix::<u64>(BALANCE_PREFIX)?
            .into_iter()
            .map(|(k, v)| {
                let mut bytes = [0u8; 20];
                bytes.copy_from_slice(&k[BALANCE_PREFIX.len()..]);
                (Address::from_bytes(bytes), v)
            })
            .collect())
    }

    /// Overwrites `addr`'s balance with bytes that do not decode.
    pub fn corrupt_balance(&mut self, addr: &Address) {
        self.bank_mut().set(Self::balance_key(addr), vec![0xff]);
    }

    pub fn validators(&self) -> u64 {
        self.try_validators().expect("decodes")
    }

    fn try_validators(&self) -> Result<u64, StoreError> {
        Ok(self.bank().get_typed(VALIDATORS_KEY)?.unwrap_or(0))
    }

    fn set_validators(&mut self, n: u64) {
        self.bank_mut()
            .set_typed(VALIDATORS_KEY.to_vec(), &n)
            .expect("encodes");
    }

    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), String> {
        let from_balance = self.balance(from);
        if from_balance < amount {
            return Err(format!("insufficient funds: {from_balance} < {amount}"));
        }
        self.set_balance(from, from_balance - amount);
        let to_balance = self.balance(to);
        self.set_balance(to, to_balance + amount);
        Ok(())
    }

    fn push_pending(&mut self, height: u64) {
        let queue = self.stores.store_mut(QUEUE).expect("queue store mounted");
        let mut pending: Vec<u64> = queue
            .get_typed(PENDING_KEY)
            .expect("decodes")
            .unwrap_or_default();
        pending.push(height);
        queue
            .set_typed(PENDING_KEY.to_vec(), &pending)
            .expect("encodes");
    }
}

impl Application for TestApp {
    type Error = StoreError;

    fn name(&self) -> &str {
        "testapp"
    }

    fn init_chain(
        &mut self,
        app_state: &serde_json::Value,
        header: BlockHeader,
    ) -> Result<(), StoreError> {
        let genesis: TestGenesis =
            serde_json::from_value(app_state.clone()).expect("test genesis decodes");
        self.stores = MultiStore::with_stores([BANK, QUEUE]);
        let mut supply = 0;
        for (addr, amount) in &genesis.balances {
            self.set_balance(addr, *amount);
            supply += amount;
        }
        self.bank_mut().set_typed(SUPPLY_KEY.to_vec(), &supply)?;
        self.set_validators(genesis.validators);
        self.stores
            .store_mut(QUEUE)?
            .set_typed(PENDING_KEY.to_vec(), &Vec::<u64>::new())?;
        self.header = header;
        let version = header.height.as_u64().saturating_sub(1);
        self.last_commit = CommitId::new(version, self.stores.commit_hash(version));
        Ok(())
    }

    fn begin_block(&mut self, header: &BlockHeader) -> Result<(), StoreError> {
        self.header = *header;
        Ok(())
    }

    fn end_block(&mut self, _header: &BlockHeader) -> Result<EndBlockResponse, StoreError> {
        Ok(EndBlockResponse {
            bonded_validators: self.try_validators()? as usize,
        })
    }

    fn commit(&mut self) -> CommitId {
        if let Some(leak) = &self.leak {
            let n = leak.fetch_add(1, Ordering::SeqCst);
            self.bank_mut()
                .set(b"leak".to_vec(), n.to_le_bytes().to_vec());
        }
        let version = self.header.height.as_u64();
        self.last_commit = CommitId::new(version, self.stores.commit_hash(version));
        self.last_commit
    }

    fn last_commit_id(&self) -> CommitId {
        self.last_commit
    }

    fn bonded_validators(&self) -> Result<usize, StoreError> {
        Ok(self.try_validators()? as usize)
    }

    fn export_state(&self, _options: &ExportOptions) -> Result<ExportedState, StoreError> {
        let genesis = TestGenesis {
            balances: self.try_balances()?,
            validators: self.try_validators()?,
        };
        Ok(ExportedState {
            app_state: serde_json::to_value(genesis).expect("encodes"),
            height: self.header.height.as_u64(),
            time: self.header.time,
            validators: Vec::new(),
        })
    }

    fn store_specs(&self) -> Vec<StoreSpec> {
        vec![
            StoreSpec::new(BANK),
            StoreSpec::new(QUEUE).ignoring(PENDING_PREFIX),
        ]
    }

    fn kv_store(&self, name: &str) -> Option<&dyn KvRead> {
        self.stores.store(name).ok().map(|s| s as &dyn KvRead)
    }

    fn module_accounts(&self) -> BTreeSet<Address> {
        BTreeSet::new()
    }

    fn account_addresses(&self) -> Result<Vec<Address>, StoreError> {
        Ok(self.try_balances()?.into_keys().collect())
    }
}

// ============================================================================
// Genesis, operations and invariants
// ============================================================================

pub fn genesis() -> GenesisSource {
    GenesisSource::random(|rng, accounts, _config, resolver| {
        let validators: u64 =
            resolver.resolve("initial_validators", rng, |r| r.next_u64_inclusive(2, 5))?;
        let balances = accounts
            .iter()
            .map(|a| (a.address, rng.next_u64_inclusive(1_000, 10_000)))
            .collect();
        serde_json::to_value(TestGenesis {
            balances,
            validators,
        })
        .map_err(|e| ledgersim_sim::SimError::Genesis(e.to_string()))
    })
}

pub fn transfer_op() -> Box<dyn ledgersim_sim::Operation<TestApp>> {
    operation("bank/transfer", |rng, app: &mut TestApp, ctx| {
        let from = rng
            .choose(ctx.accounts)
            .ok_or_else(|| OperationError::skip("no accounts"))?;
        let to = rng
            .choose(ctx.accounts)
            .ok_or_else(|| OperationError::skip("no accounts"))?;
        let balance = app.balance(&from.address);
        if balance == 0 {
            return Err(OperationError::skip("empty sender"));
        }
        let amount = rng.next_u64_inclusive(1, balance);
        app.transfer(&from.address, &to.address, amount)
            .map_err(OperationError::Skip)?;
        Ok(OperationOutcome::new(format!("sent {amount}")))
    })
}

pub fn retire_op() -> Box<dyn ledgersim_sim::Operation<TestApp>> {
    operation("staking/retire", |_, app: &mut TestApp, _| {
        let n = app.validators();
        if n == 0 {
            return Err(OperationError::skip("no validators"));
        }
        app.set_validators(n - 1);
        Ok(OperationOutcome::new("validator retired"))
    })
}

pub fn propose_op() -> Box<dyn ledgersim_sim::Operation<TestApp>> {
    operation("gov/propose", |_, app: &mut TestApp, ctx| {
        let proposed_at = ctx.header.height.as_u64();
        app.push_pending(proposed_at);
        let vote = operation("gov/vote", move |_, app: &mut TestApp, ctx| {
            app.vote_log.push((proposed_at, ctx.header.height.as_u64()));
            Ok(OperationOutcome::new("voted"))
        });
        Ok(OperationOutcome::new("proposed")
            .with_future(FutureOperation::at(Height::new(proposed_at + 2), vote)))
    })
}

/// Schedules its vote for the block it runs in.
pub fn same_height_propose_op() -> Box<dyn ledgersim_sim::Operation<TestApp>> {
    operation("gov/propose-now", |_, _: &mut TestApp, ctx| {
        let proposed_at = ctx.header.height.as_u64();
        let vote = operation("gov/vote", move |_, app: &mut TestApp, ctx| {
            app.vote_log.push((proposed_at, ctx.header.height.as_u64()));
            Ok(OperationOutcome::new("voted"))
        });
        let follow_up = FutureOperation::at(ctx.header.height, vote);
        Ok(OperationOutcome::new("proposed").with_future(follow_up))
    })
}

pub fn always_skip_op() -> Box<dyn ledgersim_sim::Operation<TestApp>> {
    operation("test/skip", |_, _: &mut TestApp, _| {
        Err(OperationError::skip("never applies"))
    })
}

/// Credits an account without touching supply.
pub fn mint_bug_op() -> Box<dyn ledgersim_sim::Operation<TestApp>> {
    operation("bug/mint", |rng, app: &mut TestApp, ctx| {
        let who = rng
            .choose(ctx.accounts)
            .ok_or_else(|| OperationError::skip("no accounts"))?;
        let balance = app.balance(&who.address);
        app.set_balance(&who.address, balance + 1);
        Ok(OperationOutcome::new("minted"))
    })
}

pub fn fatal_op() -> Box<dyn ledgersim_sim::Operation<TestApp>> {
    operation("bug/fatal", |_, _: &mut TestApp, _| {
        Err(OperationError::fatal("corrupted index"))
    })
}

pub fn supply_invariant() -> InvariantRegistry<TestApp> {
    InvariantRegistry::new().with("bank", "total-supply", |app: &TestApp| {
        let sum: u64 = app.balances().values().sum();
        InvariantReport::check(
            sum != app.supply(),
            format!("sum of balances {sum}, supply {}", app.supply()),
        )
    })
}

pub fn standard_operations() -> OperationSet<TestApp> {
    OperationSet::new()
        .with("op_weight_transfer", 100, transfer_op())
        .with("op_weight_propose", 10, propose_op())
        .with("op_weight_skip", 5, always_skip_op())
}

pub fn inputs(operations: OperationSet<TestApp>) -> SimulationInputs<TestApp> {
    SimulationInputs {
        genesis: genesis(),
        operations,
        invariants: supply_invariant(),
    }
}
