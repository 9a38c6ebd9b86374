//! The contract between the harness and the application under test.
//!
//! The harness drives an [`Application`] through its block lifecycle and
//! reads its state through ordered key-value stores. It never interprets
//! application data: genesis and exported state are opaque JSON values, and
//! operations (which do know the application) perform the actual work.

use std::collections::BTreeSet;

use ledgersim_store::KvRead;
use ledgersim_types::{Address, BlockHeader, CommitId, Timestamp};
use serde_json::Value;

/// Reported by the application at the end of every block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndBlockResponse {
    /// Number of validators bonded after the block. Zero stops the run.
    pub bonded_validators: usize,
}

/// Options for exporting application state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Prepare the state to seed a new chain: settle outstanding
    /// per-validator accruals and reset height-dependent records.
    pub for_zero_height: bool,
    /// With `for_zero_height`, validators outside this list are jailed.
    /// Empty means no jailing.
    pub jail_whitelist: Vec<Address>,
}

/// Application state exported at some height.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedState {
    pub app_state: Value,
    pub height: u64,
    pub time: Timestamp,
    pub validators: Vec<Address>,
}

/// A named store and the key prefixes the export/import diff must not
/// compare byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSpec {
    pub name: String,
    pub ignored_prefixes: Vec<Vec<u8>>,
}

impl StoreSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ignored_prefixes: Vec::new(),
        }
    }

    pub fn ignoring(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        self.ignored_prefixes.push(prefix.into());
        self
    }
}

/// A deterministic ledger state machine the harness can drive.
///
/// Implementations must be deterministic: the same genesis and the same
/// sequence of calls must yield the same stores and commit ids. They must
/// not read wall-clock time or ambient randomness.
pub trait Application {
    type Error: std::error::Error + Send + Sync + 'static;

    fn name(&self) -> &str;

    /// Initializes state from a genesis (or imported) application state.
    /// `header` is the first block the chain will execute.
    fn init_chain(&mut self, app_state: &Value, header: BlockHeader) -> Result<(), Self::Error>;

    fn begin_block(&mut self, header: &BlockHeader) -> Result<(), Self::Error>;

    fn end_block(&mut self, header: &BlockHeader) -> Result<EndBlockResponse, Self::Error>;

    /// Persists the current block's effects and returns the new commit id.
    fn commit(&mut self) -> CommitId;

    fn last_commit_id(&self) -> CommitId;

    /// Validators currently bonded.
    fn bonded_validators(&self) -> Result<usize, Self::Error>;

    fn export_state(&self, options: &ExportOptions) -> Result<ExportedState, Self::Error>;

    /// The stores compared by export/import verification.
    fn store_specs(&self) -> Vec<StoreSpec>;

    fn kv_store(&self, name: &str) -> Option<&dyn KvRead>;

    /// Module accounts; never used as actors.
    fn module_accounts(&self) -> BTreeSet<Address>;

    /// Accounts holding state, used to rebuild the actor set after import.
    fn account_addresses(&self) -> Result<Vec<Address>, Self::Error>;
}
