//! Simulation run configuration.

use std::path::PathBuf;

use ledgersim_types::{Height, Timestamp};
use serde::{Deserialize, Serialize};

use crate::SimError;

/// Configuration for a simulation run.
///
/// Loaded by [`crate::ConfigLoader`] from defaults, TOML and `LEDGERSIM_*`
/// environment variables; the builder methods adjust individual fields in
/// code and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for the deterministic RNG.
    pub seed: u64,
    /// Number of blocks to execute.
    pub num_blocks: u64,
    /// Lower bound on fresh operations drawn per block.
    pub min_ops_per_block: u64,
    /// Upper bound on fresh operations drawn per block.
    pub max_ops_per_block: u64,
    /// Invariants run every `invariant_period` checks (≤ 1 means every check).
    pub invariant_period: u64,
    /// Run every invariant at every check point, ignoring the period.
    pub all_invariants: bool,
    /// Check invariants after every operation instead of once per block.
    pub on_operation: bool,
    /// Commit state at the end of every block.
    pub commit: bool,
    /// Log every operation at info level.
    pub verbose: bool,
    /// Opt-in switch for long simulation tests.
    pub enabled: bool,
    /// JSON file of parameter overrides.
    pub params_file: Option<PathBuf>,
    /// Where to write the exported state after a run.
    pub export_state_path: Option<PathBuf>,
    /// Where to write the resolved parameters after a run.
    pub export_params_path: Option<PathBuf>,
    /// Height of the first simulated block.
    pub initial_block_height: u64,
    /// Number of random actor accounts created at genesis.
    pub num_accounts: usize,
    /// Smallest block time increment, in seconds.
    pub min_block_time_secs: u64,
    /// Largest block time increment, in seconds.
    pub max_block_time_secs: u64,
    /// Block time of the first block, in seconds since the epoch.
    pub genesis_time: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_blocks: 500,
            min_ops_per_block: 1,
            max_ops_per_block: 50,
            invariant_period: 1,
            all_invariants: false,
            on_operation: false,
            commit: true,
            verbose: false,
            enabled: false,
            params_file: None,
            export_state_path: None,
            export_params_path: None,
            initial_block_height: 1,
            num_accounts: 40,
            min_block_time_secs: 1,
            max_block_time_secs: 600,
            genesis_time: 1_600_000_000,
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_num_blocks(mut self, num_blocks: u64) -> Self {
        self.num_blocks = num_blocks;
        self
    }

    /// Sets the per-block operation count bounds (inclusive).
    pub fn with_ops_per_block(mut self, min: u64, max: u64) -> Self {
        self.min_ops_per_block = min;
        self.max_ops_per_block = max;
        self
    }

    pub fn with_invariant_period(mut self, period: u64) -> Self {
        self.invariant_period = period;
        self
    }

    pub fn with_all_invariants(mut self, all: bool) -> Self {
        self.all_invariants = all;
        self
    }

    pub fn with_on_operation(mut self, on_operation: bool) -> Self {
        self.on_operation = on_operation;
        self
    }

    pub fn with_commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_params_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.params_file = Some(path.into());
        self
    }

    pub fn with_export_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_state_path = Some(path.into());
        self
    }

    pub fn with_export_params_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_params_path = Some(path.into());
        self
    }

    pub fn with_initial_block_height(mut self, height: u64) -> Self {
        self.initial_block_height = height;
        self
    }

    pub fn with_num_accounts(mut self, num_accounts: usize) -> Self {
        self.num_accounts = num_accounts;
        self
    }

    pub fn with_block_time_secs(mut self, min: u64, max: u64) -> Self {
        self.min_block_time_secs = min;
        self.max_block_time_secs = max;
        self
    }

    pub fn with_genesis_time(mut self, time: Timestamp) -> Self {
        self.genesis_time = time.as_secs();
        self
    }

    pub fn initial_height(&self) -> Height {
        Height::new(self.initial_block_height)
    }

    pub fn genesis_timestamp(&self) -> Timestamp {
        Timestamp::from_secs(self.genesis_time)
    }

    /// Rejects configurations that cannot drive a run.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.min_ops_per_block > self.max_ops_per_block {
            return Err(SimError::InvalidConfig(format!(
                "min_ops_per_block ({}) exceeds max_ops_per_block ({})",
                self.min_ops_per_block, self.max_ops_per_block
            )));
        }
        if self.num_accounts == 0 {
            return Err(SimError::InvalidConfig(
                "num_accounts must be at least 1".to_string(),
            ));
        }
        if self.max_block_time_secs == 0 {
            return Err(SimError::InvalidConfig(
                "max_block_time_secs must be at least 1".to_string(),
            ));
        }
        if self.min_block_time_secs > self.max_block_time_secs {
            return Err(SimError::InvalidConfig(format!(
                "min_block_time_secs ({}) exceeds max_block_time_secs ({})",
                self.min_block_time_secs, self.max_block_time_secs
            )));
        }
        if self.initial_block_height == 0 {
            return Err(SimError::InvalidConfig(
                "initial_block_height must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
