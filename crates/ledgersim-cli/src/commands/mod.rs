//! CLI command implementations.

pub mod determinism;
pub mod import_export;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use ledgersim_sim::{ConfigLoader, SimConfig, SimulationResult};
use serde_json::{Value, json};

/// Simulation flags shared by every subcommand. Unset flags keep the
/// loaded configuration.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Seed for the run.
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Number of blocks to simulate.
    #[arg(short = 'n', long)]
    pub num_blocks: Option<u64>,

    /// Fewest operations drawn per block.
    #[arg(long)]
    pub min_ops: Option<u64>,

    /// Most operations drawn per block.
    #[arg(long)]
    pub max_ops: Option<u64>,

    /// Number of random accounts created at genesis.
    #[arg(long)]
    pub num_accounts: Option<usize>,

    /// Check invariants only every this many blocks.
    #[arg(long)]
    pub invariant_period: Option<u64>,

    /// Check every invariant at every check point.
    #[arg(long)]
    pub all_invariants: bool,

    /// Check invariants after every operation instead of every block.
    #[arg(long)]
    pub on_operation: bool,

    /// Skip commits; the genesis commit stays the last one.
    #[arg(long)]
    pub no_commit: bool,

    /// JSON file of parameter overrides.
    #[arg(long, value_name = "FILE")]
    pub params: Option<PathBuf>,

    /// Write the exported state here after the run.
    #[arg(long, value_name = "FILE")]
    pub export_state: Option<PathBuf>,

    /// Write the resolved parameters here after the run.
    #[arg(long, value_name = "FILE")]
    pub export_params: Option<PathBuf>,

    /// Height of the first simulated block.
    #[arg(long)]
    pub initial_height: Option<u64>,
}

impl RunArgs {
    /// Layers the flags over `config` and validates the result.
    pub fn apply(&self, mut config: SimConfig) -> Result<SimConfig> {
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(num_blocks) = self.num_blocks {
            config.num_blocks = num_blocks;
        }
        if let Some(min) = self.min_ops {
            config.min_ops_per_block = min;
        }
        if let Some(max) = self.max_ops {
            config.max_ops_per_block = max;
        }
        if let Some(n) = self.num_accounts {
            config.num_accounts = n;
        }
        if let Some(period) = self.invariant_period {
            config.invariant_period = period;
        }
        if let Some(height) = self.initial_height {
            config.initial_block_height = height;
        }
        config.all_invariants |= self.all_invariants;
        config.on_operation |= self.on_operation;
        if self.no_commit {
            config.commit = false;
        }
        if let Some(path) = &self.params {
            config.params_file = Some(path.clone());
        }
        if let Some(path) = &self.export_state {
            config.export_state_path = Some(path.clone());
        }
        if let Some(path) = &self.export_params {
            config.export_params_path = Some(path.clone());
        }

        config
            .validate()
            .context("invalid simulation configuration")?;
        Ok(config)
    }
}

/// Loads `ledgersim.toml`, the optional explicit file, and `LEDGERSIM_*`
/// variables.
pub fn load_config(file: Option<&Path>) -> Result<SimConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = file {
        loader = loader.with_file(path);
    }
    loader
        .load()
        .with_context(|| match file {
            Some(path) => format!("failed to load configuration from {}", path.display()),
            None => "failed to load configuration".to_string(),
        })
}

/// How results are printed.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    pub fn print_json(self, value: &Value) -> Result<()> {
        let text = serde_json::to_string_pretty(value).context("failed to encode summary")?;
        println!("{text}");
        Ok(())
    }
}

/// JSON form of a run summary.
pub fn result_json(result: &SimulationResult) -> Value {
    json!({
        "seed": result.seed,
        "stop_reason": format!("{:?}", result.stop_reason),
        "error": result.error.as_ref().map(ToString::to_string),
        "blocks_executed": result.blocks_executed,
        "operations_executed": result.operations_executed,
        "future_operations_executed": result.future_operations_executed,
        "pending_future_operations": result.pending_future_operations,
        "last_height": result.last_height.as_u64(),
        "last_commit": result.last_commit.to_string(),
        "elapsed_secs": result.elapsed.as_secs_f64(),
        "stats": result.stats,
        "params": result.params,
    })
}
