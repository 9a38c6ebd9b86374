//! ledgersim command line.
//!
//! Drives the reference ledger through the simulation harness.
//!
//! # Quick Start
//!
//! ```bash
//! # One run with 200 blocks
//! ledgersim run --seed 7 --num-blocks 200
//!
//! # Export, re-import into a fresh ledger and diff every store
//! ledgersim import-export --seed 7
//!
//! # Same seed, several runs, identical commits?
//! ledgersim determinism --seeds 3 --runs 5
//! ```
//!
//! Settings come from `ledgersim.toml`, `--config`, and `LEDGERSIM_*`
//! environment variables; flags override all of them.

mod commands;
mod style;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::RunArgs;

/// Randomized simulation and invariant checking for the reference ledger.
#[derive(Parser)]
#[command(name = "ledgersim")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Additional TOML config file (must exist).
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level and report every operation.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    /// Print a JSON summary instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one simulation from a seed.
    Run(RunArgs),

    /// Run, export the final state, import it into a fresh ledger and diff the stores.
    ImportExport {
        #[command(flatten)]
        run: RunArgs,

        /// Compare keys under ignored prefixes too (values may differ).
        #[arg(long)]
        keys_only: bool,
    },

    /// Run, export for a new chain, import, and simulate again on the imported state.
    AfterImport(RunArgs),

    /// Repeat seeds several times and require identical commits.
    Determinism {
        #[command(flatten)]
        run: RunArgs,

        /// Number of seed groups.
        #[arg(long, default_value = "3")]
        seeds: usize,

        /// Runs per seed group.
        #[arg(long, default_value = "5")]
        runs: usize,

        /// Seed the group seeds are derived from.
        #[arg(long, default_value = "0")]
        base_seed: u64,

        /// Run seed groups one after another.
        #[arg(long)]
        sequential: bool,

        /// Also check invariants during the audit runs.
        #[arg(long)]
        check_invariants: bool,
    },

    /// Run once, then time every invariant against the final state.
    Invariants(RunArgs),
}

impl Commands {
    fn run_args(&self) -> &RunArgs {
        match self {
            Self::Run(run)
            | Self::AfterImport(run)
            | Self::Invariants(run)
            | Self::ImportExport { run, .. }
            | Self::Determinism { run, .. } => run,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    style::set_no_color(cli.no_color);

    let base = commands::load_config(cli.config.as_deref())?;
    let out = commands::Output { json: cli.json };

    let verbose = cli.verbose || base.verbose;
    let config = cli.command.run_args().apply(base.with_verbose(verbose))?;
    init_tracing(config.verbose);
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Run(_) => commands::run::run(&config, out),
        Commands::ImportExport { keys_only, .. } => {
            commands::import_export::run(&config, keys_only, out)
        }
        Commands::AfterImport(_) => commands::import_export::after_import(&config, out),
        Commands::Determinism {
            seeds,
            runs,
            base_seed,
            sequential,
            check_invariants,
            ..
        } => commands::determinism::run(
            &config,
            &commands::determinism::AuditArgs {
                seeds,
                runs,
                base_seed,
                parallel: !sequential,
                check_invariants,
            },
            out,
        ),
        Commands::Invariants(_) => commands::run::invariants(&config, out),
    }
}
