//! # ledgersim-sim: Randomized simulation of deterministic ledgers
//!
//! This crate drives a deterministic ledger application through long,
//! randomized block sequences and checks that it stays correct.
//!
// Simulation code intentionally uses patterns that trigger pedantic lints
#![allow(clippy::cast_precision_loss)] // Stats and timings use f64
#![allow(clippy::missing_fields_in_debug)] // Boxed closures are not Debug
#![cfg_attr(test, allow(clippy::float_cmp))] // Test assertions use exact float comparisons
//!
//! ## Philosophy
//!
//! - **Reproducibility**: Same seed + same config → same run → same commit id
//! - **Randomized coverage**: Weighted random operations explore states no
//!   hand-written test reaches
//! - **Invariant checking**: Module invariants are asserted per block or per
//!   operation
//! - **Round-trip safety**: Exported state must import into an identical
//!   store set
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Simulation Driver                        │
//! │  ┌──────────────┐   ┌───────────────────┐   ┌────────────────┐   │
//! │  │ SimRng       │   │ OperationRegistry │   │ Follow-up queue│   │
//! │  │ (ChaCha8)    │   │ (weighted)        │   │ (by height)    │   │
//! │  └──────────────┘   └───────────────────┘   └────────────────┘   │
//! │                                                                  │
//! │  ┌──────────────────────────┐   ┌─────────────────────────────┐  │
//! │  │ ParamResolver            │   │ InvariantRegistry           │  │
//! │  │ overrides → generators   │   │ (optionally periodic)       │  │
//! │  └──────────────────────────┘   └─────────────────────────────┘  │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ Application trait
//!                                 ▼
//!                  ledger state machine (ordered KV stores)
//!                                 │
//!            ┌────────────────────┴─────────────────────┐
//!            ▼                                          ▼
//!   Export/Import verifier                     Determinism auditor
//!   (snapshot → import → store diff)           (seeds × runs → commit ids)
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use ledgersim_sim::{SimConfig, simulate_from_seed};
//!
//! let config = SimConfig::default().with_seed(42).with_num_blocks(100);
//! let mut app = MyApp::new();
//! let result = simulate_from_seed(&mut app, my_app::simulation_inputs(), &config);
//! assert!(result.is_ok(), "{:?}", result.error);
//! ```
//!
//! ## Key Concepts
//!
//! - **Operation**: a randomized action; rejections are skips, not failures
//! - **Future operation**: a follow-up scheduled for a later block
//! - **Invariant**: `module/route` check over state; the first broken one
//!   stops the run
//! - **Early stop**: the application has no bonded validators left
//! - **Ignored prefix**: store keys excluded from the export/import diff

mod account;
mod application;
mod config;
mod determinism;
mod driver;
mod error;
mod export;
mod invariant;
mod loader;
mod operation;
mod params;
mod periodic;
mod rng;
mod stats;

pub use account::{SimAccount, random_accounts};
pub use application::{Application, EndBlockResponse, ExportOptions, ExportedState, StoreSpec};
pub use config::SimConfig;
pub use determinism::{DeterminismAuditor, DeterminismReport, Divergence, SeedAudit};
pub use driver::{
    AppStateFn, GenesisSource, SimulationInputs, SimulationResult, StopReason, simulate_from_seed,
};
pub use error::SimError;
pub use export::{
    ImportExportReport, Snapshot, StoreDiffReport, compare_app_stores, export_snapshot,
    import_snapshot, simulate_after_import, verify_import_export, write_run_artifacts,
};
pub use invariant::{
    BrokenInvariant, Invariant, InvariantRegistry, InvariantReport, InvariantSet, InvariantTiming,
};
pub use loader::{ConfigLoader, PROJECT_CONFIG_FILE};
pub use operation::{
    FnOperation, FutureOperation, Operation, OperationContext, OperationError, OperationOutcome,
    OperationRegistry, OperationResult, OperationSet, WeightedOperation, operation,
};
pub use params::{AppParams, ParamChange, ParamResolver, SEED_PARAM, SimParams};
pub use periodic::{PeriodicInvariants, schedule_invariants};
pub use rng::SimRng;
pub use stats::{EventStats, RouteStats};

pub use ledgersim_store::PrefixPolicy;
