//! # ledgersim-app: Reference ledger for the simulation harness
//!
//! A small proof-of-stake ledger with five modules, built to be driven by
//! `ledgersim-sim`:
//!
//! | Module | State |
//! |--------|-------|
//! | bank | balances and total supply |
//! | staking | validators, delegations, unbonding and redelegation entries |
//! | distribution | fee allocation, commission, delegator rewards, community pool |
//! | slashing | equivocation slashing and jailing |
//! | gov | proposals, deposits, votes, tallying |
//!
//! [`SimApp`] implements [`ledgersim_sim::Application`]. Every transaction
//! passes through the fee [`ante`] stage and then executes its messages
//! against a cache-wrapped copy of the stores that is written back only if
//! every message succeeds.
//!
//! ```ignore
//! use ledgersim_app::{SimApp, simulation_inputs};
//! use ledgersim_sim::{SimConfig, simulate_from_seed};
//!
//! let mut app = SimApp::new();
//! let result = simulate_from_seed(&mut app, simulation_inputs(), &SimConfig::default());
//! assert!(result.is_ok());
//! ```

pub mod ante;
mod app;
pub mod bank;
pub mod distribution;
mod error;
pub mod genesis;
pub mod gov;
pub mod invariants;
pub mod keys;
pub mod msg;
pub mod simulation;
pub mod slashing;
pub mod staking;

pub use app::{APP_NAME, SimApp};
pub use error::{AppError, TxError};
pub use genesis::GenesisState;
pub use msg::{Fee, Msg, Tx, TxResponse};
pub use simulation::simulation_inputs;
