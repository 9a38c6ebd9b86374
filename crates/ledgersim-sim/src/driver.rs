//! The simulation driver: genesis, the block loop, and run results.
//!
//! ```text
//!   seed ──► SimRng ──► accounts ──► genesis ──► init_chain
//!                                                   │
//!          ┌────────────────────────────────────────┘
//!          ▼
//!   ┌─ begin_block
//!   │    due follow-ups (FIFO) ──► k random operations
//!   │  end_block ──► invariants ──► commit ──► bonded == 0 ? stop early
//!   └─ advance height and time
//! ```
//!
//! All randomness flows from one [`SimRng`] seeded by the run's seed, and
//! the driver is single-threaded, so a seed and a configuration fully
//! determine the sequence of calls made on the application.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use ledgersim_types::{BlockHeader, CommitId, Height, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{
    AppParams, Application, EventStats, FutureOperation, InvariantRegistry, InvariantSet,
    Operation, OperationContext, OperationError, OperationRegistry, OperationSet, ParamResolver,
    SEED_PARAM, SimAccount, SimConfig, SimError, SimParams, SimRng, random_accounts,
    schedule_invariants,
};

// ============================================================================
// Inputs
// ============================================================================

/// Builds a random genesis application state for the given accounts.
///
/// Randomized genesis parameters should be drawn through the resolver so
/// they are recorded and can be overridden.
pub type AppStateFn = Box<
    dyn Fn(
            &mut SimRng,
            &[SimAccount],
            &SimConfig,
            &mut ParamResolver<'_>,
        ) -> Result<Value, SimError>
        + Send
        + Sync,
>;

/// Where the run's initial state comes from.
pub enum GenesisSource {
    /// Generate accounts and a random genesis, then `init_chain`.
    Random(AppStateFn),
    /// The application is already initialized (e.g. from an imported
    /// snapshot); actors are rebuilt from its accounts.
    Existing,
}

impl GenesisSource {
    pub fn random(
        f: impl Fn(
            &mut SimRng,
            &[SimAccount],
            &SimConfig,
            &mut ParamResolver<'_>,
        ) -> Result<Value, SimError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self::Random(Box::new(f))
    }
}

/// Everything an application contributes to a run besides itself.
pub struct SimulationInputs<A> {
    pub genesis: GenesisSource,
    pub operations: OperationSet<A>,
    pub invariants: InvariantRegistry<A>,
}

// ============================================================================
// Results
// ============================================================================

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Every configured block executed.
    Completed,
    /// The application ran out of bonded validators (or actors).
    EarlyStop,
    /// An invariant was broken.
    InvariantViolation,
    /// Configuration, application or operation failure.
    FatalError,
}

/// Summary of one simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    pub seed: u64,
    pub stop_reason: StopReason,
    /// Set for `InvariantViolation` and `FatalError`.
    pub error: Option<SimError>,
    /// Every parameter the run resolved.
    pub params: SimParams,
    pub stats: EventStats,
    pub blocks_executed: u64,
    pub operations_executed: u64,
    pub future_operations_executed: u64,
    /// Follow-ups still queued when the run ended.
    pub pending_future_operations: usize,
    /// Height of the last executed block (initial height - 1 if none ran).
    pub last_height: Height,
    /// Time of the next block that would have executed.
    pub next_block_time: Timestamp,
    pub last_commit: CommitId,
    pub elapsed: Duration,
}

impl SimulationResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn stopped_early(&self) -> bool {
        self.stop_reason == StopReason::EarlyStop
    }

    /// Converts a failed run into its error.
    pub fn into_result(mut self) -> Result<Self, SimError> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Runs one simulation of `app` from `config.seed`.
///
/// Never panics on application or operation failures; they are reported in
/// [`SimulationResult::error`] together with the statistics gathered so far.
pub fn simulate_from_seed<A: Application + 'static>(
    app: &mut A,
    inputs: SimulationInputs<A>,
    config: &SimConfig,
) -> SimulationResult {
    let started = Instant::now();
    let SimulationInputs {
        genesis,
        operations,
        invariants,
    } = inputs;

    info!(
        app = app.name(),
        seed = config.seed,
        num_blocks = config.num_blocks,
        invariants = invariants.iter().count(),
        operations = operations.len(),
        "starting simulation"
    );

    let mut run = Run::new(config, schedule_invariants(invariants, config));
    let (stop_reason, error) = match run.execute(app, genesis, operations) {
        Ok(reason) => (reason, None),
        Err(err) => {
            let reason = if err.is_invariant_violation() {
                StopReason::InvariantViolation
            } else {
                StopReason::FatalError
            };
            error!(
                seed = run.seed,
                height = %run.header.height,
                error = %err,
                "simulation failed"
            );
            (reason, Some(err))
        }
    };

    let result = SimulationResult {
        seed: run.seed,
        stop_reason,
        error,
        params: run.params,
        stats: run.stats,
        blocks_executed: run.blocks_executed,
        operations_executed: run.operations_executed,
        future_operations_executed: run.future_executed,
        pending_future_operations: run.queue.values().map(VecDeque::len).sum(),
        last_height: run.last_height,
        next_block_time: run.header.time,
        last_commit: app.last_commit_id(),
        elapsed: started.elapsed(),
    };

    info!(
        seed = result.seed,
        stop = ?result.stop_reason,
        blocks = result.blocks_executed,
        operations = result.operations_executed,
        commit = %result.last_commit,
        "simulation finished"
    );
    result
}

/// Mutable state of a run in progress.
struct Run<'c, A> {
    config: &'c SimConfig,
    seed: u64,
    rng: SimRng,
    header: BlockHeader,
    last_height: Height,
    accounts: Vec<SimAccount>,
    queue: BTreeMap<u64, VecDeque<FutureOperation<A>>>,
    invariants: Box<dyn InvariantSet<A>>,
    stats: EventStats,
    params: SimParams,
    blocks_executed: u64,
    operations_executed: u64,
    future_executed: u64,
}

impl<'c, A: Application + 'static> Run<'c, A> {
    fn new(config: &'c SimConfig, invariants: Box<dyn InvariantSet<A>>) -> Self {
        let initial = config.initial_height();
        Self {
            config,
            seed: config.seed,
            rng: SimRng::new(config.seed),
            header: BlockHeader::new(initial, config.genesis_timestamp()),
            last_height: Height::new(initial.as_u64().saturating_sub(1)),
            accounts: Vec::new(),
            queue: BTreeMap::new(),
            invariants,
            stats: EventStats::new(),
            params: SimParams::default(),
            blocks_executed: 0,
            operations_executed: 0,
            future_executed: 0,
        }
    }

    fn execute(
        &mut self,
        app: &mut A,
        genesis: GenesisSource,
        operations: OperationSet<A>,
    ) -> Result<StopReason, SimError> {
        self.config.validate()?;
        let overrides = match &self.config.params_file {
            Some(path) => AppParams::from_file(path)?,
            None => AppParams::new(),
        };

        let mut resolver = ParamResolver::new(&overrides);
        let initialized = self
            .resolve_seed(&mut resolver)
            .and_then(|()| {
                self.initialize(app, genesis, operations, &mut resolver)
            });
        self.params = resolver.into_params();

        match initialized? {
            Some(registry) => self.block_loop(app, &registry),
            None => Ok(StopReason::EarlyStop),
        }
    }

    /// Records the seed with the other resolved parameters. A `seed` entry
    /// in the params file replaces the configured seed.
    fn resolve_seed(&mut self, resolver: &mut ParamResolver<'_>) -> Result<(), SimError> {
        let configured = self.config.seed;
        let seed: u64 = resolver.resolve(SEED_PARAM, &mut self.rng, |_| configured)?;
        if seed != configured {
            info!(seed, configured, "seed taken from params file");
            self.rng = SimRng::new(seed);
        }
        self.seed = seed;
        Ok(())
    }

    /// Sets up accounts, genesis and weights. `None` means there is nothing
    /// to simulate (no actors or no bonded validators).
    fn initialize(
        &mut self,
        app: &mut A,
        genesis: GenesisSource,
        operations: OperationSet<A>,
        resolver: &mut ParamResolver<'_>,
    ) -> Result<Option<OperationRegistry<A>>, SimError> {
        match genesis {
            GenesisSource::Random(app_state_fn) => {
                self.accounts = random_accounts(&mut self.rng, self.config.num_accounts);
                let app_state = app_state_fn(&mut self.rng, &self.accounts, self.config, resolver)?;
                app.init_chain(&app_state, self.header)
                    .map_err(|e| SimError::application("init_chain", e))?;
            }
            GenesisSource::Existing => {
                self.accounts = app
                    .account_addresses()
                    .map_err(|e| SimError::application("account_addresses", e))?
                    .into_iter()
                    .map(SimAccount::new)
                    .collect();
            }
        }

        let module_accounts = app.module_accounts();
        self.accounts
            .retain(|account| !module_accounts.contains(&account.address));

        let registry = operations.resolve(resolver, &mut self.rng)?;
        for (route, weight) in registry.weights() {
            debug!(route, weight, "operation weight");
        }

        if self.accounts.is_empty() {
            warn!("no actor accounts; nothing to simulate");
            return Ok(None);
        }
        let bonded = app
            .bonded_validators()
            .map_err(|e| SimError::application("bonded_validators", e))?;
        if bonded == 0 {
            warn!("genesis has no bonded validators; nothing to simulate");
            return Ok(None);
        }
        Ok(Some(registry))
    }

    fn block_loop(
        &mut self,
        app: &mut A,
        registry: &OperationRegistry<A>,
    ) -> Result<StopReason, SimError> {
        let progress_interval = (self.config.num_blocks / 10).max(1);

        for _ in 0..self.config.num_blocks {
            app.begin_block(&self.header)
                .map_err(|e| SimError::application("begin_block", e))?;

            self.run_due_future_operations(app)?;

            let count = self
                .rng
                .next_u64_inclusive(self.config.min_ops_per_block, self.config.max_ops_per_block);
            for _ in 0..count {
                let op = registry.select(&mut self.rng);
                self.apply(app, op)?;
            }

            let end = app
                .end_block(&self.header)
                .map_err(|e| SimError::application("end_block", e))?;

            if !self.config.on_operation {
                self.check_invariants(app)?;
            }

            if self.config.commit {
                let commit = app.commit();
                debug!(height = %self.header.height, %commit, "committed");
            }

            self.blocks_executed += 1;
            self.last_height = self.header.height;

            if self.blocks_executed % progress_interval == 0 {
                info!(
                    height = %self.header.height,
                    blocks = self.blocks_executed,
                    operations = self.operations_executed,
                    "simulation progress"
                );
            }

            if end.bonded_validators == 0 {
                warn!(height = %self.header.height, "no bonded validators left; stopping early");
                self.advance_header();
                return Ok(StopReason::EarlyStop);
            }

            self.advance_header();
        }

        Ok(StopReason::Completed)
    }

    fn advance_header(&mut self) {
        let step = self.rng.next_u64_inclusive(
            self.config.min_block_time_secs,
            self.config.max_block_time_secs,
        );
        self.header = BlockHeader::new(
            self.header.height.next(),
            self.header.time.saturating_add_secs(step),
        );
    }

    fn run_due_future_operations(&mut self, app: &mut A) -> Result<(), SimError> {
        let height = self.header.height.as_u64();
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if *entry.key() > height {
                break;
            }
            due.extend(entry.remove());
        }

        for future in due {
            self.future_executed += 1;
            self.apply(app, future.operation.as_ref())?;
        }
        Ok(())
    }

    fn apply(&mut self, app: &mut A, op: &dyn Operation<A>) -> Result<(), SimError> {
        let route = op.route();
        let ctx = OperationContext {
            header: self.header,
            accounts: &self.accounts,
        };
        let result = op.execute(&mut self.rng, app, &ctx);
        self.operations_executed += 1;

        match result {
            Ok(outcome) => {
                self.stats.record_ok(route);
                let height = self.header.height;
                if self.config.verbose {
                    info!(%height, route, comment = %outcome.comment, "operation");
                } else {
                    debug!(%height, route, comment = %outcome.comment, "operation");
                }
                if !outcome.future_operations.is_empty() {
                    self.schedule(route, outcome.future_operations);
                }
            }
            Err(OperationError::Skip(reason)) => {
                self.stats.record_skip(route);
                debug!(height = %self.header.height, route, %reason, "operation skipped");
            }
            Err(OperationError::Fatal(reason)) => {
                return Err(SimError::Operation {
                    route: route.to_string(),
                    height: self.header.height.as_u64(),
                    reason,
                });
            }
        }

        if self.config.on_operation {
            self.check_invariants(app)?;
        }
        Ok(())
    }

    fn schedule(&mut self, route: &str, futures: Vec<FutureOperation<A>>) {
        let next = self.header.height.as_u64() + 1;
        self.stats.record_scheduled(route, futures.len());
        for future in futures {
            let requested = future.block_height.as_u64();
            let target = requested.max(next);
            if target != requested {
                debug!(route, requested, target, "follow-up moved to next block");
            }
            self.queue.entry(target).or_default().push_back(future);
        }
    }

    fn check_invariants(&mut self, app: &A) -> Result<(), SimError> {
        if let Some(broken) = self.invariants.check(app) {
            error!(
                height = %self.header.height,
                module = %broken.module,
                route = %broken.route,
                message = %broken.message,
                "invariant broken"
            );
            return Err(SimError::InvariantViolation {
                module: broken.module,
                route: broken.route,
                height: self.header.height.as_u64(),
                message: broken.message,
            });
        }
        Ok(())
    }
}
