//! State export/import verification.
//!
//! After a run, the application's state is exported as a [`Snapshot`],
//! imported into a fresh application instance, and every declared store of
//! the two instances is diffed. Keys under a store's ignored prefixes are
//! treated per [`PrefixPolicy`]. A run that stopped early is refused: its
//! state is not a meaningful export candidate.

use std::path::Path;

use ledgersim_store::{KvDiff, PrefixPolicy, diff_kv_stores};
use ledgersim_types::{Address, BlockHeader, Height, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    Application, ExportOptions, GenesisSource, SimConfig, SimError, SimulationInputs,
    SimulationResult, simulate_from_seed,
};

// ============================================================================
// Snapshots
// ============================================================================

/// Exported application state plus the chain position it was taken at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub app_name: String,
    /// Height of the last executed block.
    pub height: u64,
    /// Time of the last executed block.
    pub time: Timestamp,
    pub validators: Vec<Address>,
    pub app_state: Value,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, SimError> {
        serde_json::to_string_pretty(self).map_err(SimError::SnapshotCodec)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), SimError> {
        std::fs::write(path, self.to_json()?).map_err(|e| SimError::io(path, e))
    }

    pub fn read_from(path: &Path) -> Result<Self, SimError> {
        let contents = std::fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        serde_json::from_str(&contents).map_err(SimError::SnapshotCodec)
    }

    /// Header of the first block executed after importing this snapshot.
    /// Block time never moves backwards across an import.
    pub fn next_header(&self) -> BlockHeader {
        BlockHeader::new(Height::new(self.height + 1), self.time)
    }
}

/// Exports `app` as a snapshot.
pub fn export_snapshot<A: Application>(
    app: &A,
    options: &ExportOptions,
) -> Result<Snapshot, SimError> {
    let exported = app
        .export_state(options)
        .map_err(|e| SimError::application("export_state", e))?;
    Ok(Snapshot {
        app_name: app.name().to_string(),
        height: exported.height,
        time: exported.time,
        validators: exported.validators,
        app_state: exported.app_state,
    })
}

/// Initializes a fresh application from a snapshot.
pub fn import_snapshot<A: Application>(app: &mut A, snapshot: &Snapshot) -> Result<(), SimError> {
    app.init_chain(&snapshot.app_state, snapshot.next_header())
        .map_err(|e| SimError::application("import", e))
}

// ============================================================================
// Store comparison
// ============================================================================

/// Diff of one named store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDiffReport {
    pub store: String,
    pub diff: KvDiff,
}

impl StoreDiffReport {
    /// The store name, its divergent key count, and every divergent entry
    /// of the exporting (`A`) and importing (`B`) side.
    pub fn log(&self) -> String {
        format!(
            "store {}: {} divergent keys\n{}",
            self.store,
            self.diff.len(),
            self.diff.log()
        )
    }
}

/// Outcome of an export/import round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportExportReport {
    pub height: u64,
    pub stores: Vec<StoreDiffReport>,
}

impl ImportExportReport {
    pub fn is_clean(&self) -> bool {
        self.stores.iter().all(|s| s.diff.is_empty())
    }

    pub fn mismatched_keys(&self) -> usize {
        self.stores.iter().map(|s| s.diff.len()).sum()
    }

    /// Fails listing every divergent entry of every store with differences.
    pub fn into_result(self) -> Result<Self, SimError> {
        let bad: Vec<&StoreDiffReport> =
            self.stores.iter().filter(|s| !s.diff.is_empty()).collect();
        if bad.is_empty() {
            return Ok(self);
        }
        Err(SimError::StoreMismatch {
            stores: bad.iter().map(|s| s.store.clone()).collect(),
            log: bad.iter().map(|s| s.log()).collect::<Vec<_>>().join("\n"),
        })
    }
}

/// Diffs every store `a` declares against the same store in `b`.
pub fn compare_app_stores<A: Application>(
    a: &A,
    b: &A,
    policy: PrefixPolicy,
) -> Result<Vec<StoreDiffReport>, SimError> {
    a.store_specs()
        .into_iter()
        .map(|spec| {
            let left = a
                .kv_store(&spec.name)
                .ok_or_else(|| SimError::MissingStore(spec.name.clone()))?;
            let right = b
                .kv_store(&spec.name)
                .ok_or_else(|| SimError::MissingStore(spec.name.clone()))?;
            let diff = diff_kv_stores(left, right, &spec.ignored_prefixes, policy);
            info!(
                store = %spec.name,
                mismatched = diff.len(),
                ignored = diff.ignored,
                "compared store"
            );
            Ok(StoreDiffReport {
                store: spec.name,
                diff,
            })
        })
        .collect()
}

/// Exports the state of a finished run, imports it into `fresh`, and diffs
/// every store.
///
/// Returns [`SimError::StoppedEarly`] without touching `fresh` when the run
/// stopped early.
pub fn verify_import_export<A: Application>(
    run: &SimulationResult,
    app: &A,
    fresh: &mut A,
    policy: PrefixPolicy,
) -> Result<ImportExportReport, SimError> {
    if run.stopped_early() {
        warn!(seed = run.seed, "run stopped early; skipping export/import");
        return Err(SimError::StoppedEarly);
    }

    let snapshot = export_snapshot(app, &ExportOptions::default())?;
    import_snapshot(fresh, &snapshot)?;
    let stores = compare_app_stores(app, fresh, policy)?;

    Ok(ImportExportReport {
        height: snapshot.height,
        stores,
    })
}

/// Exports a finished run for a new chain, imports it into `fresh`, and
/// simulates again on the imported state with the same seed.
pub fn simulate_after_import<A: Application + 'static>(
    run: &SimulationResult,
    app: &A,
    mut fresh: A,
    inputs: SimulationInputs<A>,
    config: &SimConfig,
) -> Result<(A, SimulationResult), SimError> {
    if run.stopped_early() {
        warn!(seed = run.seed, "run stopped early; skipping simulation after import");
        return Err(SimError::StoppedEarly);
    }

    let options = ExportOptions {
        for_zero_height: true,
        jail_whitelist: Vec::new(),
    };
    let snapshot = export_snapshot(app, &options)?;
    import_snapshot(&mut fresh, &snapshot)?;

    let header = snapshot.next_header();
    let config = config
        .clone()
        .with_initial_block_height(header.height.as_u64())
        .with_genesis_time(header.time);
    let inputs = SimulationInputs {
        genesis: GenesisSource::Existing,
        ..inputs
    };

    info!(height = snapshot.height, "simulating after import");
    let result = simulate_from_seed(&mut fresh, inputs, &config);
    Ok((fresh, result))
}

/// Writes the exported state and resolved parameters of a run to the paths
/// named in `config`, if any.
///
/// Called before the run's error is inspected so a failing run still leaves
/// its artifacts behind.
pub fn write_run_artifacts<A: Application>(
    app: &A,
    result: &SimulationResult,
    config: &SimConfig,
) -> Result<(), SimError> {
    if let Some(path) = &config.export_state_path {
        let snapshot = export_snapshot(app, &ExportOptions::default())?;
        snapshot.write_to(path)?;
        info!(path = %path.display(), "exported state");
    }
    if let Some(path) = &config.export_params_path {
        result.params.write_to(path)?;
        info!(path = %path.display(), "exported params");
    }
    Ok(())
}
