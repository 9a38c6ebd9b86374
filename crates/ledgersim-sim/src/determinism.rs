//! Determinism auditing.
//!
//! For each of `num_seeds` seeds, the auditor runs the same simulation
//! `runs_per_seed` times, each on a freshly built application, and requires
//! every run to end with the same commit id. Seed groups may run in
//! parallel; the runs themselves are always single-threaded.

use std::fmt;
use std::time::Instant;

use ledgersim_types::CommitId;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    Application, InvariantRegistry, SimConfig, SimError, SimRng, SimulationInputs,
    simulate_from_seed,
};

/// Commit ids observed for one seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedAudit {
    pub seed: u64,
    /// One commit id per run, in run order.
    pub commits: Vec<CommitId>,
    /// Indices of the runs whose commit id differs from run 0.
    pub divergent_runs: Vec<usize>,
}

impl SeedAudit {
    pub fn is_deterministic(&self) -> bool {
        self.divergent_runs.is_empty()
    }

    /// Every divergent run of this seed, against run 0.
    pub fn divergences(&self) -> Vec<Divergence> {
        let Some(&expected) = self.commits.first() else {
            return Vec::new();
        };
        self.divergent_runs
            .iter()
            .filter_map(|&run| {
                self.commits.get(run).map(|&actual| Divergence {
                    seed: self.seed,
                    run,
                    expected,
                    actual,
                })
            })
            .collect()
    }
}

/// A run that ended on a different commit than run 0 of its seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub seed: u64,
    pub run: usize,
    pub expected: CommitId,
    pub actual: CommitId,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seed {} run {}: expected {}, got {}",
            self.seed, self.run, self.expected, self.actual
        )
    }
}

/// Result of a determinism audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterminismReport {
    pub seeds: Vec<SeedAudit>,
    pub elapsed_secs: f64,
}

impl DeterminismReport {
    pub fn all_deterministic(&self) -> bool {
        self.seeds.iter().all(SeedAudit::is_deterministic)
    }

    /// Every divergent run of every seed, in seed then run order.
    pub fn divergences(&self) -> Vec<Divergence> {
        self.seeds.iter().flat_map(SeedAudit::divergences).collect()
    }

    /// Fails listing every divergence found.
    pub fn into_result(self) -> Result<Self, SimError> {
        let divergences = self.divergences();
        if divergences.is_empty() {
            Ok(self)
        } else {
            Err(SimError::NonDeterminism { divergences })
        }
    }
}

/// Runs each seed repeatedly and compares the final commit ids.
#[derive(Debug, Clone)]
pub struct DeterminismAuditor {
    /// Number of seed groups.
    pub num_seeds: usize,
    /// Runs per seed group.
    pub runs_per_seed: usize,
    /// Seeds for the groups are derived from this seed.
    pub base_seed: u64,
    /// Run seed groups on the rayon pool.
    pub parallel: bool,
    /// Keep the application's invariants (off by default: the audit only
    /// compares commit ids).
    pub check_invariants: bool,
}

impl Default for DeterminismAuditor {
    fn default() -> Self {
        Self {
            num_seeds: 3,
            runs_per_seed: 5,
            base_seed: 0,
            parallel: true,
            check_invariants: false,
        }
    }
}

impl DeterminismAuditor {
    pub fn new(num_seeds: usize, runs_per_seed: usize) -> Self {
        Self {
            num_seeds,
            runs_per_seed,
            ..Self::default()
        }
    }

    pub fn with_base_seed(mut self, seed: u64) -> Self {
        self.base_seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_invariants(mut self, check: bool) -> Self {
        self.check_invariants = check;
        self
    }

    /// The seeds this audit will use.
    pub fn seeds(&self) -> Vec<u64> {
        let mut rng = SimRng::new(self.base_seed);
        (0..self.num_seeds).map(|_| rng.next_u64()).collect()
    }

    /// Audits the application built by `make`.
    ///
    /// `make` must return a fresh application and fresh inputs on every call.
    /// Runs always start at height 1, commit every block, and check
    /// invariants once per block at most; export paths are ignored.
    pub fn audit<A, F>(&self, config: &SimConfig, make: F) -> Result<DeterminismReport, SimError>
    where
        A: Application + 'static,
        F: Fn() -> (A, SimulationInputs<A>) + Sync,
    {
        let started = Instant::now();
        let mut base = config.clone();
        base.initial_block_height = 1;
        base.on_operation = false;
        base.all_invariants = false;
        base.commit = true;
        base.export_state_path = None;
        base.export_params_path = None;
        base.validate()?;

        let seeds = self.seeds();
        info!(
            seeds = seeds.len(),
            runs_per_seed = self.runs_per_seed,
            parallel = self.parallel,
            "starting determinism audit"
        );

        let audit_one = |seed: u64| self.audit_seed(&base, seed, &make);
        let audits: Result<Vec<SeedAudit>, SimError> = if self.parallel {
            seeds.into_par_iter().map(audit_one).collect()
        } else {
            seeds.into_iter().map(audit_one).collect()
        };

        Ok(DeterminismReport {
            seeds: audits?,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    fn audit_seed<A, F>(&self, base: &SimConfig, seed: u64, make: &F) -> Result<SeedAudit, SimError>
    where
        A: Application + 'static,
        F: Fn() -> (A, SimulationInputs<A>),
    {
        let config = base.clone().with_seed(seed);
        let mut commits = Vec::with_capacity(self.runs_per_seed);
        let mut divergent_runs = Vec::new();

        for run in 0..self.runs_per_seed {
            let (mut app, mut inputs) = make();
            if !self.check_invariants {
                inputs.invariants = InvariantRegistry::new();
            }

            let result = simulate_from_seed(&mut app, inputs, &config).into_result()?;
            let commit = result.last_commit;
            let expected = commits.first().copied().unwrap_or(commit);
            if commit != expected {
                error!(
                    seed,
                    run,
                    %expected,
                    actual = %commit,
                    "non-determinism detected"
                );
                divergent_runs.push(run);
            }
            commits.push(commit);
        }

        info!(
            seed,
            runs = commits.len(),
            divergent = divergent_runs.len(),
            "seed audited"
        );
        Ok(SeedAudit {
            seed,
            commits,
            divergent_runs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersim_types::StateHash;

    fn commit(byte: u8) -> CommitId {
        CommitId::new(10, StateHash::from_bytes([byte; 32]))
    }

    fn report() -> DeterminismReport {
        DeterminismReport {
            seeds: vec![
                SeedAudit {
                    seed: 1,
                    commits: vec![commit(1), commit(1)],
                    divergent_runs: Vec::new(),
                },
                SeedAudit {
                    seed: 2,
                    commits: vec![commit(1), commit(2), commit(1), commit(3)],
                    divergent_runs: vec![1, 3],
                },
            ],
            elapsed_secs: 0.25,
        }
    }

    #[test]
    fn report_survives_a_json_round_trip() {
        let report = report();
        let json = serde_json::to_string(&report).unwrap();
        let back: DeterminismReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn every_divergent_run_is_reported() {
        let report = report();
        assert!(!report.all_deterministic());

        let divergences = report.divergences();
        assert_eq!(divergences.len(), 2);
        assert_eq!(divergences[0].run, 1);
        assert_eq!(divergences[0].actual, commit(2));
        assert_eq!(divergences[1].run, 3);
        assert_eq!(divergences[1].actual, commit(3));
        assert!(divergences.iter().all(|d| d.seed == 2 && d.expected == commit(1)));

        let err = report.into_result().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("seed 2 run 1"), "{message}");
        assert!(message.contains("seed 2 run 3"), "{message}");
    }
}
