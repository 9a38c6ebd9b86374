//! `determinism`: repeated runs per seed, compared by commit id.

use anyhow::{Context, Result};
use ledgersim_app::{SimApp, simulation_inputs};
use ledgersim_sim::{DeterminismAuditor, SimConfig};
use serde_json::json;

use super::Output;
use crate::style::{self, colors::SemanticStyle};

#[derive(Debug, Clone, Copy)]
pub struct AuditArgs {
    pub seeds: usize,
    pub runs: usize,
    pub base_seed: u64,
    pub parallel: bool,
    pub check_invariants: bool,
}

pub fn run(config: &SimConfig, args: &AuditArgs, out: Output) -> Result<()> {
    let auditor = DeterminismAuditor::new(args.seeds, args.runs)
        .with_base_seed(args.base_seed)
        .with_parallel(args.parallel)
        .with_invariants(args.check_invariants);

    if !out.json {
        println!(
            "Auditing {} seed(s) x {} run(s) of {} blocks (base seed {})...",
            args.seeds.to_string().header(),
            args.runs.to_string().header(),
            config.num_blocks,
            args.base_seed.to_string().code()
        );
    }

    let report = auditor
        .audit(config, || (SimApp::new(), simulation_inputs()))
        .context("determinism audit aborted")?;

    if out.json {
        let seeds: Vec<_> = report
            .seeds
            .iter()
            .map(|s| {
                json!({
                    "seed": s.seed,
                    "deterministic": s.is_deterministic(),
                    "divergent_runs": s.divergent_runs,
                    "commits": s.commits.iter().map(ToString::to_string).collect::<Vec<_>>(),
                })
            })
            .collect();
        out.print_json(&json!({
            "deterministic": report.all_deterministic(),
            "elapsed_secs": report.elapsed_secs,
            "seeds": seeds,
        }))?;
    } else {
        for s in &report.seeds {
            match (s.is_deterministic(), s.commits.first()) {
                (true, Some(commit)) => {
                    println!(
                        "  {} seed {} {}",
                        "✓".success(),
                        s.seed.to_string().code(),
                        commit.to_string().muted()
                    );
                }
                (true, None) => println!("  {} seed {}", "✓".success(), s.seed.to_string().code()),
                (false, _) => {
                    println!(
                        "  {} seed {} diverged in {} of {} runs",
                        "✗".error(),
                        s.seed.to_string().code(),
                        s.divergent_runs.len(),
                        s.commits.len()
                    );
                    for divergence in s.divergences() {
                        println!("      {}", divergence.to_string().muted());
                    }
                }
            }
        }
        println!("  Time: {:.2}s", report.elapsed_secs);
    }

    report
        .into_result()
        .context("non-deterministic simulation")?;
    if !out.json {
        style::print_success("every run of every seed reached the same commit");
    }
    Ok(())
}
