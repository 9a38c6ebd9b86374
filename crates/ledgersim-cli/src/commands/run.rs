//! `run` and `invariants`.

use anyhow::{Context, Result, bail};
use ledgersim_app::{SimApp, invariants, simulation_inputs};
use ledgersim_sim::{
    SimConfig, SimulationResult, StopReason, simulate_from_seed, write_run_artifacts,
};
use serde_json::json;

use super::{Output, result_json};
use crate::style::{self, colors::SemanticStyle};

/// Runs one simulation and writes any requested artifacts.
pub(crate) fn simulate(config: &SimConfig) -> Result<(SimApp, SimulationResult)> {
    let mut app = SimApp::new();
    let result = simulate_from_seed(&mut app, simulation_inputs(), config);
    write_run_artifacts(&app, &result, config).context("failed to write run artifacts")?;
    Ok((app, result))
}

/// Prints a run summary and its per-route statistics.
pub(crate) fn print_result(title: &str, result: &SimulationResult) {
    println!("{}", title.header());
    let status = match result.stop_reason {
        StopReason::Completed => "completed".success(),
        StopReason::EarlyStop => "stopped early (no bonded validators)".warning(),
        StopReason::InvariantViolation => "invariant broken".error(),
        StopReason::FatalError => "failed".error(),
    };
    println!(
        "{}",
        style::info_table(&[
            ("seed", result.seed.to_string().code()),
            ("status", status),
            ("blocks", result.blocks_executed.to_string()),
            ("last height", result.last_height.to_string()),
            (
                "operations",
                format!(
                    "{} ({} follow-ups, {} pending)",
                    result.operations_executed,
                    result.future_operations_executed,
                    result.pending_future_operations
                ),
            ),
            ("last commit", result.last_commit.to_string()),
            ("time", format!("{:.2}s", result.elapsed.as_secs_f64())),
        ])
    );
    if result.stats.total() > 0 {
        println!("{}", style::stats_table(&result.stats));
    }
}

/// Fails with the run's error, pointing at the seed that reproduces it.
pub(crate) fn check(command: &str, result: SimulationResult) -> Result<SimulationResult> {
    let seed = result.seed;
    result.into_result().map_err(|err| {
        style::print_failure(&err.to_string());
        style::print_reproduce(command, seed);
        anyhow::Error::new(err).context(format!("simulation failed for seed {seed}"))
    })
}

pub fn run(config: &SimConfig, out: Output) -> Result<()> {
    let (_app, result) = simulate(config)?;
    if out.json {
        out.print_json(&result_json(&result))?;
    } else {
        print_result("Simulation", &result);
    }
    check("run", result)?;
    if !out.json {
        style::print_success("all invariants held");
    }
    Ok(())
}

pub fn invariants(config: &SimConfig, out: Output) -> Result<()> {
    let (app, result) = simulate(config)?;
    let result = check("invariants", result)?;

    let timings = invariants::registry().benchmark(&app);
    let broken: Vec<_> = timings.iter().filter(|t| t.broken).collect();

    if out.json {
        let entries: Vec<_> = timings
            .iter()
            .map(|t| {
                json!({
                    "route": t.route,
                    "elapsed_us": t.elapsed.as_micros() as u64,
                    "broken": t.broken,
                    "message": t.message,
                })
            })
            .collect();
        out.print_json(&json!({
            "run": result_json(&result),
            "invariants": entries,
        }))?;
    } else {
        println!(
            "{} at height {}",
            "Invariants".header(),
            result.last_height.to_string().code()
        );
        println!("{}", style::timing_table(&timings));
    }

    if let Some(first) = broken.first() {
        bail!("{} invariant(s) broken; first {}: {}", broken.len(), first.route, first.message);
    }
    Ok(())
}
