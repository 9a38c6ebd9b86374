//! `import-export` and `after-import`.

use anyhow::{Context, Result};
use ledgersim_app::{SimApp, simulation_inputs};
use ledgersim_sim::{PrefixPolicy, SimConfig, simulate_after_import, verify_import_export};
use serde_json::json;

use super::run::{check, print_result, simulate};
use super::{Output, result_json};
use crate::style::{self, colors::SemanticStyle};

pub fn run(config: &SimConfig, keys_only: bool, out: Output) -> Result<()> {
    let (app, result) = simulate(config)?;
    let result = check("import-export", result)?;
    if result.stopped_early() {
        if out.json {
            out.print_json(&json!({ "run": result_json(&result), "skipped": true }))?;
        } else {
            print_result("Simulation", &result);
            style::print_warn("run stopped early; nothing to export");
        }
        return Ok(());
    }

    let policy = if keys_only {
        PrefixPolicy::KeysOnly
    } else {
        PrefixPolicy::Skip
    };
    let mut fresh = SimApp::new();
    let report = verify_import_export(&result, &app, &mut fresh, policy)
        .context("export/import round failed")?;

    if out.json {
        let stores: Vec<_> = report
            .stores
            .iter()
            .map(|s| {
                json!({
                    "store": s.store,
                    "only_in_exported": s.diff.only_in_a.len(),
                    "only_in_imported": s.diff.only_in_b.len(),
                    "mismatched": s.diff.mismatched.len(),
                    "ignored": s.diff.ignored,
                    "divergent": s.diff.log().lines().collect::<Vec<_>>(),
                })
            })
            .collect();
        out.print_json(&json!({
            "run": result_json(&result),
            "height": report.height,
            "clean": report.is_clean(),
            "stores": stores,
        }))?;
    } else {
        print_result("Simulation", &result);
        println!(
            "{} at height {}",
            "Export/import".header(),
            report.height.to_string().code()
        );
        for s in &report.stores {
            if s.diff.is_empty() {
                let ignored = format!("({} ignored)", s.diff.ignored);
                println!("  {} {} {}", "✓".success(), s.store, ignored.muted());
            } else {
                println!(
                    "  {} {}: {} only exported, {} only imported, {} mismatched",
                    "✗".error(),
                    s.store,
                    s.diff.only_in_a.len(),
                    s.diff.only_in_b.len(),
                    s.diff.mismatched.len()
                );
                // A: exported side, B: imported side.
                for line in s.diff.log().lines() {
                    println!("      {}", line.muted());
                }
            }
        }
    }

    report
        .into_result()
        .context("imported state differs from the exported state")?;
    if !out.json {
        style::print_success("imported state matches the exported state");
    }
    Ok(())
}

pub fn after_import(config: &SimConfig, out: Output) -> Result<()> {
    let (app, first) = simulate(config)?;
    let first = check("after-import", first)?;
    if first.stopped_early() {
        if out.json {
            out.print_json(&json!({ "run": result_json(&first), "skipped": true }))?;
        } else {
            print_result("Simulation", &first);
            style::print_warn("run stopped early; nothing to import");
        }
        return Ok(());
    }

    let (_fresh, second) =
        simulate_after_import(&first, &app, SimApp::new(), simulation_inputs(), config)
            .context("export/import for a new chain failed")?;

    if out.json {
        out.print_json(&json!({
            "run": result_json(&first),
            "after_import": result_json(&second),
        }))?;
    } else {
        print_result("Simulation", &first);
        print_result("Simulation after import", &second);
    }

    check("after-import", second)?;
    if !out.json {
        style::print_success("simulation after import held every invariant");
    }
    Ok(())
}
