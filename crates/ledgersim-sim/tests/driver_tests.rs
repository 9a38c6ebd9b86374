//! End-to-end driver behavior against the in-test ledger.

mod support;

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use ledgersim_sim::{
    DeterminismAuditor, GenesisSource, ImportExportReport, OperationSet, PrefixPolicy, SimConfig,
    SimError, SimulationInputs, StopReason, compare_app_stores, simulate_after_import,
    simulate_from_seed, verify_import_export, write_run_artifacts,
};
use support::*;

fn small_config(seed: u64) -> SimConfig {
    SimConfig::default()
        .with_seed(seed)
        .with_num_blocks(30)
        .with_ops_per_block(1, 8)
        .with_num_accounts(10)
}

// ============================================================================
// Reproducibility
// ============================================================================

#[test]
fn same_seed_same_commit_and_stats() {
    let config = small_config(7);

    let mut a = TestApp::new();
    let ra = simulate_from_seed(&mut a, inputs(standard_operations()), &config);
    let mut b = TestApp::new();
    let rb = simulate_from_seed(&mut b, inputs(standard_operations()), &config);

    assert!(ra.is_ok(), "{:?}", ra.error);
    assert_eq!(ra.stop_reason, StopReason::Completed);
    assert_eq!(ra.last_commit, rb.last_commit);
    assert_eq!(ra.stats, rb.stats);
    assert_eq!(ra.params, rb.params);
    assert_eq!(ra.blocks_executed, 30);
    assert_eq!(ra.last_commit.version, 30);
}

#[test]
fn different_seeds_different_commits() {
    let mut a = TestApp::new();
    let ra = simulate_from_seed(&mut a, inputs(standard_operations()), &small_config(1));
    let mut b = TestApp::new();
    let rb = simulate_from_seed(&mut b, inputs(standard_operations()), &small_config(2));
    assert_ne!(ra.last_commit, rb.last_commit);
}

#[test]
fn without_commit_the_genesis_commit_remains() {
    let mut app = TestApp::new();
    let result = simulate_from_seed(
        &mut app,
        inputs(standard_operations()),
        &small_config(3).with_commit(false),
    );
    assert!(result.is_ok());
    assert_eq!(result.last_commit.version, 0);
}

// ============================================================================
// Operations
// ============================================================================

#[test]
fn skips_are_counted_and_do_not_stop_the_run() {
    let ops = OperationSet::new().with("op_weight_skip", 1, always_skip_op());
    let mut app = TestApp::new();
    let config = small_config(4).with_ops_per_block(2, 2);
    let result = simulate_from_seed(&mut app, inputs(ops), &config);

    assert!(result.is_ok());
    assert_eq!(result.stop_reason, StopReason::Completed);
    let skips = result.stats.get("test/skip").unwrap();
    assert_eq!(skips.skipped, 60);
    assert_eq!(skips.ok, 0);
}

#[test]
fn follow_ups_run_at_their_scheduled_height() {
    let ops = OperationSet::new().with("op_weight_propose", 1, propose_op());
    let mut app = TestApp::new();
    let config = small_config(5).with_ops_per_block(1, 1).with_num_blocks(10);
    let result = simulate_from_seed(&mut app, inputs(ops), &config);

    assert!(result.is_ok());
    // One proposal per block; votes for the last two are still pending.
    assert_eq!(app.vote_log.len(), 8);
    for (proposed, voted) in &app.vote_log {
        assert_eq!(*voted, proposed + 2);
    }
    assert_eq!(result.pending_future_operations, 2);
    assert_eq!(result.future_operations_executed, 8);
    assert_eq!(result.stats.get("gov/propose").unwrap().scheduled, 10);
}

#[test]
fn follow_up_for_the_current_height_runs_in_the_next_block() {
    let ops = OperationSet::new().with("op_weight_propose", 1, same_height_propose_op());
    let mut app = TestApp::new();
    let config = small_config(5).with_ops_per_block(1, 1).with_num_blocks(10);
    let result = simulate_from_seed(&mut app, inputs(ops), &config);

    assert!(result.is_ok(), "{:?}", result.error);
    assert_eq!(app.vote_log.len(), 9);
    for (proposed, voted) in &app.vote_log {
        assert_eq!(*voted, proposed + 1);
    }
    assert_eq!(result.pending_future_operations, 1);
    assert_eq!(result.future_operations_executed, 9);
}

#[test]
fn fatal_operation_stops_the_run() {
    let ops = OperationSet::new().with("op_weight_fatal", 1, fatal_op());
    let mut app = TestApp::new();
    let result = simulate_from_seed(&mut app, inputs(ops), &small_config(6));

    assert_eq!(result.stop_reason, StopReason::FatalError);
    assert!(matches!(
        result.error,
        Some(SimError::Operation { ref route, height: 1, .. }) if route == "bug/fatal"
    ));
}

#[test]
fn zero_total_weight_is_fatal() {
    let ops = OperationSet::new()
        .with("op_weight_transfer", 0, transfer_op())
        .with("op_weight_propose", 0, propose_op());
    let mut app = TestApp::new();
    let result = simulate_from_seed(&mut app, inputs(ops), &small_config(8));

    assert_eq!(result.stop_reason, StopReason::FatalError);
    assert!(matches!(result.error, Some(SimError::ZeroTotalWeight)));
    assert_eq!(result.blocks_executed, 0);
}

#[test]
fn unreadable_accounts_on_existing_state_are_fatal() {
    let mut app = TestApp::new();
    let first = simulate_from_seed(&mut app, inputs(standard_operations()), &small_config(18));
    assert!(first.is_ok());
    let victim = *app.balances().keys().next().unwrap();
    app.corrupt_balance(&victim);

    let existing = SimulationInputs {
        genesis: GenesisSource::Existing,
        operations: standard_operations(),
        invariants: supply_invariant(),
    };
    let result = simulate_from_seed(&mut app, existing, &small_config(18));

    assert_eq!(result.stop_reason, StopReason::FatalError);
    assert!(matches!(
        result.error,
        Some(SimError::Application { context: "account_addresses", .. })
    ));
    assert_eq!(result.blocks_executed, 0);
}

#[test]
fn invalid_config_is_rejected_before_any_block() {
    let mut app = TestApp::new();
    let config = small_config(9).with_ops_per_block(5, 1);
    let result = simulate_from_seed(&mut app, inputs(standard_operations()), &config);
    assert!(matches!(result.error, Some(SimError::InvalidConfig(_))));
    assert_eq!(result.operations_executed, 0);
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn broken_invariant_reports_module_route_and_height() {
    let ops = OperationSet::new().with("op_weight_mint", 1, mint_bug_op());
    let mut app = TestApp::new();
    let config = small_config(10).with_ops_per_block(1, 1);
    let result = simulate_from_seed(&mut app, inputs(ops), &config);

    assert_eq!(result.stop_reason, StopReason::InvariantViolation);
    match result.error {
        Some(SimError::InvariantViolation {
            module,
            route,
            height,
            message,
        }) => {
            assert_eq!(module, "bank");
            assert_eq!(route, "total-supply");
            assert_eq!(height, 1);
            assert!(message.contains("supply"));
        }
        other => panic!("expected invariant violation, got {other:?}"),
    }
    // Block-level check: the violating block never commits.
    assert_eq!(result.blocks_executed, 0);
}

#[test]
fn per_operation_checks_stop_at_the_first_bad_operation() {
    let ops = OperationSet::new().with("op_weight_mint", 1, mint_bug_op());
    let mut app = TestApp::new();
    let config = small_config(11)
        .with_ops_per_block(5, 5)
        .with_on_operation(true);
    let result = simulate_from_seed(&mut app, inputs(ops), &config);

    assert_eq!(result.stop_reason, StopReason::InvariantViolation);
    assert_eq!(result.operations_executed, 1);
}

#[test]
fn periodic_schedule_delays_detection() {
    let ops = OperationSet::new().with("op_weight_mint", 1, mint_bug_op());
    let mut app = TestApp::new();
    let config = small_config(12)
        .with_ops_per_block(1, 1)
        .with_invariant_period(4);
    let result = simulate_from_seed(&mut app, inputs(ops), &config);

    assert!(matches!(result.error, Some(SimError::InvariantViolation { height: 4, .. })));
    assert_eq!(result.blocks_executed, 3);
}

// ============================================================================
// Early stop and export/import
// ============================================================================

#[test]
fn exhausting_validators_stops_early_and_refuses_export() {
    let ops = OperationSet::new().with("op_weight_retire", 1, retire_op());
    let mut app = TestApp::new();
    let config = small_config(13).with_ops_per_block(1, 1);
    let result = simulate_from_seed(&mut app, inputs(ops), &config);

    assert!(result.is_ok());
    assert!(result.stopped_early());
    assert!(result.blocks_executed < 30);

    let mut fresh = TestApp::new();
    let verified = verify_import_export(&result, &app, &mut fresh, PrefixPolicy::Skip);
    assert!(matches!(verified, Err(SimError::StoppedEarly)));

    let after = simulate_after_import(
        &result,
        &app,
        TestApp::new(),
        inputs(standard_operations()),
        &small_config(13),
    );
    assert!(matches!(after, Err(SimError::StoppedEarly)));
}

#[test]
fn export_import_round_trip_is_clean_outside_ignored_prefixes() {
    let mut app = TestApp::new();
    let result = simulate_from_seed(&mut app, inputs(standard_operations()), &small_config(14));
    assert!(result.is_ok());

    let mut fresh = TestApp::new();
    let report = verify_import_export(&result, &app, &mut fresh, PrefixPolicy::Skip).unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.height, 30);
    let queue = report.stores.iter().find(|s| s.store == QUEUE).unwrap();
    assert!(queue.diff.ignored > 0);
}

#[test]
fn store_mismatch_lists_every_divergent_entry() {
    let mut app = TestApp::new();
    let result = simulate_from_seed(&mut app, inputs(standard_operations()), &small_config(19));
    assert!(result.is_ok());

    let mut fresh = TestApp::new();
    verify_import_export(&result, &app, &mut fresh, PrefixPolicy::Skip).unwrap();
    let mut holders = app
        .balances()
        .into_iter()
        .filter(|(_, balance)| *balance > 0);
    let (from, _) = holders.next().unwrap();
    let (to, _) = holders.next().unwrap();
    fresh.transfer(&from, &to, 1).unwrap();

    let report = ImportExportReport {
        height: result.last_height.as_u64(),
        stores: compare_app_stores(&app, &fresh, PrefixPolicy::Skip).unwrap(),
    };
    assert_eq!(report.mismatched_keys(), 2);
    match report.into_result() {
        Err(SimError::StoreMismatch { stores, log }) => {
            assert_eq!(stores, vec![BANK.to_string()]);
            assert_eq!(log.lines().filter(|l| l.starts_with("A ")).count(), 2);
            assert_eq!(log.lines().filter(|l| l.starts_with("B ")).count(), 2);
            assert!(log.starts_with("store bank: 2 divergent keys"));
        }
        other => panic!("expected a store mismatch, got {other:?}"),
    }
}

#[test]
fn simulation_continues_after_import() {
    let config = small_config(15);
    let mut app = TestApp::new();
    let first = simulate_from_seed(&mut app, inputs(standard_operations()), &config);
    assert!(first.is_ok());

    let (imported, second) = simulate_after_import(
        &first,
        &app,
        TestApp::new(),
        inputs(standard_operations()),
        &config,
    )
    .unwrap();
    assert!(second.is_ok(), "{:?}", second.error);
    assert_eq!(second.blocks_executed, 30);
    assert_eq!(second.last_commit.version, 60);
    assert_eq!(imported.supply(), app.supply());
}

#[test]
fn artifacts_are_written_and_params_replay() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let params_path = dir.path().join("params.json");
    let config = small_config(16)
        .with_export_state_path(&state_path)
        .with_export_params_path(&params_path);

    let mut app = TestApp::new();
    let result = simulate_from_seed(&mut app, inputs(standard_operations()), &config);
    write_run_artifacts(&app, &result, &config).unwrap();
    assert!(state_path.exists());
    assert!(result.params.get("op_weight_transfer").is_some());
    assert!(result.params.get("initial_validators").is_some());

    let snapshot = ledgersim_sim::Snapshot::read_from(&state_path).unwrap();
    assert_eq!(snapshot.app_name, "testapp");
    assert_eq!(snapshot.height, 30);

    assert_eq!(result.params.seed(), Some(16));

    // The recorded seed and values are taken from the file instead of the
    // configured seed and fresh draws.
    let replay = small_config(99).with_params_file(&params_path);
    let mut again = TestApp::new();
    let replayed = simulate_from_seed(&mut again, inputs(standard_operations()), &replay);
    assert!(replayed.is_ok(), "{:?}", replayed.error);
    assert_eq!(replayed.seed, 16);
    assert_eq!(replayed.params, result.params);
    assert_eq!(again.validators(), app.validators());
    // Accounts are drawn from the recorded seed before any parameter.
    assert!(again.balances().keys().eq(app.balances().keys()));
}

#[test]
fn malformed_params_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params.json");
    std::fs::write(&path, r#"{"initial_validators": "many"}"#).unwrap();

    let mut app = TestApp::new();
    let result = simulate_from_seed(
        &mut app,
        inputs(standard_operations()),
        &small_config(17).with_params_file(&path),
    );
    assert_eq!(result.stop_reason, StopReason::FatalError);
    assert!(matches!(
        result.error,
        Some(SimError::MalformedOverride { ref name, .. }) if name == "initial_validators"
    ));
}

// ============================================================================
// Determinism audit
// ============================================================================

#[test]
fn auditor_accepts_a_deterministic_app() {
    let report = DeterminismAuditor::new(3, 3)
        .with_base_seed(77)
        .audit(&small_config(0), || {
            (TestApp::new(), inputs(standard_operations()))
        })
        .unwrap();
    assert_eq!(report.seeds.len(), 3);
    assert!(report.all_deterministic());
    assert!(report.into_result().is_ok());
}

#[test]
fn auditor_flags_state_leaking_between_runs() {
    let counter = Arc::new(AtomicU64::new(0));
    let report = DeterminismAuditor::new(2, 3)
        .with_parallel(false)
        .audit(&small_config(0), || {
            (TestApp::leaky(Arc::clone(&counter)), inputs(standard_operations()))
        })
        .unwrap();

    assert!(!report.all_deterministic());
    assert_eq!(report.seeds[0].divergent_runs, vec![1, 2]);
    assert_eq!(report.seeds[1].divergent_runs, vec![1, 2]);
    match report.into_result() {
        Err(SimError::NonDeterminism { divergences }) => {
            assert_eq!(divergences.len(), 4);
            assert!(divergences.iter().all(|d| d.run >= 1 && d.expected != d.actual));
        }
        other => panic!("expected non-determinism, got {other:?}"),
    }
}
