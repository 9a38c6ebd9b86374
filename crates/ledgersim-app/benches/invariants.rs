//! Invariant evaluation cost on a ledger state produced by a short run.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ledgersim_app::{SimApp, invariants, simulation_inputs};
use ledgersim_sim::{SimConfig, simulate_from_seed};

fn simulated_app(num_blocks: u64) -> SimApp {
    let config = SimConfig::default()
        .with_seed(1)
        .with_num_blocks(num_blocks)
        .with_ops_per_block(10, 30)
        .with_num_accounts(40);
    let mut app = SimApp::new();
    let result = simulate_from_seed(&mut app, simulation_inputs(), &config);
    assert!(result.is_ok(), "{:?}", result.error);
    app
}

// ============================================================================
// Individual invariants
// ============================================================================

fn bench_each_invariant(c: &mut Criterion) {
    let app = simulated_app(50);
    let mut group = c.benchmark_group("invariant");

    for (module, route, check) in invariants::ALL {
        group.bench_function(BenchmarkId::from_parameter(format!("{module}/{route}")), |b| {
            b.iter(|| black_box(check(black_box(app.stores()))));
        });
    }

    group.finish();
}

// ============================================================================
// Whole registry, by state size
// ============================================================================

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("all_invariants");
    let registry = invariants::registry();

    for num_blocks in [10, 100] {
        let app = simulated_app(num_blocks);
        group.bench_with_input(BenchmarkId::from_parameter(num_blocks), &app, |b, app| {
            b.iter(|| black_box(registry.assert_all(black_box(app))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_each_invariant, bench_registry);
criterion_main!(benches);
