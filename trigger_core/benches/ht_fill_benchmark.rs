//! r-φ Hough-Transform fill-path micro-benchmark.
//!
//! Measures throughput of the hot per-stub inner loop: `HtRphi::store` (the
//! cell-fan-out write) and the end-of-sector `end()` pass that filters and
//! counts layers in every touched cell.

use criterion::{criterion_group, criterion_main, Criterion};

use trigger_common::config::HtRphiConfig;
use trigger_core::ht_rphi::HtRphi;
use trigger_core::stub::{Stub, StubPhysicsContext};

fn ht_rphi_config() -> HtRphiConfig {
    HtRphiConfig {
        pt_min_gev: 3.0,
        n_bins_qoverpt: None,
        n_bins_phi_t: None,
        n_cells: Some(2048),
        merge_2x2_enabled: false,
        merge_2x2_min_inv_pt: 0.0,
        min_layers: 5,
        relaxed_layers_inv_pt_threshold: 0.0,
        bend_filter_daisy_chain: true,
        bend_filter_sigma_dphi: 0.01,
        max_stubs_per_cell: 32,
        kill_some_cells: false,
        n_busy: 144,
        busy_sector_each_charge: false,
    }
}

fn ctx() -> StubPhysicsContext {
    StubPhysicsContext {
        inv_pt_to_dphi: 0.00057,
        bend_resolution: 0.5,
        bend_resolution_extra: 0.0,
        chosen_r_of_z_filter: 50.0,
        beam_window_z: 15.0,
    }
}

fn sample_arena(n: usize) -> Vec<Stub> {
    (0..n)
        .map(|i| {
            let r = 22.0 + (i % 6) as f64 * 15.0;
            let phi = -0.05 + 0.0001 * i as f64;
            Stub::new(i as u32, phi, r, r * 0.4, 0.1, 1.0, 0, 0.01, 0.02, (i % 6 + 1) as u16, true, true)
        })
        .collect()
}

fn bench_store(c: &mut Criterion) {
    let config = ht_rphi_config();
    let ctx = ctx();
    let mut arena = sample_arena(200);
    for stub in &mut arena {
        stub.calc_q_over_pt_range(&ctx, 0.05, 32).unwrap();
    }

    c.bench_function("ht_rphi_store_200_stubs", |b| {
        b.iter(|| {
            let mut ht = HtRphi::new(&config, -1.0, 1.0, 0.0, ctx.inv_pt_to_dphi, 60.0).unwrap();
            for idx in 0..arena.len() as u32 {
                ht.store(&arena, idx, &ctx, None).unwrap();
            }
            ht
        });
    });
}

fn bench_end_pass(c: &mut Criterion) {
    let config = ht_rphi_config();
    let ctx = ctx();
    let mut arena = sample_arena(200);
    for stub in &mut arena {
        stub.calc_q_over_pt_range(&ctx, 0.05, 32).unwrap();
    }

    c.bench_function("ht_rphi_end_200_stubs", |b| {
        b.iter(|| {
            let mut ht = HtRphi::new(&config, -1.0, 1.0, 0.0, ctx.inv_pt_to_dphi, 60.0).unwrap();
            for idx in 0..arena.len() as u32 {
                ht.store(&arena, idx, &ctx, None).unwrap();
            }
            ht.end(&arena, &ctx, false).unwrap();
            ht
        });
    });
}

criterion_group!(benches, bench_store, bench_end_pass);
criterion_main!(benches);
