//! Combinatorial Kalman fit micro-benchmark.
//!
//! Measures `kalman::fit` over a 6-layer candidate with an extra ambiguous
//! stub on one layer, so the predecessor tree actually branches once before
//! converging on the best chain.

use criterion::{criterion_group, criterion_main, Criterion};

use trigger_common::config::{KalmanConfig, MagneticField, SectorsConfig};
use trigger_core::kalman;
use trigger_core::sector::Sector;
use trigger_core::stub::{Stub, StubIndex, StubPhysicsContext};
use trigger_core::track::L1Track3D;

fn ctx() -> StubPhysicsContext {
    StubPhysicsContext {
        inv_pt_to_dphi: 0.00057,
        bend_resolution: 0.5,
        bend_resolution_extra: 0.0,
        chosen_r_of_z_filter: 50.0,
        beam_window_z: 15.0,
    }
}

fn magnetic_field() -> MagneticField {
    MagneticField {
        tesla: 3.8,
        inv_pt_to_dphi: 0.00057,
        inv_pt_to_r: 0.00114,
    }
}

fn sectors_config() -> SectorsConfig {
    SectorsConfig {
        n_phi: 9,
        eta_region_edges: vec![-2.4, -1.0, 0.0, 1.0, 2.4],
        r_ref_phi_cm: 60.0,
        r_ref_z_cm: 50.0,
        beam_half_length_cm: 15.0,
        n_subsec_eta: 1,
        handle_strips_eta: false,
        use_stub_phi: true,
        use_stub_phi_trk: true,
        assumed_phi_trk_res: 0.02,
        calc_phi_trk_res: false,
    }
}

fn kalman_config() -> KalmanConfig {
    KalmanConfig {
        debug: false,
        multi_scatter_factor: 1e-8,
        validation_gate_cut: 50.0,
        select_most_num_stub_state: true,
        max_num_next_stubs: 4,
        max_num_virtual_stubs: 2,
        max_num_states_cut: 64,
        reduced_chi_sq_cut: 10.0,
    }
}

fn sample_arena() -> Vec<Stub> {
    let radii = [22.0, 35.0, 50.0, 70.0, 90.0, 110.0];
    let mut arena: Vec<Stub> = radii
        .iter()
        .enumerate()
        .map(|(i, &r)| Stub::new(i as u32, 0.1, r, r * 0.5, 0.0, 1.0, 0, 0.01, 0.02, (i + 1) as u16, true, true))
        .collect();
    arena.push(Stub::new(6, 0.1, 70.0, 70.0 * 0.5 + 2.0, 0.0, 1.0, 0, 0.01, 0.02, 4, true, true));
    arena
}

fn bench_fit(c: &mut Criterion) {
    let arena = sample_arena();
    let stubs: Vec<StubIndex> = (0..arena.len() as u32).collect();
    let candidate = L1Track3D::new(stubs, (16, 32), (0.0, 0.1), (0, 0), (0.0, 0.5), 4, 2);
    let sector = Sector::new(&sectors_config(), 4, 2, 3.0, true, true, 0.02, false);
    let ctx = ctx();
    let field = magnetic_field();
    let config = kalman_config();

    c.bench_function("kalman_fit_6_layer_candidate", |b| {
        b.iter(|| kalman::fit(&candidate, &arena, &ctx, &sector, &field, &config, 5, 4));
    });
}

criterion_group!(benches, bench_fit);
criterion_main!(benches);
