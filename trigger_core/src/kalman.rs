//! Combinatorial Kalman-filter track fitter.
//!
//! States form a predecessor tree, arena-owned and cleared per `fit()` call
//! rather than reference counted, consistent with the rest of this crate's
//! index-based ownership (arena-owned, non-owning handles downstream).
//! Barrel and endcap stubs are both addressed through `r()`/`z()` directly,
//! the same simplification the rest of this crate's fitters make
//! (`fit_linear`, `fit_linearised_chisq`, `track::phi_at_r`/`z_at_r`).

use crate::sector::Sector;
use crate::stub::{Stub, StubIndex, StubPhysicsContext};
use crate::track::{L1FittedTrack, L1Track3D};
use std::collections::BTreeMap;
use trigger_common::config::{KalmanConfig, MagneticField};
use trigger_common::consts::KALMAN_GOOD_STATE_Z0_CM;

const DIM: usize = 5;

/// Per-η-region multiple-scattering weight. Index clamps to the last entry
/// for regions beyond the table (forward-most regions see the most material).
const MATERIAL_INNER: [f64; 4] = [1.0, 1.2, 1.6, 2.2];
const MATERIAL_OUTER: [f64; 4] = [1.0, 1.1, 1.3, 1.7];

fn material_weight(table: &[f64; 4], i_eta_reg: u32) -> f64 {
    table[(i_eta_reg as usize).min(table.len() - 1)]
}

/// One node in the predecessor tree. `parent` is `None` only for the seed.
struct KalmanState {
    parent: Option<usize>,
    layer: u16,
    x: [f64; DIM],
    p: [[f64; DIM]; DIM],
    stub: Option<StubIndex>,
    chi_sq: f64,
    n_virtual: u8,
}

struct Arena {
    states: Vec<KalmanState>,
}

impl Arena {
    fn push(&mut self, s: KalmanState) -> usize {
        self.states.push(s);
        self.states.len() - 1
    }

    /// Walk to the root, counting distinct stub layers and total stubs.
    fn chain_stats(&self, mut idx: usize) -> (u8, usize, Vec<StubIndex>) {
        let mut layers = std::collections::HashSet::new();
        let mut stubs = Vec::new();
        loop {
            let s = &self.states[idx];
            if let Some(stub) = s.stub {
                layers.insert(s.layer);
                stubs.push(stub);
            }
            match s.parent {
                Some(p) => idx = p,
                None => break,
            }
        }
        stubs.reverse();
        (layers.len() as u8, stubs.len(), stubs)
    }
}

fn invert_2x2(m: [[f64; 2]; 2]) -> Option<[[f64; 2]; 2]> {
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    if det.abs() < 1e-15 {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [m[1][1] * inv_det, -m[0][1] * inv_det],
        [-m[1][0] * inv_det, m[0][0] * inv_det],
    ])
}

/// Measurement Jacobian H (2×DIM) for a stub at radius `r`: row 0 is φ, row 1
/// is z. `n_par` gates whether the d0 column is populated.
fn jacobian(r: f64, dphi_dinv2r: f64, n_par: u8) -> [[f64; DIM]; 2] {
    let mut h = [[0.0; DIM]; 2];
    h[0][0] = dphi_dinv2r;
    h[0][1] = 1.0;
    if n_par >= 5 {
        h[0][4] = 1.0 / r;
    }
    h[1][2] = 1.0;
    h[1][3] = r;
    h
}

fn predict_measurement(x: &[f64; DIM], r: f64, dphi_dinv2r_at_r: f64, n_par: u8) -> (f64, f64) {
    let phi = x[1] + dphi_dinv2r_at_r * x[0] + if n_par >= 5 { x[4] / r } else { 0.0 };
    let z = x[2] + x[3] * r;
    (phi, z)
}

fn wrap_phi(mut d: f64) -> f64 {
    while d > std::f64::consts::PI {
        d -= 2.0 * std::f64::consts::PI;
    }
    while d < -std::f64::consts::PI {
        d += 2.0 * std::f64::consts::PI;
    }
    d
}

/// Apply the innovation covariance gate and, if it passes, return the
/// updated (x, P, chi2 contribution).
#[allow(clippy::too_many_arguments)]
fn try_update(
    x: &[f64; DIM],
    p: &[[f64; DIM]; DIM],
    h: &[[f64; DIM]; 2],
    delta: [f64; 2],
    r_meas: [[f64; 2]; 2],
    gate_cut: f64,
) -> Option<([f64; DIM], [[f64; DIM]; DIM], f64)> {
    // S = H P H^T + R
    let mut hp = [[0.0; DIM]; 2];
    for i in 0..2 {
        for k in 0..DIM {
            let mut acc = 0.0;
            for j in 0..DIM {
                acc += h[i][j] * p[j][k];
            }
            hp[i][k] = acc;
        }
    }
    let mut s = r_meas;
    for i in 0..2 {
        for j in 0..2 {
            let mut acc = 0.0;
            for k in 0..DIM {
                acc += hp[i][k] * h[j][k];
            }
            s[i][j] += acc;
        }
    }
    let s_inv = invert_2x2(s)?;

    let chi2_gate = delta[0] * (s_inv[0][0] * delta[0] + s_inv[0][1] * delta[1])
        + delta[1] * (s_inv[1][0] * delta[0] + s_inv[1][1] * delta[1]);
    if chi2_gate / 2.0 >= gate_cut {
        return None;
    }

    // K = P H^T S^-1  (DIM x 2)
    let mut pht = [[0.0; 2]; DIM];
    for i in 0..DIM {
        for j in 0..2 {
            let mut acc = 0.0;
            for k in 0..DIM {
                acc += p[i][k] * h[j][k];
            }
            pht[i][j] = acc;
        }
    }
    let mut k = [[0.0; 2]; DIM];
    for i in 0..DIM {
        for j in 0..2 {
            k[i][j] = pht[i][0] * s_inv[0][j] + pht[i][1] * s_inv[1][j];
        }
    }

    let mut x_new = *x;
    for i in 0..DIM {
        x_new[i] += k[i][0] * delta[0] + k[i][1] * delta[1];
    }

    // P_new = (I - K H) P
    let mut kh = [[0.0; DIM]; DIM];
    for i in 0..DIM {
        for j in 0..DIM {
            kh[i][j] = k[i][0] * h[0][j] + k[i][1] * h[1][j];
        }
    }
    let mut p_new = [[0.0; DIM]; DIM];
    for i in 0..DIM {
        for j in 0..DIM {
            let mut acc = p[i][j];
            for l in 0..DIM {
                acc -= kh[i][l] * p[l][j];
            }
            p_new[i][j] = acc;
        }
    }

    Some((x_new, p_new, chi2_gate))
}

fn add_process_noise(p: &mut [[f64; DIM]; DIM], ms_variance: f64) {
    p[1][1] += ms_variance;
    p[3][3] += ms_variance;
    p[4][4] += ms_variance;
}

/// Run the combinatorial Kalman fit on one HT candidate. `n_par` is 4 or 5.
#[allow(clippy::too_many_arguments)]
pub fn fit(
    candidate: &L1Track3D,
    arena_stubs: &[Stub],
    ctx: &StubPhysicsContext,
    sector: &Sector,
    magnetic_field: &MagneticField,
    config: &KalmanConfig,
    min_layers: u8,
    n_par: u8,
) -> L1FittedTrack {
    let dphi_dinv2r = -2.0 * magnetic_field.inv_pt_to_dphi / magnetic_field.inv_pt_to_r.max(1e-12);

    let inv_2r = 0.5 * magnetic_field.inv_pt_to_r * candidate.q_over_pt();
    let phi0_rel = wrap_phi(candidate.phi0() - sector.phi_centre());
    let mut seed_x = [inv_2r, phi0_rel, candidate.z0(), candidate.tan_lambda(), 0.0];

    if n_par >= 5 {
        if let Some(&first_idx) = candidate.stubs().first() {
            let stub = &arena_stubs[first_idx as usize];
            let (pred_phi, _) = predict_measurement(&seed_x, stub.r(), dphi_dinv2r * stub.r(), 4);
            let residual = wrap_phi((stub.phi() - sector.phi_centre()) - pred_phi);
            seed_x[4] = residual * stub.r();
        }
    }

    let seed_p = {
        let mut p = [[0.0; DIM]; DIM];
        p[0][0] = 1e-9;
        p[1][1] = 1e-5;
        p[2][2] = 10.0;
        p[3][3] = 1e-2;
        p[4][4] = 1.0;
        p
    };

    let mut arena = Arena { states: Vec::new() };
    let seed_idx = arena.push(KalmanState {
        parent: None,
        layer: 0,
        x: seed_x,
        p: seed_p,
        stub: None,
        chi_sq: 0.0,
        n_virtual: 0,
    });

    let mut by_layer: BTreeMap<u16, Vec<StubIndex>> = BTreeMap::new();
    for &idx in candidate.stubs() {
        by_layer.entry(arena_stubs[idx as usize].layer_id()).or_default().push(idx);
    }

    let material = if sector.i_eta_reg() <= 1 { &MATERIAL_INNER } else { &MATERIAL_OUTER };
    let ms_variance = config.multi_scatter_factor * material_weight(material, sector.i_eta_reg());

    let mut active = vec![seed_idx];

    for (&layer_id, stub_ids) in &by_layer {
        let mut next_active = Vec::new();

        for &state_idx in &active {
            let state = &arena.states[state_idx];
            if state.n_virtual >= config.max_num_virtual_stubs {
                next_active.push(state_idx);
                continue;
            }

            let mut candidates_this_layer = 0usize;
            for &stub_idx in stub_ids {
                if candidates_this_layer >= config.max_num_next_stubs {
                    break;
                }
                let stub = &arena_stubs[stub_idx as usize];
                let r = stub.r();
                let h = jacobian(r, dphi_dinv2r * r, n_par);
                let mut p_pred = state.p;
                add_process_noise(&mut p_pred, ms_variance);

                let (pred_phi, pred_z) = predict_measurement(&state.x, r, dphi_dinv2r * r, n_par);
                let delta = [
                    wrap_phi((stub.phi() - sector.phi_centre()) - pred_phi),
                    stub.z() - pred_z,
                ];
                let r_meas = [
                    [stub.dphi_res(ctx).powi(2), 0.0],
                    [0.0, stub.z_err().max(1e-6).powi(2)],
                ];

                if let Some((x_new, p_new, chi2)) = try_update(&state.x, &p_pred, &h, delta, r_meas, config.validation_gate_cut) {
                    let new_idx = arena.push(KalmanState {
                        parent: Some(state_idx),
                        layer: layer_id,
                        x: x_new,
                        p: p_new,
                        stub: Some(stub_idx),
                        chi_sq: state.chi_sq + chi2,
                        n_virtual: state.n_virtual,
                    });
                    next_active.push(new_idx);
                    candidates_this_layer += 1;
                }
            }

            let mut p_virtual = state.p;
            add_process_noise(&mut p_virtual, ms_variance);
            let virtual_idx = arena.push(KalmanState {
                parent: Some(state_idx),
                layer: layer_id,
                x: state.x,
                p: p_virtual,
                stub: None,
                chi_sq: state.chi_sq,
                n_virtual: state.n_virtual + 1,
            });
            next_active.push(virtual_idx);
        }

        if next_active.len() > config.max_num_states_cut {
            next_active.sort_by(|&a, &b| arena.states[a].chi_sq.partial_cmp(&arena.states[b].chi_sq).unwrap());
            next_active.truncate(config.max_num_states_cut);
        }
        active = next_active;
    }

    let mut best: Option<(usize, u8, usize, f64)> = None;
    for &idx in &active {
        let (n_layers, n_stubs, _) = arena.chain_stats(idx);
        if n_layers < min_layers {
            continue;
        }
        let num_dof = 2 * n_stubs as i32 - n_par as i32;
        let reduced_chi_sq = if num_dof > 0 {
            arena.states[idx].chi_sq / num_dof as f64
        } else {
            f64::INFINITY
        };

        let better = match &best {
            None => true,
            Some((_, best_layers, best_stubs, best_chi)) => {
                if n_layers != *best_layers {
                    n_layers > *best_layers
                } else if config.select_most_num_stub_state && n_stubs != *best_stubs {
                    n_stubs > *best_stubs
                } else {
                    reduced_chi_sq < *best_chi
                }
            }
        };
        if better {
            best = Some((idx, n_layers, n_stubs, reduced_chi_sq));
        }
    }

    let Some((idx, _n_layers, n_stubs, reduced_chi_sq)) = best else {
        return L1FittedTrack::new(Vec::new(), candidate.cell_location_rphi(), candidate.q_over_pt(), 0.0, candidate.phi0(), candidate.z0(), candidate.tan_lambda(), f64::INFINITY, n_par, candidate.i_phi_sec(), candidate.i_eta_reg(), false);
    };

    let state = &arena.states[idx];
    let (_, _, stubs) = arena.chain_stats(idx);
    let phi0 = wrap_phi(state.x[1] + sector.phi_centre());
    let z0 = state.x[2];
    let tan_lambda = state.x[3];
    let q_over_pt = 2.0 * state.x[0] / magnetic_field.inv_pt_to_r.max(1e-12);
    let d0 = if n_par >= 5 { state.x[4] } else { 0.0 };

    let good = z0.abs() <= KALMAN_GOOD_STATE_Z0_CM && (n_stubs < 3 || reduced_chi_sq <= config.reduced_chi_sq_cut);

    L1FittedTrack::new(stubs, candidate.cell_location_rphi(), q_over_pt, d0, phi0, z0, tan_lambda, state.chi_sq, n_par, candidate.i_phi_sec(), candidate.i_eta_reg(), good)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trigger_common::config::SectorsConfig;

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

    #[test]
    fn straight_track_converges_with_all_layers() {
        let radii = [22.0, 35.0, 50.0, 70.0, 90.0, 110.0];
        let arena: Vec<Stub> = radii
            .iter()
            .enumerate()
            .map(|(i, &r)| Stub::new(i as u32, 0.1, r, r * 0.5, 0.0, 1.0, 0, 0.01, 0.02, (i + 1) as u16, true, true))
            .collect();
        let stubs: Vec<StubIndex> = (0..arena.len() as u32).collect();
        let candidate = L1Track3D::new(stubs, (16, 32), (0.0, 0.1), (0, 0), (0.0, 0.5), 4, 2);
        let sector = Sector::new(&sectors_config(), 4, 2, 3.0, true, true, 0.02, false);

        let fitted = fit(&candidate, &arena, &ctx(), &sector, &magnetic_field(), &kalman_config(), 5, 4);
        assert!(fitted.accepted());
        assert_eq!(fitted.num_stubs(), 6);
        assert!((fitted.tan_lambda() - 0.5).abs() < 1e-2);
    }

    #[test]
    fn validation_gate_rejects_outlier_stub() {
        let radii = [22.0, 35.0, 50.0, 70.0, 90.0, 110.0];
        let mut arena: Vec<Stub> = radii
            .iter()
            .enumerate()
            .map(|(i, &r)| Stub::new(i as u32, 0.1, r, r * 0.5, 0.0, 1.0, 0, 0.01, 0.02, (i + 1) as u16, true, true))
            .collect();
        // A 7th stub, on the same layer as index 3, badly displaced in z
        // (~50 sigma from the nominal line): an alternative candidate on
        // that layer that the validation gate must reject.
        arena.push(Stub::new(6, 0.1, 70.0, 70.0 * 0.5 + 50.0, 0.0, 1.0, 0, 0.01, 0.02, 4, true, true));

        let stubs: Vec<StubIndex> = (0..arena.len() as u32).collect();
        let candidate = L1Track3D::new(stubs, (16, 32), (0.0, 0.1), (0, 0), (0.0, 0.5), 4, 2);
        let sector = Sector::new(&sectors_config(), 4, 2, 3.0, true, true, 0.02, false);

        let fitted = fit(&candidate, &arena, &ctx(), &sector, &magnetic_field(), &kalman_config(), 5, 4);
        assert!(fitted.accepted());
        assert_eq!(fitted.num_stubs(), 6);
        assert!(!fitted.stubs().contains(&6));
        assert!(fitted.chi_sq_per_dof() < kalman_config().reduced_chi_sq_cut);
    }
}
