//! Linearised chi-square fitter, tracklet-style.
//!
//! Build the derivative
//! matrix D (2N × n_par), invert the n_par × n_par normal matrix M = DᵀD by
//! explicit Gauss-Jordan elimination, and update the helix by
//! Δx = (DᵀD)⁻¹Dᵀδ. The last configured fitter name selects 4- or
//! 5-parameter mode (`linearised_chisq` fits 4; a distinct 5-parameter call
//! site would add d₀, but this family publishes only the 4-parameter form —
//! the 5-parameter extension lives in the Kalman family).

use crate::sector::Sector;
use crate::stub::{Stub, StubIndex, StubPhysicsContext};
use crate::track::{L1FittedTrack, L1Track3D};
use trigger_common::config::FitConfig;

const N_PAR: usize = 4;

/// Invert a small square matrix by Gauss-Jordan elimination with partial
/// pivoting. Returns `None` if the matrix is singular to working precision.
fn gauss_jordan_inverse(m: &[[f64; N_PAR]; N_PAR]) -> Option<[[f64; N_PAR]; N_PAR]> {
    let mut a = *m;
    let mut inv = [[0.0; N_PAR]; N_PAR];
    for i in 0..N_PAR {
        inv[i][i] = 1.0;
    }

    for col in 0..N_PAR {
        let mut pivot_row = col;
        let mut pivot_val = a[col][col].abs();
        for row in (col + 1)..N_PAR {
            if a[row][col].abs() > pivot_val {
                pivot_val = a[row][col].abs();
                pivot_row = row;
            }
        }
        if pivot_val < 1e-14 {
            return None;
        }
        a.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot = a[col][col];
        for k in 0..N_PAR {
            a[col][k] /= pivot;
            inv[col][k] /= pivot;
        }
        for row in 0..N_PAR {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..N_PAR {
                a[row][k] -= factor * a[col][k];
                inv[row][k] -= factor * inv[col][k];
            }
        }
    }
    Some(inv)
}

struct Residual {
    stub_idx: usize,
    d_phi: [f64; N_PAR],
    d_z: [f64; N_PAR],
    delta_phi: f64,
    delta_z: f64,
    sigma_phi: f64,
    sigma_z: f64,
}

fn build_residuals(
    stubs: &[StubIndex],
    arena: &[Stub],
    ctx: &StubPhysicsContext,
    phi_centre: f64,
    x: &[f64; N_PAR],
) -> Vec<Residual> {
    let (q_over_pt, phi0, z0, tan_lambda) = (x[0], x[1], x[2], x[3]);
    stubs
        .iter()
        .enumerate()
        .map(|(i, &idx)| {
            let stub = &arena[idx as usize];
            let r = stub.r();
            let predicted_phi = phi0 - ctx.inv_pt_to_dphi * r * q_over_pt;
            let mut delta_phi = (stub.phi() - phi_centre) + phi_centre - predicted_phi;
            while delta_phi > std::f64::consts::PI {
                delta_phi -= 2.0 * std::f64::consts::PI;
            }
            while delta_phi < -std::f64::consts::PI {
                delta_phi += 2.0 * std::f64::consts::PI;
            }
            let predicted_z = z0 + tan_lambda * r;
            let delta_z = stub.z() - predicted_z;

            Residual {
                stub_idx: i,
                d_phi: [-ctx.inv_pt_to_dphi * r, 1.0, 0.0, 0.0],
                d_z: [0.0, 0.0, 1.0, r],
                delta_phi,
                delta_z,
                sigma_phi: stub.dphi_res(ctx).max(1e-6),
                sigma_z: stub.z_err().max(1e-6),
            }
        })
        .collect()
}

/// Fit a 3-D track candidate with an iterative Gauss-Newton update, killing
/// the worst-residual stub between iterations when configured to.
pub fn fit(
    candidate: &L1Track3D,
    arena: &[Stub],
    ctx: &StubPhysicsContext,
    sector: &Sector,
    config: &FitConfig,
    min_layers: u8,
) -> L1FittedTrack {
    let mut stubs = candidate.stubs().to_vec();
    let phi_centre = sector.phi_centre();
    let mut x = [candidate.q_over_pt(), candidate.phi0(), candidate.z0(), candidate.tan_lambda()];
    let mut chi_sq = f64::INFINITY;

    for _ in 0..config.max_iterations.max(1) {
        if stubs.len() < N_PAR || num_layers(arena, &stubs) < min_layers {
            return L1FittedTrack::new(stubs, candidate.cell_location_rphi(), x[0], 0.0, x[1], x[2], x[3], f64::INFINITY, N_PAR as u8, candidate.i_phi_sec(), candidate.i_eta_reg(), false);
        }

        let residuals = build_residuals(&stubs, arena, ctx, phi_centre, &x);

        let mut mtm = [[0.0; N_PAR]; N_PAR];
        let mut mtd = [0.0; N_PAR];
        for r in &residuals {
            let wphi = 1.0 / (r.sigma_phi * r.sigma_phi);
            let wz = 1.0 / (r.sigma_z * r.sigma_z);
            for a in 0..N_PAR {
                for b in 0..N_PAR {
                    mtm[a][b] += wphi * r.d_phi[a] * r.d_phi[b] + wz * r.d_z[a] * r.d_z[b];
                }
                mtd[a] += wphi * r.d_phi[a] * r.delta_phi + wz * r.d_z[a] * r.delta_z;
            }
        }

        let Some(inv) = gauss_jordan_inverse(&mtm) else {
            break;
        };
        let mut dx = [0.0; N_PAR];
        for a in 0..N_PAR {
            for b in 0..N_PAR {
                dx[a] += inv[a][b] * mtd[b];
            }
        }
        for a in 0..N_PAR {
            x[a] += dx[a];
        }

        let updated = build_residuals(&stubs, arena, ctx, phi_centre, &x);
        chi_sq = updated
            .iter()
            .map(|r| {
                (r.delta_phi / r.sigma_phi).powi(2) + (r.delta_z / r.sigma_z).powi(2)
            })
            .sum();

        let worst = updated
            .iter()
            .max_by(|a, b| {
                let ra = (a.delta_phi / a.sigma_phi).abs().max((a.delta_z / a.sigma_z).abs());
                let rb = (b.delta_phi / b.sigma_phi).abs().max((b.delta_z / b.sigma_z).abs());
                ra.partial_cmp(&rb).unwrap()
            });

        let should_kill = config.kill_worst_hit
            && config.residual_kill_cut > 0.0
            && worst.map(|r| (r.delta_phi / r.sigma_phi).abs().max((r.delta_z / r.sigma_z).abs()) > config.residual_kill_cut).unwrap_or(false);

        if should_kill {
            if let Some(r) = worst {
                stubs.remove(r.stub_idx);
                continue;
            }
        }
        break;
    }

    L1FittedTrack::new(stubs.clone(), candidate.cell_location_rphi(), x[0], 0.0, x[1], x[2], x[3], chi_sq, N_PAR as u8, candidate.i_phi_sec(), candidate.i_eta_reg(), true)
}

fn num_layers(arena: &[Stub], stubs: &[StubIndex]) -> u8 {
    let mut seen = std::collections::HashSet::new();
    for &idx in stubs {
        seen.insert(arena[idx as usize].layer_id());
    }
    seen.len() as u8
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

    fn fit_config() -> FitConfig {
        FitConfig {
            fitters: vec!["linearised_chisq".to_string()],
            chi_sq_per_dof_cut: 10.0,
            max_iterations: 5,
            kill_worst_hit: false,
            residual_kill_cut: 0.0,
        }
    }

    #[test]
    fn converges_on_straight_track() {
        let radii = [22.0, 35.0, 50.0, 70.0, 90.0, 110.0];
        let arena: Vec<Stub> = radii
            .iter()
            .enumerate()
            .map(|(i, &r)| Stub::new(i as u32, 0.1, r, r * 0.5, 0.0, 1.0, 0, 0.01, 0.02, (i + 1) as u16, true, true))
            .collect();
        let stubs: Vec<StubIndex> = (0..arena.len() as u32).collect();
        let candidate = L1Track3D::new(stubs, (16, 32), (0.001, 0.095), (0, 0), (0.1, 0.48), 4, 2);
        let sector = Sector::new(&sectors_config(), 4, 2, 3.0, true, true, 0.02, false);

        let fitted = fit(&candidate, &arena, &ctx(), &sector, &fit_config(), 5);
        assert!(fitted.accepted());
        assert!((fitted.tan_lambda() - 0.5).abs() < 1e-3);
        assert!(fitted.chi_sq_per_dof() < 1.0);
    }
}
