//! Linear-regression fitter, 4-parameter variant.
//!
//! One independent least-squares line in each of (r-φ) and (r-z), fit
//! against one point per reduced layer id (the midpoint of that layer's
//! stub values) rather than one point per stub, then an iterative
//! worst-residual kill.

use crate::sector::Sector;
use crate::stub::{Stub, StubIndex, StubPhysicsContext};
use crate::track::{L1FittedTrack, L1Track3D};
use std::collections::BTreeMap;
use trigger_common::config::FitConfig;

struct LayerPoint {
    r_mid: f64,
    phi_y_mid: f64,
    z_mid: f64,
    members: Vec<StubIndex>,
}

fn group_by_layer(arena: &[Stub], stubs: &[StubIndex], phi_centre: f64) -> BTreeMap<u8, LayerPoint> {
    let mut groups: BTreeMap<u8, Vec<StubIndex>> = BTreeMap::new();
    for &idx in stubs {
        groups.entry(arena[idx as usize].layer_id_reduced()).or_default().push(idx);
    }
    groups
        .into_iter()
        .map(|(layer, members)| {
            let rs: Vec<f64> = members.iter().map(|&i| arena[i as usize].r()).collect();
            let phis: Vec<f64> = members
                .iter()
                .map(|&i| {
                    let mut d = arena[i as usize].phi() - phi_centre;
                    while d > std::f64::consts::PI {
                        d -= 2.0 * std::f64::consts::PI;
                    }
                    while d < -std::f64::consts::PI {
                        d += 2.0 * std::f64::consts::PI;
                    }
                    d
                })
                .collect();
            let zs: Vec<f64> = members.iter().map(|&i| arena[i as usize].z()).collect();
            let r_mid = (rs.iter().cloned().fold(f64::INFINITY, f64::min)
                + rs.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
                / 2.0;
            let phi_y_mid = (phis.iter().cloned().fold(f64::INFINITY, f64::min)
                + phis.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
                / 2.0;
            let z_mid = (zs.iter().cloned().fold(f64::INFINITY, f64::min)
                + zs.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
                / 2.0;
            (layer, LayerPoint { r_mid, phi_y_mid, z_mid, members })
        })
        .collect()
}

/// Ordinary least squares `y = slope*(x - x_ref) + intercept_at_ref`.
fn regress(points: &[(f64, f64)], x_ref: f64) -> (f64, f64) {
    let n = points.len() as f64;
    if points.len() < 2 {
        return (0.0, points.first().map(|p| p.1).unwrap_or(0.0));
    }
    let mean_x: f64 = points.iter().map(|p| p.0 - x_ref).sum::<f64>() / n;
    let mean_y: f64 = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for &(x, y) in points {
        let dx = (x - x_ref) - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    let slope = if den.abs() < 1e-12 { 0.0 } else { num / den };
    let intercept = mean_y - slope * mean_x;
    (slope, intercept)
}

/// Fit a 3-D track candidate, killing the worst-residual stub between
/// iterations until the fit is stable or the iteration cap is reached.
pub fn fit(
    candidate: &L1Track3D,
    arena: &[Stub],
    ctx: &StubPhysicsContext,
    sector: &Sector,
    config: &FitConfig,
    min_layers: u8,
    min_ps_layers: u8,
) -> L1FittedTrack {
    let mut stubs = candidate.stubs().to_vec();
    let r_ref_phi = sector.chosen_r_of_phi();
    let r_ref_z = sector.chosen_r_of_z();
    let phi_centre = sector.phi_centre();

    let (mut q_over_pt, mut phi0, mut z0, mut tan_lambda) = (candidate.q_over_pt(), candidate.phi0(), candidate.z0(), candidate.tan_lambda());
    let mut chi_sq = f64::INFINITY;

    for _ in 0..config.max_iterations.max(1) {
        let groups = group_by_layer(arena, &stubs, phi_centre);
        let n_layers = groups.len() as u8;
        let n_ps_layers = groups
            .values()
            .filter(|g| g.members.iter().any(|&i| arena[i as usize].ps_module()))
            .count() as u8;

        if n_layers < min_layers || n_ps_layers < min_ps_layers {
            return L1FittedTrack::new(stubs, candidate.cell_location_rphi(), q_over_pt, 0.0, phi0, z0, tan_lambda, f64::INFINITY, 4, candidate.i_phi_sec(), candidate.i_eta_reg(), false);
        }

        let phi_points: Vec<(f64, f64)> = groups.values().map(|g| (g.r_mid, g.phi_y_mid)).collect();
        let z_points: Vec<(f64, f64)> = groups.values().map(|g| (g.r_mid, g.z_mid)).collect();

        let (slope_phi, intercept_phi) = regress(&phi_points, r_ref_phi);
        q_over_pt = -slope_phi / ctx.inv_pt_to_dphi;
        phi0 = phi_centre + intercept_phi;

        let (slope_z, intercept_z) = regress(&z_points, r_ref_z);
        tan_lambda = slope_z;
        z0 = intercept_z - tan_lambda * r_ref_z;

        // Per-stub residuals, normalised by measurement sigma.
        let mut worst: Option<(usize, f64)> = None;
        chi_sq = 0.0;
        for (i, &idx) in stubs.iter().enumerate() {
            let stub = &arena[idx as usize];
            let predicted_phi = phi0 - ctx.inv_pt_to_dphi * stub.r() * q_over_pt;
            let mut dphi = stub.phi() - predicted_phi;
            while dphi > std::f64::consts::PI {
                dphi -= 2.0 * std::f64::consts::PI;
            }
            while dphi < -std::f64::consts::PI {
                dphi += 2.0 * std::f64::consts::PI;
            }
            let predicted_z = z0 + tan_lambda * stub.r();
            let res_phi = dphi / stub.dphi_res(ctx).max(1e-6);
            let res_z = (stub.z() - predicted_z) / stub.z_err().max(1e-6);
            let residual = res_phi.abs().max(res_z.abs());
            chi_sq += res_phi * res_phi + res_z * res_z;
            if worst.map(|(_, w)| residual > w).unwrap_or(true) {
                worst = Some((i, residual));
            }
        }

        let too_many_stubs = stubs.len() as u8 > n_layers;
        let kill = match worst {
            Some((_, r)) if config.residual_kill_cut > 0.0 && r > config.residual_kill_cut => true,
            _ => too_many_stubs,
        };

        if kill && config.kill_worst_hit {
            if let Some((i, _)) = worst {
                stubs.remove(i);
                continue;
            }
        }
        break;
    }

    L1FittedTrack::new(stubs.clone(), candidate.cell_location_rphi(), q_over_pt, 0.0, phi0, z0, tan_lambda, chi_sq, 4, candidate.i_phi_sec(), candidate.i_eta_reg(), true)
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
            fitters: vec!["linear_regression".to_string()],
            chi_sq_per_dof_cut: 10.0,
            max_iterations: 5,
            kill_worst_hit: true,
            residual_kill_cut: 0.0,
        }
    }

    #[test]
    fn fits_straight_track_with_near_zero_chisq() {
        let radii = [22.0, 35.0, 50.0, 70.0, 90.0, 110.0];
        let arena: Vec<Stub> = radii
            .iter()
            .enumerate()
            .map(|(i, &r)| Stub::new(i as u32, 0.1, r, r * 0.5, 0.0, 1.0, 0, 0.01, 0.02, (i + 1) as u16, true, true))
            .collect();
        let stubs: Vec<StubIndex> = (0..arena.len() as u32).collect();
        let candidate = L1Track3D::new(stubs, (16, 32), (0.0, 0.1), (0, 0), (0.0, 0.5), 4, 2);
        let sector = Sector::new(&sectors_config(), 4, 2, 3.0, true, true, 0.02, false);

        let fitted = fit_linear_helper(&candidate, &arena, &ctx(), &sector, &fit_config());
        assert!(fitted.chi_sq_per_dof() < 1e-6);
        assert!((fitted.tan_lambda() - 0.5).abs() < 1e-6);
        assert!(fitted.accepted());
    }

    fn fit_linear_helper(c: &L1Track3D, arena: &[Stub], ctx: &StubPhysicsContext, sector: &Sector, cfg: &FitConfig) -> L1FittedTrack {
        super::fit(c, arena, ctx, sector, cfg, 5, 0)
    }
}
