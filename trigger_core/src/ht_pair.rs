//! Per-sector orchestration: fill the r-φ array, filter and optionally fill
//! an r-z array per r-φ candidate, assemble 3-D candidates, deduplicate,
//! fit, deduplicate again, then throttle to the busy-sector stub budget.

use crate::diagnostics::Diagnostics;
use crate::dup_removal::{self, DedupParams};
use crate::error::CoreError;
use crate::fitter;
use crate::ht_rphi::HtRphi;
use crate::ht_rz::HtRz;
use crate::rz_filter::{RzFilterGeometry, SeedCombinationCounters, TrkRZfilter};
use crate::sector::Sector;
use crate::stub::{Stub, StubIndex, StubPhysicsContext};
use crate::track::{L1FittedTrack, L1Track2D, L1Track3D};
use trigger_common::config::TriggerConfig;

/// Everything one sector's pass over an event produced.
pub struct SectorOutput {
    pub fitted_tracks: Vec<L1FittedTrack>,
    pub diagnostics: Diagnostics,
    pub seed_counters: Vec<SeedCombinationCounters>,
}

fn dedup_params(config: &TriggerConfig) -> DedupParams {
    DedupParams {
        min_independent: config.duplicate.min_independent,
        min_common_hits_layers: config.duplicate.min_common_hits_layers,
        max_qoverpt_scan: config.duplicate.max_qoverpt_scan,
        max_phi0_scan: config.duplicate.max_phi0_scan,
        max_z0_scan: config.duplicate.max_z0_scan,
        max_tan_lambda_scan: config.duplicate.max_tan_lambda_scan,
    }
}

/// Estimate (z0, tan λ) straight from the sector's η window, for when no
/// r-z filter or r-z HT narrowed it: z0 = 0, tan λ = 1/tan(θ_centre).
fn sector_centre_rz_estimate(sector: &Sector) -> (f64, f64) {
    let eta_centre = 0.5 * (sector.eta_min() + sector.eta_max());
    let theta_centre = 2.0 * (-eta_centre).exp().atan();
    (0.0, 1.0 / theta_centre.tan())
}

/// Discard tracks, by increasing |q/p_T|, until the total stub count across
/// surviving tracks is within the sector's busy-sector budget.
fn apply_busy_sector_throttle(
    mut tracks: Vec<L1Track3D>,
    n_busy: usize,
    each_charge: bool,
) -> Vec<L1Track3D> {
    if !each_charge {
        tracks.sort_by(|a, b| a.inv_pt().partial_cmp(&b.inv_pt()).unwrap());
        let mut total = 0usize;
        let mut kept = Vec::with_capacity(tracks.len());
        for track in tracks {
            let n = track.num_stubs();
            if total + n > n_busy {
                break;
            }
            total += n;
            kept.push(track);
        }
        kept
    } else {
        let (mut pos, mut neg): (Vec<_>, Vec<_>) = tracks.into_iter().partition(|t| t.charge() > 0.0);
        pos.sort_by(|a, b| a.inv_pt().partial_cmp(&b.inv_pt()).unwrap());
        neg.sort_by(|a, b| a.inv_pt().partial_cmp(&b.inv_pt()).unwrap());
        let throttle_one = |list: Vec<L1Track3D>| -> Vec<L1Track3D> {
            let mut total = 0usize;
            let mut kept = Vec::with_capacity(list.len());
            for track in list {
                let n = track.num_stubs();
                if total + n > n_busy {
                    break;
                }
                total += n;
                kept.push(track);
            }
            kept
        };
        let mut kept = throttle_one(pos);
        kept.extend(throttle_one(neg));
        kept
    }
}

/// Run the full reconstruction chain for one (φ, η) sector.
///
/// `stub_indices` are the arena indices the sector already accepted (by
/// [`Sector::inside`]). `arena` is mutated in place: stubs get their
/// q/p_T bend-filter bin range populated ahead of the r-φ fill pass.
pub fn process_sector(
    arena: &mut [Stub],
    stub_indices: &[StubIndex],
    sector: &Sector,
    config: &TriggerConfig,
) -> Result<SectorOutput, CoreError> {
    let ctx = StubPhysicsContext {
        inv_pt_to_dphi: config.magnetic_field.inv_pt_to_dphi,
        bend_resolution: config.physics.bend_resolution,
        bend_resolution_extra: config.physics.bend_resolution_extra,
        chosen_r_of_z_filter: config.rz_filters.r_ref_ztrk_cm,
        beam_window_z: sector.beam_window_z(),
    };

    let mut ht_rphi = HtRphi::new(
        &config.ht_rphi,
        sector.eta_min(),
        sector.eta_max(),
        sector.phi_centre(),
        config.magnetic_field.inv_pt_to_dphi,
        sector.chosen_r_of_phi(),
    )?;
    ht_rphi.set_phi_half_width(sector.sector_half_width());

    let mut diagnostics = Diagnostics::new();

    if config.ht_rphi.bend_filter_daisy_chain {
        let bin_width = 2.0 / config.ht_rphi.pt_min_gev / ht_rphi.n_bins_qoverpt() as f64;
        for &idx in stub_indices {
            arena[idx as usize].calc_q_over_pt_range(&ctx, bin_width, ht_rphi.n_bins_qoverpt())?;
        }
    }

    for &idx in stub_indices {
        let in_sub_secs = if config.sectors.n_subsec_eta > 1 {
            Some(sector.inside_eta_sub_secs(&arena[idx as usize]))
        } else {
            None
        };
        ht_rphi.store(arena, idx, &ctx, in_sub_secs)?;
    }
    ht_rphi.end(arena, &ctx, config.acceptance.reduced_layer_id)?;
    diagnostics.record_rphi(ht_rphi.counters(), ht_rphi.max_line_gradient());

    let rphi_candidates: Vec<L1Track2D> = ht_rphi
        .track_candidates(config.acceptance.reduced_layer_id)
        .into_iter()
        .map(|(cell, stubs)| {
            let helix = ht_rphi.helix_2d_conventional(cell.0, cell.1);
            L1Track2D::new_rphi(stubs, cell, helix)
        })
        .collect();

    let rphi_deduped = dup_removal::run_filter_alg(
        config.duplicate.alg_rphi,
        arena,
        &rphi_candidates,
        &dedup_params(config),
    );

    let rz_geometry = RzFilterGeometry {
        chosen_r_of_z: sector.chosen_r_of_z(),
        z_trk_min_sector: sector.z_outer_min(),
        z_trk_max_sector: sector.z_outer_max(),
        min_stub_layers: config.acceptance.min_layers,
        min_pt_to_reduce_layers: if config.acceptance.relaxed_layers_pt_threshold_gev > 0.0 {
            config.acceptance.relaxed_layers_pt_threshold_gev
        } else {
            f64::INFINITY
        },
    };
    let rz_filter = TrkRZfilter::new(&config.rz_filters, rz_geometry);
    let (rz_filtered, seed_counters) = rz_filter.filter_tracks(arena, &ctx, rphi_deduped);

    let rz_filtered = dup_removal::run_filter_alg(
        config.duplicate.alg_rz,
        arena,
        &rz_filtered,
        &dedup_params(config),
    );

    let mut track3d_candidates = Vec::with_capacity(rz_filtered.len());
    for rphi_track in rz_filtered {
        let cell_location_rphi = rphi_track.cell_location();
        let q_over_pt_t = rphi_track.helix();

        if config.ht_rz.enabled {
            let max_abs_z0 = sector.beam_window_z();
            let mut ht_rz = HtRz::new(
                &config.ht_rz,
                max_abs_z0,
                sector.z_outer_min(),
                sector.z_outer_max(),
                sector.chosen_r_of_z(),
                q_over_pt_t.0,
            )?;
            for &idx in rphi_track.stubs() {
                ht_rz.store(arena, idx)?;
            }
            ht_rz.end(arena, &ctx, config.acceptance.min_layers, config.acceptance.reduced_layer_id)?;
            diagnostics.record_rz(ht_rz.counters(), ht_rz.max_line_gradient());

            let rz_candidates = ht_rz.track_candidates(config.acceptance.min_layers);
            if rz_candidates.is_empty() {
                let (est_z0, est_tan_lambda) = rphi_track
                    .rz_filter_estimate()
                    .unwrap_or_else(|| sector_centre_rz_estimate(sector));
                track3d_candidates.push(L1Track3D::new(
                    rphi_track.stubs().to_vec(),
                    cell_location_rphi,
                    q_over_pt_t,
                    (0, 0),
                    (est_z0, est_tan_lambda),
                    sector.i_phi_sec(),
                    sector.i_eta_reg(),
                ));
            } else {
                for (rz_cell, rz_stubs) in rz_candidates {
                    let helix_rz = ht_rz.helix_2d_conventional(rz_cell.0, rz_cell.1);
                    track3d_candidates.push(L1Track3D::new(
                        rz_stubs,
                        cell_location_rphi,
                        q_over_pt_t,
                        rz_cell,
                        helix_rz,
                        sector.i_phi_sec(),
                        sector.i_eta_reg(),
                    ));
                }
            }
        } else {
            let (est_z0, est_tan_lambda) = rphi_track
                .rz_filter_estimate()
                .unwrap_or_else(|| sector_centre_rz_estimate(sector));
            track3d_candidates.push(L1Track3D::new(
                rphi_track.stubs().to_vec(),
                cell_location_rphi,
                q_over_pt_t,
                (0, 0),
                (est_z0, est_tan_lambda),
                sector.i_phi_sec(),
                sector.i_eta_reg(),
            ));
        }
    }

    let track3d_deduped = dup_removal::run_filter_alg(
        config.duplicate.alg_rz_seg,
        arena,
        &track3d_candidates,
        &dedup_params(config),
    );

    let before_throttle: usize = track3d_deduped.iter().map(|t| t.num_stubs()).sum();
    let throttled = apply_busy_sector_throttle(
        track3d_deduped,
        config.ht_rphi.n_busy,
        config.ht_rphi.busy_sector_each_charge,
    );
    let after_throttle: usize = throttled.iter().map(|t| t.num_stubs()).sum();
    diagnostics.record_duplicate_stubs((before_throttle - after_throttle) as u64);

    let fitted: Vec<L1FittedTrack> = throttled
        .iter()
        .map(|candidate| fitter::fit_candidate(candidate, arena, &ctx, sector, config))
        .filter(|fitted| fitted.accepted())
        .collect();

    let fitted = dup_removal::run_filter_alg(
        config.duplicate.alg_fit,
        arena,
        &fitted,
        &dedup_params(config),
    );

    Ok(SectorOutput {
        fitted_tracks: fitted,
        diagnostics,
        seed_counters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::Stub;

    fn config() -> TriggerConfig {
        let mut config: TriggerConfig =
            toml::from_str(trigger_common::config::minimal_toml_fixture()).unwrap();
        config.set_magnetic_field(3.8);
        config
    }

    #[test]
    fn processes_a_sector_with_a_simple_straight_stub_set() {
        let config = config();
        let sector = Sector::new(&config.sectors, 4, 2, 3.0, true, true, 0.02, false);

        let radii = [22.0, 35.0, 50.0, 70.0, 90.0, 110.0];
        let phi0 = sector.phi_centre();
        let mut arena: Vec<Stub> = radii
            .iter()
            .enumerate()
            .map(|(i, &r)| Stub::new(i as u32, phi0, r, r * 0.4, 0.0, 1.0, 0, 0.01, 0.02, (i + 1) as u16, true, true))
            .collect();
        let indices: Vec<StubIndex> = (0..arena.len() as u32).collect();

        let out = process_sector(&mut arena, &indices, &sector, &config).unwrap();
        assert!(out.fitted_tracks.iter().all(|t| t.num_stubs() >= 4));
    }

    #[test]
    fn busy_sector_throttle_drops_highest_inv_pt_tracks_first() {
        let a = L1Track3D::new(vec![0, 1, 2, 3], (0, 0), (0.01, 0.0), (0, 0), (0.0, 0.5), 0, 0);
        let b = L1Track3D::new(vec![4, 5, 6, 7], (1, 1), (0.5, 0.0), (0, 0), (0.0, 0.5), 0, 0);
        let kept = apply_busy_sector_throttle(vec![a, b], 4, false);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].q_over_pt() < 0.1);
    }
}
