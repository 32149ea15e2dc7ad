//! Per-event driver: builds the sector grid once, then for each event
//! partitions stubs into sectors and runs the reconstruction chain.

use trigger_common::config::TriggerConfig;
use trigger_core::diagnostics::Diagnostics;
use trigger_core::error::CoreError;
use trigger_core::ht_pair;
use trigger_core::sector::Sector;
use trigger_core::stub::{Stub, StubIndex, StubPhysicsContext};
use trigger_core::track::L1FittedTrack;

/// The fixed (φ, η) sector grid, built once from configuration and reused
/// for every event.
pub struct SectorGrid {
    sectors: Vec<Sector>,
}

impl SectorGrid {
    pub fn build(config: &TriggerConfig) -> Self {
        let n_eta_regions = config.sectors.eta_region_edges.len() as u32 - 1;
        let min_pt_gev = config.ht_rphi.pt_min_gev;

        let mut sectors = Vec::with_capacity(config.sectors.n_phi as usize * n_eta_regions as usize);
        for i_phi_sec in 0..config.sectors.n_phi as u32 {
            for i_eta_reg in 0..n_eta_regions {
                sectors.push(Sector::new(
                    &config.sectors,
                    i_phi_sec,
                    i_eta_reg,
                    min_pt_gev,
                    config.sectors.use_stub_phi,
                    config.sectors.use_stub_phi_trk,
                    config.sectors.assumed_phi_trk_res,
                    config.sectors.calc_phi_trk_res,
                ));
            }
        }
        Self { sectors }
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }
}

/// Everything one event's pass over the full sector grid produced.
pub struct EventOutput {
    pub fitted_tracks: Vec<L1FittedTrack>,
    pub diagnostics: Diagnostics,
}

/// Run one event's stubs through every sector in the grid, merging each
/// sector's output into one event-wide result.
///
/// A stub inside more than one sector's (φ, η) window is processed once per
/// matching sector — sectors run independently, as they would across
/// separate hardware processing nodes, so no dedup pass runs over the
/// merged event-wide output beyond what each sector already did internally.
pub fn run_event(grid: &SectorGrid, arena: &mut [Stub], config: &TriggerConfig) -> Result<EventOutput, CoreError> {
    let membership_ctx = StubPhysicsContext {
        inv_pt_to_dphi: config.magnetic_field.inv_pt_to_dphi,
        bend_resolution: config.physics.bend_resolution,
        bend_resolution_extra: config.physics.bend_resolution_extra,
        chosen_r_of_z_filter: config.rz_filters.r_ref_ztrk_cm,
        beam_window_z: config.sectors.beam_half_length_cm,
    };

    let mut fitted_tracks = Vec::new();
    let mut diagnostics = Diagnostics::new();

    for sector in grid.sectors() {
        let stub_indices: Vec<StubIndex> = arena
            .iter()
            .filter(|stub| sector.inside(stub, &membership_ctx))
            .map(|stub| stub.index())
            .collect();

        if stub_indices.is_empty() {
            continue;
        }

        let span = tracing::info_span!(
            "sector",
            i_phi_sec = sector.i_phi_sec(),
            i_eta_reg = sector.i_eta_reg(),
            n_stubs = stub_indices.len()
        );
        let _enter = span.enter();

        let output = ht_pair::process_sector(arena, &stub_indices, sector, config)?;
        tracing::debug!(num_tracks = output.fitted_tracks.len(), "sector produced tracks");

        fitted_tracks.extend(output.fitted_tracks);
        diagnostics.merge(&output.diagnostics);
    }

    Ok(EventOutput { fitted_tracks, diagnostics })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TriggerConfig {
        let mut config: TriggerConfig =
            toml::from_str(trigger_common::config::minimal_toml_fixture()).unwrap();
        config.set_magnetic_field(3.8);
        config
    }

    #[test]
    fn grid_has_one_sector_per_phi_eta_pair() {
        let config = config();
        let grid = SectorGrid::build(&config);
        let n_eta = config.sectors.eta_region_edges.len() - 1;
        assert_eq!(grid.len(), config.sectors.n_phi as usize * n_eta);
    }

    #[test]
    fn event_with_a_straight_track_produces_a_fitted_track_in_some_sector() {
        let config = config();
        let grid = SectorGrid::build(&config);

        // Build a track through the sector centred on i_phi_sec=4.
        let target = grid
            .sectors()
            .iter()
            .find(|s| s.i_phi_sec() == 4 && s.i_eta_reg() == 2)
            .unwrap();
        let phi0 = target.phi_centre();

        let radii = [22.0, 35.0, 50.0, 70.0, 90.0, 110.0];
        let mut arena: Vec<Stub> = radii
            .iter()
            .enumerate()
            .map(|(i, &r)| Stub::new(i as u32, phi0, r, r * 0.4, 0.0, 1.0, 0, 0.01, 0.02, (i + 1) as u16, true, true))
            .collect();

        let out = run_event(&grid, &mut arena, &config).unwrap();
        assert!(!out.fitted_tracks.is_empty());
    }
}
