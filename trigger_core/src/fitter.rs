//! Fitter-family dispatch: run the configured back-ends in order and keep
//! the first accepted result, falling through to the next back-end when
//! one fails.

use crate::sector::Sector;
use crate::stub::{Stub, StubPhysicsContext};
use crate::track::{L1FittedTrack, L1Track3D};
use crate::{fit_linear, fit_linearised_chisq, kalman};
use trigger_common::config::TriggerConfig;

/// Fit one 3-D candidate with the fitter chain named in `config.fit.fitters`,
/// returning the first back-end's result that comes back accepted, or the
/// last attempted result if none did.
pub fn fit_candidate(
    candidate: &L1Track3D,
    arena: &[Stub],
    ctx: &StubPhysicsContext,
    sector: &Sector,
    config: &TriggerConfig,
) -> L1FittedTrack {
    let min_layers = config.acceptance.min_layers;
    let min_ps_layers = 0;
    let mut last = None;

    for name in &config.fit.fitters {
        let fitted = match name.as_str() {
            "linear_regression" => fit_linear::fit(candidate, arena, ctx, sector, &config.fit, min_layers, min_ps_layers),
            "linearised_chisq" => fit_linearised_chisq::fit(candidate, arena, ctx, sector, &config.fit, min_layers),
            "kalman4" => kalman::fit(candidate, arena, ctx, sector, &config.magnetic_field, &config.kalman, min_layers, 4),
            "kalman5" => kalman::fit(candidate, arena, ctx, sector, &config.magnetic_field, &config.kalman, min_layers, 5),
            _ => continue,
        };
        if fitted.accepted() {
            return fitted;
        }
        last = Some(fitted);
    }

    last.unwrap_or_else(|| {
        L1FittedTrack::new(
            candidate.stubs().to_vec(),
            candidate.cell_location_rphi(),
            candidate.q_over_pt(),
            0.0,
            candidate.phi0(),
            candidate.z0(),
            candidate.tan_lambda(),
            f64::INFINITY,
            4,
            candidate.i_phi_sec(),
            candidate.i_eta_reg(),
            false,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sector::Sector;
    use crate::stub::Stub;
    use trigger_common::config::*;

    fn minimal_config() -> TriggerConfig {
        let mut config: TriggerConfig =
            toml::from_str(trigger_common::config::minimal_toml_fixture()).unwrap();
        config.set_magnetic_field(3.8);
        config
    }

    #[test]
    fn falls_through_to_linear_regression_when_named_first() {
        let radii = [22.0, 35.0, 50.0, 70.0, 90.0, 110.0];
        let arena: Vec<Stub> = radii
            .iter()
            .enumerate()
            .map(|(i, &r)| Stub::new(i as u32, 0.1, r, r * 0.5, 0.0, 1.0, 0, 0.01, 0.02, (i + 1) as u16, true, true))
            .collect();
        let stubs: Vec<u32> = (0..arena.len() as u32).collect();
        let candidate = L1Track3D::new(stubs, (16, 32), (0.0, 0.1), (0, 0), (0.0, 0.5), 4, 2);

        let mut config = minimal_config();
        config.fit.fitters = vec!["linear_regression".to_string()];
        config.acceptance.min_layers = 4;

        let sector = Sector::new(&config.sectors, 4, 2, 3.0, true, true, 0.02, false);
        let ctx = StubPhysicsContext {
            inv_pt_to_dphi: config.magnetic_field.inv_pt_to_dphi,
            bend_resolution: 0.5,
            bend_resolution_extra: 0.0,
            chosen_r_of_z_filter: config.sectors.r_ref_z_cm,
            beam_window_z: config.sectors.beam_half_length_cm,
        };

        let fitted = fit_candidate(&candidate, &arena, &ctx, &sector, &config);
        assert!(fitted.accepted());
    }
}
