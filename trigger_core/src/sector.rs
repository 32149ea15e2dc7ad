//! Sector/sub-sector membership decisions.
//!
//! One instance per (φ sector, η region) pair, immutable after
//! construction, deciding whether a stub belongs to the sector in φ, in η,
//! or both.

use crate::stub::{Stub, StubPhysicsContext};
use trigger_common::config::SectorsConfig;

/// One (φ, η) sector. Constructed once at run start; immutable thereafter.
#[derive(Debug, Clone)]
pub struct Sector {
    i_phi_sec: u32,
    i_eta_reg: u32,

    handle_strips_phi: bool,
    handle_strips_eta: bool,

    eta_min: f64,
    eta_max: f64,
    chosen_r_of_z: f64,
    z_outer_min: f64,
    z_outer_max: f64,
    beam_window_z: f64,

    phi_centre: f64,
    sector_half_width: f64,
    chosen_r_of_phi: f64,
    min_pt: f64,
    use_stub_phi: bool,
    use_stub_phi_trk: bool,
    assumed_phi_trk_res: f64,
    calc_phi_trk_res: bool,

    sub_sec_z_ranges: Vec<(f64, f64)>,
}

impl Sector {
    pub fn new(
        config: &SectorsConfig,
        i_phi_sec: u32,
        i_eta_reg: u32,
        min_pt_gev: f64,
        use_stub_phi: bool,
        use_stub_phi_trk: bool,
        assumed_phi_trk_res: f64,
        calc_phi_trk_res: bool,
    ) -> Self {
        let eta_min = config.eta_region_edges[i_eta_reg as usize];
        let eta_max = config.eta_region_edges[i_eta_reg as usize + 1];
        let chosen_r_of_z = config.r_ref_z_cm;
        let theta_of = |eta: f64| 2.0 * (-eta).exp().atan();
        let z_outer_min = chosen_r_of_z / theta_of(eta_min).tan();
        let z_outer_max = chosen_r_of_z / theta_of(eta_max).tan();

        let n_phi = config.n_phi as f64;
        let phi_centre = 2.0 * std::f64::consts::PI * (0.5 + i_phi_sec as f64) / n_phi
            - std::f64::consts::PI;
        let sector_half_width = std::f64::consts::PI / n_phi;

        let n_sub = config.n_subsec_eta.max(1) as f64;
        let sub_width = (z_outer_max - z_outer_min) / n_sub;
        let sub_sec_z_ranges = (0..config.n_subsec_eta.max(1))
            .map(|i| {
                let lo = z_outer_min + (i as f64) * sub_width;
                let hi = z_outer_min + ((i + 1) as f64) * sub_width;
                (lo, hi)
            })
            .collect();

        Self {
            i_phi_sec,
            i_eta_reg,
            handle_strips_phi: config.handle_strips_eta,
            handle_strips_eta: config.handle_strips_eta,
            eta_min,
            eta_max,
            chosen_r_of_z,
            z_outer_min,
            z_outer_max,
            beam_window_z: config.beam_half_length_cm,
            phi_centre,
            sector_half_width,
            chosen_r_of_phi: config.r_ref_phi_cm,
            min_pt: min_pt_gev,
            use_stub_phi,
            use_stub_phi_trk,
            assumed_phi_trk_res,
            calc_phi_trk_res,
            sub_sec_z_ranges,
        }
    }

    pub fn i_phi_sec(&self) -> u32 {
        self.i_phi_sec
    }
    pub fn i_eta_reg(&self) -> u32 {
        self.i_eta_reg
    }
    pub fn phi_centre(&self) -> f64 {
        self.phi_centre
    }
    pub fn eta_min(&self) -> f64 {
        self.eta_min
    }
    pub fn eta_max(&self) -> f64 {
        self.eta_max
    }
    pub fn chosen_r_of_phi(&self) -> f64 {
        self.chosen_r_of_phi
    }
    pub fn chosen_r_of_z(&self) -> f64 {
        self.chosen_r_of_z
    }
    pub fn z_outer_min(&self) -> f64 {
        self.z_outer_min
    }
    pub fn z_outer_max(&self) -> f64 {
        self.z_outer_max
    }
    pub fn beam_window_z(&self) -> f64 {
        self.beam_window_z
    }
    pub fn sector_half_width(&self) -> f64 {
        self.sector_half_width
    }

    fn inside_eta_range(&self, stub: &Stub, z_range_min: f64, z_range_max: f64) -> bool {
        if !self.handle_strips_eta {
            let z_min = (z_range_min * stub.r() - self.beam_window_z * (stub.r() - self.chosen_r_of_z).abs())
                / self.chosen_r_of_z;
            let z_max = (z_range_max * stub.r() + self.beam_window_z * (stub.r() - self.chosen_r_of_z).abs())
                / self.chosen_r_of_z;
            stub.z() > z_min && stub.z() < z_max
        } else {
            let stub_min_r = stub.r() - stub.r_err();
            let stub_max_r = stub.r() + stub.r_err();
            let stub_min_z = stub.z() - stub.z_err();
            let stub_max_z = stub.z() + stub.z_err();

            let r_stub_a = if (z_range_min + self.beam_window_z) >= 0.0 {
                stub_min_r
            } else {
                stub_max_r
            };
            let z_min = -self.beam_window_z + (r_stub_a / self.chosen_r_of_z) * (z_range_min + self.beam_window_z);

            let r_stub_b = if (z_range_max - self.beam_window_z) >= 0.0 {
                stub_max_r
            } else {
                stub_min_r
            };
            let z_max = self.beam_window_z + (r_stub_b / self.chosen_r_of_z) * (z_range_max - self.beam_window_z);

            stub_max_z > z_min && stub_min_z < z_max
        }
    }

    /// Is the stub inside this sector's η window?
    pub fn inside_eta(&self, stub: &Stub) -> bool {
        self.inside_eta_range(stub, self.z_outer_min, self.z_outer_max)
    }

    /// Per-sub-sector η membership.
    pub fn inside_eta_sub_secs(&self, stub: &Stub) -> Vec<bool> {
        self.sub_sec_z_ranges
            .iter()
            .map(|&(lo, hi)| self.inside_eta_range(stub, lo, hi))
            .collect()
    }

    fn delta_phi(a: f64, b: f64) -> f64 {
        let mut d = a - b;
        while d > std::f64::consts::PI {
            d -= 2.0 * std::f64::consts::PI;
        }
        while d < -std::f64::consts::PI {
            d += 2.0 * std::f64::consts::PI;
        }
        d
    }

    /// Is the stub inside this sector's φ window?
    pub fn inside_phi(&self, stub: &Stub, ctx: &StubPhysicsContext) -> bool {
        let mut ok_phi = true;
        let mut ok_phi_trk = true;

        if self.use_stub_phi {
            let del_phi = Self::delta_phi(stub.phi(), self.phi_centre);
            let tolerance_phi = (stub.r() - self.chosen_r_of_phi).abs() * ctx.inv_pt_to_dphi / self.min_pt;
            let outside_phi = del_phi.abs() - self.sector_half_width - tolerance_phi;
            if outside_phi > 0.0 {
                ok_phi = false;
            }
        }

        if self.use_stub_phi_trk {
            let (phi_trk, phi_trk_res) = stub.trk_phi_at_r(self.chosen_r_of_phi, ctx);
            let del_phi_trk = Self::delta_phi(phi_trk, self.phi_centre);
            let mut tolerance_phi_trk = self.assumed_phi_trk_res * (2.0 * self.sector_half_width);
            if self.calc_phi_trk_res {
                // Reduce tolerance if the bend-derived resolution is tighter
                // than the nominal assumed one.
                tolerance_phi_trk = tolerance_phi_trk.min(phi_trk_res);
            }
            let chosen_stub_phi_err = phi_trk_res;
            let mut outside_phi_trk = del_phi_trk.abs() - self.sector_half_width - tolerance_phi_trk;
            if self.handle_strips_phi {
                outside_phi_trk -= chosen_stub_phi_err;
            }
            if outside_phi_trk > 0.0 {
                ok_phi_trk = false;
            }
        }

        ok_phi && ok_phi_trk
    }

    /// Is the stub inside this sector in both φ and η?
    pub fn inside(&self, stub: &Stub, ctx: &StubPhysicsContext) -> bool {
        self.inside_phi(stub, ctx) && self.inside_eta(stub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::Stub;

    fn config() -> SectorsConfig {
        SectorsConfig {
            n_phi: 9,
            eta_region_edges: vec![-2.4, -1.0, 0.0, 1.0, 2.4],
            r_ref_phi_cm: 60.0,
            r_ref_z_cm: 50.0,
            beam_half_length_cm: 15.0,
            n_subsec_eta: 3,
            handle_strips_eta: false,
            use_stub_phi: true,
            use_stub_phi_trk: true,
            assumed_phi_trk_res: 0.02,
            calc_phi_trk_res: false,
        }
    }

    fn ctx() -> StubPhysicsContext {
        StubPhysicsContext {
            inv_pt_to_dphi: 0.0057,
            bend_resolution: 0.5,
            bend_resolution_extra: 0.0,
            chosen_r_of_z_filter: 50.0,
            beam_window_z: 15.0,
        }
    }

    #[test]
    fn centre_sector_stub_is_inside() {
        let cfg = config();
        let sector = Sector::new(&cfg, 4, 2, 3.0, true, true, 0.02, false);
        let stub = Stub::new(0, sector.phi_centre(), 50.0, 5.0, 0.0, 1.0, 0, 0.01, 0.02, 3, true, true);
        assert!(sector.inside(&stub, &ctx()));
    }

    #[test]
    fn stub_far_outside_phi_window_is_rejected() {
        let cfg = config();
        let sector = Sector::new(&cfg, 0, 2, 3.0, true, false, 0.02, false);
        let stub = Stub::new(
            0,
            sector.phi_centre() + std::f64::consts::PI,
            50.0,
            5.0,
            0.0,
            1.0,
            0,
            0.01,
            0.02,
            3,
            true,
            true,
        );
        assert!(!sector.inside_phi(&stub, &ctx()));
    }

    #[test]
    fn sub_sector_count_matches_config() {
        let cfg = config();
        let sector = Sector::new(&cfg, 0, 0, 3.0, true, true, 0.02, false);
        let stub = Stub::new(0, sector.phi_centre(), 50.0, -40.0, 0.0, 1.0, 0, 0.01, 0.02, 3, true, true);
        assert_eq!(sector.inside_eta_sub_secs(&stub).len(), 3);
    }
}
