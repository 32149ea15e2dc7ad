//! Track candidates at each stage of reconstruction: 2-D, 3-D, and fitted.
//!
//! Stubs are referenced by event-arena index rather than owned, consistent
//! with [`crate::stub::Stub`]'s arena-ownership model.

use crate::stub::StubIndex;

/// A 2-D track candidate, living in either the r-φ or the r-z plane.
#[derive(Debug, Clone)]
pub struct L1Track2D {
    stubs: Vec<StubIndex>,
    cell_location: (u32, u32),
    /// (q/p_T, φ_T) if `is_rphi`, else (z0, z_at_chosen_r).
    helix: (f64, f64),
    is_rphi: bool,
    /// (estZ0, estTanLambda) hint supplied by an r-z filter, if any.
    rz_filter_estimate: Option<(f64, f64)>,
}

impl L1Track2D {
    pub fn new_rphi(stubs: Vec<StubIndex>, cell_location: (u32, u32), helix: (f64, f64)) -> Self {
        Self {
            stubs,
            cell_location,
            helix,
            is_rphi: true,
            rz_filter_estimate: None,
        }
    }

    pub fn new_rz(stubs: Vec<StubIndex>, cell_location: (u32, u32), helix: (f64, f64)) -> Self {
        Self {
            stubs,
            cell_location,
            helix,
            is_rphi: false,
            rz_filter_estimate: None,
        }
    }

    pub fn stubs(&self) -> &[StubIndex] {
        &self.stubs
    }
    pub fn cell_location(&self) -> (u32, u32) {
        self.cell_location
    }
    pub fn helix(&self) -> (f64, f64) {
        self.helix
    }
    pub fn is_rphi(&self) -> bool {
        self.is_rphi
    }
    pub fn q_over_pt(&self) -> f64 {
        self.helix.0
    }
    pub fn phi_t(&self) -> f64 {
        self.helix.1
    }
    pub fn rz_filter_estimate(&self) -> Option<(f64, f64)> {
        self.rz_filter_estimate
    }
    pub fn set_rz_filter_estimate(&mut self, est: (f64, f64)) {
        self.rz_filter_estimate = Some(est);
    }
}

/// A fully assembled 3-D track candidate.
#[derive(Debug, Clone)]
pub struct L1Track3D {
    stubs: Vec<StubIndex>,
    cell_location_rphi: (u32, u32),
    helix_rphi: (f64, f64),
    cell_location_rz: (u32, u32),
    helix_rz: (f64, f64),
    i_phi_sec: u32,
    i_eta_reg: u32,
}

impl L1Track3D {
    pub fn new(
        stubs: Vec<StubIndex>,
        cell_location_rphi: (u32, u32),
        helix_rphi: (f64, f64),
        cell_location_rz: (u32, u32),
        helix_rz: (f64, f64),
        i_phi_sec: u32,
        i_eta_reg: u32,
    ) -> Self {
        Self {
            stubs,
            cell_location_rphi,
            helix_rphi,
            cell_location_rz,
            helix_rz,
            i_phi_sec,
            i_eta_reg,
        }
    }

    pub fn stubs(&self) -> &[StubIndex] {
        &self.stubs
    }
    pub fn num_stubs(&self) -> usize {
        self.stubs.len()
    }
    pub fn cell_location_rphi(&self) -> (u32, u32) {
        self.cell_location_rphi
    }
    pub fn cell_location_rz(&self) -> (u32, u32) {
        self.cell_location_rz
    }
    pub fn i_phi_sec(&self) -> u32 {
        self.i_phi_sec
    }
    pub fn i_eta_reg(&self) -> u32 {
        self.i_eta_reg
    }

    pub fn q_over_pt(&self) -> f64 {
        self.helix_rphi.0
    }
    pub fn charge(&self) -> f64 {
        if self.q_over_pt() > 0.0 { 1.0 } else { -1.0 }
    }
    pub fn inv_pt(&self) -> f64 {
        self.q_over_pt().abs()
    }
    pub fn pt(&self) -> f64 {
        1.0 / (1.0e-6 + self.inv_pt())
    }
    /// The Hough Transform assumes d0 = 0.
    pub fn d0(&self) -> f64 {
        0.0
    }
    pub fn phi0(&self) -> f64 {
        self.helix_rphi.1
    }
    pub fn z0(&self) -> f64 {
        self.helix_rz.0
    }
    pub fn tan_lambda(&self) -> f64 {
        self.helix_rz.1
    }
    pub fn theta(&self) -> f64 {
        (1.0f64).atan2(self.tan_lambda())
    }
    pub fn eta(&self) -> f64 {
        -((0.5 * self.theta()).tan()).ln()
    }

    /// φ at which the track crosses `r_ref_phi`.
    pub fn phi_at_r(&self, inv_pt_to_dphi: f64, r_ref_phi: f64) -> f64 {
        let mut phi = self.phi0() - inv_pt_to_dphi * r_ref_phi * self.q_over_pt();
        while phi > std::f64::consts::PI {
            phi -= 2.0 * std::f64::consts::PI;
        }
        while phi < -std::f64::consts::PI {
            phi += 2.0 * std::f64::consts::PI;
        }
        phi
    }

    /// z at which the track crosses `r_ref_z` (neglects d0 and curvature).
    pub fn z_at_r(&self, r_ref_z: f64) -> f64 {
        self.z0() + r_ref_z * self.tan_lambda()
    }

    /// Merge two tracks into one whose stub set is the union of both.
    ///
    /// Non-commutative by design: the HT cell and helix are inherited from
    /// `self` (the left operand) — this makes merge order observable.
    pub fn merge(&self, other: &L1Track3D) -> L1Track3D {
        let mut stubs = self.stubs.clone();
        for &s in &other.stubs {
            if !stubs.contains(&s) {
                stubs.push(s);
            }
        }
        L1Track3D {
            stubs,
            cell_location_rphi: self.cell_location_rphi,
            helix_rphi: self.helix_rphi,
            cell_location_rz: self.cell_location_rz,
            helix_rz: self.helix_rz,
            i_phi_sec: self.i_phi_sec,
            i_eta_reg: self.i_eta_reg,
        }
    }
}

/// A fitted track: the parent 3-D candidate refined by a [`crate::fitter`]
/// back-end.
#[derive(Debug, Clone)]
pub struct L1FittedTrack {
    stubs: Vec<StubIndex>,
    source_cell_rphi: (u32, u32),
    q_over_pt: f64,
    d0: f64,
    phi0: f64,
    z0: f64,
    tan_lambda: f64,
    chi_sq: f64,
    n_par: u8,
    i_phi_sec: u32,
    i_eta_reg: u32,
    accepted: bool,
}

impl L1FittedTrack {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stubs: Vec<StubIndex>,
        source_cell_rphi: (u32, u32),
        q_over_pt: f64,
        d0: f64,
        phi0: f64,
        z0: f64,
        tan_lambda: f64,
        chi_sq: f64,
        n_par: u8,
        i_phi_sec: u32,
        i_eta_reg: u32,
        accepted: bool,
    ) -> Self {
        Self {
            stubs,
            source_cell_rphi,
            q_over_pt,
            d0,
            phi0,
            z0,
            tan_lambda,
            chi_sq,
            n_par,
            i_phi_sec,
            i_eta_reg,
            accepted,
        }
    }

    pub fn stubs(&self) -> &[StubIndex] {
        &self.stubs
    }
    pub fn num_stubs(&self) -> usize {
        self.stubs.len()
    }
    pub fn q_over_pt(&self) -> f64 {
        self.q_over_pt
    }
    pub fn d0(&self) -> f64 {
        self.d0
    }
    pub fn phi0(&self) -> f64 {
        self.phi0
    }
    pub fn z0(&self) -> f64 {
        self.z0
    }
    pub fn tan_lambda(&self) -> f64 {
        self.tan_lambda
    }
    pub fn chi_sq(&self) -> f64 {
        self.chi_sq
    }
    pub fn n_par(&self) -> u8 {
        self.n_par
    }
    pub fn num_dof(&self) -> i32 {
        2 * self.stubs.len() as i32 - self.n_par as i32
    }
    pub fn chi_sq_per_dof(&self) -> f64 {
        let dof = self.num_dof();
        if dof <= 0 { f64::INFINITY } else { self.chi_sq / dof as f64 }
    }
    pub fn accepted(&self) -> bool {
        self.accepted
    }
    pub fn i_phi_sec(&self) -> u32 {
        self.i_phi_sec
    }
    pub fn i_eta_reg(&self) -> u32 {
        self.i_eta_reg
    }
    pub fn source_cell_rphi(&self) -> (u32, u32) {
        self.source_cell_rphi
    }
    pub fn charge_sign(&self) -> f64 {
        if self.q_over_pt > 0.0 { 1.0 } else { -1.0 }
    }

    /// Does the fitted helix map back to the HT cell it was found in?
    /// (uses literal index equality, not a windowed comparison.)
    pub fn cell_consistent(
        &self,
        bin_size_qoverpt: f64,
        bin_size_phi_t: f64,
        max_abs_qoverpt: f64,
        max_abs_phi_t: f64,
        phi_centre_sector: f64,
        inv_pt_to_dphi: f64,
        r_ref_phi: f64,
    ) -> bool {
        let phi_t = self.phi0 - phi_centre_sector + inv_pt_to_dphi * r_ref_phi * self.q_over_pt;
        let i = ((self.q_over_pt + max_abs_qoverpt) / bin_size_qoverpt).floor();
        let j = ((phi_t + max_abs_phi_t) / bin_size_phi_t).floor();
        i as i64 == self.source_cell_rphi.0 as i64 && j as i64 == self.source_cell_rphi.1 as i64
    }

    /// Does the fitted trajectory stay within the sector's (φ, z) window?
    pub fn sector_consistent(
        &self,
        phi_centre: f64,
        half_width: f64,
        z_outer_min: f64,
        z_outer_max: f64,
        r_ref_z: f64,
    ) -> bool {
        let mut dphi = self.phi0 - phi_centre;
        while dphi > std::f64::consts::PI {
            dphi -= 2.0 * std::f64::consts::PI;
        }
        while dphi < -std::f64::consts::PI {
            dphi += 2.0 * std::f64::consts::PI;
        }
        let z_at_ref = self.z0 + r_ref_z * self.tan_lambda;
        dphi.abs() <= half_width && z_at_ref >= z_outer_min && z_at_ref <= z_outer_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_left_biased_and_unions_stubs() {
        let a = L1Track3D::new(vec![1, 2, 3], (1, 1), (0.1, 0.2), (0, 0), (0.0, 0.5), 0, 0);
        let b = L1Track3D::new(vec![3, 4, 5], (2, 2), (0.3, 0.4), (1, 1), (1.0, 0.6), 0, 0);
        let merged = a.merge(&b);
        assert_eq!(merged.cell_location_rphi(), (1, 1));
        assert_eq!(merged.q_over_pt(), 0.1);
        assert_eq!(merged.stubs().len(), 5);

        let merged_rev = b.merge(&a);
        assert_eq!(merged_rev.cell_location_rphi(), (2, 2));
        assert_ne!(merged.q_over_pt(), merged_rev.q_over_pt());
    }

    #[test]
    fn fitted_track_dof_and_chisq_per_dof() {
        let f = L1FittedTrack::new(vec![1, 2, 3, 4, 5], (0, 0), 0.01, 0.0, 0.1, 0.0, 0.5, 4.0, 4, 0, 0, true);
        assert_eq!(f.num_dof(), 6);
        assert!((f.chi_sq_per_dof() - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn charge_sign_matches_qoverpt_sign() {
        let pos = L1Track3D::new(vec![1], (0, 0), (0.05, 0.0), (0, 0), (0.0, 0.0), 0, 0);
        let neg = L1Track3D::new(vec![1], (0, 0), (-0.05, 0.0), (0, 0), (0.0, 0.0), 0, 0);
        assert_eq!(pos.charge(), 1.0);
        assert_eq!(neg.charge(), -1.0);
    }
}
