//! Per-hit stub record and the quantities derived from it.
//!
//! A tracker stub is a pair of correlated hits on a stacked module,
//! characterised by its geometric position, its bend (displacement between
//! the two hits, in strip-pitch units), and a set of per-module constants
//! shared by every stub on that module.

use crate::error::CoreError;

/// Location of a stub within the event-wide stub arena.
pub type StubIndex = u32;

/// A single reconstructed tracker stub.
///
/// Stubs are created once per event and are immutable with respect to their
/// physics content; only [`DigitalStub`](crate::digital_stub::DigitalStub)
/// state mutates between sector passes, and that mutation lives on the
/// owning [`crate::sector::Sector`] pass, never here.
#[derive(Debug, Clone)]
pub struct Stub {
    index: StubIndex,

    // --- geometry, optionally overwritten by re-digitisation upstream ---
    phi: f64,
    r: f64,
    z: f64,

    // --- bend and its interpretation ---
    bend: f64,
    bend_in_frontend: f64,
    num_merged_bend: u32,
    dphi_over_bend: f64,
    dphi: f64,
    min_qoverpt_bin: u32,
    max_qoverpt_bin: u32,

    // --- per-module constants shared by every stub on this module ---
    id_det: u32,
    r_err: f64,
    z_err: f64,
    module_min_r: f64,
    module_max_r: f64,
    module_min_phi: f64,
    module_max_phi: f64,
    module_min_z: f64,
    module_max_z: f64,
    pitch_over_sep: f64,
    iphi: u32,
    ps_module: bool,
    layer_id: u16,
    endcap_ring: u16,
    barrel: bool,
    sigma_perp: f64,
    sigma_par: f64,
    strip_pitch: f64,
    strip_length: f64,
    n_strips: u32,
    sensor_width: f64,

    frontend_pass: bool,
    stub_failed_data_corr_window: bool,

    /// Tracking-particle association indices, populated by an external truth
    /// layer for efficiency bookkeeping. No in-scope algorithm reads this.
    pub assoc_truth: Vec<u32>,
}

/// Physics constants needed to derive per-stub quantities; supplied by the
/// configuration record rather than duplicated per stub.
#[derive(Debug, Clone, Copy)]
pub struct StubPhysicsContext {
    pub inv_pt_to_dphi: f64,
    pub bend_resolution: f64,
    pub bend_resolution_extra: f64,
    pub chosen_r_of_z_filter: f64,
    pub beam_window_z: f64,
}

impl Stub {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: StubIndex,
        phi: f64,
        r: f64,
        z: f64,
        bend: f64,
        dphi_over_bend: f64,
        id_det: u32,
        r_err: f64,
        z_err: f64,
        layer_id: u16,
        barrel: bool,
        ps_module: bool,
    ) -> Self {
        Self {
            index,
            phi,
            r,
            z,
            bend,
            bend_in_frontend: bend,
            num_merged_bend: 1,
            dphi_over_bend,
            dphi: dphi_over_bend * bend,
            min_qoverpt_bin: 0,
            max_qoverpt_bin: 0,
            id_det,
            r_err,
            z_err,
            module_min_r: r,
            module_max_r: r,
            module_min_phi: phi,
            module_max_phi: phi,
            module_min_z: z,
            module_max_z: z,
            pitch_over_sep: 1.0,
            iphi: 0,
            ps_module,
            layer_id,
            endcap_ring: 0,
            barrel,
            sigma_perp: 0.0,
            sigma_par: 0.0,
            strip_pitch: 0.0,
            strip_length: 0.0,
            n_strips: 0,
            sensor_width: 0.0,
            frontend_pass: true,
            stub_failed_data_corr_window: false,
            assoc_truth: Vec::new(),
        }
    }

    pub fn index(&self) -> StubIndex {
        self.index
    }
    pub fn phi(&self) -> f64 {
        self.phi
    }
    pub fn r(&self) -> f64 {
        self.r
    }
    pub fn z(&self) -> f64 {
        self.z
    }
    pub fn bend(&self) -> f64 {
        self.bend
    }
    pub fn num_merged_bend(&self) -> u32 {
        self.num_merged_bend
    }
    pub fn id_det(&self) -> u32 {
        self.id_det
    }
    pub fn r_err(&self) -> f64 {
        self.r_err
    }
    pub fn z_err(&self) -> f64 {
        self.z_err
    }
    pub fn barrel(&self) -> bool {
        self.barrel
    }
    pub fn ps_module(&self) -> bool {
        self.ps_module
    }
    pub fn layer_id(&self) -> u16 {
        self.layer_id
    }
    pub fn frontend_pass(&self) -> bool {
        self.frontend_pass
    }
    pub fn min_qoverpt_bin(&self) -> u32 {
        self.min_qoverpt_bin
    }
    pub fn max_qoverpt_bin(&self) -> u32 {
        self.max_qoverpt_bin
    }
    pub fn dphi_over_bend(&self) -> f64 {
        self.dphi_over_bend
    }
    pub fn dphi(&self) -> f64 {
        self.dphi
    }

    /// Reduced layer id, packed into at most
    /// [`trigger_common::consts::REDUCED_LAYER_ID_BITS`] bits.
    pub fn layer_id_reduced(&self) -> u8 {
        match self.layer_id {
            1 => 0,
            2 => 1,
            3 => 2,
            4 | 11 | 21 => 3,
            5 | 12 | 22 => 4,
            6 | 13 | 23 => 5,
            14 | 24 => 6,
            15 | 25 => 7,
            _ => 7,
        }
    }

    /// z at the chosen r-z filter reference radius.
    pub fn z_trk(&self, ctx: &StubPhysicsContext) -> f64 {
        ctx.chosen_r_of_z_filter * self.z / self.r
    }

    /// Estimated resolution on [`Stub::z_trk`].
    pub fn z_trk_res(&self, ctx: &StubPhysicsContext) -> f64 {
        let r_ref = ctx.chosen_r_of_z_filter;
        (ctx.beam_window_z * (r_ref - self.r) / self.r).abs()
            + (r_ref * self.z_err / self.r).abs()
            + (r_ref * self.r_err * self.z / (self.r * self.r)).abs()
    }

    pub fn eta(&self) -> f64 {
        (self.z / self.r).asinh()
    }

    /// Bend resolution, degraded by the number of raw bend values merged
    /// into this one during front-end bit-width reduction.
    pub fn bend_res(&self, ctx: &StubPhysicsContext) -> f64 {
        ctx.bend_resolution + (self.num_merged_bend as f64 - 1.0) * ctx.bend_resolution_extra
    }

    pub fn dphi_res(&self, ctx: &StubPhysicsContext) -> f64 {
        self.dphi_over_bend.abs() * self.bend_res(ctx)
    }

    /// q/p_T estimated purely from the stub's bend.
    pub fn q_over_pt(&self, ctx: &StubPhysicsContext) -> f64 {
        self.q_over_pt_over_bend(ctx) * self.bend
    }

    pub fn q_over_pt_over_bend(&self, ctx: &StubPhysicsContext) -> f64 {
        self.dphi_over_bend / (self.r * ctx.inv_pt_to_dphi)
    }

    /// Estimated track angle at the beam-line, from bend alone.
    pub fn beta(&self) -> f64 {
        self.phi + self.dphi
    }

    /// Estimated φ at which the track crosses radius `rad`, plus its
    /// uncertainty from endcap strip length (zero in barrel modules).
    pub fn trk_phi_at_r(&self, rad: f64, ctx: &StubPhysicsContext) -> (f64, f64) {
        let phi_at_r = self.phi + self.dphi * (1.0 - rad / self.r);
        let res = if self.barrel {
            0.0
        } else {
            self.dphi_res(ctx) * (1.0 - rad / self.r).abs()
        };
        (phi_at_r, res)
    }

    /// Compute the inclusive q/p_T bin range in the HT array consistent
    /// with this stub's bend, given the array's bin width and bin count.
    pub fn calc_q_over_pt_range(
        &mut self,
        ctx: &StubPhysicsContext,
        bin_width: f64,
        n_bins: u32,
    ) -> Result<(), CoreError> {
        if bin_width <= 0.0 || n_bins == 0 {
            return Err(CoreError::ConfigInvalid(
                "calc_q_over_pt_range: bin_width and n_bins must be positive".to_string(),
            ));
        }
        let centre = self.q_over_pt(ctx);
        let half_window = self.q_over_pt_res(ctx).max(bin_width / 2.0);
        let half_bins = n_bins as f64 / 2.0;
        let to_bin = |q: f64| ((q / bin_width) + half_bins).floor().clamp(0.0, (n_bins - 1) as f64) as u32;
        self.min_qoverpt_bin = to_bin(centre - half_window);
        self.max_qoverpt_bin = to_bin(centre + half_window);
        if self.min_qoverpt_bin > self.max_qoverpt_bin {
            std::mem::swap(&mut self.min_qoverpt_bin, &mut self.max_qoverpt_bin);
        }
        Ok(())
    }

    pub fn q_over_pt_res(&self, ctx: &StubPhysicsContext) -> f64 {
        self.q_over_pt_over_bend(ctx) * self.bend_res(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StubPhysicsContext {
        StubPhysicsContext {
            inv_pt_to_dphi: 0.0057,
            bend_resolution: 0.5,
            bend_resolution_extra: 0.0,
            chosen_r_of_z_filter: 50.0,
            beam_window_z: 15.0,
        }
    }

    fn sample_stub() -> Stub {
        Stub::new(0, 0.1, 50.0, 25.0, 0.0, 1.0, 7, 0.01, 0.02, 3, true, true)
    }

    #[test]
    fn zero_bend_gives_zero_qoverpt() {
        let stub = sample_stub();
        assert_eq!(stub.q_over_pt(&ctx()), 0.0);
    }

    #[test]
    fn z_trk_scales_to_reference_radius() {
        let stub = sample_stub();
        let c = ctx();
        assert!((stub.z_trk(&c) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn reduced_layer_id_fits_in_three_bits() {
        for layer in [1u16, 2, 3, 4, 11, 21, 5, 12, 22, 6, 13, 23, 14, 24, 15, 25] {
            let mut stub = sample_stub();
            stub.layer_id = layer;
            assert!(stub.layer_id_reduced() <= trigger_common::consts::MAX_REDUCED_LAYER_ID);
        }
    }

    #[test]
    fn qoverpt_range_is_ordered() {
        let mut stub = sample_stub();
        stub.bend = 2.0;
        stub.calc_q_over_pt_range(&ctx(), 0.05, 32).unwrap();
        assert!(stub.min_qoverpt_bin() <= stub.max_qoverpt_bin());
    }
}
