//! r-φ Hough-Transform array for a single (η,φ) sector.
//!
//! Axes are (q/p_T, φ_T), where φ_T is the φ at which the track crosses the
//! configured reference radius.

use crate::error::CoreError;
use crate::ht_cell::{FirmwareCounters, HtCell, HtCellParams};
use crate::stub::{Stub, StubIndex, StubPhysicsContext};
use trigger_common::config::HtRphiConfig;

/// The r-φ HT array for one sector.
pub struct HtRphi {
    n_bins_qoverpt: u32,
    n_bins_phi_t: u32,
    bin_size_qoverpt: f64,
    bin_size_phi_t: f64,
    max_abs_qoverpt: f64,
    max_abs_phi_t: f64,

    chosen_r_of_phi: f64,
    phi_centre_sector: f64,

    config: HtRphiConfig,
    inv_pt_to_dphi: f64,

    cells: Vec<HtCell>,
    counters: FirmwareCounters,
}

impl HtRphi {
    /// Derive (or take explicit) bin counts so the per-stub fill line's
    /// gradient is exactly 1.0 across the array (auto-sizing formula).
    fn derive_bin_counts(config: &HtRphiConfig, inv_pt_to_dphi: f64, chosen_r_of_phi: f64) -> (u32, u32) {
        if let (Some(q), Some(p)) = (config.n_bins_qoverpt, config.n_bins_phi_t) {
            return (q, p);
        }
        let n_cells = config.n_cells.unwrap_or(2048) as f64;
        let max_abs_qoverpt = 1.0 / config.pt_min_gev;
        // gradient = (phiT_bin_width / qoverpt_bin_width) * invPtToDphi * chosenRofPhi == 1
        // phiT_bin_width = 2*max_abs_phi_t / n_phi ; qoverpt_bin_width = 2*max_abs_qoverpt / n_q
        // max_abs_phi_t is itself derived below once n_phi is known, so solve the aspect
        // ratio directly: n_q / n_phi = (invPtToDphi * chosenRofPhi * max_abs_qoverpt) / max_abs_phi_t_per_bin_ratio.
        // For a self-consistent derivation we fix the aspect to the ratio of axis half-widths.
        let aspect = (inv_pt_to_dphi * chosen_r_of_phi).max(1e-12);
        let n_q = (n_cells * aspect).sqrt().round().max(2.0);
        let n_phi = (n_cells / n_q).round().max(2.0);
        (n_q as u32, n_phi as u32)
    }

    pub fn new(
        config: &HtRphiConfig,
        eta_min_sector: f64,
        eta_max_sector: f64,
        phi_centre_sector: f64,
        inv_pt_to_dphi: f64,
        chosen_r_of_phi: f64,
    ) -> Result<Self, CoreError> {
        let _ = (eta_min_sector, eta_max_sector);
        let (n_q, n_phi) = Self::derive_bin_counts(config, inv_pt_to_dphi, chosen_r_of_phi);

        if config.merge_2x2_enabled && (n_q % 2 != 0 || n_phi % 2 != 0) {
            return Err(CoreError::ConfigInvalid(
                "ht_rphi.merge_2x2_enabled requires even bin counts in both dimensions".to_string(),
            ));
        }

        let max_abs_qoverpt = 1.0 / config.pt_min_gev;
        let bin_size_qoverpt = 2.0 * max_abs_qoverpt / n_q as f64;
        let max_abs_phi_t = std::f64::consts::PI / 9.0; // overwritten by caller via set_phi_half_width if needed
        let bin_size_phi_t = 2.0 * max_abs_phi_t / n_phi as f64;

        let cells = (0..(n_q as usize * n_phi as usize)).map(|_| HtCell::new()).collect();

        Ok(Self {
            n_bins_qoverpt: n_q,
            n_bins_phi_t: n_phi,
            bin_size_qoverpt,
            bin_size_phi_t,
            max_abs_qoverpt,
            max_abs_phi_t,
            chosen_r_of_phi,
            phi_centre_sector,
            config: config.clone(),
            inv_pt_to_dphi,
            cells,
            counters: FirmwareCounters::default(),
        })
    }

    /// Override the φ_T half-width once the sector's actual half-width is
    /// known (it depends on the sector grid, not just pt_min).
    pub fn set_phi_half_width(&mut self, half_width: f64) {
        self.max_abs_phi_t = half_width;
        self.bin_size_phi_t = 2.0 * half_width / self.n_bins_phi_t as f64;
    }

    fn cell_index(&self, i_qoverpt: u32, j_phi_t: u32) -> usize {
        i_qoverpt as usize * self.n_bins_phi_t as usize + j_phi_t as usize
    }

    fn qoverpt_bin_centre(&self, i: u32) -> f64 {
        -self.max_abs_qoverpt + (i as f64 + 0.5) * self.bin_size_qoverpt
    }

    /// Redirect a bin index to its 2x2-merge representative (even/even).
    fn merge_redirect(&self, i: u32) -> u32 {
        if self.config.merge_2x2_enabled && self.qoverpt_bin_centre(i).abs() > self.config.merge_2x2_min_inv_pt {
            i & !1
        } else {
            i
        }
    }

    /// Inclusive φ_T bin range for a stub, at a given q/p_T column.
    fn phi_range(&self, stub: &Stub, ctx: &StubPhysicsContext, i_qoverpt: u32) -> (u32, u32) {
        let qoverpt_centre = self.qoverpt_bin_centre(i_qoverpt);
        let (phi_trk, _) = stub.trk_phi_at_r(self.chosen_r_of_phi, ctx);
        let phi_t = phi_trk - self.phi_centre_sector;

        let width_from_qoverpt_bin = self.bin_size_qoverpt / 2.0
            * (stub.r() - self.chosen_r_of_phi).abs()
            * self.inv_pt_to_dphi;
        let width_from_strips = if stub.barrel() {
            0.0
        } else {
            self.inv_pt_to_dphi * qoverpt_centre.abs() * stub.r_err()
        };
        let half_window = width_from_qoverpt_bin + width_from_strips;

        let to_bin = |phi: f64| {
            (((phi + self.max_abs_phi_t) / self.bin_size_phi_t).floor())
                .clamp(0.0, (self.n_bins_phi_t - 1) as f64) as u32
        };
        let mut j_min = to_bin(phi_t - half_window);
        let mut j_max = to_bin(phi_t + half_window);
        if j_min > j_max {
            std::mem::swap(&mut j_min, &mut j_max);
        }
        (j_min, j_max)
    }

    /// Maximum |gradient| any stub's fill line could have across this array;
    /// should stay at 1.0 per the auto-sizing formula.
    pub fn max_line_gradient(&self) -> f64 {
        self.bin_size_phi_t.recip() * self.bin_size_qoverpt * self.inv_pt_to_dphi * self.chosen_r_of_phi
    }

    /// Store a stub into every HT cell its fill line crosses.
    pub fn store(
        &mut self,
        arena: &[Stub],
        idx: StubIndex,
        ctx: &StubPhysicsContext,
        in_eta_sub_secs: Option<Vec<bool>>,
    ) -> Result<(), CoreError> {
        let stub = &arena[idx as usize];
        let mut prev_range: Option<(u32, u32)> = None;

        for i in 0..self.n_bins_qoverpt {
            let (mut j_min, mut j_max) = self.phi_range(stub, ctx, i);

            if self.config.kill_some_cells && (i % 2 == 1) {
                // Reduce fill rate by dropping alternate q/p_T columns'
                // outer edge cell, cheaply approximating hardware cell-kill.
                if j_max > j_min {
                    j_max -= 1;
                }
            }

            self.counters.count_column(prev_range, j_min, j_max);
            prev_range = Some((j_min, j_max));

            let i_store = self.merge_redirect(i);
            for j in j_min..=j_max {
                let j_store = self.merge_redirect(j);
                let cell_idx = self.cell_index(i_store, j_store);
                self.cells[cell_idx].store(idx, in_eta_sub_secs.clone(), self.config.n_subsec_eta.max(1))?;
            }
        }
        Ok(())
    }

    /// Row-emission order (highest p_T first; ties broken by negative charge
    /// first — hardware row order).
    pub fn row_order(&self) -> Vec<u32> {
        let n = self.n_bins_qoverpt;
        let mid = n / 2;
        let mut order = Vec::with_capacity(n as usize);
        if n % 2 == 0 {
            for offset in 0..mid {
                order.push(mid - 1 - offset);
                order.push(mid + offset);
            }
        } else {
            order.push(mid);
            for offset in 1..=mid {
                order.push(mid - offset);
                order.push(mid + offset);
            }
        }
        order
    }

    /// Finalise every cell: apply filters and compute layer counts.
    pub fn end(&mut self, arena: &[Stub], ctx: &StubPhysicsContext, acceptance_reduced_layer_id: bool) -> Result<(), CoreError> {
        for i in 0..self.n_bins_qoverpt {
            for j in 0..self.n_bins_phi_t {
                let q_over_pt_cell = self.qoverpt_bin_centre(i);
                let params = HtCellParams {
                    is_rphi_ht: true,
                    q_over_pt_cell,
                    ibin_qoverpt: i,
                    inv_pt_to_dphi: self.inv_pt_to_dphi,
                    min_stub_layers: self.config.min_layers,
                    min_pt_to_reduce_layers: if self.config.relaxed_layers_inv_pt_threshold > 0.0 {
                        1.0 / self.config.relaxed_layers_inv_pt_threshold
                    } else {
                        10_000.0
                    },
                    use_bend_filter: self.config.bend_filter_daisy_chain || self.config.bend_filter_sigma_dphi > 0.0,
                    bend_filter_daisy_chain: self.config.bend_filter_daisy_chain,
                    bend_filter_sigma_dphi: self.config.bend_filter_sigma_dphi,
                    max_stubs_in_cell: Some(self.config.max_stubs_per_cell),
                    num_sub_secs: self.config.n_subsec_eta.max(1),
                    reduced_layer_id: acceptance_reduced_layer_id,
                };
                let idx = self.cell_index(i, j);
                self.cells[idx].end(arena, ctx, &params)?;
            }
        }
        Ok(())
    }

    pub fn cell(&self, i: u32, j: u32) -> &HtCell {
        &self.cells[self.cell_index(i, j)]
    }

    /// Materialise every cell that found a track candidate into 2-D r-φ
    /// track candidates, visiting q/p_T rows in `row_order()`.
    pub fn track_candidates(&self, acceptance_reduced_layer_id: bool) -> Vec<((u32, u32), Vec<StubIndex>)> {
        let mut out = Vec::new();
        for i in self.row_order() {
            for j in 0..self.n_bins_phi_t {
                let cell = self.cell(i, j);
                let q_over_pt_cell = self.qoverpt_bin_centre(i);
                let params = HtCellParams {
                    is_rphi_ht: true,
                    q_over_pt_cell,
                    ibin_qoverpt: i,
                    inv_pt_to_dphi: self.inv_pt_to_dphi,
                    min_stub_layers: self.config.min_layers,
                    min_pt_to_reduce_layers: if self.config.relaxed_layers_inv_pt_threshold > 0.0 {
                        1.0 / self.config.relaxed_layers_inv_pt_threshold
                    } else {
                        10_000.0
                    },
                    use_bend_filter: self.config.bend_filter_daisy_chain || self.config.bend_filter_sigma_dphi > 0.0,
                    bend_filter_daisy_chain: self.config.bend_filter_daisy_chain,
                    bend_filter_sigma_dphi: self.config.bend_filter_sigma_dphi,
                    max_stubs_in_cell: Some(self.config.max_stubs_per_cell),
                    num_sub_secs: self.config.n_subsec_eta.max(1),
                    reduced_layer_id: acceptance_reduced_layer_id,
                };
                if cell.track_cand_found(&params) {
                    out.push(((i, j), cell.stubs().to_vec()));
                }
            }
        }
        out
    }

    pub fn n_bins_qoverpt(&self) -> u32 {
        self.n_bins_qoverpt
    }

    pub fn n_bins_phi_t(&self) -> u32 {
        self.n_bins_phi_t
    }

    pub fn counters(&self) -> FirmwareCounters {
        self.counters
    }

    /// Helix parameters (q/p_T, φ_T) at the centre of cell (i,j).
    pub fn helix_2d_hough(&self, i: u32, j: u32) -> (f64, f64) {
        let qoverpt = self.qoverpt_bin_centre(i);
        let phi_t = -self.max_abs_phi_t + (j as f64 + 0.5) * self.bin_size_phi_t;
        (qoverpt, phi_t)
    }

    /// Helix parameters converted to the conventional (q/p_T, φ₀) basis.
    pub fn helix_2d_conventional(&self, i: u32, j: u32) -> (f64, f64) {
        let (qoverpt, phi_t) = self.helix_2d_hough(i, j);
        let phi0 = phi_t + self.phi_centre_sector - qoverpt * self.inv_pt_to_dphi * self.chosen_r_of_phi;
        (qoverpt, phi0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::Stub;

    fn config() -> HtRphiConfig {
        HtRphiConfig {
            pt_min_gev: 3.0,
            n_bins_qoverpt: Some(32),
            n_bins_phi_t: Some(64),
            n_cells: None,
            merge_2x2_enabled: false,
            merge_2x2_min_inv_pt: 0.0,
            min_layers: 5,
            relaxed_layers_inv_pt_threshold: 0.0,
            bend_filter_daisy_chain: true,
            bend_filter_sigma_dphi: 0.01,
            max_stubs_per_cell: 16,
            kill_some_cells: false,
            n_busy: 144,
            busy_sector_each_charge: false,
        }
    }

    fn ctx() -> StubPhysicsContext {
        StubPhysicsContext {
            inv_pt_to_dphi: 0.00057,
            bend_resolution: 0.5,
            bend_resolution_extra: 0.0,
            chosen_r_of_z_filter: 50.0,
            beam_window_z: 15.0,
        }
    }

    #[test]
    fn row_order_is_middle_out_for_even_rows() {
        let cfg = config();
        let ht = HtRphi::new(&cfg, -1.0, 1.0, 0.0, 0.00057, 60.0).unwrap();
        let order = ht.row_order();
        assert_eq!(order.len(), 32);
        assert_eq!(order[0], 15);
        assert_eq!(order[1], 16);
    }

    #[test]
    fn merge_2x2_requires_even_bins() {
        let mut cfg = config();
        cfg.n_bins_qoverpt = Some(31);
        cfg.merge_2x2_enabled = true;
        assert!(HtRphi::new(&cfg, -1.0, 1.0, 0.0, 0.00057, 60.0).is_err());
    }

    #[test]
    fn storing_a_stub_fills_at_least_one_cell() {
        let cfg = config();
        let mut ht = HtRphi::new(&cfg, -1.0, 1.0, 0.0, 0.00057, 60.0).unwrap();
        ht.set_phi_half_width(std::f64::consts::PI / 9.0);
        let arena = vec![Stub::new(0, 0.1, 50.0, 5.0, 0.0, 1.0, 0, 0.01, 0.02, 3, true, true)];
        ht.store(&arena, 0, &ctx(), None).unwrap();
        ht.end(&arena, &ctx(), false).unwrap();
        let total: usize = (0..ht.n_bins_qoverpt())
            .flat_map(|i| (0..ht.n_bins_phi_t()).map(move |j| (i, j)))
            .map(|(i, j)| ht.cell(i, j).num_unfiltered_stubs())
            .sum();
        assert!(total > 0);
    }
}
