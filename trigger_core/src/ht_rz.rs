//! r-z Hough-Transform array, instantiated per r-φ track candidate.
//!
//! Axes are (z0, z_trk), where z_trk is the z at which the track crosses the
//! chosen r-z reference radius. Mirrors [`crate::ht_rphi::HtRphi`]'s fill
//! logic with barrel/endcap strip-length widening swapped for their r-z
//! counterparts.

use crate::error::CoreError;
use crate::ht_cell::{FirmwareCounters, HtCell, HtCellParams};
use crate::stub::{Stub, StubIndex, StubPhysicsContext};
use trigger_common::config::HtRzConfig;

/// The r-z HT array, seeded with the q/p_T prior taken from the r-φ
/// candidate that spawned it.
pub struct HtRz {
    n_bins_z0: u32,
    n_bins_ztrk: u32,
    max_abs_z0: f64,
    min_ztrk: f64,
    max_ztrk: f64,
    bin_size_z0: f64,
    bin_size_ztrk: f64,

    chosen_r_of_z: f64,
    q_over_pt: f64,
    handle_strips: bool,
    kill_some_cells: bool,

    cells: Vec<HtCell>,
    counters: FirmwareCounters,
}

impl HtRz {
    pub fn new(
        config: &HtRzConfig,
        max_abs_z0: f64,
        min_ztrk: f64,
        max_ztrk: f64,
        chosen_r_of_z: f64,
        q_over_pt: f64,
    ) -> Result<Self, CoreError> {
        let (n_z0, n_ztrk) = if let (Some(a), Some(b)) = (config.n_bins_z0, config.n_bins_zref) {
            (a, b)
        } else {
            let n_cells = config.n_cells.unwrap_or(256) as f64;
            let aspect = (2.0 * max_abs_z0 / (max_ztrk - min_ztrk)).max(1e-9);
            let n_z0 = (n_cells * aspect).sqrt().round().max(2.0);
            let n_ztrk = (n_cells / n_z0).round().max(2.0);
            (n_z0 as u32, n_ztrk as u32)
        };

        let bin_size_z0 = 2.0 * max_abs_z0 / n_z0 as f64;
        let bin_size_ztrk = (max_ztrk - min_ztrk) / n_ztrk as f64;
        let cells = (0..(n_z0 as usize * n_ztrk as usize)).map(|_| HtCell::new()).collect();

        Ok(Self {
            n_bins_z0: n_z0,
            n_bins_ztrk: n_ztrk,
            max_abs_z0,
            min_ztrk,
            max_ztrk,
            bin_size_z0,
            bin_size_ztrk,
            chosen_r_of_z,
            q_over_pt,
            handle_strips: config.handle_strips,
            kill_some_cells: config.kill_some_cells,
            cells,
            counters: FirmwareCounters::default(),
        })
    }

    fn cell_index(&self, i_z0: u32, j_ztrk: u32) -> usize {
        i_z0 as usize * self.n_bins_ztrk as usize + j_ztrk as usize
    }

    fn z0_bin_centre(&self, i: u32) -> f64 {
        -self.max_abs_z0 + (i as f64 + 0.5) * self.bin_size_z0
    }

    /// Inclusive z_trk bin range for a stub at a given z0 column.
    fn ztrk_range(&self, stub: &Stub, i_z0: u32) -> (u32, u32) {
        let z0 = self.z0_bin_centre(i_z0);
        let line_ztrk = z0 + (self.chosen_r_of_z / stub.r()) * (stub.z() - z0);

        let width_from_z0_bin = self.bin_size_z0 / 2.0 * (self.chosen_r_of_z / stub.r() - 1.0).abs();
        let width_from_strips = if !self.handle_strips {
            0.0
        } else if stub.barrel() {
            self.chosen_r_of_z / stub.r() * stub.z_err()
        } else {
            (self.chosen_r_of_z / stub.r()) * stub.r_err() * (stub.z() / stub.r())
        };
        let half_window = width_from_z0_bin + width_from_strips;

        let to_bin = |z: f64| {
            (((z - self.min_ztrk) / self.bin_size_ztrk).floor())
                .clamp(0.0, (self.n_bins_ztrk - 1) as f64) as u32
        };
        let mut j_min = to_bin(line_ztrk - half_window);
        let mut j_max = to_bin(line_ztrk + half_window);
        if j_min > j_max {
            std::mem::swap(&mut j_min, &mut j_max);
        }
        (j_min, j_max)
    }

    pub fn store(&mut self, arena: &[Stub], idx: StubIndex) -> Result<(), CoreError> {
        let stub = &arena[idx as usize];
        let mut prev_range: Option<(u32, u32)> = None;

        for i in 0..self.n_bins_z0 {
            let (mut j_min, mut j_max) = self.ztrk_range(stub, i);
            if self.kill_some_cells && i % 2 == 1 && j_max > j_min {
                j_max -= 1;
            }

            self.counters.count_column(prev_range, j_min, j_max);
            prev_range = Some((j_min, j_max));

            for j in j_min..=j_max {
                let cell_idx = self.cell_index(i, j);
                self.cells[cell_idx].store(idx, None, 1)?;
            }
        }
        Ok(())
    }

    /// Maximum |gradient| any stub's fill line could have across this array
    /// (mirrors [`crate::ht_rphi::HtRphi::max_line_gradient`]).
    pub fn max_line_gradient(&self) -> f64 {
        self.bin_size_ztrk.recip() * self.bin_size_z0
    }

    /// Firmware-constraint violation counters accumulated across every
    /// `store()` call so far.
    pub fn counters(&self) -> FirmwareCounters {
        self.counters
    }

    pub fn end(
        &mut self,
        arena: &[Stub],
        ctx: &StubPhysicsContext,
        min_layers: u8,
        reduced_layer_id: bool,
    ) -> Result<(), CoreError> {
        let params = HtCellParams {
            is_rphi_ht: false,
            q_over_pt_cell: self.q_over_pt,
            ibin_qoverpt: 0,
            inv_pt_to_dphi: 0.0,
            min_stub_layers: min_layers,
            min_pt_to_reduce_layers: f64::INFINITY,
            use_bend_filter: false,
            bend_filter_daisy_chain: true,
            bend_filter_sigma_dphi: 0.0,
            max_stubs_in_cell: None,
            num_sub_secs: 1,
            reduced_layer_id,
        };
        for i in 0..self.n_bins_z0 {
            for j in 0..self.n_bins_ztrk {
                let idx = self.cell_index(i, j);
                self.cells[idx].end(arena, ctx, &params)?;
            }
        }
        Ok(())
    }

    pub fn cell(&self, i: u32, j: u32) -> &HtCell {
        &self.cells[self.cell_index(i, j)]
    }
    pub fn n_bins_z0(&self) -> u32 {
        self.n_bins_z0
    }
    pub fn n_bins_ztrk(&self) -> u32 {
        self.n_bins_ztrk
    }

    /// (z0, z_trk) at the centre of cell (i,j).
    pub fn helix_2d_hough(&self, i: u32, j: u32) -> (f64, f64) {
        let z0 = self.z0_bin_centre(i);
        let ztrk = self.min_ztrk + (j as f64 + 0.5) * self.bin_size_ztrk;
        (z0, ztrk)
    }

    /// Helix parameters converted to the conventional (z0, tan λ) basis.
    pub fn helix_2d_conventional(&self, i: u32, j: u32) -> (f64, f64) {
        let (z0, ztrk) = self.helix_2d_hough(i, j);
        let tan_lambda = (ztrk - z0) / self.chosen_r_of_z;
        (z0, tan_lambda)
    }

    /// Materialise every cell meeting the validity predicate into 2-D r-z
    /// track candidates.
    pub fn track_candidates(&self, min_layers: u8) -> Vec<((u32, u32), Vec<StubIndex>)> {
        let mut out = Vec::new();
        for i in 0..self.n_bins_z0 {
            for j in 0..self.n_bins_ztrk {
                let cell = self.cell(i, j);
                if cell.num_layers() >= min_layers {
                    out.push(((i, j), cell.stubs().to_vec()));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::Stub;

    fn config() -> HtRzConfig {
        HtRzConfig {
            enabled: true,
            n_bins_z0: Some(16),
            n_bins_zref: Some(16),
            n_cells: None,
            handle_strips: false,
            kill_some_cells: false,
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
    fn storing_a_stub_fills_at_least_one_cell() {
        let cfg = config();
        let mut ht = HtRz::new(&cfg, 15.0, -30.0, 30.0, 50.0, 0.0).unwrap();
        let arena = vec![Stub::new(0, 0.1, 50.0, 25.0, 0.0, 1.0, 0, 0.01, 0.02, 3, true, true)];
        ht.store(&arena, 0).unwrap();
        ht.end(&arena, &ctx(), 1, false).unwrap();
        let total: usize = (0..ht.n_bins_z0())
            .flat_map(|i| (0..ht.n_bins_ztrk()).map(move |j| (i, j)))
            .map(|(i, j)| ht.cell(i, j).num_unfiltered_stubs())
            .sum();
        assert!(total > 0);
    }

    #[test]
    fn conventional_helix_matches_line_through_origin() {
        let cfg = config();
        let ht = HtRz::new(&cfg, 15.0, -30.0, 30.0, 50.0, 0.0).unwrap();
        let (z0, tan_lambda) = ht.helix_2d_conventional(8, 8);
        let (z0_h, ztrk_h) = ht.helix_2d_hough(8, 8);
        assert!((z0 - z0_h).abs() < 1e-9);
        assert!((tan_lambda - (ztrk_h - z0_h) / 50.0).abs() < 1e-9);
    }
}
