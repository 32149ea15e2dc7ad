//! A single accumulator cell in a Hough-Transform array.
//!
//! Holds the raw stub list in insertion order, then on `end()` derives a
//! filtered list (bend filter, then max-stub-count filter) and the filtered
//! layer counts, overall and per η-sub-sector.

use crate::error::CoreError;
use crate::stub::{Stub, StubIndex, StubPhysicsContext};
use std::collections::HashSet;

/// Firmware-constraint violation counters, reset at the start of every
/// sector's `end()` pass (reset per `end()` pass). Shared by both
/// HT arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirmwareCounters {
    pub errors_type_a: u64,
    pub errors_type_b: u64,
    pub normalisation: u64,
}

impl FirmwareCounters {
    pub fn frac_errors_type_a(&self) -> f64 {
        if self.normalisation == 0 {
            0.0
        } else {
            self.errors_type_a as f64 / self.normalisation as f64
        }
    }

    pub fn frac_errors_type_b(&self) -> f64 {
        if self.normalisation == 0 {
            0.0
        } else {
            self.errors_type_b as f64 / self.normalisation as f64
        }
    }

    /// Count one column's fill against the previous column's fill
    /// (firmware-constraint monitoring: NE/E/SE chaining, ≤2 cells/column).
    pub fn count_column(&mut self, prev: Option<(u32, u32)>, j_min: u32, j_max: u32) {
        self.normalisation += 1;
        if j_max > j_min + 1 {
            self.errors_type_b += 1;
        }
        if let Some((prev_min, prev_max)) = prev {
            let ok = j_min + 1 >= prev_min && j_max <= prev_max + 1;
            if !ok {
                self.errors_type_a += 1;
            }
        }
    }
}

/// Configuration for one cell's `end()` pass.
#[derive(Debug, Clone, Copy)]
pub struct HtCellParams {
    pub is_rphi_ht: bool,
    pub q_over_pt_cell: f64,
    pub ibin_qoverpt: u32,
    pub inv_pt_to_dphi: f64,
    pub min_stub_layers: u8,
    pub min_pt_to_reduce_layers: f64,
    pub use_bend_filter: bool,
    pub bend_filter_daisy_chain: bool,
    pub bend_filter_sigma_dphi: f64,
    pub max_stubs_in_cell: Option<usize>,
    pub num_sub_secs: u8,
    pub reduced_layer_id: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HtCell {
    raw_stubs: Vec<StubIndex>,
    sub_sectors: Vec<Vec<bool>>,

    filtered_stubs: Vec<StubIndex>,
    num_filtered_layers: u8,
    num_filtered_layers_best_sub_sec: u8,
}

fn count_layers(arena: &[Stub], indices: &[StubIndex], reduced: bool) -> u8 {
    let mut seen = HashSet::new();
    for &idx in indices {
        let stub = &arena[idx as usize];
        let key = if reduced {
            stub.layer_id_reduced() as u16
        } else {
            stub.layer_id()
        };
        seen.insert(key);
    }
    seen.len() as u8
}

impl HtCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a stub, optionally noting which η sub-sectors it is consistent
    /// with. `in_sub_secs.len()` must equal `num_sub_secs` when given.
    pub fn store(
        &mut self,
        stub: StubIndex,
        in_sub_secs: Option<Vec<bool>>,
        num_sub_secs: u8,
    ) -> Result<(), CoreError> {
        self.raw_stubs.push(stub);
        if let Some(mask) = in_sub_secs {
            if mask.len() != num_sub_secs as usize {
                return Err(CoreError::InternalConsistencyViolation(
                    "HTcell::store: sub-sector mask length mismatch".to_string(),
                ));
            }
            self.sub_sectors.push(mask);
        }
        Ok(())
    }

    pub fn num_unfiltered_stubs(&self) -> usize {
        self.raw_stubs.len()
    }

    pub fn stubs(&self) -> &[StubIndex] {
        &self.filtered_stubs
    }

    pub fn num_stubs(&self) -> usize {
        self.filtered_stubs.len()
    }

    pub fn num_layers(&self) -> u8 {
        self.num_filtered_layers
    }

    pub fn num_layers_sub_sec(&self) -> u8 {
        self.num_filtered_layers_best_sub_sec
    }

    fn bend_filter(
        &self,
        arena: &[Stub],
        ctx: &StubPhysicsContext,
        params: &HtCellParams,
    ) -> Vec<StubIndex> {
        self.raw_stubs
            .iter()
            .copied()
            .filter(|&idx| {
                let stub = &arena[idx as usize];
                if params.bend_filter_daisy_chain {
                    stub.min_qoverpt_bin() <= params.ibin_qoverpt
                        && params.ibin_qoverpt <= stub.max_qoverpt_bin()
                } else {
                    let predicted_dphi = params.inv_pt_to_dphi * stub.r() * params.q_over_pt_cell;
                    (stub.dphi() - predicted_dphi).abs() < stub.dphi_res(ctx).max(params.bend_filter_sigma_dphi)
                }
            })
            .collect()
    }

    fn max_stub_count_filter(stubs: Vec<StubIndex>, max_stubs: usize) -> Vec<StubIndex> {
        if stubs.len() <= max_stubs {
            return stubs;
        }
        let drop = stubs.len() - max_stubs;
        stubs.into_iter().skip(drop).collect()
    }

    /// Apply filters and compute layer counts. Must be called once, after
    /// all `store()` calls for this cell.
    pub fn end(
        &mut self,
        arena: &[Stub],
        ctx: &StubPhysicsContext,
        params: &HtCellParams,
    ) -> Result<(), CoreError> {
        let mut filtered = self.raw_stubs.clone();
        if params.is_rphi_ht && params.use_bend_filter {
            filtered = self.bend_filter(arena, ctx, params);
        }
        if let Some(max_stubs) = params.max_stubs_in_cell {
            filtered = Self::max_stub_count_filter(filtered, max_stubs);
        }
        self.filtered_stubs = filtered;
        self.num_filtered_layers = count_layers(arena, &self.filtered_stubs, params.reduced_layer_id);

        if params.num_sub_secs > 1 {
            if self.sub_sectors.len() != self.raw_stubs.len() {
                return Err(CoreError::InternalConsistencyViolation(
                    "HTcell::end: sub-sector masks missing for some stored stubs".to_string(),
                ));
            }
            let mut best = 0u8;
            for sub in 0..params.num_sub_secs as usize {
                let in_sub: Vec<StubIndex> = self
                    .filtered_stubs
                    .iter()
                    .zip(self.raw_stubs.iter().zip(self.sub_sectors.iter()))
                    .filter_map(|(&fs, (rs, mask))| {
                        if fs == *rs && mask[sub] {
                            Some(fs)
                        } else {
                            None
                        }
                    })
                    .collect();
                best = best.max(count_layers(arena, &in_sub, params.reduced_layer_id));
            }
            self.num_filtered_layers_best_sub_sec = best;
        } else {
            self.num_filtered_layers_best_sub_sec = self.num_filtered_layers;
        }
        Ok(())
    }

    /// Whether this cell's filtered stubs constitute a valid track candidate.
    pub fn track_cand_found(&self, params: &HtCellParams) -> bool {
        let required = if params.q_over_pt_cell.abs() > 1.0 / params.min_pt_to_reduce_layers {
            params.min_stub_layers
        } else {
            params.min_stub_layers.saturating_sub(1)
        };
        self.num_filtered_layers_best_sub_sec >= required
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::Stub;

    fn ctx() -> StubPhysicsContext {
        StubPhysicsContext {
            inv_pt_to_dphi: 0.0057,
            bend_resolution: 0.5,
            bend_resolution_extra: 0.0,
            chosen_r_of_z_filter: 50.0,
            beam_window_z: 15.0,
        }
    }

    fn base_params() -> HtCellParams {
        HtCellParams {
            is_rphi_ht: true,
            q_over_pt_cell: 0.0,
            ibin_qoverpt: 16,
            inv_pt_to_dphi: 0.0057,
            min_stub_layers: 5,
            min_pt_to_reduce_layers: 10_000.0,
            use_bend_filter: true,
            bend_filter_daisy_chain: true,
            bend_filter_sigma_dphi: 0.01,
            max_stubs_in_cell: Some(2),
            num_sub_secs: 1,
            reduced_layer_id: false,
        }
    }

    #[test]
    fn filtered_subset_of_raw() {
        let arena: Vec<Stub> = (0..5)
            .map(|i| Stub::new(i, 0.1, 50.0 + i as f64, 5.0, 0.0, 1.0, 0, 0.01, 0.02, (i % 6 + 1) as u16, true, true))
            .collect();
        let mut cell = HtCell::new();
        for idx in 0..5 {
            cell.store(idx, None, 1).unwrap();
        }
        let params = base_params();
        cell.end(&arena, &ctx(), &params).unwrap();
        assert!(cell.num_stubs() <= cell.num_unfiltered_stubs());
        assert!(cell.num_layers() <= 5);
    }

    #[test]
    fn max_stub_filter_keeps_most_recent() {
        let stubs = vec![0u32, 1, 2, 3];
        let kept = HtCell::max_stub_count_filter(stubs, 2);
        assert_eq!(kept, vec![2, 3]);
    }

    #[test]
    fn sub_sector_mask_length_mismatch_is_rejected() {
        let mut cell = HtCell::new();
        assert!(cell.store(0, Some(vec![true]), 3).is_err());
    }
}
