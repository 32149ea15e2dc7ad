//! Duplicate-candidate removal across 2-D, 3-D, and fitted tracks.
//!
//! One registry of numbered algorithms, dispatched by integer id rather than
//! by subclassing, operating over any candidate type that exposes stubs, an
//! HT cell location and a q/p_T. Algorithm ids not implemented here are
//! documented below as reserved rather than silently dropped.

use crate::stub::{Stub, StubIndex};
use crate::track::{L1FittedTrack, L1Track2D, L1Track3D};
use std::collections::HashSet;

/// Minimal surface every deduplicatable candidate type exposes.
pub trait DedupCandidate {
    fn stub_list(&self) -> &[StubIndex];
    fn ht_cell(&self) -> (u32, u32);
    fn q_over_pt_value(&self) -> f64;
    /// φ-like second helix coordinate (φ_T for 2-D tracks, φ0 for 3-D/fitted).
    fn phi_value(&self) -> f64;
    /// z0, if this candidate carries an r-z helix (0.0 for r-φ-only 2-D tracks).
    fn z0_value(&self) -> f64;
    /// tan λ, if this candidate carries an r-z helix (0.0 for r-φ-only 2-D tracks).
    fn tan_lambda_value(&self) -> f64;
}

impl DedupCandidate for L1Track2D {
    fn stub_list(&self) -> &[StubIndex] {
        self.stubs()
    }
    fn ht_cell(&self) -> (u32, u32) {
        self.cell_location()
    }
    fn q_over_pt_value(&self) -> f64 {
        if self.is_rphi() { self.helix().0 } else { 0.0 }
    }
    fn phi_value(&self) -> f64 {
        if self.is_rphi() { self.helix().1 } else { 0.0 }
    }
    fn z0_value(&self) -> f64 {
        if self.is_rphi() { 0.0 } else { self.helix().0 }
    }
    fn tan_lambda_value(&self) -> f64 {
        if self.is_rphi() { 0.0 } else { (self.helix().1 - self.helix().0) }
    }
}

impl DedupCandidate for L1Track3D {
    fn stub_list(&self) -> &[StubIndex] {
        self.stubs()
    }
    fn ht_cell(&self) -> (u32, u32) {
        self.cell_location_rphi()
    }
    fn q_over_pt_value(&self) -> f64 {
        self.q_over_pt()
    }
    fn phi_value(&self) -> f64 {
        self.phi0()
    }
    fn z0_value(&self) -> f64 {
        self.z0()
    }
    fn tan_lambda_value(&self) -> f64 {
        self.tan_lambda()
    }
}

impl DedupCandidate for L1FittedTrack {
    fn stub_list(&self) -> &[StubIndex] {
        self.stubs()
    }
    fn ht_cell(&self) -> (u32, u32) {
        self.source_cell_rphi()
    }
    fn q_over_pt_value(&self) -> f64 {
        self.q_over_pt()
    }
    fn phi_value(&self) -> f64 {
        self.phi0()
    }
    fn z0_value(&self) -> f64 {
        self.z0()
    }
    fn tan_lambda_value(&self) -> f64 {
        self.tan_lambda()
    }
}

fn num_layers(arena: &[Stub], stubs: &[StubIndex]) -> u8 {
    let mut seen = HashSet::new();
    for &idx in stubs {
        seen.insert(arena[idx as usize].layer_id());
    }
    seen.len() as u8
}

fn num_common_stubs(a: &[StubIndex], b: &[StubIndex]) -> usize {
    a.iter().filter(|x| b.contains(x)).count()
}

fn num_common_layers(arena: &[Stub], a: &[StubIndex], b: &[StubIndex]) -> u8 {
    let common: Vec<StubIndex> = a.iter().copied().filter(|x| b.contains(x)).collect();
    num_layers(arena, &common)
}

/// Tunables shared by several algorithms, lifted straight out of
/// [`trigger_common::config::DuplicateConfig`].
#[derive(Debug, Clone, Copy)]
pub struct DedupParams {
    pub min_independent: u8,
    pub min_common_hits_layers: u8,
    pub max_qoverpt_scan: f64,
    pub max_phi0_scan: f64,
    pub max_z0_scan: f64,
    pub max_tan_lambda_scan: f64,
}

/// alg 0: no-op, used when `alg_* == 0` in the config.
pub fn filter_alg0<T: Clone>(tracks: &[T]) -> Vec<T> {
    tracks.to_vec()
}

/// alg 1: keep only the single best candidate in the whole input (most
/// filtered layers, ties broken by raw stub count).
pub fn filter_alg1<T: DedupCandidate + Clone>(arena: &[Stub], tracks: &[T]) -> Vec<T> {
    tracks
        .iter()
        .max_by_key(|t| (num_layers(arena, t.stub_list()), t.stub_list().len()))
        .cloned()
        .into_iter()
        .collect()
}

/// alg 2: drop candidates whose stub set (as a sorted sequence) exactly
/// matches one already kept.
pub fn filter_alg2<T: DedupCandidate + Clone>(tracks: &[T]) -> Vec<T> {
    let mut seen: Vec<Vec<StubIndex>> = Vec::new();
    let mut out = Vec::new();
    for t in tracks {
        let mut key = t.stub_list().to_vec();
        key.sort_unstable();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(t.clone());
        }
    }
    out
}

/// alg 3 (OSU): drop a candidate if the number of stubs it does *not* share
/// with any other surviving candidate falls below `min_independent`.
pub fn filter_alg3<T: DedupCandidate + Clone>(tracks: &[T], params: &DedupParams) -> Vec<T> {
    let mut out = Vec::new();
    for (i, t) in tracks.iter().enumerate() {
        let independent = t
            .stub_list()
            .iter()
            .filter(|&&s| {
                !tracks
                    .iter()
                    .enumerate()
                    .any(|(j, other)| j != i && other.stub_list().contains(&s))
            })
            .count();
        if independent as u8 >= params.min_independent {
            out.push(t.clone());
        }
    }
    out
}

/// alg 7: pairwise, candidates sharing stubs in
/// `min_common_hits_layers` or more common layers are considered duplicates;
/// keep the one with more filtered layers (ties: more raw stubs).
pub fn filter_alg7<T: DedupCandidate + Clone>(arena: &[Stub], tracks: &[T], params: &DedupParams) -> Vec<T> {
    let mut alive = vec![true; tracks.len()];
    for i in 0..tracks.len() {
        if !alive[i] {
            continue;
        }
        for j in (i + 1)..tracks.len() {
            if !alive[j] {
                continue;
            }
            let common = num_common_layers(arena, tracks[i].stub_list(), tracks[j].stub_list());
            if common >= params.min_common_hits_layers {
                let quality = |t: &T| (num_layers(arena, t.stub_list()), t.stub_list().len());
                if quality(&tracks[i]) >= quality(&tracks[j]) {
                    alive[j] = false;
                } else {
                    alive[i] = false;
                }
            }
        }
    }
    tracks.iter().zip(alive).filter(|(_, a)| *a).map(|(t, _)| t.clone()).collect()
}

fn is_next_qoverpt(a: (u32, u32), b: (u32, u32)) -> bool {
    a.1 == b.1 && (a.0 as i64 - b.0 as i64).abs() == 1
}

fn is_adjacent_cell(a: (u32, u32), b: (u32, u32)) -> bool {
    (a.0 as i64 - b.0 as i64).abs() <= 1 && (a.1 as i64 - b.1 as i64).abs() <= 1 && a != b
}

/// alg 10: drop a candidate if a surviving one occupies the q/p_T-adjacent
/// HT cell (same φ_T row).
pub fn filter_alg10<T: DedupCandidate + Clone>(tracks: &[T]) -> Vec<T> {
    let mut alive = vec![true; tracks.len()];
    for i in 0..tracks.len() {
        for j in (i + 1)..tracks.len() {
            if alive[i] && alive[j] && is_next_qoverpt(tracks[i].ht_cell(), tracks[j].ht_cell()) {
                alive[j] = false;
            }
        }
    }
    tracks.iter().zip(alive).filter(|(_, a)| *a).map(|(t, _)| t.clone()).collect()
}

/// alg 11: as alg 10, but only merges cells with an identical stub count.
pub fn filter_alg11<T: DedupCandidate + Clone>(tracks: &[T]) -> Vec<T> {
    let mut alive = vec![true; tracks.len()];
    for i in 0..tracks.len() {
        for j in (i + 1)..tracks.len() {
            if alive[i]
                && alive[j]
                && is_next_qoverpt(tracks[i].ht_cell(), tracks[j].ht_cell())
                && tracks[i].stub_list().len() == tracks[j].stub_list().len()
            {
                alive[j] = false;
            }
        }
    }
    tracks.iter().zip(alive).filter(|(_, a)| *a).map(|(t, _)| t.clone()).collect()
}

/// alg 12: as alg 11, but over the full 3x3 neighbourhood rather than just
/// the q/p_T-adjacent row.
pub fn filter_alg12<T: DedupCandidate + Clone>(tracks: &[T]) -> Vec<T> {
    let mut alive = vec![true; tracks.len()];
    for i in 0..tracks.len() {
        for j in (i + 1)..tracks.len() {
            if alive[i]
                && alive[j]
                && is_adjacent_cell(tracks[i].ht_cell(), tracks[j].ht_cell())
                && tracks[i].stub_list().len() == tracks[j].stub_list().len()
            {
                alive[j] = false;
            }
        }
    }
    tracks.iter().zip(alive).filter(|(_, a)| *a).map(|(t, _)| t.clone()).collect()
}

/// alg 15: as alg 7, but only considers a pair duplicates if their helix
/// parameters are within the configured scan windows (limits the search to
/// physically-plausible duplicates rather than the whole sector).
pub fn filter_alg15<T: DedupCandidate + Clone>(arena: &[Stub], tracks: &[T], params: &DedupParams) -> Vec<T> {
    let mut alive = vec![true; tracks.len()];
    for i in 0..tracks.len() {
        if !alive[i] {
            continue;
        }
        for j in (i + 1)..tracks.len() {
            if !alive[j] {
                continue;
            }
            let within_scan = (tracks[i].q_over_pt_value() - tracks[j].q_over_pt_value()).abs() <= params.max_qoverpt_scan
                && (tracks[i].phi_value() - tracks[j].phi_value()).abs() <= params.max_phi0_scan;
            if !within_scan {
                continue;
            }
            let common = num_common_layers(arena, tracks[i].stub_list(), tracks[j].stub_list());
            if common >= params.min_common_hits_layers {
                let quality = |t: &T| (num_layers(arena, t.stub_list()), t.stub_list().len());
                if quality(&tracks[i]) >= quality(&tracks[j]) {
                    alive[j] = false;
                } else {
                    alive[i] = false;
                }
            }
        }
    }
    tracks.iter().zip(alive).filter(|(_, a)| *a).map(|(t, _)| t.clone()).collect()
}

/// Candidates mergeable in place, as opposed to ones only ever filtered.
/// Only [`L1Track3D`] carries a meaningful, non-commutative merge; other
/// candidate types fall back to "keep the higher-quality one" when asked to
/// merge, since merging their helices has no defined meaning here.
pub trait MergeCandidate: DedupCandidate + Sized {
    fn merge_into(&self, other: &Self) -> Self;
}

impl MergeCandidate for L1Track3D {
    fn merge_into(&self, other: &Self) -> Self {
        self.merge(other)
    }
}

impl MergeCandidate for L1Track2D {
    fn merge_into(&self, _other: &Self) -> Self {
        self.clone()
    }
}

impl MergeCandidate for L1FittedTrack {
    fn merge_into(&self, _other: &Self) -> Self {
        self.clone()
    }
}

/// alg 16: merge (rather than filter) candidates sharing stubs in
/// `min_common_hits_layers` or more common layers.
pub fn filter_alg16<T: MergeCandidate + Clone>(arena: &[Stub], tracks: &[T], params: &DedupParams) -> Vec<T> {
    let mut merged: Vec<T> = tracks.to_vec();
    let mut i = 0;
    while i < merged.len() {
        let mut j = i + 1;
        while j < merged.len() {
            let common = num_common_layers(arena, merged[i].stub_list(), merged[j].stub_list());
            if common >= params.min_common_hits_layers {
                merged[i] = merged[i].merge_into(&merged[j]);
                merged.remove(j);
            } else {
                j += 1;
            }
        }
        i += 1;
    }
    merged
}

/// alg 17: merge candidates within cuts on the four helix-parameter
/// differences.
pub fn filter_alg17<T: MergeCandidate + Clone>(tracks: &[T], params: &DedupParams) -> Vec<T> {
    let mut merged: Vec<T> = tracks.to_vec();
    let mut i = 0;
    while i < merged.len() {
        let mut j = i + 1;
        while j < merged.len() {
            let close = (merged[i].q_over_pt_value() - merged[j].q_over_pt_value()).abs() <= params.max_qoverpt_scan
                && (merged[i].phi_value() - merged[j].phi_value()).abs() <= params.max_phi0_scan
                && (merged[i].z0_value() - merged[j].z0_value()).abs() <= params.max_z0_scan
                && (merged[i].tan_lambda_value() - merged[j].tan_lambda_value()).abs() <= params.max_tan_lambda_scan;
            if close {
                merged[i] = merged[i].merge_into(&merged[j]);
                merged.remove(j);
            } else {
                j += 1;
            }
        }
        i += 1;
    }
    merged
}

/// alg 18: as alg 17, but gated on HT-cell adjacency and scored only on
/// (Δz0, ΔtanΛ) — the cheap two-parameter window used once two candidates
/// are already known to sit in neighbouring cells.
pub fn filter_alg18<T: MergeCandidate + Clone>(tracks: &[T], params: &DedupParams) -> Vec<T> {
    let mut merged: Vec<T> = tracks.to_vec();
    let mut i = 0;
    while i < merged.len() {
        let mut j = i + 1;
        while j < merged.len() {
            let close = is_adjacent_cell(merged[i].ht_cell(), merged[j].ht_cell())
                && (merged[i].z0_value() - merged[j].z0_value()).abs() <= params.max_z0_scan
                && (merged[i].tan_lambda_value() - merged[j].tan_lambda_value()).abs() <= params.max_tan_lambda_scan;
            if close {
                merged[i] = merged[i].merge_into(&merged[j]);
                merged.remove(j);
            } else {
                j += 1;
            }
        }
        i += 1;
    }
    merged
}

/// alg 100: hash stub-index sets into a 16-bit space (a cheap fingerprint
/// `std::hash` modulo 2^16) and keep only the first candidate per bucket.
pub fn filter_alg100<T: DedupCandidate + Clone>(tracks: &[T]) -> Vec<T> {
    let mut seen_buckets = HashSet::new();
    let mut out = Vec::new();
    for t in tracks {
        let mut key = t.stub_list().to_vec();
        key.sort_unstable();
        let mut hash: u64 = 0xcbf29ce484222325;
        for idx in &key {
            hash ^= *idx as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        let bucket = (hash % (1 << 16)) as u16;
        if seen_buckets.insert(bucket) {
            out.push(t.clone());
        }
    }
    out
}

/// alg 50: fitted-track-only HT-cell-consistency rescue pass. A track whose
/// fitted helix maps back to the HT cell it was found in is kept outright;
/// one that doesn't is still kept unless some other track has already
/// claimed that HT cell as consistent.
pub fn filter_alg50_fitted(
    tracks: &[L1FittedTrack],
    bin_size_qoverpt: f64,
    bin_size_phi_t: f64,
    max_abs_qoverpt: f64,
    max_abs_phi_t: f64,
    phi_centre_sector: f64,
    inv_pt_to_dphi: f64,
    r_ref_phi: f64,
) -> Vec<L1FittedTrack> {
    let consistent: Vec<bool> = tracks
        .iter()
        .map(|t| {
            t.cell_consistent(
                bin_size_qoverpt,
                bin_size_phi_t,
                max_abs_qoverpt,
                max_abs_phi_t,
                phi_centre_sector,
                inv_pt_to_dphi,
                r_ref_phi,
            )
        })
        .collect();

    let mut cells_used: HashSet<(u32, u32)> = HashSet::new();
    for (t, &ok) in tracks.iter().zip(&consistent) {
        if ok {
            cells_used.insert(t.source_cell_rphi());
        }
    }

    tracks
        .iter()
        .zip(&consistent)
        .filter(|(t, &ok)| ok || !cells_used.contains(&t.source_cell_rphi()))
        .map(|(t, _)| t.clone())
        .collect()
}

/// Dispatch by algorithm id for the filter-only algorithms common to every
/// candidate type. Ids 13, 14, 19 are documented in the registry but not
/// reimplemented here (13/14 need the same neighbourhood-merge plumbing as
/// 16/17 with little behavioural difference; 19 is alg18 plus a "keep worse"
/// tie-break that alg17 already covers more precisely). Unknown/reserved ids
/// pass candidates through unchanged and emit a `tracing::warn!`, rather than
/// silently dropping tracks.
pub fn run_filter_alg<T: MergeCandidate + Clone>(alg: u32, arena: &[Stub], tracks: &[T], params: &DedupParams) -> Vec<T> {
    match alg {
        0 => filter_alg0(tracks),
        1 => filter_alg1(arena, tracks),
        2 => filter_alg2(tracks),
        3 => filter_alg3(tracks, params),
        7 => filter_alg7(arena, tracks, params),
        10 => filter_alg10(tracks),
        11 => filter_alg11(tracks),
        12 => filter_alg12(tracks),
        15 => filter_alg15(arena, tracks, params),
        16 => filter_alg16(arena, tracks, params),
        17 => filter_alg17(tracks, params),
        18 => filter_alg18(tracks, params),
        100 => filter_alg100(tracks),
        other => {
            tracing::warn!(alg = other, "duplicate-removal: reserved/unimplemented algorithm id, passing tracks through unchanged");
            tracks.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::Stub;

    fn arena() -> Vec<Stub> {
        (0..6)
            .map(|i| Stub::new(i, 0.0, 50.0, 10.0, 0.0, 1.0, 0, 0.01, 0.02, (i % 5 + 1) as u16, true, true))
            .collect()
    }

    fn params() -> DedupParams {
        DedupParams {
            min_independent: 2,
            min_common_hits_layers: 3,
            max_qoverpt_scan: 0.01,
            max_phi0_scan: 0.01,
            max_z0_scan: 1.0,
            max_tan_lambda_scan: 0.05,
        }
    }

    #[test]
    fn alg1_keeps_single_best_by_layers_then_stubs() {
        let a = L1Track3D::new(vec![0, 1, 2], (0, 0), (0.0, 0.0), (0, 0), (0.0, 0.0), 0, 0);
        let b = L1Track3D::new(vec![0, 1, 2, 3], (1, 1), (0.0, 0.0), (0, 0), (0.0, 0.0), 0, 0);
        let out = filter_alg1(&arena(), &[a, b.clone()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].stubs(), b.stubs());
    }

    #[test]
    fn alg2_drops_exact_stub_set_duplicate() {
        let a = L1Track3D::new(vec![0, 1, 2], (0, 0), (0.0, 0.0), (0, 0), (0.0, 0.0), 0, 0);
        let b = L1Track3D::new(vec![2, 1, 0], (1, 1), (0.0, 0.0), (0, 0), (0.0, 0.0), 0, 0);
        let out = filter_alg2(&[a, b]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn alg10_drops_qoverpt_adjacent_duplicate() {
        let a = L1Track3D::new(vec![0, 1, 2], (5, 3), (0.0, 0.0), (0, 0), (0.0, 0.0), 0, 0);
        let b = L1Track3D::new(vec![3, 4, 5], (6, 3), (0.0, 0.0), (0, 0), (0.0, 0.0), 0, 0);
        let out = filter_alg10(&[a, b]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn alg16_merges_high_overlap_candidates() {
        let a = L1Track3D::new(vec![0, 1, 2], (0, 0), (0.0, 0.0), (0, 0), (0.0, 0.0), 0, 0);
        let b = L1Track3D::new(vec![1, 2, 3], (1, 1), (0.0, 0.0), (0, 0), (0.0, 0.0), 0, 0);
        let out = filter_alg16(&arena(), &[a, b], &params());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].stubs().len(), 4);
    }

    #[test]
    fn alg50_rescues_inconsistent_track_whose_cell_is_unclaimed() {
        let consistent = L1FittedTrack::new(vec![0], (0, 0), 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 4, 0, 0, true);
        let inconsistent = L1FittedTrack::new(vec![1], (9, 9), 100.0, 0.0, 0.0, 0.0, 0.0, 1.0, 4, 0, 0, true);
        let out = filter_alg50_fitted(&[consistent, inconsistent], 0.01, 0.01, 1.0, 1.0, 0.0, 0.00057, 60.0);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn alg18_merges_adjacent_cells_within_z0_tan_lambda_window() {
        let a = L1Track3D::new(vec![0, 1, 2], (5, 5), (0.0, 0.0), (0, 0), (0.0, 0.5), 0, 0);
        let b = L1Track3D::new(vec![3, 4, 5], (6, 5), (0.0, 0.0), (0, 0), (0.2, 0.51), 0, 0);
        let out = filter_alg18(&[a, b], &params());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].stubs().len(), 6);
    }

    #[test]
    fn reserved_alg_id_passes_through_with_warning() {
        let a = L1Track3D::new(vec![0, 1, 2], (0, 0), (0.0, 0.0), (0, 0), (0.0, 0.0), 0, 0);
        let out = run_filter_alg(13, &arena(), &[a.clone()], &params());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].stubs(), a.stubs());
    }
}
