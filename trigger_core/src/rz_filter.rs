//! Post-HT r-z track filters: eta, z_trk correlation, and seed.
//!
//! Three independent, composable stages run over the stubs of each 2-D r-φ
//! track candidate: an η filter, a z_trk correlation filter, and a
//! tracklet-style seed filter.

use crate::stub::{Stub, StubIndex, StubPhysicsContext};
use crate::track::L1Track2D;
use trigger_common::config::RzFiltersConfig;
use trigger_common::consts::{
    ETA_FILTER_MAX, ETA_FILTER_MIN, ETA_FILTER_NUM_BINS, ETA_FILTER_TOL_A, ETA_FILTER_TOL_B,
    SEED_FIRST_LAYER_IDS, ZTRK_FILTER_NUM_SAMPLES,
};

/// Geometry handed down from the owning [`crate::sector::Sector`]; kept
/// separate from [`RzFiltersConfig`] because it varies per sector instance.
#[derive(Debug, Clone, Copy)]
pub struct RzFilterGeometry {
    pub chosen_r_of_z: f64,
    pub z_trk_min_sector: f64,
    pub z_trk_max_sector: f64,
    pub min_stub_layers: u8,
    pub min_pt_to_reduce_layers: f64,
}

/// Per-track seed-combination diagnostic counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedCombinationCounters {
    pub num_ztrk_seed_combs: u32,
    pub num_seed_combs: u32,
    pub num_good_seed_combs: u32,
}

pub struct TrkRZfilter<'a> {
    config: &'a RzFiltersConfig,
    geometry: RzFilterGeometry,
}

impl<'a> TrkRZfilter<'a> {
    pub fn new(config: &'a RzFiltersConfig, geometry: RzFilterGeometry) -> Self {
        Self { config, geometry }
    }

    fn track_cand_check(&self, n_layers: u8, trk_q_over_pt: f64) -> bool {
        if trk_q_over_pt.abs() > 1.0 / self.geometry.min_pt_to_reduce_layers {
            n_layers >= self.geometry.min_stub_layers
        } else {
            n_layers >= self.geometry.min_stub_layers.saturating_sub(1)
        }
    }

    /// Run every enabled stage over every track, in order (η, z_trk, seed).
    /// Tracks left with too few layers after filtering are dropped.
    pub fn filter_tracks(
        &self,
        arena: &[Stub],
        ctx: &StubPhysicsContext,
        tracks: Vec<L1Track2D>,
    ) -> (Vec<L1Track2D>, Vec<SeedCombinationCounters>) {
        let mut out = Vec::with_capacity(tracks.len());
        let mut counters = Vec::with_capacity(tracks.len());

        for track in tracks {
            let q_over_pt = track.q_over_pt();
            let mut stubs = track.stubs().to_vec();
            let mut track_counters = SeedCombinationCounters::default();
            let mut estimate: Option<(f64, f64)> = None;

            if self.config.use_eta_filter {
                stubs = self.eta_filter(arena, &stubs, q_over_pt);
            }
            if self.config.use_ztrk_filter {
                let (filtered, combs) = self.ztrk_filter(arena, ctx, &stubs, q_over_pt);
                stubs = filtered;
                track_counters.num_ztrk_seed_combs = combs;
            }
            if self.config.use_seed_filter {
                let (filtered, combs, good, est) = self.seed_filter(arena, ctx, &stubs, q_over_pt);
                stubs = filtered;
                track_counters.num_seed_combs = combs;
                track_counters.num_good_seed_combs = good;
                estimate = est;
            }

            let n_layers = count_layers(arena, &stubs);
            if !self.track_cand_check(n_layers, q_over_pt) {
                continue;
            }

            let mut kept = L1Track2D::new_rphi(stubs, track.cell_location(), track.helix());
            if let Some(est) = estimate {
                kept.set_rz_filter_estimate(est);
            }
            out.push(kept);
            counters.push(track_counters);
        }

        (out, counters)
    }

    /// Histogram stub η into fixed bins, keep stubs within a
    /// rapidity-dependent tolerance of the modal bin.
    fn eta_filter(&self, arena: &[Stub], stubs: &[StubIndex], _q_over_pt: f64) -> Vec<StubIndex> {
        if stubs.is_empty() {
            return Vec::new();
        }
        let bin_width = (ETA_FILTER_MAX - ETA_FILTER_MIN) / ETA_FILTER_NUM_BINS as f64;
        let mut hist = vec![0u32; ETA_FILTER_NUM_BINS];
        let bin_of = |eta: f64| {
            (((eta - ETA_FILTER_MIN) / bin_width).floor() as i64)
                .clamp(0, ETA_FILTER_NUM_BINS as i64 - 1) as usize
        };
        for &idx in stubs {
            let eta = arena[idx as usize].eta();
            hist[bin_of(eta)] += 1;
        }
        let mode_bin = hist
            .iter()
            .enumerate()
            .max_by_key(|&(_, c)| *c)
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mode_eta = ETA_FILTER_MIN + (mode_bin as f64 + 0.5) * bin_width;
        let tolerance = ETA_FILTER_TOL_A - ETA_FILTER_TOL_B * mode_eta.abs();

        stubs
            .iter()
            .copied()
            .filter(|&idx| (arena[idx as usize].eta() - mode_eta).abs() <= tolerance)
            .collect()
    }

    /// 100-sample beam-window correlation integral picking the z0 that
    /// maximises aggregate (stub, stub) z_trk agreement, then retains stubs
    /// within the correlated resolution band of the best seed candidate.
    fn ztrk_filter(
        &self,
        arena: &[Stub],
        ctx: &StubPhysicsContext,
        stubs: &[StubIndex],
        _q_over_pt: f64,
    ) -> (Vec<StubIndex>, u32) {
        let seed_candidates: Vec<StubIndex> = stubs
            .iter()
            .copied()
            .filter(|&idx| {
                let s = &arena[idx as usize];
                s.ps_module() && SEED_FIRST_LAYER_IDS.contains(&s.layer_id())
            })
            .collect();

        if seed_candidates.is_empty() {
            return (stubs.to_vec(), 0);
        }

        let w = ctx.beam_window_z;
        let n = ZTRK_FILTER_NUM_SAMPLES;
        let mut best: Option<(u8, f64, Vec<StubIndex>)> = None;
        let mut n_combs = 0u32;

        for &seed_idx in &seed_candidates {
            n_combs += 1;
            let seed = &arena[seed_idx as usize];

            // Beam-window integration: for each z0 sample, score agreement
            // between this seed's projected z and every other stub's.
            let mut best_z0 = 0.0f64;
            let mut best_score = f64::NEG_INFINITY;
            for sample in 0..n {
                let z0 = -w + 2.0 * w * (sample as f64 + 0.5) / n as f64;
                let seed_ztrk = z0 + (ctx.chosen_r_of_z_filter / seed.r()) * (seed.z() - z0);
                let score: f64 = stubs
                    .iter()
                    .filter(|&&idx| idx != seed_idx)
                    .map(|&idx| {
                        let other = &arena[idx as usize];
                        let other_ztrk = z0 + (ctx.chosen_r_of_z_filter / other.r()) * (other.z() - z0);
                        -(seed_ztrk - other_ztrk).abs()
                    })
                    .sum();
                if score > best_score {
                    best_score = score;
                    best_z0 = z0;
                }
            }

            let seed_ztrk = best_z0 + (ctx.chosen_r_of_z_filter / seed.r()) * (seed.z() - best_z0);
            let mut kept = Vec::new();
            let mut total_dist = 0.0;
            for &idx in stubs {
                let other = &arena[idx as usize];
                let other_ztrk = best_z0 + (ctx.chosen_r_of_z_filter / other.r()) * (other.z() - best_z0);
                let dist = (seed_ztrk - other_ztrk).abs();
                let res = other.z_trk_res(ctx).max(1e-6);
                if dist <= res {
                    kept.push(idx);
                    total_dist += dist;
                }
            }
            let n_layers = count_layers(arena, &kept);
            let mean_dist = if kept.is_empty() { f64::INFINITY } else { total_dist / kept.len() as f64 };

            let better = match &best {
                None => true,
                Some((bl, bd, _)) => n_layers > *bl || (n_layers == *bl && mean_dist < *bd),
            };
            if better {
                best = Some((n_layers, mean_dist, kept));
            }
        }

        (best.map(|(_, _, k)| k).unwrap_or_else(|| stubs.to_vec()), n_combs)
    }

    /// Tracklet-style seed filter: ordered pairs of PS seed stubs from the
    /// innermost layer set define a straight line; every other stub's signed
    /// distance to that line gates its membership.
    fn seed_filter(
        &self,
        arena: &[Stub],
        ctx: &StubPhysicsContext,
        stubs: &[StubIndex],
        _q_over_pt: f64,
    ) -> (Vec<StubIndex>, u32, u32, Option<(f64, f64)>) {
        let seeds: Vec<StubIndex> = stubs
            .iter()
            .copied()
            .filter(|&idx| {
                let s = &arena[idx as usize];
                s.ps_module() && SEED_FIRST_LAYER_IDS.contains(&s.layer_id())
            })
            .collect();

        let mut n_combs = 0u32;
        let mut n_good = 0u32;
        let mut candidates: Vec<(u8, f64, Vec<StubIndex>, f64, f64)> = Vec::new();

        'outer: for (i, &a_idx) in seeds.iter().enumerate() {
            for &b_idx in seeds.iter().skip(i + 1) {
                if n_combs >= self.config.max_seed_combinations as u32 {
                    break 'outer;
                }
                n_combs += 1;

                let a = &arena[a_idx as usize];
                let b = &arena[b_idx as usize];
                if (a.r() - b.r()).abs() < 1e-9 {
                    continue;
                }
                let tan_lambda = (b.z() - a.z()) / (b.r() - a.r());
                let z0 = a.z() - tan_lambda * a.r();

                if z0.abs() > ctx.beam_window_z {
                    continue;
                }
                if self.config.z_trk_sector_check {
                    let z_at_ref = z0 + tan_lambda * self.geometry.chosen_r_of_z;
                    if z_at_ref < self.geometry.z_trk_min_sector || z_at_ref > self.geometry.z_trk_max_sector
                    {
                        continue;
                    }
                }
                n_good += 1;

                let denom = (1.0 + tan_lambda * tan_lambda).sqrt();
                let mut kept = Vec::new();
                let mut total_res = 0.0;
                for &idx in stubs {
                    let s = &arena[idx as usize];
                    let predicted_z = z0 + tan_lambda * s.r();
                    let signed_d = (s.z() - predicted_z) / denom;
                    let sigma_d = s.z_err().max(1e-6);
                    if signed_d.abs() < sigma_d + self.config.seed_epsilon {
                        kept.push(idx);
                        total_res += signed_d.abs();
                    }
                }
                let n_layers = count_layers(arena, &kept);
                let mean_res = if kept.is_empty() { f64::INFINITY } else { total_res / kept.len() as f64 };
                candidates.push((n_layers, mean_res, kept, z0, tan_lambda));
            }
        }

        if candidates.is_empty() {
            return (stubs.to_vec(), n_combs, n_good, None);
        }

        if self.config.keep_all_seed {
            let min_layers = self.geometry.min_stub_layers;
            let mut union = Vec::new();
            for (n_layers, _, kept, _, _) in &candidates {
                if *n_layers >= min_layers {
                    for &idx in kept {
                        if !union.contains(&idx) {
                            union.push(idx);
                        }
                    }
                }
            }
            // keepAllSeed never publishes an estimate (ambiguous with >1 seed).
            return (union, n_combs, n_good, None);
        }

        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.partial_cmp(&b.1).unwrap()));
        let (_, _, kept, z0, tan_lambda) = candidates.into_iter().next().unwrap();
        (kept, n_combs, n_good, Some((z0, tan_lambda)))
    }
}

fn count_layers(arena: &[Stub], stubs: &[StubIndex]) -> u8 {
    let mut seen = std::collections::HashSet::new();
    for &idx in stubs {
        seen.insert(arena[idx as usize].layer_id());
    }
    seen.len() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::Stub;

    fn ctx() -> StubPhysicsContext {
        StubPhysicsContext {
            inv_pt_to_dphi: 0.00057,
            bend_resolution: 0.5,
            bend_resolution_extra: 0.0,
            chosen_r_of_z_filter: 50.0,
            beam_window_z: 15.0,
        }
    }

    fn rz_config() -> RzFiltersConfig {
        RzFiltersConfig {
            use_eta_filter: false,
            use_ztrk_filter: false,
            use_seed_filter: true,
            r_ref_ztrk_cm: 50.0,
            seed_epsilon: 0.2,
            keep_all_seed: false,
            max_seed_combinations: 20,
            z_trk_sector_check: false,
        }
    }

    fn geometry() -> RzFilterGeometry {
        RzFilterGeometry {
            chosen_r_of_z: 50.0,
            z_trk_min_sector: -100.0,
            z_trk_max_sector: 100.0,
            min_stub_layers: 3,
            min_pt_to_reduce_layers: 10_000.0,
        }
    }

    fn make_arena() -> Vec<Stub> {
        // 4 PS stubs on a z = 0.3*r line, 2 noise stubs on z = 0.9*r (scenario S6).
        let mut arena = Vec::new();
        for (i, r) in [22.0, 35.0, 50.0, 70.0].into_iter().enumerate() {
            arena.push(Stub::new(i as u32, 0.0, r, r * 0.3, 0.0, 1.0, 0, 0.01, 0.02, (i + 1) as u16, true, true));
        }
        for (i, r) in [90.0, 110.0].into_iter().enumerate() {
            arena.push(Stub::new((4 + i) as u32, 0.0, r, r * 0.9, 0.0, 1.0, 0, 0.01, 0.02, (5 + i) as u16, true, true));
        }
        arena
    }

    #[test]
    fn seed_filter_retains_consistent_stubs_and_estimates_slope() {
        let arena = make_arena();
        let cfg = rz_config();
        let geo = geometry();
        let filter = TrkRZfilter::new(&cfg, geo);
        let stubs: Vec<StubIndex> = (0..arena.len() as u32).collect();
        let (kept, _combs, _good, est) = filter.seed_filter(&arena, &ctx(), &stubs, 0.0);
        assert!(kept.len() >= 4);
        let (z0, tan_lambda) = est.expect("single best seed should publish an estimate");
        assert!(z0.abs() < 1.0);
        assert!((tan_lambda - 0.3).abs() < 0.05);
    }

    #[test]
    fn keep_all_seed_never_publishes_estimate() {
        let arena = make_arena();
        let mut cfg = rz_config();
        cfg.keep_all_seed = true;
        let geo = geometry();
        let filter = TrkRZfilter::new(&cfg, geo);
        let stubs: Vec<StubIndex> = (0..arena.len() as u32).collect();
        let (_kept, _combs, _good, est) = filter.seed_filter(&arena, &ctx(), &stubs, 0.0);
        assert!(est.is_none());
    }
}
