//! System-wide constants for the track-trigger workspace.
//!
//! Single source of truth for cross-cutting numeric bounds and geometry-tuned
//! defaults. Imported by all crates — no duplication permitted.

/// Speed of light, m/s.
pub const SPEED_OF_LIGHT_M_PER_S: f64 = 2.997_924_58e8;

/// Maximum number of stubs the engine will hold for a single event.
///
/// Firmware FIFOs are bounded; an event producing more stubs than this is a
/// configuration/geometry problem upstream, not something the core should
/// silently truncate.
pub const MAX_STUBS_PER_EVENT: usize = 16_384;

/// Maximum number of φ sectors.
pub const MAX_SECTORS_PHI: u8 = 32;

/// Maximum number of η regions.
pub const MAX_SECTORS_ETA: u8 = 32;

/// Maximum number of η sub-sectors within one sector.
pub const MAX_ETA_SUBSECS: u8 = 9;

/// Reduced layer id is packed into at most this many bits.
pub const REDUCED_LAYER_ID_BITS: u32 = 3;

/// Maximum distinct reduced layer id value (`2^REDUCED_LAYER_ID_BITS - 1`).
pub const MAX_REDUCED_LAYER_ID: u8 = (1u8 << REDUCED_LAYER_ID_BITS) - 1;

/// Barrel layer ids, innermost to outermost.
pub const BARREL_LAYER_IDS: [u16; 6] = [1, 2, 3, 4, 5, 6];

/// Inner endcap (+z and -z share ids; sign decided by hemisphere) disk ids.
pub const ENDCAP_INNER_DISK_IDS: [u16; 5] = [11, 12, 13, 14, 15];

/// Outer endcap disk ids.
pub const ENDCAP_OUTER_DISK_IDS: [u16; 5] = [21, 22, 23, 24, 25];

/// Seed-filter first-stub allowed layer set (see `TrkRZfilter`).
pub const SEED_FIRST_LAYER_IDS: [u16; 9] = [1, 2, 3, 11, 12, 13, 21, 22, 23];

/// Number of η histogram bins used by the η filter.
///
/// Geometry-tuned; re-derive
/// if the tracker's η coverage changes.
pub const ETA_FILTER_NUM_BINS: usize = 64;

/// Lower edge of the η filter histogram.
pub const ETA_FILTER_MIN: f64 = -3.1;

/// Upper edge of the η filter histogram.
pub const ETA_FILTER_MAX: f64 = 3.1;

/// η-filter tolerance formula coefficients: `tol(eta) = A - B * |eta|`.
pub const ETA_FILTER_TOL_A: f64 = 0.35;
pub const ETA_FILTER_TOL_B: f64 = 0.0775;

/// Number of z0 samples used by the z_trk correlation-integral filter.
pub const ZTRK_FILTER_NUM_SAMPLES: usize = 100;

/// Beam-spot half-length assumed when no sector-specific value is configured.
pub const DEFAULT_BEAM_HALF_LENGTH_CM: f64 = 15.0;

/// |z0| cut applied to "good" Kalman states (cm).
pub const KALMAN_GOOD_STATE_Z0_CM: f64 = 20.0;

/// Default path searched for the engine's TOML configuration.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/trigger/config.toml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert!(MAX_STUBS_PER_EVENT > 0);
        assert!(MAX_SECTORS_PHI > 0);
        assert!(MAX_SECTORS_ETA > 0);
        assert!(MAX_REDUCED_LAYER_ID < (1 << REDUCED_LAYER_ID_BITS));
        assert!(ETA_FILTER_MIN < ETA_FILTER_MAX);
        assert!(ETA_FILTER_NUM_BINS > 0);
        assert!(ETA_FILTER_TOL_A > 0.0);
    }

    #[test]
    fn layer_id_sets_are_disjoint() {
        for id in BARREL_LAYER_IDS {
            assert!(!ENDCAP_INNER_DISK_IDS.contains(&id));
            assert!(!ENDCAP_OUTER_DISK_IDS.contains(&id));
        }
        assert!(!ENDCAP_INNER_DISK_IDS.iter().any(|i| ENDCAP_OUTER_DISK_IDS.contains(i)));
    }

    #[test]
    fn eta_tolerance_stays_positive_across_range() {
        let tol = |eta: f64| ETA_FILTER_TOL_A - ETA_FILTER_TOL_B * eta.abs();
        assert!(tol(ETA_FILTER_MIN) > 0.0);
        assert!(tol(ETA_FILTER_MAX) > 0.0);
    }
}
