//! Prelude module for common re-exports.
//!
//! ```rust
//! use trigger_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    AcceptanceConfig, ConfigError, ConfigLoader, DigitisationConfig, DuplicateConfig, FitConfig,
    HtRphiConfig, HtRzConfig, KalmanConfig, LogLevel, MagneticField, RzFiltersConfig,
    SectorsConfig, SharedConfig, TriggerConfig,
};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{
    ETA_FILTER_MAX, ETA_FILTER_MIN, ETA_FILTER_NUM_BINS, ETA_FILTER_TOL_A, ETA_FILTER_TOL_B,
    MAX_STUBS_PER_EVENT, SPEED_OF_LIGHT_M_PER_S,
};
