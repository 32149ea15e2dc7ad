//! Configuration loading traits and types.
//!
//! Provides a standardized way to load the engine's TOML configuration,
//! grouped into one table per subsystem (sectors, HT-φ, HT-z, r-z filters,
//! acceptance, duplicate removal, fitters, Kalman, digitisation).
//!
//! # Usage
//!
//! ```rust,no_run
//! use trigger_common::config::{ConfigLoader, TriggerConfig};
//! use std::path::Path;
//!
//! let config = TriggerConfig::load(Path::new("trigger.toml")).expect("load config");
//! config.validate().expect("valid config");
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Log level for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Configuration file not found")]
    FileNotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),
}

/// Fields shared across all applications in the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    pub service_name: String,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl SharedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Default-implemented for any `serde::de::DeserializeOwned` type.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Sectors ─────────────────────────────────────────────────────────

/// Sector grid geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectorsConfig {
    /// Number of φ sectors tiling the full azimuth.
    pub n_phi: u8,
    /// η region lower edges, ascending, one more than the number of regions.
    pub eta_region_edges: Vec<f64>,
    /// Reference radius for φ extrapolation, cm.
    pub r_ref_phi_cm: f64,
    /// Reference radius for z extrapolation, cm.
    pub r_ref_z_cm: f64,
    /// Assumed half-length of the luminous region, cm.
    pub beam_half_length_cm: f64,
    /// Number of η sub-sectors per sector (1 disables sub-sectoring).
    #[serde(default = "default_one_u8")]
    pub n_subsec_eta: u8,
    /// Widen the η window by strip-length uncertainty.
    #[serde(default)]
    pub handle_strips_eta: bool,
    /// Apply the raw stub-φ sector cut.
    #[serde(default = "default_true")]
    pub use_stub_phi: bool,
    /// Apply the bend-extrapolated stub-φ-at-reference-radius sector cut.
    #[serde(default = "default_true")]
    pub use_stub_phi_trk: bool,
    /// Assumed φ_trk resolution (as a fraction of the sector width) when
    /// `calc_phi_trk_res` is false or yields a looser bound.
    #[serde(default)]
    pub assumed_phi_trk_res: f64,
    /// Tighten the φ_trk tolerance to the bend-derived resolution when it is
    /// narrower than `assumed_phi_trk_res`.
    #[serde(default)]
    pub calc_phi_trk_res: bool,
}

fn default_one_u8() -> u8 {
    1
}

impl SectorsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_phi == 0 || self.n_phi > crate::consts::MAX_SECTORS_PHI {
            return Err(ConfigError::ValidationError(format!(
                "sectors.n_phi={} out of range [1, {}]",
                self.n_phi,
                crate::consts::MAX_SECTORS_PHI
            )));
        }
        if self.eta_region_edges.len() < 2 {
            return Err(ConfigError::ValidationError(
                "sectors.eta_region_edges needs at least 2 edges".to_string(),
            ));
        }
        if self.eta_region_edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::ValidationError(
                "sectors.eta_region_edges must be strictly ascending".to_string(),
            ));
        }
        if (self.eta_region_edges.len() as u8 - 1) > crate::consts::MAX_SECTORS_ETA {
            return Err(ConfigError::ValidationError(format!(
                "sectors defines more than {} eta regions",
                crate::consts::MAX_SECTORS_ETA
            )));
        }
        if self.n_subsec_eta == 0 || self.n_subsec_eta > crate::consts::MAX_ETA_SUBSECS {
            return Err(ConfigError::ValidationError(format!(
                "sectors.n_subsec_eta={} out of range [1, {}]",
                self.n_subsec_eta,
                crate::consts::MAX_ETA_SUBSECS
            )));
        }
        if self.r_ref_phi_cm <= 0.0 || self.r_ref_z_cm <= 0.0 {
            return Err(ConfigError::ValidationError(
                "sectors reference radii must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── HT-φ ────────────────────────────────────────────────────────────

/// r-φ Hough-Transform array behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HtRphiConfig {
    /// Minimum transverse momentum the array covers, GeV.
    pub pt_min_gev: f64,
    /// Explicit q/p_T bin count, if not auto-derived from `n_cells`.
    pub n_bins_qoverpt: Option<u32>,
    /// Explicit φ_T bin count, if not auto-derived from `n_cells`.
    pub n_bins_phi_t: Option<u32>,
    /// Total cell count target used to auto-derive bin counts when the
    /// explicit counts above are not given.
    pub n_cells: Option<u32>,
    /// Enable 2x2 low-p_T cell merging.
    #[serde(default)]
    pub merge_2x2_enabled: bool,
    /// |q/p_T| bin-centre threshold above which merging applies.
    #[serde(default)]
    pub merge_2x2_min_inv_pt: f64,
    /// Minimum filtered layers for a cell to yield a candidate.
    pub min_layers: u8,
    /// |q/p_T| threshold above which the layer requirement relaxes by one.
    #[serde(default)]
    pub relaxed_layers_inv_pt_threshold: f64,
    /// Use the daisy-chain bend filter (true) or the systolic Δφ filter (false).
    #[serde(default = "default_true")]
    pub bend_filter_daisy_chain: bool,
    /// Systolic-variant Δφ resolution cut, radians.
    #[serde(default)]
    pub bend_filter_sigma_dphi: f64,
    /// Maximum stubs retained per cell (oldest dropped first).
    pub max_stubs_per_cell: usize,
    /// Drop some nominally-crossed cells to reduce fill rate.
    #[serde(default)]
    pub kill_some_cells: bool,
    /// Busy-sector stub budget.
    pub n_busy: usize,
    /// Track separate busy-sector budgets per charge.
    #[serde(default)]
    pub busy_sector_each_charge: bool,
}

fn default_true() -> bool {
    true
}

impl HtRphiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pt_min_gev <= 0.0 {
            return Err(ConfigError::ValidationError(
                "ht_rphi.pt_min_gev must be positive".to_string(),
            ));
        }
        let explicit = self.n_bins_qoverpt.is_some() && self.n_bins_phi_t.is_some();
        if !explicit && self.n_cells.is_none() {
            return Err(ConfigError::ValidationError(
                "ht_rphi needs either explicit bin counts or n_cells".to_string(),
            ));
        }
        if self.merge_2x2_enabled {
            if let (Some(q), Some(p)) = (self.n_bins_qoverpt, self.n_bins_phi_t) {
                if q % 2 != 0 || p % 2 != 0 {
                    return Err(ConfigError::ValidationError(
                        "ht_rphi.merge_2x2_enabled requires even bin counts in both dimensions"
                            .to_string(),
                    ));
                }
            }
        }
        if self.min_layers == 0 {
            return Err(ConfigError::ValidationError(
                "ht_rphi.min_layers must be at least 1".to_string(),
            ));
        }
        if self.max_stubs_per_cell == 0 {
            return Err(ConfigError::ValidationError(
                "ht_rphi.max_stubs_per_cell must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── HT-z ────────────────────────────────────────────────────────────

/// r-z Hough-Transform array behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HtRzConfig {
    #[serde(default)]
    pub enabled: bool,
    pub n_bins_z0: Option<u32>,
    pub n_bins_zref: Option<u32>,
    pub n_cells: Option<u32>,
    #[serde(default)]
    pub handle_strips: bool,
    #[serde(default)]
    pub kill_some_cells: bool,
}

impl HtRzConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        let explicit = self.n_bins_z0.is_some() && self.n_bins_zref.is_some();
        if !explicit && self.n_cells.is_none() {
            return Err(ConfigError::ValidationError(
                "ht_rz.enabled requires either explicit bin counts or n_cells".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── r-z filters ─────────────────────────────────────────────────────

/// Post-HT r-z filter behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RzFiltersConfig {
    #[serde(default)]
    pub use_eta_filter: bool,
    #[serde(default)]
    pub use_ztrk_filter: bool,
    #[serde(default)]
    pub use_seed_filter: bool,
    /// Reference radius used by the z_trk filter, cm.
    pub r_ref_ztrk_cm: f64,
    /// Seed-filter residual tolerance added to the propagated uncertainty.
    #[serde(default)]
    pub seed_epsilon: f64,
    /// Retain the union of stubs from every passing seed rather than the
    /// single best seed.
    #[serde(default)]
    pub keep_all_seed: bool,
    /// Hard cap on seed pair combinations tried per track.
    pub max_seed_combinations: usize,
    /// Require the seed-derived z at R_ref to lie within the sector window.
    #[serde(default)]
    pub z_trk_sector_check: bool,
}

impl RzFiltersConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.use_ztrk_filter && self.r_ref_ztrk_cm <= 0.0 {
            return Err(ConfigError::ValidationError(
                "rz_filters.r_ref_ztrk_cm must be positive when use_ztrk_filter is set"
                    .to_string(),
            ));
        }
        if self.use_seed_filter && self.max_seed_combinations == 0 {
            return Err(ConfigError::ValidationError(
                "rz_filters.max_seed_combinations must be at least 1 when use_seed_filter is set"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Acceptance ──────────────────────────────────────────────────────

/// Track validity requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcceptanceConfig {
    pub min_layers: u8,
    #[serde(default)]
    pub relaxed_layers_pt_threshold_gev: f64,
    #[serde(default)]
    pub use_layer_id: bool,
    #[serde(default)]
    pub reduced_layer_id: bool,
}

impl AcceptanceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_layers == 0 {
            return Err(ConfigError::ValidationError(
                "acceptance.min_layers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Duplicate removal ───────────────────────────────────────────────

/// Which duplicate-removal algorithm applies at which stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DuplicateConfig {
    /// Algorithm id applied to r-φ 2-D candidates.
    pub alg_rphi: u32,
    /// Algorithm id applied to r-z 2-D candidates.
    pub alg_rz: u32,
    /// Algorithm id applied after r-z segment assembly.
    pub alg_rz_seg: u32,
    /// Algorithm id applied to fitted tracks.
    pub alg_fit: u32,
    #[serde(default)]
    pub min_independent: u8,
    #[serde(default)]
    pub min_common_hits_layers: u8,
    #[serde(default)]
    pub chi_sq_cut: f64,
    #[serde(default)]
    pub max_qoverpt_scan: f64,
    #[serde(default)]
    pub max_phi0_scan: f64,
    #[serde(default)]
    pub max_z0_scan: f64,
    #[serde(default)]
    pub max_tan_lambda_scan: f64,
}

impl DuplicateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

// ─── Fit ─────────────────────────────────────────────────────────────

/// Fitter-family behaviour shared by all back-ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FitConfig {
    /// Fitter names to run, in order: "linear_regression", "linearised_chisq",
    /// "kalman4", "kalman5".
    pub fitters: Vec<String>,
    pub chi_sq_per_dof_cut: f64,
    pub max_iterations: u32,
    #[serde(default = "default_true")]
    pub kill_worst_hit: bool,
    #[serde(default)]
    pub residual_kill_cut: f64,
}

impl FitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fitters.is_empty() {
            return Err(ConfigError::ValidationError(
                "fit.fitters must name at least one fitter".to_string(),
            ));
        }
        for name in &self.fitters {
            if !matches!(
                name.as_str(),
                "linear_regression" | "linearised_chisq" | "kalman4" | "kalman5"
            ) {
                return Err(ConfigError::ValidationError(format!(
                    "fit.fitters names unknown fitter \"{name}\""
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "fit.max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Kalman ──────────────────────────────────────────────────────────

/// Kalman-filter-specific tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KalmanConfig {
    #[serde(default)]
    pub debug: bool,
    /// Multiple-scattering process-noise scale factor. 0.0 legally disables
    /// process noise.
    pub multi_scatter_factor: f64,
    /// Validation-gate chi-square cut (applied as chi2/2 < cut).
    pub validation_gate_cut: f64,
    /// Break ties across different stub-layer counts by raw stub count
    /// before falling back to reduced chi-square.
    #[serde(default)]
    pub select_most_num_stub_state: bool,
    pub max_num_next_stubs: usize,
    pub max_num_virtual_stubs: u8,
    pub max_num_states_cut: usize,
    pub reduced_chi_sq_cut: f64,
}

impl KalmanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.multi_scatter_factor < 0.0 {
            return Err(ConfigError::ValidationError(
                "kalman.multi_scatter_factor cannot be negative".to_string(),
            ));
        }
        if self.validation_gate_cut <= 0.0 {
            return Err(ConfigError::ValidationError(
                "kalman.validation_gate_cut must be positive".to_string(),
            ));
        }
        if self.max_num_next_stubs == 0 || self.max_num_states_cut == 0 {
            return Err(ConfigError::ValidationError(
                "kalman max-state/stub limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Digitisation ────────────────────────────────────────────────────

/// Fixed-point layout for one digitised variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DigitisedVariable {
    pub bits: u8,
    pub range_min: f64,
    pub range_max: f64,
}

impl DigitisedVariable {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.bits == 0 || self.bits > 32 {
            return Err(ConfigError::ValidationError(format!(
                "digitisation.{name}.bits={} out of range [1, 32]",
                self.bits
            )));
        }
        if self.range_min >= self.range_max {
            return Err(ConfigError::ValidationError(format!(
                "digitisation.{name} range_min must be below range_max"
            )));
        }
        Ok(())
    }
}

/// Fixed-point digitisation layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DigitisationConfig {
    #[serde(default)]
    pub enabled: bool,
    pub phi_sector: DigitisedVariable,
    pub phi_s: DigitisedVariable,
    pub r_t: DigitisedVariable,
    pub z: DigitisedVariable,
    pub delta_phi: DigitisedVariable,
    pub rho: DigitisedVariable,
    pub phi_o: DigitisedVariable,
    pub bend: DigitisedVariable,
}

impl DigitisationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        self.phi_sector.validate("phi_sector")?;
        self.phi_s.validate("phi_s")?;
        self.r_t.validate("r_t")?;
        self.z.validate("z")?;
        self.delta_phi.validate("delta_phi")?;
        self.rho.validate("rho")?;
        self.phi_o.validate("phi_o")?;
        self.bend.validate("bend")?;
        Ok(())
    }
}

// ─── Physics ─────────────────────────────────────────────────────────

/// Stub bend-resolution model, shared by the sector acceptance cut, the HT
/// bend filters, and every fitter's bend-derived q/p_T estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhysicsConfig {
    /// Baseline bend resolution, in strip-pitch units, for an unmerged stub.
    pub bend_resolution: f64,
    /// Extra resolution added per additional raw bend value merged into a
    /// stub during front-end bit-width reduction.
    #[serde(default)]
    pub bend_resolution_extra: f64,
}

impl PhysicsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bend_resolution <= 0.0 {
            return Err(ConfigError::ValidationError(
                "physics.bend_resolution must be positive".to_string(),
            ));
        }
        if self.bend_resolution_extra < 0.0 {
            return Err(ConfigError::ValidationError(
                "physics.bend_resolution_extra cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Top-level configuration record ─────────────────────────────────

/// The complete engine configuration, one table per subsystem.
///
/// Immutable once loaded, except for the derived magnetic-field quantities
/// refreshed once per event by [`TriggerConfig::set_magnetic_field`] — the one
/// deliberate exception to "configuration is immutable after construction".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    pub shared: SharedConfig,
    pub sectors: SectorsConfig,
    pub ht_rphi: HtRphiConfig,
    pub ht_rz: HtRzConfig,
    pub rz_filters: RzFiltersConfig,
    pub acceptance: AcceptanceConfig,
    pub duplicate: DuplicateConfig,
    pub fit: FitConfig,
    pub kalman: KalmanConfig,
    pub digitisation: DigitisationConfig,
    pub physics: PhysicsConfig,

    /// Derived from the per-event B-field; not part of the TOML document.
    #[serde(skip, default)]
    pub magnetic_field: MagneticField,
}

/// Per-event derived magnetic-field quantities.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagneticField {
    pub tesla: f64,
    pub inv_pt_to_dphi: f64,
    pub inv_pt_to_r: f64,
}

impl TriggerConfig {
    /// Refresh the derived B-field quantities for the next event.
    ///
    /// `invPtToDphi = B*c / (2e11)`; `invPtToR = B*c / 1e11`.
    pub fn set_magnetic_field(&mut self, tesla: f64) {
        let c = crate::consts::SPEED_OF_LIGHT_M_PER_S;
        self.magnetic_field = MagneticField {
            tesla,
            inv_pt_to_dphi: tesla * c / 2.0e11,
            inv_pt_to_r: tesla * c / 1.0e11,
        };
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.sectors.validate()?;
        self.ht_rphi.validate()?;
        self.ht_rz.validate()?;
        self.rz_filters.validate()?;
        self.acceptance.validate()?;
        self.duplicate.validate()?;
        self.fit.validate()?;
        self.kalman.validate()?;
        self.digitisation.validate()?;
        self.physics.validate()?;
        Ok(())
    }
}

/// A minimal valid [`TriggerConfig`] TOML document, for tests.
///
/// Exposed publicly (not `#[cfg(test)]`-gated) so downstream crates' test
/// code can build a config without duplicating this fixture.
pub fn minimal_toml_fixture() -> &'static str {
    r#"
[shared]
service_name = "trigger"

[sectors]
n_phi = 9
eta_region_edges = [-2.4, -1.0, 0.0, 1.0, 2.4]
r_ref_phi_cm = 60.0
r_ref_z_cm = 50.0
beam_half_length_cm = 15.0

[ht_rphi]
pt_min_gev = 3.0
n_cells = 2048
min_layers = 5
max_stubs_per_cell = 32
n_busy = 144

[ht_rz]
enabled = false

[rz_filters]
r_ref_ztrk_cm = 50.0
max_seed_combinations = 20

[acceptance]
min_layers = 5

[duplicate]
alg_rphi = 10
alg_rz = 10
alg_rz_seg = 10
alg_fit = 50

[fit]
fitters = ["linear_regression"]
chi_sq_per_dof_cut = 10.0
max_iterations = 10

[kalman]
multi_scatter_factor = 1.0
validation_gate_cut = 25.0
max_num_next_stubs = 4
max_num_virtual_stubs = 2
max_num_states_cut = 32
reduced_chi_sq_cut = 15.0

[digitisation]
enabled = false
[digitisation.phi_sector]
bits = 14
range_min = -0.6
range_max = 0.6
[digitisation.phi_s]
bits = 14
range_min = -0.6
range_max = 0.6
[digitisation.r_t]
bits = 12
range_min = 0.0
range_max = 120.0
[digitisation.z]
bits = 14
range_min = -120.0
range_max = 120.0
[digitisation.delta_phi]
bits = 14
range_min = -0.1
range_max = 0.1
[digitisation.rho]
bits = 10
range_min = 0.0
range_max = 0.1
[digitisation.phi_o]
bits = 14
range_min = -0.6
range_max = 0.6
[digitisation.bend]
bits = 8
range_min = -8.0
range_max = 8.0

[physics]
bend_resolution = 0.5
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_and_validates_minimal_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(minimal_toml_fixture().as_bytes()).unwrap();
        let config = TriggerConfig::load(file.path()).expect("parse");
        config.validate().expect("validate");
        assert_eq!(config.sectors.n_phi, 9);
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let err = TriggerConfig::load(Path::new("/nonexistent/trigger.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound));
    }

    #[test]
    fn rejects_unknown_field() {
        let mut file = NamedTempFile::new().unwrap();
        let mut content = minimal_toml_fixture().to_string();
        content.push_str("\n[sectors]\nbogus_field = 1\n");
        file.write_all(content.as_bytes()).unwrap();
        assert!(TriggerConfig::load(file.path()).is_err());
    }

    #[test]
    fn merge_2x2_requires_even_bins_when_enabled() {
        let cfg = HtRphiConfig {
            pt_min_gev: 3.0,
            n_bins_qoverpt: Some(31),
            n_bins_phi_t: Some(64),
            n_cells: None,
            merge_2x2_enabled: true,
            merge_2x2_min_inv_pt: 0.1,
            min_layers: 5,
            relaxed_layers_inv_pt_threshold: 0.0,
            bend_filter_daisy_chain: true,
            bend_filter_sigma_dphi: 0.0,
            max_stubs_per_cell: 16,
            kill_some_cells: false,
            n_busy: 144,
            busy_sector_each_charge: false,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn magnetic_field_sets_derived_quantities() {
        let mut config = {
            let mut file = NamedTempFile::new().unwrap();
            file.write_all(minimal_toml_fixture().as_bytes()).unwrap();
            TriggerConfig::load(file.path()).unwrap()
        };
        config.set_magnetic_field(3.8);
        assert!(config.magnetic_field.inv_pt_to_dphi > 0.0);
        assert!(config.magnetic_field.inv_pt_to_r > config.magnetic_field.inv_pt_to_dphi);
    }
}
