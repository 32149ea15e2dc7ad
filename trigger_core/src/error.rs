//! Fatal error taxonomy.
//!
//! Only the three *fatal* kinds below are represented as `Result::Err`.
//! Algorithmic rejections (a track failing validity, a duplicate-removed
//! candidate) are never errors — they simply do not appear in the returned
//! collection. Soft anomalies (firmware-rule violations, excess line
//! gradient) are counted in [`crate::diagnostics::Diagnostics`], never raised.

use thiserror::Error;

/// Fatal conditions that abort the current event.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A configuration value is internally inconsistent (e.g. 2x2 merging
    /// requested with odd HT dimensions, an unknown fitter name).
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    /// A digitised quantity fell outside its declared fixed-point range.
    #[error("digitisation range overflow: {0}")]
    DigitisationRangeOverflow(String),

    /// An internal invariant was violated (e.g. a sub-sector mask of the
    /// wrong length, or a digitised-bend access under a firmware variant
    /// that does not expose it).
    #[error("internal consistency violation: {0}")]
    InternalConsistencyViolation(String),
}
