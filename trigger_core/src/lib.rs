//! # Track-Finding Engine
//!
//! Level-1 hardware-trigger track reconstruction: stubs enter sectorised,
//! cross an r-φ Hough Transform to find 2-D candidates, pass through r-z
//! filters (and optionally a second, r-z Hough Transform), get assembled
//! into 3-D candidates, deduplicated, fitted, and deduplicated again.
//!
//! ## Pipeline
//!
//! 1. [`stub`] / [`digital_stub`] — per-hit stub records and their
//!    fixed-point digitised states.
//! 2. [`sector`] — φ/η sector membership.
//! 3. [`ht_cell`] / [`ht_rphi`] — the r-φ Hough-Transform accumulator array.
//! 4. [`rz_filter`] — η, z_trk, and seed filters run on r-φ candidates.
//! 5. [`ht_rz`] — the optional r-z Hough-Transform array.
//! 6. [`track`] — 2-D, 3-D, and fitted track candidate types.
//! 7. [`dup_removal`] — the numbered duplicate-removal algorithm registry.
//! 8. [`fitter`] / [`fit_linear`] / [`fit_linearised_chisq`] / [`kalman`] —
//!    the fitter back-ends and their dispatch.
//! 9. [`ht_pair`] — per-sector orchestration across all of the above.
//! 10. [`diagnostics`] — soft-anomaly counters collected along the way.
//!
//! Stubs live in one event-scoped arena; every other type refers to them by
//! [`stub::StubIndex`] rather than owning them.

pub mod diagnostics;
pub mod digital_stub;
pub mod dup_removal;
pub mod error;
pub mod fit_linear;
pub mod fit_linearised_chisq;
pub mod fitter;
pub mod ht_cell;
pub mod ht_pair;
pub mod ht_rphi;
pub mod ht_rz;
pub mod kalman;
pub mod rz_filter;
pub mod sector;
pub mod stub;
pub mod track;
