//! Shared configuration and constants for the track-trigger workspace.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and grouped per-subsystem types
//! - [`consts`] - Cross-cutting numeric bounds and geometry-tuned defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use trigger_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
