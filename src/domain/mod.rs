//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - ingested inputs (`RawSweep`, `ReferenceSweep`, `Measurement`, `Device`)
//! - derived outputs (`MainSweep`, `FitRecord`)
//! - the validated `Spectrum` container and the record keys
//! - run configuration (`ReductionConfig`)

pub mod config;
pub mod types;

pub use types::*;
