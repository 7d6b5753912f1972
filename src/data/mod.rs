//! Deterministic synthetic data.
//!
//! Used by unit tests and by `wdm demo`, which reduces a generated corpus
//! without touching any files.

pub mod synthetic;

pub use synthetic::*;
