//! `wdm-fom` library crate.
//!
//! Reduces WDM ring-resonator sweeps to per-resonance figures of merit:
//! de-embedding against grating-coupler references, peak detection, FSR,
//! Lorentzian fits and the FOMs derived from them, run as a resumable batch
//! job over a `SweepStore`.
//!
//! The binary (`wdm`) is a thin wrapper around this library so that the
//! pipeline is testable without spawning processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod deembed;
pub mod domain;
pub mod error;
pub mod fit;
pub mod fom;
pub mod io;
pub mod math;
pub mod peaks;
pub mod report;
pub mod store;
