//! Resonance fitting.
//!
//! Responsibilities:
//!
//! - pick the fit window around each detected peak (`window`)
//! - seed and run the Lorentzian least-squares fit, report covariance and R²
//!   (`fitter`)

pub mod fitter;
pub mod window;

pub use fitter::*;
pub use window::*;
