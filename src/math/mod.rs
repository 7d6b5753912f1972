//! Mathematical utilities: the resonance lineshape and nonlinear least squares.

pub mod lm;
pub mod lorentzian;
pub mod ols;

pub use lm::*;
pub use lorentzian::*;
pub use ols::*;
