//! Input/output helpers.
//!
//! - fit-record CSV export (`export`)
//!
//! Corpus files are read by the JSON store (`store::json`).

pub mod export;

pub use export::*;
