//! Error types.
//!
//! Two layers:
//!
//! - `AppError` is what the binary sees: a message plus the process exit code.
//! - the typed enums below describe failures of a single unit of work (one
//!   spectrum, one sweep, one resonance, one store call). The batch loop turns
//!   sweep- and resonance-level errors into skipped work, and only store
//!   failures escalate to `AppError`.

use thiserror::Error;

use crate::domain::{ReferenceKey, SweepKey};

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::new(4, format!("Storage error: {err}"))
    }
}

/// Rejected spectrum at construction (or deserialization) time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectrumError {
    #[error("spectrum is empty")]
    Empty,
    #[error("wavelength has {wavelength} samples but transmission has {transmission}")]
    LengthMismatch { wavelength: usize, transmission: usize },
    #[error("non-finite value at index {index}")]
    NonFinite { index: usize },
    #[error("wavelength not strictly ascending at index {index}")]
    NotAscending { index: usize },
}

/// Sweep-level failures. Each one skips only the offending sweep.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SweepError {
    #[error(
        "wavelength grid mismatch for {key}: raw has {raw_len} samples over [{raw_start}, {raw_end}] nm, \
         reference has {reference_len} over [{reference_start}, {reference_end}] nm"
    )]
    GridMismatch {
        key: SweepKey,
        raw_len: usize,
        raw_start: f64,
        raw_end: f64,
        reference_len: usize,
        reference_start: f64,
        reference_end: f64,
    },
    #[error("unrecognized port type for {key}: orientation {orientation}, output {output}")]
    UnrecognizedPortType {
        key: SweepKey,
        orientation: String,
        output: u8,
    },
    #[error("no reference sweep '{reference}' for {key}")]
    ReferenceNotFound { key: SweepKey, reference: ReferenceKey },
    #[error("no measurement record for {key}")]
    MeasurementNotFound { key: SweepKey },
    #[error("no device '{device_id}' for {key}")]
    DeviceNotFound { key: SweepKey, device_id: String },
    #[error("de-embedded spectrum of {key} is invalid: {source}")]
    InvalidSpectrum {
        key: SweepKey,
        #[source]
        source: SpectrumError,
    },
}

impl SweepError {
    /// Short, stable name of the failure kind (used in summaries).
    pub fn kind(&self) -> &'static str {
        match self {
            SweepError::GridMismatch { .. } => "grid_mismatch",
            SweepError::UnrecognizedPortType { .. } => "unrecognized_port_type",
            SweepError::ReferenceNotFound { .. } => "reference_not_found",
            SweepError::MeasurementNotFound { .. } => "measurement_not_found",
            SweepError::DeviceNotFound { .. } => "device_not_found",
            SweepError::InvalidSpectrum { .. } => "invalid_spectrum",
        }
    }

    pub fn key(&self) -> SweepKey {
        match self {
            SweepError::GridMismatch { key, .. }
            | SweepError::UnrecognizedPortType { key, .. }
            | SweepError::ReferenceNotFound { key, .. }
            | SweepError::MeasurementNotFound { key }
            | SweepError::DeviceNotFound { key, .. }
            | SweepError::InvalidSpectrum { key, .. } => *key,
        }
    }
}

/// Resonance-level fit failure. Skips only the one resonance.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("fit window has {samples} samples, need at least {required}")]
    InsufficientData { samples: usize, required: usize },
    #[error("no convergence after {iterations} iterations")]
    NoConvergence { iterations: usize },
    #[error("singular covariance (J^T J not positive definite)")]
    SingularCovariance,
    #[error("non-finite model value during fit")]
    NonFinite,
    #[error("fit window has zero variance")]
    FlatWindow,
}

impl FitError {
    pub fn kind(&self) -> &'static str {
        match self {
            FitError::InsufficientData { .. } => "insufficient_data",
            FitError::NoConvergence { .. } => "no_convergence",
            FitError::SingularCovariance => "singular_covariance",
            FitError::NonFinite => "non_finite",
            FitError::FlatWindow => "flat_window",
        }
    }
}

/// Failure of the backing store. These abort the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid store snapshot '{path}': {source}")]
    Snapshot {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("commit failed: {0}")]
    Commit(String),
}
