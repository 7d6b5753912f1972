//! Shared domain types.
//!
//! Inputs (`RawSweep`, `ReferenceSweep`, `Measurement`, `Device`) are
//! write-once values handed over by the ingestion side. `MainSweep` and
//! `FitRecord` are derived here and may be recomputed and overwritten at will.
//!
//! All of them are serializable so a store can persist them as-is.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpectrumError;

/// Identity of one sweep: `(measurement, sweep)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SweepKey {
    pub measurement_id: i64,
    pub sweep_id: u32,
}

impl SweepKey {
    pub fn new(measurement_id: i64, sweep_id: u32) -> Self {
        Self {
            measurement_id,
            sweep_id,
        }
    }
}

impl fmt::Display for SweepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "measurement_id={} sweep_id={}",
            self.measurement_id, self.sweep_id
        )
    }
}

/// Identity of one fit row: `(measurement, sweep, resonance index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FitKey {
    pub measurement_id: i64,
    pub sweep_id: u32,
    pub resonance_id: u32,
}

impl FitKey {
    pub fn sweep(&self) -> SweepKey {
        SweepKey::new(self.measurement_id, self.sweep_id)
    }
}

/// Wavelength (nm) / transmission (dB) pair.
///
/// Only obtainable through [`Spectrum::new`] (deserialization included), so a
/// value of this type always has equal, non-zero lengths, finite values and a
/// strictly ascending wavelength axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SpectrumRepr")]
pub struct Spectrum {
    wavelength_nm: Vec<f64>,
    transmission_db: Vec<f64>,
}

#[derive(Deserialize)]
struct SpectrumRepr {
    wavelength_nm: Vec<f64>,
    transmission_db: Vec<f64>,
}

impl TryFrom<SpectrumRepr> for Spectrum {
    type Error = SpectrumError;

    fn try_from(repr: SpectrumRepr) -> Result<Self, Self::Error> {
        Spectrum::new(repr.wavelength_nm, repr.transmission_db)
    }
}

impl Spectrum {
    pub fn new(wavelength_nm: Vec<f64>, transmission_db: Vec<f64>) -> Result<Self, SpectrumError> {
        if wavelength_nm.is_empty() {
            return Err(SpectrumError::Empty);
        }
        if wavelength_nm.len() != transmission_db.len() {
            return Err(SpectrumError::LengthMismatch {
                wavelength: wavelength_nm.len(),
                transmission: transmission_db.len(),
            });
        }
        for (index, (w, t)) in wavelength_nm.iter().zip(&transmission_db).enumerate() {
            if !(w.is_finite() && t.is_finite()) {
                return Err(SpectrumError::NonFinite { index });
            }
        }
        for index in 1..wavelength_nm.len() {
            if wavelength_nm[index] <= wavelength_nm[index - 1] {
                return Err(SpectrumError::NotAscending { index });
            }
        }
        Ok(Self {
            wavelength_nm,
            transmission_db,
        })
    }

    pub fn wavelength_nm(&self) -> &[f64] {
        &self.wavelength_nm
    }

    pub fn transmission_db(&self) -> &[f64] {
        &self.transmission_db
    }

    pub fn len(&self) -> usize {
        self.wavelength_nm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength_nm.is_empty()
    }

    pub fn start_nm(&self) -> f64 {
        self.wavelength_nm[0]
    }

    pub fn end_nm(&self) -> f64 {
        self.wavelength_nm[self.wavelength_nm.len() - 1]
    }

    /// Mean sample spacing (0 for a single-sample spectrum).
    pub fn mean_step_nm(&self) -> f64 {
        let n = self.len();
        if n < 2 {
            return 0.0;
        }
        (self.end_nm() - self.start_nm()) / (n - 1) as f64
    }
}

/// One measured (input, output) sweep of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSweep {
    pub key: SweepKey,
    pub input: u8,
    pub output: u8,
    #[serde(default)]
    pub voltage_v: Option<f64>,
    #[serde(default)]
    pub current_ma: Option<f64>,
    pub spectrum: Spectrum,
}

/// Measurement metadata needed to address a raw sweep's device and reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub measurement_id: i64,
    pub wafer_id: String,
    pub die_id: String,
    /// `None` for calibration (grating-coupler) measurements.
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Address of a grating-coupler reference sweep.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceKey {
    pub wafer_id: String,
    pub die_id: String,
    pub doe_column: u32,
    pub input: u8,
    pub output: u8,
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_WDM_RR_GCDE_C{}_C{}_{}",
            self.wafer_id, self.die_id, self.input, self.output, self.doe_column
        )
    }
}

/// Calibration spectrum subtracted from raw sweeps sharing its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSweep {
    pub key: ReferenceKey,
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub fiber_height_um: Option<f64>,
    pub spectrum: Spectrum,
}

/// Ring orientation on the die. Decides which output is the drop port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    #[serde(rename = "V")]
    Vertical,
    #[serde(rename = "H")]
    Horizontal,
}

impl Orientation {
    pub fn code(self) -> &'static str {
        match self {
            Orientation::Vertical => "V",
            Orientation::Horizontal => "H",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "V" | "v" => Ok(Orientation::Vertical),
            "H" | "h" => Ok(Orientation::Horizontal),
            other => Err(format!("unknown orientation '{other}' (expected V or H)")),
        }
    }
}

/// Static device metadata from the DOE catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub orientation: Orientation,
    #[serde(default)]
    pub bend_type: String,
    #[serde(default)]
    pub coupler_length_um: f64,
    #[serde(default)]
    pub doe_row: u32,
    pub doe_column: u32,
}

/// Ring-resonator output port class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    Drop,
    Thru,
}

impl PortType {
    pub fn as_str(self) -> &'static str {
        match self {
            PortType::Drop => "drop",
            PortType::Thru => "thru",
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// De-embedded sweep: raw transmission minus reference transmission (dB).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainSweep {
    pub key: SweepKey,
    /// Canonical id of the reference that was subtracted.
    pub reference_id: String,
    pub port_type: PortType,
    #[serde(default)]
    pub voltage_v: Option<f64>,
    #[serde(default)]
    pub current_ma: Option<f64>,
    pub spectrum: Spectrum,
}

/// Figures of merit for one fitted resonance.
///
/// `None` is the stored form of an undefined value (no next resonance for FSR,
/// negative radicand for the 1 dB bandwidth, non-positive amplitude for IL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRecord {
    pub key: FitKey,
    pub peak_wavelength_nm: f64,
    pub fsr_nm: Option<f64>,
    pub fwhm_nm: f64,
    pub bw_1db_nm: Option<f64>,
    pub crosstalk_db: Option<f64>,
    pub insertion_loss_db: Option<f64>,
    /// `[λ0, α, γ]`.
    pub fit_params: Vec<f64>,
    /// 3×3 parameter covariance, row-major.
    pub fit_covars: Vec<f64>,
    pub fit_rsquared: f64,
}

/// Default number of sweeps per batch (and per commit).
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Run configuration for the reduction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionConfig {
    /// Ingested corpora (JSON snapshots) merged into the store by `import`.
    pub sources: Vec<PathBuf>,
    pub batch_size: usize,
    /// Minimum peak prominence in linear transmission units.
    pub prominence_threshold: f64,
    /// Offset from resonance at which crosstalk is evaluated.
    pub crosstalk_offset_nm: f64,
    /// Wavelength at which per-device FOMs are reported.
    pub target_wavelength_nm: f64,
    pub target_bandwidth_1db_nm: f64,
    pub target_fsr_nm: f64,
    /// Iteration cap for one Lorentzian fit.
    pub max_iterations: usize,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            prominence_threshold: 0.5,
            crosstalk_offset_nm: 2.5,
            target_wavelength_nm: 1580.0,
            target_bandwidth_1db_nm: 0.374,
            target_fsr_nm: 12.8,
            max_iterations: 200,
        }
    }
}
