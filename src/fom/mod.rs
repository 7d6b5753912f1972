//! Figures of merit derived from the Lorentzian fit parameters.
//!
//! All functions are closed forms of `(α, γ)`. An input outside a formula's
//! domain yields `NaN` rather than an error. `FitRecord` stores those as
//! `None` (see [`defined`]).
//!
//! - FWHM: `2γ`
//! - 1 dB bandwidth: `sqrt(α·γ²·10^0.1 − γ²)`
//! - crosstalk at offset Δ: `10·log10(α·γ² / (Δ² + γ²))`
//! - insertion loss: `−10·log10(α)`

use crate::domain::FitRecord;

/// Full width at half maximum.
pub fn fwhm(gamma: f64) -> f64 {
    2.0 * gamma
}

/// Bandwidth at 1 dB below the peak; `NaN` when the radicand is negative.
pub fn bandwidth_1db(alpha: f64, gamma: f64) -> f64 {
    let g2 = gamma * gamma;
    let radicand = alpha * g2 * 10f64.powf(0.1) - g2;
    if radicand < 0.0 {
        return f64::NAN;
    }
    radicand.sqrt()
}

/// Crosstalk (dB) at `offset_nm` from resonance; `NaN` when the log argument is not positive.
pub fn crosstalk(alpha: f64, gamma: f64, offset_nm: f64) -> f64 {
    let g2 = gamma * gamma;
    let ratio = alpha * g2 / (offset_nm * offset_nm + g2);
    if !(ratio > 0.0) {
        return f64::NAN;
    }
    10.0 * ratio.log10()
}

/// Drop-port insertion loss (dB); `NaN` for `α ≤ 0`.
pub fn insertion_loss(alpha: f64) -> f64 {
    if !(alpha > 0.0) {
        return f64::NAN;
    }
    -10.0 * alpha.log10()
}

/// Map the `NaN` sentinel (and infinities) to `None`.
pub fn defined(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Derived FOMs of one resonance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Foms {
    pub fwhm_nm: f64,
    pub bw_1db_nm: f64,
    pub crosstalk_db: f64,
    pub insertion_loss_db: f64,
}

pub fn extract(alpha: f64, gamma: f64, crosstalk_offset_nm: f64) -> Foms {
    Foms {
        fwhm_nm: fwhm(gamma),
        bw_1db_nm: bandwidth_1db(alpha, gamma),
        crosstalk_db: crosstalk(alpha, gamma, crosstalk_offset_nm),
        insertion_loss_db: insertion_loss(alpha),
    }
}

/// FOMs of one sweep interpolated at a wavelength of interest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FomsAtWavelength {
    pub wavelength_nm: f64,
    pub fsr_nm: Option<f64>,
    pub fwhm_nm: Option<f64>,
    pub bw_1db_nm: Option<f64>,
    pub crosstalk_db: Option<f64>,
    pub insertion_loss_db: Option<f64>,
}

/// Linearly interpolate a sweep's FOMs against resonance wavelength.
///
/// `records` must belong to one sweep. Returns `None` unless `target_nm` lies
/// within the span of the fitted resonances. A FOM that is undefined at
/// either bracketing resonance is undefined at the target.
pub fn evaluate_at_wavelength(records: &[FitRecord], target_nm: f64) -> Option<FomsAtWavelength> {
    let mut sorted: Vec<&FitRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.peak_wavelength_nm.total_cmp(&b.peak_wavelength_nm));

    let (lo, hi) = if let Some(exact) = sorted.iter().find(|r| r.peak_wavelength_nm == target_nm) {
        (*exact, *exact)
    } else {
        let upper = sorted.iter().position(|r| r.peak_wavelength_nm > target_nm)?;
        if upper == 0 {
            return None;
        }
        (sorted[upper - 1], sorted[upper])
    };

    let span = hi.peak_wavelength_nm - lo.peak_wavelength_nm;
    let t = if span > 0.0 {
        (target_nm - lo.peak_wavelength_nm) / span
    } else {
        0.0
    };
    let lerp = |a: Option<f64>, b: Option<f64>| match (a, b) {
        (Some(a), Some(b)) => defined(a + t * (b - a)),
        _ => None,
    };

    Some(FomsAtWavelength {
        wavelength_nm: target_nm,
        fsr_nm: lerp(lo.fsr_nm, hi.fsr_nm),
        fwhm_nm: lerp(Some(lo.fwhm_nm), Some(hi.fwhm_nm)),
        bw_1db_nm: lerp(lo.bw_1db_nm, hi.bw_1db_nm),
        crosstalk_db: lerp(lo.crosstalk_db, hi.crosstalk_db),
        insertion_loss_db: lerp(lo.insertion_loss_db, hi.insertion_loss_db),
    })
}
