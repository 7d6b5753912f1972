//! Lorentzian fit of a single resonance.
//!
//! Given:
//! - the wavelength axis
//! - the drop-port transmission in linear units
//! - the detected peak indices and which peak to fit
//!
//! we slice the fit window, seed `[λ0, α, γ]` from the data, run
//! Levenberg–Marquardt on the unnormalized Lorentzian and report parameters,
//! covariance and R².

use std::ops::Range;

use crate::error::FitError;
use crate::fit::window::fit_window;
use crate::math::{levenberg_marquardt, CurveModel, Lorentzian, LmOptions};

/// Smallest window worth fitting with three free parameters.
pub const MIN_WINDOW_SAMPLES: usize = 4;

/// Fitted lineshape for one resonance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResonanceFit {
    /// `[λ0, α, γ]` with `γ > 0`.
    pub params: [f64; 3],
    /// Row-major 3×3 covariance of `params`.
    pub covariance: [f64; 9],
    pub r_squared: f64,
    pub iterations: usize,
    pub window: Range<usize>,
}

impl ResonanceFit {
    pub fn center_nm(&self) -> f64 {
        self.params[0]
    }

    pub fn alpha(&self) -> f64 {
        self.params[1]
    }

    pub fn gamma_nm(&self) -> f64 {
        self.params[2]
    }
}

/// Fit peak number `i` of `peaks`.
pub fn fit_resonance(
    wavelength_nm: &[f64],
    transmission_lin: &[f64],
    peaks: &[usize],
    i: usize,
    opts: &LmOptions,
) -> Result<ResonanceFit, FitError> {
    let window = fit_window(peaks, i, wavelength_nm.len());
    let samples = window.len();
    if samples < MIN_WINDOW_SAMPLES {
        return Err(FitError::InsufficientData {
            samples,
            required: MIN_WINDOW_SAMPLES,
        });
    }

    let x = &wavelength_nm[window.clone()];
    let y = &transmission_lin[window.clone()];
    let seed = seed_parameters(x, y, peaks[i] - window.start);

    let solution = levenberg_marquardt(&Lorentzian, x, y, &seed, opts)?;

    let mut params = [solution.params[0], solution.params[1], solution.params[2]];
    let mut covariance = [0.0; 9];
    for r in 0..3 {
        for c in 0..3 {
            covariance[r * 3 + c] = solution.covariance[(r, c)];
        }
    }
    if params[2] < 0.0 {
        // (α, γ) and (−α, −γ) describe the same curve; report γ > 0.
        params[1] = -params[1];
        params[2] = -params[2];
        for (r, c) in [(0, 1), (0, 2), (1, 0), (2, 0)] {
            covariance[r * 3 + c] = -covariance[r * 3 + c];
        }
    }

    let fitted: Vec<f64> = x.iter().map(|&xi| Lorentzian.eval(xi, &params)).collect();
    let r_squared = r_squared(y, &fitted)?;

    tracing::debug!(
        peak = peaks[i],
        iterations = solution.iterations,
        r_squared,
        "lorentzian fit converged"
    );

    Ok(ResonanceFit {
        params,
        covariance,
        r_squared,
        iterations: solution.iterations,
        window,
    })
}

/// Initial `[λ0, α, γ]` for a window whose maximum sits at `peak`.
///
/// `γ` comes from the half-maximum width around the peak, floored at one
/// sample step; `α` then follows from the model's peak value `α/γ`.
pub fn seed_parameters(x: &[f64], y: &[f64], peak: usize) -> [f64; 3] {
    let height = y[peak];
    let half = height / 2.0;

    let mut left = peak;
    while left > 0 && y[left - 1] >= half {
        left -= 1;
    }
    let mut right = peak;
    while right + 1 < y.len() && y[right + 1] >= half {
        right += 1;
    }

    let step = if x.len() > 1 {
        (x[x.len() - 1] - x[0]) / (x.len() - 1) as f64
    } else {
        f64::EPSILON
    };
    let gamma = ((x[right] - x[left]) / 2.0).max(step);

    [x[peak], height * gamma, gamma]
}

/// `R² = 1 − Σ(y − ŷ)² / Σ(y − ȳ)²`.
pub fn r_squared(y: &[f64], fitted: &[f64]) -> Result<f64, FitError> {
    let n = y.len() as f64;
    let mean = y.iter().sum::<f64>() / n;
    let ss_tot: f64 = y.iter().map(|v| (v - mean) * (v - mean)).sum();
    if ss_tot <= 0.0 {
        return Err(FitError::FlatWindow);
    }
    let ss_res: f64 = y
        .iter()
        .zip(fitted)
        .map(|(v, f)| (v - f) * (v - f))
        .sum();
    Ok(1.0 - ss_res / ss_tot)
}
