//! Unnormalized Lorentzian lineshape.
//!
//! ```text
//! L(λ; λ0, α, γ) = α·γ / ((λ − λ0)² + γ²)
//! ```
//!
//! Parameter order everywhere is `[λ0, α, γ]`. The peak value is `α/γ` and the
//! half width at half maximum is `|γ|`.

use crate::math::lm::CurveModel;

/// Evaluate the lineshape at `x`.
pub fn lorentzian(x: f64, center: f64, alpha: f64, gamma: f64) -> f64 {
    let u = x - center;
    alpha * gamma / (u * u + gamma * gamma)
}

/// The three-parameter Lorentzian as a least-squares model.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lorentzian;

impl Lorentzian {
    pub const PARAMS: usize = 3;
}

impl CurveModel for Lorentzian {
    fn param_count(&self) -> usize {
        Self::PARAMS
    }

    fn eval(&self, x: f64, params: &[f64]) -> f64 {
        lorentzian(x, params[0], params[1], params[2])
    }

    fn partials(&self, x: f64, params: &[f64], out: &mut [f64]) {
        let (center, alpha, gamma) = (params[0], params[1], params[2]);
        let u = x - center;
        let d = u * u + gamma * gamma;
        let d2 = d * d;

        out[0] = 2.0 * alpha * gamma * u / d2;
        out[1] = gamma / d;
        out[2] = alpha * (u * u - gamma * gamma) / d2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_value_and_half_maximum() {
        let (c, a, g) = (1550.0, 0.8, 0.05);
        let peak = lorentzian(c, c, a, g);
        assert!((peak - a / g).abs() < 1e-12);
        assert!((lorentzian(c + g, c, a, g) - peak / 2.0).abs() < 1e-9);
        assert!((lorentzian(c - g, c, a, g) - peak / 2.0).abs() < 1e-9);
    }

    #[test]
    fn analytic_partials_match_finite_differences() {
        let params = [1550.02, 0.8, 0.05];
        let mut analytic = [0.0; 3];
        for &x in &[1549.9, 1550.0, 1550.03, 1550.2] {
            Lorentzian.partials(x, &params, &mut analytic);
            for k in 0..3 {
                let h = 1e-6;
                let mut hi = params;
                let mut lo = params;
                hi[k] += h;
                lo[k] -= h;
                let numeric = (Lorentzian.eval(x, &hi) - Lorentzian.eval(x, &lo)) / (2.0 * h);
                let scale = numeric.abs().max(1.0);
                assert!(
                    (analytic[k] - numeric).abs() / scale < 1e-5,
                    "param {k} at x={x}: analytic {} vs numeric {numeric}",
                    analytic[k]
                );
            }
        }
    }
}
