//! Levenberg–Marquardt nonlinear least squares.
//!
//! Minimizes
//!
//! ```text
//! S(p) = Σ (y_i − f(x_i; p))²
//! ```
//!
//! with unit weights. Each iteration solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = Jᵀ r
//! ```
//!
//! (Marquardt scaling, so parameters on very different scales such as a
//! 1550 nm center and a 0.05 nm half width share one damping factor). The
//! damping shrinks by 10× after an accepted step and grows by 10× after a
//! rejected one.
//!
//! Termination:
//! - relative SSE reduction below `ftol`
//! - step below `xtol` relative to the parameter vector (accepted or not: a
//!   rejected step this small means floating point has bottomed out)
//! - otherwise `FitError::NoConvergence` once `max_iterations` is spent

use nalgebra::{DMatrix, DVector};

use crate::error::FitError;
use crate::math::ols::solve_least_squares;

/// A model that is nonlinear in its parameters and has analytic partials.
pub trait CurveModel {
    fn param_count(&self) -> usize;

    fn eval(&self, x: f64, params: &[f64]) -> f64;

    /// Write `∂f/∂p_k` at `x` into `out[k]`.
    fn partials(&self, x: f64, params: &[f64], out: &mut [f64]);
}

#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-12,
            xtol: 1e-12,
        }
    }
}

/// Converged solution.
#[derive(Debug, Clone)]
pub struct LmSolution {
    pub params: Vec<f64>,
    /// Sum of squared residuals at `params`.
    pub sse: f64,
    pub iterations: usize,
    /// Parameter covariance, `(JᵀJ)⁻¹ · SSE/(n − k)`.
    pub covariance: DMatrix<f64>,
}

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-15;
const LAMBDA_MAX: f64 = 1e16;
const DIAG_FLOOR: f64 = 1e-300;

/// Fit `model` to `(x, y)` starting from `p0`.
pub fn levenberg_marquardt<M: CurveModel>(
    model: &M,
    x: &[f64],
    y: &[f64],
    p0: &[f64],
    opts: &LmOptions,
) -> Result<LmSolution, FitError> {
    let k = model.param_count();
    let n = x.len();
    if n != y.len() || p0.len() != k || n <= k {
        return Err(FitError::InsufficientData {
            samples: n.min(y.len()),
            required: k + 1,
        });
    }

    let mut params = DVector::from_column_slice(p0);
    let mut sse = sum_squared_residuals(model, x, y, params.as_slice()).ok_or(FitError::NonFinite)?;
    let mut lambda = LAMBDA_INIT;

    let mut iterations = 0;
    let mut converged = false;

    while iterations < opts.max_iterations {
        iterations += 1;

        let (jac, resid) = jacobian_and_residuals(model, x, y, params.as_slice()).ok_or(FitError::NonFinite)?;
        let jtj = jac.transpose() * &jac;
        let jtr = jac.transpose() * &resid;

        let mut accepted = false;
        let mut step_norm = f64::INFINITY;

        while lambda <= LAMBDA_MAX {
            let Some(delta) = damped_step(&jac, &resid, &jtj, &jtr, lambda) else {
                lambda *= 10.0;
                continue;
            };
            step_norm = delta.norm();

            let trial = &params + &delta;
            match sum_squared_residuals(model, x, y, trial.as_slice()) {
                Some(trial_sse) if trial_sse < sse => {
                    let reduction = sse - trial_sse;
                    params = trial;
                    let previous = sse;
                    sse = trial_sse;
                    lambda = (lambda / 10.0).max(LAMBDA_MIN);
                    accepted = true;

                    if reduction <= opts.ftol * previous {
                        converged = true;
                    }
                    break;
                }
                _ => {
                    if step_is_negligible(step_norm, &params, opts.xtol) {
                        break;
                    }
                    lambda *= 10.0;
                }
            }
        }

        if step_is_negligible(step_norm, &params, opts.xtol) {
            converged = true;
        }
        if converged {
            break;
        }
        if !accepted {
            // Damping saturated without finding a descent step.
            return Err(FitError::NoConvergence { iterations });
        }
    }

    if !converged {
        return Err(FitError::NoConvergence { iterations });
    }

    let covariance = covariance(model, x, y, params.as_slice(), sse)?;
    Ok(LmSolution {
        params: params.iter().copied().collect(),
        sse,
        iterations,
        covariance,
    })
}

fn step_is_negligible(step_norm: f64, params: &DVector<f64>, xtol: f64) -> bool {
    step_norm.is_finite() && step_norm <= xtol * (params.norm() + xtol)
}

fn damped_step(
    jac: &DMatrix<f64>,
    resid: &DVector<f64>,
    jtj: &DMatrix<f64>,
    jtr: &DVector<f64>,
    lambda: f64,
) -> Option<DVector<f64>> {
    let k = jtj.nrows();
    let mut damped = jtj.clone();
    for i in 0..k {
        damped[(i, i)] += lambda * jtj[(i, i)].max(DIAG_FLOOR);
    }

    if let Some(chol) = damped.cholesky() {
        let delta = chol.solve(jtr);
        if delta.iter().all(|v| v.is_finite()) {
            return Some(delta);
        }
    }

    // Fall back to the augmented least-squares form.
    let n = jac.nrows();
    let mut aug = DMatrix::<f64>::zeros(n + k, k);
    aug.view_mut((0, 0), (n, k)).copy_from(jac);
    for i in 0..k {
        aug[(n + i, i)] = (lambda * jtj[(i, i)].max(DIAG_FLOOR)).sqrt();
    }
    let mut rhs = DVector::<f64>::zeros(n + k);
    rhs.rows_mut(0, n).copy_from(resid);
    solve_least_squares(&aug, &rhs)
}

fn jacobian_and_residuals<M: CurveModel>(
    model: &M,
    x: &[f64],
    y: &[f64],
    params: &[f64],
) -> Option<(DMatrix<f64>, DVector<f64>)> {
    let k = model.param_count();
    let n = x.len();
    let mut jac = DMatrix::<f64>::zeros(n, k);
    let mut resid = DVector::<f64>::zeros(n);
    let mut row = vec![0.0; k];

    for i in 0..n {
        let f = model.eval(x[i], params);
        model.partials(x[i], params, &mut row);
        if !f.is_finite() || row.iter().any(|v| !v.is_finite()) {
            return None;
        }
        resid[i] = y[i] - f;
        for j in 0..k {
            jac[(i, j)] = row[j];
        }
    }

    Some((jac, resid))
}

fn sum_squared_residuals<M: CurveModel>(model: &M, x: &[f64], y: &[f64], params: &[f64]) -> Option<f64> {
    let mut sse = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let r = yi - model.eval(xi, params);
        sse += r * r;
    }
    sse.is_finite().then_some(sse)
}

fn covariance<M: CurveModel>(
    model: &M,
    x: &[f64],
    y: &[f64],
    params: &[f64],
    sse: f64,
) -> Result<DMatrix<f64>, FitError> {
    let (jac, _) = jacobian_and_residuals(model, x, y, params).ok_or(FitError::NonFinite)?;
    let jtj = jac.transpose() * &jac;
    let inverse = jtj
        .cholesky()
        .map(|chol| chol.inverse())
        .ok_or(FitError::SingularCovariance)?;

    let dof = (x.len() - model.param_count()) as f64;
    let cov = inverse * (sse / dof);
    if cov.iter().all(|v| v.is_finite()) {
        Ok(cov)
    } else {
        Err(FitError::SingularCovariance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `y = a · exp(b · x)`.
    struct Exponential;

    impl CurveModel for Exponential {
        fn param_count(&self) -> usize {
            2
        }

        fn eval(&self, x: f64, params: &[f64]) -> f64 {
            params[0] * (params[1] * x).exp()
        }

        fn partials(&self, x: f64, params: &[f64], out: &mut [f64]) {
            let e = (params[1] * x).exp();
            out[0] = e;
            out[1] = params[0] * x * e;
        }
    }

    #[test]
    fn recovers_exponential_parameters_from_exact_data() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 2.5 * (-1.3 * xi).exp()).collect();

        let sol = levenberg_marquardt(&Exponential, &x, &y, &[1.0, -0.5], &LmOptions::default()).unwrap();
        assert!((sol.params[0] - 2.5).abs() < 1e-8, "a = {}", sol.params[0]);
        assert!((sol.params[1] + 1.3).abs() < 1e-8, "b = {}", sol.params[1]);
        assert!(sol.sse < 1e-16);
        assert_eq!(sol.covariance.nrows(), 2);
    }

    #[test]
    fn too_few_points_is_rejected() {
        let err = levenberg_marquardt(&Exponential, &[0.0, 1.0], &[1.0, 2.0], &[1.0, 1.0], &LmOptions::default())
            .unwrap_err();
        assert!(matches!(err, FitError::InsufficientData { .. }));
    }

    #[test]
    fn iteration_cap_reports_no_convergence() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 2.5 * (-1.3 * xi).exp()).collect();
        let opts = LmOptions {
            max_iterations: 1,
            ..LmOptions::default()
        };

        let err = levenberg_marquardt(&Exponential, &x, &y, &[1.0, 1.0], &opts).unwrap_err();
        assert_eq!(err, FitError::NoConvergence { iterations: 1 });
    }

    #[test]
    fn parameter_that_does_not_affect_the_model_gives_singular_covariance() {
        // `b` multiplies x = 0 everywhere, so its column of J is zero.
        let x = vec![0.0; 6];
        let y = vec![2.0; 6];
        let result = levenberg_marquardt(&Exponential, &x, &y, &[1.0, 0.3], &LmOptions::default());
        assert!(matches!(
            result,
            Err(FitError::SingularCovariance) | Err(FitError::NoConvergence { .. })
        ));
    }
}
