//! Linear least squares via SVD.
//!
//! The Levenberg–Marquardt step is normally solved through a Cholesky
//! factorization of the damped normal equations. When that factorization
//! fails (the damped matrix is numerically indefinite) the step is solved
//! here instead, on the equivalent augmented system:
//!
//! ```text
//! | J         |       | r |
//! | sqrt(λ D) | δ  ≈  | 0 |
//! ```
//!
//! Nalgebra's `QR::solve` only handles square systems, so SVD it is. The
//! systems are tall and three columns wide, so cost is irrelevant.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Progressively looser singular-value cutoffs.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn augmented_damping_rows_shrink_the_step() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 10.0, 0.0, 0.0, 10.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 0.0, 0.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!(beta[0].abs() < 2.0);
        assert!(beta[1].abs() < 3.0);
    }
}
