//! Dense linear solves for kriging systems, trend regression and
//! Levenberg–Marquardt steps.
//!
//! Systems here are small (neighbourhood size plus drift terms), so plain
//! Gaussian elimination with partial pivoting is enough. Kriging matrices
//! with drift terms are symmetric but indefinite (zero Lagrange block),
//! which rules out Cholesky.

use geostat_core::{Error, Result};
use ndarray::{Array1, Array2};

/// Pivots smaller than this fraction of the largest matrix entry count as zero.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solve `a · x = b` in place.
///
/// # Errors
/// [`Error::SingularSystem`] when a pivot vanishes relative to the matrix
/// scale, or when the matrix is not square / mismatched with `b`.
pub(crate) fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return Err(Error::SingularSystem { size: n });
    }
    if n == 0 {
        return Ok(b);
    }

    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if !scale.is_finite() || scale == 0.0 {
        return Err(Error::SingularSystem { size: n });
    }
    let tolerance = scale * PIVOT_TOLERANCE;

    // Forward elimination
    for col in 0..n {
        let mut max_val = a[[col, col]].abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            let val = a[[row, col]].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val <= tolerance {
            return Err(Error::SingularSystem { size: n });
        }

        if max_row != col {
            for j in 0..n {
                a.swap([col, j], [max_row, j]);
            }
            b.swap(col, max_row);
        }

        let pivot = a[[col, col]];
        for row in (col + 1)..n {
            let factor = a[[row, col]] / pivot;
            if factor == 0.0 {
                continue;
            }
            a[[row, col]] = 0.0;
            for j in (col + 1)..n {
                a[[row, j]] -= factor * a[[col, j]];
            }
            b[row] -= factor * b[col];
        }
    }

    // Back substitution
    let mut x = Array1::<f64>::zeros(n);
    for col in (0..n).rev() {
        let mut sum = b[col];
        for j in (col + 1)..n {
            sum -= a[[col, j]] * x[j];
        }
        x[col] = sum / a[[col, col]];
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::SingularSystem { size: n });
    }
    Ok(x)
}

/// Ordinary least squares via the normal equations `(XᵀX)β = Xᵀz`.
///
/// `design` is n × p (one row per observation).
pub(crate) fn least_squares(design: &Array2<f64>, values: &Array1<f64>) -> Result<Array1<f64>> {
    let xt = design.t();
    let xtx = xt.dot(design);
    let xtz = xt.dot(values);
    solve(xtx, xtz)
}
