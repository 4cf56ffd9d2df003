use ndarray::Array2;

use crate::constants::{PSD_PIVOT_TOL, SINGULAR_PIVOT};

/// Lower Cholesky factor of a symmetric positive semi-definite matrix.
///
/// Pivots within `PSD_PIVOT_TOL` of zero are treated as exact zeros and the
/// matching column is left empty, so singular correlation matrices (for
/// example duplicated weight configurations) factor cleanly. Returns the
/// offending row index when a pivot is clearly negative.
pub fn cholesky_psd(matrix: &Array2<f64>) -> Result<Array2<f64>, usize> {
    let n = matrix.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut s = matrix[[i, j]];
            for k in 0..j {
                s -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if s < -PSD_PIVOT_TOL {
                    return Err(i);
                }
                l[[i, i]] = if s <= PSD_PIVOT_TOL { 0.0 } else { s.sqrt() };
            } else if l[[j, j]] > SINGULAR_PIVOT {
                l[[i, j]] = s / l[[j, j]];
            } else if s.abs() > PSD_PIVOT_TOL.sqrt() {
                return Err(i);
            }
        }
    }
    Ok(l)
}

pub fn is_symmetric(matrix: &Array2<f64>, tol: f64) -> bool {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return false;
    }
    (0..n).all(|i| (0..i).all(|j| (matrix[[i, j]] - matrix[[j, i]]).abs() <= tol))
}
