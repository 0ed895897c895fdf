//! Dense `f64` matrix helpers for the small systems this crate solves:
//! KKT systems of the QP subproblem, OLS normal equations and Cholesky
//! factors of covariance matrices. Dimensions are the asset or factor
//! count, so plain `Vec<Vec<f64>>` storage is used throughout.

use crate::error::WalkForwardError;
use crate::WalkForwardResult;

/// Pivots smaller than this are treated as zero.
const PIVOT_EPSILON: f64 = 1e-14;

/// Dot product.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Matrix-vector multiplication.
pub fn mat_vec_multiply(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| dot(row, v)).collect()
}

/// Quadratic form v' * M * v.
pub fn quadratic_form(mat: &[Vec<f64>], v: &[f64]) -> f64 {
    dot(v, &mat_vec_multiply(mat, v))
}

/// Transpose an m x n matrix.
pub fn mat_transpose(a: &[Vec<f64>]) -> Vec<Vec<f64>> {
    if a.is_empty() {
        return Vec::new();
    }
    let m = a.len();
    let n = a[0].len();
    (0..n).map(|j| (0..m).map(|i| a[i][j]).collect()).collect()
}

/// Multiply m x p matrix by p x n matrix.
#[allow(clippy::needless_range_loop)]
pub fn mat_multiply(a: &[Vec<f64>], b: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let m = a.len();
    let p = if m > 0 { a[0].len() } else { 0 };
    let n_cols = if !b.is_empty() { b[0].len() } else { 0 };
    let mut c = vec![vec![0.0; n_cols]; m];
    for i in 0..m {
        for k in 0..p {
            let aik = a[i][k];
            if aik == 0.0 {
                continue;
            }
            for j in 0..n_cols {
                c[i][j] += aik * b[k][j];
            }
        }
    }
    c
}

/// Solve `A x = b` by Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
pub fn solve_linear_system(a: &[Vec<f64>], b: &[f64], context: &str) -> WalkForwardResult<Vec<f64>> {
    let n = a.len();
    if b.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(WalkForwardError::InvalidInput {
            field: context.into(),
            reason: format!("Expected a square {}x{} system", n, n),
        });
    }

    let mut aug: Vec<Vec<f64>> = a
        .iter()
        .zip(b.iter())
        .map(|(row, bi)| {
            let mut r = row.clone();
            r.push(*bi);
            r
        })
        .collect();

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }
        if max_val < PIVOT_EPSILON || !max_val.is_finite() {
            return Err(WalkForwardError::SingularMatrix {
                context: context.into(),
            });
        }
        if max_row != col {
            aug.swap(col, max_row);
        }

        for row in (col + 1)..n {
            let factor = aug[row][col] / aug[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..=n {
                aug[row][k] -= factor * aug[col][k];
            }
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| aug[row][k] * x[k]).sum();
        x[row] = (aug[row][n] - tail) / aug[row][row];
    }
    Ok(x)
}

/// Matrix inverse via Gauss-Jordan with partial pivoting.
#[allow(clippy::needless_range_loop)]
pub fn mat_inverse(mat: &[Vec<f64>], context: &str) -> WalkForwardResult<Vec<Vec<f64>>> {
    let n = mat.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut aug: Vec<Vec<f64>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut row = Vec::with_capacity(2 * n);
        row.extend_from_slice(&mat[i]);
        for j in 0..n {
            row.push(if i == j { 1.0 } else { 0.0 });
        }
        aug.push(row);
    }

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < PIVOT_EPSILON || !max_val.is_finite() {
            return Err(WalkForwardError::SingularMatrix {
                context: context.into(),
            });
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }

        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
    }

    Ok(aug.iter().map(|row| row[n..].to_vec()).collect())
}

/// Lower-triangular Cholesky factor L with `A = L L'`.
///
/// Fails when `A` is not symmetric positive definite.
#[allow(clippy::needless_range_loop)]
pub fn cholesky(a: &[Vec<f64>], context: &str) -> WalkForwardResult<Vec<Vec<f64>>> {
    let n = a.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let diag = a[i][i] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return Err(WalkForwardError::SingularMatrix {
                        context: context.into(),
                    });
                }
                l[i][j] = diag.sqrt();
            } else {
                l[i][j] = (a[i][j] - sum) / l[j][j];
            }
        }
    }
    Ok(l)
}
