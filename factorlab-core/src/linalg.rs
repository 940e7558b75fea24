//! Dense linear algebra on `ndarray` matrices: sample covariance, inverse
//! and symmetric eigen-decomposition.

use ndarray::{Array1, Array2, Axis};

use crate::error::{ResearchError, Result};

/// Sample covariance of the columns of `data` (`ddof` 0 or 1).
pub fn covariance(data: &Array2<f64>, ddof: usize) -> Result<Array2<f64>> {
    let n = data.nrows();
    if n <= ddof {
        return Err(ResearchError::insufficient("covariance", ddof + 1, n));
    }
    let mean = data
        .mean_axis(Axis(0))
        .ok_or_else(|| ResearchError::insufficient("covariance", 1, 0))?;
    let centered = data - &mean;
    Ok(centered.t().dot(&centered) / (n - ddof) as f64)
}

/// Gauss-Jordan inverse with partial pivoting.
///
/// Fails with `NumericalDegenerate` when a pivot vanishes.
pub fn invert(m: &Array2<f64>) -> Result<Array2<f64>> {
    let n = m.nrows();
    if m.ncols() != n {
        return Err(ResearchError::NumericalDegenerate(format!(
            "cannot invert a {n}x{} matrix",
            m.ncols()
        )));
    }
    let scale = m
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()))
        .max(f64::MIN_POSITIVE);
    let mut a = m.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&x, &y| a[[x, col]].abs().total_cmp(&a[[y, col]].abs()))
            .unwrap_or(col);
        let pivot = a[[pivot_row, col]];
        if !pivot.is_finite() || pivot.abs() <= 1e-14 * scale {
            return Err(ResearchError::NumericalDegenerate(format!(
                "singular matrix (pivot {pivot:e} at column {col})"
            )));
        }
        if pivot_row != col {
            for j in 0..n {
                a.swap([col, j], [pivot_row, j]);
                inv.swap([col, j], [pivot_row, j]);
            }
        }

        a.row_mut(col).mapv_inplace(|v| v / pivot);
        inv.row_mut(col).mapv_inplace(|v| v / pivot);
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[[row, j]] -= factor * a[[col, j]];
                inv[[row, j]] -= factor * inv[[col, j]];
            }
        }
    }
    Ok(inv)
}

/// Eigen-decomposition of a symmetric matrix.
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Descending.
    pub eigenvalues: Array1<f64>,
    /// Column `k` is the unit eigenvector for `eigenvalues[k]`.
    pub eigenvectors: Array2<f64>,
}

impl EigenDecomposition {
    /// Cyclic Jacobi rotations, sorted by eigenvalue.
    pub fn from_symmetric(matrix: &Array2<f64>) -> Self {
        let n = matrix.nrows();
        let mut a = matrix.clone();
        let mut v = Array2::<f64>::eye(n);

        let norm: f64 = a.iter().map(|x| x * x).sum();
        let tol = 1e-24 * norm.max(f64::MIN_POSITIVE);

        for _sweep in 0..100 {
            let off: f64 = (0..n)
                .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
                .map(|(i, j)| a[[i, j]] * a[[i, j]])
                .sum();
            if off <= tol {
                break;
            }
            for p in 0..n {
                for q in (p + 1)..n {
                    rotate(&mut a, &mut v, p, q);
                }
            }
        }

        let diag = a.diag();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&x, &y| diag[y].total_cmp(&diag[x]));
        Self {
            eigenvalues: order.iter().map(|&k| diag[k]).collect(),
            eigenvectors: v.select(Axis(1), &order),
        }
    }
}

/// Zero `a[p, q]` with one Jacobi rotation, accumulating it into `v`.
fn rotate(a: &mut Array2<f64>, v: &mut Array2<f64>, p: usize, q: usize) {
    let n = a.nrows();
    let apq = a[[p, q]];
    if apq.abs() <= f64::MIN_POSITIVE {
        return;
    }
    let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
    let t = if theta == 0.0 {
        1.0
    } else {
        theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt())
    };
    let c = 1.0 / (t * t + 1.0).sqrt();
    let s = t * c;

    for k in 0..n {
        if k == p || k == q {
            continue;
        }
        let (akp, akq) = (a[[k, p]], a[[k, q]]);
        a[[k, p]] = c * akp - s * akq;
        a[[p, k]] = a[[k, p]];
        a[[k, q]] = s * akp + c * akq;
        a[[q, k]] = a[[k, q]];
    }
    a[[p, p]] -= t * apq;
    a[[q, q]] += t * apq;
    a[[p, q]] = 0.0;
    a[[q, p]] = 0.0;

    for k in 0..n {
        let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
        v[[k, p]] = c * vkp - s * vkq;
        v[[k, q]] = s * vkp + c * vkq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_approx(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "expected {b}, got {a}");
    }

    #[test]
    fn inverse_of_2x2() {
        let m = array![[4.0, 7.0], [2.0, 6.0]];
        let inv = invert(&m).unwrap();
        assert_approx(inv[[0, 0]], 0.6, 1e-12);
        assert_approx(inv[[0, 1]], -0.7, 1e-12);
        assert_approx(inv[[1, 0]], -0.2, 1e-12);
        assert_approx(inv[[1, 1]], 0.4, 1e-12);
    }

    #[test]
    fn inverse_needs_pivoting() {
        let m = array![[0.0, 1.0], [1.0, 0.0]];
        let inv = invert(&m).unwrap();
        let id = m.dot(&inv);
        assert_approx(id[[0, 0]], 1.0, 1e-12);
        assert_approx(id[[0, 1]], 0.0, 1e-12);
    }

    #[test]
    fn singular_matrix_is_degenerate() {
        let m = array![[1.0, 2.0], [2.0, 4.0]];
        let err = invert(&m).unwrap_err();
        assert!(matches!(err, ResearchError::NumericalDegenerate(_)));
    }

    #[test]
    fn covariance_ddof() {
        let rows = array![[1.0, 2.0], [3.0, 6.0]];
        let c1 = covariance(&rows, 1).unwrap();
        assert_approx(c1[[0, 0]], 2.0, 1e-12);
        assert_approx(c1[[0, 1]], 4.0, 1e-12);
        assert_approx(c1[[1, 1]], 8.0, 1e-12);
        let c0 = covariance(&rows, 0).unwrap();
        assert_approx(c0[[0, 0]], 1.0, 1e-12);
        assert!(covariance(&rows.slice(ndarray::s![..1, ..]).to_owned(), 1).is_err());
    }

    #[test]
    fn eigen_of_known_matrix() {
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        let e = EigenDecomposition::from_symmetric(&m);
        assert_approx(e.eigenvalues[0], 3.0, 1e-12);
        assert_approx(e.eigenvalues[1], 1.0, 1e-12);
        let v = e.eigenvectors.column(0);
        assert_approx(v[0].abs(), 1.0 / 2f64.sqrt(), 1e-9);
        assert_approx(v[0], v[1], 1e-9);
    }

    #[test]
    fn eigen_vectors_reconstruct() {
        let m = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 1.0]];
        let e = EigenDecomposition::from_symmetric(&m);
        for (k, val) in e.eigenvalues.iter().enumerate() {
            let vec = e.eigenvectors.column(k);
            let mv = m.dot(&vec);
            for (a, b) in mv.iter().zip(vec.iter()) {
                assert_approx(*a, val * b, 1e-9);
            }
        }
        assert!(e.eigenvalues.to_vec().windows(2).all(|w| w[0] >= w[1]));
        assert_approx(e.eigenvalues.sum(), 8.0, 1e-9);
    }

    #[test]
    fn identity_has_repeated_eigenvalues() {
        let e = EigenDecomposition::from_symmetric(&Array2::eye(3));
        assert!(e.eigenvalues.iter().all(|v| (v - 1.0).abs() < 1e-12));
    }
}
