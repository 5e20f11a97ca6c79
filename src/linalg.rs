//! Small dense linear algebra needed by the smooth function classifier.
//! The systems are k x k with k the number of eigenfunctions (tens to a few
//! hundred), so a straightforward Cholesky factorization is sufficient.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{Error, Result};

// Pivots at or below this are treated as a singular system.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Lower-triangular factor L of a symmetric positive definite matrix A = L·Lᵀ.
#[derive(Debug, Clone)]
pub struct Cholesky
{
    l: Array2<f64>,
}

impl Cholesky
{
    /// Factorizes `a`. Only the lower triangle of `a` is read.
    pub fn factor(a: ArrayView2<f64>) -> Result<Cholesky>
    {
        let (rows, cols) = a.dim();
        if rows != cols {
            return Err(Error::DimensionMismatch { what: "square system", expected: rows, found: cols });
        }
        let k = rows;
        let mut l = Array2::<f64>::zeros((k, k));
        for i in 0..k {
            for j in 0..=i {
                let mut sum = a[[i, j]];
                for p in 0..j {
                    sum -= l[[i, p]] * l[[j, p]];
                }
                if i == j {
                    if !(sum > PIVOT_TOLERANCE) {
                        return Err(Error::SingularSystem { row: i, pivot: sum });
                    }
                    l[[i, j]] = sum.sqrt();
                } else {
                    l[[i, j]] = sum / l[[j, j]];
                }
            }
        }
        Ok(Cholesky { l })
    }

    pub fn dim(&self) -> usize
    {
        self.l.nrows()
    }

    /// Solves A·x = rhs with forward then backward substitution.
    pub fn solve(&self, rhs: ArrayView1<f64>) -> Result<Array1<f64>>
    {
        let k = self.dim();
        if rhs.len() != k {
            return Err(Error::DimensionMismatch { what: "right-hand side", expected: k, found: rhs.len() });
        }

        // L·y = rhs
        let mut y = Array1::<f64>::zeros(k);
        for i in 0..k {
            let mut sum = rhs[i];
            for j in 0..i {
                sum -= self.l[[i, j]] * y[j];
            }
            y[i] = sum / self.l[[i, i]];
        }

        // Lᵀ·x = y
        let mut x = Array1::<f64>::zeros(k);
        for i in (0..k).rev() {
            let mut sum = y[i];
            for j in (i + 1)..k {
                sum -= self.l[[j, i]] * x[j];
            }
            x[i] = sum / self.l[[i, i]];
        }

        Ok(x)
    }
}

#[cfg(test)]
mod tests
{
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    #[test]
    fn solves_identity()
    {
        let a = Array2::<f64>::eye(3);
        let x = Cholesky::factor(a.view()).unwrap().solve(array![3.0, 7.0, -1.0].view()).unwrap();
        assert_abs_diff_eq!(x, array![3.0, 7.0, -1.0], epsilon = 1e-12);
    }

    #[test]
    fn solves_2x2()
    {
        // [[4, 2], [2, 3]]·[1, 2] = [8, 8]
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let x = Cholesky::factor(a.view()).unwrap().solve(array![8.0, 8.0].view()).unwrap();
        assert_abs_diff_eq!(x, array![1.0, 2.0], epsilon = 1e-10);
    }

    #[test]
    fn rejects_indefinite_matrix()
    {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        match Cholesky::factor(a.view()) {
            Err(Error::SingularSystem { row, .. }) => assert_eq!(row, 1),
            other => panic!("Expected a singular system, got {:?}", other),
        }
    }

    #[test]
    fn rejects_wrong_rhs_length()
    {
        let chol = Cholesky::factor(Array2::<f64>::eye(2).view()).unwrap();
        assert!(matches!(chol.solve(array![1.0].view()), Err(Error::DimensionMismatch { .. })));
    }
}
