//! Smooth function classifier over the eigenfunction basis.
//!
//! The label function is restricted to the span of the eigenvectors,
//! f = U·a, and fit by minimizing
//!     aᵀ·Σ·a + λ·(U·a - y)ᵀ(U·a - y)
//! where Σ holds the training eigenvalues (smoothness of each eigenvector)
//! and λ weighs agreement with the labelled samples. The minimizer solves
//!     (Σ + λ·UᵀU)·a = λ·Uᵀy
//! which is a k x k system shared by every concept.

use log::debug;
use ndarray::{Array2, ArrayView1, ArrayViewMut1};

use crate::error::{Error, Result};
use crate::linalg::Cholesky;
use crate::training::{validate_eigenvalues, ConceptId, TrainingSet};

#[derive(Debug, Clone, PartialEq)]
pub struct SmoothModel
{
    concepts: Vec<ConceptId>,
    /// Shape: (concepts, rank). Row c holds the coefficients for concept c.
    coefficients: Array2<f64>,
    label_weight: f64,
}

impl SmoothModel
{
    pub fn train(training: &TrainingSet, eigenvalues: ArrayView1<f64>, label_weight: f64) -> Result<SmoothModel>
    {
        if !(label_weight.is_finite() && label_weight > 0.0) {
            return Err(Error::InvalidParameter {
                name: "label_weight",
                reason: format!("must be finite and positive, got {}", label_weight),
            });
        }
        let rank = training.rank();
        validate_eigenvalues(eigenvalues, rank)?;

        let u = training.eigenvectors();
        let mut system = u.t().dot(&u) * label_weight;
        for (i, e) in eigenvalues.iter().enumerate() {
            system[[i, i]] += *e;
        }
        let cholesky = Cholesky::factor(system.view())?;

        let concepts = training.concepts().to_vec();
        let mut coefficients = Array2::<f64>::zeros((concepts.len(), rank));
        for (concept, mut row) in concepts.iter().zip(coefficients.rows_mut()) {
            let targets = training.one_vs_rest_targets(*concept);
            let rhs = u.t().dot(&targets) * label_weight;
            row.assign(&cholesky.solve(rhs.view())?);
        }
        debug!("Fit smooth function for {} concepts over {} eigenvectors", concepts.len(), rank);

        Ok(SmoothModel { concepts, coefficients, label_weight })
    }

    pub fn concepts(&self) -> &[ConceptId]
    {
        &self.concepts
    }

    pub fn rank(&self) -> usize
    {
        self.coefficients.ncols()
    }

    pub fn label_weight(&self) -> f64
    {
        self.label_weight
    }

    pub fn coefficients(&self) -> &Array2<f64>
    {
        &self.coefficients
    }

    pub(crate) fn decision_values_into(&self, x: ArrayView1<f64>, mut out: ArrayViewMut1<f64>)
    {
        for (o, a) in out.iter_mut().zip(self.coefficients.rows()) {
            *o = a.dot(&x);
        }
    }
}

#[cfg(test)]
mod tests
{
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    use super::*;

    fn indicator_training() -> TrainingSet
    {
        TrainingSet::new(
            array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]],
            vec![ConceptId(1), ConceptId(2), ConceptId(1), ConceptId(2)],
        ).unwrap()
    }

    #[test]
    fn closed_form_solution()
    {
        // UᵀU = 2I, Uᵀy_1 = [2, -2]. With λ = 100 and Σ = 100I:
        // (100 + 200)·a = 100·[2, -2]  =>  a = [2/3, -2/3].
        let model = SmoothModel::train(&indicator_training(), array![100.0, 100.0].view(), 100.0).unwrap();
        assert_abs_diff_eq!(model.coefficients().row(0), array![2.0 / 3.0, -2.0 / 3.0], epsilon = 1e-12);
        assert_abs_diff_eq!(model.coefficients().row(1), array![-2.0 / 3.0, 2.0 / 3.0], epsilon = 1e-12);

        let mut out = Array1::<f64>::zeros(2);
        model.decision_values_into(array![1.0, 0.0].view(), out.view_mut());
        assert_abs_diff_eq!(out, array![2.0 / 3.0, -2.0 / 3.0], epsilon = 1e-12);
    }

    #[test]
    fn zero_eigenvalues_interpolate_labels()
    {
        let model = SmoothModel::train(&indicator_training(), array![0.0, 0.0].view(), 100.0).unwrap();
        assert_abs_diff_eq!(model.coefficients().row(0), array![1.0, -1.0], epsilon = 1e-12);
    }

    #[test]
    fn larger_eigenvalues_shrink_scores()
    {
        let training = indicator_training();
        let smooth = SmoothModel::train(&training, array![0.1, 0.1].view(), 100.0).unwrap();
        let rough = SmoothModel::train(&training, array![1000.0, 1000.0].view(), 100.0).unwrap();
        assert!(rough.coefficients()[[0, 0]] < smooth.coefficients()[[0, 0]]);
        assert!(rough.coefficients()[[0, 0]] > 0.0);
    }

    #[test]
    fn rejects_bad_parameters()
    {
        let training = indicator_training();
        assert!(matches!(
            SmoothModel::train(&training, array![0.1].view(), 100.0),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(matches!(
            SmoothModel::train(&training, array![0.1, 0.1].view(), 0.0),
            Err(Error::InvalidParameter { name: "label_weight", .. })
        ));
    }

    #[test]
    fn rank_deficient_system_without_eigenvalues_is_singular()
    {
        // The second eigenvector is never excited by the training data.
        let training = TrainingSet::new(
            array![[1.0, 0.0], [-1.0, 0.0]],
            vec![ConceptId(1), ConceptId(2)],
        ).unwrap();
        assert!(matches!(
            SmoothModel::train(&training, array![0.0, 0.0].view(), 100.0),
            Err(Error::SingularSystem { .. })
        ));
    }
}
