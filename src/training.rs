use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A visual concept, e.g. one of the dataset's annotated categories.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ConceptId(pub u32);

impl std::fmt::Display for ConceptId
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// The labelled training eigenvectors the classifiers learn from.
/// Immutable once built; shared by reference across batch workers.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet
{
    /// Shape: (samples, rank). The `uutrain` table.
    eigenvectors: Array2<f64>,
    labels: Vec<ConceptId>,
    /// Length rank. The `ddtrain` eigenvalues, needed by the smooth function.
    eigenvalues: Option<Array1<f64>>,
    /// Distinct labels in ascending order.
    concepts: Vec<ConceptId>,
    concept_index: FxHashMap<ConceptId, usize>,
}

impl TrainingSet
{
    pub fn new(eigenvectors: Array2<f64>, labels: Vec<ConceptId>) -> Result<TrainingSet>
    {
        let (samples, rank) = eigenvectors.dim();
        if samples == 0 || rank == 0 {
            return Err(Error::InvalidTrainingSet(format!("Training eigenvectors are empty ({} x {})", samples, rank)));
        }
        if labels.len() != samples {
            return Err(Error::InvalidTrainingSet(format!(
                "{} labels for {} training samples",
                labels.len(),
                samples
            )));
        }
        if eigenvectors.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidTrainingSet("Training eigenvectors contain non-finite values".to_string()));
        }

        let mut concepts = labels.clone();
        concepts.sort_unstable();
        concepts.dedup();
        if concepts.len() < 2 {
            return Err(Error::InvalidTrainingSet(format!(
                "At least two distinct concepts are needed, found {}",
                concepts.len()
            )));
        }
        let concept_index = concepts.iter().enumerate().map(|(i, c)| (*c, i)).collect();

        Ok(TrainingSet { eigenvectors, labels, eigenvalues: None, concepts, concept_index })
    }

    /// Attaches the training eigenvalues used by the smooth function.
    pub fn with_eigenvalues(mut self, eigenvalues: Array1<f64>) -> Result<TrainingSet>
    {
        validate_eigenvalues(eigenvalues.view(), self.rank())?;
        self.eigenvalues = Some(eigenvalues);
        Ok(self)
    }

    pub fn len(&self) -> usize
    {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.labels.is_empty()
    }

    pub fn rank(&self) -> usize
    {
        self.eigenvectors.ncols()
    }

    pub fn eigenvectors(&self) -> ArrayView2<'_, f64>
    {
        self.eigenvectors.view()
    }

    pub fn labels(&self) -> &[ConceptId]
    {
        &self.labels
    }

    pub fn eigenvalues(&self) -> Option<ArrayView1<'_, f64>>
    {
        self.eigenvalues.as_ref().map(|e| e.view())
    }

    pub fn concepts(&self) -> &[ConceptId]
    {
        &self.concepts
    }

    /// Position of `concept` in `concepts()`.
    pub fn concept_index(&self, concept: ConceptId) -> Option<usize>
    {
        self.concept_index.get(&concept).copied()
    }

    /// +1 for samples labelled `concept`, -1 otherwise.
    pub fn one_vs_rest_targets(&self, concept: ConceptId) -> Array1<f64>
    {
        self.labels.iter().map(|l| if *l == concept { 1.0 } else { -1.0 }).collect()
    }
}

pub(crate) fn validate_eigenvalues(eigenvalues: ArrayView1<f64>, rank: usize) -> Result<()>
{
    if eigenvalues.len() != rank {
        return Err(Error::DimensionMismatch { what: "training eigenvalues", expected: rank, found: eigenvalues.len() });
    }
    if eigenvalues.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(Error::InvalidParameter {
            name: "eigenvalues",
            reason: "eigenvalues must be finite and non-negative".to_string(),
        });
    }
    Ok(())
}
