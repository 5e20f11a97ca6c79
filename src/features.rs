//! Feature vectors handed to the detector by an external extraction pipeline,
//! typically VLAD descriptors of images.

use ndarray::{ArrayView1, Array2};
use serde::{Deserialize, Serialize};

/// Identifies a sample in the caller's collection. Opaque to the detector.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SampleId(pub String);

/// An immutable, fixed-length descriptor for one image.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector
{
    pub fn new(values: Vec<f64>) -> Self
    {
        FeatureVector(values)
    }

    pub fn len(&self) -> usize
    {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64]
    {
        &self.0
    }

    pub fn view(&self) -> ArrayView1<'_, f64>
    {
        ArrayView1::from(&self.0[..])
    }

    /// Signed square root followed by L2 normalization, the usual
    /// post-processing for VLAD descriptors.
    /// A zero vector is returned unchanged.
    pub fn power_normalized(&self) -> FeatureVector
    {
        let mut values: Vec<f64> = self.0.iter().map(|x| x.signum() * x.abs().sqrt()).collect();
        let norm = values.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            return FeatureVector(values);
        }
        values.iter_mut().for_each(|x| *x /= norm);
        FeatureVector(values)
    }
}

impl From<Vec<f64>> for FeatureVector
{
    fn from(values: Vec<f64>) -> Self
    {
        FeatureVector(values)
    }
}

/// Stacks the feature vectors into a (samples, dimension) matrix.
/// Returns None if the vectors do not share a dimension.
pub fn stack(vectors: &[FeatureVector]) -> Option<Array2<f64>>
{
    let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
    if vectors.iter().any(|v| v.len() != dim) {
        return None;
    }
    let flat: Vec<f64> = vectors.iter().flat_map(|v| v.as_slice().iter().copied()).collect();
    Array2::from_shape_vec((vectors.len(), dim), flat).ok()
}
