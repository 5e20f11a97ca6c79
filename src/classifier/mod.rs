//! Classification of interpolated eigenvectors against the training set.
//!
//! Two strategies are supported:
//! 1. Linear: a maximum-margin linear separator (L2-regularized, L2-loss SVM
//!    solved in the dual, as liblinear does). Trade-off `C` defaults to 5.
//! 2. Smooth: a smooth function over the eigenfunction basis, regularized by
//!    the training eigenvalues. Labelled-sample weight defaults to 100.
//!
//! Both score every concept for every test sample; the predicted concept is
//! the highest scoring one and its score is reported alongside it.

pub mod linear;
pub mod smooth;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::training::{ConceptId, TrainingSet};

pub use linear::LinearModel;
pub use smooth::SmoothModel;

pub const DEFAULT_C: f64 = 5.0;
pub const DEFAULT_LABEL_WEIGHT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Method
{
    #[default]
    Linear,
    Smooth,
}

impl FromStr for Method
{
    type Err = Error;

    /// Accepts the method names as well as the numeric tokens 1 and 2.
    fn from_str(s: &str) -> Result<Self>
    {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "1" => Ok(Method::Linear),
            "smooth" | "2" => Ok(Method::Smooth),
            _ => Err(Error::UnknownMethod(s.to_string())),
        }
    }
}

impl TryFrom<String> for Method
{
    type Error = Error;

    fn try_from(s: String) -> Result<Self>
    {
        s.parse()
    }
}

impl Display for Method
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        match self {
            Method::Linear => write!(f, "linear"),
            Method::Smooth => write!(f, "smooth"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierParams
{
    pub method: Method,
    /// SVM trade-off between margin and training error. Linear only.
    pub c: f64,
    /// Weight of labelled samples in the smooth function. Smooth only.
    pub label_weight: f64,
    /// Training eigenvalues for the smooth function.
    /// Falls back to the training set's eigenvalues when None.
    pub eigenvalues: Option<Array1<f64>>,
}

impl ClassifierParams
{
    pub fn new(method: Method) -> Self
    {
        ClassifierParams { method, c: DEFAULT_C, label_weight: DEFAULT_LABEL_WEIGHT, eigenvalues: None }
    }

    pub fn with_c(mut self, c: f64) -> Self
    {
        self.c = c;
        self
    }

    pub fn with_label_weight(mut self, label_weight: f64) -> Self
    {
        self.label_weight = label_weight;
        self
    }

    pub fn with_eigenvalues(mut self, eigenvalues: Array1<f64>) -> Self
    {
        self.eigenvalues = Some(eigenvalues);
        self
    }
}

impl Default for ClassifierParams
{
    fn default() -> Self
    {
        Self::new(Method::default())
    }
}

/// The predicted concept of one test sample and the score it won with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult
{
    pub concept: ConceptId,
    pub score: f64,
}

/// A classifier ready to score test eigenvectors.
/// Trained once per request and shared read-only by every batch.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainedClassifier
{
    Linear(LinearModel),
    Smooth(SmoothModel),
}

impl TrainedClassifier
{
    pub fn train(training: &TrainingSet, params: &ClassifierParams) -> Result<TrainedClassifier>
    {
        match params.method {
            Method::Linear => Ok(TrainedClassifier::Linear(LinearModel::train(training, params.c)?)),
            Method::Smooth => {
                let eigenvalues = params
                    .eigenvalues
                    .as_ref()
                    .map(|e| e.view())
                    .or_else(|| training.eigenvalues())
                    .ok_or(Error::MissingParameter("eigenvalues"))?;
                Ok(TrainedClassifier::Smooth(SmoothModel::train(training, eigenvalues, params.label_weight)?))
            }
        }
    }

    pub fn method(&self) -> Method
    {
        match self {
            TrainedClassifier::Linear(_) => Method::Linear,
            TrainedClassifier::Smooth(_) => Method::Smooth,
        }
    }

    /// Length of the eigenvectors this classifier accepts.
    pub fn rank(&self) -> usize
    {
        match self {
            TrainedClassifier::Linear(m) => m.rank(),
            TrainedClassifier::Smooth(m) => m.rank(),
        }
    }

    pub fn concepts(&self) -> &[ConceptId]
    {
        match self {
            TrainedClassifier::Linear(m) => m.concepts(),
            TrainedClassifier::Smooth(m) => m.concepts(),
        }
    }

    fn decision_values_into(&self, x: ArrayView1<f64>, out: ArrayViewMut1<f64>)
    {
        match self {
            TrainedClassifier::Linear(m) => m.decision_values_into(x, out),
            TrainedClassifier::Smooth(m) => m.decision_values_into(x, out),
        }
    }

    /// Scores every concept for every test row. Shape: (samples, concepts).
    pub fn decision_values(&self, test: ArrayView2<f64>) -> Result<Array2<f64>>
    {
        if test.ncols() != self.rank() {
            return Err(Error::DimensionMismatch { what: "test eigenvectors", expected: self.rank(), found: test.ncols() });
        }
        let mut values = Array2::<f64>::zeros((test.nrows(), self.concepts().len()));
        for (x, out) in test.rows().into_iter().zip(values.rows_mut()) {
            self.decision_values_into(x, out);
        }
        Ok(values)
    }

    pub fn predict(&self, test: ArrayView2<f64>) -> Result<Vec<ClassificationResult>>
    {
        let values = self.decision_values(test)?;
        Ok(pick_concepts(self.concepts(), values.view()))
    }
}

/// Picks the highest scoring concept per row. Ties go to the lowest concept.
pub(crate) fn pick_concepts(concepts: &[ConceptId], values: ArrayView2<f64>) -> Vec<ClassificationResult>
{
    values
        .rows()
        .into_iter()
        .map(|row| {
            let (best, score) = row
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |(best, max), (i, v)| if *v > max { (i, *v) } else { (best, max) });
            ClassificationResult { concept: concepts[best], score }
        })
        .collect()
}

/// Trains the classifier selected by `params` on `training` and classifies
/// the rows of `test`. Either every row is classified or an error is
/// returned; there are no partial results.
pub fn classify(training: &TrainingSet, test: ArrayView2<f64>, params: &ClassifierParams) -> Result<Vec<ClassificationResult>>
{
    if test.ncols() != training.rank() {
        return Err(Error::DimensionMismatch { what: "test eigenvectors", expected: training.rank(), found: test.ncols() });
    }
    TrainedClassifier::train(training, params)?.predict(test)
}

#[cfg(test)]
mod tests
{
    use ndarray::array;

    use super::*;
    use crate::features::{stack, FeatureVector};

    fn training() -> TrainingSet
    {
        TrainingSet::new(
            array![[1.0, 0.1], [0.9, 0.0], [0.0, 1.0], [0.1, 0.9]],
            vec![ConceptId(1), ConceptId(1), ConceptId(2), ConceptId(2)],
        ).unwrap()
    }

    #[test]
    fn method_tokens()
    {
        assert_eq!("linear".parse::<Method>().unwrap(), Method::Linear);
        assert_eq!("1".parse::<Method>().unwrap(), Method::Linear);
        assert_eq!(" Smooth ".parse::<Method>().unwrap(), Method::Smooth);
        assert_eq!("2".parse::<Method>().unwrap(), Method::Smooth);
        match "invalid".parse::<Method>() {
            Err(Error::UnknownMethod(token)) => assert_eq!(token, "invalid"),
            other => panic!("Expected an unknown method error, got {:?}", other),
        }
    }

    #[test]
    fn method_serialization()
    {
        assert_eq!(serde_json::to_string(&Method::Smooth).unwrap(), "\"smooth\"");
        let method: Method = serde_json::from_str("\"linear\"").unwrap();
        assert_eq!(method, Method::Linear);
        assert!(serde_json::from_str::<Method>("\"invalid\"").is_err());
    }

    #[test]
    fn params_defaults()
    {
        let params = ClassifierParams::default();
        assert_eq!(params.method, Method::Linear);
        assert_eq!(params.c, 5.0);
        assert_eq!(params.label_weight, 100.0);
        assert!(params.eigenvalues.is_none());
    }

    #[test]
    fn smooth_requires_eigenvalues()
    {
        let params = ClassifierParams::new(Method::Smooth);
        let result = classify(&training(), training().eigenvectors(), &params);
        assert!(matches!(result, Err(Error::MissingParameter("eigenvalues"))));
    }

    #[test]
    fn smooth_uses_training_eigenvalues_when_params_have_none()
    {
        let training = training().with_eigenvalues(array![0.01, 0.01]).unwrap();
        let results = classify(&training, training.eigenvectors(), &ClassifierParams::new(Method::Smooth)).unwrap();
        let labels: Vec<ConceptId> = results.iter().map(|r| r.concept).collect();
        assert_eq!(labels, training.labels());
    }

    #[test]
    fn both_methods_classify_nearby_points()
    {
        let test = stack(&[FeatureVector::new(vec![0.95, 0.05]), FeatureVector::new(vec![0.05, 0.95])]).unwrap();
        for params in [
            ClassifierParams::new(Method::Linear),
            ClassifierParams::new(Method::Smooth).with_eigenvalues(array![0.1, 0.1]),
        ] {
            let results = classify(&training(), test.view(), &params).unwrap();
            assert_eq!(results.len(), 2);
            assert_eq!(results[0].concept, ConceptId(1), "{:?}", params.method);
            assert_eq!(results[1].concept, ConceptId(2), "{:?}", params.method);
            assert!(results.iter().all(|r| r.score > 0.0));
        }
    }

    #[test]
    fn rejects_test_dimension_mismatch()
    {
        let test = array![[1.0, 0.0, 0.0]];
        let result = classify(&training(), test.view(), &ClassifierParams::default());
        assert!(matches!(result, Err(Error::DimensionMismatch { expected: 2, found: 3, .. })));
    }

    #[test]
    fn pick_prefers_lowest_concept_on_ties()
    {
        let concepts = [ConceptId(3), ConceptId(5), ConceptId(9)];
        let values = array![[0.2, 0.7, 0.7], [-1.0, -2.0, -0.5]];
        let picked = pick_concepts(&concepts, values.view());
        assert_eq!(picked[0], ClassificationResult { concept: ConceptId(5), score: 0.7 });
        assert_eq!(picked[1], ClassificationResult { concept: ConceptId(9), score: -0.5 });
    }

    #[test]
    fn result_json()
    {
        let result = ClassificationResult { concept: ConceptId(4), score: 1.5 };
        let serialized = serde_json::to_string(&result).unwrap();
        assert_eq!(serialized, "{\"concept\":4,\"score\":1.5}");
    }
}
