//! Concept detection: interpolation followed by classification, over
//! fixed-size batches of samples.
//!
//! The eigenspace, the training set, and the trained classifier are read-only
//! for the whole request, so batches can run concurrently without locking.
//! Everything a batch allocates lives in its `BatchScope` and is released
//! when the scope drops, whether the batch succeeded or failed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, trace};
use ndarray::Array2;
use rayon::prelude::*;

use crate::classifier::{pick_concepts, ClassificationResult, LinearModel, Method, TrainedClassifier};
use crate::config::DetectorConfig;
use crate::eigenspace::EigenBasis;
use crate::error::{Error, Result};
use crate::features::{FeatureVector, SampleId};
use crate::interpolate::interpolate_rows;
use crate::training::TrainingSet;

/// Cooperative cancellation for a detection request.
/// Checked before each batch starts; batches already running finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn cancel(&self)
    {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool
    {
        self.0.load(Ordering::SeqCst)
    }
}

/// A validated eigenspace and a trained classifier, reusable across requests.
pub struct Detector<'a>
{
    basis: &'a EigenBasis,
    classifier: TrainedClassifier,
    config: DetectorConfig,
}

/// Per-request state, passed to every batch.
struct DetectionRequest<'r>
{
    basis: &'r EigenBasis,
    classifier: &'r TrainedClassifier,
    normalize_features: bool,
    cancel: &'r CancellationToken,
    progress: &'r (dyn Fn(usize) + Sync),
}

/// Anything a batch can read a feature vector from.
trait Sample: Sync
{
    fn features(&self) -> &FeatureVector;
}

impl Sample for FeatureVector
{
    fn features(&self) -> &FeatureVector
    {
        self
    }
}

impl Sample for (SampleId, FeatureVector)
{
    fn features(&self) -> &FeatureVector
    {
        &self.1
    }
}

/// Buffers owned by one batch while it is in flight.
struct BatchScope
{
    index: usize,
    normalized: Vec<FeatureVector>,
    eigenvectors: Option<Array2<f64>>,
    scores: Option<Array2<f64>>,
}

impl BatchScope
{
    fn new(index: usize) -> Self
    {
        BatchScope { index, normalized: Vec::new(), eigenvectors: None, scores: None }
    }
}

impl Drop for BatchScope
{
    fn drop(&mut self)
    {
        trace!(
            "Releasing batch {} buffers (eigenvectors: {}, scores: {})",
            self.index,
            self.eigenvectors.is_some(),
            self.scores.is_some()
        );
    }
}

impl<'a> Detector<'a>
{
    /// Validates the configuration and trains the configured classifier.
    pub fn new(basis: &'a EigenBasis, training: &TrainingSet, config: DetectorConfig) -> Result<Detector<'a>>
    {
        config.validate()?;
        check_rank(basis, training.rank())?;

        let now = std::time::Instant::now();
        let classifier = TrainedClassifier::train(training, &config.classifier_params())?;
        info!(
            "Trained {} classifier on {} samples over {} concepts in {:?}",
            config.method,
            training.len(),
            training.concepts().len(),
            now.elapsed()
        );

        Ok(Detector { basis, classifier, config })
    }

    /// Uses a previously trained linear model instead of training one.
    pub fn with_linear_model(basis: &'a EigenBasis, model: LinearModel, config: DetectorConfig) -> Result<Detector<'a>>
    {
        config.validate()?;
        if config.method != Method::Linear {
            return Err(Error::InvalidConfig(format!("A pretrained linear model cannot be used with the {} method", config.method)));
        }
        model.validate()?;
        check_rank(basis, model.rank())?;
        Ok(Detector { basis, classifier: TrainedClassifier::Linear(model), config })
    }

    pub fn classifier(&self) -> &TrainedClassifier
    {
        &self.classifier
    }

    pub fn config(&self) -> &DetectorConfig
    {
        &self.config
    }

    pub fn detect(&self, features: &[FeatureVector]) -> Result<Vec<ClassificationResult>>
    {
        self.detect_with_cancel(features, &CancellationToken::new())
    }

    /// Classifies every feature vector, preserving input order.
    /// Fails as a whole if any batch fails or the request is cancelled.
    pub fn detect_with_cancel(&self, features: &[FeatureVector], cancel: &CancellationToken) -> Result<Vec<ClassificationResult>>
    {
        self.detect_batches(features, cancel, &|_| {})
    }

    /// Like `detect_with_cancel`, calling `progress` with the index of each
    /// batch once it has been classified. With parallel batches the calls
    /// arrive in completion order.
    pub fn detect_with_progress(
        &self,
        features: &[FeatureVector],
        cancel: &CancellationToken,
        progress: &(dyn Fn(usize) + Sync),
    ) -> Result<Vec<ClassificationResult>>
    {
        self.detect_batches(features, cancel, progress)
    }

    /// Like `detect`, keeping each result next to the id of its sample.
    pub fn detect_samples(&self, samples: &[(SampleId, FeatureVector)]) -> Result<Vec<(SampleId, ClassificationResult)>>
    {
        let results = self.detect_batches(samples, &CancellationToken::new(), &|_| {})?;
        Ok(samples.iter().map(|(id, _)| id.clone()).zip(results).collect())
    }

    fn detect_batches<S: Sample>(
        &self,
        samples: &[S],
        cancel: &CancellationToken,
        progress: &(dyn Fn(usize) + Sync),
    ) -> Result<Vec<ClassificationResult>>
    {
        let request = DetectionRequest {
            basis: self.basis,
            classifier: &self.classifier,
            normalize_features: self.config.normalize_features,
            cancel,
            progress,
        };
        let batch_size = self.config.batch_size;
        let batches: Vec<(usize, &[S])> = samples.chunks(batch_size).enumerate().collect();

        info!(
            "Detecting concepts for {} samples in {} batches of up to {} ({})",
            samples.len(),
            batches.len(),
            batch_size,
            if self.config.parallel { "parallel" } else { "sequential" }
        );
        let now = std::time::Instant::now();

        let per_batch: Vec<Vec<ClassificationResult>> = if self.config.parallel {
            batches
                .par_iter()
                .map(|(index, batch)| run_batch(&request, *index, *index * batch_size, batch))
                .collect::<Result<_>>()?
        } else {
            batches
                .iter()
                .map(|(index, batch)| run_batch(&request, *index, *index * batch_size, batch))
                .collect::<Result<_>>()?
        };

        let results: Vec<ClassificationResult> = per_batch.into_iter().flatten().collect();
        info!("Detection of {} samples took {:?}", results.len(), now.elapsed());
        Ok(results)
    }
}

fn check_rank(basis: &EigenBasis, rank: usize) -> Result<()>
{
    if basis.rank() != rank {
        return Err(Error::DimensionMismatch { what: "training eigenvectors", expected: basis.rank(), found: rank });
    }
    Ok(())
}

fn run_batch<S: Sample>(request: &DetectionRequest<'_>, index: usize, offset: usize, batch: &[S]) -> Result<Vec<ClassificationResult>>
{
    if request.cancel.is_cancelled() {
        debug!("Skipping batch {}: request cancelled", index);
        return Err(Error::Cancelled);
    }

    let mut scope = BatchScope::new(index);
    let interpolated = if request.normalize_features {
        scope.normalized = batch.iter().map(|s| s.features().power_normalized()).collect();
        interpolate_rows(request.basis, scope.normalized.iter(), offset)?
    } else {
        interpolate_rows(request.basis, batch.iter().map(Sample::features), offset)?
    };
    let eigenvectors = scope.eigenvectors.insert(interpolated.eigenvectors);
    let scores = scope.scores.insert(request.classifier.decision_values(eigenvectors.view())?);
    let results = pick_concepts(request.classifier.concepts(), scores.view());

    debug!("Batch {} classified {} samples ({} clamped coordinates)", index, results.len(), interpolated.clamped);
    (request.progress)(index);
    Ok(results)
}

/// Classifies `features` with a classifier trained on `training` for this
/// request only.
pub fn detect(
    basis: &EigenBasis,
    training: &TrainingSet,
    features: &[FeatureVector],
    config: &DetectorConfig,
) -> Result<Vec<ClassificationResult>>
{
    Detector::new(basis, training, config.clone())?.detect(features)
}
