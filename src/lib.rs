pub mod artifacts;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod eigenspace;
pub mod error;
pub mod features;
pub mod interpolate;
pub mod linalg;
pub mod training;

#[cfg(test)]
mod test_support;

pub use artifacts::{ArtifactFile, ArtifactLoader, FileArtifacts};
pub use classifier::{classify, ClassificationResult, ClassifierParams, LinearModel, Method, SmoothModel, TrainedClassifier};
pub use config::DetectorConfig;
pub use detector::{detect, CancellationToken, Detector};
pub use eigenspace::{EigenBasis, Projection};
pub use error::{Error, Result};
pub use features::{FeatureVector, SampleId};
pub use interpolate::{interpolate, Interpolated};
pub use training::{ConceptId, TrainingSet};
