//! Detector configuration. Read from JSON; every field is optional and
//! falls back to its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::{ClassifierParams, Method, DEFAULT_C, DEFAULT_LABEL_WEIGHT};
use crate::error::{Error, Result};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig
{
    pub method: Method,
    /// Linear SVM trade-off.
    #[serde(alias = "C")]
    pub c: f64,
    /// Weight of labelled samples in the smooth function.
    pub label_weight: f64,
    /// Number of samples interpolated and classified together.
    pub batch_size: usize,
    /// Process batches on the rayon thread pool.
    pub parallel: bool,
    /// Power-normalize feature vectors before interpolation.
    pub normalize_features: bool,
}

impl Default for DetectorConfig
{
    fn default() -> Self
    {
        DetectorConfig {
            method: Method::Linear,
            c: DEFAULT_C,
            label_weight: DEFAULT_LABEL_WEIGHT,
            batch_size: DEFAULT_BATCH_SIZE,
            parallel: true,
            normalize_features: false,
        }
    }
}

impl DetectorConfig
{
    pub fn from_json_str(json: &str) -> Result<DetectorConfig>
    {
        let config: DetectorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<DetectorConfig>
    {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()>
    {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".to_string()));
        }
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(Error::InvalidConfig(format!("c must be finite and positive, got {}", self.c)));
        }
        if !(self.label_weight.is_finite() && self.label_weight > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "label_weight must be finite and positive, got {}",
                self.label_weight
            )));
        }
        Ok(())
    }

    pub fn classifier_params(&self) -> ClassifierParams
    {
        ClassifierParams::new(self.method).with_c(self.c).with_label_weight(self.label_weight)
    }
}
