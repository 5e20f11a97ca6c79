//! Persisted training artifacts: the eigenspace tables and the labelled
//! training eigenvectors, plus trained linear models.
//!
//! Artifacts are stored with bincode, or as JSON when the file name ends in
//! `.json`. Matrices are stored row by row.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::info;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::classifier::LinearModel;
use crate::eigenspace::{EigenBasis, Projection};
use crate::error::{Error, Result};
use crate::training::{ConceptId, TrainingSet};

/// Supplies the trained eigenspace and training set for a detector.
pub trait ArtifactLoader
{
    fn load(&self) -> Result<(EigenBasis, TrainingSet)>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProjectionData
{
    pub mean: Vec<f64>,
    pub rotation: Vec<Vec<f64>>,
}

/// The on-disk layout of the training artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ArtifactFile
{
    /// Eigenfunction values at the bins, one row per bin.
    pub uu1: Vec<Vec<f64>>,
    /// Bin positions, one row per bin, one column per dimension.
    pub bins_out: Vec<Vec<f64>>,
    /// Input dimension of each eigenfunction.
    pub jj: Vec<usize>,
    /// 1 if `jj` counts dimensions from one, as exported from MATLAB.
    #[serde(default)]
    pub index_base: usize,
    #[serde(default)]
    pub projection: Option<ProjectionData>,
    /// Training eigenvectors, one row per training sample.
    pub uutrain: Vec<Vec<f64>>,
    pub train_labels: Vec<ConceptId>,
    /// Training eigenvalues, needed by the smooth function.
    #[serde(default)]
    pub ddtrain: Option<Vec<f64>>,
}

fn to_matrix(rows: &[Vec<f64>]) -> Option<Array2<f64>>
{
    let cols = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.iter().any(|r| r.len() != cols) {
        return None;
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), cols), flat).ok()
}

fn to_rows(matrix: &Array2<f64>) -> Vec<Vec<f64>>
{
    matrix.rows().into_iter().map(|r| r.to_vec()).collect()
}

impl ArtifactFile
{
    /// Captures a loaded eigenspace and training set so they can be saved.
    pub fn from_loaded(basis: &EigenBasis, training: &TrainingSet) -> ArtifactFile
    {
        ArtifactFile {
            uu1: to_rows(basis.eigenfunctions()),
            bins_out: to_rows(basis.bins()),
            jj: basis.index_map().to_vec(),
            index_base: 0,
            projection: basis.projection().map(|p| ProjectionData { mean: p.mean.to_vec(), rotation: to_rows(&p.rotation) }),
            uutrain: to_rows(&training.eigenvectors().to_owned()),
            train_labels: training.labels().to_vec(),
            ddtrain: training.eigenvalues().map(|e| e.to_vec()),
        }
    }
}

impl ArtifactLoader for ArtifactFile
{
    fn load(&self) -> Result<(EigenBasis, TrainingSet)>
    {
        let table = to_matrix(&self.uu1).ok_or_else(|| Error::MalformedBasis("uu1 rows differ in length".to_string()))?;
        let bins = to_matrix(&self.bins_out).ok_or_else(|| Error::MalformedBasis("bins_out rows differ in length".to_string()))?;
        let index_map = self
            .jj
            .iter()
            .map(|j| j.checked_sub(self.index_base))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| Error::MalformedBasis(format!("jj has entries below the index base {}", self.index_base)))?;

        let mut basis = EigenBasis::load(table, bins, index_map)?;
        if let Some(projection) = &self.projection {
            let rotation = to_matrix(&projection.rotation)
                .ok_or_else(|| Error::MalformedBasis("Projection rotation rows differ in length".to_string()))?;
            basis = basis.with_projection(Projection { mean: Array1::from(projection.mean.clone()), rotation })?;
        }

        let eigenvectors = to_matrix(&self.uutrain)
            .ok_or_else(|| Error::InvalidTrainingSet("uutrain rows differ in length".to_string()))?;
        let mut training = TrainingSet::new(eigenvectors, self.train_labels.clone())?;
        if let Some(ddtrain) = &self.ddtrain {
            training = training.with_eigenvalues(Array1::from(ddtrain.clone()))?;
        }
        if training.rank() != basis.rank() {
            return Err(Error::DimensionMismatch { what: "training eigenvectors", expected: basis.rank(), found: training.rank() });
        }

        Ok((basis, training))
    }
}

fn is_json(path: &Path) -> bool
{
    path.extension().map(|e| e.eq_ignore_ascii_case("json")).unwrap_or(false)
}

/// Loads artifacts from a file on each call to `load`.
#[derive(Debug, Clone)]
pub struct FileArtifacts
{
    path: PathBuf,
}

impl FileArtifacts
{
    pub fn new(path: impl Into<PathBuf>) -> Self
    {
        FileArtifacts { path: path.into() }
    }

    pub fn read(&self) -> Result<ArtifactFile>
    {
        let reader = BufReader::new(File::open(&self.path)?);
        let file = if is_json(&self.path) {
            serde_json::from_reader(reader)?
        } else {
            bincode::deserialize_from(reader)?
        };
        Ok(file)
    }
}

impl ArtifactLoader for FileArtifacts
{
    fn load(&self) -> Result<(EigenBasis, TrainingSet)>
    {
        let (basis, training) = self.read()?.load()?;
        info!(
            "Loaded eigenspace ({} bins, {} eigenfunctions) and {} training samples from {:?}",
            basis.bin_count(),
            basis.rank(),
            training.len(),
            self.path
        );
        Ok((basis, training))
    }
}

pub fn save_artifacts(path: &Path, artifacts: &ArtifactFile) -> Result<()>
{
    let writer = BufWriter::new(File::create(path)?);
    if is_json(path) {
        serde_json::to_writer(writer, artifacts)?;
    } else {
        bincode::serialize_into(writer, artifacts)?;
    }
    Ok(())
}

pub fn save_linear_model(path: &Path, model: &LinearModel) -> Result<()>
{
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, model)?;
    Ok(())
}

pub fn load_linear_model(path: &Path) -> Result<LinearModel>
{
    let reader = BufReader::new(File::open(path)?);
    let model: LinearModel = bincode::deserialize_from(reader)?;
    model.validate()?;
    Ok(model)
}
