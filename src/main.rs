use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use smal::artifacts::{load_linear_model, save_linear_model, ArtifactLoader, FileArtifacts};
use smal::{ConceptId, Detector, DetectorConfig, FeatureVector, LinearModel, Method, SampleId};

#[cfg(debug_assertions)]
const LOG_LEVEL: &str = "debug";
#[cfg(not(debug_assertions))]
const LOG_LEVEL: &str = "warn";

/// Detects visual concepts in feature vectors by interpolating them into a
/// trained eigenspace and classifying the result.
#[derive(Parser, Debug)]
#[command(name = "smal")]
#[command(author, version, about, long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Classify samples and print `[{ id, concept, score }]` as JSON
    Detect {
        /// Eigenspace and training set (bincode, or JSON with a .json extension)
        #[arg(short, long)]
        artifacts: PathBuf,

        /// JSON array of `{ "id": ..., "features": [...] }`
        #[arg(short, long)]
        features: PathBuf,

        /// JSON detector configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// linear | smooth (or 1 | 2)
        #[arg(short, long, value_parser = parse_method)]
        method: Option<Method>,

        /// SVM trade-off for the linear method
        #[arg(short, long)]
        c: Option<f64>,

        /// Weight of labelled samples for the smooth method
        #[arg(long)]
        label_weight: Option<f64>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Process batches one after another on the calling thread
        #[arg(long)]
        sequential: bool,

        /// Pretrained linear model written by `smal train`
        #[arg(long)]
        model: Option<PathBuf>,

        /// Write results here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Train a linear model on the artifacts' training set and save it
    Train {
        #[arg(short, long)]
        artifacts: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// SVM trade-off
        #[arg(short, long, default_value_t = smal::classifier::DEFAULT_C)]
        c: f64,
    },
}

#[derive(Deserialize)]
struct Sample
{
    id: SampleId,
    features: FeatureVector,
}

#[derive(Serialize)]
struct Detection
{
    id: SampleId,
    concept: ConceptId,
    score: f64,
}

fn parse_method(token: &str) -> Result<Method, String>
{
    Method::from_str(token).map_err(|e| e.to_string())
}

fn main() -> anyhow::Result<()>
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(LOG_LEVEL));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match Cli::parse().command {
        Commands::Detect { artifacts, features, config, method, c, label_weight, batch_size, sequential, model, output } => {
            let mut config = match config {
                Some(path) => DetectorConfig::from_json_file(&path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?,
                None => DetectorConfig::default(),
            };
            if let Some(method) = method {
                config.method = method;
            }
            if let Some(c) = c {
                config.c = c;
            }
            if let Some(label_weight) = label_weight {
                config.label_weight = label_weight;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            if sequential {
                config.parallel = false;
            }
            run_detect(&artifacts, &features, config, model.as_deref(), output.as_deref())
        }
        Commands::Train { artifacts, output, c } => run_train(&artifacts, &output, c),
    }
}

fn run_detect(
    artifacts: &Path,
    features: &Path,
    config: DetectorConfig,
    model: Option<&Path>,
    output: Option<&Path>,
) -> anyhow::Result<()>
{
    let now = Instant::now();
    let (basis, training) = FileArtifacts::new(artifacts)
        .load()
        .with_context(|| format!("Failed to load artifacts from {}", artifacts.display()))?;

    let reader = BufReader::new(
        File::open(features).with_context(|| format!("Failed to open {}", features.display()))?,
    );
    let samples: Vec<Sample> = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse samples from {}", features.display()))?;
    let samples: Vec<(SampleId, FeatureVector)> = samples.into_iter().map(|s| (s.id, s.features)).collect();

    let detector = match model {
        Some(path) => {
            let model = load_linear_model(path)
                .with_context(|| format!("Failed to load linear model from {}", path.display()))?;
            Detector::with_linear_model(&basis, model, config)?
        }
        None => Detector::new(&basis, &training, config)?,
    };
    let detections: Vec<Detection> = detector
        .detect_samples(&samples)?
        .into_iter()
        .map(|(id, result)| Detection { id, concept: result.concept, score: result.score })
        .collect();

    match output {
        Some(path) => {
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(writer, &detections)?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &detections)?;
            writeln!(stdout)?;
        }
    }
    info!("Classified {} samples in {:?}", detections.len(), now.elapsed());
    Ok(())
}

fn run_train(artifacts: &Path, output: &Path, c: f64) -> anyhow::Result<()>
{
    let (_, training) = FileArtifacts::new(artifacts)
        .load()
        .with_context(|| format!("Failed to load artifacts from {}", artifacts.display()))?;
    let model = LinearModel::train(&training, c)?;
    save_linear_model(output, &model)
        .with_context(|| format!("Failed to save linear model to {}", output.display()))?;
    info!("Saved linear model for {} concepts to {}", model.concepts().len(), output.display());
    Ok(())
}
