#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Bincode(#[from] bincode::Error),
    #[error("Malformed eigenbasis: {0}")]
    MalformedBasis(String),
    #[error("Dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Sample {sample} has a non-finite value in dimension {dimension}")]
    NonFiniteFeature { sample: usize, dimension: usize },
    #[error("Invalid training set: {0}")]
    InvalidTrainingSet(String),
    #[error("Unknown classification method {0:?}. Expected \"linear\" (1) or \"smooth\" (2).")]
    UnknownMethod(String),
    #[error("Missing parameter {0:?} for the selected classification method")]
    MissingParameter(&'static str),
    #[error("Invalid parameter {name:?}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("The smooth function system is not positive definite (pivot {pivot} at row {row})")]
    SingularSystem { row: usize, pivot: f64 },
    #[error("The detection request was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
