use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RocError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A histogram with zero total integral cannot be turned into efficiencies.
    #[error("histogram {name} has zero total integral")]
    DegenerateHistogram { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize histograms: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error("plotting failed: {0}")]
    Plot(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl RocError {
    /// Errors a batch run logs and skips instead of aborting on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RocError::NotFound(_))
    }
}

pub type RocResult<T> = Result<T, RocError>;
