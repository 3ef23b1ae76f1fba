//! CLI error types.

use mlmc_pricing::models::ModelError;
use mlmc_risk::{ConfigError, EstimationError};
use thiserror::Error;

/// Errors surfaced by the `mlmc-var` commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// An explicitly requested file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Malformed TOML run configuration.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Estimator settings rejected by validation.
    #[error("Invalid estimator configuration: {0}")]
    Config(#[from] ConfigError),

    /// Portfolio model could not be constructed.
    #[error("Invalid model: {0}")]
    Model(#[from] ModelError),

    /// The estimation run failed.
    #[error("Estimation failed: {0}")]
    Estimation(#[from] Box<EstimationError>),

    /// Argument combination not supported.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed market data file.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialisation failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EstimationError> for CliError {
    fn from(err: EstimationError) -> Self {
        Self::Estimation(Box::new(err))
    }
}

/// Result alias for CLI commands.
pub type Result<T> = std::result::Result<T, CliError>;
