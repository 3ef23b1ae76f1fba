//! Error types for MLMC estimation.

use mlmc_core::types::{SolverError, StatisticsError};
use mlmc_pricing::sampler::SamplingFailure;
use thiserror::Error;

use crate::config::ConfigError;
use crate::estimator::EstimatorPhase;
use crate::report::LevelSummary;

/// Estimation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MlmcError {
    /// A batch dropped more samples than the retry policy tolerates.
    #[error(
        "Sampling failure on level {level}: {failed} of {attempted} samples dropped \
         (rate {rate:.4}, threshold {threshold})"
    )]
    SamplingFailure {
        /// Level of the failing batch.
        level: usize,
        /// Samples dropped after exhausting retries.
        failed: u64,
        /// Samples attempted in the batch.
        attempted: u64,
        /// Observed failure rate.
        rate: f64,
        /// Configured maximum failure rate.
        threshold: f64,
        /// Last underlying loss-function failure.
        #[source]
        last_error: Option<SamplingFailure>,
    },

    /// Every level has zero variance; no allocation can be formed.
    #[error("Allocation degenerate: all {levels} levels have zero sample variance")]
    AllocationDegenerate {
        /// Levels in the hierarchy.
        levels: usize,
    },

    /// The bias test still fails with the maximum number of levels.
    #[error("Level bound exceeded: bias estimate {bias:.3e} still too large with {max_levels} levels")]
    LevelBoundExceeded {
        /// Configured maximum level count.
        max_levels: usize,
        /// Bias estimate at the finest level.
        bias: f64,
    },

    /// Too few finest-level losses beyond the VaR for a reliable quantile.
    #[error("Insufficient tail samples ({tail_samples} finest-level exceedances): {reason}. {recommendation}")]
    InsufficientTailSamples {
        /// Finest-level fine losses strictly above the VaR estimate.
        tail_samples: u64,
        /// What made the tail unreliable.
        reason: String,
        /// Suggested remedy.
        recommendation: String,
    },

    /// Cooperative cancellation or an exhausted time budget.
    #[error("Estimation cancelled")]
    Cancelled,

    /// The refinement loop hit its round cap.
    #[error("Round limit of {0} refinement rounds reached")]
    RoundLimit(usize),

    /// A batch does not continue the level's index sequence.
    #[error("Invalid batch for level {level}: {reason}")]
    InvalidBatch {
        /// Target level.
        level: usize,
        /// Description of the mismatch.
        reason: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Quantile root finding failed.
    #[error("Quantile inversion failed: {0}")]
    Solver(#[from] SolverError),

    /// Statistics helper failed.
    #[error("Statistics error: {0}")]
    Statistics(#[from] StatisticsError),

    /// Worker pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Hierarchy state captured when estimation fails.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Diagnostics {
    /// Phase the estimator was in.
    pub phase: EstimatorPhase,
    /// Refinement rounds completed.
    pub rounds: usize,
    /// Per-level statistics at the time of failure.
    pub levels: Vec<LevelSummary>,
    /// Estimated MSE of the mean estimator, if defined.
    pub estimated_mse: Option<f64>,
    /// Wall-clock seconds since the run started.
    pub elapsed_seconds: f64,
}

/// An [`MlmcError`] together with the diagnostics of the failed run.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct EstimationError {
    /// Underlying failure.
    #[source]
    pub error: MlmcError,
    /// Hierarchy state at the time of failure.
    pub diagnostics: Diagnostics,
}

impl EstimationError {
    /// Wraps an error with diagnostics.
    pub fn new(error: MlmcError, diagnostics: Diagnostics) -> Self {
        Self { error, diagnostics }
    }
}

impl From<MlmcError> for EstimationError {
    fn from(error: MlmcError) -> Self {
        Self::new(error, Diagnostics::default())
    }
}

impl From<ConfigError> for EstimationError {
    fn from(error: ConfigError) -> Self {
        MlmcError::from(error).into()
    }
}
