//! Error types for the reference loss models.

use mlmc_core::types::{CorrelationError, StatisticsError};
use thiserror::Error;

/// Invalid reference-model construction.
///
/// # Examples
/// ```
/// use mlmc_pricing::models::ModelError;
///
/// let err = ModelError::InvalidParameter { name: "volatility", value: -0.2 };
/// assert!(err.to_string().contains("volatility"));
/// ```
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    /// A scalar parameter is outside its admissible range.
    #[error("Invalid {name}: {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// Vector or matrix dimensions disagree.
    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// What was being sized.
        what: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        got: usize,
    },

    /// An instrument references a risk factor that does not exist.
    #[error("Instrument references factor {factor} but only {n_factors} factors exist")]
    UnknownFactor {
        /// Referenced factor.
        factor: usize,
        /// Number of factors in the model.
        n_factors: usize,
    },

    /// Gamma matrix is not symmetric.
    #[error("Gamma matrix is not symmetric at ({i}, {j})")]
    AsymmetricGamma {
        /// Row index.
        i: usize,
        /// Column index.
        j: usize,
    },

    /// Invalid correlation structure.
    #[error("Correlation error: {0}")]
    Correlation(#[from] CorrelationError),

    /// Quantile or moment computation failed.
    #[error("Statistics error: {0}")]
    Statistics(#[from] StatisticsError),
}
