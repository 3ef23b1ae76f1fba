//! Error types for structured error handling.
//!
//! This module provides:
//! - `SolverError`: Errors from root-finding solvers
//! - `StatisticsError`: Errors from regression and sample statistics
//! - `CorrelationError`: Errors from correlation matrix validation and factorisation

use thiserror::Error;

/// Root-finding solver errors.
///
/// # Examples
/// ```
/// use mlmc_core::types::SolverError;
///
/// let err = SolverError::MaxIterationsExceeded { iterations: 100 };
/// assert!(format!("{}", err).contains("100 iterations"));
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolverError {
    /// Solver failed to converge within maximum iterations.
    #[error("Failed to converge after {iterations} iterations")]
    MaxIterationsExceeded {
        /// Number of iterations attempted
        iterations: usize,
    },

    /// No valid bracket (function values at endpoints have same sign).
    #[error("No bracket: f({a}) and f({b}) have same sign")]
    NoBracket {
        /// Left bracket endpoint
        a: f64,
        /// Right bracket endpoint
        b: f64,
    },

    /// Numerical instability during computation.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// Stopping rule that can never be met.
    #[error("Invalid solver settings: {0}")]
    InvalidConfig(String),
}

/// Errors from sample statistics and regression fits.
///
/// # Examples
/// ```
/// use mlmc_core::types::StatisticsError;
///
/// let err = StatisticsError::InsufficientData { required: 2, got: 1 };
/// assert_eq!(format!("{}", err), "Insufficient data: need at least 2 points, got 1");
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatisticsError {
    /// Too few observations for the requested statistic.
    #[error("Insufficient data: need at least {required} points, got {got}")]
    InsufficientData {
        /// Minimum number of points
        required: usize,
        /// Number of points supplied
        got: usize,
    },

    /// Paired inputs of different lengths.
    #[error("Length mismatch: x has {x_len} points, y has {y_len}")]
    LengthMismatch {
        /// Length of the regressor
        x_len: usize,
        /// Length of the response
        y_len: usize,
    },

    /// All regressor values identical; no line can be fitted.
    #[error("Degenerate regressor: all x values are identical")]
    DegenerateRegressor,

    /// Probability outside the open unit interval.
    #[error("Invalid probability {0}: must be in (0, 1)")]
    InvalidProbability(f64),
}

/// Errors from correlation matrix construction and Cholesky factorisation.
///
/// # Examples
/// ```
/// use mlmc_core::types::CorrelationError;
///
/// let err = CorrelationError::NotSymmetric { i: 0, j: 1 };
/// assert_eq!(format!("{}", err), "Matrix is not symmetric at (0, 1)");
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CorrelationError {
    /// Matrix is not positive definite.
    #[error("Correlation matrix is not positive definite")]
    NotPositiveDefinite,

    /// Matrix dimensions are invalid.
    #[error("Invalid matrix dimensions: expected {expected} elements, got {got}")]
    InvalidDimensions {
        /// Expected element count (n * n)
        expected: usize,
        /// Supplied element count
        got: usize,
    },

    /// Diagonal elements are not 1.0.
    #[error("Diagonal element at index {index} is {value}, expected 1.0")]
    InvalidDiagonal {
        /// Diagonal index
        index: usize,
        /// Offending value
        value: f64,
    },

    /// Matrix is not symmetric.
    #[error("Matrix is not symmetric at ({i}, {j})")]
    NotSymmetric {
        /// Row index
        i: usize,
        /// Column index
        j: usize,
    },

    /// Correlation value out of range [-1, 1].
    #[error("Correlation at ({i}, {j}) is {value}, must be in [-1, 1]")]
    OutOfRange {
        /// Row index
        i: usize,
        /// Column index
        j: usize,
        /// Offending value
        value: f64,
    },
}
