//! Mathematical building blocks.
//!
//! - [`solvers`]: Bracketing root finders (bisection) with shared configuration
//! - [`statistics`]: Welford/Chan online moments and least-squares rate fits
//! - [`distributions`]: Standard normal CDF, PDF, and quantile
//! - [`correlation`]: Correlation matrices and Cholesky factors

pub mod correlation;
pub mod distributions;
pub mod solvers;
pub mod statistics;
