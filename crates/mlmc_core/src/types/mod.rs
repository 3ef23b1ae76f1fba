//! Core error types.
//!
//! This module provides:
//! - `error`: Structured error types for solver, statistics, and correlation operations
//!
//! # Re-exports
//!
//! - [`SolverError`], [`StatisticsError`], [`CorrelationError`] from `error`

pub mod error;

pub use error::{CorrelationError, SolverError, StatisticsError};
