//! # mlmc_core: Numerical Foundation for the MLMC Risk Engine
//!
//! ## Layer 1 (Foundation) Role
//!
//! mlmc_core is the bottom layer of the workspace, providing:
//! - Bracketing root finders for quantile inversion (`math::solvers`)
//! - Numerically stable online statistics (`math::statistics`)
//! - Standard normal distribution helpers (`math::distributions`)
//! - Correlation matrices with Cholesky factorisation (`math::correlation`)
//! - Error types: `SolverError`, `StatisticsError`, `CorrelationError` (`types::error`)
//!
//! ## Zero Dependency Principle
//!
//! Layer 1 has no dependencies on other mlmc_* crates, with minimal external dependencies:
//! - num-traits: Traits for generic numerical computation
//! - statrs: Normal distribution quantiles
//! - thiserror: Error derivation
//! - serde: Serialisation support (optional)
//!
//! ## Usage Examples
//!
//! ```rust
//! use mlmc_core::math::statistics::WelfordAccumulator;
//! use mlmc_core::math::solvers::{BisectionSolver, SolverConfig};
//!
//! let mut acc = WelfordAccumulator::new();
//! for x in [1.0, 2.0, 3.0, 4.0] {
//!     acc.push(x);
//! }
//! assert!((acc.mean() - 2.5).abs() < 1e-12);
//!
//! let solver = BisectionSolver::new(SolverConfig::default());
//! let root = solver.find_root(|x: f64| x * x - 2.0, 0.0, 2.0).unwrap();
//! assert!((root - std::f64::consts::SQRT_2).abs() < 1e-8);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialisation for error and statistics types

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod math;
pub mod types;
