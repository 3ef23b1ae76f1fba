//! Root-finding solvers.
//!
//! ## Available Solvers
//!
//! - [`BisectionSolver`]: Derivative-free bracketing method that only relies on
//!   the sign of the objective. Works for monotone step functions such as
//!   empirical tail probabilities, where interpolating methods stall.
//!
//! ## Configuration
//!
//! [`SolverConfig`] is the stopping rule: a bracket half-width tolerance
//! (default 1e-10, relative above 1) and an iteration cap (default 200).
//!
//! ## Examples
//!
//! ```
//! use mlmc_core::math::solvers::{BisectionSolver, SolverConfig};
//!
//! let solver = BisectionSolver::new(SolverConfig::default());
//!
//! // Empirical survival function of {1, 2, 3, 4} crosses 0.5 between 2 and 3
//! let data = [1.0, 2.0, 3.0, 4.0];
//! let survival = |x: f64| data.iter().filter(|&&v| v > x).count() as f64 / 4.0 - 0.5;
//!
//! let root = solver.find_root(survival, 0.0, 5.0).unwrap();
//! assert!(root >= 2.0 && root <= 3.0);
//! ```

mod bisection;
mod config;

pub use bisection::BisectionSolver;
pub use config::SolverConfig;
