//! # mlmc_risk: Multilevel Monte Carlo Value-at-Risk (Layer 4)
//!
//! ## Layer 4 Role
//!
//! mlmc_risk drives the multilevel estimator on top of the coupled sampler:
//! - Configuration with validation (`config`)
//! - Level statistics, optimal allocation and bias estimation (`hierarchy`)
//! - The refinement state machine with cancellation (`estimator`)
//! - VaR, confidence interval and Expected Shortfall extraction (`var`)
//! - Per-level summaries and text rendering (`report`)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             mlmc_risk (L4)              │
//! ├─────────────────────────────────────────┤
//! │  estimator/ - MlmcEstimator, phases,    │
//! │               CancellationToken         │
//! │  hierarchy/ - LevelStatistics, rates,   │
//! │               allocation, bias test     │
//! │  var/       - VarExtractor, RiskEstimate│
//! │  report     - LevelSummary tables       │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │           mlmc_pricing (L3)             │
//! │  Coupled loss sampling, reference models│
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm
//!
//! The expected loss is written as the telescoping sum
//! `E[P_L] = E[P_0] + sum_l E[P_l - P_{l-1}]`. Each refinement round asks the
//! hierarchy for the cost-optimal number of additional samples per level,
//! draws them in parallel, and adds a level while the extrapolated bias
//! exceeds its share of the MSE budget. The VaR is the root of the
//! multilevel tail-probability estimator `G(x) = 1 - alpha`; once the mean
//! has converged, tail rounds allocate samples against the indicator
//! variances of `G` at the VaR until its standard error meets its target.
//!
//! ## Example
//!
//! ```
//! use mlmc_pricing::models::{lognormal_var, GbmAsset, GbmFactorGenerator, LinearPortfolioLoss};
//! use mlmc_risk::{run, MlmcConfig};
//!
//! let horizon = 1.0 / 52.0;
//! let asset = GbmAsset::new(10.0, 0.05, 0.2).unwrap();
//! let loss = LinearPortfolioLoss::single_asset(asset, 1.0, horizon).unwrap();
//! let config = MlmcConfig::builder()
//!     .target_mse(1e-5)
//!     .confidence_level(0.95)
//!     .build()
//!     .unwrap();
//!
//! let estimate = run(config, GbmFactorGenerator::single(), loss).unwrap();
//! let exact = lognormal_var(10.0, 0.05, 0.2, horizon, 1.0, 0.95).unwrap();
//! assert!((estimate.var - exact).abs() < 0.1 * exact);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Serialisation of configurations, summaries and estimates

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod config;
pub mod error;
pub mod estimator;
pub mod hierarchy;
pub mod report;
pub mod var;

pub use config::{ConfigError, MlmcConfig, MlmcConfigBuilder, RateOverrides};
pub use error::{Diagnostics, EstimationError, MlmcError};
pub use estimator::{run, CancellationToken, EstimatorPhase, MlmcEstimator};
pub use report::LevelSummary;
pub use var::{ConfidenceInterval, ConvergenceStatus, MeanInterval, NotConvergedReason, RiskEstimate};
