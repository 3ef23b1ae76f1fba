//! Reference risk-factor generators and portfolio loss functions.
//!
//! This module provides:
//! - GBM risk factors with Gaussian-copula correlation ([`GbmFactorGenerator`])
//! - Full-revaluation and delta-gamma portfolio losses ([`LinearPortfolioLoss`],
//!   [`DeltaGammaLoss`])
//! - Nested inner-Monte-Carlo option repricing ([`NestedOptionLoss`])
//! - Closed forms for validation ([`lognormal_var`], [`black_scholes_price`])
//! - Historical calibration of GBM factors ([`calibrate_gbm`])

mod analytical;
mod calibration;
mod error;
mod gbm;
mod nested;
mod portfolio;

pub use analytical::{
    black_scholes_price, lognormal_expected_shortfall, lognormal_var, BlackScholes, OptionType,
};
pub use calibration::{
    calibrate_gbm, empirical_volatility, period_returns, CalibratedFactors, ReturnLength, ReturnType,
};
pub use error::ModelError;
pub use gbm::{simulate_terminal, FactorPath, GbmAsset, GbmFactorGenerator, Scheme};
pub use nested::{EuropeanOption, NestedDraw, NestedOptionGenerator, NestedOptionLoss};
pub use portfolio::{DeltaGammaLoss, Instrument, LinearPortfolioLoss};
