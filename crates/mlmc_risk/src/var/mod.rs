//! VaR and Expected Shortfall extraction.
//!
//! - [`VarExtractor`]: inverts the multilevel tail-probability estimator
//! - [`RiskEstimate`]: the immutable result of a run

mod estimate;
mod extractor;

pub use estimate::{
    ConfidenceInterval, ConvergenceStatus, MeanInterval, MseBreakdown, NotConvergedReason, RiskEstimate,
};
pub use extractor::{LevelExceedances, TailEstimate, TailSettings, VarExtractor};
