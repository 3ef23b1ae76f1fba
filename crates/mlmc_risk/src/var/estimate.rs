//! Final risk estimate and convergence status.

use std::fmt;

use crate::error::MlmcError;
use crate::hierarchy::RateEstimates;
use crate::report::LevelSummary;

/// Why refinement stopped before the MSE target was certified.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NotConvergedReason {
    /// The bias test still failed at the maximum level count.
    LevelBoundExceeded {
        /// Configured maximum level count.
        max_levels: usize,
        /// Bias estimate when refinement stopped.
        bias: f64,
    },
    /// Cancellation token or wall-clock budget.
    Cancelled,
    /// The refinement round cap was reached.
    RoundLimit {
        /// Configured cap.
        rounds: usize,
    },
}

impl fmt::Display for NotConvergedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LevelBoundExceeded { max_levels, bias } => {
                write!(f, "bias {:.3e} too large at {} levels", bias, max_levels)
            }
            Self::Cancelled => write!(f, "cancelled"),
            Self::RoundLimit { rounds } => write!(f, "round limit {} reached", rounds),
        }
    }
}

/// Convergence status of a run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConvergenceStatus {
    /// Estimated MSE is within the target.
    Converged,
    /// Refinement stopped early; the estimate is the best available.
    NotConverged {
        /// Stopping reason.
        reason: NotConvergedReason,
    },
}

impl ConvergenceStatus {
    /// Whether the run converged.
    #[inline]
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }

    /// Why refinement stopped early, if it did.
    #[inline]
    pub fn reason(&self) -> Option<&NotConvergedReason> {
        match self {
            Self::Converged => None,
            Self::NotConverged { reason } => Some(reason),
        }
    }
}

/// Confidence interval of the VaR, symmetric on the loss axis.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConfidenceInterval {
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
    /// Confidence level of the interval.
    pub level: f64,
    /// Standard error of the VaR in loss units.
    pub standard_error: f64,
    /// Standard error of the tail probability at the VaR.
    pub tail_standard_error: f64,
    /// Estimated loss density at the VaR.
    pub density: f64,
    /// Extrapolated discretisation bias of the VaR, in loss units.
    pub bias: f64,
}

impl ConfidenceInterval {
    /// `upper - lower`.
    #[inline]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Confidence interval of the telescoped mean loss: `mean +- z sqrt(MSE)`.
///
/// The half-width uses the full estimated MSE, bias included.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeanInterval {
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
    /// Confidence level of the interval.
    pub level: f64,
}

impl MeanInterval {
    /// Interval of half-width `z sqrt(mse)` around `mean`.
    pub fn new(mean: f64, mse: f64, z: f64, level: f64) -> Self {
        let half_width = z * mse.max(0.0).sqrt();
        Self {
            lower: mean - half_width,
            upper: mean + half_width,
            level,
        }
    }

    /// Whether `value` lies inside the closed interval.
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Decomposition of the estimated mean squared error.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MseBreakdown {
    /// Squared bias estimate.
    pub bias_squared: f64,
    /// Statistical variance `sum V_l / N_l`.
    pub variance: f64,
    /// `bias_squared + variance`.
    pub total: f64,
    /// Requested `eps^2`.
    pub target: f64,
}

/// Result of a multilevel VaR estimation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RiskEstimate {
    /// Confidence level `alpha` of the VaR.
    pub confidence_level: f64,
    /// Value-at-Risk.
    pub var: f64,
    /// Interval around the VaR, absent when the tail was too thin.
    pub confidence_interval: Option<ConfidenceInterval>,
    /// Expected Shortfall, when enabled.
    pub expected_shortfall: Option<f64>,
    /// Telescoped mean loss.
    pub mean_loss: f64,
    /// Interval around the mean loss.
    pub mean_interval: MeanInterval,
    /// MSE of the mean estimator.
    pub mse: MseBreakdown,
    /// Convergence status.
    pub status: ConvergenceStatus,
    /// Per-level statistics.
    pub levels: Vec<LevelSummary>,
    /// Decay rates used by the final allocation.
    pub rates: RateEstimates,
    /// Finest level holding samples.
    pub tail_level: usize,
    /// Finest-level fine losses strictly above the VaR.
    pub tail_samples: u64,
    /// Level-0 losses strictly above the VaR.
    pub level_zero_tail_samples: u64,
    /// Suggested remedy when the tail was too thin.
    pub recommendation: Option<String>,
    /// Retained samples over all levels.
    pub total_samples: u64,
    /// Nominal work units consumed.
    pub total_cost: f64,
    /// Refinement rounds executed.
    pub rounds: usize,
    /// Wall-clock seconds.
    pub elapsed_seconds: f64,
}

impl RiskEstimate {
    /// Whether the run converged.
    #[inline]
    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }

    /// Returns the estimate if converged, else the stopping reason as an error.
    ///
    /// # Errors
    ///
    /// `MlmcError::LevelBoundExceeded`, `MlmcError::Cancelled` or
    /// `MlmcError::RoundLimit` matching the status.
    pub fn into_converged(self) -> Result<Self, MlmcError> {
        match &self.status {
            ConvergenceStatus::Converged => Ok(self),
            ConvergenceStatus::NotConverged { reason } => Err(match reason {
                NotConvergedReason::LevelBoundExceeded { max_levels, bias } => {
                    MlmcError::LevelBoundExceeded {
                        max_levels: *max_levels,
                        bias: *bias,
                    }
                }
                NotConvergedReason::Cancelled => MlmcError::Cancelled,
                NotConvergedReason::RoundLimit { rounds } => MlmcError::RoundLimit(*rounds),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(status: ConvergenceStatus) -> RiskEstimate {
        RiskEstimate {
            confidence_level: 0.99,
            var: 1.0,
            confidence_interval: None,
            expected_shortfall: None,
            mean_loss: 0.0,
            mean_interval: MeanInterval::new(0.0, 0.0, 1.96, 0.95),
            mse: MseBreakdown {
                bias_squared: 0.0,
                variance: 0.0,
                total: 0.0,
                target: 1e-4,
            },
            status,
            levels: Vec::new(),
            rates: RateEstimates {
                alpha: 1.0,
                beta: 2.0,
                gamma: 1.0,
            },
            tail_level: 0,
            tail_samples: 0,
            level_zero_tail_samples: 0,
            recommendation: None,
            total_samples: 0,
            total_cost: 0.0,
            rounds: 0,
            elapsed_seconds: 0.0,
        }
    }

    #[test]
    fn test_into_converged() {
        assert!(estimate(ConvergenceStatus::Converged).into_converged().is_ok());

        let stopped = estimate(ConvergenceStatus::NotConverged {
            reason: NotConvergedReason::LevelBoundExceeded {
                max_levels: 4,
                bias: 0.1,
            },
        });
        assert!(!stopped.is_converged());
        assert_eq!(stopped.status.reason(), Some(&NotConvergedReason::LevelBoundExceeded { max_levels: 4, bias: 0.1 }));
        assert_eq!(ConvergenceStatus::Converged.reason(), None);
        assert!(matches!(
            stopped.into_converged(),
            Err(MlmcError::LevelBoundExceeded { max_levels: 4, .. })
        ));

        let cancelled = estimate(ConvergenceStatus::NotConverged {
            reason: NotConvergedReason::Cancelled,
        });
        assert_eq!(cancelled.into_converged(), Err(MlmcError::Cancelled));
    }

    #[test]
    fn test_mean_interval_half_width() {
        let interval = MeanInterval::new(2.0, 1e-4, 2.0, 0.95);
        assert!((interval.lower - 1.98).abs() < 1e-12);
        assert!((interval.upper - 2.02).abs() < 1e-12);
        assert!(interval.contains(2.015));
        assert!(!interval.contains(2.03));

        let degenerate = MeanInterval::new(1.0, 0.0, 1.96, 0.95);
        assert_eq!((degenerate.lower, degenerate.upper), (1.0, 1.0));
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(NotConvergedReason::Cancelled.to_string(), "cancelled");
        assert_eq!(
            NotConvergedReason::RoundLimit { rounds: 5 }.to_string(),
            "round limit 5 reached"
        );
    }
}
