//! Decay-rate regression over the level hierarchy.

use mlmc_core::math::statistics::linear_regression;

use super::level::LevelStatistics;
use crate::config::RateOverrides;

/// Lower bound applied to every fitted rate.
pub const RATE_FLOOR: f64 = 0.5;

/// Fitted (or fixed) rates of the MLMC complexity theorem.
///
/// `|E[Y_l]| ~ M^(-alpha l)`, `Var[Y_l] ~ M^(-beta l)`, `C_l ~ M^(gamma l)`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RateEstimates {
    /// Weak (bias) decay rate.
    pub alpha: f64,
    /// Variance decay rate.
    pub beta: f64,
    /// Cost growth rate.
    pub gamma: f64,
}

/// Slope of `log_M(y_l)` against `l` over levels `l >= 1` with positive `y`.
fn log_slope<F>(levels: &[LevelStatistics], factor: usize, value: F) -> Option<f64>
where
    F: Fn(&LevelStatistics) -> f64,
{
    let log_m = (factor as f64).ln();
    let (x, y): (Vec<f64>, Vec<f64>) = levels
        .iter()
        .filter(|l| l.level() >= 1 && l.count() > 0)
        .filter_map(|l| {
            let v = value(l);
            (v > 0.0 && v.is_finite()).then(|| (l.level() as f64, v.ln() / log_m))
        })
        .unzip();
    linear_regression(&x, &y).ok().map(|(_, slope)| slope)
}

/// Fits `alpha`, `beta` and `gamma`, honouring fixed overrides.
///
/// Falls back to [`RATE_FLOOR`] when fewer than two usable levels exist.
pub(crate) fn fit_rates(levels: &[LevelStatistics], factor: usize, overrides: RateOverrides) -> RateEstimates {
    let alpha = overrides.alpha.unwrap_or_else(|| {
        log_slope(levels, factor, |l| l.mean().abs()).map_or(RATE_FLOOR, |s| (-s).max(RATE_FLOOR))
    });
    let beta = overrides.beta.unwrap_or_else(|| {
        log_slope(levels, factor, LevelStatistics::variance).map_or(RATE_FLOOR, |s| (-s).max(RATE_FLOOR))
    });
    let gamma = overrides.gamma.unwrap_or_else(|| {
        log_slope(levels, factor, LevelStatistics::cost_per_sample).map_or(RATE_FLOOR, |s| s.max(RATE_FLOOR))
    });
    RateEstimates { alpha, beta, gamma }
}
