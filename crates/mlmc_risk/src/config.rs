//! MLMC estimation configuration.
//!
//! This module provides [`MlmcConfig`] and its builder. Every run is fully
//! described by a configuration: with a fixed seed and no wall-clock budget
//! the refinement path and the estimate are reproducible.

use std::time::Duration;

use mlmc_pricing::sampler::{ResolutionSchedule, RetryPolicy, DEFAULT_BATCH_SIZE};
use thiserror::Error;

/// Default VaR confidence level.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.99;

/// Default number of warm-up samples for a newly added level.
pub const DEFAULT_WARM_UP_SAMPLES: u64 = 1_000;

/// Default upper bound on the number of levels.
pub const DEFAULT_MAX_LEVELS: usize = 10;

/// Default lower bound on the number of levels before convergence is tested.
pub const DEFAULT_MIN_LEVELS: usize = 3;

/// Default safety cap on refinement rounds.
pub const DEFAULT_MAX_ROUNDS: usize = 1_000;

/// Default target standard error of the VaR relative to its magnitude.
pub const DEFAULT_VAR_REL_TOLERANCE: f64 = 2.5e-3;

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A probability-like parameter outside `(0, 1)`.
    #[error("Invalid {name} {value}: must be in (0, 1)")]
    InvalidProbability {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// Level bounds inconsistent.
    #[error("Invalid level bounds: min_levels = {min_levels}, max_levels = {max_levels}")]
    InvalidLevelBounds {
        /// Requested minimum.
        min_levels: usize,
        /// Requested maximum.
        max_levels: usize,
    },

    /// Any other invalid parameter.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Description of the problem.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Fixed decay rates overriding the regression estimates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RateOverrides {
    /// Weak (bias) decay rate.
    pub alpha: Option<f64>,
    /// Variance decay rate.
    pub beta: Option<f64>,
    /// Cost growth rate.
    pub gamma: Option<f64>,
}

/// Multilevel Monte Carlo VaR configuration.
///
/// Use [`MlmcConfigBuilder`] to construct instances.
///
/// # Examples
///
/// ```rust
/// use mlmc_risk::MlmcConfig;
///
/// let config = MlmcConfig::builder()
///     .target_mse(1e-4)
///     .confidence_level(0.99)
///     .seed(7)
///     .build()
///     .expect("valid configuration");
///
/// assert_eq!(config.target_mse(), 1e-4);
/// assert_eq!(config.min_levels(), 3);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MlmcConfig {
    confidence_level: f64,
    target_mse: f64,
    max_levels: usize,
    min_levels: usize,
    base_resolution: usize,
    refinement_factor: usize,
    warm_up_samples: u64,
    seed: u64,
    time_budget: Option<Duration>,
    max_retries: u32,
    max_failure_rate: f64,
    batch_size: usize,
    n_workers: Option<usize>,
    theta: f64,
    ci_level: f64,
    min_tail_samples: u64,
    max_interval_width: Option<f64>,
    expected_shortfall: bool,
    var_rel_tolerance: f64,
    rates: RateOverrides,
    max_rounds: usize,
}

impl MlmcConfig {
    /// Creates a new configuration builder.
    #[inline]
    pub fn builder() -> MlmcConfigBuilder {
        MlmcConfigBuilder::default()
    }

    /// VaR confidence level `alpha`.
    #[inline]
    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// Target mean squared error `eps^2` of the mean estimator.
    #[inline]
    pub fn target_mse(&self) -> f64 {
        self.target_mse
    }

    /// Maximum number of levels.
    #[inline]
    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    /// Minimum number of levels before the bias test applies.
    #[inline]
    pub fn min_levels(&self) -> usize {
        self.min_levels
    }

    /// Resolution of level 0.
    #[inline]
    pub fn base_resolution(&self) -> usize {
        self.base_resolution
    }

    /// Resolution ratio `M` between consecutive levels.
    #[inline]
    pub fn refinement_factor(&self) -> usize {
        self.refinement_factor
    }

    /// Samples drawn on a level when it is created.
    #[inline]
    pub fn warm_up_samples(&self) -> u64 {
        self.warm_up_samples
    }

    /// Base random seed.
    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Optional wall-clock budget.
    #[inline]
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget
    }

    /// Retry attempts per failed sample.
    #[inline]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Largest tolerated fraction of dropped samples per batch.
    #[inline]
    pub fn max_failure_rate(&self) -> f64 {
        self.max_failure_rate
    }

    /// Sample indices per parallel work unit.
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Worker threads (`None` uses all cores).
    #[inline]
    pub fn n_workers(&self) -> Option<usize> {
        self.n_workers
    }

    /// Share `theta` of the MSE budget given to the squared bias.
    #[inline]
    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// Confidence level of the VaR interval.
    #[inline]
    pub fn ci_level(&self) -> f64 {
        self.ci_level
    }

    /// Minimum finest-level exceedances of the VaR.
    #[inline]
    pub fn min_tail_samples(&self) -> u64 {
        self.min_tail_samples
    }

    /// Optional upper bound on the interval width.
    #[inline]
    pub fn max_interval_width(&self) -> Option<f64> {
        self.max_interval_width
    }

    /// Whether Expected Shortfall is computed.
    #[inline]
    pub fn expected_shortfall(&self) -> bool {
        self.expected_shortfall
    }

    /// Relative VaR standard-error target of the tail refinement.
    ///
    /// The tail stage samples until the VaR standard error is at most
    /// `max(var_rel_tolerance * |VaR|, sqrt((1 - theta) * target_mse))`.
    #[inline]
    pub fn var_rel_tolerance(&self) -> f64 {
        self.var_rel_tolerance
    }

    /// Absolute VaR standard-error target at a given VaR.
    #[inline]
    pub fn var_standard_error_target(&self, var: f64) -> f64 {
        (self.var_rel_tolerance * var.abs()).max(((1.0 - self.theta) * self.target_mse).sqrt())
    }

    /// Fixed decay rates.
    #[inline]
    pub fn rates(&self) -> RateOverrides {
        self.rates
    }

    /// Safety cap on refinement rounds.
    #[inline]
    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Resolution schedule implied by the base resolution and refinement factor.
    ///
    /// # Errors
    /// `ConfigError` if either parameter is invalid.
    pub fn schedule(&self) -> Result<ResolutionSchedule, ConfigError> {
        ResolutionSchedule::new(self.base_resolution, self.refinement_factor)
            .map_err(|e| ConfigError::invalid("resolution", e.to_string()))
    }

    /// Retry policy handed to the sampler.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            max_failure_rate: self.max_failure_rate,
        }
    }

    /// Returns a copy with a different seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Returns a copy with a different target MSE, revalidated.
    ///
    /// # Errors
    /// `ConfigError` if `target_mse` is not positive and finite.
    pub fn with_target_mse(mut self, target_mse: f64) -> Result<Self, ConfigError> {
        self.target_mse = target_mse;
        self.validate()?;
        Ok(self)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any parameter is outside its domain, e.g.
    /// `confidence_level` not in (0, 1), `target_mse <= 0`, `min_levels < 2`
    /// or `min_levels > max_levels`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("confidence_level", self.confidence_level),
            ("theta", self.theta),
            ("ci_level", self.ci_level),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::InvalidProbability { name, value });
            }
        }
        if !(self.target_mse > 0.0 && self.target_mse.is_finite()) {
            return Err(ConfigError::invalid(
                "target_mse",
                format!("{} must be positive and finite", self.target_mse),
            ));
        }
        if self.min_levels < 2 || self.min_levels > self.max_levels {
            return Err(ConfigError::InvalidLevelBounds {
                min_levels: self.min_levels,
                max_levels: self.max_levels,
            });
        }
        if self.schedule()?.resolution(self.max_levels - 1).is_none() {
            return Err(ConfigError::invalid(
                "max_levels",
                format!("finest resolution of level {} overflows", self.max_levels - 1),
            ));
        }
        if self.warm_up_samples < 2 {
            return Err(ConfigError::invalid(
                "warm_up_samples",
                "at least 2 samples are needed for a variance",
            ));
        }
        if !(0.0..=1.0).contains(&self.max_failure_rate) {
            return Err(ConfigError::invalid(
                "max_failure_rate",
                format!("{} must be in [0, 1]", self.max_failure_rate),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be at least 1"));
        }
        if self.n_workers == Some(0) {
            return Err(ConfigError::invalid("n_workers", "must be at least 1"));
        }
        if !(self.var_rel_tolerance > 0.0) {
            return Err(ConfigError::invalid(
                "var_rel_tolerance",
                format!("{} must be positive", self.var_rel_tolerance),
            ));
        }
        if let Some(width) = self.max_interval_width {
            if !(width > 0.0) {
                return Err(ConfigError::invalid(
                    "max_interval_width",
                    format!("{} must be positive", width),
                ));
            }
        }
        for (name, rate) in [
            ("alpha", self.rates.alpha),
            ("beta", self.rates.beta),
            ("gamma", self.rates.gamma),
        ] {
            if let Some(r) = rate {
                if !(r > 0.0 && r.is_finite()) {
                    return Err(ConfigError::invalid(name, format!("{} must be positive", r)));
                }
            }
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::invalid("max_rounds", "must be at least 1"));
        }
        Ok(())
    }
}

/// Builder for [`MlmcConfig`].
///
/// Only `target_mse` is required; every other parameter has a default.
#[derive(Clone, Debug)]
pub struct MlmcConfigBuilder {
    target_mse: Option<f64>,
    config: MlmcConfig,
}

impl Default for MlmcConfigBuilder {
    fn default() -> Self {
        Self {
            target_mse: None,
            config: MlmcConfig {
                confidence_level: DEFAULT_CONFIDENCE_LEVEL,
                target_mse: f64::NAN,
                max_levels: DEFAULT_MAX_LEVELS,
                min_levels: DEFAULT_MIN_LEVELS,
                base_resolution: 1,
                refinement_factor: 2,
                warm_up_samples: DEFAULT_WARM_UP_SAMPLES,
                seed: 42,
                time_budget: None,
                max_retries: 1,
                max_failure_rate: 0.01,
                batch_size: DEFAULT_BATCH_SIZE,
                n_workers: None,
                theta: 0.5,
                ci_level: 0.95,
                min_tail_samples: 10,
                max_interval_width: None,
                expected_shortfall: true,
                var_rel_tolerance: DEFAULT_VAR_REL_TOLERANCE,
                rates: RateOverrides::default(),
                max_rounds: DEFAULT_MAX_ROUNDS,
            },
        }
    }
}

impl MlmcConfigBuilder {
    /// Sets the VaR confidence level, e.g. 0.99.
    #[inline]
    pub fn confidence_level(mut self, alpha: f64) -> Self {
        self.config.confidence_level = alpha;
        self
    }

    /// Sets the target MSE `eps^2` (required).
    #[inline]
    pub fn target_mse(mut self, target_mse: f64) -> Self {
        self.target_mse = Some(target_mse);
        self
    }

    /// Sets the maximum number of levels.
    #[inline]
    pub fn max_levels(mut self, max_levels: usize) -> Self {
        self.config.max_levels = max_levels;
        self
    }

    /// Sets the minimum number of levels (at least 2).
    #[inline]
    pub fn min_levels(mut self, min_levels: usize) -> Self {
        self.config.min_levels = min_levels;
        self
    }

    /// Sets the level-0 resolution.
    #[inline]
    pub fn base_resolution(mut self, base: usize) -> Self {
        self.config.base_resolution = base;
        self
    }

    /// Sets the refinement factor `M` (at least 2).
    #[inline]
    pub fn refinement_factor(mut self, factor: usize) -> Self {
        self.config.refinement_factor = factor;
        self
    }

    /// Sets the warm-up sample count for new levels.
    #[inline]
    pub fn warm_up_samples(mut self, n: u64) -> Self {
        self.config.warm_up_samples = n;
        self
    }

    /// Sets the base seed.
    #[inline]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Sets a wall-clock budget after which the run stops as `Cancelled`.
    #[inline]
    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.config.time_budget = Some(budget);
        self
    }

    /// Sets retry attempts per failed sample.
    #[inline]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Sets the tolerated dropped-sample fraction per batch.
    #[inline]
    pub fn max_failure_rate(mut self, rate: f64) -> Self {
        self.config.max_failure_rate = rate;
        self
    }

    /// Sets the chunk size of parallel sampling.
    #[inline]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Sets the worker thread count.
    #[inline]
    pub fn n_workers(mut self, n: usize) -> Self {
        self.config.n_workers = Some(n);
        self
    }

    /// Sets the bias share `theta` of the MSE budget.
    #[inline]
    pub fn theta(mut self, theta: f64) -> Self {
        self.config.theta = theta;
        self
    }

    /// Sets the confidence level of the VaR interval.
    #[inline]
    pub fn ci_level(mut self, level: f64) -> Self {
        self.config.ci_level = level;
        self
    }

    /// Sets the minimum finest-level tail sample count.
    #[inline]
    pub fn min_tail_samples(mut self, n: u64) -> Self {
        self.config.min_tail_samples = n;
        self
    }

    /// Sets the maximum interval width.
    #[inline]
    pub fn max_interval_width(mut self, width: f64) -> Self {
        self.config.max_interval_width = Some(width);
        self
    }

    /// Enables or disables Expected Shortfall.
    #[inline]
    pub fn expected_shortfall(mut self, enabled: bool) -> Self {
        self.config.expected_shortfall = enabled;
        self
    }

    /// Sets the relative VaR standard-error target; `f64::INFINITY` leaves
    /// only the MSE-derived target.
    #[inline]
    pub fn var_rel_tolerance(mut self, tolerance: f64) -> Self {
        self.config.var_rel_tolerance = tolerance;
        self
    }

    /// Fixes the weak decay rate instead of fitting it.
    #[inline]
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.config.rates.alpha = Some(alpha);
        self
    }

    /// Fixes the variance decay rate instead of fitting it.
    #[inline]
    pub fn beta(mut self, beta: f64) -> Self {
        self.config.rates.beta = Some(beta);
        self
    }

    /// Fixes the cost growth rate instead of fitting it.
    #[inline]
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.config.rates.gamma = Some(gamma);
        self
    }

    /// Sets the refinement round cap.
    #[inline]
    pub fn max_rounds(mut self, rounds: usize) -> Self {
        self.config.max_rounds = rounds;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `target_mse` is not set or any parameter is
    /// invalid.
    pub fn build(self) -> Result<MlmcConfig, ConfigError> {
        let target_mse = self
            .target_mse
            .ok_or_else(|| ConfigError::invalid("target_mse", "must be specified"))?;
        let config = MlmcConfig {
            target_mse,
            ..self.config
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> MlmcConfigBuilder {
        MlmcConfig::builder().target_mse(1e-4)
    }

    #[test]
    fn test_defaults() {
        let config = base().build().unwrap();
        assert_eq!(config.confidence_level(), 0.99);
        assert_eq!(config.max_levels(), DEFAULT_MAX_LEVELS);
        assert_eq!(config.warm_up_samples(), DEFAULT_WARM_UP_SAMPLES);
        assert_eq!(config.max_retries(), 1);
        assert_eq!(config.theta(), 0.5);
        assert_eq!(config.ci_level(), 0.95);
        assert_eq!(config.min_tail_samples(), 10);
        assert!(config.expected_shortfall());
        assert_eq!(config.var_rel_tolerance(), DEFAULT_VAR_REL_TOLERANCE);
        assert_eq!(config.rates(), RateOverrides::default());
        assert_eq!(config.time_budget(), None);
        assert_eq!(config.n_workers(), None);
    }

    #[test]
    fn test_missing_target_mse() {
        let result = MlmcConfig::builder().build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "target_mse",
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_confidence_level() {
        for alpha in [0.0, 1.0, -0.5, f64::NAN] {
            let result = base().confidence_level(alpha).build();
            assert!(
                matches!(
                    result,
                    Err(ConfigError::InvalidProbability {
                        name: "confidence_level",
                        ..
                    })
                ),
                "alpha = {}",
                alpha
            );
        }
    }

    #[test]
    fn test_invalid_target_mse() {
        assert!(MlmcConfig::builder().target_mse(0.0).build().is_err());
        assert!(MlmcConfig::builder().target_mse(f64::INFINITY).build().is_err());
    }

    #[test]
    fn test_level_bounds() {
        assert!(matches!(
            base().min_levels(1).build(),
            Err(ConfigError::InvalidLevelBounds { .. })
        ));
        assert!(matches!(
            base().min_levels(5).max_levels(4).build(),
            Err(ConfigError::InvalidLevelBounds { .. })
        ));
        assert!(base().min_levels(4).max_levels(4).build().is_ok());
    }

    #[test]
    fn test_resolution_overflow_rejected() {
        let result = base().refinement_factor(16).max_levels(40).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "max_levels",
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_misc_parameters() {
        assert!(base().refinement_factor(1).build().is_err());
        assert!(base().base_resolution(0).build().is_err());
        assert!(base().warm_up_samples(1).build().is_err());
        assert!(base().max_failure_rate(1.5).build().is_err());
        assert!(base().batch_size(0).build().is_err());
        assert!(base().n_workers(0).build().is_err());
        assert!(base().max_interval_width(0.0).build().is_err());
        assert!(base().var_rel_tolerance(0.0).build().is_err());
        assert!(base().var_rel_tolerance(f64::NAN).build().is_err());
        assert!(base().alpha(-1.0).build().is_err());
        assert!(base().max_rounds(0).build().is_err());
        assert!(base().theta(1.0).build().is_err());
    }

    #[test]
    fn test_var_standard_error_target() {
        let config = base().theta(0.5).var_rel_tolerance(1e-2).build().unwrap();
        assert_eq!(config.var_rel_tolerance(), 1e-2);
        // Relative term dominates for large VaR.
        assert!((config.var_standard_error_target(10.0) - 0.1).abs() < 1e-15);
        // sqrt(0.5 * 1e-4) once the VaR is small.
        assert!((config.var_standard_error_target(0.1) - 0.5_f64.sqrt() * 1e-2).abs() < 1e-15);
    }

    #[test]
    fn test_with_target_mse_revalidates() {
        let config = base().build().unwrap();
        assert_eq!(config.clone().with_target_mse(2e-4).unwrap().target_mse(), 2e-4);
        assert!(config.with_target_mse(-1.0).is_err());
    }

    #[test]
    fn test_schedule_and_retry_policy() {
        let config = base().base_resolution(4).refinement_factor(4).max_retries(3).build().unwrap();
        let schedule = config.schedule().unwrap();
        assert_eq!(schedule.resolution(2), Some(64));
        assert_eq!(config.retry_policy().max_retries, 3);
    }
}
