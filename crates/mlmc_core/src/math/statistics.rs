//! Online sample statistics and rate regression.
//!
//! [`WelfordAccumulator`] keeps a running count, mean, and sum of squared
//! deviations (M2). Single observations are folded in with Welford's update
//! and partial accumulators are combined with Chan's pairwise formula, so the
//! variance never suffers from the cancellation of `E[x²] - E[x]²`.
//!
//! [`linear_regression`] fits `y = intercept + slope * x` by ordinary least
//! squares; it is used to estimate decay rates of level statistics.

use crate::types::StatisticsError;

/// Running mean and variance with Welford's algorithm.
///
/// # Examples
///
/// ```
/// use mlmc_core::math::statistics::WelfordAccumulator;
///
/// let mut left = WelfordAccumulator::new();
/// let mut right = WelfordAccumulator::new();
/// for x in [1.0, 2.0] { left.push(x); }
/// for x in [3.0, 4.0] { right.push(x); }
///
/// left.merge(&right);
/// assert_eq!(left.count(), 4);
/// assert!((left.mean() - 2.5).abs() < 1e-12);
/// assert!((left.variance() - 5.0 / 3.0).abs() < 1e-12);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WelfordAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl WelfordAccumulator {
    /// Creates an empty accumulator.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an accumulator from a slice of observations.
    pub fn from_slice(values: &[f64]) -> Self {
        let mut acc = Self::new();
        for &v in values {
            acc.push(v);
        }
        acc
    }

    /// Folds a single observation into the running moments.
    #[inline]
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Merges another accumulator into this one (Chan et al. pairwise update).
    ///
    /// The result is identical in distribution to pushing every observation
    /// of `other` after those of `self`.
    pub fn merge(&mut self, other: &WelfordAccumulator) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }

        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = n_a + n_b;
        let delta = other.mean - self.mean;

        self.mean += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.count += other.count;
    }

    /// Number of observations.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns `true` if no observations have been recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Sample mean (0 when empty).
    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Unbiased sample variance (0 for fewer than two observations).
    #[inline]
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).max(0.0)
        }
    }

    /// Population variance (divides by `n`).
    #[inline]
    pub fn population_variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0)
        }
    }

    /// Standard error of the mean, `sqrt(variance / n)`.
    #[inline]
    pub fn standard_error(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.variance() / self.count as f64).sqrt()
        }
    }
}

/// Performs a simple linear regression to fit `y = intercept + slope * x`.
///
/// # Returns
///
/// - `Ok((intercept, slope))`
/// - `Err(StatisticsError::LengthMismatch)` if `x` and `y` differ in length
/// - `Err(StatisticsError::InsufficientData)` for fewer than two points
/// - `Err(StatisticsError::DegenerateRegressor)` if all `x` are identical
///
/// # Example
///
/// ```
/// use mlmc_core::math::statistics::linear_regression;
///
/// let (intercept, slope) = linear_regression(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
/// assert!((slope - 2.0).abs() < 1e-10);
/// assert!(intercept.abs() < 1e-10);
/// ```
pub fn linear_regression(x: &[f64], y: &[f64]) -> Result<(f64, f64), StatisticsError> {
    if x.len() != y.len() {
        return Err(StatisticsError::LengthMismatch {
            x_len: x.len(),
            y_len: y.len(),
        });
    }
    let n = x.len();
    if n < 2 {
        return Err(StatisticsError::InsufficientData {
            required: 2,
            got: n,
        });
    }

    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut den = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        num += dx * (yi - mean_y);
        den += dx * dx;
    }

    if den == 0.0 {
        return Err(StatisticsError::DegenerateRegressor);
    }

    let slope = num / den;
    Ok((mean_y - slope * mean_x, slope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_empty_accumulator() {
        let acc = WelfordAccumulator::new();
        assert!(acc.is_empty());
        assert_eq!(acc.mean(), 0.0);
        assert_eq!(acc.variance(), 0.0);
        assert_eq!(acc.standard_error(), 0.0);
    }

    #[test]
    fn test_single_observation_has_zero_variance() {
        let acc = WelfordAccumulator::from_slice(&[3.5]);
        assert_eq!(acc.count(), 1);
        assert_eq!(acc.mean(), 3.5);
        assert_eq!(acc.variance(), 0.0);
    }

    #[test]
    fn test_known_moments() {
        let acc = WelfordAccumulator::from_slice(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_relative_eq!(acc.mean(), 5.0, epsilon = 1e-12);
        assert_relative_eq!(acc.population_variance(), 4.0, epsilon = 1e-12);
        assert_relative_eq!(acc.variance(), 32.0 / 7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_large_offset_is_stable() {
        // Naive sum-of-squares loses every significant digit here
        let offset = 1e9;
        let acc = WelfordAccumulator::from_slice(&[offset + 4.0, offset + 7.0, offset + 13.0, offset + 16.0]);
        assert_relative_eq!(acc.variance(), 30.0, epsilon = 1e-6);
    }

    #[test]
    fn test_merge_with_empty() {
        let mut acc = WelfordAccumulator::from_slice(&[1.0, 2.0]);
        let before = acc;
        acc.merge(&WelfordAccumulator::new());
        assert_eq!(acc, before);

        let mut empty = WelfordAccumulator::new();
        empty.merge(&before);
        assert_eq!(empty, before);
    }

    #[test]
    fn test_regression_two_points() {
        let (intercept, slope) = linear_regression(&[1.0, 2.0], &[2.0, 4.0]).unwrap();
        assert_relative_eq!(slope, 2.0, epsilon = 1e-12);
        assert!(intercept.abs() < 1e-12);
    }

    #[test]
    fn test_regression_errors() {
        assert!(matches!(
            linear_regression(&[1.0], &[2.0]),
            Err(StatisticsError::InsufficientData { required: 2, got: 1 })
        ));
        assert!(matches!(
            linear_regression(&[1.0, 2.0], &[2.0]),
            Err(StatisticsError::LengthMismatch { .. })
        ));
        assert!(matches!(
            linear_regression(&[1.0, 1.0], &[2.0, 3.0]),
            Err(StatisticsError::DegenerateRegressor)
        ));
    }

    proptest! {
        #[test]
        fn prop_merge_matches_sequential(
            xs in prop::collection::vec(-1e3f64..1e3, 0..50),
            ys in prop::collection::vec(-1e3f64..1e3, 0..50),
        ) {
            let mut merged = WelfordAccumulator::from_slice(&xs);
            merged.merge(&WelfordAccumulator::from_slice(&ys));

            let all: Vec<f64> = xs.iter().chain(ys.iter()).copied().collect();
            let sequential = WelfordAccumulator::from_slice(&all);

            prop_assert_eq!(merged.count(), sequential.count());
            prop_assert!((merged.mean() - sequential.mean()).abs() <= 1e-9 * (1.0 + sequential.mean().abs()));
            prop_assert!((merged.variance() - sequential.variance()).abs() <= 1e-7 * (1.0 + sequential.variance()));
        }

        #[test]
        fn prop_variance_non_negative(xs in prop::collection::vec(-1e6f64..1e6, 0..100)) {
            let acc = WelfordAccumulator::from_slice(&xs);
            prop_assert!(acc.variance() >= 0.0);
        }
    }
}
