//! Standard normal distribution functions.
//!
//! Thin wrappers over the `statrs` error functions:
//! - `norm_cdf`: Φ(x) = ½ erfc(-x / √2)
//! - `norm_pdf`: φ(x) = exp(-x² / 2) / √(2π)
//! - `norm_quantile`: Φ⁻¹(p) = -√2 erfc⁻¹(2p)

use statrs::function::erf::{erfc, erfc_inv};

use crate::types::StatisticsError;

/// 1 / sqrt(2 * pi)
const FRAC_1_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Standard normal cumulative distribution function.
///
/// # Examples
/// ```
/// use mlmc_core::math::distributions::norm_cdf;
///
/// assert!((norm_cdf(0.0) - 0.5).abs() < 1e-15);
/// assert!(norm_cdf(-3.0) < 0.01);
/// ```
#[inline]
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal probability density function.
///
/// # Examples
/// ```
/// use mlmc_core::math::distributions::norm_pdf;
///
/// assert!((norm_pdf(0.0) - 0.3989422804).abs() < 1e-9);
/// ```
#[inline]
pub fn norm_pdf(x: f64) -> f64 {
    FRAC_1_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal quantile (inverse CDF).
///
/// # Errors
///
/// Returns `StatisticsError::InvalidProbability` unless `0 < p < 1`.
///
/// # Examples
/// ```
/// use mlmc_core::math::distributions::norm_quantile;
///
/// let z = norm_quantile(0.99).unwrap();
/// assert!((z - 2.326347874).abs() < 1e-8);
/// assert!(norm_quantile(1.0).is_err());
/// ```
pub fn norm_quantile(p: f64) -> Result<f64, StatisticsError> {
    if !(p > 0.0 && p < 1.0) {
        return Err(StatisticsError::InvalidProbability(p));
    }
    Ok(-std::f64::consts::SQRT_2 * erfc_inv(2.0 * p))
}

/// Two-sided critical value for a confidence level, e.g. 1.96 for 0.95.
///
/// # Errors
///
/// Returns `StatisticsError::InvalidProbability` unless `0 < level < 1`.
pub fn two_sided_critical_value(level: f64) -> Result<f64, StatisticsError> {
    if !(level > 0.0 && level < 1.0) {
        return Err(StatisticsError::InvalidProbability(level));
    }
    norm_quantile(0.5 + 0.5 * level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cdf_symmetry() {
        for &x in &[0.1, 0.5, 1.0, 2.0, 3.5] {
            assert_abs_diff_eq!(norm_cdf(x) + norm_cdf(-x), 1.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_quantile_inverts_cdf() {
        for &p in &[0.001, 0.01, 0.05, 0.5, 0.95, 0.99, 0.999] {
            let z = norm_quantile(p).unwrap();
            assert_abs_diff_eq!(norm_cdf(z), p, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_critical_value_95() {
        let z = two_sided_critical_value(0.95).unwrap();
        assert_abs_diff_eq!(z, 1.959963985, epsilon = 1e-8);
    }

    #[test]
    fn test_invalid_probability() {
        assert!(norm_quantile(0.0).is_err());
        assert!(norm_quantile(f64::NAN).is_err());
        assert!(two_sided_critical_value(1.0).is_err());
    }

    #[test]
    fn test_pdf_known_value() {
        assert_abs_diff_eq!(norm_pdf(1.0), 0.2419707245, epsilon = 1e-9);
    }
}
