//! Historical calibration of GBM risk factors.
//!
//! Volatilities are root-mean-square returns over non-overlapping periods of
//! a price history (zero mean), annualised by `1 / sqrt(dt)` with `dt` the
//! period length in years. Correlations are Pearson correlations of the
//! observation-to-observation simple returns.
//!
//! ```
//! use mlmc_pricing::models::{empirical_volatility, ReturnLength, ReturnType};
//!
//! // Every quarter gains or loses 5%.
//! let mut prices = Vec::new();
//! for q in 0..8 {
//!     prices.extend([100.0; 12]);
//!     prices.push(if q % 2 == 0 { 105.0 } else { 95.0 });
//! }
//! let vol = empirical_volatility(&prices, ReturnType::Relative, ReturnLength::Quarter).unwrap();
//! assert!((vol - 0.10).abs() < 1e-12);
//! ```

use mlmc_core::math::correlation::CorrelationMatrix;
use mlmc_core::types::StatisticsError;

use super::error::ModelError;
use super::gbm::GbmAsset;

/// Length of one return period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ReturnLength {
    /// Five daily observations per return, 52 returns a year.
    Week,
    /// Thirteen weekly observations per return, 4 returns a year.
    #[default]
    Quarter,
}

impl ReturnLength {
    /// Observations spanned by one return.
    #[inline]
    pub fn observations(self) -> usize {
        match self {
            Self::Week => 5,
            Self::Quarter => 13,
        }
    }

    /// Returns per year.
    #[inline]
    pub fn periods_per_year(self) -> f64 {
        match self {
            Self::Week => 52.0,
            Self::Quarter => 4.0,
        }
    }
}

/// How a period's return is measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ReturnType {
    /// `(end - start) / start`.
    #[default]
    Relative,
    /// `end - start`.
    Absolute,
}

/// Returns of consecutive non-overlapping periods.
///
/// Period `i` starts at observation `i k` and ends at `i k + k - 1`, where
/// `k = length.observations()`; a trailing partial period is dropped.
///
/// # Errors
///
/// `ModelError::Statistics` if no full period fits, `ModelError::InvalidParameter`
/// for a non-finite price or, with relative returns, a non-positive start.
pub fn period_returns(prices: &[f64], kind: ReturnType, length: ReturnLength) -> Result<Vec<f64>, ModelError> {
    let k = length.observations();
    if prices.len() < k {
        return Err(StatisticsError::InsufficientData {
            required: k,
            got: prices.len(),
        }
        .into());
    }
    if let Some(&bad) = prices.iter().find(|p| !p.is_finite()) {
        return Err(ModelError::InvalidParameter {
            name: "price",
            value: bad,
        });
    }

    prices
        .chunks_exact(k)
        .map(|period| {
            let (start, end) = (period[0], period[k - 1]);
            match kind {
                ReturnType::Absolute => Ok(end - start),
                ReturnType::Relative if start > 0.0 => Ok((end - start) / start),
                ReturnType::Relative => Err(ModelError::InvalidParameter {
                    name: "price",
                    value: start,
                }),
            }
        })
        .collect()
}

/// Annualised empirical volatility of a price history.
///
/// # Errors
///
/// See [`period_returns`].
pub fn empirical_volatility(prices: &[f64], kind: ReturnType, length: ReturnLength) -> Result<f64, ModelError> {
    let returns = period_returns(prices, kind, length)?;
    let mean_square = returns.iter().map(|r| r * r).sum::<f64>() / returns.len() as f64;
    let dt = 1.0 / length.periods_per_year();
    Ok(mean_square.sqrt() / dt.sqrt())
}

/// GBM risk factors fitted to price histories.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibratedFactors {
    /// One asset per history: last price as spot, relative-return volatility.
    pub assets: Vec<GbmAsset>,
    /// Correlation of the simple returns.
    pub correlation: CorrelationMatrix,
}

/// Fits one GBM asset per price history plus their correlation.
///
/// # Errors
///
/// `ModelError::DimensionMismatch` when `drifts` and `histories` differ in
/// length or no history is given, otherwise any error of
/// [`empirical_volatility`], [`GbmAsset::new`] or
/// [`CorrelationMatrix::from_price_histories`].
pub fn calibrate_gbm(
    histories: &[Vec<f64>],
    drifts: &[f64],
    length: ReturnLength,
) -> Result<CalibratedFactors, ModelError> {
    if histories.is_empty() || drifts.len() != histories.len() {
        return Err(ModelError::DimensionMismatch {
            what: "drifts",
            expected: histories.len().max(1),
            got: drifts.len(),
        });
    }

    let assets = histories
        .iter()
        .zip(drifts)
        .map(|(prices, &drift)| {
            let volatility = empirical_volatility(prices, ReturnType::Relative, length)?;
            let spot = prices.last().copied().unwrap_or(f64::NAN);
            GbmAsset::new(spot, drift, volatility)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let correlation = CorrelationMatrix::from_price_histories(histories)?;

    Ok(CalibratedFactors { assets, correlation })
}
