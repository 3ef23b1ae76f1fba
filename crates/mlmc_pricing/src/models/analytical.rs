//! Closed-form prices and risk measures for lognormal dynamics.
//!
//! ## Formulas
//!
//! **Call**: C = S·N(d₁) - K·e^(-rT)·N(d₂)
//! **Put**: P = K·e^(-rT)·N(-d₂) - S·N(-d₁)
//!
//! **Long-position VaR** over horizon τ at confidence α (drift μ):
//! VaR = q·S·(1 - exp((μ - σ²/2)τ + σ√τ·z₁₋α))
//!
//! **Long-position ES**:
//! ES = q·S·(1 - e^(μτ)·N(z₁₋α - σ√τ) / (1 - α))

use mlmc_core::math::distributions::{norm_cdf, norm_quantile};
use mlmc_core::types::StatisticsError;

use super::error::ModelError;

/// Call or put.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum OptionType {
    /// Right to buy.
    Call,
    /// Right to sell.
    Put,
}

/// Black-Scholes model for European option pricing.
///
/// # Examples
/// ```
/// use mlmc_pricing::models::BlackScholes;
///
/// let bs = BlackScholes::new(100.0, 0.05, 0.2).unwrap();
/// let call = bs.price_call(100.0, 1.0);
/// let put = bs.price_put(100.0, 1.0);
///
/// // Put-call parity: C - P = S - K*exp(-rT)
/// let parity = call - put - (100.0 - 100.0 * (-0.05_f64).exp());
/// assert!(parity.abs() < 1e-10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlackScholes {
    spot: f64,
    rate: f64,
    volatility: f64,
}

impl BlackScholes {
    /// Creates a new Black-Scholes model.
    ///
    /// # Errors
    /// - `ModelError::InvalidParameter` if spot <= 0 or volatility <= 0
    pub fn new(spot: f64, rate: f64, volatility: f64) -> Result<Self, ModelError> {
        if !(spot > 0.0 && spot.is_finite()) {
            return Err(ModelError::InvalidParameter {
                name: "spot",
                value: spot,
            });
        }
        if !(volatility > 0.0 && volatility.is_finite()) {
            return Err(ModelError::InvalidParameter {
                name: "volatility",
                value: volatility,
            });
        }
        if !rate.is_finite() {
            return Err(ModelError::InvalidParameter {
                name: "rate",
                value: rate,
            });
        }
        Ok(Self {
            spot,
            rate,
            volatility,
        })
    }

    /// d₁ = (ln(S/K) + (r + σ²/2)T) / (σ√T)
    #[inline]
    pub fn d1(&self, strike: f64, expiry: f64) -> f64 {
        let vol_sqrt_t = self.volatility * expiry.sqrt();
        ((self.spot / strike).ln() + (self.rate + 0.5 * self.volatility * self.volatility) * expiry)
            / vol_sqrt_t
    }

    /// d₂ = d₁ - σ√T
    #[inline]
    pub fn d2(&self, strike: f64, expiry: f64) -> f64 {
        self.d1(strike, expiry) - self.volatility * expiry.sqrt()
    }

    /// European call price. At expiry returns intrinsic value.
    pub fn price_call(&self, strike: f64, expiry: f64) -> f64 {
        if expiry <= 0.0 {
            return (self.spot - strike).max(0.0);
        }
        let df = (-self.rate * expiry).exp();
        self.spot * norm_cdf(self.d1(strike, expiry)) - strike * df * norm_cdf(self.d2(strike, expiry))
    }

    /// European put price. At expiry returns intrinsic value.
    pub fn price_put(&self, strike: f64, expiry: f64) -> f64 {
        if expiry <= 0.0 {
            return (strike - self.spot).max(0.0);
        }
        let df = (-self.rate * expiry).exp();
        strike * df * norm_cdf(-self.d2(strike, expiry)) - self.spot * norm_cdf(-self.d1(strike, expiry))
    }

    /// Price of a call or put.
    #[inline]
    pub fn price(&self, option_type: OptionType, strike: f64, expiry: f64) -> f64 {
        match option_type {
            OptionType::Call => self.price_call(strike, expiry),
            OptionType::Put => self.price_put(strike, expiry),
        }
    }
}

/// Black-Scholes price of a European option.
///
/// # Errors
/// Same as [`BlackScholes::new`].
pub fn black_scholes_price(
    option_type: OptionType,
    spot: f64,
    strike: f64,
    rate: f64,
    volatility: f64,
    expiry: f64,
) -> Result<f64, ModelError> {
    Ok(BlackScholes::new(spot, rate, volatility)?.price(option_type, strike, expiry))
}

fn check_lognormal_inputs(spot: f64, volatility: f64, horizon: f64, confidence: f64) -> Result<(), ModelError> {
    if !(spot > 0.0 && spot.is_finite()) {
        return Err(ModelError::InvalidParameter {
            name: "spot",
            value: spot,
        });
    }
    if !(volatility >= 0.0 && volatility.is_finite()) {
        return Err(ModelError::InvalidParameter {
            name: "volatility",
            value: volatility,
        });
    }
    if !(horizon > 0.0 && horizon.is_finite()) {
        return Err(ModelError::InvalidParameter {
            name: "horizon",
            value: horizon,
        });
    }
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(StatisticsError::InvalidProbability(confidence).into());
    }
    Ok(())
}

/// Exact VaR of `quantity` units of a GBM asset held over `horizon`.
///
/// Positive `quantity` is a long position (loss when the price falls),
/// negative a short position.
///
/// # Examples
/// ```
/// use mlmc_pricing::models::lognormal_var;
///
/// let var = lognormal_var(100.0, 0.05, 0.2, 1.0 / 12.0, 1.0, 0.99).unwrap();
/// assert!(var > 12.0 && var < 13.0);
/// ```
///
/// # Errors
/// `ModelError` for non-positive spot, negative volatility, non-positive
/// horizon or a confidence outside `(0, 1)`.
pub fn lognormal_var(
    spot: f64,
    drift: f64,
    volatility: f64,
    horizon: f64,
    quantity: f64,
    confidence: f64,
) -> Result<f64, ModelError> {
    check_lognormal_inputs(spot, volatility, horizon, confidence)?;
    let log_drift = (drift - 0.5 * volatility * volatility) * horizon;
    let vol_sqrt_t = volatility * horizon.sqrt();

    if quantity >= 0.0 {
        let z = norm_quantile(1.0 - confidence)?;
        Ok(quantity * spot * (1.0 - (log_drift + vol_sqrt_t * z).exp()))
    } else {
        let z = norm_quantile(confidence)?;
        Ok(-quantity * spot * ((log_drift + vol_sqrt_t * z).exp() - 1.0))
    }
}

/// Exact Expected Shortfall of `quantity` units of a GBM asset.
///
/// # Errors
/// Same as [`lognormal_var`].
pub fn lognormal_expected_shortfall(
    spot: f64,
    drift: f64,
    volatility: f64,
    horizon: f64,
    quantity: f64,
    confidence: f64,
) -> Result<f64, ModelError> {
    check_lognormal_inputs(spot, volatility, horizon, confidence)?;
    let growth = (drift * horizon).exp();
    let vol_sqrt_t = volatility * horizon.sqrt();
    let tail = 1.0 - confidence;

    if quantity >= 0.0 {
        let z = norm_quantile(tail)?;
        Ok(quantity * spot * (1.0 - growth * norm_cdf(z - vol_sqrt_t) / tail))
    } else {
        let z = norm_quantile(confidence)?;
        Ok(-quantity * spot * (growth * norm_cdf(vol_sqrt_t - z) / tail - 1.0))
    }
}
