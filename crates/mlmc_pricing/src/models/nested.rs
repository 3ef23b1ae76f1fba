//! Nested simulation: option repricing at the risk horizon.
//!
//! The outer scenario moves the underlying to the horizon under its
//! real-world drift. The option is then revalued at the horizon by an inner
//! risk-neutral Monte Carlo whose path count is the level resolution. The
//! coarse evaluation of a level reuses the first `n_c` of the `n_f` inner
//! normals of the same draw.

use super::analytical::{BlackScholes, OptionType};
use super::error::ModelError;
use super::gbm::GbmAsset;
use crate::rng::PricerRng;
use crate::sampler::{PortfolioLossFunction, RandomFactorGenerator, SamplingFailure};

/// Outer normal plus the inner normals of one nested scenario.
#[derive(Clone, Debug, PartialEq)]
pub struct NestedDraw {
    /// Standard normal driving the move to the horizon.
    pub outer: f64,
    /// Standard normals of the inner repricing paths.
    pub inner: Vec<f64>,
}

/// Generates [`NestedDraw`]s; resolution is the inner path count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NestedOptionGenerator;

impl RandomFactorGenerator for NestedOptionGenerator {
    type Draw = NestedDraw;

    fn generate(&self, rng: &mut PricerRng, resolution: usize) -> NestedDraw {
        let outer = rng.gen_normal();
        let mut inner = vec![0.0; resolution];
        rng.fill_normal(&mut inner);
        NestedDraw { outer, inner }
    }
}

/// European option position held over the risk horizon.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EuropeanOption {
    /// Call or put.
    pub option_type: OptionType,
    /// Strike price.
    pub strike: f64,
    /// Years to expiry from today.
    pub maturity: f64,
    /// Signed number of contracts.
    pub quantity: f64,
}

impl EuropeanOption {
    #[inline]
    fn payoff(&self, spot: f64) -> f64 {
        match self.option_type {
            OptionType::Call => (spot - self.strike).max(0.0),
            OptionType::Put => (self.strike - spot).max(0.0),
        }
    }
}

/// Loss of an option position revalued by inner Monte Carlo at the horizon.
///
/// # Examples
/// ```
/// use mlmc_pricing::models::{
///     EuropeanOption, GbmAsset, NestedDraw, NestedOptionLoss, OptionType,
/// };
/// use mlmc_pricing::sampler::PortfolioLossFunction;
///
/// let option = EuropeanOption {
///     option_type: OptionType::Call,
///     strike: 100.0,
///     maturity: 1.0,
///     quantity: 1.0,
/// };
/// let asset = GbmAsset::new(100.0, 0.08, 0.2).unwrap();
/// let model = NestedOptionLoss::new(asset, 0.03, option, 1.0 / 52.0).unwrap();
///
/// let draw = NestedDraw { outer: -2.0, inner: vec![0.1, -0.4, 1.3, 0.7] };
/// let fine = model.loss(&draw, 4).unwrap();
/// let coarse = model.loss(&draw, 2).unwrap();
/// assert!(fine.is_finite() && coarse.is_finite());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct NestedOptionLoss {
    asset: GbmAsset,
    rate: f64,
    option: EuropeanOption,
    horizon: f64,
    initial_value: f64,
}

impl NestedOptionLoss {
    /// Creates the model. Today's value is the Black-Scholes price.
    ///
    /// # Errors
    /// `ModelError::InvalidParameter` unless `0 < horizon < maturity`,
    /// `strike > 0` and the asset has positive volatility.
    pub fn new(asset: GbmAsset, rate: f64, option: EuropeanOption, horizon: f64) -> Result<Self, ModelError> {
        if !(horizon > 0.0 && horizon < option.maturity && option.maturity.is_finite()) {
            return Err(ModelError::InvalidParameter {
                name: "horizon",
                value: horizon,
            });
        }
        if !(option.strike > 0.0 && option.strike.is_finite()) {
            return Err(ModelError::InvalidParameter {
                name: "strike",
                value: option.strike,
            });
        }
        if !option.quantity.is_finite() {
            return Err(ModelError::InvalidParameter {
                name: "quantity",
                value: option.quantity,
            });
        }
        let bs = BlackScholes::new(asset.spot(), rate, asset.volatility())?;
        let initial_value = option.quantity * bs.price(option.option_type, option.strike, option.maturity);
        Ok(Self {
            asset,
            rate,
            option,
            horizon,
            initial_value,
        })
    }

    /// Position value today.
    #[inline]
    pub fn initial_value(&self) -> f64 {
        self.initial_value
    }

    /// Spot at the horizon for an outer normal.
    #[inline]
    pub fn horizon_spot(&self, outer: f64) -> f64 {
        self.asset.exact_terminal(self.horizon, outer)
    }

    /// Exact position value at the horizon given the horizon spot.
    ///
    /// The limit of the inner estimator as the path count grows.
    ///
    /// # Errors
    /// `ModelError` if `spot` is not positive.
    pub fn exact_value_at_horizon(&self, spot: f64) -> Result<f64, ModelError> {
        let bs = BlackScholes::new(spot, self.rate, self.asset.volatility())?;
        let remaining = self.option.maturity - self.horizon;
        Ok(self.option.quantity * bs.price(self.option.option_type, self.option.strike, remaining))
    }

    /// Inner Monte Carlo value at the horizon driven by `normals`.
    fn inner_value(&self, spot: f64, normals: &[f64]) -> f64 {
        let vol = self.asset.volatility();
        let remaining = self.option.maturity - self.horizon;
        let drift = (self.rate - 0.5 * vol * vol) * remaining;
        let vol_sqrt_t = vol * remaining.sqrt();

        let mean_payoff = normals
            .iter()
            .map(|z| self.option.payoff(spot * (drift + vol_sqrt_t * z).exp()))
            .sum::<f64>()
            / normals.len() as f64;

        self.option.quantity * (-self.rate * remaining).exp() * mean_payoff
    }
}

impl PortfolioLossFunction<NestedDraw> for NestedOptionLoss {
    fn loss(&self, draw: &NestedDraw, resolution: usize) -> Result<f64, SamplingFailure> {
        if resolution == 0 || resolution > draw.inner.len() {
            return Err(SamplingFailure::IncompatibleResolution {
                draw: draw.inner.len(),
                requested: resolution,
            });
        }
        let spot = self.horizon_spot(draw.outer);
        Ok(self.initial_value - self.inner_value(spot, &draw.inner[..resolution]))
    }
}
