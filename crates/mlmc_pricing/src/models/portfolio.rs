//! Portfolio loss functions over GBM risk factors.
//!
//! This module provides:
//! - [`LinearPortfolioLoss`]: full revaluation of spot positions and
//!   zero-coupon bonds at the horizon
//! - [`DeltaGammaLoss`]: second-order approximation from factor moves
//!
//! Both evaluate a [`FactorPath`] at any resolution dividing the path's
//! step count, which is what the coupled sampler requires.

use super::error::ModelError;
use super::gbm::{simulate_terminal, FactorPath, GbmAsset, Scheme};
use crate::sampler::{PortfolioLossFunction, SamplingFailure};

/// A holding valued from terminal factor levels.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Instrument {
    /// `quantity` units of risk factor `factor` (equity or FX spot).
    Position {
        /// Index of the risk factor.
        factor: usize,
        /// Signed holding.
        quantity: f64,
    },
    /// Zero-coupon bond paying `face` at `maturity`, discounted at `rate`.
    ZeroCouponBond {
        /// Redemption amount.
        face: f64,
        /// Continuously compounded yield.
        rate: f64,
        /// Years to maturity from today.
        maturity: f64,
    },
}

impl Instrument {
    /// Value given factor levels `spots`, `elapsed` years from today.
    pub fn value(&self, spots: &[f64], elapsed: f64) -> f64 {
        match *self {
            Instrument::Position { factor, quantity } => quantity * spots[factor],
            Instrument::ZeroCouponBond {
                face,
                rate,
                maturity,
            } => face * (-rate * (maturity - elapsed).max(0.0)).exp(),
        }
    }

    fn validate(&self, n_factors: usize) -> Result<(), ModelError> {
        match *self {
            Instrument::Position { factor, quantity } => {
                if factor >= n_factors {
                    return Err(ModelError::UnknownFactor { factor, n_factors });
                }
                if !quantity.is_finite() {
                    return Err(ModelError::InvalidParameter {
                        name: "quantity",
                        value: quantity,
                    });
                }
            }
            Instrument::ZeroCouponBond {
                face,
                rate,
                maturity,
            } => {
                if !face.is_finite() {
                    return Err(ModelError::InvalidParameter {
                        name: "face",
                        value: face,
                    });
                }
                if !rate.is_finite() {
                    return Err(ModelError::InvalidParameter {
                        name: "rate",
                        value: rate,
                    });
                }
                if !(maturity >= 0.0 && maturity.is_finite()) {
                    return Err(ModelError::InvalidParameter {
                        name: "maturity",
                        value: maturity,
                    });
                }
            }
        }
        Ok(())
    }
}

fn validate_horizon(horizon: f64) -> Result<(), ModelError> {
    if horizon > 0.0 && horizon.is_finite() {
        Ok(())
    } else {
        Err(ModelError::InvalidParameter {
            name: "horizon",
            value: horizon,
        })
    }
}

/// Loss of a portfolio of linear instruments by full revaluation.
///
/// `loss = V(0) - V(horizon)`, with the factors simulated by the configured
/// [`Scheme`] at the requested number of time steps.
///
/// # Examples
/// ```
/// use mlmc_pricing::models::{FactorPath, GbmAsset, Instrument, LinearPortfolioLoss};
/// use mlmc_pricing::sampler::PortfolioLossFunction;
///
/// let assets = vec![GbmAsset::new(100.0, 0.0, 0.2).unwrap()];
/// let portfolio = LinearPortfolioLoss::new(
///     assets,
///     vec![
///         Instrument::Position { factor: 0, quantity: 2.0 },
///         Instrument::ZeroCouponBond { face: 1000.0, rate: 0.03, maturity: 5.0 },
///     ],
///     0.25,
/// )
/// .unwrap();
///
/// let flat = FactorPath::from_normals(1, vec![0.0; 4]).unwrap();
/// let loss = portfolio.loss(&flat, 4).unwrap();
/// // No shocks: the bond carry outweighs the small convexity drag on the spot.
/// assert!(loss < 0.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct LinearPortfolioLoss {
    assets: Vec<GbmAsset>,
    instruments: Vec<Instrument>,
    horizon: f64,
    scheme: Scheme,
    initial_values: Vec<f64>,
}

impl LinearPortfolioLoss {
    /// Creates a portfolio over `assets`.
    ///
    /// # Errors
    /// `ModelError` for a non-positive horizon, an instrument referencing a
    /// missing factor, or non-finite instrument parameters.
    pub fn new(assets: Vec<GbmAsset>, instruments: Vec<Instrument>, horizon: f64) -> Result<Self, ModelError> {
        validate_horizon(horizon)?;
        for instrument in &instruments {
            instrument.validate(assets.len())?;
        }
        let spots: Vec<f64> = assets.iter().map(GbmAsset::spot).collect();
        let initial_values = instruments.iter().map(|i| i.value(&spots, 0.0)).collect();
        Ok(Self {
            assets,
            instruments,
            horizon,
            scheme: Scheme::default(),
            initial_values,
        })
    }

    /// `quantity` units of a single asset.
    ///
    /// # Errors
    /// Same as [`LinearPortfolioLoss::new`].
    pub fn single_asset(asset: GbmAsset, quantity: f64, horizon: f64) -> Result<Self, ModelError> {
        Self::new(
            vec![asset],
            vec![Instrument::Position {
                factor: 0,
                quantity,
            }],
            horizon,
        )
    }

    /// Replaces the discretisation scheme.
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Risk factors.
    pub fn assets(&self) -> &[GbmAsset] {
        &self.assets
    }

    /// Holdings.
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Risk horizon in years.
    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    /// Portfolio value today.
    pub fn initial_value(&self) -> f64 {
        self.initial_values.iter().sum()
    }

    /// Per-instrument P&L at the horizon given terminal factor levels.
    pub fn instrument_pnls(&self, terminal_spots: &[f64]) -> Vec<f64> {
        self.instruments
            .iter()
            .zip(&self.initial_values)
            .map(|(instrument, v0)| instrument.value(terminal_spots, self.horizon) - v0)
            .collect()
    }

    /// Portfolio loss (negated aggregate P&L) given terminal factor levels.
    pub fn portfolio_loss(&self, terminal_spots: &[f64]) -> f64 {
        -self.instrument_pnls(terminal_spots).iter().sum::<f64>()
    }
}

impl PortfolioLossFunction<FactorPath> for LinearPortfolioLoss {
    fn loss(&self, draw: &FactorPath, resolution: usize) -> Result<f64, SamplingFailure> {
        let terminal = simulate_terminal(&self.assets, draw, resolution, self.horizon, self.scheme)?;
        Ok(self.portfolio_loss(&terminal))
    }
}

/// Delta-gamma approximation of the portfolio loss.
///
/// `loss = -(delta . dS + 0.5 dS^T Gamma dS)` where `dS` are the simulated
/// factor moves over the horizon.
#[derive(Clone, Debug, PartialEq)]
pub struct DeltaGammaLoss {
    assets: Vec<GbmAsset>,
    delta: Vec<f64>,
    gamma: Vec<f64>,
    horizon: f64,
    scheme: Scheme,
}

impl DeltaGammaLoss {
    /// Creates the approximation; `gamma` is row-major `n x n`.
    ///
    /// # Errors
    /// `ModelError::DimensionMismatch` for mis-sized sensitivities,
    /// `ModelError::AsymmetricGamma` when `gamma` is not symmetric (to a
    /// relative tolerance of 1e-5 and absolute 1e-8).
    pub fn new(assets: Vec<GbmAsset>, delta: Vec<f64>, gamma: Vec<f64>, horizon: f64) -> Result<Self, ModelError> {
        validate_horizon(horizon)?;
        let n = assets.len();
        if delta.len() != n {
            return Err(ModelError::DimensionMismatch {
                what: "delta",
                expected: n,
                got: delta.len(),
            });
        }
        if gamma.len() != n * n {
            return Err(ModelError::DimensionMismatch {
                what: "gamma",
                expected: n * n,
                got: gamma.len(),
            });
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let a = gamma[i * n + j];
                let b = gamma[j * n + i];
                if (a - b).abs() > 1e-8 + 1e-5 * b.abs() {
                    return Err(ModelError::AsymmetricGamma { i, j });
                }
            }
        }
        Ok(Self {
            assets,
            delta,
            gamma,
            horizon,
            scheme: Scheme::default(),
        })
    }

    /// Replaces the discretisation scheme.
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Approximate loss for factor moves `moves`.
    pub fn loss_from_moves(&self, moves: &[f64]) -> f64 {
        let n = self.delta.len();
        let linear: f64 = self.delta.iter().zip(moves).map(|(d, m)| d * m).sum();
        let quadratic: f64 = (0..n)
            .map(|i| {
                let row = &self.gamma[i * n..(i + 1) * n];
                moves[i] * row.iter().zip(moves).map(|(g, m)| g * m).sum::<f64>()
            })
            .sum();
        -(linear + 0.5 * quadratic)
    }
}

impl PortfolioLossFunction<FactorPath> for DeltaGammaLoss {
    fn loss(&self, draw: &FactorPath, resolution: usize) -> Result<f64, SamplingFailure> {
        let terminal = simulate_terminal(&self.assets, draw, resolution, self.horizon, self.scheme)?;
        let moves: Vec<f64> = terminal
            .iter()
            .zip(&self.assets)
            .map(|(s, a)| s - a.spot())
            .collect();
        Ok(self.loss_from_moves(&moves))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_assets() -> Vec<GbmAsset> {
        vec![
            GbmAsset::new(100.0, 0.05, 0.2).unwrap(),
            GbmAsset::new(50.0, 0.02, 0.3).unwrap(),
        ]
    }

    #[test]
    fn test_instrument_pnls_and_aggregate() {
        let portfolio = LinearPortfolioLoss::new(
            two_assets(),
            vec![
                Instrument::Position {
                    factor: 0,
                    quantity: 1.0,
                },
                Instrument::Position {
                    factor: 1,
                    quantity: -2.0,
                },
                Instrument::ZeroCouponBond {
                    face: 100.0,
                    rate: 0.04,
                    maturity: 2.0,
                },
            ],
            0.5,
        )
        .unwrap();

        let pnls = portfolio.instrument_pnls(&[110.0, 55.0]);
        assert_relative_eq!(pnls[0], 10.0, epsilon = 1e-12);
        assert_relative_eq!(pnls[1], -10.0, epsilon = 1e-12);
        let carry = 100.0 * ((-0.04_f64 * 1.5).exp() - (-0.04_f64 * 2.0).exp());
        assert_relative_eq!(pnls[2], carry, epsilon = 1e-12);
        assert_relative_eq!(portfolio.portfolio_loss(&[110.0, 55.0]), -carry, epsilon = 1e-12);
    }

    #[test]
    fn test_initial_value() {
        let portfolio = LinearPortfolioLoss::single_asset(GbmAsset::new(80.0, 0.0, 0.1).unwrap(), 3.0, 1.0).unwrap();
        assert_relative_eq!(portfolio.initial_value(), 240.0);
    }

    #[test]
    fn test_unknown_factor_rejected() {
        let err = LinearPortfolioLoss::new(
            two_assets(),
            vec![Instrument::Position {
                factor: 2,
                quantity: 1.0,
            }],
            1.0,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::UnknownFactor {
                factor: 2,
                n_factors: 2
            }
        );
    }

    #[test]
    fn test_invalid_horizon_rejected() {
        let asset = GbmAsset::new(1.0, 0.0, 0.1).unwrap();
        assert!(LinearPortfolioLoss::single_asset(asset, 1.0, 0.0).is_err());
        assert!(DeltaGammaLoss::new(vec![asset], vec![1.0], vec![0.0], -1.0).is_err());
    }

    #[test]
    fn test_delta_gamma_validation() {
        assert!(matches!(
            DeltaGammaLoss::new(two_assets(), vec![1.0], vec![0.0; 4], 1.0),
            Err(ModelError::DimensionMismatch { what: "delta", .. })
        ));
        assert!(matches!(
            DeltaGammaLoss::new(two_assets(), vec![1.0, 1.0], vec![0.0; 3], 1.0),
            Err(ModelError::DimensionMismatch { what: "gamma", .. })
        ));
        assert_eq!(
            DeltaGammaLoss::new(two_assets(), vec![1.0, 1.0], vec![1.0, 0.5, 0.4, 1.0], 1.0),
            Err(ModelError::AsymmetricGamma { i: 0, j: 1 })
        );
    }

    #[test]
    fn test_delta_gamma_loss_from_moves() {
        let dg = DeltaGammaLoss::new(two_assets(), vec![1.0, -2.0], vec![0.5, 0.1, 0.1, 0.2], 1.0).unwrap();
        // linear = 2 - 2*(-1) = 4; quadratic = 0.5*4 + 2*0.1*2*(-1) + 0.2*1 = 1.8
        let loss = dg.loss_from_moves(&[2.0, -1.0]);
        assert_relative_eq!(loss, -(4.0 + 0.9), epsilon = 1e-12);
    }

    #[test]
    fn test_delta_only_matches_linear_position() {
        let asset = GbmAsset::new(100.0, 0.05, 0.2).unwrap();
        let linear = LinearPortfolioLoss::single_asset(asset, 3.0, 0.25).unwrap();
        let dg = DeltaGammaLoss::new(vec![asset], vec![3.0], vec![0.0], 0.25).unwrap();
        let path = FactorPath::from_normals(1, vec![0.3, -1.2, 0.8, 0.1]).unwrap();

        for resolution in [1, 2, 4] {
            assert_relative_eq!(
                linear.loss(&path, resolution).unwrap(),
                dg.loss(&path, resolution).unwrap(),
                epsilon = 1e-10
            );
        }
    }
}
