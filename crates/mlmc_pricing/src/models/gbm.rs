//! Correlated geometric Brownian motion risk factors.
//!
//! A [`FactorPath`] holds standard normal increments on the fine time grid
//! (row-major `step x factor`, already correlated). Coarser grids are obtained
//! by summing groups of `n_f / n_c` consecutive normals and rescaling by
//! `sqrt(n_c / n_f)`, so the coarse Brownian increments are exactly the sums
//! of the fine ones.

use std::borrow::Cow;

use mlmc_core::math::correlation::{CholeskyFactor, CorrelationMatrix};

use super::error::ModelError;
use crate::rng::PricerRng;
use crate::sampler::{RandomFactorGenerator, SamplingFailure};

/// Time-stepping scheme for the discretised GBM.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Scheme {
    /// `S += S (mu dt + sigma dW)`; strong order 1/2.
    Euler,
    /// Euler plus `0.5 sigma^2 S (dW^2 - dt)`; strong order 1.
    #[default]
    Milstein,
}

/// Real-world GBM dynamics of one risk factor: `dS = mu S dt + sigma S dW`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GbmAsset {
    spot: f64,
    drift: f64,
    volatility: f64,
}

impl GbmAsset {
    /// Creates an asset.
    ///
    /// # Errors
    /// `ModelError::InvalidParameter` if spot <= 0, volatility < 0 or any
    /// parameter is not finite.
    pub fn new(spot: f64, drift: f64, volatility: f64) -> Result<Self, ModelError> {
        if !(spot > 0.0 && spot.is_finite()) {
            return Err(ModelError::InvalidParameter {
                name: "spot",
                value: spot,
            });
        }
        if !drift.is_finite() {
            return Err(ModelError::InvalidParameter {
                name: "drift",
                value: drift,
            });
        }
        if !(volatility >= 0.0 && volatility.is_finite()) {
            return Err(ModelError::InvalidParameter {
                name: "volatility",
                value: volatility,
            });
        }
        Ok(Self {
            spot,
            drift,
            volatility,
        })
    }

    /// Spot price today.
    #[inline]
    pub fn spot(&self) -> f64 {
        self.spot
    }

    /// Real-world drift.
    #[inline]
    pub fn drift(&self) -> f64 {
        self.drift
    }

    /// Volatility.
    #[inline]
    pub fn volatility(&self) -> f64 {
        self.volatility
    }

    /// One discretisation step from `spot` with Brownian increment `dw`.
    #[inline]
    pub fn step(&self, spot: f64, dt: f64, dw: f64, scheme: Scheme) -> f64 {
        let euler = spot * (1.0 + self.drift * dt + self.volatility * dw);
        match scheme {
            Scheme::Euler => euler,
            Scheme::Milstein => euler + 0.5 * self.volatility * self.volatility * spot * (dw * dw - dt),
        }
    }

    /// Exact lognormal value at `horizon` for a standard normal `z`.
    #[inline]
    pub fn exact_terminal(&self, horizon: f64, z: f64) -> f64 {
        let vol = self.volatility;
        self.spot * ((self.drift - 0.5 * vol * vol) * horizon + vol * horizon.sqrt() * z).exp()
    }
}

/// Correlated standard normals on a fine time grid.
#[derive(Clone, Debug, PartialEq)]
pub struct FactorPath {
    n_factors: usize,
    n_steps: usize,
    normals: Vec<f64>,
}

impl FactorPath {
    /// Wraps row-major `step x factor` normals.
    ///
    /// # Errors
    /// `ModelError::DimensionMismatch` if `normals.len()` is not a multiple
    /// of `n_factors`; `ModelError::InvalidParameter` if `n_factors` is zero.
    pub fn from_normals(n_factors: usize, normals: Vec<f64>) -> Result<Self, ModelError> {
        if n_factors == 0 {
            return Err(ModelError::InvalidParameter {
                name: "n_factors",
                value: 0.0,
            });
        }
        if normals.len() % n_factors != 0 {
            return Err(ModelError::DimensionMismatch {
                what: "factor path",
                expected: normals.len().div_ceil(n_factors) * n_factors,
                got: normals.len(),
            });
        }
        Ok(Self {
            n_factors,
            n_steps: normals.len() / n_factors,
            normals,
        })
    }

    /// Number of risk factors.
    #[inline]
    pub fn n_factors(&self) -> usize {
        self.n_factors
    }

    /// Number of fine time steps.
    #[inline]
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// Fine normal for `(step, factor)`.
    #[inline]
    pub fn normal(&self, step: usize, factor: usize) -> f64 {
        self.normals[step * self.n_factors + factor]
    }

    /// Standard normals of the path aggregated to `resolution` steps.
    ///
    /// # Errors
    /// `SamplingFailure::IncompatibleResolution` if `resolution` is zero or
    /// does not divide the fine step count.
    pub fn normals_at(&self, resolution: usize) -> Result<Cow<'_, [f64]>, SamplingFailure> {
        if resolution == self.n_steps {
            return Ok(Cow::Borrowed(&self.normals));
        }
        if resolution == 0 || resolution > self.n_steps || self.n_steps % resolution != 0 {
            return Err(SamplingFailure::IncompatibleResolution {
                draw: self.n_steps,
                requested: resolution,
            });
        }

        let group = self.n_steps / resolution;
        let scale = 1.0 / (group as f64).sqrt();
        let mut coarse = vec![0.0; resolution * self.n_factors];
        for (step, row) in self.normals.chunks_exact(self.n_factors).enumerate() {
            let target = &mut coarse[(step / group) * self.n_factors..][..self.n_factors];
            for (c, z) in target.iter_mut().zip(row) {
                *c += z;
            }
        }
        for c in coarse.iter_mut() {
            *c *= scale;
        }
        Ok(Cow::Owned(coarse))
    }
}

/// Terminal values of `assets` after simulating `horizon` in `resolution`
/// steps driven by `path`.
///
/// # Errors
/// `SamplingFailure` if the factor count does not match, the resolution is
/// incompatible with the path, or a spot becomes non-positive.
pub fn simulate_terminal(
    assets: &[GbmAsset],
    path: &FactorPath,
    resolution: usize,
    horizon: f64,
    scheme: Scheme,
) -> Result<Vec<f64>, SamplingFailure> {
    if assets.len() != path.n_factors() {
        return Err(SamplingFailure::evaluation(
            resolution,
            format!(
                "path has {} factors, portfolio has {} assets",
                path.n_factors(),
                assets.len()
            ),
        ));
    }

    let normals = path.normals_at(resolution)?;
    let dt = horizon / resolution as f64;
    let sqrt_dt = dt.sqrt();
    let mut spots: Vec<f64> = assets.iter().map(GbmAsset::spot).collect();

    for row in normals.chunks_exact(assets.len()) {
        for ((spot, asset), z) in spots.iter_mut().zip(assets).zip(row) {
            *spot = asset.step(*spot, dt, sqrt_dt * z, scheme);
        }
    }

    if let Some(bad) = spots.iter().find(|s| !(**s > 0.0 && s.is_finite())) {
        return Err(SamplingFailure::evaluation(
            resolution,
            format!("discretised spot left the positive half-line: {}", bad),
        ));
    }
    Ok(spots)
}

/// Generates correlated Brownian normals for `n_factors` GBM risk factors.
///
/// Resolution is the number of time steps.
///
/// # Examples
///
/// ```rust
/// use mlmc_core::math::correlation::CorrelationMatrix;
/// use mlmc_pricing::models::GbmFactorGenerator;
/// use mlmc_pricing::rng::PricerRng;
/// use mlmc_pricing::sampler::RandomFactorGenerator;
///
/// let corr = CorrelationMatrix::new(&[1.0, 0.6, 0.6, 1.0], 2).unwrap();
/// let generator = GbmFactorGenerator::correlated(&corr).unwrap();
///
/// let path = generator.generate(&mut PricerRng::from_seed(1), 8);
/// assert_eq!(path.n_steps(), 8);
/// assert_eq!(path.n_factors(), 2);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct GbmFactorGenerator {
    cholesky: CholeskyFactor,
}

impl GbmFactorGenerator {
    /// One factor.
    pub fn single() -> Self {
        Self::independent(1)
    }

    /// `n_factors` independent factors.
    pub fn independent(n_factors: usize) -> Self {
        Self {
            cholesky: CholeskyFactor::identity(n_factors.max(1)),
        }
    }

    /// Factors correlated through `correlation`.
    ///
    /// # Errors
    /// `ModelError::Correlation` if the matrix has no Cholesky factor.
    pub fn correlated(correlation: &CorrelationMatrix) -> Result<Self, ModelError> {
        Ok(Self {
            cholesky: correlation.cholesky()?,
        })
    }

    /// Number of factors.
    #[inline]
    pub fn n_factors(&self) -> usize {
        self.cholesky.dim()
    }
}

impl RandomFactorGenerator for GbmFactorGenerator {
    type Draw = FactorPath;

    fn generate(&self, rng: &mut PricerRng, resolution: usize) -> FactorPath {
        let n = self.n_factors();
        let mut z = vec![0.0; n];
        let mut normals = vec![0.0; resolution * n];
        for row in normals.chunks_exact_mut(n) {
            rng.fill_normal(&mut z);
            self.cholesky.transform_into(&z, row);
        }
        FactorPath {
            n_factors: n,
            n_steps: resolution,
            normals,
        }
    }
}
