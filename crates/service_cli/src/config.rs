//! Run configuration.
//!
//! A run is described by a TOML file with an `[estimator]` section mapped
//! onto [`MlmcConfig`] and a `[model]` section selecting one of the
//! reference loss models. Every estimator field is optional; unset fields
//! keep the library defaults.
//!
//! ```toml
//! [estimator]
//! target_mse = 1e-5
//! confidence_level = 0.99
//!
//! [model]
//! type = "linear"
//! horizon = 0.0833
//! assets = [{ spot = 100.0, drift = 0.05, volatility = 0.2 }]
//! instruments = [{ kind = "position", factor = 0, quantity = 1.0 }]
//! ```

use std::path::Path;
use std::time::Duration;

use mlmc_core::math::correlation::CorrelationMatrix;
use mlmc_pricing::models::{
    DeltaGammaLoss, EuropeanOption, GbmAsset, GbmFactorGenerator, Instrument, LinearPortfolioLoss, ModelError,
    NestedOptionGenerator, NestedOptionLoss, Scheme,
};
use mlmc_risk::{MlmcConfig, MlmcConfigBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{CliError, Result};

/// Configuration file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "mlmc-var.toml";

/// Output rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Headline figures plus a per-level table.
    #[default]
    Table,
    /// Pretty-printed JSON document.
    Json,
}

/// Complete run description.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Estimator settings.
    pub estimator: EstimatorSettings,
    /// Portfolio loss model.
    pub model: ModelConfig,
    /// Output settings.
    pub output: OutputSettings,
}

/// Output section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    /// Rendering of the result.
    pub format: OutputFormat,
}

/// `[estimator]` section. `None` keeps the library default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorSettings {
    pub confidence_level: Option<f64>,
    pub target_mse: Option<f64>,
    pub max_levels: Option<usize>,
    pub min_levels: Option<usize>,
    pub base_resolution: Option<usize>,
    pub refinement_factor: Option<usize>,
    pub warm_up_samples: Option<u64>,
    pub seed: Option<u64>,
    /// Wall-clock budget in seconds.
    pub time_budget: Option<f64>,
    pub max_retries: Option<u32>,
    pub max_failure_rate: Option<f64>,
    pub batch_size: Option<usize>,
    pub workers: Option<usize>,
    pub theta: Option<f64>,
    pub ci_level: Option<f64>,
    pub min_tail_samples: Option<u64>,
    pub max_interval_width: Option<f64>,
    pub var_rel_tolerance: Option<f64>,
    pub expected_shortfall: Option<bool>,
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    pub max_rounds: Option<usize>,
}

macro_rules! apply {
    ($builder:ident, $settings:ident, $($field:ident => $method:ident),* $(,)?) => {
        $(
            if let Some(value) = $settings.$field {
                $builder = $builder.$method(value);
            }
        )*
    };
}

impl EstimatorSettings {
    fn builder(&self) -> Result<MlmcConfigBuilder> {
        let settings = self;
        let mut builder = MlmcConfig::builder();
        apply!(builder, settings,
            confidence_level => confidence_level,
            target_mse => target_mse,
            max_levels => max_levels,
            min_levels => min_levels,
            base_resolution => base_resolution,
            refinement_factor => refinement_factor,
            warm_up_samples => warm_up_samples,
            seed => seed,
            max_retries => max_retries,
            max_failure_rate => max_failure_rate,
            batch_size => batch_size,
            workers => n_workers,
            theta => theta,
            ci_level => ci_level,
            min_tail_samples => min_tail_samples,
            max_interval_width => max_interval_width,
            var_rel_tolerance => var_rel_tolerance,
            expected_shortfall => expected_shortfall,
            alpha => alpha,
            beta => beta,
            gamma => gamma,
            max_rounds => max_rounds,
        );
        if let Some(seconds) = self.time_budget {
            let budget = Duration::try_from_secs_f64(seconds).map_err(|_| {
                CliError::InvalidArgument(format!("time_budget must be a non-negative number of seconds, got {}", seconds))
            })?;
            builder = builder.time_budget(budget);
        }
        Ok(builder)
    }
}

/// Command-line values taking precedence over the file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Overrides {
    pub seed: Option<u64>,
    pub target_mse: Option<f64>,
    pub confidence_level: Option<f64>,
    pub workers: Option<usize>,
    pub format: Option<OutputFormat>,
}

/// One GBM risk factor.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AssetSpec {
    pub spot: f64,
    pub drift: f64,
    pub volatility: f64,
}

impl AssetSpec {
    fn build(&self) -> std::result::Result<GbmAsset, ModelError> {
        GbmAsset::new(self.spot, self.drift, self.volatility)
    }
}

/// Portfolio loss model, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelConfig {
    /// Full revaluation of spot positions and zero-coupon bonds.
    Linear(LinearModel),
    /// Delta-gamma approximation over GBM factor moves.
    DeltaGamma(DeltaGammaModel),
    /// Option repriced by inner Monte Carlo at the horizon.
    Nested(NestedModel),
}

impl Default for ModelConfig {
    /// One unit of a single asset (S = 100, mu = 5%, sigma = 20%) over ten
    /// trading days.
    fn default() -> Self {
        Self::Linear(LinearModel {
            horizon: 10.0 / 252.0,
            scheme: Scheme::default(),
            assets: vec![AssetSpec {
                spot: 100.0,
                drift: 0.05,
                volatility: 0.2,
            }],
            correlation: None,
            instruments: vec![Instrument::Position {
                factor: 0,
                quantity: 1.0,
            }],
        })
    }
}

impl ModelConfig {
    /// Short label for logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear(_) => "linear",
            Self::DeltaGamma(_) => "delta_gamma",
            Self::Nested(_) => "nested",
        }
    }
}

/// `type = "linear"`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LinearModel {
    /// Risk horizon in years.
    pub horizon: f64,
    #[serde(default)]
    pub scheme: Scheme,
    pub assets: Vec<AssetSpec>,
    /// Row-major correlation rows; independent factors when absent.
    #[serde(default)]
    pub correlation: Option<Vec<Vec<f64>>>,
    pub instruments: Vec<Instrument>,
}

impl LinearModel {
    /// Factor generator and loss function.
    pub fn build(&self) -> Result<(GbmFactorGenerator, LinearPortfolioLoss)> {
        let assets = build_assets(&self.assets)?;
        let generator = factor_generator(assets.len(), self.correlation.as_deref())?;
        let loss = LinearPortfolioLoss::new(assets, self.instruments.clone(), self.horizon)?.with_scheme(self.scheme);
        Ok((generator, loss))
    }
}

/// `type = "delta_gamma"`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeltaGammaModel {
    pub horizon: f64,
    #[serde(default)]
    pub scheme: Scheme,
    pub assets: Vec<AssetSpec>,
    #[serde(default)]
    pub correlation: Option<Vec<Vec<f64>>>,
    pub delta: Vec<f64>,
    /// Symmetric matrix, one row per asset.
    pub gamma: Vec<Vec<f64>>,
}

impl DeltaGammaModel {
    /// Factor generator and loss function.
    pub fn build(&self) -> Result<(GbmFactorGenerator, DeltaGammaLoss)> {
        let assets = build_assets(&self.assets)?;
        let n = assets.len();
        let generator = factor_generator(n, self.correlation.as_deref())?;
        let gamma = flatten_square("gamma", &self.gamma, n)?;
        let loss = DeltaGammaLoss::new(assets, self.delta.clone(), gamma, self.horizon)?.with_scheme(self.scheme);
        Ok((generator, loss))
    }
}

/// `type = "nested"`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NestedModel {
    pub horizon: f64,
    /// Risk-free rate of the inner valuation.
    pub rate: f64,
    pub asset: AssetSpec,
    pub option: EuropeanOption,
}

impl NestedModel {
    /// Draw generator and loss function.
    pub fn build(&self) -> Result<(NestedOptionGenerator, NestedOptionLoss)> {
        let loss = NestedOptionLoss::new(self.asset.build()?, self.rate, self.option, self.horizon)?;
        Ok((NestedOptionGenerator, loss))
    }
}

fn build_assets(specs: &[AssetSpec]) -> Result<Vec<GbmAsset>> {
    if specs.is_empty() {
        return Err(CliError::InvalidArgument("model needs at least one asset".to_string()));
    }
    specs.iter().map(|asset| asset.build().map_err(CliError::from)).collect()
}

fn flatten_square(what: &'static str, rows: &[Vec<f64>], n: usize) -> Result<Vec<f64>> {
    if rows.len() != n {
        return Err(ModelError::DimensionMismatch {
            what,
            expected: n,
            got: rows.len(),
        }
        .into());
    }
    if let Some(row) = rows.iter().find(|row| row.len() != n) {
        return Err(ModelError::DimensionMismatch {
            what,
            expected: n,
            got: row.len(),
        }
        .into());
    }
    Ok(rows.concat())
}

fn factor_generator(n: usize, correlation: Option<&[Vec<f64>]>) -> Result<GbmFactorGenerator> {
    match correlation {
        None => Ok(GbmFactorGenerator::independent(n)),
        Some(rows) => {
            let data = flatten_square("correlation", rows, n)?;
            let matrix = CorrelationMatrix::new(&data, n).map_err(ModelError::from)?;
            Ok(GbmFactorGenerator::correlated(&matrix)?)
        }
    }
}

impl RunConfig {
    /// Parses a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads `path`. A missing file is only tolerated for
    /// [`DEFAULT_CONFIG_PATH`], in which case defaults are used.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            if path == DEFAULT_CONFIG_PATH {
                info!(path, "No configuration file; using defaults");
                return Ok(Self::default());
            }
            return Err(CliError::FileNotFound(path.to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        debug!(path, model = config.model.name(), "Configuration loaded");
        Ok(config)
    }

    /// Applies command-line overrides.
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        let estimator = &mut self.estimator;
        estimator.seed = overrides.seed.or(estimator.seed);
        estimator.target_mse = overrides.target_mse.or(estimator.target_mse);
        estimator.confidence_level = overrides.confidence_level.or(estimator.confidence_level);
        estimator.workers = overrides.workers.or(estimator.workers);
        if let Some(format) = overrides.format {
            self.output.format = format;
        }
        self
    }

    /// Validated estimator configuration.
    pub fn mlmc_config(&self) -> Result<MlmcConfig> {
        Ok(self.estimator.builder()?.build()?)
    }
}
