//! Closed-form command implementation
//!
//! Exact VaR and Expected Shortfall for linear portfolios on a single GBM
//! factor, used as a reference for multilevel runs.

use chrono::{DateTime, Utc};
use mlmc_pricing::models::{lognormal_expected_shortfall, lognormal_var, Instrument};
use mlmc_risk::config::DEFAULT_CONFIDENCE_LEVEL;
use serde::Serialize;
use tracing::info;

use super::emit;
use crate::config::{LinearModel, ModelConfig, OutputFormat, RunConfig};
use crate::{CliError, Result};

/// Exact risk figures of a single-factor linear portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClosedForm {
    pub confidence_level: f64,
    pub var: f64,
    pub expected_shortfall: f64,
}

#[derive(Serialize)]
struct ClosedFormReport {
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    result: ClosedForm,
}

/// Run the closed-form command
pub fn run(config: &RunConfig, output: Option<&str>) -> Result<()> {
    let ModelConfig::Linear(model) = &config.model else {
        return Err(CliError::InvalidArgument(format!(
            "closed form needs a linear model, got {}",
            config.model.name()
        )));
    };
    let confidence = config.estimator.confidence_level.unwrap_or(DEFAULT_CONFIDENCE_LEVEL);
    let result = evaluate(model, confidence)?;
    info!(var = result.var, es = result.expected_shortfall, "Closed-form evaluation complete");

    let rendered = match config.output.format {
        OutputFormat::Table => {
            let pct = confidence * 100.0;
            format!(
                "VaR({:.2}%)          {:.6}\nES({:.2}%)           {:.6}\n",
                pct, result.var, pct, result.expected_shortfall
            )
        }
        OutputFormat::Json => {
            let report = ClosedFormReport {
                generated_at: Utc::now(),
                result,
            };
            let mut json = serde_json::to_string_pretty(&report)?;
            json.push('\n');
            json
        }
    };
    emit(&rendered, output)
}

/// Exact VaR and ES at `confidence`.
///
/// Spot positions aggregate into one lognormal holding; bonds add their
/// deterministic pull-to-par loss.
pub fn evaluate(model: &LinearModel, confidence: f64) -> Result<ClosedForm> {
    let [asset] = model.assets.as_slice() else {
        return Err(CliError::InvalidArgument(format!(
            "closed form needs exactly one asset, got {}",
            model.assets.len()
        )));
    };
    let spots = [asset.spot];

    let mut quantity = 0.0;
    let mut carry_loss = 0.0;
    for instrument in &model.instruments {
        match *instrument {
            Instrument::Position { quantity: q, .. } => quantity += q,
            Instrument::ZeroCouponBond { .. } => {
                carry_loss += instrument.value(&spots, 0.0) - instrument.value(&spots, model.horizon);
            }
        }
    }

    let (spot, drift, vol, horizon) = (asset.spot, asset.drift, asset.volatility, model.horizon);
    let var = lognormal_var(spot, drift, vol, horizon, quantity, confidence)?;
    let es = lognormal_expected_shortfall(spot, drift, vol, horizon, quantity, confidence)?;
    Ok(ClosedForm {
        confidence_level: confidence,
        var: var + carry_loss,
        expected_shortfall: es + carry_loss,
    })
}
