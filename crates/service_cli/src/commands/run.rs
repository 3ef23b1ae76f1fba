//! Run command implementation
//!
//! Builds the configured loss model and drives the multilevel estimator.

use chrono::{DateTime, Utc};
use mlmc_risk::report::{render_estimate, render_table};
use mlmc_risk::{EstimationError, MlmcConfig, RiskEstimate};
use serde::Serialize;
use tracing::{error, info, warn};

use super::emit;
use crate::config::{ModelConfig, OutputFormat, RunConfig};
use crate::Result;

#[derive(Serialize)]
struct RunReport<'a> {
    generated_at: DateTime<Utc>,
    model: &'a ModelConfig,
    estimator: &'a MlmcConfig,
    estimate: &'a RiskEstimate,
}

/// Run the estimation command
pub fn run(config: &RunConfig, output: Option<&str>) -> Result<()> {
    let mlmc = config.mlmc_config()?;
    info!(
        model = config.model.name(),
        target_mse = mlmc.target_mse(),
        confidence = mlmc.confidence_level(),
        seed = mlmc.seed(),
        "Starting MLMC VaR run"
    );

    let estimate = estimate(&config.model, mlmc.clone())?;
    if let Some(reason) = estimate.status.reason() {
        warn!(%reason, "Estimate did not reach the MSE target");
    }

    let rendered = match config.output.format {
        OutputFormat::Table => render_estimate(&estimate),
        OutputFormat::Json => {
            let report = RunReport {
                generated_at: Utc::now(),
                model: &config.model,
                estimator: &mlmc,
                estimate: &estimate,
            };
            let mut json = serde_json::to_string_pretty(&report)?;
            json.push('\n');
            json
        }
    };
    emit(&rendered, output)
}

/// Runs the estimator on `model`.
pub(crate) fn estimate(model: &ModelConfig, config: MlmcConfig) -> Result<RiskEstimate> {
    let outcome = match model {
        ModelConfig::Linear(m) => {
            let (generator, loss) = m.build()?;
            mlmc_risk::run(config, generator, loss)
        }
        ModelConfig::DeltaGamma(m) => {
            let (generator, loss) = m.build()?;
            mlmc_risk::run(config, generator, loss)
        }
        ModelConfig::Nested(m) => {
            let (generator, loss) = m.build()?;
            mlmc_risk::run(config, generator, loss)
        }
    };
    outcome.map_err(|err| {
        log_failure(&err);
        err.into()
    })
}

fn log_failure(err: &EstimationError) {
    let d = &err.diagnostics;
    error!(
        phase = %d.phase,
        rounds = d.rounds,
        levels = d.levels.len(),
        elapsed = d.elapsed_seconds,
        "{}",
        err.error
    );
    if !d.levels.is_empty() {
        eprint!("{}", render_table(&d.levels));
    }
}
