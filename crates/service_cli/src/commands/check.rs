//! Check command implementation
//!
//! Validates the run configuration and builds the model without sampling.

use std::fmt::Write as _;

use tracing::info;

use super::emit;
use crate::config::{ModelConfig, RunConfig};
use crate::Result;

/// Run the check command
pub fn run(config: &RunConfig) -> Result<()> {
    info!("Checking configuration...");
    let rendered = describe(config)?;
    info!("Configuration is valid");
    emit(&rendered, None)
}

/// Validated summary of the run: estimator settings and level schedule.
pub(crate) fn describe(config: &RunConfig) -> Result<String> {
    let mlmc = config.mlmc_config()?;
    let factors = match &config.model {
        ModelConfig::Linear(m) => m.build()?.0.n_factors(),
        ModelConfig::DeltaGamma(m) => m.build()?.0.n_factors(),
        ModelConfig::Nested(m) => {
            m.build()?;
            1
        }
    };
    let schedule = mlmc.schedule()?;

    let mut out = String::new();
    let _ = writeln!(out, "model               {} ({} factor(s))", config.model.name(), factors);
    let _ = writeln!(
        out,
        "target              eps^2 = {:.3e} at {:.2}%",
        mlmc.target_mse(),
        mlmc.confidence_level() * 100.0
    );
    let _ = writeln!(
        out,
        "levels              {} to {} (warm-up {} samples)",
        mlmc.min_levels(),
        mlmc.max_levels(),
        mlmc.warm_up_samples()
    );
    let _ = writeln!(
        out,
        "workers             {}",
        mlmc.n_workers().map_or_else(|| "all cores".to_string(), |n| n.to_string())
    );
    let _ = writeln!(out, "seed                {}", mlmc.seed());
    let _ = writeln!(out);
    let _ = writeln!(out, "{:>5} {:>10} {:>10} {:>10}", "level", "fine", "coarse", "C_l");
    for level in 0..mlmc.max_levels() {
        let (Some(fine), Some(cost)) = (schedule.resolution(level), schedule.nominal_cost(level)) else {
            break;
        };
        let coarse = schedule
            .coarse_resolution(level)
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        let _ = writeln!(out, "{:>5} {:>10} {:>10} {:>10.0}", level, fine, coarse, cost);
    }
    Ok(out)
}
