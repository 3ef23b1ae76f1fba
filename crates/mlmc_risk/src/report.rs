//! Per-level summaries and plain-text rendering of results.

use std::fmt::Write as _;

use crate::var::{ConvergenceStatus, RiskEstimate};

/// Snapshot of one level's statistics.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LevelSummary {
    /// Level index.
    pub level: usize,
    /// Fine resolution.
    pub resolution: usize,
    /// Retained samples `N_l`.
    pub samples: u64,
    /// Mean of `Y_l`.
    pub mean: f64,
    /// Variance of `Y_l`.
    pub variance: f64,
    /// Nominal cost `C_l` per sample.
    pub cost_per_sample: f64,
    /// Dropped samples.
    pub failed: u64,
    /// Retry attempts.
    pub retries: u64,
    /// Nominal work consumed.
    pub nominal_cost: f64,
    /// Wall-clock seconds spent on the level.
    pub wall_time: f64,
}

/// Renders level summaries as a fixed-width table.
pub fn render_table(levels: &[LevelSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>5} {:>8} {:>12} {:>13} {:>13} {:>10} {:>8} {:>9}",
        "level", "res", "N_l", "mean(Y_l)", "var(Y_l)", "C_l", "failed", "time[s]"
    );
    for l in levels {
        let _ = writeln!(
            out,
            "{:>5} {:>8} {:>12} {:>13.5e} {:>13.5e} {:>10.1} {:>8} {:>9.3}",
            l.level, l.resolution, l.samples, l.mean, l.variance, l.cost_per_sample, l.failed, l.wall_time
        );
    }
    out
}

/// Renders a complete estimate: headline figures followed by the level table.
pub fn render_estimate(estimate: &RiskEstimate) -> String {
    let mut out = String::new();
    let pct = estimate.confidence_level * 100.0;

    let _ = writeln!(out, "VaR({:.2}%)          {:.6}", pct, estimate.var);
    match &estimate.confidence_interval {
        Some(ci) => {
            let _ = writeln!(
                out,
                "{:.0}% interval        [{:.6}, {:.6}]  (se {:.3e}, bias {:.3e})",
                ci.level * 100.0,
                ci.lower,
                ci.upper,
                ci.standard_error,
                ci.bias
            );
        }
        None => {
            let _ = writeln!(out, "interval            unavailable");
        }
    }
    if let Some(es) = estimate.expected_shortfall {
        let _ = writeln!(out, "ES({:.2}%)           {:.6}", pct, es);
    }
    let _ = writeln!(
        out,
        "mean loss           {:.6}  {:.0}% interval [{:.6}, {:.6}]",
        estimate.mean_loss,
        estimate.mean_interval.level * 100.0,
        estimate.mean_interval.lower,
        estimate.mean_interval.upper
    );
    let _ = writeln!(
        out,
        "tail samples        {} on level {} ({} on level 0)",
        estimate.tail_samples, estimate.tail_level, estimate.level_zero_tail_samples
    );
    let _ = writeln!(
        out,
        "MSE                 {:.3e} (bias^2 {:.3e} + variance {:.3e}, target {:.3e})",
        estimate.mse.total, estimate.mse.bias_squared, estimate.mse.variance, estimate.mse.target
    );
    let _ = writeln!(
        out,
        "rates               alpha {:.3}  beta {:.3}  gamma {:.3}",
        estimate.rates.alpha, estimate.rates.beta, estimate.rates.gamma
    );
    let status = match &estimate.status {
        ConvergenceStatus::Converged => "converged".to_string(),
        ConvergenceStatus::NotConverged { reason } => format!("not converged ({})", reason),
    };
    let _ = writeln!(out, "status              {}", status);
    let _ = writeln!(
        out,
        "work                {} samples, {:.3e} cost units, {} rounds, {:.3}s",
        estimate.total_samples, estimate.total_cost, estimate.rounds, estimate.elapsed_seconds
    );
    if let Some(rec) = &estimate.recommendation {
        let _ = writeln!(out, "recommendation      {}", rec);
    }
    out.push('\n');
    out.push_str(&render_table(&estimate.levels));
    out
}
