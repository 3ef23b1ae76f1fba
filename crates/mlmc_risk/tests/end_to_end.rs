//! End-to-end accuracy tests for the multilevel VaR estimator.
//!
//! These tests run the full estimator on single-asset GBM portfolios where
//! the loss distribution is known in closed form.
//!
//! # Test Categories
//!
//! 1. **Closed-form VaR**: 99% VaR and ES against the lognormal formulas
//! 2. **Mean convergence**: telescoped mean loss approaches the exact mean
//! 3. **Telescoping**: level means sum to the reported mean loss
//! 4. **Coverage**: reported intervals contain the exact values across seeds

use approx::assert_relative_eq;
use mlmc_pricing::models::{
    lognormal_expected_shortfall, lognormal_var, GbmAsset, GbmFactorGenerator, LinearPortfolioLoss,
};
use mlmc_risk::{run, ConvergenceStatus, MlmcConfig, RiskEstimate};

const SPOT: f64 = 10.0;
const DRIFT: f64 = 0.05;
const VOL: f64 = 0.2;
const HORIZON: f64 = 1.0 / 12.0;

fn single_asset() -> LinearPortfolioLoss {
    let asset = GbmAsset::new(SPOT, DRIFT, VOL).unwrap();
    LinearPortfolioLoss::single_asset(asset, 1.0, HORIZON).unwrap()
}

fn estimate(target_mse: f64, confidence: f64, seed: u64) -> RiskEstimate {
    let config = MlmcConfig::builder()
        .target_mse(target_mse)
        .confidence_level(confidence)
        .alpha(1.0)
        .seed(seed)
        .build()
        .unwrap();
    run(config, GbmFactorGenerator::single(), single_asset()).unwrap()
}

// ============================================================================
// Closed-Form VaR
// ============================================================================

#[test]
fn test_lognormal_var_99_within_one_percent() {
    let target = 1e-6;
    let estimate = estimate(target, 0.99, 42);
    let exact = lognormal_var(SPOT, DRIFT, VOL, HORIZON, 1.0, 0.99).unwrap();

    assert_eq!(estimate.status, ConvergenceStatus::Converged);
    assert!(
        (estimate.var - exact).abs() < 0.01 * exact,
        "VaR {} vs exact {}",
        estimate.var,
        exact
    );
    assert!(
        estimate.mse.total <= target * (1.0 + 1e-9),
        "MSE {:?} exceeds target",
        estimate.mse
    );

    let ci = estimate.confidence_interval.expect("converged run has an interval");
    assert!(ci.lower <= estimate.var && estimate.var <= ci.upper);
    assert!(estimate.tail_samples >= 10);
    assert!(estimate.recommendation.is_none());
}

#[test]
fn test_lognormal_expected_shortfall() {
    let estimate = estimate(1e-6, 0.99, 7);
    let exact = lognormal_expected_shortfall(SPOT, DRIFT, VOL, HORIZON, 1.0, 0.99).unwrap();
    let es = estimate.expected_shortfall.expect("ES enabled by default");

    assert!((es - exact).abs() < 0.02 * exact, "ES {} vs exact {}", es, exact);
    assert!(es > estimate.var);
}

#[test]
fn test_expected_shortfall_can_be_disabled() {
    let config = MlmcConfig::builder()
        .target_mse(1e-4)
        .confidence_level(0.95)
        .expected_shortfall(false)
        .build()
        .unwrap();
    let estimate = run(config, GbmFactorGenerator::single(), single_asset()).unwrap();
    assert!(estimate.expected_shortfall.is_none());
}

// ============================================================================
// Mean Convergence
// ============================================================================

#[test]
fn test_mean_loss_converges_as_target_shrinks() {
    let exact_mean = SPOT * (1.0 - (DRIFT * HORIZON).exp());

    let mut previous_samples = 0;
    for target in [1e-4, 1e-5, 1e-6] {
        let estimate = estimate(target, 0.95, 11);
        let eps = target.sqrt();
        assert!(
            (estimate.mean_loss - exact_mean).abs() < 4.0 * eps,
            "target {}: mean {} vs exact {}",
            target,
            estimate.mean_loss,
            exact_mean
        );
        assert!(estimate.total_samples > previous_samples);
        previous_samples = estimate.total_samples;
    }
}

// ============================================================================
// Telescoping
// ============================================================================

#[test]
fn test_level_means_sum_to_mean_loss() {
    let estimate = estimate(1e-5, 0.99, 3);
    let telescoped: f64 = estimate.levels.iter().map(|l| l.mean).sum();
    assert_relative_eq!(telescoped, estimate.mean_loss, epsilon = 1e-14);

    let total: u64 = estimate.levels.iter().map(|l| l.samples).sum();
    assert_eq!(total, estimate.total_samples);
    assert!(estimate.levels.len() >= 3);

    // Milstein level variances fall well below the level-0 loss variance.
    let v0 = estimate.levels[0].variance;
    for level in &estimate.levels[1..] {
        assert!(level.variance < 0.01 * v0, "level {} variance {}", level.level, level.variance);
    }
}

// ============================================================================
// Coverage Across Seeds
// ============================================================================

#[test]
fn test_var_within_one_percent_for_every_seed() {
    let exact = lognormal_var(SPOT, DRIFT, VOL, HORIZON, 1.0, 0.99).unwrap();
    let warm_up = MlmcConfig::builder().target_mse(1e-6).build().unwrap().warm_up_samples();
    for seed in 0..8 {
        let estimate = estimate(1e-6, 0.99, seed);
        assert!(estimate.is_converged(), "seed {}: {:?}", seed, estimate.status);
        assert!(
            (estimate.var - exact).abs() < 0.01 * exact,
            "seed {}: VaR {} vs exact {}",
            seed,
            estimate.var,
            exact
        );
        assert!(estimate.tail_samples >= 10, "seed {}: {} tail samples", seed, estimate.tail_samples);
        // The tail rounds refine the correction levels beyond their warm-up.
        assert!(estimate.levels[1].samples > warm_up, "seed {}: {:?}", seed, estimate.levels[1]);
    }
}

#[test]
fn test_intervals_cover_exact_values() {
    let exact_var = lognormal_var(SPOT, DRIFT, VOL, HORIZON, 1.0, 0.95).unwrap();
    let exact_mean = SPOT * (1.0 - (DRIFT * HORIZON).exp());

    let seeds = 20;
    let mut var_hits = 0;
    let mut mean_hits = 0;
    for seed in 0..seeds {
        let estimate = estimate(1e-5, 0.95, 1000 + seed);
        let ci = estimate.confidence_interval.expect("converged run has an interval");
        assert!(ci.width() > 0.0);
        assert!(ci.standard_error > 0.0 && ci.density > 0.0);
        if ci.lower <= exact_var && exact_var <= ci.upper {
            var_hits += 1;
        }
        if estimate.mean_interval.contains(exact_mean) {
            mean_hits += 1;
        }
    }
    // Nominal 95% intervals: at least 15 of 20 hits.
    assert!(var_hits >= 15, "VaR interval covered the exact VaR {} of {} times", var_hits, seeds);
    assert!(mean_hits >= 15, "mean interval covered the exact mean {} of {} times", mean_hits, seeds);
}
