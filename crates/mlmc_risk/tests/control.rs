//! Control-flow tests for the multilevel estimator.
//!
//! # Test Categories
//!
//! 1. **Cancellation**: tokens and wall-clock budgets stop refinement
//! 2. **Determinism**: identical estimates across runs and worker counts
//! 3. **Stopping conditions**: level bound and round cap
//! 4. **Failures**: degenerate allocation and excessive sampling failures

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mlmc_pricing::models::{FactorPath, GbmAsset, GbmFactorGenerator, LinearPortfolioLoss};
use mlmc_pricing::rng::PricerRng;
use mlmc_pricing::sampler::{LossFn, RandomFactorGenerator, SamplingFailure};
use mlmc_risk::{
    run, CancellationToken, ConvergenceStatus, EstimatorPhase, MlmcConfig, MlmcError, MlmcEstimator,
    NotConvergedReason, RiskEstimate,
};

fn gbm_loss() -> LinearPortfolioLoss {
    let asset = GbmAsset::new(10.0, 0.05, 0.2).unwrap();
    LinearPortfolioLoss::single_asset(asset, 1.0, 1.0 / 12.0).unwrap()
}

/// One uniform variate per draw, independent of the resolution.
struct UniformDraw;

impl RandomFactorGenerator for UniformDraw {
    type Draw = f64;

    fn generate(&self, rng: &mut PricerRng, _resolution: usize) -> f64 {
        rng.gen_uniform()
    }
}

fn assert_same_estimate(a: &RiskEstimate, b: &RiskEstimate) {
    assert_eq!(a.var.to_bits(), b.var.to_bits());
    assert_eq!(a.mean_loss.to_bits(), b.mean_loss.to_bits());
    assert_eq!(a.confidence_interval, b.confidence_interval);
    assert_eq!(a.expected_shortfall, b.expected_shortfall);
    assert_eq!(a.mse, b.mse);
    assert_eq!(a.rounds, b.rounds);
    assert_eq!(a.status, b.status);
    assert_eq!(a.levels.len(), b.levels.len());
    for (x, y) in a.levels.iter().zip(&b.levels) {
        assert_eq!(x.samples, y.samples);
        assert_eq!(x.mean.to_bits(), y.mean.to_bits());
        assert_eq!(x.variance.to_bits(), y.variance.to_bits());
    }
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_pre_cancelled_token_returns_level_zero_estimate() {
    let config = MlmcConfig::builder()
        .target_mse(1e-6)
        .warm_up_samples(2_000)
        .build()
        .unwrap();
    let estimator = MlmcEstimator::new(config, GbmFactorGenerator::single(), gbm_loss()).unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let estimate = estimator.run_with_cancellation(&token).unwrap();
    assert_eq!(
        estimate.status,
        ConvergenceStatus::NotConverged {
            reason: NotConvergedReason::Cancelled
        }
    );
    assert_eq!(estimate.levels.len(), 1);
    assert_eq!(estimate.levels[0].samples, 2_000);
    assert!(estimate.var.is_finite());
    assert!(matches!(estimate.into_converged(), Err(MlmcError::Cancelled)));
}

#[test]
fn test_cancellation_mid_refinement() {
    let token = CancellationToken::new();
    let calls = Arc::new(AtomicU64::new(0));
    let loss = {
        let token = token.clone();
        let calls = Arc::clone(&calls);
        let inner = gbm_loss();
        LossFn(move |draw: &FactorPath, resolution: usize| {
            if calls.fetch_add(1, Ordering::Relaxed) > 300_000 {
                token.cancel();
            }
            mlmc_pricing::sampler::PortfolioLossFunction::loss(&inner, draw, resolution)
        })
    };
    // Far too tight to finish: level 0 alone would need ~10^8 samples.
    let config = MlmcConfig::builder().target_mse(1e-9).batch_size(512).build().unwrap();
    let estimator = MlmcEstimator::new(config, GbmFactorGenerator::single(), loss).unwrap();

    let estimate = estimator.run_with_cancellation(&token).unwrap();
    assert!(!estimate.is_converged());
    assert!(token.is_cancelled());
    assert!(estimate.levels.len() >= 3);
    assert!(estimate.levels.iter().all(|l| l.samples > 0));
    assert!(estimate.total_samples < 10_000_000);
    assert!(estimate.var > 0.0);
}

#[test]
fn test_time_budget_stops_refinement() {
    let config = MlmcConfig::builder()
        .target_mse(1e-10)
        .time_budget(Duration::from_millis(200))
        .build()
        .unwrap();
    let estimate = run(config, GbmFactorGenerator::single(), gbm_loss()).unwrap();
    assert_eq!(
        estimate.status,
        ConvergenceStatus::NotConverged {
            reason: NotConvergedReason::Cancelled
        }
    );
    assert!(estimate.total_samples > 0);
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_repeated_runs_identical() {
    let config = MlmcConfig::builder().target_mse(1e-4).seed(9).build().unwrap();
    let estimator = MlmcEstimator::new(config, GbmFactorGenerator::single(), gbm_loss()).unwrap();
    let a = estimator.run().unwrap();
    let b = estimator.run().unwrap();
    assert_same_estimate(&a, &b);
}

#[test]
fn test_worker_count_does_not_change_estimate() {
    let build = |workers: usize| {
        MlmcConfig::builder()
            .target_mse(1e-4)
            .seed(5)
            .n_workers(workers)
            .batch_size(256)
            .build()
            .unwrap()
    };
    let single = run(build(1), GbmFactorGenerator::single(), gbm_loss()).unwrap();
    let multi = run(build(4), GbmFactorGenerator::single(), gbm_loss()).unwrap();
    assert_same_estimate(&single, &multi);
}

#[test]
fn test_different_seeds_differ() {
    let build = |seed: u64| MlmcConfig::builder().target_mse(1e-4).seed(seed).build().unwrap();
    let a = run(build(1), GbmFactorGenerator::single(), gbm_loss()).unwrap();
    let b = run(build(2), GbmFactorGenerator::single(), gbm_loss()).unwrap();
    assert_ne!(a.var.to_bits(), b.var.to_bits());
}

// ============================================================================
// Stopping Conditions
// ============================================================================

#[test]
fn test_non_decaying_bias_hits_level_bound() {
    // Y_l is deterministic with |E[Y_l]| ~ 2^(-l/2): the bias stays large.
    let loss = LossFn(|u: &f64, resolution: usize| {
        Ok::<f64, SamplingFailure>(*u + 1.0 / (resolution as f64).sqrt())
    });
    let config = MlmcConfig::builder()
        .target_mse(1e-3)
        .min_levels(3)
        .max_levels(3)
        .confidence_level(0.95)
        .build()
        .unwrap();

    let estimate = run(config, UniformDraw, loss).unwrap();
    match &estimate.status {
        ConvergenceStatus::NotConverged {
            reason: NotConvergedReason::LevelBoundExceeded { max_levels, bias },
        } => {
            assert_eq!(*max_levels, 3);
            assert!(*bias > 0.1);
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(estimate.levels.len(), 3);
    assert!(matches!(
        estimate.into_converged(),
        Err(MlmcError::LevelBoundExceeded { max_levels: 3, .. })
    ));
}

#[test]
fn test_round_limit() {
    let config = MlmcConfig::builder().target_mse(1e-6).max_rounds(1).build().unwrap();
    let estimate = run(config, GbmFactorGenerator::single(), gbm_loss()).unwrap();
    assert_eq!(
        estimate.status,
        ConvergenceStatus::NotConverged {
            reason: NotConvergedReason::RoundLimit { rounds: 1 }
        }
    );
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_constant_loss_is_degenerate() {
    let loss = LossFn(|_: &f64, _resolution: usize| Ok::<f64, SamplingFailure>(1.0));
    let config = MlmcConfig::builder().target_mse(1e-4).build().unwrap();

    let err = run(config, UniformDraw, loss).unwrap_err();
    assert_eq!(err.error, MlmcError::AllocationDegenerate { levels: 3 });
    assert_eq!(err.diagnostics.phase, EstimatorPhase::Failed);
    assert_eq!(err.diagnostics.levels.len(), 3);
    assert!(err.diagnostics.levels.iter().all(|l| l.samples > 0));
}

#[test]
fn test_failure_rate_escalates() {
    // About a quarter of the samples fail both attempts.
    let loss = LossFn(|u: &f64, resolution: usize| {
        if *u < 0.5 {
            Err(SamplingFailure::evaluation(resolution, "pricer diverged"))
        } else {
            Ok(*u)
        }
    });
    let config = MlmcConfig::builder().target_mse(1e-4).build().unwrap();

    let err = run(config, UniformDraw, loss).unwrap_err();
    match &err.error {
        MlmcError::SamplingFailure {
            level,
            rate,
            last_error,
            ..
        } => {
            assert_eq!(*level, 0);
            assert!(*rate > 0.1);
            assert!(last_error.is_some());
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.diagnostics.phase, EstimatorPhase::Failed);
    assert!(err.diagnostics.levels[0].failed > 0);
}

#[test]
fn test_invalid_configuration_rejected() {
    let result = MlmcConfig::builder().target_mse(1e-4).min_levels(1).build();
    assert!(result.is_err());
}
