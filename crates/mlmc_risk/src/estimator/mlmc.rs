//! The multilevel Monte Carlo refinement loop.

use mlmc_pricing::sampler::{LossSampler, PortfolioLossFunction, RandomFactorGenerator};
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use mlmc_core::math::distributions::two_sided_critical_value;

use super::cancel::CancellationToken;
use super::state::{EstimatorPhase, EstimatorState};
use crate::config::MlmcConfig;
use crate::error::{EstimationError, MlmcError};
use crate::hierarchy::LevelHierarchy;
use crate::var::{
    ConvergenceStatus, MeanInterval, MseBreakdown, NotConvergedReason, RiskEstimate, TailEstimate,
    TailSettings, VarExtractor,
};

/// Parallel chunks drawn between two cancellation polls.
const CHUNKS_PER_SUB_BATCH: u64 = 64;

/// Multilevel Monte Carlo VaR estimator.
///
/// Owns the configuration, the coupled loss sampler and a rayon worker pool.
/// Every call to [`run`](Self::run) starts from an empty hierarchy, so
/// repeated runs with the same configuration give identical estimates.
///
/// # Examples
///
/// ```rust
/// use mlmc_pricing::models::{GbmAsset, GbmFactorGenerator, LinearPortfolioLoss};
/// use mlmc_risk::{MlmcConfig, MlmcEstimator};
///
/// let asset = GbmAsset::new(100.0, 0.05, 0.2).unwrap();
/// let loss = LinearPortfolioLoss::single_asset(asset, 1.0, 1.0 / 12.0).unwrap();
/// let config = MlmcConfig::builder()
///     .target_mse(1e-2)
///     .confidence_level(0.95)
///     .seed(1)
///     .build()
///     .unwrap();
///
/// let estimator = MlmcEstimator::new(config, GbmFactorGenerator::single(), loss).unwrap();
/// let estimate = estimator.run().unwrap();
/// assert!(estimate.var > 0.0);
/// assert!(estimate.levels.len() >= 3);
/// ```
pub struct MlmcEstimator<G, F> {
    config: MlmcConfig,
    sampler: LossSampler<G, F>,
    pool: ThreadPool,
}

impl<G, F> MlmcEstimator<G, F>
where
    G: RandomFactorGenerator,
    F: PortfolioLossFunction<G::Draw>,
{
    /// Validates the configuration and builds the sampler and worker pool.
    ///
    /// # Errors
    ///
    /// `MlmcError::Config` for an invalid configuration,
    /// `MlmcError::ThreadPool` if the worker pool cannot be created.
    pub fn new(config: MlmcConfig, generator: G, loss_fn: F) -> Result<Self, MlmcError> {
        config.validate()?;
        let sampler = LossSampler::new(
            generator,
            loss_fn,
            config.schedule()?,
            config.retry_policy(),
            config.seed(),
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_workers().unwrap_or(0))
            .build()
            .map_err(|e| MlmcError::ThreadPool(e.to_string()))?;
        Ok(Self { config, sampler, pool })
    }

    /// Configuration in use.
    #[inline]
    pub fn config(&self) -> &MlmcConfig {
        &self.config
    }

    /// The coupled loss sampler.
    #[inline]
    pub fn sampler(&self) -> &LossSampler<G, F> {
        &self.sampler
    }

    /// Worker threads in the pool.
    #[inline]
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs to convergence or until a stopping condition is met.
    ///
    /// # Errors
    ///
    /// See [`run_with_cancellation`](Self::run_with_cancellation).
    pub fn run(&self) -> Result<RiskEstimate, EstimationError> {
        self.run_with_cancellation(&CancellationToken::new())
    }

    /// Runs until converged, cancelled, out of time, or out of levels.
    ///
    /// Rounds first drive the mean estimator to its MSE target, then add
    /// tail samples until the VaR meets its standard-error target; the run
    /// converges when neither asks for more. The first level-0 batch always
    /// runs; the token and the time budget are polled before every later
    /// batch. Cancellation, the time
    /// budget, the level bound and the round cap all produce a
    /// `NotConverged` estimate rather than an error.
    ///
    /// # Errors
    ///
    /// `EstimationError` wrapping `MlmcError::SamplingFailure`,
    /// `MlmcError::AllocationDegenerate`, or (for a converged run) the
    /// VaR extraction error, with the hierarchy diagnostics attached.
    pub fn run_with_cancellation(&self, token: &CancellationToken) -> Result<RiskEstimate, EstimationError> {
        let hierarchy = LevelHierarchy::from_config(&self.config)?;
        let mut state = EstimatorState::new(hierarchy, self.config.target_mse());
        info!(
            target_mse = self.config.target_mse(),
            confidence_level = self.config.confidence_level(),
            workers = self.workers(),
            seed = self.config.seed(),
            "Starting MLMC estimation"
        );

        let status = match self.refine(&mut state, token) {
            Ok(status) => status,
            Err(error) => return Err(self.fail(&mut state, error)),
        };

        match &status {
            ConvergenceStatus::Converged => state.transition(EstimatorPhase::Converged),
            ConvergenceStatus::NotConverged { reason } => {
                warn!(%reason, levels = state.hierarchy().len(), "Estimation stopped before convergence");
                state.transition(EstimatorPhase::Stopped);
            }
        }

        match self.assemble(&state, status) {
            Ok(estimate) => Ok(estimate),
            Err(error) => Err(self.fail(&mut state, error)),
        }
    }

    fn fail(&self, state: &mut EstimatorState, error: MlmcError) -> EstimationError {
        state.transition(EstimatorPhase::Failed);
        warn!(error = %error, rounds = state.rounds(), "Estimation failed");
        EstimationError::new(error, state.diagnostics())
    }

    fn interrupted(&self, state: &EstimatorState, token: &CancellationToken) -> bool {
        token.is_cancelled()
            || self
                .config
                .time_budget()
                .is_some_and(|budget| state.elapsed() >= budget)
    }

    fn refine(&self, state: &mut EstimatorState, token: &CancellationToken) -> Result<ConvergenceStatus, MlmcError> {
        let cancelled = ConvergenceStatus::NotConverged {
            reason: NotConvergedReason::Cancelled,
        };
        let warm_up = self.config.warm_up_samples();
        let target = self.config.target_mse();

        if !self.sample_level(state, 0, warm_up, token)? {
            return Ok(cancelled);
        }
        while state.hierarchy().len() < self.config.min_levels() {
            if self.interrupted(state, token) {
                return Ok(cancelled);
            }
            let level = state.hierarchy_mut().add_level()?;
            info!(level, "Added level");
            if !self.sample_level(state, level, warm_up, token)? {
                return Ok(cancelled);
            }
        }
        state.refresh_mse();
        state.transition(EstimatorPhase::Refining);

        loop {
            let round = state.begin_round();
            if round > self.config.max_rounds() {
                return Ok(ConvergenceStatus::NotConverged {
                    reason: NotConvergedReason::RoundLimit {
                        rounds: self.config.max_rounds(),
                    },
                });
            }
            if self.interrupted(state, token) {
                return Ok(cancelled);
            }

            let allocation = state.hierarchy().optimal_allocation(target)?;
            debug!(round, ?allocation, "Sample allocation");
            if allocation.iter().any(|&n| n > 0) {
                if !self.sample_allocation(state, allocation, token)? {
                    return Ok(cancelled);
                }
                let mse = state.refresh_mse();
                debug!(round, mse, target, "Round complete");
                continue;
            }

            if state.hierarchy().should_add_level(target) {
                if !state.hierarchy().can_add_level() {
                    return Ok(ConvergenceStatus::NotConverged {
                        reason: NotConvergedReason::LevelBoundExceeded {
                            max_levels: self.config.max_levels(),
                            bias: state.hierarchy().bias_estimate(),
                        },
                    });
                }
                let level = state.hierarchy_mut().add_level()?;
                info!(level, bias = state.hierarchy().bias_estimate(), "Added level");
                if !self.sample_level(state, level, warm_up, token)? {
                    return Ok(cancelled);
                }
                continue;
            }

            let allocation = self.tail_allocation(state.hierarchy())?;
            if allocation.iter().any(|&n| n > 0) {
                debug!(round, ?allocation, "Tail allocation");
                if !self.sample_allocation(state, allocation, token)? {
                    return Ok(cancelled);
                }
                state.refresh_mse();
                continue;
            }

            let mse = state.refresh_mse();
            info!(round, mse, levels = state.hierarchy().len(), "Converged");
            return Ok(ConvergenceStatus::Converged);
        }
    }

    /// Extra samples per level that make the tail reliable at the current VaR.
    ///
    /// Applies the cost-optimal rule to the indicator variances of `G` at the
    /// VaR with budget `(f(VaR) * target)^2`, where `target` is the VaR
    /// standard-error target of the configuration, tightened to
    /// `max_interval_width / (2 z)` when a width limit is set. The finest
    /// level is also topped up until `min_tail_samples` of its fine losses
    /// exceed the VaR.
    fn tail_allocation(&self, hierarchy: &LevelHierarchy) -> Result<Vec<u64>, MlmcError> {
        let extractor = VarExtractor::from_levels(hierarchy.levels());
        let var = extractor.quantile(self.config.confidence_level())?;
        let mut target = self.config.var_standard_error_target(var);
        if let Some(width) = self.config.max_interval_width() {
            let z = two_sided_critical_value(self.config.ci_level())?;
            target = target.min(width / (2.0 * z));
        }

        let mut allocation = match extractor.density(var).map(|f| (f * target).powi(2)) {
            Some(budget) if budget > 0.0 => {
                hierarchy.tail_allocation(&extractor.indicator_variances(var), budget)
            }
            _ => vec![0; hierarchy.len()],
        };

        let required = self.config.min_tail_samples();
        if let Some(finest) = extractor.finest_exceedances(var) {
            if finest.exceedances < required {
                let scale = (required + 1) as f64 / finest.exceedances.max(1) as f64;
                let total = (finest.samples as f64 * scale).ceil() as u64;
                if let Some(extra) = allocation.get_mut(finest.level) {
                    *extra = (*extra).max(total.saturating_sub(finest.samples));
                }
            }
        }
        debug!(var, target, "Tail check");
        Ok(allocation)
    }

    /// Draws every non-zero increment of `allocation`; `false` if interrupted.
    fn sample_allocation(
        &self,
        state: &mut EstimatorState,
        allocation: Vec<u64>,
        token: &CancellationToken,
    ) -> Result<bool, MlmcError> {
        for (level, n) in allocation.into_iter().enumerate().filter(|&(_, n)| n > 0) {
            if self.interrupted(state, token) || !self.sample_level(state, level, n, token)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Draws `count` new samples on `level` and folds them into the hierarchy.
    ///
    /// Large requests are drawn in sub-batches of at most
    /// `CHUNKS_PER_SUB_BATCH` chunks; the token and time budget are polled
    /// between sub-batches. Returns `false` if interrupted before `count`
    /// samples were drawn.
    fn sample_level(
        &self,
        state: &mut EstimatorState,
        level: usize,
        count: u64,
        token: &CancellationToken,
    ) -> Result<bool, MlmcError> {
        let chunk = self.config.batch_size();
        let sub_batch = (chunk as u64).saturating_mul(CHUNKS_PER_SUB_BATCH);
        let mut remaining = count;

        while remaining > 0 {
            let n = remaining.min(sub_batch);
            let start = state
                .hierarchy()
                .levels()
                .get(level)
                .map_or(0, |stats| stats.next_index());
            let batch = self
                .pool
                .install(|| self.sampler.sample_batch(level, start, n, chunk));

            let rate = batch.failure_rate();
            let (failed, attempted) = (batch.failed, batch.attempted);
            let last_error = batch.last_error.clone();
            debug!(level, start, n, retained = batch.retained(), "Batch sampled");
            state.hierarchy_mut().update_statistics(batch)?;

            let threshold = self.config.max_failure_rate();
            if rate > threshold {
                return Err(MlmcError::SamplingFailure {
                    level,
                    failed,
                    attempted,
                    rate,
                    threshold,
                    last_error,
                });
            }

            remaining -= n;
            if remaining > 0 && self.interrupted(state, token) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Extracts the tail and builds the final estimate.
    ///
    /// A converged run requires a reliable tail; a stopped run falls back to
    /// the point VaR without an interval when the tail is too thin. The
    /// quantile bias is extrapolated with the hierarchy's weak rate.
    fn assemble(&self, state: &EstimatorState, status: ConvergenceStatus) -> Result<RiskEstimate, MlmcError> {
        let hierarchy = state.hierarchy();
        let alpha = self.config.confidence_level();
        let rates = hierarchy.rates();
        let settings = TailSettings {
            weak_rate: Some(rates.alpha),
            ..TailSettings::from_config(&self.config)
        };
        let extractor = VarExtractor::from_levels(hierarchy.levels());

        let tail = match extractor.estimate_var(alpha, &settings) {
            Ok(tail) => tail,
            Err(MlmcError::InsufficientTailSamples {
                tail_samples,
                reason,
                recommendation,
            }) if !status.is_converged() => {
                warn!(tail_samples, %reason, "Reporting point VaR without interval");
                let var = extractor.quantile(alpha)?;
                TailEstimate {
                    var,
                    confidence_interval: None,
                    expected_shortfall: settings
                        .expected_shortfall
                        .then(|| extractor.expected_shortfall(alpha, var)),
                    tail_level: extractor.finest_exceedances(var).map_or(0, |e| e.level),
                    tail_samples,
                    level_zero_tail_samples: extractor.level_zero_exceedances(var),
                    recommendation: Some(format!("{}; {}", reason, recommendation)),
                }
            }
            Err(error) => return Err(error),
        };

        let bias = hierarchy.bias_estimate();
        let bias_squared = bias * bias;
        let variance = hierarchy.variance_estimate();
        let mean_loss = hierarchy.mean_estimate();
        let z = two_sided_critical_value(settings.ci_level)?;

        Ok(RiskEstimate {
            confidence_level: alpha,
            var: tail.var,
            confidence_interval: tail.confidence_interval,
            expected_shortfall: tail.expected_shortfall,
            mean_loss,
            mean_interval: MeanInterval::new(mean_loss, bias_squared + variance, z, settings.ci_level),
            mse: MseBreakdown {
                bias_squared,
                variance,
                total: bias_squared + variance,
                target: state.target_mse(),
            },
            status,
            levels: hierarchy.summaries(),
            rates,
            tail_level: tail.tail_level,
            tail_samples: tail.tail_samples,
            level_zero_tail_samples: tail.level_zero_tail_samples,
            recommendation: tail.recommendation,
            total_samples: hierarchy.total_samples(),
            total_cost: hierarchy.total_cost(),
            rounds: state.rounds(),
            elapsed_seconds: state.elapsed().as_secs_f64(),
        })
    }
}

/// Builds an estimator and runs it to completion.
///
/// # Errors
///
/// `EstimationError` for invalid configuration or a structural failure of
/// the run; see [`MlmcEstimator::run_with_cancellation`].
pub fn run<G, F>(config: MlmcConfig, generator: G, loss_fn: F) -> Result<RiskEstimate, EstimationError>
where
    G: RandomFactorGenerator,
    F: PortfolioLossFunction<G::Draw>,
{
    MlmcEstimator::new(config, generator, loss_fn)?.run()
}
