//! Coupled loss sampler and its parallel batch driver.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, warn};

use super::batch::{LevelBatch, LossPair};
use super::error::SamplingFailure;
use super::resolution::ResolutionSchedule;
use super::traits::{PortfolioLossFunction, RandomFactorGenerator};
use crate::rng::{PricerRng, SeedSequence};

/// Retry behaviour for failed samples.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    /// Additional attempts after the first failure, each with a fresh seed.
    pub max_retries: u32,
    /// Largest tolerated fraction of dropped samples per batch.
    pub max_failure_rate: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            max_failure_rate: 0.01,
        }
    }
}

/// Result of sampling one index with retries.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleOutcome {
    /// The pair, or `None` when every attempt failed.
    pub pair: Option<LossPair>,
    /// Attempts made beyond the first.
    pub retries: u32,
    /// Error of the last failed attempt.
    pub last_error: Option<SamplingFailure>,
}

/// Produces coupled (fine, coarse) loss pairs for any level.
///
/// # Examples
///
/// ```rust
/// use mlmc_pricing::models::{GbmAsset, GbmFactorGenerator, LinearPortfolioLoss};
/// use mlmc_pricing::sampler::{LossSampler, ResolutionSchedule, RetryPolicy};
///
/// let asset = GbmAsset::new(1.0, 0.05, 0.2).unwrap();
/// let loss = LinearPortfolioLoss::single_asset(asset, 1.0, 0.25).unwrap();
/// let sampler = LossSampler::new(
///     GbmFactorGenerator::single(),
///     loss,
///     ResolutionSchedule::new(1, 2).unwrap(),
///     RetryPolicy::default(),
///     7,
/// );
///
/// let batch = sampler.sample_batch(2, 0, 500, 64);
/// assert_eq!(batch.retained(), 500);
/// assert!(batch.differences.variance() < batch.fine_losses.variance());
/// ```
#[derive(Clone, Debug)]
pub struct LossSampler<G, F> {
    generator: G,
    loss_fn: F,
    schedule: ResolutionSchedule,
    retry: RetryPolicy,
    seeds: SeedSequence,
}

impl<G, F> LossSampler<G, F>
where
    G: RandomFactorGenerator,
    F: PortfolioLossFunction<G::Draw>,
{
    /// Creates a sampler rooted at `base_seed`.
    pub fn new(
        generator: G,
        loss_fn: F,
        schedule: ResolutionSchedule,
        retry: RetryPolicy,
        base_seed: u64,
    ) -> Self {
        Self {
            generator,
            loss_fn,
            schedule,
            retry,
            seeds: SeedSequence::new(base_seed),
        }
    }

    /// Resolution schedule of the hierarchy.
    #[inline]
    pub fn schedule(&self) -> &ResolutionSchedule {
        &self.schedule
    }

    /// Retry policy.
    #[inline]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Seed derivation in use.
    #[inline]
    pub fn seeds(&self) -> &SeedSequence {
        &self.seeds
    }

    /// One coupled sample at `level` from an explicit seed.
    ///
    /// The draw is generated once at the fine resolution and evaluated at the
    /// fine and (for `level > 0`) the coarse resolution.
    ///
    /// # Errors
    ///
    /// Propagates the loss function's `SamplingFailure`; a non-finite loss is
    /// reported as [`SamplingFailure::NonFinite`].
    pub fn sample(&self, level: usize, seed: u64) -> Result<LossPair, SamplingFailure> {
        let fine_res = self
            .schedule
            .resolution(level)
            .ok_or(SamplingFailure::ResolutionOverflow { level })?;

        let mut rng = PricerRng::from_seed(seed);
        let draw = self.generator.generate(&mut rng, fine_res);

        let fine = self.evaluate(&draw, fine_res)?;
        match self.schedule.coarse_resolution(level) {
            None => Ok(LossPair::base(fine)),
            Some(coarse_res) => {
                let coarse = self.evaluate(&draw, coarse_res)?;
                Ok(LossPair::coupled(fine, coarse))
            }
        }
    }

    /// Sample `index` of `level`, retrying with fresh seeds on failure.
    pub fn sample_indexed(&self, level: usize, index: u64) -> SampleOutcome {
        let mut last_error = None;
        for attempt in 0..=self.retry.max_retries {
            let seed = self.seeds.seed_for(level, index, attempt);
            match self.sample(level, seed) {
                Ok(pair) => {
                    return SampleOutcome {
                        pair: Some(pair),
                        retries: attempt,
                        last_error,
                    }
                }
                Err(err) => {
                    debug!(level, index, attempt, error = %err, "Sample failed");
                    last_error = Some(err);
                }
            }
        }

        SampleOutcome {
            pair: None,
            retries: self.retry.max_retries,
            last_error,
        }
    }

    /// Samples indices `start..start + count` of `level` in parallel.
    ///
    /// The range is cut into chunks of `chunk_size` indices which run on the
    /// current rayon pool; chunk results are merged in index order. Given
    /// the same range and chunk size the batch is identical for any number
    /// of worker threads.
    pub fn sample_batch(&self, level: usize, start: u64, count: u64, chunk_size: usize) -> LevelBatch {
        let timer = Instant::now();
        let chunk = chunk_size.max(1) as u64;
        let n_chunks = count.div_ceil(chunk);

        let partials: Vec<LevelBatch> = (0..n_chunks)
            .into_par_iter()
            .map(|c| {
                let lo = start + c * chunk;
                let hi = (lo + chunk).min(start + count);
                self.sample_range(level, lo, hi)
            })
            .collect();

        let mut batch = LevelBatch::empty(level, start);
        for partial in partials {
            batch.absorb(partial);
        }
        batch.wall_time = timer.elapsed().as_secs_f64();

        if batch.failed > 0 {
            warn!(
                level,
                failed = batch.failed,
                attempted = batch.attempted,
                "Dropped samples after exhausting retries"
            );
        }
        batch
    }

    fn sample_range(&self, level: usize, lo: u64, hi: u64) -> LevelBatch {
        let cost = self.schedule.nominal_cost(level).unwrap_or(f64::INFINITY);
        let mut batch = LevelBatch::empty(level, lo);
        batch.pairs.reserve((hi - lo) as usize);

        for index in lo..hi {
            let outcome = self.sample_indexed(level, index);
            batch.attempted += 1;
            batch.retries += u64::from(outcome.retries);
            batch.nominal_cost += cost * f64::from(outcome.retries + 1);

            match outcome.pair {
                Some(pair) => batch.record(pair),
                None => {
                    batch.failed += 1;
                    batch.last_error = outcome.last_error;
                }
            }
        }
        batch
    }

    fn evaluate(&self, draw: &G::Draw, resolution: usize) -> Result<f64, SamplingFailure> {
        let value = self.loss_fn.loss(draw, resolution)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(SamplingFailure::NonFinite { resolution, value })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::LossFn;

    /// Draw = `resolution` uniforms; loss = mean of the first `r` of them.
    struct UniformGenerator;

    impl RandomFactorGenerator for UniformGenerator {
        type Draw = Vec<f64>;

        fn generate(&self, rng: &mut PricerRng, resolution: usize) -> Vec<f64> {
            let mut out = vec![0.0; resolution];
            rng.fill_uniform(&mut out);
            out
        }
    }

    fn mean_loss(draw: &Vec<f64>, resolution: usize) -> Result<f64, SamplingFailure> {
        if resolution > draw.len() {
            return Err(SamplingFailure::IncompatibleResolution {
                draw: draw.len(),
                requested: resolution,
            });
        }
        Ok(draw[..resolution].iter().sum::<f64>() / resolution as f64)
    }

    type MeanLoss = LossFn<fn(&Vec<f64>, usize) -> Result<f64, SamplingFailure>>;

    fn sampler(retry: RetryPolicy) -> LossSampler<UniformGenerator, MeanLoss> {
        LossSampler::new(
            UniformGenerator,
            LossFn(mean_loss as fn(&Vec<f64>, usize) -> Result<f64, SamplingFailure>),
            ResolutionSchedule::new(2, 2).unwrap(),
            retry,
            11,
        )
    }

    #[test]
    fn test_level_zero_has_no_coarse() {
        let pair = sampler(RetryPolicy::default()).sample(0, 3).unwrap();
        assert!(pair.coarse.is_none());
        assert_eq!(pair.difference(), pair.fine);
    }

    #[test]
    fn test_same_seed_same_pair() {
        let s = sampler(RetryPolicy::default());
        assert_eq!(s.sample(2, 99).unwrap(), s.sample(2, 99).unwrap());
        assert_ne!(s.sample(2, 99).unwrap(), s.sample(2, 100).unwrap());
    }

    #[test]
    fn test_coarse_uses_prefix_of_fine_draw() {
        let s = sampler(RetryPolicy::default());
        let pair = s.sample(1, 5).unwrap();

        let mut rng = PricerRng::from_seed(5);
        let draw = UniformGenerator.generate(&mut rng, 4);
        assert_eq!(pair.fine, mean_loss(&draw, 4).unwrap());
        assert_eq!(pair.coarse, Some(mean_loss(&draw, 2).unwrap()));
    }

    #[test]
    fn test_batch_independent_of_thread_count() {
        let s = sampler(RetryPolicy::default());
        let single = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let multi = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();

        let a = single.install(|| s.sample_batch(1, 100, 1000, 64));
        let b = multi.install(|| s.sample_batch(1, 100, 1000, 64));

        assert_eq!(a.pairs, b.pairs);
        assert_eq!(a.differences, b.differences);
        assert_eq!(a.attempted, 1000);
        assert_eq!(a.start_index, 100);
    }

    #[test]
    fn test_batch_nominal_cost() {
        let s = sampler(RetryPolicy::default());
        let batch = s.sample_batch(1, 0, 10, 3);
        // Level 1: fine 4 + coarse 2.
        assert_eq!(batch.nominal_cost, 60.0);
    }

    struct FlakyGenerator;

    impl RandomFactorGenerator for FlakyGenerator {
        type Draw = f64;

        fn generate(&self, rng: &mut PricerRng, _resolution: usize) -> f64 {
            rng.gen_uniform()
        }
    }

    #[test]
    fn test_failures_are_retried_then_dropped() {
        // Roughly half the draws fail on every attempt.
        let loss = LossFn(|u: &f64, _r: usize| {
            if *u < 0.5 {
                Err(SamplingFailure::evaluation(1, "rejected"))
            } else {
                Ok(*u)
            }
        });
        let s = LossSampler::new(
            FlakyGenerator,
            loss,
            ResolutionSchedule::new(1, 2).unwrap(),
            RetryPolicy {
                max_retries: 2,
                max_failure_rate: 0.5,
            },
            3,
        );

        let batch = s.sample_batch(0, 0, 2000, 128);
        assert_eq!(batch.attempted, 2000);
        assert_eq!(batch.retained() + batch.failed, 2000);
        assert!(batch.failed > 0);
        assert!(batch.retries > 0);
        // Survivors of three attempts: about 1/8 dropped.
        let rate = batch.failure_rate();
        assert!(rate > 0.08 && rate < 0.17, "failure rate = {}", rate);
        assert!(batch.pairs.iter().all(|p| p.fine >= 0.5));
        assert!(matches!(batch.last_error, Some(SamplingFailure::Evaluation { .. })));
    }

    #[test]
    fn test_non_finite_loss_is_failure() {
        let loss = LossFn(|_: &f64, r: usize| {
            Ok::<f64, SamplingFailure>(if r > 1 { f64::NAN } else { 1.0 })
        });
        let s = LossSampler::new(
            FlakyGenerator,
            loss,
            ResolutionSchedule::new(1, 2).unwrap(),
            RetryPolicy::default(),
            0,
        );
        assert!(s.sample(0, 1).is_ok());
        assert!(matches!(
            s.sample(1, 1),
            Err(SamplingFailure::NonFinite { resolution: 2, .. })
        ));

        let outcome = s.sample_indexed(1, 0);
        assert!(outcome.pair.is_none());
        assert_eq!(outcome.retries, 1);
    }
}
