//! Per-level sample statistics.

use mlmc_core::math::statistics::WelfordAccumulator;
use mlmc_pricing::sampler::{LevelBatch, LossPair};

/// Accumulated statistics of `Y_l = P_l - P_{l-1}` on one level.
///
/// Append-only: the sample count never decreases and every statistic is
/// derived from drawn samples.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelStatistics {
    level: usize,
    resolution: usize,
    cost_per_sample: f64,
    differences: WelfordAccumulator,
    fine_losses: WelfordAccumulator,
    pairs: Vec<LossPair>,
    next_index: u64,
    failed: u64,
    retries: u64,
    nominal_cost: f64,
    wall_time: f64,
}

impl LevelStatistics {
    /// Empty level.
    pub fn new(level: usize, resolution: usize, cost_per_sample: f64) -> Self {
        Self {
            level,
            resolution,
            cost_per_sample,
            differences: WelfordAccumulator::new(),
            fine_losses: WelfordAccumulator::new(),
            pairs: Vec::new(),
            next_index: 0,
            failed: 0,
            retries: 0,
            nominal_cost: 0.0,
            wall_time: 0.0,
        }
    }

    /// Level index.
    #[inline]
    pub fn level(&self) -> usize {
        self.level
    }

    /// Resolution of the fine evaluation.
    #[inline]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Nominal cost `C_l` of one sample.
    #[inline]
    pub fn cost_per_sample(&self) -> f64 {
        self.cost_per_sample
    }

    /// Retained sample count `N_l`.
    #[inline]
    pub fn count(&self) -> u64 {
        self.differences.count()
    }

    /// Sample mean of `Y_l`.
    #[inline]
    pub fn mean(&self) -> f64 {
        self.differences.mean()
    }

    /// Unbiased sample variance of `Y_l`.
    #[inline]
    pub fn variance(&self) -> f64 {
        self.differences.variance()
    }

    /// Sample mean of the fine loss `P_l`.
    #[inline]
    pub fn fine_mean(&self) -> f64 {
        self.fine_losses.mean()
    }

    /// Sample variance of the fine loss `P_l`.
    #[inline]
    pub fn fine_variance(&self) -> f64 {
        self.fine_losses.variance()
    }

    /// Retained (fine, coarse) pairs in index order.
    #[inline]
    pub fn pairs(&self) -> &[LossPair] {
        &self.pairs
    }

    /// First sample index not yet drawn.
    #[inline]
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Samples dropped after exhausting retries.
    #[inline]
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Retry attempts made.
    #[inline]
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// Nominal work units consumed so far.
    #[inline]
    pub fn nominal_cost(&self) -> f64 {
        self.nominal_cost
    }

    /// Wall-clock seconds spent sampling this level.
    #[inline]
    pub fn wall_time(&self) -> f64 {
        self.wall_time
    }

    /// Contribution `V_l / N_l` to the estimator variance.
    #[inline]
    pub fn variance_contribution(&self) -> f64 {
        match self.count() {
            0 => f64::INFINITY,
            n => self.variance() / n as f64,
        }
    }

    /// Appends a batch that starts at [`next_index`](Self::next_index).
    pub(crate) fn absorb(&mut self, batch: LevelBatch) {
        self.next_index = batch.start_index + batch.attempted;
        self.failed += batch.failed;
        self.retries += batch.retries;
        self.nominal_cost += batch.nominal_cost;
        self.wall_time += batch.wall_time;
        self.differences.merge(&batch.differences);
        self.fine_losses.merge(&batch.fine_losses);
        self.pairs.extend(batch.pairs);
    }
}
