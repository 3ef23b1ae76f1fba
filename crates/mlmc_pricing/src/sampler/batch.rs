//! Coupled sample values and per-batch accumulation.

use mlmc_core::math::statistics::WelfordAccumulator;

use super::error::SamplingFailure;

/// Default number of sample indices handled by one parallel work unit.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Fine and coarse loss produced from one shared draw.
///
/// At level 0 there is no coarse partner: `coarse` is `None` and the
/// difference equals the fine loss (`P_{-1} = 0`).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LossPair {
    /// Loss at the level's own resolution.
    pub fine: f64,
    /// Loss at the next-coarser resolution.
    pub coarse: Option<f64>,
}

impl LossPair {
    /// Pair for level 0.
    #[inline]
    pub fn base(fine: f64) -> Self {
        Self { fine, coarse: None }
    }

    /// Pair for a level above 0.
    #[inline]
    pub fn coupled(fine: f64, coarse: f64) -> Self {
        Self {
            fine,
            coarse: Some(coarse),
        }
    }

    /// Telescoping difference `Y = P_l - P_{l-1}`.
    #[inline]
    pub fn difference(&self) -> f64 {
        self.fine - self.coarse.unwrap_or(0.0)
    }
}

/// Outcome of sampling a contiguous range of indices at one level.
///
/// Batches produced by parallel workers are merged in index order, so the
/// accumulated moments depend only on the index range and the chunk size.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LevelBatch {
    /// Level the batch was drawn at.
    pub level: usize,
    /// First sample index of the batch.
    pub start_index: u64,
    /// Number of indices attempted.
    pub attempted: u64,
    /// Indices dropped after exhausting every retry.
    pub failed: u64,
    /// Retry attempts made (successful or not).
    pub retries: u64,
    /// Moments of `Y = P_l - P_{l-1}` over the retained samples.
    pub differences: WelfordAccumulator,
    /// Moments of the fine loss `P_l`.
    pub fine_losses: WelfordAccumulator,
    /// Retained pairs in index order.
    pub pairs: Vec<LossPair>,
    /// Nominal work units consumed (retries included).
    pub nominal_cost: f64,
    /// Wall-clock seconds spent producing the batch.
    pub wall_time: f64,
    /// Error behind the last dropped index, in index order.
    pub last_error: Option<SamplingFailure>,
}

impl LevelBatch {
    /// Empty batch starting at `start_index`.
    pub fn empty(level: usize, start_index: u64) -> Self {
        Self {
            level,
            start_index,
            ..Self::default()
        }
    }

    /// Number of retained samples.
    #[inline]
    pub fn retained(&self) -> u64 {
        self.differences.count()
    }

    /// Fraction of attempted indices that were dropped.
    #[inline]
    pub fn failure_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.failed as f64 / self.attempted as f64
        }
    }

    /// Records a retained pair.
    #[inline]
    pub fn record(&mut self, pair: LossPair) {
        self.differences.push(pair.difference());
        self.fine_losses.push(pair.fine);
        self.pairs.push(pair);
    }

    /// Appends a batch covering the indices right after this one.
    pub fn absorb(&mut self, other: LevelBatch) {
        debug_assert_eq!(self.level, other.level);
        self.attempted += other.attempted;
        self.failed += other.failed;
        self.retries += other.retries;
        self.differences.merge(&other.differences);
        self.fine_losses.merge(&other.fine_losses);
        self.pairs.extend(other.pairs);
        self.nominal_cost += other.nominal_cost;
        if other.last_error.is_some() {
            self.last_error = other.last_error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_level_zero_difference_is_fine_loss() {
        let pair = LossPair::base(3.5);
        assert_eq!(pair.difference(), 3.5);
        assert!(pair.coarse.is_none());
    }

    #[test]
    fn test_coupled_difference() {
        assert_relative_eq!(LossPair::coupled(2.0, 1.25).difference(), 0.75);
    }

    #[test]
    fn test_absorb_matches_sequential_record() {
        let pairs = [
            LossPair::coupled(1.0, 0.5),
            LossPair::coupled(2.0, 1.0),
            LossPair::coupled(0.0, 0.25),
            LossPair::coupled(4.0, 3.0),
        ];

        let mut sequential = LevelBatch::empty(1, 0);
        for &p in &pairs {
            sequential.record(p);
        }

        let mut left = LevelBatch::empty(1, 0);
        let mut right = LevelBatch::empty(1, 2);
        left.record(pairs[0]);
        left.record(pairs[1]);
        right.record(pairs[2]);
        right.record(pairs[3]);
        left.absorb(right);

        assert_eq!(left.pairs, sequential.pairs);
        assert_eq!(left.retained(), 4);
        assert_relative_eq!(left.differences.mean(), sequential.differences.mean(), epsilon = 1e-14);
        assert_relative_eq!(
            left.differences.variance(),
            sequential.differences.variance(),
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_failure_rate() {
        let mut batch = LevelBatch::empty(0, 0);
        assert_eq!(batch.failure_rate(), 0.0);
        batch.attempted = 10;
        batch.failed = 3;
        assert_relative_eq!(batch.failure_rate(), 0.3);
    }
}
