//! Level creation, sample allocation and bias estimation.

use mlmc_pricing::sampler::{LevelBatch, ResolutionSchedule};
use tracing::debug;

use super::level::LevelStatistics;
use super::rates::{fit_rates, RateEstimates};
use crate::config::{ConfigError, MlmcConfig, RateOverrides};
use crate::error::MlmcError;
use crate::report::LevelSummary;

/// Parameters governing the hierarchy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HierarchyParams {
    /// Bias share of the MSE budget.
    pub theta: f64,
    /// Samples drawn on a newly added level.
    pub warm_up_samples: u64,
    /// Levels required before the bias test applies.
    pub min_levels: usize,
    /// Upper bound on the number of levels.
    pub max_levels: usize,
    /// Fixed decay rates.
    pub rates: RateOverrides,
}

impl HierarchyParams {
    /// Extracts the hierarchy parameters of a configuration.
    pub fn from_config(config: &MlmcConfig) -> Self {
        Self {
            theta: config.theta(),
            warm_up_samples: config.warm_up_samples(),
            min_levels: config.min_levels(),
            max_levels: config.max_levels(),
            rates: config.rates(),
        }
    }
}

/// Ordered sequence of levels `0..=L` with their accumulated statistics.
///
/// Levels are only ever appended and sample counts only ever grow. Stored
/// statistics are never altered by the regularisation applied when
/// allocating samples or estimating the bias.
///
/// # Examples
///
/// ```rust
/// use mlmc_pricing::sampler::{LevelBatch, LossPair};
/// use mlmc_risk::hierarchy::LevelHierarchy;
/// use mlmc_risk::MlmcConfig;
///
/// let config = MlmcConfig::builder().target_mse(1e-4).build().unwrap();
/// let mut hierarchy = LevelHierarchy::from_config(&config).unwrap();
/// assert_eq!(hierarchy.len(), 1);
///
/// let mut batch = LevelBatch::empty(0, 0);
/// for x in [1.0, 2.0, 3.0] {
///     batch.record(LossPair::base(x));
/// }
/// batch.attempted = 3;
/// hierarchy.update_statistics(batch).unwrap();
/// assert_eq!(hierarchy.levels()[0].count(), 3);
/// ```
#[derive(Clone, Debug)]
pub struct LevelHierarchy {
    schedule: ResolutionSchedule,
    params: HierarchyParams,
    levels: Vec<LevelStatistics>,
}

impl LevelHierarchy {
    /// Creates a hierarchy holding only level 0.
    ///
    /// # Errors
    /// `MlmcError::Config` if level 0 has no representable resolution.
    pub fn new(schedule: ResolutionSchedule, params: HierarchyParams) -> Result<Self, MlmcError> {
        let mut hierarchy = Self {
            schedule,
            params,
            levels: Vec::with_capacity(params.max_levels),
        };
        hierarchy.push_level()?;
        Ok(hierarchy)
    }

    /// Creates a hierarchy from a validated configuration.
    ///
    /// # Errors
    /// `MlmcError::Config` if the configuration is invalid.
    pub fn from_config(config: &MlmcConfig) -> Result<Self, MlmcError> {
        config.validate()?;
        Self::new(config.schedule()?, HierarchyParams::from_config(config))
    }

    /// Resolution schedule.
    #[inline]
    pub fn schedule(&self) -> &ResolutionSchedule {
        &self.schedule
    }

    /// Hierarchy parameters.
    #[inline]
    pub fn params(&self) -> &HierarchyParams {
        &self.params
    }

    /// All levels in order.
    #[inline]
    pub fn levels(&self) -> &[LevelStatistics] {
        &self.levels
    }

    /// Number of levels `L + 1`.
    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Always `false`: level 0 exists from construction.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Index `L` of the finest level.
    #[inline]
    pub fn finest_level(&self) -> usize {
        self.levels.len() - 1
    }

    /// Total retained samples across levels.
    pub fn total_samples(&self) -> u64 {
        self.levels.iter().map(LevelStatistics::count).sum()
    }

    /// Total nominal work across levels.
    pub fn total_cost(&self) -> f64 {
        self.levels.iter().map(LevelStatistics::nominal_cost).sum()
    }

    /// Whether another level fits under `max_levels`.
    #[inline]
    pub fn can_add_level(&self) -> bool {
        self.levels.len() < self.params.max_levels
    }

    /// Appends level `L + 1` and returns its index.
    ///
    /// # Errors
    /// `MlmcError::LevelBoundExceeded` when the hierarchy is full.
    pub fn add_level(&mut self) -> Result<usize, MlmcError> {
        if !self.can_add_level() {
            return Err(MlmcError::LevelBoundExceeded {
                max_levels: self.params.max_levels,
                bias: self.bias_estimate(),
            });
        }
        self.push_level()
    }

    fn push_level(&mut self) -> Result<usize, MlmcError> {
        let level = self.levels.len();
        let overflow = || {
            MlmcError::Config(ConfigError::InvalidParameter {
                name: "max_levels",
                reason: format!("resolution of level {} overflows", level),
            })
        };
        let resolution = self.schedule.resolution(level).ok_or_else(overflow)?;
        let cost = self.schedule.nominal_cost(level).ok_or_else(overflow)?;
        self.levels.push(LevelStatistics::new(level, resolution, cost));
        debug!(level, resolution, cost, "Level added");
        Ok(level)
    }

    /// Folds a sampled batch into its level.
    ///
    /// # Errors
    ///
    /// `MlmcError::InvalidBatch` if the level does not exist or the batch
    /// does not start at the level's next unused sample index.
    pub fn update_statistics(&mut self, batch: LevelBatch) -> Result<(), MlmcError> {
        let level = batch.level;
        let stats = self.levels.get_mut(level).ok_or_else(|| MlmcError::InvalidBatch {
            level,
            reason: "level does not exist".to_string(),
        })?;
        if batch.start_index != stats.next_index() {
            return Err(MlmcError::InvalidBatch {
                level,
                reason: format!(
                    "batch starts at index {} but the next unused index is {}",
                    batch.start_index,
                    stats.next_index()
                ),
            });
        }
        stats.absorb(batch);
        Ok(())
    }

    /// Current estimates of `alpha`, `beta` and `gamma`.
    pub fn rates(&self) -> RateEstimates {
        fit_rates(&self.levels, self.schedule.factor(), self.params.rates)
    }

    /// Absolute means and variances with the geometric-decay floor applied
    /// to levels `l >= 2`.
    fn regularised(&self, rates: &RateEstimates) -> (Vec<f64>, Vec<f64>) {
        let m = self.schedule.factor() as f64;
        let mean_decay = m.powf(rates.alpha);
        let var_decay = m.powf(rates.beta);

        let mut means: Vec<f64> = Vec::with_capacity(self.levels.len());
        let mut variances: Vec<f64> = Vec::with_capacity(self.levels.len());
        for (l, stats) in self.levels.iter().enumerate() {
            let (mut mean, mut var) = (stats.mean().abs(), stats.variance());
            if l >= 2 {
                mean = mean.max(0.5 * means[l - 1] / mean_decay);
                var = var.max(0.5 * variances[l - 1] / var_decay);
            }
            means.push(mean);
            variances.push(var);
        }
        (means, variances)
    }

    fn bias_from(&self, means: &[f64], rates: &RateEstimates) -> f64 {
        let finest = self.finest_level();
        if finest == 0 {
            return f64::INFINITY;
        }
        let decay = (self.schedule.factor() as f64).powf(rates.alpha);
        let mut bound = means[finest];
        if finest >= 2 {
            bound = bound.max(means[finest - 1] / decay);
        }
        bound / (decay - 1.0)
    }

    /// Estimate of the weak error `|E[P] - E[P_L]|`.
    ///
    /// Uses the finest (regularised) level means and the fitted `alpha`;
    /// infinite while only level 0 exists.
    pub fn bias_estimate(&self) -> f64 {
        let rates = self.rates();
        let (means, _) = self.regularised(&rates);
        self.bias_from(&means, &rates)
    }

    /// Statistical variance `sum V_l / N_l` of the mean estimator.
    pub fn variance_estimate(&self) -> f64 {
        self.levels.iter().map(LevelStatistics::variance_contribution).sum()
    }

    /// Estimated MSE `bias^2 + sum V_l / N_l`.
    pub fn estimated_mse(&self) -> f64 {
        let bias = self.bias_estimate();
        bias * bias + self.variance_estimate()
    }

    /// Telescoped estimate of `E[P_L]`.
    pub fn mean_estimate(&self) -> f64 {
        self.levels.iter().map(LevelStatistics::mean).sum()
    }

    /// Whether the hierarchy must grow before convergence can be declared.
    ///
    /// True while fewer than `min_levels` exist or while
    /// `bias^2 > theta * target_mse`.
    pub fn should_add_level(&self, target_mse: f64) -> bool {
        if self.levels.len() < self.params.min_levels {
            return true;
        }
        let bias = self.bias_estimate();
        bias * bias > self.params.theta * target_mse
    }

    /// Additional samples per level needed to meet `target_mse`.
    ///
    /// Minimises `sum N_l C_l` subject to `sum V_l / N_l <= V*` with
    /// `V* = max(eps^2 - bias^2, (1 - theta) eps^2)`, giving
    /// `N_l = ceil(sqrt(V_l / C_l) * sum_k sqrt(V_k C_k) / V*)`. Unsampled
    /// levels receive at least the warm-up count. A sampled level is floored
    /// at one sample in total, not one additional sample: a sampled level
    /// whose regularised variance is zero asks for nothing more, so the
    /// all-zero allocation that signals convergence stays reachable.
    /// Returned increments are never negative.
    ///
    /// # Errors
    ///
    /// `MlmcError::AllocationDegenerate` if every level has zero variance.
    pub fn optimal_allocation(&self, target_mse: f64) -> Result<Vec<u64>, MlmcError> {
        let rates = self.rates();
        let (means, variances) = self.regularised(&rates);

        let bias = self.bias_from(&means, &rates);
        let bias_sq = if bias.is_finite() { bias * bias } else { 0.0 };
        let variance_budget = (target_mse - bias_sq).max((1.0 - self.params.theta) * target_mse);

        self.allocate(&variances, variance_budget)
            .ok_or_else(|| MlmcError::AllocationDegenerate {
                levels: self.levels.len(),
            })
    }

    /// Additional samples per level bringing `sum s_l^2 / N_l` within `budget`.
    ///
    /// Same cost-optimal rule as [`optimal_allocation`](Self::optimal_allocation)
    /// applied to per-level variances of another functional, such as the
    /// tail indicators at the current VaR. Missing entries count as zero
    /// variance; an all-zero input asks for nothing.
    pub fn tail_allocation(&self, variances: &[f64], budget: f64) -> Vec<u64> {
        let padded: Vec<f64> = (0..self.levels.len())
            .map(|l| variances.get(l).copied().unwrap_or(0.0))
            .collect();
        self.allocate(&padded, budget)
            .unwrap_or_else(|| vec![0; self.levels.len()])
    }

    /// `N_l = ceil(sqrt(V_l / C_l) * sum_k sqrt(V_k C_k) / budget)` less the
    /// current counts; `None` when every `V_l C_l` is zero.
    fn allocate(&self, variances: &[f64], budget: f64) -> Option<Vec<u64>> {
        let weight: f64 = variances
            .iter()
            .zip(&self.levels)
            .map(|(v, stats)| (v * stats.cost_per_sample()).sqrt())
            .sum();
        if !(weight > 0.0) {
            return None;
        }

        Some(
            variances
                .iter()
                .zip(&self.levels)
                .map(|(v, stats)| {
                    let optimal = ((v / stats.cost_per_sample()).sqrt() * weight / budget).ceil();
                    let floor = if stats.count() == 0 {
                        self.params.warm_up_samples
                    } else {
                        1
                    };
                    // Saturating float-to-int conversion.
                    let target = (optimal as u64).max(floor);
                    target.saturating_sub(stats.count())
                })
                .collect(),
        )
    }

    /// Snapshot of every level.
    pub fn summaries(&self) -> Vec<LevelSummary> {
        self.levels
            .iter()
            .map(|l| LevelSummary {
                level: l.level(),
                resolution: l.resolution(),
                samples: l.count(),
                mean: l.mean(),
                variance: l.variance(),
                cost_per_sample: l.cost_per_sample(),
                failed: l.failed(),
                retries: l.retries(),
                nominal_cost: l.nominal_cost(),
                wall_time: l.wall_time(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mlmc_pricing::sampler::LossPair;
    use proptest::prelude::*;

    fn params() -> HierarchyParams {
        HierarchyParams {
            theta: 0.5,
            warm_up_samples: 100,
            min_levels: 2,
            max_levels: 6,
            rates: RateOverrides::default(),
        }
    }

    fn hierarchy() -> LevelHierarchy {
        LevelHierarchy::new(ResolutionSchedule::new(1, 2).unwrap(), params()).unwrap()
    }

    /// Batch whose differences alternate `mean +- spread` around a value.
    fn batch(level: usize, start: u64, n: u64, mean: f64, spread: f64) -> LevelBatch {
        let mut b = LevelBatch::empty(level, start);
        for i in 0..n {
            let y = if i % 2 == 0 { mean + spread } else { mean - spread };
            let pair = if level == 0 {
                LossPair::base(y)
            } else {
                LossPair::coupled(1.0 + y, 1.0)
            };
            b.record(pair);
        }
        b.attempted = n;
        b
    }

    /// Levels with mean 2^-l and spread 2^-l: alpha = beta/2 = 1.
    fn geometric(levels: usize, n: u64) -> LevelHierarchy {
        let mut h = hierarchy();
        for l in 0..levels {
            if l > 0 {
                h.add_level().unwrap();
            }
            let scale = 0.5_f64.powi(l as i32);
            h.update_statistics(batch(l, 0, n, scale, scale)).unwrap();
        }
        h
    }

    #[test]
    fn test_starts_with_level_zero() {
        let h = hierarchy();
        assert_eq!(h.len(), 1);
        assert!(!h.is_empty());
        assert_eq!(h.finest_level(), 0);
        assert_eq!(h.levels()[0].cost_per_sample(), 1.0);
        assert_eq!(h.bias_estimate(), f64::INFINITY);
    }

    #[test]
    fn test_add_level_costs_and_bound() {
        let mut h = hierarchy();
        for expected in 1..6 {
            assert_eq!(h.add_level().unwrap(), expected);
        }
        // Level 3: fine 8 + coarse 4.
        assert_eq!(h.levels()[3].cost_per_sample(), 12.0);
        assert!(!h.can_add_level());
        assert!(matches!(
            h.add_level(),
            Err(MlmcError::LevelBoundExceeded { max_levels: 6, .. })
        ));
    }

    #[test]
    fn test_update_requires_contiguous_indices() {
        let mut h = hierarchy();
        h.update_statistics(batch(0, 0, 10, 1.0, 0.5)).unwrap();
        assert_eq!(h.levels()[0].next_index(), 10);

        let gap = h.update_statistics(batch(0, 20, 10, 1.0, 0.5));
        assert!(matches!(gap, Err(MlmcError::InvalidBatch { level: 0, .. })));

        let missing = h.update_statistics(batch(3, 0, 10, 1.0, 0.5));
        assert!(matches!(missing, Err(MlmcError::InvalidBatch { level: 3, .. })));

        h.update_statistics(batch(0, 10, 10, 1.0, 0.5)).unwrap();
        assert_eq!(h.levels()[0].count(), 20);
    }

    #[test]
    fn test_rates_fit_geometric_decay() {
        let h = geometric(5, 1000);
        let rates = h.rates();
        assert_relative_eq!(rates.alpha, 1.0, epsilon = 1e-9);
        assert_relative_eq!(rates.beta, 2.0, epsilon = 1e-2);
        // Nominal cost 3 * 2^(l-1): gamma = 1.
        assert_relative_eq!(rates.gamma, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rates_default_to_floor_with_one_level() {
        let h = geometric(2, 100);
        let rates = h.rates();
        assert_eq!(rates.alpha, 0.5);
        assert_eq!(rates.beta, 0.5);
        assert_eq!(rates.gamma, 0.5);
    }

    #[test]
    fn test_rate_overrides_honoured() {
        let mut p = params();
        p.rates.alpha = Some(1.5);
        let h = LevelHierarchy::new(ResolutionSchedule::new(1, 2).unwrap(), p).unwrap();
        assert_eq!(h.rates().alpha, 1.5);
    }

    #[test]
    fn test_bias_estimate_geometric() {
        let h = geometric(4, 1000);
        // |m_3| = 1/8, |m_2| / 2 = 1/8, alpha = 1: bias = (1/8) / (2 - 1).
        assert_relative_eq!(h.bias_estimate(), 0.125, epsilon = 1e-9);
    }

    #[test]
    fn test_regularisation_leaves_stored_statistics() {
        let mut h = geometric(3, 1000);
        h.add_level().unwrap();
        // A level 3 whose sampled mean is exactly zero.
        h.update_statistics(batch(3, 0, 1000, 0.0, 0.125)).unwrap();

        assert_eq!(h.levels()[3].mean(), 0.0);
        assert!(h.bias_estimate() > 0.0);
        assert_eq!(h.levels()[3].mean(), 0.0);
    }

    #[test]
    fn test_allocation_warm_up_for_unsampled_level() {
        let mut h = geometric(2, 1000);
        h.add_level().unwrap();
        let alloc = h.optimal_allocation(1e-2).unwrap();
        assert_eq!(alloc.len(), 3);
        assert!(alloc[2] >= 100);
    }

    #[test]
    fn test_allocation_formula() {
        let h = geometric(3, 10);
        let target = 1e-4;
        let alloc = h.optimal_allocation(target).unwrap();

        let rates = h.rates();
        let (means, variances) = h.regularised(&rates);
        let bias = h.bias_from(&means, &rates);
        let budget = (target - bias * bias).max(0.5 * target);
        let weight: f64 = variances
            .iter()
            .zip(h.levels())
            .map(|(v, s)| (v * s.cost_per_sample()).sqrt())
            .sum();
        for (l, stats) in h.levels().iter().enumerate() {
            let n = ((variances[l] / stats.cost_per_sample()).sqrt() * weight / budget).ceil() as u64;
            assert_eq!(alloc[l], n.saturating_sub(10));
        }
        // Achieved variance with the new totals meets the budget.
        let achieved: f64 = variances
            .iter()
            .zip(&alloc)
            .map(|(v, extra)| v / (*extra + 10) as f64)
            .sum();
        assert!(achieved <= budget * (1.0 + 1e-9));
    }

    #[test]
    fn test_sampled_zero_variance_level_asks_for_nothing() {
        let mut h = hierarchy();
        h.update_statistics(batch(0, 0, 50, 1.0, 0.5)).unwrap();
        h.add_level().unwrap();
        h.update_statistics(batch(1, 0, 50, 0.0, 0.0)).unwrap();
        let alloc = h.optimal_allocation(1e-3).unwrap();
        // The one-sample floor is a total, already met by the 50 samples.
        assert_eq!(alloc[1], 0);
        assert!(alloc[0] > 0);

        // With a loose target level 0 is satisfied too, so the run can stop.
        let alloc = h.optimal_allocation(1e3).unwrap();
        assert_eq!(alloc, vec![0, 0]);
    }

    #[test]
    fn test_tail_allocation() {
        let h = geometric(3, 100);
        // Costs 1, 3, 6: weight = sqrt(0.01) + sqrt(3e-4 * 3) + sqrt(1e-4 * 6).
        let variances: [f64; 3] = [0.01, 3e-4, 1e-4];
        let budget = 1e-6;
        let costs = [1.0, 3.0, 6.0];
        let weight: f64 = variances.iter().zip(costs).map(|(v, c)| (v * c).sqrt()).sum();
        let alloc = h.tail_allocation(&variances, budget);
        for l in 0..3 {
            let expected = ((variances[l] / costs[l]).sqrt() * weight / budget).ceil() as u64 - 100;
            assert_eq!(alloc[l], expected, "level {}", l);
        }

        // Short input is padded with zero variance; all zero asks for nothing.
        assert_eq!(h.tail_allocation(&[], 1e-6), vec![0, 0, 0]);
        assert_eq!(h.tail_allocation(&[0.01], 1e3), vec![0, 0, 0]);
    }

    #[test]
    fn test_allocation_degenerate() {
        let mut h = hierarchy();
        h.update_statistics(batch(0, 0, 50, 3.0, 0.0)).unwrap();
        h.add_level().unwrap();
        h.update_statistics(batch(1, 0, 50, 0.0, 0.0)).unwrap();
        assert!(matches!(
            h.optimal_allocation(1e-3),
            Err(MlmcError::AllocationDegenerate { levels: 2 })
        ));
    }

    #[test]
    fn test_should_add_level() {
        let h = geometric(1, 100);
        assert!(h.should_add_level(1.0));

        let h = geometric(4, 1000);
        // bias^2 = 1/64; theta * eps^2 must exceed it to stop.
        assert!(h.should_add_level(1e-2));
        assert!(!h.should_add_level(1.0));
    }

    #[test]
    fn test_estimated_mse_and_summaries() {
        let h = geometric(3, 100);
        let expected_var: f64 = h.levels().iter().map(|l| l.variance() / 100.0).sum();
        let bias = h.bias_estimate();
        assert_relative_eq!(h.estimated_mse(), bias * bias + expected_var, epsilon = 1e-15);
        assert_relative_eq!(h.mean_estimate(), 1.0 + 0.5 + 0.25, epsilon = 1e-12);

        let summaries = h.summaries();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[2].samples, 100);
        assert_eq!(summaries[2].resolution, 4);
        assert_eq!(h.total_samples(), 300);
    }

    proptest! {
        #[test]
        fn prop_allocation_monotone_in_target(
            spreads in proptest::collection::vec(1e-3f64..1.0, 2..5),
            eps2 in 1e-6f64..1e-2,
        ) {
            let mut h = hierarchy();
            for (l, spread) in spreads.iter().enumerate() {
                if l > 0 {
                    h.add_level().unwrap();
                }
                h.update_statistics(batch(l, 0, 64, spread * 0.1, *spread)).unwrap();
            }
            let tight = h.optimal_allocation(eps2).unwrap();
            let loose = h.optimal_allocation(2.0 * eps2).unwrap();
            let tight_total: u64 = tight.iter().sum();
            let loose_total: u64 = loose.iter().sum();
            prop_assert!(loose_total <= tight_total);
            for (a, b) in loose.iter().zip(&tight) {
                prop_assert!(a <= b);
            }
        }
    }
}
