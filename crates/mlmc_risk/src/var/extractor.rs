//! Quantile inversion of the multilevel tail-probability estimator.
//!
//! The tail probability `P(L > x)` is estimated by applying the telescoping
//! sum to indicator functions of the retained loss pairs:
//!
//! ```text
//! G(x) = sum_l (1/N_l) sum_i [1(fine_i > x) - 1(coarse_i > x)]
//! ```
//!
//! with no coarse term on level 0. `VaR_alpha` solves `G(x) = 1 - alpha`.
//! The counts are read off sorted copies of the losses, so evaluating `G`
//! costs `O(L log N)`.

use mlmc_core::math::distributions::{norm_pdf, two_sided_critical_value};
use mlmc_core::math::solvers::{BisectionSolver, SolverConfig};
use mlmc_pricing::sampler::LossPair;
use tracing::debug;

use super::estimate::ConfidenceInterval;
use crate::config::MlmcConfig;
use crate::error::MlmcError;
use crate::hierarchy::LevelStatistics;

/// Relative bracket tolerance of the quantile bisection.
const QUANTILE_TOLERANCE: f64 = 1e-12;

/// Iteration cap of the quantile bisection.
const QUANTILE_MAX_ITERATIONS: usize = 200;

/// Prior weight of the straddle-probability floor `STRADDLE_PRIOR / (n + 1)`.
///
/// With no observed indicator change in `n` pairs this is the Jeffreys
/// estimate `(0 + 1/2) / (n + 1)` of the straddle probability.
const STRADDLE_PRIOR: f64 = 0.5;

/// Kernel support in bandwidths; contributions beyond it are below 1e-14.
const KERNEL_RADIUS: f64 = 8.0;

/// Tail-reliability settings of the extraction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TailSettings {
    /// Confidence level of the VaR interval.
    pub ci_level: f64,
    /// Minimum finest-level losses beyond the VaR.
    pub min_tail_samples: u64,
    /// Optional upper bound on the interval width.
    pub max_interval_width: Option<f64>,
    /// Whether Expected Shortfall is computed.
    pub expected_shortfall: bool,
    /// Weak decay rate used to extrapolate the quantile bias; `None` omits it.
    pub weak_rate: Option<f64>,
    /// Resolution ratio `M` between consecutive levels.
    pub refinement_factor: usize,
}

impl TailSettings {
    /// Extracts the tail settings of a configuration.
    ///
    /// The weak rate is the configured override, if any; the estimator
    /// replaces it with the fitted rate.
    pub fn from_config(config: &MlmcConfig) -> Self {
        Self {
            ci_level: config.ci_level(),
            min_tail_samples: config.min_tail_samples(),
            max_interval_width: config.max_interval_width(),
            expected_shortfall: config.expected_shortfall(),
            weak_rate: config.rates().alpha,
            refinement_factor: config.refinement_factor(),
        }
    }
}

impl Default for TailSettings {
    fn default() -> Self {
        Self {
            ci_level: 0.95,
            min_tail_samples: 10,
            max_interval_width: None,
            expected_shortfall: true,
            weak_rate: None,
            refinement_factor: 2,
        }
    }
}

/// Tail quantities extracted at one confidence level.
#[derive(Clone, Debug, PartialEq)]
pub struct TailEstimate {
    /// Value-at-Risk.
    pub var: f64,
    /// Interval around the VaR.
    pub confidence_interval: Option<ConfidenceInterval>,
    /// Expected Shortfall, when enabled.
    pub expected_shortfall: Option<f64>,
    /// Finest level holding samples.
    pub tail_level: usize,
    /// Finest-level fine losses strictly above the VaR.
    pub tail_samples: u64,
    /// Level-0 losses strictly above the VaR.
    pub level_zero_tail_samples: u64,
    /// Suggested remedy when the interval is unavailable.
    pub recommendation: Option<String>,
}

/// Exceedance count of the finest sampled level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelExceedances {
    /// Level index in the hierarchy.
    pub level: usize,
    /// Fine losses strictly above the threshold.
    pub exceedances: u64,
    /// Pairs held by the level.
    pub samples: u64,
}

#[derive(Clone, Debug)]
struct LevelTail<'a> {
    index: usize,
    pairs: &'a [LossPair],
    fine: Vec<f64>,
    coarse: Vec<f64>,
}

impl LevelTail<'_> {
    fn n(&self) -> f64 {
        self.pairs.len() as f64
    }

    /// Mean and floored sample variance of `1(fine > x) - 1(coarse > x)`.
    fn indicator_moments(&self, x: f64) -> (f64, f64) {
        let n = self.n();
        let (mut sum, mut sum_sq) = (0.0, 0.0);
        for pair in self.pairs {
            let fine = f64::from(u8::from(pair.fine > x));
            let coarse = f64::from(u8::from(pair.coarse.is_some_and(|c| c > x)));
            let d = fine - coarse;
            sum += d;
            sum_sq += d * d;
        }
        let mean = sum / n;
        let floor = STRADDLE_PRIOR / (n + 1.0);
        if self.pairs.len() < 2 {
            return (mean, floor);
        }
        let variance = (n / (n - 1.0)) * (sum_sq / n - mean * mean);
        (mean, variance.max(floor))
    }
}

/// Number of values in an ascending slice strictly greater than `x`.
#[inline]
fn count_above(sorted: &[f64], x: f64) -> usize {
    sorted.len() - sorted.partition_point(|&v| v <= x)
}

/// Values of an ascending slice inside `[lo, hi]`.
#[inline]
fn window(sorted: &[f64], lo: f64, hi: f64) -> &[f64] {
    let start = sorted.partition_point(|&v| v < lo);
    let end = sorted.partition_point(|&v| v <= hi);
    &sorted[start..end.max(start)]
}

/// Silverman's rule-of-thumb bandwidth of an ascending sample.
fn silverman_bandwidth(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mean = sorted.iter().sum::<f64>() / nf;
    let sd = (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (nf - 1.0)).sqrt();
    let iqr = (sorted[(3 * (n - 1)) / 4] - sorted[(n - 1) / 4]) / 1.34;
    let spread = match (sd > 0.0, iqr > 0.0) {
        (true, true) => sd.min(iqr),
        (true, false) => sd,
        (false, true) => iqr,
        (false, false) => return None,
    };
    let h = 0.9 * spread * nf.powf(-0.2);
    (h > 0.0 && h.is_finite()).then_some(h)
}

/// Multilevel VaR and Expected Shortfall extractor.
///
/// # Examples
///
/// ```rust
/// use mlmc_pricing::sampler::LossPair;
/// use mlmc_risk::var::VarExtractor;
///
/// // Level 0 only: losses 1..=100.
/// let pairs: Vec<LossPair> = (1..=100).map(|i| LossPair::base(i as f64)).collect();
/// let extractor = VarExtractor::from_pairs([pairs.as_slice()]);
///
/// assert_eq!(extractor.tail_probability(90.0), 0.10);
/// let var = extractor.quantile(0.95).unwrap();
/// // G steps from 0.06 to 0.05 at the loss 95.
/// assert!((var - 95.0).abs() < 1e-6);
/// ```
#[derive(Clone, Debug)]
pub struct VarExtractor<'a> {
    levels: Vec<LevelTail<'a>>,
    n_levels: usize,
    lo: f64,
    hi: f64,
}

impl<'a> VarExtractor<'a> {
    /// Builds an extractor from the retained pairs of every level, in level order.
    ///
    /// Levels without retained samples are skipped but keep their index.
    pub fn from_pairs<I>(levels: I) -> Self
    where
        I: IntoIterator<Item = &'a [LossPair]>,
    {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        let mut n_levels = 0;
        let levels: Vec<LevelTail<'a>> = levels
            .into_iter()
            .enumerate()
            .inspect(|_| n_levels += 1)
            .filter(|(_, pairs)| !pairs.is_empty())
            .map(|(index, pairs)| {
                let mut fine: Vec<f64> = pairs.iter().map(|p| p.fine).collect();
                let mut coarse: Vec<f64> = pairs.iter().filter_map(|p| p.coarse).collect();
                fine.sort_by(f64::total_cmp);
                coarse.sort_by(f64::total_cmp);
                for sorted in [&fine, &coarse] {
                    if let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) {
                        lo = lo.min(first);
                        hi = hi.max(last);
                    }
                }
                LevelTail {
                    index,
                    pairs,
                    fine,
                    coarse,
                }
            })
            .collect();
        Self {
            levels,
            n_levels,
            lo,
            hi,
        }
    }

    /// Builds an extractor from the hierarchy's levels.
    pub fn from_levels(levels: &'a [LevelStatistics]) -> Self {
        Self::from_pairs(levels.iter().map(LevelStatistics::pairs))
    }

    /// Whether no samples are available.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Smallest and largest retained loss.
    pub fn loss_range(&self) -> Option<(f64, f64)> {
        (!self.is_empty()).then_some((self.lo, self.hi))
    }

    /// Multilevel estimate `G(x)` of `P(L > x)`.
    pub fn tail_probability(&self, x: f64) -> f64 {
        self.levels
            .iter()
            .map(|level| {
                let above = count_above(&level.fine, x) as f64 - count_above(&level.coarse, x) as f64;
                above / level.n()
            })
            .sum()
    }

    /// Per-level variances of the indicator differences at `x`, indexed by level.
    ///
    /// A level with `n` pairs is credited at least `0.5 / (n + 1)`, so a
    /// level where no pair straddles `x` still counts. Levels without
    /// samples report zero.
    pub fn indicator_variances(&self, x: f64) -> Vec<f64> {
        let mut variances = vec![0.0; self.n_levels];
        for level in &self.levels {
            variances[level.index] = level.indicator_moments(x).1;
        }
        variances
    }

    /// Standard error of `G(x)`: `sqrt(sum_l s_l^2 / N_l)` over the floored
    /// indicator variances.
    pub fn tail_standard_error(&self, x: f64) -> f64 {
        self.levels
            .iter()
            .map(|level| level.indicator_moments(x).1 / level.n())
            .sum::<f64>()
            .sqrt()
    }

    /// Multilevel Gaussian-kernel estimate of the loss density at `x`.
    ///
    /// Applies the telescoping sum to kernel evaluations, with the
    /// Silverman bandwidth of the level-0 losses shared by every level.
    /// `None` when the bandwidth or the density is not positive.
    pub fn density(&self, x: f64) -> Option<f64> {
        let h = silverman_bandwidth(&self.levels.first()?.fine)?;
        let (lo, hi) = (x - KERNEL_RADIUS * h, x + KERNEL_RADIUS * h);
        let kernel_sum = |sorted: &[f64]| -> f64 {
            window(sorted, lo, hi).iter().map(|&v| norm_pdf((x - v) / h)).sum()
        };
        let density: f64 = self
            .levels
            .iter()
            .map(|level| (kernel_sum(&level.fine) - kernel_sum(&level.coarse)) / (level.n() * h))
            .sum();
        (density > 0.0 && density.is_finite()).then_some(density)
    }

    /// Bias of `G(x)` extrapolated from the finest correction level:
    /// `|mean_L| / (M^alpha - 1)`, zero without a weak rate or correction level.
    fn tail_bias(&self, x: f64, settings: &TailSettings) -> f64 {
        let Some(alpha) = settings.weak_rate else {
            return 0.0;
        };
        match self.levels.last() {
            Some(level) if level.index > 0 => {
                let growth = (settings.refinement_factor as f64).powf(alpha) - 1.0;
                let (mean, _) = level.indicator_moments(x);
                if growth > 0.0 {
                    mean.abs() / growth
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    /// Level-0 fine losses strictly above `x`.
    pub fn level_zero_exceedances(&self, x: f64) -> u64 {
        self.levels
            .first()
            .filter(|level| level.index == 0)
            .map_or(0, |level| count_above(&level.fine, x) as u64)
    }

    /// Fine losses strictly above `x` on the finest sampled level.
    pub fn finest_exceedances(&self, x: f64) -> Option<LevelExceedances> {
        self.levels.last().map(|level| LevelExceedances {
            level: level.index,
            exceedances: count_above(&level.fine, x) as u64,
            samples: level.pairs.len() as u64,
        })
    }

    /// Solves `G(x) = target` by bisection over the retained loss range.
    ///
    /// Below every retained loss `G = 1`, at the largest loss `G = 0`, so any
    /// `target` in `(0, 1)` is bracketed.
    fn invert(&self, target: f64) -> Result<f64, MlmcError> {
        let (lo, hi) = self.loss_range().ok_or_else(|| MlmcError::InsufficientTailSamples {
            tail_samples: 0,
            reason: "no retained samples".to_string(),
            recommendation: "sample at least one level before extracting the VaR".to_string(),
        })?;
        let pad = (hi - lo).max(lo.abs()).max(1.0) * 1e-9;
        let solver = BisectionSolver::new(SolverConfig::new(QUANTILE_TOLERANCE, QUANTILE_MAX_ITERATIONS)?);
        solver
            .find_root(|x| self.tail_probability(x) - target, lo - pad, hi)
            .map_err(MlmcError::from)
    }

    /// Point VaR: the loss level exceeded with probability `1 - alpha`.
    ///
    /// # Errors
    ///
    /// `MlmcError::InsufficientTailSamples` without samples, `MlmcError::Solver`
    /// if the bisection fails.
    pub fn quantile(&self, alpha: f64) -> Result<f64, MlmcError> {
        self.invert(1.0 - alpha)
    }

    /// Expected Shortfall given the VaR.
    ///
    /// Integrates the corrected tail CDF exactly:
    /// `VaR + (1/(1-alpha)) sum_l mean((fine - VaR)^+ - (coarse - VaR)^+)`.
    pub fn expected_shortfall(&self, alpha: f64, var: f64) -> f64 {
        let excess: f64 = self
            .levels
            .iter()
            .map(|level| {
                let total: f64 = level
                    .pairs
                    .iter()
                    .map(|p| (p.fine - var).max(0.0) - p.coarse.map_or(0.0, |c| (c - var).max(0.0)))
                    .sum();
                total / level.n()
            })
            .sum();
        var + excess / (1.0 - alpha)
    }

    /// VaR with confidence interval, tail check and optional Expected Shortfall.
    ///
    /// The interval lives on the loss axis. The standard error of `G` at the
    /// VaR is mapped through the density (`se_x = se_G / f(VaR)`) and the
    /// extrapolated bias of `G` is added the same way:
    /// `VaR +- (z se_x + bias_G / f(VaR))`.
    ///
    /// # Errors
    ///
    /// `MlmcError::InsufficientTailSamples` when fewer than
    /// `min_tail_samples` finest-level losses exceed the VaR, when the lower
    /// probability bound `1 - alpha - z se_G` is not positive, when the
    /// density at the VaR cannot be estimated, or when the interval is wider
    /// than `max_interval_width`. `MlmcError::Solver` or
    /// `MlmcError::Statistics` if the inversion or critical value fails.
    pub fn estimate_var(&self, alpha: f64, settings: &TailSettings) -> Result<TailEstimate, MlmcError> {
        let p = 1.0 - alpha;
        let var = self.quantile(alpha)?;
        let finest = self.finest_exceedances(var).unwrap_or(LevelExceedances {
            level: 0,
            exceedances: 0,
            samples: 0,
        });
        let tail_samples = finest.exceedances;
        let recommended = (settings.min_tail_samples as f64 / p).ceil() as u64;
        let thin_tail = |reason: String| MlmcError::InsufficientTailSamples {
            tail_samples,
            reason,
            recommendation: format!(
                "draw at least {} samples on level {} (currently {}) or lower the confidence level",
                recommended.max(2 * finest.samples),
                finest.level,
                finest.samples
            ),
        };

        if tail_samples < settings.min_tail_samples {
            return Err(thin_tail(format!(
                "{} required beyond the VaR on level {}",
                settings.min_tail_samples, finest.level
            )));
        }

        let z = two_sided_critical_value(settings.ci_level)?;
        let tail_se = self.tail_standard_error(var);
        if p - z * tail_se <= 0.0 {
            return Err(thin_tail(format!(
                "tail probability {:.3e} is within {:.2} standard errors of zero",
                p, z
            )));
        }
        let density = self
            .density(var)
            .ok_or_else(|| thin_tail("loss density at the VaR is not positive".to_string()))?;

        let standard_error = tail_se / density;
        let bias = self.tail_bias(var, settings) / density;
        let half_width = z * standard_error + bias;
        let interval = ConfidenceInterval {
            lower: var - half_width,
            upper: var + half_width,
            level: settings.ci_level,
            standard_error,
            tail_standard_error: tail_se,
            density,
            bias,
        };
        if let Some(limit) = settings.max_interval_width {
            if interval.width() > limit {
                return Err(thin_tail(format!(
                    "interval width {:.3e} exceeds the limit {:.3e}",
                    interval.width(),
                    limit
                )));
            }
        }

        let expected_shortfall = settings
            .expected_shortfall
            .then(|| self.expected_shortfall(alpha, var));
        let level_zero_tail_samples = self.level_zero_exceedances(var);
        debug!(
            var,
            standard_error,
            bias,
            density,
            tail_samples,
            level_zero_tail_samples,
            "VaR extracted"
        );

        Ok(TailEstimate {
            var,
            confidence_interval: Some(interval),
            expected_shortfall,
            tail_level: finest.level,
            tail_samples,
            level_zero_tail_samples,
            recommendation: None,
        })
    }
}
