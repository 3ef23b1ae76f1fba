//! Geometric resolution schedule of the level hierarchy.

use super::error::ScheduleError;

/// Resolution of level `l` is `base * factor^l`.
///
/// The resolution is model specific: Euler/Milstein time steps for path
/// models, inner path count for nested repricing models.
///
/// # Examples
///
/// ```rust
/// use mlmc_pricing::sampler::ResolutionSchedule;
///
/// let schedule = ResolutionSchedule::new(4, 2).unwrap();
/// assert_eq!(schedule.resolution(0), Some(4));
/// assert_eq!(schedule.resolution(3), Some(32));
/// assert_eq!(schedule.coarse_resolution(3), Some(16));
/// assert_eq!(schedule.coarse_resolution(0), None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolutionSchedule {
    base: usize,
    factor: usize,
}

impl ResolutionSchedule {
    /// Creates a schedule.
    ///
    /// # Errors
    ///
    /// `base` must be >= 1 and `factor` >= 2.
    pub fn new(base: usize, factor: usize) -> Result<Self, ScheduleError> {
        if base == 0 {
            return Err(ScheduleError::InvalidBase(base));
        }
        if factor < 2 {
            return Err(ScheduleError::InvalidFactor(factor));
        }
        Ok(Self { base, factor })
    }

    /// Resolution of level 0.
    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Refinement factor `M` between consecutive levels.
    #[inline]
    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Resolution of `level`, or `None` on overflow.
    pub fn resolution(&self, level: usize) -> Option<usize> {
        let exponent = u32::try_from(level).ok()?;
        self.factor
            .checked_pow(exponent)
            .and_then(|m| m.checked_mul(self.base))
    }

    /// Resolution of the coarse partner of `level` (`None` for level 0).
    pub fn coarse_resolution(&self, level: usize) -> Option<usize> {
        level.checked_sub(1).and_then(|l| self.resolution(l))
    }

    /// Nominal work units of one coupled sample: fine plus coarse resolution.
    ///
    /// Used as the per-sample cost `C_l`. Being a pure function of the level,
    /// it keeps the sample allocation reproducible.
    pub fn nominal_cost(&self, level: usize) -> Option<f64> {
        let fine = self.resolution(level)?;
        let coarse = self.coarse_resolution(level).unwrap_or(0);
        Some((fine + coarse) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameters() {
        assert_eq!(
            ResolutionSchedule::new(0, 2),
            Err(ScheduleError::InvalidBase(0))
        );
        assert_eq!(
            ResolutionSchedule::new(1, 1),
            Err(ScheduleError::InvalidFactor(1))
        );
    }

    #[test]
    fn test_nominal_cost() {
        let schedule = ResolutionSchedule::new(1, 4).unwrap();
        assert_eq!(schedule.nominal_cost(0), Some(1.0));
        assert_eq!(schedule.nominal_cost(2), Some(20.0));
    }

    #[test]
    fn test_overflow_is_none() {
        let schedule = ResolutionSchedule::new(3, 2).unwrap();
        assert_eq!(schedule.resolution(200), None);
        assert_eq!(schedule.nominal_cost(200), None);
    }
}
