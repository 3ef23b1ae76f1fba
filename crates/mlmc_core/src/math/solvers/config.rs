//! Stopping rule of the bracketing solvers.

use num_traits::Float;

use crate::types::SolverError;

/// When a bracketing solver stops.
///
/// A bracket with midpoint `m` has converged once its half-width is at most
/// `tolerance * max(1, |m|)`, an absolute width near zero and a relative one
/// for large roots. The solver gives up after `max_iterations` halvings.
///
/// # Example
///
/// ```
/// use mlmc_core::math::solvers::SolverConfig;
///
/// let config = SolverConfig::new(1e-12, 300).unwrap();
/// assert_eq!(config.max_iterations(), 300);
/// assert!(config.converged(1e-13, 0.5));
/// assert!(!config.converged(1e-11, 1.0));
/// assert!(config.converged(1e-11, 100.0));
///
/// assert!(SolverConfig::new(0.0, 300).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig<T: Float> {
    tolerance: T,
    max_iterations: usize,
}

impl<T: Float> Default for SolverConfig<T> {
    /// Tolerance 1e-10 (the type's epsilon if coarser), 200 iterations.
    fn default() -> Self {
        Self {
            tolerance: T::from(1e-10).unwrap_or_else(T::epsilon).max(T::epsilon()),
            max_iterations: 200,
        }
    }
}

impl<T: Float> SolverConfig<T> {
    /// Stopping rule with the given bracket tolerance and iteration cap.
    ///
    /// # Errors
    ///
    /// `SolverError::InvalidConfig` unless `tolerance` is positive and finite
    /// and `max_iterations` is non-zero.
    pub fn new(tolerance: T, max_iterations: usize) -> Result<Self, SolverError> {
        if !(tolerance > T::zero() && tolerance.is_finite()) {
            return Err(SolverError::InvalidConfig(format!(
                "tolerance must be positive and finite, got {}",
                tolerance.to_f64().unwrap_or(f64::NAN)
            )));
        }
        if max_iterations == 0 {
            return Err(SolverError::InvalidConfig("max_iterations must be non-zero".to_string()));
        }
        Ok(Self {
            tolerance,
            max_iterations,
        })
    }

    /// Bracket tolerance.
    #[inline]
    pub fn tolerance(&self) -> T {
        self.tolerance
    }

    /// Iteration cap.
    #[inline]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Whether a bracket of `half_width` around `mid` is narrow enough.
    #[inline]
    pub fn converged(&self, half_width: T, mid: T) -> bool {
        half_width <= self.tolerance * mid.abs().max(T::one())
    }
}
