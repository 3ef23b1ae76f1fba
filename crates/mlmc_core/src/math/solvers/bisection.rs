//! Bisection root-finding solver.

use super::SolverConfig;
use crate::types::SolverError;
use num_traits::Float;

/// Bisection root finder.
///
/// Halves a sign-changing bracket until its half-width drops below the
/// configured tolerance. Only the sign of `f` is inspected, so the method
/// converges for any function with a valid bracket, including monotone step
/// functions (empirical CDFs) where secant or interpolation steps are useless.
///
/// The iteration is a pure function of `f` and the bracket: identical inputs
/// always produce a bit-identical root.
///
/// # Example
///
/// ```
/// use mlmc_core::math::solvers::{BisectionSolver, SolverConfig};
///
/// let solver = BisectionSolver::new(SolverConfig::default());
///
/// // Solve x³ - x - 2 = 0 in bracket [1, 2]
/// let f = |x: f64| x * x * x - x - 2.0;
///
/// let root = solver.find_root(f, 1.0, 2.0).unwrap();
/// assert!(f(root).abs() < 1e-8);
/// ```
#[derive(Debug, Clone)]
pub struct BisectionSolver<T: Float> {
    config: SolverConfig<T>,
}

impl<T: Float> BisectionSolver<T> {
    /// Create a new bisection solver with the given configuration.
    pub fn new(config: SolverConfig<T>) -> Self {
        Self { config }
    }

    /// Find a root of `f` in the bracket `[a, b]`.
    ///
    /// Requires that `f(a)` and `f(b)` do not have the same strict sign.
    /// The endpoints may be given in either order.
    ///
    /// # Returns
    ///
    /// * `Ok(x)` - Midpoint of the final bracket, or a point where `f(x) == 0`
    /// * `Err(SolverError::NoBracket)` - `f(a)` and `f(b)` have same sign
    /// * `Err(SolverError::NumericalInstability)` - `f` returned NaN
    /// * `Err(SolverError::MaxIterationsExceeded)` - Bracket still too wide
    pub fn find_root<F>(&self, f: F, a: T, b: T) -> Result<T, SolverError>
    where
        F: Fn(T) -> T,
    {
        let (mut lo, mut hi) = if a <= b { (a, b) } else { (b, a) };
        let mut f_lo = f(lo);
        let f_hi = f(hi);

        if f_lo.is_nan() || f_hi.is_nan() {
            return Err(SolverError::NumericalInstability(
                "objective returned NaN at bracket endpoint".to_string(),
            ));
        }
        if f_lo == T::zero() {
            return Ok(lo);
        }
        if f_hi == T::zero() {
            return Ok(hi);
        }
        if f_lo.signum() == f_hi.signum() {
            return Err(SolverError::NoBracket {
                a: lo.to_f64().unwrap_or(f64::NAN),
                b: hi.to_f64().unwrap_or(f64::NAN),
            });
        }

        let two = T::one() + T::one();

        for _iteration in 0..self.config.max_iterations() {
            let half_width = (hi - lo) / two;
            let mid = lo + half_width;

            if self.config.converged(half_width, mid) {
                return Ok(mid);
            }

            let f_mid = f(mid);
            if f_mid.is_nan() {
                return Err(SolverError::NumericalInstability(
                    "objective returned NaN inside bracket".to_string(),
                ));
            }
            if f_mid == T::zero() {
                return Ok(mid);
            }

            if f_mid.signum() == f_lo.signum() {
                lo = mid;
                f_lo = f_mid;
            } else {
                hi = mid;
            }
        }

        Err(SolverError::MaxIterationsExceeded {
            iterations: self.config.max_iterations(),
        })
    }
}
