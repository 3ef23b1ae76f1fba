//! Collaborator contracts consumed by the loss sampler.

use super::error::SamplingFailure;
use crate::rng::PricerRng;

/// Produces one realisation of the risk-factor randomness.
///
/// `generate` is called once per coupled sample at the **fine** resolution of
/// the level. The resulting draw is then evaluated at both the fine and the
/// coarse resolution, so it must carry enough information to be coarsened
/// (e.g. Brownian increments on the fine grid, or the fine inner path set).
///
/// Implementations must not keep mutable state between calls.
pub trait RandomFactorGenerator: Send + Sync {
    /// Draw type shared by the fine and coarse evaluation.
    type Draw: Send;

    /// Generates a draw at `resolution` from the given generator.
    fn generate(&self, rng: &mut PricerRng, resolution: usize) -> Self::Draw;
}

/// Side-effect-free map from (draw, resolution) to portfolio loss.
///
/// Must be safe for concurrent invocation: workers evaluate samples in
/// parallel against a shared reference.
pub trait PortfolioLossFunction<D>: Send + Sync {
    /// Portfolio loss of `draw` evaluated at `resolution`.
    ///
    /// # Errors
    ///
    /// `SamplingFailure` when the evaluation is numerically impossible; the
    /// sampler will retry with a fresh draw.
    fn loss(&self, draw: &D, resolution: usize) -> Result<f64, SamplingFailure>;
}

/// Adapter turning a closure into a [`PortfolioLossFunction`].
///
/// # Examples
///
/// ```rust
/// use mlmc_pricing::sampler::{LossFn, PortfolioLossFunction};
///
/// let loss = LossFn(|draw: &Vec<f64>, resolution: usize| {
///     Ok(draw.iter().take(resolution).sum::<f64>())
/// });
/// assert_eq!(loss.loss(&vec![1.0, 2.0, 3.0], 2).unwrap(), 3.0);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct LossFn<F>(pub F);

impl<D, F> PortfolioLossFunction<D> for LossFn<F>
where
    F: Fn(&D, usize) -> Result<f64, SamplingFailure> + Send + Sync,
{
    #[inline]
    fn loss(&self, draw: &D, resolution: usize) -> Result<f64, SamplingFailure> {
        (self.0)(draw, resolution)
    }
}

impl<D, L> PortfolioLossFunction<D> for &L
where
    L: PortfolioLossFunction<D> + ?Sized,
{
    #[inline]
    fn loss(&self, draw: &D, resolution: usize) -> Result<f64, SamplingFailure> {
        (**self).loss(draw, resolution)
    }
}
