//! Coupled multilevel loss sampling.
//!
//! This module provides:
//! - [`RandomFactorGenerator`] and [`PortfolioLossFunction`]: the collaborator
//!   contracts supplied by the caller
//! - [`LossSampler`]: produces (fine, coarse) loss pairs from a shared draw
//! - [`ResolutionSchedule`]: geometric resolution per level
//! - [`LevelBatch`]: ordered, parallel batch accumulation
//!
//! Seeds are a pure function of `(base seed, level, index, attempt)`, so the
//! batches produced here do not depend on the size of the rayon pool.

mod batch;
mod error;
mod loss_sampler;
mod resolution;
mod traits;

pub use batch::{LevelBatch, LossPair, DEFAULT_BATCH_SIZE};
pub use error::{SamplingFailure, ScheduleError};
pub use loss_sampler::{LossSampler, RetryPolicy, SampleOutcome};
pub use resolution::ResolutionSchedule;
pub use traits::{LossFn, PortfolioLossFunction, RandomFactorGenerator};
