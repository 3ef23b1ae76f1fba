//! MLMC estimation driver.
//!
//! - [`MlmcEstimator`]: the refinement state machine over a rayon pool
//! - [`EstimatorState`] and [`EstimatorPhase`]: run bookkeeping
//! - [`CancellationToken`]: cooperative stop signal

mod cancel;
mod mlmc;
mod state;

pub use cancel::CancellationToken;
pub use mlmc::{run, MlmcEstimator};
pub use state::{EstimatorPhase, EstimatorState};
