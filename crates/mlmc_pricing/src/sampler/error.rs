//! Error types for loss sampling.

use thiserror::Error;

/// A single coupled sample could not be produced.
///
/// Transient by contract: the sampler retries with a fresh seed before
/// counting the sample as failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplingFailure {
    /// The portfolio loss function could not evaluate the draw.
    #[error("Loss evaluation failed at resolution {resolution}: {message}")]
    Evaluation {
        /// Resolution being evaluated.
        resolution: usize,
        /// Description of the failure.
        message: String,
    },

    /// The loss function returned NaN or an infinity.
    #[error("Non-finite loss {value} at resolution {resolution}")]
    NonFinite {
        /// Resolution being evaluated.
        resolution: usize,
        /// Offending value.
        value: f64,
    },

    /// The draw cannot be evaluated at the requested resolution.
    #[error("Draw generated at resolution {draw} cannot be evaluated at resolution {requested}")]
    IncompatibleResolution {
        /// Resolution the draw was generated at.
        draw: usize,
        /// Requested evaluation resolution.
        requested: usize,
    },

    /// The resolution of a level does not fit in `usize`.
    #[error("Resolution of level {level} overflows")]
    ResolutionOverflow {
        /// Level index.
        level: usize,
    },
}

impl SamplingFailure {
    /// Shorthand for [`SamplingFailure::Evaluation`].
    pub fn evaluation(resolution: usize, message: impl Into<String>) -> Self {
        Self::Evaluation {
            resolution,
            message: message.into(),
        }
    }
}

/// Invalid resolution schedule parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// Base resolution must be at least 1.
    #[error("Invalid base resolution {0}: must be >= 1")]
    InvalidBase(usize),

    /// Refinement factor must be at least 2.
    #[error("Invalid refinement factor {0}: must be >= 2")]
    InvalidFactor(usize),
}
