//! Level hierarchy management.
//!
//! - [`LevelStatistics`]: append-only statistics of one level
//! - [`LevelHierarchy`]: level creation, optimal sample allocation, bias test
//! - [`RateEstimates`]: regression of the decay rates `alpha`, `beta`, `gamma`

mod level;
mod manager;
mod rates;

pub use level::LevelStatistics;
pub use manager::{HierarchyParams, LevelHierarchy};
pub use rates::{RateEstimates, RATE_FLOOR};
