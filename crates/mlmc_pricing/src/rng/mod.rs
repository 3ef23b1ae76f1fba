//! # Random Number Generation Infrastructure
//!
//! Random number generation for multilevel loss sampling.
//!
//! ## Design Rationale
//!
//! - **Reproducibility**: every sample owns a generator seeded from
//!   `(base seed, level, sample index, attempt)`, so results do not depend on
//!   how samples are distributed over worker threads
//! - **Efficiency**: zero-allocation batch operations via `&mut [f64]` slices
//! - **Static dispatch**: no `Box<dyn Trait>` in hot paths
//!
//! ## Module Structure
//!
//! - [`prng`]: Pseudo-random number generator wrapper with seed management
//! - [`seed`]: Stateless per-sample seed derivation
//!
//! ## Usage Example
//!
//! ```rust
//! use mlmc_pricing::rng::{PricerRng, SeedSequence};
//!
//! let seeds = SeedSequence::new(12345);
//! let mut rng = PricerRng::from_seed(seeds.seed_for(2, 17, 0));
//!
//! let mut buffer = vec![0.0; 64];
//! rng.fill_normal(&mut buffer);
//! ```

mod prng;
mod seed;

pub use prng::PricerRng;
pub use seed::SeedSequence;
