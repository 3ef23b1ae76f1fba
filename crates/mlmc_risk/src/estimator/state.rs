//! Mutable state of one estimation run.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::Diagnostics;
use crate::hierarchy::LevelHierarchy;

/// Phase of the estimator state machine.
///
/// `Initializing -> Refining -> Converged | Stopped | Failed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EstimatorPhase {
    /// Warm-up sampling of the initial levels.
    #[default]
    Initializing,
    /// Allocation, sampling and level-addition rounds.
    Refining,
    /// MSE target met.
    Converged,
    /// Refinement ended early with a usable, non-converged estimate.
    Stopped,
    /// Structural failure; no estimate.
    Failed,
}

impl fmt::Display for EstimatorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::Refining => "refining",
            Self::Converged => "converged",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Level hierarchy plus run bookkeeping.
#[derive(Debug)]
pub struct EstimatorState {
    hierarchy: LevelHierarchy,
    target_mse: f64,
    phase: EstimatorPhase,
    rounds: usize,
    estimated_mse: Option<f64>,
    started: Instant,
}

impl EstimatorState {
    /// Fresh state in the `Initializing` phase.
    pub fn new(hierarchy: LevelHierarchy, target_mse: f64) -> Self {
        Self {
            hierarchy,
            target_mse,
            phase: EstimatorPhase::Initializing,
            rounds: 0,
            estimated_mse: None,
            started: Instant::now(),
        }
    }

    /// The level hierarchy.
    #[inline]
    pub fn hierarchy(&self) -> &LevelHierarchy {
        &self.hierarchy
    }

    #[inline]
    pub(crate) fn hierarchy_mut(&mut self) -> &mut LevelHierarchy {
        &mut self.hierarchy
    }

    /// Target `eps^2`.
    #[inline]
    pub fn target_mse(&self) -> f64 {
        self.target_mse
    }

    /// Current phase.
    #[inline]
    pub fn phase(&self) -> EstimatorPhase {
        self.phase
    }

    /// Refinement rounds started.
    #[inline]
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// MSE estimate after the last completed round.
    #[inline]
    pub fn estimated_mse(&self) -> Option<f64> {
        self.estimated_mse
    }

    /// Time since the run started.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn transition(&mut self, phase: EstimatorPhase) {
        if self.phase != phase {
            info!(from = %self.phase, to = %phase, levels = self.hierarchy.len(), "Estimator phase change");
            self.phase = phase;
        }
    }

    pub(crate) fn begin_round(&mut self) -> usize {
        self.rounds += 1;
        self.rounds
    }

    pub(crate) fn refresh_mse(&mut self) -> f64 {
        let mse = self.hierarchy.estimated_mse();
        self.estimated_mse = mse.is_finite().then_some(mse);
        mse
    }

    /// Snapshot for error reporting.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            phase: self.phase,
            rounds: self.rounds,
            levels: self.hierarchy.summaries(),
            estimated_mse: self.estimated_mse,
            elapsed_seconds: self.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MlmcConfig;

    fn state() -> EstimatorState {
        let config = MlmcConfig::builder().target_mse(1e-3).build().unwrap();
        EstimatorState::new(LevelHierarchy::from_config(&config).unwrap(), config.target_mse())
    }

    #[test]
    fn test_initial_state() {
        let s = state();
        assert_eq!(s.phase(), EstimatorPhase::Initializing);
        assert_eq!(s.rounds(), 0);
        assert_eq!(s.estimated_mse(), None);
        assert_eq!(s.target_mse(), 1e-3);
    }

    #[test]
    fn test_transitions_and_diagnostics() {
        let mut s = state();
        s.transition(EstimatorPhase::Refining);
        assert_eq!(s.begin_round(), 1);
        // Only level 0, unsampled: bias undefined.
        assert!(!s.refresh_mse().is_finite());
        assert_eq!(s.estimated_mse(), None);

        let d = s.diagnostics();
        assert_eq!(d.phase, EstimatorPhase::Refining);
        assert_eq!(d.rounds, 1);
        assert_eq!(d.levels.len(), 1);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(EstimatorPhase::Initializing.to_string(), "initializing");
        assert_eq!(EstimatorPhase::Stopped.to_string(), "stopped");
    }
}
