//! Phase vectors and the ordered phase cycle

use super::signal::{ApproachKind, SignalState};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Phase
// ============================================================================

/// Per-approach signal states applied simultaneously, one entry per approach
/// slot in the fixed approach ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Phase(pub Vec<SignalState>);

impl Phase {
    pub fn new(states: Vec<SignalState>) -> Self {
        Self(states)
    }

    pub fn states(&self) -> &[SignalState] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<SignalState> {
        self.0.get(slot).copied()
    }

    /// Phase with every vehicle slot yellow and every other slot dark.
    ///
    /// Used for standby flashing.
    pub fn all_yellow(kinds: &[ApproachKind]) -> Self {
        Self(
            kinds
                .iter()
                .map(|k| match k {
                    ApproachKind::Vehicle => SignalState::Yellow,
                    ApproachKind::Pedestrian => SignalState::Unknown,
                })
                .collect(),
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, s) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", s)?;
        }
        write!(f, "]")
    }
}

// ============================================================================
// Phase cycle
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CycleError {
    #[error("phase cycle is empty")]
    Empty,

    #[error("{phases} phases but {durations} durations")]
    DurationCount { phases: usize, durations: usize },

    #[error("phase {index} has {found} slots, expected {expected}")]
    SlotCount {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("phase {index} has a zero hold duration")]
    ZeroDuration { index: usize },

    #[error("slot {slot} state {state} is not valid in a cycle phase")]
    InvalidState { slot: usize, state: SignalState },

    #[error("slot {slot} mixes vehicle and pedestrian states across phases")]
    MixedKinds { slot: usize },
}

/// Ordered, repeating sequence of phases with a hold duration each.
///
/// Invariants enforced at construction: at least one phase, one duration per
/// phase, every phase has the same number of slots, and each slot keeps the
/// same approach kind across the whole cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseCycle {
    phases: Vec<Phase>,
    durations: Vec<Duration>,
    kinds: Vec<ApproachKind>,
}

impl PhaseCycle {
    pub fn new(phases: Vec<Phase>, durations: Vec<Duration>) -> Result<Self, CycleError> {
        let first = phases.first().ok_or(CycleError::Empty)?;
        if first.is_empty() {
            return Err(CycleError::Empty);
        }
        if phases.len() != durations.len() {
            return Err(CycleError::DurationCount {
                phases: phases.len(),
                durations: durations.len(),
            });
        }
        if let Some(index) = durations.iter().position(|d| d.is_zero()) {
            return Err(CycleError::ZeroDuration { index });
        }

        let width = first.len();
        let mut kinds = Vec::with_capacity(width);
        for (slot, state) in first.states().iter().enumerate() {
            match (state, state.approach_kind()) {
                (SignalState::Yellow, _) | (_, None) => {
                    return Err(CycleError::InvalidState { slot, state: *state })
                }
                (_, Some(kind)) => kinds.push(kind),
            }
        }

        for (index, phase) in phases.iter().enumerate() {
            if phase.len() != width {
                return Err(CycleError::SlotCount {
                    index,
                    expected: width,
                    found: phase.len(),
                });
            }
            for (slot, state) in phase.states().iter().enumerate() {
                if matches!(state, SignalState::Yellow | SignalState::Unknown) {
                    return Err(CycleError::InvalidState { slot, state: *state });
                }
                if state.approach_kind() != Some(kinds[slot]) {
                    return Err(CycleError::MixedKinds { slot });
                }
            }
        }

        Ok(Self {
            phases,
            durations,
            kinds,
        })
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Always false; a cycle cannot be constructed empty.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Number of approach slots in every phase.
    pub fn width(&self) -> usize {
        self.kinds.len()
    }

    pub fn phase(&self, index: usize) -> &Phase {
        &self.phases[index % self.phases.len()]
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn duration(&self, index: usize) -> Duration {
        self.durations[index % self.durations.len()]
    }

    pub fn durations(&self) -> &[Duration] {
        &self.durations
    }

    /// Replace hold durations (adaptive planning). Length must match.
    pub fn set_durations(&mut self, durations: Vec<Duration>) -> Result<(), CycleError> {
        if durations.len() != self.phases.len() {
            return Err(CycleError::DurationCount {
                phases: self.phases.len(),
                durations: durations.len(),
            });
        }
        if let Some(index) = durations.iter().position(|d| d.is_zero()) {
            return Err(CycleError::ZeroDuration { index });
        }
        self.durations = durations;
        Ok(())
    }

    /// Approach kind of each slot, fixed for the whole cycle.
    pub fn approach_kinds(&self) -> &[ApproachKind] {
        &self.kinds
    }

    pub fn total_duration(&self) -> Duration {
        self.durations.iter().sum()
    }
}
