//! Phase cycle position and safe transition derivation

use crate::types::{Phase, PhaseCycle, SignalState};
use std::time::Duration;

/// Transition slot between a current and next state.
///
/// | current   | next    | transition |
/// |-----------|---------|------------|
/// | GREEN     | RED     | YELLOW     |
/// | RED       | GREEN   | RED        |
/// | GREEN_PED | RED_PED | RED_PED    |
/// | other     | any     | current    |
pub fn transition_state(current: SignalState, next: SignalState) -> SignalState {
    match (current, next) {
        (SignalState::Green, SignalState::Red) => SignalState::Yellow,
        (SignalState::Red, SignalState::Green) => SignalState::Red,
        (SignalState::GreenPed, SignalState::RedPed) => SignalState::RedPed,
        (current, _) => current,
    }
}

/// Apply [`transition_state`] slot by slot.
///
/// Slots missing from `next` keep their current state.
pub fn derive_transition(current: &Phase, next: &Phase) -> Phase {
    Phase::new(
        current
            .states()
            .iter()
            .enumerate()
            .map(|(slot, state)| match next.get(slot) {
                Some(n) => transition_state(*state, n),
                None => *state,
            })
            .collect(),
    )
}

/// Owns the cycle and the current index. Index 0 at start, advances modulo
/// the cycle length, never terminates on its own.
#[derive(Debug, Clone)]
pub struct PhaseController {
    cycle: PhaseCycle,
    index: usize,
}

impl PhaseController {
    pub fn new(cycle: PhaseCycle) -> Self {
        Self { cycle, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cycle(&self) -> &PhaseCycle {
        &self.cycle
    }

    pub fn cycle_mut(&mut self) -> &mut PhaseCycle {
        &mut self.cycle
    }

    pub fn current(&self) -> &Phase {
        self.cycle.phase(self.index)
    }

    pub fn next_index(&self) -> usize {
        (self.index + 1) % self.cycle.len()
    }

    pub fn previous_index(&self) -> usize {
        (self.index + self.cycle.len() - 1) % self.cycle.len()
    }

    pub fn next(&self) -> &Phase {
        self.cycle.phase(self.next_index())
    }

    pub fn previous(&self) -> &Phase {
        self.cycle.phase(self.previous_index())
    }

    pub fn hold_duration(&self) -> Duration {
        self.cycle.duration(self.index)
    }

    /// Transition between the current phase and the next one.
    pub fn transition(&self) -> Phase {
        derive_transition(self.current(), self.next())
    }

    /// Step to the next phase. Returns true when the cycle wrapped to 0.
    pub fn advance(&mut self) -> bool {
        self.index = self.next_index();
        self.index == 0
    }
}
