//! Signal control: phase sequencing, transitions, adaptive holds, the loop

mod density;
mod phase_controller;
mod signal_loop;

pub use density::{weight_density, DensitySettings, DurationPlanner};
pub use phase_controller::{derive_transition, transition_state, PhaseController};
pub use signal_loop::{LoopTiming, SignalLoop};

use crate::types::CycleError;
use crate::workers::WorkerLost;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("approach worker {name} (slot {slot}) lost")]
    WorkerLost { slot: usize, name: String },

    #[error("{workers} workers for {slots} cycle slots")]
    WorkerCount { workers: usize, slots: usize },

    #[error("invalid phase cycle: {0}")]
    Cycle(#[from] CycleError),

    #[error("invalid density settings: {0}")]
    Settings(String),
}

impl From<WorkerLost> for ControlError {
    fn from(lost: WorkerLost) -> Self {
        ControlError::WorkerLost {
            slot: lost.slot,
            name: lost.name,
        }
    }
}
