//! Shared data structures for the junction control pipeline
//!
//! - Signal states and worker command tokens (`SignalState`, `PhaseMessageType`)
//! - Phase vectors and the repeating phase cycle (`Phase`, `PhaseCycle`)
//! - Detection geometry handed from frame sources to trackers (`Point`, `Polygon`)

mod signal;
mod phase;
mod geometry;

pub use signal::*;
pub use phase::*;
pub use geometry::*;
