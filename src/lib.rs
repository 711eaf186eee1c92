//! Junction-OS: Vision-Assisted Traffic Signal Control
//!
//! Cycles a fixed sequence of phase vectors through a relay board and stretches
//! or shrinks each phase's hold from the traffic density its approaches report.
//!
//! ## Architecture
//!
//! - **Workers**: one task per approach, tracking detected hulls and answering
//!   phase commands with a density or pedestrian count
//! - **Orchestrator**: fans phase commands out and gathers reports within the hold
//! - **Control**: phase sequencing, safe transitions, adaptive holds, standby
//! - **Relay**: Telnet bitmask board or per-relay HTTP board

pub mod config;
pub mod types;
pub mod tracking;
pub mod acquisition;
pub mod workers;
pub mod control;
pub mod relay;
pub mod telemetry;

// Re-export junction configuration
pub use config::JunctionConfig;

// Re-export commonly used types
pub use types::{ApproachKind, Phase, PhaseCycle, PhaseMessageType, Point, Polygon, SignalState};

// Re-export the control loop
pub use control::{ControlError, PhaseController, SignalLoop};

// Re-export relay contract
pub use relay::{RelayActuator, RelayError};

// Re-export workers
pub use workers::{Report, WorkerOrchestrator};
