//! Approach workers and their orchestration
//!
//! One task per approach, each with a private pair of unidirectional
//! channels. The orchestrator only writes commands and only reads reports;
//! a worker only reads commands and only writes reports. Dropping either end
//! makes the loss visible to the other side as a closed channel.

mod orchestrator;
pub mod wire;
mod worker;

pub use orchestrator::{Report, WorkerHandle, WorkerLost, WorkerOrchestrator};
pub use worker::{flow_density, occupancy, ApproachWorker, WorkerSettings, WorkerSpec};
