//! Multi-object tracking for vehicle approaches
//!
//! `HullTracker` keeps a stable id per detected hull across frames so a
//! worker can derive flow, occupancy and speed for its approach. Pure
//! computation; frames come from an `acquisition::FrameSource`.

mod hull_tracker;
mod trackable;

pub use hull_tracker::{HullTracker, IdAllocator, TrackSet, TrackerSettings};
pub use trackable::TrackedObject;
