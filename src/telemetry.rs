//! Per-approach telemetry emitted when a worker closes a sensing period
//!
//! Sinks are fire-and-forget: `report` must return promptly and never fail
//! the caller. Remote delivery is out of scope; the default sink writes a
//! structured tracing event that a JSON log pipeline can pick up.

use crate::types::{ApproachKind, PhaseMessageType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Context attached to every telemetry record.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryMetadata {
    pub timestamp: DateTime<Utc>,
    pub approach: usize,
    pub approach_name: String,
    pub kind: ApproachKind,
    /// Command that closed the period.
    pub command: String,
    /// Objects tracked (vehicles) or peak instances (pedestrians).
    pub count: usize,
    /// Exit-line crossings during the period (vehicles only).
    pub crossed: u32,
}

impl TelemetryMetadata {
    pub fn new(approach: usize, approach_name: &str, kind: ApproachKind, command: PhaseMessageType) -> Self {
        Self {
            timestamp: Utc::now(),
            approach,
            approach_name: approach_name.to_string(),
            kind,
            command: command.as_str().to_string(),
            count: 0,
            crossed: 0,
        }
    }
}

pub trait TelemetrySink: Send + Sync {
    fn report(&self, density: f32, speed: f32, metadata: &TelemetryMetadata);
}

/// Emits one `info` event per record, tagged with the junction identity.
#[derive(Debug, Clone)]
pub struct LogSink {
    junction_id: String,
    sub_location_id: String,
}

impl LogSink {
    pub fn new(junction_id: &str, sub_location_id: &str) -> Self {
        Self {
            junction_id: junction_id.to_string(),
            sub_location_id: sub_location_id.to_string(),
        }
    }
}

impl TelemetrySink for LogSink {
    fn report(&self, density: f32, speed: f32, metadata: &TelemetryMetadata) {
        info!(
            junction = %self.junction_id,
            sub_location = %self.sub_location_id,
            approach = metadata.approach,
            name = %metadata.approach_name,
            kind = %metadata.kind,
            command = %metadata.command,
            density,
            speed,
            count = metadata.count,
            crossed = metadata.crossed,
            at = %metadata.timestamp.to_rfc3339(),
            "telemetry"
        );
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn report(&self, _density: f32, _speed: f32, _metadata: &TelemetryMetadata) {}
}
