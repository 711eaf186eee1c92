//! Seeded synthetic detections for bench runs without cameras
//!
//! Vehicle approaches get boxes entering at the top of the lane and moving
//! down at a jittered constant speed. Pedestrian approaches get boxes that
//! appear at the kerb, wait a while and leave.

use super::{AcquisitionError, FrameSource};
use crate::types::{ApproachKind, Point, Polygon};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSettings {
    /// Rectified lane length in pixels (direction of travel).
    pub lane_length_px: f32,
    /// Rectified lane width in pixels.
    pub lane_width_px: f32,
    /// Chance per frame that a new object appears.
    pub spawn_probability: f64,
    /// Mean vehicle displacement per frame in pixels.
    pub speed_px: f32,
    /// Edge length of generated boxes in pixels.
    pub object_size_px: f32,
    /// Upper bound on simultaneous objects.
    pub max_objects: usize,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            lane_length_px: 480.0,
            lane_width_px: 120.0,
            spawn_probability: 0.25,
            speed_px: 12.0,
            object_size_px: 30.0,
            max_objects: 12,
        }
    }
}

#[derive(Debug, Clone)]
struct Body {
    origin: Point,
    velocity: f32,
    ttl: u32,
}

pub struct SyntheticSource {
    kind: ApproachKind,
    settings: SyntheticSettings,
    rng: StdRng,
    bodies: Vec<Body>,
}

impl SyntheticSource {
    pub fn new(kind: ApproachKind, settings: SyntheticSettings, seed: u64) -> Self {
        Self {
            kind,
            settings,
            rng: StdRng::seed_from_u64(seed),
            bodies: Vec::new(),
        }
    }

    fn spawn(&mut self) {
        if self.bodies.len() >= self.settings.max_objects
            || !self.rng.gen_bool(self.settings.spawn_probability.clamp(0.0, 1.0))
        {
            return;
        }
        let size = self.settings.object_size_px;
        let max_x = (self.settings.lane_width_px - size).max(0.0);
        let x = self.rng.gen_range(0.0..=max_x);
        let body = match self.kind {
            ApproachKind::Vehicle => Body {
                origin: Point::new(x, 0.0),
                velocity: self.settings.speed_px * self.rng.gen_range(0.8..1.2),
                ttl: u32::MAX,
            },
            ApproachKind::Pedestrian => Body {
                origin: Point::new(x, self.rng.gen_range(0.0..=size)),
                velocity: 0.0,
                ttl: self.rng.gen_range(10..60),
            },
        };
        self.bodies.push(body);
    }

    fn step(&mut self) {
        let limit = self.settings.lane_length_px;
        for body in &mut self.bodies {
            body.origin.y += body.velocity;
            body.ttl = body.ttl.saturating_sub(1);
        }
        self.bodies.retain(|b| b.origin.y < limit && b.ttl > 0);
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_detections(&mut self, _approach_id: usize) -> Result<Vec<Polygon>, AcquisitionError> {
        self.step();
        self.spawn();
        let size = self.settings.object_size_px;
        Ok(self
            .bodies
            .iter()
            .map(|b| Polygon::rect(b.origin.x, b.origin.y, size, size))
            .collect())
    }

    fn source_name(&self) -> &str {
        "synthetic"
    }
}
