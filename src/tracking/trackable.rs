//! A single tracked object and its running speed estimate

use crate::types::{Point, Polygon};
use std::cell::OnceCell;
use std::time::Instant;

/// Divisor used for the first speed average; grows by one per averaged sample.
const INITIAL_SPEED_COUNTER: u32 = 2;

/// Persistent identity for one detected object across frames.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    id: u32,
    hull: Polygon,
    centroid: OnceCell<Point>,
    frames_since_seen: u32,
    avg_speed: f32,
    speed_counter: u32,
    updates: u32,
    last_centroid: Point,
    last_update: Instant,
    crossed_exit: bool,
}

impl TrackedObject {
    pub fn new(id: u32, hull: Polygon, now: Instant) -> Self {
        let centroid = hull.centroid();
        let cell = OnceCell::new();
        let _ = cell.set(centroid);
        Self {
            id,
            hull,
            centroid: cell,
            frames_since_seen: 0,
            avg_speed: 0.0,
            speed_counter: INITIAL_SPEED_COUNTER,
            updates: 0,
            last_centroid: centroid,
            last_update: now,
            crossed_exit: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn hull(&self) -> &Polygon {
        &self.hull
    }

    pub fn hull_area(&self) -> f32 {
        self.hull.area()
    }

    /// Centroid of the current hull, computed once per hull.
    pub fn centroid(&self) -> Point {
        *self.centroid.get_or_init(|| self.hull.centroid())
    }

    pub fn frames_since_seen(&self) -> u32 {
        self.frames_since_seen
    }

    /// Running average speed in pixels per second.
    pub fn avg_speed(&self) -> f32 {
        self.avg_speed
    }

    pub fn has_crossed_exit(&self) -> bool {
        self.crossed_exit
    }

    pub(crate) fn mark_crossed(&mut self) {
        self.crossed_exit = true;
    }

    pub(crate) fn mark_missed(&mut self) {
        self.frames_since_seen += 1;
    }

    /// Accept a matched detection: replace the hull, reset the miss counter
    /// and fold the centroid displacement into the speed average.
    ///
    /// The first update after creation leaves the average at zero. After
    /// that a zero average takes the instantaneous speed outright, otherwise
    /// `avg = (avg + instant) / counter` with the counter starting at 2 and
    /// growing by one per averaged sample, so later samples weigh less.
    pub(crate) fn observe(&mut self, hull: Polygon, now: Instant) {
        self.hull = hull;
        self.centroid = OnceCell::new();
        self.frames_since_seen = 0;

        let centroid = self.centroid();
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f32();

        if self.updates > 0 && elapsed > 0.0 {
            let instant = centroid.distance(&self.last_centroid) / elapsed;
            if self.avg_speed == 0.0 {
                self.avg_speed = instant;
            } else {
                self.avg_speed = (self.avg_speed + instant) / self.speed_counter as f32;
                self.speed_counter += 1;
            }
        }

        self.updates += 1;
        self.last_centroid = centroid;
        self.last_update = now;
    }
}
