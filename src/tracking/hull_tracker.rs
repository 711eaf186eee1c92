//! Greedy centroid tracker over detection hulls
//!
//! Matching is first-fit in detection input order, not a global assignment.
//! Identity therefore depends on the order detections arrive in; that is
//! acceptable for lane-bound traffic where objects rarely come close.

use super::trackable::TrackedObject;
use crate::types::Polygon;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Live tracks keyed by id.
pub type TrackSet = BTreeMap<u32, TrackedObject>;

// ============================================================================
// Settings
// ============================================================================

/// Tuning for one tracker instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Largest centroid jump (pixels) accepted as the same object.
    pub max_distance: f32,
    /// Consecutive missed frames tolerated before a track is dropped.
    pub max_frames_not_seen: u32,
    /// Highest id handed out before the allocator wraps to 0.
    pub max_id: u32,
    /// Detections with a smaller hull area (px²) are ignored.
    pub min_hull_area: f32,
    /// Optional horizontal exit line (pixel row) for crossing counts.
    pub exit_line_y: Option<f32>,
    /// Distance before the exit line at which a centroid counts as crossed.
    pub boundary_cushion_px: f32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            max_distance: 100.0,
            max_frames_not_seen: 3,
            max_id: 1000,
            min_hull_area: 0.0,
            exit_line_y: None,
            boundary_cushion_px: 20.0,
        }
    }
}

// ============================================================================
// Id allocation
// ============================================================================

/// Monotonic id counter that wraps to 0 after `max_id`.
///
/// Ids are not reclaimed from expired tracks. With a `max_id` smaller than the
/// steady-state population a wrapped id can equal a live one; `HullTracker`
/// logs that case and the newer detection takes the id over.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u32,
    max_id: u32,
}

impl IdAllocator {
    pub fn new(max_id: u32) -> Self {
        Self { next: 0, max_id }
    }

    pub fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next = if id >= self.max_id { 0 } else { id + 1 };
        id
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// Maintains the set of tracked objects for one approach.
#[derive(Debug)]
pub struct HullTracker {
    settings: TrackerSettings,
    ids: IdAllocator,
    tracks: TrackSet,
    crossed_count: u32,
    crossed_area: f32,
    crossed_speed_sum: f32,
}

impl HullTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        let ids = IdAllocator::new(settings.max_id);
        Self {
            settings,
            ids,
            tracks: TrackSet::new(),
            crossed_count: 0,
            crossed_area: 0.0,
            crossed_speed_sum: 0.0,
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn update(&mut self, detections: Vec<Polygon>) {
        self.update_at(detections, Instant::now());
    }

    /// Run one tracking step with an explicit timestamp.
    pub fn update_at(&mut self, detections: Vec<Polygon>, now: Instant) {
        let mut pending: Vec<Option<Polygon>> = detections
            .into_iter()
            .filter(|hull| hull.area() >= self.settings.min_hull_area)
            .map(Some)
            .collect();

        let max_distance = self.settings.max_distance;
        for track in self.tracks.values_mut() {
            let centroid = track.centroid();
            let hit = pending.iter().position(|slot| {
                slot.as_ref()
                    .is_some_and(|hull| hull.centroid().distance(&centroid) <= max_distance)
            });
            match hit.and_then(|i| pending[i].take()) {
                Some(hull) => track.observe(hull, now),
                None => track.mark_missed(),
            }
        }

        for hull in pending.into_iter().flatten() {
            let id = self.ids.allocate();
            if self.tracks.contains_key(&id) {
                warn!(id, max_id = self.settings.max_id, "Track id wrapped onto a live track");
            }
            self.tracks.insert(id, TrackedObject::new(id, hull, now));
        }

        let limit = self.settings.max_frames_not_seen;
        self.tracks.retain(|id, track| {
            let keep = track.frames_since_seen() <= limit;
            if !keep {
                debug!(id = *id, "Track expired");
            }
            keep
        });

        self.process_crossings();
    }

    fn process_crossings(&mut self) {
        let Some(line) = self.settings.exit_line_y else {
            return;
        };
        let threshold = line - self.settings.boundary_cushion_px;
        for track in self.tracks.values_mut() {
            if track.frames_since_seen() == 0
                && !track.has_crossed_exit()
                && track.centroid().y >= threshold
            {
                track.mark_crossed();
                self.crossed_count += 1;
                self.crossed_area += track.hull_area();
                self.crossed_speed_sum += track.avg_speed();
            }
        }
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    pub fn snapshot(&self) -> TrackSet {
        self.tracks.clone()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Sum of current hull areas.
    pub fn total_area(&self) -> f32 {
        self.tracks.values().map(TrackedObject::hull_area).sum()
    }

    /// Mean of the per-track average speeds that have an estimate.
    pub fn average_speed_across_tracks(&self) -> f32 {
        let (sum, n) = self
            .tracks
            .values()
            .map(TrackedObject::avg_speed)
            .filter(|s| *s > 0.0)
            .fold((0.0_f32, 0_u32), |(sum, n), s| (sum + s, n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f32
        }
    }

    pub fn crossed_count(&self) -> u32 {
        self.crossed_count
    }

    /// Hull area accumulated from objects that crossed the exit line.
    pub fn crossed_area(&self) -> f32 {
        self.crossed_area
    }

    /// Mean speed of the objects that crossed the exit line.
    pub fn crossed_average_speed(&self) -> f32 {
        if self.crossed_count == 0 {
            0.0
        } else {
            self.crossed_speed_sum / self.crossed_count as f32
        }
    }

    /// Clear the exit-line period counters. Live tracks are kept.
    pub fn reset_counters(&mut self) {
        self.crossed_count = 0;
        self.crossed_area = 0.0;
        self.crossed_speed_sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    fn boxed(x: f32, y: f32) -> Polygon {
        Polygon::rect(x, y, 10.0, 10.0)
    }

    fn tracker() -> HullTracker {
        HullTracker::new(TrackerSettings::default())
    }

    #[test]
    fn allocator_wraps_after_max_id() {
        let mut ids = IdAllocator::new(2);
        let seq: Vec<u32> = (0..5).map(|_| ids.allocate()).collect();
        assert_eq!(seq, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn new_detections_get_distinct_ids() {
        let mut t = tracker();
        t.update(vec![boxed(0.0, 0.0), boxed(300.0, 0.0), boxed(600.0, 0.0)]);
        let ids: HashSet<u32> = t.tracks().keys().copied().collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn matched_detection_keeps_identity() {
        let mut t = tracker();
        t.update(vec![boxed(0.0, 0.0)]);
        let id = *t.tracks().keys().next().unwrap();
        t.update(vec![boxed(30.0, 0.0)]);
        assert_eq!(t.len(), 1);
        assert!(t.tracks().contains_key(&id));
    }

    #[test]
    fn snapshot_is_detached_from_later_updates() {
        let mut t = tracker();
        t.update(vec![boxed(0.0, 0.0), boxed(300.0, 0.0)]);
        let snap = t.snapshot();

        t.update(vec![boxed(20.0, 0.0)]);
        t.update(vec![boxed(40.0, 0.0), boxed(600.0, 0.0)]);

        assert_eq!(snap.len(), 2);
        assert!(snap.values().all(|track| track.frames_since_seen() == 0));
        assert_eq!(snap.values().map(|track| track.centroid().x).sum::<f32>(), 310.0);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn first_fit_claims_detection_in_input_order() {
        let mut t = tracker();
        t.update(vec![boxed(0.0, 0.0)]);
        // both within range; the first listed wins even though the second is closer
        t.update(vec![boxed(80.0, 0.0), boxed(5.0, 0.0)]);
        let track = t.tracks().get(&0).unwrap();
        assert!((track.centroid().x - 85.0).abs() < 1e-3);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn expiry_happens_one_frame_after_the_limit() {
        let settings = TrackerSettings {
            max_frames_not_seen: 2,
            ..TrackerSettings::default()
        };
        let mut t = HullTracker::new(settings);
        t.update(vec![boxed(0.0, 0.0)]);

        t.update(vec![]);
        t.update(vec![]);
        assert_eq!(t.len(), 1, "missed exactly max_frames_not_seen times");

        t.update(vec![]);
        assert!(t.is_empty(), "missed max_frames_not_seen + 1 times");
    }

    #[test]
    fn ids_stay_unique_under_wrap() {
        let settings = TrackerSettings {
            max_id: 3,
            max_frames_not_seen: 10,
            ..TrackerSettings::default()
        };
        let mut t = HullTracker::new(settings);
        for frame in 0..8 {
            let x = frame as f32 * 500.0;
            t.update(vec![boxed(x, 0.0), boxed(x, 400.0)]);
            let ids: HashSet<u32> = t.tracks().keys().copied().collect();
            assert_eq!(ids.len(), t.len());
            assert!(t.tracks().values().all(|o| o.frames_since_seen() <= 10));
        }
    }

    #[test]
    fn small_hulls_are_ignored() {
        let settings = TrackerSettings {
            min_hull_area: 150.0,
            ..TrackerSettings::default()
        };
        let mut t = HullTracker::new(settings);
        t.update(vec![boxed(0.0, 0.0), Polygon::rect(200.0, 0.0, 20.0, 20.0)]);
        assert_eq!(t.len(), 1);
        assert!((t.total_area() - 400.0).abs() < 1e-3);
    }

    #[test]
    fn exit_line_counts_each_object_once() {
        let settings = TrackerSettings {
            exit_line_y: Some(100.0),
            boundary_cushion_px: 20.0,
            ..TrackerSettings::default()
        };
        let mut t = HullTracker::new(settings);
        let t0 = Instant::now();
        t.update_at(vec![boxed(0.0, 0.0)], t0);
        t.update_at(vec![boxed(0.0, 40.0)], t0 + Duration::from_secs(1));
        assert_eq!(t.crossed_count(), 0);
        // centroid y = 85 passes 100 - 20
        t.update_at(vec![boxed(0.0, 80.0)], t0 + Duration::from_secs(2));
        t.update_at(vec![boxed(0.0, 120.0)], t0 + Duration::from_secs(3));
        assert_eq!(t.crossed_count(), 1);
        assert!((t.crossed_area() - 100.0).abs() < 1e-3);
        assert!((t.crossed_average_speed() - 40.0).abs() < 1e-3);

        t.reset_counters();
        assert_eq!(t.crossed_count(), 0);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn average_speed_ignores_tracks_without_estimate() {
        let mut t = tracker();
        let t0 = Instant::now();
        t.update_at(vec![boxed(0.0, 0.0), boxed(500.0, 0.0)], t0);
        t.update_at(vec![boxed(0.0, 10.0), boxed(500.0, 0.0)], t0 + Duration::from_secs(1));
        t.update_at(vec![boxed(0.0, 30.0), boxed(500.0, 0.0)], t0 + Duration::from_secs(2));
        assert!((t.average_speed_across_tracks() - 20.0).abs() < 1e-3);
        assert_eq!(tracker().average_speed_across_tracks(), 0.0);
    }
}
