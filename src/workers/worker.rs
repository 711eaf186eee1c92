//! One monitoring unit per approach
//!
//! A worker polls its command channel without blocking, senses while its held
//! state allows it, and answers red-class commands with the metric for the
//! period that just ended.

use super::wire::{decode_command, encode_report};
use crate::acquisition::FrameSource;
use crate::config::defaults;
use crate::telemetry::{TelemetryMetadata, TelemetrySink};
use crate::tracking::{HullTracker, TrackerSettings};
use crate::types::{ApproachKind, PhaseMessageType, Polygon};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Sleep between command polls while not sensing.
    pub idle_sleep: Duration,
    /// Pause after each sense step (frame pacing).
    pub sense_interval: Duration,
    /// Rectified lane length in pixels.
    pub lane_length_px: f32,
    /// Rectified lane width in pixels.
    pub lane_width_px: f32,
    pub tracker: TrackerSettings,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_millis(defaults::WORKER_IDLE_SLEEP_MS),
            sense_interval: Duration::from_millis(defaults::WORKER_SENSE_INTERVAL_MS),
            lane_length_px: defaults::LANE_LENGTH_PX,
            lane_width_px: defaults::LANE_WIDTH_PX,
            tracker: TrackerSettings::default(),
        }
    }
}

/// What a worker needs besides its channels.
pub struct WorkerSpec {
    pub name: String,
    pub kind: ApproachKind,
    pub source: Box<dyn FrameSource>,
    pub settings: WorkerSettings,
}

/// Per-kind sensing state.
enum Sensor {
    Vehicle {
        tracker: HullTracker,
        period_start: Instant,
        area_sum: f32,
        samples: u32,
    },
    Pedestrian {
        peak: usize,
    },
}

pub struct ApproachWorker {
    id: usize,
    name: String,
    kind: ApproachKind,
    settings: WorkerSettings,
    source: Box<dyn FrameSource>,
    sensor: Sensor,
    held: PhaseMessageType,
    commands: mpsc::Receiver<String>,
    reports: mpsc::Sender<String>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ApproachWorker {
    pub fn new(
        id: usize,
        spec: WorkerSpec,
        commands: mpsc::Receiver<String>,
        reports: mpsc::Sender<String>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let sensor = match spec.kind {
            ApproachKind::Vehicle => Sensor::Vehicle {
                tracker: HullTracker::new(spec.settings.tracker.clone()),
                period_start: Instant::now(),
                area_sum: 0.0,
                samples: 0,
            },
            ApproachKind::Pedestrian => Sensor::Pedestrian { peak: 0 },
        };
        Self {
            id,
            name: spec.name,
            kind: spec.kind,
            settings: spec.settings,
            source: spec.source,
            sensor,
            held: PhaseMessageType::Unknown,
            commands,
            reports,
            telemetry,
        }
    }

    /// Vehicles sense only while green; pedestrians always.
    fn senses(&self) -> bool {
        match self.kind {
            ApproachKind::Vehicle => self.held == PhaseMessageType::GreenPhase,
            ApproachKind::Pedestrian => true,
        }
    }

    /// Sense loop. Returns when cancelled or when the orchestrator side of
    /// either channel is gone.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(approach = self.id, name = %self.name, kind = %self.kind, source = self.source.source_name(), "Approach worker started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.commands.try_recv() {
                Ok(payload) => {
                    if !self.handle_command(&payload).await {
                        break;
                    }
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    debug!(approach = self.id, "Command channel closed");
                    break;
                }
            }

            let pause = if self.senses() {
                self.sense().await;
                self.settings.sense_interval
            } else {
                self.settings.idle_sleep
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!(approach = self.id, name = %self.name, "Approach worker stopped");
    }

    /// Apply one command. Returns false once the report channel is closed.
    async fn handle_command(&mut self, payload: &str) -> bool {
        let command = decode_command(payload);
        debug!(approach = self.id, command = %command, "Received phase command");

        let expected_kind = match command {
            PhaseMessageType::RedPhase | PhaseMessageType::GreenPhase => ApproachKind::Vehicle,
            PhaseMessageType::RedPed | PhaseMessageType::GreenPed => ApproachKind::Pedestrian,
            PhaseMessageType::Unknown => {
                warn!(approach = self.id, payload, "Unrecognised command ignored");
                return true;
            }
        };
        if expected_kind != self.kind {
            warn!(approach = self.id, kind = %self.kind, command = %command, "Command for other approach kind ignored");
            return true;
        }

        let delivered = match command {
            PhaseMessageType::RedPhase => {
                let (density, speed) = self.close_vehicle_period().await;
                self.send_report(command, density, speed).await
            }
            PhaseMessageType::GreenPhase => {
                // capture the frame at the moment the signal changes
                self.sense().await;
                self.open_vehicle_period();
                true
            }
            PhaseMessageType::RedPed => {
                let peak = self.take_peak();
                self.send_report(command, peak as f32, 0.0).await
            }
            PhaseMessageType::GreenPed => {
                self.take_peak();
                self.send_report(command, 0.0, 0.0).await
            }
            PhaseMessageType::Unknown => true,
        };

        self.held = command;
        delivered
    }

    async fn send_report(&mut self, command: PhaseMessageType, value: f32, speed: f32) -> bool {
        let payload = encode_report(value);
        debug!(approach = self.id, report = %payload, "Sending report");

        let mut metadata = TelemetryMetadata::new(self.id, &self.name, self.kind, command);
        match &self.sensor {
            Sensor::Vehicle { tracker, .. } => {
                metadata.count = tracker.len();
                metadata.crossed = tracker.crossed_count();
            }
            Sensor::Pedestrian { .. } => metadata.count = value as usize,
        }
        self.telemetry.report(value, speed, &metadata);

        if let Sensor::Vehicle { tracker, .. } = &mut self.sensor {
            tracker.reset_counters();
        }

        if self.reports.send(payload).await.is_err() {
            debug!(approach = self.id, "Report channel closed");
            return false;
        }
        true
    }

    async fn sense(&mut self) {
        let detections = match self.source.next_detections(self.id).await {
            Ok(d) => d,
            Err(e) => {
                warn!(approach = self.id, source = self.source.source_name(), error = %e, "Frame source failed");
                Vec::new()
            }
        };
        self.observe(detections);
    }

    fn observe(&mut self, detections: Vec<Polygon>) {
        let min_area = self.settings.tracker.min_hull_area;
        match &mut self.sensor {
            Sensor::Vehicle {
                tracker,
                area_sum,
                samples,
                ..
            } => {
                tracker.update_at(detections, Instant::now().into_std());
                *area_sum += tracker.total_area();
                *samples += 1;
            }
            Sensor::Pedestrian { peak } => {
                let count = detections.iter().filter(|d| d.area() >= min_area).count();
                *peak = (*peak).max(count);
            }
        }
    }

    fn open_vehicle_period(&mut self) {
        if let Sensor::Vehicle {
            tracker,
            period_start,
            area_sum,
            samples,
        } = &mut self.sensor
        {
            tracker.reset_counters();
            *period_start = Instant::now();
            *area_sum = 0.0;
            *samples = 0;
        }
    }

    /// Density and speed for the period ending now.
    ///
    /// After green: flow through the exit line over mean speed and lane
    /// width, or mean occupancy when no exit line is configured. After red:
    /// occupancy of one fresh frame.
    async fn close_vehicle_period(&mut self) -> (f32, f32) {
        if self.held != PhaseMessageType::GreenPhase {
            self.sense().await;
        }
        let lane_area = self.settings.lane_length_px * self.settings.lane_width_px;
        let lane_width = self.settings.lane_width_px;
        let was_green = self.held == PhaseMessageType::GreenPhase;

        let Sensor::Vehicle {
            tracker,
            period_start,
            area_sum,
            samples,
        } = &mut self.sensor
        else {
            return (0.0, 0.0);
        };

        let result = if !was_green {
            (occupancy(tracker.total_area(), lane_area), 0.0)
        } else if tracker.settings().exit_line_y.is_some() {
            let seconds = period_start.elapsed().as_secs_f32();
            let speed = tracker.crossed_average_speed();
            (flow_density(tracker.crossed_area(), seconds, speed, lane_width), speed)
        } else {
            let mean_area = if *samples == 0 { 0.0 } else { *area_sum / *samples as f32 };
            (occupancy(mean_area, lane_area), tracker.average_speed_across_tracks())
        };

        *area_sum = 0.0;
        *samples = 0;
        result
    }

    fn take_peak(&mut self) -> usize {
        match &mut self.sensor {
            Sensor::Pedestrian { peak } => std::mem::take(peak),
            Sensor::Vehicle { .. } => 0,
        }
    }
}

/// `flow / (speed × lane width)` with `flow = area / seconds`; zero when any
/// factor is zero.
pub fn flow_density(crossed_area: f32, seconds: f32, speed: f32, lane_width: f32) -> f32 {
    if seconds <= 0.0 || speed <= 0.0 || lane_width <= 0.0 {
        return 0.0;
    }
    let flow = crossed_area / seconds;
    if flow == 0.0 {
        0.0
    } else {
        flow / (speed * lane_width)
    }
}

pub fn occupancy(area: f32, lane_area: f32) -> f32 {
    if lane_area <= 0.0 {
        0.0
    } else {
        area / lane_area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::ReplaySource;
    use crate::telemetry::NullSink;

    fn spawn_worker(
        kind: ApproachKind,
        frames: Vec<Vec<Polygon>>,
    ) -> (mpsc::Sender<String>, mpsc::Receiver<String>, CancellationToken) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (rep_tx, rep_rx) = mpsc::channel(8);
        let spec = WorkerSpec {
            name: "test".to_string(),
            kind,
            source: Box::new(ReplaySource::from_frames(frames)),
            settings: WorkerSettings::default(),
        };
        let worker = ApproachWorker::new(0, spec, cmd_rx, rep_tx, Arc::new(NullSink));
        let cancel = CancellationToken::new();
        tokio::spawn(worker.run(cancel.clone()));
        (cmd_tx, rep_rx, cancel)
    }

    #[test]
    fn flow_density_formula() {
        // 600 px² over 2 s = 300 px²/s; 300 / (10 px/s × 15 px) = 2
        assert!((flow_density(600.0, 2.0, 10.0, 15.0) - 2.0).abs() < 1e-5);
        assert_eq!(flow_density(600.0, 2.0, 0.0, 15.0), 0.0);
        assert_eq!(flow_density(0.0, 2.0, 10.0, 15.0), 0.0);
        assert_eq!(occupancy(50.0, 200.0), 0.25);
    }

    #[tokio::test(start_paused = true)]
    async fn red_after_red_reports_occupancy() {
        let frames = vec![vec![Polygon::rect(0.0, 0.0, 48.0, 120.0)]];
        let (tx, mut rx, cancel) = spawn_worker(ApproachKind::Vehicle, frames);
        tx.send("RED_PHASE".to_string()).await.unwrap();
        // 48×120 over a 480×120 lane
        assert_eq!(rx.recv().await.unwrap(), "0.10");
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn vehicle_green_is_silent() {
        let (tx, mut rx, cancel) = spawn_worker(ApproachKind::Vehicle, vec![vec![]]);
        tx.send("GREEN_PHASE".to_string()).await.unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(got.is_err(), "no report expected on vehicle green");
        tx.send("RED_PHASE".to_string()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "0.00");
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn pedestrian_reports_peak_then_placeholder() {
        let frames = vec![
            vec![Polygon::rect(0.0, 0.0, 10.0, 10.0)],
            vec![
                Polygon::rect(0.0, 0.0, 10.0, 10.0),
                Polygon::rect(50.0, 0.0, 10.0, 10.0),
                Polygon::rect(90.0, 0.0, 10.0, 10.0),
            ],
        ];
        let (tx, mut rx, cancel) = spawn_worker(ApproachKind::Pedestrian, frames);
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send("RED_PED".to_string()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "3.00");
        tx.send("GREEN_PED".to_string()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "0.00");
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_command_is_not_answered() {
        let (tx, mut rx, cancel) = spawn_worker(ApproachKind::Pedestrian, vec![vec![]]);
        tx.send("YELLOW_PHASE".to_string()).await.unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(got.is_err());
        cancel.cancel();
    }
}
