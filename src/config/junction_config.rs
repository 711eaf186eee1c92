//! Junction Configuration - phase cycle, relay topology and approach sensing
//!
//! Unlike the tuning sections, the cycle and the relay layout are site
//! specific: there is no built-in junction, a file must be supplied.

use super::defaults;
use crate::acquisition::{AcquisitionError, SourceConfig};
use crate::control::{DensitySettings, LoopTiming};
use crate::relay::{relays_required, RelayChannelMap, MAX_HTTP_RELAY, TELNET_PORT};
use crate::tracking::TrackerSettings;
use crate::types::{ApproachKind, CycleError, Phase, PhaseCycle, SignalState};
use crate::workers::{WorkerSettings, WorkerSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one junction controller.
///
/// Load with `JunctionConfig::load()` which searches:
/// 1. `$JUNCTION_CONFIG` env var
/// 2. `./junction.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JunctionConfig {
    /// Site identification (telemetry tags)
    #[serde(default)]
    pub junction: JunctionInfo,

    /// Phase vectors and holds
    pub cycle: CycleConfig,

    /// Report weighting and adaptive hold planning
    #[serde(default)]
    pub density: DensitySettings,

    /// Relay board connection and channel layout
    #[serde(default)]
    pub relay: RelayConfig,

    /// Hull tracker tuning, shared by every vehicle approach
    #[serde(default)]
    pub tracker: TrackerSettings,

    /// Worker pacing
    #[serde(default)]
    pub worker: WorkerConfig,

    /// One entry per phase slot, in slot order
    #[serde(default, rename = "approach")]
    pub approaches: Vec<ApproachConfig>,
}

impl JunctionConfig {
    /// Load configuration using the standard search order:
    /// 1. `$JUNCTION_CONFIG` environment variable
    /// 2. `./junction.toml` in the current working directory
    pub fn load() -> Result<Self, ConfigError> {
        let mut searched = Vec::new();

        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                let config = Self::load_from_file(&p)?;
                info!(path = %p.display(), junction = %config.junction.id, "Loaded junction config from JUNCTION_CONFIG");
                return Ok(config);
            }
            warn!(path = %path, "JUNCTION_CONFIG points to non-existent file");
            searched.push(p);
        }

        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            info!(junction = %config.junction.id, "Loaded junction config from ./junction.toml");
            return Ok(config);
        }
        searched.push(local);

        Err(ConfigError::NotFound(searched))
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents, path)
    }

    /// Parse and validate TOML text. `origin` only labels errors.
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        // Two-pass: unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(origin.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// The validated phase cycle with its configured holds.
    pub fn phase_cycle(&self) -> Result<PhaseCycle, CycleError> {
        let phases = self
            .cycle
            .phases
            .iter()
            .map(|states| Phase::new(states.clone()))
            .collect();
        let durations = self
            .cycle
            .durations_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect();
        PhaseCycle::new(phases, durations)
    }

    pub fn relay_channel_map(&self) -> &RelayChannelMap {
        &self.relay.channels
    }

    pub fn loop_timing(&self) -> LoopTiming {
        LoopTiming {
            transition: Duration::from_millis(self.cycle.transition_ms),
            standby: Duration::from_millis(self.cycle.standby_ms),
            standby_flash: Duration::from_millis(self.cycle.standby_flash_ms),
        }
    }

    /// Worker tuning for the approach in `slot`.
    pub fn worker_settings(&self, slot: usize) -> WorkerSettings {
        let mut settings = WorkerSettings {
            idle_sleep: Duration::from_millis(self.worker.idle_sleep_ms),
            sense_interval: Duration::from_millis(self.worker.sense_interval_ms),
            tracker: self.tracker.clone(),
            ..WorkerSettings::default()
        };
        if let Some(approach) = self.approaches.get(slot) {
            settings.lane_length_px = approach.lane_length_px;
            settings.lane_width_px = approach.lane_width_px;
        }
        settings
    }

    /// Open every approach's frame source and pair it with its settings.
    ///
    /// `kinds` comes from the validated cycle, so slot `i` gets the kind its
    /// phase states imply.
    pub fn worker_specs(&self, kinds: &[ApproachKind]) -> Result<Vec<WorkerSpec>, AcquisitionError> {
        self.approaches
            .iter()
            .zip(kinds)
            .enumerate()
            .map(|(slot, (approach, kind))| {
                Ok(WorkerSpec {
                    name: approach.name.clone(),
                    kind: *kind,
                    source: approach.source.open(*kind)?,
                    settings: self.worker_settings(slot),
                })
            })
            .collect()
    }

    /// Replace every approach's source with a seeded synthetic one.
    pub fn use_synthetic_sources(&mut self) {
        for (slot, approach) in self.approaches.iter_mut().enumerate() {
            approach.source = SourceConfig::Synthetic {
                seed: slot as u64,
                settings: Default::default(),
            };
        }
    }

    /// Validate the whole junction for internal consistency.
    ///
    /// Every rule that would make the controller unsafe or unable to start is
    /// fatal; suspicious values are only logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        match self.phase_cycle() {
            Ok(cycle) => {
                let kinds = cycle.approach_kinds();
                if self.approaches.len() != kinds.len() {
                    errors.push(format!(
                        "{} [[approach]] entries but phases have {} slots",
                        self.approaches.len(),
                        kinds.len()
                    ));
                }
                self.relay.validate(kinds, &mut errors);
            }
            Err(e) => errors.push(format!("cycle: {e}")),
        }

        for (slot, approach) in self.approaches.iter().enumerate() {
            if let Some(points) = &approach.calibration {
                if points.len() < defaults::MIN_CALIBRATION_POINTS {
                    errors.push(format!(
                        "approach {slot} ({}): calibration needs at least {} points, got {}",
                        approach.name,
                        defaults::MIN_CALIBRATION_POINTS,
                        points.len()
                    ));
                }
            }
            if !(approach.lane_length_px > 0.0) || !(approach.lane_width_px > 0.0) {
                errors.push(format!(
                    "approach {slot} ({}): lane_length_px and lane_width_px must be > 0",
                    approach.name
                ));
            }
        }

        let d = &self.density;
        if !d.min.is_finite() || !d.max.is_finite() {
            errors.push(format!(
                "density.min and density.max must be finite (got min={}, max={})",
                d.min, d.max
            ));
        } else if d.min > d.max {
            errors.push(format!(
                "density.min ({:.2}) must be <= density.max ({:.2})",
                d.min, d.max
            ));
        }
        if !d.green_multiplier.is_finite() || !d.red_multiplier.is_finite() {
            errors.push("density multipliers must be finite".to_string());
        }

        if self.cycle.standby_flash_ms == 0 {
            errors.push("cycle.standby_flash_ms must be > 0".to_string());
        }
        if !(self.tracker.max_distance > 0.0) {
            errors.push(format!(
                "tracker.max_distance = {} must be > 0",
                self.tracker.max_distance
            ));
        }

        for w in super::validation::validate_ranges(self) {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({0}): {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({0}): {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("No junction config found (searched: {})", display_paths(.0))]
    NotFound(Vec<PathBuf>),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Junction Info
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JunctionInfo {
    pub id: String,
    pub name: String,
    /// Sub-location tag carried on every telemetry event.
    pub sub_location_id: String,
}

impl Default for JunctionInfo {
    fn default() -> Self {
        Self {
            id: "junction".to_string(),
            name: "Unnamed junction".to_string(),
            sub_location_id: "0".to_string(),
        }
    }
}

// ============================================================================
// Cycle
// ============================================================================

/// ```toml
/// [cycle]
/// phases = [
///     ["GREEN_PHASE", "RED_PHASE", "RED_PED"],
///     ["RED_PHASE", "GREEN_PHASE", "GREEN_PED"],
/// ]
/// durations_ms = [30000, 20000]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    pub phases: Vec<Vec<SignalState>>,
    pub durations_ms: Vec<u64>,
    #[serde(default = "default_transition_ms")]
    pub transition_ms: u64,
    #[serde(default = "default_standby_ms")]
    pub standby_ms: u64,
    #[serde(default = "default_standby_flash_ms")]
    pub standby_flash_ms: u64,
}

fn default_transition_ms() -> u64 {
    defaults::TRANSITION_MS
}
fn default_standby_ms() -> u64 {
    defaults::STANDBY_MS
}
fn default_standby_flash_ms() -> u64 {
    defaults::STANDBY_FLASH_MS
}

// ============================================================================
// Relay
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayBackend {
    /// Bitmask board over an authenticated Telnet session.
    Telnet,
    /// One HTTP GET per relay.
    Http,
    /// Log the mask instead of writing it.
    #[default]
    DryRun,
}

impl std::fmt::Display for RelayBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayBackend::Telnet => write!(f, "telnet"),
            RelayBackend::Http => write!(f, "http"),
            RelayBackend::DryRun => write!(f, "dry_run"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub backend: RelayBackend,
    /// Telnet board host.
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// HTTP board prefix; the two-digit command code is appended.
    pub base_url: String,
    pub response_retries: u32,
    pub response_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub channels: RelayChannelMap,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend: RelayBackend::default(),
            address: String::new(),
            port: TELNET_PORT,
            username: "admin".to_string(),
            password: String::new(),
            base_url: String::new(),
            response_retries: defaults::RELAY_RESPONSE_RETRIES,
            response_timeout_ms: defaults::RELAY_RESPONSE_TIMEOUT_MS,
            connect_timeout_ms: defaults::RELAY_CONNECT_TIMEOUT_MS,
            request_timeout_ms: defaults::RELAY_REQUEST_TIMEOUT_MS,
            channels: RelayChannelMap::default(),
        }
    }
}

impl RelayConfig {
    fn validate(&self, kinds: &[ApproachKind], errors: &mut Vec<String>) {
        match self.backend {
            RelayBackend::Telnet | RelayBackend::DryRun => {
                if self.backend == RelayBackend::Telnet && self.address.is_empty() {
                    errors.push("relay.address is required for the telnet backend".to_string());
                }
                errors.extend(self.channels.validate(kinds));
            }
            RelayBackend::Http => {
                if self.base_url.is_empty() {
                    errors.push("relay.base_url is required for the http backend".to_string());
                }
                let needed = relays_required(kinds);
                if needed > usize::from(MAX_HTTP_RELAY) {
                    errors.push(format!(
                        "relay: {needed} HTTP relays needed but the board has {MAX_HTTP_RELAY}"
                    ));
                }
            }
        }
        if self.response_retries == 0 {
            errors.push("relay.response_retries must be > 0".to_string());
        }
    }
}

// ============================================================================
// Workers
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub idle_sleep_ms: u64,
    pub sense_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_sleep_ms: defaults::WORKER_IDLE_SLEEP_MS,
            sense_interval_ms: defaults::WORKER_SENSE_INTERVAL_MS,
        }
    }
}

/// One `[[approach]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproachConfig {
    pub name: String,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default = "default_lane_length_px")]
    pub lane_length_px: f32,
    #[serde(default = "default_lane_width_px")]
    pub lane_width_px: f32,
    /// Perspective points of the lane in the camera image. Consumed by the
    /// capture side; checked here so a bad site survey fails at start-up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration: Option<Vec<(f32, f32)>>,
}

fn default_lane_length_px() -> f32 {
    defaults::LANE_LENGTH_PX
}
fn default_lane_width_px() -> f32 {
    defaults::LANE_WIDTH_PX
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_WAY: &str = r#"
[junction]
id = "J-017"
name = "Mill Road / High Street"
sub_location_id = "3"

[cycle]
phases = [
    ["GREEN_PHASE", "RED_PHASE", "RED_PED"],
    ["RED_PHASE", "GREEN_PHASE", "GREEN_PED"],
]
durations_ms = [30000, 20000]
transition_ms = 4000

[[approach]]
name = "north"

[[approach]]
name = "east"
lane_width_px = 90.0

[[approach]]
name = "crossing"
"#;

    fn parse(text: &str) -> Result<JunctionConfig, ConfigError> {
        JunctionConfig::from_toml_str(text, Path::new("test.toml"))
    }

    #[test]
    fn minimal_junction_parses_with_defaults() {
        let config = parse(TWO_WAY).unwrap();
        assert_eq!(config.junction.id, "J-017");
        assert_eq!(config.relay.backend, RelayBackend::DryRun);
        assert_eq!(config.relay.port, 23);
        assert_eq!(config.cycle.standby_ms, defaults::STANDBY_MS);
        assert_eq!(config.loop_timing().transition, Duration::from_millis(4000));
        assert!(config.density.adaptive);
    }

    #[test]
    fn cycle_and_kinds_follow_phase_tokens() {
        let config = parse(TWO_WAY).unwrap();
        let cycle = config.phase_cycle().unwrap();
        assert_eq!(cycle.len(), 2);
        assert_eq!(
            cycle.approach_kinds(),
            &[ApproachKind::Vehicle, ApproachKind::Vehicle, ApproachKind::Pedestrian]
        );
        assert_eq!(cycle.duration(1), Duration::from_millis(20_000));
    }

    #[test]
    fn per_approach_lane_geometry() {
        let config = parse(TWO_WAY).unwrap();
        assert_eq!(config.worker_settings(0).lane_width_px, defaults::LANE_WIDTH_PX);
        assert_eq!(config.worker_settings(1).lane_width_px, 90.0);
        assert_eq!(config.worker_settings(1).sense_interval, Duration::from_millis(100));
    }

    #[test]
    fn approach_count_must_match_slots() {
        let text = TWO_WAY.replace("[[approach]]\nname = \"crossing\"\n", "");
        match parse(&text) {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("2 [[approach]] entries")), "{errors:?}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_durations_are_fatal() {
        let text = TWO_WAY.replace("durations_ms = [30000, 20000]", "durations_ms = [30000]");
        assert!(matches!(parse(&text), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn http_backend_counts_relays() {
        let mut config = parse(TWO_WAY).unwrap();
        config.relay.backend = RelayBackend::Http;
        config.relay.base_url = "http://10.0.0.9/30000/".to_string();
        // 3 + 3 + 2
        assert!(config.validate().is_ok());

        config.cycle.phases = vec![vec![SignalState::Green; 6], vec![SignalState::Red; 6]];
        config.approaches = (0..6)
            .map(|i| ApproachConfig {
                name: format!("a{i}"),
                source: SourceConfig::default(),
                lane_length_px: 480.0,
                lane_width_px: 120.0,
                calibration: None,
            })
            .collect();
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("18 HTTP relays")), "{errors:?}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn short_calibration_rejected() {
        let text = TWO_WAY.replace(
            "name = \"north\"",
            "name = \"north\"\ncalibration = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]]",
        );
        match parse(&text) {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors[0].contains("at least 4 points"), "{errors:?}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn telnet_requires_address() {
        let text = format!("{TWO_WAY}\n[relay]\nbackend = \"telnet\"\n");
        assert!(matches!(parse(&text), Err(ConfigError::Validation(_))));
        let text = format!("{TWO_WAY}\n[relay]\nbackend = \"telnet\"\naddress = \"10.0.0.5\"\n");
        assert!(parse(&text).is_ok());
    }

    #[test]
    fn synthetic_override_replaces_sources() {
        let mut config = parse(TWO_WAY).unwrap();
        config.approaches[0].source = SourceConfig::Replay {
            path: PathBuf::from("frames/north.jsonl"),
        };
        config.use_synthetic_sources();
        assert!(matches!(config.approaches[0].source, SourceConfig::Synthetic { seed: 0, .. }));
        assert!(matches!(config.approaches[2].source, SourceConfig::Synthetic { seed: 2, .. }));
    }
}
