//! System-wide default constants.
//!
//! Values a junction file may leave out. Grouped by subsystem.

// ============================================================================
// Config Search
// ============================================================================

/// Environment variable naming the junction config file.
pub const CONFIG_ENV_VAR: &str = "JUNCTION_CONFIG";

/// Config file looked up in the working directory when the variable is unset.
pub const LOCAL_CONFIG_FILE: &str = "junction.toml";

// ============================================================================
// Cycle
// ============================================================================

/// Hold for a derived transition phase (ms).
pub const TRANSITION_MS: u64 = 5_000;

/// Total time spent flashing yellow after a worker is lost (ms).
pub const STANDBY_MS: u64 = 60_000;

/// On and off time of each standby flash (ms).
pub const STANDBY_FLASH_MS: u64 = 500;

// ============================================================================
// Relay
// ============================================================================

/// Read attempts per Telnet response before giving up on it.
pub const RELAY_RESPONSE_RETRIES: u32 = 5;

/// Wait per Telnet read attempt (ms).
pub const RELAY_RESPONSE_TIMEOUT_MS: u64 = 5_000;

/// TCP connect timeout for the Telnet board (ms).
pub const RELAY_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Per-request timeout for the HTTP board (ms).
pub const RELAY_REQUEST_TIMEOUT_MS: u64 = 2_000;

// ============================================================================
// Workers
// ============================================================================

/// Sleep between command polls while a worker is idle (ms).
pub const WORKER_IDLE_SLEEP_MS: u64 = 1;

/// Pause after each sense step (ms). 100 ms is roughly 10 frames per second.
pub const WORKER_SENSE_INTERVAL_MS: u64 = 100;

/// Rectified lane length (px).
pub const LANE_LENGTH_PX: f32 = 480.0;

/// Rectified lane width (px).
pub const LANE_WIDTH_PX: f32 = 120.0;

/// Minimum points in a perspective calibration polygon.
pub const MIN_CALIBRATION_POINTS: usize = 4;

// ============================================================================
// Orchestrator
// ============================================================================

/// Grace period for worker tasks to exit after cancellation (seconds).
pub const WORKER_SHUTDOWN_GRACE_SECS: u64 = 5;
