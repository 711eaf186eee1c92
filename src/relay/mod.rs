//! Relay actuation
//!
//! Turns a phase vector into physical lamp state. Two hardware backends share
//! the [`RelayActuator`] contract:
//!
//! - `TelnetRelay`: one authenticated line session, whole board written as a
//!   16-bit mask (`relay writeall <hex>`), reconnect-and-retry once.
//! - `HttpRelay`: one GET per relay that changes, stateless.
//!
//! `DryRunRelay` logs the mask it would write, for bench runs.

mod channel_map;
mod http;
mod telnet;

pub use channel_map::{channels_in, encode_mask, parse_status, slot_ordinals, RelayChannelMap, CHANNEL_COUNT};
pub use http::{command_code, relays_required, HttpRelay, SlotRelays, MAX_HTTP_RELAY};
pub use telnet::{TelnetRelay, TelnetSettings, PASSWORD_DELIMITER, TELNET_PORT};

use crate::config::{RelayBackend, RelayConfig};
use crate::types::{ApproachKind, Phase, SignalState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("relay at {0} rejected the login")]
    Auth(String),

    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("relay session closed")]
    Closed,

    #[error("relay number {0} outside 1..={max}", max = MAX_HTTP_RELAY)]
    InvalidRelay(u8),

    #[error("channel {0} outside 0..{max}", max = CHANNEL_COUNT)]
    InvalidChannel(u8),

    #[error("slot {slot} state {state} has no relay channel")]
    Unmapped { slot: usize, state: SignalState },

    #[error("phase has {found} slots, relay topology covers {expected}")]
    Topology { expected: usize, found: usize },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("unreadable relay status {0:?}")]
    Status(String),

    #[error("{failed} of {total} relay commands failed")]
    Partial { failed: usize, total: usize },
}

/// Realizes phase vectors as relay state.
///
/// Shared between the signal loop and shutdown, hence `&self` plus interior
/// locking where a backend holds session state.
#[async_trait]
pub trait RelayActuator: Send + Sync {
    /// Energise exactly the lamps for `phase`; everything else goes dark.
    async fn assert_phase(&self, phase: &Phase) -> Result<(), RelayError>;

    /// De-energise every relay.
    async fn all_off(&self) -> Result<(), RelayError>;

    /// Release any held session. Default is a no-op.
    async fn close(&self) {}

    /// Backend name for logging (e.g. "telnet", "http").
    fn backend_name(&self) -> &str;
}

// ============================================================================
// Construction
// ============================================================================

/// Build the configured backend for a cycle whose slots have these kinds.
///
/// The Telnet backend logs in here, so a bad address or credentials fail
/// at startup instead of on the first phase.
pub async fn connect(
    config: &RelayConfig,
    kinds: &[ApproachKind],
) -> Result<Arc<dyn RelayActuator>, RelayError> {
    let actuator: Arc<dyn RelayActuator> = match config.backend {
        RelayBackend::Telnet => Arc::new(
            TelnetRelay::connect(TelnetSettings::from(config), config.channels.clone(), kinds.to_vec())
                .await?,
        ),
        RelayBackend::Http => Arc::new(HttpRelay::new(
            &config.base_url,
            kinds,
            Duration::from_millis(config.request_timeout_ms),
        )?),
        RelayBackend::DryRun => {
            warn!("Relay backend is dry_run; no lamps will change");
            Arc::new(DryRunRelay::new(config.channels.clone(), kinds.to_vec()))
        }
    };
    info!(backend = actuator.backend_name(), slots = kinds.len(), "Relay actuator ready");
    Ok(actuator)
}

// ============================================================================
// Dry run
// ============================================================================

/// Logs the mask it would write instead of touching hardware.
pub struct DryRunRelay {
    map: RelayChannelMap,
    kinds: Vec<ApproachKind>,
}

impl DryRunRelay {
    pub fn new(map: RelayChannelMap, kinds: Vec<ApproachKind>) -> Self {
        Self { map, kinds }
    }
}

#[async_trait]
impl RelayActuator for DryRunRelay {
    async fn assert_phase(&self, phase: &Phase) -> Result<(), RelayError> {
        let mask = self.map.mask(phase, &self.kinds)?;
        info!(phase = %phase, mask = %encode_mask(mask), "dry-run relay writeall");
        Ok(())
    }

    async fn all_off(&self) -> Result<(), RelayError> {
        info!("dry-run relay reset");
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "dry_run"
    }
}

// ============================================================================
// Standby
// ============================================================================

/// Flash every vehicle yellow on and off until `duration` has elapsed, then
/// turn everything off.
///
/// Relay errors are logged and the flashing continues. Cancellation ends the
/// flashing early but still turns the lamps off.
pub async fn flash_standby(
    actuator: &dyn RelayActuator,
    kinds: &[ApproachKind],
    duration: Duration,
    interval: Duration,
    cancel: &CancellationToken,
) {
    warn!(duration_ms = duration.as_millis() as u64, "Entering standby: flashing yellow");
    let yellow = Phase::all_yellow(kinds);
    let deadline = tokio::time::Instant::now() + duration;

    while tokio::time::Instant::now() < deadline && !cancel.is_cancelled() {
        if let Err(e) = actuator.assert_phase(&yellow).await {
            warn!(error = %e, "Standby flash on failed");
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if let Err(e) = actuator.all_off().await {
            warn!(error = %e, "Standby flash off failed");
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    if let Err(e) = actuator.all_off().await {
        warn!(error = %e, "Failed to clear relays after standby");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RelayActuator for Recorder {
        async fn assert_phase(&self, phase: &Phase) -> Result<(), RelayError> {
            self.calls.lock().unwrap().push(phase.to_string());
            Ok(())
        }

        async fn all_off(&self) -> Result<(), RelayError> {
            self.calls.lock().unwrap().push("off".to_string());
            Ok(())
        }

        fn backend_name(&self) -> &str {
            "recorder"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn standby_alternates_and_ends_dark() {
        let relay = Recorder::default();
        flash_standby(
            &relay,
            &[ApproachKind::Vehicle, ApproachKind::Pedestrian],
            Duration::from_millis(2000),
            Duration::from_millis(500),
            &CancellationToken::new(),
        )
        .await;

        let calls = relay.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "[YELLOW_PHASE, UNKNOWN]",
                "off",
                "[YELLOW_PHASE, UNKNOWN]",
                "off",
                "off",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_standby_still_clears() {
        let relay = Recorder::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        flash_standby(
            &relay,
            &[ApproachKind::Vehicle],
            Duration::from_secs(60),
            Duration::from_millis(500),
            &cancel,
        )
        .await;
        assert_eq!(relay.calls.lock().unwrap().as_slice(), ["off"]);
    }

    #[tokio::test]
    async fn dry_run_rejects_ragged_phase() {
        let relay = DryRunRelay::new(RelayChannelMap::default(), vec![ApproachKind::Vehicle]);
        let err = relay
            .assert_phase(&Phase::new(vec![SignalState::Red, SignalState::Red]))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Topology { expected: 1, found: 2 }));
    }
}
