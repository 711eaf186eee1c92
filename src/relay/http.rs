//! Discrete relay board driven by one HTTP GET per relay

use super::{RelayActuator, RelayError};
use crate::types::{ApproachKind, Phase, SignalState};
use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Highest relay number on the board.
pub const MAX_HTTP_RELAY: u8 = 16;

/// Command code for switching a relay: `on = 2k-1`, `off = 2(k-1)`, two digits.
pub fn command_code(relay: u8, on: bool) -> Result<String, RelayError> {
    if relay == 0 || relay > MAX_HTTP_RELAY {
        return Err(RelayError::InvalidRelay(relay));
    }
    let code = if on { relay * 2 - 1 } else { (relay - 1) * 2 };
    Ok(format!("{:02}", code))
}

/// Relay numbers owned by one approach slot, allocated in slot order:
/// vehicle slots take red, green, yellow; pedestrian slots take red, green.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRelays {
    pub kind: ApproachKind,
    pub first: u8,
}

impl SlotRelays {
    pub fn count(&self) -> u8 {
        match self.kind {
            ApproachKind::Vehicle => 3,
            ApproachKind::Pedestrian => 2,
        }
    }

    /// Desired on/off per relay of this slot, in relay order.
    fn levels(&self, state: SignalState) -> Vec<(u8, bool)> {
        let lit: Option<u8> = match (self.kind, state) {
            (ApproachKind::Vehicle, SignalState::Red) => Some(0),
            (ApproachKind::Vehicle, SignalState::Green) => Some(1),
            (ApproachKind::Vehicle, SignalState::Yellow) => Some(2),
            (ApproachKind::Pedestrian, SignalState::RedPed) => Some(0),
            (ApproachKind::Pedestrian, SignalState::GreenPed) => Some(1),
            _ => None,
        };
        (0..self.count())
            .map(|i| (self.first + i, lit == Some(i)))
            .collect()
    }
}

/// Relay numbers the board must provide for these slots.
pub fn relays_required(kinds: &[ApproachKind]) -> usize {
    kinds
        .iter()
        .map(|&kind| usize::from(SlotRelays { kind, first: 0 }.count()))
        .sum()
}

pub struct HttpRelay {
    client: reqwest::Client,
    base_url: String,
    slots: Vec<SlotRelays>,
    /// Last level successfully written per relay number (index 0 unused).
    known: Mutex<Vec<Option<bool>>>,
}

impl HttpRelay {
    pub fn new(base_url: &str, kinds: &[ApproachKind], timeout: Duration) -> Result<Self, RelayError> {
        let mut slots = Vec::with_capacity(kinds.len());
        let mut next: u8 = 1;
        for kind in kinds {
            let slot = SlotRelays { kind: *kind, first: next };
            let last = next + slot.count() - 1;
            if last > MAX_HTTP_RELAY {
                return Err(RelayError::InvalidRelay(last));
            }
            next += slot.count();
            slots.push(slot);
        }

        // boards sit on the signal cabinet LAN, never behind a proxy
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|source| RelayError::Http {
                url: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            slots,
            known: Mutex::new(vec![None; usize::from(MAX_HTTP_RELAY) + 1]),
        })
    }

    pub fn slots(&self) -> &[SlotRelays] {
        &self.slots
    }

    async fn switch(&self, relay: u8, on: bool) -> Result<(), RelayError> {
        let url = format!("{}{}", self.base_url, command_code(relay, on)?);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| RelayError::Http {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RelayError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }
        debug!(relay, on, url = %url, body = %body.trim(), "Relay switched");
        Ok(())
    }

    /// Issue one slot's commands in order, returning the levels that stuck.
    async fn run_slot(&self, commands: Vec<(u8, bool)>) -> (Vec<(u8, bool)>, usize) {
        let mut applied = Vec::with_capacity(commands.len());
        let mut failed = 0;
        for (relay, on) in commands {
            match self.switch(relay, on).await {
                Ok(()) => applied.push((relay, on)),
                Err(e) => {
                    warn!(relay, on, error = %e, "Relay command failed");
                    failed += 1;
                }
            }
        }
        (applied, failed)
    }

    /// Apply per-slot target levels. Slots run concurrently; within a slot
    /// the offs go out before the ons.
    async fn apply(&self, targets: Vec<Vec<(u8, bool)>>, force: bool) -> Result<(), RelayError> {
        let mut known = self.known.lock().await;

        let plans: Vec<Vec<(u8, bool)>> = targets
            .into_iter()
            .map(|levels| {
                let mut changed: Vec<(u8, bool)> = levels
                    .into_iter()
                    .filter(|(relay, on)| force || known[usize::from(*relay)] != Some(*on))
                    .collect();
                changed.sort_by_key(|(_, on)| *on);
                changed
            })
            .collect();
        let total: usize = plans.iter().map(Vec::len).sum();

        let results = join_all(plans.into_iter().map(|plan| self.run_slot(plan))).await;

        let mut failed = 0;
        for (applied, slot_failed) in results {
            failed += slot_failed;
            for (relay, on) in applied {
                known[usize::from(relay)] = Some(on);
            }
        }

        if failed > 0 {
            Err(RelayError::Partial { failed, total })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RelayActuator for HttpRelay {
    async fn assert_phase(&self, phase: &Phase) -> Result<(), RelayError> {
        if phase.len() != self.slots.len() {
            return Err(RelayError::Topology {
                expected: self.slots.len(),
                found: phase.len(),
            });
        }
        let targets = self
            .slots
            .iter()
            .zip(phase.states())
            .map(|(slot, state)| slot.levels(*state))
            .collect();
        self.apply(targets, false).await
    }

    async fn all_off(&self) -> Result<(), RelayError> {
        let targets = self
            .slots
            .iter()
            .map(|slot| slot.levels(SignalState::Unknown))
            .collect();
        self.apply(targets, true).await
    }

    fn backend_name(&self) -> &str {
        "http"
    }
}
