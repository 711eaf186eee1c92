//! Static mapping from per-slot signal states to relay channel indices

use super::RelayError;
use crate::types::{ApproachKind, Phase, SignalState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of channels on the bitmask relay board.
pub const CHANNEL_COUNT: u8 = 16;

/// Channel indices per state, indexed by the slot's ordinal among slots of
/// the same kind. With four vehicle slots and two pedestrian slots the
/// default layout puts vehicle slot 2's green on channel 7 and pedestrian
/// slot 1's red on channel 14.
///
/// ```toml
/// [relay.channels]
/// red = [0, 3, 6, 9]
/// green = [1, 4, 7, 10]
/// yellow = [2, 5, 8, 11]
/// red_ped = [12, 14]
/// green_ped = [13, 15]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayChannelMap {
    pub red: Vec<u8>,
    pub green: Vec<u8>,
    pub yellow: Vec<u8>,
    pub red_ped: Vec<u8>,
    pub green_ped: Vec<u8>,
}

impl Default for RelayChannelMap {
    fn default() -> Self {
        Self {
            red: vec![0, 3, 6, 9],
            green: vec![1, 4, 7, 10],
            yellow: vec![2, 5, 8, 11],
            red_ped: vec![12, 14],
            green_ped: vec![13, 15],
        }
    }
}

/// Ordinal of every slot among the slots sharing its kind.
pub fn slot_ordinals(kinds: &[ApproachKind]) -> Vec<usize> {
    let (mut vehicles, mut pedestrians) = (0, 0);
    kinds
        .iter()
        .map(|kind| {
            let counter = match kind {
                ApproachKind::Vehicle => &mut vehicles,
                ApproachKind::Pedestrian => &mut pedestrians,
            };
            let ordinal = *counter;
            *counter += 1;
            ordinal
        })
        .collect()
}

impl RelayChannelMap {
    fn list(&self, state: SignalState) -> Option<&[u8]> {
        match state {
            SignalState::Red => Some(&self.red),
            SignalState::Green => Some(&self.green),
            SignalState::Yellow => Some(&self.yellow),
            SignalState::RedPed => Some(&self.red_ped),
            SignalState::GreenPed => Some(&self.green_ped),
            SignalState::Unknown => None,
        }
    }

    /// Channel energised for `state` on the slot with this ordinal.
    pub fn channel(&self, state: SignalState, ordinal: usize) -> Option<u8> {
        self.list(state).and_then(|l| l.get(ordinal).copied())
    }

    /// Pack a phase into the 16-bit channel mask.
    ///
    /// `Unknown` slots energise nothing.
    pub fn mask(&self, phase: &Phase, kinds: &[ApproachKind]) -> Result<u16, RelayError> {
        if phase.len() != kinds.len() {
            return Err(RelayError::Topology {
                expected: kinds.len(),
                found: phase.len(),
            });
        }
        let ordinals = slot_ordinals(kinds);
        let mut mask = 0u16;
        for (slot, state) in phase.states().iter().enumerate() {
            if *state == SignalState::Unknown {
                continue;
            }
            let channel = self
                .channel(*state, ordinals[slot])
                .ok_or(RelayError::Unmapped { slot, state: *state })?;
            if channel >= CHANNEL_COUNT {
                return Err(RelayError::InvalidChannel(channel));
            }
            mask |= 1 << channel;
        }
        Ok(mask)
    }

    /// Mask with every vehicle slot's yellow channel set.
    pub fn yellow_mask(&self, kinds: &[ApproachKind]) -> Result<u16, RelayError> {
        self.mask(&Phase::all_yellow(kinds), kinds)
    }

    /// Topology problems for a cycle with these slot kinds.
    ///
    /// Reports missing entries, channels past the board, and channels
    /// shared between states.
    pub fn validate(&self, kinds: &[ApproachKind]) -> Vec<String> {
        let mut errors = Vec::new();
        let ordinals = slot_ordinals(kinds);

        for (slot, kind) in kinds.iter().enumerate() {
            let states: &[SignalState] = match kind {
                ApproachKind::Vehicle => &[SignalState::Red, SignalState::Green, SignalState::Yellow],
                ApproachKind::Pedestrian => &[SignalState::RedPed, SignalState::GreenPed],
            };
            for state in states {
                if self.channel(*state, ordinals[slot]).is_none() {
                    errors.push(format!(
                        "relay.channels: no {} channel for slot {} ({} #{})",
                        state, slot, kind, ordinals[slot]
                    ));
                }
            }
        }

        let mut owners: HashMap<u8, SignalState> = HashMap::new();
        for state in [
            SignalState::Red,
            SignalState::Green,
            SignalState::Yellow,
            SignalState::RedPed,
            SignalState::GreenPed,
        ] {
            for &channel in self.list(state).unwrap_or_default() {
                if channel >= CHANNEL_COUNT {
                    errors.push(format!(
                        "relay.channels: {} channel {} exceeds {}",
                        state,
                        channel,
                        CHANNEL_COUNT - 1
                    ));
                }
                if let Some(prev) = owners.insert(channel, state) {
                    errors.push(format!(
                        "relay.channels: channel {} assigned to both {} and {}",
                        channel, prev, state
                    ));
                }
            }
        }

        errors
    }
}

/// Render a mask as the 4-digit uppercase hex used by `relay writeall`.
pub fn encode_mask(mask: u16) -> String {
    format!("{:04X}", mask)
}

/// Channels set in a mask, ascending.
pub fn channels_in(mask: u16) -> Vec<u8> {
    (0..CHANNEL_COUNT).filter(|c| mask & (1 << c) != 0).collect()
}

/// Find the hex status word in a `relay readall` response.
///
/// The board echoes the command and a prompt around the value; the last
/// token of one to four hex digits is taken.
pub fn parse_status(response: &str) -> Option<u16> {
    response
        .split_whitespace()
        .filter(|t| (1..=4).contains(&t.len()) && t.chars().all(|c| c.is_ascii_hexdigit()))
        .last()
        .and_then(|t| u16::from_str_radix(t, 16).ok())
}
