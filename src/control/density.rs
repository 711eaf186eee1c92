//! Report weighting and adaptive hold durations
//!
//! A report collected while phase `i` is asserted describes the period each
//! approach spent in phase `i - 1`, so it is weighted by the slot's state
//! there and stored in that phase's row of the density matrix. On each wrap
//! to phase 0 the rows are turned into new hold durations.
//!
//! Vehicle workers stay silent on `GREEN_PHASE`, so a slot's red period is
//! only measured when the slot is red in two consecutive phases. In a cycle
//! that alternates a slot between green and red, its red-period cell keeps
//! the configured ratio and `red_multiplier` never applies to it.

use super::ControlError;
use crate::types::{ApproachKind, Phase, SignalState};
use crate::workers::Report;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensitySettings {
    /// Multiplier applied to reports closing a vehicle green period.
    pub green_multiplier: f32,
    /// Multiplier applied to `max - d` for reports closing a red period.
    pub red_multiplier: f32,
    /// Lower clamp for weighted densities.
    pub min: f32,
    /// Upper clamp for weighted densities.
    pub max: f32,
    /// Floor for any planned hold (leaves room for the yellow).
    pub min_phase_ms: u64,
    /// Floor for phases with pedestrians waiting.
    pub min_pedestrian_ms: u64,
    /// Re-plan durations on every cycle wrap.
    pub adaptive: bool,
}

impl Default for DensitySettings {
    fn default() -> Self {
        Self {
            green_multiplier: 10.0,
            red_multiplier: 0.3,
            min: 0.0,
            max: 50.0,
            min_phase_ms: 5_000,
            min_pedestrian_ms: 25_000,
            adaptive: true,
        }
    }
}

/// Weight one report by the state its slot held while it was measured, then
/// clamp to `[min, max]`.
pub fn weight_density(previous: SignalState, density: f32, settings: &DensitySettings) -> f32 {
    let weighted = match previous {
        SignalState::Green => density * settings.green_multiplier,
        SignalState::Red => (settings.max - density) * settings.red_multiplier,
        SignalState::RedPed => 0.0,
        _ => density,
    };
    weighted.clamp(settings.min, settings.max)
}

/// Density matrix `[phase][slot]` plus the durations it was seeded from.
#[derive(Debug, Clone)]
pub struct DurationPlanner {
    settings: DensitySettings,
    kinds: Vec<ApproachKind>,
    original: Vec<Duration>,
    matrix: Vec<Vec<f32>>,
}

impl DurationPlanner {
    pub fn new(
        settings: DensitySettings,
        kinds: Vec<ApproachKind>,
        original: Vec<Duration>,
    ) -> Result<Self, ControlError> {
        if settings.min > settings.max {
            return Err(ControlError::Settings(format!(
                "density.min {} exceeds density.max {}",
                settings.min, settings.max
            )));
        }
        let mut planner = Self {
            matrix: vec![vec![0.0; kinds.len()]; original.len()],
            settings,
            kinds,
            original,
        };
        planner.reset_to_ratios();
        Ok(planner)
    }

    pub fn adaptive(&self) -> bool {
        self.settings.adaptive
    }

    pub fn matrix(&self) -> &[Vec<f32>] {
        &self.matrix
    }

    fn full_cycle(&self) -> Duration {
        self.original.iter().sum()
    }

    /// Fill every row with that phase's share of the configured cycle.
    pub fn reset_to_ratios(&mut self) {
        let full = self.full_cycle().as_secs_f32();
        for (row, duration) in self.matrix.iter_mut().zip(&self.original) {
            let ratio = if full > 0.0 { duration.as_secs_f32() / full } else { 0.0 };
            row.iter_mut().for_each(|v| *v = ratio);
        }
        debug!("Density matrix reset to configured ratios");
    }

    /// Store one tick's reports under the phase they were measured in.
    ///
    /// Any missing expected report resets the whole matrix to the configured
    /// ratios instead.
    pub fn record(&mut self, measured_index: usize, measured: &Phase, reports: &[Report]) {
        if reports.iter().any(Report::is_missing) {
            warn!(phase = measured_index, "Missing report, densities reset to configured ratios");
            self.reset_to_ratios();
            return;
        }
        let Some(row) = self.matrix.get_mut(measured_index) else {
            return;
        };
        for (slot, report) in reports.iter().enumerate() {
            if let (Report::Value(d), Some(cell)) = (report, row.get_mut(slot)) {
                let previous = measured.get(slot).unwrap_or_default();
                *cell = weight_density(previous, *d, &self.settings);
                debug!(phase = measured_index, approach = slot, raw = *d, weighted = *cell, "Density recorded");
            }
        }
    }

    /// Hold durations for the next cycle.
    ///
    /// Each phase gets its share of the summed vehicle density times the
    /// configured cycle length, floored at `min_phase_ms`. A zero total or
    /// any share beyond the full cycle falls back to the configured
    /// durations. Phases with waiting pedestrians are then floored at
    /// `min_pedestrian_ms`.
    pub fn plan(&self) -> Vec<Duration> {
        let full_ms = self.full_cycle().as_millis() as f32;
        let mut vehicle = vec![0.0_f32; self.matrix.len()];
        let mut pedestrian = vec![0.0_f32; self.matrix.len()];

        for (p, row) in self.matrix.iter().enumerate() {
            for (value, kind) in row.iter().zip(&self.kinds) {
                match kind {
                    ApproachKind::Vehicle => vehicle[p] += value,
                    ApproachKind::Pedestrian => pedestrian[p] += value,
                }
            }
        }

        let total: f32 = vehicle.iter().sum();
        if total <= 0.0 {
            info!("No vehicle density this cycle, keeping configured durations");
            return self.original.clone();
        }

        let min_phase = self.settings.min_phase_ms as f32;
        let min_ped = self.settings.min_pedestrian_ms as f32;
        let mut planned = Vec::with_capacity(self.matrix.len());

        for p in 0..self.matrix.len() {
            let mut ms = (vehicle[p] / total * full_ms).max(min_phase);
            if ms > full_ms {
                warn!(phase = p, planned_ms = ms as u64, "Planned hold exceeds cycle, keeping configured durations");
                return self.original.clone();
            }
            if pedestrian[p] > 0.0 {
                ms = ms.max(min_ped);
            }
            info!(phase = p, hold_ms = ms.round() as u64, "Phase hold planned");
            planned.push(Duration::from_millis(ms.round() as u64));
        }
        planned
    }
}
