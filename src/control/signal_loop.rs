//! The signal cycle driver
//!
//! Per tick: assert phase `P[i]` on the relays, broadcast it to the workers,
//! collect reports within the hold, wait out the hold, assert and hold the
//! derived transition, advance. Sensor and actuator faults are logged and the
//! cycle keeps running; only a lost worker stops it (after standby).

use super::density::DurationPlanner;
use super::phase_controller::PhaseController;
use super::ControlError;
use crate::relay::{flash_standby, RelayActuator};
use crate::types::Phase;
use crate::workers::WorkerOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Fixed timings around the phase holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    /// Hold for a derived transition phase.
    pub transition: Duration,
    /// Total standby flashing after a worker is lost.
    pub standby: Duration,
    /// On and off time of each standby flash.
    pub standby_flash: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            transition: Duration::from_millis(5_000),
            standby: Duration::from_millis(60_000),
            standby_flash: Duration::from_millis(500),
        }
    }
}

enum Tick {
    Continue,
    Stopped,
}

pub struct SignalLoop {
    controller: PhaseController,
    orchestrator: WorkerOrchestrator,
    relay: Arc<dyn RelayActuator>,
    planner: DurationPlanner,
    timing: LoopTiming,
    cycles: u64,
}

impl SignalLoop {
    pub fn new(
        controller: PhaseController,
        orchestrator: WorkerOrchestrator,
        relay: Arc<dyn RelayActuator>,
        planner: DurationPlanner,
        timing: LoopTiming,
    ) -> Result<Self, ControlError> {
        let slots = controller.cycle().width();
        if orchestrator.len() != slots {
            return Err(ControlError::WorkerCount {
                workers: orchestrator.len(),
                slots,
            });
        }
        Ok(Self {
            controller,
            orchestrator,
            relay,
            planner,
            timing,
            cycles: 0,
        })
    }

    /// Run until cancelled or a worker is lost. Either way the workers are
    /// stopped and every relay is turned off before returning.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ControlError> {
        info!(
            phases = self.controller.cycle().len(),
            approaches = self.controller.cycle().width(),
            backend = self.relay.backend_name(),
            "Signal loop started"
        );

        let result = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }
            match self.tick(&cancel).await {
                Ok(Tick::Continue) => {}
                Ok(Tick::Stopped) => break Ok(()),
                Err(e) => {
                    error!(error = %e, "Signal loop halted");
                    let kinds = self.controller.cycle().approach_kinds().to_vec();
                    flash_standby(
                        self.relay.as_ref(),
                        &kinds,
                        self.timing.standby,
                        self.timing.standby_flash,
                        &cancel,
                    )
                    .await;
                    break Err(e);
                }
            }
        };

        self.orchestrator.shutdown().await;
        if let Err(e) = self.relay.all_off().await {
            warn!(error = %e, "Failed to turn relays off on shutdown");
        }
        self.relay.close().await;
        info!(cycles = self.cycles, "Signal loop stopped");
        result
    }

    async fn tick(&mut self, cancel: &CancellationToken) -> Result<Tick, ControlError> {
        let index = self.controller.index();
        let phase = self.controller.current().clone();
        let hold = self.controller.hold_duration();
        let hold_end = Instant::now() + hold;

        info!(phase = index, states = %phase, hold_ms = hold.as_millis() as u64, "Phase start");
        self.actuate(&phase).await;
        self.orchestrator.broadcast_phase(&phase)?;

        let reports = tokio::select! {
            _ = cancel.cancelled() => return Ok(Tick::Stopped),
            r = self.orchestrator.collect_reports(hold) => r,
        };
        if let Some(lost) = self.orchestrator.lost_worker() {
            return Err(lost.into());
        }
        let measured_index = self.controller.previous_index();
        let measured = self.controller.previous().clone();
        self.planner.record(measured_index, &measured, &reports);

        if !pause_until(hold_end, cancel).await {
            return Ok(Tick::Stopped);
        }

        let transition = self.controller.transition();
        if transition != phase {
            info!(phase = index, states = %transition, "Transition");
            self.actuate(&transition).await;
            if !pause_until(Instant::now() + self.timing.transition, cancel).await {
                return Ok(Tick::Stopped);
            }
        }

        if self.controller.advance() {
            self.cycles += 1;
            if self.planner.adaptive() {
                let planned = self.planner.plan();
                if let Err(e) = self.controller.cycle_mut().set_durations(planned) {
                    warn!(error = %e, "Planned durations rejected, keeping current");
                }
            }
        }
        Ok(Tick::Continue)
    }

    async fn actuate(&self, phase: &Phase) {
        if let Err(e) = self.relay.assert_phase(phase).await {
            error!(backend = self.relay.backend_name(), states = %phase, error = %e, "Relay write failed");
        }
    }
}

/// Sleep until `deadline`. False when cancelled first.
async fn pause_until(deadline: Instant, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep_until(deadline) => true,
    }
}
