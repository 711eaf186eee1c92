//! Fan phase commands out to approach workers and gather their reports

use super::wire::{decode_report, encode_command};
use super::worker::{ApproachWorker, WorkerSpec};
use crate::config::defaults::WORKER_SHUTDOWN_GRACE_SECS;
use crate::telemetry::TelemetrySink;
use crate::types::{ApproachKind, Phase};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Command/report channel depth per worker.
const CHANNEL_CAPACITY: usize = 8;

/// Outcome of one report collection for one approach.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// The worker answered with this metric.
    Value(f32),
    /// The broadcast command does not produce a report (or was not sent).
    NotExpected,
    /// No answer before the deadline.
    TimedOut,
    /// The answer did not parse.
    Malformed(String),
    /// The worker's report channel is closed.
    Disconnected,
}

impl Report {
    /// Metric for this tick; anything but a real answer counts as 0.
    pub fn value(&self) -> f32 {
        match self {
            Report::Value(v) => *v,
            _ => 0.0,
        }
    }

    /// An expected report that never arrived in usable form.
    pub fn is_missing(&self) -> bool {
        matches!(self, Report::TimedOut | Report::Malformed(_) | Report::Disconnected)
    }
}

/// A worker died or dropped its channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLost {
    pub slot: usize,
    pub name: String,
}

/// Orchestrator-side ends of one worker's channels. Only writes commands and
/// only reads reports.
#[derive(Debug)]
pub struct WorkerHandle {
    pub slot: usize,
    pub name: String,
    pub kind: ApproachKind,
    commands: mpsc::Sender<String>,
    reports: mpsc::Receiver<String>,
    expecting: bool,
    /// Timed-out reports still in flight; the next this many are stale.
    owed: usize,
    closed: bool,
}

impl WorkerHandle {
    /// Wire an externally driven worker. Returns the handle plus the worker
    /// ends (command receiver, report sender).
    pub fn pair(slot: usize, name: &str, kind: ApproachKind) -> (Self, mpsc::Receiver<String>, mpsc::Sender<String>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (rep_tx, rep_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = Self {
            slot,
            name: name.to_string(),
            kind,
            commands: cmd_tx,
            reports: rep_rx,
            expecting: false,
            owed: 0,
            closed: false,
        };
        (handle, cmd_rx, rep_tx)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

pub struct WorkerOrchestrator {
    workers: Vec<WorkerHandle>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
}

impl WorkerOrchestrator {
    /// Start one task per approach, in slot order.
    pub fn spawn(specs: Vec<WorkerSpec>, telemetry: Arc<dyn TelemetrySink>, cancel: CancellationToken) -> Self {
        let mut tasks = JoinSet::new();
        let mut workers = Vec::with_capacity(specs.len());

        for (slot, spec) in specs.into_iter().enumerate() {
            let (handle, cmd_rx, rep_tx) = WorkerHandle::pair(slot, &spec.name, spec.kind);
            let worker = ApproachWorker::new(slot, spec, cmd_rx, rep_tx, telemetry.clone());
            tasks.spawn(worker.run(cancel.child_token()));
            workers.push(handle);
        }

        info!(workers = workers.len(), "Approach workers spawned");
        Self {
            workers,
            tasks,
            cancel,
        }
    }

    /// Drive workers whose ends the caller owns.
    pub fn from_handles(workers: Vec<WorkerHandle>, cancel: CancellationToken) -> Self {
        Self {
            workers,
            tasks: JoinSet::new(),
            cancel,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    /// Send each slot's command to its worker.
    ///
    /// Late reports from earlier ticks are discarded first so the following
    /// collection only sees answers to this broadcast. A worker that timed
    /// out still owes its answer; when it arrives after this drain,
    /// [`collect_reports`](Self::collect_reports) drops it instead of
    /// counting it for the new tick. Slots whose state has
    /// no worker command (yellow, unknown) are skipped.
    pub fn broadcast_phase(&mut self, phase: &Phase) -> Result<(), WorkerLost> {
        for worker in &mut self.workers {
            worker.expecting = false;
            loop {
                match worker.reports.try_recv() {
                    Ok(late) => {
                        worker.owed = worker.owed.saturating_sub(1);
                        debug!(approach = worker.slot, report = %late, "Discarding late report");
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        worker.closed = true;
                        break;
                    }
                }
            }
            if worker.closed {
                error!(approach = worker.slot, name = %worker.name, "Worker report channel closed");
                return Err(WorkerLost {
                    slot: worker.slot,
                    name: worker.name.clone(),
                });
            }

            let Some(command) = phase.get(worker.slot).and_then(|s| s.command()) else {
                continue;
            };
            match worker.commands.try_send(encode_command(command)) {
                Ok(()) => worker.expecting = command.expects_report(),
                Err(TrySendError::Full(_)) => {
                    warn!(approach = worker.slot, command = %command, "Worker command queue full, command dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    worker.closed = true;
                    error!(approach = worker.slot, name = %worker.name, "Worker command channel closed");
                    return Err(WorkerLost {
                        slot: worker.slot,
                        name: worker.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Wait up to `timeout` for every expected report.
    ///
    /// Never fails: missing answers come back as `TimedOut`, `Malformed` or
    /// `Disconnected`, all of which read as 0.
    pub async fn collect_reports(&mut self, timeout: Duration) -> Vec<Report> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut out = Vec::with_capacity(self.workers.len());

        for worker in &mut self.workers {
            if !worker.expecting {
                out.push(Report::NotExpected);
                continue;
            }
            worker.expecting = false;

            let received = loop {
                match tokio::time::timeout_at(deadline, worker.reports.recv()).await {
                    Ok(Some(late)) if worker.owed > 0 => {
                        worker.owed -= 1;
                        debug!(approach = worker.slot, report = %late, "Discarding report owed from an earlier tick");
                    }
                    other => break other,
                }
            };
            let report = match received {
                Ok(Some(payload)) => match decode_report(&payload) {
                    Ok(v) => Report::Value(v),
                    Err(e) => {
                        warn!(approach = worker.slot, payload = %payload, error = %e, "Malformed report");
                        Report::Malformed(payload)
                    }
                },
                Ok(None) => {
                    worker.closed = true;
                    error!(approach = worker.slot, name = %worker.name, "Worker exited before reporting");
                    Report::Disconnected
                }
                Err(_) => {
                    warn!(approach = worker.slot, timeout_ms = timeout.as_millis() as u64, "No report before deadline, using 0");
                    worker.owed += 1;
                    Report::TimedOut
                }
            };
            out.push(report);
        }

        out
    }

    /// First worker known to be gone, if any.
    pub fn lost_worker(&self) -> Option<WorkerLost> {
        self.workers.iter().find(|w| w.closed).map(|w| WorkerLost {
            slot: w.slot,
            name: w.name.clone(),
        })
    }

    /// Cancel every worker and wait briefly for them to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let drain = async { while self.tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(Duration::from_secs(WORKER_SHUTDOWN_GRACE_SECS), drain).await.is_err() {
            warn!("Workers did not stop in time, aborting");
            self.tasks.abort_all();
        }
        info!("Approach workers shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalState;

    fn two_vehicles() -> (
        WorkerOrchestrator,
        Vec<(mpsc::Receiver<String>, mpsc::Sender<String>)>,
    ) {
        let mut handles = Vec::new();
        let mut ends = Vec::new();
        for slot in 0..2 {
            let (h, rx, tx) = WorkerHandle::pair(slot, &format!("v{}", slot), ApproachKind::Vehicle);
            handles.push(h);
            ends.push((rx, tx));
        }
        (WorkerOrchestrator::from_handles(handles, CancellationToken::new()), ends)
    }

    #[tokio::test(start_paused = true)]
    async fn silent_worker_reads_as_zero() {
        let (mut orch, mut ends) = two_vehicles();
        orch.broadcast_phase(&Phase::new(vec![SignalState::Red, SignalState::Red]))
            .unwrap();

        assert_eq!(ends[0].0.recv().await.unwrap(), "RED_PHASE");
        ends[0].1.send("4.25".to_string()).await.unwrap();

        let reports = orch.collect_reports(Duration::from_secs(10)).await;
        assert_eq!(reports[0], Report::Value(4.25));
        assert_eq!(reports[1], Report::TimedOut);
        assert_eq!(reports[1].value(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn green_slot_expects_nothing() {
        let (mut orch, mut ends) = two_vehicles();
        orch.broadcast_phase(&Phase::new(vec![SignalState::Green, SignalState::Yellow]))
            .unwrap();
        assert_eq!(ends[0].0.recv().await.unwrap(), "GREEN_PHASE");
        assert!(ends[1].0.try_recv().is_err(), "yellow is never broadcast");

        let started = tokio::time::Instant::now();
        let reports = orch.collect_reports(Duration::from_secs(10)).await;
        assert_eq!(reports, vec![Report::NotExpected, Report::NotExpected]);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn late_report_is_discarded_next_tick() {
        let (mut orch, mut ends) = two_vehicles();
        let red = Phase::new(vec![SignalState::Red, SignalState::Red]);
        orch.broadcast_phase(&red).unwrap();
        let first = orch.collect_reports(Duration::from_secs(1)).await;
        assert_eq!(first, vec![Report::TimedOut, Report::TimedOut]);

        // answers to the old tick arrive after its deadline
        ends[0].1.send("9.00".to_string()).await.unwrap();
        orch.broadcast_phase(&red).unwrap();
        ends[0].1.send("1.50".to_string()).await.unwrap();
        let second = orch.collect_reports(Duration::from_secs(1)).await;
        assert_eq!(second[0], Report::Value(1.5));
    }

    #[tokio::test(start_paused = true)]
    async fn report_owed_past_the_drain_is_not_counted() {
        let (mut orch, mut ends) = two_vehicles();
        let red = Phase::new(vec![SignalState::Red, SignalState::Green]);
        orch.broadcast_phase(&red).unwrap();
        assert_eq!(orch.collect_reports(Duration::from_secs(1)).await[0], Report::TimedOut);

        // stuck worker answers the old tick only after the next broadcast
        orch.broadcast_phase(&red).unwrap();
        ends[0].1.send("9.00".to_string()).await.unwrap();
        ends[0].1.send("1.50".to_string()).await.unwrap();
        let reports = orch.collect_reports(Duration::from_secs(1)).await;
        assert_eq!(reports[0], Report::Value(1.5));

        // nothing owed any more: the next answer counts
        orch.broadcast_phase(&red).unwrap();
        ends[0].1.send("2.00".to_string()).await.unwrap();
        assert_eq!(orch.collect_reports(Duration::from_secs(1)).await[0], Report::Value(2.0));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_worker_is_observable() {
        let (mut orch, mut ends) = two_vehicles();
        let red = Phase::new(vec![SignalState::Red, SignalState::Red]);
        orch.broadcast_phase(&red).unwrap();
        let (_, tx) = ends.remove(1);
        drop(tx);

        let reports = orch.collect_reports(Duration::from_secs(1)).await;
        assert_eq!(reports[1], Report::Disconnected);
        assert_eq!(orch.lost_worker().map(|w| w.slot), Some(1));
        assert!(orch.broadcast_phase(&red).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_report_is_missing() {
        let (mut orch, ends) = two_vehicles();
        orch.broadcast_phase(&Phase::new(vec![SignalState::Red, SignalState::Green]))
            .unwrap();
        ends[0].1.send("n/a".to_string()).await.unwrap();
        let reports = orch.collect_reports(Duration::from_secs(1)).await;
        assert!(reports[0].is_missing());
        assert_eq!(reports[0].value(), 0.0);
        assert_eq!(reports[1], Report::NotExpected);
    }
}
