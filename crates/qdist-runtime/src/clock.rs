//! Global tick barrier.
//!
//! The [`Clock`] drives every attached node through ticks `0..=max_tick`.
//! Tick `t + 1` is only released once every node reported tick `t` as done,
//! so no node ever runs ahead of another. A node reporting a failure, or a
//! barrier that is not reached within the configured timeout, stops the
//! clock for everyone.
//!
//! | Phase | Meaning |
//! |-------|---------|
//! | `Idle` | no run configured |
//! | `Ready` | `initialise()` set the maximum tick |
//! | `Running` | `start()` is releasing ticks |
//! | `Stopped` | the run ended; see [`StopReason`] |
//!
//! The maximum tick stays set after a run, so `start()` from `Stopped`
//! replays the same range without another `initialise()`.
//!
//! Each run gets a fresh *epoch*. Ticks and reports are stamped with it, so
//! leftovers from an aborted run never leak into the next one.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, instrument, warn};

use qdist_ir::NodeId;

use crate::config::ClockConfig;
use crate::error::{RuntimeError, RuntimeResult};

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// Every tick up to the maximum was completed.
    Completed,
    /// A node reported a failure.
    Fault {
        /// Failing node.
        node: NodeId,
        /// Tick the failure happened at.
        tick: u64,
        /// Failure description.
        message: String,
    },
    /// Not every node reported within the barrier timeout.
    BarrierTimeout {
        /// Tick that was not completed.
        tick: u64,
        /// Nodes that stayed silent.
        missing: Vec<NodeId>,
    },
    /// The run was cancelled.
    Aborted,
}

impl StopReason {
    /// Whether the run completed normally.
    pub fn is_completed(&self) -> bool {
        matches!(self, StopReason::Completed)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Completed => f.write_str("completed"),
            StopReason::Fault {
                node,
                tick,
                message,
            } => write!(f, "{node} failed at tick {tick}: {message}"),
            StopReason::BarrierTimeout { tick, missing } => {
                let names: Vec<&str> = missing.iter().map(NodeId::as_str).collect();
                write!(
                    f,
                    "barrier timeout at tick {tick}, no response from {}",
                    names.join(", ")
                )
            }
            StopReason::Aborted => f.write_str("aborted"),
        }
    }
}

/// Lifecycle phase of the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockPhase {
    /// No run configured.
    Idle,
    /// Maximum tick set, waiting for `start()`.
    Ready,
    /// Releasing ticks.
    Running,
    /// Run ended.
    Stopped(StopReason),
}

/// Observable clock state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockState {
    /// Lifecycle phase.
    pub phase: ClockPhase,
    /// Current tick.
    pub tick: u64,
    /// Nodes that completed the current tick.
    pub responses: usize,
    /// Run counter.
    pub epoch: u64,
}

/// What a node tells the clock about a tick.
#[derive(Debug)]
enum Outcome {
    Done,
    Failed(String),
}

#[derive(Debug)]
struct Report {
    node: NodeId,
    epoch: u64,
    tick: u64,
    outcome: Outcome,
}

struct ClockInner {
    nodes: Mutex<BTreeMap<NodeId, mpsc::UnboundedSender<(u64, u64)>>>,
    report_tx: mpsc::UnboundedSender<Report>,
    report_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Report>>,
    state: watch::Sender<ClockState>,
    max_tick: Mutex<Option<u64>>,
    started_epoch: AtomicU64,
    barrier_timeout: Duration,
}

/// Tick barrier shared by the controller and all nodes.
#[derive(Clone)]
pub struct Clock {
    inner: Arc<ClockInner>,
}

impl Clock {
    /// Create a clock that waits at most `barrier_timeout` for each tick.
    pub fn new(barrier_timeout: Duration) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ClockState {
            phase: ClockPhase::Idle,
            tick: 0,
            responses: 0,
            epoch: 0,
        });
        Self {
            inner: Arc::new(ClockInner {
                nodes: Mutex::new(BTreeMap::new()),
                report_tx,
                report_rx: tokio::sync::Mutex::new(report_rx),
                state,
                max_tick: Mutex::new(None),
                started_epoch: AtomicU64::new(0),
                barrier_timeout,
            }),
        }
    }

    /// Create a clock from configuration.
    pub fn from_config(config: &ClockConfig) -> Self {
        Self::new(config.barrier_timeout())
    }

    /// Current state.
    pub fn state(&self) -> ClockState {
        self.inner.state.borrow().clone()
    }

    /// Attached nodes.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.lock_nodes().keys().cloned().collect()
    }

    fn lock_nodes(
        &self,
    ) -> std::sync::MutexGuard<'_, BTreeMap<NodeId, mpsc::UnboundedSender<(u64, u64)>>> {
        self.inner
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.inner.state.borrow().phase == ClockPhase::Running
    }

    /// Attach `node` and return the link it listens on.
    pub fn attach(&self, node: impl Into<NodeId>) -> RuntimeResult<ClockLink> {
        let node = node.into();
        if self.is_running() {
            return Err(RuntimeError::Protocol(format!(
                "cannot attach {node} while the clock is running"
            )));
        }
        let mut nodes = self.lock_nodes();
        if nodes.contains_key(&node) {
            return Err(RuntimeError::Protocol(format!("{node} is already attached")));
        }
        let (tick_tx, ticks) = mpsc::unbounded_channel();
        nodes.insert(node.clone(), tick_tx);
        debug!("Attached {} to the clock", node);

        let state = self.inner.state.subscribe();
        let finished_epoch = {
            let current = state.borrow();
            // A node joining a prepared run takes part in it.
            match current.phase {
                ClockPhase::Ready => current.epoch.saturating_sub(1),
                _ => current.epoch,
            }
        };
        Ok(ClockLink {
            node,
            ticks,
            reports: self.inner.report_tx.clone(),
            state,
            epoch: finished_epoch,
            finished_epoch,
        })
    }

    /// Detach `node`.
    pub fn detach(&self, node: &NodeId) -> RuntimeResult<()> {
        if self.is_running() {
            return Err(RuntimeError::Protocol(format!(
                "cannot detach {node} while the clock is running"
            )));
        }
        self.lock_nodes()
            .remove(node)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::Protocol(format!("{node} is not attached")))
    }

    /// Prepare a run up to and including `max_tick`.
    pub fn initialise(&self, max_tick: u64) -> RuntimeResult<()> {
        if self.is_running() {
            return Err(RuntimeError::Protocol(
                "cannot initialise a running clock".to_string(),
            ));
        }
        *self
            .inner
            .max_tick
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(max_tick);
        self.inner.state.send_modify(|s| {
            s.phase = ClockPhase::Ready;
            s.tick = 0;
            s.responses = 0;
            s.epoch += 1;
        });
        Ok(())
    }

    /// Stop the current run. A running `start()` returns at its next
    /// barrier; waiting nodes are released immediately.
    pub fn abort(&self) {
        self.inner.state.send_modify(|s| {
            if !matches!(s.phase, ClockPhase::Stopped(_)) {
                s.phase = ClockPhase::Stopped(StopReason::Aborted);
            }
        });
    }

    fn stop(&self, reason: StopReason) {
        self.inner
            .state
            .send_modify(|s| s.phase = ClockPhase::Stopped(reason));
    }

    fn aborted(&self) -> bool {
        matches!(
            self.inner.state.borrow().phase,
            ClockPhase::Stopped(StopReason::Aborted)
        )
    }

    /// Whether the current epoch already ran and has stopped.
    fn is_stopped_run(&self) -> bool {
        let state = self.inner.state.borrow();
        matches!(state.phase, ClockPhase::Stopped(_))
            && self.inner.started_epoch.load(Ordering::SeqCst) == state.epoch
    }

    /// Run ticks `0..=max_tick`, releasing each tick once every attached
    /// node completed the previous one.
    ///
    /// Starting a stopped clock opens a new run over the same range.
    #[instrument(skip(self))]
    pub async fn start(&self) -> RuntimeResult<StopReason> {
        let max_tick = *self
            .inner
            .max_tick
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let max_tick = match max_tick {
            Some(max) if max > 0 => max,
            _ => {
                return Err(RuntimeError::Unconfigured(
                    "clock maximum tick is not set".to_string(),
                ));
            }
        };
        if self.is_stopped_run() {
            self.inner.state.send_modify(|s| {
                s.phase = ClockPhase::Ready;
                s.tick = 0;
                s.responses = 0;
                s.epoch += 1;
            });
        } else if self.aborted() {
            // Aborted between initialise() and start().
            let epoch = self.inner.state.borrow().epoch;
            self.inner.started_epoch.store(epoch, Ordering::SeqCst);
            return Ok(StopReason::Aborted);
        }

        let Ok(mut reports) = self.inner.report_rx.try_lock() else {
            return Err(RuntimeError::Protocol("clock is already running".to_string()));
        };
        while reports.try_recv().is_ok() {}

        let links: Vec<(NodeId, mpsc::UnboundedSender<(u64, u64)>)> = self
            .lock_nodes()
            .iter()
            .map(|(n, tx)| (n.clone(), tx.clone()))
            .collect();
        if links.is_empty() {
            return Err(RuntimeError::Unconfigured(
                "no nodes attached to the clock".to_string(),
            ));
        }

        let epoch = self.inner.state.borrow().epoch;
        self.inner.started_epoch.store(epoch, Ordering::SeqCst);
        self.inner.state.send_modify(|s| s.phase = ClockPhase::Running);
        info!("Clock started: {} nodes, ticks 0..={}", links.len(), max_tick);

        let reason = self.run_ticks(&mut reports, &links, epoch, max_tick).await;
        self.stop(reason.clone());
        info!("Clock stopped: {:?}", reason);
        Ok(reason)
    }

    async fn run_ticks(
        &self,
        reports: &mut mpsc::UnboundedReceiver<Report>,
        links: &[(NodeId, mpsc::UnboundedSender<(u64, u64)>)],
        epoch: u64,
        max_tick: u64,
    ) -> StopReason {
        for tick in 0..=max_tick {
            if self.aborted() {
                return StopReason::Aborted;
            }
            self.inner.state.send_modify(|s| {
                s.tick = tick;
                s.responses = 0;
            });

            let mut pending: BTreeSet<NodeId> = BTreeSet::new();
            for (node, tx) in links {
                if tx.send((epoch, tick)).is_ok() {
                    pending.insert(node.clone());
                } else {
                    warn!("{} dropped its clock link", node);
                    return StopReason::Fault {
                        node: node.clone(),
                        tick,
                        message: "clock link closed".to_string(),
                    };
                }
            }

            let deadline = Instant::now() + self.inner.barrier_timeout;
            while !pending.is_empty() {
                let report = match timeout_at(deadline, reports.recv()).await {
                    Ok(Some(report)) => report,
                    Ok(None) => return StopReason::Aborted,
                    Err(_) => {
                        warn!("Barrier timeout at tick {}: {:?}", tick, pending);
                        return StopReason::BarrierTimeout {
                            tick,
                            missing: pending.into_iter().collect(),
                        };
                    }
                };
                if report.epoch != epoch || report.tick != tick {
                    debug!(
                        "Ignoring stale report from {} (epoch {}, tick {})",
                        report.node, report.epoch, report.tick
                    );
                    continue;
                }
                match report.outcome {
                    Outcome::Failed(message) => {
                        warn!("{} failed at tick {}: {}", report.node, tick, message);
                        return StopReason::Fault {
                            node: report.node,
                            tick,
                            message,
                        };
                    }
                    Outcome::Done => {
                        if pending.remove(&report.node) {
                            self.inner.state.send_modify(|s| s.responses += 1);
                        }
                    }
                }
            }
        }
        StopReason::Completed
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("nodes", &self.nodes())
            .field("state", &self.state())
            .field("barrier_timeout", &self.inner.barrier_timeout)
            .finish()
    }
}

/// What a node waiting on its link is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockSignal {
    /// Execute the operations due at this tick.
    Tick(u64),
    /// The run ended.
    Stopped(StopReason),
}

/// A node's end of the clock.
pub struct ClockLink {
    node: NodeId,
    ticks: mpsc::UnboundedReceiver<(u64, u64)>,
    reports: mpsc::UnboundedSender<Report>,
    state: watch::Receiver<ClockState>,
    epoch: u64,
    finished_epoch: u64,
}

impl ClockLink {
    /// Node owning the link.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Wait for the next tick or the end of the current run.
    ///
    /// A stop is delivered once per run.
    pub async fn next_tick(&mut self) -> ClockSignal {
        loop {
            if let Some(reason) = self.take_stop() {
                return ClockSignal::Stopped(reason);
            }
            tokio::select! {
                biased;
                changed = self.state.changed() => {
                    if changed.is_err() {
                        return ClockSignal::Stopped(StopReason::Aborted);
                    }
                }
                tick = self.ticks.recv() => match tick {
                    Some((epoch, tick)) if epoch > self.finished_epoch => {
                        self.epoch = epoch;
                        return ClockSignal::Tick(tick);
                    }
                    Some(_) => {}
                    None => return ClockSignal::Stopped(StopReason::Aborted),
                },
            }
        }
    }

    fn take_stop(&mut self) -> Option<StopReason> {
        let (reason, epoch) = {
            let state = self.state.borrow_and_update();
            match &state.phase {
                ClockPhase::Stopped(reason) if state.epoch > self.finished_epoch => {
                    (reason.clone(), state.epoch)
                }
                _ => return None,
            }
        };
        self.finished_epoch = epoch;
        Some(reason)
    }

    /// Epoch of the last run this link saw stop.
    pub fn epoch(&self) -> u64 {
        self.finished_epoch
    }

    /// Whether the run this node takes part in has been stopped.
    pub fn is_stopped(&self) -> bool {
        let state = self.state.borrow();
        matches!(state.phase, ClockPhase::Stopped(_)) && state.epoch > self.finished_epoch
    }

    /// Report `tick` as done.
    pub fn complete(&self, tick: u64) {
        self.report(tick, Outcome::Done);
    }

    /// Report a failure at `tick`.
    pub fn fail(&self, tick: u64, message: impl Into<String>) {
        self.report(tick, Outcome::Failed(message.into()));
    }

    fn report(&self, tick: u64, outcome: Outcome) {
        let report = Report {
            node: self.node.clone(),
            epoch: self.epoch,
            tick,
            outcome,
        };
        if self.reports.send(report).is_err() {
            warn!("{}: clock is gone, report for tick {} dropped", self.node, tick);
        }
    }
}

impl fmt::Debug for ClockLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockLink")
            .field("node", &self.node)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}
