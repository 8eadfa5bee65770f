//! Run driver.
//!
//! The [`Controller`] compiles a circuit, schedules it, and drives one
//! distributed run:
//!
//! 1. broadcast the schedule assignment to every node
//! 2. wait until every node acknowledged it
//! 3. initialise and start the clock
//! 4. collect one result record per node
//!
//! A node that never answers does not block the controller: missing
//! acknowledgments fail the run with a transport timeout, and missing
//! result records are turned into error records.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use qdist_compile::PassManagerBuilder;
use qdist_hal::{Message, Transport};
use qdist_ir::{Circuit, NodeId};
use qdist_sched::{Schedule, ScheduleAssignment, Scheduler, TimingProfile};

use crate::clock::Clock;
use crate::config::ControllerConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::report::{NodeReport, RunResults};

/// Endpoint id of the controller.
pub const CONTROLLER_ID: &str = "controller";

/// Compiles, schedules and runs circuits on a set of nodes.
pub struct Controller {
    id: NodeId,
    transport: Arc<dyn Transport>,
    clock: Clock,
    nodes: Vec<NodeId>,
    scheduler: Scheduler,
    config: ControllerConfig,
    merge_runs: bool,
    pooled_pairs: bool,
}

impl Controller {
    /// Create a controller driving `nodes` through `clock`.
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Clock,
        nodes: Vec<NodeId>,
        profile: TimingProfile,
        config: ControllerConfig,
    ) -> Self {
        Self {
            id: transport.local_id().clone(),
            transport,
            clock,
            nodes,
            scheduler: Scheduler::new(profile),
            config,
            merge_runs: true,
            pooled_pairs: true,
        }
    }

    /// Enable or disable merging of cross-node runs.
    #[must_use]
    pub fn with_run_merging(mut self, enabled: bool) -> Self {
        self.merge_runs = enabled;
        self
    }

    /// Keep pair halves in the entanglement pool.
    #[must_use]
    pub fn with_pooled_pairs(mut self, pooled: bool) -> Self {
        self.pooled_pairs = pooled;
        self
    }

    /// Controller endpoint id.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Nodes driven by this controller.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// The shared clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Timing profile used for scheduling.
    pub fn profile(&self) -> &TimingProfile {
        self.scheduler.profile()
    }

    /// Rewrite every cross-node gate into local operations.
    pub fn compile(&self, circuit: &Circuit) -> RuntimeResult<Circuit> {
        let (pm, mut properties) = PassManagerBuilder::new()
            .with_run_merging(self.merge_runs)
            .with_pooled_pairs(self.pooled_pairs)
            .build();
        Ok(pm.run(circuit, &mut properties)?)
    }

    /// Assign due ticks to a compiled circuit.
    pub fn schedule(&self, circuit: &Circuit) -> RuntimeResult<Schedule> {
        Ok(self.scheduler.schedule(circuit)?)
    }

    /// Compile, schedule and run `circuit`.
    pub async fn execute(&self, circuit: &Circuit) -> RuntimeResult<RunResults> {
        let compiled = self.compile(circuit)?;
        let schedule = self.schedule(&compiled)?;
        self.run(&schedule).await
    }

    /// Run a schedule.
    #[instrument(skip(self, schedule), fields(max_tick = schedule.max_tick()))]
    pub async fn run(&self, schedule: &Schedule) -> RuntimeResult<RunResults> {
        self.run_assignment(ScheduleAssignment::from_schedule(schedule), schedule.max_tick())
            .await
    }

    /// Run a raw assignment up to and including `max_tick`.
    ///
    /// Records are validated by the nodes when they become due, so a
    /// malformed record halts the run instead of failing here.
    pub async fn run_assignment(
        &self,
        assignment: ScheduleAssignment,
        max_tick: u64,
    ) -> RuntimeResult<RunResults> {
        if max_tick == 0 {
            return Err(RuntimeError::Unconfigured(
                "schedule has no ticks to run".to_string(),
            ));
        }
        let started_at = Utc::now();
        let payload = assignment.to_json()?;
        let receivers = self
            .transport
            .broadcast(Message::Schedule { payload })
            .await?;
        debug!("Schedule broadcast to {} endpoints", receivers);

        let (acked, missing) = self.collect_acks().await?;
        if let Some(node) = missing.first() {
            warn!("No acknowledgment from {:?}", missing);
            // Release the nodes that are already waiting for ticks.
            self.clock.initialise(max_tick)?;
            self.clock.abort();
            self.collect_reports(&acked, self.clock.state().epoch).await?;
            return Err(RuntimeError::TransportTimeout {
                node: node.clone(),
                waiting_for: "schedule acknowledgment".to_string(),
            });
        }

        self.clock.initialise(max_tick)?;
        let epoch = self.clock.state().epoch;
        let stop = match self.clock.start().await {
            Ok(stop) => stop,
            Err(e) => {
                self.clock.abort();
                return Err(e);
            }
        };

        let reports = self.collect_reports(&self.nodes, epoch).await?;
        let results = RunResults {
            reports,
            stop,
            started_at,
            finished_at: Utc::now(),
        };
        if results.is_success() {
            info!("Run completed on {} nodes", results.reports.len());
        } else {
            warn!(
                "Run failed ({}): {} error records",
                results.stop,
                results.errors().count()
            );
        }
        Ok(results)
    }

    /// Ask every node to stop serving.
    pub async fn shutdown_nodes(&self) -> RuntimeResult<()> {
        for node in &self.nodes {
            self.transport.send(node, Message::Shutdown).await?;
        }
        Ok(())
    }

    /// Wait for one acknowledgment per node within the ack timeout.
    async fn collect_acks(&self) -> RuntimeResult<(Vec<NodeId>, Vec<NodeId>)> {
        let deadline = Instant::now() + self.config.ack_timeout();
        let mut acked = Vec::new();
        let mut missing = Vec::new();
        for node in &self.nodes {
            match self
                .receive_matching(node, deadline, |m| matches!(m, Message::Ack))
                .await?
            {
                Some(_) => acked.push(node.clone()),
                None => missing.push(node.clone()),
            }
        }
        Ok((acked, missing))
    }

    /// Collect one result record of run `epoch` from each of `nodes`.
    /// Records of other runs are skipped.
    async fn collect_reports(
        &self,
        nodes: &[NodeId],
        epoch: u64,
    ) -> RuntimeResult<BTreeMap<NodeId, NodeReport>> {
        let deadline = Instant::now() + self.config.result_timeout();
        let mut reports = BTreeMap::new();
        for node in nodes {
            let message = self
                .receive_matching(node, deadline, |m| {
                    matches!(m, Message::Report { epoch: e, .. } if *e == epoch)
                })
                .await?;
            let report = match message {
                Some(Message::Report { payload, .. }) => self.parse_report(node, &payload),
                _ => NodeReport::error(
                    RuntimeError::TransportTimeout {
                        node: node.clone(),
                        waiting_for: "result report".to_string(),
                    }
                    .to_string(),
                ),
            };
            reports.insert(node.clone(), report);
        }
        Ok(reports)
    }

    fn parse_report(&self, node: &NodeId, payload: &str) -> NodeReport {
        match NodeReport::from_payload(payload) {
            Ok(mut entries) => entries.remove(node).unwrap_or_else(|| {
                NodeReport::error(format!("report from {node} does not name it"))
            }),
            Err(e) => NodeReport::error(format!("malformed report from {node}: {e}")),
        }
    }

    /// Take the next message from `from` accepted by `wanted`, skipping
    /// leftovers of earlier runs, until `deadline`.
    async fn receive_matching(
        &self,
        from: &NodeId,
        deadline: Instant,
        wanted: impl Fn(&Message) -> bool,
    ) -> RuntimeResult<Option<Message>> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.transport.receive(from, remaining).await? {
                Some(message) if wanted(&message) => return Ok(Some(message)),
                Some(stale) => debug!("Skipping stale message from {}: {:?}", from, stale),
                None => return Ok(None),
            }
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.id)
            .field("nodes", &self.nodes)
            .field("config", &self.config)
            .field("merge_runs", &self.merge_runs)
            .field("pooled_pairs", &self.pooled_pairs)
            .finish_non_exhaustive()
    }
}
