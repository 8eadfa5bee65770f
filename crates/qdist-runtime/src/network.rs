//! In-process network construction.
//!
//! [`Network::builder`] wires a controller and a set of compute nodes to one
//! backend, one transport hub and a fresh [`Clock`], then spawns every node
//! on the current tokio runtime.
//!
//! ```ignore
//! let network = Network::builder(backend, hub)
//!     .nodes(2, 1) // QPU_0 with q_0_0, QPU_1 with q_1_0
//!     .spawn()?;
//! let results = network.execute(&circuit).await?;
//! network.shutdown().await?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use qdist_hal::{QuantumBackend, TransportHub};
use qdist_ir::{Circuit, NodeId, QubitId};
use qdist_sched::TimingTable;

use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::controller::{CONTROLLER_ID, Controller};
use crate::error::{RuntimeError, RuntimeResult};
use crate::node::ComputingNode;
use crate::report::RunResults;

/// Builder for [`Network`].
pub struct NetworkBuilder {
    backend: Arc<dyn QuantumBackend>,
    hub: Arc<dyn TransportHub>,
    config: RuntimeConfig,
    nodes: BTreeMap<NodeId, Vec<QubitId>>,
    timing: BTreeMap<NodeId, TimingTable>,
    merge_runs: bool,
}

impl NetworkBuilder {
    /// Add `count` nodes `QPU_0..QPU_{count-1}`, each owning
    /// `qubits_per_node` qubits named `q_{node}_{index}`.
    #[must_use]
    pub fn nodes(mut self, count: usize, qubits_per_node: usize) -> Self {
        for i in 0..count {
            let qubits = (0..qubits_per_node)
                .map(|j| QubitId::new(format!("q_{i}_{j}")))
                .collect();
            self.nodes.insert(NodeId::new(format!("QPU_{i}")), qubits);
        }
        self
    }

    /// Add one node with the given qubits.
    #[must_use]
    pub fn add_node(mut self, id: impl Into<NodeId>, qubits: Vec<QubitId>) -> Self {
        self.nodes.insert(id.into(), qubits);
        self
    }

    /// Use `table` for operations executed by `node`.
    #[must_use]
    pub fn with_node_timing(mut self, node: impl Into<NodeId>, table: TimingTable) -> Self {
        self.timing.insert(node.into(), table);
        self
    }

    /// Replace the runtime configuration.
    #[must_use]
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable merging of cross-node runs.
    #[must_use]
    pub fn with_run_merging(mut self, enabled: bool) -> Self {
        self.merge_runs = enabled;
        self
    }

    /// Connect every participant and spawn the nodes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> RuntimeResult<Network> {
        self.config.validate()?;
        if self.nodes.is_empty() {
            return Err(RuntimeError::Unconfigured(
                "network has no nodes".to_string(),
            ));
        }

        let clock = Clock::from_config(&self.config.clock);
        let mut profile = self.config.timing.profile();
        profile.nodes.extend(self.timing);

        let controller_transport = self.hub.connect(&NodeId::from(CONTROLLER_ID))?;

        let mut tasks = Vec::with_capacity(self.nodes.len());
        for id in self.nodes.keys() {
            let transport = self.hub.connect(id)?;
            let link = clock.attach(id.clone())?;
            let node = ComputingNode::new(
                id.clone(),
                CONTROLLER_ID,
                Arc::clone(&self.backend),
                transport,
                self.config.node.clone(),
            );
            tasks.push(tokio::spawn(node.serve(link)));
        }

        let controller = Controller::new(
            controller_transport,
            clock,
            self.nodes.keys().cloned().collect(),
            profile,
            self.config.controller.clone(),
        )
        .with_run_merging(self.merge_runs);

        info!(
            "Network up: {} nodes on backend {}",
            self.nodes.len(),
            self.backend.name()
        );
        Ok(Network {
            controller,
            qubit_map: self.nodes,
            tasks,
        })
    }
}

/// A running controller and its nodes.
pub struct Network {
    controller: Controller,
    qubit_map: BTreeMap<NodeId, Vec<QubitId>>,
    tasks: Vec<JoinHandle<RuntimeResult<()>>>,
}

impl Network {
    /// Start building a network on `backend` and `hub`.
    pub fn builder(backend: Arc<dyn QuantumBackend>, hub: Arc<dyn TransportHub>) -> NetworkBuilder {
        NetworkBuilder {
            backend,
            hub,
            config: RuntimeConfig::default(),
            nodes: BTreeMap::new(),
            timing: BTreeMap::new(),
            merge_runs: true,
        }
    }

    /// The controller.
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// The shared clock.
    pub fn clock(&self) -> &Clock {
        self.controller.clock()
    }

    /// Qubits owned by each node.
    pub fn qubit_map(&self) -> &BTreeMap<NodeId, Vec<QubitId>> {
        &self.qubit_map
    }

    /// Empty circuit over this network's qubits.
    pub fn circuit(&self) -> RuntimeResult<Circuit> {
        Ok(Circuit::with_qubit_map(self.qubit_map.clone())?)
    }

    /// Compile, schedule and run `circuit`.
    pub async fn execute(&self, circuit: &Circuit) -> RuntimeResult<RunResults> {
        self.controller.execute(circuit).await
    }

    /// Stop every node and wait for it. Returns the first node failure.
    pub async fn shutdown(self) -> RuntimeResult<()> {
        if let Err(e) = self.controller.shutdown_nodes().await {
            warn!("Could not reach every node, aborting node tasks: {}", e);
            for task in &self.tasks {
                task.abort();
            }
            return Err(e);
        }

        let mut first_error = None;
        for outcome in join_all(self.tasks).await {
            let result = match outcome {
                Ok(result) => result,
                Err(e) => Err(RuntimeError::Protocol(format!("node task failed: {e}"))),
            };
            if let Err(e) = result {
                warn!("Node stopped with error: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("controller", &self.controller)
            .field("qubit_map", &self.qubit_map)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
