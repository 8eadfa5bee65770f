//! Node execution engine.
//!
//! A [`ComputingNode`] waits for the controller's schedule broadcast, keeps
//! its own slice grouped by due tick, acknowledges, and then executes the
//! operations due at each clock tick in list order:
//!
//! | Kind | Effect |
//! |------|--------|
//! | `PREPARE_QUBITS` | allocate general-purpose qubits |
//! | `SINGLE`, `TWO_QUBIT`, `THREE_QUBIT` | apply the gate on the backend |
//! | `CLASSICAL_CTRL_GATE` | apply the gate if the held bit is 1 |
//! | `SEND_ENT` | create a pair, keep the local half |
//! | `REC_ENT` | poll for the peer's half within the retry budget |
//! | `SEND_CLASSICAL` | send a held bit to the peer |
//! | `REC_CLASSICAL` | wait for a bit from the peer within the retry budget |
//! | `MEASURE` | measure, free the slot, record the bit |
//!
//! Any failure is reported to the clock, which halts the whole run. Once
//! the clock stops the node sends one result record to the controller.

mod registers;

pub use registers::{Register, Registers};

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, info, instrument, warn};

use qdist_hal::{Message, QuantumBackend, QubitHandle, Transport};
use qdist_ir::{BitId, NodeId, Operation, OperationRecord, QubitId};
use qdist_sched::ScheduleAssignment;

use crate::clock::{ClockLink, ClockSignal, StopReason};
use crate::config::NodeConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::report::NodeReport;

/// State of one scheduled run on a node.
struct RunState {
    registers: Registers,
    /// Every bit the node holds, measured or received.
    bits: FxHashMap<BitId, u8>,
    /// Bits measured from general-purpose qubits.
    results: BTreeMap<BitId, u8>,
    /// Bits that arrived ahead of the receive waiting for them.
    stash: FxHashMap<BitId, u8>,
    error: Option<RuntimeError>,
}

impl RunState {
    fn report(&self, reason: &StopReason) -> NodeReport {
        match (&self.error, reason) {
            (Some(error), _) => NodeReport::error(error.to_string()),
            (None, StopReason::Completed) => NodeReport::Result {
                bits: self.results.clone(),
            },
            (None, halted) => NodeReport::error(format!("run halted: {halted}")),
        }
    }
}

/// A compute node.
pub struct ComputingNode {
    id: NodeId,
    controller: NodeId,
    backend: Arc<dyn QuantumBackend>,
    transport: Arc<dyn Transport>,
    config: NodeConfig,
}

impl ComputingNode {
    /// Create a node that takes schedules from `controller`.
    pub fn new(
        id: impl Into<NodeId>,
        controller: impl Into<NodeId>,
        backend: Arc<dyn QuantumBackend>,
        transport: Arc<dyn Transport>,
        config: NodeConfig,
    ) -> Self {
        Self {
            id: id.into(),
            controller: controller.into(),
            backend,
            transport,
            config,
        }
    }

    /// Node id.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Serve schedules until the controller sends `Shutdown`.
    #[instrument(skip(self, link), fields(node = %self.id))]
    pub async fn serve(self, mut link: ClockLink) -> RuntimeResult<()> {
        info!("Node ready");
        loop {
            let message = self
                .transport
                .receive(&self.controller, self.config.schedule_timeout())
                .await?;
            match message {
                Some(Message::Schedule { payload }) => self.run_schedule(&payload, &mut link).await?,
                Some(Message::Shutdown) => {
                    info!("Node shutting down");
                    return Ok(());
                }
                Some(other) => warn!("Ignoring unexpected control message: {:?}", other),
                None => {}
            }
        }
    }

    /// Execute one broadcast schedule and report the outcome.
    async fn run_schedule(&self, payload: &str, link: &mut ClockLink) -> RuntimeResult<()> {
        let mut run = RunState {
            registers: Registers::new(
                self.id.clone(),
                self.config.qubit_capacity,
                self.config.pool_capacity,
            ),
            bits: FxHashMap::default(),
            results: BTreeMap::new(),
            stash: FxHashMap::default(),
            error: None,
        };

        // A schedule that cannot be decoded fails the first tick.
        let schedule = match ScheduleAssignment::from_json(payload) {
            Ok(assignment) => assignment.grouped_by_tick(&self.id),
            Err(e) => {
                run.error = Some(e.into());
                BTreeMap::new()
            }
        };
        debug!(
            "Received schedule: {} operations over {} ticks",
            schedule.values().map(Vec::len).sum::<usize>(),
            schedule.len()
        );
        self.transport.send(&self.controller, Message::Ack).await?;

        let reason = loop {
            match link.next_tick().await {
                ClockSignal::Tick(tick) => {
                    let due = schedule.get(&tick).map_or(&[][..], Vec::as_slice);
                    self.on_tick(tick, due, &mut run, link).await;
                }
                ClockSignal::Stopped(reason) => break reason,
            }
        };

        let report = run.report(&reason);
        self.discard(&mut run).await;
        debug!("Reporting {:?}", report);
        let payload = report.to_payload(&self.id)?;
        self.transport
            .send(
                &self.controller,
                Message::Report {
                    epoch: link.epoch(),
                    payload,
                },
            )
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self, due, run, link), fields(node = %self.id))]
    async fn on_tick(
        &self,
        tick: u64,
        due: &[OperationRecord],
        run: &mut RunState,
        link: &ClockLink,
    ) {
        if let Some(error) = &run.error {
            link.fail(tick, error.to_string());
            return;
        }
        for record in due {
            let outcome = match self.decode(record) {
                Ok(op) => self.execute(op, run, link).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                warn!("Tick {} failed: {}", tick, e);
                link.fail(tick, e.to_string());
                run.error = Some(e);
                return;
            }
        }
        link.complete(tick);
    }

    /// Check operand counts and addressing of a scheduled record.
    fn decode(&self, record: &OperationRecord) -> RuntimeResult<Operation> {
        let operation = Operation::try_from(record.clone()).map_err(|e| {
            RuntimeError::OperandValidation {
                node: self.id.clone(),
                operation: record.kind.to_string(),
                reason: e.to_string(),
            }
        })?;
        if operation.executing_node() != &self.id {
            return Err(self.invalid(
                &operation,
                format!("addressed to {}", operation.executing_node()),
            ));
        }
        if operation.is_cross_node() {
            return Err(self.invalid(&operation, "cross-node gate was not compiled"));
        }
        Ok(operation)
    }

    fn invalid(&self, operation: &Operation, reason: impl Into<String>) -> RuntimeError {
        RuntimeError::OperandValidation {
            node: self.id.clone(),
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    fn handles(&self, operation: &Operation, run: &RunState) -> RuntimeResult<Vec<QubitHandle>> {
        operation
            .qubits()
            .into_iter()
            .map(|q| {
                run.registers
                    .handle(q)
                    .ok_or_else(|| self.invalid(operation, format!("unknown qubit {q}")))
            })
            .collect()
    }

    fn held_bit(&self, operation: &Operation, run: &RunState, bit: &BitId) -> RuntimeResult<u8> {
        run.bits
            .get(bit)
            .copied()
            .ok_or_else(|| self.invalid(operation, format!("bit {bit} is not held")))
    }

    async fn execute(
        &self,
        operation: Operation,
        run: &mut RunState,
        link: &ClockLink,
    ) -> RuntimeResult<()> {
        debug!("Executing {}", operation);
        match &operation {
            Operation::PrepareQubits { qubits, .. } => {
                run.registers.check_prepare(qubits)?;
                for qubit in qubits {
                    let handle = self.backend.allocate(&self.id).await?;
                    run.registers.insert(qubit.clone(), handle);
                }
            }
            Operation::SingleGate { gate, .. }
            | Operation::TwoQubitGate { gate, .. }
            | Operation::ThreeQubitGate { gate, .. } => {
                let handles = self.handles(&operation, run)?;
                self.backend.apply(gate, &handles).await?;
            }
            Operation::ClassicalControlledGate {
                qubit,
                condition,
                gate,
                ..
            } => {
                let value = self.held_bit(&operation, run, condition)?;
                let handles = self.handles(&operation, run)?;
                if value == 1 {
                    debug!("{} is set, applying {} to {}", condition, gate.name(), qubit);
                    self.backend.apply(gate, &handles).await?;
                }
            }
            Operation::SendEntanglement {
                peer, pair, pooled, ..
            } => {
                run.registers.check_pair_slot(pair, *pooled)?;
                let handle = self.backend.create_pair(pair, &self.id, peer).await?;
                run.registers.insert_pair(pair.clone(), handle, *pooled);
            }
            Operation::ReceiveEntanglement {
                peer, pair, pooled, ..
            } => {
                run.registers.check_pair_slot(pair, *pooled)?;
                let handle = self.claim_pair(peer, pair, link).await?;
                run.registers.insert_pair(pair.clone(), handle, *pooled);
            }
            Operation::SendClassicalBit { peer, bit, .. } => {
                let value = self.held_bit(&operation, run, bit)?;
                self.transport
                    .send(peer, Message::Bit {
                        id: bit.clone(),
                        value,
                    })
                    .await?;
            }
            Operation::ReceiveClassicalBit { peer, bit, .. } => {
                let value = self.receive_bit(peer, bit, run, link).await?;
                run.bits.insert(bit.clone(), value);
            }
            Operation::Measure { qubit, bit, .. } => {
                let scratch = run.registers.is_pair_half(qubit);
                let (handle, _) = run
                    .registers
                    .release(qubit)
                    .ok_or_else(|| self.invalid(&operation, format!("unknown qubit {qubit}")))?;
                let value = self.backend.measure(handle).await?;
                run.bits.insert(bit.clone(), value);
                if !scratch {
                    run.results.insert(bit.clone(), value);
                }
            }
        }
        Ok(())
    }

    /// Poll for the half of `pair` created by `peer`.
    async fn claim_pair(
        &self,
        peer: &NodeId,
        pair: &QubitId,
        link: &ClockLink,
    ) -> RuntimeResult<QubitHandle> {
        for attempt in 0..self.config.receive_attempts {
            if let Some(handle) = self.backend.claim_pair(pair, &self.id).await? {
                return Ok(handle);
            }
            if link.is_stopped() {
                break;
            }
            debug!("Pair {} not there yet (attempt {})", pair, attempt + 1);
            tokio::time::sleep(self.config.retry_interval()).await;
        }
        Err(RuntimeError::TransportTimeout {
            node: peer.clone(),
            waiting_for: format!("entangled pair {pair}"),
        })
    }

    /// Wait for `bit` from `peer`. Other bits from the same peer are kept
    /// for later receives.
    async fn receive_bit(
        &self,
        peer: &NodeId,
        bit: &BitId,
        run: &mut RunState,
        link: &ClockLink,
    ) -> RuntimeResult<u8> {
        if let Some(value) = run.stash.remove(bit) {
            return Ok(value);
        }
        for _ in 0..self.config.receive_attempts {
            if link.is_stopped() {
                break;
            }
            match self
                .transport
                .receive(peer, self.config.retry_interval())
                .await?
            {
                Some(Message::Bit { id, value }) if &id == bit => return Ok(value),
                Some(Message::Bit { id, value }) => {
                    debug!("Stashing early bit {} from {}", id, peer);
                    run.stash.insert(id, value);
                }
                Some(other) => {
                    return Err(RuntimeError::Protocol(format!(
                        "expected bit {bit} from {peer}, got {other:?}"
                    )));
                }
                None => {}
            }
        }
        Err(RuntimeError::TransportTimeout {
            node: peer.clone(),
            waiting_for: format!("classical bit {bit}"),
        })
    }

    /// Measure away every qubit still held after the run.
    async fn discard(&self, run: &mut RunState) {
        for handle in run.registers.drain() {
            if let Err(e) = self.backend.measure(handle).await {
                debug!("Could not release {}: {}", handle, e);
            }
        }
    }
}

impl std::fmt::Debug for ComputingNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputingNode")
            .field("id", &self.id)
            .field("controller", &self.controller)
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

