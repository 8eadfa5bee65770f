//! Layer-barrier scheduling.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use qdist_ir::{Circuit, NodeId, Operation};

use crate::error::{SchedError, SchedResult};
use crate::timing::TimingProfile;

/// An operation with the tick it becomes due at.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledOperation {
    /// Tick at which the node executes the operation.
    pub due_tick: u64,
    /// The operation.
    pub operation: Operation,
}

/// Per-node timelines of a circuit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    per_node: BTreeMap<NodeId, Vec<ScheduledOperation>>,
    max_tick: u64,
}

impl Schedule {
    /// Timeline of `node`; empty for unknown nodes.
    pub fn for_node(&self, node: &NodeId) -> &[ScheduledOperation] {
        self.per_node.get(node).map_or(&[], Vec::as_slice)
    }

    /// All timelines keyed by node.
    pub fn per_node(&self) -> &BTreeMap<NodeId, Vec<ScheduledOperation>> {
        &self.per_node
    }

    /// Scheduled nodes, including nodes without any operation.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.per_node.keys()
    }

    /// The last tick of the run.
    pub fn max_tick(&self) -> u64 {
        self.max_tick
    }

    /// Total number of scheduled operations.
    pub fn num_operations(&self) -> usize {
        self.per_node.values().map(Vec::len).sum()
    }
}

/// Assigns ticks to the operations of a compiled circuit.
///
/// Layers are laid end to end: every operation of a layer is due at the
/// tick the previous layer ended, and the layer lasts as long as its
/// slowest operation. Each operation is then filed under its executing
/// node, keeping circuit order.
#[derive(Debug, Clone)]
pub struct Scheduler {
    profile: TimingProfile,
}

impl Scheduler {
    /// Scheduler using `profile` for durations.
    pub fn new(profile: TimingProfile) -> Self {
        Self { profile }
    }

    /// The timing profile in use.
    pub fn profile(&self) -> &TimingProfile {
        &self.profile
    }

    /// Schedule `circuit`.
    #[instrument(skip(self, circuit))]
    pub fn schedule(&self, circuit: &Circuit) -> SchedResult<Schedule> {
        let mut per_node: BTreeMap<NodeId, Vec<ScheduledOperation>> = circuit
            .nodes()
            .map(|node| (node.clone(), Vec::new()))
            .collect();
        let mut layer_end = 0u64;

        for (l, layer) in circuit.layers().iter().enumerate() {
            let mut longest = 0u64;
            for op in layer {
                if op.is_cross_node() {
                    return Err(SchedError::Uncompiled {
                        layer: l,
                        operation: op.to_string(),
                    });
                }
                longest = longest.max(self.profile.duration(op)?);
                per_node
                    .entry(op.executing_node().clone())
                    .or_default()
                    .push(ScheduledOperation {
                        due_tick: layer_end,
                        operation: op.clone(),
                    });
            }
            debug!("Layer {} due at tick {}, lasts {}", l, layer_end, longest);
            layer_end = layer_end
                .checked_add(longest)
                .ok_or(SchedError::TickOverflow { layer: l })?;
        }

        let schedule = Schedule {
            per_node,
            max_tick: layer_end,
        };
        info!(
            "Scheduled {} operations on {} nodes, max tick {}",
            schedule.num_operations(),
            schedule.per_node.len(),
            schedule.max_tick
        );
        Ok(schedule)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(TimingProfile::unit())
    }
}
