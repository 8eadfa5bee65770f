//! Operation timing tables.
//!
//! A [`TimingTable`] maps an operation kind to a duration in ticks. Kinds
//! that carry a gate are keyed one level deeper by gate name:
//!
//! ```yaml
//! PREPARE_QUBITS: 1
//! SINGLE:
//!   h: 1
//!   rz: 2
//! TWO_QUBIT:
//!   cx: 3
//! ```
//!
//! A [`TimingProfile`] holds one table per node plus a fallback used by
//! nodes without their own table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use qdist_ir::{NodeId, Operation, OperationKind};

use crate::error::{SchedError, SchedResult};

/// Duration of one operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KindTiming {
    /// Same duration for every operation of the kind.
    Fixed(u64),
    /// Duration per gate name.
    PerGate(BTreeMap<String, u64>),
}

/// Durations for every operation a node can execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimingTable {
    entries: BTreeMap<OperationKind, KindTiming>,
}

impl TimingTable {
    /// Table without any entry.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Every kind and every gate costs `ticks`.
    pub fn uniform(ticks: u64) -> Self {
        let entries = OperationKind::ALL
            .iter()
            .map(|&kind| {
                let timing = if kind.carries_gate() {
                    KindTiming::PerGate(
                        kind.gate_names()
                            .iter()
                            .map(|name| ((*name).to_string(), ticks))
                            .collect(),
                    )
                } else {
                    KindTiming::Fixed(ticks)
                };
                (kind, timing)
            })
            .collect();
        Self { entries }
    }

    /// Set the duration of a whole kind.
    #[must_use]
    pub fn with_kind(mut self, kind: OperationKind, ticks: u64) -> Self {
        self.entries.insert(kind, KindTiming::Fixed(ticks));
        self
    }

    /// Set the duration of one gate of a gate-carrying kind.
    #[must_use]
    pub fn with_gate(mut self, kind: OperationKind, gate: &str, ticks: u64) -> Self {
        let entry = self
            .entries
            .entry(kind)
            .or_insert_with(|| KindTiming::PerGate(BTreeMap::new()));
        match entry {
            KindTiming::PerGate(gates) => {
                gates.insert(gate.to_string(), ticks);
            }
            KindTiming::Fixed(_) => {
                *entry = KindTiming::PerGate(BTreeMap::from([(gate.to_string(), ticks)]));
            }
        }
        self
    }

    /// Duration of `kind` (and `gate`, for gate-carrying kinds).
    pub fn lookup(&self, kind: OperationKind, gate: Option<&str>) -> Option<u64> {
        match (self.entries.get(&kind)?, gate) {
            (KindTiming::Fixed(ticks), _) => Some(*ticks),
            (KindTiming::PerGate(gates), Some(name)) => gates.get(name).copied(),
            (KindTiming::PerGate(_), None) => None,
        }
    }

    /// Duration of `op`.
    pub fn duration(&self, op: &Operation) -> Option<u64> {
        self.lookup(op.kind(), op.gate().map(|g| g.name()))
    }

    /// Whether the table holds no entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TimingTable {
    /// One tick for everything.
    fn default() -> Self {
        Self::uniform(1)
    }
}

/// Timing tables for a set of nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingProfile {
    /// Table for nodes without their own.
    #[serde(default)]
    pub fallback: Option<TimingTable>,
    /// Per-node tables.
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, TimingTable>,
}

impl TimingProfile {
    /// Profile where every node uses the unit-duration table.
    pub fn unit() -> Self {
        Self {
            fallback: Some(TimingTable::default()),
            nodes: BTreeMap::new(),
        }
    }

    /// Profile with only per-node tables.
    pub fn strict() -> Self {
        Self::default()
    }

    /// Set the table of `node`.
    #[must_use]
    pub fn with_node(mut self, node: impl Into<NodeId>, table: TimingTable) -> Self {
        self.nodes.insert(node.into(), table);
        self
    }

    /// Set the fallback table.
    #[must_use]
    pub fn with_fallback(mut self, table: TimingTable) -> Self {
        self.fallback = Some(table);
        self
    }

    /// Table used for `node`.
    pub fn table_for(&self, node: &NodeId) -> Option<&TimingTable> {
        self.nodes.get(node).or(self.fallback.as_ref())
    }

    /// Duration of `op` on its executing node.
    pub fn duration(&self, op: &Operation) -> SchedResult<u64> {
        let node = op.executing_node();
        self.table_for(node)
            .and_then(|table| table.duration(op))
            .ok_or_else(|| SchedError::UnknownTiming {
                node: node.clone(),
                kind: op.kind(),
                gate: op.gate().map(|g| g.name().to_string()),
            })
    }
}
