//! Wire form of a schedule.
//!
//! The controller broadcasts one [`ScheduleAssignment`] to every node:
//!
//! ```json
//! {
//!   "QPU_0": [
//!     {"kind": "PREPARE_QUBITS", "qubits": ["q_0_0"], "bits": [], "nodes": ["QPU_0"], "pooled": false, "due_tick": 0}
//!   ],
//!   "QPU_1": []
//! }
//! ```
//!
//! Matrix gate parameters are carried as rows of `[re, im]` pairs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use qdist_ir::{NodeId, Operation, OperationRecord};

use crate::error::SchedResult;
use crate::scheduler::Schedule;

/// An operation record with its due tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRecord {
    /// The operation fields.
    #[serde(flatten)]
    pub record: OperationRecord,
    /// Tick at which the operation is due.
    pub due_tick: u64,
}

/// Node-keyed schedule records, as broadcast by the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleAssignment {
    nodes: BTreeMap<NodeId, Vec<ScheduledRecord>>,
}

impl ScheduleAssignment {
    /// Wire form of `schedule`.
    pub fn from_schedule(schedule: &Schedule) -> Self {
        let nodes = schedule
            .per_node()
            .iter()
            .map(|(node, ops)| {
                let records = ops
                    .iter()
                    .map(|s| ScheduledRecord {
                        record: OperationRecord::from(&s.operation),
                        due_tick: s.due_tick,
                    })
                    .collect();
                (node.clone(), records)
            })
            .collect();
        Self { nodes }
    }

    /// Build from raw records.
    pub fn from_records(nodes: BTreeMap<NodeId, Vec<ScheduledRecord>>) -> Self {
        Self { nodes }
    }

    /// Nodes present in the assignment.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Records of `node`.
    pub fn slice(&self, node: &NodeId) -> &[ScheduledRecord] {
        self.nodes.get(node).map_or(&[], Vec::as_slice)
    }

    /// Mutable records of `node`, created empty if missing.
    pub fn slice_mut(&mut self, node: &NodeId) -> &mut Vec<ScheduledRecord> {
        self.nodes.entry(node.clone()).or_default()
    }

    /// Remove and return the records of `node`.
    pub fn take(&mut self, node: &NodeId) -> Vec<ScheduledRecord> {
        self.nodes.remove(node).unwrap_or_default()
    }

    /// Records of `node` grouped by due tick, in list order within a tick.
    ///
    /// Records are not validated here; the executing node checks each one
    /// when it becomes due.
    pub fn grouped_by_tick(&self, node: &NodeId) -> BTreeMap<u64, Vec<OperationRecord>> {
        let mut grouped: BTreeMap<u64, Vec<OperationRecord>> = BTreeMap::new();
        for s in self.slice(node) {
            grouped.entry(s.due_tick).or_default().push(s.record.clone());
        }
        grouped
    }

    /// Decode the records of `node` into `(due tick, operation)` pairs.
    pub fn operations(&self, node: &NodeId) -> SchedResult<Vec<(u64, Operation)>> {
        self.slice(node)
            .iter()
            .map(|s| Ok((s.due_tick, Operation::try_from(s.record.clone())?)))
            .collect()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> SchedResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> SchedResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use qdist_ir::{Circuit, Gate, QubitId, UnitaryMatrix};
    use std::f64::consts::FRAC_1_SQRT_2;

    fn schedule() -> Schedule {
        let mut c = Circuit::with_qubit_map([
            (NodeId::from("QPU_0"), vec![QubitId::from("q_0_0")]),
            (NodeId::from("QPU_1"), vec![QubitId::from("q_1_0")]),
        ])
        .unwrap();
        let h = UnitaryMatrix::from_real(&[
            &[FRAC_1_SQRT_2, FRAC_1_SQRT_2],
            &[FRAC_1_SQRT_2, -FRAC_1_SQRT_2],
        ])
        .unwrap();
        c.push_operations([
            Operation::single("QPU_0", "q_0_0", Gate::Custom(h)).unwrap(),
            Operation::single("QPU_1", "q_1_0", Gate::Rz(0.5)).unwrap(),
        ])
        .unwrap();
        c.push_operations([Operation::measure("QPU_0", "q_0_0", "m")])
            .unwrap();
        Scheduler::default().schedule(&c).unwrap()
    }

    #[test]
    fn test_json_shape() {
        let assignment = ScheduleAssignment::from_schedule(&schedule());
        let json: serde_json::Value = serde_json::from_str(&assignment.to_json().unwrap()).unwrap();

        let first = &json["QPU_0"][0];
        assert_eq!(first["kind"], "SINGLE");
        assert_eq!(first["gate"], "custom");
        assert_eq!(first["due_tick"], 0);
        // Complex entries travel as [re, im].
        assert!(first["gate_param"][0][0].is_array());
        assert_eq!(json["QPU_0"][1]["due_tick"], 1);
    }

    #[test]
    fn test_decode_after_transfer() {
        let schedule = schedule();
        let json = ScheduleAssignment::from_schedule(&schedule).to_json().unwrap();
        let decoded = ScheduleAssignment::from_json(&json).unwrap();

        let node = NodeId::from("QPU_1");
        let ops = decoded.operations(&node).unwrap();
        let expected: Vec<(u64, Operation)> = schedule
            .for_node(&node)
            .iter()
            .map(|s| (s.due_tick, s.operation.clone()))
            .collect();
        assert_eq!(ops, expected);
    }

    #[test]
    fn test_grouping_by_tick() {
        let assignment = ScheduleAssignment::from_schedule(&schedule());
        let grouped = assignment.grouped_by_tick(&NodeId::from("QPU_0"));
        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), [0, 1]);
        assert!(assignment.grouped_by_tick(&NodeId::from("QPU_9")).is_empty());
    }
}
