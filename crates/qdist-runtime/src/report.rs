//! Result records.
//!
//! Every node sends one record once the clock stopped:
//!
//! ```json
//! {"QPU_0": {"type": "result", "bits": {"m0": 1}}}
//! {"QPU_1": {"type": "error", "message": "..."}}
//! ```
//!
//! The controller merges them into [`RunResults`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use qdist_ir::{BitId, NodeId};

use crate::clock::StopReason;
use crate::error::RuntimeResult;

/// End-of-run record of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeReport {
    /// Measured bits of general-purpose qubits.
    Result {
        /// Bit id to value.
        bits: BTreeMap<BitId, u8>,
    },
    /// The node failed, or the run was halted.
    Error {
        /// What went wrong.
        message: String,
    },
}

impl NodeReport {
    /// Error record with `message`.
    pub fn error(message: impl Into<String>) -> Self {
        NodeReport::Error {
            message: message.into(),
        }
    }

    /// Whether this is a result record.
    pub fn is_result(&self) -> bool {
        matches!(self, NodeReport::Result { .. })
    }

    /// Measured bits, for result records.
    pub fn bits(&self) -> Option<&BTreeMap<BitId, u8>> {
        match self {
            NodeReport::Result { bits } => Some(bits),
            NodeReport::Error { .. } => None,
        }
    }

    /// Error message, for error records.
    pub fn message(&self) -> Option<&str> {
        match self {
            NodeReport::Error { message } => Some(message),
            NodeReport::Result { .. } => None,
        }
    }

    /// Wire payload `{node: record}`.
    pub fn to_payload(&self, node: &NodeId) -> RuntimeResult<String> {
        Ok(serde_json::to_string(&BTreeMap::from([(node, self)]))?)
    }

    /// Parse a wire payload into its `(node, record)` entries.
    pub fn from_payload(payload: &str) -> RuntimeResult<BTreeMap<NodeId, NodeReport>> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Merged outcome of one distributed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    /// One record per node.
    pub reports: BTreeMap<NodeId, NodeReport>,
    /// Why the clock stopped.
    pub stop: StopReason,
    /// When the schedule was broadcast.
    pub started_at: DateTime<Utc>,
    /// When the last record was collected.
    pub finished_at: DateTime<Utc>,
}

impl RunResults {
    /// Whether the clock completed and every node reported a result.
    ///
    /// Result records of some nodes next to an error record of another do
    /// not describe a successful execution.
    pub fn is_success(&self) -> bool {
        self.stop.is_completed() && self.reports.values().all(NodeReport::is_result)
    }

    /// Record of `node`.
    pub fn report(&self, node: &NodeId) -> Option<&NodeReport> {
        self.reports.get(node)
    }

    /// Measured bits of `node`.
    pub fn bits(&self, node: &NodeId) -> Option<&BTreeMap<BitId, u8>> {
        self.report(node).and_then(NodeReport::bits)
    }

    /// Value of one measured bit.
    pub fn bit(&self, node: &NodeId, bit: &BitId) -> Option<u8> {
        self.bits(node).and_then(|bits| bits.get(bit)).copied()
    }

    /// Nodes that reported an error, with their messages.
    pub fn errors(&self) -> impl Iterator<Item = (&NodeId, &str)> {
        self.reports
            .iter()
            .filter_map(|(node, report)| report.message().map(|m| (node, m)))
    }

    /// Wall-clock duration of the run.
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Merged records as JSON, in the per-node wire shape.
    pub fn to_json(&self) -> RuntimeResult<String> {
        Ok(serde_json::to_string(&self.reports)?)
    }
}
