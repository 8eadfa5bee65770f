//! Error handling for the scheduler.

use thiserror::Error;

use qdist_ir::{IrError, NodeId, OperationKind};

/// Result type for scheduler operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur while scheduling.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SchedError {
    /// No duration is known for an operation.
    #[error("No timing for {kind}{} on node {node}", gate_suffix(.gate))]
    UnknownTiming {
        /// Executing node.
        node: NodeId,
        /// Operation kind.
        kind: OperationKind,
        /// Gate name, for gate-carrying kinds.
        gate: Option<String>,
    },

    /// The circuit still contains a cross-node gate.
    #[error("Cross-node gate in layer {layer} must be compiled before scheduling: {operation}")]
    Uncompiled {
        /// Layer index.
        layer: usize,
        /// The offending operation.
        operation: String,
    },

    /// Layer durations add up past the tick range.
    #[error("Schedule overflows the tick range at layer {layer}")]
    TickOverflow {
        /// Layer whose end tick does not fit.
        layer: usize,
    },

    /// A wire record does not describe a valid operation.
    #[error("Invalid schedule record: {0}")]
    Ir(#[from] IrError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn gate_suffix(gate: &Option<String>) -> String {
    gate.as_ref().map(|g| format!(" gate '{g}'")).unwrap_or_default()
}
