//! Error types for the IR crate.

use thiserror::Error;

use crate::ids::{NodeId, QubitId};

/// Errors raised while building or validating circuits and operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// Gate name is not known.
    #[error("Unknown gate '{0}'")]
    UnknownGate(String),

    /// Gate parameter is missing or of the wrong shape.
    #[error("Invalid parameter for gate '{gate}': {reason}")]
    InvalidGateParam {
        /// Name of the gate.
        gate: String,
        /// What is wrong with the parameter.
        reason: String,
    },

    /// Matrix is not a 2x2 or 4x4 unitary.
    #[error("Invalid unitary matrix: {0}")]
    InvalidMatrix(String),

    /// Gate requires a different number of qubits.
    #[error("Gate '{gate_name}' requires {expected} qubits, got {got}")]
    QubitCountMismatch {
        /// Name of the gate.
        gate_name: String,
        /// Expected number of qubits.
        expected: u32,
        /// Actual number of qubits provided.
        got: u32,
    },

    /// Operand lists do not match what the operation kind requires.
    #[error("Malformed {kind} operation: {reason}")]
    MalformedOperation {
        /// Operation kind name.
        kind: &'static str,
        /// Which contract was violated.
        reason: String,
    },

    /// The same qubit appears twice in one operation.
    #[error("Duplicate qubit {0} in operation")]
    DuplicateQubit(QubitId),

    /// A two-node operation names the same node twice.
    #[error("Operation between {0} and itself")]
    SameNode(NodeId),

    /// Two operations in one layer use the same qubit.
    #[error("Qubit {0} is used by more than one operation in the layer")]
    LayerConflict(QubitId),

    /// Qubit already present in the ownership map.
    #[error("Qubit {0} is already owned by a node")]
    QubitAlreadyOwned(QubitId),

    /// Qubit is not owned by the node an operation runs on.
    #[error("Qubit {qubit} is not owned by node {node}")]
    QubitNotOwned {
        /// The qubit.
        qubit: QubitId,
        /// The node the operation expected to own it.
        node: NodeId,
    },

    /// Layer index out of range.
    #[error("Layer index {index} out of range (circuit has {len} layers)")]
    LayerOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of layers.
        len: usize,
    },
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;
