//! Error types for the runtime.

use thiserror::Error;

use qdist_compile::CompileError;
use qdist_hal::HalError;
use qdist_ir::{IrError, NodeId};
use qdist_sched::SchedError;

use crate::config::ConfigError;

/// Errors raised while running a distributed schedule.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// A scheduled operation has the wrong operand counts or is addressed
    /// to another node.
    #[error("Node {node} rejected {operation}: {reason}")]
    OperandValidation {
        /// Node that rejected the operation.
        node: NodeId,
        /// The operation, as far as it could be decoded.
        operation: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A qubit register or the entanglement pool is full.
    #[error("Node {node} ran out of resources: {reason}")]
    ResourceExhausted {
        /// Node that ran out.
        node: NodeId,
        /// Which resource.
        reason: String,
    },

    /// A bounded wait for a peer or the controller expired.
    #[error("Node {node} timed out waiting for {waiting_for}")]
    TransportTimeout {
        /// Node that was waited on, or that was waiting.
        node: NodeId,
        /// What was expected.
        waiting_for: String,
    },

    /// The clock was started without a maximum tick, or a participant is
    /// not set up for the requested action.
    #[error("Not configured: {0}")]
    Unconfigured(String),

    /// Backend or transport failure.
    #[error("Backend error: {0}")]
    Backend(#[from] HalError),

    /// An unexpected message on a control channel.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The circuit or an operation is malformed.
    #[error("Invalid circuit: {0}")]
    Ir(#[from] IrError),

    /// Compilation failed.
    #[error("Compilation failed: {0}")]
    Compile(#[from] CompileError),

    /// Scheduling failed.
    #[error("Scheduling failed: {0}")]
    Schedule(#[from] SchedError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
