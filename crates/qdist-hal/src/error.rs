//! Error types for the HAL crate.

use thiserror::Error;

use qdist_ir::{NodeId, QubitId};

use crate::backend::QubitHandle;

/// Errors raised by backend and transport implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HalError {
    /// Qubit handle is not (or no longer) known to the backend.
    #[error("Unknown qubit handle {0}")]
    UnknownQubit(QubitHandle),

    /// Backend cannot apply the requested gate.
    #[error("Gate '{gate}' cannot be applied: {reason}")]
    GateRejected {
        /// Gate name.
        gate: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Backend ran out of simulation or hardware resources.
    #[error("Backend capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A pair with this id already exists.
    #[error("Entangled pair {0} already exists")]
    DuplicatePair(QubitId),

    /// The pair was created for a different node.
    #[error("Entangled pair {pair} is not addressed to {claimant}")]
    PairMismatch {
        /// Pair id.
        pair: QubitId,
        /// Node that tried to claim it.
        claimant: NodeId,
    },

    /// No endpoint is registered for the node.
    #[error("No transport endpoint for node {0}")]
    UnknownEndpoint(NodeId),

    /// An endpoint for the node is already connected.
    #[error("Transport endpoint for node {0} already connected")]
    DuplicateEndpoint(NodeId),

    /// The transport has been shut down.
    #[error("Transport closed")]
    Closed,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for HAL operations.
pub type HalResult<T> = Result<T, HalError>;
