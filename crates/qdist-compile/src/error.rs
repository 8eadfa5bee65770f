//! Error types for the compiler.

use thiserror::Error;

use qdist_ir::IrError;

/// Errors that can occur during compilation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// Error from the IR.
    #[error("IR error: {0}")]
    Ir(#[from] IrError),

    /// A cross-node run groups gates that do not share one
    /// (control node, target node, control qubit) key, or does not match
    /// the circuit being rewritten.
    #[error("Malformed cross-node run starting at layer {layer}: {reason}")]
    MalformedRun {
        /// Layer the run starts at.
        layer: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// A cross-node gate is not a controlled single-qubit unitary.
    #[error("Gate '{gate}' in layer {layer} cannot be executed across nodes")]
    UnsupportedCrossNodeGate {
        /// Gate name.
        gate: String,
        /// Layer index.
        layer: usize,
    },

    /// A pass needs a property an earlier pass should have produced.
    #[error("Missing required property: {0}")]
    MissingProperty(String),

    /// The rewritten circuit is not executable by independent nodes.
    #[error("Verification failed: {0}")]
    VerificationFailed(String),
}

/// Result type for compilation operations.
pub type CompileResult<T> = Result<T, CompileError>;
