//! Quantum backend contract.
//!
//! A [`QuantumBackend`] holds the physical (or simulated) qubits of every
//! node attached to it. Nodes never see amplitudes; they only hold opaque
//! [`QubitHandle`]s.
//!
//! | Method | Effect |
//! |--------|--------|
//! | `allocate()` | fresh qubit in \|0⟩ |
//! | `apply()` | gate on handles, in gate operand order |
//! | `measure()` | Z-basis measurement, releases the handle |
//! | `create_pair()` | Bell pair; returns the local half, parks the other for `peer` |
//! | `claim_pair()` | takes delivery of a parked half, `None` if not there yet |

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use qdist_ir::{Gate, NodeId, QubitId};

use crate::error::HalResult;

/// Opaque handle to a qubit held by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QubitHandle(pub u64);

impl fmt::Display for QubitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Gate-level access to qubits.
#[async_trait]
pub trait QuantumBackend: Send + Sync {
    /// Name of the backend.
    fn name(&self) -> &str;

    /// Allocate a fresh qubit in |0⟩ on behalf of `node`.
    async fn allocate(&self, node: &NodeId) -> HalResult<QubitHandle>;

    /// Apply `gate` to `qubits`, in the gate's operand order.
    async fn apply(&self, gate: &Gate, qubits: &[QubitHandle]) -> HalResult<()>;

    /// Measure a qubit in the computational basis. The handle is released.
    async fn measure(&self, qubit: QubitHandle) -> HalResult<u8>;

    /// Create a Bell pair named `pair`. Returns the half held by `holder`
    /// and parks the other half until `peer` claims it.
    async fn create_pair(
        &self,
        pair: &QubitId,
        holder: &NodeId,
        peer: &NodeId,
    ) -> HalResult<QubitHandle>;

    /// Claim the parked half of `pair`. Returns `None` while the pair has
    /// not been created yet.
    async fn claim_pair(&self, pair: &QubitId, claimant: &NodeId) -> HalResult<Option<QubitHandle>>;

    /// Number of live qubits.
    fn live_qubits(&self) -> usize;
}
