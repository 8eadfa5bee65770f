//! qdist hardware abstraction layer
//!
//! Contracts between a compute node and the collaborators it drives:
//!
//! - [`QuantumBackend`]: allocates qubits, applies gates, measures, and
//!   creates or hands out halves of entangled pairs
//! - [`Transport`]: point-to-point classical messages with blocking receive
//!   and a broadcast for the schedule assignment
//! - [`TransportHub`]: hands out connected endpoints
//!
//! The reference implementations live in `qdist-adapter-sim`.

pub mod backend;
pub mod error;
pub mod transport;

pub use backend::{QuantumBackend, QubitHandle};
pub use error::{HalError, HalResult};
pub use transport::{Message, Transport, TransportHub};
