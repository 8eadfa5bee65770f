//! qdist reference collaborators
//!
//! - [`SimulatorBackend`]: one statevector shared by all nodes of a network.
//!   Qubits are added when allocated and removed when measured; entangled
//!   pairs are Bell states whose second half is parked until the peer
//!   claims it.
//! - [`InMemoryHub`]: in-process [`Transport`](qdist_hal::Transport)
//!   endpoints with per-sender FIFO queues.
//!
//! # Example
//!
//! ```rust
//! use qdist_adapter_sim::SimulatorBackend;
//! use qdist_hal::QuantumBackend;
//! use qdist_ir::{Gate, NodeId};
//!
//! # tokio_test_block(async {
//! let sim = SimulatorBackend::with_seed(42);
//! let q = sim.allocate(&NodeId::from("QPU_0")).await.unwrap();
//! sim.apply(&Gate::X, &[q]).await.unwrap();
//! assert_eq!(sim.measure(q).await.unwrap(), 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod channel;
mod simulator;
mod statevector;

pub use channel::{ChannelEndpoint, InMemoryHub};
pub use simulator::SimulatorBackend;
pub use statevector::Statevector;
