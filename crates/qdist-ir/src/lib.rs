//! qdist circuit intermediate representation
//!
//! A distributed quantum program is a [`Circuit`]: a map assigning every
//! qubit to the node that holds it, plus an ordered list of [`Layer`]s. The
//! operations inside one layer touch disjoint qubits and are considered to
//! run in parallel.
//!
//! # Core Components
//!
//! - **Identifiers**: [`NodeId`], [`QubitId`], [`BitId`]
//! - **Gates**: [`Gate`] with its optional [`GateParam`] (angle or
//!   [`UnitaryMatrix`])
//! - **Operations**: [`Operation`], one variant per [`OperationKind`], and
//!   the flat [`OperationRecord`] used on the wire
//! - **Layers and circuits**: [`Layer`], [`Circuit`]
//!
//! # Example: a cross-node CNOT
//!
//! ```rust
//! use qdist_ir::{Circuit, Gate, NodeId, Operation, QubitId};
//!
//! let mut circuit = Circuit::with_qubit_map([
//!     (NodeId::from("QPU_0"), vec![QubitId::from("q_0_0")]),
//!     (NodeId::from("QPU_1"), vec![QubitId::from("q_1_0")]),
//! ])
//! .unwrap();
//!
//! circuit
//!     .push_operations([
//!         Operation::prepare("QPU_0", vec!["q_0_0".into()]).unwrap(),
//!         Operation::prepare("QPU_1", vec!["q_1_0".into()]).unwrap(),
//!     ])
//!     .unwrap();
//! circuit
//!     .push_operations([Operation::single("QPU_0", "q_0_0", Gate::X).unwrap()])
//!     .unwrap();
//! circuit
//!     .push_operations([
//!         Operation::cross_node("QPU_0", "QPU_1", "q_0_0", "q_1_0", Gate::CX).unwrap(),
//!     ])
//!     .unwrap();
//!
//! circuit.validate().unwrap();
//! assert_eq!(circuit.cross_node_gates().len(), 1);
//! ```
//!
//! # Supported Gates
//!
//! | Gate | Qubits | Name |
//! |------|--------|------|
//! | `I`, `X`, `Y`, `Z`, `H` | 1 | `i`, `x`, `y`, `z`, `h` |
//! | `S`, `Sdg`, `T`, `Tdg`, `K` | 1 | `s`, `sdg`, `t`, `tdg`, `k` |
//! | `Rx`, `Ry`, `Rz`, `P` | 1 | `rx`, `ry`, `rz`, `p` |
//! | `Custom` | 1 | `custom` |
//! | `CX`, `CZ`, `CH`, `CP`, `CRz` | 2 | `cx`, `cz`, `ch`, `cp`, `crz` |
//! | `Swap`, `CustomTwoQubit`, `CustomControlled` | 2 | `swap`, `custom_two_qubit`, `custom_controlled` |
//! | `CCX`, `CSwap` | 3 | `ccx`, `cswap` |

pub mod circuit;
pub mod error;
pub mod gate;
pub mod ids;
pub mod layer;
pub mod operation;

pub use circuit::Circuit;
pub use error::{IrError, IrResult};
pub use gate::{Gate, GateParam, UnitaryMatrix};
pub use ids::{BitId, NodeId, QubitId};
pub use layer::Layer;
pub use operation::{Operation, OperationKind, OperationRecord};
