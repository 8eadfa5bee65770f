//! qdist distributed compilation
//!
//! Turns a circuit whose gates may span two nodes into one where every
//! operation is local to a single node, plus explicit entanglement and
//! classical-bit exchange between nodes.
//!
//! # Architecture
//!
//! ```text
//! Input Circuit (may contain cross-node gates)
//!       │
//!       ▼
//! ┌─────────────┐
//! │ PassManager │ ◄── PropertySet (run table, rewrite stats)
//! └─────────────┘
//!       │
//!       ├── OwnershipCheck
//!       ├── CrossNodeRuns          (analysis: group gates by control qubit)
//!       ├── TeleportationRewrite   (one entangled pair per run)
//!       └── LocalityVerification
//!       │
//!       ▼
//! Distributed Circuit (node-local operations only)
//! ```
//!
//! # Example
//!
//! ```rust
//! use qdist_compile::{compile, BLOCK_FIXED_STEPS};
//! use qdist_ir::{Circuit, Gate, NodeId, Operation, QubitId};
//!
//! let mut circuit = Circuit::with_qubit_map([
//!     (NodeId::from("A"), vec![QubitId::from("a0")]),
//!     (NodeId::from("B"), vec![QubitId::from("b0")]),
//! ])
//! .unwrap();
//! circuit
//!     .push_operations([Operation::cross_node("A", "B", "a0", "b0", Gate::CX).unwrap()])
//!     .unwrap();
//!
//! let distributed = compile(&circuit).unwrap();
//! assert!(distributed.cross_node_gates().is_empty());
//! assert_eq!(distributed.depth(), 1 + BLOCK_FIXED_STEPS + 1);
//! ```
//!
//! # Custom Passes
//!
//! ```rust
//! use qdist_compile::{CompileResult, Pass, PassKind, PassManager, PropertySet};
//! use qdist_ir::Circuit;
//!
//! struct CountOps;
//!
//! impl Pass for CountOps {
//!     fn name(&self) -> &str { "count_ops" }
//!     fn kind(&self) -> PassKind { PassKind::Analysis }
//!
//!     fn run(&self, circuit: &Circuit, props: &mut PropertySet) -> CompileResult<Option<Circuit>> {
//!         props.insert(circuit.num_operations());
//!         Ok(None)
//!     }
//! }
//!
//! let mut pm = PassManager::new();
//! pm.add_pass(CountOps);
//! let mut props = PropertySet::new();
//! pm.run(&Circuit::new(), &mut props).unwrap();
//! assert_eq!(props.get::<usize>(), Some(&0));
//! ```

pub mod error;
pub mod manager;
pub mod pass;
pub mod property;

// Built-in passes
pub mod passes;

pub use error::{CompileError, CompileResult};
pub use manager::{PassManager, PassManagerBuilder};
pub use pass::{Pass, PassKind};
pub use passes::{
    BLOCK_FIXED_STEPS, ControlRun, CrossNodeRuns, LocalityVerification, OwnershipCheck,
    RewriteStats, RunGate, RunKey, RunTable, TeleportationRewrite,
};
pub use property::PropertySet;

use qdist_ir::Circuit;

/// Compile with the default pipeline.
pub fn compile(circuit: &Circuit) -> CompileResult<Circuit> {
    let (pm, mut props) = PassManagerBuilder::new().build();
    pm.run(circuit, &mut props)
}
