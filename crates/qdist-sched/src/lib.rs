//! qdist tick scheduler
//!
//! Turns a compiled (node-local) circuit into one timeline per node.
//!
//! # Algorithm
//!
//! | Step | Effect |
//! |------|--------|
//! | per layer | every operation is due at the tick the previous layer ended |
//! | per layer | the layer lasts as long as its slowest operation |
//! | partition | operations are filed under their executing node, in circuit order |
//! | result | the max tick is the sum of the per-layer maxima |
//!
//! Durations come from a [`TimingProfile`]: one [`TimingTable`] per node,
//! with an optional fallback. The default profile gives every operation one
//! tick.
//!
//! # Example
//!
//! ```rust
//! use qdist_ir::{Circuit, Gate, NodeId, Operation, QubitId};
//! use qdist_sched::{ScheduleAssignment, Scheduler};
//!
//! let mut circuit = Circuit::with_qubit_map([
//!     (NodeId::from("QPU_0"), vec![QubitId::from("q_0_0")]),
//! ])
//! .unwrap();
//! circuit
//!     .push_operations([Operation::single("QPU_0", "q_0_0", Gate::H).unwrap()])
//!     .unwrap();
//! circuit
//!     .push_operations([Operation::measure("QPU_0", "q_0_0", "m")])
//!     .unwrap();
//!
//! let schedule = Scheduler::default().schedule(&circuit).unwrap();
//! assert_eq!(schedule.max_tick(), 2);
//!
//! let json = ScheduleAssignment::from_schedule(&schedule).to_json().unwrap();
//! assert!(json.contains("\"due_tick\":1"));
//! ```

pub mod error;
pub mod scheduler;
pub mod timing;
pub mod wire;

pub use error::{SchedError, SchedResult};
pub use scheduler::{Schedule, ScheduledOperation, Scheduler};
pub use timing::{KindTiming, TimingProfile, TimingTable};
pub use wire::{ScheduleAssignment, ScheduledRecord};
