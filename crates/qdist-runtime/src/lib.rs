//! qdist runtime
//!
//! Clock-synchronized execution of compiled, scheduled distributed circuits.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  schedule / ack / report  ┌──────────────────┐
//! │ Controller │ ◄───────────────────────► │ ComputingNode ×N │
//! └─────┬──────┘                           └────────┬─────────┘
//!       │ initialise / start                        │ tick / done / fail
//!       ▼                                           ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Clock: tick t + 1 is released only after all nodes finish t  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`Controller`]: compiles with `qdist-compile`, schedules with
//!   `qdist-sched`, broadcasts the assignment and collects [`RunResults`]
//! - [`ComputingNode`]: executes its due operations at each tick on a
//!   [`QuantumBackend`](qdist_hal::QuantumBackend), exchanging bits over a
//!   [`Transport`](qdist_hal::Transport)
//! - [`Clock`]: the global tick barrier, bounded by a barrier timeout
//! - [`Network`]: builds all of the above in-process
//! - [`RuntimeConfig`]: YAML configuration with `QDIST_*` environment
//!   overrides; [`telemetry::init_tracing`] installs logging
//!
//! # Failure handling
//!
//! | Failure | Outcome |
//! |---------|---------|
//! | malformed or misaddressed record | node fails the tick, clock halts all nodes |
//! | register or pool full | same, `ResourceExhausted` |
//! | pair or bit not received in time | same, `TransportTimeout` |
//! | node silent at a barrier | clock stops with `BarrierTimeout` |
//! | node silent after the stop | controller records a timeout error for it |
//!
//! After a halt every node reports an `error` record; a run only counts as
//! successful if [`RunResults::is_success`] holds.

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod network;
pub mod node;
pub mod report;
pub mod telemetry;

pub use clock::{Clock, ClockLink, ClockPhase, ClockSignal, ClockState, StopReason};
pub use config::{
    ClockConfig, ConfigError, ControllerConfig, LogFormat, LoggingConfig, NodeConfig,
    RuntimeConfig, TimingConfig,
};
pub use controller::{CONTROLLER_ID, Controller};
pub use error::{RuntimeError, RuntimeResult};
pub use network::{Network, NetworkBuilder};
pub use node::ComputingNode;
pub use report::{NodeReport, RunResults};
