//! Built-in compilation passes.

mod ownership;
mod runs;
mod teleport;
mod verify;

pub use ownership::OwnershipCheck;
pub use runs::{ControlRun, CrossNodeRuns, RunGate, RunKey, RunTable};
pub use teleport::{BLOCK_FIXED_STEPS, RewriteStats, TeleportationRewrite};
pub use verify::LocalityVerification;
