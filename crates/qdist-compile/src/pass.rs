//! Pass trait and types for compilation passes.

use qdist_ir::Circuit;

use crate::error::CompileResult;
use crate::property::PropertySet;

/// The kind of compilation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Reads the circuit and writes to the `PropertySet`.
    Analysis,
    /// Produces a new circuit.
    Transformation,
}

/// A compilation pass.
///
/// Passes never mutate the circuit they are given. A transformation builds
/// and returns a new circuit; an analysis returns `None` and records what it
/// found in the `PropertySet`.
pub trait Pass: Send + Sync {
    /// Get the name of this pass.
    fn name(&self) -> &str;

    /// Get the kind of this pass.
    fn kind(&self) -> PassKind;

    /// Run the pass.
    fn run(&self, circuit: &Circuit, properties: &mut PropertySet)
    -> CompileResult<Option<Circuit>>;

    /// Check if this pass should run based on current state.
    fn should_run(&self, _circuit: &Circuit, _properties: &PropertySet) -> bool {
        true
    }
}
