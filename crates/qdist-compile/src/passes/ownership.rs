//! Qubit ownership check.

use qdist_ir::Circuit;

use crate::error::CompileResult;
use crate::pass::{Pass, PassKind};
use crate::property::PropertySet;

/// Analysis pass rejecting circuits whose operations touch qubits the
/// executing node does not own.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipCheck;

impl Pass for OwnershipCheck {
    fn name(&self) -> &'static str {
        "OwnershipCheck"
    }

    fn kind(&self) -> PassKind {
        PassKind::Analysis
    }

    fn run(&self, circuit: &Circuit, _properties: &mut PropertySet) -> CompileResult<Option<Circuit>> {
        circuit.validate()?;
        Ok(None)
    }
}
