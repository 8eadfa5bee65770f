//! A group of operations that execute in parallel.

use rustc_hash::FxHashMap;

use crate::error::{IrError, IrResult};
use crate::ids::QubitId;
use crate::operation::Operation;

/// How a qubit id is used inside one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Usage {
    /// Used by an ordinary operation.
    Exclusive,
    /// Used as an entangled-pair id by the sending and/or receiving side.
    Pair { send: bool, receive: bool },
}

/// An ordered collection of operations without qubit conflicts.
///
/// No two operations may touch the same qubit id, except the two sides of
/// one entangled pair (a `SendEntanglement` and a `ReceiveEntanglement`
/// naming the same pair id).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    operations: Vec<Operation>,
}

impl Layer {
    /// Create an empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a layer from operations, rejecting qubit conflicts.
    pub fn from_operations(operations: impl IntoIterator<Item = Operation>) -> IrResult<Self> {
        let mut layer = Self::new();
        for op in operations {
            layer.push(op)?;
        }
        Ok(layer)
    }

    /// Append an operation, rejecting it if it conflicts with the layer.
    pub fn push(&mut self, op: Operation) -> IrResult<()> {
        let mut usage = self.usage();
        Self::claim(&mut usage, &op)?;
        self.operations.push(op);
        Ok(())
    }

    /// Remove and return the operation at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Operation> {
        (index < self.operations.len()).then(|| self.operations.remove(index))
    }

    /// Operations in layer order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the layer holds no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Whether any operation spans two nodes.
    pub fn has_cross_node_gate(&self) -> bool {
        self.operations.iter().any(Operation::is_cross_node)
    }

    /// Iterate over the operations.
    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    fn usage(&self) -> FxHashMap<&QubitId, Usage> {
        let mut usage = FxHashMap::default();
        for op in &self.operations {
            // Already validated on insertion.
            let _ = Self::claim(&mut usage, op);
        }
        usage
    }

    fn claim<'a>(usage: &mut FxHashMap<&'a QubitId, Usage>, op: &'a Operation) -> IrResult<()> {
        let sending = matches!(op, Operation::SendEntanglement { .. });
        for qubit in op.qubits() {
            let next = match (usage.get(qubit), op.is_entanglement()) {
                (None, false) => Usage::Exclusive,
                (None, true) => Usage::Pair {
                    send: sending,
                    receive: !sending,
                },
                (Some(Usage::Pair { send, receive }), true) => {
                    if (sending && *send) || (!sending && *receive) {
                        return Err(IrError::LayerConflict(qubit.clone()));
                    }
                    Usage::Pair {
                        send: true,
                        receive: true,
                    }
                }
                (Some(_), _) => return Err(IrError::LayerConflict(qubit.clone())),
            };
            usage.insert(qubit, next);
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Layer {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Gate;

    #[test]
    fn test_rejects_shared_qubit() {
        let mut layer = Layer::new();
        layer.push(Operation::single("A", "q0", Gate::H).unwrap()).unwrap();
        let err = layer
            .push(Operation::measure("A", "q0", "m0"))
            .unwrap_err();
        assert!(matches!(err, IrError::LayerConflict(_)));
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_pair_sides_may_share_an_id() {
        let layer = Layer::from_operations([
            Operation::send_entanglement("A", "B", "epr", true).unwrap(),
            Operation::receive_entanglement("B", "A", "epr", true).unwrap(),
        ])
        .unwrap();
        assert_eq!(layer.len(), 2);
    }

    #[test]
    fn test_pair_side_cannot_repeat() {
        let result = Layer::from_operations([
            Operation::send_entanglement("A", "B", "epr", true).unwrap(),
            Operation::send_entanglement("A", "C", "epr", true).unwrap(),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_pair_id_cannot_mix_with_gate() {
        let result = Layer::from_operations([
            Operation::send_entanglement("A", "B", "epr", true).unwrap(),
            Operation::single("A", "epr", Gate::X).unwrap(),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_remove_and_cross_node_detection() {
        let mut layer = Layer::from_operations([
            Operation::cross_node("A", "B", "a", "b", Gate::CX).unwrap(),
            Operation::single("A", "c", Gate::X).unwrap(),
        ])
        .unwrap();
        assert!(layer.has_cross_node_gate());
        assert!(layer.remove(0).unwrap().is_cross_node());
        assert!(!layer.has_cross_node_gate());
        assert!(layer.remove(5).is_none());
    }
}
