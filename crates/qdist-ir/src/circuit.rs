//! Multi-node circuit: qubit ownership plus layers.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{IrError, IrResult};
use crate::ids::{NodeId, QubitId};
use crate::layer::Layer;
use crate::operation::Operation;

/// A quantum program spread across nodes.
///
/// The qubit map assigns every general-purpose qubit to exactly one node.
/// Entangled-pair ids introduced by `SendEntanglement`/`ReceiveEntanglement`
/// are local scratch qubits and never appear in the map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Circuit {
    qubit_map: BTreeMap<NodeId, Vec<QubitId>>,
    layers: Vec<Layer>,
}

impl Circuit {
    /// Create an empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a circuit from an ownership map, rejecting qubits owned twice.
    pub fn with_qubit_map(
        qubit_map: impl IntoIterator<Item = (NodeId, Vec<QubitId>)>,
    ) -> IrResult<Self> {
        let mut circuit = Self::new();
        for (node, qubits) in qubit_map {
            circuit.add_qubits(node, qubits)?;
        }
        Ok(circuit)
    }

    /// Assign more qubits to `node`.
    pub fn add_qubits(
        &mut self,
        node: impl Into<NodeId>,
        qubits: impl IntoIterator<Item = QubitId>,
    ) -> IrResult<()> {
        let node = node.into();
        let qubits: Vec<QubitId> = qubits.into_iter().collect();
        for (i, qubit) in qubits.iter().enumerate() {
            if self.owner_of(qubit).is_some() || qubits[..i].contains(qubit) {
                return Err(IrError::QubitAlreadyOwned(qubit.clone()));
            }
        }
        self.qubit_map.entry(node).or_default().extend(qubits);
        Ok(())
    }

    /// Append a layer.
    pub fn push_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    /// Insert a layer before `index`.
    pub fn insert_layer(&mut self, index: usize, layer: Layer) -> IrResult<()> {
        if index > self.layers.len() {
            return Err(IrError::LayerOutOfRange {
                index,
                len: self.layers.len(),
            });
        }
        self.layers.insert(index, layer);
        Ok(())
    }

    /// Append a layer built from `operations`.
    pub fn push_operations(
        &mut self,
        operations: impl IntoIterator<Item = Operation>,
    ) -> IrResult<()> {
        self.layers.push(Layer::from_operations(operations)?);
        Ok(())
    }

    /// Node-to-qubits ownership map.
    pub fn qubit_map(&self) -> &BTreeMap<NodeId, Vec<QubitId>> {
        &self.qubit_map
    }

    /// Nodes that own at least one qubit.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.qubit_map.keys()
    }

    /// Node owning `qubit`, if any.
    pub fn owner_of(&self, qubit: &QubitId) -> Option<&NodeId> {
        self.qubit_map
            .iter()
            .find(|(_, qubits)| qubits.contains(qubit))
            .map(|(node, _)| node)
    }

    /// Total number of general-purpose qubits across all nodes.
    pub fn total_qubits(&self) -> usize {
        self.qubit_map.values().map(Vec::len).sum()
    }

    /// Layers in execution order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of layers.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Total number of operations.
    pub fn num_operations(&self) -> usize {
        self.layers.iter().map(Layer::len).sum()
    }

    /// All operations, layer by layer.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.layers.iter().flat_map(Layer::iter)
    }

    /// Cross-node gates as `(layer index, operation index, operation)`.
    pub fn cross_node_gates(&self) -> Vec<(usize, usize, &Operation)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(l, layer)| {
                layer
                    .iter()
                    .enumerate()
                    .filter(|(_, op)| op.is_cross_node())
                    .map(move |(i, op)| (l, i, op))
            })
            .collect()
    }

    /// Check that every qubit an operation touches belongs to the node that
    /// touches it.
    ///
    /// Pair ids count as owned by a node once that node has a
    /// `SendEntanglement` or `ReceiveEntanglement` naming them.
    pub fn validate(&self) -> IrResult<()> {
        let owner: FxHashMap<&QubitId, &NodeId> = self
            .qubit_map
            .iter()
            .flat_map(|(node, qubits)| qubits.iter().map(move |q| (q, node)))
            .collect();

        let mut pairs: FxHashSet<(&NodeId, &QubitId)> = FxHashSet::default();
        for op in self.operations() {
            if op.is_entanglement() {
                for pair in op.qubits() {
                    if owner.contains_key(pair) {
                        return Err(IrError::QubitAlreadyOwned(pair.clone()));
                    }
                    pairs.insert((op.executing_node(), pair));
                }
            }
        }

        for op in self.operations() {
            for (node, qubit) in op.ownership() {
                let owned = owner.get(qubit).is_some_and(|n| *n == node)
                    || pairs.contains(&(node, qubit));
                if !owned {
                    return Err(IrError::QubitNotOwned {
                        qubit: qubit.clone(),
                        node: node.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
