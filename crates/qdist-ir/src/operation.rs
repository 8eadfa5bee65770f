//! Operations: the atomic instructions of a distributed circuit.
//!
//! [`Operation`] is a sum type with one variant per kind, each carrying
//! exactly the operands that kind needs. Constructors validate arity and
//! node distinctness, so a well-typed operation is always executable as far
//! as its own shape is concerned.
//!
//! [`OperationRecord`] is the flat, kind-tagged form used on the wire: every
//! record carries the full field set (qubits, bits, gate, gate parameter,
//! participating nodes, pool flag) whether the kind needs it or not.
//! Converting a record back into an [`Operation`] re-checks the operand
//! contracts of its kind:
//!
//! | Kind | Qubits | Bits | Nodes | Gate |
//! |------|--------|------|-------|------|
//! | `PREPARE_QUBITS` | ≥ 1 | 0 | 1 | no |
//! | `SINGLE` | 1 | 0 | 1 | 1-qubit |
//! | `TWO_QUBIT` | 2 (control, target) | 0 | 1 or 2 | 2-qubit |
//! | `THREE_QUBIT` | 3 | 0 | 1 | 3-qubit |
//! | `CLASSICAL_CTRL_GATE` | 1 | 1 (condition) | 1 | 1-qubit |
//! | `SEND_ENT` / `REC_ENT` | 1 (pair) | 0 | 2 | no |
//! | `SEND_CLASSICAL` / `REC_CLASSICAL` | 0 | 1 | 2 | no |
//! | `MEASURE` | 1 | 1 | 1 | no |
//!
//! Node position 0 is always the executing node; position 1, when present,
//! is the peer (target node of a cross-node gate, receiver of a send, sender
//! of a receive).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IrError, IrResult};
use crate::gate::{Gate, GateParam};
use crate::ids::{BitId, NodeId, QubitId};

/// The kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Allocate fresh local qubits.
    #[serde(rename = "PREPARE_QUBITS")]
    PrepareQubits,
    /// Single-qubit gate.
    #[serde(rename = "SINGLE")]
    SingleGate,
    /// Two-qubit gate, local or (before compilation) cross-node.
    #[serde(rename = "TWO_QUBIT")]
    TwoQubitGate,
    /// Three-qubit gate.
    #[serde(rename = "THREE_QUBIT")]
    ThreeQubitGate,
    /// Single-qubit gate applied only if a classical bit is set.
    #[serde(rename = "CLASSICAL_CTRL_GATE")]
    ClassicalControlledGate,
    /// Create an entangled pair and keep the local half.
    #[serde(rename = "SEND_ENT")]
    SendEntanglement,
    /// Take delivery of the remote half of an entangled pair.
    #[serde(rename = "REC_ENT")]
    ReceiveEntanglement,
    /// Send a classical bit to the peer.
    #[serde(rename = "SEND_CLASSICAL")]
    SendClassicalBit,
    /// Receive a classical bit from the peer.
    #[serde(rename = "REC_CLASSICAL")]
    ReceiveClassicalBit,
    /// Destructively measure a qubit into a classical bit.
    #[serde(rename = "MEASURE")]
    Measure,
}

impl OperationKind {
    /// Every kind, in declaration order.
    pub const ALL: [OperationKind; 10] = [
        OperationKind::PrepareQubits,
        OperationKind::SingleGate,
        OperationKind::TwoQubitGate,
        OperationKind::ThreeQubitGate,
        OperationKind::ClassicalControlledGate,
        OperationKind::SendEntanglement,
        OperationKind::ReceiveEntanglement,
        OperationKind::SendClassicalBit,
        OperationKind::ReceiveClassicalBit,
        OperationKind::Measure,
    ];

    /// Wire name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::PrepareQubits => "PREPARE_QUBITS",
            OperationKind::SingleGate => "SINGLE",
            OperationKind::TwoQubitGate => "TWO_QUBIT",
            OperationKind::ThreeQubitGate => "THREE_QUBIT",
            OperationKind::ClassicalControlledGate => "CLASSICAL_CTRL_GATE",
            OperationKind::SendEntanglement => "SEND_ENT",
            OperationKind::ReceiveEntanglement => "REC_ENT",
            OperationKind::SendClassicalBit => "SEND_CLASSICAL",
            OperationKind::ReceiveClassicalBit => "REC_CLASSICAL",
            OperationKind::Measure => "MEASURE",
        }
    }

    /// Whether operations of this kind carry a gate.
    pub fn carries_gate(self) -> bool {
        matches!(
            self,
            OperationKind::SingleGate
                | OperationKind::TwoQubitGate
                | OperationKind::ThreeQubitGate
                | OperationKind::ClassicalControlledGate
        )
    }

    /// Names of the gates that operations of this kind accept.
    pub fn gate_names(self) -> &'static [&'static str] {
        match self {
            OperationKind::SingleGate | OperationKind::ClassicalControlledGate => {
                Gate::SINGLE_QUBIT_NAMES
            }
            OperationKind::TwoQubitGate => Gate::TWO_QUBIT_NAMES,
            OperationKind::ThreeQubitGate => Gate::THREE_QUBIT_NAMES,
            _ => &[],
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An atomic instruction executed by one node.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Allocate fresh general-purpose qubits on `node`.
    PrepareQubits {
        /// Executing node.
        node: NodeId,
        /// Qubits to allocate.
        qubits: Vec<QubitId>,
    },
    /// Apply a single-qubit gate.
    SingleGate {
        /// Executing node.
        node: NodeId,
        /// Target qubit.
        qubit: QubitId,
        /// The gate.
        gate: Gate,
    },
    /// Apply a two-qubit gate. With a `peer`, the target qubit lives on the
    /// peer node and the operation must be compiled away before scheduling.
    TwoQubitGate {
        /// Executing node, owner of the control qubit.
        node: NodeId,
        /// Owner of the target qubit, when it is not `node`.
        peer: Option<NodeId>,
        /// Control (first) qubit.
        control: QubitId,
        /// Target (second) qubit.
        target: QubitId,
        /// The gate.
        gate: Gate,
    },
    /// Apply a three-qubit gate.
    ThreeQubitGate {
        /// Executing node.
        node: NodeId,
        /// Operand qubits, in gate order.
        qubits: [QubitId; 3],
        /// The gate.
        gate: Gate,
    },
    /// Apply a single-qubit gate if `condition` holds 1.
    ClassicalControlledGate {
        /// Executing node.
        node: NodeId,
        /// Target qubit.
        qubit: QubitId,
        /// Bit the gate is conditioned on.
        condition: BitId,
        /// The gate.
        gate: Gate,
    },
    /// Create an entangled pair shared with `peer` and keep one half.
    SendEntanglement {
        /// Executing node.
        node: NodeId,
        /// Node receiving the other half.
        peer: NodeId,
        /// Pair identifier; names the local half on both sides.
        pair: QubitId,
        /// Whether the half occupies an entanglement-pool slot.
        pooled: bool,
    },
    /// Take delivery of the half of a pair created by `peer`.
    ReceiveEntanglement {
        /// Executing node.
        node: NodeId,
        /// Node that created the pair.
        peer: NodeId,
        /// Pair identifier.
        pair: QubitId,
        /// Whether the half occupies an entanglement-pool slot.
        pooled: bool,
    },
    /// Send a held classical bit to `peer`.
    SendClassicalBit {
        /// Executing node.
        node: NodeId,
        /// Receiver.
        peer: NodeId,
        /// The bit.
        bit: BitId,
    },
    /// Wait for a classical bit from `peer`.
    ReceiveClassicalBit {
        /// Executing node.
        node: NodeId,
        /// Sender.
        peer: NodeId,
        /// The bit.
        bit: BitId,
    },
    /// Measure and discard a qubit.
    Measure {
        /// Executing node.
        node: NodeId,
        /// Qubit to measure.
        qubit: QubitId,
        /// Bit receiving the outcome.
        bit: BitId,
    },
}

fn check_arity(gate: &Gate, expected: u32) -> IrResult<()> {
    if gate.num_qubits() == expected {
        Ok(())
    } else {
        Err(IrError::QubitCountMismatch {
            gate_name: gate.name().to_string(),
            expected,
            got: gate.num_qubits(),
        })
    }
}

fn check_peer(node: &NodeId, peer: &NodeId) -> IrResult<()> {
    if node == peer {
        Err(IrError::SameNode(node.clone()))
    } else {
        Ok(())
    }
}

impl Operation {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Allocate `qubits` on `node`.
    pub fn prepare(node: impl Into<NodeId>, qubits: Vec<QubitId>) -> IrResult<Self> {
        if qubits.is_empty() {
            return Err(IrError::MalformedOperation {
                kind: OperationKind::PrepareQubits.name(),
                reason: "no qubits to prepare".into(),
            });
        }
        for (i, qubit) in qubits.iter().enumerate() {
            if qubits[..i].contains(qubit) {
                return Err(IrError::DuplicateQubit(qubit.clone()));
            }
        }
        Ok(Operation::PrepareQubits {
            node: node.into(),
            qubits,
        })
    }

    /// Single-qubit gate.
    pub fn single(node: impl Into<NodeId>, qubit: impl Into<QubitId>, gate: Gate) -> IrResult<Self> {
        check_arity(&gate, 1)?;
        Ok(Operation::SingleGate {
            node: node.into(),
            qubit: qubit.into(),
            gate,
        })
    }

    /// Two-qubit gate on qubits held by one node.
    pub fn two_qubit(
        node: impl Into<NodeId>,
        control: impl Into<QubitId>,
        target: impl Into<QubitId>,
        gate: Gate,
    ) -> IrResult<Self> {
        check_arity(&gate, 2)?;
        let (control, target) = (control.into(), target.into());
        if control == target {
            return Err(IrError::DuplicateQubit(control));
        }
        Ok(Operation::TwoQubitGate {
            node: node.into(),
            peer: None,
            control,
            target,
            gate,
        })
    }

    /// Two-qubit gate whose control lives on `control_node` and whose target
    /// lives on `target_node`.
    pub fn cross_node(
        control_node: impl Into<NodeId>,
        target_node: impl Into<NodeId>,
        control: impl Into<QubitId>,
        target: impl Into<QubitId>,
        gate: Gate,
    ) -> IrResult<Self> {
        check_arity(&gate, 2)?;
        let (node, peer) = (control_node.into(), target_node.into());
        check_peer(&node, &peer)?;
        let (control, target) = (control.into(), target.into());
        if control == target {
            return Err(IrError::DuplicateQubit(control));
        }
        Ok(Operation::TwoQubitGate {
            node,
            peer: Some(peer),
            control,
            target,
            gate,
        })
    }

    /// Three-qubit gate.
    pub fn three_qubit(node: impl Into<NodeId>, qubits: [QubitId; 3], gate: Gate) -> IrResult<Self> {
        check_arity(&gate, 3)?;
        if qubits[0] == qubits[1] || qubits[0] == qubits[2] {
            return Err(IrError::DuplicateQubit(qubits[0].clone()));
        }
        if qubits[1] == qubits[2] {
            return Err(IrError::DuplicateQubit(qubits[1].clone()));
        }
        Ok(Operation::ThreeQubitGate {
            node: node.into(),
            qubits,
            gate,
        })
    }

    /// Single-qubit gate applied when `condition` is 1.
    pub fn classically_controlled(
        node: impl Into<NodeId>,
        qubit: impl Into<QubitId>,
        condition: impl Into<BitId>,
        gate: Gate,
    ) -> IrResult<Self> {
        check_arity(&gate, 1)?;
        Ok(Operation::ClassicalControlledGate {
            node: node.into(),
            qubit: qubit.into(),
            condition: condition.into(),
            gate,
        })
    }

    /// Create pair `pair` shared with `peer`.
    pub fn send_entanglement(
        node: impl Into<NodeId>,
        peer: impl Into<NodeId>,
        pair: impl Into<QubitId>,
        pooled: bool,
    ) -> IrResult<Self> {
        let (node, peer) = (node.into(), peer.into());
        check_peer(&node, &peer)?;
        Ok(Operation::SendEntanglement {
            node,
            peer,
            pair: pair.into(),
            pooled,
        })
    }

    /// Receive the half of `pair` created by `peer`.
    pub fn receive_entanglement(
        node: impl Into<NodeId>,
        peer: impl Into<NodeId>,
        pair: impl Into<QubitId>,
        pooled: bool,
    ) -> IrResult<Self> {
        let (node, peer) = (node.into(), peer.into());
        check_peer(&node, &peer)?;
        Ok(Operation::ReceiveEntanglement {
            node,
            peer,
            pair: pair.into(),
            pooled,
        })
    }

    /// Send `bit` to `peer`.
    pub fn send_bit(
        node: impl Into<NodeId>,
        peer: impl Into<NodeId>,
        bit: impl Into<BitId>,
    ) -> IrResult<Self> {
        let (node, peer) = (node.into(), peer.into());
        check_peer(&node, &peer)?;
        Ok(Operation::SendClassicalBit {
            node,
            peer,
            bit: bit.into(),
        })
    }

    /// Receive `bit` from `peer`.
    pub fn receive_bit(
        node: impl Into<NodeId>,
        peer: impl Into<NodeId>,
        bit: impl Into<BitId>,
    ) -> IrResult<Self> {
        let (node, peer) = (node.into(), peer.into());
        check_peer(&node, &peer)?;
        Ok(Operation::ReceiveClassicalBit {
            node,
            peer,
            bit: bit.into(),
        })
    }

    /// Measure `qubit` into `bit`.
    pub fn measure(
        node: impl Into<NodeId>,
        qubit: impl Into<QubitId>,
        bit: impl Into<BitId>,
    ) -> Self {
        Operation::Measure {
            node: node.into(),
            qubit: qubit.into(),
            bit: bit.into(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Kind of this operation.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::PrepareQubits { .. } => OperationKind::PrepareQubits,
            Operation::SingleGate { .. } => OperationKind::SingleGate,
            Operation::TwoQubitGate { .. } => OperationKind::TwoQubitGate,
            Operation::ThreeQubitGate { .. } => OperationKind::ThreeQubitGate,
            Operation::ClassicalControlledGate { .. } => OperationKind::ClassicalControlledGate,
            Operation::SendEntanglement { .. } => OperationKind::SendEntanglement,
            Operation::ReceiveEntanglement { .. } => OperationKind::ReceiveEntanglement,
            Operation::SendClassicalBit { .. } => OperationKind::SendClassicalBit,
            Operation::ReceiveClassicalBit { .. } => OperationKind::ReceiveClassicalBit,
            Operation::Measure { .. } => OperationKind::Measure,
        }
    }

    /// The node that executes this operation (participating node 0).
    pub fn executing_node(&self) -> &NodeId {
        match self {
            Operation::PrepareQubits { node, .. }
            | Operation::SingleGate { node, .. }
            | Operation::TwoQubitGate { node, .. }
            | Operation::ThreeQubitGate { node, .. }
            | Operation::ClassicalControlledGate { node, .. }
            | Operation::SendEntanglement { node, .. }
            | Operation::ReceiveEntanglement { node, .. }
            | Operation::SendClassicalBit { node, .. }
            | Operation::ReceiveClassicalBit { node, .. }
            | Operation::Measure { node, .. } => node,
        }
    }

    /// The peer node (participating node 1), if any.
    pub fn peer(&self) -> Option<&NodeId> {
        match self {
            Operation::TwoQubitGate { peer, .. } => peer.as_ref(),
            Operation::SendEntanglement { peer, .. }
            | Operation::ReceiveEntanglement { peer, .. }
            | Operation::SendClassicalBit { peer, .. }
            | Operation::ReceiveClassicalBit { peer, .. } => Some(peer),
            _ => None,
        }
    }

    /// Participating nodes, executing node first.
    pub fn nodes(&self) -> Vec<&NodeId> {
        let mut nodes = vec![self.executing_node()];
        nodes.extend(self.peer());
        nodes
    }

    /// Qubits referenced, in operand order.
    pub fn qubits(&self) -> Vec<&QubitId> {
        match self {
            Operation::PrepareQubits { qubits, .. } => qubits.iter().collect(),
            Operation::SingleGate { qubit, .. }
            | Operation::ClassicalControlledGate { qubit, .. }
            | Operation::Measure { qubit, .. } => vec![qubit],
            Operation::TwoQubitGate {
                control, target, ..
            } => vec![control, target],
            Operation::ThreeQubitGate { qubits, .. } => qubits.iter().collect(),
            Operation::SendEntanglement { pair, .. }
            | Operation::ReceiveEntanglement { pair, .. } => vec![pair],
            Operation::SendClassicalBit { .. } | Operation::ReceiveClassicalBit { .. } => {
                vec![]
            }
        }
    }

    /// Classical bits referenced or produced.
    pub fn bits(&self) -> Vec<&BitId> {
        match self {
            Operation::ClassicalControlledGate { condition, .. } => vec![condition],
            Operation::SendClassicalBit { bit, .. }
            | Operation::ReceiveClassicalBit { bit, .. }
            | Operation::Measure { bit, .. } => vec![bit],
            _ => vec![],
        }
    }

    /// The gate, for gate-carrying kinds.
    pub fn gate(&self) -> Option<&Gate> {
        match self {
            Operation::SingleGate { gate, .. }
            | Operation::TwoQubitGate { gate, .. }
            | Operation::ThreeQubitGate { gate, .. }
            | Operation::ClassicalControlledGate { gate, .. } => Some(gate),
            _ => None,
        }
    }

    /// Whether the operation works on an entanglement-pool qubit.
    pub fn is_pooled(&self) -> bool {
        match self {
            Operation::SendEntanglement { pooled, .. }
            | Operation::ReceiveEntanglement { pooled, .. } => *pooled,
            _ => false,
        }
    }

    /// Whether this is an entanglement send or receive.
    pub fn is_entanglement(&self) -> bool {
        matches!(
            self,
            Operation::SendEntanglement { .. } | Operation::ReceiveEntanglement { .. }
        )
    }

    /// Whether this is a two-qubit gate spanning two nodes.
    pub fn is_cross_node(&self) -> bool {
        matches!(self, Operation::TwoQubitGate { peer: Some(_), .. })
    }

    /// Qubits that must be owned by each participating node, as
    /// `(node, qubit)` pairs.
    pub(crate) fn ownership(&self) -> Vec<(&NodeId, &QubitId)> {
        match self {
            Operation::TwoQubitGate {
                node,
                peer: Some(peer),
                control,
                target,
                ..
            } => vec![(node, control), (peer, target)],
            _ => {
                let node = self.executing_node();
                self.qubits().into_iter().map(|q| (node, q)).collect()
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind(), self.executing_node())?;
        if let Some(gate) = self.gate() {
            write!(f, " {}", gate.name())?;
        }
        let qubits = self.qubits();
        if !qubits.is_empty() {
            let names: Vec<&str> = qubits.iter().map(|q| q.as_str()).collect();
            write!(f, " [{}]", names.join(", "))?;
        }
        if let Some(peer) = self.peer() {
            write!(f, " <-> {peer}")?;
        }
        Ok(())
    }
}

/// Flat wire form of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Operation kind.
    pub kind: OperationKind,
    /// Qubit operands.
    #[serde(default)]
    pub qubits: Vec<QubitId>,
    /// Classical-bit operands.
    #[serde(default)]
    pub bits: Vec<BitId>,
    /// Gate name for gate-carrying kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<String>,
    /// Gate parameter, if the gate has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_param: Option<GateParam>,
    /// Participating nodes, executing node first.
    pub nodes: Vec<NodeId>,
    /// Entanglement-pool flag.
    #[serde(default)]
    pub pooled: bool,
}

impl From<&Operation> for OperationRecord {
    fn from(op: &Operation) -> Self {
        Self {
            kind: op.kind(),
            qubits: op.qubits().into_iter().cloned().collect(),
            bits: op.bits().into_iter().cloned().collect(),
            gate: op.gate().map(|g| g.name().to_string()),
            gate_param: op.gate().and_then(Gate::param),
            nodes: op.nodes().into_iter().cloned().collect(),
            pooled: op.is_pooled(),
        }
    }
}

impl OperationRecord {
    fn malformed(&self, reason: String) -> IrError {
        IrError::MalformedOperation {
            kind: self.kind.name(),
            reason,
        }
    }

    fn expect_counts(&self, qubits: usize, bits: usize, nodes: &[usize]) -> IrResult<()> {
        if self.qubits.len() != qubits {
            return Err(self.malformed(format!(
                "expected {qubits} qubit ids, got {}",
                self.qubits.len()
            )));
        }
        if self.bits.len() != bits {
            return Err(self.malformed(format!(
                "expected {bits} classical bit ids, got {}",
                self.bits.len()
            )));
        }
        if !nodes.contains(&self.nodes.len()) {
            return Err(self.malformed(format!(
                "unexpected number of participating nodes: {}",
                self.nodes.len()
            )));
        }
        Ok(())
    }

    fn take_gate(&mut self) -> IrResult<Gate> {
        let name = self
            .gate
            .take()
            .ok_or_else(|| self.malformed("missing gate".into()))?;
        Gate::from_parts(&name, self.gate_param.take())
    }
}

impl TryFrom<OperationRecord> for Operation {
    type Error = IrError;

    fn try_from(mut record: OperationRecord) -> IrResult<Self> {
        use OperationKind as K;

        if !record.kind.carries_gate() && record.gate.is_some() {
            return Err(record.malformed("unexpected gate".into()));
        }

        match record.kind {
            K::PrepareQubits => {
                if record.qubits.is_empty() || !record.bits.is_empty() || record.nodes.len() != 1 {
                    return Err(record.malformed(format!(
                        "expected at least one qubit, no bits and one node; got {}/{}/{}",
                        record.qubits.len(),
                        record.bits.len(),
                        record.nodes.len()
                    )));
                }
                let node = record.nodes.swap_remove(0);
                Operation::prepare(node, record.qubits)
            }
            K::SingleGate => {
                record.expect_counts(1, 0, &[1])?;
                let gate = record.take_gate()?;
                Operation::single(record.nodes.swap_remove(0), record.qubits.swap_remove(0), gate)
            }
            K::TwoQubitGate => {
                record.expect_counts(2, 0, &[1, 2])?;
                let gate = record.take_gate()?;
                let target = record.qubits.swap_remove(1);
                let control = record.qubits.swap_remove(0);
                let peer = (record.nodes.len() == 2).then(|| record.nodes.swap_remove(1));
                let node = record.nodes.swap_remove(0);
                match peer {
                    Some(peer) => Operation::cross_node(node, peer, control, target, gate),
                    None => Operation::two_qubit(node, control, target, gate),
                }
            }
            K::ThreeQubitGate => {
                record.expect_counts(3, 0, &[1])?;
                let gate = record.take_gate()?;
                let qubits: [QubitId; 3] = record
                    .qubits
                    .try_into()
                    .map_err(|_| IrError::MalformedOperation {
                        kind: K::ThreeQubitGate.name(),
                        reason: "expected 3 qubit ids".into(),
                    })?;
                Operation::three_qubit(record.nodes.swap_remove(0), qubits, gate)
            }
            K::ClassicalControlledGate => {
                record.expect_counts(1, 1, &[1])?;
                let gate = record.take_gate()?;
                Operation::classically_controlled(
                    record.nodes.swap_remove(0),
                    record.qubits.swap_remove(0),
                    record.bits.swap_remove(0),
                    gate,
                )
            }
            K::SendEntanglement | K::ReceiveEntanglement => {
                record.expect_counts(1, 0, &[2])?;
                let peer = record.nodes.swap_remove(1);
                let node = record.nodes.swap_remove(0);
                let pair = record.qubits.swap_remove(0);
                if record.kind == K::SendEntanglement {
                    Operation::send_entanglement(node, peer, pair, record.pooled)
                } else {
                    Operation::receive_entanglement(node, peer, pair, record.pooled)
                }
            }
            K::SendClassicalBit | K::ReceiveClassicalBit => {
                record.expect_counts(0, 1, &[2])?;
                let peer = record.nodes.swap_remove(1);
                let node = record.nodes.swap_remove(0);
                let bit = record.bits.swap_remove(0);
                if record.kind == K::SendClassicalBit {
                    Operation::send_bit(node, peer, bit)
                } else {
                    Operation::receive_bit(node, peer, bit)
                }
            }
            K::Measure => {
                record.expect_counts(1, 1, &[1])?;
                Ok(Operation::measure(
                    record.nodes.swap_remove(0),
                    record.qubits.swap_remove(0),
                    record.bits.swap_remove(0),
                ))
            }
        }
    }
}
