//! Property tests for layer construction and wire records.

use proptest::prelude::*;
use qdist_ir::{Circuit, Gate, Layer, NodeId, Operation, OperationRecord, QubitId};

fn qubit(node: u8, index: u8) -> QubitId {
    QubitId::new(format!("q_{node}_{index}"))
}

/// Random local or cross-node operation over two nodes with four qubits each.
fn arb_operation() -> impl Strategy<Value = Operation> {
    let single = (0_u8..2, 0_u8..4, prop_oneof![Just(Gate::H), Just(Gate::X), Just(Gate::T)])
        .prop_map(|(n, q, gate)| Operation::single(format!("QPU_{n}"), qubit(n, q), gate).unwrap());
    let local = (0_u8..2, 0_u8..4, 0_u8..4)
        .prop_filter("control and target differ", |(_, c, t)| c != t)
        .prop_map(|(n, c, t)| {
            Operation::two_qubit(format!("QPU_{n}"), qubit(n, c), qubit(n, t), Gate::CZ).unwrap()
        });
    let cross = (0_u8..2, 0_u8..4, 0_u8..4, -3.0_f64..3.0).prop_map(|(n, c, t, theta)| {
        let peer = 1 - n;
        Operation::cross_node(
            format!("QPU_{n}"),
            format!("QPU_{peer}"),
            qubit(n, c),
            qubit(peer, t),
            Gate::CP(theta),
        )
        .unwrap()
    });
    prop_oneof![single, local, cross]
}

fn owned_circuit() -> Circuit {
    Circuit::with_qubit_map((0_u8..2).map(|n| {
        (
            NodeId::new(format!("QPU_{n}")),
            (0_u8..4).map(|q| qubit(n, q)).collect(),
        )
    }))
    .unwrap()
}

proptest! {
    /// Whatever a layer accepts touches every qubit at most once, and the
    /// resulting circuit passes ownership validation.
    #[test]
    fn test_accepted_layers_are_conflict_free(ops in prop::collection::vec(arb_operation(), 1..20)) {
        let mut layer = Layer::new();
        for op in ops {
            let _ = layer.push(op);
        }

        let mut seen = std::collections::HashSet::new();
        for op in &layer {
            for q in op.qubits() {
                prop_assert!(seen.insert(q.clone()), "qubit {} used twice", q);
            }
        }

        let mut circuit = owned_circuit();
        circuit.push_layer(layer);
        prop_assert!(circuit.validate().is_ok());
    }

    /// Records survive JSON transport and rebuild the same operation.
    #[test]
    fn test_records_survive_json(op in arb_operation()) {
        let json = serde_json::to_string(&OperationRecord::from(&op)).unwrap();
        let record: OperationRecord = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(Operation::try_from(record).unwrap(), op);
    }
}
