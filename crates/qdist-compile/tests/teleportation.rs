//! Integration tests for the teleportation rewrite.

use proptest::prelude::*;

use qdist_compile::{
    BLOCK_FIXED_STEPS, PassManagerBuilder, PropertySet, RewriteStats, compile,
};
use qdist_ir::{Circuit, Gate, NodeId, Operation, OperationKind, QubitId};

fn two_nodes(width: usize) -> Circuit {
    Circuit::with_qubit_map([
        (
            NodeId::from("A"),
            (0..width).map(|j| QubitId::new(format!("a{j}"))).collect(),
        ),
        (
            NodeId::from("B"),
            (0..width).map(|j| QubitId::new(format!("b{j}"))).collect(),
        ),
    ])
    .unwrap()
}

fn count(circuit: &Circuit, kind: OperationKind) -> usize {
    circuit.operations().filter(|op| op.kind() == kind).count()
}

fn run_pipeline(circuit: &Circuit, merge: bool) -> (Circuit, RewriteStats) {
    let (pm, mut props) = PassManagerBuilder::new().with_run_merging(merge).build();
    let out = pm.run(circuit, &mut props).unwrap();
    let stats = *props.get::<RewriteStats>().unwrap();
    (out, stats)
}

// ============================================================================
// Scenario: X then cross-node CNOT, both measured
// ============================================================================

fn cnot_scenario() -> Circuit {
    let mut c = two_nodes(1);
    c.push_operations([
        Operation::prepare("A", vec!["a0".into()]).unwrap(),
        Operation::prepare("B", vec!["b0".into()]).unwrap(),
    ])
    .unwrap();
    c.push_operations([Operation::single("A", "a0", Gate::X).unwrap()])
        .unwrap();
    c.push_operations([Operation::cross_node("A", "B", "a0", "b0", Gate::CX).unwrap()])
        .unwrap();
    c.push_operations([
        Operation::measure("A", "a0", "ma"),
        Operation::measure("B", "b0", "mb"),
    ])
    .unwrap();
    c
}

#[test]
fn test_scenario_structure() {
    let out = compile(&cnot_scenario()).unwrap();

    // prepare, X, pair creation, block, measure
    assert_eq!(out.depth(), 3 + BLOCK_FIXED_STEPS + 1 + 1);
    assert_eq!(out.depth(), 13);
    assert_eq!(count(&out, OperationKind::PrepareQubits), 2);
    assert_eq!(count(&out, OperationKind::SendEntanglement), 1);
    assert_eq!(count(&out, OperationKind::ReceiveEntanglement), 1);
    assert_eq!(count(&out, OperationKind::SendClassicalBit), 2);
    assert_eq!(count(&out, OperationKind::ClassicalControlledGate), 2);
    assert!(out.cross_node_gates().is_empty());
}

#[test]
fn test_input_is_not_modified() {
    let input = cnot_scenario();
    let before = input.clone();
    let _ = compile(&input).unwrap();
    assert_eq!(input, before);
}

#[test]
fn test_consecutive_gates_share_one_pair() {
    let mut c = two_nodes(3);
    for j in 0..3 {
        c.push_operations([Operation::cross_node(
            "A",
            "B",
            "a0",
            QubitId::new(format!("b{j}")),
            Gate::CX,
        )
        .unwrap()])
        .unwrap();
    }

    let (merged, stats) = run_pipeline(&c, true);
    assert_eq!(stats.pairs, 1);
    assert_eq!(stats.gates, 3);
    assert_eq!(merged.depth(), 1 + BLOCK_FIXED_STEPS + 3);

    let (unmerged, stats) = run_pipeline(&c, false);
    assert_eq!(stats.pairs, 3);
    assert_eq!(count(&unmerged, OperationKind::SendEntanglement), 3);
}

#[test]
fn test_run_gates_keep_application_order() {
    let mut c = two_nodes(2);
    c.push_operations([Operation::cross_node("A", "B", "a0", "b0", Gate::CH).unwrap()])
        .unwrap();
    c.push_operations([Operation::cross_node("A", "B", "a0", "b1", Gate::CP(0.5)).unwrap()])
        .unwrap();

    let out = compile(&c).unwrap();
    let on_b: Vec<&str> = out
        .operations()
        .filter(|op| op.kind() == OperationKind::TwoQubitGate)
        .filter(|op| op.executing_node().as_str() == "B")
        .filter_map(|op| op.gate().map(Gate::name))
        .collect();
    assert_eq!(on_b, ["ch", "cp"]);
}

#[test]
fn test_seeded_run_table_is_used() {
    let c = cnot_scenario();
    let runs = qdist_compile::CrossNodeRuns::unmerged().analyze(&c).unwrap();
    let (pm, mut props) = PassManagerBuilder::new()
        .with_properties(PropertySet::new().with_runs(runs))
        .build();
    assert_eq!(pm.len(), 3);
    let out = pm.run(&c, &mut props).unwrap();
    assert_eq!(out.depth(), 13);
}

#[test]
fn test_swap_across_nodes_fails() {
    let mut c = two_nodes(1);
    c.push_operations([Operation::cross_node("A", "B", "a0", "b0", Gate::Swap).unwrap()])
        .unwrap();
    assert!(compile(&c).is_err());
}

// ============================================================================
// Property tests
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Cross { forward: bool, control: usize, target: usize, gate: u8 },
    Local { on_a: bool, qubit: usize },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (any::<bool>(), 0..2usize, 0..2usize, 0..3u8).prop_map(|(forward, control, target, gate)| {
            Step::Cross { forward, control, target, gate }
        }),
        1 => (any::<bool>(), 0..2usize).prop_map(|(on_a, qubit)| Step::Local { on_a, qubit }),
    ]
}

fn build(steps: &[Step]) -> Circuit {
    let mut c = two_nodes(2);
    for s in steps {
        let op = match *s {
            Step::Cross { forward, control, target, gate } => {
                let gate = match gate {
                    0 => Gate::CX,
                    1 => Gate::CZ,
                    _ => Gate::CP(0.25),
                };
                let (cn, tn, cq, tq) = if forward {
                    ("A", "B", format!("a{control}"), format!("b{target}"))
                } else {
                    ("B", "A", format!("b{control}"), format!("a{target}"))
                };
                Operation::cross_node(cn, tn, QubitId::new(cq), QubitId::new(tq), gate).unwrap()
            }
            Step::Local { on_a, qubit } => {
                let (node, q) = if on_a { ("A", format!("a{qubit}")) } else { ("B", format!("b{qubit}")) };
                Operation::single(node, QubitId::new(q), Gate::H).unwrap()
            }
        };
        c.push_operations([op]).unwrap();
    }
    c
}

proptest! {
    #[test]
    fn prop_every_cross_gate_is_replaced(steps in prop::collection::vec(step(), 0..12)) {
        let circuit = build(&steps);
        let cross = circuit.cross_node_gates().len();

        let (merged, stats) = run_pipeline(&circuit, true);
        prop_assert!(merged.cross_node_gates().is_empty());
        prop_assert_eq!(stats.gates, cross);
        prop_assert!(stats.pairs <= cross);
        prop_assert_eq!(count(&merged, OperationKind::SendEntanglement), stats.pairs);
        prop_assert_eq!(count(&merged, OperationKind::ReceiveEntanglement), stats.pairs);
        // Two bit exchanges per pair.
        prop_assert_eq!(count(&merged, OperationKind::SendClassicalBit), 2 * stats.pairs);

        // Every pair half is measured exactly once, on the node holding it.
        for node in ["A", "B"] {
            let node = NodeId::from(node);
            let halves: Vec<&QubitId> = merged
                .operations()
                .filter(|op| op.is_entanglement() && *op.executing_node() == node)
                .flat_map(|op| op.qubits())
                .collect();
            let measures: Vec<&QubitId> = merged
                .operations()
                .filter(|op| op.kind() == OperationKind::Measure && *op.executing_node() == node)
                .flat_map(|op| op.qubits())
                .collect();
            for half in &halves {
                prop_assert_eq!(measures.iter().filter(|q| *q == half).count(), 1);
            }
            let before = circuit
                .operations()
                .filter(|op| op.kind() == OperationKind::Measure && *op.executing_node() == node)
                .count();
            prop_assert_eq!(measures.len(), before + halves.len());
        }

        let (_, unmerged) = run_pipeline(&circuit, false);
        prop_assert_eq!(unmerged.pairs, cross);
        prop_assert!(unmerged.depth >= stats.depth);
    }
}
