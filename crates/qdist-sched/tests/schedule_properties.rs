//! Scheduling properties over compiled circuits.

use proptest::prelude::*;

use qdist_compile::compile;
use qdist_ir::{Circuit, Gate, NodeId, Operation, OperationKind, QubitId};
use qdist_sched::{ScheduleAssignment, Scheduler, TimingProfile, TimingTable};

fn qubit(node: usize, j: usize) -> QubitId {
    QubitId::new(format!("q_{node}_{j}"))
}

fn node(i: usize) -> NodeId {
    NodeId::new(format!("QPU_{i}"))
}

/// Three nodes with two qubits each; every step is one layer.
fn build(steps: &[(usize, usize, usize, usize, bool)]) -> Circuit {
    let mut c = Circuit::with_qubit_map((0..3).map(|i| (node(i), vec![qubit(i, 0), qubit(i, 1)])))
        .unwrap();
    for &(a, b, qa, qb, cross) in steps {
        let op = if cross && a != b {
            Operation::cross_node(node(a), node(b), qubit(a, qa), qubit(b, qb), Gate::CZ).unwrap()
        } else if qa != qb {
            Operation::two_qubit(node(a), qubit(a, qa), qubit(a, qb), Gate::CX).unwrap()
        } else {
            Operation::single(node(a), qubit(a, qa), Gate::Ry(0.3)).unwrap()
        };
        c.push_operations([op]).unwrap();
    }
    c
}

fn profile(slow_cx: u64, slow_measure: u64) -> TimingProfile {
    TimingProfile::unit()
        .with_node(
            "QPU_1",
            TimingTable::default().with_gate(OperationKind::TwoQubitGate, "cx", slow_cx),
        )
        .with_node(
            "QPU_2",
            TimingTable::default().with_kind(OperationKind::Measure, slow_measure),
        )
}

// ============================================================================
// Scenario
// ============================================================================

#[test]
fn test_cnot_scenario_max_tick() {
    let mut c = Circuit::with_qubit_map([
        (node(0), vec![qubit(0, 0)]),
        (node(1), vec![qubit(1, 0)]),
    ])
    .unwrap();
    c.push_operations([
        Operation::prepare(node(0), vec![qubit(0, 0)]).unwrap(),
        Operation::prepare(node(1), vec![qubit(1, 0)]).unwrap(),
    ])
    .unwrap();
    c.push_operations([Operation::single(node(0), qubit(0, 0), Gate::X).unwrap()])
        .unwrap();
    c.push_operations([
        Operation::cross_node(node(0), node(1), qubit(0, 0), qubit(1, 0), Gate::CX).unwrap(),
    ])
    .unwrap();
    c.push_operations([
        Operation::measure(node(0), qubit(0, 0), "m0"),
        Operation::measure(node(1), qubit(1, 0), "m1"),
    ])
    .unwrap();

    let schedule = Scheduler::default().schedule(&compile(&c).unwrap()).unwrap();
    assert_eq!(schedule.max_tick(), 13);

    let assignment = ScheduleAssignment::from_schedule(&schedule);
    let count = |kind: OperationKind| {
        schedule
            .nodes()
            .flat_map(|n| assignment.slice(n))
            .filter(|r| r.record.kind == kind)
            .count()
    };
    assert_eq!(count(OperationKind::PrepareQubits), 2);
    assert_eq!(count(OperationKind::SendEntanglement), 1);
    assert_eq!(count(OperationKind::ReceiveEntanglement), 1);
    for n in schedule.nodes() {
        let prepares = assignment
            .slice(n)
            .iter()
            .filter(|r| r.record.kind == OperationKind::PrepareQubits)
            .count();
        assert_eq!(prepares, 1);
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_due_ticks_are_monotonic(
        steps in prop::collection::vec((0..3usize, 0..3usize, 0..2usize, 0..2usize, any::<bool>()), 0..10),
        slow_cx in 1..5u64,
        slow_measure in 1..5u64,
    ) {
        let compiled = compile(&build(&steps)).unwrap();
        let schedule = Scheduler::new(profile(slow_cx, slow_measure)).schedule(&compiled).unwrap();

        for ops in schedule.per_node().values() {
            prop_assert!(ops.windows(2).all(|w| w[0].due_tick <= w[1].due_tick));
            prop_assert!(ops.iter().all(|s| s.due_tick <= schedule.max_tick()));
        }
    }

    #[test]
    fn prop_max_tick_is_sum_of_layer_maxima(
        steps in prop::collection::vec((0..3usize, 0..3usize, 0..2usize, 0..2usize, any::<bool>()), 0..10),
        slow_cx in 1..5u64,
        slow_measure in 1..5u64,
    ) {
        let compiled = compile(&build(&steps)).unwrap();
        let profile = profile(slow_cx, slow_measure);
        let schedule = Scheduler::new(profile.clone()).schedule(&compiled).unwrap();

        let expected: u64 = compiled
            .layers()
            .iter()
            .map(|layer| layer.iter().map(|op| profile.duration(op).unwrap()).max().unwrap_or(0))
            .sum();
        prop_assert_eq!(schedule.max_tick(), expected);
        prop_assert_eq!(schedule.num_operations(), compiled.num_operations());
    }
}
