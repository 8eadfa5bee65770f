//! End-to-end runs on the reference simulator.

use std::collections::BTreeMap;
use std::f64::consts::{FRAC_1_SQRT_2, PI};
use std::io::Write;
use std::sync::Arc;

use qdist_adapter_sim::{InMemoryHub, SimulatorBackend};
use qdist_hal::{Message, Transport, TransportHub};
use qdist_ir::{
    BitId, Circuit, Gate, NodeId, Operation, OperationKind, OperationRecord, QubitId,
    UnitaryMatrix,
};
use qdist_runtime::{
    Clock, ClockSignal, ComputingNode, Controller, ControllerConfig, Network, NodeConfig,
    NodeReport, RuntimeConfig, RuntimeError, StopReason,
};
use qdist_sched::{ScheduleAssignment, ScheduledRecord, TimingProfile, TimingTable};

fn network(seed: u64) -> Network {
    network_with(seed, RuntimeConfig::default())
}

fn network_with(seed: u64, config: RuntimeConfig) -> Network {
    Network::builder(
        Arc::new(SimulatorBackend::with_seed(seed)),
        Arc::new(InMemoryHub::new()),
    )
    .nodes(2, 2)
    .with_config(config)
    .spawn()
    .unwrap()
}

fn qpu(i: usize) -> NodeId {
    NodeId::new(format!("QPU_{i}"))
}

fn prepare_all(circuit: &mut Circuit) {
    circuit
        .push_operations([
            Operation::prepare("QPU_0", vec!["q_0_0".into(), "q_0_1".into()]).unwrap(),
            Operation::prepare("QPU_1", vec!["q_1_0".into(), "q_1_1".into()]).unwrap(),
        ])
        .unwrap();
}

fn measure_pair(circuit: &mut Circuit) {
    circuit
        .push_operations([
            Operation::measure("QPU_0", "q_0_0", "A"),
            Operation::measure("QPU_1", "q_1_0", "B"),
        ])
        .unwrap();
}

/// X on QPU_0's qubit, then a CNOT onto QPU_1's qubit, both measured.
fn cnot_scenario(network: &Network) -> Circuit {
    let mut c = network.circuit().unwrap();
    prepare_all(&mut c);
    c.push_operations([Operation::single("QPU_0", "q_0_0", Gate::X).unwrap()])
        .unwrap();
    c.push_operations([
        Operation::cross_node("QPU_0", "QPU_1", "q_0_0", "q_1_0", Gate::CX).unwrap(),
    ])
    .unwrap();
    measure_pair(&mut c);
    c
}

fn bit(results: &qdist_runtime::RunResults, node: usize, name: &str) -> Option<u8> {
    results.bit(&qpu(node), &BitId::from(name))
}

// ============================================================================
// Scenario
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cross_node_cnot_scenario() {
    let network = network(7);
    let circuit = cnot_scenario(&network);

    let compiled = network.controller().compile(&circuit).unwrap();
    let schedule = network.controller().schedule(&compiled).unwrap();
    assert_eq!(schedule.max_tick(), 13);

    let results = network.controller().run(&schedule).await.unwrap();
    assert!(results.is_success(), "{results:?}");
    assert_eq!(results.stop, StopReason::Completed);
    assert_eq!(bit(&results, 0, "A"), Some(1));
    assert_eq!(bit(&results, 1, "B"), Some(1));

    // Protocol scratch bits stay out of the results.
    assert_eq!(results.bits(&qpu(0)).unwrap().len(), 1);
    assert_eq!(results.bits(&qpu(1)).unwrap().len(), 1);

    network.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_network_serves_consecutive_runs() {
    let network = network(11);
    let circuit = cnot_scenario(&network);

    for _ in 0..3 {
        let results = network.execute(&circuit).await.unwrap();
        assert!(results.is_success());
        assert_eq!(bit(&results, 1, "B"), Some(1));
    }
    network.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unset_control_leaves_target() {
    let network = network(3);
    let mut c = network.circuit().unwrap();
    prepare_all(&mut c);
    c.push_operations([
        Operation::cross_node("QPU_0", "QPU_1", "q_0_0", "q_1_0", Gate::CX).unwrap(),
    ])
    .unwrap();
    measure_pair(&mut c);

    let results = network.execute(&c).await.unwrap();
    assert_eq!(bit(&results, 0, "A"), Some(0));
    assert_eq!(bit(&results, 1, "B"), Some(0));
    network.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bell_state_across_nodes_is_correlated() {
    for seed in 0..6 {
        let network = network(seed);
        let mut c = network.circuit().unwrap();
        prepare_all(&mut c);
        c.push_operations([Operation::single("QPU_0", "q_0_0", Gate::H).unwrap()])
            .unwrap();
        c.push_operations([
            Operation::cross_node("QPU_0", "QPU_1", "q_0_0", "q_1_0", Gate::CX).unwrap(),
        ])
        .unwrap();
        measure_pair(&mut c);

        let results = network.execute(&c).await.unwrap();
        assert!(results.is_success());
        assert_eq!(bit(&results, 0, "A"), bit(&results, 1, "B"), "seed {seed}");
        network.shutdown().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_controlled_phase_kicks_back_through_hadamards() {
    for control in [0u8, 1] {
        let network = network(5);
        let mut c = network.circuit().unwrap();
        prepare_all(&mut c);
        let mut layer = vec![Operation::single("QPU_1", "q_1_0", Gate::H).unwrap()];
        if control == 1 {
            layer.push(Operation::single("QPU_0", "q_0_0", Gate::X).unwrap());
        }
        c.push_operations(layer).unwrap();
        c.push_operations([
            Operation::cross_node("QPU_0", "QPU_1", "q_0_0", "q_1_0", Gate::CP(PI)).unwrap(),
        ])
        .unwrap();
        c.push_operations([Operation::single("QPU_1", "q_1_0", Gate::H).unwrap()])
            .unwrap();
        measure_pair(&mut c);

        let results = network.execute(&c).await.unwrap();
        assert_eq!(bit(&results, 1, "B"), Some(control));
        network.shutdown().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_merged_run_keeps_application_order() {
    // CH then (X·H) maps |0> to |1>; the reverse order would give |0>.
    let s = FRAC_1_SQRT_2;
    let xh = UnitaryMatrix::from_real(&[&[s, -s], &[s, s]]).unwrap();

    let network = network(13);
    let mut c = network.circuit().unwrap();
    prepare_all(&mut c);
    c.push_operations([Operation::single("QPU_0", "q_0_0", Gate::X).unwrap()])
        .unwrap();
    c.push_operations([
        Operation::cross_node("QPU_0", "QPU_1", "q_0_0", "q_1_0", Gate::CH).unwrap(),
    ])
    .unwrap();
    c.push_operations([Operation::cross_node(
        "QPU_0",
        "QPU_1",
        "q_0_0",
        "q_1_0",
        Gate::CustomControlled(xh),
    )
    .unwrap()])
    .unwrap();
    measure_pair(&mut c);

    let compiled = network.controller().compile(&c).unwrap();
    let pairs = compiled
        .operations()
        .filter(|op| op.kind() == OperationKind::SendEntanglement)
        .count();
    assert_eq!(pairs, 1);

    let results = network.execute(&c).await.unwrap();
    assert!(results.is_success());
    assert_eq!(bit(&results, 1, "B"), Some(1));
    network.shutdown().await.unwrap();
}

/// `X` on the control, then `H · CP(π/k)^k · H` on the target. The phases add
/// up to π, so the target always measures 1. With `split`, the target lives
/// on QPU_1; otherwise both qubits are on QPU_0.
fn phase_chain(network: &Network, k: usize, split: bool) -> Circuit {
    let (node, target) = if split { ("QPU_1", "q_1_0") } else { ("QPU_0", "q_0_1") };
    let mut c = network.circuit().unwrap();
    prepare_all(&mut c);
    c.push_operations([
        Operation::single("QPU_0", "q_0_0", Gate::X).unwrap(),
        Operation::single(node, target, Gate::H).unwrap(),
    ])
    .unwrap();
    let angle = PI / k as f64;
    for _ in 0..k {
        let op = if split {
            Operation::cross_node("QPU_0", node, "q_0_0", target, Gate::CP(angle))
        } else {
            Operation::two_qubit("QPU_0", "q_0_0", target, Gate::CP(angle))
        };
        c.push_operations([op.unwrap()]).unwrap();
    }
    c.push_operations([Operation::single(node, target, Gate::H).unwrap()])
        .unwrap();
    c.push_operations([Operation::measure(node, target, "B")])
        .unwrap();
    c
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_merged_chain_matches_local_chain() {
    let mut offset = None;
    for k in [2usize, 4, 8] {
        let network = network(17);

        let local = network.execute(&phase_chain(&network, k, false)).await.unwrap();
        assert!(local.is_success());
        assert_eq!(bit(&local, 0, "B"), Some(1), "local k={k}");

        let chain = phase_chain(&network, k, true);
        let compiled = network.controller().compile(&chain).unwrap();
        let pairs = compiled
            .operations()
            .filter(|op| op.kind() == OperationKind::SendEntanglement)
            .count();
        assert_eq!(pairs, 1, "k={k}");

        // Each merged gate costs one tick on top of a fixed block.
        let schedule = network.controller().schedule(&compiled).unwrap();
        let base = schedule.max_tick() - k as u64;
        assert_eq!(*offset.get_or_insert(base), base, "k={k}");

        for _ in 0..3 {
            let results = network.controller().run(&schedule).await.unwrap();
            assert!(results.is_success(), "{results:?}");
            assert_eq!(bit(&results, 1, "B"), Some(1), "distributed k={k}");
        }
        network.shutdown().await.unwrap();
    }
}

// ============================================================================
// Timing
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_node_timing_stretches_the_run() {
    let network = Network::builder(
        Arc::new(SimulatorBackend::with_seed(1)),
        Arc::new(InMemoryHub::new()),
    )
    .nodes(2, 2)
    .with_node_timing(
        "QPU_1",
        TimingTable::uniform(1).with_kind(OperationKind::Measure, 3),
    )
    .spawn()
    .unwrap();
    let circuit = cnot_scenario(&network);

    let compiled = network.controller().compile(&circuit).unwrap();
    let schedule = network.controller().schedule(&compiled).unwrap();
    // Two QPU_1 measurements in the rewritten block plus the final one.
    assert!(schedule.max_tick() > 13);

    let results = network.controller().run(&schedule).await.unwrap();
    assert!(results.is_success());
    assert_eq!(bit(&results, 1, "B"), Some(1));
    network.shutdown().await.unwrap();
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalid_record_halts_every_node() {
    let network = network(2);
    let circuit = cnot_scenario(&network);
    let compiled = network.controller().compile(&circuit).unwrap();
    let schedule = network.controller().schedule(&compiled).unwrap();

    let mut assignment = ScheduleAssignment::from_schedule(&schedule);
    assignment.slice_mut(&qpu(1)).push(ScheduledRecord {
        record: OperationRecord {
            kind: OperationKind::SingleGate,
            qubits: vec![],
            bits: vec![],
            gate: Some("x".to_string()),
            gate_param: None,
            nodes: vec![qpu(1)],
            pooled: false,
        },
        due_tick: 1,
    });

    let results = network
        .controller()
        .run_assignment(assignment, schedule.max_tick())
        .await
        .unwrap();

    assert!(!results.is_success());
    assert!(matches!(
        &results.stop,
        StopReason::Fault { node, tick: 1, .. } if *node == qpu(1)
    ));
    assert_eq!(results.reports.len(), 2);
    assert!(results.reports.values().all(|r| !r.is_result()));

    let faulty = results.report(&qpu(1)).unwrap().message().unwrap();
    assert!(faulty.contains("rejected"), "{faulty}");
    let halted = results.report(&qpu(0)).unwrap().message().unwrap();
    assert!(halted.contains("run halted"), "{halted}");

    // The network recovers for the next run.
    let results = network.execute(&circuit).await.unwrap();
    assert!(results.is_success());
    network.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_misaddressed_record_is_rejected() {
    let network = network(2);
    let circuit = cnot_scenario(&network);
    let compiled = network.controller().compile(&circuit).unwrap();
    let schedule = network.controller().schedule(&compiled).unwrap();

    let mut assignment = ScheduleAssignment::from_schedule(&schedule);
    assignment.slice_mut(&qpu(1)).push(ScheduledRecord {
        record: OperationRecord::from(&Operation::single("QPU_0", "q_0_1", Gate::H).unwrap()),
        due_tick: 0,
    });

    let results = network
        .controller()
        .run_assignment(assignment, schedule.max_tick())
        .await
        .unwrap();
    let message = results.report(&qpu(1)).unwrap().message().unwrap();
    assert!(message.contains("addressed to QPU_0"), "{message}");
    network.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_exhaustion_is_fatal() {
    let mut config = RuntimeConfig::default();
    config.node.pool_capacity = 1;
    let network = network_with(4, config);

    // Two independent cross-node gates in one layer need two pool slots.
    let mut c = network.circuit().unwrap();
    prepare_all(&mut c);
    c.push_operations([
        Operation::cross_node("QPU_0", "QPU_1", "q_0_0", "q_1_0", Gate::CX).unwrap(),
        Operation::cross_node("QPU_0", "QPU_1", "q_0_1", "q_1_1", Gate::CX).unwrap(),
    ])
    .unwrap();
    measure_pair(&mut c);

    let results = network.execute(&c).await.unwrap();
    assert!(!results.is_success());
    assert!(matches!(results.stop, StopReason::Fault { .. }));
    assert!(
        results
            .errors()
            .any(|(_, message)| message.contains("entanglement pool is full")),
        "{results:?}"
    );
    network.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_general_register_capacity_is_enforced() {
    let mut config = RuntimeConfig::default();
    config.node.qubit_capacity = 1;
    let network = network_with(4, config);

    let mut c = network.circuit().unwrap();
    prepare_all(&mut c);
    measure_pair(&mut c);

    let results = network.execute(&c).await.unwrap();
    assert!(matches!(results.stop, StopReason::Fault { tick: 0, .. }));
    assert!(results.errors().all(|(_, m)| !m.is_empty()));
    assert_eq!(results.errors().count(), 2);
    network.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_silent_node_times_out_acknowledgment() {
    let backend = Arc::new(SimulatorBackend::with_seed(0));
    let hub = InMemoryHub::new();
    let clock = Clock::new(std::time::Duration::from_secs(5));

    let controller_transport = hub.connect(&NodeId::from("controller")).unwrap();
    // Connected but never served.
    let _ghost = hub.connect(&NodeId::from("ghost")).unwrap();

    let worker = ComputingNode::new(
        "QPU_0",
        "controller",
        backend,
        hub.connect(&qpu(0)).unwrap(),
        NodeConfig::default(),
    );
    let task = tokio::spawn(worker.serve(clock.attach("QPU_0").unwrap()));

    let controller = Controller::new(
        controller_transport,
        clock.clone(),
        vec![qpu(0), NodeId::from("ghost")],
        TimingProfile::unit(),
        ControllerConfig {
            ack_timeout_ms: 100,
            result_timeout_ms: 2_000,
        },
    );

    let mut circuit =
        Circuit::with_qubit_map([(qpu(0), vec![QubitId::from("q")])]).unwrap();
    circuit
        .push_operations([Operation::prepare("QPU_0", vec!["q".into()]).unwrap()])
        .unwrap();
    circuit
        .push_operations([Operation::measure("QPU_0", "q", "m")])
        .unwrap();
    let schedule = controller.schedule(&circuit).unwrap();

    let err = controller.run(&schedule).await.unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::TransportTimeout { ref node, .. } if node.as_str() == "ghost"
    ));
    assert!(matches!(
        clock.state().phase,
        qdist_runtime::ClockPhase::Stopped(StopReason::Aborted)
    ));

    controller.shutdown_nodes().await.ok();
    task.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_record_of_failed_run_is_skipped() {
    let hub = InMemoryHub::new();
    let clock = Clock::new(std::time::Duration::from_secs(5));
    let controller_id = NodeId::from("controller");
    let controller = Controller::new(
        hub.connect(&controller_id).unwrap(),
        clock.clone(),
        vec![qpu(0)],
        TimingProfile::unit(),
        ControllerConfig::default(),
    );
    // QPU_0 is driven by hand.
    let endpoint = hub.connect(&qpu(0)).unwrap();
    let wait = std::time::Duration::from_secs(5);
    let report = |epoch: u64, value: u8| Message::Report {
        epoch,
        payload: NodeReport::Result {
            bits: BTreeMap::from([(BitId::from("m"), value)]),
        }
        .to_payload(&qpu(0))
        .unwrap(),
    };
    let empty = || ScheduleAssignment::from_records(BTreeMap::new());

    // The node leaves the clock after acknowledging, so start() finds nobody.
    let _link = clock.attach("QPU_0").unwrap();
    let node = async {
        let message = endpoint.receive(&controller_id, wait).await.unwrap();
        assert!(matches!(message, Some(Message::Schedule { .. })));
        clock.detach(&qpu(0)).unwrap();
        endpoint.send(&controller_id, Message::Ack).await.unwrap();
    };
    let (first, ()) = tokio::join!(controller.run_assignment(empty(), 1), node);
    assert!(matches!(first, Err(RuntimeError::Unconfigured(_))));
    let failed_epoch = clock.state().epoch;

    // Its record of the failed run only arrives after the next acknowledgment.
    let mut link = clock.attach("QPU_0").unwrap();
    let node = async {
        let message = endpoint.receive(&controller_id, wait).await.unwrap();
        assert!(matches!(message, Some(Message::Schedule { .. })));
        endpoint.send(&controller_id, Message::Ack).await.unwrap();
        endpoint
            .send(&controller_id, report(failed_epoch, 0))
            .await
            .unwrap();
        while let ClockSignal::Tick(t) = link.next_tick().await {
            link.complete(t);
        }
        assert!(link.epoch() > failed_epoch);
        endpoint
            .send(&controller_id, report(link.epoch(), 1))
            .await
            .unwrap();
    };
    let (second, ()) = tokio::join!(controller.run_assignment(empty(), 1), node);
    let results = second.unwrap();
    assert!(results.is_success(), "{results:?}");
    assert_eq!(bit(&results, 0, "m"), Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_schedule_is_rejected() {
    let network = network(0);
    let results = network
        .controller()
        .run_assignment(ScheduleAssignment::from_records(BTreeMap::new()), 0)
        .await;
    assert!(matches!(results, Err(RuntimeError::Unconfigured(_))));
    network.shutdown().await.unwrap();
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_network_from_yaml_config() {
    let yaml = "\
node:
  receive_attempts: 20
  retry_interval_ms: 10
timing:
  default_duration: 2
";
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    let config = RuntimeConfig::from_file(file.path()).unwrap();

    let network = network_with(9, config);
    let circuit = cnot_scenario(&network);
    let compiled = network.controller().compile(&circuit).unwrap();
    let schedule = network.controller().schedule(&compiled).unwrap();
    assert_eq!(schedule.max_tick(), 26);

    let results = network.controller().run(&schedule).await.unwrap();
    assert!(results.is_success());
    network.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_spawn() {
    let mut config = RuntimeConfig::default();
    config.clock.barrier_timeout_ms = 0;
    let err = Network::builder(
        Arc::new(SimulatorBackend::with_seed(0)),
        Arc::new(InMemoryHub::new()),
    )
    .nodes(1, 1)
    .with_config(config)
    .spawn()
    .unwrap_err();
    assert!(matches!(err, RuntimeError::Config(_)));
}
