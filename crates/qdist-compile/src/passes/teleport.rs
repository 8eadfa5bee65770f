//! Teleportation rewrite of cross-node gate runs.
//!
//! Each run found by [`CrossNodeRuns`](super::CrossNodeRuns) is replaced by
//! one block built around a single entangled pair `e` shared by the control
//! node `C` and the target node `T`. The pair is created in the layer that
//! held the run's first gate; the block follows as new layers:
//!
//! | Step | Node | Operation |
//! |------|------|-----------|
//! | 1 | C | `CX(control, e)` |
//! | 2 | C | measure `e` → `b1` |
//! | 3 | C → T | send / receive `b1` |
//! | 4 | T | `X(e)` if `b1` |
//! | 5.. | T | each run gate, `G(e, target)` |
//! | +1 | T | `H(e)` |
//! | +2 | T | measure `e` → `b2` |
//! | +3 | T → C | send / receive `b2` |
//! | +4 | C | `Z(control)` if `b2` |
//!
//! After step 4 the target node's half of the pair is a copy of the control
//! in the computational basis, so the run gates act exactly as they would
//! with the remote control. They are applied in the order the original
//! circuit applied them; the final H, measurement and conditional Z
//! disentangle the copy.
//!
//! Blocks of runs emitted at the same layer are stacked step by step, so the
//! rewritten section spans `BLOCK_FIXED_STEPS + longest run` layers.

use tracing::debug;
use uuid::Uuid;

use qdist_ir::{BitId, Circuit, Gate, Layer, Operation, QubitId};

use crate::error::{CompileError, CompileResult};
use crate::pass::{Pass, PassKind};
use crate::passes::runs::{ControlRun, RunKey, RunTable};
use crate::property::PropertySet;

/// Layers of a teleportation block that do not depend on the run length.
pub const BLOCK_FIXED_STEPS: usize = 8;

/// Counters describing what the rewrite produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Entangled pairs introduced (one per run).
    pub pairs: usize,
    /// Cross-node gates replaced.
    pub gates: usize,
    /// Layers in the rewritten circuit.
    pub depth: usize,
}

/// Fresh ids for the pair and the two classical bits of one block.
struct BlockIds {
    pair: QubitId,
    b1: BitId,
    b2: BitId,
}

impl BlockIds {
    fn fresh() -> Self {
        Self {
            pair: QubitId::new(format!("epr-{}", Uuid::new_v4().simple())),
            b1: BitId::new(format!("tb-{}", Uuid::new_v4().simple())),
            b2: BitId::new(format!("tb-{}", Uuid::new_v4().simple())),
        }
    }
}

/// Transformation pass replacing every cross-node gate with a teleportation
/// block. Requires the run table in the `PropertySet`.
#[derive(Debug, Clone, Copy)]
pub struct TeleportationRewrite {
    /// Mark pair halves as drawn from the pre-allocated pool.
    pub pooled: bool,
}

impl TeleportationRewrite {
    /// Rewrite drawing pair halves from the entanglement pool.
    pub fn new() -> Self {
        Self { pooled: true }
    }

    /// Rewrite `circuit` according to `runs`.
    pub fn rewrite(&self, circuit: &Circuit, runs: &RunTable) -> CompileResult<(Circuit, RewriteStats)> {
        check_runs(circuit, runs)?;

        let mut out = Circuit::with_qubit_map(
            circuit
                .qubit_map()
                .iter()
                .map(|(node, qubits)| (node.clone(), qubits.clone())),
        )?;
        let mut stats = RewriteStats::default();

        for (l, layer) in circuit.layers().iter().enumerate() {
            let mut kept = Layer::new();
            for op in layer.iter().filter(|op| !op.is_cross_node()) {
                kept.push(op.clone())?;
            }

            let block_runs = runs.runs_at(l);
            let mut block_layers = Vec::new();
            if !block_runs.is_empty() {
                let longest = block_runs.iter().map(ControlRun::len).max().unwrap_or(0);
                block_layers = vec![Layer::new(); BLOCK_FIXED_STEPS + longest];

                for run in block_runs {
                    let ids = BlockIds::fresh();
                    let key = &run.key;
                    kept.push(Operation::send_entanglement(
                        key.control_node.clone(),
                        key.target_node.clone(),
                        ids.pair.clone(),
                        self.pooled,
                    )?)?;
                    kept.push(Operation::receive_entanglement(
                        key.target_node.clone(),
                        key.control_node.clone(),
                        ids.pair.clone(),
                        self.pooled,
                    )?)?;

                    for (step, ops) in block_steps(run, &ids)?.into_iter().enumerate() {
                        for op in ops {
                            block_layers[step].push(op)?;
                        }
                    }
                    stats.pairs += 1;
                    stats.gates += run.len();
                }
            }

            if !kept.is_empty() {
                out.push_layer(kept);
            }
            for block_layer in block_layers {
                out.push_layer(block_layer);
            }
        }

        stats.depth = out.depth();
        debug!(
            "Teleportation rewrite: {} pairs for {} gates, depth {} -> {}",
            stats.pairs,
            stats.gates,
            circuit.depth(),
            stats.depth
        );
        Ok((out, stats))
    }
}

impl Default for TeleportationRewrite {
    fn default() -> Self {
        Self::new()
    }
}

/// Operations of one block, one entry per step.
fn block_steps(run: &ControlRun, ids: &BlockIds) -> CompileResult<Vec<Vec<Operation>>> {
    let RunKey {
        control_node: c,
        target_node: t,
        control_qubit,
    } = &run.key;
    let pair = &ids.pair;

    let mut steps = vec![
        vec![Operation::two_qubit(c.clone(), control_qubit.clone(), pair.clone(), Gate::CX)?],
        vec![Operation::measure(c.clone(), pair.clone(), ids.b1.clone())],
        vec![
            Operation::send_bit(c.clone(), t.clone(), ids.b1.clone())?,
            Operation::receive_bit(t.clone(), c.clone(), ids.b1.clone())?,
        ],
        vec![Operation::classically_controlled(
            t.clone(),
            pair.clone(),
            ids.b1.clone(),
            Gate::X,
        )?],
    ];
    for gate in &run.gates {
        steps.push(vec![Operation::two_qubit(
            t.clone(),
            pair.clone(),
            gate.target.clone(),
            gate.gate.clone(),
        )?]);
    }
    steps.push(vec![Operation::single(t.clone(), pair.clone(), Gate::H)?]);
    steps.push(vec![Operation::measure(t.clone(), pair.clone(), ids.b2.clone())]);
    steps.push(vec![
        Operation::send_bit(t.clone(), c.clone(), ids.b2.clone())?,
        Operation::receive_bit(c.clone(), t.clone(), ids.b2.clone())?,
    ]);
    steps.push(vec![Operation::classically_controlled(
        c.clone(),
        control_qubit.clone(),
        ids.b2.clone(),
        Gate::Z,
    )?]);
    Ok(steps)
}

/// Check that `runs` covers every cross-node gate of `circuit` exactly once
/// and that each run is well formed.
fn check_runs(circuit: &Circuit, runs: &RunTable) -> CompileResult<()> {
    let layers = circuit.layers();
    let mut covered = 0;

    for run in runs.iter() {
        let first = run.first_layer();
        let malformed = |reason: String| CompileError::MalformedRun {
            layer: first,
            reason,
        };
        if run.is_empty() {
            return Err(malformed("run has no gates".into()));
        }

        for (offset, gate) in run.gates.iter().enumerate() {
            if gate.layer != first + offset {
                return Err(malformed(format!(
                    "gate {offset} sits in layer {} instead of {}",
                    gate.layer,
                    first + offset
                )));
            }
            let op = layers
                .get(gate.layer)
                .and_then(|layer| layer.operations().get(gate.index))
                .ok_or_else(|| malformed(format!("no operation at {}:{}", gate.layer, gate.index)))?;
            match (RunKey::of(op), op) {
                (Some(key), Operation::TwoQubitGate { target, gate: g, .. })
                    if key == run.key && *target == gate.target && *g == gate.gate => {}
                (Some(key), _) if key != run.key => {
                    return Err(malformed(format!(
                        "gate at {}:{} runs {} -> {} on control {}, expected {} -> {} on control {}",
                        gate.layer,
                        gate.index,
                        key.control_node,
                        key.target_node,
                        key.control_qubit,
                        run.key.control_node,
                        run.key.target_node,
                        run.key.control_qubit
                    )));
                }
                _ => {
                    return Err(malformed(format!(
                        "operation at {}:{} does not match the recorded gate",
                        gate.layer, gate.index
                    )));
                }
            }
            covered += 1;
        }
    }

    let expected = circuit.cross_node_gates().len();
    if covered != expected {
        return Err(CompileError::MalformedRun {
            layer: 0,
            reason: format!("runs cover {covered} of {expected} cross-node gates"),
        });
    }
    Ok(())
}

impl Pass for TeleportationRewrite {
    fn name(&self) -> &'static str {
        "TeleportationRewrite"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, circuit: &Circuit, properties: &mut PropertySet) -> CompileResult<Option<Circuit>> {
        let runs = properties
            .runs
            .as_ref()
            .ok_or_else(|| CompileError::MissingProperty("cross-node run table".into()))?;
        let (rewritten, stats) = self.rewrite(circuit, runs)?;
        properties.insert(stats);
        Ok(Some(rewritten))
    }
}
