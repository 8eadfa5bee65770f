//! Cross-node run analysis.
//!
//! A *run* is a chain of cross-node controlled gates in consecutive layers
//! that share one control qubit and one (control node, target node) pair.
//! All gates of a run can be served by a single entangled pair: the target
//! node holds a copy of the control in its half of the pair and applies
//! every gate of the chain against it.
//!
//! A run is keyed strictly by [`RunKey`]. A gate joins the open run with its
//! key from the previous layer only if its target qubit has not been touched
//! since the run started by anything other than the run itself; otherwise it
//! starts a new run. Runs never bridge a layer without a matching gate.

use rustc_hash::FxHashSet;
use tracing::debug;

use qdist_ir::{Circuit, Gate, NodeId, Operation, QubitId};

use crate::error::{CompileError, CompileResult};
use crate::pass::{Pass, PassKind};
use crate::property::PropertySet;

/// Grouping key of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey {
    /// Node holding the control qubit.
    pub control_node: NodeId,
    /// Node holding the target qubits.
    pub target_node: NodeId,
    /// The shared control qubit.
    pub control_qubit: QubitId,
}

impl RunKey {
    /// Key of a cross-node gate, or `None` for anything else.
    pub fn of(op: &Operation) -> Option<Self> {
        match op {
            Operation::TwoQubitGate {
                node,
                peer: Some(peer),
                control,
                ..
            } => Some(Self {
                control_node: node.clone(),
                target_node: peer.clone(),
                control_qubit: control.clone(),
            }),
            _ => None,
        }
    }
}

/// One gate of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunGate {
    /// Layer holding the gate.
    pub layer: usize,
    /// Position of the gate within its layer.
    pub index: usize,
    /// Target qubit on the target node.
    pub target: QubitId,
    /// The controlled gate.
    pub gate: Gate,
}

/// A chain of cross-node gates served by one entangled pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlRun {
    /// Grouping key.
    pub key: RunKey,
    /// Gates in original application order.
    pub gates: Vec<RunGate>,
}

impl ControlRun {
    /// Layer of the first gate; the rewritten block is emitted there.
    pub fn first_layer(&self) -> usize {
        self.gates.first().map_or(0, |g| g.layer)
    }

    /// Number of gates in the run.
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    /// Whether the run holds no gates.
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

/// Runs grouped by the layer their block is emitted at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTable {
    by_layer: Vec<Vec<ControlRun>>,
}

impl RunTable {
    /// Empty table for a circuit of `depth` layers.
    pub fn new(depth: usize) -> Self {
        Self {
            by_layer: vec![Vec::new(); depth],
        }
    }

    /// Add a run; it is placed at its first layer.
    pub fn push(&mut self, run: ControlRun) {
        let layer = run.first_layer();
        if self.by_layer.len() <= layer {
            self.by_layer.resize_with(layer + 1, Vec::new);
        }
        self.by_layer[layer].push(run);
    }

    /// Runs whose block is emitted at `layer`.
    pub fn runs_at(&self, layer: usize) -> &[ControlRun] {
        self.by_layer.get(layer).map_or(&[], Vec::as_slice)
    }

    /// All runs, in emission order.
    pub fn iter(&self) -> impl Iterator<Item = &ControlRun> {
        self.by_layer.iter().flatten()
    }

    /// Number of runs (one entangled pair each).
    pub fn num_runs(&self) -> usize {
        self.by_layer.iter().map(Vec::len).sum()
    }

    /// Number of cross-node gates covered.
    pub fn num_gates(&self) -> usize {
        self.iter().map(ControlRun::len).sum()
    }
}

/// A run that may still be extended by the next layer.
struct OpenRun {
    run: ControlRun,
    /// Qubits touched by other operations since the run started.
    touched: FxHashSet<QubitId>,
}

/// Analysis pass that groups cross-node gates into runs.
///
/// With merging disabled every cross-node gate forms its own run.
#[derive(Debug, Clone, Copy)]
pub struct CrossNodeRuns {
    merge: bool,
}

impl CrossNodeRuns {
    /// Analysis with run merging enabled.
    pub fn new() -> Self {
        Self { merge: true }
    }

    /// Analysis that never merges gates.
    pub fn unmerged() -> Self {
        Self { merge: false }
    }

    /// Group the cross-node gates of `circuit`.
    pub fn analyze(&self, circuit: &Circuit) -> CompileResult<RunTable> {
        let mut table = RunTable::new(circuit.depth());
        let mut open: Vec<OpenRun> = Vec::new();

        for (l, layer) in circuit.layers().iter().enumerate() {
            let mut extended: Vec<OpenRun> = Vec::new();

            for (index, op) in layer.iter().enumerate() {
                let Some(key) = RunKey::of(op) else {
                    continue;
                };
                let Operation::TwoQubitGate { target, gate, .. } = op else {
                    continue;
                };
                if !gate.is_controlled() {
                    return Err(CompileError::UnsupportedCrossNodeGate {
                        gate: gate.name().to_string(),
                        layer: l,
                    });
                }

                let gate_entry = RunGate {
                    layer: l,
                    index,
                    target: target.clone(),
                    gate: gate.clone(),
                };

                let joinable = if self.merge {
                    open.iter()
                        .position(|o| o.run.key == key && !o.touched.contains(target))
                } else {
                    None
                };

                match joinable {
                    Some(pos) => {
                        let mut run = open.swap_remove(pos);
                        run.run.gates.push(gate_entry);
                        extended.push(run);
                    }
                    None => extended.push(OpenRun {
                        run: ControlRun {
                            key,
                            gates: vec![gate_entry],
                        },
                        touched: FxHashSet::default(),
                    }),
                }
            }

            // Runs without a gate in this layer are complete.
            for closed in open.drain(..) {
                table.push(closed.run);
            }

            for run in &mut extended {
                let own = run.run.gates.last().map(|g| g.index);
                let started_here = run.run.first_layer() == l;
                for (index, op) in layer.iter().enumerate() {
                    if Some(index) == own {
                        continue;
                    }
                    // Local work of the first layer is emitted before the
                    // block, so it cannot be reordered against the run.
                    if started_here && !op.is_cross_node() {
                        continue;
                    }
                    run.touched.extend(op.qubits().into_iter().cloned());
                }
            }
            open = extended;
        }

        for remaining in open {
            table.push(remaining.run);
        }

        // Stable emission order: by position of the first gate in its layer.
        for runs in &mut table.by_layer {
            runs.sort_by_key(|r| r.gates.first().map_or(0, |g| g.index));
        }

        debug!(
            "Found {} cross-node runs covering {} gates",
            table.num_runs(),
            table.num_gates()
        );
        Ok(table)
    }
}

impl Default for CrossNodeRuns {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for CrossNodeRuns {
    fn name(&self) -> &'static str {
        "CrossNodeRuns"
    }

    fn kind(&self) -> PassKind {
        PassKind::Analysis
    }

    fn run(&self, circuit: &Circuit, properties: &mut PropertySet) -> CompileResult<Option<Circuit>> {
        properties.runs = Some(self.analyze(circuit)?);
        Ok(None)
    }
}
