//! Verification that a rewritten circuit runs on independent nodes.

use rustc_hash::{FxHashMap, FxHashSet};

use qdist_ir::{BitId, Circuit, NodeId, Operation, QubitId};

use crate::error::{CompileError, CompileResult};
use crate::pass::{Pass, PassKind};
use crate::property::PropertySet;

/// Analysis pass checking the output of the rewrite:
///
/// - no cross-node gate is left
/// - every qubit is owned by the node touching it
/// - every entanglement receive is paired with a send from its peer in the
///   same layer, and likewise for classical bits
/// - every conditioned gate refers to a bit its node holds at that point
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalityVerification;

impl LocalityVerification {
    /// Run all checks.
    pub fn verify(&self, circuit: &Circuit) -> CompileResult<()> {
        let fail = |msg: String| Err(CompileError::VerificationFailed(msg));

        if let Some((layer, _, op)) = circuit.cross_node_gates().first() {
            return fail(format!("cross-node gate left in layer {layer}: {op}"));
        }
        circuit.validate()?;

        // Bits known per node, in layer order.
        let mut held: FxHashSet<(&NodeId, &BitId)> = FxHashSet::default();

        for (l, layer) in circuit.layers().iter().enumerate() {
            let mut pairs: FxHashMap<&QubitId, (Option<(&NodeId, &NodeId)>, Option<(&NodeId, &NodeId)>)> =
                FxHashMap::default();
            let mut sent: FxHashSet<(&NodeId, &NodeId, &BitId)> = FxHashSet::default();
            let mut received = Vec::new();

            for op in layer {
                match op {
                    Operation::SendEntanglement { node, peer, pair, .. } => {
                        pairs.entry(pair).or_default().0 = Some((node, peer));
                    }
                    Operation::ReceiveEntanglement { node, peer, pair, .. } => {
                        pairs.entry(pair).or_default().1 = Some((peer, node));
                    }
                    Operation::SendClassicalBit { node, peer, bit } => {
                        if !held.contains(&(node, bit)) {
                            return fail(format!("{node} sends bit {bit} it never produced (layer {l})"));
                        }
                        sent.insert((node, peer, bit));
                    }
                    Operation::ReceiveClassicalBit { node, peer, bit } => {
                        received.push((peer, node, bit));
                    }
                    Operation::ClassicalControlledGate { node, condition, .. } => {
                        if !held.contains(&(node, condition)) {
                            return fail(format!(
                                "{node} conditions on bit {condition} it does not hold (layer {l})"
                            ));
                        }
                    }
                    _ => {}
                }
            }

            for (pair, sides) in &pairs {
                match sides {
                    (Some(send), Some(receive)) if send == receive => {}
                    _ => return fail(format!("unmatched entanglement for pair {pair} in layer {l}")),
                }
            }
            for (from, to, bit) in received {
                if !sent.contains(&(from, to, bit)) {
                    return fail(format!("{to} waits for bit {bit} that {from} never sends (layer {l})"));
                }
                held.insert((to, bit));
            }
            for op in layer {
                if let Operation::Measure { node, bit, .. } = op {
                    held.insert((node, bit));
                }
            }
        }
        Ok(())
    }
}

impl Pass for LocalityVerification {
    fn name(&self) -> &'static str {
        "LocalityVerification"
    }

    fn kind(&self) -> PassKind {
        PassKind::Analysis
    }

    fn run(&self, circuit: &Circuit, _properties: &mut PropertySet) -> CompileResult<Option<Circuit>> {
        self.verify(circuit)?;
        Ok(None)
    }
}
