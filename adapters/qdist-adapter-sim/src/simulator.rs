//! Shared statevector backend for every node of a network.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, instrument};

use qdist_hal::{HalError, HalResult, QuantumBackend, QubitHandle};
use qdist_ir::{Gate, NodeId, QubitId};

use crate::statevector::Statevector;

/// The half of a pair waiting for its receiver.
struct ParkedHalf {
    peer: NodeId,
    handle: QubitHandle,
}

struct SimState {
    vector: Statevector,
    /// Handle held at each statevector position.
    positions: Vec<QubitHandle>,
    parked: FxHashMap<QubitId, ParkedHalf>,
    next_handle: u64,
    rng: StdRng,
}

impl SimState {
    fn position(&self, handle: QubitHandle) -> HalResult<usize> {
        self.positions
            .iter()
            .position(|&h| h == handle)
            .ok_or(HalError::UnknownQubit(handle))
    }

    fn fresh(&mut self) -> QubitHandle {
        self.vector.add_qubit();
        let handle = QubitHandle(self.next_handle);
        self.next_handle += 1;
        self.positions.push(handle);
        handle
    }
}

/// Statevector backend holding the qubits of all attached nodes.
///
/// Memory grows as `2^n` in the number of live qubits; allocation fails
/// once `max_qubits` are alive.
pub struct SimulatorBackend {
    name: String,
    max_qubits: usize,
    state: Mutex<SimState>,
}

impl SimulatorBackend {
    /// Create a new simulator backend with default settings.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create a simulator with a fixed measurement seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            name: "statevector".into(),
            max_qubits: 20,
            state: Mutex::new(SimState {
                vector: Statevector::new(),
                positions: Vec::new(),
                parked: FxHashMap::default(),
                next_handle: 0,
                rng,
            }),
        }
    }

    /// Set the live-qubit limit.
    #[must_use]
    pub fn with_max_qubits(mut self, max_qubits: usize) -> Self {
        self.max_qubits = max_qubits;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_room(&self, state: &SimState, extra: usize) -> HalResult<()> {
        if state.positions.len() + extra > self.max_qubits {
            return Err(HalError::CapacityExceeded(format!(
                "{} live qubits, limit {}",
                state.positions.len() + extra,
                self.max_qubits
            )));
        }
        Ok(())
    }

    /// Probability of reading 1 on `qubit`, for inspection in tests.
    pub fn probability_one(&self, qubit: QubitHandle) -> HalResult<f64> {
        let state = self.lock();
        let pos = state.position(qubit)?;
        Ok(state.vector.probability_one(pos))
    }
}

impl Default for SimulatorBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuantumBackend for SimulatorBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn allocate(&self, node: &NodeId) -> HalResult<QubitHandle> {
        let mut state = self.lock();
        self.ensure_room(&state, 1)?;
        let handle = state.fresh();
        debug!("Allocated {} for {}", handle, node);
        Ok(handle)
    }

    async fn apply(&self, gate: &Gate, qubits: &[QubitHandle]) -> HalResult<()> {
        if qubits.len() != gate.num_qubits() as usize {
            return Err(HalError::GateRejected {
                gate: gate.name().to_string(),
                reason: format!("expected {} qubits, got {}", gate.num_qubits(), qubits.len()),
            });
        }
        let mut state = self.lock();
        let positions = qubits
            .iter()
            .map(|&q| state.position(q))
            .collect::<HalResult<Vec<_>>>()?;
        if (1..positions.len()).any(|i| positions[..i].contains(&positions[i])) {
            return Err(HalError::GateRejected {
                gate: gate.name().to_string(),
                reason: "repeated qubit operand".into(),
            });
        }
        state.vector.apply_gate(gate, &positions);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn measure(&self, qubit: QubitHandle) -> HalResult<u8> {
        let mut state = self.lock();
        let pos = state.position(qubit)?;
        let p1 = state.vector.probability_one(pos);
        let outcome = u8::from(state.rng.r#gen::<f64>() < p1);
        state.vector.collapse_and_remove(pos, outcome);
        state.positions.remove(pos);
        debug!("Measured {} -> {} (p1 = {:.4})", qubit, outcome, p1);
        Ok(outcome)
    }

    async fn create_pair(
        &self,
        pair: &QubitId,
        holder: &NodeId,
        peer: &NodeId,
    ) -> HalResult<QubitHandle> {
        let mut state = self.lock();
        if state.parked.contains_key(pair) {
            return Err(HalError::DuplicatePair(pair.clone()));
        }
        self.ensure_room(&state, 2)?;

        let local = state.fresh();
        let remote = state.fresh();
        let positions = [state.position(local)?, state.position(remote)?];
        state.vector.apply_gate(&Gate::H, &positions[..1]);
        state.vector.apply_gate(&Gate::CX, &positions);

        state.parked.insert(
            pair.clone(),
            ParkedHalf {
                peer: peer.clone(),
                handle: remote,
            },
        );
        debug!("Pair {} created by {} for {}", pair, holder, peer);
        Ok(local)
    }

    async fn claim_pair(&self, pair: &QubitId, claimant: &NodeId) -> HalResult<Option<QubitHandle>> {
        let mut state = self.lock();
        let Some(half) = state.parked.get(pair) else {
            return Ok(None);
        };
        if half.peer != *claimant {
            return Err(HalError::PairMismatch {
                pair: pair.clone(),
                claimant: claimant.clone(),
            });
        }
        Ok(state.parked.remove(pair).map(|half| half.handle))
    }

    fn live_qubits(&self) -> usize {
        self.lock().positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocate_and_measure() {
        let sim = SimulatorBackend::with_seed(7);
        let node = NodeId::from("A");
        let q = sim.allocate(&node).await.unwrap();
        sim.apply(&Gate::X, &[q]).await.unwrap();
        assert_eq!(sim.measure(q).await.unwrap(), 1);
        assert_eq!(sim.live_qubits(), 0);
        assert!(matches!(sim.measure(q).await, Err(HalError::UnknownQubit(_))));
    }

    #[tokio::test]
    async fn test_pair_halves_agree() {
        let sim = SimulatorBackend::with_seed(11);
        let (a, b) = (NodeId::from("A"), NodeId::from("B"));
        for i in 0..20 {
            let pair = QubitId::new(format!("e{i}"));
            assert!(sim.claim_pair(&pair, &b).await.unwrap().is_none());
            let local = sim.create_pair(&pair, &a, &b).await.unwrap();
            let remote = sim.claim_pair(&pair, &b).await.unwrap().unwrap();
            let m1 = sim.measure(local).await.unwrap();
            let m2 = sim.measure(remote).await.unwrap();
            assert_eq!(m1, m2);
        }
        assert_eq!(sim.live_qubits(), 0);
    }

    #[tokio::test]
    async fn test_pair_is_addressed() {
        let sim = SimulatorBackend::with_seed(1);
        let pair = QubitId::from("e");
        sim.create_pair(&pair, &NodeId::from("A"), &NodeId::from("B"))
            .await
            .unwrap();
        assert!(matches!(
            sim.claim_pair(&pair, &NodeId::from("C")).await,
            Err(HalError::PairMismatch { .. })
        ));
        assert!(matches!(
            sim.create_pair(&pair, &NodeId::from("A"), &NodeId::from("B")).await,
            Err(HalError::DuplicatePair(_))
        ));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let sim = SimulatorBackend::with_seed(1).with_max_qubits(2);
        let node = NodeId::from("A");
        sim.allocate(&node).await.unwrap();
        assert!(matches!(
            sim.create_pair(&QubitId::from("e"), &node, &NodeId::from("B")).await,
            Err(HalError::CapacityExceeded(_))
        ));
        sim.allocate(&node).await.unwrap();
        assert!(sim.allocate(&node).await.is_err());
    }

    #[tokio::test]
    async fn test_gate_arity_checked() {
        let sim = SimulatorBackend::with_seed(1);
        let q = sim.allocate(&NodeId::from("A")).await.unwrap();
        assert!(matches!(
            sim.apply(&Gate::CX, &[q]).await,
            Err(HalError::GateRejected { .. })
        ));
        assert!(sim.apply(&Gate::CX, &[q, q]).await.is_err());
    }
}
