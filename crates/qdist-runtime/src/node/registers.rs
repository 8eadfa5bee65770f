//! Qubit registers of a compute node.
//!
//! A node keeps two registers mapping qubit ids to backend handles: the
//! general register, bounded by the node's qubit capacity, and the
//! entanglement pool, a fixed number of slots reserved for pooled pair
//! halves. Non-pooled pair halves live in the general register but are
//! still tracked as pair halves, so their measurements stay out of results.

use rustc_hash::{FxHashMap, FxHashSet};

use qdist_hal::QubitHandle;
use qdist_ir::{NodeId, QubitId};

use crate::error::{RuntimeError, RuntimeResult};

/// Which register a qubit lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// General-purpose register.
    General,
    /// Entanglement pool.
    Pool,
}

/// General register plus entanglement pool.
#[derive(Debug)]
pub struct Registers {
    node: NodeId,
    general: FxHashMap<QubitId, QubitHandle>,
    pool: FxHashMap<QubitId, QubitHandle>,
    pair_halves: FxHashSet<QubitId>,
    qubit_capacity: usize,
    pool_capacity: usize,
}

impl Registers {
    /// Empty registers for `node`.
    pub fn new(node: NodeId, qubit_capacity: usize, pool_capacity: usize) -> Self {
        Self {
            node,
            general: FxHashMap::default(),
            pool: FxHashMap::default(),
            pair_halves: FxHashSet::default(),
            qubit_capacity,
            pool_capacity,
        }
    }

    /// Check that `qubits` are new and fit into the general register.
    pub fn check_prepare(&self, qubits: &[QubitId]) -> RuntimeResult<()> {
        if let Some(q) = qubits.iter().find(|q| self.contains(q)) {
            return Err(RuntimeError::OperandValidation {
                node: self.node.clone(),
                operation: format!("PREPARE_QUBITS [{q}]"),
                reason: format!("qubit {q} is already allocated"),
            });
        }
        let free = self.qubit_capacity.saturating_sub(self.general.len());
        if qubits.len() > free {
            return Err(RuntimeError::ResourceExhausted {
                node: self.node.clone(),
                reason: format!(
                    "{} qubits requested, {} of {} general slots free",
                    qubits.len(),
                    free,
                    self.qubit_capacity
                ),
            });
        }
        Ok(())
    }

    /// Check that a pair half named `pair` can be stored.
    pub fn check_pair_slot(&self, pair: &QubitId, pooled: bool) -> RuntimeResult<()> {
        if self.contains(pair) {
            return Err(RuntimeError::OperandValidation {
                node: self.node.clone(),
                operation: format!("pair {pair}"),
                reason: format!("qubit {pair} is already held"),
            });
        }
        let (used, capacity, name) = if pooled {
            (self.pool.len(), self.pool_capacity, "entanglement pool")
        } else {
            (self.general.len(), self.qubit_capacity, "general register")
        };
        if used >= capacity {
            return Err(RuntimeError::ResourceExhausted {
                node: self.node.clone(),
                reason: format!("{name} is full ({capacity} slots)"),
            });
        }
        Ok(())
    }

    /// Store a freshly allocated general qubit.
    pub fn insert(&mut self, qubit: QubitId, handle: QubitHandle) {
        self.general.insert(qubit, handle);
    }

    /// Store a pair half in the pool or the general register.
    pub fn insert_pair(&mut self, pair: QubitId, handle: QubitHandle, pooled: bool) {
        self.pair_halves.insert(pair.clone());
        if pooled {
            self.pool.insert(pair, handle);
        } else {
            self.general.insert(pair, handle);
        }
    }

    /// Whether `qubit` is held in either register.
    pub fn contains(&self, qubit: &QubitId) -> bool {
        self.general.contains_key(qubit) || self.pool.contains_key(qubit)
    }

    /// Whether `qubit` is the local half of an entangled pair.
    pub fn is_pair_half(&self, qubit: &QubitId) -> bool {
        self.pair_halves.contains(qubit)
    }

    /// Handle of `qubit`.
    pub fn handle(&self, qubit: &QubitId) -> Option<QubitHandle> {
        self.general
            .get(qubit)
            .or_else(|| self.pool.get(qubit))
            .copied()
    }

    /// Remove `qubit`, freeing its slot.
    pub fn release(&mut self, qubit: &QubitId) -> Option<(QubitHandle, Register)> {
        self.pair_halves.remove(qubit);
        if let Some(handle) = self.general.remove(qubit) {
            return Some((handle, Register::General));
        }
        self.pool.remove(qubit).map(|h| (h, Register::Pool))
    }

    /// Remove every qubit.
    pub fn drain(&mut self) -> Vec<QubitHandle> {
        self.pair_halves.clear();
        self.general
            .drain()
            .chain(self.pool.drain())
            .map(|(_, h)| h)
            .collect()
    }

    /// Qubits in the general register.
    pub fn general_len(&self) -> usize {
        self.general.len()
    }

    /// Occupied pool slots.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }
}
