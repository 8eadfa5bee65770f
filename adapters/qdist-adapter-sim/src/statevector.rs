//! Growable statevector.
//!
//! Qubits are added on demand and removed when measured, so the vector only
//! ever holds the qubits that are alive. Bit `k` of an amplitude index is
//! qubit position `k`.

use ndarray::{Array2, array};
use num_complex::Complex64;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

use qdist_ir::{Gate, UnitaryMatrix};

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

/// A statevector over a varying number of qubits.
#[derive(Debug, Clone)]
pub struct Statevector {
    amplitudes: Vec<Complex64>,
    num_qubits: usize,
}

impl Statevector {
    /// The empty register: one amplitude, no qubits.
    pub fn new() -> Self {
        Self {
            amplitudes: vec![ONE],
            num_qubits: 0,
        }
    }

    /// Get the number of qubits.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Amplitudes in index order.
    pub fn amplitudes(&self) -> &[Complex64] {
        &self.amplitudes
    }

    /// Append a qubit in |0⟩ at the highest position and return it.
    pub fn add_qubit(&mut self) -> usize {
        let size = self.amplitudes.len();
        self.amplitudes.resize(size * 2, ZERO);
        self.num_qubits += 1;
        self.num_qubits - 1
    }

    /// Probability of reading 1 on `qubit`.
    pub fn probability_one(&self, qubit: usize) -> f64 {
        let mask = 1 << qubit;
        self.amplitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| i & mask != 0)
            .map(|(_, a)| a.norm_sqr())
            .sum()
    }

    /// Project `qubit` onto `outcome`, renormalize, and drop the qubit.
    /// Positions above `qubit` shift down by one.
    pub fn collapse_and_remove(&mut self, qubit: usize, outcome: u8) {
        let mask = 1usize << qubit;
        let low = mask - 1;
        let keep = if outcome == 1 { mask } else { 0 };

        let half = self.amplitudes.len() / 2;
        let mut reduced = Vec::with_capacity(half);
        for j in 0..half {
            let i = ((j & !low) << 1) | keep | (j & low);
            reduced.push(self.amplitudes[i]);
        }
        let norm = reduced.iter().map(Complex64::norm_sqr).sum::<f64>().sqrt();
        if norm > 0.0 {
            for a in &mut reduced {
                *a /= norm;
            }
        }
        self.amplitudes = reduced;
        self.num_qubits -= 1;
    }

    /// Apply `matrix` to `targets` when every qubit in `controls` is 1.
    ///
    /// The first target is the most significant bit of the matrix index.
    pub fn apply_matrix(&mut self, matrix: &Array2<Complex64>, controls: &[usize], targets: &[usize]) {
        let k = targets.len();
        let dim = 1usize << k;
        let control_mask: usize = controls.iter().map(|&c| 1 << c).sum();
        let target_mask: usize = targets.iter().map(|&t| 1 << t).sum();

        // Offset of each sub-block row within the full index space.
        let offsets: Vec<usize> = (0..dim)
            .map(|r| {
                targets
                    .iter()
                    .enumerate()
                    .filter(|(pos, _)| r & (1 << (k - 1 - pos)) != 0)
                    .map(|(_, &t)| 1 << t)
                    .sum()
            })
            .collect();

        let mut block = vec![ZERO; dim];
        for base in 0..self.amplitudes.len() {
            if base & target_mask != 0 || base & control_mask != control_mask {
                continue;
            }
            for (r, off) in offsets.iter().enumerate() {
                block[r] = self.amplitudes[base | off];
            }
            for (r, off) in offsets.iter().enumerate() {
                let mut acc = ZERO;
                for (c, amp) in block.iter().enumerate() {
                    acc += matrix[[r, c]] * amp;
                }
                self.amplitudes[base | off] = acc;
            }
        }
    }

    /// Apply `gate` to qubit positions, in gate operand order.
    pub fn apply_gate(&mut self, gate: &Gate, qubits: &[usize]) {
        match gate {
            Gate::Swap => self.apply_matrix(&swap(), &[], qubits),
            Gate::CustomTwoQubit(u) => self.apply_matrix(&to_array(u), &[], qubits),
            Gate::CCX => self.apply_matrix(&single_qubit(&Gate::X), &qubits[..2], &qubits[2..]),
            Gate::CSwap => self.apply_matrix(&swap(), &qubits[..1], &qubits[1..]),
            _ => match gate.controlled_target() {
                Some(inner) => self.apply_matrix(&single_qubit(&inner), &qubits[..1], &qubits[1..]),
                None => self.apply_matrix(&single_qubit(gate), &[], qubits),
            },
        }
    }
}

impl Default for Statevector {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Gate matrices
// =========================================================================

fn to_array(u: &UnitaryMatrix) -> Array2<Complex64> {
    let dim = u.dim();
    Array2::from_shape_fn((dim, dim), |(r, c)| u.get(r, c))
}

fn phase(theta: f64) -> Array2<Complex64> {
    array![[ONE, ZERO], [ZERO, Complex64::from_polar(1.0, theta)]]
}

fn swap() -> Array2<Complex64> {
    let mut m = Array2::zeros((4, 4));
    m[[0, 0]] = ONE;
    m[[1, 2]] = ONE;
    m[[2, 1]] = ONE;
    m[[3, 3]] = ONE;
    m
}

/// Matrix of a single-qubit gate. Multi-qubit gates map to the identity.
pub fn single_qubit(gate: &Gate) -> Array2<Complex64> {
    let h = Complex64::new(FRAC_1_SQRT_2, 0.0);
    match gate {
        Gate::X => array![[ZERO, ONE], [ONE, ZERO]],
        Gate::Y => array![[ZERO, -I], [I, ZERO]],
        Gate::Z => phase(PI),
        Gate::H => array![[h, h], [h, -h]],
        Gate::S => phase(PI / 2.0),
        Gate::Sdg => phase(-PI / 2.0),
        Gate::T => phase(PI / 4.0),
        Gate::Tdg => phase(-PI / 4.0),
        Gate::K => array![[h, -I * h], [I * h, -h]],
        Gate::P(theta) => phase(*theta),
        Gate::Rx(theta) => {
            let c = Complex64::new((theta / 2.0).cos(), 0.0);
            let s = Complex64::new(0.0, -(theta / 2.0).sin());
            array![[c, s], [s, c]]
        }
        Gate::Ry(theta) => {
            let c = Complex64::new((theta / 2.0).cos(), 0.0);
            let s = Complex64::new((theta / 2.0).sin(), 0.0);
            array![[c, -s], [s, c]]
        }
        Gate::Rz(theta) => array![
            [Complex64::from_polar(1.0, -theta / 2.0), ZERO],
            [ZERO, Complex64::from_polar(1.0, theta / 2.0)]
        ],
        Gate::Custom(u) => to_array(u),
        _ => Array2::eye(2),
    }
}
