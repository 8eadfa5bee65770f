//! Gate definitions.
//!
//! Gates are identified by a stable lowercase name. The name doubles as the
//! key into per-node timing tables and as the gate identifier in scheduled
//! operation records, so it must never change for an existing gate.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};

/// Tolerance used when checking that a user supplied matrix is unitary.
const UNITARITY_TOLERANCE: f64 = 1e-9;

/// A square unitary matrix with 2 or 4 rows.
///
/// Serialized as a list of rows, each entry a `[re, im]` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Complex64>>", into = "Vec<Vec<Complex64>>")]
pub struct UnitaryMatrix {
    dim: usize,
    entries: Vec<Complex64>,
}

impl UnitaryMatrix {
    /// Build a matrix from rows, checking shape and unitarity.
    pub fn new(rows: Vec<Vec<Complex64>>) -> IrResult<Self> {
        let dim = rows.len();
        if dim != 2 && dim != 4 {
            return Err(IrError::InvalidMatrix(format!(
                "expected 2 or 4 rows, got {dim}"
            )));
        }
        if let Some(row) = rows.iter().find(|row| row.len() != dim) {
            return Err(IrError::InvalidMatrix(format!(
                "row of length {} in a {dim}x{dim} matrix",
                row.len()
            )));
        }

        let matrix = Self {
            dim,
            entries: rows.into_iter().flatten().collect(),
        };
        if !matrix.is_unitary() {
            return Err(IrError::InvalidMatrix("matrix is not unitary".into()));
        }
        Ok(matrix)
    }

    /// Build a matrix from real-valued rows.
    pub fn from_real(rows: &[&[f64]]) -> IrResult<Self> {
        Self::new(
            rows.iter()
                .map(|row| row.iter().map(|&re| Complex64::new(re, 0.0)).collect())
                .collect(),
        )
    }

    /// Number of rows (and columns).
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of qubits the matrix acts on.
    pub fn num_qubits(&self) -> u32 {
        if self.dim == 2 { 1 } else { 2 }
    }

    /// Entry at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Complex64 {
        self.entries[row * self.dim + col]
    }

    /// Row-major entries.
    pub fn entries(&self) -> &[Complex64] {
        &self.entries
    }

    /// The matrix as a list of rows.
    pub fn rows(&self) -> Vec<Vec<Complex64>> {
        self.entries.chunks(self.dim).map(<[_]>::to_vec).collect()
    }

    fn is_unitary(&self) -> bool {
        // U^dagger U == I, column by column.
        for i in 0..self.dim {
            for j in 0..self.dim {
                let mut sum = Complex64::new(0.0, 0.0);
                for k in 0..self.dim {
                    sum += self.get(k, i).conj() * self.get(k, j);
                }
                let expected = if i == j { 1.0 } else { 0.0 };
                if (sum.re - expected).abs() > UNITARITY_TOLERANCE
                    || sum.im.abs() > UNITARITY_TOLERANCE
                {
                    return false;
                }
            }
        }
        true
    }
}

impl TryFrom<Vec<Vec<Complex64>>> for UnitaryMatrix {
    type Error = IrError;

    fn try_from(rows: Vec<Vec<Complex64>>) -> IrResult<Self> {
        Self::new(rows)
    }
}

impl From<UnitaryMatrix> for Vec<Vec<Complex64>> {
    fn from(matrix: UnitaryMatrix) -> Self {
        matrix.rows()
    }
}

/// The parameter attached to a gate, as carried in operation records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GateParam {
    /// A rotation or phase angle in radians.
    Angle(f64),
    /// A unitary matrix.
    Matrix(UnitaryMatrix),
}

/// A quantum gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    /// Identity.
    I,
    /// Pauli-X.
    X,
    /// Pauli-Y.
    Y,
    /// Pauli-Z.
    Z,
    /// Hadamard.
    H,
    /// Phase gate S = sqrt(Z).
    S,
    /// S-dagger.
    Sdg,
    /// T = sqrt(S).
    T,
    /// T-dagger.
    Tdg,
    /// K = (1/sqrt 2) [[1, -i], [i, -1]], maps the Y basis onto the Z basis.
    K,
    /// Rotation around X.
    Rx(f64),
    /// Rotation around Y.
    Ry(f64),
    /// Rotation around Z.
    Rz(f64),
    /// Phase gate diag(1, e^{i theta}).
    P(f64),
    /// Arbitrary single-qubit unitary.
    Custom(UnitaryMatrix),

    /// Controlled-X (CNOT).
    CX,
    /// Controlled-Z (CPHASE).
    CZ,
    /// Controlled-Hadamard.
    CH,
    /// Controlled phase.
    CP(f64),
    /// Controlled Z-rotation.
    CRz(f64),
    /// SWAP.
    Swap,
    /// Arbitrary two-qubit unitary.
    CustomTwoQubit(UnitaryMatrix),
    /// Controlled arbitrary single-qubit unitary.
    CustomControlled(UnitaryMatrix),

    /// Toffoli.
    CCX,
    /// Fredkin.
    CSwap,
}

impl Gate {
    /// Names of every single-qubit gate.
    pub const SINGLE_QUBIT_NAMES: &'static [&'static str] = &[
        "i", "x", "y", "z", "h", "s", "sdg", "t", "tdg", "k", "rx", "ry", "rz", "p", "custom",
    ];

    /// Names of every two-qubit gate.
    pub const TWO_QUBIT_NAMES: &'static [&'static str] = &[
        "cx",
        "cz",
        "ch",
        "cp",
        "crz",
        "swap",
        "custom_two_qubit",
        "custom_controlled",
    ];

    /// Names of every three-qubit gate.
    pub const THREE_QUBIT_NAMES: &'static [&'static str] = &["ccx", "cswap"];

    /// Stable name of this gate.
    pub fn name(&self) -> &'static str {
        match self {
            Gate::I => "i",
            Gate::X => "x",
            Gate::Y => "y",
            Gate::Z => "z",
            Gate::H => "h",
            Gate::S => "s",
            Gate::Sdg => "sdg",
            Gate::T => "t",
            Gate::Tdg => "tdg",
            Gate::K => "k",
            Gate::Rx(_) => "rx",
            Gate::Ry(_) => "ry",
            Gate::Rz(_) => "rz",
            Gate::P(_) => "p",
            Gate::Custom(_) => "custom",
            Gate::CX => "cx",
            Gate::CZ => "cz",
            Gate::CH => "ch",
            Gate::CP(_) => "cp",
            Gate::CRz(_) => "crz",
            Gate::Swap => "swap",
            Gate::CustomTwoQubit(_) => "custom_two_qubit",
            Gate::CustomControlled(_) => "custom_controlled",
            Gate::CCX => "ccx",
            Gate::CSwap => "cswap",
        }
    }

    /// Number of qubits the gate acts on.
    pub fn num_qubits(&self) -> u32 {
        match self {
            Gate::I
            | Gate::X
            | Gate::Y
            | Gate::Z
            | Gate::H
            | Gate::S
            | Gate::Sdg
            | Gate::T
            | Gate::Tdg
            | Gate::K
            | Gate::Rx(_)
            | Gate::Ry(_)
            | Gate::Rz(_)
            | Gate::P(_)
            | Gate::Custom(_) => 1,
            Gate::CX
            | Gate::CZ
            | Gate::CH
            | Gate::CP(_)
            | Gate::CRz(_)
            | Gate::Swap
            | Gate::CustomTwoQubit(_)
            | Gate::CustomControlled(_) => 2,
            Gate::CCX | Gate::CSwap => 3,
        }
    }

    /// The parameter carried by this gate, if any.
    pub fn param(&self) -> Option<GateParam> {
        match self {
            Gate::Rx(theta) | Gate::Ry(theta) | Gate::Rz(theta) | Gate::P(theta) => {
                Some(GateParam::Angle(*theta))
            }
            Gate::CP(theta) | Gate::CRz(theta) => Some(GateParam::Angle(*theta)),
            Gate::Custom(m) | Gate::CustomTwoQubit(m) | Gate::CustomControlled(m) => {
                Some(GateParam::Matrix(m.clone()))
            }
            _ => None,
        }
    }

    /// For a two-qubit gate of the form |0><0| (x) I + |1><1| (x) U, the
    /// single-qubit gate U applied to the target.
    ///
    /// Only gates with this shape can be executed across two nodes through a
    /// shared entangled pair.
    pub fn controlled_target(&self) -> Option<Gate> {
        match self {
            Gate::CX => Some(Gate::X),
            Gate::CZ => Some(Gate::Z),
            Gate::CH => Some(Gate::H),
            Gate::CP(theta) => Some(Gate::P(*theta)),
            Gate::CRz(theta) => Some(Gate::Rz(*theta)),
            Gate::CustomControlled(m) => Some(Gate::Custom(m.clone())),
            _ => None,
        }
    }

    /// Whether the gate is a controlled single-qubit unitary.
    pub fn is_controlled(&self) -> bool {
        self.controlled_target().is_some()
    }

    /// Rebuild a gate from its name and optional parameter.
    pub fn from_parts(name: &str, param: Option<GateParam>) -> IrResult<Self> {
        let angle = |param: Option<GateParam>| match param {
            Some(GateParam::Angle(theta)) => Ok(theta),
            _ => Err(IrError::InvalidGateParam {
                gate: name.to_string(),
                reason: "expected an angle".into(),
            }),
        };
        let matrix = |param: Option<GateParam>, qubits: u32| match param {
            Some(GateParam::Matrix(m)) if m.num_qubits() == qubits => Ok(m),
            _ => Err(IrError::InvalidGateParam {
                gate: name.to_string(),
                reason: format!("expected a {qubits}-qubit unitary matrix"),
            }),
        };

        let gate = match name {
            "i" => Gate::I,
            "x" => Gate::X,
            "y" => Gate::Y,
            "z" => Gate::Z,
            "h" => Gate::H,
            "s" => Gate::S,
            "sdg" => Gate::Sdg,
            "t" => Gate::T,
            "tdg" => Gate::Tdg,
            "k" => Gate::K,
            "rx" => Gate::Rx(angle(param)?),
            "ry" => Gate::Ry(angle(param)?),
            "rz" => Gate::Rz(angle(param)?),
            "p" => Gate::P(angle(param)?),
            "custom" => Gate::Custom(matrix(param, 1)?),
            "cx" => Gate::CX,
            "cz" => Gate::CZ,
            "ch" => Gate::CH,
            "cp" => Gate::CP(angle(param)?),
            "crz" => Gate::CRz(angle(param)?),
            "swap" => Gate::Swap,
            "custom_two_qubit" => Gate::CustomTwoQubit(matrix(param, 2)?),
            "custom_controlled" => Gate::CustomControlled(matrix(param, 1)?),
            "ccx" => Gate::CCX,
            "cswap" => Gate::CSwap,
            other => return Err(IrError::UnknownGate(other.to_string())),
        };
        Ok(gate)
    }
}
