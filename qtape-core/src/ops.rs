//! Standard operation set
//!
//! The minimal set of operation definitions the pipeline is exercised
//! with. Wire order inside matrices: first wire is the most significant
//! bit. Rotations follow U(θ) = exp(-iθP/2).

use crate::operation::{GradMethod, Generator, Operation, OperationDef, RecipeRule};
use crate::var::Var;
use crate::wire::Wire;
use crate::Result;
use num_complex::Complex64;
use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, FRAC_PI_4, PI};

const PAULI_ROTATION_GEN: Generator = Generator {
    eigenvalues: &[-0.5, 0.5],
    unitary: true,
};

const PROJECTOR_GEN: Generator = Generator {
    eigenvalues: &[0.0, 1.0],
    unitary: false,
};

const CONTROLLED_ROTATION_GEN: Generator = Generator {
    eigenvalues: &[0.0, 0.0, -0.5, 0.5],
    unitary: false,
};

const FOUR_TERM_C1: f64 = 0.426_776_695_296_636_9;
const FOUR_TERM_C2: f64 = 0.073_223_304_703_363_13;

/// Shift rule of controlled rotations, whose generator has three
/// distinct eigenvalues
const FOUR_TERM_RECIPE: [[f64; 3]; 4] = [
    [FOUR_TERM_C1, 1.0, FRAC_PI_2],
    [-FOUR_TERM_C1, 1.0, -FRAC_PI_2],
    [-FOUR_TERM_C2, 1.0, 3.0 * FRAC_PI_2],
    [FOUR_TERM_C2, 1.0, -3.0 * FRAC_PI_2],
];

#[inline]
fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

fn op(def: &'static OperationDef, params: Vec<Var>, wires: &[Wire]) -> Result<Operation> {
    Operation::new(def, params, wires)
}

fn fixed(def: &'static OperationDef, value: f64, wire: Wire) -> Result<Operation> {
    Operation::new(def, [Var::constant(value)], &[wire])
}

fn controlled(u: [Complex64; 4]) -> Vec<Complex64> {
    let z = c(0.0, 0.0);
    let o = c(1.0, 0.0);
    vec![
        o, z, z, z, //
        z, o, z, z, //
        z, z, u[0], u[1], //
        z, z, u[2], u[3],
    ]
}

fn rx_block(theta: f64) -> [Complex64; 4] {
    let (s, co) = (theta / 2.0).sin_cos();
    [c(co, 0.0), c(0.0, -s), c(0.0, -s), c(co, 0.0)]
}

fn ry_block(theta: f64) -> [Complex64; 4] {
    let (s, co) = (theta / 2.0).sin_cos();
    [c(co, 0.0), c(-s, 0.0), c(s, 0.0), c(co, 0.0)]
}

fn rz_block(theta: f64) -> [Complex64; 4] {
    let (s, co) = (theta / 2.0).sin_cos();
    [c(co, -s), c(0.0, 0.0), c(0.0, 0.0), c(co, s)]
}

// Matrices

fn identity_matrix(_: &[f64]) -> Vec<Complex64> {
    vec![c(1.0, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(1.0, 0.0)]
}

fn hadamard_matrix(_: &[f64]) -> Vec<Complex64> {
    let h = FRAC_1_SQRT_2;
    vec![c(h, 0.0), c(h, 0.0), c(h, 0.0), c(-h, 0.0)]
}

fn pauli_x_matrix(_: &[f64]) -> Vec<Complex64> {
    vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 0.0), c(0.0, 0.0)]
}

fn pauli_y_matrix(_: &[f64]) -> Vec<Complex64> {
    vec![c(0.0, 0.0), c(0.0, -1.0), c(0.0, 1.0), c(0.0, 0.0)]
}

fn pauli_z_matrix(_: &[f64]) -> Vec<Complex64> {
    vec![c(1.0, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(-1.0, 0.0)]
}

fn s_matrix(_: &[f64]) -> Vec<Complex64> {
    vec![c(1.0, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(0.0, 1.0)]
}

fn t_matrix(_: &[f64]) -> Vec<Complex64> {
    vec![
        c(1.0, 0.0),
        c(0.0, 0.0),
        c(0.0, 0.0),
        Complex64::from_polar(1.0, FRAC_PI_4),
    ]
}

fn sx_matrix(_: &[f64]) -> Vec<Complex64> {
    vec![c(0.5, 0.5), c(0.5, -0.5), c(0.5, -0.5), c(0.5, 0.5)]
}

fn rx_matrix(p: &[f64]) -> Vec<Complex64> {
    rx_block(p[0]).to_vec()
}

fn ry_matrix(p: &[f64]) -> Vec<Complex64> {
    ry_block(p[0]).to_vec()
}

fn rz_matrix(p: &[f64]) -> Vec<Complex64> {
    rz_block(p[0]).to_vec()
}

fn phase_shift_matrix(p: &[f64]) -> Vec<Complex64> {
    vec![
        c(1.0, 0.0),
        c(0.0, 0.0),
        c(0.0, 0.0),
        Complex64::from_polar(1.0, p[0]),
    ]
}

fn rot_matrix(p: &[f64]) -> Vec<Complex64> {
    let (phi, theta, omega) = (p[0], p[1], p[2]);
    let (s, co) = (theta / 2.0).sin_cos();
    vec![
        Complex64::from_polar(co, -(phi + omega) / 2.0),
        -Complex64::from_polar(s, (phi - omega) / 2.0),
        Complex64::from_polar(s, -(phi - omega) / 2.0),
        Complex64::from_polar(co, (phi + omega) / 2.0),
    ]
}

fn cnot_matrix(_: &[f64]) -> Vec<Complex64> {
    controlled([c(0.0, 0.0), c(1.0, 0.0), c(1.0, 0.0), c(0.0, 0.0)])
}

fn cz_matrix(_: &[f64]) -> Vec<Complex64> {
    controlled([c(1.0, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(-1.0, 0.0)])
}

fn swap_matrix(_: &[f64]) -> Vec<Complex64> {
    let z = c(0.0, 0.0);
    let o = c(1.0, 0.0);
    vec![
        o, z, z, z, //
        z, z, o, z, //
        z, o, z, z, //
        z, z, z, o,
    ]
}

fn crx_matrix(p: &[f64]) -> Vec<Complex64> {
    controlled(rx_block(p[0]))
}

fn cry_matrix(p: &[f64]) -> Vec<Complex64> {
    controlled(ry_block(p[0]))
}

fn crz_matrix(p: &[f64]) -> Vec<Complex64> {
    controlled(rz_block(p[0]))
}

// Decompositions (global phases dropped)

fn hadamard_decomposition(_: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![
        fixed(&RZ, FRAC_PI_2, w[0])?,
        fixed(&RX, FRAC_PI_2, w[0])?,
        fixed(&RZ, FRAC_PI_2, w[0])?,
    ])
}

fn pauli_x_decomposition(_: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![fixed(&RX, PI, w[0])?])
}

fn pauli_y_decomposition(_: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![fixed(&RY, PI, w[0])?])
}

fn pauli_z_decomposition(_: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![fixed(&PHASE_SHIFT, PI, w[0])?])
}

fn s_decomposition(_: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![fixed(&PHASE_SHIFT, FRAC_PI_2, w[0])?])
}

fn t_decomposition(_: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![fixed(&PHASE_SHIFT, FRAC_PI_4, w[0])?])
}

fn sx_decomposition(_: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![fixed(&RX, FRAC_PI_2, w[0])?])
}

fn rx_decomposition(p: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![
        op(&HADAMARD, vec![], &w[..1])?,
        op(&RZ, vec![p[0].clone()], &w[..1])?,
        op(&HADAMARD, vec![], &w[..1])?,
    ])
}

fn ry_decomposition(p: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![
        fixed(&RZ, -FRAC_PI_2, w[0])?,
        op(&RX, vec![p[0].clone()], &w[..1])?,
        fixed(&RZ, FRAC_PI_2, w[0])?,
    ])
}

fn phase_shift_decomposition(p: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![op(&RZ, vec![p[0].clone()], &w[..1])?])
}

fn rot_decomposition(p: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![
        op(&RZ, vec![p[0].clone()], &w[..1])?,
        op(&RY, vec![p[1].clone()], &w[..1])?,
        op(&RZ, vec![p[2].clone()], &w[..1])?,
    ])
}

fn cnot_decomposition(_: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![
        op(&HADAMARD, vec![], &w[1..2])?,
        op(&CZ, vec![], w)?,
        op(&HADAMARD, vec![], &w[1..2])?,
    ])
}

fn cz_decomposition(_: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![
        op(&HADAMARD, vec![], &w[1..2])?,
        op(&CNOT, vec![], w)?,
        op(&HADAMARD, vec![], &w[1..2])?,
    ])
}

fn swap_decomposition(_: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    Ok(vec![
        op(&CNOT, vec![], &[w[0], w[1]])?,
        op(&CNOT, vec![], &[w[1], w[0]])?,
        op(&CNOT, vec![], &[w[0], w[1]])?,
    ])
}

fn crx_decomposition(p: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    let half = &p[0] * 0.5;
    Ok(vec![
        fixed(&RZ, FRAC_PI_2, w[1])?,
        op(&RY, vec![half.clone()], &w[1..2])?,
        op(&CNOT, vec![], w)?,
        op(&RY, vec![-half], &w[1..2])?,
        op(&CNOT, vec![], w)?,
        fixed(&RZ, -FRAC_PI_2, w[1])?,
    ])
}

fn cry_decomposition(p: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    let half = &p[0] * 0.5;
    Ok(vec![
        op(&RY, vec![half.clone()], &w[1..2])?,
        op(&CNOT, vec![], w)?,
        op(&RY, vec![-half], &w[1..2])?,
        op(&CNOT, vec![], w)?,
    ])
}

fn crz_decomposition(p: &[Var], w: &[Wire]) -> Result<Vec<Operation>> {
    let half = &p[0] * 0.5;
    Ok(vec![
        op(&RZ, vec![half.clone()], &w[1..2])?,
        op(&CNOT, vec![], w)?,
        op(&RZ, vec![-half], &w[1..2])?,
        op(&CNOT, vec![], w)?,
    ])
}

/// Identity
pub static IDENTITY: OperationDef = OperationDef {
    name: "Identity",
    num_params: 0,
    num_wires: 1,
    generator: None,
    grad_method: GradMethod::None,
    recipe: None,
    decompositions: &[],
    matrix: Some(identity_matrix),
};

/// Hadamard
pub static HADAMARD: OperationDef = OperationDef {
    name: "Hadamard",
    num_params: 0,
    num_wires: 1,
    generator: None,
    grad_method: GradMethod::None,
    recipe: None,
    decompositions: &[hadamard_decomposition],
    matrix: Some(hadamard_matrix),
};

/// Pauli X
pub static PAULI_X: OperationDef = OperationDef {
    name: "PauliX",
    num_params: 0,
    num_wires: 1,
    generator: None,
    grad_method: GradMethod::None,
    recipe: None,
    decompositions: &[pauli_x_decomposition],
    matrix: Some(pauli_x_matrix),
};

/// Pauli Y
pub static PAULI_Y: OperationDef = OperationDef {
    name: "PauliY",
    num_params: 0,
    num_wires: 1,
    generator: None,
    grad_method: GradMethod::None,
    recipe: None,
    decompositions: &[pauli_y_decomposition],
    matrix: Some(pauli_y_matrix),
};

/// Pauli Z
pub static PAULI_Z: OperationDef = OperationDef {
    name: "PauliZ",
    num_params: 0,
    num_wires: 1,
    generator: None,
    grad_method: GradMethod::None,
    recipe: None,
    decompositions: &[pauli_z_decomposition],
    matrix: Some(pauli_z_matrix),
};

/// Phase gate S
pub static S: OperationDef = OperationDef {
    name: "S",
    num_params: 0,
    num_wires: 1,
    generator: None,
    grad_method: GradMethod::None,
    recipe: None,
    decompositions: &[s_decomposition],
    matrix: Some(s_matrix),
};

/// π/8 gate T
pub static T: OperationDef = OperationDef {
    name: "T",
    num_params: 0,
    num_wires: 1,
    generator: None,
    grad_method: GradMethod::None,
    recipe: None,
    decompositions: &[t_decomposition],
    matrix: Some(t_matrix),
};

/// Square root of X
pub static SX: OperationDef = OperationDef {
    name: "SX",
    num_params: 0,
    num_wires: 1,
    generator: None,
    grad_method: GradMethod::None,
    recipe: None,
    decompositions: &[sx_decomposition],
    matrix: Some(sx_matrix),
};

/// Rotation about X
pub static RX: OperationDef = OperationDef {
    name: "RX",
    num_params: 1,
    num_wires: 1,
    generator: Some(PAULI_ROTATION_GEN),
    grad_method: GradMethod::Analytic,
    recipe: None,
    decompositions: &[rx_decomposition],
    matrix: Some(rx_matrix),
};

/// Rotation about Y
pub static RY: OperationDef = OperationDef {
    name: "RY",
    num_params: 1,
    num_wires: 1,
    generator: Some(PAULI_ROTATION_GEN),
    grad_method: GradMethod::Analytic,
    recipe: None,
    decompositions: &[ry_decomposition],
    matrix: Some(ry_matrix),
};

/// Rotation about Z
pub static RZ: OperationDef = OperationDef {
    name: "RZ",
    num_params: 1,
    num_wires: 1,
    generator: Some(PAULI_ROTATION_GEN),
    grad_method: GradMethod::Analytic,
    recipe: None,
    decompositions: &[],
    matrix: Some(rz_matrix),
};

/// Phase shift diag(1, e^{iφ})
pub static PHASE_SHIFT: OperationDef = OperationDef {
    name: "PhaseShift",
    num_params: 1,
    num_wires: 1,
    generator: Some(PROJECTOR_GEN),
    grad_method: GradMethod::Analytic,
    recipe: None,
    decompositions: &[phase_shift_decomposition],
    matrix: Some(phase_shift_matrix),
};

/// Arbitrary rotation RZ(ω)·RY(θ)·RZ(φ)
pub static ROT: OperationDef = OperationDef {
    name: "Rot",
    num_params: 3,
    num_wires: 1,
    generator: None,
    grad_method: GradMethod::Analytic,
    recipe: None,
    decompositions: &[rot_decomposition],
    matrix: Some(rot_matrix),
};

/// Controlled NOT
pub static CNOT: OperationDef = OperationDef {
    name: "CNOT",
    num_params: 0,
    num_wires: 2,
    generator: None,
    grad_method: GradMethod::None,
    recipe: None,
    decompositions: &[cnot_decomposition],
    matrix: Some(cnot_matrix),
};

/// Controlled Z
pub static CZ: OperationDef = OperationDef {
    name: "CZ",
    num_params: 0,
    num_wires: 2,
    generator: None,
    grad_method: GradMethod::None,
    recipe: None,
    decompositions: &[cz_decomposition],
    matrix: Some(cz_matrix),
};

/// SWAP
pub static SWAP: OperationDef = OperationDef {
    name: "SWAP",
    num_params: 0,
    num_wires: 2,
    generator: None,
    grad_method: GradMethod::None,
    recipe: None,
    decompositions: &[swap_decomposition],
    matrix: Some(swap_matrix),
};

/// Controlled RX
pub static CRX: OperationDef = OperationDef {
    name: "CRX",
    num_params: 1,
    num_wires: 2,
    generator: Some(CONTROLLED_ROTATION_GEN),
    grad_method: GradMethod::Analytic,
    recipe: Some(RecipeRule::Fixed(&FOUR_TERM_RECIPE)),
    decompositions: &[crx_decomposition],
    matrix: Some(crx_matrix),
};

/// Controlled RY
pub static CRY: OperationDef = OperationDef {
    name: "CRY",
    num_params: 1,
    num_wires: 2,
    generator: Some(CONTROLLED_ROTATION_GEN),
    grad_method: GradMethod::Analytic,
    recipe: Some(RecipeRule::Fixed(&FOUR_TERM_RECIPE)),
    decompositions: &[cry_decomposition],
    matrix: Some(cry_matrix),
};

/// Controlled RZ
pub static CRZ: OperationDef = OperationDef {
    name: "CRZ",
    num_params: 1,
    num_wires: 2,
    generator: Some(CONTROLLED_ROTATION_GEN),
    grad_method: GradMethod::Analytic,
    recipe: Some(RecipeRule::Fixed(&FOUR_TERM_RECIPE)),
    decompositions: &[crz_decomposition],
    matrix: Some(crz_matrix),
};

/// Every definition in the standard set
pub static STANDARD: &[&OperationDef] = &[
    &IDENTITY,
    &HADAMARD,
    &PAULI_X,
    &PAULI_Y,
    &PAULI_Z,
    &S,
    &T,
    &SX,
    &RX,
    &RY,
    &RZ,
    &PHASE_SHIFT,
    &ROT,
    &CNOT,
    &CZ,
    &SWAP,
    &CRX,
    &CRY,
    &CRZ,
];

/// Look up a standard definition by name
pub fn by_name(name: &str) -> Option<&'static OperationDef> {
    STANDARD.iter().copied().find(|def| def.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::GradientRecipe;
    use approx::assert_relative_eq;

    fn matmul(a: &[Complex64], b: &[Complex64], n: usize) -> Vec<Complex64> {
        let mut out = vec![c(0.0, 0.0); n * n];
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    out[i * n + j] += a[i * n + k] * b[k * n + j];
                }
            }
        }
        out
    }

    /// Product of a single-wire decomposition, applied left to right
    fn sequence_matrix(ops: &[Operation]) -> Vec<Complex64> {
        let mut acc = identity_matrix(&[]);
        for o in ops {
            acc = matmul(&o.matrix().unwrap(), &acc, 2);
        }
        acc
    }

    fn assert_equal_up_to_phase(a: &[Complex64], b: &[Complex64]) {
        let idx = b.iter().position(|z| z.norm() > 1e-9).unwrap();
        let phase = a[idx] / b[idx];
        assert_relative_eq!(phase.norm(), 1.0, epsilon = 1e-9);
        for (x, y) in a.iter().zip(b) {
            assert!((x - phase * y).norm() < 1e-9, "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn test_rot_decomposition_matches_matrix() {
        let params = [0.1, -0.7, 0.2];
        let rot = Operation::on(&ROT, params, &[0]).unwrap();
        let seq = rot.decompose().unwrap().unwrap();
        assert_equal_up_to_phase(&sequence_matrix(&seq), &rot_matrix(&params));
    }

    #[test]
    fn test_single_wire_decompositions_up_to_phase() {
        for def in [&HADAMARD, &PAULI_X, &PAULI_Y, &PAULI_Z, &S, &T, &SX] {
            let o = Operation::on(def, Vec::<f64>::new(), &[0]).unwrap();
            let seq = o.decompose().unwrap().unwrap();
            assert_equal_up_to_phase(&sequence_matrix(&seq), &o.matrix().unwrap());
        }
        for def in [&RX, &RY, &PHASE_SHIFT] {
            let o = Operation::on(def, [0.37], &[0]).unwrap();
            let seq = o.decompose().unwrap().unwrap();
            assert_equal_up_to_phase(&sequence_matrix(&seq), &o.matrix().unwrap());
        }
    }

    #[test]
    fn test_decomposition_propagates_trainability() {
        let x = Var::seeded(0.4, 0, 1);
        let crz = Operation::on(&CRZ, [x], &[0, 1]).unwrap();
        let seq = crz.decompose().unwrap().unwrap();
        assert!(seq[0].is_trainable());
        assert_relative_eq!(seq[0].params()[0].partial(0), 0.5);
        assert_relative_eq!(seq[2].params()[0].partial(0), -0.5);
        assert!(!seq[1].is_trainable());
    }

    #[test]
    fn test_four_term_recipe_on_controlled_rotation_spectrum() {
        let recipe = GradientRecipe::from_triples(&FOUR_TERM_RECIPE);
        for theta in [0.1f64, 0.5, 1.0, 2.0] {
            // frequencies 1/2 and 1 both appear in controlled rotations
            let f = |x: f64| 0.3 * (x / 2.0).cos() + 0.7 * x.sin() - 0.2 * x.cos();
            let df = -0.15 * (theta / 2.0).sin() + 0.7 * theta.cos() + 0.2 * theta.sin();
            assert_relative_eq!(recipe.apply(theta, f), df, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_by_name() {
        assert_eq!(by_name("CRY").unwrap().num_params, 1);
        assert!(by_name("Toffoli").is_none());
    }
}
