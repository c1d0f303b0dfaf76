//! Derivative transforms executed on the reference backend agree with
//! closed forms and with finite-difference estimates.

use approx::assert_relative_eq;
use qtape_backend::{execute_batch, hamiltonian_expand, QuantumBackend, StateVectorBackend, StateVectorConfig};
use qtape_core::{
    ops, Complex64, GradMethod, GradientRecipe, Hamiltonian, Measurement, Operation, OperationDef,
    PauliWord, RecipeRule, Shots, Tensor, Trace, TransformResult, Var,
};
use qtape_grad::{
    finite_diff, param_shift, DifferentiationEngine, FiniteDiffConfig, FiniteDiffMethod,
    GradientMethod, ParamShiftConfig,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn run(backend: &StateVectorBackend, r: &TransformResult) -> Tensor {
    let results = execute_batch(backend, r.traces(), None).unwrap();
    r.combine(results).unwrap()
}

fn value(backend: &StateVectorBackend, trace: &Trace) -> Tensor {
    execute_batch(backend, std::slice::from_ref(trace), None)
        .unwrap()
        .remove(0)
}

fn two_parameter(a: f64, b: f64, measurements: Vec<Measurement>) -> Trace {
    Trace::new(
        2,
        vec![
            Operation::on(&ops::HADAMARD, Vec::<f64>::new(), &[1]).unwrap(),
            Operation::on(&ops::RX, [Var::trainable(a)], &[0]).unwrap(),
            Operation::on(&ops::CRY, [Var::trainable(b)], &[0, 1]).unwrap(),
            Operation::on(&ops::CNOT, Vec::<f64>::new(), &[1, 0]).unwrap(),
        ],
        measurements,
    )
    .unwrap()
}

/// Central second difference of a scalar trace output in parameters i and j
fn second_difference(backend: &StateVectorBackend, trace: &Trace, i: usize, j: usize, h: f64) -> f64 {
    let p = trace.parameters();
    let at = |di: f64, dj: f64| {
        let mut q = p.clone();
        q[i] += di;
        q[j] += dj;
        value(backend, &trace.with_parameters(&q).unwrap()).item().unwrap()
    };
    (at(h, h) - at(h, -h) - at(-h, h) + at(-h, -h)) / (4.0 * h * h)
}

#[test]
fn test_rotation_gradient_matches_closed_form() {
    init();
    let backend = StateVectorBackend::new(1);
    let engine = DifferentiationEngine::param_shift();
    for theta in [0.1, 0.5, 1.0, 2.0] {
        let trace = Trace::new(
            1,
            vec![Operation::on(&ops::RX, [Var::trainable(theta)], &[0]).unwrap()],
            vec![Measurement::expval(PauliWord::z(0))],
        )
        .unwrap();
        let before = backend.num_batches();
        let g = run(&backend, &engine.jacobian(&trace).unwrap());
        // all shifted traces go out as one job
        assert_eq!(backend.num_batches(), before + 1);
        assert_eq!(g.shape(), &[1]);
        assert_relative_eq!(g.data()[0], -theta.sin(), epsilon = 1e-10);
    }
}

#[test]
fn test_four_term_rule_matches_finite_differences() {
    init();
    let backend = StateVectorBackend::new(2);
    let trace = two_parameter(0.3, 1.1, vec![Measurement::expval(PauliWord::x(1))]);
    let analytic = run(&backend, &param_shift(&trace, &ParamShiftConfig::default()).unwrap());
    let numeric = run(
        &backend,
        &finite_diff(
            &trace,
            &FiniteDiffConfig {
                method: FiniteDiffMethod::Central,
                h: 1e-6,
                argnum: None,
            },
        )
        .unwrap(),
    );
    assert_eq!(analytic.shape(), &[2]);
    assert!(analytic.allclose(&numeric, 1e-6, 1e-7));
}

#[test]
fn test_second_order_matches_finite_differences() {
    init();
    let backend = StateVectorBackend::new(2);
    let trace = two_parameter(0.7, -0.4, vec![Measurement::expval(PauliWord::parse("ZX", &[0, 1]).unwrap())]);
    let hessian = run(&backend, &DifferentiationEngine::param_shift().hessian(&trace).unwrap());
    assert_eq!(hessian.shape(), &[2, 2]);

    // the trainable parameters are flat indices 0 and 1
    for i in 0..2 {
        for j in 0..2 {
            let estimate = second_difference(&backend, &trace, i, j, 1e-3);
            assert_relative_eq!(hessian.data()[i * 2 + j], estimate, epsilon = 1e-5);
        }
    }
}

#[test]
fn test_probability_jacobian_shape() {
    init();
    let backend = StateVectorBackend::new(2);
    let trace = two_parameter(0.2, 0.9, vec![Measurement::probs(&[0, 1])]);
    let jac = run(&backend, &DifferentiationEngine::param_shift().jacobian(&trace).unwrap());
    assert_eq!(jac.shape(), &[4, 2]);
    // probabilities sum to one, so each column sums to zero
    for col in 0..2 {
        let sum: f64 = (0..4).map(|row| jac.data()[row * 2 + col]).sum();
        assert_relative_eq!(sum, 0.0, epsilon = 1e-10);
    }
}

#[test]
fn test_variance_gradient_matches_finite_differences() {
    init();
    let backend = StateVectorBackend::new(2);
    let trace = two_parameter(
        0.5,
        0.8,
        vec![Measurement::var(PauliWord::z(0)), Measurement::expval(PauliWord::y(1))],
    );
    let analytic = run(&backend, &param_shift(&trace, &ParamShiftConfig::default()).unwrap());
    let numeric = run(
        &backend,
        &finite_diff(&trace, &FiniteDiffConfig { h: 1e-6, ..Default::default() }).unwrap(),
    );
    assert_eq!(analytic.shape(), &[2, 2]);
    assert!(analytic.allclose(&numeric, 1e-5, 1e-7));
}

#[test]
fn test_gradient_composes_after_hamiltonian_splitting() {
    init();
    let backend = StateVectorBackend::new(2);
    let h = Hamiltonian::new(
        vec![0.4, -1.2, 0.7],
        vec![PauliWord::z(0), PauliWord::parse("XX", &[0, 1]).unwrap(), PauliWord::y(1)],
    )
    .unwrap();
    let trace = two_parameter(0.6, 1.3, vec![Measurement::expval(h), Measurement::probs(&[1])]);
    let engine = DifferentiationEngine::param_shift();

    let direct = run(&backend, &engine.jacobian(&trace).unwrap());
    let split = hamiltonian_expand(&trace, true)
        .unwrap()
        .then(|t| engine.jacobian(t))
        .unwrap();
    assert!(split.len() > direct.len());
    let through_split = run(&backend, &split);
    assert_eq!(through_split.shape(), &[3, 2]);
    assert!(through_split.allclose(&direct, 1e-10, 1e-10));
}

#[test]
fn test_gradient_then_device_decomposition() {
    init();
    let restricted = StateVectorBackend::with_config(StateVectorConfig {
        num_wires: 2,
        native_ops: Some(["RX", "RZ", "CNOT"].iter().map(|s| s.to_string()).collect()),
        ..Default::default()
    });
    let full = StateVectorBackend::new(2);
    let trace = two_parameter(0.3, -0.8, vec![Measurement::expval(PauliWord::z(1))]);
    let engine = DifferentiationEngine::param_shift();

    let r = engine
        .jacobian(&trace)
        .unwrap()
        .then(|t| restricted.decomposition_transform(t))
        .unwrap();
    let expected = run(&full, &engine.jacobian(&trace).unwrap());
    assert!(run(&restricted, &r).allclose(&expected, 1e-10, 1e-10));
}

#[test]
fn test_rot_is_expanded_before_shifting() {
    init();
    let backend = StateVectorBackend::new(1);
    let (a, b, c) = (0.2, 0.9, -0.5);
    let trace = Trace::new(
        1,
        vec![Operation::on(
            &ops::ROT,
            [Var::trainable(a), Var::trainable(b), Var::trainable(c)],
            &[0],
        )
        .unwrap()],
        vec![Measurement::expval(PauliWord::z(0))],
    )
    .unwrap();
    let g = run(&backend, &DifferentiationEngine::param_shift().jacobian(&trace).unwrap());
    // ⟨Z⟩ after Rot(a, b, c) is cos b
    assert_eq!(g.shape(), &[3]);
    assert_relative_eq!(g.data()[0], 0.0, epsilon = 1e-10);
    assert_relative_eq!(g.data()[1], -b.sin(), epsilon = 1e-10);
    assert_relative_eq!(g.data()[2], 0.0, epsilon = 1e-10);
}

#[test]
fn test_partitioned_shots_keep_leading_dimension() {
    init();
    let backend = StateVectorBackend::with_config(StateVectorConfig {
        num_wires: 2,
        seed: Some(11),
        ..Default::default()
    });
    let shots = Shots::from_pairs(&[(20_000, 2)]).unwrap();
    let trace = two_parameter(0.4, 0.4, vec![Measurement::expval(PauliWord::z(0))]).with_shots(shots);
    let g = run(&backend, &DifferentiationEngine::param_shift().jacobian(&trace).unwrap());
    assert_eq!(g.shape(), &[2, 2]);

    let exact = run(
        &StateVectorBackend::new(2),
        &DifferentiationEngine::param_shift()
            .jacobian(&trace.with_shots(Shots::Analytic))
            .unwrap(),
    );
    for batch in 0..2 {
        for p in 0..2 {
            assert_relative_eq!(g.data()[batch * 2 + p], exact.data()[p], epsilon = 0.05);
        }
    }
}

#[test]
fn test_finite_difference_engine_first_order() {
    init();
    let backend = StateVectorBackend::new(2);
    let trace = two_parameter(1.0, 0.5, vec![Measurement::expval(PauliWord::x(1))]);
    let engine = DifferentiationEngine::new(GradientMethod::FiniteDiff(FiniteDiffConfig {
        h: 1e-6,
        ..Default::default()
    }));
    let numeric = run(&backend, &engine.jacobian(&trace).unwrap());
    let analytic = run(&backend, &DifferentiationEngine::param_shift().jacobian(&trace).unwrap());
    assert!(numeric.allclose(&analytic, 1e-6, 1e-7));
}

/// Shift used by [`VARIABLE_SHIFT_RY`] at bound value θ
fn variable_shift(theta: f64) -> f64 {
    0.4 + 0.2 * theta * theta
}

/// f(θ) = a·cos θ + b·sin θ + c has f'(θ) = [f(θ+s) − f(θ−s)] / (2 sin s) for any s
fn variable_shift_recipe(values: &[f64], _index: usize) -> GradientRecipe {
    let s = variable_shift(values[0]);
    let c = 0.5 / s.sin();
    GradientRecipe::from_triples(&[[c, 1.0, s], [-c, 1.0, -s]])
}

fn ry(p: &[f64]) -> Vec<Complex64> {
    let (s, c) = (p[0] / 2.0).sin_cos();
    vec![
        Complex64::new(c, 0.0),
        Complex64::new(-s, 0.0),
        Complex64::new(s, 0.0),
        Complex64::new(c, 0.0),
    ]
}

/// RY whose shift rule depends on the bound angle
static VARIABLE_SHIFT_RY: OperationDef = OperationDef {
    name: "VariableShiftRY",
    num_params: 1,
    num_wires: 1,
    generator: None,
    grad_method: GradMethod::Analytic,
    recipe: Some(RecipeRule::StateDependent(variable_shift_recipe)),
    decompositions: &[],
    matrix: Some(ry),
};

#[test]
fn test_state_dependent_recipe_follows_shifted_values() {
    init();
    let backend = StateVectorBackend::with_config(StateVectorConfig {
        num_wires: 1,
        native_ops: Some(vec!["VariableShiftRY".to_string()]),
        ..Default::default()
    });
    let engine = DifferentiationEngine::param_shift().with_max_order(2);

    for theta in [0.3, 1.2] {
        let trace = Trace::new(
            1,
            vec![Operation::on(&VARIABLE_SHIFT_RY, [Var::trainable(theta)], &[0]).unwrap()],
            vec![Measurement::expval(PauliWord::z(0))],
        )
        .unwrap();

        // ⟨Z⟩ = cos θ
        let first = engine.jacobian(&trace).unwrap();
        let s1 = variable_shift(theta);
        let values: Vec<f64> = first.traces().iter().map(|t| t.parameters()[0]).collect();
        assert_eq!(values.len(), 2);
        assert_relative_eq!(values[0], theta + s1, epsilon = 1e-12);
        assert_relative_eq!(values[1], theta - s1, epsilon = 1e-12);

        let g = run(&backend, &first);
        assert_relative_eq!(g.data()[0], -theta.sin(), epsilon = 1e-10);
        let numeric = run(
            &backend,
            &finite_diff(
                &trace,
                &FiniteDiffConfig {
                    method: FiniteDiffMethod::Central,
                    h: 1e-6,
                    argnum: None,
                },
            )
            .unwrap(),
        );
        assert!(g.allclose(&numeric, 1e-6, 1e-7));

        // the inner rule is re-evaluated at θ ± s(θ), not reused from θ
        let second = engine.hessian(&trace).unwrap();
        let values: Vec<f64> = second.traces().iter().map(|t| t.parameters()[0]).collect();
        assert_eq!(values.len(), 4);
        let up = theta + s1;
        assert!(values
            .iter()
            .any(|v| (v - (up + variable_shift(up))).abs() < 1e-12));
        assert!(values.iter().all(|v| (v - (theta + 2.0 * s1)).abs() > 1e-6));

        let h = run(&backend, &second);
        assert_eq!(h.shape(), &[1, 1]);
        assert_relative_eq!(h.data()[0], -theta.cos(), epsilon = 1e-9);
        assert_relative_eq!(
            h.data()[0],
            second_difference(&backend, &trace, 0, 0, 1e-3),
            epsilon = 1e-5
        );
    }
}
