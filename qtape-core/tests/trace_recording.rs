//! Recording, transform composition and expansion on plain traces

use approx::assert_relative_eq;
use qtape_core::expand::{expand, in_set};
use qtape_core::{
    ops, trace_function, ArgValue, Argument, Fingerprint, FnTransform, Measurement, ParamKind,
    PauliWord, QuantumError, QuantumTransform, Recorder, Result, Shots, Signature, Tensor, Trace,
    TracedArg, TraceTransform, TransformArgs, TransformProgram, TransformResult,
};
use std::sync::Arc;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn circuit(q: &mut Recorder, args: &[TracedArg]) -> Result<()> {
    let x = &args[0];
    q.apply(&ops::RX, [&x[0] * 2.0], &[0])?;
    q.apply(&ops::RY, [x[1].sin()], &[1])?;
    q.apply(&ops::CNOT, Vec::<f64>::new(), &[0, 1])?;
    q.apply(&ops::RZ, [0.3], &[1])?;
    q.expval(PauliWord::z(1))
}

/// ⟨Z⟩ after RX(θ) on one wire is cos θ
fn run(traces: &[Trace]) -> Vec<Tensor> {
    traces
        .iter()
        .map(|t| Tensor::scalar(t.parameters()[0].cos()))
        .collect()
}

fn rx_trace(theta: f64) -> Trace {
    Trace::new(
        1,
        vec![qtape_core::Operation::on(&ops::RX, [qtape_core::Var::trainable(theta)], &[0]).unwrap()],
        vec![Measurement::expval(PauliWord::z(0))],
    )
    .unwrap()
}

fn shift(h: f64) -> impl Fn(&Trace) -> Result<TransformResult> + Send + Sync {
    move |t: &Trace| {
        let p = t.parameters()[0];
        Ok(TransformResult::new(
            vec![t.with_parameter(0, p + h)?, t.with_parameter(0, p - h)?],
            move |r| Tensor::linear_combination(&[0.5 / h, -0.5 / h], &r),
        ))
    }
}

#[test]
fn test_recording_tracks_preprocessing() {
    init();
    let trace = trace_function(&circuit, &[Argument::vector(vec![0.4, 0.9])], 2, Shots::Analytic)
        .unwrap();

    assert_eq!(trace.operations().len(), 4);
    assert_eq!(trace.trainable_params(), vec![0, 1]);

    let rx = trace.param(0).unwrap();
    assert_relative_eq!(rx.value(), 0.8);
    assert!(rx.is_affine());
    assert_relative_eq!(rx.partial(0), 2.0);
    assert_relative_eq!(rx.partial(1), 0.0);

    let ry = trace.param(1).unwrap();
    assert!(!ry.is_affine());
    assert_relative_eq!(ry.partial(1), 0.9_f64.cos(), epsilon = 1e-12);

    assert!(trace.param(2).unwrap().is_constant());
}

#[test]
fn test_constant_arguments_record_no_trainable_parameters() {
    init();
    let trace = trace_function(
        &circuit,
        &[Argument::vector(vec![0.4, 0.9]).constant()],
        2,
        Shots::Analytic,
    )
    .unwrap();
    assert!(trace.trainable_params().is_empty());
    assert_eq!(trace.layout().differentiable_args(), Vec::<usize>::new());
}

#[test]
fn test_nested_composition_equals_program() {
    init();
    let trace = rx_trace(0.7);

    // first difference of a first difference
    let nested = TransformResult::identity(trace.clone())
        .then(shift(0.1))
        .unwrap()
        .then(shift(0.1))
        .unwrap();
    assert_eq!(nested.len(), 4);

    let program = TransformProgram::new()
        .with(Arc::new(FnTransform::new("shift", shift(0.1))))
        .with(Arc::new(FnTransform::new("shift", shift(0.1))));
    assert_eq!(program.stage_names(), vec!["shift", "shift"]);
    let staged = program.apply(&trace).unwrap();

    let a = nested.combine(run(nested.traces())).unwrap();
    let b = staged.combine(run(staged.traces())).unwrap();
    assert_relative_eq!(a.item().unwrap(), b.item().unwrap(), epsilon = 1e-12);
    // central second difference of cos at 0.7 with step 0.2
    let expected = ((0.9_f64).cos() - 2.0 * 0.7_f64.cos() + 0.5_f64.cos()) / 0.04;
    assert_relative_eq!(a.item().unwrap(), expected, epsilon = 1e-9);
}

#[test]
fn test_combine_rejects_wrong_result_count() {
    init();
    let r = TransformResult::identity(rx_trace(0.1)).then(shift(0.2)).unwrap();
    assert!(matches!(
        r.combine(vec![Tensor::scalar(1.0)]),
        Err(QuantumError::ShapeMismatch(_))
    ));
}

#[test]
fn test_registered_transform_validates_arguments() {
    init();
    let sig = Signature::new().param("step", ParamKind::Float);
    let t = QuantumTransform::builder("finite_step")
        .expand(sig.clone(), |trace, _| Ok(trace.clone()))
        .transform(sig, |trace, args| {
            let h = args.float("step").unwrap_or(0.1);
            shift(h)(trace)
        })
        .build()
        .unwrap();
    assert!(t.has_expand());

    let ok = TransformArgs::new().with("step", ArgValue::Float(0.05));
    let bound = t.bind(ok).unwrap();
    let r = bound.apply(&rx_trace(0.3)).unwrap();
    let d = r.combine(run(r.traces())).unwrap().item().unwrap();
    assert_relative_eq!(d, -0.3_f64.sin(), epsilon = 1e-3);

    let wrong_kind = TransformArgs::new().with("step", ArgValue::Int(1));
    assert!(t.bind(wrong_kind).is_err());
    assert!(t.bind(TransformArgs::new()).is_err());

    let mismatched = QuantumTransform::builder("broken")
        .expand(Signature::new(), |trace, _| Ok(trace.clone()))
        .transform(Signature::new().param("step", ParamKind::Float), |trace, _| {
            Ok(TransformResult::identity(trace.clone()))
        })
        .build();
    assert!(matches!(mismatched, Err(QuantumError::SignatureMismatch { .. })));
}

#[test]
fn test_expansion_stops_at_requested_set() {
    init();
    let trace = Trace::new(
        1,
        vec![qtape_core::Operation::on(&ops::ROT, [0.1, 0.2, 0.3], &[0]).unwrap()],
        vec![Measurement::expval(PauliWord::z(0))],
    )
    .unwrap();

    let expanded = expand(&trace, 5, &in_set(["RZ", "RY"])).unwrap();
    let names: Vec<_> = expanded.operations().iter().map(|o| o.name()).collect();
    assert_eq!(names, vec!["RZ", "RY", "RZ"]);
    assert_eq!(expanded.parameters(), vec![0.1, 0.2, 0.3]);

    let untouched = expand(&trace, 0, &in_set(["RZ"])).unwrap();
    assert_eq!(untouched.operations().len(), 1);
}

#[test]
fn test_fingerprint_separates_shots_and_values() {
    init();
    let a = rx_trace(0.4);
    assert_eq!(Fingerprint::compute(&a), Fingerprint::compute(&rx_trace(0.4)));
    assert_ne!(Fingerprint::compute(&a), Fingerprint::compute(&rx_trace(0.5)));
    assert_ne!(
        Fingerprint::compute(&a),
        Fingerprint::with_shots(&a, &Shots::finite(100).unwrap())
    );
}
