//! Classical preprocessing derivatives
//!
//! Every trainable gate parameter of a trace was computed from the call
//! arguments by ordinary arithmetic, and its [`Var`] carries the first and
//! second derivatives of that computation. Reading them out gives the
//! classical Jacobian (rows: trainable gate parameters, columns: argument
//! entries) and Hessian, which the chain rule needs to turn derivatives
//! with respect to gate parameters into derivatives with respect to the
//! call arguments.
//!
//! [`Var`]: qtape_core::Var

use qtape_core::{QuantumError, Result, Tensor, Trace, Var};
use std::ops::Range;

fn argument_slots(trace: &Trace, argnum: usize) -> Result<(Vec<usize>, Range<usize>)> {
    let layout = trace.layout();
    let slot = layout.arg(argnum).ok_or_else(|| {
        QuantumError::InvalidArgument(format!(
            "argument {} out of range for {} arguments",
            argnum,
            layout.num_args()
        ))
    })?;
    let range = layout.slots(argnum).ok_or_else(|| {
        QuantumError::InvalidArgument(format!("argument {} is not differentiable", argnum))
    })?;
    Ok((slot.shape.clone(), range))
}

fn trainable_vars(trace: &Trace) -> Vec<&Var> {
    trace.params().filter(|p| p.is_trainable()).collect()
}

/// Trainable parameters, failing if a nonlinear one lacks second derivatives
fn curved_vars(trace: &Trace) -> Result<Vec<&Var>> {
    let vars = trainable_vars(trace);
    if vars.iter().any(|v| !v.is_affine() && !v.has_second_order()) {
        return Err(QuantumError::InvalidArgument(
            "trace was recorded without second derivatives of its preprocessing".to_string(),
        ));
    }
    Ok(vars)
}

/// Jacobian of the trainable gate parameters with respect to argument `argnum`
///
/// Shape `[num_trainable] + argument shape`.
///
/// # Errors
/// Returns `InvalidArgument` if the argument does not exist or was not
/// traced as differentiable.
pub fn classical_jacobian(trace: &Trace, argnum: usize) -> Result<Tensor> {
    let (arg_shape, range) = argument_slots(trace, argnum)?;
    let vars = trainable_vars(trace);
    let mut data = Vec::with_capacity(vars.len() * range.len());
    for var in &vars {
        data.extend(range.clone().map(|i| var.partial(i)));
    }
    let mut shape = vec![vars.len()];
    shape.extend(arg_shape);
    Tensor::new(shape, data)
}

/// Jacobian with respect to every differentiable argument entry
///
/// Shape `[num_trainable, num_inputs]`, inputs in layout order.
pub fn classical_jacobian_all(trace: &Trace) -> Result<Tensor> {
    let inputs = trace.layout().num_inputs();
    let vars = trainable_vars(trace);
    let data = vars
        .iter()
        .flat_map(|var| (0..inputs).map(move |i| var.partial(i)))
        .collect();
    Tensor::new(vec![vars.len(), inputs], data)
}

/// Hessian of the trainable gate parameters with respect to argument `argnum`
///
/// Shape `[num_trainable] + argument shape + argument shape`.
///
/// # Errors
/// Returns `InvalidArgument` as [`classical_jacobian`] does, and when a
/// nonlinear parameter was traced without second derivatives.
pub fn classical_hessian(trace: &Trace, argnum: usize) -> Result<Tensor> {
    let (arg_shape, range) = argument_slots(trace, argnum)?;
    let vars = curved_vars(trace)?;
    let mut data = Vec::with_capacity(vars.len() * range.len() * range.len());
    for var in &vars {
        for i in range.clone() {
            data.extend(range.clone().map(|j| var.second_partial(i, j)));
        }
    }
    let mut shape = vec![vars.len()];
    shape.extend(arg_shape.iter().chain(&arg_shape));
    Tensor::new(shape, data)
}

/// Hessian with respect to every differentiable argument entry
///
/// Shape `[num_trainable, num_inputs, num_inputs]`.
pub fn classical_hessian_all(trace: &Trace) -> Result<Tensor> {
    let inputs = trace.layout().num_inputs();
    let vars = curved_vars(trace)?;
    let mut data = Vec::with_capacity(vars.len() * inputs * inputs);
    for var in &vars {
        for i in 0..inputs {
            data.extend((0..inputs).map(|j| var.second_partial(i, j)));
        }
    }
    Tensor::new(vec![vars.len(), inputs, inputs], data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use qtape_core::{ops, trace_function, Argument, PauliWord, Recorder, Shots, TracedArg};

    fn circuit(q: &mut Recorder, args: &[TracedArg]) -> Result<()> {
        let w = &args[0];
        q.apply(&ops::RX, [w[0].clone()], &[0])?;
        q.apply(&ops::RY, [&w[0] * 0.2], &[1])?;
        q.apply(&ops::RY, [2.5], &[0])?;
        q.apply(&ops::RZ, [&w[1] * &w[1]], &[1])?;
        q.apply(&ops::RX, [w[2].clone()], &[1])?;
        q.apply(&ops::RZ, [args[1][0].clone()], &[0])?;
        q.expval(PauliWord::parse("ZZ", &[0, 1])?)
    }

    fn traced() -> Trace {
        let args = [Argument::vector(vec![1.0, 0.6, 0.6]), Argument::scalar(0.3)];
        trace_function(&circuit, &args, 2, Shots::Analytic).unwrap()
    }

    #[test]
    fn test_jacobian_rows_follow_trainable_parameters() {
        let j = classical_jacobian(&traced(), 0).unwrap();
        // the constant RY(2.5) is not a row
        assert_eq!(j.shape(), &[5, 3]);
        let expected = [
            1.0, 0.0, 0.0, //
            0.2, 0.0, 0.0, //
            0.0, 1.2, 0.0, //
            0.0, 0.0, 1.0, //
            0.0, 0.0, 0.0,
        ];
        for (a, e) in j.data().iter().zip(expected) {
            assert_relative_eq!(*a, e, epsilon = 1e-12);
        }

        let j1 = classical_jacobian(&traced(), 1).unwrap();
        assert_eq!(j1.shape(), &[5]);
        assert_eq!(j1.data(), &[0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_full_jacobian() {
        let j = classical_jacobian_all(&traced()).unwrap();
        assert_eq!(j.shape(), &[5, 4]);
        assert_relative_eq!(j.data()[2 * 4 + 1], 1.2, epsilon = 1e-12);
        assert_relative_eq!(j.data()[4 * 4 + 3], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_hessian_of_square() {
        let h = classical_hessian(&traced(), 0).unwrap();
        assert_eq!(h.shape(), &[5, 3, 3]);
        // d²(w1²)/dw1² = 2 on the third trainable parameter
        assert_relative_eq!(h.data()[2 * 9 + 4], 2.0, epsilon = 1e-12);
        assert_relative_eq!(h.data().iter().map(|x| x.abs()).sum::<f64>(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_differentiable_argument() {
        let args = [
            Argument::vector(vec![1.0, 0.6, 0.6]),
            Argument::scalar(0.3).constant(),
        ];
        let t = trace_function(&circuit, &args, 2, Shots::Analytic).unwrap();
        assert!(classical_jacobian(&t, 1).is_err());
        assert!(classical_jacobian(&t, 2).is_err());
        assert_eq!(classical_jacobian_all(&t).unwrap().shape(), &[4, 3]);
    }

    #[test]
    fn test_hessian_needs_second_order_trace() {
        let args = [Argument::vector(vec![1.0, 0.6, 0.6]), Argument::scalar(0.3)];
        let t = qtape_core::trace_function_with_order(&circuit, &args, 2, Shots::Analytic, 1)
            .unwrap();
        assert_eq!(classical_jacobian_all(&t).unwrap(), classical_jacobian_all(&traced()).unwrap());
        assert!(matches!(
            classical_hessian(&t, 0),
            Err(QuantumError::InvalidArgument(_))
        ));
    }
}
