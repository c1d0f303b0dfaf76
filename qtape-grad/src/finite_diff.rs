//! Finite-difference differentiation
//!
//! Works for every operation, recipe or not, and for any measurement
//! whose result is a smooth function of the parameters. Accuracy is
//! limited by the step size.

use crate::param_shift::{check_measurements, select_params};
use qtape_core::{QuantumError, Result, Tensor, Trace, TransformResult};
use serde::{Deserialize, Serialize};

/// Finite difference method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiniteDiffMethod {
    /// Forward difference: f'(x) ≈ [f(x+h) - f(x)] / h
    Forward,
    /// Central difference: f'(x) ≈ [f(x+h) - f(x-h)] / (2h)
    Central,
    /// Backward difference: f'(x) ≈ [f(x) - f(x-h)] / h
    Backward,
}

/// Configuration for finite-difference differentiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiniteDiffConfig {
    /// Method to use
    pub method: FiniteDiffMethod,
    /// Step size
    pub h: f64,
    /// Positions in the trainable-parameter list to differentiate; all when `None`
    pub argnum: Option<Vec<usize>>,
}

impl Default for FiniteDiffConfig {
    fn default() -> Self {
        Self {
            method: FiniteDiffMethod::Central,
            h: 1e-7,
            argnum: None,
        }
    }
}

/// Finite-difference gradient transform
///
/// Forward and backward differences share one unshifted trace across all
/// parameters. The combined result has the trace's output shape plus a
/// trailing parameter dimension.
pub fn finite_diff(trace: &Trace, config: &FiniteDiffConfig) -> Result<TransformResult> {
    check_measurements(trace)?;
    if !(config.h.is_finite() && config.h > 0.0) {
        return Err(QuantumError::InvalidArgument(format!(
            "finite-difference step must be positive, got {}",
            config.h
        )));
    }
    let selected = select_params(trace, config.argnum.as_deref())?;
    let out_shape = trace.output_shape()?;
    if selected.is_empty() {
        let mut shape = out_shape;
        shape.push(0);
        return Ok(TransformResult::new(Vec::new(), move |_| {
            Ok(Tensor::zeros(shape.clone()))
        }));
    }

    let h = config.h;
    let method = config.method;
    let value = |p: usize| trace.param(p).map_or(0.0, |v| v.value());

    let mut traces = Vec::new();
    match method {
        FiniteDiffMethod::Forward | FiniteDiffMethod::Backward => {
            let step = if method == FiniteDiffMethod::Forward { h } else { -h };
            traces.push(trace.clone());
            for &p in &selected {
                traces.push(trace.with_parameter(p, value(p) + step)?);
            }
        }
        FiniteDiffMethod::Central => {
            for &p in &selected {
                traces.push(trace.with_parameter(p, value(p) + h)?);
                traces.push(trace.with_parameter(p, value(p) - h)?);
            }
        }
    }
    log::debug!(
        "finite differences ({:?}): {} parameters, {} traces",
        method,
        selected.len(),
        traces.len()
    );

    let n = selected.len();
    let expected = traces.len();
    Ok(TransformResult::new(traces, move |results| {
        if results.len() != expected {
            return Err(QuantumError::shape_mismatch(format!(
                "finite differences expect {} results, got {}",
                expected,
                results.len()
            )));
        }
        let (inv, half) = (1.0 / h, 0.5 / h);
        let columns = match method {
            FiniteDiffMethod::Forward => (1..=n)
                .map(|i| results[i].add(&results[0].scale(-1.0)).map(|d| d.scale(inv)))
                .collect::<Result<Vec<_>>>()?,
            FiniteDiffMethod::Backward => (1..=n)
                .map(|i| results[0].add(&results[i].scale(-1.0)).map(|d| d.scale(inv)))
                .collect::<Result<Vec<_>>>()?,
            FiniteDiffMethod::Central => results
                .chunks(2)
                .map(|pair| Tensor::linear_combination(&[half, -half], pair))
                .collect::<Result<Vec<_>>>()?,
        };
        Tensor::stack_trailing(&columns)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use qtape_core::{ops, Measurement, Operation, PauliWord, Var};

    fn executor(traces: &[Trace]) -> Vec<Tensor> {
        // ⟨Z⟩ after RX(a) RY(b) on |0⟩ is cos a · cos b
        traces
            .iter()
            .map(|t| {
                let p = t.parameters();
                Tensor::scalar(p[0].cos() * p[1].cos())
            })
            .collect()
    }

    fn trace() -> Trace {
        Trace::new(
            1,
            vec![
                Operation::on(&ops::RX, [Var::trainable(0.4)], &[0]).unwrap(),
                Operation::on(&ops::RY, [Var::trainable(-0.9)], &[0]).unwrap(),
            ],
            vec![Measurement::expval(PauliWord::z(0))],
        )
        .unwrap()
    }

    #[test]
    fn test_methods_agree_with_closed_form() {
        let (a, b) = (0.4_f64, -0.9_f64);
        let expected = [-a.sin() * b.cos(), -a.cos() * b.sin()];
        for (method, count, tol) in [
            (FiniteDiffMethod::Central, 4, 1e-8),
            (FiniteDiffMethod::Forward, 3, 1e-4),
            (FiniteDiffMethod::Backward, 3, 1e-4),
        ] {
            let config = FiniteDiffConfig {
                method,
                h: 1e-5,
                argnum: None,
            };
            let r = finite_diff(&trace(), &config).unwrap();
            assert_eq!(r.len(), count);
            let g = r.combine(executor(r.traces())).unwrap();
            assert_eq!(g.shape(), &[2]);
            assert_relative_eq!(g.data()[0], expected[0], epsilon = tol);
            assert_relative_eq!(g.data()[1], expected[1], epsilon = tol);
        }
    }

    #[test]
    fn test_argnum_selects_parameters() {
        let config = FiniteDiffConfig {
            argnum: Some(vec![1]),
            h: 1e-5,
            ..Default::default()
        };
        let r = finite_diff(&trace(), &config).unwrap();
        assert_eq!(r.len(), 2);
        let g = r.combine(executor(r.traces())).unwrap();
        assert_eq!(g.shape(), &[1]);
        assert_relative_eq!(g.data()[0], -(0.4_f64).cos() * (-0.9_f64).sin(), epsilon = 1e-8);
    }

    #[test]
    fn test_invalid_step() {
        let config = FiniteDiffConfig {
            h: 0.0,
            ..Default::default()
        };
        assert!(finite_diff(&trace(), &config).is_err());
    }
}
