//! Differentiation engine with bounded higher-order recursion
//!
//! The engine expands a trace for differentiation once, then builds the
//! derivative transform of the requested order by composing the
//! first-order transform with itself. Recursion is driven by an explicit
//! remaining-order counter and refused above the configured maximum.
//!
//! An order-`k` derivative has the trace's output shape followed by `k`
//! parameter dimensions.

use crate::cost::{DecompositionCost, DifferentiableOpCount};
use crate::expansion::expand_for_gradient;
use crate::finite_diff::{finite_diff, FiniteDiffConfig};
use crate::param_shift::{param_shift, select_params, ParamShiftConfig, DEFAULT_GRADIENT_DEPTH};
use qtape_core::{
    QuantumError, Result, ReturnType, Tensor, Trace, TraceTransform, TransformResult,
};
use std::fmt;
use std::sync::Arc;

/// Highest derivative order an engine computes unless configured otherwise
pub const DEFAULT_MAX_ORDER: usize = 2;

/// First-order rule the engine composes
#[derive(Debug, Clone, PartialEq)]
pub enum GradientMethod {
    /// Analytic shift rules, central differences for numeric operations
    ParamShift(ParamShiftConfig),
    /// Finite differences for every parameter
    FiniteDiff(FiniteDiffConfig),
}

impl Default for GradientMethod {
    fn default() -> Self {
        GradientMethod::ParamShift(ParamShiftConfig::default())
    }
}

impl GradientMethod {
    fn argnum(&self) -> Option<&[usize]> {
        match self {
            GradientMethod::ParamShift(c) => c.argnum.as_deref(),
            GradientMethod::FiniteDiff(c) => c.argnum.as_deref(),
        }
    }
}

/// Builds derivative transforms of bounded order
///
/// # Example
/// ```
/// use qtape_core::{ops, Measurement, Operation, PauliWord, Tensor, Trace, Var};
/// use qtape_grad::DifferentiationEngine;
///
/// let trace = Trace::new(
///     1,
///     vec![Operation::on(&ops::RX, [Var::trainable(0.3)], &[0]).unwrap()],
///     vec![Measurement::expval(PauliWord::z(0))],
/// )
/// .unwrap();
///
/// let engine = DifferentiationEngine::param_shift();
/// let hessian = engine.derivative(&trace, 2).unwrap();
/// assert_eq!(hessian.len(), 4);
/// assert!(engine.derivative(&trace, 3).is_err());
/// ```
#[derive(Clone)]
pub struct DifferentiationEngine {
    method: GradientMethod,
    max_order: usize,
    expansion_depth: usize,
    cost: Arc<dyn DecompositionCost>,
}

impl DifferentiationEngine {
    /// Create an engine around a first-order rule
    pub fn new(method: GradientMethod) -> Self {
        Self {
            method,
            max_order: DEFAULT_MAX_ORDER,
            expansion_depth: DEFAULT_GRADIENT_DEPTH,
            cost: Arc::new(DifferentiableOpCount),
        }
    }

    /// Parameter-shift engine with default settings
    pub fn param_shift() -> Self {
        Self::new(GradientMethod::ParamShift(ParamShiftConfig::default()))
    }

    /// Finite-difference engine with default settings
    pub fn finite_diff() -> Self {
        Self::new(GradientMethod::FiniteDiff(FiniteDiffConfig::default()))
    }

    /// Set the maximum derivative order
    pub fn with_max_order(mut self, max_order: usize) -> Self {
        self.max_order = max_order;
        self
    }

    /// Set the gradient expansion depth
    pub fn with_expansion_depth(mut self, depth: usize) -> Self {
        self.expansion_depth = depth;
        self
    }

    /// Set the cost used to choose among decompositions
    pub fn with_cost(mut self, cost: Arc<dyn DecompositionCost>) -> Self {
        self.cost = cost;
        self
    }

    /// Get the first-order rule
    pub fn method(&self) -> &GradientMethod {
        &self.method
    }

    /// Get the maximum derivative order
    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Rewrite a trace so that every trainable operation is differentiable
    pub fn expand(&self, trace: &Trace) -> Result<Trace> {
        expand_for_gradient(trace, self.expansion_depth, self.cost.as_ref())
    }

    /// First-order transform of an already expanded trace
    pub fn first_order(&self, trace: &Trace) -> Result<TransformResult> {
        match &self.method {
            GradientMethod::ParamShift(config) => param_shift(trace, config),
            GradientMethod::FiniteDiff(config) => finite_diff(trace, config),
        }
    }

    /// Derivative transform of order `order`
    ///
    /// Order zero is the identity.
    ///
    /// # Errors
    /// Returns `DerivativeOrderExceeded` above the maximum order, and
    /// `GradientUndefined` for higher orders of variances, whose first
    /// derivative is not linear in the circuit results.
    pub fn derivative(&self, trace: &Trace, order: usize) -> Result<TransformResult> {
        if order > self.max_order {
            return Err(QuantumError::DerivativeOrderExceeded {
                requested: order,
                max: self.max_order,
            });
        }
        if order == 0 {
            return Ok(TransformResult::identity(trace.clone()));
        }
        if order > 1
            && trace
                .measurements()
                .iter()
                .any(|m| m.return_type() == ReturnType::Variance)
        {
            return Err(QuantumError::gradient_undefined(
                "var",
                "derivatives above first order are only defined for linear measurements",
            ));
        }

        let expanded = self.expand(trace)?;
        let n = select_params(&expanded, self.method.argnum())?.len();
        if n == 0 {
            let mut shape = expanded.output_shape()?;
            shape.extend(std::iter::repeat(0).take(order));
            return Ok(TransformResult::new(Vec::new(), move |_| {
                Ok(Tensor::zeros(shape.clone()))
            }));
        }

        let result = self.recurse(&expanded, order)?;
        log::debug!(
            "order {} derivative: {} parameters, {} traces",
            order,
            n,
            result.len()
        );
        Ok(result)
    }

    /// Jacobian transform
    pub fn jacobian(&self, trace: &Trace) -> Result<TransformResult> {
        self.derivative(trace, 1)
    }

    /// Hessian transform
    pub fn hessian(&self, trace: &Trace) -> Result<TransformResult> {
        self.derivative(trace, 2)
    }

    fn recurse(&self, trace: &Trace, remaining: usize) -> Result<TransformResult> {
        let first = self.first_order(trace)?;
        if remaining <= 1 {
            return Ok(first);
        }
        first.then(|t| self.recurse(t, remaining - 1))
    }
}

impl Default for DifferentiationEngine {
    fn default() -> Self {
        Self::param_shift()
    }
}

impl fmt::Debug for DifferentiationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DifferentiationEngine")
            .field("method", &self.method)
            .field("max_order", &self.max_order)
            .field("expansion_depth", &self.expansion_depth)
            .finish()
    }
}

impl TraceTransform for DifferentiationEngine {
    fn name(&self) -> &str {
        match self.method {
            GradientMethod::ParamShift(_) => "param_shift",
            GradientMethod::FiniteDiff(_) => "finite_diff",
        }
    }

    fn apply(&self, trace: &Trace) -> Result<TransformResult> {
        self.derivative(trace, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use qtape_core::{ops, Measurement, Operation, PauliWord, Var};

    /// ⟨Z⟩ after RX(a) RY(b) is cos a · cos b
    fn executor(traces: &[Trace]) -> Vec<Tensor> {
        traces
            .iter()
            .map(|t| {
                let p = t.parameters();
                Tensor::scalar(p[0].cos() * p[1].cos())
            })
            .collect()
    }

    fn trace(a: f64, b: f64) -> Trace {
        Trace::new(
            1,
            vec![
                Operation::on(&ops::RX, [Var::trainable(a)], &[0]).unwrap(),
                Operation::on(&ops::RY, [Var::trainable(b)], &[0]).unwrap(),
            ],
            vec![Measurement::expval(PauliWord::z(0))],
        )
        .unwrap()
    }

    #[test]
    fn test_order_bound() {
        let engine = DifferentiationEngine::param_shift().with_max_order(1);
        assert!(matches!(
            engine.derivative(&trace(0.1, 0.2), 2),
            Err(QuantumError::DerivativeOrderExceeded { requested: 2, max: 1 })
        ));
    }

    #[test]
    fn test_order_zero_is_identity() {
        let engine = DifferentiationEngine::default();
        let r = engine.derivative(&trace(0.1, 0.2), 0).unwrap();
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_hessian_closed_form() {
        let (a, b) = (0.7_f64, -0.3_f64);
        let r = DifferentiationEngine::param_shift()
            .hessian(&trace(a, b))
            .unwrap();
        // 2 parameters, 2 shifts each, twice
        assert_eq!(r.len(), 16);
        let h = r.combine(executor(r.traces())).unwrap();
        assert_eq!(h.shape(), &[2, 2]);
        let expected = [
            -a.cos() * b.cos(),
            a.sin() * b.sin(),
            a.sin() * b.sin(),
            -a.cos() * b.cos(),
        ];
        for (x, e) in h.data().iter().zip(expected) {
            assert_relative_eq!(*x, e, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_third_order() {
        let a = 0.4_f64;
        let engine = DifferentiationEngine::param_shift().with_max_order(3);
        let config = ParamShiftConfig {
            argnum: Some(vec![0]),
            ..Default::default()
        };
        let engine = DifferentiationEngine {
            method: GradientMethod::ParamShift(config),
            ..engine
        };
        let r = engine.derivative(&trace(a, 0.0), 3).unwrap();
        assert_eq!(r.len(), 8);
        let d3 = r.combine(executor(r.traces())).unwrap();
        assert_eq!(d3.shape(), &[1, 1, 1]);
        assert_relative_eq!(d3.data()[0], a.sin(), epsilon = 1e-12);
    }

    #[test]
    fn test_variance_limited_to_first_order() {
        let t = Trace::new(
            1,
            vec![Operation::on(&ops::RX, [Var::trainable(0.2)], &[0]).unwrap()],
            vec![Measurement::var(PauliWord::z(0))],
        )
        .unwrap();
        let engine = DifferentiationEngine::default();
        assert!(engine.derivative(&t, 1).is_ok());
        assert!(matches!(
            engine.derivative(&t, 2),
            Err(QuantumError::GradientUndefined { .. })
        ));
    }

    #[test]
    fn test_no_trainable_parameters_gives_empty_dimensions() {
        let t = Trace::new(
            1,
            vec![Operation::on(&ops::RX, [0.2], &[0]).unwrap()],
            vec![Measurement::probs(&[0])],
        )
        .unwrap();
        let r = DifferentiationEngine::default().hessian(&t).unwrap();
        assert!(r.is_empty());
        assert_eq!(r.combine(vec![]).unwrap().shape(), &[2, 0, 0]);
    }
}
