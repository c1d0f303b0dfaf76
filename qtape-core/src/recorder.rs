//! Tracing quantum functions
//!
//! A quantum function receives a [`Recorder`] and the traced call
//! arguments, and issues operations and measurements on the recorder in
//! program order. [`trace_function`] runs it exactly once and returns the
//! resulting [`Trace`].
//!
//! # Example
//! ```
//! use qtape_core::{ops, trace_function, Argument, PauliWord, Shots};
//!
//! let circuit = |q: &mut qtape_core::Recorder, args: &[qtape_core::TracedArg]| {
//!     let x = &args[0][0];
//!     q.apply(&ops::RX, [x.sin()], &[0])?;
//!     q.expval(PauliWord::z(0))
//! };
//!
//! let trace = trace_function(&circuit, &[Argument::scalar(0.4)], 1, Shots::Analytic).unwrap();
//! assert_eq!(trace.trainable_params(), vec![0]);
//! ```

use crate::measurement::Measurement;
use crate::observable::Observable;
use crate::operation::{Operation, OperationDef};
use crate::shots::Shots;
use crate::trace::{ArgSlot, ArgumentLayout, Trace};
use crate::var::Var;
use crate::wire::Wire;
use crate::{QuantumError, Result};
use std::ops::Index;

/// Signature of a traceable quantum function
pub trait QuantumFunction: Fn(&mut Recorder, &[TracedArg]) -> Result<()> + Send + Sync {}

impl<F> QuantumFunction for F where F: Fn(&mut Recorder, &[TracedArg]) -> Result<()> + Send + Sync {}

/// Append-only target for operations and measurements
#[derive(Debug)]
pub struct Recorder {
    num_wires: usize,
    operations: Vec<Operation>,
    measurements: Vec<Measurement>,
}

impl Recorder {
    /// Create a recorder for a register of `num_wires`
    pub fn new(num_wires: usize) -> Self {
        Self {
            num_wires,
            operations: Vec::new(),
            measurements: Vec::new(),
        }
    }

    /// Number of wires available
    pub fn num_wires(&self) -> usize {
        self.num_wires
    }

    fn check_wires(&self, wires: &[usize]) -> Result<()> {
        match wires.iter().find(|&&w| w >= self.num_wires) {
            Some(&w) => Err(QuantumError::InvalidWire {
                wire: w,
                num_wires: self.num_wires,
            }),
            None => Ok(()),
        }
    }

    fn check_operations_done(&self) -> Result<()> {
        if !self.measurements.is_empty() {
            return Err(QuantumError::InvalidTrace(
                "operations must be applied before measurements".to_string(),
            ));
        }
        Ok(())
    }

    /// Record an operation
    pub fn apply<P: Into<Var>>(
        &mut self,
        def: &'static OperationDef,
        params: impl IntoIterator<Item = P>,
        wires: &[usize],
    ) -> Result<()> {
        self.check_operations_done()?;
        self.check_wires(wires)?;
        let op = Operation::on(def, params, wires)?;
        log::trace!("recorded {}", op);
        self.operations.push(op);
        Ok(())
    }

    /// Record an already constructed operation
    pub fn push(&mut self, op: Operation) -> Result<()> {
        self.check_operations_done()?;
        let wires: Vec<usize> = op.wires().iter().map(Wire::index).collect();
        self.check_wires(&wires)?;
        self.operations.push(op);
        Ok(())
    }

    fn measure(&mut self, m: Measurement) -> Result<()> {
        let wires: Vec<usize> = m.wires().iter().map(Wire::index).collect();
        self.check_wires(&wires)?;
        self.measurements.push(m);
        Ok(())
    }

    /// Record an expectation value
    pub fn expval(&mut self, observable: impl Into<Observable>) -> Result<()> {
        self.measure(Measurement::expval(observable))
    }

    /// Record a variance
    pub fn var(&mut self, observable: impl Into<Observable>) -> Result<()> {
        self.measure(Measurement::var(observable))
    }

    /// Record basis-state probabilities
    pub fn probs(&mut self, wires: &[usize]) -> Result<()> {
        self.measure(Measurement::probs(wires))
    }

    /// Record the full state
    pub fn state(&mut self) -> Result<()> {
        self.measure(Measurement::state())
    }

    /// Record per-shot samples
    pub fn sample(&mut self, observable: impl Into<Observable>) -> Result<()> {
        self.measure(Measurement::sample(observable))
    }

    /// Finish recording
    pub fn finish(self, shots: Shots, layout: ArgumentLayout) -> Result<Trace> {
        Ok(Trace::new(self.num_wires, self.operations, self.measurements)?
            .with_shots(shots)
            .with_layout(layout))
    }
}

/// A call argument: a real array, optionally differentiable, optionally
/// carrying a leading batch dimension
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    values: Vec<f64>,
    shape: Vec<usize>,
    requires_grad: bool,
    batched: bool,
}

impl Argument {
    /// Differentiable scalar
    pub fn scalar(value: f64) -> Self {
        Self {
            values: vec![value],
            shape: Vec::new(),
            requires_grad: true,
            batched: false,
        }
    }

    /// Differentiable 1-d array
    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
            requires_grad: true,
            batched: false,
        }
    }

    /// Differentiable array of any shape
    pub fn array(shape: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        if shape.iter().product::<usize>() != values.len() {
            return Err(QuantumError::shape_mismatch(format!(
                "argument of shape {:?} needs {} values, got {}",
                shape,
                shape.iter().product::<usize>(),
                values.len()
            )));
        }
        Ok(Self {
            values,
            shape,
            requires_grad: true,
            batched: false,
        })
    }

    /// Array whose leading dimension is a batch dimension
    pub fn batched(shape: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        if shape.is_empty() {
            return Err(QuantumError::InvalidArgument(
                "a batched argument needs a leading dimension".to_string(),
            ));
        }
        Ok(Self {
            batched: true,
            ..Self::array(shape, values)?
        })
    }

    /// Same argument excluded from differentiation
    pub fn constant(self) -> Self {
        Self {
            requires_grad: false,
            ..self
        }
    }

    /// Flattened values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Shape, including a batch dimension if present
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the argument has no entries
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether derivatives with respect to this argument are tracked
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Whether the leading dimension is a batch dimension
    pub fn is_batched(&self) -> bool {
        self.batched
    }

    /// Size of the batch dimension
    pub fn batch_size(&self) -> Option<usize> {
        if self.batched {
            self.shape.first().copied()
        } else {
            None
        }
    }

    /// Entry `index` of the batch dimension, as an unbatched argument
    pub fn batch_slice(&self, index: usize) -> Result<Self> {
        let size = self.batch_size().ok_or_else(|| {
            QuantumError::InvalidArgument("argument is not batched".to_string())
        })?;
        if index >= size {
            return Err(QuantumError::InvalidArgument(format!(
                "batch index {} out of range for batch size {}",
                index, size
            )));
        }
        let inner = self.values.len() / size;
        Ok(Self {
            values: self.values[index * inner..(index + 1) * inner].to_vec(),
            shape: self.shape[1..].to_vec(),
            requires_grad: self.requires_grad,
            batched: false,
        })
    }

    /// Same shape and flags, different values
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.values.len() {
            return Err(QuantumError::shape_mismatch(format!(
                "argument has {} entries, {} values given",
                self.values.len(),
                values.len()
            )));
        }
        Ok(Self {
            values,
            ..self.clone()
        })
    }
}

impl From<f64> for Argument {
    fn from(value: f64) -> Self {
        Argument::scalar(value)
    }
}

impl From<Vec<f64>> for Argument {
    fn from(values: Vec<f64>) -> Self {
        Argument::vector(values)
    }
}

/// A call argument as seen by the quantum function: one [`Var`] per entry
#[derive(Debug, Clone)]
pub struct TracedArg {
    vars: Vec<Var>,
    shape: Vec<usize>,
}

impl TracedArg {
    /// Shape of the argument
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check if the argument has no entries
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Entries in row-major order
    pub fn as_slice(&self) -> &[Var] {
        &self.vars
    }

    /// Iterate over entries
    pub fn iter(&self) -> std::slice::Iter<'_, Var> {
        self.vars.iter()
    }

    /// Entry at a multi-dimensional index
    pub fn get(&self, index: &[usize]) -> Option<&Var> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0;
        for (i, d) in index.iter().zip(&self.shape) {
            if i >= d {
                return None;
            }
            flat = flat * d + i;
        }
        self.vars.get(flat)
    }
}

impl Index<usize> for TracedArg {
    type Output = Var;

    fn index(&self, index: usize) -> &Var {
        &self.vars[index]
    }
}

/// Seed the arguments and build the layout
///
/// Every entry of every differentiable argument gets one derivative slot.
/// Second derivatives are tracked only for `max_order >= 2`.
pub fn seed_arguments(
    args: &[Argument],
    max_order: usize,
) -> Result<(Vec<TracedArg>, ArgumentLayout)> {
    let seed: fn(f64, usize, usize) -> Var = if max_order >= 2 {
        Var::seeded
    } else {
        Var::seeded_first_order
    };
    let num_inputs: usize = args
        .iter()
        .filter(|a| a.requires_grad)
        .map(Argument::len)
        .sum();

    let mut offset = 0;
    let mut traced = Vec::with_capacity(args.len());
    let mut slots = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        if arg.batched {
            return Err(QuantumError::InvalidArgument(format!(
                "argument {} is batched; split the batch before tracing",
                i
            )));
        }
        let vars = if arg.requires_grad {
            let vars = arg
                .values
                .iter()
                .enumerate()
                .map(|(j, &v)| seed(v, offset + j, num_inputs))
                .collect();
            slots.push(ArgSlot {
                shape: arg.shape.clone(),
                offset: Some(offset),
            });
            offset += arg.len();
            vars
        } else {
            slots.push(ArgSlot {
                shape: arg.shape.clone(),
                offset: None,
            });
            arg.values.iter().copied().map(Var::constant).collect()
        };
        traced.push(TracedArg {
            vars,
            shape: arg.shape.clone(),
        });
    }
    Ok((traced, ArgumentLayout::new(slots)))
}

/// Run a quantum function once and record its trace
///
/// Records first and second derivatives of the classical preprocessing.
pub fn trace_function<F>(
    func: &F,
    args: &[Argument],
    num_wires: usize,
    shots: Shots,
) -> Result<Trace>
where
    F: Fn(&mut Recorder, &[TracedArg]) -> Result<()> + ?Sized,
{
    trace_function_with_order(func, args, num_wires, shots, 2)
}

/// [`trace_function`] recording preprocessing derivatives up to `max_order`
///
/// With `max_order < 2` only the classical Jacobian is available
/// afterwards; tracing then costs time and memory linear in the number
/// of argument entries per recorded parameter.
pub fn trace_function_with_order<F>(
    func: &F,
    args: &[Argument],
    num_wires: usize,
    shots: Shots,
    max_order: usize,
) -> Result<Trace>
where
    F: Fn(&mut Recorder, &[TracedArg]) -> Result<()> + ?Sized,
{
    let (traced, layout) = seed_arguments(args, max_order)?;
    let mut recorder = Recorder::new(num_wires);
    func(&mut recorder, &traced)?;
    let trace = recorder.finish(shots, layout)?;
    log::debug!(
        "traced {} operations, {} measurements, {} trainable parameters",
        trace.operations().len(),
        trace.measurements().len(),
        trace.trainable_params().len()
    );
    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::PauliWord;
    use crate::ops;
    use approx::assert_relative_eq;

    fn circuit(q: &mut Recorder, args: &[TracedArg]) -> Result<()> {
        let x = &args[0];
        let y = &args[1][0];
        q.apply(&ops::RX, [&x[0] * 2.0], &[0])?;
        q.apply(&ops::RY, [x[1].sin()], &[1])?;
        q.apply(&ops::CNOT, Vec::<f64>::new(), &[0, 1])?;
        q.apply(&ops::RZ, [y.clone()], &[1])?;
        q.expval(PauliWord::z(1))
    }

    #[test]
    fn test_trace_records_program_order() {
        let args = [Argument::vector(vec![0.1, 0.2]), Argument::scalar(0.5)];
        let trace = trace_function(&circuit, &args, 2, Shots::Analytic).unwrap();
        let names: Vec<_> = trace.operations().iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["RX", "RY", "CNOT", "RZ"]);
        assert_eq!(trace.layout().num_inputs(), 3);
        assert_eq!(trace.layout().slots(1), Some(2..3));
    }

    #[test]
    fn test_classical_preprocessing_recorded() {
        let args = [Argument::vector(vec![0.1, 0.2]), Argument::scalar(0.5)];
        let trace = trace_function(&circuit, &args, 2, Shots::Analytic).unwrap();

        let rx = trace.param(0).unwrap();
        assert_relative_eq!(rx.value(), 0.2);
        assert_eq!(rx.gradient().unwrap(), &[2.0, 0.0, 0.0]);
        assert!(rx.is_affine());

        let ry = trace.param(1).unwrap();
        assert_relative_eq!(ry.partial(1), 0.2_f64.cos());
        assert!(!ry.is_affine());
    }

    #[test]
    fn test_constant_argument_not_trainable() {
        let args = [
            Argument::vector(vec![0.1, 0.2]),
            Argument::scalar(0.5).constant(),
        ];
        let trace = trace_function(&circuit, &args, 2, Shots::Analytic).unwrap();
        assert_eq!(trace.trainable_params(), vec![0, 1]);
        assert_eq!(trace.layout().slots(1), None);
    }

    #[test]
    fn test_batched_argument_rejected() {
        let args = [
            Argument::batched(vec![3, 2], vec![0.0; 6]).unwrap(),
            Argument::scalar(0.5),
        ];
        assert!(trace_function(&circuit, &args, 2, Shots::Analytic).is_err());
    }

    #[test]
    fn test_out_of_range_wire() {
        let f = |q: &mut Recorder, _: &[TracedArg]| {
            q.apply(&ops::HADAMARD, Vec::<f64>::new(), &[3])?;
            q.probs(&[])
        };
        let r = trace_function(&f, &[], 2, Shots::Analytic);
        assert!(matches!(r, Err(QuantumError::InvalidWire { wire: 3, .. })));
    }

    #[test]
    fn test_batch_slice() {
        let a = Argument::batched(vec![3, 2], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(a.batch_size(), Some(3));
        let s = a.batch_slice(1).unwrap();
        assert_eq!(s.values(), &[2.0, 3.0]);
        assert_eq!(s.shape(), &[2]);
        assert!(!s.is_batched());
    }

    #[test]
    fn test_first_order_tracing_stores_no_second_derivatives() {
        let args = [Argument::vector(vec![0.1, 0.2]), Argument::scalar(0.5)];
        let first = trace_function_with_order(&circuit, &args, 2, Shots::Analytic, 1).unwrap();
        let second = trace_function(&circuit, &args, 2, Shots::Analytic).unwrap();

        for (a, b) in first.params().zip(second.params()) {
            assert_eq!(a.gradient(), b.gradient());
        }
        assert!(first.params().all(|p| p.num_second_order_entries() == 0));
        assert!(!first.param(1).unwrap().has_second_order());
        assert_relative_eq!(second.param(1).unwrap().second_partial(1, 1), -(0.2_f64.sin()));
    }
}
