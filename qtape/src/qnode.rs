//! Differentiable circuit binding
//!
//! A [`QNode`] binds a quantum function to a backend and a
//! differentiation strategy. Every call:
//!
//! 1. traces the function with the call arguments
//! 2. applies the backend's decomposition transform
//! 3. applies the backend's splitting transform
//! 4. for derivative requests, applies the differentiation engine
//! 5. submits every resulting trace to the backend as one batch
//! 6. folds the results back through the combining functions
//!
//! Derivatives are taken with respect to call arguments: the engine
//! differentiates with respect to gate parameters, and the classical
//! Jacobian (and Hessian, at second order) recorded during tracing
//! carries them over to the argument entries.

use crate::batch::{batch_size, stack_batch, unbatch_arguments};
use crate::config::{CallOptions, ExpansionStrategy, QNodeConfig};
use crate::interface::InterfaceHook;
use parking_lot::Mutex;
use qtape_backend::{execute_batch, QuantumBackend};
use qtape_core::{
    trace_function_with_order, Argument, BatchTransformResult, FnTransform, QuantumError,
    QuantumFunction, Result, Tensor, Trace, TransformProgram, TransformResult,
};
use qtape_grad::{classical_hessian_all, classical_jacobian_all, DifferentiationEngine};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// First trace of a non-mutable binding and the arguments it was recorded with
struct Recorded {
    args: Vec<Argument>,
    trace: Trace,
}

/// Derivative columns requested by the caller
struct Columns {
    range: Range<usize>,
    shape: Vec<usize>,
}

impl Columns {
    fn of_argument(trace: &Trace, argnum: usize) -> Result<Self> {
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
        Ok(Self {
            range,
            shape: slot.shape.clone(),
        })
    }

    fn all(trace: &Trace) -> Self {
        let n = trace.layout().num_inputs();
        Self {
            range: 0..n,
            shape: vec![n],
        }
    }
}

/// A quantum function bound to a backend
///
/// # Example
/// ```
/// use qtape::{QNode, QNodeConfig};
/// use qtape_backend::StateVectorBackend;
/// use qtape_core::{ops, Argument, PauliWord, Recorder, Result, TracedArg};
/// use std::sync::Arc;
///
/// fn circuit(q: &mut Recorder, args: &[TracedArg]) -> Result<()> {
///     q.apply(&ops::RX, [args[0][0].clone()], &[0])?;
///     q.expval(PauliWord::z(0))
/// }
///
/// let qnode = QNode::new(circuit, Arc::new(StateVectorBackend::new(1)), 1, QNodeConfig::default()).unwrap();
/// let x = 0.3;
/// let value = qnode.call(&[Argument::scalar(x)]).unwrap();
/// let grad = qnode.jacobian(&[Argument::scalar(x)], 0).unwrap();
/// assert!((value.data()[0] - x.cos()).abs() < 1e-12);
/// assert!((grad.data()[0] + x.sin()).abs() < 1e-12);
/// ```
pub struct QNode<F> {
    func: F,
    backend: Arc<dyn QuantumBackend>,
    num_wires: usize,
    config: QNodeConfig,
    engine: Option<DifferentiationEngine>,
    recorded: Mutex<Option<Recorded>>,
    traces_recorded: AtomicUsize,
}

impl<F: QuantumFunction> QNode<F> {
    /// Bind `func` acting on `num_wires` wires to `backend`
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an invalid configuration or more
    /// wires than the backend provides.
    pub fn new(
        func: F,
        backend: Arc<dyn QuantumBackend>,
        num_wires: usize,
        config: QNodeConfig,
    ) -> Result<Self> {
        config.validate()?;
        let available = backend.capabilities().num_wires;
        if num_wires > available {
            return Err(QuantumError::InvalidArgument(format!(
                "circuit needs {} wires, '{}' provides {}",
                num_wires,
                backend.name(),
                available
            )));
        }
        let engine = config.engine();
        Ok(Self {
            func,
            backend,
            num_wires,
            config,
            engine,
            recorded: Mutex::new(None),
            traces_recorded: AtomicUsize::new(0),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &QNodeConfig {
        &self.config
    }

    /// Get the backend
    pub fn backend(&self) -> &Arc<dyn QuantumBackend> {
        &self.backend
    }

    /// Number of wires the function acts on
    pub fn num_wires(&self) -> usize {
        self.num_wires
    }

    /// Number of times the quantum function has been run
    pub fn num_traces(&self) -> usize {
        self.traces_recorded.load(Ordering::Relaxed)
    }

    /// Trace the function for unbatched arguments
    ///
    /// A non-mutable binding records once and afterwards substitutes
    /// parameter values through the recorded affine relation; it falls
    /// back to re-tracing when that relation is not affine or a
    /// non-differentiable argument changed.
    ///
    /// The quantum function runs without any lock held, so it may call
    /// back into this binding.
    pub fn construct(&self, args: &[Argument]) -> Result<Trace> {
        if self.config.mutable {
            return self.record(args);
        }
        if let Some(trace) = self.reuse(args) {
            return Ok(trace);
        }
        let trace = self.record(args)?;
        *self.recorded.lock() = Some(Recorded {
            args: args.to_vec(),
            trace: trace.clone(),
        });
        Ok(trace)
    }

    fn reuse(&self, args: &[Argument]) -> Option<Trace> {
        let recorded = self.recorded.lock();
        let trace = substitute(recorded.as_ref()?, args);
        match &trace {
            Some(_) => log::trace!("reusing recorded structure"),
            None => log::warn!(
                "non-mutable binding re-traced: arguments changed in a way parameter substitution cannot follow"
            ),
        }
        trace
    }

    fn record(&self, args: &[Argument]) -> Result<Trace> {
        self.traces_recorded.fetch_add(1, Ordering::Relaxed);
        trace_function_with_order(
            &self.func,
            args,
            self.num_wires,
            self.config.shots.clone(),
            self.config.max_diff,
        )
    }

    /// Evaluate the circuit
    ///
    /// Batched arguments add a leading batch dimension to the output.
    pub fn call(&self, args: &[Argument]) -> Result<Tensor> {
        self.call_with(args, &CallOptions::default())
    }

    /// Evaluate the circuit with per-call overrides
    pub fn call_with(&self, args: &[Argument], options: &CallOptions) -> Result<Tensor> {
        self.run(args, options, |trace| {
            let prepared = self.prepare(trace, None)?;
            self.program(0).apply(&prepared)
        })
    }

    /// Derivative of order `order` with respect to argument `argnum`
    ///
    /// The output has the circuit's output shape followed by the
    /// argument's shape once per order.
    ///
    /// # Errors
    /// Returns `GradientUndefined` when differentiation is disabled,
    /// `DerivativeOrderExceeded` above the configured maximum, and
    /// `InvalidArgument` if the argument is not differentiable.
    pub fn derivative(&self, args: &[Argument], argnum: usize, order: usize) -> Result<Tensor> {
        self.derivative_with(args, argnum, order, &CallOptions::default())
    }

    /// [`QNode::derivative`] with per-call overrides
    pub fn derivative_with(
        &self,
        args: &[Argument],
        argnum: usize,
        order: usize,
        options: &CallOptions,
    ) -> Result<Tensor> {
        let engine = self.check_order(order)?;
        if order == 0 {
            return self.call_with(args, options);
        }
        self.run(args, options, |trace| {
            let columns = Columns::of_argument(trace, argnum)?;
            self.derivative_job(engine, trace, columns, order)
        })
    }

    /// Jacobian with respect to argument `argnum`
    pub fn jacobian(&self, args: &[Argument], argnum: usize) -> Result<Tensor> {
        self.derivative(args, argnum, 1)
    }

    /// Hessian with respect to argument `argnum`
    pub fn hessian(&self, args: &[Argument], argnum: usize) -> Result<Tensor> {
        self.derivative(args, argnum, 2)
    }

    /// Jacobian of the trainable gate parameters with respect to argument `argnum`
    pub fn classical_jacobian(&self, args: &[Argument], argnum: usize) -> Result<Tensor> {
        qtape_grad::classical_jacobian(&self.construct(args)?, argnum)
    }

    /// Frequency spectrum of the output in each entry of argument `argnum`
    pub fn spectrum(&self, args: &[Argument], argnum: usize) -> Result<Vec<Vec<f64>>> {
        qtape_grad::spectrum(&self.construct(args)?, argnum)
    }

    /// Vector-Jacobian product with respect to every argument
    ///
    /// `cotangent` must have the circuit's output shape. Returns one
    /// tensor per argument, zeros for non-differentiable ones.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for batched arguments and
    /// `ShapeMismatch` for a cotangent of the wrong shape.
    pub fn vjp(&self, args: &[Argument], cotangent: &Tensor) -> Result<Vec<Tensor>> {
        let engine = self.check_order(1)?;
        if batch_size(args)?.is_some() {
            return Err(QuantumError::InvalidArgument(
                "vector-Jacobian products take unbatched arguments".to_string(),
            ));
        }
        let trace = self.construct(args)?;
        let layout = trace.layout().clone();
        let inputs = layout.num_inputs();

        let job = self.derivative_job(engine, &trace, Columns::all(&trace), 1)?;
        let results = execute_batch(self.backend.as_ref(), job.traces(), None)?;
        let jac = job.combine(results)?;

        let out_shape = &jac.shape()[..jac.ndim() - 1];
        if cotangent.shape() != out_shape {
            return Err(QuantumError::shape_mismatch(format!(
                "cotangent of shape {:?} for output of shape {:?}",
                cotangent.shape(),
                out_shape
            )));
        }
        let mut product = vec![0.0; inputs];
        for (o, c) in cotangent.data().iter().enumerate() {
            for (i, p) in product.iter_mut().enumerate() {
                *p += c * jac.data()[o * inputs + i];
            }
        }

        (0..layout.num_args())
            .map(|i| {
                let shape = layout.arg(i).map(|s| s.shape.clone()).unwrap_or_default();
                match layout.slots(i) {
                    Some(range) => Tensor::new(shape, product[range].to_vec()),
                    None => Ok(Tensor::zeros(shape)),
                }
            })
            .collect()
    }

    fn check_order(&self, order: usize) -> Result<&DifferentiationEngine> {
        let engine = self.engine.as_ref().ok_or_else(|| {
            QuantumError::gradient_undefined("qnode", "differentiation is disabled")
        })?;
        if order > self.config.max_diff {
            return Err(QuantumError::DerivativeOrderExceeded {
                requested: order,
                max: self.config.max_diff,
            });
        }
        Ok(engine)
    }

    /// Trace per argument set, build each job, execute everything as one batch
    fn run<J>(&self, args: &[Argument], options: &CallOptions, job: J) -> Result<Tensor>
    where
        J: Fn(&Trace) -> Result<TransformResult>,
    {
        let batched = batch_size(args)?.is_some();
        let argument_sets = unbatch_arguments(args)?;
        let jobs = argument_sets
            .iter()
            .map(|set| {
                let trace = self.construct(set)?;
                let trace = match &options.shots {
                    Some(shots) => trace.with_shots(shots.clone()),
                    None => trace,
                };
                job(&trace)
            })
            .collect::<Result<Vec<_>>>()?;

        let batch = BatchTransformResult::from_results(jobs);
        log::debug!(
            "submitting {} traces for {} argument sets",
            batch.traces().len(),
            argument_sets.len()
        );
        let results = execute_batch(self.backend.as_ref(), batch.traces(), None)?;
        let outputs = batch.combine(results)?;
        if batched {
            return stack_batch(outputs, &[]);
        }
        outputs
            .into_iter()
            .next()
            .ok_or_else(|| QuantumError::shape_mismatch("no result for the call"))
    }

    /// Rewrite a freshly traced circuit before splitting
    ///
    /// With an engine, the result is also expanded so that every
    /// trainable operation is differentiable; its trainable parameters
    /// are the ones the derivative is taken with respect to.
    fn prepare(&self, trace: &Trace, engine: Option<&DifferentiationEngine>) -> Result<Trace> {
        match (engine, self.config.expansion_strategy) {
            (None, _) => self.backend.decompose(trace),
            (Some(e), ExpansionStrategy::Device) => e.expand(&self.backend.decompose(trace)?),
            (Some(e), ExpansionStrategy::Gradient) => e.expand(trace),
        }
    }

    /// Stages applied to a prepared trace
    fn program(&self, order: usize) -> TransformProgram {
        let backend = Arc::clone(&self.backend);
        let mut program = TransformProgram::new().with(Arc::new(FnTransform::new(
            "split",
            move |t: &Trace| backend.split(t),
        )));
        let Some(engine) = self.engine.clone() else {
            return program;
        };
        match order {
            0 => return program,
            1 => program.push(Arc::new(engine)),
            _ => program.push(Arc::new(FnTransform::new(
                "derivative",
                move |t: &Trace| engine.derivative(t, order),
            ))),
        }
        // gradient expansion may leave operations outside the native set
        let backend = Arc::clone(&self.backend);
        program.push(Arc::new(FnTransform::new("decompose", move |t: &Trace| {
            backend.decomposition_transform(t)
        })));
        program
    }

    /// Derivative transform of a traced circuit, mapped to argument entries
    fn derivative_job(
        &self,
        engine: &DifferentiationEngine,
        trace: &Trace,
        columns: Columns,
        order: usize,
    ) -> Result<TransformResult> {
        let prepared = self.prepare(trace, Some(engine))?;
        let jac = classical_jacobian_all(&prepared)?;
        let (n, inputs) = (jac.shape()[0], jac.shape()[1]);
        let m = columns.range.len();
        let mut j = Vec::with_capacity(n * m);
        for k in 0..n {
            j.extend(columns.range.clone().map(|c| jac.data()[k * inputs + c]));
        }

        let affine = prepared
            .params()
            .filter(|p| p.is_trainable())
            .all(|p| p.is_affine());
        let main = self.program(order).apply(&prepared)?;
        let shape = columns.shape;

        if affine || order == 1 {
            return Ok(main.map(move |d| {
                let lead = leading_shape(&d, order)?;
                to_arguments(d, &lead, order, &j, m, &shape)
            }));
        }
        if order > 2 {
            return Err(QuantumError::gradient_undefined(
                "qnode",
                "derivatives above second order need affine classical preprocessing",
            ));
        }

        // second order through nonlinear preprocessing also needs the gradient
        let hess = classical_hessian_all(&prepared)?;
        let mut h = Vec::with_capacity(n * m * m);
        for k in 0..n {
            for a in columns.range.clone() {
                h.extend(
                    columns
                        .range
                        .clone()
                        .map(|b| hess.data()[(k * inputs + a) * inputs + b]),
                );
            }
        }
        let first = self.program(1).apply(&prepared)?;
        let batch = BatchTransformResult::from_results(vec![main, first]);
        let traces = batch.traces().to_vec();
        Ok(TransformResult::new(traces, move |results| {
            let mut parts = batch.combine(results)?.into_iter();
            let (d2, d1) = match (parts.next(), parts.next()) {
                (Some(d2), Some(d1)) => (d2, d1),
                _ => return Err(QuantumError::shape_mismatch("missing derivative results")),
            };
            let lead = leading_shape(&d2, 2)?;
            let curvature = to_arguments(d2, &lead, 2, &j, m, &shape)?;
            let mut full_shape = lead.clone();
            full_shape.extend(shape.iter().chain(&shape));
            let correction = d1.contract_axis(lead.len(), &h, m * m)?.reshape(full_shape)?;
            curvature.add(&correction)
        }))
    }
}

/// Shape before the `order` trailing parameter dimensions
fn leading_shape(d: &Tensor, order: usize) -> Result<Vec<usize>> {
    if d.ndim() < order {
        return Err(QuantumError::shape_mismatch(format!(
            "derivative of order {} has only {} dimensions",
            order,
            d.ndim()
        )));
    }
    Ok(d.shape()[..d.ndim() - order].to_vec())
}

/// Contract each parameter dimension with the classical Jacobian
fn to_arguments(
    d: Tensor,
    lead: &[usize],
    order: usize,
    jacobian: &[f64],
    m: usize,
    arg_shape: &[usize],
) -> Result<Tensor> {
    let mut out = d;
    for axis in lead.len()..lead.len() + order {
        out = out.contract_axis(axis, jacobian, m)?;
    }
    let mut shape = lead.to_vec();
    for _ in 0..order {
        shape.extend_from_slice(arg_shape);
    }
    out.reshape(shape)
}

/// New trace values for `args`, if the recorded trace can follow them
fn substitute(recorded: &Recorded, args: &[Argument]) -> Option<Trace> {
    if recorded.args.len() != args.len() {
        return None;
    }
    let mut deltas = Vec::new();
    for (old, new) in recorded.args.iter().zip(args) {
        if old.shape() != new.shape()
            || old.requires_grad() != new.requires_grad()
            || old.is_batched() != new.is_batched()
        {
            return None;
        }
        if old.requires_grad() {
            deltas.extend(old.values().iter().zip(new.values()).map(|(a, b)| b - a));
        } else if old.values() != new.values() {
            return None;
        }
    }

    let trace = &recorded.trace;
    let mut values = Vec::with_capacity(trace.num_params());
    for var in trace.params() {
        if var.is_constant() {
            values.push(var.value());
            continue;
        }
        if !var.is_affine() {
            return None;
        }
        let shift: f64 = deltas
            .iter()
            .enumerate()
            .map(|(i, d)| var.partial(i) * d)
            .sum();
        values.push(var.value() + shift);
    }
    trace.with_parameters(&values).ok()
}

impl<F: QuantumFunction> InterfaceHook for QNode<F> {
    fn forward(&self, args: &[Argument]) -> Result<Tensor> {
        self.call(args)
    }

    fn backward(&self, args: &[Argument], cotangent: &Tensor) -> Result<Vec<Tensor>> {
        self.vjp(args, cotangent)
    }
}

impl<F> fmt::Debug for QNode<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QNode")
            .field("backend", &self.backend.name())
            .field("num_wires", &self.num_wires)
            .field("config", &self.config)
            .finish()
    }
}
