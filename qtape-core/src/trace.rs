//! Circuit traces
//!
//! A [`Trace`] is the immutable record produced by running a quantum
//! function once: operations in program order, measurements, the register
//! size, the default shot configuration and the layout of the call
//! arguments the parameters were traced from.
//!
//! There are no mutators. Every rewrite (`with_parameters`,
//! `with_operations`, `with_shots`, ...) returns a new trace, so a trace
//! handed to a transform or a backend is never changed behind its back.
//!
//! Parameters are indexed by flattening the parameter lists of all
//! operations in order.

use crate::fingerprint::Fingerprint;
use crate::measurement::Measurement;
use crate::operation::Operation;
use crate::shots::Shots;
use crate::tensor::Tensor;
use crate::var::Var;
use crate::wire::Wire;
use crate::{QuantumError, Result};
use std::fmt;
use std::ops::Range;

/// Where one call argument's entries live among the seeded inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSlot {
    /// Shape of the argument (without a batch dimension)
    pub shape: Vec<usize>,
    /// Index of the first seeded input, `None` if not differentiable
    pub offset: Option<usize>,
}

impl ArgSlot {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check if the argument has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Layout of the call arguments a trace was recorded from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgumentLayout {
    args: Vec<ArgSlot>,
}

impl ArgumentLayout {
    pub fn new(args: Vec<ArgSlot>) -> Self {
        Self { args }
    }

    /// Number of call arguments
    pub fn num_args(&self) -> usize {
        self.args.len()
    }

    /// Total number of seeded (differentiable) entries
    pub fn num_inputs(&self) -> usize {
        self.args
            .iter()
            .filter(|a| a.offset.is_some())
            .map(ArgSlot::len)
            .sum()
    }

    /// Get one argument's slot
    pub fn arg(&self, argnum: usize) -> Option<&ArgSlot> {
        self.args.get(argnum)
    }

    /// Seeded input indices of argument `argnum`, `None` if not differentiable
    pub fn slots(&self, argnum: usize) -> Option<Range<usize>> {
        let arg = self.args.get(argnum)?;
        arg.offset.map(|o| o..o + arg.len())
    }

    /// Indices of the differentiable arguments
    pub fn differentiable_args(&self) -> Vec<usize> {
        self.args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.offset.is_some())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Immutable record of a circuit's operations and measurements
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    operations: Vec<Operation>,
    measurements: Vec<Measurement>,
    num_wires: usize,
    shots: Shots,
    layout: ArgumentLayout,
}

impl Trace {
    /// Create a trace
    ///
    /// # Errors
    /// Returns error if the register is empty, no measurement is given or
    /// an operation or measurement addresses a wire outside the register.
    pub fn new(
        num_wires: usize,
        operations: Vec<Operation>,
        measurements: Vec<Measurement>,
    ) -> Result<Self> {
        if num_wires == 0 {
            return Err(QuantumError::InvalidTrace(
                "trace needs at least one wire".to_string(),
            ));
        }
        let trace = Self {
            operations,
            measurements,
            num_wires,
            shots: Shots::Analytic,
            layout: ArgumentLayout::default(),
        };
        trace.validate()?;
        Ok(trace)
    }

    fn check_wire(&self, wire: Wire) -> Result<()> {
        if wire.index() >= self.num_wires {
            return Err(QuantumError::InvalidWire {
                wire: wire.index(),
                num_wires: self.num_wires,
            });
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.measurements.is_empty() {
            return Err(QuantumError::InvalidTrace(
                "trace has no measurements".to_string(),
            ));
        }
        for op in &self.operations {
            for &w in op.wires() {
                self.check_wire(w)?;
            }
        }
        for m in &self.measurements {
            for &w in m.wires() {
                self.check_wire(w)?;
            }
        }
        Ok(())
    }

    /// Get the operations
    #[inline]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Get the measurements
    #[inline]
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Number of wires in the register
    #[inline]
    pub fn num_wires(&self) -> usize {
        self.num_wires
    }

    /// Default shot configuration
    #[inline]
    pub fn shots(&self) -> &Shots {
        &self.shots
    }

    /// Layout of the call arguments
    #[inline]
    pub fn layout(&self) -> &ArgumentLayout {
        &self.layout
    }

    /// All traced parameters, flattened over operations
    pub fn params(&self) -> impl Iterator<Item = &Var> + '_ {
        self.operations.iter().flat_map(|op| op.params().iter())
    }

    /// Total number of parameters
    pub fn num_params(&self) -> usize {
        self.operations.iter().map(Operation::num_params).sum()
    }

    /// Bound parameter values, flattened
    pub fn parameters(&self) -> Vec<f64> {
        self.params().map(Var::value).collect()
    }

    /// Flat indices of the trainable parameters
    pub fn trainable_params(&self) -> Vec<usize> {
        self.params()
            .enumerate()
            .filter(|(_, p)| p.is_trainable())
            .map(|(i, _)| i)
            .collect()
    }

    /// `(operation index, parameter index)` of flat parameter `index`
    pub fn param_location(&self, index: usize) -> Option<(usize, usize)> {
        let mut remaining = index;
        for (i, op) in self.operations.iter().enumerate() {
            if remaining < op.num_params() {
                return Some((i, remaining));
            }
            remaining -= op.num_params();
        }
        None
    }

    /// Traced parameter at flat `index`
    pub fn param(&self, index: usize) -> Option<&Var> {
        self.param_location(index)
            .map(|(o, p)| &self.operations[o].params()[p])
    }

    /// Same structure with every parameter value replaced
    pub fn with_parameters(&self, values: &[f64]) -> Result<Trace> {
        if values.len() != self.num_params() {
            return Err(QuantumError::InvalidArgument(format!(
                "trace has {} parameters, {} values given",
                self.num_params(),
                values.len()
            )));
        }
        let mut offset = 0;
        let mut operations = Vec::with_capacity(self.operations.len());
        for op in &self.operations {
            let n = op.num_params();
            operations.push(op.with_param_values(&values[offset..offset + n])?);
            offset += n;
        }
        Ok(Trace {
            operations,
            ..self.clone()
        })
    }

    /// Same structure with flat parameter `index` set to `value`
    pub fn with_parameter(&self, index: usize, value: f64) -> Result<Trace> {
        let (o, p) = self.param_location(index).ok_or_else(|| {
            QuantumError::InvalidArgument(format!("parameter index {} out of range", index))
        })?;
        let mut trace = self.clone();
        trace.operations[o] = self.operations[o].with_param(p, value);
        Ok(trace)
    }

    /// Same measurements and configuration, different operations
    pub fn with_operations(&self, operations: Vec<Operation>) -> Result<Trace> {
        let trace = Trace {
            operations,
            ..self.clone()
        };
        trace.validate()?;
        Ok(trace)
    }

    /// Same operations and configuration, different measurements
    pub fn with_measurements(&self, measurements: Vec<Measurement>) -> Result<Trace> {
        let trace = Trace {
            measurements,
            ..self.clone()
        };
        trace.validate()?;
        Ok(trace)
    }

    /// Same trace with a different default shot configuration
    pub fn with_shots(&self, shots: Shots) -> Trace {
        Trace {
            shots,
            ..self.clone()
        }
    }

    /// Same trace recorded from a different argument layout
    pub fn with_layout(&self, layout: ArgumentLayout) -> Trace {
        Trace {
            layout,
            ..self.clone()
        }
    }

    /// Mark exactly the parameters at the given flat indices as trainable
    pub fn with_trainable_params(&self, indices: &[usize]) -> Result<Trace> {
        let total = self.num_params();
        let mut flags = vec![false; total];
        for &i in indices {
            if i >= total {
                return Err(QuantumError::InvalidArgument(format!(
                    "parameter index {} out of range for {} parameters",
                    i, total
                )));
            }
            flags[i] = true;
        }
        let mut offset = 0;
        let operations = self
            .operations
            .iter()
            .map(|op| {
                let n = op.num_params();
                let op = op.with_trainability(&flags[offset..offset + n]);
                offset += n;
                op
            })
            .collect();
        Ok(Trace {
            operations,
            ..self.clone()
        })
    }

    /// Result shape of each measurement for one shot batch
    pub fn measurement_shapes(&self, shots: Option<u64>) -> Result<Vec<Vec<usize>>> {
        self.measurements
            .iter()
            .map(|m| m.output_shape(self.num_wires, shots))
            .collect()
    }

    fn batch_shape(&self, shots: Option<u64>) -> Result<Vec<usize>> {
        Ok(packed_shape(&self.measurement_shapes(shots)?))
    }

    /// Shape of the packed result under the trace's own shot configuration
    pub fn output_shape(&self) -> Result<Vec<usize>> {
        let batches = self.shots.batches();
        let first = self.batch_shape(batches[0])?;
        if batches.len() == 1 {
            return Ok(first);
        }
        for &b in &batches[1..] {
            if self.batch_shape(b)? != first {
                return Err(QuantumError::shape_mismatch(
                    "shot batches of different size give differently shaped samples",
                ));
            }
        }
        let mut shape = vec![batches.len()];
        shape.extend(first);
        Ok(shape)
    }

    /// Pack per-measurement results into the trace's output tensor
    ///
    /// `per_batch` holds one result per measurement for each shot batch.
    /// One measurement gives its own tensor, several of equal shape are
    /// stacked, otherwise they are concatenated flat. A partitioned shot
    /// configuration adds a leading batch dimension.
    pub fn pack_results(&self, per_batch: Vec<Vec<Tensor>>) -> Result<Tensor> {
        let batches = self.shots.batches();
        if per_batch.len() != batches.len() {
            return Err(QuantumError::shape_mismatch(format!(
                "expected results for {} shot batches, got {}",
                batches.len(),
                per_batch.len()
            )));
        }
        let mut packed = Vec::with_capacity(batches.len());
        for (results, shots) in per_batch.into_iter().zip(batches.iter()) {
            let shapes = self.measurement_shapes(*shots)?;
            if results.len() != shapes.len() {
                return Err(QuantumError::shape_mismatch(format!(
                    "expected {} measurement results, got {}",
                    shapes.len(),
                    results.len()
                )));
            }
            for (r, s) in results.iter().zip(&shapes) {
                if r.shape() != s.as_slice() {
                    return Err(QuantumError::shape_mismatch(format!(
                        "measurement result has shape {:?}, expected {:?}",
                        r.shape(),
                        s
                    )));
                }
            }
            packed.push(pack_batch(results, &shapes)?);
        }
        if packed.len() == 1 {
            Ok(packed.remove(0))
        } else {
            Tensor::stack(&packed)
        }
    }

    /// Split a packed output tensor into per-batch, per-measurement results
    pub fn unpack_result(&self, result: &Tensor) -> Result<Vec<Vec<Tensor>>> {
        let expected = self.output_shape()?;
        if result.shape() != expected.as_slice() {
            return Err(QuantumError::shape_mismatch(format!(
                "result has shape {:?}, trace produces {:?}",
                result.shape(),
                expected
            )));
        }
        let batches = self.shots.batches();
        let parts = if batches.len() == 1 {
            vec![result.clone()]
        } else {
            result.unstack()?
        };
        parts
            .iter()
            .zip(batches.iter())
            .map(|(part, shots)| unpack_batch(part, &self.measurement_shapes(*shots)?))
            .collect()
    }

    /// Compare operations, measurements and register size
    ///
    /// Trainability markings and the argument layout are ignored.
    pub fn structurally_equal(&self, other: &Trace) -> bool {
        self.num_wires == other.num_wires
            && self.measurements == other.measurements
            && self.operations.len() == other.operations.len()
            && self
                .operations
                .iter()
                .zip(&other.operations)
                .all(|(a, b)| a.structurally_equal(b))
    }

    /// Cache key of this trace
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(self)
    }
}

fn packed_shape(shapes: &[Vec<usize>]) -> Vec<usize> {
    match shapes {
        [single] => single.clone(),
        [first, rest @ ..] if rest.iter().all(|s| s == first) => {
            let mut shape = vec![shapes.len()];
            shape.extend_from_slice(first);
            shape
        }
        _ => vec![shapes.iter().map(|s| s.iter().product::<usize>()).sum()],
    }
}

fn pack_batch(mut results: Vec<Tensor>, shapes: &[Vec<usize>]) -> Result<Tensor> {
    match shapes {
        [_] => Ok(results.remove(0)),
        [first, rest @ ..] if rest.iter().all(|s| s == first) => Tensor::stack(&results),
        _ => Ok(Tensor::concat_flat(&results)),
    }
}

fn unpack_batch(packed: &Tensor, shapes: &[Vec<usize>]) -> Result<Vec<Tensor>> {
    match shapes {
        [_] => Ok(vec![packed.clone()]),
        [first, rest @ ..] if rest.iter().all(|s| s == first) => packed.unstack(),
        _ => {
            let mut offset = 0;
            let mut out = Vec::with_capacity(shapes.len());
            for s in shapes {
                let n: usize = s.iter().product();
                out.push(Tensor::new(
                    s.clone(),
                    packed.data()[offset..offset + n].to_vec(),
                )?);
                offset += n;
            }
            Ok(out)
        }
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Trace({} wires, {} operations, {})",
            self.num_wires,
            self.operations.len(),
            self.shots
        )?;
        for op in &self.operations {
            writeln!(f, "  {}", op)?;
        }
        for m in &self.measurements {
            writeln!(f, "  {}", m)?;
        }
        Ok(())
    }
}
