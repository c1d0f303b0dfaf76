//! Transform contract and composition
//!
//! A transform maps one trace to a list of traces plus a function that
//! combines the results of those traces into the result the original
//! trace would have produced. Transforms never modify their input.
//!
//! Composition follows one rule: if a first stage yields
//! `(traces1, combine1)` and a second stage turns each `traces1[i]` into
//! `(traces2_i, combine2_i)`, the composite is the concatenation of all
//! `traces2_i` with `combine1 ∘ [combine2_i]`. Results are routed back
//! through the inner combining functions first.
//!
//! ```
//! use qtape_core::{ops, Measurement, Operation, PauliWord, Tensor, Trace, TransformResult};
//!
//! let trace = Trace::new(
//!     1,
//!     vec![Operation::on(&ops::RX, [0.2], &[0]).unwrap()],
//!     vec![Measurement::expval(PauliWord::z(0))],
//! )
//! .unwrap();
//!
//! // duplicate, then average
//! let twice = TransformResult::new(vec![trace.clone(), trace], |r| {
//!     Tensor::linear_combination(&[0.5, 0.5], &r)
//! });
//! let composed = twice.then(|t| Ok(TransformResult::identity(t.clone()))).unwrap();
//! assert_eq!(composed.len(), 2);
//! let out = composed.combine(vec![Tensor::scalar(1.0), Tensor::scalar(3.0)]).unwrap();
//! assert_eq!(out.item(), Some(2.0));
//! ```

use crate::tensor::Tensor;
use crate::trace::Trace;
use crate::{QuantumError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Function folding the results of a transform's traces into one result
pub type CombineFn = Box<dyn Fn(Vec<Tensor>) -> Result<Tensor> + Send + Sync>;

/// Traces to execute plus the function that folds their results
pub struct TransformResult {
    traces: Vec<Trace>,
    combine: CombineFn,
}

impl TransformResult {
    /// Create a transform result
    pub fn new<F>(traces: Vec<Trace>, combine: F) -> Self
    where
        F: Fn(Vec<Tensor>) -> Result<Tensor> + Send + Sync + 'static,
    {
        Self {
            traces,
            combine: Box::new(combine),
        }
    }

    /// One trace, result passed through unchanged
    pub fn identity(trace: Trace) -> Self {
        Self::new(vec![trace], |mut results| Ok(results.remove(0)))
    }

    /// Get the traces
    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    /// Number of traces
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    /// Check if there are no traces
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Split into traces and combining function
    ///
    /// The returned function does not check arity; use
    /// [`TransformResult::combine`] where possible.
    pub fn into_parts(self) -> (Vec<Trace>, CombineFn) {
        (self.traces, self.combine)
    }

    /// Fold one result per trace into the combined result
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the number of results differs from the
    /// number of traces.
    pub fn combine(&self, results: Vec<Tensor>) -> Result<Tensor> {
        check_arity(self.traces.len(), results.len())?;
        (self.combine)(results)
    }

    /// Apply `stage` to every trace and compose
    pub fn then<F>(self, mut stage: F) -> Result<TransformResult>
    where
        F: FnMut(&Trace) -> Result<TransformResult>,
    {
        let mut traces = Vec::new();
        let mut inner = Vec::with_capacity(self.traces.len());
        for t in &self.traces {
            let (ts, combine) = stage(t)?.into_parts();
            inner.push((ts.len(), combine));
            traces.extend(ts);
        }
        let outer = self.combine;
        Ok(TransformResult::new(traces, move |results| {
            let mut results = results.into_iter();
            let mut folded = Vec::with_capacity(inner.len());
            for (count, combine) in &inner {
                let chunk: Vec<Tensor> = results.by_ref().take(*count).collect();
                check_arity(*count, chunk.len())?;
                folded.push(combine(chunk)?);
            }
            outer(folded)
        }))
    }

    /// Add a post-processing step applied to the combined result
    pub fn map<F>(self, f: F) -> TransformResult
    where
        F: Fn(Tensor) -> Result<Tensor> + Send + Sync + 'static,
    {
        let combine = self.combine;
        TransformResult::new(self.traces, move |results| f(combine(results)?))
    }
}

impl fmt::Debug for TransformResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformResult")
            .field("traces", &self.traces.len())
            .finish()
    }
}

fn check_arity(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(QuantumError::shape_mismatch(format!(
            "combining function expects {} results, got {}",
            expected, actual
        )));
    }
    Ok(())
}

/// Transform results for a batch of input traces
pub struct BatchTransformResult {
    traces: Vec<Trace>,
    parts: Vec<(usize, CombineFn)>,
}

impl BatchTransformResult {
    /// Concatenate the traces of several transform results
    pub fn from_results(results: Vec<TransformResult>) -> Self {
        let mut traces = Vec::new();
        let mut parts = Vec::with_capacity(results.len());
        for r in results {
            let (ts, combine) = r.into_parts();
            parts.push((ts.len(), combine));
            traces.extend(ts);
        }
        Self { traces, parts }
    }

    /// All traces to execute, in order
    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    /// Consume into the trace list
    pub fn into_traces(self) -> Vec<Trace> {
        self.traces
    }

    /// Fold the flat result list into one result per input trace
    pub fn combine(&self, results: Vec<Tensor>) -> Result<Vec<Tensor>> {
        check_arity(self.traces.len(), results.len())?;
        let mut results = results.into_iter();
        self.parts
            .iter()
            .map(|(count, combine)| combine(results.by_ref().take(*count).collect()))
            .collect()
    }
}

/// A transform applicable to a single trace
pub trait TraceTransform: Send + Sync {
    /// Name of the transform
    fn name(&self) -> &str;

    /// Apply the transform
    fn apply(&self, trace: &Trace) -> Result<TransformResult>;

    /// Description of the transform
    fn description(&self) -> Option<&str> {
        None
    }
}

/// Adapter turning a closure into a [`TraceTransform`]
pub struct FnTransform<F> {
    name: String,
    f: F,
}

impl<F> FnTransform<F>
where
    F: Fn(&Trace) -> Result<TransformResult> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> TraceTransform for FnTransform<F>
where
    F: Fn(&Trace) -> Result<TransformResult> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, trace: &Trace) -> Result<TransformResult> {
        (self.f)(trace)
    }
}

/// Ordered sequence of transforms
#[derive(Clone, Default)]
pub struct TransformProgram {
    stages: Vec<Arc<dyn TraceTransform>>,
}

impl TransformProgram {
    /// Create an empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn push(&mut self, stage: Arc<dyn TraceTransform>) {
        self.stages.push(stage);
    }

    /// Builder-style [`TransformProgram::push`]
    pub fn with(mut self, stage: Arc<dyn TraceTransform>) -> Self {
        self.push(stage);
        self
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if the program has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Names of the stages in application order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Apply every stage in order to one trace
    pub fn apply(&self, trace: &Trace) -> Result<TransformResult> {
        let mut result = TransformResult::identity(trace.clone());
        for stage in &self.stages {
            result = result.then(|t| stage.apply(t))?;
            log::debug!("stage '{}' produced {} traces", stage.name(), result.len());
        }
        Ok(result)
    }

    /// Apply the program to every trace of a batch
    pub fn apply_batch(&self, traces: &[Trace]) -> Result<BatchTransformResult> {
        let results = traces
            .iter()
            .map(|t| self.apply(t))
            .collect::<Result<Vec<_>>>()?;
        Ok(BatchTransformResult::from_results(results))
    }
}

impl fmt::Debug for TransformProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stage_names()).finish()
    }
}

/// Kind of a transform's extra argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Float,
    Int,
    Bool,
    Wires,
    Text,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamKind::Float => "float",
            ParamKind::Int => "int",
            ParamKind::Bool => "bool",
            ParamKind::Wires => "wires",
            ParamKind::Text => "text",
        };
        write!(f, "{}", s)
    }
}

/// Value of a transform's extra argument
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Wires(Vec<usize>),
    Text(String),
}

impl ArgValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ArgValue::Float(_) => ParamKind::Float,
            ArgValue::Int(_) => ParamKind::Int,
            ArgValue::Bool(_) => ParamKind::Bool,
            ArgValue::Wires(_) => ParamKind::Wires,
            ArgValue::Text(_) => ParamKind::Text,
        }
    }
}

/// One declared extra argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
}

/// Declared extra arguments of a transform entry point
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    params: Vec<ParamSpec>,
}

impl Signature {
    /// Signature without extra arguments
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required argument
    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Add an optional argument
    pub fn optional(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    /// Get the declared arguments
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Check call arguments against the declaration
    pub fn validate(&self, args: &TransformArgs) -> Result<()> {
        for (name, value) in &args.values {
            let spec = self
                .params
                .iter()
                .find(|p| &p.name == name)
                .ok_or_else(|| {
                    QuantumError::InvalidArgument(format!("unexpected argument '{}'", name))
                })?;
            if spec.kind != value.kind() {
                return Err(QuantumError::InvalidArgument(format!(
                    "argument '{}' must be {}, got {}",
                    name,
                    spec.kind,
                    value.kind()
                )));
            }
        }
        if let Some(missing) = self
            .params
            .iter()
            .find(|p| p.required && !args.values.contains_key(&p.name))
        {
            return Err(QuantumError::InvalidArgument(format!(
                "missing argument '{}'",
                missing.name
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", p.name, p.kind)?;
            if !p.required {
                write!(f, "?")?;
            }
        }
        Ok(())
    }
}

/// Named extra arguments passed to a transform
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransformArgs {
    values: BTreeMap<String, ArgValue>,
}

impl TransformArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion
    pub fn with(mut self, name: impl Into<String>, value: ArgValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Get a raw value
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Get a float argument
    pub fn float(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ArgValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get an integer argument
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get a boolean argument
    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ArgValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get a wire-list argument
    pub fn wires(&self, name: &str) -> Option<&[usize]> {
        match self.values.get(name) {
            Some(ArgValue::Wires(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Get a text argument
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Main entry point of a registered transform
pub type TransformFn = Arc<dyn Fn(&Trace, &TransformArgs) -> Result<TransformResult> + Send + Sync>;

/// Expand entry point of a registered transform, run before the main one
pub type ExpandFn = Arc<dyn Fn(&Trace, &TransformArgs) -> Result<Trace> + Send + Sync>;

/// Registration of a transform with its entry points
pub struct QuantumTransformBuilder {
    name: String,
    main: Option<(Signature, TransformFn)>,
    expand: Option<(Signature, ExpandFn)>,
}

impl QuantumTransformBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            main: None,
            expand: None,
        }
    }

    /// Set the main entry point
    pub fn transform<F>(mut self, signature: Signature, f: F) -> Self
    where
        F: Fn(&Trace, &TransformArgs) -> Result<TransformResult> + Send + Sync + 'static,
    {
        self.main = Some((signature, Arc::new(f)));
        self
    }

    /// Set the expand entry point
    pub fn expand<F>(mut self, signature: Signature, f: F) -> Self
    where
        F: Fn(&Trace, &TransformArgs) -> Result<Trace> + Send + Sync + 'static,
    {
        self.expand = Some((signature, Arc::new(f)));
        self
    }

    /// Register the transform
    ///
    /// # Errors
    /// Returns `SignatureMismatch` if the expand entry point declares
    /// different extra arguments than the main entry point, and
    /// `InvalidArgument` if no main entry point was given.
    pub fn build(self) -> Result<QuantumTransform> {
        let (signature, main) = self.main.ok_or_else(|| {
            QuantumError::InvalidArgument(format!(
                "transform '{}' has no main entry point",
                self.name
            ))
        })?;
        let expand = match self.expand {
            Some((expand_sig, _)) if expand_sig != signature => {
                return Err(QuantumError::SignatureMismatch {
                    transform: self.name,
                    expand: expand_sig.to_string(),
                    main: signature.to_string(),
                });
            }
            Some((_, f)) => Some(f),
            None => None,
        };
        log::debug!("registered transform '{}' ({})", self.name, signature);
        Ok(QuantumTransform {
            name: self.name,
            signature,
            main,
            expand,
        })
    }
}

/// A registered transform whose entry points agree in signature
#[derive(Clone)]
pub struct QuantumTransform {
    name: String,
    signature: Signature,
    main: TransformFn,
    expand: Option<ExpandFn>,
}

impl QuantumTransform {
    /// Start a registration
    pub fn builder(name: impl Into<String>) -> QuantumTransformBuilder {
        QuantumTransformBuilder::new(name)
    }

    /// Get the name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the declared signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Whether an expand entry point is registered
    pub fn has_expand(&self) -> bool {
        self.expand.is_some()
    }

    /// Validate arguments and fix them for later application
    pub fn bind(&self, args: TransformArgs) -> Result<BoundTransform> {
        self.signature.validate(&args)?;
        Ok(BoundTransform {
            transform: self.clone(),
            args,
        })
    }

    /// Expand (if registered) then transform
    pub fn apply(&self, trace: &Trace, args: &TransformArgs) -> Result<TransformResult> {
        self.signature.validate(args)?;
        self.apply_unchecked(trace, args)
    }

    fn apply_unchecked(&self, trace: &Trace, args: &TransformArgs) -> Result<TransformResult> {
        match &self.expand {
            Some(expand) => (self.main)(&expand(trace, args)?, args),
            None => (self.main)(trace, args),
        }
    }
}

impl fmt::Debug for QuantumTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantumTransform")
            .field("name", &self.name)
            .field("signature", &self.signature.to_string())
            .field("expand", &self.expand.is_some())
            .finish()
    }
}

/// A registered transform with its arguments fixed
#[derive(Debug, Clone)]
pub struct BoundTransform {
    transform: QuantumTransform,
    args: TransformArgs,
}

impl BoundTransform {
    pub fn args(&self) -> &TransformArgs {
        &self.args
    }
}

impl TraceTransform for BoundTransform {
    fn name(&self) -> &str {
        self.transform.name()
    }

    fn apply(&self, trace: &Trace) -> Result<TransformResult> {
        self.transform.apply_unchecked(trace, &self.args)
    }
}
