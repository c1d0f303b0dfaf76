//! Core types for QTape circuit traces
//!
//! This crate provides the intermediate representation every other QTape
//! crate works on:
//! - [`Var`]: traced scalars carrying the classical-preprocessing relation
//! - [`Operation`] and [`OperationDef`]: recorded operations with explicit
//!   capability fields (generator, gradient recipe, decompositions)
//! - [`Measurement`] and [`Observable`]: what a trace returns
//! - [`Trace`]: the immutable record of one run of a quantum function
//! - [`TransformResult`] and [`TraceTransform`]: the transform contract
//!
//! # Example
//! ```
//! use qtape_core::{ops, trace_function, Argument, PauliWord, Recorder, Shots, TracedArg};
//!
//! fn circuit(q: &mut Recorder, args: &[TracedArg]) -> qtape_core::Result<()> {
//!     q.apply(&ops::RX, [args[0][0].clone()], &[0])?;
//!     q.apply(&ops::CNOT, Vec::<f64>::new(), &[0, 1])?;
//!     q.expval(PauliWord::z(1))
//! }
//!
//! let trace = trace_function(&circuit, &[Argument::scalar(0.5)], 2, Shots::Analytic).unwrap();
//! assert_eq!(trace.operations().len(), 2);
//! ```

pub mod error;
pub mod expand;
pub mod fingerprint;
pub mod measurement;
pub mod observable;
pub mod operation;
pub mod ops;
pub mod recipe;
pub mod recorder;
pub mod shots;
pub mod tensor;
pub mod trace;
pub mod transform;
pub mod var;
pub mod wire;

// Re-exports for convenience
pub use error::QuantumError;
pub use expand::{expand, expand_fn, Criterion, Expansion};
pub use fingerprint::Fingerprint;
pub use measurement::{Measurement, ReturnType};
pub use num_complex::Complex64;
pub use observable::{Hamiltonian, Observable, Pauli, PauliWord};
pub use operation::{GradMethod, Generator, Operation, OperationDef, RecipeRule};
pub use recipe::{GradientRecipe, ShiftTerm};
pub use recorder::{
    trace_function, trace_function_with_order, Argument, QuantumFunction, Recorder, TracedArg,
};
pub use shots::{ShotBatch, Shots};
pub use tensor::Tensor;
pub use trace::{ArgSlot, ArgumentLayout, Trace};
pub use transform::{
    ArgValue, BatchTransformResult, FnTransform, ParamKind, QuantumTransform, Signature,
    TraceTransform, TransformArgs, TransformProgram, TransformResult,
};
pub use var::Var;
pub use wire::{Wire, Wires};

/// Type alias for results in QTape
pub type Result<T> = std::result::Result<T, QuantumError>;
