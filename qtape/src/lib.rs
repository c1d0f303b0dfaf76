//! # QTape
//!
//! Differentiable quantum circuits from ordinary Rust functions.
//!
//! A quantum function records operations and measurements on a
//! [`Recorder`]. A [`QNode`] binds it to an execution backend: each call
//! traces the function, rewrites the trace for the backend, optionally
//! differentiates it, and executes everything as one batch.
//!
//! ## Crates
//!
//! - [`qtape_core`]: traces, operations, the transform contract
//! - [`qtape_backend`]: backends, batched dispatch, result caching
//! - [`qtape_grad`]: parameter-shift and finite-difference derivatives
//!
//! ## Example
//!
//! ```
//! use qtape::{ops, Argument, PauliWord, QNode, QNodeConfig, Recorder, StateVectorBackend, TracedArg};
//! use std::sync::Arc;
//!
//! fn circuit(q: &mut Recorder, args: &[TracedArg]) -> qtape::Result<()> {
//!     let x = &args[0];
//!     q.apply(&ops::RX, [x[0].clone()], &[0])?;
//!     q.apply(&ops::RY, [&x[1] * 2.0], &[1])?;
//!     q.apply(&ops::CNOT, Vec::<f64>::new(), &[0, 1])?;
//!     q.expval(PauliWord::z(1))
//! }
//!
//! let backend = Arc::new(StateVectorBackend::new(2));
//! let qnode = QNode::new(circuit, backend, 2, QNodeConfig::second_order()).unwrap();
//!
//! let args = [Argument::vector(vec![0.4, 0.1])];
//! let value = qnode.call(&args).unwrap();
//! let jacobian = qnode.jacobian(&args, 0).unwrap();
//! let hessian = qnode.hessian(&args, 0).unwrap();
//! assert_eq!(value.shape(), &[] as &[usize]);
//! assert_eq!(jacobian.shape(), &[2]);
//! assert_eq!(hessian.shape(), &[2, 2]);
//! ```

pub mod batch;
pub mod config;
pub mod interface;
pub mod qnode;

pub use batch::{batch_params, batch_size, stack_batch, unbatch_arguments};
pub use config::{CallOptions, DiffMethod, ExpansionStrategy, QNodeConfig};
pub use interface::InterfaceHook;
pub use qnode::QNode;

pub use qtape_backend::{execute_batch, QuantumBackend, StateVectorBackend, StateVectorConfig};
pub use qtape_core::{
    ops, trace_function, Argument, Hamiltonian, Measurement, Operation, PauliWord, QuantumError,
    QuantumFunction, Recorder, Result, Shots, Tensor, Trace, TracedArg, TransformResult, Var,
};
pub use qtape_grad::{DifferentiationEngine, GradientMethod};
