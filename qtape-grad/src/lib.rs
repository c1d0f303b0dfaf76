//! Differentiation of QTape circuit traces
//!
//! This crate turns a trace into derivative transforms:
//!
//! - **Parameter shift**: analytic derivatives from per-operation gradient
//!   recipes, central differences for numeric operations
//! - **Finite differences**: forward, backward and central
//! - **Higher orders**: [`DifferentiationEngine`] composes the first-order
//!   transform with itself up to a configured maximum order
//! - **Gradient expansion**: trainable operations without a recipe are
//!   decomposed, choosing among decompositions with a pluggable cost
//! - **Classical preprocessing**: Jacobian and Hessian of gate parameters
//!   with respect to call arguments, and frequency spectra
//!
//! Derivative transforms follow the transform contract: executing their
//! traces and combining the results gives the derivative, with one
//! trailing dimension per derivative order.
//!
//! # Example
//!
//! ```
//! use qtape_core::{ops, Measurement, Operation, PauliWord, Tensor, Trace, Var};
//! use qtape_grad::{param_shift, ParamShiftConfig};
//!
//! let theta = 0.4;
//! let trace = Trace::new(
//!     1,
//!     vec![Operation::on(&ops::RY, [Var::trainable(theta)], &[0]).unwrap()],
//!     vec![Measurement::expval(PauliWord::z(0))],
//! )
//! .unwrap();
//!
//! let gradient = param_shift(&trace, &ParamShiftConfig::default()).unwrap();
//! // ⟨Z⟩ = cos θ at each shifted angle
//! let results = gradient
//!     .traces()
//!     .iter()
//!     .map(|t| Tensor::scalar(t.parameters()[0].cos()))
//!     .collect();
//! let d = gradient.combine(results).unwrap();
//! assert!((d.data()[0] + theta.sin()).abs() < 1e-12);
//! ```

pub mod classical;
pub mod cost;
pub mod engine;
pub mod expansion;
pub mod finite_diff;
pub mod param_shift;
pub mod spectrum;

pub use classical::{classical_hessian, classical_hessian_all, classical_jacobian, classical_jacobian_all};
pub use cost::{DecompositionCost, DifferentiableOpCount};
pub use engine::{DifferentiationEngine, GradientMethod, DEFAULT_MAX_ORDER};
pub use expansion::expand_for_gradient;
pub use finite_diff::{finite_diff, FiniteDiffConfig, FiniteDiffMethod};
pub use param_shift::{param_shift, param_shift_transform, ParamShiftConfig, DEFAULT_GRADIENT_DEPTH};
pub use spectrum::spectrum;
