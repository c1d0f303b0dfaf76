//! Hook for external automatic-differentiation frameworks
//!
//! An adapter for a numerical framework registers a custom primitive
//! whose forward pass calls [`InterfaceHook::forward`] and whose
//! backward pass calls [`InterfaceHook::backward`] with the incoming
//! cotangent. Values cross the boundary as [`Tensor`]s shaped exactly
//! like the binding's folded outputs.

use qtape_core::{Argument, Result, Tensor};

/// Forward and backward entry points of a differentiable circuit
pub trait InterfaceHook: Send + Sync {
    /// Evaluate the circuit
    fn forward(&self, args: &[Argument]) -> Result<Tensor>;

    /// Vector-Jacobian product of `cotangent` with the circuit output
    ///
    /// Returns one tensor per argument, shaped like the argument;
    /// non-differentiable arguments receive zeros.
    fn backward(&self, args: &[Argument], cotangent: &Tensor) -> Result<Vec<Tensor>>;
}
