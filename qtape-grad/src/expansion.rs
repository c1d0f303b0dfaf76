//! Expansion of trainable operations the gradient cannot handle directly
//!
//! A trainable operation is differentiable as is when it declares a
//! numeric method or every parameter has an analytic recipe (explicit or
//! derived from its generator). Anything else is decomposed, choosing the
//! cheapest decomposition under a [`DecompositionCost`], until it is or
//! the depth bound is reached.

use crate::cost::DecompositionCost;
use qtape_core::{Operation, QuantumError, Result, Trace};

/// Rewrite a trace so that every trainable operation can be differentiated
///
/// Non-trainable operations are never expanded; the backend's own
/// decomposition deals with them after differentiation.
///
/// # Errors
/// Returns `GradientUndefined` if a trainable operation has no gradient
/// and no decomposition leading to one within `depth` levels.
pub fn expand_for_gradient(trace: &Trace, depth: usize, cost: &dyn DecompositionCost) -> Result<Trace> {
    if trace
        .operations()
        .iter()
        .all(|op| !op.is_trainable() || op.has_own_gradient())
    {
        return Ok(trace.clone());
    }

    let mut ops = Vec::with_capacity(trace.operations().len());
    for op in trace.operations() {
        expand_operation(op, depth, cost, &mut ops)?;
    }
    log::debug!(
        "gradient expansion: {} -> {} operations",
        trace.operations().len(),
        ops.len()
    );
    trace.with_operations(ops)
}

fn expand_operation(
    op: &Operation,
    depth: usize,
    cost: &dyn DecompositionCost,
    out: &mut Vec<Operation>,
) -> Result<()> {
    if !op.is_trainable() || op.has_own_gradient() {
        out.push(op.clone());
        return Ok(());
    }
    if depth == 0 {
        return Err(QuantumError::gradient_undefined(
            op.name(),
            "no gradient recipe within the expansion depth",
        ));
    }
    for sub in cheapest_decomposition(op, cost)? {
        expand_operation(&sub, depth - 1, cost, out)?;
    }
    Ok(())
}

/// Decomposition with the lowest cost, the first one on ties
fn cheapest_decomposition(op: &Operation, cost: &dyn DecompositionCost) -> Result<Vec<Operation>> {
    let mut best: Option<(usize, Vec<Operation>)> = None;
    for choice in 0..op.decompositions().len() {
        let candidate = match op.decompose_with(choice) {
            Some(c) => c?,
            None => continue,
        };
        let c = cost.cost(&candidate);
        if best.as_ref().map_or(true, |(b, _)| c < *b) {
            best = Some((c, candidate));
        }
    }
    match best {
        Some((c, ops)) => {
            log::trace!("decomposing {} for differentiation (cost {})", op.name(), c);
            Ok(ops)
        }
        None => Err(QuantumError::gradient_undefined(
            op.name(),
            "no gradient recipe and no decomposition",
        )),
    }
}
