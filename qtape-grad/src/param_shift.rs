//! Parameter-shift differentiation
//!
//! For every selected trainable parameter the gradient recipe of its
//! operation is evaluated at the bound values, and one shifted trace is
//! built per recipe term. The combining function forms each parameter's
//! derivative as the recipe's linear combination of the shifted results
//! and stacks the derivatives along a new trailing dimension:
//!
//! ∂f/∂θ = Σ cᵢ · f(aᵢ·θ + sᵢ)
//!
//! Expectation values and probabilities are linear in the state, so the
//! rule applies to them directly. The variance of a Pauli word A satisfies
//! A² = I, hence var = 1 − ⟨A⟩² and ∂var = −2⟨A⟩ ∂⟨A⟩; the shifted traces
//! measure ⟨A⟩ instead and one unshifted trace supplies ⟨A⟩ itself.

use crate::cost::DifferentiableOpCount;
use crate::expansion::expand_for_gradient;
use qtape_core::{
    GradMethod, GradientRecipe, ParamKind, QuantumError, QuantumTransform, Result, ReturnType,
    Signature, Tensor, Trace, TransformResult,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Expansion depth used when a registered transform is called without one
pub const DEFAULT_GRADIENT_DEPTH: usize = 10;

/// Configuration for parameter-shift differentiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamShiftConfig {
    /// Positions in the trainable-parameter list to differentiate; all when `None`
    pub argnum: Option<Vec<usize>>,
    /// Step of the central difference used for operations with a numeric method
    pub h: f64,
    /// Build the shifted traces of different parameters in parallel
    pub parallel: bool,
}

impl Default for ParamShiftConfig {
    fn default() -> Self {
        Self {
            argnum: None,
            h: 1e-7,
            parallel: true,
        }
    }
}

/// Flat indices of the parameters to differentiate
pub(crate) fn select_params(trace: &Trace, argnum: Option<&[usize]>) -> Result<Vec<usize>> {
    let trainable = trace.trainable_params();
    match argnum {
        None => Ok(trainable),
        Some(positions) => positions
            .iter()
            .map(|&i| {
                trainable.get(i).copied().ok_or_else(|| {
                    QuantumError::InvalidArgument(format!(
                        "trainable parameter {} out of range for {} trainable parameters",
                        i,
                        trainable.len()
                    ))
                })
            })
            .collect(),
    }
}

/// Reject measurements without a derivative
pub(crate) fn check_measurements(trace: &Trace) -> Result<()> {
    for m in trace.measurements() {
        if matches!(m.return_type(), ReturnType::State | ReturnType::Sample) {
            return Err(QuantumError::gradient_undefined(
                m.return_type().to_string(),
                "measurement has no parameter derivative",
            ));
        }
    }
    Ok(())
}

fn recipe_for(trace: &Trace, index: usize, h: f64) -> Result<GradientRecipe> {
    let (o, p) = trace.param_location(index).ok_or_else(|| {
        QuantumError::InvalidArgument(format!("parameter index {} out of range", index))
    })?;
    let op = &trace.operations()[o];
    if let Some(recipe) = op.gradient_recipe(p) {
        return Ok(recipe);
    }
    match op.grad_method() {
        GradMethod::Numeric => Ok(GradientRecipe::central_difference(h)),
        _ => Err(QuantumError::gradient_undefined(
            op.name(),
            "no gradient recipe; expand the trace for differentiation first",
        )),
    }
}

/// Positions of variance measurements, which must be of Pauli words
fn variance_positions(trace: &Trace) -> Result<Vec<usize>> {
    let mut positions = Vec::new();
    for (i, m) in trace.measurements().iter().enumerate() {
        if m.return_type() != ReturnType::Variance {
            continue;
        }
        if m.observable().map_or(false, |o| o.is_hamiltonian()) {
            return Err(QuantumError::gradient_undefined(
                "var",
                "the square of a Hamiltonian is not the identity",
            ));
        }
        positions.push(i);
    }
    Ok(positions)
}

/// Same trace with every variance measured as an expectation value
fn expectation_trace(trace: &Trace) -> Result<Trace> {
    trace.with_measurements(
        trace
            .measurements()
            .iter()
            .map(|m| match m.return_type() {
                ReturnType::Variance => m.with_return_type(ReturnType::Expectation),
                _ => m.clone(),
            })
            .collect(),
    )
}

/// ∂var = −2⟨A⟩ ∂⟨A⟩ for the variance positions of a packed derivative
fn chain_variance(base: &Trace, derivative: &Tensor, mean: &Tensor, positions: &[usize]) -> Result<Tensor> {
    let mut derivative = base.unpack_result(derivative)?;
    let mean = base.unpack_result(mean)?;
    for (batch, m) in derivative.iter_mut().zip(&mean) {
        for &j in positions {
            batch[j] = batch[j].mul(&m[j])?.scale(-2.0);
        }
    }
    base.pack_results(derivative)
}

struct Column {
    start: usize,
    coeffs: Vec<f64>,
}

/// Parameter-shift gradient transform
///
/// The combined result has the trace's output shape plus a trailing
/// dimension with one entry per selected parameter.
///
/// # Errors
/// Returns `GradientUndefined` for state or sample measurements, for the
/// variance of a Hamiltonian and for selected parameters whose operation
/// has no recipe.
pub fn param_shift(trace: &Trace, config: &ParamShiftConfig) -> Result<TransformResult> {
    check_measurements(trace)?;
    let selected = select_params(trace, config.argnum.as_deref())?;
    let variance = variance_positions(trace)?;
    let base = if variance.is_empty() {
        trace.clone()
    } else {
        expectation_trace(trace)?
    };

    let recipes = selected
        .iter()
        .map(|&p| recipe_for(trace, p, config.h))
        .collect::<Result<Vec<_>>>()?;

    let shift = |p: usize, recipe: &GradientRecipe| -> Result<Vec<Trace>> {
        let value = trace.param(p).map_or(0.0, |v| v.value());
        recipe
            .terms()
            .iter()
            .map(|term| base.with_parameter(p, term.shifted_value(value)))
            .collect()
    };
    let shifted: Vec<Vec<Trace>> = if config.parallel && selected.len() > 1 {
        selected
            .par_iter()
            .zip(recipes.par_iter())
            .map(|(&p, r)| shift(p, r))
            .collect::<Result<_>>()?
    } else {
        selected
            .iter()
            .zip(&recipes)
            .map(|(&p, r)| shift(p, r))
            .collect::<Result<_>>()?
    };

    let mut traces = Vec::with_capacity(shifted.iter().map(Vec::len).sum::<usize>() + 1);
    let mut columns = Vec::with_capacity(selected.len());
    for (recipe, ts) in recipes.iter().zip(shifted) {
        columns.push(Column {
            start: traces.len(),
            coeffs: recipe.terms().iter().map(|t| t.coeff).collect(),
        });
        traces.extend(ts);
    }
    let with_mean = !variance.is_empty() && !columns.is_empty();
    if with_mean {
        traces.push(base.clone());
    }
    log::debug!(
        "parameter shift: {} parameters, {} shifted traces",
        selected.len(),
        traces.len()
    );

    let out_shape = trace.output_shape()?;
    let expected = traces.len();
    Ok(TransformResult::new(traces, move |results| {
        if results.len() != expected {
            return Err(QuantumError::shape_mismatch(format!(
                "parameter shift expects {} results, got {}",
                expected,
                results.len()
            )));
        }
        if columns.is_empty() {
            let mut shape = out_shape.clone();
            shape.push(0);
            return Ok(Tensor::zeros(shape));
        }
        let mean = if with_mean { results.last() } else { None };
        let mut derivatives = Vec::with_capacity(columns.len());
        for col in &columns {
            let d = if col.coeffs.is_empty() {
                Tensor::zeros(out_shape.clone())
            } else {
                Tensor::linear_combination(
                    &col.coeffs,
                    &results[col.start..col.start + col.coeffs.len()],
                )?
            };
            derivatives.push(match mean {
                Some(m) => chain_variance(&base, &d, m, &variance)?,
                None => d,
            });
        }
        Tensor::stack_trailing(&derivatives)
    }))
}

/// The parameter-shift rule as a registered transform
///
/// Its expand entry point runs [`expand_for_gradient`] with the default
/// cost; both entry points accept `h` and `expansion_depth`.
pub fn param_shift_transform() -> Result<QuantumTransform> {
    let signature = Signature::new()
        .optional("h", ParamKind::Float)
        .optional("expansion_depth", ParamKind::Int);
    QuantumTransform::builder("param_shift")
        .expand(signature.clone(), |trace, args| {
            let depth = match args.int("expansion_depth") {
                Some(d) => usize::try_from(d).map_err(|_| {
                    QuantumError::InvalidArgument(format!("negative expansion depth {}", d))
                })?,
                None => DEFAULT_GRADIENT_DEPTH,
            };
            expand_for_gradient(trace, depth, &DifferentiableOpCount)
        })
        .transform(signature, |trace, args| {
            let mut config = ParamShiftConfig::default();
            if let Some(h) = args.float("h") {
                config.h = h;
            }
            param_shift(trace, &config)
        })
        .build()
}
