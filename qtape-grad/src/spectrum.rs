//! Frequency spectra of circuit outputs
//!
//! A gate U(c·x) = exp(-i·c·x·G) contributes the eigenvalue differences of
//! G, scaled by c, to the frequencies with which the circuit output can
//! oscillate in x. Several gates depending on the same input entry add
//! their frequency sets: every sum of one frequency from each gate is a
//! possible frequency of the output.

use crate::param_shift::DEFAULT_GRADIENT_DEPTH;
use qtape_core::expand::{has_gen, is_trainable};
use qtape_core::{expand, QuantumError, Result, Trace};

/// Frequencies are rounded to `1 / SCALE` before deduplication
const SCALE: f64 = 1e8;

fn round(f: f64) -> f64 {
    let r = (f * SCALE).round() / SCALE;
    // avoid -0.0 in the output
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

fn normalize(mut freqs: Vec<f64>) -> Vec<f64> {
    for f in &mut freqs {
        *f = round(*f);
    }
    freqs.sort_by(f64::total_cmp);
    freqs.dedup();
    freqs
}

/// Frequency set of the output in each entry of argument `argnum`
///
/// Returns one sorted set per argument entry, in row-major order. Entries
/// that no gate depends on have the spectrum `{0}`.
///
/// # Errors
/// Returns `SpectrumUndefined` if a gate depends non-affinely on the
/// argument or has no generator after expansion, and `InvalidArgument`
/// if the argument does not exist or is not differentiable.
pub fn spectrum(trace: &Trace, argnum: usize) -> Result<Vec<Vec<f64>>> {
    let range = trace.layout().slots(argnum).ok_or_else(|| {
        QuantumError::InvalidArgument(format!(
            "argument {} is not a differentiable argument of the trace",
            argnum
        ))
    })?;
    let expanded = expand(trace, DEFAULT_GRADIENT_DEPTH, &(has_gen() | !is_trainable()))?;

    let mut spectra = Vec::with_capacity(range.len());
    for input in range {
        let mut freqs = vec![0.0];
        for op in expanded.operations() {
            for var in op.params() {
                let coeff = var.partial(input);
                if coeff == 0.0 {
                    continue;
                }
                if !var.is_affine() {
                    return Err(QuantumError::SpectrumUndefined(format!(
                        "parameter of '{}' depends non-linearly on input {}",
                        op.name(),
                        input
                    )));
                }
                let generator = op.generator().ok_or_else(|| {
                    QuantumError::SpectrumUndefined(format!("'{}' has no generator", op.name()))
                })?;
                let own = normalize(generator.frequencies().iter().map(|f| f * coeff).collect());
                freqs = normalize(
                    freqs
                        .iter()
                        .flat_map(|a| own.iter().map(move |b| a + b))
                        .collect(),
                );
            }
        }
        spectra.push(freqs);
    }
    log::debug!("spectrum of argument {}: {:?}", argnum, spectra);
    Ok(spectra)
}
