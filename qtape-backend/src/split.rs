//! Splitting transforms
//!
//! Splitting turns one logical trace into several traces that a backend
//! can execute, plus a combining function that reassembles the result the
//! original trace describes. Every splitting here works on the same
//! representation: each original measurement becomes one or more
//! elementary measurements with a coefficient, the elementary measurements
//! are distributed over traces, and the combining function sums
//! coefficient-weighted elementary results back into their parents.

use crate::BackendCapabilities;
use qtape_core::{
    Measurement, Observable, Pauli, PauliWord, QuantumError, Result, ReturnType, Tensor, Trace,
    TransformResult,
};

/// One measurement to execute, and where its result goes
#[derive(Debug, Clone)]
struct Elementary {
    measurement: Measurement,
    coeff: f64,
    parent: usize,
}

/// Observable whose eigenbasis a measurement is taken in
///
/// Probabilities are measured in the Z basis of their wires; the state
/// is basis independent.
fn basis_observable(m: &Measurement, num_wires: usize) -> Result<Observable> {
    match m.observable() {
        Some(obs) => Ok(obs.clone()),
        None if m.return_type() == ReturnType::State => Ok(PauliWord::identity().into()),
        None => {
            let factors = m
                .measured_wires(num_wires)
                .iter()
                .map(|w| (w.index(), Pauli::Z))
                .collect::<Vec<_>>();
            Ok(PauliWord::new(factors)?.into())
        }
    }
}

/// Greedy partition of observables into qubit-wise commuting groups
///
/// Returns indices per group, groups ordered by first member.
pub fn group_observables(observables: &[Observable]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, obs) in observables.iter().enumerate() {
        let slot = groups
            .iter_mut()
            .find(|g| g.iter().all(|&j| obs.qubit_wise_commutes(&observables[j])));
        match slot {
            Some(g) => g.push(i),
            None => groups.push(vec![i]),
        }
    }
    groups
}

/// Qubit-wise commuting partition of a trace's measurements
pub fn group_measurements(measurements: &[Measurement], num_wires: usize) -> Result<Vec<Vec<usize>>> {
    let observables = measurements
        .iter()
        .map(|m| basis_observable(m, num_wires))
        .collect::<Result<Vec<_>>>()?;
    Ok(group_observables(&observables))
}

fn hamiltonian_entries(trace: &Trace) -> Result<Vec<Elementary>> {
    let mut entries = Vec::new();
    for (parent, m) in trace.measurements().iter().enumerate() {
        match m.observable() {
            Some(Observable::Hamiltonian(h)) => {
                if m.return_type() != ReturnType::Expectation {
                    return Err(QuantumError::unsupported(
                        "Hamiltonian",
                        format!("{} of a Hamiltonian cannot be split into terms", m.return_type()),
                    ));
                }
                for (coeff, word) in h.terms() {
                    entries.push(Elementary {
                        measurement: Measurement::expval(word.clone()),
                        coeff: *coeff,
                        parent,
                    });
                }
            }
            _ => entries.push(Elementary {
                measurement: m.clone(),
                coeff: 1.0,
                parent,
            }),
        }
    }
    Ok(entries)
}

fn passthrough_entries(trace: &Trace) -> Vec<Elementary> {
    trace
        .measurements()
        .iter()
        .enumerate()
        .map(|(parent, m)| Elementary {
            measurement: m.clone(),
            coeff: 1.0,
            parent,
        })
        .collect()
}

fn commuting_groups(entries: &[Elementary], num_wires: usize) -> Result<Vec<Vec<usize>>> {
    let observables = entries
        .iter()
        .map(|e| basis_observable(&e.measurement, num_wires))
        .collect::<Result<Vec<_>>>()?;
    Ok(group_observables(&observables))
}

/// Distribute elementary measurements over traces and build the recombination
fn regroup(
    trace: &Trace,
    entries: Vec<Elementary>,
    groups: Vec<Vec<usize>>,
) -> Result<TransformResult> {
    let traces = groups
        .iter()
        .map(|g| {
            trace.with_measurements(g.iter().map(|&i| entries[i].measurement.clone()).collect())
        })
        .collect::<Result<Vec<_>>>()?;

    let original = trace.clone();
    let group_traces = traces.clone();

    Ok(TransformResult::new(traces, move |results| {
        let lead = group_traces
            .first()
            .map(Trace::output_shape)
            .transpose()?
            .unwrap_or_default();
        let trailing = results
            .first()
            .map(|r| r.shape()[lead.len().min(r.ndim())..].to_vec())
            .unwrap_or_default();
        if trailing.is_empty() {
            return recombine(&original, &entries, &groups, &group_traces, &results);
        }

        // results of a later stage, e.g. derivatives, carry extra trailing
        // dimensions; the recombination is linear, so apply it per entry
        let mut per_group = Vec::with_capacity(results.len());
        for (group_trace, result) in group_traces.iter().zip(&results) {
            let (t, slices) = result.split_trailing(&group_trace.output_shape()?)?;
            if t != trailing {
                return Err(QuantumError::shape_mismatch(format!(
                    "group results carry trailing dimensions {:?} and {:?}",
                    trailing, t
                )));
            }
            per_group.push(slices);
        }
        let count: usize = trailing.iter().product();
        if count == 0 {
            let mut shape = original.output_shape()?;
            shape.extend_from_slice(&trailing);
            return Ok(Tensor::zeros(shape));
        }
        let combined = (0..count)
            .map(|tau| {
                let slice: Vec<Tensor> = per_group.iter().map(|s| s[tau].clone()).collect();
                recombine(&original, &entries, &groups, &group_traces, &slice)
            })
            .collect::<Result<Vec<_>>>()?;
        Tensor::join_trailing(&combined, &trailing)
    }))
}

fn recombine(
    original: &Trace,
    entries: &[Elementary],
    groups: &[Vec<usize>],
    group_traces: &[Trace],
    results: &[Tensor],
) -> Result<Tensor> {
    let num_batches = original.shots().num_batches();
    let num_parents = original.measurements().len();
    let mut acc: Vec<Vec<(Vec<f64>, Vec<Tensor>)>> =
        vec![vec![(Vec::new(), Vec::new()); num_parents]; num_batches];

    for ((group, group_trace), result) in groups.iter().zip(group_traces).zip(results) {
        for (batch, per_measurement) in group_trace.unpack_result(result)?.into_iter().enumerate() {
            for (&e, tensor) in group.iter().zip(per_measurement) {
                let entry = &entries[e];
                let slot = &mut acc[batch][entry.parent];
                slot.0.push(entry.coeff);
                slot.1.push(tensor);
            }
        }
    }

    let per_batch = acc
        .into_iter()
        .map(|parents| {
            parents
                .into_iter()
                .map(|(coeffs, tensors)| Tensor::linear_combination(&coeffs, &tensors))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    original.pack_results(per_batch)
}

/// Replace Hamiltonian expectation values by their Pauli terms
///
/// With `group`, terms are collected into qubit-wise commuting groups,
/// one trace per group; otherwise every elementary measurement gets its
/// own trace. The combining function returns `Σ cᵢ⟨Pᵢ⟩` for each
/// Hamiltonian and passes other measurements through.
///
/// # Errors
/// Returns `UnsupportedOperation` for variances and samples of a
/// Hamiltonian, which are not linear in its terms.
pub fn hamiltonian_expand(trace: &Trace, group: bool) -> Result<TransformResult> {
    let entries = hamiltonian_entries(trace)?;
    let groups = if group {
        commuting_groups(&entries, trace.num_wires())?
    } else {
        (0..entries.len()).map(|i| vec![i]).collect()
    };
    log::trace!(
        "hamiltonian expansion: {} measurements into {} traces",
        entries.len(),
        groups.len()
    );
    regroup(trace, entries, groups)
}

/// One trace per qubit-wise commuting group of measurements
pub fn split_non_commuting(trace: &Trace) -> Result<TransformResult> {
    let entries = passthrough_entries(trace);
    let groups = commuting_groups(&entries, trace.num_wires())?;
    if groups.len() == 1 {
        return Ok(TransformResult::identity(trace.clone()));
    }
    log::trace!("split {} measurements into {} traces", entries.len(), groups.len());
    regroup(trace, entries, groups)
}

/// Splitting a backend applies unless it supplies its own
///
/// Hamiltonian expectation values are expanded into grouped terms when the
/// backend cannot measure them directly or the trace is sampled.
/// Otherwise measurements are split into commuting groups when the backend
/// cannot measure non-commuting observables together.
pub fn default_split(trace: &Trace, caps: &BackendCapabilities) -> Result<TransformResult> {
    let has_hamiltonian = trace
        .measurements()
        .iter()
        .any(|m| m.observable().map_or(false, Observable::is_hamiltonian));

    if has_hamiltonian && (!caps.supports_hamiltonian || !trace.shots().is_analytic()) {
        return hamiltonian_expand(trace, true);
    }
    if !caps.supports_noncommuting_measurements {
        return split_non_commuting(trace);
    }
    Ok(TransformResult::identity(trace.clone()))
}
