//! Batched dispatch
//!
//! [`execute_batch`] is the only path from the pipeline to a backend. It
//! resolves the shot configuration of every trace, serves what it can from
//! the backend's result cache, submits the remaining distinct traces as
//! one job and returns results in submission order.

use crate::QuantumBackend;
use ahash::AHashMap;
use qtape_core::{Fingerprint, QuantumError, Result, Shots, Tensor, Trace};

/// Execute traces on a backend as one batch
///
/// `shots` overrides the shot configuration of every trace for this call
/// only; the traces themselves are not modified. Traces with equal
/// fingerprints are executed once.
///
/// # Errors
/// Propagates validation and execution errors, and returns
/// `ShapeMismatch` if the backend returns the wrong number of results or
/// a result of the wrong shape.
pub fn execute_batch<B>(backend: &B, traces: &[Trace], shots: Option<&Shots>) -> Result<Vec<Tensor>>
where
    B: QuantumBackend + ?Sized,
{
    let resolved: Vec<Trace> = match shots {
        Some(s) => traces.iter().map(|t| t.with_shots(s.clone())).collect(),
        None => traces.to_vec(),
    };
    for t in &resolved {
        backend.validate_trace(t)?;
    }

    let fingerprints: Vec<Fingerprint> = resolved.iter().map(Trace::fingerprint).collect();
    let cache = backend.cache();

    let mut results: Vec<Option<Tensor>> = vec![None; resolved.len()];
    let mut submitted: Vec<usize> = Vec::new();
    let mut position: AHashMap<Fingerprint, usize> = AHashMap::new();
    let mut hits = 0;

    for (i, fp) in fingerprints.iter().enumerate() {
        if position.contains_key(fp) {
            continue;
        }
        if let Some(hit) = cache.and_then(|c| c.get(*fp)) {
            results[i] = Some(hit);
            hits += 1;
            continue;
        }
        position.insert(*fp, submitted.len());
        submitted.push(i);
    }

    log::debug!(
        "dispatch to '{}': {} traces, {} cache hits, {} submitted",
        backend.name(),
        resolved.len(),
        hits,
        submitted.len()
    );

    let mut fresh = Vec::with_capacity(submitted.len());
    if !submitted.is_empty() {
        let batch: Vec<Trace> = submitted.iter().map(|&i| resolved[i].clone()).collect();
        if backend.capabilities().supports_batch {
            fresh = backend.execute(&batch)?;
        } else {
            for t in &batch {
                fresh.extend(backend.execute(std::slice::from_ref(t))?);
            }
        }
        if fresh.len() != batch.len() {
            return Err(QuantumError::shape_mismatch(format!(
                "backend '{}' returned {} results for {} traces",
                backend.name(),
                fresh.len(),
                batch.len()
            )));
        }
    }

    for (&i, result) in submitted.iter().zip(&fresh) {
        let expected = resolved[i].output_shape()?;
        if result.shape() != expected.as_slice() {
            return Err(QuantumError::shape_mismatch(format!(
                "backend '{}' returned shape {:?}, trace produces {:?}",
                backend.name(),
                result.shape(),
                expected
            )));
        }
        if let Some(c) = cache {
            c.insert(fingerprints[i], result.clone());
        }
    }

    results
        .into_iter()
        .zip(&fingerprints)
        .map(|(r, fp)| match r {
            Some(r) => Ok(r),
            None => position
                .get(fp)
                .and_then(|&p| fresh.get(p).cloned())
                .ok_or_else(|| {
                    QuantumError::Backend(format!("no result produced for trace {}", fp))
                }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StateVectorBackend, StateVectorConfig};
    use approx::assert_relative_eq;
    use qtape_core::{ops, Measurement, Operation, PauliWord, ReturnType};

    fn trace(theta: f64) -> Trace {
        Trace::new(
            1,
            vec![Operation::on(&ops::RX, [theta], &[0]).unwrap()],
            vec![Measurement::expval(PauliWord::z(0))],
        )
        .unwrap()
    }

    fn cached() -> StateVectorBackend {
        StateVectorBackend::with_config(StateVectorConfig {
            num_wires: 2,
            cache_size: Some(16),
            seed: Some(7),
            ..Default::default()
        })
    }

    #[test]
    fn test_results_in_submission_order() {
        let backend = StateVectorBackend::new(1);
        let thetas = [0.1, 0.5, 1.0, 2.0];
        let traces: Vec<Trace> = thetas.iter().map(|&t| trace(t)).collect();
        let results = execute_batch(&backend, &traces, None).unwrap();
        for (r, t) in results.iter().zip(thetas) {
            assert_relative_eq!(r.item().unwrap(), t.cos(), epsilon = 1e-12);
        }
        assert_eq!(backend.num_batches(), 1);
    }

    #[test]
    fn test_cache_hits_skip_execution() {
        let backend = cached();
        execute_batch(&backend, &[trace(0.3)], None).unwrap();
        execute_batch(&backend, &[trace(0.3), trace(0.4)], None).unwrap();
        assert_eq!(backend.num_executions(), 2);
        assert_eq!(backend.cache().unwrap().statistics().hits, 1);

        backend.clear_cache();
        execute_batch(&backend, &[trace(0.3)], None).unwrap();
        assert_eq!(backend.num_executions(), 3);
    }

    #[test]
    fn test_return_type_bypasses_cache() {
        let backend = cached();
        let e = trace(0.6);
        let v = e
            .with_measurements(vec![e.measurements()[0].with_return_type(ReturnType::Variance)])
            .unwrap();
        let first = execute_batch(&backend, &[e], None).unwrap();
        let second = execute_batch(&backend, &[v], None).unwrap();
        assert_relative_eq!(first[0].item().unwrap(), 0.6_f64.cos(), epsilon = 1e-12);
        assert_relative_eq!(second[0].item().unwrap(), 0.6_f64.sin().powi(2), epsilon = 1e-12);
        assert_eq!(backend.num_executions(), 2);
    }

    #[test]
    fn test_shot_override_leaves_trace_untouched() {
        let backend = cached();
        let t = trace(0.2);
        let sampled = Shots::finite(1000).unwrap();
        let r = execute_batch(&backend, std::slice::from_ref(&t), Some(&sampled)).unwrap();
        assert!(t.shots().is_analytic());
        assert_relative_eq!(r[0].item().unwrap(), 0.2_f64.cos(), epsilon = 0.1);

        // the analytic result is cached separately
        let exact = execute_batch(&backend, &[t], None).unwrap();
        assert_relative_eq!(exact[0].item().unwrap(), 0.2_f64.cos(), epsilon = 1e-12);
        assert_eq!(backend.num_executions(), 2);
    }

    #[test]
    fn test_duplicates_executed_once() {
        let backend = StateVectorBackend::new(1);
        let results = execute_batch(&backend, &[trace(0.9), trace(0.9), trace(0.9)], None).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(backend.num_executions(), 1);
    }
}
