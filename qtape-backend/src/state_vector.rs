//! State-vector reference backend
//!
//! Executes traces over the standard operation set on a dense state
//! vector. Analytic traces are evaluated exactly; traces with finite shots
//! are sampled.
//!
//! # Features
//!
//! - Exact or sampled evaluation per shot batch
//! - Reproducible sampling: with a seed, each trace samples from an RNG
//!   seeded by `seed ^ fingerprint`, independent of batch order
//! - Parallel evaluation of the traces of one batch
//! - Optional per-instance result cache
//!
//! # Example
//!
//! ```
//! use qtape_backend::{execute_batch, StateVectorBackend, StateVectorConfig};
//! use qtape_core::{ops, Measurement, Operation, PauliWord, Trace};
//!
//! let backend = StateVectorBackend::with_config(StateVectorConfig {
//!     num_wires: 2,
//!     cache_size: Some(128),
//!     ..Default::default()
//! });
//! let trace = Trace::new(
//!     1,
//!     vec![Operation::on(&ops::RY, [0.5], &[0]).unwrap()],
//!     vec![Measurement::expval(PauliWord::z(0))],
//! )
//! .unwrap();
//! let results = execute_batch(&backend, &[trace.clone(), trace], None).unwrap();
//! assert_eq!(results.len(), 2);
//! assert_eq!(backend.num_executions(), 1);
//! ```

use crate::state::StateVector;
use crate::{BackendCapabilities, BackendError, OpSet, QuantumBackend, ResultCache};
use qtape_core::{Measurement, Observable, PauliWord, Result, ReturnType, Tensor, Trace};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Configuration for the state-vector backend
#[derive(Debug, Clone)]
pub struct StateVectorConfig {
    /// Maximum number of wires
    pub num_wires: usize,

    /// Use deterministic seed for reproducible sampling
    pub seed: Option<u64>,

    /// Evaluate the traces of a batch in parallel
    pub parallel: bool,

    /// Result cache capacity (None = no cache, Some(0) = unbounded)
    pub cache_size: Option<usize>,

    /// Measure Hamiltonian expectation values directly
    pub supports_hamiltonian: bool,

    /// Measure non-commuting observables in one trace
    pub supports_noncommuting: bool,

    /// Restrict the native operation set (None = standard set)
    pub native_ops: Option<Vec<String>>,
}

impl Default for StateVectorConfig {
    fn default() -> Self {
        Self {
            num_wires: 24,
            seed: None,
            parallel: true,
            cache_size: None,
            supports_hamiltonian: true,
            supports_noncommuting: true,
            native_ops: None,
        }
    }
}

/// Dense state-vector backend
pub struct StateVectorBackend {
    name: String,
    config: StateVectorConfig,
    capabilities: BackendCapabilities,
    cache: Option<ResultCache>,
    executions: AtomicUsize,
    batches: AtomicUsize,
}

impl StateVectorBackend {
    /// Create a backend for `num_wires` wires with default configuration
    pub fn new(num_wires: usize) -> Self {
        Self::with_config(StateVectorConfig {
            num_wires,
            ..Default::default()
        })
    }

    /// Create a backend with custom configuration
    pub fn with_config(config: StateVectorConfig) -> Self {
        let mut capabilities = BackendCapabilities::simulator(config.num_wires);
        capabilities.supports_hamiltonian = config.supports_hamiltonian;
        capabilities.supports_noncommuting_measurements = config.supports_noncommuting;
        if let Some(native) = &config.native_ops {
            capabilities.native_ops = native.iter().cloned().collect::<OpSet>();
        }
        capabilities
            .metadata
            .insert("method".to_string(), "dense_state_vector".to_string());
        if let Some(seed) = config.seed {
            capabilities
                .metadata
                .insert("seed".to_string(), seed.to_string());
        }

        Self {
            name: "state_vector".to_string(),
            cache: config.cache_size.map(ResultCache::new),
            capabilities,
            config,
            executions: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
        }
    }

    /// Set the backend name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &StateVectorConfig {
        &self.config
    }

    /// Number of traces executed so far (cache hits excluded)
    pub fn num_executions(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }

    /// Number of `execute` calls so far
    pub fn num_batches(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    /// Invalidate the result cache
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    fn rng_for(&self, trace: &Trace) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ trace.fingerprint().value()),
            None => StdRng::from_entropy(),
        }
    }

    fn run_trace(&self, trace: &Trace) -> Result<Tensor> {
        let mut state = StateVector::new(trace.num_wires())?;
        for op in trace.operations() {
            state.apply_operation(op)?;
        }

        let mut rng = if trace.shots().is_analytic() {
            None
        } else {
            Some(self.rng_for(trace))
        };

        let mut per_batch = Vec::with_capacity(trace.shots().num_batches());
        for shots in trace.shots().batches() {
            let results = trace
                .measurements()
                .iter()
                .map(|m| measure(&state, m, shots, rng.as_mut()))
                .collect::<Result<Vec<_>>>()?;
            per_batch.push(results);
        }
        trace.pack_results(per_batch)
    }
}

fn unsupported(m: &Measurement, why: &str) -> BackendError {
    BackendError::UnsupportedMeasurement(format!("{}: {}", m, why))
}

fn measure(
    state: &StateVector,
    m: &Measurement,
    shots: Option<u64>,
    rng: Option<&mut StdRng>,
) -> Result<Tensor> {
    let num_wires = state.num_wires();
    match (m.return_type(), shots, rng) {
        (ReturnType::State, _, _) => {
            Tensor::new(vec![1 << num_wires, 2], state.to_real_pairs())
        }
        (ReturnType::Probability, None, _) => {
            let wires: Vec<usize> = m.measured_wires(num_wires).iter().map(|w| w.index()).collect();
            Ok(Tensor::vector(state.marginal_probabilities(&wires)?))
        }
        (ReturnType::Probability, Some(n), Some(rng)) => {
            let wires: Vec<usize> = m.measured_wires(num_wires).iter().map(|w| w.index()).collect();
            let probs = state.marginal_probabilities(&wires)?;
            let mut counts = vec![0.0; probs.len()];
            for j in sample_indices(&probs, n, rng)? {
                counts[j] += 1.0;
            }
            Ok(Tensor::vector(counts).scale(1.0 / n as f64))
        }
        (rt, None, _) => {
            let obs = m
                .observable()
                .ok_or_else(|| unsupported(m, "no observable"))?;
            match rt {
                ReturnType::Expectation => Ok(Tensor::scalar(state.observable_expectation(obs)?)),
                ReturnType::Variance => Ok(Tensor::scalar(state.observable_variance(obs)?)),
                _ => Err(unsupported(m, "samples need a finite shot count").into()),
            }
        }
        (rt, Some(n), Some(rng)) => {
            let obs = m
                .observable()
                .ok_or_else(|| unsupported(m, "no observable"))?;
            match (rt, obs) {
                (ReturnType::Expectation, Observable::Hamiltonian(h)) => {
                    let mut total = 0.0;
                    for (coeff, word) in h.terms() {
                        total += coeff * mean(&sample_word(state, word, n, rng)?);
                    }
                    Ok(Tensor::scalar(total))
                }
                (_, Observable::Hamiltonian(_)) => {
                    Err(unsupported(m, "sampled Hamiltonian must be split into terms").into())
                }
                (ReturnType::Expectation, Observable::Word(w)) => {
                    Ok(Tensor::scalar(mean(&sample_word(state, w, n, rng)?)))
                }
                (ReturnType::Variance, Observable::Word(w)) => {
                    let samples = sample_word(state, w, n, rng)?;
                    let mu = mean(&samples);
                    let square = samples.iter().map(|x| x * x).sum::<f64>() / samples.len() as f64;
                    Ok(Tensor::scalar(square - mu * mu))
                }
                (_, Observable::Word(w)) => Ok(Tensor::vector(sample_word(state, w, n, rng)?)),
            }
        }
        (_, Some(_), None) => Err(unsupported(m, "no sampler for a finite shot batch").into()),
    }
}

fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn sample_indices(probs: &[f64], shots: u64, rng: &mut StdRng) -> Result<Vec<usize>> {
    let dist = WeightedIndex::new(probs).map_err(|e| BackendError::Sampling(e.to_string()))?;
    Ok((0..shots).map(|_| dist.sample(rng)).collect())
}

/// ±1 eigenvalue samples of a Pauli word
fn sample_word(state: &StateVector, word: &PauliWord, shots: u64, rng: &mut StdRng) -> Result<Vec<f64>> {
    let mut rotated = state.clone();
    for gate in word.diagonalizing_gates()? {
        rotated.apply_operation(&gate)?;
    }
    let wires: Vec<usize> = word.wires().iter().map(|w| w.index()).collect();
    let probs = rotated.marginal_probabilities(&wires)?;
    Ok(sample_indices(&probs, shots, rng)?
        .into_iter()
        .map(|j| if j.count_ones() % 2 == 0 { 1.0 } else { -1.0 })
        .collect())
}

impl QuantumBackend for StateVectorBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    fn execute(&self, traces: &[Trace]) -> Result<Vec<Tensor>> {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.executions.fetch_add(traces.len(), Ordering::Relaxed);
        log::trace!("'{}' executing {} traces", self.name, traces.len());

        if self.config.parallel && traces.len() > 1 {
            traces.par_iter().map(|t| self.run_trace(t)).collect()
        } else {
            traces.iter().map(|t| self.run_trace(t)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use qtape_core::{ops, Hamiltonian, Operation, Shots};

    fn ry_trace(theta: f64, measurements: Vec<Measurement>) -> Trace {
        Trace::new(
            2,
            vec![
                Operation::on(&ops::RY, [theta], &[0]).unwrap(),
                Operation::on(&ops::CNOT, Vec::<f64>::new(), &[0, 1]).unwrap(),
            ],
            measurements,
        )
        .unwrap()
    }

    fn seeded() -> StateVectorBackend {
        StateVectorBackend::with_config(StateVectorConfig {
            num_wires: 4,
            seed: Some(42),
            ..Default::default()
        })
    }

    #[test]
    fn test_backend_creation() {
        let backend = StateVectorBackend::new(3).with_name("local");
        assert_eq!(backend.name(), "local");
        assert_eq!(backend.capabilities().num_wires, 3);
        assert!(backend.cache().is_none());
    }

    #[test]
    fn test_analytic_measurements() {
        let theta = 0.8;
        let backend = StateVectorBackend::new(2);
        let trace = ry_trace(
            theta,
            vec![
                Measurement::expval(PauliWord::z(1)),
                Measurement::var(PauliWord::z(1)),
                Measurement::probs(&[0]),
            ],
        );
        let out = &backend.execute(&[trace]).unwrap()[0];
        let c = theta.cos();
        assert_eq!(out.shape(), &[4]);
        assert_relative_eq!(out.data()[0], c, epsilon = 1e-12);
        assert_relative_eq!(out.data()[1], 1.0 - c * c, epsilon = 1e-12);
        assert_relative_eq!(out.data()[2], (1.0 + c) / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_hamiltonian_expectation() {
        let backend = StateVectorBackend::new(2);
        let h = Hamiltonian::new(vec![0.5, -2.0], vec![PauliWord::z(0), PauliWord::x(0)]).unwrap();
        let trace = Trace::new(
            1,
            vec![Operation::on(&ops::RY, [0.3], &[0]).unwrap()],
            vec![Measurement::expval(h)],
        )
        .unwrap();
        let out = backend.execute(&[trace]).unwrap();
        assert_relative_eq!(
            out[0].item().unwrap(),
            0.5 * 0.3_f64.cos() - 2.0 * 0.3_f64.sin(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_state_output() {
        let backend = StateVectorBackend::new(1);
        let trace = Trace::new(
            1,
            vec![Operation::on(&ops::HADAMARD, Vec::<f64>::new(), &[0]).unwrap()],
            vec![Measurement::state()],
        )
        .unwrap();
        let out = &backend.execute(&[trace]).unwrap()[0];
        assert_eq!(out.shape(), &[2, 2]);
        assert_relative_eq!(out.data()[0], std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn test_sampled_expectation_close_to_exact() {
        let trace = ry_trace(1.0, vec![Measurement::expval(PauliWord::z(0))])
            .with_shots(Shots::finite(20_000).unwrap());
        let out = seeded().execute(&[trace]).unwrap();
        assert_relative_eq!(out[0].item().unwrap(), 1.0_f64.cos(), epsilon = 0.03);
    }

    #[test]
    fn test_reproducibility_with_seed() {
        let trace = ry_trace(0.9, vec![Measurement::sample(PauliWord::x(0))])
            .with_shots(Shots::finite(50).unwrap());
        let a = seeded().execute(&[trace.clone()]).unwrap();
        let b = seeded().execute(&[trace]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].shape(), &[50]);
        assert!(a[0].data().iter().all(|x| *x == 1.0 || *x == -1.0));
    }

    #[test]
    fn test_shot_vector_results() {
        let trace = ry_trace(0.4, vec![Measurement::probs(&[0, 1])])
            .with_shots(Shots::from_pairs(&[(100, 2), (10, 1)]).unwrap());
        let out = seeded().execute(&[trace]).unwrap();
        assert_eq!(out[0].shape(), &[3, 4]);
        for row in out[0].unstack().unwrap() {
            assert_relative_eq!(row.data().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let traces: Vec<Trace> = (0..8)
            .map(|i| ry_trace(i as f64 * 0.3, vec![Measurement::expval(PauliWord::z(1))]))
            .collect();
        let parallel = StateVectorBackend::new(2).execute(&traces).unwrap();
        let sequential = StateVectorBackend::with_config(StateVectorConfig {
            num_wires: 2,
            parallel: false,
            ..Default::default()
        })
        .execute(&traces)
        .unwrap();
        assert_eq!(parallel, sequential);
    }
}
