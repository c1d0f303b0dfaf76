//! Core backend trait and types

use crate::split;
use crate::{BackendCapabilities, BackendError, ResultCache, ShotModel};
use qtape_core::expand::{expand, in_set};
use qtape_core::{QuantumError, Result, ReturnType, Tensor, Trace, TransformResult};

/// Default bound on recursive decomposition into the native set
pub const DEFAULT_EXPANSION_DEPTH: usize = 10;

/// Trait for trace execution backends
///
/// A backend executes batches of traces and supplies the two transforms
/// the pipeline applies before execution:
/// - [`QuantumBackend::decompose`], a value-preserving rewrite into the
///   native operation set (exactly one output trace, identity combine)
/// - [`QuantumBackend::split`], which may turn one logical trace into
///   several traces plus a recombination
///
/// # Example
///
/// ```
/// use qtape_backend::{QuantumBackend, StateVectorBackend};
/// use qtape_core::{ops, Measurement, Operation, PauliWord, Trace};
///
/// let backend = StateVectorBackend::new(2);
/// let trace = Trace::new(
///     1,
///     vec![Operation::on(&ops::RX, [0.0], &[0]).unwrap()],
///     vec![Measurement::expval(PauliWord::z(0))],
/// )
/// .unwrap();
/// let results = backend.execute(&[trace]).unwrap();
/// assert_eq!(results[0].item(), Some(1.0));
/// ```
pub trait QuantumBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Get backend capabilities
    fn capabilities(&self) -> &BackendCapabilities;

    /// Execute a batch of traces in one blocking call
    ///
    /// Returns one packed result per trace, in submission order.
    fn execute(&self, traces: &[Trace]) -> Result<Vec<Tensor>>;

    /// Result cache owned by this backend instance, if any
    fn cache(&self) -> Option<&ResultCache> {
        None
    }

    /// Bound on recursive decomposition in [`QuantumBackend::decompose`]
    fn max_expansion_depth(&self) -> usize {
        DEFAULT_EXPANSION_DEPTH
    }

    /// Rewrite a trace into the native operation set
    ///
    /// Operations are decomposed recursively until native, up to
    /// [`QuantumBackend::max_expansion_depth`] levels. A trace that is
    /// already native comes back structurally identical.
    ///
    /// # Errors
    /// Returns `UnsupportedOperation` for any operation still not native
    /// once the depth limit is reached.
    fn decompose(&self, trace: &Trace) -> Result<Trace> {
        let caps = self.capabilities();
        let depth = self.max_expansion_depth();
        let native = in_set(caps.native_ops.iter());
        let expanded = expand(trace, depth, &native)?;
        if let Some(op) = expanded
            .operations()
            .iter()
            .find(|op| !caps.is_native(op.name()))
        {
            return Err(QuantumError::unsupported(
                op.name(),
                format!(
                    "not native to '{}' and no decomposition reaches the native set within depth {}",
                    self.name(),
                    depth
                ),
            ));
        }
        Ok(expanded)
    }

    /// [`QuantumBackend::decompose`] in transform form
    fn decomposition_transform(&self, trace: &Trace) -> Result<TransformResult> {
        Ok(TransformResult::identity(self.decompose(trace)?))
    }

    /// Split a trace for execution reasons
    fn split(&self, trace: &Trace) -> Result<TransformResult> {
        split::default_split(trace, self.capabilities())
    }

    /// Validate trace compatibility with the backend
    fn validate_trace(&self, trace: &Trace) -> Result<()> {
        let caps = self.capabilities();

        if trace.num_wires() > caps.num_wires {
            return Err(BackendError::CapabilityExceeded(format!(
                "trace requires {} wires, backend supports max {}",
                trace.num_wires(),
                caps.num_wires
            ))
            .into());
        }

        if let Some(op) = trace
            .operations()
            .iter()
            .find(|op| !caps.is_native(op.name()))
        {
            return Err(QuantumError::unsupported(
                op.name(),
                format!("not native to '{}'", self.name()),
            ));
        }

        for m in trace.measurements() {
            let rt = m.return_type();
            if !caps.supports_return_type(rt) {
                return Err(QuantumError::unsupported(
                    rt.to_string(),
                    format!("return type not supported by '{}'", self.name()),
                ));
            }
            if !caps.supports_hamiltonian && m.observable().map_or(false, |o| o.is_hamiltonian())
            {
                return Err(QuantumError::unsupported(
                    "Hamiltonian",
                    format!("'{}' measures Pauli words only", self.name()),
                ));
            }
            if rt == ReturnType::Sample && trace.shots().is_analytic() {
                return Err(QuantumError::InvalidTrace(
                    "sample measurements need a finite shot count".to_string(),
                ));
            }
        }

        if caps.shot_model == ShotModel::Sampled && trace.shots().is_analytic() {
            return Err(BackendError::CapabilityExceeded(format!(
                "'{}' only executes with finite shots",
                self.name()
            ))
            .into());
        }

        if !caps.supports_noncommuting_measurements
            && split::group_measurements(trace.measurements(), trace.num_wires())?.len() > 1
        {
            return Err(QuantumError::unsupported(
                "measurements",
                format!(
                    "'{}' cannot measure non-commuting observables in one trace",
                    self.name()
                ),
            ));
        }

        Ok(())
    }

    /// Get backend description/status
    fn description(&self) -> String {
        format!("{} - {} wires", self.name(), self.capabilities().num_wires)
    }
}
