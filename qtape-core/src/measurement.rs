//! Measurements recorded at the end of a trace

use crate::observable::Observable;
use crate::wire::{Wire, Wires};
use crate::{QuantumError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a measurement returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReturnType {
    /// Expectation value of an observable
    Expectation,
    /// Variance of an observable
    Variance,
    /// Computational-basis probabilities of a wire subset
    Probability,
    /// Full state vector
    State,
    /// Observable eigenvalue per shot
    Sample,
}

impl ReturnType {
    /// Whether the result is linear in the circuit's density matrix
    pub fn is_linear(self) -> bool {
        matches!(self, ReturnType::Expectation | ReturnType::Probability)
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReturnType::Expectation => "expval",
            ReturnType::Variance => "var",
            ReturnType::Probability => "probs",
            ReturnType::State => "state",
            ReturnType::Sample => "sample",
        };
        write!(f, "{}", s)
    }
}

/// An observable or wire subset plus a return type
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    return_type: ReturnType,
    observable: Option<Observable>,
    wires: Wires,
}

impl Measurement {
    fn with_observable_of(return_type: ReturnType, observable: Observable) -> Self {
        let wires = observable.wires();
        Self {
            return_type,
            observable: Some(observable),
            wires,
        }
    }

    /// Expectation value of an observable
    pub fn expval(observable: impl Into<Observable>) -> Self {
        Self::with_observable_of(ReturnType::Expectation, observable.into())
    }

    /// Variance of an observable
    pub fn var(observable: impl Into<Observable>) -> Self {
        Self::with_observable_of(ReturnType::Variance, observable.into())
    }

    /// Per-shot eigenvalue samples of an observable
    pub fn sample(observable: impl Into<Observable>) -> Self {
        Self::with_observable_of(ReturnType::Sample, observable.into())
    }

    /// Basis-state probabilities of `wires`; all wires when empty
    pub fn probs(wires: &[usize]) -> Self {
        Self {
            return_type: ReturnType::Probability,
            observable: None,
            wires: wires.iter().copied().map(Wire::new).collect(),
        }
    }

    /// Full state vector
    pub fn state() -> Self {
        Self {
            return_type: ReturnType::State,
            observable: None,
            wires: Wires::new(),
        }
    }

    /// Get the return type
    #[inline]
    pub fn return_type(&self) -> ReturnType {
        self.return_type
    }

    /// Get the observable
    pub fn observable(&self) -> Option<&Observable> {
        self.observable.as_ref()
    }

    /// Wires named by the measurement (may be empty for state/probs)
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    /// Wires actually measured in a register of `num_wires`
    pub fn measured_wires(&self, num_wires: usize) -> Wires {
        if self.wires.is_empty() && self.observable.is_none() {
            (0..num_wires).map(Wire::new).collect()
        } else {
            self.wires.clone()
        }
    }

    /// Same return type, different observable
    pub fn with_observable(&self, observable: impl Into<Observable>) -> Self {
        Self::with_observable_of(self.return_type, observable.into())
    }

    /// Same observable, different return type
    pub fn with_return_type(&self, return_type: ReturnType) -> Self {
        Self {
            return_type,
            ..self.clone()
        }
    }

    /// Result shape for one shot batch
    ///
    /// `shots` is the batch size, `None` for analytic evaluation.
    pub fn output_shape(&self, num_wires: usize, shots: Option<u64>) -> Result<Vec<usize>> {
        match self.return_type {
            ReturnType::Expectation | ReturnType::Variance => Ok(Vec::new()),
            ReturnType::Probability => Ok(vec![1 << self.measured_wires(num_wires).len()]),
            ReturnType::State => Ok(vec![1 << num_wires, 2]),
            ReturnType::Sample => match shots {
                Some(n) => Ok(vec![n as usize]),
                None => Err(QuantumError::InvalidTrace(
                    "sample measurements need a finite shot count".to_string(),
                )),
            },
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.observable {
            Some(obs) => write!(f, "{}({})", self.return_type, obs),
            None if self.wires.is_empty() => write!(f, "{}()", self.return_type),
            None => {
                write!(f, "{}(", self.return_type)?;
                for (i, w) in self.wires.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", w)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::PauliWord;

    #[test]
    fn test_output_shapes() {
        let e = Measurement::expval(PauliWord::z(0));
        assert_eq!(e.output_shape(2, None).unwrap(), Vec::<usize>::new());

        let p = Measurement::probs(&[0]);
        assert_eq!(p.output_shape(3, None).unwrap(), vec![2]);

        let all = Measurement::probs(&[]);
        assert_eq!(all.output_shape(3, None).unwrap(), vec![8]);

        let s = Measurement::state();
        assert_eq!(s.output_shape(2, None).unwrap(), vec![4, 2]);
    }

    #[test]
    fn test_sample_needs_shots() {
        let m = Measurement::sample(PauliWord::z(0));
        assert!(m.output_shape(1, None).is_err());
        assert_eq!(m.output_shape(1, Some(50)).unwrap(), vec![50]);
    }

    #[test]
    fn test_return_type_distinguishes_measurements() {
        let e = Measurement::expval(PauliWord::z(0));
        let v = e.with_return_type(ReturnType::Variance);
        assert_ne!(e, v);
        assert_eq!(e.observable(), v.observable());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Measurement::expval(PauliWord::z(1))), "expval(Z1)");
        assert_eq!(format!("{}", Measurement::probs(&[0, 2])), "probs(w0, w2)");
    }
}
