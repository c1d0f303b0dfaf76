//! Trace fingerprints for result caching

use crate::measurement::Measurement;
use crate::observable::{Observable, PauliWord};
use crate::shots::Shots;
use crate::trace::Trace;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A key identifying a trace's result
///
/// The fingerprint is computed from:
/// - Number of wires
/// - Operation sequence (names, wires, parameter bit patterns)
/// - Measurements (return type, wires, observables and coefficients)
/// - Shot configuration
///
/// Two traces that differ only in a measurement's return type always get
/// different fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Compute the fingerprint of a trace
    pub fn compute(trace: &Trace) -> Self {
        let mut hasher = DefaultHasher::new();

        trace.num_wires().hash(&mut hasher);

        trace.operations().len().hash(&mut hasher);
        for op in trace.operations() {
            op.name().hash(&mut hasher);
            for w in op.wires() {
                w.index().hash(&mut hasher);
            }
            op.num_params().hash(&mut hasher);
            for p in op.params() {
                p.value().to_bits().hash(&mut hasher);
            }
        }

        trace.measurements().len().hash(&mut hasher);
        for m in trace.measurements() {
            hash_measurement(m, &mut hasher);
        }

        hash_shots(trace.shots(), &mut hasher);

        Fingerprint(hasher.finish())
    }

    /// Same key under a different shot configuration
    pub fn with_shots(trace: &Trace, shots: &Shots) -> Self {
        Self::compute(&trace.with_shots(shots.clone()))
    }

    /// Get the raw hash value
    pub fn value(&self) -> u64 {
        self.0
    }
}

fn hash_word<H: Hasher>(word: &PauliWord, hasher: &mut H) {
    for (w, p) in word.iter() {
        w.index().hash(hasher);
        p.hash(hasher);
    }
    // terminator so adjacent words cannot merge
    usize::MAX.hash(hasher);
}

fn hash_measurement<H: Hasher>(m: &Measurement, hasher: &mut H) {
    m.return_type().hash(hasher);
    m.wires().len().hash(hasher);
    for w in m.wires() {
        w.index().hash(hasher);
    }
    match m.observable() {
        None => 0u8.hash(hasher),
        Some(Observable::Word(word)) => {
            1u8.hash(hasher);
            hash_word(word, hasher);
        }
        Some(Observable::Hamiltonian(h)) => {
            2u8.hash(hasher);
            h.len().hash(hasher);
            for (c, word) in h.terms() {
                c.to_bits().hash(hasher);
                hash_word(word, hasher);
            }
        }
    }
}

fn hash_shots<H: Hasher>(shots: &Shots, hasher: &mut H) {
    shots.hash(hasher);
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
