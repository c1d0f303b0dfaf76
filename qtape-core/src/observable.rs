//! Pauli observables
//!
//! Observables are tensor products of Pauli operators on named wires
//! ([`PauliWord`]) and real linear combinations of those
//! ([`Hamiltonian`]). Identity factors are never stored, so the empty word
//! is the identity operator.
//!
//! # Example
//! ```
//! use qtape_core::{Hamiltonian, PauliWord};
//!
//! let h = Hamiltonian::new(vec![0.5, -1.0], vec![PauliWord::z(0), PauliWord::x(0)]).unwrap();
//! assert_eq!(h.grouping().len(), 2);
//! ```

use crate::operation::Operation;
use crate::ops;
use crate::wire::{Wire, Wires};
use crate::{QuantumError, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Single-wire Pauli operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pauli {
    I,
    X,
    Y,
    Z,
}

impl Pauli {
    /// Parse from a character
    pub fn from_char(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'I' => Ok(Pauli::I),
            'X' => Ok(Pauli::X),
            'Y' => Ok(Pauli::Y),
            'Z' => Ok(Pauli::Z),
            other => Err(QuantumError::InvalidArgument(format!(
                "'{}' is not a Pauli operator",
                other
            ))),
        }
    }

    /// Character representation
    pub fn to_char(self) -> char {
        match self {
            Pauli::I => 'I',
            Pauli::X => 'X',
            Pauli::Y => 'Y',
            Pauli::Z => 'Z',
        }
    }

    /// Whether this Pauli is diagonal in the computational basis
    pub fn is_diagonal(self) -> bool {
        matches!(self, Pauli::I | Pauli::Z)
    }

    /// Gates rotating this Pauli's eigenbasis onto the computational basis
    fn diagonalizing_gates(self, wire: Wire) -> Result<Vec<Operation>> {
        let none: [f64; 0] = [];
        let w = [wire.index()];
        Ok(match self {
            Pauli::I | Pauli::Z => Vec::new(),
            Pauli::X => vec![Operation::on(&ops::HADAMARD, none, &w)?],
            Pauli::Y => vec![
                Operation::on(&ops::PAULI_Z, none, &w)?,
                Operation::on(&ops::S, none, &w)?,
                Operation::on(&ops::HADAMARD, none, &w)?,
            ],
        })
    }
}

impl fmt::Display for Pauli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// Tensor product of Pauli operators, keyed by wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PauliWord {
    factors: BTreeMap<Wire, Pauli>,
}

impl PauliWord {
    /// Build a word from `(wire, pauli)` pairs
    ///
    /// # Errors
    /// Returns `DuplicateWire` if a wire appears twice.
    pub fn new(factors: impl IntoIterator<Item = (usize, Pauli)>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for (wire, pauli) in factors {
            if map.insert(Wire::new(wire), pauli).is_some() {
                return Err(QuantumError::DuplicateWire(wire));
            }
        }
        map.retain(|_, p| *p != Pauli::I);
        Ok(Self { factors: map })
    }

    /// Parse a string such as `"XZ"` onto the given wires
    pub fn parse(paulis: &str, wires: &[usize]) -> Result<Self> {
        let chars: Vec<char> = paulis.chars().collect();
        if chars.len() != wires.len() {
            return Err(QuantumError::shape_mismatch(format!(
                "Pauli string '{}' has {} factors for {} wires",
                paulis,
                chars.len(),
                wires.len()
            )));
        }
        let factors = wires
            .iter()
            .zip(chars)
            .map(|(&w, c)| Pauli::from_char(c).map(|p| (w, p)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(factors)
    }

    /// The identity
    pub fn identity() -> Self {
        Self::default()
    }

    fn single(wire: usize, pauli: Pauli) -> Self {
        let mut factors = BTreeMap::new();
        if pauli != Pauli::I {
            factors.insert(Wire::new(wire), pauli);
        }
        Self { factors }
    }

    /// Pauli X on one wire
    pub fn x(wire: usize) -> Self {
        Self::single(wire, Pauli::X)
    }

    /// Pauli Y on one wire
    pub fn y(wire: usize) -> Self {
        Self::single(wire, Pauli::Y)
    }

    /// Pauli Z on one wire
    pub fn z(wire: usize) -> Self {
        Self::single(wire, Pauli::Z)
    }

    /// Tensor product with a word on disjoint wires
    pub fn tensor(&self, other: &PauliWord) -> Result<Self> {
        let mut factors = self.factors.clone();
        for (w, p) in &other.factors {
            if factors.insert(*w, *p).is_some() {
                return Err(QuantumError::DuplicateWire(w.index()));
            }
        }
        Ok(Self { factors })
    }

    /// Factor on `wire` (identity if absent)
    pub fn get(&self, wire: Wire) -> Pauli {
        self.factors.get(&wire).copied().unwrap_or(Pauli::I)
    }

    /// Non-identity factors in wire order
    pub fn iter(&self) -> impl Iterator<Item = (Wire, Pauli)> + '_ {
        self.factors.iter().map(|(w, p)| (*w, *p))
    }

    /// Wires with a non-identity factor
    pub fn wires(&self) -> Wires {
        self.factors.keys().copied().collect()
    }

    /// Whether this is the identity
    pub fn is_identity(&self) -> bool {
        self.factors.is_empty()
    }

    /// Whether every factor is diagonal
    pub fn is_diagonal(&self) -> bool {
        self.factors.values().all(|p| p.is_diagonal())
    }

    /// Whether the factors on every shared wire are equal
    pub fn qubit_wise_commutes(&self, other: &PauliWord) -> bool {
        self.factors
            .iter()
            .all(|(w, p)| other.factors.get(w).map_or(true, |q| q == p))
    }

    /// Gates rotating the word's eigenbasis onto the computational basis
    pub fn diagonalizing_gates(&self) -> Result<Vec<Operation>> {
        let mut gates = Vec::new();
        for (w, p) in self.iter() {
            gates.extend(p.diagonalizing_gates(w)?);
        }
        Ok(gates)
    }
}

impl fmt::Display for PauliWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identity() {
            return write!(f, "I");
        }
        for (i, (w, p)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}{}", p, w.index())?;
        }
        Ok(())
    }
}

/// Real linear combination of Pauli words
#[derive(Debug, Clone, PartialEq)]
pub struct Hamiltonian {
    terms: Vec<(f64, PauliWord)>,
}

impl Hamiltonian {
    /// Create a Hamiltonian from coefficients and words
    pub fn new(coeffs: Vec<f64>, words: Vec<PauliWord>) -> Result<Self> {
        if coeffs.len() != words.len() {
            return Err(QuantumError::shape_mismatch(format!(
                "{} coefficients for {} observables",
                coeffs.len(),
                words.len()
            )));
        }
        if coeffs.is_empty() {
            return Err(QuantumError::InvalidArgument(
                "Hamiltonian needs at least one term".to_string(),
            ));
        }
        Ok(Self {
            terms: coeffs.into_iter().zip(words).collect(),
        })
    }

    /// Get the terms
    pub fn terms(&self) -> &[(f64, PauliWord)] {
        &self.terms
    }

    /// Number of terms
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Always false; a Hamiltonian has at least one term
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Union of the wires of all terms, sorted
    pub fn wires(&self) -> Wires {
        let mut all: Vec<Wire> = self.terms.iter().flat_map(|(_, w)| w.wires()).collect();
        all.sort_unstable();
        all.dedup();
        all.into_iter().collect()
    }

    /// Greedy partition of the terms into qubit-wise commuting groups
    ///
    /// Returns term indices per group, groups in order of first term.
    pub fn grouping(&self) -> Vec<Vec<usize>> {
        let words: Vec<&PauliWord> = self.terms.iter().map(|(_, w)| w).collect();
        group_words(&words)
    }
}

/// Greedy qubit-wise commuting partition of a list of words
pub fn group_words(words: &[&PauliWord]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, word) in words.iter().enumerate() {
        let slot = groups
            .iter_mut()
            .find(|g| g.iter().all(|&j| word.qubit_wise_commutes(words[j])));
        match slot {
            Some(g) => g.push(i),
            None => groups.push(vec![i]),
        }
    }
    groups
}

impl fmt::Display for Hamiltonian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (c, w)) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{}*({})", c, w)?;
        }
        Ok(())
    }
}

/// Observable measured by an expectation, variance or sample
#[derive(Debug, Clone, PartialEq)]
pub enum Observable {
    Word(PauliWord),
    Hamiltonian(Hamiltonian),
}

impl Observable {
    /// Wires the observable acts on
    pub fn wires(&self) -> Wires {
        match self {
            Observable::Word(w) => w.wires(),
            Observable::Hamiltonian(h) => h.wires(),
        }
    }

    /// Whether this is a multi-term Hamiltonian
    pub fn is_hamiltonian(&self) -> bool {
        matches!(self, Observable::Hamiltonian(_))
    }

    /// `(coefficient, word)` terms; a word is one term with coefficient 1
    pub fn terms(&self) -> Vec<(f64, &PauliWord)> {
        match self {
            Observable::Word(w) => vec![(1.0, w)],
            Observable::Hamiltonian(h) => h.terms.iter().map(|(c, w)| (*c, w)).collect(),
        }
    }

    /// Get the Pauli word, if this is one
    pub fn as_word(&self) -> Option<&PauliWord> {
        match self {
            Observable::Word(w) => Some(w),
            Observable::Hamiltonian(_) => None,
        }
    }

    /// Whether every term of both observables commutes qubit-wise
    pub fn qubit_wise_commutes(&self, other: &Observable) -> bool {
        self.terms()
            .iter()
            .all(|(_, a)| other.terms().iter().all(|(_, b)| a.qubit_wise_commutes(b)))
    }
}

impl From<PauliWord> for Observable {
    fn from(word: PauliWord) -> Self {
        Observable::Word(word)
    }
}

impl From<Hamiltonian> for Observable {
    fn from(h: Hamiltonian) -> Self {
        Observable::Hamiltonian(h)
    }
}

impl fmt::Display for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observable::Word(w) => write!(f, "{}", w),
            Observable::Hamiltonian(h) => write!(f, "{}", h),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_factors_dropped() {
        let w = PauliWord::parse("IZ", &[0, 1]).unwrap();
        assert_eq!(w.wires().as_slice(), &[Wire::new(1)]);
        assert_eq!(w, PauliWord::z(1));
    }

    #[test]
    fn test_duplicate_wire_rejected() {
        let r = PauliWord::new([(0, Pauli::X), (0, Pauli::Z)]);
        assert!(matches!(r, Err(QuantumError::DuplicateWire(0))));
        assert!(PauliWord::x(0).tensor(&PauliWord::z(0)).is_err());
    }

    #[test]
    fn test_qubit_wise_commutation() {
        let zz = PauliWord::parse("ZZ", &[0, 1]).unwrap();
        let z0 = PauliWord::z(0);
        let x1 = PauliWord::x(1);
        assert!(zz.qubit_wise_commutes(&z0));
        assert!(!zz.qubit_wise_commutes(&x1));
        assert!(z0.qubit_wise_commutes(&x1));
    }

    #[test]
    fn test_grouping() {
        let h = Hamiltonian::new(
            vec![1.0, 2.0, 3.0, 4.0],
            vec![
                PauliWord::z(0),
                PauliWord::x(0),
                PauliWord::z(1),
                PauliWord::parse("XY", &[0, 1]).unwrap(),
            ],
        )
        .unwrap();
        assert_eq!(h.grouping(), vec![vec![0, 2], vec![1, 3]]);
    }

    #[test]
    fn test_diagonalizing_gates() {
        let w = PauliWord::parse("XYZ", &[0, 1, 2]).unwrap();
        let names: Vec<_> = w
            .diagonalizing_gates()
            .unwrap()
            .iter()
            .map(|g| g.name())
            .collect();
        assert_eq!(names, vec!["Hadamard", "PauliZ", "S", "Hadamard"]);
    }

    #[test]
    fn test_hamiltonian_length_mismatch() {
        let r = Hamiltonian::new(vec![1.0], vec![PauliWord::z(0), PauliWord::z(1)]);
        assert!(matches!(r, Err(QuantumError::ShapeMismatch(_))));
    }
}
