//! Dense state-vector kernels
//!
//! Wire `w` of an `n`-wire register is bit `n - 1 - w` of a basis index,
//! so the first wire is the most significant bit. This matches the row
//! order of operation matrices.

use crate::error::{BackendError, StateResult};
use num_complex::Complex64;
use qtape_core::{Observable, Operation, Pauli, PauliWord};

/// Largest register the dense kernels accept
pub const MAX_WIRES: usize = 30;

/// Dense quantum state vector
///
/// # Example
///
/// ```
/// use qtape_backend::state::StateVector;
/// use qtape_core::{ops, Operation, PauliWord};
///
/// let mut state = StateVector::new(2).unwrap();
/// state
///     .apply_operation(&Operation::on(&ops::HADAMARD, Vec::<f64>::new(), &[0]).unwrap())
///     .unwrap();
/// assert!((state.expectation(&PauliWord::x(0)).unwrap() - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StateVector {
    num_wires: usize,
    amplitudes: Vec<Complex64>,
}

impl StateVector {
    /// Create a new state initialized to |0...0⟩
    ///
    /// # Errors
    /// Returns error if `num_wires` is zero or exceeds [`MAX_WIRES`]
    pub fn new(num_wires: usize) -> StateResult<Self> {
        if num_wires == 0 || num_wires > MAX_WIRES {
            return Err(BackendError::InvalidDimension {
                dimension: num_wires,
            });
        }
        let mut amplitudes = vec![Complex64::new(0.0, 0.0); 1 << num_wires];
        amplitudes[0] = Complex64::new(1.0, 0.0);
        Ok(Self {
            num_wires,
            amplitudes,
        })
    }

    /// Get the number of wires
    #[inline]
    pub fn num_wires(&self) -> usize {
        self.num_wires
    }

    /// Get the amplitudes
    #[inline]
    pub fn amplitudes(&self) -> &[Complex64] {
        &self.amplitudes
    }

    #[inline]
    fn bit(&self, wire: usize) -> usize {
        self.num_wires - 1 - wire
    }

    fn check_wire(&self, wire: usize) -> StateResult<()> {
        if wire >= self.num_wires {
            return Err(BackendError::InvalidWire {
                index: wire,
                num_wires: self.num_wires,
            });
        }
        Ok(())
    }

    /// Offsets of the `2^k` sub-basis states of `wires`, first wire most significant
    fn sub_offsets(&self, wires: &[usize]) -> Vec<usize> {
        let k = wires.len();
        (0..1usize << k)
            .map(|j| {
                wires.iter().enumerate().fold(0, |off, (q, &w)| {
                    if (j >> (k - 1 - q)) & 1 == 1 {
                        off | (1 << self.bit(w))
                    } else {
                        off
                    }
                })
            })
            .collect()
    }

    /// Apply a `2^k x 2^k` row-major matrix to `k` wires
    pub fn apply_matrix(&mut self, matrix: &[Complex64], wires: &[usize]) -> StateResult<()> {
        for &w in wires {
            self.check_wire(w)?;
        }
        let dim = 1usize << wires.len();
        if matrix.len() != dim * dim {
            return Err(BackendError::DimensionMismatch {
                expected: dim * dim,
                actual: matrix.len(),
            });
        }

        let offsets = self.sub_offsets(wires);
        let mask = offsets.iter().fold(0, |m, o| m | o);
        let mut buf = vec![Complex64::new(0.0, 0.0); dim];

        for base in 0..self.amplitudes.len() {
            if base & mask != 0 {
                continue;
            }
            for (slot, off) in buf.iter_mut().zip(&offsets) {
                *slot = self.amplitudes[base | off];
            }
            for (r, off) in offsets.iter().enumerate() {
                let row = &matrix[r * dim..(r + 1) * dim];
                self.amplitudes[base | off] = row.iter().zip(&buf).map(|(m, a)| m * a).sum();
            }
        }
        Ok(())
    }

    /// Apply an operation through its matrix
    pub fn apply_operation(&mut self, op: &Operation) -> StateResult<()> {
        let matrix = op
            .matrix()
            .ok_or_else(|| BackendError::MissingMatrix(op.name().to_string()))?;
        let wires: Vec<usize> = op.wires().iter().map(|w| w.index()).collect();
        self.apply_matrix(&matrix, &wires)
    }

    /// Computational-basis probabilities of the full register
    pub fn probabilities(&self) -> Vec<f64> {
        self.amplitudes.iter().map(|a| a.norm_sqr()).collect()
    }

    /// Probabilities of the basis states of `wires`, first wire most significant
    pub fn marginal_probabilities(&self, wires: &[usize]) -> StateResult<Vec<f64>> {
        for &w in wires {
            self.check_wire(w)?;
        }
        let k = wires.len();
        let mut probs = vec![0.0; 1 << k];
        for (i, a) in self.amplitudes.iter().enumerate() {
            let j = wires
                .iter()
                .fold(0, |acc, &w| (acc << 1) | ((i >> self.bit(w)) & 1));
            probs[j] += a.norm_sqr();
        }
        Ok(probs)
    }

    /// Amplitudes of `P|ψ⟩`
    pub fn apply_pauli_word(&self, word: &PauliWord) -> StateResult<Vec<Complex64>> {
        let mut flip = 0usize;
        let mut factors = Vec::new();
        for (w, p) in word.iter() {
            self.check_wire(w.index())?;
            let bit = self.bit(w.index());
            if matches!(p, Pauli::X | Pauli::Y) {
                flip |= 1 << bit;
            }
            factors.push((bit, p));
        }

        let mut out = vec![Complex64::new(0.0, 0.0); self.amplitudes.len()];
        for (i, a) in self.amplitudes.iter().enumerate() {
            let mut phase = Complex64::new(1.0, 0.0);
            for &(bit, p) in &factors {
                let set = (i >> bit) & 1 == 1;
                match p {
                    // Y|0⟩ = i|1⟩, Y|1⟩ = -i|0⟩
                    Pauli::Y if set => phase *= Complex64::new(0.0, -1.0),
                    Pauli::Y => phase *= Complex64::new(0.0, 1.0),
                    Pauli::Z if set => phase = -phase,
                    _ => {}
                }
            }
            out[i ^ flip] = phase * a;
        }
        Ok(out)
    }

    /// Amplitudes of `A|ψ⟩` for a word or Hamiltonian
    pub fn apply_observable(&self, observable: &Observable) -> StateResult<Vec<Complex64>> {
        let mut out = vec![Complex64::new(0.0, 0.0); self.amplitudes.len()];
        for (coeff, word) in observable.terms() {
            for (o, v) in out.iter_mut().zip(self.apply_pauli_word(word)?) {
                *o += v * coeff;
            }
        }
        Ok(out)
    }

    fn inner(&self, other: &[Complex64]) -> Complex64 {
        self.amplitudes
            .iter()
            .zip(other)
            .map(|(a, b)| a.conj() * b)
            .sum()
    }

    /// ⟨ψ|P|ψ⟩ for a Pauli word
    pub fn expectation(&self, word: &PauliWord) -> StateResult<f64> {
        Ok(self.inner(&self.apply_pauli_word(word)?).re)
    }

    /// ⟨ψ|A|ψ⟩
    pub fn observable_expectation(&self, observable: &Observable) -> StateResult<f64> {
        Ok(self.inner(&self.apply_observable(observable)?).re)
    }

    /// ⟨A²⟩ − ⟨A⟩², with ⟨A²⟩ = ‖A|ψ⟩‖²
    pub fn observable_variance(&self, observable: &Observable) -> StateResult<f64> {
        let phi = self.apply_observable(observable)?;
        let mean = self.inner(&phi).re;
        let square: f64 = phi.iter().map(|a| a.norm_sqr()).sum();
        Ok(square - mean * mean)
    }

    /// Real and imaginary parts, row per basis state
    pub fn to_real_pairs(&self) -> Vec<f64> {
        self.amplitudes.iter().flat_map(|a| [a.re, a.im]).collect()
    }
}
