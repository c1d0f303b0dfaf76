//! Operation definitions and recorded operations
//!
//! Every operation kind is described by a static [`OperationDef`] whose
//! capability fields (generator, gradient method, gradient recipe,
//! decompositions, matrix) are fixed when the definition is written. Code
//! that needs to know whether an operation is decomposable or
//! differentiable reads these fields; it never inspects the concrete kind.

use crate::recipe::GradientRecipe;
use crate::var::Var;
use crate::wire::{Wire, Wires};
use crate::{QuantumError, Result};
use num_complex::Complex64;
use smallvec::SmallVec;
use std::fmt;

/// Unitary matrix of an operation as a function of its parameter values
///
/// Row-major, dimension `2^k x 2^k` for a `k`-wire operation. Wire order
/// follows the operation's wire list, first wire most significant.
pub type MatrixFn = fn(&[f64]) -> Vec<Complex64>;

/// Rewrite of an operation into a sequence of simpler operations
///
/// Receives the traced parameters so that derivatives with respect to the
/// call arguments flow into the decomposed operations.
pub type DecompositionFn = fn(&[Var], &[Wire]) -> Result<Vec<Operation>>;

/// State-dependent recipe: parameter values and parameter index to recipe
pub type RecipeFn = fn(&[f64], usize) -> GradientRecipe;

/// How an operation's parameters may be differentiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradMethod {
    /// Exact shifted-evaluation rule (own recipe, generator, or decomposition)
    Analytic,
    /// Only numerical differentiation is available
    Numeric,
    /// Not differentiable
    None,
}

/// Gradient recipe attached to an operation definition
#[derive(Debug, Clone, Copy)]
pub enum RecipeRule {
    /// Same triples for every parameter value
    Fixed(&'static [[f64; 3]]),
    /// Recipe computed from the currently bound parameter values
    StateDependent(RecipeFn),
}

/// Generator of a single-parameter operation U(θ) = exp(-iθG)
#[derive(Debug, Clone, Copy)]
pub struct Generator {
    /// Eigenvalues of G
    pub eigenvalues: &'static [f64],
    /// Whether G is a scaled unitary (Pauli-type) operator
    pub unitary: bool,
}

impl Generator {
    /// All pairwise eigenvalue differences, including zero
    pub fn frequencies(&self) -> Vec<f64> {
        let mut freqs = Vec::with_capacity(self.eigenvalues.len().pow(2));
        for a in self.eigenvalues {
            for b in self.eigenvalues {
                freqs.push(a - b);
            }
        }
        freqs
    }

    /// Half the gap between eigenvalues when exactly two distinct ones exist
    pub fn half_gap(&self) -> Option<f64> {
        let mut distinct: Vec<f64> = Vec::new();
        for &e in self.eigenvalues {
            if !distinct.iter().any(|d| (d - e).abs() < 1e-12) {
                distinct.push(e);
            }
        }
        match distinct.as_slice() {
            [a, b] => Some((a - b).abs() / 2.0),
            _ => None,
        }
    }
}

/// Static description of an operation kind
#[derive(Debug)]
pub struct OperationDef {
    /// Name of the operation (e.g. "RX", "CNOT")
    pub name: &'static str,
    /// Number of parameters
    pub num_params: usize,
    /// Number of wires (0 accepts any non-zero number)
    pub num_wires: usize,
    /// Generator, for single-parameter rotations
    pub generator: Option<Generator>,
    /// Differentiation method
    pub grad_method: GradMethod,
    /// Explicit gradient recipe
    pub recipe: Option<RecipeRule>,
    /// Alternative decompositions, in order of preference
    pub decompositions: &'static [DecompositionFn],
    /// Unitary matrix
    pub matrix: Option<MatrixFn>,
}

/// An operation recorded in a circuit trace
///
/// # Example
/// ```
/// use qtape_core::{ops, Operation, Var};
///
/// let op = Operation::on(&ops::RX, [Var::trainable(0.3)], &[0]).unwrap();
/// assert_eq!(op.name(), "RX");
/// assert!(op.is_trainable());
/// assert!(op.gradient_recipe(0).is_some());
/// ```
#[derive(Clone)]
pub struct Operation {
    def: &'static OperationDef,
    params: SmallVec<[Var; 3]>,
    wires: Wires,
}

impl Operation {
    /// Create a new operation
    ///
    /// # Errors
    /// Returns error if:
    /// - Parameter count doesn't match the definition
    /// - Wire count doesn't match the definition
    /// - Duplicate wires specified
    pub fn new(
        def: &'static OperationDef,
        params: impl IntoIterator<Item = Var>,
        wires: &[Wire],
    ) -> Result<Self> {
        let params: SmallVec<[Var; 3]> = params.into_iter().collect();
        if params.len() != def.num_params {
            return Err(QuantumError::InvalidParameterCount {
                name: def.name.to_string(),
                expected: def.num_params,
                actual: params.len(),
            });
        }

        if (def.num_wires == 0 && wires.is_empty())
            || (def.num_wires != 0 && wires.len() != def.num_wires)
        {
            return Err(QuantumError::invalid_wire_count(
                def.name,
                def.num_wires.max(1),
                wires.len(),
            ));
        }

        for i in 0..wires.len() {
            for j in (i + 1)..wires.len() {
                if wires[i] == wires[j] {
                    return Err(QuantumError::DuplicateWire(wires[i].index()));
                }
            }
        }

        Ok(Self {
            def,
            params,
            wires: SmallVec::from_slice(wires),
        })
    }

    /// Create an operation from raw wire indices
    pub fn on<P: Into<Var>>(
        def: &'static OperationDef,
        params: impl IntoIterator<Item = P>,
        wires: &[usize],
    ) -> Result<Self> {
        let wires: Wires = wires.iter().copied().map(Wire::new).collect();
        Self::new(def, params.into_iter().map(Into::into), &wires)
    }

    /// Get the definition
    #[inline]
    pub fn def(&self) -> &'static OperationDef {
        self.def
    }

    /// Get the name
    #[inline]
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    /// Get the traced parameters
    #[inline]
    pub fn params(&self) -> &[Var] {
        &self.params
    }

    /// Get the bound parameter values
    pub fn param_values(&self) -> SmallVec<[f64; 3]> {
        self.params.iter().map(Var::value).collect()
    }

    /// Get the wires this operation acts on
    #[inline]
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    /// Number of parameters
    #[inline]
    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    /// Number of wires
    #[inline]
    pub fn num_wires(&self) -> usize {
        self.wires.len()
    }

    /// Whether the operation has a generator
    pub fn has_generator(&self) -> bool {
        self.def.generator.is_some()
    }

    /// Get the generator
    pub fn generator(&self) -> Option<&Generator> {
        self.def.generator.as_ref()
    }

    /// Get the differentiation method
    pub fn grad_method(&self) -> GradMethod {
        self.def.grad_method
    }

    /// Whether any differentiation method is declared
    pub fn has_grad_method(&self) -> bool {
        self.def.grad_method != GradMethod::None
    }

    /// Whether at least one parameter is trainable
    pub fn is_trainable(&self) -> bool {
        self.params.iter().any(Var::is_trainable)
    }

    /// Number of trainable parameters
    pub fn num_trainable(&self) -> usize {
        self.params.iter().filter(|p| p.is_trainable()).count()
    }

    /// Analytic recipe for parameter `index`, evaluated at the bound values
    ///
    /// An explicit recipe wins; otherwise a generator with two distinct
    /// eigenvalues yields the two-term rule. Returns `None` if the
    /// operation has no analytic recipe of its own.
    pub fn gradient_recipe(&self, index: usize) -> Option<GradientRecipe> {
        if self.def.grad_method != GradMethod::Analytic || index >= self.params.len() {
            return None;
        }
        match self.def.recipe {
            Some(RecipeRule::Fixed(triples)) => Some(GradientRecipe::from_triples(triples)),
            Some(RecipeRule::StateDependent(rule)) => Some(rule(&self.param_values(), index)),
            None => self
                .def
                .generator
                .as_ref()
                .filter(|_| self.params.len() == 1)
                .and_then(Generator::half_gap)
                .map(GradientRecipe::two_term),
        }
    }

    /// Whether every parameter can be differentiated without decomposing
    pub fn has_own_gradient(&self) -> bool {
        match self.def.grad_method {
            GradMethod::Numeric => true,
            GradMethod::None => false,
            GradMethod::Analytic => (0..self.params.len()).all(|i| self.gradient_recipe(i).is_some()),
        }
    }

    /// Alternative decompositions of this operation
    pub fn decompositions(&self) -> &'static [DecompositionFn] {
        self.def.decompositions
    }

    /// Whether the operation can be decomposed
    pub fn has_decomposition(&self) -> bool {
        !self.def.decompositions.is_empty()
    }

    /// Apply the preferred decomposition
    pub fn decompose(&self) -> Option<Result<Vec<Operation>>> {
        self.decompose_with(0)
    }

    /// Apply decomposition number `choice`
    pub fn decompose_with(&self, choice: usize) -> Option<Result<Vec<Operation>>> {
        self.def
            .decompositions
            .get(choice)
            .map(|rule| rule(&self.params, &self.wires))
    }

    /// Unitary matrix at the bound parameter values
    pub fn matrix(&self) -> Option<Vec<Complex64>> {
        self.def.matrix.map(|m| m(&self.param_values()))
    }

    /// Same operation with parameter `index` bound to `value`
    pub fn with_param(&self, index: usize, value: f64) -> Operation {
        let mut op = self.clone();
        if let Some(p) = op.params.get_mut(index) {
            *p = p.with_value(value);
        }
        op
    }

    /// Same operation with all parameter values replaced
    pub fn with_param_values(&self, values: &[f64]) -> Result<Operation> {
        if values.len() != self.params.len() {
            return Err(QuantumError::InvalidParameterCount {
                name: self.name().to_string(),
                expected: self.params.len(),
                actual: values.len(),
            });
        }
        let mut op = self.clone();
        for (p, &v) in op.params.iter_mut().zip(values) {
            *p = p.with_value(v);
        }
        Ok(op)
    }

    /// Same operation with the trainable marking replaced per parameter
    pub(crate) fn with_trainability(&self, trainable: &[bool]) -> Operation {
        let mut op = self.clone();
        for (p, &t) in op.params.iter_mut().zip(trainable) {
            *p = match (t, p.is_trainable()) {
                (true, true) | (false, false) => p.clone(),
                (true, false) => Var::trainable(p.value()),
                (false, true) => p.frozen(),
            };
        }
        op
    }

    /// Compare kind, wires and parameter values
    pub fn structurally_equal(&self, other: &Operation) -> bool {
        self.def.name == other.def.name
            && self.wires == other.wires
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.value().to_bits() == b.value().to_bits())
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.structurally_equal(other)
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.is_trainable() == b.is_trainable())
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.def.name)?;
        if !self.params.is_empty() {
            write!(f, "(")?;
            for (i, p) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", p)?;
            }
            write!(f, ")")?;
        }
        write!(f, "[")?;
        for (i, w) in self.wires.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", w)?;
        }
        write!(f, "]")
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
