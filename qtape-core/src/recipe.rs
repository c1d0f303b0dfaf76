//! Gradient recipes for analytic differentiation
//!
//! A recipe is an ordered list of `(coefficient, multiplier, shift)` terms.
//! The partial derivative of a circuit output `f` with respect to a gate
//! parameter θ is
//!
//! ∂f/∂θ = Σ cᵢ · f(aᵢ·θ + sᵢ)
//!
//! For a gate U(θ) = exp(-iθG) where G has two distinct eigenvalues
//! separated by 2r, the two-term rule uses s = π/(4r) and c = ±r.

use smallvec::SmallVec;
use std::f64::consts::FRAC_PI_2;

/// One term of a gradient recipe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftTerm {
    /// Coefficient cᵢ applied to the shifted evaluation
    pub coeff: f64,
    /// Multiplier aᵢ applied to the current parameter value
    pub multiplier: f64,
    /// Additive shift sᵢ
    pub shift: f64,
}

impl ShiftTerm {
    /// Create a new shift term
    pub const fn new(coeff: f64, multiplier: f64, shift: f64) -> Self {
        Self {
            coeff,
            multiplier,
            shift,
        }
    }

    /// Parameter value this term evaluates the circuit at
    #[inline]
    pub fn shifted_value(&self, value: f64) -> f64 {
        self.multiplier * value + self.shift
    }
}

/// Ordered sequence of shift terms defining a derivative
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GradientRecipe {
    terms: SmallVec<[ShiftTerm; 4]>,
}

impl GradientRecipe {
    /// Create a recipe from terms
    pub fn new(terms: impl IntoIterator<Item = ShiftTerm>) -> Self {
        Self {
            terms: terms.into_iter().collect(),
        }
    }

    /// Create a recipe from raw `[coeff, multiplier, shift]` triples
    pub fn from_triples(triples: &[[f64; 3]]) -> Self {
        Self::new(triples.iter().map(|t| ShiftTerm::new(t[0], t[1], t[2])))
    }

    /// Standard two-term rule for generator eigenvalue half-gap `r`
    ///
    /// ∂f/∂θ = r·[f(θ + π/4r) − f(θ − π/4r)]
    pub fn two_term(r: f64) -> Self {
        let shift = std::f64::consts::PI / (4.0 * r);
        Self::new([
            ShiftTerm::new(r, 1.0, shift),
            ShiftTerm::new(-r, 1.0, -shift),
        ])
    }

    /// Two-term rule of the Pauli rotations (r = 1/2, shift π/2)
    pub fn pauli_rotation() -> Self {
        Self::new([
            ShiftTerm::new(0.5, 1.0, FRAC_PI_2),
            ShiftTerm::new(-0.5, 1.0, -FRAC_PI_2),
        ])
    }

    /// Central finite-difference rule with step `h`
    pub fn central_difference(h: f64) -> Self {
        let c = 0.5 / h;
        Self::new([ShiftTerm::new(c, 1.0, h), ShiftTerm::new(-c, 1.0, -h)])
    }

    /// Get the terms
    pub fn terms(&self) -> &[ShiftTerm] {
        &self.terms
    }

    /// Number of shifted evaluations required
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Check if the recipe has no terms
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Apply the recipe to a scalar function, mostly useful for checking recipes
    pub fn apply<F: Fn(f64) -> f64>(&self, value: f64, f: F) -> f64 {
        self.terms
            .iter()
            .map(|t| t.coeff * f(t.shifted_value(value)))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pauli_rotation_recipe_on_cosine() {
        let recipe = GradientRecipe::pauli_rotation();
        for theta in [0.1, 0.5, 1.0, 2.0] {
            let d = recipe.apply(theta, f64::cos);
            assert_relative_eq!(d, -theta.sin(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_two_term_matches_pauli_rotation() {
        let a = GradientRecipe::two_term(0.5);
        let b = GradientRecipe::pauli_rotation();
        for (x, y) in a.terms().iter().zip(b.terms()) {
            assert_relative_eq!(x.coeff, y.coeff);
            assert_relative_eq!(x.shift, y.shift);
        }
    }

    #[test]
    fn test_central_difference_on_polynomial() {
        let recipe = GradientRecipe::central_difference(1e-3);
        let d = recipe.apply(2.0, |x| x * x);
        assert_relative_eq!(d, 4.0, epsilon = 1e-9);
    }
}
