//! Traced scalars for classical preprocessing
//!
//! A [`Var`] is a gate parameter value that remembers how it was computed
//! from the entries of the call arguments. Each seeded argument entry owns
//! one derivative slot; arithmetic and elementary functions propagate first
//! and second derivatives forward (a truncated Taylor arithmetic, the
//! second-order sibling of a dual number).
//!
//! This is what lets a trace carry the classical-preprocessing relation
//! between call arguments and bound gate parameters: after tracing, the
//! gradient of each gate parameter is one row of the classical Jacobian.
//!
//! ```
//! use qtape_core::Var;
//!
//! let x = Var::seeded(0.5, 0, 1);
//! let y = x.sin() * 2.0;
//! assert!((y.gradient().unwrap()[0] - 2.0 * 0.5_f64.cos()).abs() < 1e-12);
//! assert!(!y.is_affine());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

/// Nonzero second derivatives keyed by `(i, j)` with `i <= j`
type SecondOrder = BTreeMap<(usize, usize), f64>;

fn bump(h: &mut SecondOrder, i: usize, j: usize, v: f64) {
    if v != 0.0 {
        *h.entry((i.min(j), i.max(j))).or_insert(0.0) += v;
    }
}

fn nonzero(grad: &[f64]) -> impl Iterator<Item = (usize, f64)> + Clone + '_ {
    grad.iter().copied().enumerate().filter(|(_, g)| *g != 0.0)
}

#[derive(Debug, Clone, PartialEq)]
struct Derivatives {
    /// First derivatives, one per seeded input
    grad: Vec<f64>,
    /// Second derivatives, `None` when not tracked
    hess: Option<SecondOrder>,
    /// Whether the value is an affine function of the inputs
    affine: bool,
}

impl Derivatives {
    fn dim(&self) -> usize {
        self.grad.len()
    }

    /// Gradient padded with zeros to `n` inputs
    fn grad_to(&self, n: usize) -> Vec<f64> {
        let mut grad = self.grad.clone();
        grad.resize(n, 0.0);
        grad
    }

    fn scaled(&self, factor: f64) -> Derivatives {
        Derivatives {
            grad: self.grad.iter().map(|g| g * factor).collect(),
            hess: self
                .hess
                .as_ref()
                .map(|h| h.iter().map(|(k, v)| (*k, v * factor)).collect()),
            affine: self.affine,
        }
    }
}

/// A traced scalar: value plus optional derivatives with respect to the
/// seeded call-argument entries
///
/// A `Var` without derivative information is a constant. A `Var` with
/// derivative information is trainable, even if every derivative happens
/// to be zero at the current point. Second derivatives are kept sparse and
/// only when every seed feeding the value asked for them.
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    value: f64,
    derivs: Option<Arc<Derivatives>>,
}

impl Var {
    /// Create a constant (not differentiable)
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            derivs: None,
        }
    }

    /// Create the seed for input `index` out of `num_inputs`, tracking
    /// second derivatives
    ///
    /// # Panics
    /// Panics if `index >= num_inputs`
    pub fn seeded(value: f64, index: usize, num_inputs: usize) -> Self {
        Self::seed(value, index, num_inputs, true)
    }

    /// Create the seed for input `index` out of `num_inputs`, tracking
    /// first derivatives only
    ///
    /// # Panics
    /// Panics if `index >= num_inputs`
    pub fn seeded_first_order(value: f64, index: usize, num_inputs: usize) -> Self {
        Self::seed(value, index, num_inputs, false)
    }

    fn seed(value: f64, index: usize, num_inputs: usize, second_order: bool) -> Self {
        assert!(index < num_inputs, "seed index out of range");
        let mut grad = vec![0.0; num_inputs];
        grad[index] = 1.0;
        Self {
            value,
            derivs: Some(Arc::new(Derivatives {
                grad,
                hess: second_order.then(SecondOrder::new),
                affine: true,
            })),
        }
    }

    /// Create a trainable value that does not depend on any call argument
    ///
    /// Used when building traces by hand: the parameter is differentiable
    /// but carries no classical-preprocessing relation.
    pub fn trainable(value: f64) -> Self {
        Self {
            value,
            derivs: Some(Arc::new(Derivatives {
                grad: Vec::new(),
                hess: Some(SecondOrder::new()),
                affine: true,
            })),
        }
    }

    /// Get the value
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Whether this value carries no derivative information
    #[inline]
    pub fn is_constant(&self) -> bool {
        self.derivs.is_none()
    }

    /// Whether this value is differentiable
    #[inline]
    pub fn is_trainable(&self) -> bool {
        self.derivs.is_some()
    }

    /// Whether the value is an affine function of the seeded inputs
    ///
    /// Constants are affine.
    pub fn is_affine(&self) -> bool {
        self.derivs.as_ref().map_or(true, |d| d.affine)
    }

    /// Number of inputs the derivative record spans (0 for constants)
    pub fn num_inputs(&self) -> usize {
        self.derivs.as_ref().map_or(0, |d| d.dim())
    }

    /// First derivatives with respect to the seeded inputs
    pub fn gradient(&self) -> Option<&[f64]> {
        self.derivs.as_ref().map(|d| d.grad.as_slice())
    }

    /// Whether second derivatives are known
    ///
    /// Constants have (zero) second derivatives; a trainable value has
    /// them when it was traced from second-order seeds.
    pub fn has_second_order(&self) -> bool {
        self.derivs.as_ref().map_or(true, |d| d.hess.is_some())
    }

    /// Number of stored nonzero second derivatives (upper triangle)
    pub fn num_second_order_entries(&self) -> usize {
        self.derivs
            .as_ref()
            .and_then(|d| d.hess.as_ref())
            .map_or(0, BTreeMap::len)
    }

    /// Derivative with respect to input `index`, zero when out of range
    pub fn partial(&self, index: usize) -> f64 {
        self.gradient()
            .and_then(|g| g.get(index).copied())
            .unwrap_or(0.0)
    }

    /// Second derivative with respect to inputs `i` and `j`
    ///
    /// Zero when the entry is absent or second derivatives were not traced;
    /// check [`Var::has_second_order`] to tell the two apart.
    pub fn second_partial(&self, i: usize, j: usize) -> f64 {
        self.derivs
            .as_ref()
            .and_then(|d| d.hess.as_ref())
            .and_then(|h| h.get(&(i.min(j), i.max(j))).copied())
            .unwrap_or(0.0)
    }

    /// Same derivative record, different value
    ///
    /// Parameter substitution (shifting, batching) goes through here so
    /// the trainable marking survives.
    pub fn with_value(&self, value: f64) -> Self {
        Self {
            value,
            derivs: self.derivs.clone(),
        }
    }

    /// Drop the derivative record
    pub fn frozen(&self) -> Self {
        Self::constant(self.value)
    }

    /// `f(x)` given `f(x)`, `f'(x)` and `f''(x)`
    fn unary(&self, f0: f64, f1: f64, f2: f64) -> Var {
        let derivs = self.derivs.as_ref().map(|d| {
            let grad: Vec<f64> = d.grad.iter().map(|g| f1 * g).collect();
            let hess = d.hess.as_ref().map(|h| {
                let mut out: SecondOrder = h.iter().map(|(k, v)| (*k, f1 * v)).collect();
                if f2 != 0.0 {
                    let nz = nonzero(&d.grad);
                    for (i, gi) in nz.clone() {
                        for (j, gj) in nz.clone().filter(|(j, _)| *j >= i) {
                            bump(&mut out, i, j, f2 * gi * gj);
                        }
                    }
                }
                out
            });
            Arc::new(Derivatives {
                grad,
                hess,
                affine: false,
            })
        });
        Var { value: f0, derivs }
    }

    /// Compute sin(x)
    pub fn sin(&self) -> Var {
        let (s, c) = self.value.sin_cos();
        self.unary(s, c, -s)
    }

    /// Compute cos(x)
    pub fn cos(&self) -> Var {
        let (s, c) = self.value.sin_cos();
        self.unary(c, -s, -c)
    }

    /// Compute tan(x)
    pub fn tan(&self) -> Var {
        let t = self.value.tan();
        let sec2 = 1.0 + t * t;
        self.unary(t, sec2, 2.0 * t * sec2)
    }

    /// Compute exp(x)
    pub fn exp(&self) -> Var {
        let e = self.value.exp();
        self.unary(e, e, e)
    }

    /// Compute ln(x)
    pub fn ln(&self) -> Var {
        let x = self.value;
        self.unary(x.ln(), 1.0 / x, -1.0 / (x * x))
    }

    /// Compute sqrt(x)
    pub fn sqrt(&self) -> Var {
        let s = self.value.sqrt();
        self.unary(s, 0.5 / s, -0.25 / (s * s * s))
    }

    /// Compute x^n
    pub fn powi(&self, n: i32) -> Var {
        match n {
            0 => Var::constant(1.0),
            1 => self.clone(),
            _ => {
                let x = self.value;
                let nf = n as f64;
                self.unary(
                    x.powi(n),
                    nf * x.powi(n - 1),
                    nf * (nf - 1.0) * x.powi(n - 2),
                )
            }
        }
    }

    /// Compute 1/x
    pub fn recip(&self) -> Var {
        let x = self.value;
        self.unary(1.0 / x, -1.0 / (x * x), 2.0 / (x * x * x))
    }
}

fn scale(var: &Var, factor: f64) -> Var {
    Var {
        value: var.value * factor,
        derivs: var.derivs.as_ref().map(|d| Arc::new(d.scaled(factor))),
    }
}

fn add(a: &Var, b: &Var) -> Var {
    let value = a.value + b.value;
    let derivs = match (&a.derivs, &b.derivs) {
        (None, None) => None,
        (Some(d), None) | (None, Some(d)) => Some(d.clone()),
        (Some(da), Some(db)) => {
            let n = da.dim().max(db.dim());
            let grad = da
                .grad_to(n)
                .iter()
                .zip(db.grad_to(n))
                .map(|(x, y)| x + y)
                .collect();
            let hess = match (&da.hess, &db.hess) {
                (Some(ha), Some(hb)) => {
                    let mut out = ha.clone();
                    for (&(i, j), v) in hb {
                        bump(&mut out, i, j, *v);
                    }
                    Some(out)
                }
                _ => None,
            };
            Some(Arc::new(Derivatives {
                grad,
                hess,
                affine: da.affine && db.affine,
            }))
        }
    };
    Var { value, derivs }
}

fn sub(a: &Var, b: &Var) -> Var {
    add(a, &scale(b, -1.0))
}

fn mul(a: &Var, b: &Var) -> Var {
    match (&a.derivs, &b.derivs) {
        (None, None) => Var::constant(a.value * b.value),
        (Some(_), None) => scale(a, b.value),
        (None, Some(_)) => scale(b, a.value),
        (Some(da), Some(db)) => {
            let n = da.dim().max(db.dim());
            let (ga, gb) = (da.grad_to(n), db.grad_to(n));
            let grad = ga
                .iter()
                .zip(&gb)
                .map(|(x, y)| a.value * y + b.value * x)
                .collect();
            let hess = match (&da.hess, &db.hess) {
                (Some(ha), Some(hb)) => {
                    let mut out = SecondOrder::new();
                    for (&(i, j), v) in hb {
                        bump(&mut out, i, j, a.value * v);
                    }
                    for (&(i, j), v) in ha {
                        bump(&mut out, i, j, b.value * v);
                    }
                    // ga gbᵀ + gb gaᵀ; the diagonal receives both terms
                    for (p, x) in nonzero(&ga) {
                        for (q, y) in nonzero(&gb) {
                            let v = if p == q { 2.0 * x * y } else { x * y };
                            bump(&mut out, p, q, v);
                        }
                    }
                    Some(out)
                }
                _ => None,
            };
            Var {
                value: a.value * b.value,
                derivs: Some(Arc::new(Derivatives {
                    grad,
                    hess,
                    affine: false,
                })),
            }
        }
    }
}

fn div(a: &Var, b: &Var) -> Var {
    if b.is_constant() {
        scale(a, 1.0 / b.value)
    } else {
        mul(a, &b.recip())
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $func:ident) => {
        impl $trait<Var> for Var {
            type Output = Var;
            fn $method(self, rhs: Var) -> Var {
                $func(&self, &rhs)
            }
        }

        impl $trait<&Var> for Var {
            type Output = Var;
            fn $method(self, rhs: &Var) -> Var {
                $func(&self, rhs)
            }
        }

        impl $trait<Var> for &Var {
            type Output = Var;
            fn $method(self, rhs: Var) -> Var {
                $func(self, &rhs)
            }
        }

        impl $trait<&Var> for &Var {
            type Output = Var;
            fn $method(self, rhs: &Var) -> Var {
                $func(self, rhs)
            }
        }

        impl $trait<f64> for Var {
            type Output = Var;
            fn $method(self, rhs: f64) -> Var {
                $func(&self, &Var::constant(rhs))
            }
        }

        impl $trait<f64> for &Var {
            type Output = Var;
            fn $method(self, rhs: f64) -> Var {
                $func(self, &Var::constant(rhs))
            }
        }

        impl $trait<Var> for f64 {
            type Output = Var;
            fn $method(self, rhs: Var) -> Var {
                $func(&Var::constant(self), &rhs)
            }
        }

        impl $trait<&Var> for f64 {
            type Output = Var;
            fn $method(self, rhs: &Var) -> Var {
                $func(&Var::constant(self), rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, add);
impl_binary_op!(Sub, sub, sub);
impl_binary_op!(Mul, mul, mul);
impl_binary_op!(Div, div, div);

impl Neg for Var {
    type Output = Var;

    fn neg(self) -> Var {
        scale(&self, -1.0)
    }
}

impl Neg for &Var {
    type Output = Var;

    fn neg(self) -> Var {
        scale(self, -1.0)
    }
}

impl From<f64> for Var {
    fn from(value: f64) -> Self {
        Var::constant(value)
    }
}

impl From<&Var> for Var {
    fn from(var: &Var) -> Self {
        var.clone()
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_trainable() {
            write!(f, "{}*", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_has_no_derivatives() {
        let c = Var::constant(2.0);
        assert!(c.is_constant());
        assert!(c.is_affine());
        assert_eq!(c.gradient(), None);
        assert_eq!(c.partial(0), 0.0);
    }

    #[test]
    fn test_affine_combination() {
        let x = Var::seeded(1.0, 0, 2);
        let y = Var::seeded(3.0, 1, 2);
        let z = &x * 0.2 + &y * 2.0 - 1.0;

        assert_relative_eq!(z.value(), 0.2 + 6.0 - 1.0);
        assert!(z.is_affine());
        assert_eq!(z.gradient().unwrap(), &[0.2, 2.0]);
        assert!(z.has_second_order());
        assert_eq!(z.num_second_order_entries(), 0);
    }

    #[test]
    fn test_sin_second_order() {
        let x = Var::seeded(0.7, 0, 1);
        let y = x.sin();

        assert_relative_eq!(y.value(), 0.7_f64.sin());
        assert_relative_eq!(y.partial(0), 0.7_f64.cos());
        assert_relative_eq!(y.second_partial(0, 0), -(0.7_f64.sin()));
        assert!(!y.is_affine());
    }

    #[test]
    fn test_product_rule_cross_terms() {
        let x = Var::seeded(2.0, 0, 2);
        let y = Var::seeded(5.0, 1, 2);
        let z = &x * &y;

        assert_eq!(z.gradient().unwrap(), &[5.0, 2.0]);
        // d2(xy)/dxdy = 1
        assert_eq!(z.second_partial(0, 1), 1.0);
        assert_eq!(z.second_partial(1, 0), 1.0);
        assert_eq!(z.second_partial(0, 0), 0.0);
        assert_eq!(z.num_second_order_entries(), 1);
        assert!(!z.is_affine());
    }

    #[test]
    fn test_square_matches_powi() {
        let x = Var::seeded(1.5, 0, 1);
        let a = &x * &x;
        let b = x.powi(2);
        assert_relative_eq!(a.value(), b.value());
        assert_relative_eq!(a.partial(0), b.partial(0));
        assert_relative_eq!(a.second_partial(0, 0), b.second_partial(0, 0));
        assert_relative_eq!(a.second_partial(0, 0), 2.0);
    }

    #[test]
    fn test_division_by_variable() {
        let z = Var::seeded(0.71, 0, 1);
        let r = 1.0 / &z;
        assert_relative_eq!(r.partial(0), -1.0 / (0.71 * 0.71), epsilon = 1e-12);
        assert_relative_eq!(r.second_partial(0, 0), 2.0 / 0.71_f64.powi(3), epsilon = 1e-9);
    }

    #[test]
    fn test_trainable_pads_when_combined() {
        let t = Var::trainable(0.3);
        let x = Var::seeded(1.0, 1, 2);
        let s = &t + &x;

        assert!(s.is_trainable());
        assert_eq!(s.gradient().unwrap(), &[0.0, 1.0]);
    }

    #[test]
    fn test_with_value_keeps_marking() {
        let x = Var::seeded(1.0, 0, 1) * 3.0;
        let shifted = x.with_value(4.0);
        assert_eq!(shifted.value(), 4.0);
        assert_eq!(shifted.gradient(), x.gradient());
        assert!(shifted.frozen().is_constant());
    }

    #[test]
    fn test_first_order_seeds_skip_second_derivatives() {
        let x = Var::seeded_first_order(0.4, 0, 3);
        let y = Var::seeded_first_order(0.9, 2, 3);
        let z = (&x * &y).sin();

        assert!(!z.has_second_order());
        assert_eq!(z.num_second_order_entries(), 0);
        assert_relative_eq!(z.partial(0), 0.9 * 0.36_f64.cos(), epsilon = 1e-12);
        assert_relative_eq!(z.partial(2), 0.4 * 0.36_f64.cos(), epsilon = 1e-12);

        // one untracked operand is enough to drop them
        let w = &z + &Var::seeded(1.0, 1, 3);
        assert!(!w.has_second_order());
    }

    #[test]
    fn test_second_derivatives_stay_sparse() {
        let n = 50;
        let seeds: Vec<Var> = (0..n).map(|i| Var::seeded(0.1 * i as f64, i, n)).collect();
        let sum = seeds.iter().fold(Var::constant(0.0), |acc, x| acc + x);
        assert_eq!(sum.num_second_order_entries(), 0);

        // x3 * sin(x7): d²/dx3dx7 = cos(x7), d²/dx7² = -x3 sin(x7)
        let p = &seeds[3] * seeds[7].sin();
        assert_eq!(p.num_second_order_entries(), 2);
        assert_relative_eq!(p.second_partial(7, 3), 0.7_f64.cos(), epsilon = 1e-12);
        assert_relative_eq!(p.second_partial(7, 7), -0.3 * 0.7_f64.sin(), epsilon = 1e-12);
        assert_eq!(p.second_partial(3, 3), 0.0);
    }
}
