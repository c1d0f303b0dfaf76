//! Operation expansion with stopping criteria
//!
//! A [`Criterion`] is a named boolean function of an operation. Criteria
//! compose with `!`, `&` and `|`, and decide where recursive decomposition
//! stops:
//!
//! ```
//! use qtape_core::expand::{has_gen, has_multipar, is_trainable};
//!
//! // stop at anything with a generator, or at frozen multi-parameter ops
//! let stop_at = has_gen() | (has_multipar() & !is_trainable());
//! assert_eq!(stop_at.name(), "(has_gen | (has_multipar & !is_trainable))");
//! ```

use crate::operation::Operation;
use crate::trace::Trace;
use crate::transform::{TraceTransform, TransformResult};
use crate::Result;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

/// Named boolean function over operations
#[derive(Clone)]
pub struct Criterion {
    name: String,
    f: Arc<dyn Fn(&Operation) -> bool + Send + Sync>,
}

impl Criterion {
    /// Create a criterion
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Operation) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// Criterion that always holds
    pub fn always() -> Self {
        Self::new("always", |_| true)
    }

    /// Criterion that never holds
    pub fn never() -> Self {
        Self::new("never", |_| false)
    }

    /// Get the name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate on an operation
    #[inline]
    pub fn check(&self, op: &Operation) -> bool {
        (self.f)(op)
    }
}

impl Not for Criterion {
    type Output = Criterion;

    fn not(self) -> Criterion {
        let name = format!("!{}", self.name);
        Criterion::new(name, move |op| !self.check(op))
    }
}

impl BitAnd for Criterion {
    type Output = Criterion;

    fn bitand(self, rhs: Criterion) -> Criterion {
        let name = format!("({} & {})", self.name, rhs.name);
        Criterion::new(name, move |op| self.check(op) && rhs.check(op))
    }
}

impl BitOr for Criterion {
    type Output = Criterion;

    fn bitor(self, rhs: Criterion) -> Criterion {
        let name = format!("({} | {})", self.name, rhs.name);
        Criterion::new(name, move |op| self.check(op) || rhs.check(op))
    }
}

impl fmt::Debug for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Criterion({})", self.name)
    }
}

/// Operation has a generator
pub fn has_gen() -> Criterion {
    Criterion::new("has_gen", Operation::has_generator)
}

/// Operation declares a differentiation method
pub fn has_grad_method() -> Criterion {
    Criterion::new("has_grad_method", Operation::has_grad_method)
}

/// Operation takes more than one parameter
pub fn has_multipar() -> Criterion {
    Criterion::new("has_multipar", |op| op.num_params() > 1)
}

/// Operation takes no parameters
pub fn has_nopar() -> Criterion {
    Criterion::new("has_nopar", |op| op.num_params() == 0)
}

/// Operation has a generator that is a scaled unitary
pub fn has_unitary_gen() -> Criterion {
    Criterion::new("has_unitary_gen", |op| {
        op.generator().map_or(false, |g| g.unitary)
    })
}

/// Operation has a trainable parameter
pub fn is_trainable() -> Criterion {
    Criterion::new("is_trainable", Operation::is_trainable)
}

/// Operation can be differentiated without decomposing
pub fn has_own_gradient() -> Criterion {
    Criterion::new("has_own_gradient", Operation::has_own_gradient)
}

/// Operation kind is one of `names`
pub fn in_set(names: impl IntoIterator<Item = impl Into<String>>) -> Criterion {
    let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
    Criterion::new("in_set", move |op| names.contains(op.name()))
}

/// Recursively decompose operations not satisfying `stop_at`
///
/// Operations without a decomposition are kept as they are; deciding
/// whether that is acceptable is up to the caller. Depth 0 returns the
/// operations unchanged.
pub fn expand_operations(
    ops: &[Operation],
    depth: usize,
    stop_at: &Criterion,
) -> Result<Vec<Operation>> {
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        if depth == 0 || stop_at.check(op) {
            out.push(op.clone());
            continue;
        }
        match op.decompose() {
            Some(decomposed) => out.extend(expand_operations(&decomposed?, depth - 1, stop_at)?),
            None => out.push(op.clone()),
        }
    }
    Ok(out)
}

/// Expand a trace's operations up to `depth` levels
pub fn expand(trace: &Trace, depth: usize, stop_at: &Criterion) -> Result<Trace> {
    if depth == 0 {
        return Ok(trace.clone());
    }
    let ops = expand_operations(trace.operations(), depth, stop_at)?;
    trace.with_operations(ops)
}

/// Expansion as a reusable transform
#[derive(Debug, Clone)]
pub struct Expansion {
    depth: usize,
    stop_at: Criterion,
}

impl Expansion {
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn stop_at(&self) -> &Criterion {
        &self.stop_at
    }

    /// Expand one trace
    pub fn expand(&self, trace: &Trace) -> Result<Trace> {
        expand(trace, self.depth, &self.stop_at)
    }
}

/// Build an expansion transform
pub fn expand_fn(depth: usize, stop_at: Criterion) -> Expansion {
    Expansion { depth, stop_at }
}

impl TraceTransform for Expansion {
    fn name(&self) -> &str {
        "expand"
    }

    fn apply(&self, trace: &Trace) -> Result<TransformResult> {
        Ok(TransformResult::identity(self.expand(trace)?))
    }
}
