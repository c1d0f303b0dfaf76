//! Cost of a candidate decomposition
//!
//! When an operation offers several decompositions, gradient expansion
//! picks the one with the lowest cost. Ties go to the decomposition listed
//! first.

use qtape_core::Operation;

/// Cost function over a decomposed operation sequence
pub trait DecompositionCost: Send + Sync {
    /// Cost of replacing an operation by `ops`
    fn cost(&self, ops: &[Operation]) -> usize;
}

/// Number of trainable elementary operations
///
/// Each trainable operation contributes its own shifted evaluations, so
/// this counts how many operations a gradient has to differentiate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DifferentiableOpCount;

impl DecompositionCost for DifferentiableOpCount {
    fn cost(&self, ops: &[Operation]) -> usize {
        ops.iter().filter(|op| op.is_trainable()).count()
    }
}

impl<F> DecompositionCost for F
where
    F: Fn(&[Operation]) -> usize + Send + Sync,
{
    fn cost(&self, ops: &[Operation]) -> usize {
        self(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtape_core::{ops, Var};

    #[test]
    fn test_counts_trainable_operations() {
        let seq = vec![
            Operation::on(&ops::RZ, [Var::trainable(0.1)], &[0]).unwrap(),
            Operation::on(&ops::RY, [0.2], &[0]).unwrap(),
            Operation::on(&ops::CNOT, Vec::<f64>::new(), &[0, 1]).unwrap(),
            Operation::on(&ops::RZ, [Var::trainable(0.3)], &[1]).unwrap(),
        ];
        assert_eq!(DifferentiableOpCount.cost(&seq), 2);
    }

    #[test]
    fn test_closure_cost() {
        let by_length = |ops: &[Operation]| ops.len();
        let seq = vec![Operation::on(&ops::HADAMARD, Vec::<f64>::new(), &[0]).unwrap()];
        assert_eq!(by_length.cost(&seq), 1);
    }
}
