//! Shot configuration

use crate::{QuantumError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `repetitions` consecutive sampling batches of `shots` shots each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShotBatch {
    pub shots: u64,
    pub repetitions: u64,
}

impl ShotBatch {
    pub fn new(shots: u64, repetitions: u64) -> Self {
        Self { shots, repetitions }
    }
}

/// How measurement statistics are obtained
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Shots {
    /// Exact evaluation
    #[default]
    Analytic,
    /// One sampling batch of the given size
    Finite(u64),
    /// Several sampling batches; results gain a leading dimension
    Vector(Vec<ShotBatch>),
}

impl Shots {
    /// Fixed positive shot count
    pub fn finite(shots: u64) -> Result<Self> {
        if shots == 0 {
            return Err(QuantumError::InvalidArgument(
                "shot count must be positive".to_string(),
            ));
        }
        Ok(Self::Finite(shots))
    }

    /// Shot vector from `(shots, repetitions)` pairs
    pub fn from_pairs(pairs: &[(u64, u64)]) -> Result<Self> {
        if pairs.is_empty() {
            return Err(QuantumError::InvalidArgument(
                "shot vector must not be empty".to_string(),
            ));
        }
        let mut batches = Vec::with_capacity(pairs.len());
        for &(shots, repetitions) in pairs {
            if shots == 0 || repetitions == 0 {
                return Err(QuantumError::InvalidArgument(format!(
                    "invalid shot batch ({}, {})",
                    shots, repetitions
                )));
            }
            batches.push(ShotBatch::new(shots, repetitions));
        }
        Ok(Self::Vector(batches))
    }

    /// Whether evaluation is exact
    pub fn is_analytic(&self) -> bool {
        matches!(self, Shots::Analytic)
    }

    /// Total number of shots, `None` when analytic
    pub fn total(&self) -> Option<u64> {
        match self {
            Shots::Analytic => None,
            Shots::Finite(n) => Some(*n),
            Shots::Vector(batches) => Some(batches.iter().map(|b| b.shots * b.repetitions).sum()),
        }
    }

    /// Shot count of each sampling batch, repetitions expanded
    ///
    /// Analytic evaluation is one batch without a shot count.
    pub fn batches(&self) -> Vec<Option<u64>> {
        match self {
            Shots::Analytic => vec![None],
            Shots::Finite(n) => vec![Some(*n)],
            Shots::Vector(batches) => batches
                .iter()
                .flat_map(|b| std::iter::repeat(Some(b.shots)).take(b.repetitions as usize))
                .collect(),
        }
    }

    /// Number of sampling batches after expanding repetitions
    pub fn num_batches(&self) -> usize {
        match self {
            Shots::Vector(batches) => batches.iter().map(|b| b.repetitions as usize).sum(),
            _ => 1,
        }
    }

    /// Whether results carry a leading shot-batch dimension
    pub fn is_partitioned(&self) -> bool {
        self.num_batches() > 1
    }
}

impl From<Option<u64>> for Shots {
    fn from(shots: Option<u64>) -> Self {
        match shots {
            None | Some(0) => Shots::Analytic,
            Some(n) => Shots::Finite(n),
        }
    }
}

impl fmt::Display for Shots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shots::Analytic => write!(f, "analytic"),
            Shots::Finite(n) => write!(f, "{} shots", n),
            Shots::Vector(batches) => {
                write!(f, "[")?;
                for (i, b) in batches.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}x{}", b.shots, b.repetitions)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_shots_rejected() {
        assert!(Shots::finite(0).is_err());
        assert_eq!(Shots::finite(10).unwrap(), Shots::Finite(10));
    }

    #[test]
    fn test_shot_vector_batches() {
        let shots = Shots::from_pairs(&[(10, 2), (100, 1)]).unwrap();
        assert_eq!(shots.num_batches(), 3);
        assert!(shots.is_partitioned());
        assert_eq!(shots.total(), Some(120));
        assert_eq!(shots.batches(), vec![Some(10), Some(10), Some(100)]);
    }

    #[test]
    fn test_analytic_default() {
        let shots = Shots::default();
        assert!(shots.is_analytic());
        assert_eq!(shots.batches(), vec![None]);
        assert!(!shots.is_partitioned());
        assert_eq!(Shots::from(None), Shots::Analytic);
    }
}
