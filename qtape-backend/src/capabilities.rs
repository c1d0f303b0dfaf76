//! Backend capabilities and constraints

use qtape_core::{ops, ReturnType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// How a backend obtains measurement statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShotModel {
    /// Exact evaluation available; finite shots are simulated by sampling
    Analytic,
    /// Only finite-sample execution (hardware-like)
    Sampled,
}

/// Capabilities of an execution backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendCapabilities {
    /// Maximum number of wires supported
    pub num_wires: usize,

    /// Operation kinds executed without decomposition
    pub native_ops: OpSet,

    /// Supported measurement return types
    pub return_types: BTreeSet<ReturnType>,

    /// Shot model
    pub shot_model: ShotModel,

    /// Whether several traces can be submitted in one call
    pub supports_batch: bool,

    /// Whether Hamiltonian expectation values are measured directly
    pub supports_hamiltonian: bool,

    /// Whether measurements that do not commute qubit-wise may share a trace
    pub supports_noncommuting_measurements: bool,

    /// Backend-specific metadata
    pub metadata: HashMap<String, String>,
}

impl BackendCapabilities {
    /// Capabilities of an exact simulator of the standard operation set
    pub fn simulator(num_wires: usize) -> Self {
        Self {
            num_wires,
            native_ops: OpSet::standard(),
            return_types: [
                ReturnType::Expectation,
                ReturnType::Variance,
                ReturnType::Probability,
                ReturnType::State,
                ReturnType::Sample,
            ]
            .into_iter()
            .collect(),
            shot_model: ShotModel::Analytic,
            supports_batch: true,
            supports_hamiltonian: true,
            supports_noncommuting_measurements: true,
            metadata: HashMap::new(),
        }
    }

    /// Check if an operation kind is native
    pub fn is_native(&self, name: &str) -> bool {
        self.native_ops.contains(name)
    }

    /// Check if a return type is supported
    pub fn supports_return_type(&self, return_type: ReturnType) -> bool {
        self.return_types.contains(&return_type)
    }
}

/// Set of operation kinds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpSet {
    names: BTreeSet<String>,
}

impl OpSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Every kind of the standard operation set
    pub fn standard() -> Self {
        ops::STANDARD.iter().map(|def| def.name).collect()
    }

    /// Insert an operation kind
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// Check if an operation kind is in the set
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Iterate over the names
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    /// Get the number of kinds in the set
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for OpSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}
