//! Error types for backend operations

use qtape_core::QuantumError;
use thiserror::Error;

/// Result type for simulator-internal operations
pub type StateResult<T> = std::result::Result<T, BackendError>;

/// Errors raised inside an execution backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Invalid wire index
    #[error("Invalid wire index {index} for {num_wires}-wire state")]
    InvalidWire { index: usize, num_wires: usize },

    /// State too large or malformed
    #[error("Invalid state dimension {dimension}")]
    InvalidDimension { dimension: usize },

    /// Dimension mismatch between a matrix and the wires it acts on
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Operation has no matrix the simulator could apply
    #[error("Operation '{0}' has no matrix representation")]
    MissingMatrix(String),

    /// Measurement cannot be evaluated by this backend
    #[error("Unsupported measurement: {0}")]
    UnsupportedMeasurement(String),

    /// Drawing samples failed
    #[error("Sampling failed: {0}")]
    Sampling(String),

    /// Backend capabilities exceeded
    #[error("Backend capability exceeded: {0}")]
    CapabilityExceeded(String),
}

impl From<BackendError> for QuantumError {
    fn from(err: BackendError) -> Self {
        QuantumError::Backend(err.to_string())
    }
}
