//! Error types for QTape

use thiserror::Error;

/// Errors raised while tracing, transforming, executing or differentiating
/// a circuit trace
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QuantumError {
    /// No backend-native form exists for an operation within the expansion depth
    #[error("Unsupported operation '{name}': {reason}")]
    UnsupportedOperation { name: String, reason: String },

    /// A transform's expand and main entry points disagree in signature
    #[error(
        "Signature mismatch in transform '{transform}': expand entry point takes ({expand}), \
         transform entry point takes ({main})"
    )]
    SignatureMismatch {
        transform: String,
        expand: String,
        main: String,
    },

    /// Operation has neither a gradient recipe nor a recipe-bearing decomposition
    #[error("Gradient undefined for '{name}': {reason}")]
    GradientUndefined { name: String, reason: String },

    /// Batched arguments or combining-function inputs disagree in shape
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Wire index outside the trace's register
    #[error("Invalid wire {wire}: trace has only {num_wires} wires")]
    InvalidWire { wire: usize, num_wires: usize },

    /// Operation applied to the wrong number of wires
    #[error("Operation '{name}' acts on {expected} wires, but {actual} were provided")]
    InvalidWireCount {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Operation given the wrong number of parameters
    #[error("Operation '{name}' takes {expected} parameters, but {actual} were provided")]
    InvalidParameterCount {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Same wire listed twice in one operation
    #[error("Duplicate wire {0} in operation")]
    DuplicateWire(usize),

    /// Call or transform argument rejected
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Trace is malformed for the requested use
    #[error("Invalid trace: {0}")]
    InvalidTrace(String),

    /// Requested derivative order is above the configured bound
    #[error("Derivative order {requested} exceeds the maximum order {max}")]
    DerivativeOrderExceeded { requested: usize, max: usize },

    /// Frequency spectrum cannot be derived for this trace
    #[error("Spectrum undefined: {0}")]
    SpectrumUndefined(String),

    /// Failure reported by an execution backend
    #[error("Backend error: {0}")]
    Backend(String),
}

impl QuantumError {
    /// Create an unsupported operation error
    pub fn unsupported(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a gradient undefined error
    pub fn gradient_undefined(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::GradientUndefined {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    /// Create an invalid wire count error
    pub fn invalid_wire_count(name: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::InvalidWireCount {
            name: name.into(),
            expected,
            actual,
        }
    }
}
