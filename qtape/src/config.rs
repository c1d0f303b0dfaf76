//! Binding configuration

use qtape_core::{QuantumError, Result, Shots};
use qtape_grad::{
    DifferentiationEngine, FiniteDiffConfig, GradientMethod, ParamShiftConfig,
    DEFAULT_GRADIENT_DEPTH,
};
use serde::{Deserialize, Serialize};

/// How a binding differentiates its circuit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DiffMethod {
    /// Analytic shift rules where available
    ParameterShift,
    /// Central finite differences with step `h`
    FiniteDiff { h: f64 },
    /// Derivative requests are refused
    None,
}

impl Default for DiffMethod {
    fn default() -> Self {
        DiffMethod::ParameterShift
    }
}

/// Where operations without a gradient rule get decomposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpansionStrategy {
    /// Decompose into the backend's native set first, then differentiate
    #[default]
    Device,
    /// Expand only what the gradient needs, differentiate, then let the
    /// backend decompose the shifted traces
    Gradient,
}

/// Configuration of a [`QNode`](crate::QNode)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QNodeConfig {
    /// Differentiation method
    ///
    /// Default: parameter shift
    pub diff_method: DiffMethod,

    /// Highest derivative order the binding computes
    ///
    /// Default: 1
    pub max_diff: usize,

    /// Whether the quantum function may change structure between calls
    ///
    /// When false, the first trace is reused and later calls only
    /// substitute parameter values.
    ///
    /// Default: true
    pub mutable: bool,

    /// Decomposition order relative to differentiation
    ///
    /// Default: [`ExpansionStrategy::Device`]
    pub expansion_strategy: ExpansionStrategy,

    /// Bound on gradient expansion
    ///
    /// Default: 10
    pub expansion_depth: usize,

    /// Shots stored on every trace
    ///
    /// Default: analytic
    pub shots: Shots,
}

impl Default for QNodeConfig {
    fn default() -> Self {
        Self {
            diff_method: DiffMethod::ParameterShift,
            max_diff: 1,
            mutable: true,
            expansion_strategy: ExpansionStrategy::Device,
            expansion_depth: DEFAULT_GRADIENT_DEPTH,
            shots: Shots::Analytic,
        }
    }
}

impl QNodeConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for second-order work: Hessians and curvature
    pub fn second_order() -> Self {
        Self {
            max_diff: 2,
            ..Default::default()
        }
    }

    /// Set the differentiation method
    pub fn with_diff_method(mut self, method: DiffMethod) -> Self {
        self.diff_method = method;
        self
    }

    /// Set the maximum derivative order
    pub fn with_max_diff(mut self, max_diff: usize) -> Self {
        self.max_diff = max_diff;
        self
    }

    /// Mark the quantum function as structurally fixed
    pub fn non_mutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    /// Set the expansion strategy
    pub fn with_expansion_strategy(mut self, strategy: ExpansionStrategy) -> Self {
        self.expansion_strategy = strategy;
        self
    }

    /// Set the gradient expansion depth
    pub fn with_expansion_depth(mut self, depth: usize) -> Self {
        self.expansion_depth = depth;
        self
    }

    /// Set the default shots
    pub fn with_shots(mut self, shots: Shots) -> Self {
        self.shots = shots;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let DiffMethod::FiniteDiff { h } = self.diff_method {
            if h.is_nan() || h <= 0.0 {
                return Err(QuantumError::InvalidArgument(format!(
                    "finite-difference step must be positive, got {}",
                    h
                )));
            }
        }
        if self.diff_method != DiffMethod::None && self.max_diff == 0 {
            return Err(QuantumError::InvalidArgument(
                "max_diff must be at least 1 when differentiation is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Engine for the configured method, if differentiation is enabled
    pub(crate) fn engine(&self) -> Option<DifferentiationEngine> {
        let method = match self.diff_method {
            DiffMethod::ParameterShift => GradientMethod::ParamShift(ParamShiftConfig::default()),
            DiffMethod::FiniteDiff { h } => GradientMethod::FiniteDiff(FiniteDiffConfig {
                h,
                ..Default::default()
            }),
            DiffMethod::None => return None,
        };
        Some(
            DifferentiationEngine::new(method)
                .with_max_order(self.max_diff)
                .with_expansion_depth(self.expansion_depth),
        )
    }
}

/// Per-call overrides
///
/// Overrides apply to the traces of one call; the binding's stored
/// configuration is left as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    /// Shots for this call only
    pub shots: Option<Shots>,
}

impl CallOptions {
    /// Override the shots of one call
    pub fn with_shots(shots: Shots) -> Self {
        Self { shots: Some(shots) }
    }
}
