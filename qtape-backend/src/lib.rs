//! Execution backends for QTape
//!
//! This crate provides the execution side of the pipeline:
//! - [`QuantumBackend`]: the trait every execution target implements,
//!   with default decomposition and splitting transforms
//! - [`execute_batch`]: batched dispatch with a per-backend result cache
//! - [`split`]: Hamiltonian expansion and non-commuting measurement splitting
//! - [`StateVectorBackend`]: a dense state-vector reference backend
//!
//! # Architecture
//!
//! Backends expose capability metadata; the pipeline rewrites traces to
//! fit it (decompose, then split) and submits everything a call needs as
//! one batch through [`execute_batch`].

pub mod backend;
pub mod cache;
pub mod capabilities;
pub mod dispatch;
pub mod error;
pub mod split;
pub mod state;
pub mod state_vector;

pub use backend::{QuantumBackend, DEFAULT_EXPANSION_DEPTH};
pub use cache::{CacheStatistics, ResultCache};
pub use capabilities::{BackendCapabilities, OpSet, ShotModel};
pub use dispatch::execute_batch;
pub use error::{BackendError, StateResult};
pub use split::{default_split, group_observables, hamiltonian_expand, split_non_commuting};
pub use state_vector::{StateVectorBackend, StateVectorConfig};
