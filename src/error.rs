//! Error types
//!
//! A single error enum covers the resource manager. Most variants are recoverable
//! at the call site; only `RestartFailed` and configuration errors are terminal.

use crate::types::{AgentId, SlabId};
use thiserror::Error;

/// Errors surfaced by the pool, registry, directory, agents and spawner
#[derive(Debug, Error)]
pub enum WardenError {
    /// Memory pool cannot satisfy the request; the caller should ask for less
    #[error("Out of memory: requested {requested} bytes, {available} bytes free in pool")]
    OutOfMemory { requested: usize, available: usize },

    /// An agent with this id is already registered
    #[error("Agent already registered: {0}")]
    DuplicateAgent(AgentId),

    /// No agent with this id is registered or tracked
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    /// A model artifact could not be loaded; the next `get` retries
    #[error("Failed to load model '{name}': {cause}")]
    ModelLoadFailed { name: String, cause: String },

    /// Agent did not answer a health probe in time
    #[error("Health probe timed out for agent {0}")]
    HealthProbeTimeout(AgentId),

    /// Agent could not be brought back after a failure; terminal for that agent
    #[error("Restart failed for agent {id}: {reason}")]
    RestartFailed { id: AgentId, reason: String },

    /// Slab was written or read after it went back to the pool
    #[error("Slab {0} has been released")]
    SlabReleased(SlabId),

    /// Access outside the slab's bounds
    #[error("Slab {slab} access out of bounds: offset {offset} + len {len} > {capacity}")]
    SlabOutOfBounds {
        slab: SlabId,
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// Offloaded work panicked or its worker pool shut down
    #[error("Offloaded task failed: {0}")]
    OffloadFailed(String),

    /// A stream listener rejected an event
    #[error("Listener error: {0}")]
    Listener(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration source error: {0}")]
    Config(#[from] config::ConfigError),
}

impl WardenError {
    /// Whether the caller can continue after this error.
    ///
    /// Restart failures end the affected agent's life, and configuration
    /// errors cannot be fixed without operator input.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            WardenError::RestartFailed { .. } | WardenError::ConfigError(_) | WardenError::Config(_)
        )
    }
}
