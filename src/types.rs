//! Core types shared by the resource manager.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identity of an agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Generate a fresh random id (UUID v4)
    pub fn generate() -> Self {
        AgentId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        AgentId(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        AgentId(value)
    }
}

/// Identity of one allocation in the memory pool. Never reused within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlabId(pub u64);

impl fmt::Display for SlabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slab#{}", self.0)
    }
}

/// Agent lifecycle status
///
/// `Initializing -> Active -> Degraded -> Terminated`, with `Degraded -> Active`
/// on successful reinitialization. `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Initializing,
    Active,
    Degraded,
    Terminated,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        self == AgentStatus::Terminated
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    ///
    /// Initialization may fail straight into `Degraded`, and any live state may
    /// be terminated (eviction, failed restart, shutdown).
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Initializing, Active) | (Initializing, Degraded) => true,
            (Active, Degraded) => true,
            (Degraded, Active) => true,
            (a, b) => a == b,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Initializing => "initializing",
            AgentStatus::Active => "active",
            AgentStatus::Degraded => "degraded",
            AgentStatus::Terminated => "terminated",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
