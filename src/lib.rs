//! Warden: Agent Resource and Lifecycle Management
//!
//! Admits a large, dynamically sized population of lightweight agents onto a
//! fixed memory pool, keeps each one healthy, and grows or shrinks the
//! population as system memory pressure changes.

pub mod agent;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod logging;
pub mod memory;
pub mod models;
pub mod offload;
pub mod signal;
pub mod spawner;
pub mod stream;
pub mod types;

pub use agent::{Agent, AgentConfig, DutyContext, DutyError, Strategy, StrategyFactory};
pub use config::{ConfigLoader, WardenConfig};
pub use directory::{AgentRecord, ResourceDirectory};
pub use error::WardenError;
pub use memory::{MemoryPool, Slab};
pub use models::{FileModelLoader, ModelHandle, ModelLoader, ModelRegistry};
pub use spawner::{AgentSpawner, SpawnResult, SwarmSnapshot};
pub use stream::{EventListener, EventStream, StreamEvent, SubscriptionHandle};
pub use types::{AgentId, AgentStatus, SlabId};
