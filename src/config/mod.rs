//! Configuration
//!
//! `WardenConfig` gathers every tunable with a documented default. Sources are
//! layered by `ConfigLoader`: built-in defaults, an optional TOML file, then
//! `WARDEN__*` environment variables.

mod loader;

pub use loader::ConfigLoader;

use crate::agent::AgentConfig;
use crate::error::WardenError;
use crate::logging::LoggingConfig;
use crate::spawner::SpawnerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Memory pool sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Fixed arena size
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: usize,

    /// Slab handed to each registered agent
    #[serde(default = "default_slab_bytes")]
    pub slab_bytes: usize,
}

fn default_capacity_bytes() -> usize {
    1024 * 1024 * 1024
}

fn default_slab_bytes() -> usize {
    1024 * 1024
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: default_capacity_bytes(),
            slab_bytes: default_slab_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Most recent events retained
    #[serde(default = "default_stream_capacity")]
    pub capacity: usize,
}

fn default_stream_capacity() -> usize {
    1000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            capacity: default_stream_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffloadConfig {
    /// Concurrent CPU-bound tasks
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    32
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// Where `FileModelLoader` finds artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_models_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_models_extension")]
    pub extension: String,
}

fn default_models_directory() -> PathBuf {
    PathBuf::from("models")
}

fn default_models_extension() -> String {
    "pt".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            directory: default_models_directory(),
            extension: default_models_extension(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub offload: OffloadConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub spawner: SpawnerConfig,

    /// Agent config per type tag; unknown tags use `AgentConfig::default()`
    #[serde(default)]
    pub agent_types: HashMap<String, AgentConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WardenConfig {
    /// Reject settings the components cannot run with
    pub fn validate(&self) -> Result<(), WardenError> {
        let mut errors = Vec::new();

        if self.pool.slab_bytes == 0 {
            errors.push("pool.slab_bytes must be greater than 0".to_string());
        }
        if self.pool.slab_bytes > self.pool.capacity_bytes {
            errors.push(format!(
                "pool.slab_bytes ({}) exceeds pool.capacity_bytes ({})",
                self.pool.slab_bytes, self.pool.capacity_bytes
            ));
        }
        let default_needs = AgentConfig::default().slab_bytes_required();
        if self.pool.slab_bytes < default_needs {
            errors.push(format!(
                "pool.slab_bytes ({}) is smaller than the {} bytes the default agent config reserves",
                self.pool.slab_bytes, default_needs
            ));
        }
        for (name, agent) in &self.agent_types {
            let needs = agent.slab_bytes_required();
            if self.pool.slab_bytes < needs {
                errors.push(format!(
                    "pool.slab_bytes ({}) is smaller than the {} bytes agent_types.{} reserves",
                    self.pool.slab_bytes, needs, name
                ));
            }
        }
        if self.stream.capacity == 0 {
            errors.push("stream.capacity must be greater than 0".to_string());
        }
        if self.offload.workers == 0 {
            errors.push("offload.workers must be greater than 0".to_string());
        }

        let spawner = &self.spawner;
        if spawner.batch_size == 0 {
            errors.push("spawner.batch_size must be greater than 0".to_string());
        }
        if !(spawner.admission_fraction > 0.0 && spawner.admission_fraction <= 1.0) {
            errors.push(format!(
                "spawner.admission_fraction must be in (0, 1], got {}",
                spawner.admission_fraction
            ));
        }
        if spawner.low_watermark_pct >= spawner.high_watermark_pct {
            errors.push(format!(
                "spawner.low_watermark_pct ({}) must be below high_watermark_pct ({})",
                spawner.low_watermark_pct, spawner.high_watermark_pct
            ));
        }
        if spawner.per_agent_memory_bytes == 0 {
            errors.push("spawner.per_agent_memory_bytes must be greater than 0".to_string());
        }

        for (name, agent) in &self.agent_types {
            if agent.ai_enabled && agent.models.iter().any(|m| m.trim().is_empty()) {
                errors.push(format!("agent_types.{}.models contains an empty name", name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(WardenError::ConfigError(errors.join("; ")))
        }
    }

    pub fn agent_config(&self, agent_type: &str) -> AgentConfig {
        self.agent_types.get(agent_type).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WardenConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pool.slab_bytes, 1024 * 1024);
        assert_eq!(config.stream.capacity, 1000);
        assert_eq!(config.offload.workers, 32);
        assert_eq!(config.spawner.batch_size, 100);
        assert_eq!(config.spawner.admission_fraction, 0.8);
    }

    #[test]
    fn test_watermarks_must_be_ordered() {
        let mut config = WardenConfig::default();
        config.spawner.low_watermark_pct = 90.0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("low_watermark_pct"));
    }

    #[test]
    fn test_collects_every_problem() {
        let mut config = WardenConfig::default();
        config.spawner.admission_fraction = 1.5;
        config.spawner.batch_size = 0;
        config.pool.slab_bytes = config.pool.capacity_bytes + 1;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("admission_fraction"));
        assert!(err.contains("batch_size"));
        assert!(err.contains("exceeds"));
    }

    #[test]
    fn test_slab_must_hold_reserved_regions() {
        let mut config = WardenConfig::default();
        config.pool.slab_bytes = 1024;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("default agent config reserves"));

        config.pool.slab_bytes = 2048;
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_agent_type_gets_default() {
        let mut config = WardenConfig::default();
        config
            .agent_types
            .insert("watcher".to_string(), AgentConfig::idle());
        assert!(!config.agent_config("watcher").trading_enabled);
        assert!(config.agent_config("sniper").trading_enabled);
    }
}
