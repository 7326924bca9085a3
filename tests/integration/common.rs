//! Shared fixtures for integration tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warden::agent::AgentConfig;
use warden::config::{OffloadConfig, PoolConfig, StreamConfig};
use warden::models::{Model, ModelLoader};
use warden::spawner::{FixedMemory, SpawnerConfig};
use warden::{AgentSpawner, ResourceDirectory};

pub const UNIT: usize = 4096;

/// Loader that counts calls and can be switched to fail
#[derive(Default)]
pub struct CountingLoader {
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
    pub delay_ms: u64,
}

impl CountingLoader {
    pub fn slow(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for CountingLoader {
    async fn load(&self, name: &str) -> anyhow::Result<Model> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("artifact store offline");
        }
        Ok(Model::new(name, name.as_bytes().to_vec()))
    }
}

pub fn directory(units: usize, loader: Arc<dyn ModelLoader>) -> Arc<ResourceDirectory> {
    Arc::new(ResourceDirectory::new(
        &PoolConfig {
            capacity_bytes: units * UNIT,
            slab_bytes: UNIT,
        },
        &StreamConfig { capacity: 64 },
        &OffloadConfig { workers: 4 },
        loader,
    ))
}

/// Agent types used across the tests: "standard" runs every duty with fast
/// cadences, "idle" runs none.
pub fn agent_types() -> HashMap<String, AgentConfig> {
    let mut types = HashMap::new();
    types.insert(
        "standard".to_string(),
        AgentConfig {
            trade_interval_ms: 10,
            analyze_interval_ms: 10,
            monitor_interval_ms: 10,
            risk_interval_ms: 10,
            ..AgentConfig::default()
        },
    );
    types.insert("idle".to_string(), AgentConfig::idle());
    types
}

pub fn roomy_memory() -> Arc<FixedMemory> {
    Arc::new(FixedMemory::new(1 << 40, 70.0))
}

pub fn spawner(
    directory: Arc<ResourceDirectory>,
    memory: Arc<FixedMemory>,
    config: SpawnerConfig,
) -> Arc<AgentSpawner> {
    Arc::new(AgentSpawner::new(directory, config, memory).with_agent_types(agent_types()))
}
