//! Admission control and batch spawning

use crate::common::{directory, roomy_memory, spawner, CountingLoader, UNIT};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warden::agent::{AgentConfig, DutyContext, DutyError, Strategy, StrategyFactory};
use warden::spawner::{FixedMemory, SpawnerConfig};
use warden::{AgentSpawner, AgentStatus, ResourceDirectory};

#[tokio::test]
async fn test_pool_of_ten_units_admits_ten_of_fifteen() {
    let dir = directory(10, Arc::new(CountingLoader::default()));
    let spawner = spawner(dir.clone(), roomy_memory(), SpawnerConfig::default());

    let result = spawner.spawn_agents(15, "standard").await;
    assert_eq!(result.requested, 15);
    assert_eq!(result.spawned, 10);
    assert_eq!(result.out_of_memory, 5);
    assert_eq!(spawner.agent_count(), 10);
    assert_eq!(dir.agent_count(), 10);

    let mut slabs: Vec<_> = dir.pool().live_slabs();
    slabs.sort_by_key(|s| s.offset);
    assert_eq!(slabs.len(), 10);
    for pair in slabs.windows(2) {
        assert!(pair[0].offset + pair[0].len <= pair[1].offset);
    }
    assert!(slabs.iter().all(|s| s.len == UNIT));
    let owners: HashSet<_> = slabs.iter().map(|s| s.owner.clone()).collect();
    assert_eq!(owners.len(), 10);
    assert_eq!(dir.pool().allocated(), 10 * UNIT);

    spawner.shutdown().await;
    assert_eq!(dir.pool().allocated(), 0);
}

#[tokio::test]
async fn test_request_beyond_memory_ceiling_is_clamped() {
    // 9 units free at 0.8 admits floor(7.2) = 7
    let memory = Arc::new(FixedMemory::new(9 * UNIT as u64, 70.0));
    let dir = directory(100, Arc::new(CountingLoader::default()));
    let config = SpawnerConfig {
        per_agent_memory_bytes: UNIT as u64,
        batch_size: 3,
        ..SpawnerConfig::default()
    };
    let spawner = spawner(dir.clone(), memory.clone(), config);

    let result = spawner.spawn_agents(1_000_000, "idle").await;
    assert_eq!(result.admitted, 7);
    assert_eq!(result.spawned, 7);
    assert_eq!(result.agent_ids.len(), 7);

    // nothing free, nothing admitted
    memory.set_available(0);
    let none = spawner.spawn_agents(5, "idle").await;
    assert_eq!(none.admitted, 0);
    assert_eq!(spawner.agent_count(), 7);
    spawner.shutdown().await;
}

/// Strategy that checks, on each agent's first trade, whether any agent is
/// still initializing
struct BatchWitness {
    directory: Arc<ResourceDirectory>,
    started: AtomicBool,
    early_runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Strategy for BatchWitness {
    async fn trade(&self, _ctx: &DutyContext) -> Result<(), DutyError> {
        if !self.started.swap(true, Ordering::SeqCst) {
            let initializing = self
                .directory
                .records()
                .iter()
                .filter(|r| r.status() == AgentStatus::Initializing)
                .count();
            self.early_runs.fetch_add(initializing, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct WitnessFactory {
    directory: Arc<ResourceDirectory>,
    early_runs: Arc<AtomicUsize>,
}

impl StrategyFactory for WitnessFactory {
    fn create(&self, _agent_type: &str, _config: &AgentConfig) -> Arc<dyn Strategy> {
        Arc::new(BatchWitness {
            directory: self.directory.clone(),
            started: AtomicBool::new(false),
            early_runs: self.early_runs.clone(),
        })
    }
}

#[tokio::test]
async fn test_batch_initializes_before_any_agent_runs() {
    // slow model loads stretch initialization across the whole batch
    let dir = directory(32, Arc::new(CountingLoader::slow(30)));
    let early_runs = Arc::new(AtomicUsize::new(0));
    let spawner = Arc::new(
        AgentSpawner::new(dir.clone(), SpawnerConfig::default(), roomy_memory())
            .with_agent_types(crate::common::agent_types())
            .with_strategies(Arc::new(WitnessFactory {
                directory: dir.clone(),
                early_runs: early_runs.clone(),
            })),
    );

    let result = spawner.spawn_agents(12, "standard").await;
    assert_eq!(result.spawned, 12);
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(early_runs.load(Ordering::SeqCst), 0);
    let snapshot = spawner.snapshot();
    assert_eq!(snapshot.count_with_status(AgentStatus::Active), 12);
    spawner.shutdown().await;
}
