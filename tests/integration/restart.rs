//! Health probing and single-attempt restarts

use crate::common::{agent_types, directory, roomy_memory, CountingLoader};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warden::agent::{AgentConfig, DutyContext, DutyError, Strategy, StrategyFactory};
use warden::spawner::SpawnerConfig;
use warden::{AgentSpawner, AgentStatus, WardenError};

/// Agent type whose only model is never cached by other agents
fn fragile_types() -> std::collections::HashMap<String, AgentConfig> {
    let mut types = agent_types();
    types.insert(
        "fragile".to_string(),
        AgentConfig {
            trading_enabled: false,
            monitoring_enabled: false,
            risk_enabled: false,
            models: vec!["volatile_model".to_string()],
            analyze_interval_ms: 10,
            ..AgentConfig::default()
        },
    );
    types
}

#[tokio::test]
async fn test_failed_restart_terminates_and_is_not_retried() {
    let loader = Arc::new(CountingLoader::default());
    loader.set_failing(true);
    let dir = directory(8, loader.clone());
    let spawner = Arc::new(
        AgentSpawner::new(dir.clone(), SpawnerConfig::default(), roomy_memory())
            .with_agent_types(fragile_types()),
    );

    let spawned = spawner.spawn_agents(1, "fragile").await;
    assert_eq!(spawned.spawned, 1);
    assert_eq!(spawned.degraded, 1);
    let victim = spawned.agent_ids[0].clone();
    let healthy = spawner.spawn_agents(1, "idle").await.agent_ids[0].clone();
    assert_eq!(loader.calls(), 1);

    let report = spawner.monitor_once().await;
    assert_eq!(report.probed, 2);
    assert_eq!(report.unhealthy, 1);
    assert_eq!(report.restarted, 0);
    assert_eq!(report.restart_failed, 1);
    assert_eq!(loader.calls(), 2);

    assert!(spawner.agent(&victim).is_none());
    assert!(dir.record(&victim).is_none());
    assert!(spawner.agent(&healthy).is_some());

    let snapshot = spawner.snapshot();
    assert_eq!(snapshot.restarts_by_agent.get(&victim), Some(&1));
    assert_eq!(snapshot.terminated_total, 1);
    assert!(!snapshot.statuses.contains_key(&victim));

    // later passes do not touch the terminated agent again
    loader.set_failing(false);
    let later = spawner.monitor_once().await;
    assert_eq!(later.probed, 1);
    assert_eq!(later.unhealthy, 0);
    assert_eq!(loader.calls(), 2);
    assert_eq!(spawner.snapshot().restarts_total, 1);
    spawner.shutdown().await;
}

#[tokio::test]
async fn test_direct_restart_failure_is_terminal_error() {
    let loader = Arc::new(CountingLoader::default());
    loader.set_failing(true);
    let dir = directory(4, loader.clone());
    let spawner = Arc::new(
        AgentSpawner::new(dir.clone(), SpawnerConfig::default(), roomy_memory())
            .with_agent_types(fragile_types()),
    );
    let id = spawner.spawn_agents(1, "fragile").await.agent_ids[0].clone();

    let err = spawner.restart_agent(&id).await.unwrap_err();
    match &err {
        WardenError::RestartFailed { id: failed, reason } => {
            assert_eq!(failed, &id);
            assert!(reason.contains("volatile_model"));
        }
        other => panic!("expected RestartFailed, got {other}"),
    }
    assert!(!err.is_recoverable());
    assert_eq!(dir.pool().allocated(), 0);
    spawner.shutdown().await;
}

#[tokio::test]
async fn test_recovered_dependency_restores_agent() {
    let loader = Arc::new(CountingLoader::default());
    loader.set_failing(true);
    let dir = directory(4, loader.clone());
    let spawner = Arc::new(
        AgentSpawner::new(dir.clone(), SpawnerConfig::default(), roomy_memory())
            .with_agent_types(fragile_types()),
    );
    let id = spawner.spawn_agents(1, "fragile").await.agent_ids[0].clone();
    assert_eq!(spawner.agent(&id).unwrap().status(), AgentStatus::Degraded);

    loader.set_failing(false);
    let report = spawner.monitor_once().await;
    assert_eq!(report.restarted, 1);
    let agent = spawner.agent(&id).unwrap();
    assert_eq!(agent.status(), AgentStatus::Active);
    assert_eq!(agent.agent_type(), "fragile");
    assert_eq!(dir.pool().live_count(), 1);
    spawner.shutdown().await;
}

/// First incarnation never answers its health check; replacements do
struct HangOnce {
    created: AtomicUsize,
}

struct Hanging;

#[async_trait]
impl Strategy for Hanging {
    async fn health(&self, _ctx: &DutyContext) -> Result<(), DutyError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

struct Responsive;

impl Strategy for Responsive {}

impl StrategyFactory for HangOnce {
    fn create(&self, _agent_type: &str, _config: &AgentConfig) -> Arc<dyn Strategy> {
        if self.created.fetch_add(1, Ordering::SeqCst) == 0 {
            Arc::new(Hanging)
        } else {
            Arc::new(Responsive)
        }
    }
}

#[tokio::test]
async fn test_probe_timeout_triggers_restart() {
    let dir = directory(4, Arc::new(CountingLoader::default()));
    let config = SpawnerConfig {
        probe_timeout_ms: 50,
        ..SpawnerConfig::default()
    };
    let spawner = Arc::new(
        AgentSpawner::new(dir.clone(), config, roomy_memory())
            .with_agent_types(agent_types())
            .with_strategies(Arc::new(HangOnce {
                created: AtomicUsize::new(0),
            })),
    );
    let id = spawner.spawn_agents(1, "idle").await.agent_ids[0].clone();

    let started = std::time::Instant::now();
    let report = spawner.monitor_once().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.unhealthy, 1);
    assert_eq!(report.restarted, 1);

    let healthy = spawner.monitor_once().await;
    assert_eq!(healthy.unhealthy, 0);
    assert_eq!(spawner.snapshot().restarts_by_agent.get(&id), Some(&1));
    spawner.shutdown().await;
}
