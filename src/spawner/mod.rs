//! Agent Spawner
//!
//! Admission control and lifecycle front end for the swarm. Creates agents in
//! batches under a memory-derived ceiling, probes their health on an interval,
//! restarts unhealthy agents once, and scales the population between two
//! memory watermarks.

mod admission;
mod config;
mod health;
mod memory;
mod metrics;
mod scaling;

pub use admission::admissible;
pub use config::SpawnerConfig;
pub use health::HealthPolicy;
pub use memory::{FixedMemory, SysinfoMemory, SystemMemory};
pub use metrics::SwarmSnapshot;
pub use scaling::{ScalingDecision, Watermarks};

use crate::agent::{Agent, AgentConfig, IdleStrategyFactory, StrategyFactory};
use crate::config::WardenConfig;
use crate::directory::ResourceDirectory;
use crate::error::WardenError;
use crate::signal::StopSignal;
use crate::types::{AgentId, AgentStatus};
use futures::future::join_all;
use futures::FutureExt;
use metrics::SpawnerMetrics;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of one `spawn_agents` call
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpawnResult {
    pub requested: usize,
    /// Allowed by admission control and the agent ceiling
    pub admitted: usize,
    /// Registered and running, including degraded ones
    pub spawned: usize,
    pub degraded: usize,
    /// Registrations refused because the pool was exhausted
    pub out_of_memory: usize,
    pub failed: usize,
    pub agent_ids: Vec<AgentId>,
}

/// Outcome of one control-loop iteration
#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub probed: usize,
    pub unhealthy: usize,
    pub restarted: usize,
    pub restart_failed: usize,
    pub utilization_pct: f64,
    pub decision: ScalingDecision,
    pub evicted: usize,
    pub admitted: usize,
}

/// Owns the live agent map and drives admission, health and scaling
pub struct AgentSpawner {
    directory: Arc<ResourceDirectory>,
    config: SpawnerConfig,
    agent_types: HashMap<String, AgentConfig>,
    strategies: Arc<dyn StrategyFactory>,
    memory: Arc<dyn SystemMemory>,
    agents: RwLock<HashMap<AgentId, Arc<Agent>>>,
    /// Serializes spawn, restart, evict and shutdown
    lifecycle: tokio::sync::Mutex<()>,
    metrics: SpawnerMetrics,
    stop: Arc<StopSignal>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl AgentSpawner {
    pub fn new(
        directory: Arc<ResourceDirectory>,
        config: SpawnerConfig,
        memory: Arc<dyn SystemMemory>,
    ) -> Self {
        Self {
            directory,
            config,
            agent_types: HashMap::new(),
            strategies: Arc::new(IdleStrategyFactory),
            memory,
            agents: RwLock::new(HashMap::new()),
            lifecycle: tokio::sync::Mutex::new(()),
            metrics: SpawnerMetrics::default(),
            stop: Arc::new(StopSignal::new()),
            monitor_task: Mutex::new(None),
        }
    }

    pub fn from_config(
        config: &WardenConfig,
        directory: Arc<ResourceDirectory>,
        memory: Arc<dyn SystemMemory>,
    ) -> Self {
        Self::new(directory, config.spawner.clone(), memory)
            .with_agent_types(config.agent_types.clone())
    }

    /// Per-type agent configs; unknown types get `AgentConfig::default()`
    pub fn with_agent_types(mut self, agent_types: HashMap<String, AgentConfig>) -> Self {
        self.agent_types = agent_types;
        self
    }

    pub fn with_strategies(mut self, strategies: Arc<dyn StrategyFactory>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn config(&self) -> &SpawnerConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<ResourceDirectory> {
        &self.directory
    }

    pub fn agent_config(&self, agent_type: &str) -> AgentConfig {
        self.agent_types.get(agent_type).cloned().unwrap_or_default()
    }

    pub fn agent(&self, id: &AgentId) -> Option<Arc<Agent>> {
        self.agents.read().get(id).cloned()
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.agents.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn agent_count(&self) -> usize {
        self.agents.read().len()
    }

    /// How many agents admission control would allow right now
    pub fn admission_ceiling(&self, requested: usize) -> usize {
        admissible(
            requested,
            self.memory.available_bytes(),
            self.config.admission_fraction,
            self.config.per_agent_memory_bytes,
        )
    }

    fn build_agent(&self, id: AgentId, agent_type: &str, config: AgentConfig) -> Arc<Agent> {
        let strategy = self.strategies.create(agent_type, &config);
        Arc::new(Agent::new(
            id,
            agent_type,
            config,
            Arc::clone(&self.directory),
            strategy,
        ))
    }

    /// Create up to `count` agents of `agent_type`.
    ///
    /// The count is capped by admission control and the agent ceiling. Each
    /// batch is fully initialized before any of its agents starts running. When
    /// the pool runs out the batch size is halved; a batch that yields no agent
    /// ends the call.
    pub async fn spawn_agents(&self, count: usize, agent_type: &str) -> SpawnResult {
        let _lifecycle = self.lifecycle.lock().await;
        if self.stop.is_stopped() {
            return SpawnResult {
                requested: count,
                ..SpawnResult::default()
            };
        }

        let room = self.config.max_agents.saturating_sub(self.agent_count());
        let admitted = self.admission_ceiling(count).min(room);
        let mut result = SpawnResult {
            requested: count,
            admitted,
            ..SpawnResult::default()
        };

        let config = self.agent_config(agent_type);
        let mut batch_size = self.config.batch_size.max(1);
        let mut remaining = admitted;

        while remaining > 0 {
            let n = batch_size.min(remaining);
            remaining -= n;

            let batch: Vec<Arc<Agent>> = (0..n)
                .map(|_| self.build_agent(AgentId::generate(), agent_type, config.clone()))
                .collect();
            let outcomes = join_all(batch.iter().map(|agent| agent.initialize())).await;

            let mut ready = Vec::with_capacity(n);
            let mut batch_oom = 0;
            for (agent, outcome) in batch.into_iter().zip(outcomes) {
                match outcome {
                    Ok(status) => {
                        if status == AgentStatus::Degraded {
                            result.degraded += 1;
                        }
                        ready.push(agent);
                    }
                    Err(WardenError::OutOfMemory { .. }) => batch_oom += 1,
                    Err(e) => {
                        warn!(agent_id = %agent.id(), error = %e, "Agent failed to register");
                        result.failed += 1;
                    }
                }
            }

            // every agent in the batch has finished initializing
            {
                let mut agents = self.agents.write();
                for agent in &ready {
                    agents.insert(agent.id().clone(), Arc::clone(agent));
                }
            }
            for agent in &ready {
                agent.run();
                result.agent_ids.push(agent.id().clone());
            }
            result.spawned += ready.len();
            result.out_of_memory += batch_oom;

            if batch_oom > 0 {
                let reduced = (batch_size / 2).max(1);
                warn!(
                    out_of_memory = batch_oom,
                    batch_size,
                    reduced,
                    "Memory pool exhausted during spawn"
                );
                batch_size = reduced;
                if ready.is_empty() {
                    break;
                }
            }
        }

        self.metrics.record_spawned(result.spawned);
        info!(
            agent_type,
            requested = result.requested,
            admitted = result.admitted,
            spawned = result.spawned,
            degraded = result.degraded,
            out_of_memory = result.out_of_memory,
            "Spawned agents"
        );
        result
    }

    /// Replace an agent with a fresh one of the same id and configuration.
    ///
    /// Attempted once. If the fresh agent does not come up `Active` it is torn
    /// down, counted as terminated, and `RestartFailed` is returned.
    pub async fn restart_agent(&self, id: &AgentId) -> Result<AgentStatus, WardenError> {
        self.restart_agents(std::slice::from_ref(id))
            .await
            .pop()
            .map(|(_, outcome)| outcome)
            .unwrap_or_else(|| Err(WardenError::AgentNotFound(id.clone())))
    }

    /// Restart several agents together: every old agent is stopped and joined
    /// concurrently, then the replacements initialize as one batch. Each id
    /// gets the same single attempt as `restart_agent`.
    pub async fn restart_agents(
        &self,
        ids: &[AgentId],
    ) -> Vec<(AgentId, Result<AgentStatus, WardenError>)> {
        let _lifecycle = self.lifecycle.lock().await;
        let mut outcomes = Vec::with_capacity(ids.len());
        let mut failed = Vec::new();
        {
            let mut agents = self.agents.write();
            for id in ids {
                match agents.remove(id) {
                    Some(agent) => failed.push(agent),
                    None => outcomes.push((id.clone(), Err(WardenError::AgentNotFound(id.clone())))),
                }
            }
        }
        if failed.is_empty() {
            return outcomes;
        }

        for agent in &failed {
            self.metrics.record_restart(agent.id());
            info!(agent_id = %agent.id(), reason = ?agent.last_error(), "Restarting agent");
            agent.stop();
        }
        let grace = self.config.stop_grace();
        join_all(failed.iter().map(|agent| agent.terminate(grace))).await;

        let fresh: Vec<Arc<Agent>> = failed
            .iter()
            .map(|old| self.build_agent(old.id().clone(), old.agent_type(), old.config().clone()))
            .collect();
        let inits = join_all(fresh.iter().map(|agent| agent.initialize())).await;

        for (agent, init) in fresh.into_iter().zip(inits) {
            let id = agent.id().clone();
            let outcome = self.settle_restart(agent, init);
            outcomes.push((id, outcome));
        }
        outcomes
    }

    fn settle_restart(
        &self,
        fresh: Arc<Agent>,
        init: Result<AgentStatus, WardenError>,
    ) -> Result<AgentStatus, WardenError> {
        let id = fresh.id().clone();
        let reason = match init {
            Ok(AgentStatus::Active) => {
                self.agents.write().insert(id.clone(), Arc::clone(&fresh));
                fresh.run();
                info!(agent_id = %id, "Agent restarted");
                return Ok(AgentStatus::Active);
            }
            Ok(status) => fresh
                .last_error()
                .unwrap_or_else(|| format!("reinitialized as {}", status)),
            Err(e) => e.to_string(),
        };

        fresh.teardown();
        self.metrics.record_terminated();
        error!(agent_id = %id, reason = %reason, "Agent restart failed; terminated");
        Err(WardenError::RestartFailed { id, reason })
    }

    /// Stop and unregister the `n` agents with the largest memory footprint
    pub async fn evict_highest(&self, n: usize) -> usize {
        let _lifecycle = self.lifecycle.lock().await;
        let victims: Vec<Arc<Agent>> = {
            let mut agents = self.agents.write();
            let mut ranked: Vec<(usize, AgentId)> = agents
                .values()
                .map(|a| (a.memory_footprint(), a.id().clone()))
                .collect();
            ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
            ranked
                .into_iter()
                .take(n)
                .filter_map(|(_, id)| agents.remove(&id))
                .collect()
        };

        for agent in &victims {
            agent.stop();
        }
        let grace = self.config.stop_grace();
        join_all(victims.iter().map(|agent| agent.terminate(grace))).await;

        self.metrics.record_evicted(victims.len());
        if !victims.is_empty() {
            info!(evicted = victims.len(), live = self.agent_count(), "Evicted agents");
        }
        victims.len()
    }

    /// One control-loop pass: probe every agent, restart the unhealthy, then
    /// apply the watermark decision.
    pub async fn monitor_once(&self) -> MonitorReport {
        let agents: Vec<Arc<Agent>> = self.agents.read().values().cloned().collect();
        let probe_timeout = self.config.probe_timeout();
        let policy = self.config.health_policy;

        let probes = join_all(agents.iter().map(|agent| async move {
            let probe = AssertUnwindSafe(agent.probe()).catch_unwind();
            let outcome = tokio::time::timeout(probe_timeout, probe).await;
            (agent.id().clone(), outcome)
        }))
        .await;

        let mut unhealthy = Vec::new();
        for (id, outcome) in probes {
            match outcome {
                Ok(Ok(report)) => {
                    if let Some(reason) = policy.evaluate(&report) {
                        debug!(agent_id = %id, reason = %reason, "Agent unhealthy");
                        unhealthy.push(id);
                    }
                }
                Ok(Err(_)) => {
                    error!(agent_id = %id, "Probe panicked");
                    unhealthy.push(id);
                }
                Err(_) => {
                    warn!(error = %WardenError::HealthProbeTimeout(id.clone()), "Probe timed out");
                    unhealthy.push(id);
                }
            }
        }

        let mut report = MonitorReport {
            probed: agents.len(),
            unhealthy: unhealthy.len(),
            restarted: 0,
            restart_failed: 0,
            utilization_pct: 0.0,
            decision: ScalingDecision::Hold,
            evicted: 0,
            admitted: 0,
        };

        for (_, outcome) in self.restart_agents(&unhealthy).await {
            match outcome {
                Ok(_) => report.restarted += 1,
                Err(WardenError::AgentNotFound(_)) => {}
                Err(_) => report.restart_failed += 1,
            }
        }

        let utilization = self.memory.utilization_pct();
        self.metrics.set_system_utilization(utilization);
        report.utilization_pct = utilization;
        report.decision = self.config.watermarks().decide(utilization, self.agent_count());

        match report.decision {
            ScalingDecision::Evict(n) => {
                info!(utilization, target = self.config.target_agents, "Above high watermark");
                report.evicted = self.evict_highest(n).await;
            }
            ScalingDecision::Admit(n) => {
                debug!(utilization, step = n, "Below low watermark");
                report.admitted = self
                    .spawn_agents(n, &self.config.default_agent_type)
                    .await
                    .spawned;
            }
            ScalingDecision::Hold => {}
        }
        report
    }

    /// Run the control loop until `shutdown`. Iteration failures are logged
    /// and the loop carries on.
    pub async fn monitor_agents(self: Arc<Self>) {
        let interval = self.config.monitor_interval();
        info!(interval_ms = interval.as_millis() as u64, "Monitor loop started");

        loop {
            if self.stop.sleep(interval).await {
                break;
            }
            match AssertUnwindSafe(self.monitor_once()).catch_unwind().await {
                Ok(report) => debug!(
                    probed = report.probed,
                    unhealthy = report.unhealthy,
                    restarted = report.restarted,
                    utilization = report.utilization_pct,
                    "Monitor pass complete"
                ),
                Err(_) => error!("Monitor pass panicked; continuing"),
            }
        }
        info!("Monitor loop stopped");
    }

    /// Spawn the control loop as a task. Returns false if it is already running.
    pub fn start_monitor(self: &Arc<Self>) -> bool {
        let mut task = self.monitor_task.lock();
        if task.is_some() || self.stop.is_stopped() {
            return false;
        }
        *task = Some(tokio::spawn(Arc::clone(self).monitor_agents()));
        true
    }

    /// Current swarm state, read without waiting on the control loop
    pub fn snapshot(&self) -> SwarmSnapshot {
        let agents: Vec<Arc<Agent>> = self.agents.read().values().cloned().collect();
        let mut statuses = BTreeMap::new();
        let mut active_trades = 0;
        for agent in &agents {
            statuses.insert(agent.id().clone(), agent.status());
            if let Some(record) = agent.record() {
                active_trades += record.active_trade_count();
            }
        }

        SwarmSnapshot {
            agent_count: agents.len(),
            statuses,
            active_trades,
            pool_utilization_pct: self.directory.pool().utilization_pct(),
            system_utilization_pct: self.metrics.system_utilization(),
            restarts_total: self.metrics.restarts(),
            restarts_by_agent: self.metrics.restarts_by_agent(),
            evicted_total: self.metrics.evicted(),
            spawned_total: self.metrics.spawned(),
            terminated_total: self.metrics.terminated(),
        }
    }

    /// Stop the control loop and every agent, then release their resources
    pub async fn shutdown(&self) {
        self.stop.trigger();
        let task = self.monitor_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Monitor task ended abnormally");
            }
        }

        let _lifecycle = self.lifecycle.lock().await;
        let agents: Vec<Arc<Agent>> = self.agents.write().drain().map(|(_, a)| a).collect();
        for agent in &agents {
            agent.stop();
        }
        let grace = self.config.stop_grace();
        join_all(agents.iter().map(|agent| agent.terminate(grace))).await;
        self.directory.offload().close();
        info!(agents = agents.len(), "Spawner shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{DutyContext, DutyError, IdleStrategy, Strategy};
    use crate::config::{OffloadConfig, PoolConfig, StreamConfig};
    use crate::models::{Model, ModelLoader};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    struct StubLoader;

    #[async_trait]
    impl ModelLoader for StubLoader {
        async fn load(&self, name: &str) -> anyhow::Result<Model> {
            Ok(Model::new(name, vec![0; 8]))
        }
    }

    const SLAB: usize = 4096;

    fn spawner(units: usize, memory: Arc<FixedMemory>, config: SpawnerConfig) -> Arc<AgentSpawner> {
        spawner_with(units, memory, config, Arc::new(IdleStrategyFactory))
    }

    fn spawner_with(
        units: usize,
        memory: Arc<FixedMemory>,
        config: SpawnerConfig,
        strategies: Arc<dyn StrategyFactory>,
    ) -> Arc<AgentSpawner> {
        let directory = Arc::new(ResourceDirectory::new(
            &PoolConfig {
                capacity_bytes: units * SLAB,
                slab_bytes: SLAB,
            },
            &StreamConfig { capacity: 16 },
            &OffloadConfig { workers: 2 },
            Arc::new(StubLoader),
        ));
        let mut types = HashMap::new();
        types.insert("idle".to_string(), AgentConfig::idle());
        Arc::new(
            AgentSpawner::new(directory, config, memory)
                .with_agent_types(types)
                .with_strategies(strategies),
        )
    }

    /// Health check that panics
    struct PanickingHealth;

    #[async_trait]
    impl Strategy for PanickingHealth {
        async fn health(&self, _ctx: &DutyContext) -> Result<(), DutyError> {
            panic!("health bug");
        }
    }

    /// First agent built gets a panicking health check, the rest are idle
    struct FirstPanics {
        created: AtomicUsize,
    }

    impl StrategyFactory for FirstPanics {
        fn create(&self, _agent_type: &str, _config: &AgentConfig) -> Arc<dyn Strategy> {
            if self.created.fetch_add(1, Ordering::SeqCst) == 0 {
                Arc::new(PanickingHealth)
            } else {
                Arc::new(IdleStrategy)
            }
        }
    }

    /// Trades and health checks that never return
    struct Stuck;

    #[async_trait]
    impl Strategy for Stuck {
        async fn trade(&self, _ctx: &DutyContext) -> Result<(), DutyError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }

        async fn health(&self, _ctx: &DutyContext) -> Result<(), DutyError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    struct AlwaysStuck;

    impl StrategyFactory for AlwaysStuck {
        fn create(&self, _agent_type: &str, _config: &AgentConfig) -> Arc<dyn Strategy> {
            Arc::new(Stuck)
        }
    }

    fn plenty() -> Arc<FixedMemory> {
        Arc::new(FixedMemory::new(64 * 1024 * 1024 * 1024, 70.0))
    }

    #[tokio::test]
    async fn test_spawn_is_capped_by_admission() {
        // 10 MiB free at 0.8 and 1 MiB per agent admits 8
        let memory = Arc::new(FixedMemory::new(10 * 1024 * 1024, 70.0));
        let spawner = spawner(100, memory, SpawnerConfig::default());

        let result = spawner.spawn_agents(50, "idle").await;
        assert_eq!(result.requested, 50);
        assert_eq!(result.admitted, 8);
        assert_eq!(result.spawned, 8);
        assert_eq!(spawner.agent_count(), 8);
        spawner.shutdown().await;
    }

    #[tokio::test]
    async fn test_spawn_respects_agent_ceiling() {
        let config = SpawnerConfig {
            max_agents: 5,
            ..SpawnerConfig::default()
        };
        let spawner = spawner(100, plenty(), config);

        assert_eq!(spawner.spawn_agents(3, "idle").await.spawned, 3);
        let second = spawner.spawn_agents(3, "idle").await;
        assert_eq!(second.admitted, 2);
        assert_eq!(spawner.agent_count(), 5);
        spawner.shutdown().await;
    }

    #[tokio::test]
    async fn test_out_of_memory_halves_batch_and_stops() {
        let config = SpawnerConfig {
            batch_size: 4,
            ..SpawnerConfig::default()
        };
        let spawner = spawner(6, plenty(), config);

        let result = spawner.spawn_agents(20, "idle").await;
        assert_eq!(result.spawned, 6);
        assert!(result.out_of_memory >= 2);
        assert_eq!(result.failed, 0);
        assert_eq!(spawner.directory().pool().live_count(), 6);
        spawner.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_replaces_agent_with_same_id() {
        let spawner = spawner(4, plenty(), SpawnerConfig::default());
        let id = spawner.spawn_agents(1, "idle").await.agent_ids[0].clone();
        let before = spawner.agent(&id).unwrap();

        assert_eq!(spawner.restart_agent(&id).await.unwrap(), AgentStatus::Active);
        let after = spawner.agent(&id).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before.status(), AgentStatus::Terminated);
        assert_eq!(after.agent_type(), "idle");
        assert_eq!(spawner.directory().pool().live_count(), 1);
        assert_eq!(spawner.snapshot().restarts_by_agent[&id], 1);
        spawner.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_unknown_agent() {
        let spawner = spawner(4, plenty(), SpawnerConfig::default());
        let err = spawner.restart_agent(&AgentId::from("ghost")).await.unwrap_err();
        assert!(matches!(err, WardenError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_panicking_health_check_restarts_agent_and_scaling_proceeds() {
        let memory = plenty();
        let config = SpawnerConfig {
            target_agents: 10,
            ..SpawnerConfig::default()
        };
        let spawner = spawner_with(
            16,
            memory.clone(),
            config,
            Arc::new(FirstPanics {
                created: AtomicUsize::new(0),
            }),
        );
        let ids = spawner.spawn_agents(12, "idle").await.agent_ids;
        assert_eq!(ids.len(), 12);
        memory.set_utilization(95.0);

        let report = spawner.monitor_once().await;
        assert_eq!(report.unhealthy, 1);
        assert_eq!(report.restarted, 1);
        assert_eq!(report.decision, ScalingDecision::Evict(2));
        assert_eq!(report.evicted, 2);
        assert_eq!(spawner.agent_count(), 10);

        let next = spawner.monitor_once().await;
        assert_eq!(next.unhealthy, 0);
        spawner.shutdown().await;
    }

    #[tokio::test]
    async fn test_stuck_agents_restart_together() {
        let config = SpawnerConfig {
            probe_timeout_ms: 50,
            stop_grace_ms: 200,
            ..SpawnerConfig::default()
        };
        let spawner = spawner_with(8, plenty(), config, Arc::new(AlwaysStuck));
        assert_eq!(spawner.spawn_agents(5, "standard").await.spawned, 5);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        let report = spawner.monitor_once().await;
        let elapsed = started.elapsed();
        assert_eq!(report.unhealthy, 5);
        assert_eq!(report.restarted, 5);
        // one grace period for the whole group, not one per agent
        assert!(elapsed < Duration::from_millis(800), "pass took {:?}", elapsed);
        assert_eq!(spawner.agent_count(), 5);
        assert_eq!(spawner.directory().pool().live_count(), 5);
        spawner.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_agents_reports_each_id() {
        let spawner = spawner(4, plenty(), SpawnerConfig::default());
        let ids = spawner.spawn_agents(2, "idle").await.agent_ids;
        let mut request = ids.clone();
        request.push(AgentId::from("ghost"));

        let outcomes = spawner.restart_agents(&request).await;
        assert_eq!(outcomes.len(), 3);
        let restarted = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Ok(AgentStatus::Active)))
            .count();
        assert_eq!(restarted, 2);
        assert!(outcomes
            .iter()
            .any(|(id, o)| id.as_str() == "ghost" && matches!(o, Err(WardenError::AgentNotFound(_)))));
        assert_eq!(spawner.snapshot().restarts_total, 2);
        spawner.shutdown().await;
    }

    #[tokio::test]
    async fn test_low_watermark_admits_step() {
        let memory = plenty();
        memory.set_utilization(20.0);
        let config = SpawnerConfig {
            scale_up_step: 3,
            default_agent_type: "idle".to_string(),
            ..SpawnerConfig::default()
        };
        let spawner = spawner(10, memory, config);

        let report = spawner.monitor_once().await;
        assert_eq!(report.decision, ScalingDecision::Admit(3));
        assert_eq!(report.admitted, 3);
        assert_eq!(spawner.snapshot().system_utilization_pct, 20.0);
        spawner.shutdown().await;
    }

    #[tokio::test]
    async fn test_snapshot_reports_trades_and_statuses() {
        let spawner = spawner(4, plenty(), SpawnerConfig::default());
        let ids = spawner.spawn_agents(2, "idle").await.agent_ids;
        let record = spawner.agent(&ids[0]).unwrap().record().unwrap();
        record.open_position("BONK-1");
        record.open_position("WIF-7");

        let snapshot = spawner.snapshot();
        assert_eq!(snapshot.agent_count, 2);
        assert_eq!(snapshot.active_trades, 2);
        assert_eq!(snapshot.count_with_status(AgentStatus::Active), 2);
        assert_eq!(snapshot.spawned_total, 2);
        assert!((snapshot.pool_utilization_pct - 50.0).abs() < 1e-9);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["agent_count"], 2);
        spawner.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let spawner = spawner(4, plenty(), SpawnerConfig {
            monitor_interval_ms: 10,
            ..SpawnerConfig::default()
        });
        spawner.spawn_agents(3, "standard").await;
        assert!(spawner.start_monitor());
        assert!(!spawner.start_monitor());

        spawner.shutdown().await;
        assert_eq!(spawner.agent_count(), 0);
        assert_eq!(spawner.directory().agent_count(), 0);
        assert_eq!(spawner.directory().pool().allocated(), 0);
        assert_eq!(spawner.spawn_agents(1, "idle").await.spawned, 0);
    }
}
