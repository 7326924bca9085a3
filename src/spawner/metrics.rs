//! Spawner counters and the observability snapshot.

use crate::types::{AgentId, AgentStatus};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the swarm
#[derive(Debug, Clone, Serialize)]
pub struct SwarmSnapshot {
    pub agent_count: usize,
    pub statuses: BTreeMap<AgentId, AgentStatus>,
    pub active_trades: usize,
    pub pool_utilization_pct: f64,
    /// Last reading taken by the control loop
    pub system_utilization_pct: f64,
    pub restarts_total: u64,
    pub restarts_by_agent: BTreeMap<AgentId, u64>,
    pub evicted_total: u64,
    pub spawned_total: u64,
    pub terminated_total: u64,
}

impl SwarmSnapshot {
    pub fn count_with_status(&self, status: AgentStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }
}

#[derive(Default)]
pub(crate) struct SpawnerMetrics {
    spawned: AtomicU64,
    evicted: AtomicU64,
    terminated: AtomicU64,
    restarts: AtomicU64,
    restarts_by_agent: Mutex<HashMap<AgentId, u64>>,
    system_utilization_bits: AtomicU64,
}

impl SpawnerMetrics {
    pub fn record_spawned(&self, n: usize) {
        self.spawned.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_evicted(&self, n: usize) {
        self.evicted.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_terminated(&self) {
        self.terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self, id: &AgentId) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
        *self.restarts_by_agent.lock().entry(id.clone()).or_insert(0) += 1;
    }

    pub fn set_system_utilization(&self, pct: f64) {
        self.system_utilization_bits
            .store(pct.to_bits(), Ordering::Relaxed);
    }

    pub fn system_utilization(&self) -> f64 {
        f64::from_bits(self.system_utilization_bits.load(Ordering::Relaxed))
    }

    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn terminated(&self) -> u64 {
        self.terminated.load(Ordering::Relaxed)
    }

    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    pub fn restarts_by_agent(&self) -> BTreeMap<AgentId, u64> {
        self.restarts_by_agent
            .lock()
            .iter()
            .map(|(id, n)| (id.clone(), *n))
            .collect()
    }
}
