//! Spawner configuration.

use super::health::HealthPolicy;
use super::scaling::Watermarks;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Admission, health and scaling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnerConfig {
    /// Memory estimate per agent used by admission control
    #[serde(default = "default_per_agent_memory_bytes")]
    pub per_agent_memory_bytes: u64,

    /// Share of available system memory that new agents may claim
    #[serde(default = "default_admission_fraction")]
    pub admission_fraction: f64,

    /// Utilization above which agents are evicted
    #[serde(default = "default_high_watermark_pct")]
    pub high_watermark_pct: f64,

    /// Utilization below which more agents are admitted
    #[serde(default = "default_low_watermark_pct")]
    pub low_watermark_pct: f64,

    /// Agents initialized together before any of them runs
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// How long a stopped agent's duty-cycles get to reach an iteration
    /// boundary. Tasks still running afterwards are aborted so their slab can
    /// be released.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Hard ceiling on live agents
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,

    /// Population left after an eviction pass
    #[serde(default = "default_target_agents")]
    pub target_agents: usize,

    /// Agents requested per scale-up pass
    #[serde(default = "default_scale_up_step")]
    pub scale_up_step: usize,

    /// Type tag used when scaling up
    #[serde(default = "default_agent_type")]
    pub default_agent_type: String,

    #[serde(default)]
    pub health_policy: HealthPolicy,
}

fn default_per_agent_memory_bytes() -> u64 {
    1024 * 1024
}

fn default_admission_fraction() -> f64 {
    0.8
}

fn default_high_watermark_pct() -> f64 {
    90.0
}

fn default_low_watermark_pct() -> f64 {
    50.0
}

fn default_batch_size() -> usize {
    100
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

fn default_monitor_interval_ms() -> u64 {
    1000
}

fn default_stop_grace_ms() -> u64 {
    2000
}

fn default_max_agents() -> usize {
    10_000
}

fn default_target_agents() -> usize {
    100
}

fn default_scale_up_step() -> usize {
    100
}

fn default_agent_type() -> String {
    "standard".to_string()
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            per_agent_memory_bytes: default_per_agent_memory_bytes(),
            admission_fraction: default_admission_fraction(),
            high_watermark_pct: default_high_watermark_pct(),
            low_watermark_pct: default_low_watermark_pct(),
            batch_size: default_batch_size(),
            probe_timeout_ms: default_probe_timeout_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            max_agents: default_max_agents(),
            target_agents: default_target_agents(),
            scale_up_step: default_scale_up_step(),
            default_agent_type: default_agent_type(),
            health_policy: HealthPolicy::default(),
        }
    }
}

impl SpawnerConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn watermarks(&self) -> Watermarks {
        Watermarks {
            high_pct: self.high_watermark_pct,
            low_pct: self.low_watermark_pct,
            target_agents: self.target_agents,
            max_agents: self.max_agents,
            scale_up_step: self.scale_up_step,
        }
    }
}
