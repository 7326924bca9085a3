//! Watermark scaling decision.

use serde::Serialize;

/// What one control-loop iteration does about memory pressure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "count", rename_all = "lowercase")]
pub enum ScalingDecision {
    /// Unregister this many of the highest-memory agents
    Evict(usize),
    /// Ask admission control for this many more agents
    Admit(usize),
    Hold,
}

/// Thresholds and population bounds for the scaling decision
#[derive(Debug, Clone, Copy)]
pub struct Watermarks {
    pub high_pct: f64,
    pub low_pct: f64,
    pub target_agents: usize,
    pub max_agents: usize,
    pub scale_up_step: usize,
}

impl Watermarks {
    /// Decide from current system utilization and live agent count.
    ///
    /// Above the high watermark the population shrinks to `target_agents` in
    /// one pass; below the low watermark it grows by up to `scale_up_step`.
    /// Between the two nothing changes.
    pub fn decide(&self, utilization_pct: f64, live: usize) -> ScalingDecision {
        if utilization_pct > self.high_pct {
            if live > self.target_agents {
                return ScalingDecision::Evict(live - self.target_agents);
            }
            return ScalingDecision::Hold;
        }
        if utilization_pct < self.low_pct {
            let room = self.max_agents.saturating_sub(live);
            let step = self.scale_up_step.min(room);
            if step > 0 {
                return ScalingDecision::Admit(step);
            }
        }
        ScalingDecision::Hold
    }
}
