//! Health policy applied to probe reports.

use crate::agent::ProbeReport;
use crate::types::AgentStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What counts as a healthy agent.
///
/// A probe that does not answer within the probe timeout is unhealthy under
/// every policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthPolicy {
    /// Status reads `active` and the strategy's own check passes
    #[default]
    Responsive,
    /// As `Responsive`, and some duty-cycle completed an iteration within
    /// `max_staleness_ms`
    Heartbeat { max_staleness_ms: u64 },
}

impl HealthPolicy {
    /// Reason the report fails the policy, or `None` if healthy
    pub fn evaluate(&self, report: &ProbeReport) -> Option<String> {
        if report.status != AgentStatus::Active {
            return Some(format!("status is {}", report.status));
        }
        if let Some(err) = &report.strategy_error {
            return Some(format!("strategy health check failed: {}", err));
        }
        match self {
            HealthPolicy::Responsive => None,
            HealthPolicy::Heartbeat { max_staleness_ms } => {
                // agents without duty-cycles never beat
                if report.duties == 0 {
                    return None;
                }
                let limit = Duration::from_millis(*max_staleness_ms);
                if report.heartbeat_age > limit {
                    Some(format!(
                        "heartbeat is {}ms old (limit {}ms)",
                        report.heartbeat_age.as_millis(),
                        max_staleness_ms
                    ))
                } else {
                    None
                }
            }
        }
    }

    pub fn is_healthy(&self, report: &ProbeReport) -> bool {
        self.evaluate(report).is_none()
    }
}
