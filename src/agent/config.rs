//! Per-agent-type configuration and the capability set resolved from it.

use super::{ORDER_BOOK_REGION, RISK_REGION};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Capability flags and duty cadences for one agent type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Reserve the order-book region and run the trade duty
    #[serde(default = "default_true")]
    pub trading_enabled: bool,

    /// Load shared models and run the analyze duty
    #[serde(default = "default_true")]
    pub ai_enabled: bool,

    /// Subscribe to the event stream and run the monitor duty
    #[serde(default = "default_true")]
    pub monitoring_enabled: bool,

    /// Reserve the risk region and run the risk duty
    #[serde(default = "default_true")]
    pub risk_enabled: bool,

    /// Models requested when AI is enabled
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    #[serde(default = "default_interval_ms")]
    pub trade_interval_ms: u64,

    #[serde(default = "default_interval_ms")]
    pub analyze_interval_ms: u64,

    #[serde(default = "default_interval_ms")]
    pub monitor_interval_ms: u64,

    #[serde(default = "default_interval_ms")]
    pub risk_interval_ms: u64,

    /// Transient failures in a row before the agent is marked degraded
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Events buffered between the stream and the monitor duty
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_models() -> Vec<String> {
    vec!["price_predictor".to_string(), "pattern_recognizer".to_string()]
}

fn default_interval_ms() -> u64 {
    100
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_feed_capacity() -> usize {
    256
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            trading_enabled: true,
            ai_enabled: true,
            monitoring_enabled: true,
            risk_enabled: true,
            models: default_models(),
            trade_interval_ms: default_interval_ms(),
            analyze_interval_ms: default_interval_ms(),
            monitor_interval_ms: default_interval_ms(),
            risk_interval_ms: default_interval_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

impl AgentConfig {
    /// Config with every capability switched off
    pub fn idle() -> Self {
        Self {
            trading_enabled: false,
            ai_enabled: false,
            monitoring_enabled: false,
            risk_enabled: false,
            models: Vec::new(),
            ..Self::default()
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            trading: self.trading_enabled,
            ai: self.ai_enabled,
            monitoring: self.monitoring_enabled,
            risk: self.risk_enabled,
        }
    }

    /// Smallest slab that holds every region this config reserves
    pub fn slab_bytes_required(&self) -> usize {
        let mut required = 0;
        if self.trading_enabled {
            required = required.max(ORDER_BOOK_REGION.end);
        }
        if self.risk_enabled {
            required = required.max(RISK_REGION.end);
        }
        required
    }

    pub fn interval(&self, duty: Duty) -> Duration {
        let ms = match duty {
            Duty::Trade => self.trade_interval_ms,
            Duty::Analyze => self.analyze_interval_ms,
            Duty::Monitor => self.monitor_interval_ms,
            Duty::Risk => self.risk_interval_ms,
        };
        Duration::from_millis(ms.max(1))
    }
}

/// One of an agent's concurrent responsibilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Duty {
    Trade,
    Analyze,
    Monitor,
    Risk,
}

impl Duty {
    pub const ALL: [Duty; 4] = [Duty::Trade, Duty::Analyze, Duty::Monitor, Duty::Risk];

    pub fn as_str(self) -> &'static str {
        match self {
            Duty::Trade => "trade",
            Duty::Analyze => "analyze",
            Duty::Monitor => "monitor",
            Duty::Risk => "risk",
        }
    }
}

impl fmt::Display for Duty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability set fixed when the agent is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub trading: bool,
    pub ai: bool,
    pub monitoring: bool,
    pub risk: bool,
}

impl Capabilities {
    pub fn enables(&self, duty: Duty) -> bool {
        match duty {
            Duty::Trade => self.trading,
            Duty::Analyze => self.ai,
            Duty::Monitor => self.monitoring,
            Duty::Risk => self.risk,
        }
    }

    /// Duties to run, in a fixed order
    pub fn duties(&self) -> Vec<Duty> {
        Duty::ALL.into_iter().filter(|d| self.enables(*d)).collect()
    }
}
