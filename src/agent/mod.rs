//! Agents
//!
//! An agent registers with the resource directory, acquires the capabilities its
//! type enables (slab regions, shared models, a stream subscription), and then
//! runs one duty-cycle task per capability until stopped.

mod config;
mod feed;
mod runtime;
mod strategy;

use std::ops::Range;

pub use config::{AgentConfig, Capabilities, Duty};
pub use feed::AgentFeed;
pub use runtime::{Agent, DutyStats, ProbeReport};
pub use strategy::{
    DutyContext, DutyError, IdleStrategy, IdleStrategyFactory, Strategy, StrategyFactory,
};

/// Slab bytes reserved for the order book when trading is enabled
pub const ORDER_BOOK_REGION: Range<usize> = 0..1024;

/// Slab bytes reserved for risk metrics when risk is enabled
pub const RISK_REGION: Range<usize> = 1024..2048;
