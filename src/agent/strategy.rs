//! Duty-cycle bodies supplied per agent type.

use super::config::AgentConfig;
use super::{ORDER_BOOK_REGION, RISK_REGION};
use crate::directory::{AgentRecord, ResourceDirectory};
use crate::error::WardenError;
use crate::models::ModelHandle;
use crate::stream::StreamEvent;
use crate::types::AgentId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

/// Outcome of a failed duty iteration
#[derive(Debug, Error)]
pub enum DutyError {
    /// Logged; the duty keeps looping
    #[error("transient: {0}")]
    Transient(String),

    /// The agent is marked degraded and this duty stops
    #[error("unrecoverable: {0}")]
    Unrecoverable(String),
}

impl From<WardenError> for DutyError {
    fn from(err: WardenError) -> Self {
        if err.is_recoverable() {
            DutyError::Transient(err.to_string())
        } else {
            DutyError::Unrecoverable(err.to_string())
        }
    }
}

/// What a duty body can reach: its own record and slab, its models, and the
/// shared offload workers.
pub struct DutyContext {
    record: Arc<AgentRecord>,
    models: HashMap<String, ModelHandle>,
    directory: Arc<ResourceDirectory>,
}

impl DutyContext {
    pub(crate) fn new(
        record: Arc<AgentRecord>,
        models: HashMap<String, ModelHandle>,
        directory: Arc<ResourceDirectory>,
    ) -> Self {
        Self {
            record,
            models,
            directory,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        self.record.id()
    }

    pub fn record(&self) -> &AgentRecord {
        &self.record
    }

    pub fn model(&self, name: &str) -> Option<&ModelHandle> {
        self.models.get(name)
    }

    pub fn models(&self) -> &HashMap<String, ModelHandle> {
        &self.models
    }

    pub fn read_order_book(&self) -> Result<Vec<u8>, WardenError> {
        self.read_region(ORDER_BOOK_REGION)
    }

    pub fn write_order_book(&self, data: &[u8]) -> Result<(), WardenError> {
        self.write_region(ORDER_BOOK_REGION, data)
    }

    pub fn read_risk_metrics(&self) -> Result<Vec<u8>, WardenError> {
        self.read_region(RISK_REGION)
    }

    pub fn write_risk_metrics(&self, data: &[u8]) -> Result<(), WardenError> {
        self.write_region(RISK_REGION, data)
    }

    fn read_region(&self, region: Range<usize>) -> Result<Vec<u8>, WardenError> {
        self.record.slab().read(region.start, region.len())
    }

    fn write_region(&self, region: Range<usize>, data: &[u8]) -> Result<(), WardenError> {
        let slab = self.record.slab();
        if data.len() > region.len() {
            return Err(WardenError::SlabOutOfBounds {
                slab: slab.id(),
                offset: region.start,
                len: data.len(),
                capacity: region.len(),
            });
        }
        slab.write(region.start, data)
    }

    /// Run CPU-bound work on the shared offload workers
    pub async fn offload<F, R>(&self, f: F) -> Result<R, WardenError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.directory.execute_offloaded(f).await
    }
}

/// Duty-cycle bodies for one agent
///
/// Every method defaults to a no-op, so a strategy only implements the duties
/// it cares about.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn trade(&self, _ctx: &DutyContext) -> Result<(), DutyError> {
        Ok(())
    }

    async fn analyze(&self, _ctx: &DutyContext) -> Result<(), DutyError> {
        Ok(())
    }

    /// Receives the events delivered since the previous iteration, oldest first
    async fn monitor(&self, _ctx: &DutyContext, _events: &[StreamEvent]) -> Result<(), DutyError> {
        Ok(())
    }

    async fn risk(&self, _ctx: &DutyContext) -> Result<(), DutyError> {
        Ok(())
    }

    /// Extra liveness check run by the health probe
    async fn health(&self, _ctx: &DutyContext) -> Result<(), DutyError> {
        Ok(())
    }
}

/// Builds the strategy for a new or restarted agent
pub trait StrategyFactory: Send + Sync {
    fn create(&self, agent_type: &str, config: &AgentConfig) -> Arc<dyn Strategy>;
}

/// Strategy whose duties do nothing
pub struct IdleStrategy;

impl Strategy for IdleStrategy {}

pub struct IdleStrategyFactory;

impl StrategyFactory for IdleStrategyFactory {
    fn create(&self, _agent_type: &str, _config: &AgentConfig) -> Arc<dyn Strategy> {
        Arc::new(IdleStrategy)
    }
}
