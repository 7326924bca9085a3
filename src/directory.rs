//! Resource Directory
//!
//! Owns the memory pool, model registry, event stream and offload workers, and
//! keeps the directory of registered agents. Registration ties an agent identity
//! to one slab; unregistration frees the slab and drops the stream subscription.

use crate::config::{OffloadConfig, PoolConfig, StreamConfig, WardenConfig};
use crate::error::WardenError;
use crate::memory::{MemoryPool, Slab};
use crate::models::{ModelHandle, ModelLoader, ModelRegistry};
use crate::offload::OffloadPool;
use crate::stream::{Delivery, EventListener, EventStream, SubscriptionHandle};
use crate::types::{AgentId, AgentStatus};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Live registration of one agent
#[derive(Debug)]
pub struct AgentRecord {
    id: AgentId,
    agent_type: String,
    slab: Slab,
    status: RwLock<AgentStatus>,
    positions: Mutex<BTreeSet<String>>,
    subscription: Mutex<Option<SubscriptionHandle>>,
    heartbeat: Mutex<Instant>,
    reported_usage: AtomicUsize,
    registered_at: DateTime<Utc>,
}

impl AgentRecord {
    fn new(id: AgentId, agent_type: String, slab: Slab) -> Self {
        Self {
            id,
            agent_type,
            slab,
            status: RwLock::new(AgentStatus::Initializing),
            positions: Mutex::new(BTreeSet::new()),
            subscription: Mutex::new(None),
            heartbeat: Mutex::new(Instant::now()),
            reported_usage: AtomicUsize::new(0),
            registered_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn slab(&self) -> &Slab {
        &self.slab
    }

    pub fn status(&self) -> AgentStatus {
        *self.status.read()
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Move to `next` if the lifecycle allows it. Returns whether it moved.
    pub fn set_status(&self, next: AgentStatus) -> bool {
        let mut status = self.status.write();
        let current = *status;
        if current == next {
            return true;
        }
        if !current.can_transition_to(next) {
            warn!(
                agent_id = %self.id,
                from = %current,
                to = %next,
                "Rejected illegal status transition"
            );
            return false;
        }
        *status = next;
        info!(agent_id = %self.id, from = %current, to = %next, "Agent status changed");
        true
    }

    /// Stamp the heartbeat with the current time
    pub fn touch(&self) {
        *self.heartbeat.lock() = Instant::now();
    }

    pub fn heartbeat_age(&self) -> Duration {
        self.heartbeat.lock().elapsed()
    }

    /// Track an open trade or position. Returns false if already tracked.
    pub fn open_position(&self, reference: impl Into<String>) -> bool {
        self.positions.lock().insert(reference.into())
    }

    pub fn close_position(&self, reference: &str) -> bool {
        self.positions.lock().remove(reference)
    }

    pub fn positions(&self) -> Vec<String> {
        self.positions.lock().iter().cloned().collect()
    }

    pub fn active_trade_count(&self) -> usize {
        self.positions.lock().len()
    }

    /// Record memory the agent's collaborators hold outside its slab
    pub fn report_usage(&self, bytes: usize) {
        self.reported_usage.store(bytes, Ordering::Relaxed);
    }

    /// Slab size plus reported usage; ranks agents for eviction
    pub fn memory_footprint(&self) -> usize {
        self.slab.len() + self.reported_usage.load(Ordering::Relaxed)
    }

    pub fn subscription(&self) -> Option<SubscriptionHandle> {
        *self.subscription.lock()
    }

    fn replace_subscription(&self, handle: SubscriptionHandle) -> Option<SubscriptionHandle> {
        self.subscription.lock().replace(handle)
    }

    fn take_subscription(&self) -> Option<SubscriptionHandle> {
        self.subscription.lock().take()
    }
}

/// Owner of the shared resources and the directory of registered agents
pub struct ResourceDirectory {
    pool: MemoryPool,
    slab_bytes: usize,
    models: ModelRegistry,
    stream: EventStream,
    offload: OffloadPool,
    agents: RwLock<HashMap<AgentId, Arc<AgentRecord>>>,
}

impl ResourceDirectory {
    pub fn new(
        pool: &PoolConfig,
        stream: &StreamConfig,
        offload: &OffloadConfig,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        info!(
            capacity_bytes = pool.capacity_bytes,
            slab_bytes = pool.slab_bytes,
            stream_capacity = stream.capacity,
            offload_workers = offload.workers,
            "Creating resource directory"
        );
        Self {
            pool: MemoryPool::new(pool.capacity_bytes),
            slab_bytes: pool.slab_bytes,
            models: ModelRegistry::new(loader),
            stream: EventStream::new(stream.capacity),
            offload: OffloadPool::new(offload.workers),
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &WardenConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self::new(&config.pool, &config.stream, &config.offload, loader)
    }

    /// Register an agent and give it one slab.
    ///
    /// Fails with `DuplicateAgent` if the id is taken, or `OutOfMemory` if the
    /// pool is exhausted.
    pub fn register_agent(
        &self,
        id: &AgentId,
        agent_type: &str,
    ) -> Result<Arc<AgentRecord>, WardenError> {
        let mut agents = self.agents.write();
        if agents.contains_key(id) {
            return Err(WardenError::DuplicateAgent(id.clone()));
        }

        let slab = self.pool.allocate(self.slab_bytes, id)?;
        let record = Arc::new(AgentRecord::new(id.clone(), agent_type.to_string(), slab));
        agents.insert(id.clone(), Arc::clone(&record));

        debug!(
            agent_id = %id,
            agent_type,
            slab = %record.slab().id(),
            live = agents.len(),
            "Registered agent"
        );
        Ok(record)
    }

    /// Free the agent's slab, cancel its subscription and drop its record.
    ///
    /// Returns the removed record; unknown ids are logged and ignored.
    pub fn unregister_agent(&self, id: &AgentId) -> Option<Arc<AgentRecord>> {
        let Some(record) = self.agents.write().remove(id) else {
            warn!(agent_id = %id, "Unregister of unknown agent");
            return None;
        };
        self.release_resources(&record);
        Some(record)
    }

    /// Unregister `record` only if it is still the live registration for its id.
    ///
    /// A restarted agent reuses its id, so a late teardown of the previous
    /// incarnation must not remove the new one.
    pub fn release(&self, record: &Arc<AgentRecord>) -> bool {
        {
            let mut agents = self.agents.write();
            match agents.get(record.id()) {
                Some(current) if Arc::ptr_eq(current, record) => {
                    agents.remove(record.id());
                }
                _ => return false,
            }
        }
        self.release_resources(record);
        true
    }

    fn release_resources(&self, record: &AgentRecord) {
        if let Some(handle) = record.take_subscription() {
            self.stream.unsubscribe(handle);
        }
        self.pool.free(record.slab());
        debug!(agent_id = %record.id(), slab = %record.slab().id(), "Unregistered agent");
    }

    /// Subscribe a registered agent's listener to the event stream
    pub fn subscribe_agent(
        &self,
        id: &AgentId,
        listener: &Arc<dyn EventListener>,
    ) -> Result<SubscriptionHandle, WardenError> {
        let record = self
            .record(id)
            .ok_or_else(|| WardenError::AgentNotFound(id.clone()))?;
        let handle = self.stream.subscribe(listener);
        if let Some(previous) = record.replace_subscription(handle) {
            self.stream.unsubscribe(previous);
        }
        Ok(handle)
    }

    /// Release a registered agent's stream subscription, if it holds one
    pub fn unsubscribe_agent(&self, id: &AgentId) -> bool {
        match self.record(id).and_then(|record| record.take_subscription()) {
            Some(handle) => self.stream.unsubscribe(handle),
            None => false,
        }
    }

    pub async fn get_model(&self, name: &str) -> Result<ModelHandle, WardenError> {
        self.models.get(name).await
    }

    /// Run CPU-bound work on the bounded offload workers
    pub async fn execute_offloaded<F, R>(&self, f: F) -> Result<R, WardenError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.offload.execute(f).await
    }

    /// Publish an external update to every subscribed agent
    pub fn publish(&self, payload: serde_json::Value) -> Delivery {
        self.stream.publish(payload)
    }

    pub fn record(&self, id: &AgentId) -> Option<Arc<AgentRecord>> {
        self.agents.read().get(id).cloned()
    }

    pub fn records(&self) -> Vec<Arc<AgentRecord>> {
        self.agents.read().values().cloned().collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.read().len()
    }

    pub fn slab_bytes(&self) -> usize {
        self.slab_bytes
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    pub fn offload(&self) -> &OffloadPool {
        &self.offload
    }
}
