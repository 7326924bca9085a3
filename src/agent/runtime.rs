//! Agent lifecycle and duty-cycle execution.

use super::config::{AgentConfig, Capabilities, Duty};
use super::feed::AgentFeed;
use super::strategy::{DutyContext, DutyError, Strategy};
use super::{ORDER_BOOK_REGION, RISK_REGION};
use crate::directory::{AgentRecord, ResourceDirectory};
use crate::error::WardenError;
use crate::models::ModelHandle;
use crate::signal::StopSignal;
use crate::stream::{EventListener, StreamEvent};
use crate::types::{AgentId, AgentStatus};
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Bytes of the order-book region used by the seq and length header
const DIGEST_HEADER: usize = 12;

/// Result of one health probe
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub status: AgentStatus,
    pub heartbeat_age: Duration,
    /// Number of duty-cycles the agent runs
    pub duties: usize,
    /// Set when the strategy's own health check failed
    pub strategy_error: Option<String>,
}

/// Counters across all of an agent's duty-cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DutyStats {
    pub iterations: u64,
    pub transient_failures: u64,
    pub unrecoverable_failures: u64,
    pub panics: u64,
}

#[derive(Default)]
struct DutyCounters {
    iterations: AtomicU64,
    transient_failures: AtomicU64,
    unrecoverable_failures: AtomicU64,
    panics: AtomicU64,
}

/// A unit of work bound to one registration in the resource directory
pub struct Agent {
    id: AgentId,
    agent_type: String,
    config: AgentConfig,
    capabilities: Capabilities,
    directory: Arc<ResourceDirectory>,
    strategy: Arc<dyn Strategy>,
    feed: Arc<AgentFeed>,
    record: RwLock<Option<Arc<AgentRecord>>>,
    context: RwLock<Option<Arc<DutyContext>>>,
    stop: StopSignal,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    counters: DutyCounters,
    last_error: Mutex<Option<String>>,
    torn_down: AtomicBool,
}

impl Agent {
    /// Build an agent. Capability flags are resolved here, once.
    pub fn new(
        id: AgentId,
        agent_type: impl Into<String>,
        config: AgentConfig,
        directory: Arc<ResourceDirectory>,
        strategy: Arc<dyn Strategy>,
    ) -> Self {
        let capabilities = config.capabilities();
        let feed = Arc::new(AgentFeed::new(config.feed_capacity));
        Self {
            id,
            agent_type: agent_type.into(),
            config,
            capabilities,
            directory,
            strategy,
            feed,
            record: RwLock::new(None),
            context: RwLock::new(None),
            stop: StopSignal::new(),
            tasks: Mutex::new(Vec::new()),
            counters: DutyCounters::default(),
            last_error: Mutex::new(None),
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn record(&self) -> Option<Arc<AgentRecord>> {
        self.record.read().clone()
    }

    pub fn status(&self) -> AgentStatus {
        match self.record() {
            Some(record) => record.status(),
            None if self.torn_down.load(Ordering::Acquire) => AgentStatus::Terminated,
            None => AgentStatus::Initializing,
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn memory_footprint(&self) -> usize {
        self.record().map(|r| r.memory_footprint()).unwrap_or(0)
    }

    pub fn feed(&self) -> &AgentFeed {
        &self.feed
    }

    pub fn stats(&self) -> DutyStats {
        DutyStats {
            iterations: self.counters.iterations.load(Ordering::Relaxed),
            transient_failures: self.counters.transient_failures.load(Ordering::Relaxed),
            unrecoverable_failures: self.counters.unrecoverable_failures.load(Ordering::Relaxed),
            panics: self.counters.panics.load(Ordering::Relaxed),
        }
    }

    /// Register with the directory and acquire every enabled capability
    /// concurrently.
    ///
    /// Registration errors (duplicate id, pool exhausted) are returned. A
    /// capability that fails leaves the agent `Degraded` instead of `Active`.
    pub async fn initialize(&self) -> Result<AgentStatus, WardenError> {
        let record = self.directory.register_agent(&self.id, &self.agent_type)?;
        *self.record.write() = Some(Arc::clone(&record));

        let caps = self.capabilities;
        let (trading, (models, model_errors), monitoring, risk) = futures::join!(
            self.reserve_region(&record, caps.trading, ORDER_BOOK_REGION),
            self.load_models(caps.ai),
            self.subscribe(caps.monitoring),
            self.reserve_region(&record, caps.risk, RISK_REGION),
        );

        let mut failures = Vec::new();
        if let Err(e) = trading {
            failures.push(format!("trading: {}", e));
        }
        for e in model_errors {
            failures.push(format!("ai: {}", e));
        }
        if let Err(e) = monitoring {
            failures.push(format!("monitoring: {}", e));
        }
        if let Err(e) = risk {
            failures.push(format!("risk: {}", e));
        }

        *self.context.write() = Some(Arc::new(DutyContext::new(
            Arc::clone(&record),
            models,
            Arc::clone(&self.directory),
        )));
        record.touch();

        let status = if failures.is_empty() {
            AgentStatus::Active
        } else {
            let reason = failures.join("; ");
            warn!(agent_id = %self.id, reason = %reason, "Agent initialized degraded");
            *self.last_error.lock() = Some(reason);
            AgentStatus::Degraded
        };
        record.set_status(status);
        Ok(status)
    }

    async fn reserve_region(
        &self,
        record: &AgentRecord,
        enabled: bool,
        region: Range<usize>,
    ) -> Result<(), WardenError> {
        if !enabled {
            return Ok(());
        }
        record.slab().zero(region.start, region.len())
    }

    async fn load_models(&self, enabled: bool) -> (HashMap<String, ModelHandle>, Vec<WardenError>) {
        let mut models = HashMap::new();
        let mut errors = Vec::new();
        if !enabled {
            return (models, errors);
        }

        let loads = self
            .config
            .models
            .iter()
            .map(|name| self.directory.get_model(name));
        for (name, result) in self.config.models.iter().zip(join_all(loads).await) {
            match result {
                Ok(handle) => {
                    models.insert(name.clone(), handle);
                }
                Err(e) => errors.push(e),
            }
        }
        (models, errors)
    }

    async fn subscribe(&self, enabled: bool) -> Result<(), WardenError> {
        if !enabled {
            return Ok(());
        }
        let listener: Arc<dyn EventListener> = self.feed.clone();
        self.directory.subscribe_agent(&self.id, &listener)?;
        Ok(())
    }

    /// Start one task per enabled duty-cycle. Returns how many were started.
    pub fn run(self: &Arc<Self>) -> usize {
        let Some(context) = self.context.read().clone() else {
            warn!(agent_id = %self.id, "Run requested before initialize");
            return 0;
        };
        if self.stop.is_stopped() {
            return 0;
        }

        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return 0;
        }
        for duty in self.capabilities.duties() {
            let agent = Arc::clone(self);
            let ctx = Arc::clone(&context);
            tasks.push(tokio::spawn(agent.duty_loop(duty, ctx)));
        }
        debug!(agent_id = %self.id, duties = tasks.len(), "Agent running");
        tasks.len()
    }

    async fn duty_loop(self: Arc<Self>, duty: Duty, ctx: Arc<DutyContext>) {
        let interval = self.config.interval(duty);
        let max_failures = self.config.max_consecutive_failures.max(1);
        let mut consecutive = 0u32;

        while !self.stop.is_stopped() {
            let outcome = AssertUnwindSafe(self.run_duty(duty, &ctx))
                .catch_unwind()
                .await;
            ctx.record().touch();
            self.counters.iterations.fetch_add(1, Ordering::Relaxed);

            match outcome {
                Ok(Ok(())) => consecutive = 0,
                Ok(Err(DutyError::Transient(reason))) => {
                    self.counters.transient_failures.fetch_add(1, Ordering::Relaxed);
                    consecutive += 1;
                    warn!(
                        agent_id = %self.id,
                        duty = %duty,
                        consecutive,
                        reason = %reason,
                        "Duty iteration failed"
                    );
                    if consecutive == max_failures {
                        self.degrade(ctx.record(), duty, reason);
                    }
                }
                Ok(Err(DutyError::Unrecoverable(reason))) => {
                    self.counters.unrecoverable_failures.fetch_add(1, Ordering::Relaxed);
                    error!(agent_id = %self.id, duty = %duty, reason = %reason, "Duty-cycle stopped");
                    self.degrade(ctx.record(), duty, reason);
                    break;
                }
                Err(_) => {
                    self.counters.panics.fetch_add(1, Ordering::Relaxed);
                    consecutive += 1;
                    error!(agent_id = %self.id, duty = %duty, "Duty iteration panicked");
                    if consecutive == max_failures {
                        self.degrade(ctx.record(), duty, "repeated panics".to_string());
                    }
                }
            }

            if self.stop.sleep(interval).await {
                break;
            }
        }
        debug!(agent_id = %self.id, duty = %duty, "Duty-cycle exited");
    }

    async fn run_duty(&self, duty: Duty, ctx: &DutyContext) -> Result<(), DutyError> {
        match duty {
            Duty::Trade => self.strategy.trade(ctx).await,
            Duty::Analyze => self.strategy.analyze(ctx).await,
            Duty::Risk => self.strategy.risk(ctx).await,
            Duty::Monitor => {
                let events = self.feed.drain();
                if self.capabilities.trading {
                    if let Some(latest) = events.last() {
                        write_digest(ctx, latest)?;
                    }
                }
                self.strategy.monitor(ctx, &events).await
            }
        }
    }

    fn degrade(&self, record: &AgentRecord, duty: Duty, reason: String) {
        *self.last_error.lock() = Some(format!("{}: {}", duty, reason));
        if record.status() == AgentStatus::Active {
            record.set_status(AgentStatus::Degraded);
        }
    }

    /// Sequence number and payload bytes of the latest event the monitor
    /// recorded in the order-book region
    pub fn latest_event_digest(&self) -> Option<(u64, Vec<u8>)> {
        let record = self.record()?;
        let region = record
            .slab()
            .read(ORDER_BOOK_REGION.start, ORDER_BOOK_REGION.len())
            .ok()?;
        decode_digest(&region)
    }

    /// Read status and heartbeat, then run the strategy's health check. A
    /// panicking check is reported as a strategy error.
    pub async fn probe(&self) -> ProbeReport {
        let status = self.status();
        let heartbeat_age = self
            .record()
            .map(|r| r.heartbeat_age())
            .unwrap_or_default();
        let context = self.context.read().clone();
        let strategy_error = match context {
            Some(ctx) => match AssertUnwindSafe(self.strategy.health(&ctx))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome.err().map(|e| e.to_string()),
                Err(_) => {
                    error!(agent_id = %self.id, "Health check panicked");
                    Some("health check panicked".to_string())
                }
            },
            None => None,
        };
        ProbeReport {
            status,
            heartbeat_age,
            duties: self.capabilities.duties().len(),
            strategy_error,
        }
    }

    /// Ask every duty-cycle to exit at its next iteration boundary
    pub fn stop(&self) {
        if !self.stop.is_stopped() {
            debug!(agent_id = %self.id, "Stopping agent");
        }
        self.stop.trigger();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Wait for the duty-cycles to exit. Stopping stays cooperative until the
    /// deadline; tasks still running then are aborted so the slab is never
    /// released under a live writer. Returns false if any had to be.
    pub async fn join(&self, timeout: Duration) -> bool {
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut clean = true;
        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                clean = false;
            }
        }
        if !clean {
            warn!(agent_id = %self.id, "Duty-cycles did not exit in time; aborted");
        }
        clean
    }

    /// Mark terminated and give the slab and subscription back. Idempotent.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop.trigger();
        if let Some(record) = self.record.write().take() {
            record.set_status(AgentStatus::Terminated);
            self.directory.release(&record);
        }
        self.context.write().take();
        info!(agent_id = %self.id, "Agent terminated");
    }

    /// Stop, wait for duty-cycles up to `timeout`, then tear down
    pub async fn terminate(&self, timeout: Duration) {
        self.stop();
        self.join(timeout).await;
        self.teardown();
    }
}

fn write_digest(ctx: &DutyContext, event: &StreamEvent) -> Result<(), DutyError> {
    let payload =
        serde_json::to_vec(&event.payload).map_err(|e| DutyError::Transient(e.to_string()))?;
    let room = ORDER_BOOK_REGION.len() - DIGEST_HEADER;
    let body = &payload[..payload.len().min(room)];

    let mut buf = Vec::with_capacity(DIGEST_HEADER + body.len());
    buf.extend_from_slice(&event.seq.to_le_bytes());
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(body);
    ctx.write_order_book(&buf)?;
    Ok(())
}

fn decode_digest(region: &[u8]) -> Option<(u64, Vec<u8>)> {
    let seq = u64::from_le_bytes(region.get(0..8)?.try_into().ok()?);
    if seq == 0 {
        return None;
    }
    let len = u32::from_le_bytes(region.get(8..12)?.try_into().ok()?) as usize;
    let body = region.get(DIGEST_HEADER..DIGEST_HEADER + len)?;
    Some((seq, body.to_vec()))
}
