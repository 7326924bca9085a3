//! Bounded inbox between the event stream and an agent's monitor duty.

use crate::error::WardenError;
use crate::stream::{EventListener, StreamEvent};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stream listener that queues events for the monitor duty.
///
/// When the inbox is full the oldest event is dropped, so a slow monitor sees
/// the most recent updates.
pub struct AgentFeed {
    capacity: usize,
    inbox: Mutex<VecDeque<StreamEvent>>,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl AgentFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inbox: Mutex::new(VecDeque::with_capacity(capacity)),
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Take every queued event, oldest first
    pub fn drain(&self) -> Vec<StreamEvent> {
        self.inbox.lock().drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.inbox.lock().len()
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventListener for AgentFeed {
    fn on_event(&self, event: &StreamEvent) -> Result<(), WardenError> {
        let mut inbox = self.inbox.lock();
        if inbox.len() == self.capacity {
            inbox.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        inbox.push_back(event.clone());
        self.received.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
