//! Event Stream
//!
//! Bounded ring buffer of the most recent external update events with synchronous
//! fan-out to subscribed listeners. The stream holds listeners weakly; owners keep
//! them alive and release their subscription explicitly with `unsubscribe`.

use crate::error::WardenError;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace, warn};

/// One published update
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    /// Arrival order, starting at 1
    pub seq: u64,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

/// Receiver of stream events
///
/// Called synchronously from `publish`, so implementations should only hand the
/// event off (queue it, copy it) and return.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &StreamEvent) -> Result<(), WardenError>;
}

/// Token returned by `subscribe`, required to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// Result of one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub seq: u64,
    pub delivered: usize,
    pub failed: usize,
    /// Listeners whose owner dropped them without unsubscribing; they are
    /// removed by this publish
    pub dangling: usize,
}

/// Bounded most-recent-N event buffer with publish/subscribe fan-out
pub struct EventStream {
    capacity: usize,
    buffer: Mutex<VecDeque<StreamEvent>>,
    subscribers: RwLock<Vec<(SubscriptionHandle, Weak<dyn EventListener>)>>,
    /// Serializes publishes so every subscriber sees publish order.
    /// Reentrant so a listener may publish from its callback.
    publish_order: ReentrantMutex<()>,
    next_seq: AtomicU64,
    next_subscription: AtomicU64,
}

impl EventStream {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            subscribers: RwLock::new(Vec::new()),
            publish_order: ReentrantMutex::new(()),
            next_seq: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Total events ever published
    pub fn published_total(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst) - 1
    }

    /// Append an event, evicting the oldest when full, then notify every
    /// subscriber in subscription order.
    ///
    /// A listener error is logged and skipped; the listener stays subscribed.
    pub fn publish(&self, payload: serde_json::Value) -> Delivery {
        let _order = self.publish_order.lock();

        let event = StreamEvent {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            payload,
            published_at: Utc::now(),
        };

        {
            let mut buffer = self.buffer.lock();
            if self.capacity > 0 {
                if buffer.len() == self.capacity {
                    buffer.pop_front();
                }
                buffer.push_back(event.clone());
            }
        }

        let listeners: Vec<(SubscriptionHandle, Weak<dyn EventListener>)> =
            self.subscribers.read().clone();

        let mut delivery = Delivery {
            seq: event.seq,
            ..Delivery::default()
        };

        let mut dropped = Vec::new();
        for (handle, weak) in listeners {
            let Some(listener) = weak.upgrade() else {
                trace!(subscription = handle.0, "Listener dropped before unsubscribe");
                dropped.push(handle);
                continue;
            };
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    error!(
                        subscription = handle.0,
                        seq = event.seq,
                        error = %e,
                        "Stream listener failed"
                    );
                    delivery.failed += 1;
                }
                Err(_) => {
                    error!(subscription = handle.0, seq = event.seq, "Stream listener panicked");
                    delivery.failed += 1;
                }
            }
        }

        if !dropped.is_empty() {
            self.subscribers
                .write()
                .retain(|(handle, _)| !dropped.contains(handle));
            delivery.dangling = dropped.len();
            debug!(pruned = dropped.len(), "Removed dropped listeners");
        }

        trace!(
            seq = delivery.seq,
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Published stream event"
        );
        delivery
    }

    /// Subscribe a listener. The stream keeps only a weak reference.
    pub fn subscribe(&self, listener: &Arc<dyn EventListener>) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .push((handle, Arc::downgrade(listener)));
        debug!(subscription = handle.0, "Listener subscribed");
        handle
    }

    /// Remove a subscription. Returns false for unknown handles.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(h, _)| *h != handle);
        let removed = subscribers.len() != before;
        if removed {
            debug!(subscription = handle.0, "Listener unsubscribed");
        } else {
            warn!(subscription = handle.0, "Unsubscribe of unknown subscription");
        }
        removed
    }

    /// Up to `n` most recent events, oldest first
    pub fn recent(&self, n: usize) -> Vec<StreamEvent> {
        let buffer = self.buffer.lock();
        let skip = buffer.len().saturating_sub(n);
        buffer.iter().skip(skip).cloned().collect()
    }

    /// All retained events, oldest first
    pub fn snapshot(&self) -> Vec<StreamEvent> {
        self.buffer.lock().iter().cloned().collect()
    }
}
