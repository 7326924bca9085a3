//! System memory probe.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::System;

/// Source of host memory figures for admission and scaling
pub trait SystemMemory: Send + Sync {
    fn available_bytes(&self) -> u64;

    /// Percentage of total memory in use, 0..=100
    fn utilization_pct(&self) -> f64;
}

/// Reads host memory through `sysinfo`
pub struct SysinfoMemory {
    sys: Mutex<System>,
}

impl SysinfoMemory {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMemory for SysinfoMemory {
    fn available_bytes(&self) -> u64 {
        let mut sys = self.sys.lock();
        sys.refresh_memory();
        sys.available_memory()
    }

    fn utilization_pct(&self) -> f64 {
        let mut sys = self.sys.lock();
        sys.refresh_memory();
        let total = sys.total_memory();
        if total == 0 {
            return 0.0;
        }
        let used = total.saturating_sub(sys.available_memory());
        used as f64 * 100.0 / total as f64
    }
}

/// Settable figures for tests and dry runs
pub struct FixedMemory {
    available: AtomicU64,
    utilization_bits: AtomicU64,
}

impl FixedMemory {
    pub fn new(available_bytes: u64, utilization_pct: f64) -> Self {
        Self {
            available: AtomicU64::new(available_bytes),
            utilization_bits: AtomicU64::new(utilization_pct.to_bits()),
        }
    }

    pub fn set_available(&self, bytes: u64) {
        self.available.store(bytes, Ordering::Relaxed);
    }

    pub fn set_utilization(&self, pct: f64) {
        self.utilization_bits.store(pct.to_bits(), Ordering::Relaxed);
    }
}

impl SystemMemory for FixedMemory {
    fn available_bytes(&self) -> u64 {
        self.available.load(Ordering::Relaxed)
    }

    fn utilization_pct(&self) -> f64 {
        f64::from_bits(self.utilization_bits.load(Ordering::Relaxed))
    }
}
