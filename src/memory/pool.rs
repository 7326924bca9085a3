//! Pool accounting: first-fit allocation over a coalescing free list.

use super::slab::Slab;
use crate::error::WardenError;
use crate::types::{AgentId, SlabId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Point-in-time description of a live slab
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlabInfo {
    pub id: SlabId,
    pub offset: usize,
    pub len: usize,
    pub owner: AgentId,
}

/// Fixed-capacity pool of bytes carved into per-agent slabs
///
/// `allocate` and `free` are serialized by one mutex around the accounting.
/// With nothing freed yet, allocation carves from the unused tail of the arena;
/// freed ranges are merged with their neighbours and reused first-fit.
///
/// The arena exists only as accounting: offsets are positions in a virtual
/// address range of `capacity` bytes. Each `Slab` owns its own zeroed heap
/// buffer of `len` bytes, so there is no single backing allocation.
pub struct MemoryPool {
    id: u64,
    capacity: usize,
    state: Mutex<PoolState>,
}

struct PoolState {
    next_slab: u64,
    allocated: usize,
    /// Live slabs by id
    live: HashMap<SlabId, Slab>,
    /// Free ranges: offset -> len, never adjacent to each other
    free: BTreeMap<usize, usize>,
}

impl MemoryPool {
    /// Create a pool of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        let mut free = BTreeMap::new();
        if capacity > 0 {
            free.insert(0, capacity);
        }
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            capacity,
            state: Mutex::new(PoolState {
                next_slab: 1,
                allocated: 0,
                live: HashMap::new(),
                free,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently handed out
    pub fn allocated(&self) -> usize {
        self.state.lock().allocated
    }

    /// Bytes not handed out (may be fragmented)
    pub fn available(&self) -> usize {
        self.capacity - self.allocated()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Allocated share of capacity, 0.0..=100.0
    pub fn utilization_pct(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.allocated() as f64 * 100.0 / self.capacity as f64
    }

    /// Allocate a slab of exactly `size` bytes owned by `owner`.
    ///
    /// Fails with `OutOfMemory` when no free range can hold `size`; nothing is
    /// allocated in that case.
    pub fn allocate(&self, size: usize, owner: &AgentId) -> Result<Slab, WardenError> {
        if size == 0 {
            return Err(WardenError::ConfigError(
                "Slab size must be greater than zero".to_string(),
            ));
        }

        let mut state = self.state.lock();
        let fit = state
            .free
            .iter()
            .find(|(_, len)| **len >= size)
            .map(|(offset, len)| (*offset, *len));

        let Some((offset, len)) = fit else {
            let available = self.capacity - state.allocated;
            debug!(requested = size, available, "Pool allocation failed");
            return Err(WardenError::OutOfMemory {
                requested: size,
                available,
            });
        };

        state.free.remove(&offset);
        if len > size {
            state.free.insert(offset + size, len - size);
        }

        let id = SlabId(state.next_slab);
        state.next_slab += 1;
        state.allocated += size;

        let slab = Slab::new(self.id, id, offset, size, owner.clone());
        state.live.insert(id, slab.clone());

        debug!(
            slab = %id,
            offset,
            size,
            owner = %owner,
            allocated = state.allocated,
            "Allocated slab"
        );
        Ok(slab)
    }

    /// Return a slab's range to the pool.
    ///
    /// Freeing a slab twice, or one that came from another pool, logs a warning
    /// and returns `false`.
    pub fn free(&self, slab: &Slab) -> bool {
        if slab.pool_id() != self.id {
            warn!(slab = %slab.id(), "Ignoring free of slab from a different pool");
            return false;
        }

        let mut state = self.state.lock();
        if state.live.remove(&slab.id()).is_none() {
            warn!(slab = %slab.id(), owner = %slab.owner(), "Slab already freed");
            return false;
        }

        slab.release();
        state.allocated -= slab.len();
        Self::insert_free(&mut state.free, slab.offset(), slab.len());

        debug!(
            slab = %slab.id(),
            owner = %slab.owner(),
            allocated = state.allocated,
            "Freed slab"
        );
        true
    }

    /// Live slabs ordered by offset
    pub fn live_slabs(&self) -> Vec<SlabInfo> {
        let state = self.state.lock();
        let mut slabs: Vec<SlabInfo> = state
            .live
            .values()
            .map(|slab| SlabInfo {
                id: slab.id(),
                offset: slab.offset(),
                len: slab.len(),
                owner: slab.owner().clone(),
            })
            .collect();
        slabs.sort_by_key(|s| s.offset);
        slabs
    }

    /// Insert a free range, merging with adjacent free ranges
    fn insert_free(free: &mut BTreeMap<usize, usize>, offset: usize, len: usize) {
        let mut start = offset;
        let mut end = offset + len;

        if let Some((&prev_offset, &prev_len)) = free.range(..offset).next_back() {
            if prev_offset + prev_len == start {
                free.remove(&prev_offset);
                start = prev_offset;
            }
        }
        if let Some(&next_len) = free.get(&end) {
            free.remove(&end);
            end += next_len;
        }

        free.insert(start, end - start);
    }
}
