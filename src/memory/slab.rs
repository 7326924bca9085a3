//! Slab handles handed out by the pool.

use crate::error::WardenError;
use crate::types::{AgentId, SlabId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle to a contiguous range of the pool owned by one agent
///
/// Cloning is cheap and every clone refers to the same range. Once the pool frees
/// the slab all clones observe it as released and reject reads and writes.
#[derive(Clone)]
pub struct Slab {
    inner: Arc<SlabInner>,
}

struct SlabInner {
    pool_id: u64,
    id: SlabId,
    offset: usize,
    len: usize,
    owner: AgentId,
    released: AtomicBool,
    bytes: Mutex<Box<[u8]>>,
}

impl Slab {
    pub(crate) fn new(pool_id: u64, id: SlabId, offset: usize, len: usize, owner: AgentId) -> Self {
        Self {
            inner: Arc::new(SlabInner {
                pool_id,
                id,
                offset,
                len,
                owner,
                released: AtomicBool::new(false),
                bytes: Mutex::new(vec![0u8; len].into_boxed_slice()),
            }),
        }
    }

    pub fn id(&self) -> SlabId {
        self.inner.id
    }

    /// Offset of the first byte inside the pool
    pub fn offset(&self) -> usize {
        self.inner.offset
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One past the last byte inside the pool
    pub fn end(&self) -> usize {
        self.offset() + self.len()
    }

    pub fn owner(&self) -> &AgentId {
        &self.inner.owner
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    pub(crate) fn pool_id(&self) -> u64 {
        self.inner.pool_id
    }

    /// Mark released. Returns false if it already was.
    pub(crate) fn release(&self) -> bool {
        !self.inner.released.swap(true, Ordering::AcqRel)
    }

    /// Copy `data` into the slab at `offset`
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), WardenError> {
        let mut bytes = self.inner.bytes.lock();
        self.check(offset, data.len(), bytes.len())?;
        bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copy `len` bytes out of the slab starting at `offset`
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, WardenError> {
        let bytes = self.inner.bytes.lock();
        self.check(offset, len, bytes.len())?;
        Ok(bytes[offset..offset + len].to_vec())
    }

    /// Zero `len` bytes starting at `offset`
    pub fn zero(&self, offset: usize, len: usize) -> Result<(), WardenError> {
        let mut bytes = self.inner.bytes.lock();
        self.check(offset, len, bytes.len())?;
        bytes[offset..offset + len].fill(0);
        Ok(())
    }

    fn check(&self, offset: usize, len: usize, capacity: usize) -> Result<(), WardenError> {
        if self.is_released() {
            return Err(WardenError::SlabReleased(self.id()));
        }
        match offset.checked_add(len) {
            Some(end) if end <= capacity => Ok(()),
            _ => Err(WardenError::SlabOutOfBounds {
                slab: self.id(),
                offset,
                len,
                capacity,
            }),
        }
    }
}

impl fmt::Debug for Slab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slab")
            .field("id", &self.inner.id)
            .field("offset", &self.inner.offset)
            .field("len", &self.inner.len)
            .field("owner", &self.inner.owner)
            .field("released", &self.is_released())
            .finish()
    }
}
