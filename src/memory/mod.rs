//! Memory Pool
//!
//! Fixed-capacity arena that hands out disjoint byte ranges ("slabs") to agents.
//! Accounting is serialized behind one lock; slab contents carry their own lock so
//! owners read and write them without touching the pool.

mod pool;
mod slab;

pub use pool::{MemoryPool, SlabInfo};
pub use slab::Slab;
