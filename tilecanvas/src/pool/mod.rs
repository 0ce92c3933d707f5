//! Reusable buffer pool.
//!
//! Bounds allocation churn by recycling buffers of evicted tiles into new
//! decodes. The pool is the only structure touched concurrently by every
//! collector worker, so check-out and check-in are guarded by a short
//! `parking_lot` critical section and statistics use lock-free atomics.
//!
//! # Ownership Contract
//!
//! A buffer is in exactly one place at a time: inside the pool, held by a
//! worker, or owned by a cached tile. Only the owner may return it, so a
//! buffer a worker is still writing can never be handed out again.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::tile::{PixelFormat, TileBuffer};

/// Default maximum number of idle buffers kept by a pool.
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers handed out from the pool.
    pub reused: u64,
    /// Buffers created because the pool was empty.
    pub allocated: u64,
    /// Buffers accepted back into the pool.
    pub returned: u64,
    /// Buffers dropped because the pool was full.
    pub discarded: u64,
    /// Buffers currently idle in the pool.
    pub idle: usize,
}

/// Thread-safe pool of reusable values.
pub struct BufferPool<T> {
    idle: Mutex<Vec<T>>,
    capacity: usize,
    reused: AtomicU64,
    allocated: AtomicU64,
    returned: AtomicU64,
    discarded: AtomicU64,
}

impl<T> BufferPool<T> {
    /// Creates a pool keeping at most `capacity` idle values.
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            reused: AtomicU64::new(0),
            allocated: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Takes an idle value, if any.
    pub fn get(&self) -> Option<T> {
        let item = self.idle.lock().pop();
        if item.is_some() {
            self.reused.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Takes an idle value or creates a fresh one with `create`.
    pub fn get_or_else(&self, create: impl FnOnce() -> T) -> T {
        match self.get() {
            Some(item) => item,
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                create()
            }
        }
    }

    /// Returns a value to the pool.
    ///
    /// Returns `false` if the pool is full and the value was dropped.
    pub fn put(&self, item: T) -> bool {
        let mut idle = self.idle.lock();
        if idle.len() >= self.capacity {
            drop(idle);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        idle.push(item);
        self.returned.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Number of idle values.
    pub fn len(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of idle values.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every idle value.
    pub fn clear(&self) {
        self.idle.lock().clear();
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            reused: self.reused.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            idle: self.len(),
        }
    }
}

impl BufferPool<TileBuffer> {
    /// Checks out a cleared buffer for a `size × size` tile.
    ///
    /// The most recently returned idle buffer of `format` is cleared and
    /// reused. Idle buffers of other formats stay in the pool. Without a
    /// match a fresh buffer is allocated.
    pub fn acquire(&self, format: PixelFormat, size: u32) -> TileBuffer {
        let mut idle = self.idle.lock();
        let index = idle.iter().rposition(|buffer| buffer.format() == format);
        let matching = index.map(|index| idle.swap_remove(index));
        drop(idle);

        match matching {
            Some(mut buffer) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                buffer.clear();
                buffer
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                TileBuffer::with_capacity(format, size)
            }
        }
    }
}

impl<T> Default for BufferPool<T> {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl<T> std::fmt::Debug for BufferPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
