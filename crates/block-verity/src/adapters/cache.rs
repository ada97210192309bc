//! # LRU Hash Block Cache
//!
//! Buffer cache fronting the hash device. Entries are shared `Arc` handles so
//! that the `verified` flag travels with the buffer while it is cached; an
//! evicted block comes back unverified on its next load.
//!
//! Device reads happen outside the index lock. When two workers miss on the
//! same block concurrently, the first insert wins and the second reader
//! adopts it, so a block is never cached twice.

use crate::error::StorageError;
use crate::ports::outbound::{BlockDevice, HashBlock, HashBlockCache, HashBlockRef};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Default number of cached hash blocks.
pub const DEFAULT_CACHE_BLOCKS: usize = 1024;

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub prefetched: u64,
}

pub struct LruHashBlockCache {
    device: Arc<dyn BlockDevice>,
    entries: Mutex<LruCache<u64, HashBlockRef>>,
    hits: AtomicU64,
    misses: AtomicU64,
    prefetched: AtomicU64,
}

impl LruHashBlockCache {
    pub fn new(device: Arc<dyn BlockDevice>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            device,
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            prefetched: AtomicU64::new(0),
        }
    }

    pub fn with_default_capacity(device: Arc<dyn BlockDevice>) -> Self {
        Self::new(device, DEFAULT_CACHE_BLOCKS)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            prefetched: self.prefetched.load(Ordering::Relaxed),
        }
    }

    /// True if `block` is currently cached. Does not touch recency.
    pub fn contains(&self, block: u64) -> bool {
        self.entries.lock().contains(&block)
    }

    fn load(&self, block: u64) -> Result<HashBlockRef, StorageError> {
        let mut data = vec![0u8; self.device.block_size()];
        self.device.read_block(block, &mut data)?;
        let loaded = Arc::new(HashBlock::new(block, data));

        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&block) {
            return Ok(Arc::clone(existing));
        }
        entries.put(block, Arc::clone(&loaded));
        Ok(loaded)
    }
}

impl HashBlockCache for LruHashBlockCache {
    fn read(&self, block: u64) -> Result<HashBlockRef, StorageError> {
        if let Some(hit) = self.entries.lock().get(&block) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(hit));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(block, "Hash block cache miss");
        self.load(block)
    }

    fn install_repaired(&self, block: u64, data: Vec<u8>) -> HashBlockRef {
        let repaired = Arc::new(HashBlock::new(block, data));
        self.entries.lock().put(block, Arc::clone(&repaired));
        repaired
    }

    fn prefetch(&self, start: u64, count: u64) {
        let capacity = self.entries.lock().cap().get() as u64;
        let end = start
            .saturating_add(count.min(capacity))
            .min(self.device.block_count());
        for block in start..end {
            if self.entries.lock().contains(&block) {
                continue;
            }
            match self.load(block) {
                Ok(_) => {
                    self.prefetched.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    debug!(block, error = %e, "Prefetch read failed");
                    break;
                }
            }
        }
    }

    fn block_count(&self) -> u64 {
        self.device.block_count()
    }

    fn block_size(&self) -> usize {
        self.device.block_size()
    }
}
