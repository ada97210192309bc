//! Verified-block view over the external hash block cache.
//!
//! The cache owns the buffers; this wrapper only reads and sets the
//! per-buffer `verified` flag. The flag is never cleared here.

use crate::error::StorageError;
use crate::ports::outbound::{HashBlockCache, HashBlockRef};
use std::sync::Arc;

#[derive(Clone)]
pub struct VerifiedBlockCache {
    inner: Arc<dyn HashBlockCache>,
}

impl VerifiedBlockCache {
    pub fn new(inner: Arc<dyn HashBlockCache>) -> Self {
        Self { inner }
    }

    /// Read a hash block. Only device errors fail; may block on I/O.
    pub fn read_hash_block(&self, block: u64) -> Result<HashBlockRef, StorageError> {
        self.inner.read(block)
    }

    pub fn is_verified(&self, buf: &HashBlockRef) -> bool {
        buf.is_verified()
    }

    pub fn mark_verified(&self, buf: &HashBlockRef) {
        buf.mark_verified();
    }

    pub fn release(&self, buf: HashBlockRef) {
        self.inner.release(buf);
    }

    pub fn install_repaired(&self, block: u64, data: Vec<u8>) -> HashBlockRef {
        self.inner.install_repaired(block, data)
    }

    pub fn prefetch(&self, start: u64, count: u64) {
        self.inner.prefetch(start, count);
    }

    /// Size of the hash device in hash blocks.
    pub fn device_blocks(&self) -> u64 {
        self.inner.block_count()
    }

    pub fn block_size(&self) -> usize {
        self.inner.block_size()
    }
}
