//! Issues prefetch hints for the hash blocks a request will touch.

use crate::domain::geometry::Geometry;
use crate::domain::prefetch::{prefetch_ranges, PrefetchRange};
use crate::service::verified_cache::VerifiedBlockCache;
use tracing::trace;

pub struct PrefetchScheduler {
    geometry: Geometry,
    cache: VerifiedBlockCache,
    cluster_bytes: u32,
}

impl PrefetchScheduler {
    pub fn new(geometry: Geometry, cache: VerifiedBlockCache, cluster_bytes: u32) -> Self {
        Self {
            geometry,
            cache,
            cluster_bytes,
        }
    }

    pub fn ranges(&self, start: u64, count: u64) -> Vec<PrefetchRange> {
        prefetch_ranges(&self.geometry, self.cluster_bytes, start, count)
    }

    /// Hint every range to the cache. Runs on a worker; failures are ignored.
    pub fn issue(&self, start: u64, count: u64) {
        for range in self.ranges(start, count) {
            trace!(start = range.start, count = range.count, "Prefetching hash blocks");
            self.cache.prefetch(range.start, range.count);
        }
    }
}
