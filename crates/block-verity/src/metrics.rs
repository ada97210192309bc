//! Metrics for verification operations
//!
//! Thread-safe counters updated on the request path. All updates use
//! relaxed ordering; the numbers are for monitoring, not synchronization.
//!
//! ## Usage
//!
//! ```ignore
//! use block_verity::metrics::VerityMetrics;
//!
//! let metrics = VerityMetrics::new();
//! metrics.record_data_block_verified();
//! assert_eq!(metrics.snapshot().data_blocks_verified, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for a verity target
#[derive(Default, Debug)]
pub struct VerityMetrics {
    /// Data blocks whose digest matched
    pub data_blocks_verified: AtomicU64,
    /// Data blocks served as zeros through the zero-digest shortcut
    pub zero_blocks: AtomicU64,
    /// Lookups satisfied by an already verified level-0 hash block
    pub level0_hits: AtomicU64,
    /// Hash blocks hashed and marked verified
    pub hash_blocks_verified: AtomicU64,
    /// Mismatches on the primary engine that the fallback engine resolved
    pub engine_discrepancies: AtomicU64,
    /// Blocks recovered by FEC
    pub fec_repairs: AtomicU64,
    /// Calls into the corruption policy
    pub corruption_events: AtomicU64,
    /// Requests completed without verification after a storage error
    pub storage_fast_fails: AtomicU64,
}

impl VerityMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_data_block_verified(&self) {
        self.data_blocks_verified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_zero_block(&self) {
        self.zero_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_level0_hit(&self) {
        self.level0_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hash_block_verified(&self) {
        self.hash_blocks_verified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_engine_discrepancy(&self) {
        self.engine_discrepancies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fec_repair(&self) {
        self.fec_repairs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corruption(&self) {
        self.corruption_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_fast_fail(&self) {
        self.storage_fast_fails.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            data_blocks_verified: self.data_blocks_verified.load(Ordering::Relaxed),
            zero_blocks: self.zero_blocks.load(Ordering::Relaxed),
            level0_hits: self.level0_hits.load(Ordering::Relaxed),
            hash_blocks_verified: self.hash_blocks_verified.load(Ordering::Relaxed),
            engine_discrepancies: self.engine_discrepancies.load(Ordering::Relaxed),
            fec_repairs: self.fec_repairs.load(Ordering::Relaxed),
            corruption_events: self.corruption_events.load(Ordering::Relaxed),
            storage_fast_fails: self.storage_fast_fails.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub data_blocks_verified: u64,
    pub zero_blocks: u64,
    pub level0_hits: u64,
    pub hash_blocks_verified: u64,
    pub engine_discrepancies: u64,
    pub fec_repairs: u64,
    pub corruption_events: u64,
    pub storage_fast_fails: u64,
}

/// Trait for custom metrics recording implementations
///
/// Implement this trait to forward verification events to an external
/// metrics system.
pub trait MetricsRecorder: Send + Sync {
    fn record_data_block_verified(&self);
    fn record_zero_block(&self);
    fn record_level0_hit(&self);
    fn record_hash_block_verified(&self);
    fn record_engine_discrepancy(&self);
    fn record_fec_repair(&self);
    fn record_corruption(&self);
    fn record_storage_fast_fail(&self);
}

/// No-op metrics recorder for when metrics are disabled
#[derive(Default, Debug)]
pub struct NoOpMetrics;

impl MetricsRecorder for NoOpMetrics {
    fn record_data_block_verified(&self) {}
    fn record_zero_block(&self) {}
    fn record_level0_hit(&self) {}
    fn record_hash_block_verified(&self) {}
    fn record_engine_discrepancy(&self) {}
    fn record_fec_repair(&self) {}
    fn record_corruption(&self) {}
    fn record_storage_fast_fail(&self) {}
}

impl MetricsRecorder for VerityMetrics {
    fn record_data_block_verified(&self) {
        VerityMetrics::record_data_block_verified(self);
    }

    fn record_zero_block(&self) {
        VerityMetrics::record_zero_block(self);
    }

    fn record_level0_hit(&self) {
        VerityMetrics::record_level0_hit(self);
    }

    fn record_hash_block_verified(&self) {
        VerityMetrics::record_hash_block_verified(self);
    }

    fn record_engine_discrepancy(&self) {
        VerityMetrics::record_engine_discrepancy(self);
    }

    fn record_fec_repair(&self) {
        VerityMetrics::record_fec_repair(self);
    }

    fn record_corruption(&self) {
        VerityMetrics::record_corruption(self);
    }

    fn record_storage_fast_fail(&self) {
        VerityMetrics::record_storage_fast_fail(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = VerityMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_events() {
        let metrics = VerityMetrics::new();
        metrics.record_data_block_verified();
        metrics.record_data_block_verified();
        metrics.record_zero_block();
        metrics.record_engine_discrepancy();
        metrics.record_storage_fast_fail();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.data_blocks_verified, 2);
        assert_eq!(snapshot.zero_blocks, 1);
        assert_eq!(snapshot.engine_discrepancies, 1);
        assert_eq!(snapshot.storage_fast_fails, 1);
        assert_eq!(snapshot.fec_repairs, 0);
    }

    #[test]
    fn test_recorder_trait_objects() {
        let recorders: Vec<Box<dyn MetricsRecorder>> =
            vec![Box::new(NoOpMetrics), Box::new(VerityMetrics::new())];
        for recorder in &recorders {
            recorder.record_corruption();
            recorder.record_fec_repair();
        }
    }
}
