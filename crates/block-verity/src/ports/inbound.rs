//! # Inbound Ports (Driving Ports)
//!
//! The API a verity target exposes to its host.

use crate::domain::status::StatusType;
use crate::error::Result;
use crate::metrics::MetricsSnapshot;
use crate::ports::outbound::DataSegments;

/// Verification API
pub trait VerityApi: Send + Sync {
    /// Verify data blocks `[start, start + count)` held in `segments`.
    ///
    /// On success the segments hold verified data, zero-filled blocks, or
    /// (in logging and degraded restart modes) unverified data. Verification
    /// runs on a worker; the caller blocks until it finishes.
    fn verify_request(&self, start: u64, count: u64, segments: &mut dyn DataSegments) -> Result<()>;

    /// Warm the hash blocks a request for `[start, start + count)` will need.
    /// Never blocks.
    fn schedule_prefetch(&self, start: u64, count: u64);

    fn status(&self, kind: StatusType) -> String;

    /// True once any corruption event was recorded.
    fn has_corruption(&self) -> bool;

    fn metrics(&self) -> MetricsSnapshot;
}
