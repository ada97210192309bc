//! # Corruption Policy
//!
//! Adjudicates mismatches that neither hash engine nor FEC could resolve.
//!
//! ## Decision Table
//!
//! | Condition | Decision |
//! |-----------|----------|
//! | counter at cap | `Fail` |
//! | `Eio` | `Fail` |
//! | `Logging` | `Continue` |
//! | `Restart`, scheduled | `Fail` |
//! | `Restart`, unavailable | `Continue` |
//! | `Restart`, budget exhausted | `Fail` |
//!
//! Every call marks the target as corrupted and emits a notification, even
//! once the counter is saturated.

use crate::domain::types::{BlockType, CorruptionMode, PolicyDecision};
use crate::metrics::MetricsRecorder;
use crate::ports::outbound::{CorruptionEvent, CorruptionNotifier, RestartAction, RestartOutcome};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

pub struct CorruptionPolicy {
    device: String,
    mode: CorruptionMode,
    max_errors: u32,
    count: AtomicU32,
    hash_failed: AtomicBool,
    notifier: Arc<dyn CorruptionNotifier>,
    restart: Arc<dyn RestartAction>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl CorruptionPolicy {
    pub fn new(
        device: impl Into<String>,
        mode: CorruptionMode,
        max_errors: u32,
        notifier: Arc<dyn CorruptionNotifier>,
        restart: Arc<dyn RestartAction>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            device: device.into(),
            mode,
            max_errors,
            count: AtomicU32::new(0),
            hash_failed: AtomicBool::new(false),
            notifier,
            restart,
            metrics,
        }
    }

    pub fn mode(&self) -> CorruptionMode {
        self.mode
    }

    /// True once any corruption event was recorded.
    pub fn has_corruption(&self) -> bool {
        self.hash_failed.load(Ordering::Relaxed)
    }

    /// Counted events, saturating at the cap.
    pub fn corruption_count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn on_corruption(&self, block_type: BlockType, block: u64) -> PolicyDecision {
        self.hash_failed.store(true, Ordering::Relaxed);
        self.metrics.record_corruption();

        let max = self.max_errors;
        let counted = self
            .count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                (c < max).then_some(c + 1)
            });
        let (count, saturated) = match counted {
            Ok(previous) => (previous + 1, false),
            Err(current) => (current, true),
        };

        let event = CorruptionEvent {
            device: self.device.clone(),
            block_type,
            block,
            count,
        };
        self.notifier.notify(&event);

        if saturated {
            return PolicyDecision::Fail;
        }

        error!(
            device = %self.device,
            block_type = %block_type,
            block,
            "{} block {} is corrupted",
            block_type,
            block
        );
        if count == max {
            error!(device = %self.device, "Reached maximum corruption errors");
        }

        match self.mode {
            CorruptionMode::Eio => PolicyDecision::Fail,
            CorruptionMode::Logging => PolicyDecision::Continue,
            CorruptionMode::Restart => match self.restart.request_restart(&event) {
                RestartOutcome::Scheduled | RestartOutcome::BudgetExhausted => PolicyDecision::Fail,
                RestartOutcome::Unavailable => {
                    warn!(device = %self.device, block, "Restart unavailable, continuing");
                    PolicyDecision::Continue
                }
            },
        }
    }

    /// The fallback engine matched where the primary did not. Telemetry only.
    pub fn on_engine_discrepancy(&self, block_type: BlockType, block: u64) {
        self.metrics.record_engine_discrepancy();
        self.notifier.engine_discrepancy(block_type, block);
    }
}
