//! # Corruption Side-Effect Adapters
//!
//! - `TracingNotifier`: reports events through `tracing`.
//! - `NoRestart`: host without a restart mechanism.
//! - `BudgetedRestart`: caps restarts across boots with a persisted counter.

use crate::domain::types::BlockType;
use crate::ports::outbound::{CorruptionEvent, CorruptionNotifier, RestartAction, RestartOutcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Default restart budget across the lifetime of the persisted counter.
pub const DEFAULT_RESTART_BUDGET: u32 = 4;

/// Logs corruption events at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl CorruptionNotifier for TracingNotifier {
    fn notify(&self, event: &CorruptionEvent) {
        error!(
            device = %event.device,
            block_type = %event.block_type,
            block = event.block,
            count = event.count,
            env = %event.env_var(),
            "Corruption event"
        );
    }

    fn engine_discrepancy(&self, block_type: BlockType, block: u64) {
        warn!(
            block_type = %block_type,
            block,
            "Primary hash engine mismatch resolved by fallback engine"
        );
    }
}

/// Restart action for hosts that cannot restart.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRestart;

impl RestartAction for NoRestart {
    fn request_restart(&self, _event: &CorruptionEvent) -> RestartOutcome {
        RestartOutcome::Unavailable
    }
}

/// Restart action with a bounded budget.
///
/// `used` is the number of restarts already requested according to the
/// host's persistent store; once it reaches `max`, every request reports
/// `BudgetExhausted`. Each instance forwards at most one request to the
/// inner action and repeats that first outcome afterwards.
pub struct BudgetedRestart {
    inner: Arc<dyn RestartAction>,
    used: AtomicU32,
    max: u32,
    first_outcome: Mutex<Option<RestartOutcome>>,
}

impl BudgetedRestart {
    pub fn new(inner: Arc<dyn RestartAction>, used: u32, max: u32) -> Self {
        Self {
            inner,
            used: AtomicU32::new(used.min(max)),
            max,
            first_outcome: Mutex::new(None),
        }
    }

    /// Counter value to persist.
    pub fn used(&self) -> u32 {
        self.used.load(Ordering::Relaxed)
    }
}

impl RestartAction for BudgetedRestart {
    fn request_restart(&self, event: &CorruptionEvent) -> RestartOutcome {
        let mut first = self.first_outcome.lock();
        if let Some(outcome) = *first {
            return outcome;
        }
        if self.used() >= self.max {
            warn!(max = self.max, "Restart budget exhausted");
            return RestartOutcome::BudgetExhausted;
        }

        let used = self.used.fetch_add(1, Ordering::Relaxed) + 1;
        let outcome = self.inner.request_restart(event);
        info!(used, max = self.max, ?outcome, "Restart requested");
        *first = Some(outcome);
        outcome
    }
}
