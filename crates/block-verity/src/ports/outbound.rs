//! # Outbound Ports (Driven Ports)
//!
//! Collaborators the verification engine requires from its host.
//!
//! | Port | Provided by |
//! |------|-------------|
//! | `HashProvider` | `adapters::hashers` (software), platform accelerators |
//! | `HashBlockCache` | `adapters::cache::LruHashBlockCache` |
//! | `BlockDevice` | `adapters::device` |
//! | `DataSegments` | `adapters::segments::SegmentBuffer` |
//! | `FecDecoder` | `adapters::fec::NoFec`, external decoders |
//! | `RestartAction` | `adapters::notify` |
//! | `CorruptionNotifier` | `adapters::notify::TracingNotifier` |
//! | `IoCompletion` | any `FnOnce(S, Result<()>)` |

use crate::domain::types::BlockType;
use crate::error::{EngineError, FecError, StorageError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// Hash providers
// =============================================================================

/// An in-progress digest computation.
pub trait HashState: Send {
    fn update(&mut self, data: &[u8]) -> Result<(), EngineError>;

    fn finalize(self: Box<Self>) -> Result<Vec<u8>, EngineError>;
}

/// A digest algorithm implementation.
///
/// The engine holds two providers for the same algorithm: a primary one
/// (typically accelerated) and a fallback reference implementation.
pub trait HashProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn digest_size(&self) -> usize;

    /// Start a new digest computation.
    fn start(&self) -> Result<Box<dyn HashState>, EngineError>;
}

// =============================================================================
// Hash block cache
// =============================================================================

/// Write-once verification flag attached to a cached hash block.
///
/// Set only after the block hashed to its expected digest (or was repaired)
/// and never cleared. Concurrent sets store the same value.
#[derive(Debug, Default)]
pub struct VerifiedFlag(AtomicBool);

impl VerifiedFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// A hash-device block held by the cache.
#[derive(Debug)]
pub struct HashBlock {
    number: u64,
    data: Box<[u8]>,
    verified: VerifiedFlag,
}

impl HashBlock {
    pub fn new(number: u64, data: Vec<u8>) -> Self {
        Self {
            number,
            data: data.into_boxed_slice(),
            verified: VerifiedFlag::default(),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_verified(&self) -> bool {
        self.verified.is_set()
    }

    pub fn mark_verified(&self) {
        self.verified.set();
    }
}

/// Shared handle to a cached hash block.
pub type HashBlockRef = Arc<HashBlock>;

/// Buffer cache fronting the hash device.
pub trait HashBlockCache: Send + Sync {
    /// Read a hash block, loading it from the device on a miss. May block.
    fn read(&self, block: u64) -> Result<HashBlockRef, StorageError>;

    /// Replace the cached copy of `block` with repaired contents.
    ///
    /// The returned handle starts unverified; later readers get the new copy.
    fn install_repaired(&self, block: u64, data: Vec<u8>) -> HashBlockRef;

    /// Hint that `[start, start + count)` will be read soon. Best effort.
    fn prefetch(&self, start: u64, count: u64);

    /// Give a handle back to the cache.
    fn release(&self, block: HashBlockRef) {
        drop(block);
    }

    /// Size of the underlying hash device in hash blocks.
    fn block_count(&self) -> u64;

    /// Size of one hash block in bytes.
    fn block_size(&self) -> usize;
}

// =============================================================================
// Block storage
// =============================================================================

/// Block-addressed, read-only storage.
pub trait BlockDevice: Send + Sync {
    fn block_size(&self) -> usize;

    fn block_count(&self) -> u64;

    /// Read one block into `buf`, which must be exactly `block_size()` long.
    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<(), StorageError>;
}

/// Position inside a scatter list of data segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentCursor {
    pub index: usize,
    pub offset: usize,
}

/// The data buffers of a read request, in order.
///
/// A block may straddle segment boundaries; consumers walk it with
/// `next_segment` and may rewind to a saved cursor to walk it again.
pub trait DataSegments: Send {
    /// Total number of bytes across all segments.
    fn len_bytes(&self) -> usize;

    fn position(&self) -> SegmentCursor;

    fn rewind(&mut self, cursor: SegmentCursor);

    /// Next contiguous run of at most `max` bytes, advancing the cursor.
    /// `None` once the segments are exhausted.
    fn next_segment(&mut self, max: usize) -> Option<&mut [u8]>;
}

// =============================================================================
// Forward error correction
// =============================================================================

/// What the FEC decoder is asked to repair.
#[derive(Debug, Clone, Copy)]
pub struct RepairRequest<'a> {
    pub block_type: BlockType,
    pub block: u64,
    /// Digest the repaired contents must hash to.
    pub want_digest: &'a [u8],
}

/// Where repaired contents are written.
pub enum RepairTarget<'a> {
    /// A hash block; the buffer holds the damaged copy on entry.
    Buffer(&'a mut Vec<u8>),
    /// A data block inside the request segments, starting at `start`.
    Segments {
        segments: &'a mut dyn DataSegments,
        start: SegmentCursor,
        len: usize,
    },
}

/// Black-box forward error correction.
pub trait FecDecoder: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Repair the block in place. `Ok` means the target now holds contents
    /// matching `request.want_digest`.
    fn repair(&self, request: &RepairRequest<'_>, target: RepairTarget<'_>) -> Result<(), FecError>;

    /// Arguments echoed in the table status line.
    fn table_args(&self) -> Vec<String> {
        Vec::new()
    }
}

// =============================================================================
// Corruption side effects
// =============================================================================

/// Environment variable name carried by corruption notifications.
pub const ERR_BLOCK_ENV_VAR: &str = "DM_VERITY_ERR_BLOCK_NR";

/// A corruption event handed to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptionEvent {
    pub device: String,
    pub block_type: BlockType,
    pub block: u64,
    /// Counted events so far, including this one (saturates at the cap).
    pub count: u32,
}

impl CorruptionEvent {
    /// `DM_VERITY_ERR_BLOCK_NR=<type>,<block>`
    pub fn env_var(&self) -> String {
        format!(
            "{}={},{}",
            ERR_BLOCK_ENV_VAR,
            self.block_type.code(),
            self.block
        )
    }
}

/// Result of asking the host to restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// A restart was scheduled.
    Scheduled,
    /// No restart mechanism is available.
    Unavailable,
    /// The restart budget is used up.
    BudgetExhausted,
}

pub trait RestartAction: Send + Sync {
    fn request_restart(&self, event: &CorruptionEvent) -> RestartOutcome;
}

/// Sink for corruption notifications.
pub trait CorruptionNotifier: Send + Sync {
    fn notify(&self, event: &CorruptionEvent);

    /// The primary engine mismatched but the fallback engine matched.
    fn engine_discrepancy(&self, _block_type: BlockType, _block: u64) {}
}

// =============================================================================
// Completion
// =============================================================================

/// Completion callback for an asynchronous read request.
pub trait IoCompletion<S>: Send + 'static {
    fn complete(self: Box<Self>, segments: S, outcome: crate::error::Result<()>);
}

impl<S, F> IoCompletion<S> for F
where
    F: FnOnce(S, crate::error::Result<()>) + Send + 'static,
{
    fn complete(self: Box<Self>, segments: S, outcome: crate::error::Result<()>) {
        (*self)(segments, outcome)
    }
}
