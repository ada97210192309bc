//! # Block Verity
//!
//! Read-time integrity verification for block devices using a Merkle hash
//! tree. Every data block read is hashed and checked against a chain of
//! digests leading to a single trusted root; mismatches are retried on a
//! fallback hash engine, repaired by FEC when available, and otherwise
//! handled according to the configured corruption mode.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure logic, no I/O
//!   - `Geometry`: Tree layout and hash positions
//!   - `VerityConfig`: Configuration with validation
//!   - `VerityConfigBuilder`: Fluent builder for configuration
//!   - `prefetch_ranges`: Hash blocks a request will touch
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `VerityApi`: Driving port (inbound API)
//!   - `HashProvider`, `HashBlockCache`, `FecDecoder`, `RestartAction`,
//!     `CorruptionNotifier`: Driven ports
//!
//! - **Service Layer** (`service/`): Orchestration
//!   - `BlockVerifier`: Tree walk and mismatch handling
//!   - `CorruptionPolicy`: Corruption accounting
//!   - `VerifyWorkqueue`: Worker pool
//!   - `VerityTarget`: Implements `VerityApi`
//!
//! - **Adapters Layer** (`adapters/`): Software hashers, LRU hash block
//!   cache, memory and file devices, notifiers
//!
//! ## Invariants
//!
//! - A hash block is marked verified only after it hashed to the digest its
//!   parent holds (or was repaired to it). The mark is never cleared.
//! - Data is returned as verified only if its digest matches, or the
//!   corruption policy explicitly tolerated the mismatch.
//! - The corruption counter never exceeds `max_corrupted_errors`.
//!
//! ## Usage Example
//!
//! ```ignore
//! use block_verity::{Collaborators, FileBlockDevice, VerityConfig, VerityTarget};
//! use std::sync::Arc;
//!
//! let config = VerityConfig::from_table_args(&args)?.with_env_overrides();
//! let hash_device = Arc::new(FileBlockDevice::open("hash.img", 4096)?);
//! let data_device = FileBlockDevice::open("data.img", 4096)?;
//!
//! let target = VerityTarget::new(config, Collaborators::from_hash_device(hash_device))?;
//! let verified = target.read_blocks(&data_device, 0, 16)?;
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

/// Tree builder and instrumented collaborators.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-exports for convenience
pub use adapters::{
    provider_for, BudgetedRestart, FileBlockDevice, LruHashBlockCache, MemoryBlockDevice, NoFec,
    NoRestart, SegmentBuffer, TracingNotifier,
};
pub use domain::{
    BlockType, CorruptionMode, FormatVersion, Geometry, HashAlgorithm, StatusType, VerityConfig,
    VerityConfigBuilder,
};
pub use error::{ConfigError, EngineError, FecError, Result, StorageError, VerityError};
pub use metrics::{MetricsRecorder, MetricsSnapshot, NoOpMetrics, VerityMetrics};
pub use ports::{
    BlockDevice, CorruptionEvent, CorruptionNotifier, DataSegments, FecDecoder, HashBlockCache,
    HashProvider, IoCompletion, RestartAction, RestartOutcome, VerityApi,
};
pub use service::{Collaborators, VerityTarget, VerifyRequest};
