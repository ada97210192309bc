//! Error types for the verification engine
//!
//! ## Taxonomy
//!
//! | Type | Raised | Fatal to |
//! |------|--------|----------|
//! | `ConfigError` | target construction | the target |
//! | `StorageError` | device / cache reads | the request |
//! | `EngineError` | hash provider failure | the request |
//! | `FecError` | repair attempt | nothing (folded into the corruption policy) |
//! | `VerityError` | request verification | the request |
//!
//! `VerityError::Corrupt` is only produced after the corruption policy has
//! adjudicated a mismatch that neither engine nor FEC could resolve.

use crate::domain::types::BlockType;
use thiserror::Error;

/// Invalid geometry or configuration, detected at construction time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid format version: {0} (supported: 0, 1)")]
    InvalidVersion(u32),

    #[error("Invalid {which} block size: {size}")]
    InvalidBlockSize { which: &'static str, size: u32 },

    #[error("Digest size {digest_size} too big for {hash_block_size}-byte hash blocks")]
    DigestTooLarge {
        digest_size: usize,
        hash_block_size: u32,
    },

    #[error("Too many tree levels: {levels} > {max}")]
    TooManyLevels { levels: usize, max: usize },

    #[error("Arithmetic overflow computing {0}")]
    Overflow(&'static str),

    #[error("Invalid root digest: {0}")]
    InvalidRootDigest(String),

    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    #[error("Unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Hash providers disagree on digest size: primary {primary}, fallback {fallback}")]
    DigestSizeMismatch { primary: usize, fallback: usize },

    #[error("Hash device too small: need {needed} blocks, have {available}")]
    HashDeviceTooSmall { needed: u64, available: u64 },

    #[error("Not enough arguments: got {got}, need {need}")]
    NotEnoughArguments { got: usize, need: usize },

    #[error("Invalid {field}: {value}")]
    InvalidArgument { field: &'static str, value: String },

    #[error("Unrecognized verity feature request: {0}")]
    UnrecognizedOption(String),

    #[error("Malformed configuration document: {0}")]
    Malformed(String),

    #[error("Worker pool initialization failed: {0}")]
    WorkerPool(String),
}

/// Failure of the underlying block storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at block {block}: {source}")]
    Io {
        block: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Block {block} out of device bounds ({block_count} blocks)")]
    OutOfBounds { block: u64, block_count: u64 },

    #[error("Data segments exhausted: {missing} bytes missing for block {block}")]
    SegmentsExhausted { block: u64, missing: usize },

    #[error("Device error: {0}")]
    Device(String),
}

/// Failure of a hash provider (setup or driver fault, not a data fault).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Hash provider {0} unavailable")]
    Unavailable(String),

    #[error("Hash provider {provider} failed: {reason}")]
    Failed { provider: String, reason: String },
}

/// Failure of a forward-error-correction repair attempt.
#[derive(Debug, Error)]
pub enum FecError {
    #[error("FEC is not configured")]
    Disabled,

    #[error("{block_type} block {block} is unrepairable: {reason}")]
    Unrepairable {
        block_type: BlockType,
        block: u64,
        reason: String,
    },

    #[error("FEC storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors returned by request verification.
#[derive(Debug, Error)]
pub enum VerityError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Hash engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("{block_type} block {block} is corrupted")]
    Corrupt { block_type: BlockType, block: u64 },

    #[error("I/O out of range: blocks {start}..{end} exceed {data_blocks} data blocks")]
    OutOfRange {
        start: u64,
        end: u64,
        data_blocks: u64,
    },

    #[error("Unaligned I/O: {len} bytes is not {count} blocks of {block_size} bytes")]
    UnalignedIo {
        len: usize,
        count: u64,
        block_size: usize,
    },

    #[error("Verification worker dropped the request")]
    WorkerUnavailable,
}

impl VerityError {
    /// True for mismatches adjudicated as fatal by the corruption policy.
    pub fn is_corruption(&self) -> bool {
        matches!(self, VerityError::Corrupt { .. })
    }
}

/// Result alias using `VerityError`.
pub type Result<T> = std::result::Result<T, VerityError>;
