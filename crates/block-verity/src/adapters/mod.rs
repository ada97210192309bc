//! Adapters Layer - Concrete implementations of the outbound ports

pub mod cache;
pub mod device;
pub mod fec;
pub mod hashers;
pub mod notify;
pub mod segments;

pub use cache::{CacheStats, LruHashBlockCache, DEFAULT_CACHE_BLOCKS};
pub use device::{FileBlockDevice, MemoryBlockDevice};
pub use fec::NoFec;
pub use hashers::{provider_for, Blake3Provider, RustCryptoProvider};
pub use notify::{BudgetedRestart, NoRestart, TracingNotifier, DEFAULT_RESTART_BUDGET};
pub use segments::SegmentBuffer;
