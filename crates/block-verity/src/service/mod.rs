//! Service Layer - Verification orchestration
//!
//! Wires the domain geometry to the outbound ports:
//! - `digest`: salted digests over primary and fallback providers
//! - `verifier`: tree walk and the mismatch fallback chain
//! - `policy`: corruption accounting and mode handling
//! - `workqueue`: worker pool running requests
//! - `target`: the assembled engine behind `VerityApi`

pub mod digest;
pub mod policy;
pub mod prefetch;
pub mod target;
pub mod verified_cache;
pub mod verifier;
pub mod workqueue;

pub use digest::{DigestContext, DigestEngine};
pub use policy::CorruptionPolicy;
pub use prefetch::PrefetchScheduler;
pub use target::{Collaborators, VerityTarget};
pub use verified_cache::VerifiedBlockCache;
pub use verifier::{BlockVerifier, CheckOutcome, LevelOutcome, VerityParams};
pub use workqueue::{VerifyRequest, VerifyWorkqueue};
