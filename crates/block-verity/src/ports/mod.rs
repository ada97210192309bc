//! Ports Layer - Trait definitions for hexagonal architecture
//!
//! - Inbound: the API a target exposes
//! - Outbound: the collaborators it depends on

pub mod inbound;
pub mod outbound;

pub use inbound::VerityApi;
pub use outbound::{
    BlockDevice, CorruptionEvent, CorruptionNotifier, DataSegments, FecDecoder, HashBlock,
    HashBlockCache, HashBlockRef, HashProvider, HashState, IoCompletion, RepairRequest,
    RepairTarget, RestartAction, RestartOutcome, SegmentCursor, VerifiedFlag,
};
