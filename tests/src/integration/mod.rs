//! # Integration Flows
//!
//! End-to-end scenarios driving a target through `VerityApi` and the
//! workqueue, with in-memory devices built by `block_verity::test_utils`.

pub mod concurrency;
pub mod corruption;
pub mod read_path;
