//! # Block Verifier
//!
//! Walks the hash tree for each data block of a request and checks the data
//! against the digest it reaches.
//!
//! ## Algorithm
//!
//! 1. Level-0 shortcut: if the level-0 hash block covering the data block is
//!    already verified, take the data digest from it directly.
//! 2. Otherwise start from the root digest and verify every level from the
//!    top down to 0, extracting the child digest at each step.
//! 3. Hash the data block (streamed over the request segments) and compare.
//!
//! ## Mismatch Handling
//!
//! Hash blocks and data blocks go through the same ordered chain:
//!
//! ```text
//! primary engine -> fallback engine -> FEC repair -> corruption policy
//! ```
//!
//! A match on the fallback engine only emits a discrepancy event. A
//! tolerated mismatch leaves the hash block unverified so that the next
//! access checks it again.

use crate::domain::geometry::Geometry;
use crate::domain::types::{BlockType, EngineSelector, PolicyDecision};
use crate::error::{FecError, Result, StorageError, VerityError};
use crate::metrics::MetricsRecorder;
use crate::ports::outbound::{
    DataSegments, FecDecoder, HashBlockRef, RepairRequest, RepairTarget, SegmentCursor,
};
use crate::service::digest::DigestEngine;
use crate::service::policy::CorruptionPolicy;
use crate::service::verified_cache::VerifiedBlockCache;
use std::sync::Arc;
use tracing::{debug, trace};

/// Resolved tree parameters.
#[derive(Debug, Clone)]
pub struct VerityParams {
    pub geometry: Geometry,
    pub root_digest: Vec<u8>,
    /// Digest of an all-zero data block, when the zero shortcut is enabled.
    pub zero_digest: Option<Vec<u8>>,
}

/// Result of verifying one tree level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelOutcome {
    /// The child digest was extracted.
    Verified,
    /// The hash block is not verified yet and the caller asked to skip it.
    Skipped,
}

/// How a block check was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Primary engine matched.
    Match,
    /// Primary mismatched, fallback engine matched.
    MatchOnFallback,
    /// FEC restored contents matching the expected digest.
    Repaired,
    /// Mismatch accepted by the corruption policy.
    Tolerated,
}

impl CheckOutcome {
    fn is_trusted(self) -> bool {
        !matches!(self, CheckOutcome::Tolerated)
    }
}

/// A block that can be hashed and repaired by the fallback chain.
trait VerificationSubject {
    fn block_type(&self) -> BlockType;

    fn block(&self) -> u64;

    fn hash_with(&mut self, engine: &DigestEngine, selector: EngineSelector) -> Result<Vec<u8>>;

    fn repair(&mut self, fec: &dyn FecDecoder, want_digest: &[u8]) -> std::result::Result<(), FecError>;
}

/// A hash-tree block held in the cache.
struct MetadataSubject {
    buf: HashBlockRef,
    repaired: Option<Vec<u8>>,
}

impl VerificationSubject for MetadataSubject {
    fn block_type(&self) -> BlockType {
        BlockType::Metadata
    }

    fn block(&self) -> u64 {
        self.buf.number()
    }

    fn hash_with(&mut self, engine: &DigestEngine, selector: EngineSelector) -> Result<Vec<u8>> {
        Ok(engine.digest(self.buf.data(), selector)?)
    }

    fn repair(&mut self, fec: &dyn FecDecoder, want_digest: &[u8]) -> std::result::Result<(), FecError> {
        let mut contents = self.buf.data().to_vec();
        let request = RepairRequest {
            block_type: BlockType::Metadata,
            block: self.buf.number(),
            want_digest,
        };
        fec.repair(&request, RepairTarget::Buffer(&mut contents))?;
        self.repaired = Some(contents);
        Ok(())
    }
}

/// A data block inside the request segments.
struct DataSubject<'a> {
    block: u64,
    segments: &'a mut dyn DataSegments,
    start: SegmentCursor,
    len: usize,
}

impl VerificationSubject for DataSubject<'_> {
    fn block_type(&self) -> BlockType {
        BlockType::Data
    }

    fn block(&self) -> u64 {
        self.block
    }

    fn hash_with(&mut self, engine: &DigestEngine, selector: EngineSelector) -> Result<Vec<u8>> {
        self.segments.rewind(self.start);
        let mut ctx = engine.begin(selector)?;
        for_each_run(&mut *self.segments, self.len, self.block, |run| {
            ctx.update(run)?;
            Ok(())
        })?;
        Ok(ctx.finish()?)
    }

    fn repair(&mut self, fec: &dyn FecDecoder, want_digest: &[u8]) -> std::result::Result<(), FecError> {
        let request = RepairRequest {
            block_type: BlockType::Data,
            block: self.block,
            want_digest,
        };
        fec.repair(
            &request,
            RepairTarget::Segments {
                segments: &mut *self.segments,
                start: self.start,
                len: self.len,
            },
        )
    }
}

/// Visit the next `len` bytes of `segments` run by run.
fn for_each_run(
    segments: &mut dyn DataSegments,
    len: usize,
    block: u64,
    mut f: impl FnMut(&mut [u8]) -> Result<()>,
) -> Result<()> {
    let mut remaining = len;
    while remaining > 0 {
        let run = segments
            .next_segment(remaining)
            .ok_or(StorageError::SegmentsExhausted {
                block,
                missing: remaining,
            })?;
        remaining -= run.len();
        f(run)?;
    }
    Ok(())
}

/// Verifies data blocks against the hash tree.
pub struct BlockVerifier {
    params: VerityParams,
    digest: DigestEngine,
    cache: VerifiedBlockCache,
    fec: Arc<dyn FecDecoder>,
    policy: Arc<CorruptionPolicy>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl BlockVerifier {
    pub fn new(
        params: VerityParams,
        digest: DigestEngine,
        cache: VerifiedBlockCache,
        fec: Arc<dyn FecDecoder>,
        policy: Arc<CorruptionPolicy>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            params,
            digest,
            cache,
            fec,
            policy,
            metrics,
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.params.geometry
    }

    pub fn params(&self) -> &VerityParams {
        &self.params
    }

    pub fn policy(&self) -> &CorruptionPolicy {
        &self.policy
    }

    pub fn cache(&self) -> &VerifiedBlockCache {
        &self.cache
    }

    pub fn fec(&self) -> &dyn FecDecoder {
        self.fec.as_ref()
    }

    fn run_fallback_chain(
        &self,
        subject: &mut dyn VerificationSubject,
        want_digest: &[u8],
    ) -> Result<CheckOutcome> {
        let block_type = subject.block_type();
        let block = subject.block();

        if subject.hash_with(&self.digest, EngineSelector::Primary)? == want_digest {
            return Ok(CheckOutcome::Match);
        }

        trace!(%block_type, block, "Primary engine mismatch, retrying on fallback");
        if subject.hash_with(&self.digest, EngineSelector::Fallback)? == want_digest {
            self.policy.on_engine_discrepancy(block_type, block);
            return Ok(CheckOutcome::MatchOnFallback);
        }

        if self.fec.is_enabled() {
            match subject.repair(self.fec.as_ref(), want_digest) {
                Ok(()) => {
                    debug!(%block_type, block, "Block repaired by FEC");
                    self.metrics.record_fec_repair();
                    return Ok(CheckOutcome::Repaired);
                }
                Err(e) => debug!(%block_type, block, error = %e, "FEC repair failed"),
            }
        }

        match self.policy.on_corruption(block_type, block) {
            PolicyDecision::Fail => Err(VerityError::Corrupt { block_type, block }),
            PolicyDecision::Continue => Ok(CheckOutcome::Tolerated),
        }
    }

    /// Verify the hash block covering `data_block` at `level`.
    ///
    /// `want_digest` holds the expected digest of that hash block on entry
    /// and the digest for the level below (or the data block) on success.
    pub fn verify_level(
        &self,
        data_block: u64,
        level: usize,
        skip_unverified: bool,
        want_digest: &mut Vec<u8>,
    ) -> Result<LevelOutcome> {
        let geometry = &self.params.geometry;
        let position = geometry.hash_at_level(data_block, level);
        let buf = self.cache.read_hash_block(position.block)?;

        if self.cache.is_verified(&buf) {
            self.copy_digest(&buf, position.offset, want_digest);
            self.cache.release(buf);
            return Ok(LevelOutcome::Verified);
        }
        if skip_unverified {
            self.cache.release(buf);
            return Ok(LevelOutcome::Skipped);
        }

        let mut subject = MetadataSubject {
            buf,
            repaired: None,
        };
        let outcome = self.run_fallback_chain(&mut subject, want_digest.as_slice());
        let MetadataSubject { buf, repaired } = subject;

        match outcome {
            Ok(CheckOutcome::Repaired) => {
                let contents = repaired.unwrap_or_else(|| buf.data().to_vec());
                let fixed = self.cache.install_repaired(position.block, contents);
                self.cache.mark_verified(&fixed);
                self.metrics.record_hash_block_verified();
                self.copy_digest(&fixed, position.offset, want_digest);
                self.cache.release(fixed);
            }
            Ok(checked) => {
                if checked.is_trusted() {
                    self.cache.mark_verified(&buf);
                    self.metrics.record_hash_block_verified();
                }
                self.copy_digest(&buf, position.offset, want_digest);
            }
            Err(e) => {
                self.cache.release(buf);
                return Err(e);
            }
        }
        self.cache.release(buf);
        Ok(LevelOutcome::Verified)
    }

    fn copy_digest(&self, buf: &HashBlockRef, offset: usize, want_digest: &mut Vec<u8>) {
        let size = self.digest.digest_size();
        want_digest.clear();
        want_digest.extend_from_slice(&buf.data()[offset..offset + size]);
    }

    /// Expected digest of `data_block`, and whether it is the zero digest.
    pub fn hash_for_block(&self, data_block: u64) -> Result<(Vec<u8>, bool)> {
        let levels = self.params.geometry.levels();
        let mut want_digest = Vec::with_capacity(self.digest.digest_size());

        let shortcut = levels > 0
            && self.verify_level(data_block, 0, true, &mut want_digest)? == LevelOutcome::Verified;

        if shortcut {
            self.metrics.record_level0_hit();
        } else {
            want_digest.clone_from(&self.params.root_digest);
            for level in (0..levels).rev() {
                self.verify_level(data_block, level, false, &mut want_digest)?;
            }
        }

        let is_zero = self
            .params
            .zero_digest
            .as_deref()
            .is_some_and(|zero| zero == want_digest.as_slice());
        Ok((want_digest, is_zero))
    }

    /// Verify one data block at the current segment cursor and leave the
    /// cursor at the end of the block.
    pub fn verify_block(&self, data_block: u64, segments: &mut dyn DataSegments) -> Result<()> {
        let (want_digest, is_zero) = self.hash_for_block(data_block)?;
        let len = self.params.geometry.data_block_size();

        if is_zero {
            for_each_run(segments, len, data_block, |run| {
                run.fill(0);
                Ok(())
            })?;
            self.metrics.record_zero_block();
            return Ok(());
        }

        let start = segments.position();
        let mut subject = DataSubject {
            block: data_block,
            segments: &mut *segments,
            start,
            len,
        };
        let outcome = self.run_fallback_chain(&mut subject, &want_digest);

        segments.rewind(start);
        for_each_run(segments, len, data_block, |_| Ok(()))?;

        if outcome?.is_trusted() {
            self.metrics.record_data_block_verified();
        }
        Ok(())
    }

    /// Verify `count` blocks starting at `start`, in order, stopping at the
    /// first failure. The segments must be positioned at the first block.
    pub fn verify_request(
        &self,
        start: u64,
        count: u64,
        segments: &mut dyn DataSegments,
    ) -> Result<()> {
        for block in start..start + count {
            self.verify_block(block, segments)?;
        }
        Ok(())
    }

    /// Digest of an all-zero data block under the primary engine.
    pub fn compute_zero_digest(digest: &DigestEngine, data_block_size: usize) -> Result<Vec<u8>> {
        Ok(digest.digest(&vec![0u8; data_block_size], EngineSelector::Primary)?)
    }
}
