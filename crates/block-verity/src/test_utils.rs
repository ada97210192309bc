//! # Test Utilities
//!
//! In-memory tree builder and instrumented collaborators shared by the unit
//! tests and the integration suite (behind the `test-utils` feature).

use crate::adapters::device::MemoryBlockDevice;
use crate::adapters::hashers::provider_for;
use crate::domain::config::{VerityConfig, VerityConfigBuilder};
use crate::domain::geometry::Geometry;
use crate::domain::types::{BlockType, EngineSelector, HashAlgorithm};
use crate::error::{EngineError, FecError, StorageError};
use crate::ports::outbound::{
    BlockDevice, CorruptionEvent, CorruptionNotifier, FecDecoder, HashProvider,
    HashState, RepairRequest, RepairTarget, RestartAction, RestartOutcome,
};
use crate::service::digest::DigestEngine;
use crate::service::target::{Collaborators, VerityTarget};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// Images
// =============================================================================

/// `blocks` blocks of deterministic, never all-zero content.
pub fn sample_data(blocks: usize, block_size: usize) -> Vec<u8> {
    let mut data = vec![0u8; blocks * block_size];
    for (block, chunk) in data.chunks_exact_mut(block_size).enumerate() {
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = ((block * 131 + i * 7) % 251) as u8 ^ 0x5a;
        }
    }
    data
}

/// Invert every bit of the byte at `offset`.
pub fn flip_byte(bytes: &mut [u8], offset: usize) {
    bytes[offset] ^= 0xff;
}

/// A hash device image and the root digest it chains to.
#[derive(Debug, Clone)]
pub struct TreeImage {
    /// Hash device contents, `hash_blocks` blocks long.
    pub hash_image: Vec<u8>,
    pub root_digest: Vec<u8>,
}

/// Build the hash tree for `data`, bottom level first.
pub fn build_hash_tree(
    data: &[u8],
    geometry: &Geometry,
    algorithm: HashAlgorithm,
    salt: &[u8],
) -> TreeImage {
    let provider = provider_for(algorithm);
    let engine = DigestEngine::new(
        Arc::clone(&provider),
        provider,
        salt.to_vec(),
        geometry.version(),
    )
    .expect("same provider on both sides");
    let digest = |content: &[u8]| {
        engine
            .digest(content, EngineSelector::Primary)
            .expect("software digest")
    };

    let dbs = geometry.data_block_size();
    let hbs = geometry.hash_block_size();
    let levels = geometry.levels();
    let mut hash_image = vec![0u8; geometry.hash_blocks() as usize * hbs];

    if levels == 0 {
        return TreeImage {
            hash_image,
            root_digest: digest(&data[..dbs]),
        };
    }

    let bits = geometry.hash_per_block_bits();
    let place = |image: &mut Vec<u8>, data_block: u64, level: usize, value: &[u8]| {
        let pos = geometry.hash_at_level(data_block, level);
        let at = pos.block as usize * hbs + pos.offset;
        image[at..at + value.len()].copy_from_slice(value);
    };

    for (block, chunk) in data.chunks_exact(dbs).enumerate() {
        place(&mut hash_image, block as u64, 0, &digest(chunk));
    }
    for level in 1..levels {
        let below = geometry.level_block(level - 1) as usize;
        for child in 0..geometry.blocks_at_level(level - 1) as usize {
            let start = (below + child) * hbs;
            let value = digest(&hash_image[start..start + hbs]);
            let data_block = (child as u64) << (bits as usize * level);
            place(&mut hash_image, data_block, level, &value);
        }
    }

    let top = geometry.level_block(levels - 1) as usize * hbs;
    let root_digest = digest(&hash_image[top..top + hbs]);
    TreeImage {
        hash_image,
        root_digest,
    }
}

// =============================================================================
// Hash providers
// =============================================================================

struct WrongDigestState(Box<dyn HashState>);

impl HashState for WrongDigestState {
    fn update(&mut self, data: &[u8]) -> Result<(), EngineError> {
        self.0.update(data)
    }

    fn finalize(self: Box<Self>) -> Result<Vec<u8>, EngineError> {
        let mut out = self.0.finalize()?;
        if let Some(first) = out.first_mut() {
            *first ^= 0x01;
        }
        Ok(out)
    }
}

/// Primary provider that returns wrong digests, like a faulty accelerator.
pub struct FaultyPrimaryProvider {
    inner: Arc<dyn HashProvider>,
    remaining: AtomicU32,
    always: bool,
}

impl FaultyPrimaryProvider {
    /// Wrong digests for the next `n` computations, correct ones afterwards.
    pub fn failing_next(inner: Arc<dyn HashProvider>, n: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(n),
            always: false,
        }
    }

    pub fn always_wrong(inner: Arc<dyn HashProvider>) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(0),
            always: true,
        }
    }

    fn take_fault(&self) -> bool {
        self.always
            || self
                .remaining
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                .is_ok()
    }
}

impl HashProvider for FaultyPrimaryProvider {
    fn name(&self) -> &str {
        "faulty"
    }

    fn digest_size(&self) -> usize {
        self.inner.digest_size()
    }

    fn start(&self) -> Result<Box<dyn HashState>, EngineError> {
        let state = self.inner.start()?;
        if self.take_fault() {
            Ok(Box::new(WrongDigestState(state)))
        } else {
            Ok(state)
        }
    }
}

/// Provider whose every computation fails.
pub struct UnavailableProvider {
    digest_size: usize,
}

impl UnavailableProvider {
    pub fn new(digest_size: usize) -> Self {
        Self { digest_size }
    }
}

impl HashProvider for UnavailableProvider {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn digest_size(&self) -> usize {
        self.digest_size
    }

    fn start(&self) -> Result<Box<dyn HashState>, EngineError> {
        Err(EngineError::Unavailable(self.name().to_string()))
    }
}

/// Provider that counts digest computations.
pub struct CountingProvider {
    inner: Arc<dyn HashProvider>,
    started: AtomicU64,
}

impl CountingProvider {
    pub fn new(inner: Arc<dyn HashProvider>) -> Self {
        Self {
            inner,
            started: AtomicU64::new(0),
        }
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }
}

impl HashProvider for CountingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn digest_size(&self) -> usize {
        self.inner.digest_size()
    }

    fn start(&self) -> Result<Box<dyn HashState>, EngineError> {
        self.started.fetch_add(1, Ordering::Relaxed);
        self.inner.start()
    }
}

// =============================================================================
// Side effects
// =============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<CorruptionEvent>>,
    discrepancies: Mutex<Vec<(BlockType, u64)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<CorruptionEvent> {
        self.events.lock().clone()
    }

    pub fn discrepancies(&self) -> Vec<(BlockType, u64)> {
        self.discrepancies.lock().clone()
    }
}

impl CorruptionNotifier for RecordingNotifier {
    fn notify(&self, event: &CorruptionEvent) {
        self.events.lock().push(event.clone());
    }

    fn engine_discrepancy(&self, block_type: BlockType, block: u64) {
        self.discrepancies.lock().push((block_type, block));
    }
}

/// Restart action answering with a fixed outcome.
pub struct RecordingRestart {
    outcome: RestartOutcome,
    requests: AtomicU32,
}

impl RecordingRestart {
    pub fn new(outcome: RestartOutcome) -> Self {
        Self {
            outcome,
            requests: AtomicU32::new(0),
        }
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::Relaxed)
    }
}

impl RestartAction for RecordingRestart {
    fn request_restart(&self, _event: &CorruptionEvent) -> RestartOutcome {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.outcome
    }
}

// =============================================================================
// FEC
// =============================================================================

/// Decoder that restores blocks from a pristine copy of the image.
pub struct MockFec {
    kind: BlockType,
    image: Vec<u8>,
    block_size: usize,
    repairs: AtomicU32,
    table_args: Vec<String>,
}

impl MockFec {
    /// Repairs data blocks from `data`.
    pub fn for_data(data: Vec<u8>, block_size: usize) -> Self {
        Self::new(BlockType::Data, data, block_size)
    }

    /// Repairs hash blocks from `hash_image`.
    pub fn for_hash(hash_image: Vec<u8>, block_size: usize) -> Self {
        Self::new(BlockType::Metadata, hash_image, block_size)
    }

    fn new(kind: BlockType, image: Vec<u8>, block_size: usize) -> Self {
        Self {
            kind,
            image,
            block_size,
            repairs: AtomicU32::new(0),
            table_args: Vec::new(),
        }
    }

    pub fn with_table_args(mut self, args: &[&str]) -> Self {
        self.table_args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn repairs(&self) -> u32 {
        self.repairs.load(Ordering::Relaxed)
    }

    fn pristine(&self, request: &RepairRequest<'_>) -> Result<&[u8], FecError> {
        let unrepairable = |reason: &str| FecError::Unrepairable {
            block_type: request.block_type,
            block: request.block,
            reason: reason.to_string(),
        };
        if request.block_type != self.kind {
            return Err(unrepairable("no parity for this block type"));
        }
        let start = request.block as usize * self.block_size;
        self.image
            .get(start..start + self.block_size)
            .ok_or_else(|| unrepairable("beyond parity area"))
    }
}

impl FecDecoder for MockFec {
    fn is_enabled(&self) -> bool {
        true
    }

    fn repair(&self, request: &RepairRequest<'_>, target: RepairTarget<'_>) -> Result<(), FecError> {
        let pristine = self.pristine(request)?;
        match target {
            RepairTarget::Buffer(buf) => {
                buf.clear();
                buf.extend_from_slice(pristine);
            }
            RepairTarget::Segments {
                segments,
                start,
                len,
            } => {
                segments.rewind(start);
                let mut copied = 0;
                while copied < len {
                    let run = segments.next_segment(len - copied).ok_or(
                        StorageError::SegmentsExhausted {
                            block: request.block,
                            missing: len - copied,
                        },
                    )?;
                    let n = run.len();
                    run.copy_from_slice(&pristine[copied..copied + n]);
                    copied += n;
                }
            }
        }
        self.repairs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn table_args(&self) -> Vec<String> {
        self.table_args.clone()
    }
}

// =============================================================================
// Devices
// =============================================================================

/// Device wrapper failing reads of chosen blocks.
pub struct FailingDevice {
    inner: Arc<dyn BlockDevice>,
    failing: HashSet<u64>,
}

impl FailingDevice {
    pub fn new(inner: Arc<dyn BlockDevice>, failing: impl IntoIterator<Item = u64>) -> Self {
        Self {
            inner,
            failing: failing.into_iter().collect(),
        }
    }
}

impl BlockDevice for FailingDevice {
    fn block_size(&self) -> usize {
        self.inner.block_size()
    }

    fn block_count(&self) -> u64 {
        self.inner.block_count()
    }

    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        if self.failing.contains(&block) {
            return Err(StorageError::Io {
                block,
                source: std::io::Error::other("injected read failure"),
            });
        }
        self.inner.read_block(block, buf)
    }
}

// =============================================================================
// Fixture
// =============================================================================

pub const FIXTURE_BLOCK_SIZE: usize = 4096;
pub const FIXTURE_SALT: &[u8] = b"fixture-salt";

/// A consistent data image, hash image and configuration.
pub struct VerityFixture {
    pub config: VerityConfig,
    pub data: Vec<u8>,
    pub tree: TreeImage,
    pub data_device: Arc<MemoryBlockDevice>,
    pub hash_device: Arc<MemoryBlockDevice>,
}

impl VerityFixture {
    /// SHA-256, v1, 4K blocks, salted.
    pub fn new(blocks: usize) -> Self {
        Self::with_config(blocks, |_| {})
    }

    /// Like `new`, with the configuration adjusted before the tree is built.
    pub fn with_config(blocks: usize, adjust: impl FnOnce(&mut VerityConfig)) -> Self {
        Self::from_data(sample_data(blocks, FIXTURE_BLOCK_SIZE), adjust)
    }

    /// Fixture over `data`, which must be a whole number of 4K blocks
    /// (unless `adjust` changes the data block size accordingly).
    pub fn from_data(data: Vec<u8>, adjust: impl FnOnce(&mut VerityConfig)) -> Self {
        let blocks = (data.len() / FIXTURE_BLOCK_SIZE) as u64;
        let mut config = VerityConfigBuilder::new()
            .devices("data.img", "hash.img")
            .data_block_size(FIXTURE_BLOCK_SIZE as u32)
            .hash_block_size(FIXTURE_BLOCK_SIZE as u32)
            .data_blocks(blocks)
            .algorithm(HashAlgorithm::Sha256)
            .root_digest(&[0u8; 32])
            .salt(FIXTURE_SALT)
            .worker_threads(2)
            .build()
            .expect("fixture config");
        adjust(&mut config);

        let geometry = config.geometry().expect("fixture geometry");
        let salt = config.salt_bytes().expect("fixture salt");
        let tree = build_hash_tree(&data, &geometry, config.algorithm, &salt);
        config.root_digest = hex::encode(&tree.root_digest);

        let hash_image = tree.hash_image.clone();
        Self {
            data_device: Arc::new(MemoryBlockDevice::new(geometry.data_block_size(), data.clone())),
            hash_device: Arc::new(MemoryBlockDevice::new(geometry.hash_block_size(), hash_image)),
            config,
            data,
            tree,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::from_hash_device(self.hash_device.clone())
    }

    pub fn target(&self) -> VerityTarget {
        self.target_with(self.collaborators())
    }

    pub fn target_with(&self, collaborators: Collaborators) -> VerityTarget {
        VerityTarget::new(self.config.clone(), collaborators).expect("fixture target")
    }

    /// Bytes of data blocks `[start, start + count)`.
    pub fn blocks(&self, start: u64, count: u64) -> Vec<u8> {
        let bs = self.config.data_block_size as usize;
        self.data[start as usize * bs..(start + count) as usize * bs].to_vec()
    }

    /// Byte offset of the first level-0 hash block on the hash device.
    pub fn level0_offset(&self) -> usize {
        let geometry = self.config.geometry().expect("fixture geometry");
        geometry.level_block(0) as usize * geometry.hash_block_size()
    }
}
