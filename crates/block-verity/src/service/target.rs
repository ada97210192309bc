//! # Verity Target
//!
//! The assembled engine: resolves a `VerityConfig` against its collaborators
//! and serves verified reads.
//!
//! ## Construction
//!
//! 1. Validate the configuration and compute the geometry.
//! 2. Pick hash providers (software ones unless the host plugs in its own).
//! 3. Check that the hash device holds the whole tree.
//! 4. Compute the zero-block digest when the shortcut is enabled.
//! 5. Start the verification workqueue.

use crate::adapters::cache::LruHashBlockCache;
use crate::adapters::fec::NoFec;
use crate::adapters::hashers::provider_for;
use crate::adapters::notify::{NoRestart, TracingNotifier};
use crate::adapters::segments::SegmentBuffer;
use crate::domain::config::VerityConfig;
use crate::domain::geometry::Geometry;
use crate::domain::status::{info_status, StatusType, TableStatus};
use crate::error::{ConfigError, Result, StorageError, VerityError};
use crate::metrics::{MetricsRecorder, MetricsSnapshot, VerityMetrics};
use crate::ports::inbound::VerityApi;
use crate::ports::outbound::{
    BlockDevice, CorruptionNotifier, DataSegments, FecDecoder, HashBlockCache, HashProvider,
    IoCompletion, RestartAction, SegmentCursor,
};
use crate::service::digest::DigestEngine;
use crate::service::policy::CorruptionPolicy;
use crate::service::prefetch::PrefetchScheduler;
use crate::service::verified_cache::VerifiedBlockCache;
use crate::service::verifier::{BlockVerifier, VerityParams};
use crate::service::workqueue::{VerifyRequest, VerifyWorkqueue};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// External collaborators of a target.
pub struct Collaborators {
    pub hash_cache: Arc<dyn HashBlockCache>,
    pub fec: Arc<dyn FecDecoder>,
    pub restart: Arc<dyn RestartAction>,
    pub notifier: Arc<dyn CorruptionNotifier>,
    /// Primary hash provider; the software one when `None`.
    pub primary: Option<Arc<dyn HashProvider>>,
    /// Fallback hash provider; the software one when `None`.
    pub fallback: Option<Arc<dyn HashProvider>>,
}

impl Collaborators {
    /// Defaults around `hash_cache`: no FEC, no restart, tracing notifications.
    pub fn new(hash_cache: Arc<dyn HashBlockCache>) -> Self {
        Self {
            hash_cache,
            fec: Arc::new(NoFec),
            restart: Arc::new(NoRestart),
            notifier: Arc::new(TracingNotifier),
            primary: None,
            fallback: None,
        }
    }

    /// Defaults with an LRU cache in front of `hash_device`.
    pub fn from_hash_device(hash_device: Arc<dyn BlockDevice>) -> Self {
        Self::new(Arc::new(LruHashBlockCache::with_default_capacity(hash_device)))
    }

    pub fn with_fec(mut self, fec: Arc<dyn FecDecoder>) -> Self {
        self.fec = fec;
        self
    }

    pub fn with_restart(mut self, restart: Arc<dyn RestartAction>) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CorruptionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_primary(mut self, provider: Arc<dyn HashProvider>) -> Self {
        self.primary = Some(provider);
        self
    }

    pub fn with_fallback(mut self, provider: Arc<dyn HashProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }
}

pub struct VerityTarget {
    config: VerityConfig,
    root_digest: Vec<u8>,
    salt: Vec<u8>,
    verifier: Arc<BlockVerifier>,
    prefetch: Arc<PrefetchScheduler>,
    workqueue: VerifyWorkqueue,
    metrics: Arc<VerityMetrics>,
}

impl VerityTarget {
    pub fn new(config: VerityConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let geometry = config.geometry()?;
        let root_digest = config.root_digest_bytes()?;
        let salt = config.salt_bytes()?;

        let Collaborators {
            hash_cache,
            fec,
            restart,
            notifier,
            primary,
            fallback,
        } = collaborators;

        let primary = primary.unwrap_or_else(|| provider_for(config.algorithm));
        let fallback = fallback.unwrap_or_else(|| provider_for(config.algorithm));
        if primary.digest_size() != config.algorithm.digest_size() {
            return Err(ConfigError::InvalidArgument {
                field: "primary hash provider",
                value: format!("{} ({} bytes)", primary.name(), primary.digest_size()),
            }
            .into());
        }
        let digest = DigestEngine::new(primary, fallback, salt.clone(), config.version)?;

        let cache = VerifiedBlockCache::new(hash_cache);
        if cache.block_size() != geometry.hash_block_size() {
            return Err(ConfigError::InvalidBlockSize {
                which: "hash device",
                size: u32::try_from(cache.block_size()).unwrap_or(u32::MAX),
            }
            .into());
        }
        if geometry.hash_blocks() > cache.device_blocks() {
            return Err(ConfigError::HashDeviceTooSmall {
                needed: geometry.hash_blocks(),
                available: cache.device_blocks(),
            }
            .into());
        }

        let zero_digest = if config.ignore_zero_blocks {
            Some(BlockVerifier::compute_zero_digest(
                &digest,
                geometry.data_block_size(),
            )?)
        } else {
            None
        };

        let metrics = Arc::new(VerityMetrics::new());
        let recorder: Arc<dyn MetricsRecorder> = metrics.clone();
        let policy = Arc::new(CorruptionPolicy::new(
            config.data_device.clone(),
            config.mode,
            config.max_corrupted_errors,
            notifier,
            restart,
            Arc::clone(&recorder),
        ));

        let prefetch = Arc::new(PrefetchScheduler::new(
            geometry.clone(),
            cache.clone(),
            config.prefetch_cluster_bytes,
        ));
        let verifier = Arc::new(BlockVerifier::new(
            VerityParams {
                geometry,
                root_digest: root_digest.clone(),
                zero_digest,
            },
            digest,
            cache,
            fec,
            policy,
            Arc::clone(&recorder),
        ));
        let workqueue =
            VerifyWorkqueue::new(Arc::clone(&verifier), recorder, config.worker_threads)?;

        info!(
            data_device = %config.data_device,
            hash_device = %config.hash_device,
            data_blocks = config.data_blocks,
            levels = verifier.geometry().levels(),
            algorithm = %config.algorithm,
            mode = ?config.mode,
            workers = workqueue.threads(),
            "Verity target created"
        );

        Ok(Self {
            config,
            root_digest,
            salt,
            verifier,
            prefetch,
            workqueue,
            metrics,
        })
    }

    pub fn config(&self) -> &VerityConfig {
        &self.config
    }

    pub fn geometry(&self) -> &Geometry {
        self.verifier.geometry()
    }

    pub fn workqueue(&self) -> &VerifyWorkqueue {
        &self.workqueue
    }

    /// Check a request against the device size and buffer length.
    pub fn validate_request(&self, start: u64, count: u64, len: usize) -> Result<()> {
        let geometry = self.geometry();
        let end = start.checked_add(count).unwrap_or(u64::MAX);
        if end > geometry.data_blocks() {
            return Err(VerityError::OutOfRange {
                start,
                end,
                data_blocks: geometry.data_blocks(),
            });
        }
        let expected = count
            .checked_mul(geometry.data_block_size() as u64)
            .and_then(|bytes| usize::try_from(bytes).ok());
        if expected != Some(len) {
            return Err(VerityError::UnalignedIo {
                len,
                count,
                block_size: geometry.data_block_size(),
            });
        }
        Ok(())
    }

    /// Hand a request whose data read has finished to the workqueue.
    pub fn submit_read<S>(
        &self,
        start: u64,
        count: u64,
        segments: S,
        io_status: std::result::Result<(), StorageError>,
        completion: Box<dyn IoCompletion<S>>,
    ) where
        S: DataSegments + 'static,
    {
        if let Err(e) = self.validate_request(start, count, segments.len_bytes()) {
            completion.complete(segments, Err(e));
            return;
        }
        self.workqueue
            .complete_read(VerifyRequest::new(start, count, segments), io_status, completion);
    }

    /// Verify already loaded data on a worker and wait for the result.
    pub fn verify_blocking<S: DataSegments>(&self, start: u64, count: u64, segments: S) -> Result<S> {
        self.validate_request(start, count, segments.len_bytes())?;
        self.workqueue
            .verify_blocking(VerifyRequest::new(start, count, segments))
    }

    /// Verify already loaded data on a worker without blocking the caller.
    pub fn verify_async<S>(
        &self,
        start: u64,
        count: u64,
        segments: S,
    ) -> impl Future<Output = Result<S>>
    where
        S: DataSegments + 'static,
    {
        let submitted = self
            .validate_request(start, count, segments.len_bytes())
            .map(|()| {
                self.workqueue
                    .verify_async(VerifyRequest::new(start, count, segments))
            });
        async move { submitted?.await }
    }

    /// Full read path: read `count` blocks from `data_device` starting at
    /// `start`, verify them and return the verified bytes.
    pub fn read_blocks(&self, data_device: &dyn BlockDevice, start: u64, count: u64) -> Result<Vec<u8>> {
        let block_size = self.geometry().data_block_size();
        if data_device.block_size() != block_size {
            return Err(StorageError::Device(format!(
                "data device block size {} does not match {}",
                data_device.block_size(),
                block_size
            ))
            .into());
        }
        let len = usize::try_from(count.saturating_mul(block_size as u64)).unwrap_or(usize::MAX);
        self.validate_request(start, count, len)?;

        self.schedule_prefetch(start, count);

        let mut data = vec![0u8; len];
        let mut io_status = Ok(());
        for (i, chunk) in data.chunks_exact_mut(block_size).enumerate() {
            if let Err(e) = data_device.read_block(start + i as u64, chunk) {
                io_status = Err(e);
                break;
            }
        }

        if let Err(e) = io_status {
            if !self.verifier.fec().is_enabled() {
                warn!(start, count, error = %e, "Data read failed, skipping verification");
                self.metrics.record_storage_fast_fail();
                return Err(e.into());
            }
        }

        let segments = self
            .workqueue
            .verify_blocking(VerifyRequest::new(start, count, SegmentBuffer::contiguous(data)))?;
        Ok(segments.into_bytes())
    }

    fn table_status(&self) -> String {
        let fec_args = {
            let mut args = self.verifier.fec().table_args();
            if args.is_empty() {
                args = self.config.fec_args.clone();
            }
            args
        };
        let geometry = self.geometry();
        TableStatus {
            version: self.config.version,
            data_device: &self.config.data_device,
            hash_device: &self.config.hash_device,
            data_block_size: geometry.data_block_size(),
            hash_block_size: geometry.hash_block_size(),
            data_blocks: geometry.data_blocks(),
            hash_start: geometry.hash_start(),
            algorithm: self.config.algorithm,
            root_digest: &self.root_digest,
            salt: &self.salt,
            mode: self.config.mode,
            ignore_zero_blocks: self.verifier.params().zero_digest.is_some(),
            fec_args: &fec_args,
        }
        .to_string()
    }
}

impl VerityApi for VerityTarget {
    fn verify_request(&self, start: u64, count: u64, segments: &mut dyn DataSegments) -> Result<()> {
        self.validate_request(start, count, segments.len_bytes())?;
        segments.rewind(SegmentCursor::default());
        self.workqueue.verify_in_place(start, count, segments)
    }

    fn schedule_prefetch(&self, start: u64, count: u64) {
        if count == 0 || start >= self.config.data_blocks || self.geometry().levels() < 2 {
            return;
        }
        let prefetch = Arc::clone(&self.prefetch);
        self.workqueue.spawn(move || prefetch.issue(start, count));
    }

    fn status(&self, kind: StatusType) -> String {
        match kind {
            StatusType::Info => info_status(self.has_corruption()).to_string(),
            StatusType::Table => self.table_status(),
        }
    }

    fn has_corruption(&self) -> bool {
        self.verifier.policy().has_corruption()
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
