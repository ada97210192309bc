//! # Verification Workqueue
//!
//! Bounded pool of verification workers. Each request runs to completion on
//! one worker; requests run in parallel across workers.
//!
//! ## Request Lifecycle
//!
//! ```text
//! data read done ──► complete_read ──┬─ read failed, no FEC ──► completion(Err)
//!                                    └─ otherwise ──► worker: verify_request ──► completion
//! ```

use crate::error::{ConfigError, Result, StorageError, VerityError};
use crate::metrics::MetricsRecorder;
use crate::ports::outbound::{DataSegments, IoCompletion, SegmentCursor};
use crate::service::verifier::BlockVerifier;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A read request whose data has been loaded into `segments`.
#[derive(Debug)]
pub struct VerifyRequest<S> {
    pub start: u64,
    pub count: u64,
    pub segments: S,
}

impl<S: DataSegments> VerifyRequest<S> {
    pub fn new(start: u64, count: u64, segments: S) -> Self {
        Self {
            start,
            count,
            segments,
        }
    }

    /// Verify on the current thread, returning the segments and outcome.
    fn run(self, verifier: &BlockVerifier) -> (S, Result<()>) {
        let VerifyRequest {
            start,
            count,
            mut segments,
        } = self;
        segments.rewind(SegmentCursor::default());
        let outcome = verifier.verify_request(start, count, &mut segments);
        (segments, outcome)
    }
}

pub struct VerifyWorkqueue {
    pool: ThreadPool,
    verifier: Arc<BlockVerifier>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl VerifyWorkqueue {
    /// Build a pool of `threads` workers, defaulting to the CPU count.
    pub fn new(
        verifier: Arc<BlockVerifier>,
        metrics: Arc<dyn MetricsRecorder>,
        threads: Option<usize>,
    ) -> std::result::Result<Self, ConfigError> {
        let threads = threads.unwrap_or_else(num_cpus::get).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("verity-worker-{i}"))
            .build()
            .map_err(|e| ConfigError::WorkerPool(e.to_string()))?;
        debug!(threads, "Verification workqueue started");
        Ok(Self {
            pool,
            verifier,
            metrics,
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queue `request` for verification and signal `completion` when done.
    pub fn submit<S>(&self, request: VerifyRequest<S>, completion: Box<dyn IoCompletion<S>>)
    where
        S: DataSegments + 'static,
    {
        let verifier = Arc::clone(&self.verifier);
        self.pool.spawn(move || {
            let (segments, outcome) = request.run(&verifier);
            completion.complete(segments, outcome);
        });
    }

    /// Entry point once the underlying data read finished.
    ///
    /// A failed read completes immediately with the storage error unless FEC
    /// is available to reconstruct the data; no corruption is reported for a
    /// request that is never verified.
    pub fn complete_read<S>(
        &self,
        request: VerifyRequest<S>,
        io_status: std::result::Result<(), StorageError>,
        completion: Box<dyn IoCompletion<S>>,
    ) where
        S: DataSegments + 'static,
    {
        if let Err(e) = io_status {
            if !self.verifier.fec().is_enabled() {
                warn!(start = request.start, count = request.count, error = %e, "Data read failed, skipping verification");
                self.metrics.record_storage_fast_fail();
                completion.complete(request.segments, Err(VerityError::Storage(e)));
                return;
            }
            debug!(start = request.start, error = %e, "Data read failed, verifying with FEC");
        }
        self.submit(request, completion);
    }

    /// Verify on a worker and block the caller until done.
    pub fn verify_blocking<S>(&self, request: VerifyRequest<S>) -> Result<S>
    where
        S: DataSegments,
    {
        let verifier = Arc::clone(&self.verifier);
        let (segments, outcome) = self.pool.install(move || request.run(&verifier));
        outcome.map(|()| segments)
    }

    /// Verify borrowed segments on a worker, blocking the caller until done.
    /// The segments must be positioned at the first block.
    pub fn verify_in_place(
        &self,
        start: u64,
        count: u64,
        segments: &mut dyn DataSegments,
    ) -> Result<()> {
        let verifier = self.verifier.as_ref();
        self.pool
            .install(move || verifier.verify_request(start, count, segments))
    }

    /// Verify on a worker; the returned future resolves when done.
    pub fn verify_async<S>(&self, request: VerifyRequest<S>) -> impl Future<Output = Result<S>>
    where
        S: DataSegments + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let verifier = Arc::clone(&self.verifier);
        self.pool.spawn(move || {
            let (segments, outcome) = request.run(&verifier);
            let _ = tx.send(outcome.map(|()| segments));
        });
        async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(VerityError::WorkerUnavailable),
            }
        }
    }

    /// Run a background job on the pool without waiting for it.
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        self.pool.spawn(job);
    }
}
