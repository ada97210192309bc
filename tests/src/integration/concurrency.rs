//! # Concurrency
//!
//! Many requests in flight against one target: shared hash blocks, the
//! corruption cap under contention, and async fan-out.

#[cfg(test)]
mod tests {
    use block_verity::test_utils::{RecordingNotifier, VerityFixture};
    use block_verity::{
        Collaborators, CorruptionMode, HashBlockCache, LruHashBlockCache, SegmentBuffer,
        VerityApi, VerityError,
    };
    use parking_lot::Mutex;
    use rand::Rng;
    use std::sync::{Arc, Barrier};

    const BS: usize = 4096;

    #[test]
    fn test_parallel_reads_share_hash_blocks() {
        crate::init_test_tracing();
        let fixture = VerityFixture::with_config(1024, |c| c.worker_threads = Some(4));
        let target = fixture.target();
        let failures = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for worker in 0..8u64 {
                let (fixture, target, failures) = (&fixture, &target, &failures);
                scope.spawn(move || {
                    // Every thread starts inside the same level-0 block.
                    for round in 0..16u64 {
                        let start = (worker * 3 + round * 61) % 1000;
                        match target.read_blocks(fixture.data_device.as_ref(), start, 8) {
                            Ok(bytes) if bytes == fixture.blocks(start, 8) => {}
                            other => failures.lock().push((start, other.map(|b| b.len()))),
                        }
                    }
                });
            }
        });

        assert!(failures.lock().is_empty(), "{:?}", failures.lock());
        assert!(!target.has_corruption());
        assert_eq!(target.metrics().data_blocks_verified, 8 * 16 * 8);
    }

    #[test]
    fn test_two_workers_on_fresh_hash_block() {
        let fixture = VerityFixture::with_config(300, |c| c.worker_threads = Some(2));
        let lru = Arc::new(LruHashBlockCache::with_default_capacity(fixture.hash_device.clone()));
        let target = fixture.target_with(Collaborators::new(lru.clone()));
        let barrier = Barrier::new(2);

        std::thread::scope(|scope| {
            for start in [0u64, 1] {
                let (fixture, target, barrier) = (&fixture, &target, &barrier);
                scope.spawn(move || {
                    let segments = SegmentBuffer::contiguous(fixture.blocks(start, 1));
                    barrier.wait();
                    target.verify_blocking(start, 1, segments).unwrap();
                });
            }
        });

        let level0 = lru.read(target.geometry().level_block(0)).unwrap();
        assert!(level0.is_verified());
        assert!(!target.has_corruption());
    }

    #[test]
    fn test_random_requests_through_workqueue() {
        let fixture = VerityFixture::new(512);
        let target = fixture.target();
        let mut rng = rand::thread_rng();

        for _ in 0..64 {
            let count = rng.gen_range(1..=32u64);
            let start = rng.gen_range(0..=512 - count);
            let chunk = rng.gen_range(1..=2 * BS);
            let segments = SegmentBuffer::chunked(&fixture.blocks(start, count), chunk);
            let verified = target.verify_blocking(start, count, segments).unwrap();
            assert_eq!(verified.into_bytes(), fixture.blocks(start, count));
        }
    }

    #[test]
    fn test_corruption_cap_under_contention() {
        crate::init_test_tracing();
        let fixture = VerityFixture::with_config(64, |c| {
            c.mode = CorruptionMode::Logging;
            c.max_corrupted_errors = 10;
            c.worker_threads = Some(4);
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let target =
            fixture.target_with(fixture.collaborators().with_notifier(notifier.clone()));

        let results = Mutex::new(Vec::new());
        std::thread::scope(|scope| {
            for block in 0..32u64 {
                let (target, results) = (&target, &results);
                scope.spawn(move || {
                    let garbage = SegmentBuffer::contiguous(vec![block as u8; BS]);
                    let outcome = target.verify_blocking(block, 1, garbage).map(|_| ());
                    results.lock().push(outcome);
                });
            }
        });

        let results = results.into_inner();
        let tolerated = results.iter().filter(|r| r.is_ok()).count();
        let failed = results
            .iter()
            .filter(|r| matches!(r, Err(VerityError::Corrupt { .. })))
            .count();
        assert_eq!(tolerated, 10);
        assert_eq!(failed, 22);

        let events = notifier.events();
        assert_eq!(events.len(), 32);
        assert!(events.iter().all(|e| e.count <= 10));
        assert_eq!(target.metrics().corruption_events, 32);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_fan_out() {
        let fixture = VerityFixture::new(256);
        let target = Arc::new(fixture.target());

        let mut handles = Vec::new();
        for i in 0..32u64 {
            let start = i * 8;
            let segments = SegmentBuffer::contiguous(fixture.blocks(start, 8));
            handles.push(tokio::spawn(target.verify_async(start, 8, segments)));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let start = i as u64 * 8;
            let segments = handle.await.unwrap().unwrap();
            assert_eq!(segments.into_bytes(), fixture.blocks(start, 8));
        }
        assert_eq!(target.metrics().data_blocks_verified, 256);
    }
}
