//! # Corruption Handling
//!
//! Tampered data and hash blocks under each corruption mode, plus the
//! recovery paths that run before the policy is consulted:
//!
//! ```text
//! primary engine -> fallback engine -> FEC -> corruption policy
//! ```

#[cfg(test)]
mod tests {
    use block_verity::test_utils::{
        flip_byte, sample_data, CountingProvider, FaultyPrimaryProvider, MockFec,
        RecordingNotifier, RecordingRestart, UnavailableProvider, VerityFixture,
    };
    use block_verity::{
        provider_for, BlockType, BudgetedRestart, CorruptionMode, HashAlgorithm, RestartOutcome,
        StatusType, VerityApi, VerityError, VerityTarget,
    };
    use std::sync::Arc;

    const BS: usize = 4096;

    // =========================================================================
    // Helpers
    // =========================================================================

    fn corrupt_data_block(fixture: &VerityFixture, block: u64) {
        let offset = block as usize * BS + 123;
        fixture
            .data_device
            .write_at(offset, &[fixture.data[offset] ^ 0xff]);
    }

    fn corrupt_hash_byte(fixture: &VerityFixture, offset: usize) {
        let original = fixture.tree.hash_image[offset];
        fixture.hash_device.write_at(offset, &[original ^ 0xff]);
    }

    fn target_with_notifier(
        fixture: &VerityFixture,
    ) -> (VerityTarget, Arc<RecordingNotifier>) {
        crate::init_test_tracing();
        let notifier = Arc::new(RecordingNotifier::default());
        let target = fixture.target_with(fixture.collaborators().with_notifier(notifier.clone()));
        (target, notifier)
    }

    fn read(fixture: &VerityFixture, target: &VerityTarget, start: u64, count: u64) -> block_verity::Result<Vec<u8>> {
        target.read_blocks(fixture.data_device.as_ref(), start, count)
    }

    // =========================================================================
    // Modes
    // =========================================================================

    #[test]
    fn test_eio_mode_rejects_tampered_data() {
        let fixture = VerityFixture::new(64);
        corrupt_data_block(&fixture, 5);
        let (target, notifier) = target_with_notifier(&fixture);

        let err = read(&fixture, &target, 4, 3).unwrap_err();
        assert!(matches!(
            err,
            VerityError::Corrupt { block_type: BlockType::Data, block: 5 }
        ));
        assert_eq!(target.status(StatusType::Info), "C");

        let events = notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].env_var(), "DM_VERITY_ERR_BLOCK_NR=0,5");
        assert_eq!(events[0].device, "data.img");

        // Untouched blocks still read fine.
        assert_eq!(read(&fixture, &target, 6, 2).unwrap(), fixture.blocks(6, 2));
    }

    #[test]
    fn test_logging_mode_caps_counted_events() {
        let fixture = VerityFixture::with_config(64, |c| {
            c.mode = CorruptionMode::Logging;
            c.max_corrupted_errors = 3;
        });
        for block in 0..5 {
            corrupt_data_block(&fixture, block);
        }
        let (target, notifier) = target_with_notifier(&fixture);

        let outcomes: Vec<bool> = (0..5)
            .map(|block| read(&fixture, &target, block, 1).is_ok())
            .collect();
        // Tolerated until the cap, failed after it.
        assert_eq!(outcomes, vec![true, true, true, false, false]);

        let counts: Vec<u32> = notifier.events().iter().map(|e| e.count).collect();
        assert_eq!(counts, vec![1, 2, 3, 3, 3]);
        assert_eq!(target.metrics().corruption_events, 5);
    }

    #[test]
    fn test_logging_mode_returns_data_as_read() {
        let fixture = VerityFixture::with_config(64, |c| c.mode = CorruptionMode::Logging);
        corrupt_data_block(&fixture, 2);
        let target = fixture.target();

        let bytes = read(&fixture, &target, 2, 1).unwrap();
        assert_ne!(bytes, fixture.blocks(2, 1));
        assert_eq!(bytes, fixture.data_device.contents()[2 * BS..3 * BS]);
        assert_eq!(target.metrics().data_blocks_verified, 0);
    }

    #[test]
    fn test_restart_scheduled_fails_request() {
        let fixture = VerityFixture::with_config(64, |c| c.mode = CorruptionMode::Restart);
        corrupt_data_block(&fixture, 1);
        let restart = Arc::new(RecordingRestart::new(RestartOutcome::Scheduled));
        let target = fixture.target_with(fixture.collaborators().with_restart(restart.clone()));

        assert!(read(&fixture, &target, 1, 1).unwrap_err().is_corruption());
        assert_eq!(restart.requests(), 1);
    }

    #[test]
    fn test_restart_unavailable_degrades_to_logging() {
        let fixture = VerityFixture::with_config(64, |c| c.mode = CorruptionMode::Restart);
        corrupt_data_block(&fixture, 1);
        let target = fixture.target();

        assert!(read(&fixture, &target, 1, 1).is_ok());
        assert!(target.has_corruption());
    }

    #[test]
    fn test_restart_budget_exhausted_fails_without_restart() {
        let fixture = VerityFixture::with_config(64, |c| c.mode = CorruptionMode::Restart);
        corrupt_data_block(&fixture, 1);
        let inner = Arc::new(RecordingRestart::new(RestartOutcome::Scheduled));
        let budgeted = Arc::new(BudgetedRestart::new(inner.clone(), 4, 4));
        let target = fixture.target_with(fixture.collaborators().with_restart(budgeted));

        assert!(read(&fixture, &target, 1, 1).unwrap_err().is_corruption());
        assert_eq!(inner.requests(), 0);
    }

    // =========================================================================
    // Hash blocks
    // =========================================================================

    #[test]
    fn test_tampered_hash_block_fails_intact_data() {
        let fixture = VerityFixture::new(300);
        corrupt_hash_byte(&fixture, fixture.level0_offset() + 3);
        let target = fixture.target();

        let err = read(&fixture, &target, 0, 1).unwrap_err();
        assert!(matches!(
            err,
            VerityError::Corrupt { block_type: BlockType::Metadata, .. }
        ));
    }

    #[test]
    fn test_tolerated_hash_block_is_rechecked() {
        let fixture = VerityFixture::with_config(300, |c| c.mode = CorruptionMode::Logging);
        // Last digest slot of the first level-0 block; block 1 is unaffected.
        corrupt_hash_byte(&fixture, fixture.level0_offset() + BS - 1);
        let (target, notifier) = target_with_notifier(&fixture);

        for _ in 0..3 {
            assert_eq!(read(&fixture, &target, 1, 1).unwrap(), fixture.blocks(1, 1));
        }
        let events = notifier.events();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.block_type == BlockType::Metadata));
        assert_eq!(target.metrics().level0_hits, 0);
    }

    #[test]
    fn test_fec_repairs_hash_block_once() {
        let fixture = VerityFixture::new(300);
        corrupt_hash_byte(&fixture, fixture.level0_offset() + 40);
        let fec = Arc::new(MockFec::for_hash(fixture.tree.hash_image.clone(), BS));
        let target = fixture.target_with(fixture.collaborators().with_fec(fec.clone()));

        assert_eq!(read(&fixture, &target, 0, 1).unwrap(), fixture.blocks(0, 1));
        assert_eq!(read(&fixture, &target, 1, 4).unwrap(), fixture.blocks(1, 4));
        assert_eq!(fec.repairs(), 1);
        assert!(target.metrics().level0_hits >= 4);
        assert!(!target.has_corruption());
    }

    #[test]
    fn test_fec_repairs_data_block() {
        let fixture = VerityFixture::new(64);
        corrupt_data_block(&fixture, 30);
        let fec = Arc::new(MockFec::for_data(fixture.data.clone(), BS));
        let target = fixture.target_with(fixture.collaborators().with_fec(fec.clone()));

        assert_eq!(read(&fixture, &target, 28, 4).unwrap(), fixture.blocks(28, 4));
        assert_eq!(fec.repairs(), 1);
        assert_eq!(target.metrics().fec_repairs, 1);
    }

    #[test]
    fn test_unrepairable_block_reaches_policy() {
        let fixture = VerityFixture::new(64);
        corrupt_data_block(&fixture, 30);
        // Parity only for hash blocks.
        let fec = Arc::new(MockFec::for_hash(fixture.tree.hash_image.clone(), BS));
        let target = fixture.target_with(fixture.collaborators().with_fec(fec.clone()));

        assert!(read(&fixture, &target, 30, 1).unwrap_err().is_corruption());
        assert_eq!(fec.repairs(), 0);
    }

    // =========================================================================
    // Engines
    // =========================================================================

    #[test]
    fn test_faulty_primary_recovered_by_fallback() {
        let fixture = VerityFixture::new(300);
        let faulty = Arc::new(FaultyPrimaryProvider::always_wrong(provider_for(
            HashAlgorithm::Sha256,
        )));
        let notifier = Arc::new(RecordingNotifier::default());
        let target = fixture.target_with(
            fixture
                .collaborators()
                .with_primary(faulty)
                .with_notifier(notifier.clone()),
        );

        assert_eq!(read(&fixture, &target, 0, 20).unwrap(), fixture.blocks(0, 20));
        assert!(!target.has_corruption());
        // Two hash blocks and twenty data blocks, all matched on fallback.
        assert_eq!(notifier.discrepancies().len(), 22);
        assert_eq!(target.metrics().engine_discrepancies, 22);
        assert!(notifier.events().is_empty());
    }

    #[test]
    fn test_unavailable_engine_is_not_corruption() {
        let fixture = VerityFixture::new(64);
        let target = fixture.target_with(
            fixture
                .collaborators()
                .with_primary(Arc::new(UnavailableProvider::new(32))),
        );

        let err = read(&fixture, &target, 0, 1).unwrap_err();
        assert!(matches!(err, VerityError::Engine(_)));
        assert!(!target.has_corruption());
    }

    // =========================================================================
    // Zero blocks
    // =========================================================================

    #[test]
    fn test_zero_blocks_read_as_zeros() {
        let mut data = sample_data(64, BS);
        data[10 * BS..11 * BS].fill(0);
        let fixture = VerityFixture::from_data(data, |c| c.ignore_zero_blocks = true);
        // Whatever sits on the device is replaced with zeros.
        fixture.data_device.write_at(10 * BS, &[0x77; 64]);
        let counting = Arc::new(CountingProvider::new(provider_for(HashAlgorithm::Sha256)));
        let target = fixture.target_with(fixture.collaborators().with_primary(counting.clone()));

        let bytes = read(&fixture, &target, 9, 3).unwrap();
        assert_eq!(&bytes[BS..2 * BS], &[0u8; BS][..]);
        assert_eq!(bytes[..BS], fixture.blocks(9, 1)[..]);
        let metrics = target.metrics();
        assert_eq!(metrics.zero_blocks, 1);
        assert_eq!(metrics.data_blocks_verified, 2);
        assert!(!target.has_corruption());

        // With the level-0 block verified, a zero block costs no digest at
        // all while an ordinary block costs exactly one.
        let before = counting.started();
        assert_eq!(read(&fixture, &target, 10, 1).unwrap(), vec![0u8; BS]);
        assert_eq!(counting.started(), before);
        assert_eq!(read(&fixture, &target, 9, 1).unwrap(), fixture.blocks(9, 1));
        assert_eq!(counting.started(), before + 1);
    }

    #[test]
    fn test_zero_blocks_checked_when_shortcut_disabled() {
        let mut data = sample_data(64, BS);
        data[10 * BS..11 * BS].fill(0);
        let fixture = VerityFixture::from_data(data, |_| {});
        let mut tampered = vec![0u8; BS];
        flip_byte(&mut tampered, 0);
        fixture.data_device.write_at(10 * BS, &tampered);
        let target = fixture.target();

        assert!(read(&fixture, &target, 10, 1).unwrap_err().is_corruption());
    }
}
