//! # Read Path
//!
//! Verified reads through a fully assembled target:
//!
//! 1. Whole-device reads over every supported tree layout
//! 2. File-backed data and hash devices
//! 3. Table-line parsing and the status strings it echoes back
//! 4. Request validation and storage fast-fail

#[cfg(test)]
mod tests {
    use block_verity::adapters::FileBlockDevice;
    use block_verity::domain::VerityConfig;
    use block_verity::test_utils::{FailingDevice, VerityFixture, FIXTURE_SALT};
    use block_verity::{
        Collaborators, FormatVersion, HashAlgorithm, SegmentBuffer, StatusType, StorageError,
        VerityApi, VerityError, VerityTarget,
    };
    use std::io::Write;
    use std::sync::Arc;

    // =========================================================================
    // Helpers
    // =========================================================================

    fn read_all(fixture: &VerityFixture, target: &VerityTarget, chunk: u64) -> Vec<u8> {
        let blocks = fixture.config.data_blocks;
        let mut out = Vec::with_capacity(fixture.data.len());
        let mut start = 0;
        while start < blocks {
            let count = chunk.min(blocks - start);
            out.extend(
                target
                    .read_blocks(fixture.data_device.as_ref(), start, count)
                    .unwrap(),
            );
            start += count;
        }
        out
    }

    fn table_line(fixture: &VerityFixture) -> String {
        let c = &fixture.config;
        format!(
            "1 {} {} {} {} {} {} {} {} {}",
            c.data_device,
            c.hash_device,
            c.data_block_size,
            c.hash_block_size,
            c.data_blocks,
            c.hash_start,
            c.algorithm,
            c.root_digest,
            hex::encode(FIXTURE_SALT)
        )
    }

    // =========================================================================
    // Layouts
    // =========================================================================

    #[test]
    fn test_full_device_round_trip() {
        crate::init_test_tracing();
        let fixture = VerityFixture::new(300);
        let target = fixture.target();

        assert_eq!(read_all(&fixture, &target, 32), fixture.data);

        let metrics = target.metrics();
        assert_eq!(metrics.data_blocks_verified, 300);
        // One level-1 block and three level-0 blocks, each checked once.
        assert_eq!(metrics.hash_blocks_verified, 4);
        assert!(metrics.level0_hits >= 290);
        assert_eq!(target.status(StatusType::Info), "V");
    }

    #[test]
    fn test_hash_area_at_offset() {
        let fixture = VerityFixture::with_config(200, |c| c.hash_start = 3);
        let target = fixture.target();
        assert_eq!(read_all(&fixture, &target, 64), fixture.data);
    }

    #[test]
    fn test_version_zero_layout() {
        let fixture = VerityFixture::with_config(300, |c| c.version = FormatVersion::V0);
        let target = fixture.target();
        assert_eq!(read_all(&fixture, &target, 50), fixture.data);
    }

    #[test]
    fn test_every_algorithm() {
        for algorithm in [
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha512,
            HashAlgorithm::Sha3_256,
            HashAlgorithm::Blake3,
        ] {
            let fixture = VerityFixture::with_config(130, |c| c.algorithm = algorithm);
            let target = fixture.target();
            assert_eq!(read_all(&fixture, &target, 16), fixture.data, "{algorithm}");
        }
    }

    #[test]
    fn test_small_data_blocks() {
        let fixture = VerityFixture::with_config(16, |c| {
            c.data_block_size = 1024;
            c.data_blocks = 64;
        });
        let target = fixture.target();
        assert_eq!(target.geometry().levels(), 1);
        assert_eq!(read_all(&fixture, &target, 7), fixture.data);
    }

    #[test]
    fn test_unsalted_tree() {
        let fixture = VerityFixture::with_config(40, |c| c.salt = None);
        let target = fixture.target();
        assert_eq!(read_all(&fixture, &target, 40), fixture.data);
        assert!(target.status(StatusType::Table).ends_with(" -"));
    }

    #[test]
    fn test_single_block_device() {
        let fixture = VerityFixture::new(1);
        let target = fixture.target();
        assert_eq!(target.geometry().levels(), 0);
        assert_eq!(read_all(&fixture, &target, 1), fixture.data);
    }

    // =========================================================================
    // Devices
    // =========================================================================

    #[test]
    fn test_file_backed_devices() {
        let fixture = VerityFixture::new(150);
        let mut data_file = tempfile::NamedTempFile::new().unwrap();
        data_file.write_all(&fixture.data).unwrap();
        let mut hash_file = tempfile::NamedTempFile::new().unwrap();
        hash_file.write_all(&fixture.tree.hash_image).unwrap();

        let data_device = FileBlockDevice::open(data_file.path(), 4096).unwrap();
        let hash_device = Arc::new(FileBlockDevice::open(hash_file.path(), 4096).unwrap());
        let target = VerityTarget::new(
            fixture.config.clone(),
            Collaborators::from_hash_device(hash_device),
        )
        .unwrap();

        let bytes = target.read_blocks(&data_device, 100, 50).unwrap();
        assert_eq!(bytes, fixture.blocks(100, 50));
    }

    #[test]
    fn test_failed_data_read_skips_verification() {
        let fixture = VerityFixture::new(64);
        let target = fixture.target();
        let device = FailingDevice::new(fixture.data_device.clone(), [9]);

        let err = target.read_blocks(&device, 8, 4).unwrap_err();
        assert!(matches!(err, VerityError::Storage(StorageError::Io { block: 9, .. })));
        assert!(!target.has_corruption());
        assert_eq!(target.metrics().storage_fast_fails, 1);
        assert_eq!(target.metrics().data_blocks_verified, 0);
    }

    // =========================================================================
    // Configuration and status
    // =========================================================================

    #[test]
    fn test_table_line_round_trip() {
        let fixture = VerityFixture::new(300);
        let line = table_line(&fixture);
        let args: Vec<&str> = line.split_whitespace().collect();
        let config = VerityConfig::from_table_args(&args).unwrap();

        let target = VerityTarget::new(config, fixture.collaborators()).unwrap();
        assert_eq!(target.status(StatusType::Table), line);
        assert_eq!(
            target.read_blocks(fixture.data_device.as_ref(), 0, 10).unwrap(),
            fixture.blocks(0, 10)
        );
    }

    #[test]
    fn test_table_options_echo_in_canonical_order() {
        let fixture = VerityFixture::new(64);
        let line = format!(
            "{} 4 IGNORE_ZERO_BLOCKS ignore_corruption fec_roots 2",
            table_line(&fixture)
        );
        let args: Vec<&str> = line.split_whitespace().collect();
        let config = VerityConfig::from_table_args(&args).unwrap();
        let target = VerityTarget::new(config, fixture.collaborators()).unwrap();

        assert_eq!(
            target.status(StatusType::Table),
            format!(
                "{} 4 ignore_corruption ignore_zero_blocks fec_roots 2",
                table_line(&fixture)
            )
        );
    }

    #[test]
    fn test_wrong_root_digest_fails_every_read() {
        let fixture = VerityFixture::new(64);
        let mut config = fixture.config.clone();
        config.root_digest = hex::encode([0x11u8; 32]);
        let target = VerityTarget::new(config, fixture.collaborators()).unwrap();

        let err = target
            .read_blocks(fixture.data_device.as_ref(), 0, 1)
            .unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(target.status(StatusType::Info), "C");
    }

    #[test]
    fn test_env_overrides_worker_count() {
        std::env::set_var("VERITY_WORKER_THREADS", "3");
        let fixture = VerityFixture::new(8);
        let config = fixture.config.clone().with_env_overrides();
        std::env::remove_var("VERITY_WORKER_THREADS");

        assert_eq!(config.worker_threads, Some(3));
        let target = VerityTarget::new(config, fixture.collaborators()).unwrap();
        assert_eq!(target.workqueue().threads(), 3);
    }

    // =========================================================================
    // Request validation
    // =========================================================================

    #[test]
    fn test_out_of_range_request() {
        let fixture = VerityFixture::new(64);
        let target = fixture.target();
        let mut segments = SegmentBuffer::contiguous(vec![0u8; 2 * 4096]);
        assert!(matches!(
            target.verify_request(63, 2, &mut segments),
            Err(VerityError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_unaligned_request() {
        let fixture = VerityFixture::new(64);
        let target = fixture.target();
        let mut segments = SegmentBuffer::contiguous(vec![0u8; 4096 + 512]);
        assert!(matches!(
            target.verify_request(0, 1, &mut segments),
            Err(VerityError::UnalignedIo { .. })
        ));
    }

    #[tokio::test]
    async fn test_verify_async_through_target() {
        let fixture = VerityFixture::new(64);
        let target = fixture.target();
        let segments = target
            .verify_async(20, 4, SegmentBuffer::chunked(&fixture.blocks(20, 4), 1500))
            .await
            .unwrap();
        assert_eq!(segments.into_bytes(), fixture.blocks(20, 4));
    }
}
