//! # Block-Verity Benchmarks
//!
//! | Scenario | What is measured |
//! |----------|------------------|
//! | cold read | tree walk from the root for every level-0 block |
//! | warm read | level-0 shortcut on verified hash blocks |
//! | algorithms | data hashing cost per digest |

use block_verity::test_utils::VerityFixture;
use block_verity::{HashAlgorithm, SegmentBuffer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

const BS: usize = 4096;

fn bench_read_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("verity-read-path");
    group.measurement_time(Duration::from_secs(10));

    let fixture = VerityFixture::new(4096);
    for count in [1u64, 32, 256] {
        group.throughput(Throughput::Bytes(count * BS as u64));

        group.bench_with_input(BenchmarkId::new("cold", count), &count, |b, &count| {
            b.iter_with_setup(
                || fixture.target(),
                |target| {
                    black_box(
                        target
                            .read_blocks(fixture.data_device.as_ref(), 0, count)
                            .unwrap(),
                    )
                },
            )
        });

        let warm = fixture.target();
        warm.read_blocks(fixture.data_device.as_ref(), 0, 4096).unwrap();
        group.bench_with_input(BenchmarkId::new("warm", count), &count, |b, &count| {
            b.iter(|| {
                black_box(
                    warm.read_blocks(fixture.data_device.as_ref(), 1024, count)
                        .unwrap(),
                )
            })
        });
    }
    group.finish();
}

fn bench_algorithms(c: &mut Criterion) {
    let mut group = c.benchmark_group("verity-algorithms");
    group.throughput(Throughput::Bytes(64 * BS as u64));

    for algorithm in [
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
        HashAlgorithm::Sha3_256,
        HashAlgorithm::Blake3,
    ] {
        let fixture = VerityFixture::with_config(64, |c| c.algorithm = algorithm);
        let target = fixture.target();
        let data = fixture.blocks(0, 64);
        group.bench_function(algorithm.name(), |b| {
            b.iter(|| {
                let segments = SegmentBuffer::contiguous(data.clone());
                black_box(target.verify_blocking(0, 64, segments).unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_read_path, bench_algorithms);
criterion_main!(benches);
