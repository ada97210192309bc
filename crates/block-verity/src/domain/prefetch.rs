//! Hash block ranges to warm before a request is verified.

use crate::domain::geometry::Geometry;

/// Default level-0 prefetch cluster in bytes.
pub const DEFAULT_PREFETCH_CLUSTER_BYTES: u32 = 256 * 1024;

/// A contiguous run of hash-device blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchRange {
    pub start: u64,
    pub count: u64,
}

/// Compute the prefetch hints for data blocks `[start, start + count)`.
///
/// One range per level from `levels - 2` down to 0; the top level is a single
/// block that every request touches and is not prefetched. Level 0 is widened
/// to the cluster size so that sequential readers pull whole runs at once.
/// The request is clipped to the data area; nothing is issued past it.
pub fn prefetch_ranges(
    geometry: &Geometry,
    cluster_bytes: u32,
    start: u64,
    count: u64,
) -> Vec<PrefetchRange> {
    let end = start.saturating_add(count).min(geometry.data_blocks());
    if start >= end || geometry.levels() < 2 {
        return Vec::new();
    }
    let last = end - 1;
    let mut ranges = Vec::with_capacity(geometry.levels() - 1);

    for level in (0..geometry.levels() - 1).rev() {
        let mut first_block = geometry.hash_block_at_level(start, level);
        let mut last_block = geometry.hash_block_at_level(last, level);

        if level == 0 {
            let cluster = cluster_blocks(cluster_bytes, geometry.data_block_bits());
            if cluster > 0 {
                first_block &= !(cluster - 1);
                last_block |= cluster - 1;
                if last_block >= geometry.hash_blocks() {
                    last_block = geometry.hash_blocks() - 1;
                }
            }
        }

        ranges.push(PrefetchRange {
            start: first_block,
            count: last_block - first_block + 1,
        });
    }
    ranges
}

/// Cluster size in blocks, rounded down to a power of two. Zero disables it.
fn cluster_blocks(cluster_bytes: u32, data_block_bits: u32) -> u64 {
    let blocks = u64::from(cluster_bytes >> data_block_bits);
    if blocks == 0 {
        return 0;
    }
    1u64 << blocks.ilog2()
}
