//! # Hash Tree Geometry
//!
//! Derives the shape of the Merkle tree from the device parameters and maps
//! `(data_block, level)` to the hash block and byte offset holding its digest.
//!
//! ## Layout
//!
//! Levels are laid out top-down on the hash device starting at `hash_start`:
//! the top level (a single block) comes first and level 0, whose digests cover
//! the data blocks themselves, comes last.
//!
//! ```text
//! hash_start
//!   | level[levels-1] | ... | level[1] | level[0] |
//!                                                 ^ hash_blocks
//! ```

use crate::domain::types::FormatVersion;
use crate::error::ConfigError;

/// Maximum number of tree levels.
pub const MAX_LEVELS: usize = 63;

pub const MIN_DATA_BLOCK_SIZE: u32 = 512;
pub const MAX_DATA_BLOCK_SIZE: u32 = 64 * 1024;
pub const MIN_HASH_BLOCK_SIZE: u32 = 512;
pub const MAX_HASH_BLOCK_SIZE: u32 = 1 << 30;

/// Location of one digest inside the hash tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPosition {
    /// Hash-device block holding the digest.
    pub block: u64,
    /// Byte offset of the digest within that block.
    pub offset: usize,
}

/// Immutable tree geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    data_block_bits: u32,
    hash_block_bits: u32,
    digest_size: usize,
    hash_per_block_bits: u32,
    data_blocks: u64,
    hash_start: u64,
    levels: usize,
    level_block: Vec<u64>,
    hash_blocks: u64,
    version: FormatVersion,
}

impl Geometry {
    /// Compute the geometry, rejecting parameters the tree cannot express.
    pub fn compute(
        data_block_size: u32,
        hash_block_size: u32,
        digest_size: usize,
        data_blocks: u64,
        hash_start: u64,
        version: FormatVersion,
    ) -> Result<Self, ConfigError> {
        check_block_size(
            "data",
            data_block_size,
            MIN_DATA_BLOCK_SIZE,
            MAX_DATA_BLOCK_SIZE,
        )?;
        check_block_size(
            "hash",
            hash_block_size,
            MIN_HASH_BLOCK_SIZE,
            MAX_HASH_BLOCK_SIZE,
        )?;

        if digest_size == 0 || (hash_block_size as usize) < digest_size.saturating_mul(2) {
            return Err(ConfigError::DigestTooLarge {
                digest_size,
                hash_block_size,
            });
        }

        let data_block_bits = data_block_size.trailing_zeros();
        let hash_block_bits = hash_block_size.trailing_zeros();

        // Both areas must be addressable as 64-bit byte offsets.
        if data_blocks.checked_shl(data_block_bits).map(|v| v >> data_block_bits) != Some(data_blocks)
        {
            return Err(ConfigError::Overflow("data_blocks"));
        }
        if hash_start.checked_shl(hash_block_bits).map(|v| v >> hash_block_bits) != Some(hash_start)
        {
            return Err(ConfigError::Overflow("hash_start"));
        }

        let hash_per_block_bits = (hash_block_size as usize / digest_size).ilog2();

        let mut levels = 0usize;
        if data_blocks > 0 {
            while (hash_per_block_bits as usize) * levels < 64
                && (data_blocks - 1) >> (hash_per_block_bits as usize * levels) != 0
            {
                levels += 1;
            }
        }
        if levels > MAX_LEVELS {
            return Err(ConfigError::TooManyLevels {
                levels,
                max: MAX_LEVELS,
            });
        }

        let mut level_block = vec![0u64; levels];
        let mut position = hash_start;
        for level in (0..levels).rev() {
            level_block[level] = position;
            let shift = (level as u32 + 1).saturating_mul(hash_per_block_bits);
            let size = div_ceil_pow2(data_blocks, shift);
            position = position
                .checked_add(size)
                .ok_or(ConfigError::Overflow("hash area end"))?;
        }
        if position.checked_shl(hash_block_bits).map(|v| v >> hash_block_bits) != Some(position) {
            return Err(ConfigError::Overflow("hash area end"));
        }

        Ok(Self {
            data_block_bits,
            hash_block_bits,
            digest_size,
            hash_per_block_bits,
            data_blocks,
            hash_start,
            levels,
            level_block,
            hash_blocks: position,
            version,
        })
    }

    pub fn data_block_bits(&self) -> u32 {
        self.data_block_bits
    }

    pub fn data_block_size(&self) -> usize {
        1usize << self.data_block_bits
    }

    pub fn hash_block_bits(&self) -> u32 {
        self.hash_block_bits
    }

    pub fn hash_block_size(&self) -> usize {
        1usize << self.hash_block_bits
    }

    pub fn digest_size(&self) -> usize {
        self.digest_size
    }

    pub fn hash_per_block_bits(&self) -> u32 {
        self.hash_per_block_bits
    }

    pub fn data_blocks(&self) -> u64 {
        self.data_blocks
    }

    pub fn hash_start(&self) -> u64 {
        self.hash_start
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// One past the last block of the hash area.
    pub fn hash_blocks(&self) -> u64 {
        self.hash_blocks
    }

    /// First hash-device block of `level`.
    ///
    /// # Panics
    ///
    /// Panics if `level >= self.levels()`.
    pub fn level_block(&self, level: usize) -> u64 {
        self.level_block[level]
    }

    /// Number of hash blocks making up `level`.
    pub fn blocks_at_level(&self, level: usize) -> u64 {
        let shift = (level as u32 + 1).saturating_mul(self.hash_per_block_bits);
        div_ceil_pow2(self.data_blocks, shift)
    }

    /// Index of the digest covering `data_block` among all digests of `level`.
    pub fn position_at_level(&self, data_block: u64, level: usize) -> u64 {
        let shift = (level as u32).saturating_mul(self.hash_per_block_bits);
        data_block.checked_shr(shift).unwrap_or(0)
    }

    /// Hash block at `level` that holds the digest covering `data_block`.
    pub fn hash_block_at_level(&self, data_block: u64, level: usize) -> u64 {
        let position = self.position_at_level(data_block, level);
        self.level_block[level] + (position >> self.hash_per_block_bits)
    }

    /// Hash block and in-block offset of the digest covering `data_block`.
    pub fn hash_at_level(&self, data_block: u64, level: usize) -> HashPosition {
        let position = self.position_at_level(data_block, level);
        let block = self.level_block[level] + (position >> self.hash_per_block_bits);
        let idx = (position & ((1u64 << self.hash_per_block_bits) - 1)) as usize;
        let offset = match self.version {
            FormatVersion::V0 => idx * self.digest_size,
            FormatVersion::V1 => idx << (self.hash_block_bits - self.hash_per_block_bits),
        };
        HashPosition { block, offset }
    }
}

fn check_block_size(which: &'static str, size: u32, min: u32, max: u32) -> Result<(), ConfigError> {
    if size == 0 || !size.is_power_of_two() || size < min || size > max {
        return Err(ConfigError::InvalidBlockSize { which, size });
    }
    Ok(())
}

/// `ceil(n / 2^shift)`, defined for shifts of 64 and beyond.
fn div_ceil_pow2(n: u64, shift: u32) -> u64 {
    if shift >= u64::BITS {
        return u64::from(n != 0);
    }
    let mask = (1u64 << shift) - 1;
    (n >> shift) + u64::from(n & mask != 0)
}
