//! # Block Device Adapters
//!
//! - `MemoryBlockDevice`: RAM-backed image, patchable in place.
//! - `FileBlockDevice`: regular file or device node read with positional I/O.

use crate::error::StorageError;
use crate::ports::outbound::BlockDevice;
use parking_lot::RwLock;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;

fn check_read(block: u64, block_count: u64, buf_len: usize, block_size: usize) -> Result<u64, StorageError> {
    if block >= block_count {
        return Err(StorageError::OutOfBounds { block, block_count });
    }
    if buf_len != block_size {
        return Err(StorageError::Device(format!(
            "buffer of {buf_len} bytes for {block_size}-byte block"
        )));
    }
    Ok(block * block_size as u64)
}

/// In-memory block device.
///
/// A trailing partial block is not addressable.
pub struct MemoryBlockDevice {
    block_size: usize,
    data: RwLock<Vec<u8>>,
}

impl MemoryBlockDevice {
    pub fn new(block_size: usize, data: Vec<u8>) -> Self {
        Self {
            block_size,
            data: RwLock::new(data),
        }
    }

    /// Device of `blocks` zeroed blocks.
    pub fn zeroed(block_size: usize, blocks: u64) -> Self {
        Self::new(block_size, vec![0u8; block_size * blocks as usize])
    }

    /// Overwrite bytes at `offset`, growing the image if needed.
    pub fn write_at(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.data.write();
        let end = offset + bytes.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(bytes);
    }

    /// Copy of the whole image.
    pub fn contents(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        (self.data.read().len() / self.block_size) as u64
    }

    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        let data = self.data.read();
        let block_count = (data.len() / self.block_size) as u64;
        let offset = check_read(block, block_count, buf.len(), self.block_size)? as usize;
        buf.copy_from_slice(&data[offset..offset + self.block_size]);
        Ok(())
    }
}

/// File-backed block device using `pread`.
///
/// `FileExt::read_exact_at` does not share a seek position, so one handle
/// serves all workers.
#[derive(Debug)]
pub struct FileBlockDevice {
    file: File,
    block_size: usize,
    block_count: u64,
}

impl FileBlockDevice {
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| StorageError::Io { block: 0, source })?;
        let len = file
            .metadata()
            .map_err(|source| StorageError::Io { block: 0, source })?
            .len();
        if block_size == 0 {
            return Err(StorageError::Device("zero block size".to_string()));
        }
        tracing::debug!(path = %path.display(), len, block_size, "Opened block device");
        Ok(Self {
            file,
            block_size,
            block_count: len / block_size as u64,
        })
    }
}

impl BlockDevice for FileBlockDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        let offset = check_read(block, self.block_count, buf.len(), self.block_size)?;
        self.file
            .read_exact_at(buf, offset)
            .map_err(|source| StorageError::Io { block, source })
    }
}
