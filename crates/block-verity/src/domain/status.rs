//! Status strings reported by a target.

use crate::domain::types::{CorruptionMode, FormatVersion, HashAlgorithm, OPT_IGNORE_ZERO_BLOCKS};
use std::fmt;

/// Which status string to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusType {
    /// `V` while clean, `C` once any corruption was seen.
    Info,
    /// The table line that recreates the target.
    Table,
}

pub fn info_status(has_corruption: bool) -> &'static str {
    if has_corruption {
        "C"
    } else {
        "V"
    }
}

/// Everything needed to render the table line.
#[derive(Debug, Clone)]
pub struct TableStatus<'a> {
    pub version: FormatVersion,
    pub data_device: &'a str,
    pub hash_device: &'a str,
    pub data_block_size: usize,
    pub hash_block_size: usize,
    pub data_blocks: u64,
    pub hash_start: u64,
    pub algorithm: HashAlgorithm,
    pub root_digest: &'a [u8],
    pub salt: &'a [u8],
    pub mode: CorruptionMode,
    pub ignore_zero_blocks: bool,
    pub fec_args: &'a [String],
}

impl fmt::Display for TableStatus<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {} {} ",
            self.version.as_u32(),
            self.data_device,
            self.hash_device,
            self.data_block_size,
            self.hash_block_size,
            self.data_blocks,
            self.hash_start,
            self.algorithm,
            hex::encode(self.root_digest),
        )?;
        if self.salt.is_empty() {
            f.write_str("-")?;
        } else {
            f.write_str(&hex::encode(self.salt))?;
        }

        let mode_opt = self.mode.table_option();
        let args = usize::from(mode_opt.is_some())
            + usize::from(self.ignore_zero_blocks)
            + self.fec_args.len();
        if args == 0 {
            return Ok(());
        }

        write!(f, " {args}")?;
        if let Some(opt) = mode_opt {
            write!(f, " {opt}")?;
        }
        if self.ignore_zero_blocks {
            write!(f, " {OPT_IGNORE_ZERO_BLOCKS}")?;
        }
        for arg in self.fec_args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
