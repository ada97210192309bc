//! Core value types shared across the engine.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of block a verification event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    /// A block of the data device.
    Data,
    /// A block of the hash tree on the hash device.
    Metadata,
}

impl BlockType {
    /// Numeric tag used in notification environment strings.
    pub fn code(self) -> u8 {
        match self {
            BlockType::Data => 0,
            BlockType::Metadata => 1,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::Data => write!(f, "data"),
            BlockType::Metadata => write!(f, "metadata"),
        }
    }
}

/// On-disk format version.
///
/// Version 0 is the original Chromium OS layout: the salt is hashed after the
/// block contents and digests are packed. Version 1 hashes the salt first and
/// pads each digest slot to a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum FormatVersion {
    V0,
    #[default]
    V1,
}

impl FormatVersion {
    pub fn salt_first(self) -> bool {
        matches!(self, FormatVersion::V1)
    }

    pub fn as_u32(self) -> u32 {
        match self {
            FormatVersion::V0 => 0,
            FormatVersion::V1 => 1,
        }
    }
}

impl TryFrom<u32> for FormatVersion {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FormatVersion::V0),
            1 => Ok(FormatVersion::V1),
            other => Err(ConfigError::InvalidVersion(other)),
        }
    }
}

impl From<FormatVersion> for u32 {
    fn from(value: FormatVersion) -> Self {
        value.as_u32()
    }
}

/// Response to an unrepairable mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptionMode {
    /// Fail the request with an I/O error.
    #[default]
    Eio,
    /// Record the event and deliver the data anyway.
    Logging,
    /// Ask the host to restart; degrade to logging when it cannot.
    Restart,
}

impl CorruptionMode {
    /// Table-line option naming this mode, if it is not the default.
    pub fn table_option(self) -> Option<&'static str> {
        match self {
            CorruptionMode::Eio => None,
            CorruptionMode::Logging => Some(OPT_IGNORE_CORRUPTION),
            CorruptionMode::Restart => Some(OPT_RESTART_ON_CORRUPTION),
        }
    }
}

pub const OPT_IGNORE_CORRUPTION: &str = "ignore_corruption";
pub const OPT_RESTART_ON_CORRUPTION: &str = "restart_on_corruption";
pub const OPT_IGNORE_ZERO_BLOCKS: &str = "ignore_zero_blocks";

/// Decision returned by the corruption policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Fail,
    Continue,
}

/// Which of the two interchangeable hash providers to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSelector {
    /// Fast path, possibly hardware accelerated.
    Primary,
    /// Reference implementation used to re-check a primary mismatch.
    Fallback,
}

impl fmt::Display for EngineSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineSelector::Primary => write!(f, "primary"),
            EngineSelector::Fallback => write!(f, "fallback"),
        }
    }
}

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[default]
    #[serde(rename = "sha256")]
    Sha256,
    #[serde(rename = "sha512")]
    Sha512,
    #[serde(rename = "sha3-256")]
    Sha3_256,
    #[serde(rename = "blake3")]
    Blake3,
}

impl HashAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha3_256 => "sha3-256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    pub fn digest_size(self) -> usize {
        match self {
            HashAlgorithm::Sha256 | HashAlgorithm::Sha3_256 | HashAlgorithm::Blake3 => 32,
            HashAlgorithm::Sha512 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "sha3-256" | "sha3_256" => Ok(HashAlgorithm::Sha3_256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}
