//! Verity target configuration and validation
//!
//! A `VerityConfig` can be built three ways:
//!
//! - from a table line, `VerityConfig::from_table_args`
//! - from a JSON document, `VerityConfig::from_json`
//! - programmatically, `VerityConfigBuilder`
//!
//! # Example
//!
//! ```ignore
//! use block_verity::domain::VerityConfigBuilder;
//!
//! let root: Vec<u8> = hex::decode(root_hex)?;
//! let config = VerityConfigBuilder::new()
//!     .data_blocks(1024)
//!     .hash_start(0)
//!     .root_digest(&root)
//!     .salt(b"per-image salt")
//!     .build()
//!     .expect("Valid config");
//! ```

use crate::domain::geometry::Geometry;
use crate::domain::prefetch::DEFAULT_PREFETCH_CLUSTER_BYTES;
use crate::domain::types::{
    CorruptionMode, FormatVersion, HashAlgorithm, OPT_IGNORE_CORRUPTION, OPT_IGNORE_ZERO_BLOCKS,
    OPT_RESTART_ON_CORRUPTION,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// Default cap on counted corruption events.
pub const DEFAULT_MAX_CORRUPTED_ERRORS: u32 = 100;

/// Number of positional arguments in a table line.
pub const TABLE_POSITIONAL_ARGS: usize = 10;

/// Option keywords that belong to the FEC decoder; each takes one value.
pub const FEC_OPTIONS: [&str; 4] = ["use_fec_from_device", "fec_roots", "fec_blocks", "fec_start"];

/// Largest optional-argument count a table line may carry.
pub const MAX_OPTIONAL_ARGS: usize = 2 + 2 * FEC_OPTIONS.len();

/// Verity target configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerityConfig {
    /// On-disk format version (0 or 1)
    pub version: FormatVersion,
    /// Name of the data device, echoed in the table status
    pub data_device: String,
    /// Name of the hash device, echoed in the table status
    pub hash_device: String,
    /// Data block size in bytes
    pub data_block_size: u32,
    /// Hash block size in bytes
    pub hash_block_size: u32,
    /// Number of data blocks covered by the tree
    pub data_blocks: u64,
    /// First hash-device block of the tree (in hash blocks)
    pub hash_start: u64,
    /// Digest algorithm
    pub algorithm: HashAlgorithm,
    /// Trusted root digest, hex encoded
    pub root_digest: String,
    /// Salt, hex encoded. `None` for no salt.
    pub salt: Option<String>,
    /// Response to unrepairable corruption
    pub mode: CorruptionMode,
    /// Serve blocks whose digest is the zero-block digest as zeros
    pub ignore_zero_blocks: bool,
    /// Level-0 prefetch cluster in bytes (0 disables clustering)
    pub prefetch_cluster_bytes: u32,
    /// Counted corruption events before every mismatch fails
    pub max_corrupted_errors: u32,
    /// Verification worker threads (defaults to the CPU count)
    pub worker_threads: Option<usize>,
    /// FEC options passed through to the decoder, as keyword/value pairs
    pub fec_args: Vec<String>,
}

impl Default for VerityConfig {
    fn default() -> Self {
        Self {
            version: FormatVersion::V1,
            data_device: String::new(),
            hash_device: String::new(),
            data_block_size: 4096,
            hash_block_size: 4096,
            data_blocks: 0,
            hash_start: 0,
            algorithm: HashAlgorithm::Sha256,
            root_digest: String::new(),
            salt: None,
            mode: CorruptionMode::Eio,
            ignore_zero_blocks: false,
            prefetch_cluster_bytes: DEFAULT_PREFETCH_CLUSTER_BYTES,
            max_corrupted_errors: DEFAULT_MAX_CORRUPTED_ERRORS,
            worker_threads: None,
            fec_args: Vec::new(),
        }
    }
}

impl VerityConfig {
    /// Validate the configuration.
    ///
    /// Checks the geometry, the root digest length against the algorithm and
    /// the salt encoding.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geometry()?;
        self.root_digest_bytes()?;
        self.salt_bytes()?;

        if self.worker_threads == Some(0) {
            return Err(ConfigError::InvalidArgument {
                field: "worker_threads",
                value: "0".to_string(),
            });
        }
        if self.fec_args.len() % 2 != 0 {
            return Err(ConfigError::InvalidArgument {
                field: "fec_args",
                value: self.fec_args.join(" "),
            });
        }
        Ok(())
    }

    /// Tree geometry implied by this configuration.
    pub fn geometry(&self) -> Result<Geometry, ConfigError> {
        Geometry::compute(
            self.data_block_size,
            self.hash_block_size,
            self.algorithm.digest_size(),
            self.data_blocks,
            self.hash_start,
            self.version,
        )
    }

    /// Decoded root digest; its length must match the algorithm.
    pub fn root_digest_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        let bytes = hex::decode(&self.root_digest)
            .map_err(|e| ConfigError::InvalidRootDigest(e.to_string()))?;
        if bytes.len() != self.algorithm.digest_size() {
            return Err(ConfigError::InvalidRootDigest(format!(
                "{} bytes, {} needs {}",
                bytes.len(),
                self.algorithm,
                self.algorithm.digest_size()
            )));
        }
        Ok(bytes)
    }

    /// Decoded salt, empty when none is configured.
    pub fn salt_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        match self.salt.as_deref() {
            None | Some("") | Some("-") => Ok(Vec::new()),
            Some(hex_salt) => {
                hex::decode(hex_salt).map_err(|e| ConfigError::InvalidSalt(e.to_string()))
            }
        }
    }

    /// Parse a table line split into arguments:
    ///
    /// ```text
    /// <version> <data_dev> <hash_dev> <data_bs> <hash_bs> <data_blocks>
    /// <hash_start> <alg> <root_hex> <salt_hex|-> [<#opts> <opt>...]
    /// ```
    pub fn from_table_args(args: &[&str]) -> Result<Self, ConfigError> {
        if args.len() < TABLE_POSITIONAL_ARGS {
            return Err(ConfigError::NotEnoughArguments {
                got: args.len(),
                need: TABLE_POSITIONAL_ARGS,
            });
        }

        let version_num: u32 = parse_arg("version", args[0])?;
        let mut config = VerityConfig {
            version: FormatVersion::try_from(version_num)?,
            data_device: args[1].to_string(),
            hash_device: args[2].to_string(),
            data_block_size: parse_arg("data block size", args[3])?,
            hash_block_size: parse_arg("hash block size", args[4])?,
            data_blocks: parse_arg("data blocks", args[5])?,
            hash_start: parse_arg("hash start", args[6])?,
            algorithm: args[7].parse()?,
            root_digest: args[8].to_ascii_lowercase(),
            salt: match args[9] {
                "-" => None,
                s => Some(s.to_ascii_lowercase()),
            },
            ..Default::default()
        };

        config.parse_optional_args(&args[TABLE_POSITIONAL_ARGS..])?;
        config.validate()?;
        Ok(config)
    }

    fn parse_optional_args(&mut self, rest: &[&str]) -> Result<(), ConfigError> {
        let Some((count_arg, opts)) = rest.split_first() else {
            return Ok(());
        };
        let count: usize = parse_arg("number of feature args", count_arg)?;
        if count > MAX_OPTIONAL_ARGS {
            return Err(ConfigError::InvalidArgument {
                field: "number of feature args",
                value: count.to_string(),
            });
        }
        if opts.len() != count {
            return Err(ConfigError::NotEnoughArguments {
                got: opts.len(),
                need: count,
            });
        }

        let mut iter = opts.iter();
        while let Some(opt) = iter.next() {
            let name = opt.to_ascii_lowercase();
            match name.as_str() {
                OPT_IGNORE_CORRUPTION => self.mode = CorruptionMode::Logging,
                OPT_RESTART_ON_CORRUPTION => self.mode = CorruptionMode::Restart,
                OPT_IGNORE_ZERO_BLOCKS => self.ignore_zero_blocks = true,
                fec if FEC_OPTIONS.contains(&fec) => {
                    let value = iter.next().ok_or(ConfigError::NotEnoughArguments {
                        got: count,
                        need: count + 1,
                    })?;
                    self.fec_args.push(name.clone());
                    self.fec_args.push((*value).to_string());
                }
                _ => return Err(ConfigError::UnrecognizedOption((*opt).to_string())),
            }
        }
        Ok(())
    }

    /// Parse a JSON configuration document and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: VerityConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply tuning overrides from the environment.
    ///
    /// - `VERITY_PREFETCH_CLUSTER`: level-0 prefetch cluster in bytes
    /// - `VERITY_WORKER_THREADS`: verification worker count
    ///
    /// Unparsable values are ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = env::var("VERITY_PREFETCH_CLUSTER") {
            match value.parse() {
                Ok(bytes) => self.prefetch_cluster_bytes = bytes,
                Err(_) => warn!(value = %value, "Ignoring invalid VERITY_PREFETCH_CLUSTER"),
            }
        }
        if let Ok(value) = env::var("VERITY_WORKER_THREADS") {
            match value.parse::<usize>() {
                Ok(threads) if threads > 0 => self.worker_threads = Some(threads),
                _ => warn!(value = %value, "Ignoring invalid VERITY_WORKER_THREADS"),
            }
        }
        self
    }
}

fn parse_arg<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidArgument {
        field,
        value: value.to_string(),
    })
}

/// Builder for VerityConfig with validation
///
/// Unset fields fall back to `VerityConfig::default()`.
#[derive(Default)]
pub struct VerityConfigBuilder {
    version: Option<FormatVersion>,
    data_device: Option<String>,
    hash_device: Option<String>,
    data_block_size: Option<u32>,
    hash_block_size: Option<u32>,
    data_blocks: Option<u64>,
    hash_start: Option<u64>,
    algorithm: Option<HashAlgorithm>,
    root_digest: Option<String>,
    salt: Option<Option<String>>,
    mode: Option<CorruptionMode>,
    ignore_zero_blocks: Option<bool>,
    prefetch_cluster_bytes: Option<u32>,
    max_corrupted_errors: Option<u32>,
    worker_threads: Option<usize>,
    fec_args: Option<Vec<String>>,
}

impl VerityConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: FormatVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn devices(mut self, data_device: impl Into<String>, hash_device: impl Into<String>) -> Self {
        self.data_device = Some(data_device.into());
        self.hash_device = Some(hash_device.into());
        self
    }

    pub fn data_block_size(mut self, size: u32) -> Self {
        self.data_block_size = Some(size);
        self
    }

    pub fn hash_block_size(mut self, size: u32) -> Self {
        self.hash_block_size = Some(size);
        self
    }

    pub fn data_blocks(mut self, blocks: u64) -> Self {
        self.data_blocks = Some(blocks);
        self
    }

    pub fn hash_start(mut self, block: u64) -> Self {
        self.hash_start = Some(block);
        self
    }

    pub fn algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Set the root digest from raw bytes
    pub fn root_digest(mut self, digest: &[u8]) -> Self {
        self.root_digest = Some(hex::encode(digest));
        self
    }

    /// Set the salt from raw bytes; an empty slice means no salt
    pub fn salt(mut self, salt: &[u8]) -> Self {
        self.salt = Some((!salt.is_empty()).then(|| hex::encode(salt)));
        self
    }

    pub fn mode(mut self, mode: CorruptionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn ignore_zero_blocks(mut self, enabled: bool) -> Self {
        self.ignore_zero_blocks = Some(enabled);
        self
    }

    pub fn prefetch_cluster_bytes(mut self, bytes: u32) -> Self {
        self.prefetch_cluster_bytes = Some(bytes);
        self
    }

    pub fn max_corrupted_errors(mut self, max: u32) -> Self {
        self.max_corrupted_errors = Some(max);
        self
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn fec_args(mut self, args: Vec<String>) -> Self {
        self.fec_args = Some(args);
        self
    }

    /// Build the VerityConfig, validating all parameters
    pub fn build(self) -> Result<VerityConfig, ConfigError> {
        let defaults = VerityConfig::default();

        let config = VerityConfig {
            version: self.version.unwrap_or(defaults.version),
            data_device: self.data_device.unwrap_or(defaults.data_device),
            hash_device: self.hash_device.unwrap_or(defaults.hash_device),
            data_block_size: self.data_block_size.unwrap_or(defaults.data_block_size),
            hash_block_size: self.hash_block_size.unwrap_or(defaults.hash_block_size),
            data_blocks: self.data_blocks.unwrap_or(defaults.data_blocks),
            hash_start: self.hash_start.unwrap_or(defaults.hash_start),
            algorithm: self.algorithm.unwrap_or(defaults.algorithm),
            root_digest: self.root_digest.unwrap_or(defaults.root_digest),
            salt: self.salt.unwrap_or(defaults.salt),
            mode: self.mode.unwrap_or(defaults.mode),
            ignore_zero_blocks: self.ignore_zero_blocks.unwrap_or(defaults.ignore_zero_blocks),
            prefetch_cluster_bytes: self
                .prefetch_cluster_bytes
                .unwrap_or(defaults.prefetch_cluster_bytes),
            max_corrupted_errors: self
                .max_corrupted_errors
                .unwrap_or(defaults.max_corrupted_errors),
            worker_threads: self.worker_threads.or(defaults.worker_threads),
            fec_args: self.fec_args.unwrap_or(defaults.fec_args),
        };

        config.validate()?;
        Ok(config)
    }
}
