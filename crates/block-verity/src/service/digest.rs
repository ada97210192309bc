//! # Digest Engine
//!
//! Salted digests over a primary and a fallback hash provider.
//!
//! Format 1 hashes `salt || content`; format 0 hashes `content || salt`.

use crate::domain::types::{EngineSelector, FormatVersion};
use crate::error::{ConfigError, EngineError};
use crate::ports::outbound::{HashProvider, HashState};
use std::sync::Arc;

pub struct DigestEngine {
    primary: Arc<dyn HashProvider>,
    fallback: Arc<dyn HashProvider>,
    salt: Vec<u8>,
    version: FormatVersion,
    digest_size: usize,
}

impl DigestEngine {
    pub fn new(
        primary: Arc<dyn HashProvider>,
        fallback: Arc<dyn HashProvider>,
        salt: Vec<u8>,
        version: FormatVersion,
    ) -> Result<Self, ConfigError> {
        let digest_size = primary.digest_size();
        if fallback.digest_size() != digest_size {
            return Err(ConfigError::DigestSizeMismatch {
                primary: digest_size,
                fallback: fallback.digest_size(),
            });
        }
        Ok(Self {
            primary,
            fallback,
            salt,
            version,
            digest_size,
        })
    }

    pub fn digest_size(&self) -> usize {
        self.digest_size
    }

    fn provider(&self, selector: EngineSelector) -> &dyn HashProvider {
        match selector {
            EngineSelector::Primary => self.primary.as_ref(),
            EngineSelector::Fallback => self.fallback.as_ref(),
        }
    }

    /// Start a streaming digest on the selected provider.
    pub fn begin(&self, selector: EngineSelector) -> Result<DigestContext<'_>, EngineError> {
        let provider = self.provider(selector);
        let mut state = provider.start()?;
        if self.version.salt_first() && !self.salt.is_empty() {
            state.update(&self.salt)?;
        }
        Ok(DigestContext {
            state,
            engine: self,
            provider: provider.name(),
        })
    }

    /// One-shot salted digest of `content`.
    pub fn digest(&self, content: &[u8], selector: EngineSelector) -> Result<Vec<u8>, EngineError> {
        let mut ctx = self.begin(selector)?;
        ctx.update(content)?;
        ctx.finish()
    }
}

/// A salted digest in progress.
pub struct DigestContext<'a> {
    state: Box<dyn HashState>,
    engine: &'a DigestEngine,
    provider: &'a str,
}

impl DigestContext<'_> {
    pub fn update(&mut self, data: &[u8]) -> Result<(), EngineError> {
        self.state.update(data)
    }

    pub fn finish(mut self) -> Result<Vec<u8>, EngineError> {
        if !self.engine.version.salt_first() && !self.engine.salt.is_empty() {
            self.state.update(&self.engine.salt)?;
        }
        let digest = self.state.finalize()?;
        if digest.len() != self.engine.digest_size {
            return Err(EngineError::Failed {
                provider: self.provider.to_string(),
                reason: format!(
                    "produced {} bytes, expected {}",
                    digest.len(),
                    self.engine.digest_size
                ),
            });
        }
        Ok(digest)
    }
}
