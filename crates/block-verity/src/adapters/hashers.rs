//! # Software Hash Providers
//!
//! Portable implementations of every supported algorithm. They serve as the
//! fallback engine and, when no accelerator is plugged in, as the primary
//! engine too.
//!
//! | Algorithm | Crate |
//! |-----------|-------|
//! | sha256, sha512 | `sha2` |
//! | sha3-256 | `sha3` |
//! | blake3 | `blake3` |

use crate::domain::types::HashAlgorithm;
use crate::error::EngineError;
use crate::ports::outbound::{HashProvider, HashState};
use sha2::Digest;
use std::marker::PhantomData;
use std::sync::Arc;

/// Provider over any RustCrypto `Digest` implementation.
pub struct RustCryptoProvider<D> {
    name: &'static str,
    _digest: PhantomData<fn() -> D>,
}

impl<D> RustCryptoProvider<D> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            _digest: PhantomData,
        }
    }
}

struct RustCryptoState<D>(D);

impl<D: Digest + Send> HashState for RustCryptoState<D> {
    fn update(&mut self, data: &[u8]) -> Result<(), EngineError> {
        Digest::update(&mut self.0, data);
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Vec<u8>, EngineError> {
        Ok(self.0.finalize().to_vec())
    }
}

impl<D: Digest + Send + 'static> HashProvider for RustCryptoProvider<D> {
    fn name(&self) -> &str {
        self.name
    }

    fn digest_size(&self) -> usize {
        <D as Digest>::output_size()
    }

    fn start(&self) -> Result<Box<dyn HashState>, EngineError> {
        Ok(Box::new(RustCryptoState(D::new())))
    }
}

/// BLAKE3 provider.
#[derive(Default)]
pub struct Blake3Provider;

struct Blake3State(blake3::Hasher);

impl HashState for Blake3State {
    fn update(&mut self, data: &[u8]) -> Result<(), EngineError> {
        self.0.update(data);
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Vec<u8>, EngineError> {
        Ok(self.0.finalize().as_bytes().to_vec())
    }
}

impl HashProvider for Blake3Provider {
    fn name(&self) -> &str {
        "blake3"
    }

    fn digest_size(&self) -> usize {
        blake3::OUT_LEN
    }

    fn start(&self) -> Result<Box<dyn HashState>, EngineError> {
        Ok(Box::new(Blake3State(blake3::Hasher::new())))
    }
}

/// Software provider for `algorithm`.
pub fn provider_for(algorithm: HashAlgorithm) -> Arc<dyn HashProvider> {
    match algorithm {
        HashAlgorithm::Sha256 => Arc::new(RustCryptoProvider::<sha2::Sha256>::new("sha256")),
        HashAlgorithm::Sha512 => Arc::new(RustCryptoProvider::<sha2::Sha512>::new("sha512")),
        HashAlgorithm::Sha3_256 => Arc::new(RustCryptoProvider::<sha3::Sha3_256>::new("sha3-256")),
        HashAlgorithm::Blake3 => Arc::new(Blake3Provider),
    }
}
