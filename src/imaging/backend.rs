//! Transcoder trait and capability acquisition.
//!
//! The [`Transcoder`] trait defines the two operations every backend must
//! support: batch mode (file in, `.webp` file out) and preview mode (bytes in,
//! WebP bytes out).
//!
//! Callers never hold a transcoder directly. They ask a
//! [`CapabilityProvider`] for one and branch on the returned [`Capability`]:
//! an unavailable encoder is an ordinary outcome, not an error, and every
//! call site degrades by skipping work.

use super::params::EncodeOptions;
use super::rust_backend::RustBackend;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Trait for WebP encoders.
pub trait Transcoder: Sync {
    /// Encode `source` and write the result to `output`, overwriting it.
    /// Identical input and options must produce identical output.
    fn encode_file(
        &self,
        source: &Path,
        output: &Path,
        options: &EncodeOptions,
    ) -> Result<(), BackendError>;

    /// Encode raster bytes to WebP bytes in memory.
    fn encode_bytes(&self, bytes: &[u8], options: &EncodeOptions) -> Result<Vec<u8>, BackendError>;
}

/// Result of asking a provider for a transcoder.
pub enum Capability<'a> {
    Available(&'a dyn Transcoder),
    Unavailable(&'static str),
}

pub trait CapabilityProvider: Send + Sync {
    fn acquire(&self) -> Capability<'_>;
}

/// Provider that always hands out the wrapped transcoder.
pub struct AlwaysAvailable<T>(pub T);

impl<T: Transcoder + Send> CapabilityProvider for AlwaysAvailable<T> {
    fn acquire(&self) -> Capability<'_> {
        Capability::Available(&self.0)
    }
}

/// Provider that never has a transcoder, e.g. when encoding is switched off.
pub struct UnavailableProvider {
    reason: &'static str,
}

impl UnavailableProvider {
    pub fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

impl CapabilityProvider for UnavailableProvider {
    fn acquire(&self) -> Capability<'_> {
        Capability::Unavailable(self.reason)
    }
}

/// The pure-Rust encoder, statically linked and always present.
pub fn builtin_provider() -> AlwaysAvailable<RustBackend> {
    AlwaysAvailable(RustBackend::new())
}
