//! WebP transcoding.
//!
//! | Mode | Entry point | Used by |
//! |---|---|---|
//! | **Batch** | [`Transcoder::encode_file`] | [`convert`](crate::convert) |
//! | **Preview** | [`PreviewEngine::transcode`] | [`interceptor`](crate::interceptor) |
//!
//! The module is split into:
//! - **Parameters**: [`EncodeOptions`], the opaque options passed through to the encoder
//! - **Backend**: [`Transcoder`] trait, [`CapabilityProvider`] and its providers
//! - **Rust backend**: [`RustBackend`], `image` decoders with the `webp` encoder
//! - **Preview**: in-memory encoding with a bounded FIFO cache

pub mod backend;
mod params;
pub mod preview;
pub mod rust_backend;

pub use backend::{
    AlwaysAvailable, BackendError, Capability, CapabilityProvider, Transcoder,
    UnavailableProvider, builtin_provider,
};
pub use params::{EncodeOptions, Quality};
pub use preview::{PreviewCache, PreviewEngine};
pub use rust_backend::RustBackend;
