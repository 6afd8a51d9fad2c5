//! Encoding parameters handed to the transcoder.
//!
//! [`EncodeOptions`] is opaque to everything except the backend: the
//! converter only compares it for equality (a changed option invalidates
//! every fingerprint) and the preview cache only hashes it.

use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.min(100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(82)
    }
}

/// Options forwarded to the WebP encoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodeOptions {
    pub quality: Quality,
    /// Request lossless output regardless of `quality`.
    pub lossless: bool,
}
