//! WebP backend: pure Rust decoders, libwebp encoder.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (PNG, JPEG) | `image` crate (pure Rust decoders) |
//! | Encode → WebP | `webp::Encoder` (bundled libwebp) |
//!
//! [`EncodeOptions::quality`] drives the lossy encoder; with
//! [`EncodeOptions::lossless`] set, output is VP8L and quality only trades
//! encode effort for size.

use super::backend::{BackendError, Transcoder};
use super::params::EncodeOptions;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// Backend pairing `image` decoders with the `webp` encoder.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk, sniffing the format from content.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to decode image: {}", e)))
}

/// Encode to WebP. Everything that is not already 8-bit RGB(A) is widened
/// or narrowed to it first; libwebp takes nothing else.
fn encode_webp(img: &DynamicImage, options: &EncodeOptions) -> Result<Vec<u8>, BackendError> {
    let converted;
    let img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other if other.color().has_alpha() => {
            converted = DynamicImage::ImageRgba8(other.to_rgba8());
            &converted
        }
        other => {
            converted = DynamicImage::ImageRgb8(other.to_rgb8());
            &converted
        }
    };
    let encoder = webp::Encoder::from_image(img)
        .map_err(|e| BackendError::ProcessingFailed(format!("WebP encode failed: {}", e)))?;
    let encoded = encoder
        .encode_simple(options.lossless, options.quality.value() as f32)
        .map_err(|e| BackendError::ProcessingFailed(format!("WebP encode failed: {:?}", e)))?;
    Ok(encoded.to_vec())
}

impl Transcoder for RustBackend {
    fn encode_file(
        &self,
        source: &Path,
        output: &Path,
        options: &EncodeOptions,
    ) -> Result<(), BackendError> {
        let img = load_image(source)?;
        let webp = encode_webp(&img, options)?;
        std::fs::write(output, webp)?;
        Ok(())
    }

    fn encode_bytes(&self, bytes: &[u8], options: &EncodeOptions) -> Result<Vec<u8>, BackendError> {
        let img = decode_bytes(bytes)?;
        encode_webp(&img, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Quality;
    use crate::test_helpers::{create_test_jpeg, create_test_png};
    use image::{ImageFormat, Rgb, RgbImage};

    fn assert_is_webp(bytes: &[u8]) {
        assert!(bytes.len() > 12);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn encode_file_writes_webp_next_to_source() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("photo.jpg");
        create_test_jpeg(&source, 64, 48);
        let output = tmp.path().join("photo.webp");

        RustBackend::new()
            .encode_file(&source, &output, &EncodeOptions::default())
            .unwrap();

        let bytes = std::fs::read(&output).unwrap();
        assert_is_webp(&bytes);
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::WebP).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn encode_file_is_deterministic() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("icon.png");
        create_test_png(&source, 32, 32);
        let output = tmp.path().join("icon.webp");
        let backend = RustBackend::new();

        backend
            .encode_file(&source, &output, &EncodeOptions::default())
            .unwrap();
        let first = std::fs::read(&output).unwrap();
        backend
            .encode_file(&source, &output, &EncodeOptions::default())
            .unwrap();
        assert_eq!(first, std::fs::read(&output).unwrap());
    }

    #[test]
    fn encode_bytes_handles_png_with_alpha() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("icon.png");
        create_test_png(&source, 16, 16);

        let bytes = std::fs::read(&source).unwrap();
        let webp = RustBackend::new()
            .encode_bytes(&bytes, &EncodeOptions::default())
            .unwrap();
        assert_is_webp(&webp);
    }

    /// PNG bytes of a noisy image, so quality has something to throw away.
    fn noisy_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let n = x.wrapping_mul(7919) ^ y.wrapping_mul(104_729) ^ (x * y);
            Rgb([(n % 251) as u8, (n / 7 % 253) as u8, (n / 13 % 241) as u8])
        });
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn lossy(quality: u32) -> EncodeOptions {
        EncodeOptions {
            quality: Quality::new(quality),
            lossless: false,
        }
    }

    #[test]
    fn quality_reaches_the_encoder() {
        let png = noisy_png(96, 96);
        let backend = RustBackend::new();
        let low = backend.encode_bytes(&png, &lossy(10)).unwrap();
        let high = backend.encode_bytes(&png, &lossy(95)).unwrap();
        assert_is_webp(&low);
        assert_is_webp(&high);
        assert_ne!(low, high);
        assert!(low.len() < high.len(), "q10 {} bytes, q95 {} bytes", low.len(), high.len());
    }

    #[test]
    fn lossless_flag_switches_encoding() {
        let png = noisy_png(48, 48);
        let backend = RustBackend::new();
        let lossless = EncodeOptions {
            lossless: true,
            ..lossy(82)
        };
        let vp8l = backend.encode_bytes(&png, &lossless).unwrap();
        let vp8 = backend.encode_bytes(&png, &lossy(82)).unwrap();
        assert_eq!(&vp8l[12..16], b"VP8L");
        assert_eq!(&vp8[12..16], b"VP8 ");

        let original = image::load_from_memory(&png).unwrap().to_rgb8();
        let decoded = image::load_from_memory_with_format(&vp8l, ImageFormat::WebP)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded, original);
    }

    #[test]
    fn encode_missing_file_is_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = RustBackend::new()
            .encode_file(
                &tmp.path().join("gone.png"),
                &tmp.path().join("gone.webp"),
                &EncodeOptions::default(),
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn encode_garbage_fails_cleanly() {
        let err = RustBackend::new()
            .encode_bytes(b"definitely not an image", &EncodeOptions::default())
            .unwrap_err();
        assert!(matches!(err, BackendError::ProcessingFailed(_)));
    }
}
