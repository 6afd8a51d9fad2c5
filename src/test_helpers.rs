//! Shared test utilities for the webp-picture test suite.
//!
//! Provides fixture builders for output trees and synthetic raster images
//! generated with the `image` crate, so no binary fixtures live in the repo.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_tree(tmp.path(), &["index.html", "img/a.png"]);
//! create_test_png(&tmp.path().join("img/real.png"), 32, 32);
//! ```

use image::{ImageEncoder, RgbImage, RgbaImage};
use std::path::Path;

// =========================================================================
// Fixture setup
// =========================================================================

/// Create each relative path under `root` with distinct placeholder content.
///
/// Parent directories are created as needed. The content is the path itself,
/// so no two files hash alike.
pub fn write_tree(root: &Path, files: &[&str]) {
    for rel in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, rel.as_bytes()).unwrap();
    }
}

// =========================================================================
// Synthetic images
// =========================================================================

/// Write an RGB gradient JPEG.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// Write an RGBA PNG with a transparent corner.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let alpha = if x < width / 2 && y < height / 2 { 0 } else { 255 };
        image::Rgba([(x % 256) as u8, 64, (y % 256) as u8, alpha])
    });
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}
