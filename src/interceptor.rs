//! Just-in-time WebP for the development server.
//!
//! Pages rewritten by [`markup`](crate::markup) reference `photo.webp` files
//! that only exist after a build. While serving, this handler answers those
//! requests by finding the original raster next to where the `.webp` would
//! be and transcoding it in memory:
//!
//! ```text
//! GET /img/photo.webp
//!   /@fs/<abs>          → <abs>                 (absolute-path route)
//!   <root>/img/photo.*, else <root>/public/img/photo.*
//!   probe .png .jpg .jpeg .PNG .JPG .JPEG       → first existing original
//!   → 200 image/webp, Cache-Control: no-store
//! ```
//!
//! When no original exists, the encoder is unavailable, or anything fails,
//! the request falls through to the next handler.

use crate::chain::{Handler, Outcome, Reply, RequestInfo};
use crate::imaging::PreviewEngine;
use percent_encoding::percent_decode_str;
use std::path::{Component, Path, PathBuf};

/// Extensions probed for the original, in order.
pub const ORIGINAL_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "PNG", "JPG", "JPEG"];

const FS_ROUTE: &str = "/@fs/";

#[derive(Clone)]
pub struct PreviewInterceptor {
    root: PathBuf,
    public_dir: PathBuf,
    engine: PreviewEngine,
}

impl PreviewInterceptor {
    pub fn new(root: impl Into<PathBuf>, engine: PreviewEngine) -> Self {
        let root = root.into();
        let public_dir = root.join("public");
        Self {
            root,
            public_dir,
            engine,
        }
    }

    /// Original raster for a decoded `.webp` request path, if there is one.
    pub fn find_source(&self, path: &str) -> Option<PathBuf> {
        if let Some(rest) = path.strip_prefix(FS_ROUTE) {
            let abs = Path::new("/").join(rest);
            if is_safe(&abs)
                && let Some(found) = find_original(&abs)
            {
                return Some(found);
            }
        }

        let rel = path.trim_start_matches('/');
        if !is_safe(Path::new(rel)) {
            return None;
        }
        find_original(&self.root.join(rel)).or_else(|| find_original(&self.public_dir.join(rel)))
    }
}

impl Handler for PreviewInterceptor {
    fn handle(&self, request: &RequestInfo) -> Outcome {
        if !request.is_get() {
            return Outcome::NotFound;
        }
        let Some(path) = decode_path(request.path()) else {
            return Outcome::NotFound;
        };
        if !path.to_ascii_lowercase().ends_with(".webp") {
            return Outcome::NotFound;
        }
        let Some(source) = self.find_source(&path) else {
            return Outcome::NotFound;
        };

        match self.engine.transcode(&source) {
            Ok(Some(bytes)) => Outcome::Handled(
                Reply::ok("image/webp", bytes.to_vec()).with_cache_control("no-store"),
            ),
            Ok(None) => Outcome::Unavailable,
            Err(e) => {
                tracing::debug!(source = %source.display(), error = %e, "preview transcode failed; falling through");
                Outcome::NotFound
            }
        }
    }
}

/// Swap the `.webp` extension for each known raster extension and return
/// the first file that exists.
pub fn find_original(webp_path: &Path) -> Option<PathBuf> {
    ORIGINAL_EXTENSIONS
        .iter()
        .map(|ext| webp_path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

fn decode_path(raw: &str) -> Option<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(std::borrow::Cow::into_owned)
}

fn is_safe(path: &Path) -> bool {
    !path.components().any(|c| matches!(c, Component::ParentDir))
}
