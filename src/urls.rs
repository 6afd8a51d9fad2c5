//! Centralized URL and filename classification.
//!
//! The markup rewriter and the batch converter both answer "is this a raster
//! image, and where does its WebP twin live?" through this module. Keeping the
//! rule in one place is what lets the rewriter emit `photo.webp` URLs without
//! knowing anything about the converter's run: the converter writes exactly
//! the path the rewriter predicted.
//!
//! ## Patterns
//!
//! | Check | Pattern (case-insensitive) |
//! |---|---|
//! | Raster | `.png`, `.jpg`, `.jpeg`, optionally followed by `?query` |
//! | SVG | `.svg`, optionally followed by `?query` |
//! | WebP | `.webp`, optionally followed by `?query` |
//! | External | `http://`, `https://`, `//` (protocol-relative), `data:` |

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static RASTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(png|jpe?g)(\?.*)?$").expect("raster pattern is valid"));
static SVG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.svg(\?.*)?$").expect("svg pattern is valid"));
static WEBP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.webp(\?.*)?$").expect("webp pattern is valid"));
static EXTERNAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://|data:|//)").expect("external pattern is valid")
});

/// True for PNG/JPEG URLs or paths, with or without a query suffix.
pub fn is_raster(url: &str) -> bool {
    RASTER_RE.is_match(url)
}

pub fn is_svg(url: &str) -> bool {
    SVG_RE.is_match(url)
}

pub fn is_webp(url: &str) -> bool {
    WEBP_RE.is_match(url)
}

/// Absolute http(s), protocol-relative and `data:` URLs.
pub fn is_external(url: &str) -> bool {
    EXTERNAL_RE.is_match(url)
}

/// Whether a URL found in markup may be replaced by a WebP twin.
pub fn is_candidate_url(url: &str, skip_external: bool) -> bool {
    (!skip_external || !is_external(url)) && is_raster(url) && !is_svg(url)
}

/// Swap a raster extension for `.webp`, keeping any query suffix.
///
/// - `img/a.png` → `img/a.webp`
/// - `img/a.JPG?v=3` → `img/a.webp?v=3`
/// - `img/a.gif` → unchanged
pub fn to_webp_url(url: &str) -> String {
    RASTER_RE.replace(url, ".webp${2}").into_owned()
}

/// Where the batch converter writes the WebP twin of a source file.
pub fn webp_output_path(source: &Path) -> PathBuf {
    source.with_extension("webp")
}

/// The configured set of extensions eligible for batch conversion.
///
/// An empty set does not narrow anything: every raster file qualifies.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    pattern: Option<Regex>,
}

impl ExtensionFilter {
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        let cleaned: Vec<String> = extensions
            .iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .map(regex::escape)
            .collect();
        if cleaned.is_empty() {
            return Self { pattern: None };
        }
        let pattern = Regex::new(&format!(r"(?i)\.({})(\?.*)?$", cleaned.join("|"))).ok();
        Self { pattern }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.as_ref().is_none_or(|re| re.is_match(name))
    }

    /// A file found while walking the output tree becomes a conversion job
    /// when it is in the include set, is a raster image, and is not WebP.
    pub fn is_conversion_job(&self, path: &Path) -> bool {
        let name = path.to_string_lossy();
        self.matches(&name) && is_raster(&name) && !is_webp(&name)
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new(&[".png", ".jpg", ".jpeg"])
    }
}
