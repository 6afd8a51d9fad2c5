//! `srcset` parsing, WebP mapping, and dedup signatures.
//!
//! A `srcset` is an ordered, comma-separated list of `<url> [descriptor]`
//! candidates. Order matters to browsers, so every transformation here keeps
//! it. The one exception is [`signature`], which sorts the candidates: two
//! sources listing the same candidates in a different order are the same
//! logical source for dedup purposes.
//!
//! Parsing never fails. An entry that does not split into URL and descriptor
//! is kept as a bare URL with an empty descriptor.

use crate::urls;

/// One candidate of a `srcset` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSetEntry {
    pub url: String,
    /// Width or density descriptor (`800w`, `2x`), empty when absent.
    pub descriptor: String,
}

/// Split a `srcset` into its candidates, dropping empty entries.
pub fn parse(srcset: &str) -> Vec<SourceSetEntry> {
    srcset
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once(char::is_whitespace) {
            Some((url, descriptor)) => SourceSetEntry {
                url: url.to_string(),
                descriptor: descriptor.trim().to_string(),
            },
            None => SourceSetEntry {
                url: item.to_string(),
                descriptor: String::new(),
            },
        })
        .collect()
}

/// Join candidates back into `srcset` syntax (`a.webp 1x, b.webp 2x`).
pub fn build(entries: &[SourceSetEntry]) -> String {
    entries
        .iter()
        .map(|SourceSetEntry { url, descriptor }| {
            if descriptor.is_empty() {
                url.clone()
            } else {
                format!("{url} {descriptor}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Map every eligible candidate to its WebP twin.
///
/// Candidates that are external (when `skip_external`), SVG, or not raster
/// are dropped. Returns `None` when nothing is left.
pub fn to_webp_srcset(srcset: &str, skip_external: bool) -> Option<String> {
    let mapped: Vec<SourceSetEntry> = parse(srcset)
        .into_iter()
        .filter(|entry| urls::is_candidate_url(&entry.url, skip_external))
        .map(|entry| SourceSetEntry {
            url: urls::to_webp_url(&entry.url),
            descriptor: entry.descriptor,
        })
        .collect();
    if mapped.is_empty() {
        None
    } else {
        Some(build(&mapped))
    }
}

/// Collapse runs of whitespace to one space and trim.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Order-insensitive identity of a `srcset`.
pub fn signature(srcset: &str) -> String {
    let normalized = normalize_ws(srcset);
    let mut items: Vec<&str> = normalized
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect();
    items.sort_unstable();
    items.join(",")
}

/// Dedup identity of a `<source type="image/webp">`: sorted `srcset`
/// signature plus normalized `media` and `sizes`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WebpSourceKey(String);

impl WebpSourceKey {
    pub fn new(srcset: &str, media: &str, sizes: &str) -> Self {
        Self(format!(
            "{}|{}|{}",
            signature(srcset),
            normalize_ws(media),
            normalize_ws(sizes)
        ))
    }
}
