//! # webp-picture
//!
//! Serve WebP to browsers that support it without touching the source
//! markup. Raster images are referenced as before; the build output gains a
//! WebP twin for each one and the HTML gains `<source type="image/webp">`
//! elements pointing at them.
//!
//! # Architecture: Three Paths
//!
//! ```text
//! Build    dist/**/*.html   →  rewrite_html          (picture/source injection)
//!          dist/**/*.{png,jpg,jpeg} → convert_tree   (batch encode, fingerprinted)
//! Serve    GET /x.webp      →  PreviewInterceptor    (in-memory encode, FIFO cache)
//! ```
//!
//! The rewriter and the converter agree on one naming rule: the WebP twin of
//! `path/name.ext` is `path/name.webp`. Nothing else ties them together, so
//! either can run alone.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`urls`] | URL and path classification; the `.webp` naming rule |
//! | [`srcset`] | `srcset` parsing, WebP mapping, source dedup keys |
//! | [`markup`] | HTML rewriting by splicing into the original text |
//! | [`imaging`] | Encoder trait, capability providers, preview cache |
//! | [`cache`] | Persistent content fingerprint store |
//! | [`convert`] | Parallel, incremental batch conversion |
//! | [`chain`] | Request handler chain used by the dev server |
//! | [`interceptor`] | Just-in-time `.webp` responses |
//! | [`serve`] | `tiny_http` dev server and static files |
//! | [`plugin`] | Build-pipeline hooks tying it all together |
//! | [`config`] | `webp-picture.toml` loading, merging, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Insert, Never Re-serialize
//!
//! HTML is parsed only to find where elements start and end. Edits are
//! inserted into the original string, so attribute order, quoting, comments
//! and whitespace all survive, and a document with nothing to change comes
//! back byte-identical.
//!
//! ## Missing Encoder Is Not an Error
//!
//! Every component asks a [`CapabilityProvider`](imaging::CapabilityProvider)
//! for a transcoder. When none is available, conversion does nothing and
//! previews fall through to static files. The site still works; it just
//! serves the originals.
//!
//! ## Trust Size and Mtime
//!
//! A source whose size and modification time match its fingerprint record is
//! not hashed again. Only changed stats trigger a SHA-256 of the content, and
//! only a changed hash (or changed encode options) triggers a re-encode.

pub mod cache;
pub mod chain;
pub mod config;
pub mod convert;
pub mod imaging;
pub mod interceptor;
pub mod markup;
pub mod output;
pub mod plugin;
pub mod serve;
pub mod srcset;
pub mod urls;

#[cfg(test)]
pub(crate) mod test_helpers;
