//! HTML rewriting: serve WebP through `<picture>`.
//!
//! [`rewrite_html`] makes two passes over a parsed document:
//!
//! 1. **Existing pictures.** Every non-WebP `<source>` with a usable `srcset`
//!    gets a WebP twin inserted right before it, carrying the same `media` and
//!    `sizes`. The picture's `<img>` gets one more keyless twin before it.
//! 2. **Bare images.** An `<img>` outside any picture is wrapped:
//!
//!    ```text
//!    <img src="pic.png">
//!    → <picture><source srcset="pic.webp" type="image/webp"/><img src="pic.png"></picture>
//!    ```
//!
//! A twin is skipped when the picture already holds a WebP source with the
//! same [`WebpSourceKey`], which is what makes the rewrite idempotent.
//!
//! Markup inside `<script>`, `<style>`, `<textarea>` and `<pre>` is text and
//! is never touched.
//!
//! Only insertions are made. Every byte of the input survives in place, and a
//! document with nothing eligible comes back borrowed and unchanged.

pub mod dom;
pub mod splice;

use crate::srcset::{WebpSourceKey, to_webp_srcset};
use crate::urls;
use dom::{Document, Element, escape_attr};
use splice::Splicer;
use std::borrow::Cow;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteOptions {
    pub inject_webp_sources: bool,
    pub skip_external: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            inject_webp_sources: true,
            skip_external: true,
        }
    }
}

/// Rewrite `html` so eligible images gain WebP sources.
///
/// Parse failures are logged and the input is returned as is.
pub fn rewrite_html<'a>(html: &'a str, options: &RewriteOptions) -> Cow<'a, str> {
    if !options.inject_webp_sources {
        return Cow::Borrowed(html);
    }
    let doc = match Document::parse(html) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(error = %e, "leaving HTML unmodified");
            return Cow::Borrowed(html);
        }
    };

    let mut splicer = Splicer::new(html);
    inject_into_pictures(&doc, options.skip_external, &mut splicer);
    wrap_bare_images(&doc, options.skip_external, &mut splicer);
    splicer.finish()
}

fn inject_into_pictures(doc: &Document, skip_external: bool, splicer: &mut Splicer<'_>) {
    for (index, _) in doc.pictures() {
        let sources: Vec<&Element> = doc.children_of_picture(index, "source").collect();

        let mut existing: HashSet<WebpSourceKey> = sources
            .iter()
            .filter(|s| is_webp_type(s))
            .filter(|s| !s.attr_or_empty("srcset").is_empty())
            .map(|s| {
                WebpSourceKey::new(
                    s.attr_or_empty("srcset"),
                    s.attr_or_empty("media"),
                    s.attr_or_empty("sizes"),
                )
            })
            .collect();

        for source in sources.iter().filter(|s| !is_webp_type(s)) {
            let srcset = source.attr_or_empty("srcset");
            if srcset.is_empty() {
                continue;
            }
            let Some(webp) = to_webp_srcset(srcset, skip_external) else {
                continue;
            };
            let media = source.attr_or_empty("media");
            let sizes = source.attr_or_empty("sizes");
            if existing.insert(WebpSourceKey::new(&webp, media, sizes)) {
                splicer.insert(source.start, webp_source_tag(&webp, media, sizes));
            }
        }

        let Some(img) = doc.children_of_picture(index, "img").next() else {
            continue;
        };
        if let Some(candidate) = image_candidate(img, skip_external)
            && existing.insert(WebpSourceKey::new(&candidate, "", ""))
        {
            splicer.insert(img.start, webp_source_tag(&candidate, "", ""));
        }
    }
}

fn wrap_bare_images(doc: &Document, skip_external: bool, splicer: &mut Splicer<'_>) {
    for img in doc.elements().iter().filter(|e| e.is("img") && !e.in_picture()) {
        let Some(candidate) = image_candidate(img, skip_external) else {
            continue;
        };
        splicer.insert(
            img.start,
            format!("<picture>{}", webp_source_tag(&candidate, "", "")),
        );
        splicer.insert(img.end, "</picture>");
    }
}

/// WebP `srcset` for an `<img>`: its own `srcset` when non-empty, otherwise
/// its `src`. `None` when nothing maps.
pub fn image_candidate(img: &Element, skip_external: bool) -> Option<String> {
    let srcset = img.attr_or_empty("srcset");
    if !srcset.is_empty() {
        return to_webp_srcset(srcset, skip_external);
    }
    let src = img.attr_or_empty("src");
    if !src.is_empty() && urls::is_candidate_url(src, skip_external) {
        return Some(urls::to_webp_url(src));
    }
    None
}

fn is_webp_type(source: &Element) -> bool {
    source
        .attr_or_empty("type")
        .to_ascii_lowercase()
        .contains("image/webp")
}

fn webp_source_tag(srcset: &str, media: &str, sizes: &str) -> String {
    let mut tag = format!(r#"<source srcset="{}" type="image/webp""#, escape_attr(srcset));
    if !media.is_empty() {
        tag.push_str(&format!(r#" media="{}""#, escape_attr(media)));
    }
    if !sizes.is_empty() {
        tag.push_str(&format!(r#" sizes="{}""#, escape_attr(sizes)));
    }
    tag.push_str("/>");
    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(html: &str) -> String {
        rewrite_html(html, &RewriteOptions::default()).into_owned()
    }

    // =========================================================================
    // Bare images
    // =========================================================================

    #[test]
    fn bare_img_is_wrapped() {
        assert_eq!(
            rewrite(r#"<img src="pic.png">"#),
            r#"<picture><source srcset="pic.webp" type="image/webp"/><img src="pic.png"></picture>"#
        );
    }

    #[test]
    fn wrapping_preserves_surrounding_markup() {
        let html = "<p>before <img src=\"a.JPG?v=2\" alt=\"A\" /> after</p>\n";
        assert_eq!(
            rewrite(html),
            "<p>before <picture><source srcset=\"a.webp?v=2\" type=\"image/webp\"/><img src=\"a.JPG?v=2\" alt=\"A\" /></picture> after</p>\n"
        );
    }

    #[test]
    fn img_srcset_maps_with_descriptors_in_order() {
        let out = rewrite(r#"<img src="a.jpg" srcset="a.jpg 1x, b.jpg 2x">"#);
        assert!(out.starts_with(
            r#"<picture><source srcset="a.webp 1x, b.webp 2x" type="image/webp"/>"#
        ));
    }

    #[test]
    fn img_srcset_without_raster_entries_is_skipped() {
        let html = r#"<img src="a.jpg" srcset="a.svg 1x, b.gif 2x">"#;
        assert_eq!(rewrite(html), html);
    }

    #[test]
    fn external_img_is_left_alone() {
        let html = r#"<img src="https://cdn.example.com/photo.jpg">"#;
        assert_eq!(rewrite(html), html);
        let opts = RewriteOptions {
            skip_external: false,
            ..Default::default()
        };
        assert!(rewrite_html(html, &opts).contains("photo.webp"));
    }

    #[test]
    fn svg_and_webp_images_are_left_alone() {
        let html = r#"<img src="logo.svg"><img src="a.webp"><img src="b.gif"><img>"#;
        assert_eq!(rewrite(html), html);
    }

    #[test]
    fn consecutive_images_each_get_their_own_picture() {
        assert_eq!(
            rewrite(r#"<img src="a.png"><img src="b.png">"#),
            concat!(
                r#"<picture><source srcset="a.webp" type="image/webp"/><img src="a.png"></picture>"#,
                r#"<picture><source srcset="b.webp" type="image/webp"/><img src="b.png"></picture>"#
            )
        );
    }

    #[test]
    fn attribute_values_are_escaped() {
        let out = rewrite(r#"<img src="a.png?x=1&amp;y=2">"#);
        assert!(out.contains(r#"<source srcset="a.webp?x=1&amp;y=2" type="image/webp"/>"#));
    }

    #[test]
    fn numeric_references_are_decoded_before_mapping() {
        let out = rewrite(r#"<img src="a.png?x=1&#38;y=2"><img src="b.jpg?v=&#x31;">"#);
        assert!(out.contains(r#"<source srcset="a.webp?x=1&amp;y=2" type="image/webp"/>"#));
        assert!(out.contains(r#"<source srcset="b.webp?v=1" type="image/webp"/>"#));
    }

    #[test]
    fn apostrophe_in_unquoted_alt_keeps_tag_boundary() {
        let out = rewrite("<div><img alt=it's src=a.png><p>don't panic</p></div>");
        assert_eq!(
            out,
            concat!(
                "<div><picture>",
                r#"<source srcset="a.webp" type="image/webp"/>"#,
                "<img alt=it's src=a.png></picture>",
                "<p>don't panic</p></div>"
            )
        );
    }

    // =========================================================================
    // Text-only elements
    // =========================================================================

    fn assert_untouched(html: &str) {
        let out = rewrite_html(html, &RewriteOptions::default());
        assert!(matches!(out, Cow::Borrowed(_)), "rewrote {html}: {out}");
    }

    #[test]
    fn img_in_script_is_left_alone() {
        assert_untouched(r#"<script>document.write('<img src="a.png">');</script>"#);
        assert_untouched(r#"<SCRIPT type="text/template"><img src="a.png"></SCRIPT>"#);
    }

    #[test]
    fn img_in_style_is_left_alone() {
        assert_untouched(r#"<style>/* <img src="a.png"> */ body { color: red }</style>"#);
    }

    #[test]
    fn img_in_textarea_is_left_alone() {
        assert_untouched(r#"<textarea name="snippet"><img src="a.png"></textarea>"#);
    }

    #[test]
    fn img_in_pre_is_left_alone() {
        assert_untouched(r#"<pre><img src="a.png"></pre>"#);
    }

    #[test]
    fn img_after_text_only_element_is_still_wrapped() {
        let html = r#"<script>var x = 1;</script><pre>code</pre><img src="a.png">"#;
        assert_eq!(
            rewrite(html),
            concat!(
                "<script>var x = 1;</script><pre>code</pre>",
                r#"<picture><source srcset="a.webp" type="image/webp"/><img src="a.png"></picture>"#
            )
        );
    }

    // =========================================================================
    // Existing pictures
    // =========================================================================

    #[test]
    fn picture_sources_gain_webp_twins() {
        let html = concat!(
            "<picture>",
            r#"<source media="(min-width: 800px)" srcset="big.jpg 1x, big@2x.jpg 2x">"#,
            r#"<img src="small.jpg">"#,
            "</picture>"
        );
        assert_eq!(
            rewrite(html),
            concat!(
                "<picture>",
                r#"<source srcset="big.webp 1x, big@2x.webp 2x" type="image/webp" media="(min-width: 800px)"/>"#,
                r#"<source media="(min-width: 800px)" srcset="big.jpg 1x, big@2x.jpg 2x">"#,
                r#"<source srcset="small.webp" type="image/webp"/>"#,
                r#"<img src="small.jpg">"#,
                "</picture>"
            )
        );
    }

    #[test]
    fn equivalent_webp_source_is_not_duplicated() {
        let html = concat!(
            "<picture>",
            r#"<source type="image/webp" srcset="b.webp 2x,  a.webp 1x">"#,
            r#"<img srcset="a.jpg 1x, b.jpg 2x" src="a.jpg">"#,
            "</picture>"
        );
        assert_eq!(rewrite(html), html);
    }

    #[test]
    fn webp_source_with_different_media_does_not_block() {
        let html = concat!(
            "<picture>",
            r#"<source type="image/webp" srcset="a.webp" media="(min-width: 1px)">"#,
            r#"<img src="a.jpg">"#,
            "</picture>"
        );
        let out = rewrite(html);
        assert_eq!(out.matches(r#"type="image/webp""#).count(), 2);
    }

    #[test]
    fn picture_without_img_only_twins_sources() {
        let html = r#"<picture><source srcset="a.png" sizes="50vw"></picture>"#;
        assert_eq!(
            rewrite(html),
            r#"<picture><source srcset="a.webp" type="image/webp" sizes="50vw"/><source srcset="a.png" sizes="50vw"></picture>"#
        );
    }

    #[test]
    fn img_inside_picture_is_not_wrapped_again() {
        let html = r#"<picture><img src="a.png"></picture>"#;
        let out = rewrite(html);
        assert_eq!(out.matches("<picture>").count(), 1);
        assert_eq!(
            out,
            r#"<picture><source srcset="a.webp" type="image/webp"/><img src="a.png"></picture>"#
        );
    }

    // =========================================================================
    // Global properties
    // =========================================================================

    #[test]
    fn rewrite_is_idempotent() {
        let html = concat!(
            "<!doctype html><html><body>",
            r#"<img src="hero.png" alt="Hero">"#,
            "<picture>",
            r#"<source srcset="a.jpg 1x, b.jpg 2x" media="(min-width: 600px)">"#,
            r#"<img src="c.jpg">"#,
            "</picture>",
            r#"<img src="//cdn.example.com/x.png">"#,
            "</body></html>"
        );
        let once = rewrite(html);
        let twice = rewrite(&once);
        assert_ne!(once, html);
        assert_eq!(twice, once);
    }

    #[test]
    fn disabled_injection_is_byte_identical() {
        let html = r#"<img src="pic.png">"#;
        let opts = RewriteOptions {
            inject_webp_sources: false,
            ..Default::default()
        };
        assert!(matches!(rewrite_html(html, &opts), Cow::Borrowed(_)));
    }

    #[test]
    fn document_without_images_is_borrowed() {
        let html = "<!doctype html><html><head><title>x</title></head><body><p>hi</p></body></html>";
        assert!(matches!(
            rewrite_html(html, &RewriteOptions::default()),
            Cow::Borrowed(_)
        ));
    }
}
