//! Element index over an HTML document.
//!
//! Parsing is delegated to [`tl`]. Only what the rewriter needs is kept: each
//! element's name, decoded attributes, byte span of its opening tag in the
//! original text, and its nearest enclosing `<picture>`. Nothing is
//! re-serialized from the tree; edits are spliced into the source text by
//! [`Splicer`](super::splice::Splicer).

use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkupError {
    #[error("HTML parse error: {0}")]
    Parse(String),
}

/// One element of the document, in document order.
#[derive(Debug, Clone)]
pub struct Element {
    /// Lowercased tag name.
    pub name: String,
    /// Byte offset of the opening `<`.
    pub start: usize,
    /// Byte offset just past the opening tag's `>`.
    pub end: usize,
    /// Index of the nearest enclosing `<picture>` in [`Document::elements`].
    pub picture: Option<usize>,
    attrs: Vec<(String, String)>,
}

impl Element {
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Decoded attribute value. Names are matched case-insensitively; a
    /// valueless attribute reads as `""`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, `""` when absent.
    pub fn attr_or_empty(&self, name: &str) -> &str {
        self.attr(name).unwrap_or("")
    }

    pub fn in_picture(&self) -> bool {
        self.picture.is_some()
    }
}

#[derive(Debug, Default)]
pub struct Document {
    elements: Vec<Element>,
}

impl Document {
    pub fn parse(html: &str) -> Result<Self, MarkupError> {
        let dom = tl::parse(html, tl::ParserOptions::default())
            .map_err(|e| MarkupError::Parse(format!("{e:?}")))?;
        let parser = dom.parser();
        let mut elements = Vec::new();

        // Depth-first, document order. Each entry carries the nearest
        // enclosing picture of its parent.
        let mut stack: Vec<(tl::NodeHandle, Option<usize>)> =
            dom.children().iter().map(|h| (*h, None)).collect();
        stack.reverse();
        // End of the text-only body currently being skipped.
        let mut text_until = 0;

        while let Some((handle, picture)) = stack.pop() {
            let Some(tl::Node::Tag(tag)) = handle.get(parser) else {
                continue;
            };
            let name = tag.name().as_utf8_str().to_ascii_lowercase();
            let mut child_picture = picture;
            let span = locate(html, tag, &name);

            if let Some((start, _)) = span
                && start < text_until
            {
                tracing::trace!(tag = %name, offset = start, "markup inside text-only element ignored");
            } else if let Some((start, end)) = span {
                if TEXT_ONLY_ELEMENTS.contains(&name.as_str()) {
                    text_until = closing_tag(html, end, &name).unwrap_or(html.len());
                }
                let attrs = tag
                    .attributes()
                    .iter()
                    .map(|(k, v)| {
                        let value = v.map(|v| decode_entities(&v).into_owned());
                        (k.to_ascii_lowercase(), value.unwrap_or_default())
                    })
                    .collect();
                let index = elements.len();
                if name == "picture" {
                    child_picture = Some(index);
                }
                elements.push(Element {
                    name,
                    start,
                    end,
                    picture,
                    attrs,
                });
            } else {
                tracing::debug!(tag = %name, "element span not found; left untouched");
            }

            let children: Vec<tl::NodeHandle> = tag.children().top().iter().copied().collect();
            stack.extend(children.into_iter().rev().map(|h| (h, child_picture)));
        }

        Ok(Self { elements })
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// `(index, element)` for every `<picture>`.
    pub fn pictures(&self) -> impl Iterator<Item = (usize, &Element)> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is("picture"))
    }

    /// Elements named `name` whose nearest enclosing picture is `picture`.
    pub fn children_of_picture<'a>(
        &'a self,
        picture: usize,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements
            .iter()
            .filter(move |e| e.picture == Some(picture) && e.is(name))
    }
}

/// Elements whose bodies are kept as text: no markup inside them is indexed.
const TEXT_ONLY_ELEMENTS: [&str; 4] = ["script", "style", "textarea", "pre"];

/// Offset of the `</name` closing tag at or after `from`, case-insensitively.
fn closing_tag(html: &str, from: usize, name: &str) -> Option<usize> {
    let needle = format!("</{name}");
    html.as_bytes()
        .get(from..)?
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
        .map(|pos| from + pos)
}

/// Span of a tag's opening markup in `html`.
///
/// `tl` hands out slices of the input, so the tag's raw bytes point into
/// `html`. Anything that does not line up with `<name` is rejected.
fn locate(html: &str, tag: &tl::HTMLTag<'_>, name: &str) -> Option<(usize, usize)> {
    let base = html.as_ptr() as usize;
    let raw = tag.raw().as_bytes();
    let offset = (raw.as_ptr() as usize).checked_sub(base)?;
    if offset >= html.len() {
        return None;
    }
    let bytes = html.as_bytes();
    let start = if bytes[offset] == b'<' {
        offset
    } else if offset > 0 && bytes[offset - 1] == b'<' {
        offset - 1
    } else {
        return None;
    };
    let after = html.get(start + 1..start + 1 + name.len())?;
    if !after.eq_ignore_ascii_case(name) {
        return None;
    }
    Some((start, tag_end(html, start)?))
}

/// Offset just past the `>` closing the tag that opens at `start`, skipping
/// `>` characters inside quoted attribute values.
///
/// A quote only opens a value when it directly follows `=` (whitespace
/// aside); elsewhere it is an ordinary character, as in `alt=it's`.
pub fn tag_end(html: &str, start: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut prev = b'<';
    for (i, &b) in html.as_bytes().iter().enumerate().skip(start + 1) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') if prev == b'=' => quote = Some(b),
            (None, b'>') => return Some(i + 1),
            (None, _) => {}
        }
        if !b.is_ascii_whitespace() {
            prev = b;
        }
    }
    None
}

/// Decode the character references that commonly appear in attribute
/// values. Unknown references are left as written.
pub fn decode_entities(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let ch = match &rest[1..semi] {
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "lt" => Some('<'),
                "gt" => Some('>'),
                other => numeric_reference(other),
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// `#38` or `#x26` to the character it names.
fn numeric_reference(body: &str) -> Option<char> {
    let digits = body.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code).filter(|&c| c != '\0')
}

/// Escape a value for use inside a double-quoted attribute.
pub fn escape_attr(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '"', '<', '>']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
