//! Text insertions applied to an unmodified source string.

use std::borrow::Cow;

struct Insertion {
    at: usize,
    text: String,
}

/// Collects insertions at byte offsets of `source` and applies them in one
/// pass. Insertions at the same offset keep the order they were added in.
pub struct Splicer<'a> {
    source: &'a str,
    insertions: Vec<Insertion>,
}

impl<'a> Splicer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            insertions: Vec::new(),
        }
    }

    /// Queue `text` for insertion before byte `at`. Offsets outside the
    /// source or off a char boundary are ignored.
    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        if !self.source.is_char_boundary(at) {
            return;
        }
        self.insertions.push(Insertion {
            at,
            text: text.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty()
    }

    /// The source with every insertion applied; borrowed when there are none.
    pub fn finish(mut self) -> Cow<'a, str> {
        if self.insertions.is_empty() {
            return Cow::Borrowed(self.source);
        }
        // Stable sort keeps same-offset insertions in arrival order.
        self.insertions.sort_by_key(|i| i.at);
        let extra: usize = self.insertions.iter().map(|i| i.text.len()).sum();
        let mut out = String::with_capacity(self.source.len() + extra);
        let mut cursor = 0;
        for insertion in &self.insertions {
            out.push_str(&self.source[cursor..insertion.at]);
            out.push_str(&insertion.text);
            cursor = insertion.at;
        }
        out.push_str(&self.source[cursor..]);
        Cow::Owned(out)
    }
}
