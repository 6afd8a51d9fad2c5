//! Request handling as a chain of responsibility.
//!
//! Each [`Handler`] either answers a request or says why it did not, and the
//! [`Chain`] moves on to the next one. Falling through is ordinary control
//! flow: a handler that cannot find its input returns [`Outcome::NotFound`]
//! rather than an error response.
//!
//! The types here are transport-agnostic so handlers can be exercised
//! without a socket; [`serve`](crate::serve) adapts them to `tiny_http`.

/// The parts of an HTTP request a handler looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Upper-case method name (`GET`, `HEAD`, ...).
    pub method: String,
    /// Request target as sent: path plus optional query, still percent-encoded.
    pub url: String,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// The path without its query string.
    pub fn path(&self) -> &str {
        self.url.split(['?', '#']).next().unwrap_or("")
    }
}

/// A complete response produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub cache_control: Option<&'static str>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn ok(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            cache_control: None,
            body,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            content_type: "text/plain; charset=utf-8",
            cache_control: None,
            body: b"404 Not Found".to_vec(),
        }
    }

    pub fn with_cache_control(mut self, value: &'static str) -> Self {
        self.cache_control = Some(value);
        self
    }
}

/// What a handler did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Handled(Reply),
    /// The handler's capability is missing; try the next one.
    Unavailable,
    /// Nothing for this handler to serve; try the next one.
    NotFound,
}

pub trait Handler: Send + Sync {
    fn handle(&self, request: &RequestInfo) -> Outcome;
}

/// Ordered list of handlers; the first [`Outcome::Handled`] wins.
#[derive(Default)]
pub struct Chain {
    handlers: Vec<Box<dyn Handler>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl Handler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the chain. Falls back to a 404 when no handler answers.
    pub fn dispatch(&self, request: &RequestInfo) -> Reply {
        for handler in &self.handlers {
            match handler.handle(request) {
                Outcome::Handled(reply) => return reply,
                Outcome::Unavailable | Outcome::NotFound => continue,
            }
        }
        Reply::not_found()
    }
}
