//! Development server.
//!
//! A `tiny_http` listener feeding a [`Chain`] of handlers. The usual chain is
//! the [`PreviewInterceptor`](crate::interceptor::PreviewInterceptor) first,
//! then [`StaticFiles`], then the chain's own 404.
//!
//! Requests run on a small rayon pool so a slow transcode does not block
//! other requests.

use crate::chain::{Chain, Handler, Outcome, Reply, RequestInfo};
use crate::markup::{RewriteOptions, rewrite_html};
use percent_encoding::percent_decode_str;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tiny_http::{Header, Request, Response, Server, StatusCode};

const REQUEST_WORKERS: usize = 4;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Failed to bind {addr}: {message}")]
    Bind { addr: SocketAddr, message: String },
    #[error("Failed to start request pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub struct DevServer {
    server: Server,
    addr: SocketAddr,
    chain: Arc<Chain>,
}

impl DevServer {
    pub fn bind(addr: SocketAddr, chain: Chain) -> Result<Self, ServeError> {
        let server = Server::http(addr).map_err(|e| ServeError::Bind {
            addr,
            message: e.to_string(),
        })?;
        let addr = server.server_addr().to_ip().unwrap_or(addr);
        Ok(Self {
            server,
            addr,
            chain: Arc::new(chain),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until the listener shuts down.
    pub fn run(self) -> Result<(), ServeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(REQUEST_WORKERS)
            .build()?;

        for request in self.server.incoming_requests() {
            let chain = Arc::clone(&self.chain);
            pool.spawn(move || handle_request(request, &chain));
        }
        Ok(())
    }
}

fn handle_request(request: Request, chain: &Chain) {
    let info = RequestInfo::new(request.method().as_str(), request.url());
    let reply = chain.dispatch(&info);
    tracing::debug!(method = %info.method, url = %info.url, status = reply.status, "request");
    if let Err(e) = request.respond(to_response(reply)) {
        tracing::warn!(url = %info.url, error = %e, "failed to send response");
    }
}

fn to_response(reply: Reply) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = Response::from_data(reply.body).with_status_code(StatusCode(reply.status));
    if let Ok(header) = Header::from_bytes("Content-Type", reply.content_type) {
        response = response.with_header(header);
    }
    if let Some(value) = reply.cache_control
        && let Ok(header) = Header::from_bytes("Cache-Control", value)
    {
        response = response.with_header(header);
    }
    response
}

/// Serves files from the project root, then its `public/` directory.
///
/// Directories resolve to their `index.html`. HTML is passed through the
/// rewriter when `html_rewrite` is set.
pub struct StaticFiles {
    roots: Vec<PathBuf>,
    html_rewrite: Option<RewriteOptions>,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, html_rewrite: Option<RewriteOptions>) -> Self {
        let root = root.into();
        let public = root.join("public");
        Self {
            roots: vec![root, public],
            html_rewrite,
        }
    }

    fn resolve(&self, rel: &str) -> Option<PathBuf> {
        if Path::new(rel)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return None;
        }
        self.roots.iter().find_map(|base| {
            let path = base.join(rel);
            if path.is_file() {
                Some(path)
            } else if path.is_dir() {
                Some(path.join("index.html")).filter(|index| index.is_file())
            } else {
                None
            }
        })
    }
}

impl Handler for StaticFiles {
    fn handle(&self, request: &RequestInfo) -> Outcome {
        let method = request.method.to_ascii_uppercase();
        if method != "GET" && method != "HEAD" {
            return Outcome::NotFound;
        }
        let Ok(decoded) = percent_decode_str(request.path()).decode_utf8() else {
            return Outcome::NotFound;
        };
        let Some(path) = self.resolve(decoded.trim_start_matches('/')) else {
            return Outcome::NotFound;
        };
        let body = match std::fs::read(&path) {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "failed to read file");
                return Outcome::NotFound;
            }
        };

        let content_type = content_type(&path);
        let body = match (&self.html_rewrite, content_type == HTML) {
            (Some(options), true) => match String::from_utf8(body) {
                Ok(html) => rewrite_html(&html, options).into_owned().into_bytes(),
                Err(e) => e.into_bytes(),
            },
            _ => body,
        };
        Outcome::Handled(Reply::ok(content_type, body))
    }
}

const HTML: &str = "text/html; charset=utf-8";

/// Content type by file extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => HTML,
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "webmanifest" => "application/manifest+json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
