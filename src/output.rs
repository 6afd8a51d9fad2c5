//! CLI output formatting.
//!
//! Every command has a `format_*` function returning `Vec<String>` and, where
//! the CLI prints it in one go, a `print_*` wrapper. Format functions are
//! pure so the layout can be asserted in tests.
//!
//! # Output Format
//!
//! ## Convert
//!
//! ```text
//! Converting 4 images (8 workers)
//!     img/hero.jpg: encoded (no webp output)
//!     img/logo.png: cached
//!     img/old.png: missing
//!     img/bad.jpg: failed
//!         Error: Processing failed: decode error
//! ```
//!
//! followed by the [`ConvertStats`](crate::convert::ConvertStats) summary.
//!
//! ## Rewrite
//!
//! ```text
//! Rewritten
//!     index.html
//!     blog/index.html
//! 2 rewritten, 1 unchanged
//! ```

use crate::convert::ConvertEvent;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Convert
// ============================================================================

/// Format a single conversion event as display lines.
pub fn format_convert_event(event: &ConvertEvent) -> Vec<String> {
    match event {
        ConvertEvent::Started { jobs, workers } => vec![format!(
            "Converting {} ({})",
            plural(*jobs, "image", "images"),
            plural(*workers, "worker", "workers")
        )],
        ConvertEvent::Encoded { path, reason } => vec![format!(
            "{}{}: encoded ({})",
            indent(1),
            path.display(),
            reason.describe()
        )],
        ConvertEvent::Refreshed { path } => {
            vec![format!("{}{}: refreshed", indent(1), path.display())]
        }
        ConvertEvent::UpToDate { path } => {
            vec![format!("{}{}: cached", indent(1), path.display())]
        }
        ConvertEvent::Missing { path } => {
            vec![format!("{}{}: missing", indent(1), path.display())]
        }
        ConvertEvent::Failed { path, error } => vec![
            format!("{}{}: failed", indent(1), path.display()),
            format!("{}Error: {}", indent(2), error),
        ],
        ConvertEvent::Unavailable { reason } => {
            vec![format!("WebP encoder unavailable ({reason}); nothing converted")]
        }
    }
}

// ============================================================================
// Rewrite
// ============================================================================

/// Format the result of rewriting HTML files.
///
/// `changed` paths are shown relative to `root` when they live under it.
pub fn format_rewrite_output(changed: &[PathBuf], unchanged: usize, root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    if !changed.is_empty() {
        lines.push("Rewritten".to_string());
        for path in changed {
            let shown = path.strip_prefix(root).unwrap_or(path);
            lines.push(format!("{}{}", indent(1), shown.display()));
        }
    }
    lines.push(format!("{} rewritten, {} unchanged", changed.len(), unchanged));
    lines
}

pub fn print_rewrite_output(changed: &[PathBuf], unchanged: usize, root: &Path) {
    for line in format_rewrite_output(changed, unchanged, root) {
        println!("{}", line);
    }
}

// ============================================================================
// Serve
// ============================================================================

/// Startup banner for the development server.
pub fn format_serve_banner(addr: SocketAddr, root: &Path, preview: bool) -> Vec<String> {
    vec![
        format!("Serving {} at http://{}/", root.display(), addr),
        format!(
            "{}WebP preview: {}",
            indent(1),
            if preview { "on" } else { "off" }
        ),
    ]
}

pub fn print_serve_banner(addr: SocketAddr, root: &Path, preview: bool) {
    for line in format_serve_banner(addr, root, preview) {
        println!("{}", line);
    }
}
