//! Build-pipeline hooks.
//!
//! [`WebpPicturePlugin`] owns everything one project needs: its config, the
//! encoder provider and the preview cache. The host calls the hooks in
//! pipeline order:
//!
//! ```text
//! config_resolved      → command, root, out_dir
//! transform_index_html → every served or built HTML document
//! generate_bundle      → build: rewrite emitted .html assets
//! write_bundle         → build: convert images under out_dir
//! middleware           → serve: just-in-time .webp handler
//! ```
//!
//! With `apply_mode` set, every hook is a no-op under the other command.

use crate::cache::FingerprintStore;
use crate::config::{Command, PluginConfig};
use crate::convert::{ConvertConfig, ConvertError, ConvertEvent, ConvertReport, convert_tree};
use crate::imaging::{CapabilityProvider, PreviewCache, PreviewEngine};
use crate::interceptor::PreviewInterceptor;
use crate::markup::{RewriteOptions, rewrite_html};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;

/// Host settings handed to [`WebpPicturePlugin::config_resolved`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub command: Command,
    pub root: PathBuf,
    /// Build output directory; relative paths are taken from `root`.
    pub out_dir: PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            command: Command::Serve,
            root: PathBuf::from("."),
            out_dir: PathBuf::from("dist"),
        }
    }
}

/// One emitted file of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleAsset {
    pub file_name: String,
    pub source: String,
}

pub struct WebpPicturePlugin {
    config: PluginConfig,
    resolved: ResolvedConfig,
    provider: Arc<dyn CapabilityProvider>,
    preview_cache: Arc<PreviewCache>,
}

impl WebpPicturePlugin {
    pub fn new(config: PluginConfig, provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            config,
            resolved: ResolvedConfig::default(),
            provider,
            preview_cache: Arc::new(PreviewCache::new()),
        }
    }

    pub fn config_resolved(&mut self, resolved: ResolvedConfig) {
        tracing::debug!(
            command = ?resolved.command,
            root = %resolved.root.display(),
            out_dir = %resolved.out_dir.display(),
            "config resolved"
        );
        self.resolved = resolved;
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn resolved(&self) -> &ResolvedConfig {
        &self.resolved
    }

    /// Whether hooks run under the resolved command.
    pub fn is_active(&self) -> bool {
        self.config
            .apply_mode
            .is_none_or(|mode| mode == self.resolved.command)
    }

    fn is_building(&self) -> bool {
        self.resolved.command == Command::Build && self.is_active()
    }

    /// Rewrite settings for the resolved command, `None` when inactive.
    pub fn rewrite_options(&self) -> Option<RewriteOptions> {
        self.is_active().then_some(RewriteOptions {
            inject_webp_sources: true,
            skip_external: self.config.skip_external,
        })
    }

    /// Absolute output directory.
    pub fn out_dir(&self) -> PathBuf {
        resolve_against(&self.resolved.root, &self.resolved.out_dir)
    }

    /// Fingerprint store location.
    pub fn cache_path(&self) -> PathBuf {
        resolve_against(&self.resolved.root, Path::new(&self.config.cache_file))
    }

    pub fn transform_index_html<'a>(&self, html: &'a str) -> Cow<'a, str> {
        match self.rewrite_options() {
            Some(options) => rewrite_html(html, &options),
            None => Cow::Borrowed(html),
        }
    }

    /// Rewrite every `.html` asset. Returns how many were changed.
    pub fn generate_bundle(&self, assets: &mut [BundleAsset]) -> usize {
        if !self.is_building() {
            return 0;
        }
        let mut changed = 0;
        for asset in assets
            .iter_mut()
            .filter(|a| a.file_name.to_ascii_lowercase().ends_with(".html"))
        {
            let rewritten = match self.transform_index_html(&asset.source) {
                Cow::Owned(html) if html != asset.source => html,
                _ => continue,
            };
            tracing::debug!(file = %asset.file_name, "rewrote html asset");
            asset.source = rewritten;
            changed += 1;
        }
        changed
    }

    /// Convert images under the output directory after a build.
    pub fn write_bundle(&self, events: Option<Sender<ConvertEvent>>) -> Option<ConvertReport> {
        if !self.is_building() {
            return None;
        }
        match self.convert_output(events) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "webp conversion skipped");
                None
            }
        }
    }

    /// Run batch conversion over the output directory regardless of command.
    pub fn convert_output(
        &self,
        events: Option<Sender<ConvertEvent>>,
    ) -> Result<ConvertReport, ConvertError> {
        let mut store = FingerprintStore::load(self.cache_path());
        let config = ConvertConfig::from_plugin_config(&self.config);
        convert_tree(
            &self.out_dir(),
            &mut store,
            self.provider.as_ref(),
            &config,
            events,
        )
    }

    /// Just-in-time `.webp` handler for the dev server.
    pub fn middleware(&self) -> Option<PreviewInterceptor> {
        if !self.is_active() {
            return None;
        }
        let engine = PreviewEngine::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.preview_cache),
            self.config.encode.clone(),
        );
        Some(PreviewInterceptor::new(&self.resolved.root, engine))
    }
}

fn resolve_against(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
