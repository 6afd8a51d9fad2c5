//! Request-time transcoding for the development server.
//!
//! Preview mode never touches the output tree. It reads the original raster
//! file, encodes it in memory, and keeps the result in a small bounded cache
//! keyed by `(path, mtime, options)` so reloading a page does not re-encode
//! every image. Editing the source changes its mtime and therefore its key.
//!
//! Eviction is first-in-first-out by insertion: once more than
//! [`PREVIEW_CACHE_CAPACITY`] entries are held, the oldest insert goes.
//! Two requests racing on the same key both encode and the later insert wins;
//! output is deterministic, so which one wins does not matter.

use super::backend::{BackendError, Capability, CapabilityProvider};
use super::params::EncodeOptions;
use crate::cache::FileStat;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub const PREVIEW_CACHE_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewKey {
    pub path: PathBuf,
    pub mtime_ns: u64,
    pub options: EncodeOptions,
}

#[derive(Default)]
struct Entries {
    map: HashMap<PreviewKey, Arc<Vec<u8>>>,
    order: VecDeque<PreviewKey>,
}

/// Bounded in-memory map of encoded previews.
pub struct PreviewCache {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl PreviewCache {
    pub fn new() -> Self {
        Self::with_capacity(PREVIEW_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Entries::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // A panicking request thread must not take the cache down with it.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &PreviewKey) -> Option<Arc<Vec<u8>>> {
        self.lock().map.get(key).cloned()
    }

    pub fn insert(&self, key: PreviewKey, bytes: Arc<Vec<u8>>) {
        let mut entries = self.lock();
        if entries.map.insert(key.clone(), bytes).is_none() {
            entries.order.push_back(key);
        }
        while entries.map.len() > self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.map.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PreviewCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Preview-mode transcoding: provider + cache + the run's options.
#[derive(Clone)]
pub struct PreviewEngine {
    provider: Arc<dyn CapabilityProvider>,
    cache: Arc<PreviewCache>,
    options: EncodeOptions,
}

impl PreviewEngine {
    pub fn new(
        provider: Arc<dyn CapabilityProvider>,
        cache: Arc<PreviewCache>,
        options: EncodeOptions,
    ) -> Self {
        Self {
            provider,
            cache,
            options,
        }
    }

    /// Encode `source` to WebP bytes.
    ///
    /// Returns `Ok(None)` when no transcoder is available.
    pub fn transcode(&self, source: &Path) -> Result<Option<Arc<Vec<u8>>>, BackendError> {
        let transcoder = match self.provider.acquire() {
            Capability::Available(t) => t,
            Capability::Unavailable(reason) => {
                tracing::debug!(reason, "preview transcoding unavailable");
                return Ok(None);
            }
        };

        let stat = FileStat::read(source)?;
        let key = PreviewKey {
            path: source.to_path_buf(),
            mtime_ns: stat.mtime_ns,
            options: self.options.clone(),
        };
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Some(hit));
        }

        let raw = std::fs::read(source)?;
        let webp = Arc::new(transcoder.encode_bytes(&raw, &self.options)?);
        self.cache.insert(key, Arc::clone(&webp));
        Ok(Some(webp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MOCK_WEBP, MockBackend, RecordedOp};
    use crate::imaging::backend::{AlwaysAvailable, UnavailableProvider};

    fn key(name: &str, mtime_ns: u64) -> PreviewKey {
        PreviewKey {
            path: PathBuf::from(name),
            mtime_ns,
            options: EncodeOptions::default(),
        }
    }

    #[test]
    fn cache_evicts_oldest_insert() {
        let cache = PreviewCache::with_capacity(2);
        cache.insert(key("a", 1), Arc::new(vec![1]));
        cache.insert(key("b", 1), Arc::new(vec![2]));
        // Reading does not refresh position: this is FIFO, not LRU.
        assert!(cache.get(&key("a", 1)).is_some());
        cache.insert(key("c", 1), Arc::new(vec![3]));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a", 1)).is_none());
        assert!(cache.get(&key("b", 1)).is_some());
        assert!(cache.get(&key("c", 1)).is_some());
    }

    #[test]
    fn reinserting_same_key_replaces_value() {
        let cache = PreviewCache::with_capacity(2);
        cache.insert(key("a", 1), Arc::new(vec![1]));
        cache.insert(key("a", 1), Arc::new(vec![9]));
        assert_eq!(cache.len(), 1);
        assert_eq!(*cache.get(&key("a", 1)).unwrap(), vec![9]);
    }

    #[test]
    fn mtime_is_part_of_the_key() {
        let cache = PreviewCache::new();
        cache.insert(key("a", 1), Arc::new(vec![1]));
        assert!(cache.get(&key("a", 2)).is_none());
    }

    #[test]
    fn default_capacity_is_200() {
        let cache = PreviewCache::new();
        for i in 0..250 {
            cache.insert(key("img", i), Arc::new(Vec::new()));
        }
        assert_eq!(cache.len(), PREVIEW_CACHE_CAPACITY);
        assert!(cache.get(&key("img", 49)).is_none());
        assert!(cache.get(&key("img", 50)).is_some());
    }

    #[test]
    fn engine_encodes_once_per_key() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("a.png");
        std::fs::write(&source, b"fake png").unwrap();

        let provider = Arc::new(AlwaysAvailable(MockBackend::new()));
        let engine = PreviewEngine::new(
            provider.clone(),
            Arc::new(PreviewCache::new()),
            EncodeOptions::default(),
        );

        let first = engine.transcode(&source).unwrap().unwrap();
        let second = engine.transcode(&source).unwrap().unwrap();
        assert_eq!(first.as_slice(), MOCK_WEBP);
        assert_eq!(first, second);
        assert_eq!(
            provider.0.get_operations(),
            vec![RecordedOp::EncodeBytes {
                len: 8,
                quality: 82
            }]
        );
    }

    #[test]
    fn engine_without_capability_returns_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("a.png");
        std::fs::write(&source, b"fake png").unwrap();

        let engine = PreviewEngine::new(
            Arc::new(UnavailableProvider::new("off")),
            Arc::new(PreviewCache::new()),
            EncodeOptions::default(),
        );
        assert!(engine.transcode(&source).unwrap().is_none());
    }

    #[test]
    fn engine_missing_source_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let engine = PreviewEngine::new(
            Arc::new(AlwaysAvailable(MockBackend::new())),
            Arc::new(PreviewCache::new()),
            EncodeOptions::default(),
        );
        assert!(engine.transcode(&tmp.path().join("gone.png")).is_err());
    }
}
