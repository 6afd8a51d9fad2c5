//! Fingerprint store for incremental WebP conversion.
//!
//! Encoding is the expensive part of a conversion run. This module remembers,
//! per source image, what the file looked like the last time it was encoded,
//! so a re-run can skip images that have not changed.
//!
//! # Design
//!
//! Each record is keyed by the resolved source path and holds the file's
//! `size`, modification time, SHA-256 content hash, and the
//! [`EncodeOptions`] it was encoded with.
//!
//! - **Stats first**: a matching `size` + `mtime` is trusted as "unchanged"
//!   without reading the file. Only when the stats differ is the content
//!   hashed, so touching a file (`git checkout`, copying the output directory)
//!   costs one hash but not an encode.
//! - **Options count**: a record encoded with different options is stale even
//!   when the file is untouched.
//!
//! The decision table itself lives in [`convert::plan`](crate::convert::plan);
//! this module only stores and persists records.
//!
//! ## Storage
//!
//! One pretty-printed JSON file (default `.cache/webp-picture.json`):
//!
//! ```json
//! {
//!   "version": 2,
//!   "files": {
//!     "/site/dist/img/hero.jpg": {
//!       "size": 48213,
//!       "mtime_ns": 1718000000000000000,
//!       "hash": "9f2c…",
//!       "options": { "quality": 82, "lossless": false }
//!     }
//!   }
//! }
//! ```
//!
//! A missing, unparsable, or wrong-version file loads as an empty store;
//! the next run is simply a cold start. The store is written only when
//! something changed, so an up-to-date run leaves the file (and its mtime)
//! alone.

use crate::imaging::EncodeOptions;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Version of the store format. Bump this to invalidate all existing stores
/// when the format or key computation changes.
const STORE_VERSION: u32 = 2;

/// Size and modification time of a file, as read from its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    /// Nanoseconds since the Unix epoch; 0 when the platform has no mtime.
    pub mtime_ns: u64,
}

impl FileStat {
    pub fn read(path: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Ok(Self {
            size: meta.len(),
            mtime_ns,
        })
    }
}

/// Last-known transcoding state of one source image.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FingerprintRecord {
    pub size: u64,
    pub mtime_ns: u64,
    pub hash: String,
    pub options: EncodeOptions,
}

impl FingerprintRecord {
    pub fn new(stat: FileStat, hash: String, options: EncodeOptions) -> Self {
        Self {
            size: stat.size,
            mtime_ns: stat.mtime_ns,
            hash,
            options,
        }
    }

    pub fn matches_stat(&self, stat: &FileStat) -> bool {
        self.size == stat.size && self.mtime_ns == stat.mtime_ns
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct StoreFile {
    version: u32,
    files: BTreeMap<String, FingerprintRecord>,
}

/// In-memory view of the fingerprint file for one conversion run.
#[derive(Debug)]
pub struct FingerprintStore {
    path: PathBuf,
    files: BTreeMap<String, FingerprintRecord>,
    dirty: bool,
}

impl FingerprintStore {
    /// Create an empty store that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            files: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load from `path`. Returns an empty store if the file doesn't exist
    /// or can't be parsed (version mismatch, corruption).
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(path),
        };
        let file: StoreFile = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "fingerprint store unreadable; starting cold");
                return Self::empty(path);
            }
        };
        if file.version != STORE_VERSION {
            return Self::empty(path);
        }
        Self {
            path,
            files: file.files,
            dirty: false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&FingerprintRecord> {
        self.files.get(key)
    }

    /// Record the state of a source image. Marks the store dirty.
    pub fn put(&mut self, key: String, record: FingerprintRecord) {
        self.files.insert(key, record);
        self.dirty = true;
    }

    /// Write the store to disk if anything changed since load or the last
    /// flush. Creates parent directories as needed. Returns whether a write
    /// happened.
    pub fn flush(&mut self) -> io::Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&StoreFile {
            version: STORE_VERSION,
            files: self.files.clone(),
        })?;
        std::fs::write(&self.path, json)?;
        self.dirty = false;
        Ok(true)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Key under which a source image is recorded: its canonical path when it
/// can be resolved, the path as given otherwise.
pub fn store_key(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
