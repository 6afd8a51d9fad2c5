//! Batch conversion of raster images to WebP.
//!
//! Runs after the bundler has written its output tree. Every PNG/JPEG under
//! the root gets a `.webp` twin next to it (`img/hero.jpg` → `img/hero.webp`),
//! the path the [markup rewriter](crate::markup) already pointed `<source>`
//! elements at.
//!
//! ## Incremental runs
//!
//! Each source is checked against the [fingerprint store](crate::cache) with
//! [`plan`]:
//!
//! | Situation | Action |
//! |---|---|
//! | no `.webp` on disk | hash, encode, record |
//! | no record | hash, encode, record |
//! | stats and options match | skip |
//! | stats match, options differ | hash, encode, record |
//! | stats differ | hash; encode if hash or options differ; record either way |
//!
//! ## Parallel Processing
//!
//! Jobs run on a dedicated [rayon](https://docs.rs/rayon) pool sized by
//! `concurrency`. Workers only read the store; their outcomes are collected
//! and folded into it in discovery order once the pool is done, and the store
//! is flushed once at the end.
//!
//! A failing image never stops the batch. Sources that vanish between
//! discovery and encoding are counted as missing; anything else is counted as
//! failed. Both are reported through [`ConvertEvent`]s.

use crate::cache::{FileStat, FingerprintRecord, FingerprintStore, hash_file, store_key};
use crate::config::PluginConfig;
use crate::imaging::{BackendError, Capability, CapabilityProvider, EncodeOptions, Transcoder};
use crate::urls::{ExtensionFilter, webp_output_path};
use rayon::prelude::*;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Settings for one conversion run.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    pub filter: ExtensionFilter,
    pub workers: usize,
    pub options: EncodeOptions,
    pub warn_on_missing_file: bool,
}

impl ConvertConfig {
    pub fn from_plugin_config(config: &PluginConfig) -> Self {
        Self {
            filter: ExtensionFilter::new(&config.include_ext),
            workers: config.effective_workers(),
            options: config.encode.clone(),
            warn_on_missing_file: config.warn_on_missing_file,
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self::from_plugin_config(&PluginConfig::default())
    }
}

/// Why a source was (re-)encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EncodeReason {
    NoOutput,
    NoRecord,
    OptionsChanged,
    ContentChanged,
}

impl EncodeReason {
    pub fn describe(self) -> &'static str {
        match self {
            EncodeReason::NoOutput => "no webp output",
            EncodeReason::NoRecord => "not in cache",
            EncodeReason::OptionsChanged => "options changed",
            EncodeReason::ContentChanged => "content changed",
        }
    }
}

/// Progress events streamed to the caller while a batch runs.
///
/// Paths are relative to the conversion root when possible.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvertEvent {
    Started { jobs: usize, workers: usize },
    Encoded { path: PathBuf, reason: EncodeReason },
    /// Stats changed but content and options did not; only the record moved.
    Refreshed { path: PathBuf },
    UpToDate { path: PathBuf },
    Missing { path: PathBuf },
    Failed { path: PathBuf, error: String },
    Unavailable { reason: String },
}

/// Summary of a conversion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConvertStats {
    pub encoded: u32,
    pub refreshed: u32,
    pub up_to_date: u32,
    pub missing: u32,
    pub failed: u32,
}

impl ConvertStats {
    pub fn total(&self) -> u32 {
        self.encoded + self.refreshed + self.up_to_date + self.missing + self.failed
    }
}

impl fmt::Display for ConvertStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self.up_to_date + self.refreshed;
        if cached > 0 {
            write!(
                f,
                "{} cached, {} encoded ({} total)",
                cached,
                self.encoded,
                self.total()
            )?;
        } else {
            write!(f, "{} encoded", self.encoded)?;
        }
        if self.missing > 0 {
            write!(f, ", {} missing", self.missing)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ConvertReport {
    pub jobs: usize,
    pub stats: ConvertStats,
    /// Whether the fingerprint store was written at the end of the run.
    pub store_written: bool,
}

/// Walk `root` and collect every file eligible for conversion, sorted.
///
/// A missing root yields no jobs.
pub fn discover_jobs(root: &Path, filter: &ExtensionFilter) -> Vec<PathBuf> {
    let mut jobs: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| filter.is_conversion_job(path))
        .collect();
    jobs.sort();
    jobs
}

/// What to do with one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Skip,
    Encode { reason: EncodeReason, hash: String },
    /// Record fresh stats without encoding.
    Refresh { hash: String },
}

/// Decide the action for a source from its previous record and live state.
///
/// `hash` is only called when the decision needs the content hash.
pub fn plan(
    prev: Option<&FingerprintRecord>,
    stat: &FileStat,
    output_exists: bool,
    options: &EncodeOptions,
    hash: impl FnOnce() -> io::Result<String>,
) -> io::Result<Action> {
    if !output_exists {
        return Ok(Action::Encode {
            reason: EncodeReason::NoOutput,
            hash: hash()?,
        });
    }
    let Some(prev) = prev else {
        return Ok(Action::Encode {
            reason: EncodeReason::NoRecord,
            hash: hash()?,
        });
    };
    let options_match = prev.options == *options;
    if prev.matches_stat(stat) {
        if options_match {
            return Ok(Action::Skip);
        }
        return Ok(Action::Encode {
            reason: EncodeReason::OptionsChanged,
            hash: hash()?,
        });
    }
    let hash = hash()?;
    if hash != prev.hash {
        Ok(Action::Encode {
            reason: EncodeReason::ContentChanged,
            hash,
        })
    } else if !options_match {
        Ok(Action::Encode {
            reason: EncodeReason::OptionsChanged,
            hash,
        })
    } else {
        Ok(Action::Refresh { hash })
    }
}

/// Result of one job, folded into the store after the pool joins.
enum JobOutcome {
    UpToDate,
    Recorded {
        key: String,
        record: FingerprintRecord,
        encoded: bool,
    },
    Missing,
    Failed,
}

/// Convert every eligible image under `root`.
///
/// Never fails because of an individual image; the only error is a worker
/// pool that cannot be started. When the provider has no transcoder the run
/// is a no-op and the store is left untouched.
pub fn convert_tree(
    root: &Path,
    store: &mut FingerprintStore,
    provider: &dyn CapabilityProvider,
    config: &ConvertConfig,
    events: Option<Sender<ConvertEvent>>,
) -> Result<ConvertReport, ConvertError> {
    let transcoder = match provider.acquire() {
        Capability::Available(t) => t,
        Capability::Unavailable(reason) => {
            tracing::warn!(reason, "webp encoder unavailable; skipping conversion");
            emit(&events, ConvertEvent::Unavailable {
                reason: reason.to_string(),
            });
            return Ok(ConvertReport::default());
        }
    };

    let jobs = discover_jobs(root, &config.filter);
    let workers = config.workers.max(1);
    emit(&events, ConvertEvent::Started {
        jobs: jobs.len(),
        workers,
    });

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()?;
    let snapshot: &FingerprintStore = store;
    let outcomes: Vec<JobOutcome> = pool.install(|| {
        jobs.par_iter()
            .map(|source| run_job(root, source, snapshot, transcoder, config, &events))
            .collect()
    });

    let mut stats = ConvertStats::default();
    for outcome in outcomes {
        match outcome {
            JobOutcome::UpToDate => stats.up_to_date += 1,
            JobOutcome::Recorded {
                key,
                record,
                encoded,
            } => {
                if encoded {
                    stats.encoded += 1;
                } else {
                    stats.refreshed += 1;
                }
                store.put(key, record);
            }
            JobOutcome::Missing => stats.missing += 1,
            JobOutcome::Failed => stats.failed += 1,
        }
    }

    let store_written = match store.flush() {
        Ok(written) => written,
        Err(e) => {
            tracing::warn!(path = %store.path().display(), error = %e, "failed to write fingerprint store");
            false
        }
    };

    Ok(ConvertReport {
        jobs: jobs.len(),
        stats,
        store_written,
    })
}

fn run_job(
    root: &Path,
    source: &Path,
    store: &FingerprintStore,
    transcoder: &dyn Transcoder,
    config: &ConvertConfig,
    events: &Option<Sender<ConvertEvent>>,
) -> JobOutcome {
    let display = source.strip_prefix(root).unwrap_or(source).to_path_buf();
    match convert_one(source, store, transcoder, &config.options) {
        Ok(Some((key, record, Some(reason)))) => {
            emit(events, ConvertEvent::Encoded {
                path: display,
                reason,
            });
            JobOutcome::Recorded {
                key,
                record,
                encoded: true,
            }
        }
        Ok(Some((key, record, None))) => {
            emit(events, ConvertEvent::Refreshed { path: display });
            JobOutcome::Recorded {
                key,
                record,
                encoded: false,
            }
        }
        Ok(None) => {
            emit(events, ConvertEvent::UpToDate { path: display });
            JobOutcome::UpToDate
        }
        Err(e) if e.is_not_found() => {
            tracing::debug!(path = %source.display(), "source vanished before conversion");
            if config.warn_on_missing_file {
                emit(events, ConvertEvent::Missing { path: display });
            }
            JobOutcome::Missing
        }
        Err(e) => {
            tracing::debug!(path = %source.display(), error = %e, "conversion failed");
            emit(events, ConvertEvent::Failed {
                path: display,
                error: e.to_string(),
            });
            JobOutcome::Failed
        }
    }
}

type Converted = (String, FingerprintRecord, Option<EncodeReason>);

/// Plan and execute one job. `Ok(None)` means the output is up to date.
fn convert_one(
    source: &Path,
    store: &FingerprintStore,
    transcoder: &dyn Transcoder,
    options: &EncodeOptions,
) -> Result<Option<Converted>, BackendError> {
    let stat = FileStat::read(source)?;
    let key = store_key(source);
    let output = webp_output_path(source);
    let action = plan(store.get(&key), &stat, output.exists(), options, || {
        hash_file(source)
    })?;

    match action {
        Action::Skip => Ok(None),
        Action::Refresh { hash } => Ok(Some((
            key,
            FingerprintRecord::new(stat, hash, options.clone()),
            None,
        ))),
        Action::Encode { reason, hash } => {
            transcoder.encode_file(source, &output, options)?;
            Ok(Some((
                key,
                FingerprintRecord::new(stat, hash, options.clone()),
                Some(reason),
            )))
        }
    }
}

fn emit(events: &Option<Sender<ConvertEvent>>, event: ConvertEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}
