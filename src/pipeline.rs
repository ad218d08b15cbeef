//! The cache pipeline: hash, look up, convert on miss.
//!
//! ```text
//! ImageSource ──prepare──▶ ContentHash ──seen / on disk?──▶ path      (hit)
//!                                │
//!                                └──▶ in-flight guard ──▶ intermediate GIF
//!                                         ──▶ nearest pass ──▶ smooth pass
//!                                         ──▶ rename both ──▶ mark seen ──▶ path
//! ```
//!
//! ## Single flight
//!
//! At most one conversion runs per pipeline. [`CachePipeline::resolve`] waits
//! for a running conversion and re-checks the cache once it gets the guard,
//! since the conversion it waited on may have produced the entry it wants.
//! [`CachePipeline::try_resolve`] gives up with [`PipelineError::Busy`]
//! instead. Cache hits never touch the guard.
//!
//! The guard is a `MutexGuard`, so it is released on every exit path,
//! including a panicking converter. Poisoned locks are recovered rather than
//! propagated: every piece of state they protect is valid after any partial
//! update.

use crate::cache::{CacheDir, CacheStats, ContentHash, Rendition, SeenHashes};
use crate::config::{AppConfig, Backend};
use crate::imaging::{
    ConvertError, Converter, GifsicleConverter, NativeConverter, RenditionSettings,
    create_renditions,
};
use crate::source::{ImageSource, PreparedSource, SourceError};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot decode source: {0}")]
    Decode(#[source] SourceError),
    #[error("conversion failed: {0}")]
    Conversion(#[source] ConvertError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("a conversion is already in flight")]
    Busy,
    #[error("conversion worker stopped before reporting a result")]
    Disconnected,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Errors the caller cannot recover from by falling back to the
    /// previous image.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}

impl From<ConvertError> for PipelineError {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::ToolNotFound { .. } => PipelineError::Configuration(err.to_string()),
            other => PipelineError::Conversion(other),
        }
    }
}

impl From<SourceError> for PipelineError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Scratch(e) => PipelineError::Conversion(ConvertError::Io(e)),
            other => PipelineError::Decode(other),
        }
    }
}

/// Whether a resolve was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Cached,
    Converted,
}

/// A successfully resolved rendition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub hash: ContentHash,
    pub rendition: Rendition,
    pub path: PathBuf,
    pub outcome: Outcome,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Content-addressed cache in front of a [`Converter`].
///
/// Built once and shared behind an `Arc`; every method takes `&self`.
pub struct CachePipeline<C = Box<dyn Converter>> {
    cache: CacheDir,
    converter: C,
    settings: RenditionSettings,
    seen: Mutex<SeenHashes>,
    in_flight: Mutex<()>,
    stats: Mutex<CacheStats>,
}

impl CachePipeline {
    /// Build the pipeline described by `config`.
    ///
    /// Fails with [`PipelineError::Configuration`] when the cache directory
    /// cannot be created or the external tool is missing.
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let location = config.cache.location();
        let cache = CacheDir::open(&location).map_err(|e| {
            PipelineError::Configuration(format!(
                "cannot create cache directory {}: {e}",
                location.display()
            ))
        })?;

        if config.cache.clear_on_start {
            let removed = cache.clear().map_err(|e| {
                PipelineError::Configuration(format!(
                    "cannot clear cache directory {}: {e}",
                    location.display()
                ))
            })?;
            debug!("Cleared {} cache entries at startup", removed);
        }

        let converter: Box<dyn Converter> = match config.convert.backend {
            Backend::Gifsicle => Box::new(GifsicleConverter::new(
                &config.convert.tool,
                config.convert.timeout(),
            )?),
            Backend::Native => Box::new(NativeConverter::new()),
        };
        debug!(
            "Pipeline ready: {} converter, cache at {}",
            converter.name(),
            cache.path().display()
        );

        Ok(Self::new(cache, converter, config.convert.settings()))
    }
}

impl<C: Converter> CachePipeline<C> {
    pub fn new(cache: CacheDir, converter: C, settings: RenditionSettings) -> Self {
        Self {
            cache,
            converter,
            settings,
            seen: Mutex::new(SeenHashes::default()),
            in_flight: Mutex::new(()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn cache(&self) -> &CacheDir {
        &self.cache
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    pub fn settings(&self) -> &RenditionSettings {
        &self.settings
    }

    pub fn stats(&self) -> CacheStats {
        *lock(&self.stats)
    }

    /// Number of hashes converted since start or the last clear.
    pub fn seen_count(&self) -> usize {
        lock(&self.seen).len()
    }

    /// True when `hash` was converted this run or both renditions are on disk.
    pub fn is_cached(&self, hash: &ContentHash) -> bool {
        lock(&self.seen).contains(hash) || self.cache.entry_exists(hash)
    }

    /// Resolve `source` to the path of `rendition`, converting on a miss.
    ///
    /// Blocks while another conversion is in flight.
    pub fn resolve(
        &self,
        source: &ImageSource,
        rendition: Rendition,
    ) -> Result<Resolved, PipelineError> {
        self.record(source, || {
            let prepared = source.prepare()?;
            if let Some(hit) = self.lookup(&prepared.hash, rendition) {
                return Ok(hit);
            }

            let _guard = lock(&self.in_flight);
            if let Some(hit) = self.lookup(&prepared.hash, rendition) {
                return Ok(hit);
            }
            self.convert(source, &prepared, rendition)
        })
    }

    /// Like [`resolve`](Self::resolve), but returns [`PipelineError::Busy`]
    /// instead of waiting when a conversion is already in flight.
    pub fn try_resolve(
        &self,
        source: &ImageSource,
        rendition: Rendition,
    ) -> Result<Resolved, PipelineError> {
        let prepared = source.prepare().map_err(|e| self.failed(source, e.into()))?;
        if let Some(hit) = self.lookup(&prepared.hash, rendition) {
            return Ok(hit);
        }

        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Dropping {}: conversion in flight", source.describe());
                return Err(PipelineError::Busy);
            }
        };
        self.record(source, || {
            if let Some(hit) = self.lookup(&prepared.hash, rendition) {
                return Ok(hit);
            }
            self.convert(source, &prepared, rendition)
        })
    }

    /// Delete every cache entry and forget every seen hash.
    ///
    /// Waits for an in-flight conversion so it never races a rename.
    pub fn clear_cache(&self) -> Result<usize, PipelineError> {
        let _guard = lock(&self.in_flight);
        let removed = self.cache.clear()?;
        lock(&self.seen).clear();
        info!(
            "Cleared {} entries from {}",
            removed,
            self.cache.path().display()
        );
        Ok(removed)
    }

    fn lookup(&self, hash: &ContentHash, rendition: Rendition) -> Option<Resolved> {
        if !self.is_cached(hash) {
            return None;
        }
        debug!("Cache hit: {} ({})", hash, rendition);
        lock(&self.stats).hit();
        Some(Resolved {
            hash: hash.clone(),
            rendition,
            path: self.cache.rendition_path(hash, rendition),
            outcome: Outcome::Cached,
        })
    }

    fn convert(
        &self,
        source: &ImageSource,
        prepared: &PreparedSource,
        rendition: Rendition,
    ) -> Result<Resolved, PipelineError> {
        let (w, h) = prepared.dimensions;
        info!(
            "Converting {} ({}x{}) with {}",
            source.describe(),
            w,
            h,
            self.converter.name()
        );

        let intermediate = prepared.intermediate(&self.cache)?;
        create_renditions(
            &self.converter,
            &self.cache,
            &prepared.hash,
            intermediate.path(),
            prepared.dimensions,
            &self.settings,
        )?;

        lock(&self.seen).insert(prepared.hash.clone());
        lock(&self.stats).conversion();
        Ok(Resolved {
            hash: prepared.hash.clone(),
            rendition,
            path: self.cache.rendition_path(&prepared.hash, rendition),
            outcome: Outcome::Converted,
        })
    }

    fn record(
        &self,
        source: &ImageSource,
        run: impl FnOnce() -> Result<Resolved, PipelineError>,
    ) -> Result<Resolved, PipelineError> {
        run().map_err(|e| self.failed(source, e))
    }

    fn failed(&self, source: &ImageSource, err: PipelineError) -> PipelineError {
        lock(&self.stats).failure();
        warn!("{}: {}", source.describe(), err);
        err
    }
}
