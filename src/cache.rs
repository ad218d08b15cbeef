//! Content-addressed rendition cache.
//!
//! Every source image is identified by a [`ContentHash`] and converted at most
//! once. The two renditions produced by a conversion live side by side in a
//! single flat directory:
//!
//! ```text
//! $TMPDIR/pixboard/
//! ├── 3f2a…e1.gif                 # smooth rendition
//! ├── 3f2a…e1.gif.nearest.gif     # nearest-neighbor rendition
//! └── .staging-Xy12.gif           # in-flight output, renamed on success
//! ```
//!
//! ## Cache keys
//!
//! - **File sources**: SHA-256 of the raw file bytes, streamed in one pass so
//!   large files never sit in memory. File names and timestamps don't take
//!   part, so two copies of the same picture share one entry.
//! - **In-memory sources**: SHA-256 of the canonical PNG encoding of the
//!   decoded image (see [`crate::source`]).
//!
//! An entry is a hit when both rendition files exist. Entries are written once
//! and never modified; staging files are renamed into place only after both
//! renditions are complete, so a reader never observes a half-written entry.
//!
//! [`SeenHashes`] is the in-process shortcut in front of the disk check. It is
//! only ever appended to after an entry is fully on disk.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Suffix of the smooth (interpolated up-scale) rendition.
pub const SMOOTH_SUFFIX: &str = ".gif";

/// Suffix of the nearest-neighbor rendition.
pub const NEAREST_SUFFIX: &str = ".gif.nearest.gif";

/// Hex-encoded SHA-256 digest identifying a source image by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_digest(hasher: Sha256) -> Self {
        Self(format!("{:x}", hasher.finalize()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 of a file's contents, streamed through a buffered reader.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
    let mut reader = BufReader::new(fs::File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(ContentHash::from_digest(hasher))
}

/// SHA-256 of an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentHash::from_digest(hasher)
}

/// Which of the two cached bitmaps a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rendition {
    /// Sample-filter up-scale: hard pixel edges.
    Nearest,
    /// Default (interpolating) up-scale.
    Smooth,
}

impl Rendition {
    /// Both renditions, in the order a conversion produces them.
    pub const ALL: [Rendition; 2] = [Rendition::Nearest, Rendition::Smooth];

    pub fn from_nearest(nearest: bool) -> Self {
        if nearest {
            Rendition::Nearest
        } else {
            Rendition::Smooth
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Rendition::Nearest => NEAREST_SUFFIX,
            Rendition::Smooth => SMOOTH_SUFFIX,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Rendition::Nearest => Rendition::Smooth,
            Rendition::Smooth => Rendition::Nearest,
        }
    }
}

impl fmt::Display for Rendition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rendition::Nearest => f.write_str("nearest"),
            Rendition::Smooth => f.write_str("smooth"),
        }
    }
}

/// Hashes converted during this run.
///
/// Append-only apart from [`SeenHashes::clear`], which mirrors a cache clear.
#[derive(Debug, Default)]
pub struct SeenHashes {
    hashes: HashSet<ContentHash>,
}

impl SeenHashes {
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.hashes.contains(hash)
    }

    pub fn insert(&mut self, hash: ContentHash) {
        self.hashes.insert(hash);
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// The on-disk cache directory.
#[derive(Debug, Clone)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    /// Open (creating if needed) the cache directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// `{tempRoot}/{namespace}`.
    pub fn default_location(namespace: &str) -> PathBuf {
        std::env::temp_dir().join(namespace)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Canonical path of one rendition of `hash`.
    pub fn rendition_path(&self, hash: &ContentHash, rendition: Rendition) -> PathBuf {
        self.root
            .join(format!("{}{}", hash.as_str(), rendition.suffix()))
    }

    /// True when both renditions of `hash` are on disk.
    pub fn entry_exists(&self, hash: &ContentHash) -> bool {
        Rendition::ALL
            .iter()
            .all(|r| self.rendition_path(hash, *r).is_file())
    }

    /// A uniquely named, auto-deleting file inside the cache directory.
    ///
    /// Living in the same directory as the final entry keeps
    /// [`NamedTempFile::persist`] a same-filesystem rename.
    pub fn staging_file(&self, prefix: &str) -> io::Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(prefix)
            .suffix(SMOOTH_SUFFIX)
            .tempfile_in(&self.root)
    }

    /// Delete everything in the cache directory. Returns the number of
    /// entries removed; the directory itself is kept.
    pub fn clear(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            removed += 1;
        }
        Ok(removed)
    }
}

/// Summary of cache behavior for one pipeline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u32,
    pub conversions: u32,
    pub failures: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn conversion(&mut self) {
        self.conversions += 1;
    }

    pub fn failure(&mut self) {
        self.failures += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.conversions + self.failures
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures > 0 {
            write!(
                f,
                "{} cached, {} converted, {} failed ({} total)",
                self.hits,
                self.conversions,
                self.failures,
                self.total()
            )
        } else if self.hits > 0 {
            write!(
                f,
                "{} cached, {} converted ({} total)",
                self.hits,
                self.conversions,
                self.total()
            )
        } else {
            write!(f, "{} converted", self.conversions)
        }
    }
}
