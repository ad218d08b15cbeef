//! Image sources and their preparation for conversion.
//!
//! A source is validated before it is hashed: files are probed by content
//! (never by extension) for a known format and readable dimensions, byte
//! buffers are fully decoded. Anything that fails here never reaches the
//! cache.
//!
//! ## Canonical bytes
//!
//! | Source | Hashed bytes |
//! |---|---|
//! | File | raw file contents, streamed |
//! | Bytes / base64 | PNG encoding of the decoded first frame (RGBA8) |
//!
//! Re-encoding in-memory sources means two encodings of the same pixels share
//! one cache entry, the same way the clipboard path always saw a bitmap rather
//! than the bytes it came from.

use crate::cache::{CacheDir, ContentHash, hash_bytes, hash_file};
use crate::imaging::encode_gif;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::{self, BufReader, BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Prefix of intermediate GIFs written for non-GIF sources.
pub const SCRATCH_PREFIX: &str = ".scratch-";

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not a recognized image")]
    Unrecognized(PathBuf),
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("cannot write intermediate GIF: {0}")]
    Scratch(io::Error),
}

/// An image handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl ImageSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        ImageSource::Path(path.into())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        ImageSource::Bytes(bytes.into())
    }

    /// Decode a base64 payload (standard alphabet, padded). Surrounding
    /// whitespace is ignored.
    pub fn from_base64(text: &str) -> Result<Self, SourceError> {
        let bytes = STANDARD.decode(text.trim())?;
        Ok(ImageSource::Bytes(bytes))
    }

    /// Short human-readable label for logs.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(p) => p.display().to_string(),
            ImageSource::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }

    /// Validate and hash the source.
    pub fn prepare(&self) -> Result<PreparedSource, SourceError> {
        match self {
            ImageSource::Path(path) => prepare_file(path),
            ImageSource::Bytes(bytes) => prepare_bytes(bytes),
        }
    }
}

fn unreadable(path: &Path) -> impl FnOnce(io::Error) -> SourceError + '_ {
    move |source| SourceError::Unreadable {
        path: path.to_path_buf(),
        source,
    }
}

/// Open `path` with its format sniffed from the first bytes.
///
/// The reader carries no path hint, so the extension never decides the format.
fn probe(path: &Path) -> Result<ImageReader<BufReader<std::fs::File>>, SourceError> {
    std::fs::File::open(path)
        .and_then(|f| ImageReader::new(BufReader::new(f)).with_guessed_format())
        .map_err(unreadable(path))
}

fn prepare_file(path: &Path) -> Result<PreparedSource, SourceError> {
    let reader = probe(path)?;
    let format = reader
        .format()
        .ok_or_else(|| SourceError::Unrecognized(path.to_path_buf()))?;
    let dimensions = reader.into_dimensions()?;
    let hash = hash_file(path).map_err(unreadable(path))?;

    let body = if format == ImageFormat::Gif {
        SourceBody::Gif(path.to_path_buf())
    } else {
        SourceBody::File(path.to_path_buf())
    };

    Ok(PreparedSource {
        hash,
        dimensions,
        body,
    })
}

fn prepare_bytes(bytes: &[u8]) -> Result<PreparedSource, SourceError> {
    let img = DynamicImage::ImageRgba8(image::load_from_memory(bytes)?.to_rgba8());
    let mut canonical = Vec::new();
    img.write_to(&mut Cursor::new(&mut canonical), ImageFormat::Png)?;

    Ok(PreparedSource {
        hash: hash_bytes(&canonical),
        dimensions: (img.width(), img.height()),
        body: SourceBody::Decoded(img),
    })
}

/// Where the pixels of a prepared source live.
#[derive(Debug)]
pub enum SourceBody {
    /// GIF file, used as the intermediate as-is.
    Gif(PathBuf),
    /// File in another format; decoded again when an intermediate is needed.
    File(PathBuf),
    /// Already decoded in memory.
    Decoded(DynamicImage),
}

/// A validated source with its cache key.
#[derive(Debug)]
pub struct PreparedSource {
    pub hash: ContentHash,
    pub dimensions: (u32, u32),
    pub body: SourceBody,
}

impl PreparedSource {
    /// The GIF both rendition passes read.
    ///
    /// GIF files pass through untouched. Everything else is written as a
    /// single-frame GIF to a unique scratch file in the cache directory,
    /// deleted when the returned value drops.
    pub fn intermediate(&self, cache: &CacheDir) -> Result<Intermediate, SourceError> {
        let decoded;
        let img = match &self.body {
            SourceBody::Gif(path) => return Ok(Intermediate::Original(path.clone())),
            SourceBody::File(path) => {
                decoded = probe(path)?.decode()?;
                &decoded
            }
            SourceBody::Decoded(img) => img,
        };

        let scratch = cache
            .staging_file(SCRATCH_PREFIX)
            .map_err(SourceError::Scratch)?;
        let mut writer = BufWriter::new(scratch.as_file());
        encode_gif(img, &mut writer).map_err(|e| SourceError::Scratch(io::Error::other(e)))?;
        writer.flush().map_err(SourceError::Scratch)?;
        drop(writer);

        Ok(Intermediate::Scratch(scratch))
    }
}

/// Input GIF for the converter.
#[derive(Debug)]
pub enum Intermediate {
    Original(PathBuf),
    Scratch(NamedTempFile),
}

impl Intermediate {
    pub fn path(&self) -> &Path {
        match self {
            Intermediate::Original(p) => p,
            Intermediate::Scratch(f) => f.path(),
        }
    }
}
