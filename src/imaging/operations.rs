//! High-level rendition operations.
//!
//! These functions combine calculations with converter execution. They decide
//! which passes a conversion needs, run them against staging files and move
//! the results into the cache only when every pass succeeded.

use super::calculations::{resize_axis, target_dimensions};
use super::converter::{ConvertError, Converter};
use super::params::{RenditionParams, RenditionSettings, ResizeFilter};
use crate::cache::{CacheDir, ContentHash, Rendition};
use std::path::{Path, PathBuf};

/// Result type for rendition operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Prefix of in-flight output files inside the cache directory.
pub const STAGING_PREFIX: &str = ".staging-";

/// Plan one rendition pass without executing it.
///
/// Both renditions downscale with the sample filter; they differ only in the
/// final up-scale.
pub fn plan_rendition(
    source: &Path,
    output: &Path,
    source_dims: (u32, u32),
    rendition: Rendition,
    settings: &RenditionSettings,
) -> RenditionParams {
    let (width, height) = target_dimensions(source_dims, settings.target_size);
    let upscale = match rendition {
        Rendition::Nearest => ResizeFilter::Sample,
        Rendition::Smooth => ResizeFilter::Default,
    };

    RenditionParams {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        axis: resize_axis(source_dims),
        width,
        height,
        colors: settings.colors,
        scale: settings.scale,
        downscale: ResizeFilter::Sample,
        upscale,
    }
}

/// Render both renditions of `hash` into the cache.
///
/// Each pass writes a uniquely named staging file next to the final entry.
/// Staging files are renamed into place after *both* passes produced
/// non-empty output; on any failure they are deleted. If a rename fails,
/// renditions already published by this call are removed again, so a failed
/// call never leaves a new half entry behind.
pub fn create_renditions(
    converter: &impl Converter,
    cache: &CacheDir,
    hash: &ContentHash,
    intermediate: &Path,
    source_dims: (u32, u32),
    settings: &RenditionSettings,
) -> Result<()> {
    let mut staged = Vec::with_capacity(Rendition::ALL.len());

    for rendition in Rendition::ALL {
        let staging = cache.staging_file(STAGING_PREFIX)?;
        let params = plan_rendition(
            intermediate,
            staging.path(),
            source_dims,
            rendition,
            settings,
        );
        converter.render(&params)?;

        let written = std::fs::metadata(staging.path())
            .map(|m| m.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(ConvertError::NoOutput(cache.rendition_path(hash, rendition)));
        }
        staged.push((rendition, staging));
    }

    let mut published: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for (rendition, staging) in staged {
        let path = cache.rendition_path(hash, rendition);
        if let Err(e) = staging.persist(&path) {
            for done in &published {
                let _ = std::fs::remove_file(done);
            }
            return Err(ConvertError::Io(e.error));
        }
        published.push(path);
    }

    Ok(())
}
