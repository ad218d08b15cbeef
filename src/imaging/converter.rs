//! Converter trait and shared error type.
//!
//! A [`Converter`] runs one rendition pass: read the intermediate GIF,
//! downscale it, cap the palette, up-scale it, and write the result to
//! [`RenditionParams::output`]. A conversion calls it once per rendition.
//!
//! Two implementations ship with the crate:
//!
//! - [`GifsicleConverter`](super::gifsicle::GifsicleConverter): shells out to
//!   `gifsicle`, which also keeps animated GIFs animated.
//! - [`NativeConverter`](super::native::NativeConverter): pure Rust on top of
//!   the `image` crate; single frame, no external binary.

use super::params::RenditionParams;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("`{tool}` not found or not executable")]
    ToolNotFound { tool: String },
    #[error("`{tool}` exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("no output produced at {0}")]
    NoOutput(PathBuf),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Something that can render a rendition pass.
///
/// `Sync` so a single converter can sit behind a shared pipeline handle.
pub trait Converter: Send + Sync {
    /// Short name for logs and `check` output.
    fn name(&self) -> &str;

    /// Execute one rendition pass.
    fn render(&self, params: &RenditionParams) -> Result<(), ConvertError>;
}

impl<C: Converter + ?Sized> Converter for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn render(&self, params: &RenditionParams) -> Result<(), ConvertError> {
        (**self).render(params)
    }
}

impl<C: Converter + ?Sized> Converter for Arc<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn render(&self, params: &RenditionParams) -> Result<(), ConvertError> {
        (**self).render(params)
    }
}
