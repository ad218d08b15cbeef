//! Parameter types for rendition passes.
//!
//! These structs describe *what* a pass produces, not *how*. They are the
//! interface between [`operations`](super::operations), which decides which
//! renditions a conversion needs, and a [`Converter`](super::Converter), which
//! does the pixel work (in-process or by shelling out). The split lets tests
//! swap in a recording converter without touching the planning logic.
//!
//! ## Types
//!
//! - [`ResizeFilter`]: sample (blocky) or the tool's default interpolation.
//! - [`ResizeAxis`]: which edge the downscale target applies to.
//! - [`RenditionSettings`]: target size, palette cap and up-scale factor shared by both passes.
//! - [`RenditionParams`]: full specification of one pass: input, output, sizes and filters.

use std::path::PathBuf;

/// Resampling used by a resize stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeFilter {
    /// Nearest-neighbor sampling: no interpolation, hard pixel edges.
    Sample,
    /// Whatever the converter uses by default; always interpolating.
    Default,
}

/// The edge a downscale target is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAxis {
    Width,
    Height,
}

impl ResizeAxis {
    /// Name used in `--resize-{width,height}`.
    pub fn as_str(self) -> &'static str {
        match self {
            ResizeAxis::Width => "width",
            ResizeAxis::Height => "height",
        }
    }
}

/// Settings shared by both passes of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenditionSettings {
    /// Length of the longer edge after the downscale stage.
    pub target_size: u32,
    /// Palette cap applied after the downscale stage.
    pub colors: u16,
    /// Integer up-scale factor of the final stage.
    pub scale: u32,
}

impl Default for RenditionSettings {
    fn default() -> Self {
        Self {
            target_size: 64,
            colors: 256,
            scale: 5,
        }
    }
}

/// One rendition pass: downscale, quantize, up-scale.
#[derive(Debug, Clone, PartialEq)]
pub struct RenditionParams {
    /// Intermediate GIF read by the pass.
    pub source: PathBuf,
    /// Where the finished GIF is written.
    pub output: PathBuf,
    pub axis: ResizeAxis,
    /// Downscaled dimensions (the longer edge equals `target_size`).
    pub width: u32,
    pub height: u32,
    pub colors: u16,
    pub scale: u32,
    pub downscale: ResizeFilter,
    pub upscale: ResizeFilter,
}

impl RenditionParams {
    /// The edge length the downscale stage targets.
    pub fn target(&self) -> u32 {
        match self.axis {
            ResizeAxis::Width => self.width,
            ResizeAxis::Height => self.height,
        }
    }

    /// Dimensions of the finished rendition.
    pub fn output_dimensions(&self) -> (u32, u32) {
        (self.width * self.scale, self.height * self.scale)
    }
}
