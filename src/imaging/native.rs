//! Pure Rust converter: no external binary.
//!
//! ## Crate mapping
//!
//! | Stage | Crate / function |
//! |---|---|
//! | Decode intermediate | `ImageReader` with sniffed format (first frame only) |
//! | Downscale / up-scale | `DynamicImage::resize_exact`: `Nearest` for sample, `Triangle` for default |
//! | Quantize + encode | `image::codecs::gif::GifEncoder` (NeuQuant, 256 colors) |
//!
//! Output is deterministic for a given intermediate, which makes this the
//! converter of choice for tests. The GIF encoder always quantizes to a full
//! 256-entry palette; smaller `colors` caps are only honored by gifsicle.

use super::converter::{ConvertError, Converter};
use super::params::{RenditionParams, ResizeFilter};
use image::codecs::gif::GifEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Frame, ImageReader, ImageResult};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Quantizer speed handed to the GIF encoder (1 = best, 30 = fastest).
const GIF_SPEED: i32 = 10;

/// In-process converter built on the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeConverter;

impl NativeConverter {
    pub fn new() -> Self {
        Self
    }
}

fn filter_type(filter: ResizeFilter) -> FilterType {
    match filter {
        ResizeFilter::Sample => FilterType::Nearest,
        ResizeFilter::Default => FilterType::Triangle,
    }
}

/// Encode `img` as a single-frame GIF.
pub fn encode_gif<W: Write>(img: &DynamicImage, writer: W) -> ImageResult<()> {
    let mut encoder = GifEncoder::new_with_speed(writer, GIF_SPEED);
    encoder.encode_frame(Frame::new(img.to_rgba8()))
}

fn save_gif(img: &DynamicImage, path: &Path) -> Result<(), ConvertError> {
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    encode_gif(img, &mut writer)
        .map_err(|e| ConvertError::ProcessingFailed(format!("GIF encode failed: {}", e)))?;
    writer.flush()?;
    Ok(())
}

impl Converter for NativeConverter {
    fn name(&self) -> &str {
        "native"
    }

    fn render(&self, params: &RenditionParams) -> Result<(), ConvertError> {
        let img = ImageReader::open(&params.source)
            .and_then(|r| r.with_guessed_format())?
            .decode()
            .map_err(|e| {
                ConvertError::ProcessingFailed(format!(
                    "Failed to decode {}: {}",
                    params.source.display(),
                    e
                ))
            })?;

        let small = img.resize_exact(params.width, params.height, filter_type(params.downscale));
        let (out_w, out_h) = params.output_dimensions();
        let large = small.resize_exact(out_w, out_h, filter_type(params.upscale));

        save_gif(&large, &params.output)
    }
}
