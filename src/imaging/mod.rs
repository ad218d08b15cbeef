//! Rendition imaging: planning passes and running them through a converter.
//!
//! | Operation | Implementation |
//! |---|---|
//! | **Geometry** | longer edge → target size, aspect preserved |
//! | **Nearest pass** | sample downscale → 256 colors → sample ×5 |
//! | **Smooth pass** | sample downscale → 256 colors → interpolated ×5 |
//! | **Execution** | `gifsicle` pipe or in-process `image` crate |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing a rendition pass
//! - **Converter**: [`Converter`] trait + [`GifsicleConverter`] and [`NativeConverter`]
//! - **Operations**: High-level functions combining calculations + converter

mod calculations;
pub mod converter;
pub mod gifsicle;
pub mod native;
pub mod operations;
mod params;

pub use calculations::{centering_offset, resize_axis, target_dimensions};
pub use converter::{ConvertError, Converter};
pub use gifsicle::GifsicleConverter;
pub use native::{NativeConverter, encode_gif};
pub use operations::{create_renditions, plan_rendition};
pub use params::{RenditionParams, RenditionSettings, ResizeAxis, ResizeFilter};
