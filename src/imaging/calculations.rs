//! Pure calculation functions for rendition geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::ResizeAxis;

/// Pick the axis the downscale target applies to.
///
/// Landscape sources resize by width; portrait and square sources by height.
pub fn resize_axis(source: (u32, u32)) -> ResizeAxis {
    let (w, h) = source;
    if w > h {
        ResizeAxis::Width
    } else {
        ResizeAxis::Height
    }
}

/// Calculate downscaled dimensions with the longer edge set to `target`.
///
/// The other edge keeps the source aspect ratio, rounded, and never drops
/// below one pixel.
///
/// # Examples
/// ```
/// # use pixboard::imaging::target_dimensions;
/// // 640x480 landscape → 64x48
/// assert_eq!(target_dimensions((640, 480), 64), (64, 48));
///
/// // 300x600 portrait → 32x64
/// assert_eq!(target_dimensions((300, 600), 64), (32, 64));
/// ```
pub fn target_dimensions(source: (u32, u32), target: u32) -> (u32, u32) {
    let (w, h) = source;
    match resize_axis(source) {
        ResizeAxis::Width => {
            let ratio = target as f64 / w as f64;
            (target, ((h as f64 * ratio).round() as u32).max(1))
        }
        ResizeAxis::Height => {
            let ratio = target as f64 / h.max(1) as f64;
            (((w as f64 * ratio).round() as u32).max(1), target)
        }
    }
}

/// Offset that recenters a rendition on the display grid.
///
/// When a fifth of the shorter edge is odd the image sits half a cell off, so
/// it is nudged along the shorter axis: vertically for landscape, horizontally
/// otherwise. Returns `(x, y)`.
pub fn centering_offset(dimensions: (u32, u32)) -> (f64, f64) {
    const NUDGE: f64 = -2.3;
    let (w, h) = dimensions;
    if (w.min(h) / 5) % 2 == 0 {
        return (0.0, 0.0);
    }
    if w > h { (0.0, NUDGE) } else { (NUDGE, 0.0) }
}
