//! End-to-end tests of the cache pipeline through the public API.
//!
//! Most tests use a call-counting converter that writes placeholder bytes, so
//! they exercise hashing, lookup, single flight and publishing without any
//! image work. `native_*` tests run the real in-process converter and check
//! the GIFs it produces.

use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use pixboard::cache::{CacheDir, Rendition};
use pixboard::display::{DisplayMode, DisplayState, Presented};
use pixboard::imaging::{
    ConvertError, Converter, NativeConverter, RenditionParams, RenditionSettings,
};
use pixboard::pipeline::{CachePipeline, Outcome, PipelineError};
use pixboard::source::ImageSource;
use pixboard::worker::Worker;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Counts invocations and the peak number running at once.
#[derive(Default)]
struct CountingConverter {
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
    fail: bool,
}

impl CountingConverter {
    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Converter for CountingConverter {
    fn name(&self) -> &str {
        "counting"
    }

    fn render(&self, params: &RenditionParams) -> Result<(), ConvertError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);

        let result = if self.fail {
            Err(ConvertError::Failed {
                tool: "counting".into(),
                status: "exit status: 1".into(),
                stderr: "boom".into(),
            })
        } else {
            std::fs::write(&params.output, b"GIF89a").map_err(ConvertError::from)
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn test_image(width: u32, height: u32, seed: u8) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([seed, (x * 3 % 256) as u8, (y * 5 % 256) as u8, 255])
    }))
}

fn write_image(path: &Path, img: &DynamicImage, format: ImageFormat) {
    img.save_with_format(path, format).unwrap();
}

fn png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn pipeline<C: Converter>(tmp: &TempDir, converter: C) -> CachePipeline<C> {
    let cache = CacheDir::open(tmp.path().join("cache")).unwrap();
    CachePipeline::new(cache, converter, RenditionSettings::default())
}

fn cache_files(p: &CachePipeline<impl Converter>) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(p.cache().path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =========================================================================
// Determinism and idempotence
// =========================================================================

#[test]
fn identical_files_share_hash_and_paths() {
    let tmp = TempDir::new().unwrap();
    let img = test_image(100, 60, 1);
    let a = tmp.path().join("first.png");
    let b = tmp.path().join("renamed-copy.png");
    write_image(&a, &img, ImageFormat::Png);
    std::fs::copy(&a, &b).unwrap();

    let p = pipeline(&tmp, CountingConverter::default());
    let ra = p.resolve(&ImageSource::from_path(&a), Rendition::Nearest).unwrap();
    let rb = p.resolve(&ImageSource::from_path(&b), Rendition::Nearest).unwrap();

    assert_eq!(ra.hash, rb.hash);
    assert_eq!(ra.path, rb.path);
    assert_eq!(ra.outcome, Outcome::Converted);
    assert_eq!(rb.outcome, Outcome::Cached);
    assert_eq!(p.converter().calls(), 2);
}

#[test]
fn second_resolve_is_pure_cache_hit() {
    let tmp = TempDir::new().unwrap();
    let source = ImageSource::from_bytes(png_bytes(&test_image(32, 32, 2)));
    let p = pipeline(&tmp, CountingConverter::default());

    p.resolve(&source, Rendition::Nearest).unwrap();
    let before = cache_files(&p);
    let again = p.resolve(&source, Rendition::Smooth).unwrap();

    assert_eq!(again.outcome, Outcome::Cached);
    assert_eq!(p.converter().calls(), 2);
    assert_eq!(cache_files(&p), before);
    assert_eq!(before.len(), 2);
}

#[test]
fn entries_survive_a_new_pipeline() {
    let tmp = TempDir::new().unwrap();
    let source = ImageSource::from_bytes(png_bytes(&test_image(32, 32, 3)));

    pipeline(&tmp, CountingConverter::default())
        .resolve(&source, Rendition::Nearest)
        .unwrap();

    let restarted = pipeline(&tmp, CountingConverter::default());
    let resolved = restarted.resolve(&source, Rendition::Nearest).unwrap();
    assert_eq!(resolved.outcome, Outcome::Cached);
    assert_eq!(restarted.converter().calls(), 0);
}

#[test]
fn half_entry_is_reconverted() {
    let tmp = TempDir::new().unwrap();
    let source = ImageSource::from_bytes(png_bytes(&test_image(32, 32, 4)));
    let p = pipeline(&tmp, CountingConverter::default());
    let first = p.resolve(&source, Rendition::Nearest).unwrap();

    // A fresh process sees only the smooth file.
    std::fs::remove_file(&first.path).unwrap();
    let restarted = pipeline(&tmp, CountingConverter::default());
    let resolved = restarted.resolve(&source, Rendition::Nearest).unwrap();

    assert_eq!(resolved.outcome, Outcome::Converted);
    assert!(resolved.path.exists());
}

// =========================================================================
// Invalid input and failures
// =========================================================================

#[test]
fn invalid_bytes_leave_cache_and_display_untouched() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(&tmp, CountingConverter::default());
    let good = p
        .resolve(
            &ImageSource::from_bytes(png_bytes(&test_image(20, 20, 5))),
            Rendition::Nearest,
        )
        .unwrap();
    let mut display = DisplayState::new(DisplayMode::Led, Rendition::Nearest);
    display.present(Ok(good.clone()));
    let files = cache_files(&p);

    let result = p.resolve(
        &ImageSource::from_bytes(b"<html>not an image</html>".to_vec()),
        Rendition::Nearest,
    );
    assert!(matches!(result, Err(PipelineError::Decode(_))));

    let presented = display.present(result);
    assert!(matches!(presented, Presented::Restored { .. }));
    assert_eq!(display.current(), Some(good.path.as_path()));
    assert_eq!(cache_files(&p), files);
    assert_eq!(p.converter().calls(), 2);
}

#[test]
fn text_file_with_image_extension_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("fake.gif");
    std::fs::write(&path, "plain text").unwrap();
    let p = pipeline(&tmp, CountingConverter::default());

    let err = p
        .resolve(&ImageSource::from_path(&path), Rendition::Smooth)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Decode(_)));
    assert!(!err.is_fatal());
}

#[test]
fn failed_conversion_leaves_no_files() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(&tmp, CountingConverter::failing());

    let err = p
        .resolve(
            &ImageSource::from_bytes(png_bytes(&test_image(20, 20, 6))),
            Rendition::Nearest,
        )
        .unwrap_err();

    assert!(matches!(err, PipelineError::Conversion(_)));
    assert!(cache_files(&p).is_empty());
    assert_eq!(p.stats().failures, 1);
}

// =========================================================================
// Single flight
// =========================================================================

#[test]
fn concurrent_resolves_never_overlap_conversions() {
    let tmp = TempDir::new().unwrap();
    let p = Arc::new(pipeline(
        &tmp,
        CountingConverter::slow(Duration::from_millis(30)),
    ));

    let handles: Vec<_> = (0..4u8)
        .map(|seed| {
            let p = Arc::clone(&p);
            let source = ImageSource::from_bytes(png_bytes(&test_image(16, 16, seed)));
            std::thread::spawn(move || p.resolve(&source, Rendition::Nearest).unwrap())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap().outcome, Outcome::Converted);
    }

    assert_eq!(p.converter().calls(), 8);
    assert_eq!(p.converter().peak(), 1);
}

#[test]
fn try_resolve_drops_while_busy() {
    let tmp = TempDir::new().unwrap();
    let p = Arc::new(pipeline(
        &tmp,
        CountingConverter::slow(Duration::from_millis(200)),
    ));

    let background = {
        let p = Arc::clone(&p);
        let source = ImageSource::from_bytes(png_bytes(&test_image(16, 16, 10)));
        std::thread::spawn(move || p.resolve(&source, Rendition::Nearest))
    };
    // Wait until the background conversion holds the guard.
    while p.converter().calls() == 0 {
        std::thread::sleep(Duration::from_millis(5));
    }

    let dropped = p.try_resolve(
        &ImageSource::from_bytes(png_bytes(&test_image(16, 16, 11))),
        Rendition::Nearest,
    );
    assert!(matches!(dropped, Err(PipelineError::Busy)));

    background.join().unwrap().unwrap();
    assert_eq!(p.converter().calls(), 2);
}

// =========================================================================
// Cache clear
// =========================================================================

#[test]
fn clear_cache_triggers_fresh_conversion() {
    let tmp = TempDir::new().unwrap();
    let source = ImageSource::from_bytes(png_bytes(&test_image(24, 24, 12)));
    let p = pipeline(&tmp, CountingConverter::default());

    p.resolve(&source, Rendition::Nearest).unwrap();
    assert_eq!(p.clear_cache().unwrap(), 2);
    assert!(cache_files(&p).is_empty());

    let again = p.resolve(&source, Rendition::Nearest).unwrap();
    assert_eq!(again.outcome, Outcome::Converted);
    assert_eq!(p.converter().calls(), 4);
}

// =========================================================================
// Native converter, end to end
// =========================================================================

#[test]
fn native_landscape_renditions() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("landscape.jpg");
    write_image(&path, &test_image(640, 480, 20).to_rgb8().into(), ImageFormat::Jpeg);
    let p = pipeline(&tmp, NativeConverter::new());

    let nearest = p
        .resolve(&ImageSource::from_path(&path), Rendition::Nearest)
        .unwrap();
    let smooth = p
        .resolve(&ImageSource::from_path(&path), Rendition::Smooth)
        .unwrap();

    assert!(nearest.path.to_string_lossy().ends_with(".gif.nearest.gif"));
    assert!(smooth.path.to_string_lossy().ends_with(".gif"));
    assert_eq!(image::image_dimensions(&nearest.path).unwrap(), (320, 240));
    assert_eq!(image::image_dimensions(&smooth.path).unwrap(), (320, 240));
    // Only the two renditions remain; scratch and staging files are gone.
    assert_eq!(cache_files(&p).len(), 2);
}

#[test]
fn native_portrait_targets_height() {
    let tmp = TempDir::new().unwrap();
    let source = ImageSource::from_bytes(png_bytes(&test_image(300, 400, 21)));
    let p = pipeline(&tmp, NativeConverter::new());

    let resolved = p.resolve(&source, Rendition::Nearest).unwrap();
    assert_eq!(image::image_dimensions(&resolved.path).unwrap(), (240, 320));
}

#[test]
fn native_nearest_rendition_is_blocky() {
    let tmp = TempDir::new().unwrap();
    let source = ImageSource::from_bytes(png_bytes(&test_image(128, 128, 22)));
    let p = pipeline(&tmp, NativeConverter::new());

    let resolved = p.resolve(&source, Rendition::Nearest).unwrap();
    let img = image::open(&resolved.path).unwrap();
    assert_eq!(img.dimensions(), (320, 320));
    for (bx, by) in [(0, 0), (35, 35), (315, 160)] {
        let origin = img.get_pixel(bx, by);
        for dy in 0..5 {
            for dx in 0..5 {
                assert_eq!(img.get_pixel(bx + dx, by + dy), origin);
            }
        }
    }
}

#[test]
fn native_gif_source_passes_through() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("still.gif");
    write_image(&path, &test_image(90, 90, 23), ImageFormat::Gif);
    let p = pipeline(&tmp, NativeConverter::new());

    let resolved = p
        .resolve(&ImageSource::from_path(&path), Rendition::Smooth)
        .unwrap();
    assert_eq!(image::image_dimensions(&resolved.path).unwrap(), (320, 320));
}

#[test]
fn native_base64_payload() {
    use base64::Engine;
    let tmp = TempDir::new().unwrap();
    let encoded = base64::engine::general_purpose::STANDARD
        .encode(png_bytes(&test_image(50, 25, 24)));
    let p = pipeline(&tmp, NativeConverter::new());

    let resolved = p
        .resolve(
            &ImageSource::from_base64(&encoded).unwrap(),
            Rendition::Nearest,
        )
        .unwrap();
    assert_eq!(image::image_dimensions(&resolved.path).unwrap(), (320, 160));
}

// =========================================================================
// Worker + display
// =========================================================================

#[test]
fn display_session_through_worker() {
    let tmp = TempDir::new().unwrap();
    let good = tmp.path().join("good.png");
    let bad = tmp.path().join("bad.png");
    write_image(&good, &test_image(80, 40, 30), ImageFormat::Png);
    std::fs::write(&bad, "nope").unwrap();

    let p = Arc::new(pipeline(&tmp, NativeConverter::new()));
    let worker = Worker::new(Arc::clone(&p)).unwrap();
    let mut display = DisplayState::new(DisplayMode::CrtGreen, Rendition::Nearest);

    let first = worker.submit(ImageSource::from_path(&good), Rendition::Nearest);
    let second = worker.submit(ImageSource::from_path(&bad), Rendition::Nearest);

    let shown = match display.present(first.wait()) {
        Presented::Shown(path) => path,
        other => panic!("expected Shown, got {other:?}"),
    };
    assert!(matches!(
        display.present(second.wait()),
        Presented::Restored { .. }
    ));
    assert_eq!(display.current(), Some(shown.as_path()));

    display.toggle_rendition();
    let smooth = display.current().unwrap();
    assert!(smooth.exists());
    assert!(!smooth.to_string_lossy().ends_with(".nearest.gif"));
}
