//! Background conversion queue.
//!
//! A [`Worker`] runs resolves on a dedicated one-thread rayon pool so the
//! caller (a UI thread, or the CLI's display loop) never blocks on the
//! external tool. Jobs run in submission order. Results come back over a
//! channel wrapped in [`PendingResolve`].
//!
//! Dropping a `PendingResolve` does not cancel its job; the conversion still
//! lands in the cache and the next resolve for that content is a hit.
//!
//! A job that panics is caught on the worker thread. Its handle reports
//! [`PipelineError::Disconnected`] and the worker keeps serving later jobs.

use crate::cache::Rendition;
use crate::imaging::Converter;
use crate::pipeline::{CachePipeline, PipelineError, Resolved};
use crate::source::ImageSource;
use log::{debug, error};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc;

pub struct Worker<C = Box<dyn Converter>> {
    pipeline: Arc<CachePipeline<C>>,
    pool: rayon::ThreadPool,
}

impl<C: Converter + 'static> Worker<C> {
    pub fn new(pipeline: Arc<CachePipeline<C>>) -> Result<Self, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .thread_name(|i| format!("pixboard-convert-{i}"))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("cannot start worker: {e}")))?;
        Ok(Self { pipeline, pool })
    }

    pub fn pipeline(&self) -> &Arc<CachePipeline<C>> {
        &self.pipeline
    }

    /// Queue a resolve of `source`.
    pub fn submit(&self, source: ImageSource, rendition: Rendition) -> PendingResolve {
        let (tx, rx) = mpsc::channel();
        let pipeline = Arc::clone(&self.pipeline);
        debug!("Queued {}", source.describe());

        self.pool.spawn_fifo(move || {
            let job = AssertUnwindSafe(|| pipeline.resolve(&source, rendition));
            match panic::catch_unwind(job) {
                // Receiver may be gone; the entry is cached either way.
                Ok(result) => {
                    let _ = tx.send(result);
                }
                // Dropping `tx` unsent is what the handle sees.
                Err(_) => error!("Resolve of {} panicked", source.describe()),
            }
        });

        PendingResolve { rx }
    }
}

/// Handle to a queued resolve.
#[must_use = "a pending resolve does nothing unless waited on"]
pub struct PendingResolve {
    rx: mpsc::Receiver<Result<Resolved, PipelineError>>,
}

impl PendingResolve {
    /// Block until the job finishes.
    pub fn wait(self) -> Result<Resolved, PipelineError> {
        self.rx.recv().map_err(|_| PipelineError::Disconnected)?
    }

    /// The result, if the job already finished.
    pub fn poll(&self) -> Option<Result<Resolved, PipelineError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(PipelineError::Disconnected)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheDir;
    use crate::imaging::RenditionSettings;
    use crate::imaging::converter::tests::MockConverter;
    use crate::pipeline::Outcome;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;

    fn png_bytes(seed: u8) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([seed, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn worker(tmp: &TempDir, converter: MockConverter) -> Worker<MockConverter> {
        let cache = CacheDir::open(tmp.path()).unwrap();
        Worker::new(Arc::new(CachePipeline::new(
            cache,
            converter,
            RenditionSettings::default(),
        )))
        .unwrap()
    }

    #[test]
    fn submitted_job_resolves() {
        let tmp = TempDir::new().unwrap();
        let w = worker(&tmp, MockConverter::new());

        let resolved = w
            .submit(ImageSource::from_bytes(png_bytes(1)), Rendition::Nearest)
            .wait()
            .unwrap();
        assert_eq!(resolved.outcome, Outcome::Converted);
        assert!(resolved.path.exists());
    }

    #[test]
    fn jobs_run_in_order_one_at_a_time() {
        let tmp = TempDir::new().unwrap();
        let w = worker(&tmp, MockConverter::slow(Duration::from_millis(20)));

        let pending: Vec<_> = (0..3)
            .map(|i| w.submit(ImageSource::from_bytes(png_bytes(i)), Rendition::Smooth))
            .collect();
        let hashes: Vec<_> = pending
            .into_iter()
            .map(|p| p.wait().unwrap().hash)
            .collect();

        assert_eq!(w.pipeline().converter().calls(), 6);
        assert_eq!(w.pipeline().converter().peak_concurrency(), 1);
        for (i, hash) in hashes.iter().enumerate() {
            let expected = ImageSource::from_bytes(png_bytes(i as u8))
                .prepare()
                .unwrap()
                .hash;
            assert_eq!(*hash, expected);
        }
    }

    #[test]
    fn dropped_handle_still_populates_cache() {
        let tmp = TempDir::new().unwrap();
        let w = worker(&tmp, MockConverter::new());
        let bytes = png_bytes(9);

        drop(w.submit(ImageSource::from_bytes(bytes.clone()), Rendition::Nearest));
        let second = w
            .submit(ImageSource::from_bytes(bytes), Rendition::Nearest)
            .wait()
            .unwrap();

        assert_eq!(second.outcome, Outcome::Cached);
        assert_eq!(w.pipeline().converter().calls(), 2);
    }

    #[test]
    fn failures_come_back_as_values() {
        let tmp = TempDir::new().unwrap();
        let w = worker(&tmp, MockConverter::new());

        let result = w
            .submit(ImageSource::from_bytes(b"nope".to_vec()), Rendition::Nearest)
            .wait();
        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }

    #[test]
    fn poll_is_empty_until_the_job_finishes() {
        let tmp = TempDir::new().unwrap();
        let w = worker(&tmp, MockConverter::slow(Duration::from_millis(200)));

        let pending = w.submit(ImageSource::from_bytes(png_bytes(3)), Rendition::Nearest);
        assert!(pending.poll().is_none());

        let mut result = None;
        for _ in 0..200 {
            result = pending.poll();
            if result.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let resolved = result.expect("job finished").unwrap();
        assert_eq!(resolved.outcome, Outcome::Converted);
    }

    #[test]
    fn panicking_job_disconnects_and_worker_survives() {
        let tmp = TempDir::new().unwrap();
        let w = worker(&tmp, MockConverter::panicking());

        let result = w
            .submit(ImageSource::from_bytes(png_bytes(4)), Rendition::Nearest)
            .wait();
        assert!(matches!(result, Err(PipelineError::Disconnected)));

        // The pool thread is still alive.
        let next = w
            .submit(ImageSource::from_bytes(b"nope".to_vec()), Rendition::Nearest)
            .wait();
        assert!(matches!(next, Err(PipelineError::Decode(_))));
        assert!(!w.pipeline().is_cached(
            &ImageSource::from_bytes(png_bytes(4)).prepare().unwrap().hash
        ));
    }
}
