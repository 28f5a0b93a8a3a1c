//! Blocking facade over [`CacheEngine`].
//!
//! A [`CameraReader`] owns the runtime the engine's loaders run on and the
//! periodic statistics reporter. Its methods block the calling thread only,
//! and must not be called from inside another tokio runtime.

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::bias::{BiasCorrection, CorrectionFactors};
use crate::colormap::Rgb;
use crate::compositor::Canvas;
use crate::config::EngineConfig;
use crate::engine::{CacheEngine, EngineStats};
use crate::error::Result;
use crate::geometry::Region;
use crate::request::RenderRequest;
use crate::segment::Segment;

pub struct CameraReader {
    runtime: Runtime,
    engine: CacheEngine,
    reporter: Option<JoinHandle<()>>,
}

impl CameraReader {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .max_blocking_threads(config.blocking_threads.max(1))
            .thread_name("camera-fits")
            .enable_time()
            .build()?;
        let engine = CacheEngine::new(config.clone());

        let reporter = config.stats_interval.map(|period| {
            let engine = engine.clone();
            runtime.spawn(async move {
                let mut ticker = tokio::time::interval(period);
                // the first tick completes immediately
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    engine.stats().report();
                }
            })
        });

        Ok(CameraReader {
            runtime,
            engine,
            reporter,
        })
    }

    /// A reader configured from `CAMERA_FITS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        CameraReader::new(EngineConfig::from_env())
    }

    pub fn engine(&self) -> &CacheEngine {
        &self.engine
    }

    pub fn render(&self, request: &RenderRequest) -> Result<Canvas> {
        self.runtime.block_on(self.engine.render_region(request))
    }

    pub fn descriptor_segments(&self, descriptor: &Path, wcs: char) -> Result<Vec<Arc<Segment>>> {
        self.runtime.block_on(self.engine.descriptor_segments(descriptor, wcs))
    }

    pub fn segments_for_point(&self, descriptor: &Path, wcs: char, x: f64, y: f64) -> Result<Vec<Arc<Segment>>> {
        self.runtime
            .block_on(self.engine.segments_for_point(descriptor, wcs, x, y))
    }

    pub fn segments_for_region(&self, descriptor: &Path, wcs: char, region: &Region) -> Result<Vec<Arc<Segment>>> {
        self.runtime
            .block_on(self.engine.segments_for_region(descriptor, wcs, region))
    }

    pub fn pixel_for_segment(&self, segment: &Arc<Segment>, x: usize, y: usize) -> Result<Option<i32>> {
        self.runtime.block_on(self.engine.pixel_for_segment(segment, x, y))
    }

    pub fn rgb_for_segment(&self, segment: &Arc<Segment>, bias: BiasCorrection, x: usize, y: usize) -> Result<Option<Rgb>> {
        self.runtime
            .block_on(self.engine.rgb_for_segment(segment, bias, x, y))
    }

    pub fn correction_factors_for_segment(&self, segment: &Arc<Segment>, bias: BiasCorrection) -> Result<CorrectionFactors> {
        self.runtime
            .block_on(self.engine.correction_factors_for_segment(segment, bias))
    }

    pub fn global_histogram_counts(&self, descriptor: &Path, wcs: char, bias: BiasCorrection) -> Result<Vec<u64>> {
        self.runtime
            .block_on(self.engine.global_histogram_counts(descriptor, wcs, bias))
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }
}

impl Drop for CameraReader {
    fn drop(&mut self) {
        if let Some(reporter) = self.reporter.take() {
            reporter.abort();
        }
    }
}
