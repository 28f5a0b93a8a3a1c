//! The caching engine behind region renders and point lookups.
//!
//! Five cache tiers depend on one another: descriptor line lists, per-file
//! segment lists, decoded amplifier buffers, rendered tiles and merged
//! global histograms. Every tier loads a key at most once at a time, so
//! concurrent renders that need the same data share the work.
//!
//! Renders run as task sets joined at barriers. The first failure at a
//! barrier is returned; the tasks still running are detached and their
//! results dropped.

use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use glam::DVec2;
use log::{debug, info};
use parking_lot::Mutex;
use tokio::task::{self, JoinSet};

use crate::bias::{BiasCorrection, CorrectionFactors};
use crate::cache::{CacheStats, FileCache, LoadingCache};
use crate::colormap::{ColorMap, Rgb};
use crate::compositor::{self, Canvas};
use crate::config::EngineConfig;
use crate::descriptor::read_descriptor;
use crate::error::Result;
use crate::geometry::Region;
use crate::histogram::{add_counts, bin_counts, Histogram, BINS};
use crate::raw::RawData;
use crate::request::{RenderRequest, ScaleMode};
use crate::segment::{read_segments, Segment, SegmentId, WcsOverrides};
use crate::tile::RenderedTile;

/// A sorted, duplicate-free set of segments, compared and hashed by id.
#[derive(Clone)]
pub struct SegmentSet(Arc<[Arc<Segment>]>);

impl SegmentSet {
    pub fn new(mut segments: Vec<Arc<Segment>>) -> Self {
        segments.sort_by(|a, b| a.id().cmp(b.id()));
        segments.dedup_by(|a, b| a.id() == b.id());
        SegmentSet(segments.into())
    }

    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for SegmentSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.len() == other.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a.id() == b.id()))
    }
}

impl Eq for SegmentSet {}

impl Hash for SegmentSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for s in self.0.iter() {
            s.id().hash(state);
        }
    }
}

impl fmt::Debug for SegmentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentSet({} segments)", self.len())
    }
}

/// The histogram a tile is scaled with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TileScale {
    PerAmplifier,
    /// The merged histogram of the given set, under the tile's bias.
    Global(SegmentSet),
}

type SegmentListKey = (PathBuf, char, Option<WcsOverrides>);
type TileKey = (SegmentId, BiasCorrection, TileScale);
type GlobalKey = (SegmentSet, BiasCorrection);

/// Tasks joined as a barrier. Tasks still running when the set is dropped
/// are detached, not aborted.
struct TaskSet<T: 'static>(JoinSet<Result<T>>);

impl<T: Send + 'static> TaskSet<T> {
    fn new() -> Self {
        TaskSet(JoinSet::new())
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.0.spawn(task);
    }

    /// Output of the next task to finish, `None` once all have.
    async fn next(&mut self) -> Result<Option<T>> {
        match self.0.join_next().await {
            Some(joined) => Ok(Some(joined??)),
            None => Ok(None),
        }
    }

    async fn join_all(mut self) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(self.0.len());
        while let Some(v) = self.next().await? {
            out.push(v);
        }
        Ok(out)
    }
}

impl<T: 'static> Drop for TaskSet<T> {
    fn drop(&mut self) {
        self.0.detach_all();
    }
}

/// What every tile task of one render needs besides its segment.
#[derive(Clone)]
struct DrawJob {
    canvas: Arc<Mutex<Canvas>>,
    bias: BiasCorrection,
    scale: TileScale,
    include_overscan: bool,
    display_map: Option<ColorMap>,
}

/// Counters of every cache tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub tiers: Vec<CacheStats>,
    /// Files currently held open.
    pub open_files: u64,
    /// Files opened since the engine was built.
    pub files_opened: u64,
}

impl EngineStats {
    pub fn tier(&self, name: &str) -> Option<&CacheStats> {
        self.tiers.iter().find(|t| t.name == name)
    }

    /// Log every tier at info level.
    pub fn report(&self) {
        for tier in &self.tiers {
            info!("{tier}");
        }
        info!("open files {} opened {}", self.open_files, self.files_opened);
    }
}

struct Inner {
    config: EngineConfig,
    color_map: ColorMap,
    files: FileCache,
    lines: LoadingCache<PathBuf, Arc<[PathBuf]>>,
    segments: LoadingCache<SegmentListKey, Arc<[Arc<Segment>]>>,
    raw: LoadingCache<SegmentId, Arc<RawData>>,
    tiles: LoadingCache<TileKey, Arc<RenderedTile>>,
    global: LoadingCache<GlobalKey, Arc<Histogram>>,
}

/// Shared handle to the cache tiers. Clones share the same caches.
#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<Inner>,
}

impl CacheEngine {
    pub fn new(config: EngineConfig) -> Self {
        let inner = Inner {
            color_map: ColorMap::grey(config.color_map_size),
            files: FileCache::new(config.file_idle),
            lines: LoadingCache::new("line", config.line_cache_size),
            segments: LoadingCache::new("segment", config.segment_cache_size),
            raw: LoadingCache::new("raw", config.raw_data_cache_size),
            tiles: LoadingCache::new("tile", config.tile_cache_size),
            global: LoadingCache::new("global", config.global_histogram_cache_size),
            config,
        };
        CacheEngine { inner: Arc::new(inner) }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The map tiles are rendered with.
    pub fn color_map(&self) -> &ColorMap {
        &self.inner.color_map
    }

    pub fn stats(&self) -> EngineStats {
        let i = &self.inner;
        EngineStats {
            tiers: vec![
                i.lines.stats(),
                i.segments.stats(),
                i.raw.stats(),
                i.tiles.stats(),
                i.global.stats(),
            ],
            open_files: i.files.open_files(),
            files_opened: i.files.opens(),
        }
    }

    /// Drop every cached value. Open files stay open until they idle out.
    pub fn invalidate_all(&self) {
        let i = &self.inner;
        i.lines.invalidate_all();
        i.segments.invalidate_all();
        i.raw.invalidate_all();
        i.tiles.invalidate_all();
        i.global.invalidate_all();
    }

    // ---- cache tiers ----

    /// Camera files listed by a descriptor.
    pub async fn lines(&self, descriptor: &Path) -> Result<Arc<[PathBuf]>> {
        self.inner
            .lines
            .get(descriptor.to_path_buf(), |path| async move { read_descriptor(&path).await })
            .await
    }

    /// Amplifier segments of one camera file.
    pub async fn segments(
        &self,
        file: &Path,
        wcs: char,
        overrides: Option<&WcsOverrides>,
    ) -> Result<Arc<[Arc<Segment>]>> {
        let key = (file.to_path_buf(), wcs, overrides.cloned());
        let engine = self.clone();
        self.inner
            .segments
            .get(key, move |(path, wcs, overrides)| engine.load_segments(path, wcs, overrides))
            .await
    }

    pub async fn raw_data(&self, segment: &Arc<Segment>) -> Result<Arc<RawData>> {
        let engine = self.clone();
        let segment = segment.clone();
        self.inner
            .raw
            .get(segment.id().clone(), move |_| engine.load_raw(segment))
            .await
    }

    pub async fn tile(&self, segment: &Arc<Segment>, bias: BiasCorrection, scale: &TileScale) -> Result<Arc<RenderedTile>> {
        let key = (segment.id().clone(), bias, scale.clone());
        let engine = self.clone();
        let segment = segment.clone();
        self.inner
            .tiles
            .get(key, move |(_, bias, scale)| engine.load_tile(segment, bias, scale))
            .await
    }

    /// Merged, shrunk histogram of every segment in `set`.
    pub async fn global_histogram(&self, set: &SegmentSet, bias: BiasCorrection) -> Result<Arc<Histogram>> {
        let engine = self.clone();
        self.inner
            .global
            .get((set.clone(), bias), move |(set, bias)| engine.load_global(set, bias))
            .await
    }

    async fn load_segments(
        self,
        path: PathBuf,
        wcs: char,
        overrides: Option<WcsOverrides>,
    ) -> Result<Arc<[Arc<Segment>]>> {
        task::spawn_blocking(move || -> Result<Arc<[Arc<Segment>]>> {
            let file = self.inner.files.open(&path)?;
            let segments = read_segments(&file, &path, wcs, overrides.as_ref())?;
            Ok(segments.into())
        })
        .await?
    }

    async fn load_raw(self, segment: Arc<Segment>) -> Result<Arc<RawData>> {
        task::spawn_blocking(move || -> Result<Arc<RawData>> {
            let file = self.inner.files.open(segment.file())?;
            Ok(Arc::new(RawData::load(segment, &file)?))
        })
        .await?
    }

    async fn load_tile(self, segment: Arc<Segment>, bias: BiasCorrection, scale: TileScale) -> Result<Arc<RenderedTile>> {
        let raw = self.raw_data(&segment).await?;
        let global = match &scale {
            TileScale::PerAmplifier => None,
            TileScale::Global(set) => Some(self.global_histogram(set, bias).await?),
        };
        let color_map = self.inner.color_map.clone();
        let tile = task::spawn_blocking(move || {
            let factors = bias.compute(raw.pixels(), &segment);
            let tile = match global {
                Some(histogram) => RenderedTile::render(&raw, &factors, &histogram, &color_map),
                None => {
                    let histogram = Histogram::build(raw.pixels(), &segment, &factors);
                    RenderedTile::render(&raw, &factors, &histogram, &color_map)
                }
            };
            Arc::new(tile)
        })
        .await?;
        Ok(tile)
    }

    async fn load_global(self, set: SegmentSet, bias: BiasCorrection) -> Result<Arc<Histogram>> {
        let start = Instant::now();
        let sum = self.merged_counts(&set, bias).await?;
        let shrink = self.inner.config.global_shrink;
        let histogram = task::spawn_blocking(move || Histogram::from_sum(&sum, shrink)).await?;
        info!(
            "global histogram of {} segments: bins {}..={} in {}ms",
            set.len(),
            histogram.lowest(),
            histogram.highest(),
            start.elapsed().as_millis()
        );
        Ok(Arc::new(histogram))
    }

    /// Unshrunk bin-wise sum over every segment in `set`. Each segment's raw
    /// data is loaded through the raw tier.
    async fn merged_counts(&self, set: &SegmentSet, bias: BiasCorrection) -> Result<Vec<u64>> {
        let mut tasks = TaskSet::new();
        for segment in set.segments() {
            tasks.spawn(self.clone().segment_counts(segment.clone(), bias));
        }
        let mut sum = vec![0u64; BINS];
        while let Some(counts) = tasks.next().await? {
            add_counts(&mut sum, &counts);
        }
        Ok(sum)
    }

    async fn segment_counts(self, segment: Arc<Segment>, bias: BiasCorrection) -> Result<Vec<u32>> {
        let raw = self.raw_data(&segment).await?;
        let counts = task::spawn_blocking(move || {
            let factors = bias.compute(raw.pixels(), &segment);
            bin_counts(raw.pixels(), &segment, &factors)
        })
        .await?;
        Ok(counts)
    }

    async fn owned_segments(
        self,
        file: PathBuf,
        wcs: char,
        overrides: Option<WcsOverrides>,
    ) -> Result<Arc<[Arc<Segment>]>> {
        self.segments(&file, wcs, overrides.as_ref()).await
    }

    fn spawn_segment_lists(
        &self,
        files: &[PathBuf],
        wcs: char,
        overrides: Option<&WcsOverrides>,
    ) -> TaskSet<Arc<[Arc<Segment>]>> {
        let mut lists = TaskSet::new();
        for file in files {
            lists.spawn(self.clone().owned_segments(file.clone(), wcs, overrides.cloned()));
        }
        lists
    }

    /// Every segment of every file of a descriptor, in no particular order.
    async fn all_segments(
        &self,
        descriptor: &Path,
        wcs: char,
        overrides: Option<&WcsOverrides>,
    ) -> Result<Vec<Arc<Segment>>> {
        let files = self.lines(descriptor).await?;
        let lists = self.spawn_segment_lists(&files, wcs, overrides).join_all().await?;
        Ok(lists.iter().flat_map(|l| l.iter().cloned()).collect())
    }

    // ---- rendering ----

    /// Render `request` into a new canvas.
    pub async fn render_region(&self, request: &RenderRequest) -> Result<Canvas> {
        let start = Instant::now();
        let canvas = match request.scale {
            ScaleMode::PerAmplifier => self.render_per_amplifier(request).await?,
            ScaleMode::Global => self.render_global(request).await?,
        };
        info!(
            "rendered {} ({}x{}) in {}ms",
            request.descriptor.display(),
            canvas.width(),
            canvas.height(),
            start.elapsed().as_millis()
        );
        Ok(canvas)
    }

    fn draw_job(&self, request: &RenderRequest, region: Region, scale: TileScale) -> DrawJob {
        DrawJob {
            canvas: Arc::new(Mutex::new(Canvas::new(region))),
            bias: request.bias,
            scale,
            include_overscan: request.include_overscan,
            display_map: request
                .color_map
                .as_ref()
                .filter(|m| **m != self.inner.color_map)
                .map(|m| m.indexed_by_grey(self.inner.color_map.size())),
        }
    }

    async fn draw_tile(self, segment: Arc<Segment>, job: DrawJob) -> Result<usize> {
        let tile = self.tile(&segment, job.bias, &job.scale).await?;
        let drawn = task::spawn_blocking(move || {
            compositor::draw(&job.canvas, &tile, &segment, job.include_overscan, job.display_map.as_ref())
        })
        .await?;
        Ok(drawn)
    }

    /// Spawn a draw for each segment of `segments` that intersects the canvas.
    fn spawn_draws(&self, tiles: &mut TaskSet<usize>, segments: &[Arc<Segment>], job: &DrawJob) -> usize {
        let region = *job.canvas.lock().region();
        let mut spawned = 0;
        for segment in segments.iter().filter(|s| s.intersects(&region)) {
            tiles.spawn(self.clone().draw_tile(segment.clone(), job.clone()));
            spawned += 1;
        }
        spawned
    }

    async fn render_per_amplifier(&self, request: &RenderRequest) -> Result<Canvas> {
        let files = self.lines(&request.descriptor).await?;
        let mut lists = self.spawn_segment_lists(&files, request.wcs, request.overrides.as_ref());
        let mut tiles = TaskSet::new();

        let (job, spawned) = match request.region {
            // Tiles start as soon as their file's segment list is in.
            Some(region) => {
                let job = self.draw_job(request, region, TileScale::PerAmplifier);
                let mut spawned = 0;
                while let Some(segments) = lists.next().await? {
                    spawned += self.spawn_draws(&mut tiles, &segments, &job);
                }
                (job, spawned)
            }
            // The canvas extent is only known once every list is in.
            None => {
                let segments: Vec<Arc<Segment>> = lists.join_all().await?.iter().flat_map(|l| l.iter().cloned()).collect();
                let job = self.draw_job(request, extent(&segments), TileScale::PerAmplifier);
                let spawned = self.spawn_draws(&mut tiles, &segments, &job);
                (job, spawned)
            }
        };
        info!("{}: {} files, {} tiles to draw", request.descriptor.display(), files.len(), spawned);

        let drawn: usize = tiles.join_all().await?.into_iter().sum();
        debug!("{}: {} pixels drawn", request.descriptor.display(), drawn);
        Ok(into_canvas(job.canvas))
    }

    async fn render_global(&self, request: &RenderRequest) -> Result<Canvas> {
        let segments = self
            .all_segments(&request.descriptor, request.wcs, request.overrides.as_ref())
            .await?;
        let set = SegmentSet::new(segments);
        info!("{}: {} segments", request.descriptor.display(), set.len());

        self.global_histogram(&set, request.bias).await?;

        let region = request.region.unwrap_or_else(|| extent(set.segments()));
        let job = self.draw_job(request, region, TileScale::Global(set.clone()));
        let mut tiles = TaskSet::new();
        let spawned = self.spawn_draws(&mut tiles, set.segments(), &job);
        info!("{}: {} tiles to draw", request.descriptor.display(), spawned);

        let drawn: usize = tiles.join_all().await?.into_iter().sum();
        debug!("{}: {} pixels drawn", request.descriptor.display(), drawn);
        Ok(into_canvas(job.canvas))
    }

    // ---- point lookups ----

    /// Every segment of a descriptor, ordered by id.
    pub async fn descriptor_segments(&self, descriptor: &Path, wcs: char) -> Result<Vec<Arc<Segment>>> {
        let mut segments = self.all_segments(descriptor, wcs, None).await?;
        segments.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(segments)
    }

    /// Segments whose datasec covers the mosaic point `(x, y)`.
    pub async fn segments_for_point(&self, descriptor: &Path, wcs: char, x: f64, y: f64) -> Result<Vec<Arc<Segment>>> {
        let point = DVec2::new(x, y);
        let mut segments = self.all_segments(descriptor, wcs, None).await?;
        segments.retain(|s| s.bounds().contains(point));
        segments.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(segments)
    }

    /// Segments whose datasec overlaps `region`.
    pub async fn segments_for_region(&self, descriptor: &Path, wcs: char, region: &Region) -> Result<Vec<Arc<Segment>>> {
        let mut segments = self.all_segments(descriptor, wcs, None).await?;
        segments.retain(|s| s.intersects(region));
        segments.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(segments)
    }

    /// Raw value of readout pixel `(x, y)`, `None` outside the readout.
    pub async fn pixel_for_segment(&self, segment: &Arc<Segment>, x: usize, y: usize) -> Result<Option<i32>> {
        if x >= segment.naxis1() || y >= segment.naxis2() {
            return Ok(None);
        }
        Ok(Some(self.raw_data(segment).await?.get(x, y)))
    }

    /// Color of readout pixel `(x, y)` in the amplifier's own scaling.
    pub async fn rgb_for_segment(
        &self,
        segment: &Arc<Segment>,
        bias: BiasCorrection,
        x: usize,
        y: usize,
    ) -> Result<Option<Rgb>> {
        if x >= segment.naxis1() || y >= segment.naxis2() {
            return Ok(None);
        }
        let tile = self.tile(segment, bias, &TileScale::PerAmplifier).await?;
        Ok(Some(tile.get(x, y)))
    }

    pub async fn correction_factors_for_segment(
        &self,
        segment: &Arc<Segment>,
        bias: BiasCorrection,
    ) -> Result<CorrectionFactors> {
        let raw = self.raw_data(segment).await?;
        let segment = segment.clone();
        let factors = task::spawn_blocking(move || bias.compute(raw.pixels(), &segment)).await?;
        Ok(factors)
    }

    /// Unshrunk merged counts of every segment of a descriptor, for
    /// precomputing a global scale offline.
    pub async fn global_histogram_counts(&self, descriptor: &Path, wcs: char, bias: BiasCorrection) -> Result<Vec<u64>> {
        let set = SegmentSet::new(self.all_segments(descriptor, wcs, None).await?);
        self.merged_counts(&set, bias).await
    }
}

/// Smallest region covering the datasec of every segment.
fn extent(segments: &[Arc<Segment>]) -> Region {
    segments
        .iter()
        .fold(Region::default(), |r, s| r.union(&s.bounds().enclosing_region()))
}

fn into_canvas(canvas: Arc<Mutex<Canvas>>) -> Canvas {
    Arc::try_unwrap(canvas)
        .map(Mutex::into_inner)
        .unwrap_or_else(|shared| shared.lock().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::test_segment_at;

    fn segment(offset: u64) -> Arc<Segment> {
        Arc::new(test_segment_at(offset, 4, 4, "[1:2,1:2]"))
    }

    #[test]
    fn segment_sets_ignore_order_and_duplicates() {
        let a = SegmentSet::new(vec![segment(10), segment(20), segment(10)]);
        let b = SegmentSet::new(vec![segment(20), segment(10)]);
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);

        let mut ha = std::collections::hash_map::DefaultHasher::new();
        let mut hb = std::collections::hash_map::DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());

        assert_ne!(a, SegmentSet::new(vec![segment(10)]));
    }

    #[test]
    fn extent_covers_every_datasec() {
        let r = extent(&[segment(0)]);
        // identity placement shifted by half a pixel
        assert_eq!(r, Region::new(0, 0, 3, 3));
        assert_eq!(extent(&[]), Region::default());
    }

    #[tokio::test]
    async fn dropped_task_set_detaches() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        {
            let mut tasks: TaskSet<()> = TaskSet::new();
            tasks.spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                let _ = tx.send(());
                Ok(())
            });
        }
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn first_failure_is_returned() {
        let mut tasks: TaskSet<u32> = TaskSet::new();
        tasks.spawn(async { Ok(1) });
        tasks.spawn(async { Err(crate::error::Error::InvalidDatasec("[]".into())) });
        let err = tasks.join_all().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Format);
    }

    #[tokio::test]
    async fn panicking_task_is_internal() {
        let mut tasks: TaskSet<u32> = TaskSet::new();
        tasks.spawn(async {
            if true {
                panic!("boom");
            }
            Ok(0)
        });
        let err = tasks.join_all().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }
}
