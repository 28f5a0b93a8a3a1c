use std::str::FromStr;
use std::time::Duration;

use log::warn;

/// Capacities, pool sizes and scaling constants of a [`crate::CacheEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Descriptor files whose line lists are kept.
    pub line_cache_size: u64,
    /// Per-file segment lists kept.
    pub segment_cache_size: u64,
    /// Decoded amplifier buffers kept. Each holds a whole readout.
    pub raw_data_cache_size: u64,
    /// Rendered tiles kept.
    pub tile_cache_size: u64,
    /// Merged global histograms kept.
    pub global_histogram_cache_size: u64,
    /// Open file handles are closed after this long without a read.
    pub file_idle: Duration,
    /// Async worker threads of the reader runtime.
    pub worker_threads: usize,
    /// Threads available for decoding and rendering.
    pub blocking_threads: usize,
    /// Period of the cache statistics report; `None` disables it.
    pub stats_interval: Option<Duration>,
    /// Divisor applied to every bin of a merged global histogram.
    pub global_shrink: u64,
    /// Entries in the color map tiles are rendered with.
    pub color_map_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism().map_or(4, |n| n.get());
        EngineConfig {
            line_cache_size: 10_000,
            segment_cache_size: 10_000,
            raw_data_cache_size: 1_000,
            tile_cache_size: 10_000,
            global_histogram_cache_size: 64,
            file_idle: Duration::from_secs(60),
            worker_threads: cpus,
            blocking_threads: 2 * cpus,
            stats_interval: Some(Duration::from_secs(60)),
            global_shrink: 512,
            color_map_size: 256,
        }
    }
}

fn env_value<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {name}={raw:?}: not a valid value");
            None
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `CAMERA_FITS_*` environment variables.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `CAMERA_FITS_LINE_CACHE_SIZE` | `line_cache_size` |
    /// | `CAMERA_FITS_SEGMENT_CACHE_SIZE` | `segment_cache_size` |
    /// | `CAMERA_FITS_RAW_DATA_CACHE_SIZE` | `raw_data_cache_size` |
    /// | `CAMERA_FITS_TILE_CACHE_SIZE` | `tile_cache_size` |
    /// | `CAMERA_FITS_GLOBAL_CACHE_SIZE` | `global_histogram_cache_size` |
    /// | `CAMERA_FITS_FILE_IDLE_SECS` | `file_idle` |
    /// | `CAMERA_FITS_WORKER_THREADS` | `worker_threads` |
    /// | `CAMERA_FITS_BLOCKING_THREADS` | `blocking_threads` |
    /// | `CAMERA_FITS_STATS_INTERVAL_SECS` | `stats_interval` (0 disables) |
    /// | `CAMERA_FITS_GLOBAL_SHRINK` | `global_shrink` |
    /// | `CAMERA_FITS_COLOR_MAP_SIZE` | `color_map_size` |
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut c = EngineConfig::default();
        if let Some(v) = env_value("CAMERA_FITS_LINE_CACHE_SIZE") {
            c.line_cache_size = v;
        }
        if let Some(v) = env_value("CAMERA_FITS_SEGMENT_CACHE_SIZE") {
            c.segment_cache_size = v;
        }
        if let Some(v) = env_value("CAMERA_FITS_RAW_DATA_CACHE_SIZE") {
            c.raw_data_cache_size = v;
        }
        if let Some(v) = env_value("CAMERA_FITS_TILE_CACHE_SIZE") {
            c.tile_cache_size = v;
        }
        if let Some(v) = env_value("CAMERA_FITS_GLOBAL_CACHE_SIZE") {
            c.global_histogram_cache_size = v;
        }
        if let Some(v) = env_value("CAMERA_FITS_FILE_IDLE_SECS") {
            c.file_idle = Duration::from_secs(v);
        }
        if let Some(v) = env_value::<usize>("CAMERA_FITS_WORKER_THREADS") {
            c.worker_threads = v.max(1);
        }
        if let Some(v) = env_value::<usize>("CAMERA_FITS_BLOCKING_THREADS") {
            c.blocking_threads = v.max(1);
        }
        if let Some(v) = env_value::<u64>("CAMERA_FITS_STATS_INTERVAL_SECS") {
            c.stats_interval = (v > 0).then(|| Duration::from_secs(v));
        }
        if let Some(v) = env_value::<u64>("CAMERA_FITS_GLOBAL_SHRINK") {
            c.global_shrink = v.max(1);
        }
        if let Some(v) = env_value::<usize>("CAMERA_FITS_COLOR_MAP_SIZE") {
            c.color_map_size = v.clamp(2, 256);
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.raw_data_cache_size, 1_000);
        assert_eq!(c.segment_cache_size, 10_000);
        assert_eq!(c.global_shrink, 512);
        assert_eq!(c.color_map_size, 256);
        assert_eq!(c.stats_interval, Some(Duration::from_secs(60)));
        assert!(c.worker_threads >= 1);
    }

    // The only test in this binary that writes the environment; from_env
    // reads every variable, so the cases run in sequence here.
    #[test]
    fn env_overrides() {
        std::env::set_var("CAMERA_FITS_RAW_DATA_CACHE_SIZE", "42");
        assert_eq!(EngineConfig::from_env().raw_data_cache_size, 42);
        std::env::remove_var("CAMERA_FITS_RAW_DATA_CACHE_SIZE");

        std::env::set_var("CAMERA_FITS_STATS_INTERVAL_SECS", "0");
        assert_eq!(EngineConfig::from_env().stats_interval, None);
        std::env::remove_var("CAMERA_FITS_STATS_INTERVAL_SECS");

        // unparseable values keep the default
        std::env::set_var("CAMERA_FITS_GLOBAL_SHRINK", "lots");
        assert_eq!(EngineConfig::from_env().global_shrink, 512);
        std::env::remove_var("CAMERA_FITS_GLOBAL_SHRINK");

        std::env::set_var("CAMERA_FITS_COLOR_MAP_SIZE", "1");
        assert_eq!(EngineConfig::from_env().color_map_size, 2);
        std::env::remove_var("CAMERA_FITS_COLOR_MAP_SIZE");
    }
}
