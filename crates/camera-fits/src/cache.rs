//! Keyed caches with deduplicated asynchronous loading.
//!
//! Concurrent requests for a missing key share a single load; the other
//! callers wait for its result. A failed load is handed to every waiter and
//! is not stored, so the next request loads again.

use std::fmt;
use std::fs::File;
use std::future::Future;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use moka::notification::RemovalCause;

use crate::error::{Error, Result};

/// Counters of one cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub name: &'static str,
    /// Entries currently held (eventually consistent).
    pub entries: u64,
    /// Calls to `get`.
    pub requests: u64,
    /// Loads actually run; requests served from the cache or by joining an
    /// in-flight load are not counted.
    pub loads: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.requests.saturating_sub(self.loads)
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cache size {} requests {} loads {} hits {}",
            self.name,
            self.entries,
            self.requests,
            self.loads,
            self.hits()
        )
    }
}

/// A bounded cache whose values are produced by an async loader supplied
/// with each request.
pub struct LoadingCache<K, V> {
    name: &'static str,
    cache: moka::future::Cache<K, V>,
    requests: AtomicU64,
    loads: Arc<AtomicU64>,
}

impl<K, V> LoadingCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, capacity: u64) -> Self {
        LoadingCache {
            name,
            cache: moka::future::Cache::builder().max_capacity(capacity).build(),
            requests: AtomicU64::new(0),
            loads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return the cached value for `key`, running `load` if it is absent and
    /// no other caller is already loading it.
    pub async fn get<F, Fut>(&self, key: K, load: F) -> Result<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let loads = self.loads.clone();
        let name = self.name;
        let k = key.clone();
        let init = async move {
            loads.fetch_add(1, Ordering::Relaxed);
            let label = format!("{k:?}");
            let start = Instant::now();
            let value = load(k).await;
            debug!("loading {name} {label} took {}ms", start.elapsed().as_millis());
            value
        };
        self.cache
            .try_get_with(key, init)
            .await
            .map_err(|e: Arc<Error>| Error::clone(&e))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            name: self.name,
            entries: self.cache.entry_count(),
            requests: self.requests.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
        }
    }

    /// Drop every entry. In-flight loads still complete for their waiters.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

/// Shared read-only file handles, closed after an idle interval.
///
/// A handle evicted while a reader still holds it stays open until that
/// reader drops it.
pub struct FileCache {
    cache: moka::sync::Cache<PathBuf, Arc<File>>,
    opens: AtomicU64,
}

impl FileCache {
    pub fn new(idle: Duration) -> Self {
        let cache = moka::sync::Cache::builder()
            .time_to_idle(idle)
            .eviction_listener(|path: Arc<PathBuf>, _file: Arc<File>, cause: RemovalCause| {
                debug!("closing {} ({:?})", path.display(), cause);
            })
            .build();
        FileCache {
            cache,
            opens: AtomicU64::new(0),
        }
    }

    pub fn open(&self, path: &Path) -> Result<Arc<File>> {
        self.cache
            .try_get_with_by_ref(path, || {
                self.opens.fetch_add(1, Ordering::Relaxed);
                File::open(path).map(Arc::new)
            })
            .map_err(Error::Io)
    }

    /// Number of times a file was actually opened.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn open_files(&self) -> u64 {
        self.cache.entry_count()
    }
}
