use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use foundation::math::GeoPoint;
use futures_util::FutureExt;
use futures_util::future::Shared;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::loader::{BoxFuture, TextureLoader};
use crate::texture::Texture;
use crate::tile::{TileCoordinate, to_tile};
use crate::url::TileSourceConfig;

pub const DEFAULT_MAX_CACHED_TILES: usize = 100;

/// Called with the tile key each time a fetch delivers a texture.
pub type TileLoadedObserver = Arc<dyn Fn(TileCoordinate) + Send + Sync>;

type SharedFetch = Shared<BoxFuture<'static, Option<Texture>>>;

/// Counters for diagnostics. Monotonic until the cache is dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered from a resident entry.
    pub hits: u64,
    /// Requests that started a new fetch.
    pub misses: u64,
    /// Requests that attached to a fetch already in flight.
    pub deduplicated: u64,
    pub fetches: u64,
    pub failures: u64,
    pub evictions: u64,
    /// Completions discarded because the cache was disposed meanwhile.
    pub stale: u64,
    /// Fetched textures handed to waiters without caching because every
    /// resident entry was pinned.
    pub uncached: u64,
}

#[derive(Debug)]
struct TileEntry {
    texture: Texture,
    inserted_at: u64,
    pin_count: u32,
}

struct InFlight {
    future: SharedFetch,
    waiters: usize,
}

#[derive(Default)]
struct CacheState {
    entries: BTreeMap<TileCoordinate, TileEntry>,
    in_flight: BTreeMap<TileCoordinate, InFlight>,
    next_insert: u64,
    epoch: u64,
    disposed: bool,
    observer: Option<TileLoadedObserver>,
    stats: CacheStats,
}

struct Insertion {
    /// Entries pushed out to make room; release them outside the lock.
    evicted: Vec<(TileCoordinate, Texture)>,
    /// `false` when no unpinned entry could make room.
    cached: bool,
}

impl CacheState {
    /// Make room for `tile` by evicting unpinned entries, oldest first, then
    /// insert it. Pinned entries are never evicted: if only pinned entries
    /// remain at the bound, the incoming texture is not cached.
    fn insert(&mut self, tile: TileCoordinate, texture: Texture, max: usize) -> Insertion {
        let mut evicted: Vec<(TileCoordinate, Texture)> = Vec::new();
        if self.entries.contains_key(&tile) {
            self.stats.uncached += 1;
            return Insertion {
                evicted,
                cached: false,
            };
        }

        while self.entries.len() >= max {
            let oldest_unpinned = self
                .entries
                .iter()
                .filter(|(_, e)| e.pin_count == 0)
                .min_by(|(ka, ea), (kb, eb)| {
                    ea.inserted_at
                        .cmp(&eb.inserted_at)
                        .then_with(|| ka.cmp(kb))
                })
                .map(|(k, _)| *k);
            let Some(key) = oldest_unpinned else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.stats.evictions += 1;
                evicted.push((key, entry.texture));
            }
        }

        if self.entries.len() >= max {
            self.stats.uncached += 1;
            return Insertion {
                evicted,
                cached: false,
            };
        }

        self.next_insert += 1;
        self.entries.insert(
            tile,
            TileEntry {
                texture,
                inserted_at: self.next_insert,
                pin_count: 0,
            },
        );
        Insertion {
            evicted,
            cached: true,
        }
    }
}

struct Inner {
    max_cached_tiles: usize,
    source: TileSourceConfig,
    loader: Arc<dyn TextureLoader>,
    state: Mutex<CacheState>,
}

/// Bounded tile texture cache with per-tile request deduplication.
///
/// Notes:
/// - Eviction is by insertion order (oldest inserted first), not by access.
/// - Pinned entries are never evicted. A fetch that lands while the cache is
///   full of pinned entries reaches its waiters but is not cached.
/// - At most one fetch per tile is outstanding; concurrent callers share it.
/// - Failed fetches are not cached, so a later request retries the tile.
/// - Entries, the in-flight table and the counters sit behind one mutex, so
///   insertion plus eviction is atomic with respect to lookups.
///
/// Cloning is cheap and yields a handle to the same cache.
#[derive(Clone)]
pub struct TileCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TileCache")
            .field("max_cached_tiles", &self.inner.max_cached_tiles)
            .field("len", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl TileCache {
    /// A bound of 0 is treated as 1.
    pub fn new(
        max_cached_tiles: usize,
        source: TileSourceConfig,
        loader: Arc<dyn TextureLoader>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_cached_tiles: max_cached_tiles.max(1),
                source,
                loader,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    pub fn max_cached_tiles(&self) -> usize {
        self.inner.max_cached_tiles
    }

    pub fn source(&self) -> &TileSourceConfig {
        &self.inner.source
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().entries.is_empty()
    }

    pub fn contains(&self, tile: TileCoordinate) -> bool {
        self.inner.state.lock().entries.contains_key(&tile)
    }

    /// Resident tiles, oldest insertion first.
    pub fn resident_tiles(&self) -> Vec<TileCoordinate> {
        let state = self.inner.state.lock();
        let mut tiles: Vec<(u64, TileCoordinate)> = state
            .entries
            .iter()
            .map(|(k, e)| (e.inserted_at, *k))
            .collect();
        tiles.sort_unstable();
        tiles.into_iter().map(|(_, k)| k).collect()
    }

    pub fn in_flight_len(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    /// Callers currently attached to the fetch for `tile`, if one is in flight.
    pub fn waiters(&self, tile: TileCoordinate) -> Option<usize> {
        self.inner
            .state
            .lock()
            .in_flight
            .get(&tile)
            .map(|f| f.waiters)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.state.lock().stats
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Replace the tile-loaded observer. The observer runs outside the cache
    /// lock, on whichever task completed the fetch.
    pub fn set_on_tile_loaded(&self, observer: Option<TileLoadedObserver>) {
        self.inner.state.lock().observer = observer;
    }

    /// Texture for the tile containing `point` at `zoom`.
    pub fn get_texture(&self, point: GeoPoint, zoom: u8) -> BoxFuture<'static, Option<Texture>> {
        self.get_tile(to_tile(point, zoom))
    }

    /// Texture for `tile`: resident entry, shared in-flight fetch, or a new fetch.
    ///
    /// The lookup and any in-flight registration happen when this is called,
    /// not when the returned future is first polled.
    pub fn get_tile(&self, tile: TileCoordinate) -> BoxFuture<'static, Option<Texture>> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        if state.disposed {
            return Box::pin(std::future::ready(None));
        }

        if let Some(entry) = state.entries.get(&tile) {
            state.stats.hits += 1;
            let texture = entry.texture.clone();
            return Box::pin(std::future::ready(Some(texture)));
        }

        if let Some(flight) = state.in_flight.get_mut(&tile) {
            flight.waiters += 1;
            state.stats.deduplicated += 1;
            debug!(%tile, waiters = flight.waiters, "joined in-flight tile fetch");
            return Box::pin(flight.future.clone());
        }

        state.stats.misses += 1;
        state.stats.fetches += 1;
        let url = self.inner.source.url_for(tile);
        debug!(%tile, %url, "fetching tile");

        let load = self.inner.loader.load(url.clone());
        let epoch = state.epoch;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let fetch: BoxFuture<'static, Option<Texture>> = Box::pin(async move {
            let texture = load.await;
            match weak.upgrade() {
                Some(inner) => inner.complete(tile, &url, epoch, texture),
                None => {
                    if let Some(t) = texture {
                        t.release();
                    }
                    None
                }
            }
        });
        let shared = fetch.shared();
        state.in_flight.insert(
            tile,
            InFlight {
                future: shared.clone(),
                waiters: 1,
            },
        );
        Box::pin(shared)
    }

    /// Pin a resident tile against eviction while it is on screen.
    ///
    /// Returns `false` when the tile is not resident.
    pub fn pin(&self, tile: TileCoordinate) -> bool {
        let mut state = self.inner.state.lock();
        match state.entries.get_mut(&tile) {
            Some(entry) => {
                entry.pin_count = entry.pin_count.saturating_add(1);
                true
            }
            None => false,
        }
    }

    pub fn unpin(&self, tile: TileCoordinate) {
        let mut state = self.inner.state.lock();
        if let Some(entry) = state.entries.get_mut(&tile) {
            entry.pin_count = entry.pin_count.saturating_sub(1);
        }
    }

    /// Release every texture and clear entries, in-flight requests and the
    /// observer. Fetches still running resolve to `None`. Idempotent.
    pub fn dispose(&self) {
        let entries = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.epoch += 1;
            state.in_flight.clear();
            state.observer = None;
            std::mem::take(&mut state.entries)
        };

        let released = entries.len();
        for entry in entries.into_values() {
            entry.texture.release();
        }
        info!(released, "tile cache disposed");
    }
}

impl Inner {
    fn complete(
        &self,
        tile: TileCoordinate,
        url: &str,
        epoch: u64,
        texture: Option<Texture>,
    ) -> Option<Texture> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.disposed || state.epoch != epoch {
            state.stats.stale += 1;
            drop(guard);
            debug!(%tile, "discarding tile fetched after dispose");
            if let Some(t) = texture {
                t.release();
            }
            return None;
        }

        let waiters = state.in_flight.remove(&tile).map_or(0, |f| f.waiters);
        let Some(texture) = texture else {
            state.stats.failures += 1;
            warn!(%tile, url, waiters, "tile fetch failed; not cached");
            return None;
        };

        let insertion = state.insert(tile, texture.clone(), self.max_cached_tiles);
        let observer = state.observer.clone();
        let resident = state.entries.len();
        drop(guard);

        for (key, old) in insertion.evicted {
            debug!(tile = %key, "evicting tile");
            old.release();
        }
        if insertion.cached {
            debug!(%tile, waiters, resident, "tile resident");
        } else {
            debug!(%tile, waiters, resident, "every resident tile is pinned; not cached");
        }

        if let Some(observer) = observer {
            observer(tile);
        }
        Some(texture)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use foundation::math::GeoPoint;
    use futures_util::future::join_all;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use tokio::sync::Semaphore;

    use super::{CacheStats, TileCache};
    use crate::loader::{BoxFuture, TextureLoader};
    use crate::texture::Texture;
    use crate::tile::{TileCoordinate, to_tile};
    use crate::url::TileSourceConfig;

    /// Loader whose fetches wait on a semaphore permit.
    struct TestLoader {
        calls: AtomicUsize,
        fail: AtomicBool,
        gate: Arc<Semaphore>,
        urls: Mutex<Vec<String>>,
        made: Mutex<Vec<Texture>>,
    }

    impl TestLoader {
        fn open() -> Arc<Self> {
            Self::with_permits(Semaphore::MAX_PERMITS)
        }

        fn gated() -> Arc<Self> {
            Self::with_permits(0)
        }

        fn with_permits(permits: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                gate: Arc::new(Semaphore::new(permits)),
                urls: Mutex::new(Vec::new()),
                made: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TextureLoader for TestLoader {
        fn load(&self, url: String) -> BoxFuture<'static, Option<Texture>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().push(url);
            let gate = Arc::clone(&self.gate);
            let result = if self.fail.load(Ordering::SeqCst) {
                None
            } else {
                let t = Texture::from_rgba8(1, 1, vec![0; 4]);
                self.made.lock().push(t.clone());
                Some(t)
            };
            Box::pin(async move {
                let _permit = gate.acquire().await;
                result
            })
        }
    }

    fn cache_with(max: usize, loader: Arc<TestLoader>) -> TileCache {
        TileCache::new(max, TileSourceConfig::default(), loader)
    }

    const ZOOM: u8 = 5;

    fn p(lng: f64) -> GeoPoint {
        GeoPoint::new(0.0, lng)
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let loader = TestLoader::open();
        let cache = cache_with(10, loader.clone());

        let futures: Vec<_> = (0..5).map(|_| cache.get_texture(p(1.0), ZOOM)).collect();
        assert_eq!(cache.waiters(to_tile(p(1.0), ZOOM)), Some(5));
        let results = join_all(futures).await;

        assert_eq!(loader.calls(), 1);
        let first = results[0].clone().expect("texture");
        assert!(results.iter().all(|r| r.as_ref() == Some(&first)));
        assert_eq!(cache.in_flight_len(), 0);

        // Same tile through a different point is a hit.
        let again = cache.get_texture(p(2.0), ZOOM).await;
        assert_eq!(again, Some(first));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                deduplicated: 4,
                fetches: 1,
                ..CacheStats::default()
            }
        );
    }

    #[tokio::test]
    async fn requests_use_row_then_column_urls() {
        let loader = TestLoader::open();
        let cache = cache_with(10, loader.clone());
        cache.get_tile(TileCoordinate::new(5, 17, 14)).await;
        let urls = loader.urls.lock().clone();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].ends_with("/500m/5/14/17.jpg"), "{}", urls[0]);
    }

    #[tokio::test]
    async fn size_never_exceeds_bound_and_oldest_goes_first() {
        let loader = TestLoader::open();
        let cache = cache_with(2, loader.clone());

        for lng in [0.0, 20.0, 40.0, 60.0] {
            assert!(cache.get_texture(p(lng), ZOOM).await.is_some());
            assert!(cache.len() <= 2);
        }

        let expected = vec![to_tile(p(40.0), ZOOM), to_tile(p(60.0), ZOOM)];
        assert_eq!(cache.resident_tiles(), expected);
        assert_eq!(cache.stats().evictions, 2);

        let made = loader.made.lock().clone();
        assert!(made[0].is_released() && made[1].is_released());
        assert!(!made[2].is_released() && !made[3].is_released());
    }

    #[tokio::test]
    async fn pinned_tiles_survive_eviction() {
        let loader = TestLoader::open();
        let cache = cache_with(2, loader.clone());

        cache.get_texture(p(0.0), ZOOM).await;
        cache.get_texture(p(20.0), ZOOM).await;
        assert!(cache.pin(to_tile(p(0.0), ZOOM)));
        cache.get_texture(p(40.0), ZOOM).await;

        assert!(cache.contains(to_tile(p(0.0), ZOOM)));
        assert!(!cache.contains(to_tile(p(20.0), ZOOM)));
        assert!(!cache.pin(to_tile(p(20.0), ZOOM)));
    }

    #[tokio::test]
    async fn late_fetch_never_evicts_a_pinned_tile() {
        let loader = TestLoader::gated();
        let cache = cache_with(1, loader.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cache.set_on_tile_loaded(Some(Arc::new(move |tile| sink.lock().push(tile))));

        let late = cache.get_texture(p(60.0), ZOOM);
        let on_screen = cache.get_texture(p(0.0), ZOOM);
        loader.gate.add_permits(1);
        let shown = on_screen.await.expect("texture");
        assert!(cache.pin(to_tile(p(0.0), ZOOM)));

        loader.gate.add_permits(1);
        let extra = late.await.expect("texture is still handed out");
        assert!(!extra.is_released());

        assert_eq!(cache.resident_tiles(), vec![to_tile(p(0.0), ZOOM)]);
        assert!(!shown.is_released());
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.stats().uncached, 1);
        assert_eq!(cache.in_flight_len(), 0);
        assert_eq!(
            *seen.lock(),
            vec![to_tile(p(0.0), ZOOM), to_tile(p(60.0), ZOOM)]
        );

        // Once unpinned, the next fetch may take its slot.
        cache.unpin(to_tile(p(0.0), ZOOM));
        loader.gate.add_permits(1);
        assert!(cache.get_texture(p(60.0), ZOOM).await.is_some());
        assert_eq!(cache.resident_tiles(), vec![to_tile(p(60.0), ZOOM)]);
        assert!(shown.is_released());
    }

    #[tokio::test]
    async fn failures_are_not_cached_and_retry_later() {
        let loader = TestLoader::open();
        loader.fail.store(true, Ordering::SeqCst);
        let cache = cache_with(10, loader.clone());

        assert_eq!(cache.get_texture(p(0.0), ZOOM).await, None);
        assert!(cache.is_empty());
        assert_eq!(cache.in_flight_len(), 0);
        assert_eq!(cache.stats().failures, 1);

        loader.fail.store(false, Ordering::SeqCst);
        assert!(cache.get_texture(p(0.0), ZOOM).await.is_some());
        assert_eq!(loader.calls(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn observer_fires_once_per_resident_tile() {
        let loader = TestLoader::open();
        let cache = cache_with(10, loader);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cache.set_on_tile_loaded(Some(Arc::new(move |tile| sink.lock().push(tile))));

        let a = cache.get_texture(p(0.0), ZOOM);
        let b = cache.get_texture(p(0.5), ZOOM);
        join_all([a, b]).await;
        cache.get_texture(p(0.0), ZOOM).await;

        assert_eq!(*seen.lock(), vec![to_tile(p(0.0), ZOOM)]);
    }

    #[tokio::test]
    async fn dispose_releases_everything_and_drops_late_results() {
        let loader = TestLoader::gated();
        let cache = cache_with(10, loader.clone());

        let first = cache.get_texture(p(0.0), ZOOM);
        loader.gate.add_permits(1);
        let resident = first.await.expect("texture");

        let pending = cache.get_texture(p(40.0), ZOOM);
        assert_eq!(cache.in_flight_len(), 1);

        cache.dispose();
        cache.dispose();
        assert!(resident.is_released());
        assert!(cache.is_empty());
        assert_eq!(cache.in_flight_len(), 0);

        loader.gate.add_permits(1);
        assert_eq!(pending.await, None);
        let late = loader.made.lock()[1].clone();
        assert!(late.is_released());
        assert_eq!(cache.stats().stale, 1);

        assert_eq!(cache.get_texture(p(0.0), ZOOM).await, None);
        assert_eq!(loader.calls(), 2);
    }
}
