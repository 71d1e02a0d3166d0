use std::sync::Arc;

use futures_util::FutureExt;
use runtime::{CameraSnapshot, Clock, UpdateThrottle};
use scene::{CameraState, GlobeMesh, VisibilitySampler};
use streaming::{TextureLoader, TileCache, TileCoordinate};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, LodConfig, positive};
use crate::patch::{PatchDescriptor, PatchSink};
use crate::scheduler::{BuiltPatches, PatchConfig, PatchScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LodState {
    Uninitialized,
    Ready,
    /// Terminal.
    Disposed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LodStats {
    /// Rebuild passes started, including the initial one.
    pub rebuilds: u64,
    pub applied: u64,
    pub stale_discarded: u64,
    pub active_patches: usize,
}

/// Drives sampling and patch rebuilds from the host's frame loop.
///
/// `update` is meant to be called every frame and stays cheap: it applies
/// finished rebuilds, reacts to freshly loaded tiles and otherwise consults
/// the throttle. Texture fetches run on the tokio runtime; their results are
/// only ever applied to the sink from `update`, `initialize` or `settle`.
pub struct LodController<S: PatchSink> {
    config: LodConfig,
    state: LodState,
    mesh: Arc<GlobeMesh>,
    sampler: VisibilitySampler,
    scheduler: PatchScheduler<S>,
    cache: TileCache,
    throttle: UpdateThrottle,
    clock: Arc<dyn Clock>,
    runtime: Handle,
    loaded_rx: mpsc::UnboundedReceiver<TileCoordinate>,
    pending: Vec<JoinHandle<BuiltPatches>>,
    last_camera: Option<CameraState>,
    stats: LodStats,
}

impl<S: PatchSink> LodController<S> {
    /// Build a controller in the `Uninitialized` state.
    ///
    /// Rebuild passes are spawned on `runtime`.
    pub fn new(
        config: LodConfig,
        mesh: Arc<GlobeMesh>,
        sink: S,
        loader: Arc<dyn TextureLoader>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let cache = TileCache::new(config.max_cached_tiles, config.tiles.clone(), loader);
        let (loaded_tx, loaded_rx) = mpsc::unbounded_channel();
        cache.set_on_tile_loaded(Some(Arc::new(move |tile| {
            // The receiver is gone only after dispose.
            let _ = loaded_tx.send(tile);
        })));

        let mut scheduler = PatchScheduler::new(PatchConfig::from(&config), cache.clone(), sink);
        scheduler.set_globe_center(mesh.center());

        Ok(Self {
            sampler: VisibilitySampler::new(config.max_patches),
            throttle: UpdateThrottle::new(config.throttle()),
            state: LodState::Uninitialized,
            config,
            mesh,
            scheduler,
            cache,
            clock,
            runtime,
            loaded_rx,
            pending: Vec::new(),
            last_camera: None,
            stats: LodStats::default(),
        })
    }

    pub fn state(&self) -> LodState {
        self.state
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    pub fn stats(&self) -> LodStats {
        LodStats {
            active_patches: self.scheduler.active_patches().len(),
            ..self.stats
        }
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn mesh(&self) -> &GlobeMesh {
        &self.mesh
    }

    pub fn sink(&self) -> &S {
        self.scheduler.sink()
    }

    pub fn active_patches(&self) -> &[PatchDescriptor] {
        self.scheduler.active_patches()
    }

    /// Rebuild passes spawned but not yet applied or discarded.
    pub fn pending_rebuilds(&self) -> usize {
        self.pending.len()
    }

    /// Distance from the camera eye to the globe center.
    pub fn camera_distance(&self, camera: &CameraState) -> f64 {
        camera.position.distance(self.mesh.center())
    }

    /// Run the first rebuild to completion and become `Ready`.
    ///
    /// Does nothing unless the controller is `Uninitialized`.
    pub async fn initialize(&mut self, camera: &CameraState) {
        if self.state != LodState::Uninitialized {
            debug!(state = ?self.state, "initialize ignored");
            return;
        }

        self.last_camera = Some(*camera);
        let points = self.sampler.sample(camera, &self.mesh);
        let distance = self.camera_distance(camera);
        self.stats.rebuilds += 1;
        let built = self.scheduler.begin_rebuild(points, distance).await;
        self.apply_built(built);

        self.throttle
            .prime(self.clock.now_ms(), CameraSnapshot::new(camera.position, camera.target));
        // Tiles from the initial pass are already on screen.
        while self.loaded_rx.try_recv().is_ok() {}

        self.state = LodState::Ready;
        info!(
            patches = self.scheduler.active_patches().len(),
            tiles = self.cache.len(),
            "LOD controller ready"
        );
    }

    /// Per-frame entry point. No-op unless `Ready`.
    pub fn update(&mut self, camera: &CameraState) {
        if self.state != LodState::Ready {
            return;
        }
        self.last_camera = Some(*camera);
        self.collect_finished();

        let mut loaded = 0usize;
        while self.loaded_rx.try_recv().is_ok() {
            loaded += 1;
        }

        let snapshot = CameraSnapshot::new(camera.position, camera.target);
        if loaded > 0 {
            debug!(loaded, "tiles arrived; forcing rebuild");
            self.start_rebuild(camera);
        } else if self.throttle.poll(self.clock.now_ms(), snapshot) {
            self.start_rebuild(camera);
        }
    }

    /// Await every outstanding rebuild and apply what is still current.
    pub async fn settle(&mut self) {
        for handle in std::mem::take(&mut self.pending) {
            match handle.await {
                Ok(built) => self.apply_built(built),
                Err(err) => warn!(error = %err, "rebuild task failed"),
            }
        }
    }

    pub fn set_max_patches(&mut self, max_patches: usize) {
        self.config.max_patches = max_patches;
        self.sampler.set_max_points(max_patches);
        self.scheduler.set_max_patches(max_patches);
        self.rebuild_now();
    }

    /// Ignored (with a warning) unless `base_patch_size` is finite and positive.
    pub fn set_patch_size(&mut self, base_patch_size: f64) {
        if let Err(err) = positive("base_patch_size", base_patch_size) {
            warn!(%err, "patch size unchanged");
            return;
        }
        self.config.base_patch_size = base_patch_size;
        self.scheduler.set_patch_size(base_patch_size);
        self.rebuild_now();
    }

    /// Tear everything down. Later calls of any kind are no-ops. Idempotent.
    pub fn dispose(&mut self) {
        if self.state == LodState::Disposed {
            return;
        }
        self.state = LodState::Disposed;

        // Passes still running finish on their own; nothing reads their results.
        let detached = std::mem::take(&mut self.pending).len();
        self.scheduler.dispose();
        self.cache.set_on_tile_loaded(None);
        self.cache.dispose();
        self.loaded_rx.close();
        info!(detached, "LOD controller disposed");
    }

    fn rebuild_now(&mut self) {
        if self.state != LodState::Ready {
            return;
        }
        if let Some(camera) = self.last_camera {
            self.start_rebuild(&camera);
        }
    }

    fn start_rebuild(&mut self, camera: &CameraState) {
        let points = self.sampler.sample(camera, &self.mesh);
        let distance = self.camera_distance(camera);
        let pending = self.scheduler.begin_rebuild(points, distance);
        self.stats.rebuilds += 1;
        self.pending.push(self.runtime.spawn(pending.into_future()));
    }

    fn collect_finished(&mut self) {
        if self.pending.iter().all(|h| !h.is_finished()) {
            return;
        }
        let (done, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|h| h.is_finished());
        self.pending = running;

        for handle in done {
            match handle.now_or_never() {
                Some(Ok(built)) => self.apply_built(built),
                Some(Err(err)) => warn!(error = %err, "rebuild task failed"),
                None => {}
            }
        }
    }

    fn apply_built(&mut self, built: BuiltPatches) {
        if self.scheduler.apply(built) {
            self.stats.applied += 1;
        } else {
            self.stats.stale_discarded += 1;
        }
    }
}

impl<S: PatchSink> Drop for LodController<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
