//! Turns ranked surface points into a bounded set of textured patches.
//!
//! A rebuild runs in two halves so the network wait never holds `&mut self`:
//! - [`PatchScheduler::begin_rebuild`] tears down the active set, bumps the
//!   generation and returns a [`PendingRebuild`] that fetches textures.
//! - [`PatchScheduler::apply`] hands the finished patches to the scene, but
//!   only if no newer rebuild (or dispose) happened in between.

use std::collections::{BTreeMap, BTreeSet};
use std::future::IntoFuture;

use foundation::math::{Vec2, Vec3};
use futures_util::future::join_all;
use scene::SurfacePoint;
use streaming::{BoxFuture, Texture, TileCache, TileCoordinate, to_tile, uv_within_tile};
use tracing::debug;

use crate::config::{LodConfig, ZoomLevel, positive, select_zoom};
use crate::patch::{PatchDescriptor, PatchId, PatchSink};

pub const MIN_UV_EXTENT: f64 = 0.01;
pub const MAX_UV_EXTENT: f64 = 0.1;

/// World-space patch size for a camera at `camera_distance`.
///
/// Scales linearly with distance around `reference_distance`, limited to
/// half and double the base size.
pub fn patch_size(base: f64, camera_distance: f64, reference_distance: f64) -> f64 {
    base * (camera_distance / reference_distance).clamp(0.5, 2.0)
}

/// UV span covered by one patch; a closer camera gets a smaller span and so
/// more texels per world unit.
pub fn uv_extent(base: f64, camera_distance: f64, reference_distance: f64) -> f64 {
    (base * camera_distance / reference_distance).clamp(MIN_UV_EXTENT, MAX_UV_EXTENT)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchConfig {
    pub zoom: u8,
    pub zoom_levels: Vec<ZoomLevel>,
    pub max_patches: usize,
    pub base_patch_size: f64,
    pub reference_distance: f64,
    pub surface_offset: f64,
    pub base_uv_extent: f64,
    pub batch_size: usize,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self::from(&LodConfig::default())
    }
}

impl From<&LodConfig> for PatchConfig {
    fn from(cfg: &LodConfig) -> Self {
        Self {
            zoom: cfg.zoom,
            zoom_levels: cfg.zoom_levels.clone(),
            max_patches: cfg.max_patches,
            base_patch_size: cfg.base_patch_size,
            reference_distance: cfg.reference_distance,
            surface_offset: cfg.surface_offset,
            base_uv_extent: cfg.base_uv_extent,
            batch_size: cfg.batch_size,
        }
    }
}

/// A patch with its texture resolved but no id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPatch {
    pub anchor: SurfacePoint,
    pub tile: TileCoordinate,
    pub uv_origin: Vec2,
    pub uv_extent: Vec2,
    pub size_world_units: f64,
    pub position: Vec3,
    pub normal: Vec3,
    pub texture: Texture,
}

/// Output of one rebuild pass.
#[derive(Debug, Clone)]
pub struct BuiltPatches {
    pub generation: u64,
    pub zoom: u8,
    pub camera_distance: f64,
    pub patches: Vec<PlannedPatch>,
    /// Tiles whose fetch failed this pass; their points got no patch.
    pub failed_tiles: Vec<TileCoordinate>,
}

/// Texture fetching half of a rebuild. Await it, then pass the result to
/// [`PatchScheduler::apply`].
pub struct PendingRebuild {
    generation: u64,
    future: BoxFuture<'static, BuiltPatches>,
}

impl PendingRebuild {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl std::fmt::Debug for PendingRebuild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRebuild")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl IntoFuture for PendingRebuild {
    type Output = BuiltPatches;
    type IntoFuture = BoxFuture<'static, BuiltPatches>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

struct BuildPlan {
    generation: u64,
    zoom: u8,
    camera_distance: f64,
    globe_center: Vec3,
    config: PatchConfig,
    groups: Vec<(TileCoordinate, Vec<SurfacePoint>)>,
}

/// Bucket points by tile. `BTreeMap` gives the stable tile-key order; points
/// keep their ranked order within a bucket.
fn group_by_tile(
    points: Vec<SurfacePoint>,
    zoom: u8,
) -> Vec<(TileCoordinate, Vec<SurfacePoint>)> {
    let mut groups: BTreeMap<TileCoordinate, Vec<SurfacePoint>> = BTreeMap::new();
    for point in points {
        groups.entry(to_tile(point.geo, zoom)).or_default().push(point);
    }
    groups.into_iter().collect()
}

fn plan_patch(plan: &BuildPlan, tile: TileCoordinate, point: &SurfacePoint, texture: &Texture) -> PlannedPatch {
    let cfg = &plan.config;
    let size = patch_size(cfg.base_patch_size, plan.camera_distance, cfg.reference_distance);
    let extent = uv_extent(cfg.base_uv_extent, plan.camera_distance, cfg.reference_distance);
    let radial = point.world_position - plan.globe_center;
    PlannedPatch {
        anchor: *point,
        tile,
        uv_origin: uv_within_tile(point.geo, tile),
        uv_extent: Vec2::splat(extent),
        size_world_units: size,
        position: plan.globe_center + radial * (1.0 + cfg.surface_offset),
        normal: point.normal,
        texture: texture.clone(),
    }
}

async fn build(cache: TileCache, plan: BuildPlan) -> BuiltPatches {
    let max_patches = plan.config.max_patches;
    let mut patches: Vec<PlannedPatch> = Vec::new();
    let mut failed_tiles: Vec<TileCoordinate> = Vec::new();

    'batches: for batch in plan.groups.chunks(plan.config.batch_size.max(1)) {
        if patches.len() >= max_patches {
            break;
        }
        // Sequential batches, concurrent fetches within one.
        let fetches = batch
            .iter()
            .map(|(_, points)| cache.get_texture(points[0].geo, plan.zoom));
        let textures = join_all(fetches).await;

        for ((tile, points), texture) in batch.iter().zip(textures) {
            let Some(texture) = texture else {
                failed_tiles.push(*tile);
                continue;
            };
            for point in points {
                if patches.len() >= max_patches {
                    break 'batches;
                }
                patches.push(plan_patch(&plan, *tile, point, &texture));
            }
        }
    }

    BuiltPatches {
        generation: plan.generation,
        zoom: plan.zoom,
        camera_distance: plan.camera_distance,
        patches,
        failed_tiles,
    }
}

/// Owns the active patch set and keeps it in step with the scene sink.
///
/// Invariants:
/// - `active_patches().len() <= max_patches`
/// - every active patch's tile is resident (and pinned) in the cache
pub struct PatchScheduler<S: PatchSink> {
    config: PatchConfig,
    cache: TileCache,
    sink: S,
    globe_center: Vec3,
    active: Vec<PatchDescriptor>,
    pinned: BTreeSet<TileCoordinate>,
    generation: u64,
    next_id: u64,
    disposed: bool,
}

impl<S: PatchSink> PatchScheduler<S> {
    pub fn new(config: PatchConfig, cache: TileCache, sink: S) -> Self {
        Self {
            config,
            cache,
            sink,
            globe_center: Vec3::ZERO,
            active: Vec::new(),
            pinned: BTreeSet::new(),
            generation: 0,
            next_id: 1,
            disposed: false,
        }
    }

    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn active_patches(&self) -> &[PatchDescriptor] {
        &self.active
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Patch centers are offset away from this point.
    pub fn set_globe_center(&mut self, center: Vec3) {
        self.globe_center = center;
    }

    pub fn set_max_patches(&mut self, max_patches: usize) {
        self.config.max_patches = max_patches;
    }

    /// Non-finite or non-positive sizes are ignored.
    pub fn set_patch_size(&mut self, base_patch_size: f64) {
        if positive("base_patch_size", base_patch_size).is_ok() {
            self.config.base_patch_size = base_patch_size;
        }
    }

    /// Tear down the active set and start fetching for `points`.
    ///
    /// Any earlier pending rebuild becomes stale.
    pub fn begin_rebuild(&mut self, points: Vec<SurfacePoint>, camera_distance: f64) -> PendingRebuild {
        self.clear();
        self.generation += 1;
        let generation = self.generation;

        let zoom = select_zoom(&self.config.zoom_levels, self.config.zoom, camera_distance);
        let groups = if self.disposed {
            Vec::new()
        } else {
            group_by_tile(points, zoom)
        };
        debug!(
            generation,
            zoom,
            camera_distance,
            tiles = groups.len(),
            "patch rebuild started"
        );

        let plan = BuildPlan {
            generation,
            zoom,
            camera_distance,
            globe_center: self.globe_center,
            config: self.config.clone(),
            groups,
        };
        PendingRebuild {
            generation,
            future: Box::pin(build(self.cache.clone(), plan)),
        }
    }

    /// Install a finished pass. Returns `false` (and changes nothing) when the
    /// pass is stale or the scheduler was disposed.
    pub fn apply(&mut self, built: BuiltPatches) -> bool {
        if self.disposed || built.generation != self.generation {
            debug!(
                generation = built.generation,
                current = self.generation,
                disposed = self.disposed,
                "discarding stale patch rebuild"
            );
            return false;
        }

        self.clear();
        let mut evicted = 0usize;
        for planned in built.patches {
            if self.active.len() >= self.config.max_patches {
                break;
            }
            if !self.pinned.contains(&planned.tile) {
                // The tile may have been evicted while the pass was running.
                if !self.cache.pin(planned.tile) {
                    evicted += 1;
                    continue;
                }
                self.pinned.insert(planned.tile);
            }

            let descriptor = PatchDescriptor {
                id: PatchId(self.next_id),
                anchor: planned.anchor,
                tile: planned.tile,
                uv_origin: planned.uv_origin,
                uv_extent: planned.uv_extent,
                size_world_units: planned.size_world_units,
                position: planned.position,
                normal: planned.normal,
                texture: planned.texture,
            };
            self.next_id += 1;
            self.sink.add_patch(&descriptor);
            self.active.push(descriptor);
        }

        debug!(
            generation = built.generation,
            patches = self.active.len(),
            failed_tiles = built.failed_tiles.len(),
            evicted,
            "patch rebuild applied"
        );
        true
    }

    /// Full rebuild: begin, await the fetches, apply.
    pub async fn rebuild(&mut self, points: Vec<SurfacePoint>, camera_distance: f64) -> bool {
        let pending = self.begin_rebuild(points, camera_distance);
        let built = pending.await;
        self.apply(built)
    }

    /// Remove every active patch from the scene and unpin their tiles.
    pub fn clear(&mut self) {
        for patch in self.active.drain(..) {
            self.sink.remove_patch(patch.id);
        }
        for tile in std::mem::take(&mut self.pinned) {
            self.cache.unpin(tile);
        }
    }

    /// Clear and refuse all later applies. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.clear();
        self.disposed = true;
        self.generation += 1;
    }
}
