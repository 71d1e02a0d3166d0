use std::collections::BTreeMap;

use foundation::math::{Vec2, Vec3};
use scene::SurfacePoint;
use streaming::{Texture, TileCoordinate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatchId(pub u64);

impl std::fmt::Display for PatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "patch#{}", self.0)
    }
}

/// A textured quad laid over the globe surface at one sampled point.
///
/// Patches are immutable once handed to the scene; each rebuild replaces the
/// whole set.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchDescriptor {
    pub id: PatchId,
    pub anchor: SurfacePoint,
    pub tile: TileCoordinate,
    /// Center of the patch in tile UV space.
    pub uv_origin: Vec2,
    pub uv_extent: Vec2,
    pub size_world_units: f64,
    /// Patch center, lifted slightly off the surface.
    pub position: Vec3,
    /// Facing direction (outward surface normal).
    pub normal: Vec3,
    pub texture: Texture,
}

/// Host-side scene that displays patches.
pub trait PatchSink {
    fn add_patch(&mut self, patch: &PatchDescriptor);
    fn remove_patch(&mut self, id: PatchId);
}

/// In-memory sink that keeps the live patch set and mutation counts.
#[derive(Debug, Default, Clone)]
pub struct PatchLog {
    live: BTreeMap<PatchId, PatchDescriptor>,
    added: u64,
    removed: u64,
}

impl PatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> impl Iterator<Item = &PatchDescriptor> {
        self.live.values()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn added(&self) -> u64 {
        self.added
    }

    pub fn removed(&self) -> u64 {
        self.removed
    }
}

impl PatchSink for PatchLog {
    fn add_patch(&mut self, patch: &PatchDescriptor) {
        self.added += 1;
        self.live.insert(patch.id, patch.clone());
    }

    fn remove_patch(&mut self, id: PatchId) {
        if self.live.remove(&id).is_some() {
            self.removed += 1;
        }
    }
}
