use runtime::ThrottleConfig;
use serde::{Deserialize, Serialize};
use streaming::tile::MAX_ZOOM;
use streaming::{DEFAULT_MAX_CACHED_TILES, TileSourceConfig};

/// Tile zoom used for camera distances in `[min_distance, max_distance)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomLevel {
    pub min_distance: f64,
    pub max_distance: f64,
    pub zoom: u8,
}

impl ZoomLevel {
    pub fn new(min_distance: f64, max_distance: f64, zoom: u8) -> Self {
        Self {
            min_distance,
            max_distance,
            zoom,
        }
    }

    pub fn contains(&self, distance: f64) -> bool {
        distance >= self.min_distance && distance < self.max_distance
    }

    fn gap_to(&self, distance: f64) -> f64 {
        if distance < self.min_distance {
            self.min_distance - distance
        } else {
            (distance - self.max_distance).max(0.0)
        }
    }
}

/// Every tunable of the streaming LOD loop.
///
/// Missing fields deserialize to their defaults, so a partial JSON document
/// only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    pub tiles: TileSourceConfig,
    /// Zoom used when `zoom_levels` is empty.
    pub zoom: u8,
    /// Optional distance bands; the band containing the camera distance wins,
    /// the nearest band when none does.
    pub zoom_levels: Vec<ZoomLevel>,
    pub max_cached_tiles: usize,
    pub max_patches: usize,
    pub base_patch_size: f64,
    pub reference_distance: f64,
    /// Outward offset of patch centers, as a fraction of the surface radius.
    pub surface_offset: f64,
    pub base_uv_extent: f64,
    /// Tile groups fetched concurrently per batch.
    pub batch_size: usize,
    pub update_interval_ms: u64,
    pub movement_threshold: f64,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            tiles: TileSourceConfig::default(),
            zoom: 5,
            zoom_levels: Vec::new(),
            max_cached_tiles: DEFAULT_MAX_CACHED_TILES,
            max_patches: 20,
            base_patch_size: 0.1,
            reference_distance: 2.0,
            surface_offset: 0.0005,
            base_uv_extent: 0.05,
            batch_size: 3,
            update_interval_ms: 500,
            movement_threshold: 0.1,
        }
    }
}

impl LodConfig {
    pub fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig {
            interval_ms: self.update_interval_ms,
            movement_threshold: self.movement_threshold,
        }
    }

    pub fn zoom_for_distance(&self, distance: f64) -> u8 {
        select_zoom(&self.zoom_levels, self.zoom, distance)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be at least 1"));
        }
        if self.max_cached_tiles == 0 {
            return Err(ConfigError::invalid("max_cached_tiles", "must be at least 1"));
        }
        positive("base_patch_size", self.base_patch_size)?;
        positive("reference_distance", self.reference_distance)?;
        positive("base_uv_extent", self.base_uv_extent)?;
        if !(self.surface_offset.is_finite() && self.surface_offset >= 0.0) {
            return Err(ConfigError::invalid("surface_offset", "must be non-negative"));
        }
        if !(self.movement_threshold.is_finite() && self.movement_threshold >= 0.0) {
            return Err(ConfigError::invalid(
                "movement_threshold",
                "must be non-negative",
            ));
        }
        if self.zoom > MAX_ZOOM {
            return Err(ConfigError::invalid(
                "zoom",
                format!("must be at most {MAX_ZOOM}"),
            ));
        }

        for band in &self.zoom_levels {
            if band.zoom > MAX_ZOOM {
                return Err(ConfigError::invalid(
                    "zoom_levels",
                    format!("zoom {} exceeds {MAX_ZOOM}", band.zoom),
                ));
            }
            if band.min_distance.is_nan() || band.max_distance.is_nan() {
                return Err(ConfigError::invalid("zoom_levels", "NaN distance"));
            }
            if band.min_distance >= band.max_distance {
                return Err(ConfigError::invalid(
                    "zoom_levels",
                    format!(
                        "empty band [{}, {})",
                        band.min_distance, band.max_distance
                    ),
                ));
            }
        }
        let mut sorted = self.zoom_levels.clone();
        sorted.sort_by(|a, b| a.min_distance.total_cmp(&b.min_distance));
        for pair in sorted.windows(2) {
            if pair[1].min_distance < pair[0].max_distance {
                return Err(ConfigError::invalid(
                    "zoom_levels",
                    format!(
                        "bands [{}, {}) and [{}, {}) overlap",
                        pair[0].min_distance,
                        pair[0].max_distance,
                        pair[1].min_distance,
                        pair[1].max_distance
                    ),
                ));
            }
        }
        Ok(())
    }
}

pub(crate) fn positive(field: &'static str, v: f64) -> Result<(), ConfigError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be positive, got {v}")))
    }
}

/// Zoom of the band containing `distance`, else of the band nearest to it.
/// Independent of the order `levels` are listed in.
pub(crate) fn select_zoom(levels: &[ZoomLevel], fallback: u8, distance: f64) -> u8 {
    if let Some(band) = levels.iter().find(|band| band.contains(distance)) {
        return band.zoom;
    }
    levels
        .iter()
        .min_by(|a, b| {
            a.gap_to(distance)
                .total_cmp(&b.gap_to(distance))
                .then_with(|| a.min_distance.total_cmp(&b.min_distance))
        })
        .map_or(fallback, |band| band.zoom)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid `{}`: {}", self.field, self.reason)
    }
}

impl std::error::Error for ConfigError {}
