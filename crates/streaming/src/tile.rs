//! Equirectangular tile addressing.
//!
//! At zoom `z` the globe is split into `2^z` columns of longitude and `2^z`
//! rows of latitude. Column 0 starts at -180°, row 0 starts at the north pole.

use foundation::math::{GeoBounds, GeoPoint, Vec2};
use serde::{Deserialize, Serialize};

/// Highest zoom whose tile indices fit in `u32`.
pub const MAX_ZOOM: u8 = 30;

/// Largest `f64` strictly below 1.
const BELOW_ONE: f64 = 1.0 - f64::EPSILON / 2.0;

/// Tile address in an equirectangular `zoom/x/y` grid.
///
/// Ordering is `(zoom, x, y)` lexicographic, which is the deterministic key
/// order used when tiles are grouped or iterated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoordinate {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoordinate {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Tiles per axis at `zoom` (`2^zoom`).
    pub fn tiles_per_axis(zoom: u8) -> u32 {
        1u32 << zoom.min(MAX_ZOOM)
    }

    /// North-west corner of the tile.
    pub fn origin(&self) -> GeoPoint {
        geo_at(*self, Vec2::ZERO)
    }

    pub fn bounds(&self) -> GeoBounds {
        let n = Self::tiles_per_axis(self.zoom) as f64;
        let lng_span = 360.0 / n;
        let lat_span = 180.0 / n;
        let min_lng = self.x as f64 * lng_span - 180.0;
        let max_lat = 90.0 - self.y as f64 * lat_span;
        GeoBounds {
            min_lat: max_lat - lat_span,
            max_lat,
            min_lng,
            max_lng: min_lng + lng_span,
        }
    }
}

impl std::fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Continuous grid position of `point` at `zoom`, in tile units.
fn grid_position(point: GeoPoint, zoom: u8) -> (f64, f64) {
    let p = point.normalized();
    let n = TileCoordinate::tiles_per_axis(zoom) as f64;
    let fx = ((p.lng + 180.0) / 360.0) * n;
    let fy = ((90.0 - p.lat) / 180.0) * n;
    (fx, fy)
}

/// Tile containing `point` at `zoom`.
///
/// Longitude is wrapped and latitude clamped first; the south pole and any
/// rounding at the last column fall into the last row/column.
pub fn to_tile(point: GeoPoint, zoom: u8) -> TileCoordinate {
    let zoom = zoom.min(MAX_ZOOM);
    let last = (TileCoordinate::tiles_per_axis(zoom) - 1) as f64;
    let (fx, fy) = grid_position(point, zoom);
    TileCoordinate {
        zoom,
        x: fx.floor().clamp(0.0, last) as u32,
        y: fy.floor().clamp(0.0, last) as u32,
    }
}

/// Fractional position of `point` inside `tile`, each axis in `[0, 1)`.
///
/// `u` grows eastward and `v` grows southward. Points outside `tile` clamp to
/// its edges.
pub fn uv_within_tile(point: GeoPoint, tile: TileCoordinate) -> Vec2 {
    let (fx, fy) = grid_position(point, tile.zoom);
    Vec2::new(
        (fx - tile.x as f64).clamp(0.0, BELOW_ONE),
        (fy - tile.y as f64).clamp(0.0, BELOW_ONE),
    )
}

/// Tile and in-tile UV for `point` in one step.
pub fn tile_info(point: GeoPoint, zoom: u8) -> (TileCoordinate, Vec2) {
    let tile = to_tile(point, zoom);
    (tile, uv_within_tile(point, tile))
}

/// Inverse of [`uv_within_tile`]: the geographic point at `uv` inside `tile`.
pub fn geo_at(tile: TileCoordinate, uv: Vec2) -> GeoPoint {
    let n = TileCoordinate::tiles_per_axis(tile.zoom) as f64;
    let lng = (tile.x as f64 + uv.x) / n * 360.0 - 180.0;
    let lat = 90.0 - (tile.y as f64 + uv.y) / n * 180.0;
    GeoPoint::new(lat, lng)
}
