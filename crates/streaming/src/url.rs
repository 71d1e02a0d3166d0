//! WMTS REST request URLs for imagery tiles.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::tile::TileCoordinate;

pub const DEFAULT_BASE_URL: &str = "https://gibs.earthdata.nasa.gov/wmts/epsg4326/best";
pub const DEFAULT_LAYER: &str = "BlueMarble_NextGeneration";
pub const DEFAULT_MATRIX_SET: &str = "500m";
pub const DEFAULT_FORMAT: &str = "jpg";

/// Where tiles come from.
///
/// `date` pins the imagery day; when unset every URL uses yesterday (UTC),
/// since providers publish the current day late.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSourceConfig {
    pub base_url: String,
    pub layer: String,
    pub matrix_set: String,
    pub format: String,
    pub date: Option<NaiveDate>,
}

impl Default for TileSourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            layer: DEFAULT_LAYER.to_string(),
            matrix_set: DEFAULT_MATRIX_SET.to_string(),
            format: DEFAULT_FORMAT.to_string(),
            date: None,
        }
    }
}

impl TileSourceConfig {
    /// The imagery day used for requests.
    pub fn resolved_date(&self) -> NaiveDate {
        self.date.unwrap_or_else(yesterday_utc)
    }

    pub fn url_for(&self, tile: TileCoordinate) -> String {
        tile_url(
            &self.base_url,
            &self.layer,
            self.resolved_date(),
            &self.matrix_set,
            &self.format,
            tile,
        )
    }
}

/// `{base}/{layer}/default/{YYYY-MM-DD}/{matrix_set}/{zoom}/{row}/{col}.{format}`
///
/// Row is the tile's `y`, column its `x`. A trailing `/` on `base_url` is ignored.
pub fn tile_url(
    base_url: &str,
    layer: &str,
    date: NaiveDate,
    matrix_set: &str,
    format: &str,
    tile: TileCoordinate,
) -> String {
    format!(
        "{}/{}/default/{}/{}/{}/{}/{}.{}",
        base_url.trim_end_matches('/'),
        layer,
        date.format("%Y-%m-%d"),
        matrix_set,
        tile.zoom,
        tile.y,
        tile.x,
        format
    )
}

/// The calendar day before `now`, in UTC.
pub fn day_before(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today.pred_opt().unwrap_or(today)
}

pub fn yesterday_utc() -> NaiveDate {
    day_before(Utc::now())
}
