pub mod cache;
pub mod loader;
pub mod texture;
pub mod tile;
pub mod url;

pub use cache::{CacheStats, DEFAULT_MAX_CACHED_TILES, TileCache, TileLoadedObserver};
pub use loader::{BoxFuture, HttpTextureLoader, LoadError, TextureLoader, decode_texture};
pub use texture::Texture;
pub use tile::{TileCoordinate, geo_at, tile_info, to_tile, uv_within_tile};
pub use url::{TileSourceConfig, tile_url, yesterday_utc};
