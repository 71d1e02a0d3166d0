//! Texture loading: fetch raster bytes and decode them into a [`Texture`].
//!
//! Loaders never surface errors to the cache. A failed request, a non-2xx
//! status or an undecodable body is logged and resolves to `None`.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use crate::texture::Texture;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resolves a tile URL to a decoded texture, or `None` on any failure.
///
/// Implementations must be `Send + Sync` for use across async tasks.
/// The returned future owns everything it needs.
pub trait TextureLoader: Send + Sync + 'static {
    fn load(&self, url: String) -> BoxFuture<'static, Option<Texture>>;
}

#[derive(Debug)]
pub enum LoadError {
    /// The server answered with a non-success status.
    Http { status: u16 },
    /// The request never produced a response body.
    Transport(reqwest::Error),
    /// The body was not a raster image we can read.
    Decode(image::ImageError),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Http { status } => write!(f, "HTTP error: status {status}"),
            LoadError::Transport(e) => write!(f, "HTTP request failed: {e}"),
            LoadError::Decode(e) => write!(f, "image decode failed: {e}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Http { .. } => None,
            LoadError::Transport(e) => Some(e),
            LoadError::Decode(e) => Some(e),
        }
    }
}

impl From<reqwest::Error> for LoadError {
    fn from(e: reqwest::Error) -> Self {
        LoadError::Transport(e)
    }
}

impl From<image::ImageError> for LoadError {
    fn from(e: image::ImageError) -> Self {
        LoadError::Decode(e)
    }
}

/// Decode an encoded raster (JPEG or PNG) into RGBA8.
pub fn decode_texture(bytes: &[u8]) -> Result<Texture, LoadError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Texture::from_rgba8(width, height, rgba.into_raw()))
}

/// HTTP GET + decode.
#[derive(Debug, Clone, Default)]
pub struct HttpTextureLoader {
    client: reqwest::Client,
}

impl HttpTextureLoader {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, url: &str) -> Result<Texture, LoadError> {
        fetch_texture(&self.client, url).await
    }
}

async fn fetch_texture(client: &reqwest::Client, url: &str) -> Result<Texture, LoadError> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(LoadError::Http {
            status: resp.status().as_u16(),
        });
    }
    let bytes = resp.bytes().await?;
    debug!(url, bytes = bytes.len(), "tile downloaded");

    // Decoding is CPU-bound; keep it off the async workers.
    match tokio::task::spawn_blocking(move || decode_texture(&bytes)).await {
        Ok(decoded) => decoded,
        Err(join) => Err(LoadError::Decode(image::ImageError::IoError(
            std::io::Error::other(join),
        ))),
    }
}

impl TextureLoader for HttpTextureLoader {
    fn load(&self, url: String) -> BoxFuture<'static, Option<Texture>> {
        let client = self.client.clone();
        Box::pin(async move {
            match fetch_texture(&client, &url).await {
                Ok(texture) => Some(texture),
                Err(err) => {
                    warn!(%url, error = %err, "tile load failed");
                    None
                }
            }
        })
    }
}
