use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to decoded RGBA8 tile imagery.
///
/// Clones refer to the same storage. `release` frees the pixels for every
/// clone at once, standing in for destroying the GPU resource; the handle
/// itself stays valid and keeps reporting its id and size.
#[derive(Clone)]
pub struct Texture {
    inner: Arc<TextureInner>,
}

struct TextureInner {
    id: u64,
    width: u32,
    height: u32,
    pixels: Mutex<Option<Vec<u8>>>,
}

impl Texture {
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(TextureInner {
                id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
                width,
                height,
                pixels: Mutex::new(Some(pixels)),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// Bytes still held, 0 once released.
    pub fn byte_len(&self) -> usize {
        self.inner.pixels.lock().as_ref().map_or(0, Vec::len)
    }

    pub fn with_pixels<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.inner.pixels.lock().as_deref().map(f)
    }

    /// Free the pixel storage. Returns `true` only for the call that freed it.
    pub fn release(&self) -> bool {
        self.inner.pixels.lock().take().is_some()
    }

    pub fn is_released(&self) -> bool {
        self.inner.pixels.lock().is_none()
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Texture {}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.inner.id)
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("released", &self.is_released())
            .finish()
    }
}
