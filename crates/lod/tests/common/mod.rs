#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use foundation::math::{GeoPoint, Vec3};
use lod::{LodConfig, LodController, PatchLog};
use parking_lot::Mutex;
use runtime::ManualClock;
use scene::{CameraState, GlobeMesh};
use streaming::{BoxFuture, Texture, TextureLoader};
use tokio::sync::Semaphore;

/// In-memory loader. While gated, fetches wait until `open_gate`.
pub struct GatedLoader {
    calls: Mutex<Vec<String>>,
    made: Mutex<Vec<Texture>>,
    failing: AtomicBool,
    gated: AtomicBool,
    gate: Arc<Semaphore>,
}

impl GatedLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            made: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            gated: AtomicBool::new(false),
            gate: Arc::new(Semaphore::new(0)),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn close_gate(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn open_gate(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(1 << 20);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn made(&self) -> Vec<Texture> {
        self.made.lock().clone()
    }
}

impl TextureLoader for GatedLoader {
    fn load(&self, url: String) -> BoxFuture<'static, Option<Texture>> {
        self.calls.lock().push(url);
        let texture = if self.failing.load(Ordering::SeqCst) {
            None
        } else {
            let t = Texture::from_rgba8(1, 1, vec![255; 4]);
            self.made.lock().push(t.clone());
            Some(t)
        };
        let gate = self
            .gated
            .load(Ordering::SeqCst)
            .then(|| Arc::clone(&self.gate));
        Box::pin(async move {
            if let Some(gate) = gate {
                let _ = gate.acquire().await;
            }
            texture
        })
    }
}

pub fn camera_over(lat: f64, lng: f64, distance: f64) -> CameraState {
    CameraState::orbit(
        Vec3::ZERO,
        GeoPoint::new(lat, lng),
        distance,
        60f64.to_radians(),
        1.0,
    )
}

/// Five vertices inside zoom-5 tile 17/14, fanned around the middle one.
pub fn fan_mesh() -> GlobeMesh {
    let points = [
        GeoPoint::new(8.0, 18.0),
        GeoPoint::new(8.0, 22.0),
        GeoPoint::new(11.0, 22.0),
        GeoPoint::new(11.0, 18.0),
        GeoPoint::new(9.5, 20.5),
    ];
    let triangles = vec![[4, 0, 1], [4, 1, 2], [4, 2, 3], [4, 3, 0]];
    GlobeMesh::from_geo_points(1.0, &points, triangles)
}

pub fn sphere_mesh() -> GlobeMesh {
    GlobeMesh::uv_sphere(1.0, 64, 32)
}

pub fn controller(
    loader: Arc<GatedLoader>,
    clock: &ManualClock,
    config: LodConfig,
    mesh: GlobeMesh,
) -> LodController<PatchLog> {
    LodController::new(
        config,
        Arc::new(mesh),
        PatchLog::new(),
        loader,
        Arc::new(clock.clone()),
        tokio::runtime::Handle::current(),
    )
    .expect("valid config")
}

/// Let spawned tasks run until `done` holds.
pub async fn run_until(mut done: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

pub fn assert_close(a: f64, b: f64, eps: f64) {
    let diff = (a - b).abs();
    assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
}
