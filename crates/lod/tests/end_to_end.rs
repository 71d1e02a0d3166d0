mod common;

use common::{GatedLoader, assert_close, camera_over, controller, fan_mesh, sphere_mesh};
use foundation::math::GeoPoint;
use lod::{LodConfig, LodState};
use pretty_assertions::assert_eq;
use runtime::ManualClock;
use streaming::TileCoordinate;

#[tokio::test]
async fn initial_pass_fetches_one_tile_for_five_vertices() {
    let loader = GatedLoader::new();
    let clock = ManualClock::new(0);
    let mut ctrl = controller(loader.clone(), &clock, LodConfig::default(), fan_mesh());
    let camera = camera_over(10.0, 20.0, 3.0);

    // The screen-center ray lands on the fan at the orbit point.
    let focal = ctrl.mesh().pick(camera.center_ray()).expect("focal hit");
    assert_close(focal.geo.lat, 10.0, 1e-9);
    assert_close(focal.geo.lng, 20.0, 1e-9);

    ctrl.initialize(&camera).await;
    assert_eq!(ctrl.state(), LodState::Ready);

    let calls = loader.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("https://gibs.earthdata.nasa.gov/wmts/epsg4326/best/BlueMarble_NextGeneration/default/"));
    assert!(calls[0].ends_with("/500m/5/14/17.jpg"), "{}", calls[0]);

    let patches = ctrl.active_patches();
    assert_eq!(patches.len(), 5);
    assert_eq!(ctrl.sink().len(), 5);
    let texture = &patches[0].texture;
    for patch in patches {
        assert_eq!(patch.tile, TileCoordinate::new(5, 17, 14));
        assert_eq!(&patch.texture, texture);
        assert_close(patch.size_world_units, 0.15, 1e-12);
        assert_close(patch.uv_extent.x, 0.075, 1e-12);
        assert_close(patch.position.length(), 1.0005, 1e-12);
        assert!((0.0..1.0).contains(&patch.uv_origin.x));
        assert!((0.0..1.0).contains(&patch.uv_origin.y));
    }

    // Nearest vertex to the focal point comes first.
    let first = patches[0].anchor.geo;
    assert_close(first.lat, 9.5, 1e-9);
    assert_close(first.lng, 20.5, 1e-9);

    assert_eq!(ctrl.cache().len(), 1);
    assert_eq!(ctrl.stats().rebuilds, 1);
    assert_eq!(ctrl.stats().applied, 1);
}

#[tokio::test]
async fn stationary_camera_is_a_no_op() {
    let loader = GatedLoader::new();
    let clock = ManualClock::new(0);
    let mut ctrl = controller(loader.clone(), &clock, LodConfig::default(), fan_mesh());
    let camera = camera_over(10.0, 20.0, 3.0);
    ctrl.initialize(&camera).await;

    for _ in 0..10 {
        clock.advance(250);
        ctrl.update(&camera);
        ctrl.settle().await;
    }

    assert_eq!(ctrl.stats().rebuilds, 1);
    assert_eq!(ctrl.sink().added(), 5);
    assert_eq!(ctrl.sink().removed(), 0);
    assert_eq!(loader.calls().len(), 1);
}

#[tokio::test]
async fn movement_rebuilds_only_after_interval() {
    let loader = GatedLoader::new();
    let clock = ManualClock::new(0);
    let mut ctrl = controller(loader.clone(), &clock, LodConfig::default(), sphere_mesh());
    ctrl.initialize(&camera_over(0.0, 0.0, 3.0)).await;
    let settled = ctrl.stats().rebuilds;

    // Moved far enough, but too soon.
    clock.advance(100);
    ctrl.update(&camera_over(0.0, 20.0, 3.0));
    assert_eq!(ctrl.stats().rebuilds, settled);

    // Interval elapsed, movement below threshold.
    clock.advance(500);
    ctrl.update(&camera_over(0.0, 0.5, 3.0));
    assert_eq!(ctrl.stats().rebuilds, settled);

    clock.advance(500);
    let moved = camera_over(0.0, 20.0, 3.0);
    ctrl.update(&moved);
    assert_eq!(ctrl.stats().rebuilds, settled + 1);
    ctrl.settle().await;

    let near_focus = ctrl
        .active_patches()
        .iter()
        .filter(|p| (p.anchor.geo.lng - 20.0).abs() < 20.0)
        .count();
    assert_eq!(near_focus, ctrl.active_patches().len());
    assert!(!ctrl.active_patches().is_empty());
}

#[tokio::test]
async fn failed_tiles_are_retried_and_arrivals_force_a_rebuild() {
    let loader = GatedLoader::new();
    loader.set_failing(true);
    let clock = ManualClock::new(0);
    let mut ctrl = controller(loader.clone(), &clock, LodConfig::default(), fan_mesh());
    let camera = camera_over(10.0, 20.0, 3.0);

    ctrl.initialize(&camera).await;
    assert_eq!(ctrl.state(), LodState::Ready);
    assert!(ctrl.active_patches().is_empty());
    assert!(ctrl.cache().is_empty());

    // A later movement-triggered pass requests the same tile again.
    loader.set_failing(false);
    clock.advance(600);
    let nudged = camera_over(10.0, 20.0, 3.2);
    ctrl.update(&nudged);
    ctrl.settle().await;
    assert_eq!(loader.calls().len(), 2);
    assert_eq!(ctrl.active_patches().len(), 5);
    let rebuilds = ctrl.stats().rebuilds;

    // The arrival is delivered on the next frame and bypasses the throttle.
    ctrl.update(&nudged);
    assert_eq!(ctrl.stats().rebuilds, rebuilds + 1);
    ctrl.settle().await;
    assert_eq!(ctrl.active_patches().len(), 5);
    assert_eq!(loader.calls().len(), 2, "second pass is served from cache");

    // Nothing new arrived, so the throttle is back in charge.
    ctrl.update(&nudged);
    assert_eq!(ctrl.stats().rebuilds, rebuilds + 1);
}

#[tokio::test]
async fn superseded_pass_never_reaches_the_scene() {
    let loader = GatedLoader::new();
    let clock = ManualClock::new(0);
    let mut ctrl = controller(loader.clone(), &clock, LodConfig::default(), sphere_mesh());
    ctrl.initialize(&camera_over(0.0, 0.0, 3.0)).await;

    loader.close_gate();
    clock.advance(600);
    ctrl.update(&camera_over(0.0, 60.0, 3.0));
    clock.advance(600);
    ctrl.update(&camera_over(30.0, -60.0, 3.0));
    assert_eq!(ctrl.pending_rebuilds(), 2);

    loader.open_gate();
    ctrl.settle().await;

    let stats = ctrl.stats();
    assert_eq!(stats.stale_discarded, 1);
    assert_eq!(stats.applied, 2);
    assert!(!ctrl.active_patches().is_empty());
    for patch in ctrl.active_patches() {
        let focus = GeoPoint::new(30.0, -60.0).to_unit_vector();
        assert!(patch.anchor.normal.dot(focus) > 0.9, "{:?}", patch.anchor.geo);
    }
}

#[tokio::test]
async fn tuning_triggers_an_immediate_rebuild() {
    let loader = GatedLoader::new();
    let clock = ManualClock::new(0);
    let mut ctrl = controller(loader, &clock, LodConfig::default(), sphere_mesh());
    ctrl.initialize(&camera_over(0.0, 0.0, 3.0)).await;
    assert_eq!(ctrl.active_patches().len(), 20);

    ctrl.set_max_patches(5);
    ctrl.settle().await;
    assert_eq!(ctrl.active_patches().len(), 5);

    ctrl.set_patch_size(0.3);
    ctrl.settle().await;
    for patch in ctrl.active_patches() {
        assert_close(patch.size_world_units, 0.45, 1e-12);
    }
    assert_eq!(ctrl.stats().rebuilds, 3);
}

#[tokio::test]
async fn invalid_patch_size_is_ignored() {
    let loader = GatedLoader::new();
    let clock = ManualClock::new(0);
    let mut ctrl = controller(loader, &clock, LodConfig::default(), fan_mesh());
    ctrl.initialize(&camera_over(10.0, 20.0, 3.0)).await;

    for bad in [f64::NAN, -0.2, 0.0, f64::INFINITY] {
        ctrl.set_patch_size(bad);
        ctrl.settle().await;
    }

    assert_eq!(ctrl.stats().rebuilds, 1);
    assert_eq!(ctrl.config().base_patch_size, 0.1);
    assert_eq!(ctrl.active_patches().len(), 5);
    for patch in ctrl.active_patches() {
        assert_close(patch.size_world_units, 0.15, 1e-12);
    }
}
