use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;
use foundation::math::{GeoPoint, Vec3};
use lod::{LodController, PatchLog};
use runtime::MonotonicClock;
use scene::{CameraState, GlobeMesh};
use serde::Serialize;
use streaming::HttpTextureLoader;
use tools::settings::{self, Overrides};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless driver for the globe texture-streaming LOD loop")]
struct Args {
    /// JSON config file (any subset of fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frames to simulate
    #[arg(long, default_value_t = 300)]
    frames: u32,

    /// Frame rate of the simulated host loop
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Latitude the orbit starts over
    #[arg(long, default_value_t = 10.0)]
    lat: f64,

    /// Longitude the orbit starts over
    #[arg(long, default_value_t = 20.0)]
    lng: f64,

    /// Camera distance from the globe center (globe radius is 1)
    #[arg(long, default_value_t = 3.0)]
    distance: f64,

    /// Orbit speed in degrees of longitude per second
    #[arg(long, default_value_t = 5.0)]
    orbit_speed: f64,

    /// Longitude/latitude segments of the base sphere
    #[arg(long, default_value_t = 64)]
    segments: u32,

    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    layer: Option<String>,

    /// Imagery day (YYYY-MM-DD); defaults to yesterday UTC
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long)]
    zoom: Option<u8>,

    #[arg(long)]
    max_patches: Option<usize>,

    #[arg(long)]
    max_cached_tiles: Option<usize>,

    #[arg(long)]
    patch_size: Option<f64>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            layer: self.layer.clone(),
            date: self.date,
            zoom: self.zoom,
            max_patches: self.max_patches,
            max_cached_tiles: self.max_cached_tiles,
            patch_size: self.patch_size,
            update_interval_ms: None,
            movement_threshold: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    frames: u32,
    imagery_date: String,
    active_patches: usize,
    distinct_tiles: usize,
    cached_tiles: usize,
    rebuilds: u64,
    applied: u64,
    stale_discarded: u64,
    fetches: u64,
    cache_hits: u64,
    deduplicated: u64,
    failures: u64,
    evictions: u64,
}

fn orbit_camera(args: &Args, elapsed_s: f64) -> CameraState {
    let over = GeoPoint::new(args.lat, args.lng + args.orbit_speed * elapsed_s);
    CameraState::orbit(Vec3::ZERO, over, args.distance, 60f64.to_radians(), 16.0 / 9.0)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let file = args
        .config
        .as_deref()
        .map(settings::read_config_file)
        .transpose()?;
    let env = settings::env_overrides(std::env::vars())?;
    let config = settings::resolve(file, &env, &args.overrides())?;
    let imagery_date = config.tiles.resolved_date();
    info!(
        layer = %config.tiles.layer,
        date = %imagery_date,
        zoom = config.zoom,
        max_patches = config.max_patches,
        "starting globe LOD driver"
    );

    let mesh = Arc::new(GlobeMesh::uv_sphere(1.0, args.segments, args.segments / 2));
    let mut controller = LodController::new(
        config,
        mesh,
        PatchLog::new(),
        Arc::new(HttpTextureLoader::new()),
        Arc::new(MonotonicClock::new()),
        tokio::runtime::Handle::current(),
    )?;

    controller.initialize(&orbit_camera(&args, 0.0)).await;

    let frame = Duration::from_secs_f64(1.0 / f64::from(args.fps.max(1)));
    let mut ticker = tokio::time::interval(frame);
    for i in 0..args.frames {
        ticker.tick().await;
        let elapsed_s = f64::from(i) * frame.as_secs_f64();
        controller.update(&orbit_camera(&args, elapsed_s));
    }
    controller.settle().await;

    let stats = controller.stats();
    let cache = controller.cache().stats();
    let mut tiles: Vec<_> = controller.active_patches().iter().map(|p| p.tile).collect();
    tiles.sort_unstable();
    tiles.dedup();
    let summary = Summary {
        frames: args.frames,
        imagery_date: imagery_date.to_string(),
        active_patches: stats.active_patches,
        distinct_tiles: tiles.len(),
        cached_tiles: controller.cache().len(),
        rebuilds: stats.rebuilds,
        applied: stats.applied,
        stale_discarded: stats.stale_discarded,
        fetches: cache.fetches,
        cache_hits: cache.hits,
        deduplicated: cache.deduplicated,
        failures: cache.failures,
        evictions: cache.evictions,
    };
    controller.dispose();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} frames, imagery {}: {} patches over {} tiles ({} cached)",
            summary.frames,
            summary.imagery_date,
            summary.active_patches,
            summary.distinct_tiles,
            summary.cached_tiles
        );
        println!(
            "rebuilds {} (applied {}, stale {}), fetches {} (hits {}, shared {}, failed {}), evictions {}",
            summary.rebuilds,
            summary.applied,
            summary.stale_discarded,
            summary.fetches,
            summary.cache_hits,
            summary.deduplicated,
            summary.failures,
            summary.evictions
        );
    }
    Ok(())
}
