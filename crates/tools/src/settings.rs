//! Layered configuration for the `globe-lod` driver.
//!
//! Precedence, lowest first: built-in defaults, JSON file, `GLOBE_LOD_*`
//! environment variables, command-line flags.

use std::path::Path;

use chrono::NaiveDate;
use lod::LodConfig;

pub const ENV_PREFIX: &str = "GLOBE_LOD_";

#[derive(Debug)]
pub enum SettingsError {
    Io {
        path: String,
        source: std::io::Error,
    },
    Json {
        path: String,
        source: serde_json::Error,
    },
    Env {
        key: String,
        value: String,
        reason: String,
    },
    Invalid(lod::ConfigError),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io { path, source } => write!(f, "reading {path}: {source}"),
            SettingsError::Json { path, source } => write!(f, "parsing {path}: {source}"),
            SettingsError::Env { key, value, reason } => {
                write!(f, "environment {key}={value:?}: {reason}")
            }
            SettingsError::Invalid(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::Io { source, .. } => Some(source),
            SettingsError::Json { source, .. } => Some(source),
            SettingsError::Env { .. } => None,
            SettingsError::Invalid(e) => Some(e),
        }
    }
}

/// Values supplied on the command line; `None` keeps the lower layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub layer: Option<String>,
    pub date: Option<NaiveDate>,
    pub zoom: Option<u8>,
    pub max_patches: Option<usize>,
    pub max_cached_tiles: Option<usize>,
    pub patch_size: Option<f64>,
    pub update_interval_ms: Option<u64>,
    pub movement_threshold: Option<f64>,
}

impl Overrides {
    pub fn apply(&self, cfg: &mut LodConfig) {
        if let Some(v) = &self.base_url {
            cfg.tiles.base_url = v.clone();
        }
        if let Some(v) = &self.layer {
            cfg.tiles.layer = v.clone();
        }
        if let Some(v) = self.date {
            cfg.tiles.date = Some(v);
        }
        if let Some(v) = self.zoom {
            cfg.zoom = v;
        }
        if let Some(v) = self.max_patches {
            cfg.max_patches = v;
        }
        if let Some(v) = self.max_cached_tiles {
            cfg.max_cached_tiles = v;
        }
        if let Some(v) = self.patch_size {
            cfg.base_patch_size = v;
        }
        if let Some(v) = self.update_interval_ms {
            cfg.update_interval_ms = v;
        }
        if let Some(v) = self.movement_threshold {
            cfg.movement_threshold = v;
        }
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, SettingsError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| SettingsError::Env {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Read `GLOBE_LOD_*` pairs into overrides. Unknown keys are ignored.
pub fn env_overrides<I, K, V>(vars: I) -> Result<Overrides, SettingsError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = Overrides::default();
    for (key, value) in vars {
        let key = key.as_ref();
        let value = value.as_ref();
        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        match name {
            "BASE_URL" => out.base_url = Some(value.to_string()),
            "LAYER" => out.layer = Some(value.to_string()),
            "DATE" => out.date = Some(parse_env(key, value)?),
            "ZOOM" => out.zoom = Some(parse_env(key, value)?),
            "MAX_PATCHES" => out.max_patches = Some(parse_env(key, value)?),
            "MAX_CACHED_TILES" => out.max_cached_tiles = Some(parse_env(key, value)?),
            "PATCH_SIZE" => out.patch_size = Some(parse_env(key, value)?),
            "UPDATE_INTERVAL_MS" => out.update_interval_ms = Some(parse_env(key, value)?),
            "MOVEMENT_THRESHOLD" => out.movement_threshold = Some(parse_env(key, value)?),
            _ => {}
        }
    }
    Ok(out)
}

pub fn read_config_file(path: &Path) -> Result<LodConfig, SettingsError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| SettingsError::Json {
        path: display,
        source,
    })
}

/// Merge every layer and validate the result.
pub fn resolve(
    file: Option<LodConfig>,
    env: &Overrides,
    cli: &Overrides,
) -> Result<LodConfig, SettingsError> {
    let mut cfg = file.unwrap_or_default();
    env.apply(&mut cfg);
    cli.apply(&mut cfg);
    cfg.validate().map_err(SettingsError::Invalid)?;
    Ok(cfg)
}
