pub mod config;
pub mod controller;
pub mod patch;
pub mod scheduler;

pub use config::{ConfigError, LodConfig, ZoomLevel};
pub use controller::{LodController, LodState, LodStats};
pub use patch::{PatchDescriptor, PatchId, PatchLog, PatchSink};
pub use scheduler::{BuiltPatches, PatchConfig, PatchScheduler, PendingRebuild, PlannedPatch};
