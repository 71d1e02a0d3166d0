pub mod camera;
pub mod mesh;
pub mod picking;
pub mod visibility;

pub use camera::CameraState;
pub use mesh::{GlobeMesh, SurfaceHit, WorldVertex};
pub use picking::Ray;
pub use visibility::{Frustum, Plane, SurfacePoint, VisibilitySampler};
