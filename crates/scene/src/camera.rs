use foundation::math::{GeoPoint, Mat4, Vec3};

use crate::picking::Ray;

/// Minimal camera description supplied by the host each frame.
///
/// `view` maps world space to camera space (right-handed, looking down -Z) and
/// `projection` maps camera space to zero-to-one clip space. Both are row-major.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraState {
    pub projection: Mat4,
    pub view: Mat4,
    /// Eye position in world space.
    pub position: Vec3,
    /// Orbit target the camera looks at.
    pub target: Vec3,
}

impl CameraState {
    pub fn new(projection: Mat4, view: Mat4, position: Vec3, target: Vec3) -> Self {
        Self {
            projection,
            view,
            position,
            target,
        }
    }

    /// Perspective camera at `position` looking at `target`.
    pub fn perspective_look_at(
        position: Vec3,
        target: Vec3,
        fov_y_rad: f64,
        aspect: f64,
        near: f64,
        far: f64,
    ) -> Self {
        let view = Mat4::look_at_rh(position, target, Vec3::Y);
        let projection = Mat4::perspective_rh_z0(fov_y_rad, aspect, near, far);
        Self::new(projection, view, position, target)
    }

    /// Orbit-style placement: `distance` from `target` along the direction of `over`.
    pub fn orbit(
        target: Vec3,
        over: GeoPoint,
        distance: f64,
        fov_y_rad: f64,
        aspect: f64,
    ) -> Self {
        let position = target + over.to_unit_vector() * distance;
        let near = (distance * 0.01).max(1e-4);
        let far = distance * 10.0 + 10.0;
        Self::perspective_look_at(position, target, fov_y_rad, aspect, near, far)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection.mul(&self.view)
    }

    /// World-space viewing direction, read from the view matrix.
    pub fn forward(&self) -> Vec3 {
        let r = self.view.row(2);
        Vec3::new(-r[0], -r[1], -r[2]).normalize_or_zero()
    }

    /// Ray through the center of the screen.
    pub fn center_ray(&self) -> Ray {
        Ray::new(self.position, self.forward())
    }
}
