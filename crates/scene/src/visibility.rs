use foundation::math::precision::stable_total_cmp_f64;
use foundation::math::{GeoPoint, Mat4, Vec3};

use crate::camera::CameraState;
use crate::mesh::GlobeMesh;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    pub n: Vec3,
    pub d: f64,
}

impl Plane {
    pub fn new(n: Vec3, d: f64) -> Self {
        Self { n, d }
    }

    fn from_row(r: [f64; 4]) -> Self {
        Self::new(Vec3::new(r[0], r[1], r[2]), r[3])
    }

    pub fn normalize(self) -> Self {
        let l = self.n.length();
        if l <= 0.0 {
            return self;
        }
        let inv = 1.0 / l;
        Self {
            n: self.n * inv,
            d: self.d * inv,
        }
    }

    pub fn distance(&self, p: Vec3) -> f64 {
        self.n.dot(p) + self.d
    }
}

fn add_rows(a: [f64; 4], b: [f64; 4]) -> [f64; 4] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]]
}

fn sub_rows(a: [f64; 4], b: [f64; 4]) -> [f64; 4] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2], a[3] - b[3]]
}

/// View frustum as 6 planes.
///
/// Convention:
/// - A point `p` is inside iff `plane.distance(p) >= 0` for all planes.
/// - Planes are expected to be in world space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frustum {
    pub left: Plane,
    pub right: Plane,
    pub bottom: Plane,
    pub top: Plane,
    pub near: Plane,
    pub far: Plane,
}

impl Frustum {
    pub fn new(
        left: Plane,
        right: Plane,
        bottom: Plane,
        top: Plane,
        near: Plane,
        far: Plane,
    ) -> Self {
        Self {
            left,
            right,
            bottom,
            top,
            near,
            far,
        }
    }

    pub fn normalize(self) -> Self {
        Self {
            left: self.left.normalize(),
            right: self.right.normalize(),
            bottom: self.bottom.normalize(),
            top: self.top.normalize(),
            near: self.near.normalize(),
            far: self.far.normalize(),
        }
    }

    /// Build a frustum from a row-major view-projection matrix.
    ///
    /// This expects the clip-space convention where visible points satisfy:
    /// - `-w <= x <= w`
    /// - `-w <= y <= w`
    /// - `0 <= z <= w` (z0)
    pub fn from_view_proj(view_proj: &Mat4) -> Self {
        let [r0, r1, r2, r3] = view_proj.m;

        // Side planes are r3 +/- r{0,1}. With z0 depth the near plane is r2
        // alone (z >= 0) and the far plane is r3 - r2 (z <= w).
        Self::new(
            Plane::from_row(add_rows(r3, r0)),
            Plane::from_row(sub_rows(r3, r0)),
            Plane::from_row(add_rows(r3, r1)),
            Plane::from_row(sub_rows(r3, r1)),
            Plane::from_row(r2),
            Plane::from_row(sub_rows(r3, r2)),
        )
        .normalize()
    }

    pub fn planes(&self) -> [Plane; 6] {
        [
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        ]
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes().iter().all(|plane| plane.distance(p) >= 0.0)
    }
}

/// A camera-facing point on the globe surface, recomputed every sampling pass.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SurfacePoint {
    pub world_position: Vec3,
    /// Unit outward normal.
    pub normal: Vec3,
    pub geo: GeoPoint,
}

impl SurfacePoint {
    pub fn new(world_position: Vec3, normal: Vec3, geo: GeoPoint) -> Self {
        Self {
            world_position,
            normal,
            geo,
        }
    }

    /// Point on a globe of `radius` centered at the origin.
    pub fn on_sphere(geo: GeoPoint, radius: f64) -> Self {
        let n = geo.to_unit_vector();
        Self::new(n * radius, n, geo.normalized())
    }
}

pub const DEFAULT_MAX_POINTS: usize = 20;

/// Picks the on-screen, camera-facing mesh vertices closest to the focal point.
///
/// Every call starts from scratch: the frustum, focal ray and vertex set are
/// all recomputed from the supplied camera and mesh.
#[derive(Debug, Clone)]
pub struct VisibilitySampler {
    max_points: usize,
}

impl Default for VisibilitySampler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}

impl VisibilitySampler {
    pub fn new(max_points: usize) -> Self {
        Self { max_points }
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn set_max_points(&mut self, max_points: usize) {
        self.max_points = max_points;
    }

    /// Ordering contract:
    /// - Ascending Euclidean distance to the focal point.
    /// - Equal distances keep mesh vertex order.
    ///
    /// Returns an empty list when the screen-center ray misses the mesh.
    pub fn sample(&self, camera: &CameraState, mesh: &GlobeMesh) -> Vec<SurfacePoint> {
        if self.max_points == 0 {
            return Vec::new();
        }

        let world_positions = mesh.world_positions();
        let Some(focal) = mesh.pick_with(camera.center_ray(), &world_positions) else {
            tracing::trace!("focal ray missed the globe");
            return Vec::new();
        };

        let frustum = Frustum::from_view_proj(&camera.view_proj());
        let toward_camera = -camera.forward();

        let mut visible: Vec<(f64, SurfacePoint)> = mesh
            .world_vertices()
            .into_iter()
            .filter(|v| frustum.contains_point(v.position))
            .filter(|v| v.normal.dot(toward_camera) > 0.0)
            .map(|v| {
                (
                    v.position.distance(focal.point),
                    SurfacePoint::new(v.position, v.normal, v.geo),
                )
            })
            .collect();

        // `sort_by` is stable, so ties keep vertex order.
        visible.sort_by(|a, b| stable_total_cmp_f64(a.0, b.0));
        visible.truncate(self.max_points);

        tracing::trace!(
            focal_lat = focal.geo.lat,
            focal_lng = focal.geo.lng,
            points = visible.len(),
            "sampled visible surface"
        );
        visible.into_iter().map(|(_, p)| p).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Frustum, Plane, SurfacePoint, VisibilitySampler};
    use crate::camera::CameraState;
    use crate::mesh::GlobeMesh;
    use foundation::math::{GeoPoint, Mat4, Vec3};

    fn unit_cube_frustum() -> Frustum {
        // Planes in the form n·p + d >= 0
        let left = Plane::new(Vec3::new(1.0, 0.0, 0.0), 1.0); // x >= -1
        let right = Plane::new(Vec3::new(-1.0, 0.0, 0.0), 1.0); // x <= 1
        let bottom = Plane::new(Vec3::new(0.0, 1.0, 0.0), 1.0); // y >= -1
        let top = Plane::new(Vec3::new(0.0, -1.0, 0.0), 1.0); // y <= 1
        let near = Plane::new(Vec3::new(0.0, 0.0, 1.0), 1.0); // z >= -1
        let far = Plane::new(Vec3::new(0.0, 0.0, -1.0), 1.0); // z <= 1
        Frustum::new(left, right, bottom, top, near, far)
    }

    fn camera_over(geo: GeoPoint, distance: f64) -> CameraState {
        CameraState::orbit(Vec3::ZERO, geo, distance, 60f64.to_radians(), 1.0)
    }

    #[test]
    fn contains_point_basic() {
        let f = unit_cube_frustum();
        assert!(f.contains_point(Vec3::new(0.5, -0.5, 0.9)));
        assert!(!f.contains_point(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn view_proj_frustum_clips_near_and_far() {
        let cam = CameraState::perspective_look_at(
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::ZERO,
            60f64.to_radians(),
            1.0,
            1.0,
            20.0,
        );
        let f = Frustum::from_view_proj(&cam.view_proj());
        assert!(f.contains_point(Vec3::ZERO));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, 9.5)), "in front of near");
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, -15.0)), "beyond far");
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, 11.0)), "behind the eye");
        assert!(!f.contains_point(Vec3::new(20.0, 0.0, 0.0)), "off to the side");
    }

    #[test]
    fn samples_are_ranked_by_focal_distance() {
        let mesh = GlobeMesh::uv_sphere(1.0, 48, 24);
        let focus = GeoPoint::new(10.0, 20.0);
        let sampler = VisibilitySampler::new(12);
        let points = sampler.sample(&camera_over(focus, 3.0), &mesh);

        assert_eq!(points.len(), 12);
        let focal = focus.to_unit_vector();
        let dists: Vec<f64> = points
            .iter()
            .map(|p| p.world_position.distance(focal))
            .collect();
        assert!(dists.windows(2).all(|w| w[0] <= w[1] + 1e-9));
        for p in &points {
            assert!(p.normal.dot(focal) > 0.0, "far side vertex sampled");
        }
    }

    #[test]
    fn empty_when_focal_ray_misses() {
        let mesh = GlobeMesh::uv_sphere(1.0, 16, 8);
        let cam = CameraState::perspective_look_at(
            Vec3::new(5.0, 0.0, 5.0),
            Vec3::new(10.0, 0.0, 5.0),
            60f64.to_radians(),
            1.0,
            0.1,
            100.0,
        );
        assert!(VisibilitySampler::default().sample(&cam, &mesh).is_empty());
    }

    #[test]
    fn sampling_follows_world_transform() {
        let offset = Vec3::new(0.0, 0.0, -4.0);
        let mesh = GlobeMesh::uv_sphere(1.0, 32, 16).with_world_transform(Mat4::translation(offset));
        let cam = CameraState::orbit(offset, GeoPoint::new(0.0, 0.0), 3.0, 60f64.to_radians(), 1.0);
        let points = VisibilitySampler::new(4).sample(&cam, &mesh);
        assert_eq!(points.len(), 4);
        for p in points {
            assert!(p.world_position.z > offset.z, "expected front hemisphere");
            assert!(p.geo.lng.abs() < 30.0);
        }
    }

    #[test]
    fn surface_point_on_sphere() {
        let p = SurfacePoint::on_sphere(GeoPoint::new(0.0, 90.0), 2.0);
        assert!((p.world_position.x - 2.0).abs() < 1e-12);
        assert!((p.normal.length() - 1.0).abs() < 1e-12);
    }
}
