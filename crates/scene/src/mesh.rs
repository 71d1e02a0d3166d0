use foundation::math::{GeoPoint, Mat4, Vec3};

use crate::picking::{PickOptions, Ray, pick_triangles};

/// Base globe geometry: an indexed triangle mesh plus its world transform.
///
/// Vertex positions and normals are stored in model space. Every vertex also
/// carries the geographic coordinate of its direction from the model origin,
/// which is what tile lookups key on.
#[derive(Debug, Clone)]
pub struct GlobeMesh {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    geo: Vec<GeoPoint>,
    triangles: Vec<[u32; 3]>,
    world: Mat4,
}

/// A mesh vertex resolved into world space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WorldVertex {
    pub position: Vec3,
    /// Unit outward normal in world space.
    pub normal: Vec3,
    pub geo: GeoPoint,
}

/// Result of casting a ray against the base mesh.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SurfaceHit {
    pub distance: f64,
    /// World-space intersection point.
    pub point: Vec3,
    pub geo: GeoPoint,
}

impl GlobeMesh {
    /// Build a mesh from model-space positions; normals point away from the origin.
    pub fn new(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        let normals = positions.iter().map(|p| p.normalize_or_zero()).collect();
        Self::with_normals(positions, normals, triangles)
    }

    /// Build a mesh with explicit normals. Missing normals fall back to the
    /// radial direction.
    pub fn with_normals(positions: Vec<Vec3>, normals: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        let normals = positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                normals
                    .get(i)
                    .and_then(|n| n.try_normalize())
                    .unwrap_or_else(|| p.normalize_or_zero())
            })
            .collect();
        let geo = positions
            .iter()
            .map(|p| GeoPoint::from_direction(*p).unwrap_or(GeoPoint::new(0.0, 0.0)))
            .collect();
        Self {
            positions,
            normals,
            geo,
            triangles,
            world: Mat4::IDENTITY,
        }
    }

    /// Sphere mesh from a list of geographic vertices.
    pub fn from_geo_points(radius: f64, points: &[GeoPoint], triangles: Vec<[u32; 3]>) -> Self {
        let positions = points
            .iter()
            .map(|g| g.normalized().to_unit_vector() * radius)
            .collect();
        Self::new(positions, triangles)
    }

    /// Latitude/longitude sphere with single pole vertices and no seam duplicates.
    ///
    /// `width_segments` columns of longitude and `height_segments` bands of latitude.
    pub fn uv_sphere(radius: f64, width_segments: u32, height_segments: u32) -> Self {
        let w = width_segments.max(3);
        let h = height_segments.max(2);

        let mut points = Vec::with_capacity((2 + (h - 1) * w) as usize);
        points.push(GeoPoint::new(90.0, 0.0));
        for ring in 1..h {
            let lat = 90.0 - 180.0 * ring as f64 / h as f64;
            for col in 0..w {
                let lng = -180.0 + 360.0 * col as f64 / w as f64;
                points.push(GeoPoint::new(lat, lng));
            }
        }
        points.push(GeoPoint::new(-90.0, 0.0));

        let north = 0u32;
        let south = (points.len() - 1) as u32;
        let ring_start = |ring: u32| 1 + (ring - 1) * w;

        let mut triangles = Vec::with_capacity((2 * w * (h - 1)) as usize);
        for col in 0..w {
            let next = (col + 1) % w;
            triangles.push([north, ring_start(1) + col, ring_start(1) + next]);
        }
        for ring in 1..h - 1 {
            let top = ring_start(ring);
            let bottom = ring_start(ring + 1);
            for col in 0..w {
                let next = (col + 1) % w;
                triangles.push([top + col, bottom + col, top + next]);
                triangles.push([top + next, bottom + col, bottom + next]);
            }
        }
        let last = ring_start(h - 1);
        for col in 0..w {
            let next = (col + 1) % w;
            triangles.push([last + col, south, last + next]);
        }

        Self::from_geo_points(radius, &points, triangles)
    }

    pub fn with_world_transform(mut self, world: Mat4) -> Self {
        self.world = world;
        self
    }

    pub fn set_world_transform(&mut self, world: Mat4) {
        self.world = world;
    }

    pub fn world_transform(&self) -> &Mat4 {
        &self.world
    }

    /// Globe center in world space.
    pub fn center(&self) -> Vec3 {
        self.world.transform_point(Vec3::ZERO)
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn world_positions(&self) -> Vec<Vec3> {
        self.positions
            .iter()
            .map(|p| self.world.transform_point(*p))
            .collect()
    }

    pub fn world_vertices(&self) -> Vec<WorldVertex> {
        self.positions
            .iter()
            .zip(&self.normals)
            .zip(&self.geo)
            .map(|((p, n), g)| WorldVertex {
                position: self.world.transform_point(*p),
                normal: self.world.transform_vector(*n).normalize_or_zero(),
                geo: *g,
            })
            .collect()
    }

    /// Cast `ray` (world space) against the mesh and resolve the nearest hit.
    pub fn pick(&self, ray: Ray) -> Option<SurfaceHit> {
        self.pick_with(ray, &self.world_positions())
    }

    /// Same as [`GlobeMesh::pick`] with world positions computed by the caller.
    pub fn pick_with(&self, ray: Ray, world_positions: &[Vec3]) -> Option<SurfaceHit> {
        let (index, hit) =
            pick_triangles(ray, world_positions, &self.triangles, PickOptions::default())?;
        let tri = self.triangles[index];

        // Interpolate in model space so the geo lookup needs no inverse transform.
        let a = self.positions[tri[0] as usize];
        let b = self.positions[tri[1] as usize];
        let c = self.positions[tri[2] as usize];
        let local = a + (b - a) * hit.u + (c - a) * hit.v;

        let dir = ray.dir.normalize_or_zero();
        Some(SurfaceHit {
            distance: hit.t,
            point: ray.origin + dir * hit.t,
            geo: GeoPoint::from_direction(local)?,
        })
    }
}
