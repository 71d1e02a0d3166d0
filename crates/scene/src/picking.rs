use foundation::math::Vec3;
use foundation::math::precision::stable_total_cmp_f64;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self { origin, dir }
    }

    pub fn at(&self, t: f64) -> Vec3 {
        self.origin + self.dir * t
    }
}

/// Ray/triangle intersection result in barycentric form.
///
/// The hit point is `a + (b - a) * u + (c - a) * v`, and `t` is measured along
/// the (normalized) ray direction.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TriangleHit {
    pub t: f64,
    pub u: f64,
    pub v: f64,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PickOptions {
    pub max_distance: f64,
}

impl Default for PickOptions {
    fn default() -> Self {
        Self {
            max_distance: 1.0e30,
        }
    }
}

const EPS: f64 = 1e-12;

/// Two-sided Möller–Trumbore intersection.
///
/// `dir` must already be normalized. Hits at `t <= EPS` (behind or at the
/// origin) are rejected.
pub fn ray_triangle(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<TriangleHit> {
    let e1 = b - a;
    let e2 = c - a;
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPS {
        return None;
    }
    let inv_det = 1.0 / det;

    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(e1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(q) * inv_det;
    if t <= EPS {
        return None;
    }
    Some(TriangleHit { t, u, v })
}

/// Deterministic nearest-hit picking over an indexed triangle list.
///
/// Ordering contract:
/// - The closest hit along the (normalized) ray wins.
/// - Hits at the same distance resolve to the lower triangle index.
///
/// Returns the winning triangle index and its hit.
pub fn pick_triangles(
    ray: Ray,
    positions: &[Vec3],
    triangles: &[[u32; 3]],
    opts: PickOptions,
) -> Option<(usize, TriangleHit)> {
    let dir = ray.dir.try_normalize()?;

    let mut best: Option<(usize, TriangleHit)> = None;
    for (index, tri) in triangles.iter().enumerate() {
        let (Some(a), Some(b), Some(c)) = (
            positions.get(tri[0] as usize),
            positions.get(tri[1] as usize),
            positions.get(tri[2] as usize),
        ) else {
            continue;
        };

        let Some(hit) = ray_triangle(ray.origin, dir, *a, *b, *c) else {
            continue;
        };
        if hit.t > opts.max_distance {
            continue;
        }

        // Strictly-less keeps the lower triangle index on ties.
        best = match best {
            Some((bi, bh)) if !stable_total_cmp_f64(hit.t, bh.t).is_lt() => Some((bi, bh)),
            _ => Some((index, hit)),
        };
    }
    best
}
