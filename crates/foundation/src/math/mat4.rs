use super::Vec3;

/// Row-major 4x4 matrix acting on column vectors (`m[row][col]`, `p' = M * p`).
///
/// Projection helpers follow the right-handed, zero-to-one depth convention:
/// visible points satisfy `-w <= x,y <= w` and `0 <= z <= w` in clip space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mat4 {
    pub m: [[f64; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub const fn from_rows(m: [[f64; 4]; 4]) -> Self {
        Self { m }
    }

    pub fn translation(t: Vec3) -> Self {
        Self::from_rows([
            [1.0, 0.0, 0.0, t.x],
            [0.0, 1.0, 0.0, t.y],
            [0.0, 0.0, 1.0, t.z],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    pub fn perspective_rh_z0(fov_y_rad: f64, aspect: f64, near: f64, far: f64) -> Self {
        let f = 1.0 / (0.5 * fov_y_rad).tan();
        let aspect = if aspect > 0.0 { aspect } else { 1.0 };
        Self::from_rows([
            [f / aspect, 0.0, 0.0, 0.0],
            [0.0, f, 0.0, 0.0],
            [0.0, 0.0, far / (near - far), (near * far) / (near - far)],
            [0.0, 0.0, -1.0, 0.0],
        ])
    }

    pub fn look_at_rh(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let f = (target - eye).normalize_or_zero();
        let mut s = f.cross(up).normalize_or_zero();
        if s == Vec3::ZERO {
            // `up` parallel to the view direction; any perpendicular works.
            s = f.cross(Vec3::Z).normalize_or_zero();
        }
        let u = s.cross(f);

        Self::from_rows([
            [s.x, s.y, s.z, -s.dot(eye)],
            [u.x, u.y, u.z, -u.dot(eye)],
            [-f.x, -f.y, -f.z, f.dot(eye)],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    pub fn mul(&self, other: &Self) -> Self {
        let mut out = [[0.0; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.m[r][k] * other.m[k][c]).sum();
            }
        }
        Self::from_rows(out)
    }

    pub fn row(&self, r: usize) -> [f64; 4] {
        self.m[r]
    }

    /// Homogeneous transform of `(p, 1)`.
    pub fn transform_homogeneous(&self, p: Vec3) -> [f64; 4] {
        let v = [p.x, p.y, p.z, 1.0];
        let mut out = [0.0; 4];
        for (r, cell) in out.iter_mut().enumerate() {
            *cell = (0..4).map(|k| self.m[r][k] * v[k]).sum();
        }
        out
    }

    /// Transform a point, dividing by `w` when it is not 1.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let [x, y, z, w] = self.transform_homogeneous(p);
        if w != 0.0 && w != 1.0 {
            Vec3::new(x / w, y / w, z / w)
        } else {
            Vec3::new(x, y, z)
        }
    }

    /// Transform a direction by the upper 3x3 block (no translation).
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }
}
