use super::Vec3;

/// Geographic coordinate in degrees on the globe.
///
/// Canonical form: `lat` in `[-90, 90]` (clamped, never wrapped) and `lng` in
/// `[-180, 180)` (wrapped modulo 360). Non-finite input is sanitised rather
/// than rejected:
/// - NaN latitude or longitude becomes `0.0`
/// - infinite latitude clamps to the matching pole
/// - infinite longitude becomes `0.0`
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Build a point in canonical form.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat: clamp_lat(lat),
            lng: normalize_lng(lng),
        }
    }

    /// Re-canonicalise a point whose fields were written directly.
    pub fn normalized(self) -> Self {
        Self::new(self.lat, self.lng)
    }

    /// Unit vector for this point.
    ///
    /// Axis convention: +Y is the north pole, +Z is `(0, 0)`, +X is `(0, 90)`.
    pub fn to_unit_vector(self) -> Vec3 {
        let lat = self.lat.to_radians();
        let lng = self.lng.to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lng, cos_lng) = lng.sin_cos();
        Vec3::new(cos_lat * sin_lng, sin_lat, cos_lat * cos_lng)
    }

    /// Point on the sphere in the direction of `dir` (any length).
    ///
    /// Returns `None` for a zero or non-finite direction.
    pub fn from_direction(dir: Vec3) -> Option<Self> {
        let n = dir.try_normalize()?;
        let lat = n.y.clamp(-1.0, 1.0).asin().to_degrees();
        let lng = n.x.atan2(n.z).to_degrees();
        Some(Self::new(lat, lng))
    }
}

/// Wrap a longitude into `[-180, 180)`.
pub fn normalize_lng(lng: f64) -> f64 {
    if !lng.is_finite() {
        return 0.0;
    }
    let mut r = (lng + 180.0).rem_euclid(360.0);
    // `rem_euclid` may round up to the modulus for tiny negative inputs.
    if r >= 360.0 {
        r = 0.0;
    }
    r - 180.0
}

/// Clamp a latitude into `[-90, 90]`.
pub fn clamp_lat(lat: f64) -> f64 {
    if lat.is_nan() {
        return 0.0;
    }
    lat.clamp(-90.0, 90.0)
}

/// Geographic rectangle in degrees (`min` inclusive, `max` exclusive in both axes,
/// except that `max_lat == 90` is inclusive for the northernmost row).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl GeoBounds {
    pub fn contains(&self, p: GeoPoint) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lng >= self.min_lng && p.lng < self.max_lng
    }
}
