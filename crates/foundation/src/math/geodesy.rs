use super::Vec3;
use crate::geo::LonLat;

/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 semi-minor axis (meters).
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);

/// Reference ellipsoid used to move between geographic and planet-fixed
/// Cartesian (ECEF) coordinates.
///
/// Angles on the public surface are degrees; heights are meters above the
/// ellipsoid.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ellipsoid {
    a: f64,
    b: f64,
    e2: f64,
    ep2: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid::new(WGS84_A, WGS84_B);

    pub const fn new(a: f64, b: f64) -> Self {
        let e2 = (a * a - b * b) / (a * a);
        let ep2 = (a * a - b * b) / (b * b);
        Self { a, b, e2, ep2 }
    }

    /// Equatorial radius; the radius of the sphere enclosing the whole planet.
    pub fn equatorial_size(&self) -> f64 {
        self.a
    }

    pub fn lon_lat_to_cartesian(&self, ll: LonLat) -> Vec3 {
        let lat = ll.lat.to_radians();
        let lon = ll.lon.to_radians();
        let sin_lat = lat.sin();
        let cos_lat = lat.cos();

        let n = self.a / (1.0 - self.e2 * sin_lat * sin_lat).sqrt();
        let x = (n + ll.height) * cos_lat * lon.cos();
        let y = (n + ll.height) * cos_lat * lon.sin();
        let z = (n * (1.0 - self.e2) + ll.height) * sin_lat;

        Vec3::new(x, y, z)
    }

    pub fn cartesian_to_lon_lat(&self, p: Vec3) -> LonLat {
        let r = (p.x * p.x + p.y * p.y).sqrt();
        let lon = p.y.atan2(p.x);

        let theta = (p.z * self.a).atan2(r * self.b);
        let sin_theta = theta.sin();
        let cos_theta = theta.cos();

        let lat = (p.z + self.ep2 * self.b * sin_theta * sin_theta * sin_theta)
            .atan2(r - self.e2 * self.a * cos_theta * cos_theta * cos_theta);

        let sin_lat = lat.sin();
        let n = self.a / (1.0 - self.e2 * sin_lat * sin_lat).sqrt();
        let cos_lat = lat.cos();
        // Near the poles the horizontal radius is degenerate; measure along z.
        let height = if cos_lat.abs() > 1e-10 {
            r / cos_lat - n
        } else {
            p.z.abs() - self.b
        };

        LonLat::new(lon.to_degrees(), lat.to_degrees(), height)
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::WGS84
    }
}

#[cfg(test)]
mod tests {
    use super::{Ellipsoid, WGS84_A, WGS84_B};
    use crate::geo::LonLat;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn equator_prime_meridian() {
        let p = Ellipsoid::WGS84.lon_lat_to_cartesian(LonLat::new(0.0, 0.0, 0.0));
        assert_close(p.x, WGS84_A, 1e-6);
        assert_close(p.y, 0.0, 1e-6);
        assert_close(p.z, 0.0, 1e-6);
    }

    #[test]
    fn north_pole() {
        let p = Ellipsoid::WGS84.lon_lat_to_cartesian(LonLat::new(0.0, 90.0, 0.0));
        assert_close(p.z, WGS84_B, 1e-6);
        let back = Ellipsoid::WGS84.cartesian_to_lon_lat(p);
        assert_close(back.lat, 90.0, 1e-9);
        assert_close(back.height, 0.0, 1e-6);
    }

    #[test]
    fn round_trip() {
        let e = Ellipsoid::WGS84;
        let ll = LonLat::new(-60.0, 30.0, 120.0);
        let back = e.cartesian_to_lon_lat(e.lon_lat_to_cartesian(ll));
        assert_close(back.lon, ll.lon, 1e-9);
        assert_close(back.lat, ll.lat, 1e-9);
        assert_close(back.height, ll.height, 1e-6);
    }
}
