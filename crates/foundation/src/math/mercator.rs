//! Spherical (Web) Mercator forward/inverse projection in meters.

use crate::geo::LonLat;

/// Half of the projected world width in meters.
pub const POLE: f64 = 20_037_508.34;
/// Latitude where the projected square ends.
pub const MAX_LAT: f64 = 85.051_128_779_8;
pub const MIN_LAT: f64 = -MAX_LAT;

const PI_BY_POLE: f64 = std::f64::consts::PI / POLE;
const POLE_BY_180: f64 = POLE / 180.0;

pub fn forward_lon(lon: f64) -> f64 {
    lon * POLE_BY_180
}

pub fn forward_lat(lat: f64) -> f64 {
    let y = ((90.0 + lat) * std::f64::consts::PI / 360.0).tan().ln() / PI_BY_POLE;
    y.clamp(-POLE, POLE)
}

pub fn inverse_lon(x: f64) -> f64 {
    x / POLE_BY_180
}

pub fn inverse_lat(y: f64) -> f64 {
    (2.0 * (y * PI_BY_POLE).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees()
}

pub fn forward(ll: LonLat) -> LonLat {
    LonLat::new(forward_lon(ll.lon), forward_lat(ll.lat), ll.height)
}

pub fn inverse(merc: LonLat) -> LonLat {
    LonLat::new(inverse_lon(merc.lon), inverse_lat(merc.lat), merc.height)
}
