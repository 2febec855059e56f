use crate::math::mercator;

/// Geographic position: longitude and latitude in degrees, height in meters.
///
/// The same type carries projected Mercator meters in `lon`/`lat` when a
/// tree works in projected space; the owning tree decides the interpretation.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
    pub height: f64,
}

impl LonLat {
    pub const fn new(lon: f64, lat: f64, height: f64) -> Self {
        Self { lon, lat, height }
    }

    pub const fn flat(lon: f64, lat: f64) -> Self {
        Self::new(lon, lat, 0.0)
    }

    pub fn is_zero(&self) -> bool {
        self.lon == 0.0 && self.lat == 0.0 && self.height == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite() && self.height.is_finite()
    }

    pub fn forward_mercator(&self) -> LonLat {
        mercator::forward(*self)
    }

    pub fn inverse_mercator(&self) -> LonLat {
        mercator::inverse(*self)
    }
}

/// Axis-aligned rectangle in lon/lat (or projected) space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Extent {
    pub south_west: LonLat,
    pub north_east: LonLat,
}

impl Extent {
    pub const fn new(south_west: LonLat, north_east: LonLat) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// `[min_lon, min_lat, max_lon, max_lat]`.
    pub const fn from_array(a: [f64; 4]) -> Self {
        Self::new(LonLat::flat(a[0], a[1]), LonLat::flat(a[2], a[3]))
    }

    pub fn width(&self) -> f64 {
        self.north_east.lon - self.south_west.lon
    }

    pub fn height(&self) -> f64 {
        self.north_east.lat - self.south_west.lat
    }

    pub fn center(&self) -> LonLat {
        LonLat::flat(
            self.south_west.lon + self.width() * 0.5,
            self.south_west.lat + self.height() * 0.5,
        )
    }

    /// Inclusive on every edge.
    pub fn is_inside(&self, ll: LonLat) -> bool {
        ll.lon >= self.south_west.lon
            && ll.lon <= self.north_east.lon
            && ll.lat >= self.south_west.lat
            && ll.lat <= self.north_east.lat
    }

    pub fn overlaps(&self, other: &Extent) -> bool {
        self.south_west.lon <= other.north_east.lon
            && self.north_east.lon >= other.south_west.lon
            && self.south_west.lat <= other.north_east.lat
            && self.north_east.lat >= other.south_west.lat
    }

    pub fn clamp(&self, ll: LonLat) -> LonLat {
        LonLat::new(
            ll.lon.clamp(self.south_west.lon, self.north_east.lon),
            ll.lat.clamp(self.south_west.lat, self.north_east.lat),
            ll.height,
        )
    }

    /// Quadrants in NW, NE, SW, SE order.
    pub fn quadrants(&self) -> [Extent; 4] {
        let sw = self.south_west;
        let ne = self.north_east;
        let c = self.center();
        [
            Extent::new(LonLat::flat(sw.lon, c.lat), LonLat::flat(c.lon, ne.lat)),
            Extent::new(c, LonLat::flat(ne.lon, ne.lat)),
            Extent::new(LonLat::flat(sw.lon, sw.lat), c),
            Extent::new(LonLat::flat(c.lon, sw.lat), LonLat::flat(ne.lon, c.lat)),
        ]
    }

    pub fn inverse_mercator(&self) -> Extent {
        Extent::new(
            self.south_west.inverse_mercator(),
            self.north_east.inverse_mercator(),
        )
    }

    /// Smallest extent containing every point; `None` when there are none.
    pub fn from_points(points: impl IntoIterator<Item = LonLat>) -> Option<Extent> {
        let mut it = points.into_iter();
        let first = it.next()?;
        let corner = LonLat::flat(first.lon, first.lat);
        let mut ext = Extent::new(corner, corner);
        for p in it {
            ext.south_west.lon = ext.south_west.lon.min(p.lon);
            ext.south_west.lat = ext.south_west.lat.min(p.lat);
            ext.north_east.lon = ext.north_east.lon.max(p.lon);
            ext.north_east.lat = ext.north_east.lat.max(p.lat);
        }
        Some(ext)
    }
}
