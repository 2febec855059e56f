use crate::geo::{Extent, LonLat};
use crate::math::{Ellipsoid, Vec3};

/// Axis-aligned bounding box in planet-fixed Cartesian space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb3 {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb3 {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb3 { min, max }
    }

    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut b = Aabb3::new(*first, *first);
        for p in rest {
            b.min = b.min.min(*p);
            b.max = b.max.max(*p);
        }
        Some(b)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max).scale(0.5)
    }
}

/// Culling sphere.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Sphere around the whole ellipsoid.
    pub fn planet(ellipsoid: &Ellipsoid) -> Self {
        Self::new(Vec3::ZERO, ellipsoid.equatorial_size())
    }

    /// Sphere enclosing a geographic extent (degrees) on the ellipsoid surface.
    ///
    /// The surface is sampled on a 3x3 grid (corners, edge midpoints, center);
    /// the sphere is centred on the samples' AABB and reaches its far corner.
    pub fn from_extent(ellipsoid: &Ellipsoid, extent: &Extent) -> Self {
        let sw = extent.south_west;
        let ne = extent.north_east;
        let mut samples = [Vec3::ZERO; 9];
        for (i, t_lat) in [0.0, 0.5, 1.0].into_iter().enumerate() {
            for (j, t_lon) in [0.0, 0.5, 1.0].into_iter().enumerate() {
                let ll = LonLat::flat(
                    sw.lon + (ne.lon - sw.lon) * t_lon,
                    sw.lat + (ne.lat - sw.lat) * t_lat,
                );
                samples[i * 3 + j] = ellipsoid.lon_lat_to_cartesian(ll);
            }
        }

        match Aabb3::from_points(&samples) {
            Some(aabb) => {
                let center = aabb.center();
                Self::new(center, center.distance(aabb.max))
            }
            None => Self::planet(ellipsoid),
        }
    }
}
