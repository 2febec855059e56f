use foundation::LonLat;
use foundation::math::{Ellipsoid, Vec3};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

/// What an entity draws.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Billboard,
    Label,
    /// 3-D marker model.
    GeoObject,
    /// Carries only vector geometry; never indexed by the entity tree.
    Shape,
}

impl EntityKind {
    /// Point-like kinds are batched through the entity tree.
    pub fn is_point_like(self) -> bool {
        !matches!(self, EntityKind::Shape)
    }
}

/// Point-like visual object placed on the planet.
///
/// Either position may be left at zero; the other one is used to derive it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub lon_lat: LonLat,
    pub cartesian: Vec3,
}

impl Entity {
    pub fn at_lon_lat(id: EntityId, kind: EntityKind, lon_lat: LonLat) -> Self {
        Self {
            id,
            kind,
            lon_lat,
            cartesian: Vec3::ZERO,
        }
    }

    pub fn at_cartesian(id: EntityId, kind: EntityKind, cartesian: Vec3) -> Self {
        Self {
            id,
            kind,
            lon_lat: LonLat::default(),
            cartesian,
        }
    }

    /// Geographic position used for spatial indexing.
    ///
    /// Falls back to the Cartesian position when lon/lat is unset, and to the
    /// zero position when neither is usable.
    pub fn geographic_position(&self, ellipsoid: &Ellipsoid) -> LonLat {
        if self.lon_lat.is_finite() && !self.lon_lat.is_zero() {
            return self.lon_lat;
        }
        if self.cartesian.is_finite() && !self.cartesian.is_zero() {
            return ellipsoid.cartesian_to_lon_lat(self.cartesian);
        }
        LonLat::default()
    }

    /// Fills in whichever position is missing.
    pub fn resolve_position(&mut self, ellipsoid: &Ellipsoid) {
        if !self.lon_lat.is_finite() {
            self.lon_lat = LonLat::default();
        }
        if !self.cartesian.is_finite() {
            self.cartesian = Vec3::ZERO;
        }
        if self.cartesian.is_zero() && !self.lon_lat.is_zero() {
            self.cartesian = ellipsoid.lon_lat_to_cartesian(self.lon_lat);
        } else if !self.cartesian.is_zero() {
            self.lon_lat = ellipsoid.cartesian_to_lon_lat(self.cartesian);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Entity, EntityId, EntityKind};
    use foundation::LonLat;
    use foundation::math::{Ellipsoid, Vec3};

    #[test]
    fn lon_lat_wins_when_set() {
        let e = Entity::at_lon_lat(EntityId(1), EntityKind::Label, LonLat::flat(10.0, 20.0));
        assert_eq!(e.geographic_position(&Ellipsoid::WGS84), LonLat::flat(10.0, 20.0));
    }

    #[test]
    fn cartesian_only_derives_lon_lat() {
        let ell = Ellipsoid::WGS84;
        let p = ell.lon_lat_to_cartesian(LonLat::flat(-45.0, 60.0));
        let mut e = Entity::at_cartesian(EntityId(2), EntityKind::Billboard, p);
        let ll = e.geographic_position(&ell);
        assert!((ll.lon + 45.0).abs() < 1e-9);
        assert!((ll.lat - 60.0).abs() < 1e-9);

        e.resolve_position(&ell);
        assert!((e.lon_lat.lat - 60.0).abs() < 1e-9);
    }

    #[test]
    fn unusable_positions_degrade_to_zero() {
        let mut e = Entity::at_lon_lat(
            EntityId(3),
            EntityKind::GeoObject,
            LonLat::flat(f64::NAN, 1.0),
        );
        assert_eq!(e.geographic_position(&Ellipsoid::WGS84), LonLat::default());
        e.resolve_position(&Ellipsoid::WGS84);
        assert_eq!(e.lon_lat, LonLat::default());
        assert_eq!(e.cartesian, Vec3::ZERO);
    }

    #[test]
    fn shapes_are_not_point_like() {
        assert!(EntityKind::GeoObject.is_point_like());
        assert!(!EntityKind::Shape.is_point_like());
    }

    #[test]
    fn lon_lat_only_derives_cartesian() {
        let mut e = Entity::at_lon_lat(EntityId(4), EntityKind::Label, LonLat::flat(0.0, 0.0001));
        e.resolve_position(&Ellipsoid::WGS84);
        assert!((e.cartesian.x - 6_378_137.0).abs() < 1.0);
    }
}
