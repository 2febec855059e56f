use std::collections::HashMap;

use foundation::LonLat;
use foundation::bounds::BoundingSphere;
use foundation::math::{Ellipsoid, Vec3};

use crate::spatial::TreeRegion;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    pub n: Vec3,
    pub d: f64,
}

impl Plane {
    pub fn new(n: Vec3, d: f64) -> Self {
        Self { n, d }
    }

    pub fn normalize(self) -> Self {
        let l = self.n.length();
        if l <= 0.0 {
            return self;
        }
        let inv = 1.0 / l;
        Self {
            n: self.n.scale(inv),
            d: self.d * inv,
        }
    }

    pub fn distance(&self, p: Vec3) -> f64 {
        self.n.dot(p) + self.d
    }
}

/// View frustum as 6 planes.
///
/// Convention:
/// - A point `p` is inside iff `plane.distance(p) >= 0` for all planes.
/// - Planes are expected to be in world space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
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
            planes: [left, right, bottom, top, near, far],
        }
    }

    /// A frustum that contains everything.
    pub fn unbounded() -> Self {
        let p = Plane::new(Vec3::ZERO, 1.0);
        Self { planes: [p; 6] }
    }

    /// Build a frustum from a row-major view-projection matrix.
    ///
    /// This expects the clip-space convention where visible points satisfy:
    /// - `-w <= x <= w`
    /// - `-w <= y <= w`
    /// - `0 <= z <= w` (z0)
    pub fn from_view_proj_row_major(m: [[f64; 4]; 4]) -> Self {
        let [r0, r1, r2, r3] = m;
        let plane = |sign: f64, r: [f64; 4]| {
            Plane::new(
                Vec3::new(r3[0] + sign * r[0], r3[1] + sign * r[1], r3[2] + sign * r[2]),
                r3[3] + sign * r[3],
            )
            .normalize()
        };
        let near = Plane::new(Vec3::new(r2[0], r2[1], r2[2]), r2[3]).normalize();
        Self::new(
            plane(1.0, r0),
            plane(-1.0, r0),
            plane(1.0, r1),
            plane(-1.0, r1),
            near,
            plane(-1.0, r2),
        )
    }

    /// `true` unless the sphere is entirely behind one of the planes.
    pub fn contains_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|p| p.distance(sphere.center) >= -sphere.radius)
    }
}

/// Camera state needed by entity-tree culling.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    /// Height above the ground (meters).
    pub height: f64,
    pub frustum: Frustum,
}

impl Camera {
    pub fn new(eye: Vec3, height: f64, frustum: Frustum) -> Self {
        Self {
            eye,
            height,
            frustum,
        }
    }

    /// Camera at `position` (height included) seeing everything.
    pub fn above(ellipsoid: &Ellipsoid, position: LonLat) -> Self {
        Self::new(
            ellipsoid.lon_lat_to_cartesian(position),
            position.height,
            Frustum::unbounded(),
        )
    }
}

/// Rendering state of a terrain tile for the current frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TerrainNodeState {
    NotRendering,
    /// Visible, still being subdivided this frame.
    Walkthrough,
    /// Final rendering-resolution tile; no further subdivision this frame.
    Rendering,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TerrainNode {
    pub state: TerrainNodeState,
}

impl TerrainNode {
    pub fn new(state: TerrainNodeState) -> Self {
        Self { state }
    }

    pub fn is_rendering(&self) -> bool {
        self.state == TerrainNodeState::Rendering
    }
}

/// Visible terrain tiles of one tree, keyed by tile/node id.
pub type VisibleNodeMap = HashMap<u64, TerrainNode>;

/// Per-frame terrain visibility, one map per tree region.
#[derive(Debug, Clone, Default)]
pub struct VisibleNodes {
    maps: HashMap<TreeRegion, VisibleNodeMap>,
}

impl VisibleNodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, region: TreeRegion, node_id: u64, state: TerrainNodeState) {
        self.maps
            .entry(region)
            .or_default()
            .insert(node_id, TerrainNode::new(state));
    }

    pub fn get(&self, region: TreeRegion) -> Option<&VisibleNodeMap> {
        self.maps.get(&region)
    }

    pub fn clear(&mut self) {
        self.maps.clear();
    }
}
