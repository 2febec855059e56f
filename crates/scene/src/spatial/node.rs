use foundation::bounds::BoundingSphere;
use foundation::math::Ellipsoid;
use foundation::{Extent, LonLat};

use crate::collection::EntityCollection;
use crate::entity::EntityId;

/// Child position inside a parent node. The discriminant is the `part` used
/// for node-id derivation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Quadrant {
    NorthWest = 0,
    NorthEast = 1,
    SouthWest = 2,
    SouthEast = 3,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];

    pub fn part(self) -> u64 {
        self as u64
    }
}

/// Id of the `part` child of `parent_id`; matches the terrain quadtree's
/// tile ids so the two trees can be joined by id.
pub fn child_node_id(parent_id: u64, part: u64) -> u64 {
    part.wrapping_add(parent_id.wrapping_mul(4)).wrapping_add(1)
}

/// Coordinate space a tree partitions in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NodeSpace {
    /// Extents are Web-Mercator meters.
    Mercator,
    /// Extents are lon/lat degrees (polar caps, hemispheres).
    Geographic,
}

impl NodeSpace {
    /// Position of a geographic point in this space.
    pub fn project(self, ll: LonLat) -> LonLat {
        match self {
            NodeSpace::Mercator => ll.forward_mercator(),
            NodeSpace::Geographic => ll,
        }
    }

    pub fn bounding_sphere(self, ellipsoid: &Ellipsoid, node_id: u64, extent: &Extent) -> BoundingSphere {
        match self {
            NodeSpace::Mercator if node_id == 0 => BoundingSphere::planet(ellipsoid),
            NodeSpace::Mercator => BoundingSphere::from_extent(ellipsoid, &extent.inverse_mercator()),
            NodeSpace::Geographic => BoundingSphere::from_extent(ellipsoid, extent),
        }
    }
}

/// Index of a node in its tree's arena. Stable for the tree's lifetime:
/// nodes are never pruned.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    pub const ROOT: NodeIndex = NodeIndex(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One quadrant of one level of an entity tree.
///
/// A node either has children or may own a render batch, never both.
/// `count` is the number of entities in the subtree, deferred ones included.
#[derive(Debug, Clone)]
pub struct EntityCollectionNode {
    pub node_id: u64,
    pub part: u64,
    pub parent: Option<NodeIndex>,
    pub children: Option<[NodeIndex; 4]>,
    pub extent: Extent,
    pub zoom: u32,
    pub bsphere: BoundingSphere,
    pub count: usize,
    pub deferred: Vec<EntityId>,
    pub collection: Option<EntityCollection>,
    pub in_queue: bool,
}

impl EntityCollectionNode {
    pub(crate) fn new(
        space: NodeSpace,
        ellipsoid: &Ellipsoid,
        part: u64,
        parent: Option<(NodeIndex, u64)>,
        extent: Extent,
        zoom: u32,
    ) -> Self {
        let node_id = match parent {
            Some((_, parent_id)) => child_node_id(parent_id, part),
            None => part,
        };
        Self {
            node_id,
            part,
            parent: parent.map(|(idx, _)| idx),
            children: None,
            extent,
            zoom,
            bsphere: space.bounding_sphere(ellipsoid, node_id, &extent),
            count: 0,
            deferred: Vec::new(),
            collection: None,
            in_queue: false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Entities held by this node (materialized plus deferred).
    pub fn resident_len(&self) -> usize {
        self.collection.as_ref().map_or(0, EntityCollection::len) + self.deferred.len()
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }
}
