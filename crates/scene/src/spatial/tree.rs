use std::collections::{HashMap, HashSet};

use foundation::math::Ellipsoid;
use foundation::{Extent, LonLat};
use runtime::{DeferredQueue, Enqueued};
use tracing::{debug, trace};

use crate::collection::{CollectionStyle, EntityCollection};
use crate::config::TreeConfig;
use crate::entity::EntityId;
use crate::spatial::node::{EntityCollectionNode, NodeIndex, NodeSpace, Quadrant};
use crate::spatial::strategy::{CollectionRef, NodeRef, TreeRegion};
use crate::visibility::{Camera, VisibleNodeMap};

/// Distance factor of the altitude visibility test (meters per sqrt(meter)).
pub const VISIBLE_DISTANCE: f64 = 3570.0;
/// Camera height above which every node passes the altitude test.
pub const ALWAYS_VISIBLE_HEIGHT: f64 = 10_000.0;

/// Where an indexed entity lives and the tree-space coordinate it was routed by.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Placement {
    pub node: NodeIndex,
    pub coord: LonLat,
}

type Item = (EntityId, LonLat);

/// Per-frame inputs shared by every tree of a strategy.
pub(crate) struct CollectContext<'a> {
    pub camera: &'a Camera,
    pub style: &'a CollectionStyle,
    /// Queue deferred entities instead of applying them inline.
    pub defer: bool,
    pub queue: &'a mut DeferredQueue<NodeRef>,
}

/// One adaptive quadtree of entity render batches.
///
/// Nodes live in an arena; children are created on first split and never
/// pruned, so a `NodeIndex` stays valid until `clear`.
#[derive(Debug, Clone)]
pub struct EntityTree {
    region: TreeRegion,
    space: NodeSpace,
    extent: Extent,
    config: TreeConfig,
    ellipsoid: Ellipsoid,
    picking_enabled: bool,
    nodes: Vec<EntityCollectionNode>,
    placements: HashMap<EntityId, Placement>,
    rendering: HashSet<u64>,
    second_pass: Vec<NodeIndex>,
}

impl EntityTree {
    pub fn new(
        region: TreeRegion,
        space: NodeSpace,
        extent: Extent,
        config: TreeConfig,
        ellipsoid: Ellipsoid,
    ) -> Self {
        let root = EntityCollectionNode::new(space, &ellipsoid, 0, None, extent, 0);
        Self {
            region,
            space,
            extent,
            config,
            ellipsoid,
            picking_enabled: true,
            nodes: vec![root],
            placements: HashMap::new(),
            rendering: HashSet::new(),
            second_pass: Vec::new(),
        }
    }

    pub fn region(&self) -> TreeRegion {
        self.region
    }

    pub fn space(&self) -> NodeSpace {
        self.space
    }

    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    pub fn root(&self) -> &EntityCollectionNode {
        &self.nodes[NodeIndex::ROOT.index()]
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&EntityCollectionNode> {
        self.nodes.get(idx.index())
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &EntityCollectionNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeIndex(i as u32), n))
    }

    pub fn leaves(&self) -> impl Iterator<Item = (NodeIndex, &EntityCollectionNode)> {
        self.nodes().filter(|(_, n)| n.is_leaf())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of indexed entities.
    pub fn len(&self) -> usize {
        self.root().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.placements.contains_key(&id)
    }

    pub fn placement(&self, id: EntityId) -> Option<&Placement> {
        self.placements.get(&id)
    }

    pub fn collection(&self, idx: NodeIndex) -> Option<&EntityCollection> {
        self.node(idx).and_then(|n| n.collection.as_ref())
    }

    /// Whether the node contributed a batch during the last collect pass.
    pub fn is_rendering(&self, idx: NodeIndex) -> bool {
        self.node(idx)
            .is_some_and(|n| self.rendering.contains(&n.node_id))
    }

    /// Tree-space coordinate for a geographic position, clamped into the root.
    pub fn tree_coord(&self, ll: LonLat) -> LonLat {
        self.extent.clamp(self.space.project(ll))
    }

    pub fn insert(&mut self, id: EntityId, position: LonLat, immediate: bool) {
        let coord = self.tree_coord(position);
        self.build_tree(NodeIndex::ROOT, vec![(id, coord)], immediate);
    }

    /// Bulk insert; each entity is routed once per level rather than per call.
    pub fn insert_batch(&mut self, entities: &[(EntityId, LonLat)], immediate: bool) {
        let batch: Vec<Item> = entities
            .iter()
            .map(|&(id, ll)| (id, self.tree_coord(ll)))
            .collect();
        self.build_tree(NodeIndex::ROOT, batch, immediate);
    }

    fn build_tree(&mut self, start: NodeIndex, batch: Vec<Item>, immediate: bool) {
        let mut stack = vec![(start, batch, immediate)];

        while let Some((idx, batch, immediate)) = stack.pop() {
            if batch.is_empty() {
                continue;
            }
            self.nodes[idx.index()].count += batch.len();

            if self.nodes[idx.index()].is_leaf() {
                let node = &self.nodes[idx.index()];
                let resident = node.resident_len() + batch.len();
                if resident <= self.config.node_capacity || node.zoom >= self.config.max_zoom {
                    self.attach(idx, batch, immediate);
                    continue;
                }

                let (materialized, deferred) = self.split(idx);
                let children = self.children_of(idx);
                for (sub, flag) in [(materialized, true), (deferred, false)] {
                    for (child, items) in children.into_iter().zip(self.route(idx, sub)) {
                        stack.push((child, items, flag));
                    }
                }
            }

            let children = self.children_of(idx);
            for (child, items) in children.into_iter().zip(self.route(idx, batch)).rev() {
                stack.push((child, items, immediate));
            }
        }
    }

    fn children_of(&self, idx: NodeIndex) -> [NodeIndex; 4] {
        self.nodes[idx.index()]
            .children
            .unwrap_or([NodeIndex::ROOT; 4])
    }

    /// Turns a leaf into an internal node, returning the entities it held.
    fn split(&mut self, idx: NodeIndex) -> (Vec<Item>, Vec<Item>) {
        let first = NodeIndex(self.nodes.len() as u32);
        let (extent, zoom, node_id) = {
            let n = &self.nodes[idx.index()];
            (n.extent, n.zoom, n.node_id)
        };
        for (i, q) in Quadrant::ALL.into_iter().enumerate() {
            self.nodes.push(EntityCollectionNode::new(
                self.space,
                &self.ellipsoid,
                q.part(),
                Some((idx, node_id)),
                extent.quadrants()[i],
                zoom + 1,
            ));
        }

        let node = &mut self.nodes[idx.index()];
        node.children = Some([
            first,
            NodeIndex(first.0 + 1),
            NodeIndex(first.0 + 2),
            NodeIndex(first.0 + 3),
        ]);
        let materialized = node
            .collection
            .take()
            .map(EntityCollection::into_entities)
            .unwrap_or_default();
        let deferred = std::mem::take(&mut node.deferred);
        debug!(
            "split node {node_id} at zoom {zoom}: pushing down {} entities",
            materialized.len() + deferred.len()
        );

        let with_coord = |ids: Vec<EntityId>| -> Vec<Item> {
            ids.into_iter()
                .map(|id| {
                    let coord = self.placements.get(&id).map_or(LonLat::default(), |p| p.coord);
                    (id, coord)
                })
                .collect()
        };
        (with_coord(materialized), with_coord(deferred))
    }

    /// Partitions `items` by child quadrant (NW, NE, SW, SE). Containment is
    /// inclusive and the first matching child wins.
    fn route(&self, idx: NodeIndex, items: Vec<Item>) -> [Vec<Item>; 4] {
        let node = &self.nodes[idx.index()];
        let mut parts: [Vec<Item>; 4] = Default::default();
        let Some(children) = node.children else {
            return parts;
        };
        let center = node.extent.center();
        for item in items {
            let coord = item.1;
            let slot = children
                .iter()
                .position(|c| self.nodes[c.index()].extent.is_inside(coord))
                .unwrap_or_else(|| {
                    let west = coord.lon < center.lon;
                    let north = coord.lat >= center.lat;
                    match (north, west) {
                        (true, true) => 0,
                        (true, false) => 1,
                        (false, true) => 2,
                        (false, false) => 3,
                    }
                });
            parts[slot].push(item);
        }
        parts
    }

    fn attach(&mut self, idx: NodeIndex, batch: Vec<Item>, immediate: bool) {
        for &(id, coord) in &batch {
            self.placements.insert(id, Placement { node: idx, coord });
        }
        let picking = self.picking_enabled;
        let defer = !immediate && self.config.async_ingest;
        let node = &mut self.nodes[idx.index()];
        let collection = node
            .collection
            .get_or_insert_with(|| EntityCollection::new(picking));
        let ids = batch.into_iter().map(|(id, _)| id);
        if defer {
            node.deferred.extend(ids);
        } else {
            let ids: Vec<EntityId> = ids.collect();
            collection.add_entities(&ids);
        }
    }

    /// Removes an entity from whichever batch or deferred list holds it.
    ///
    /// Counts are decremented up to the root. A leaf left with nothing drops
    /// its batch but stays in the tree.
    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(placement) = self.placements.remove(&id) else {
            return false;
        };

        let node = &mut self.nodes[placement.node.index()];
        let removed = match node.deferred.iter().position(|e| *e == id) {
            Some(pos) => {
                node.deferred.remove(pos);
                true
            }
            None => node
                .collection
                .as_mut()
                .is_some_and(|c| c.remove_entity(id)),
        };
        debug_assert!(removed, "placement points at a node without the entity");

        let mut cursor = Some(placement.node);
        while let Some(idx) = cursor {
            let n = &mut self.nodes[idx.index()];
            debug_assert!(n.count > 0, "node count underflow");
            n.count = n.count.saturating_sub(1);
            cursor = n.parent;
        }

        let node = &mut self.nodes[placement.node.index()];
        if node.count == 0 && node.deferred.is_empty() {
            node.collection = None;
        }
        true
    }

    pub fn set_picking_enabled(&mut self, enabled: bool) {
        self.picking_enabled = enabled;
        for node in &mut self.nodes {
            if let Some(c) = node.collection.as_mut() {
                c.set_picking_enabled(enabled);
            }
        }
    }

    /// Moves the node's deferred entities into its batch. Returns how many moved.
    pub fn apply_collection(&mut self, idx: NodeIndex) -> usize {
        let picking = self.picking_enabled;
        let Some(node) = self.nodes.get_mut(idx.index()) else {
            return 0;
        };
        node.in_queue = false;
        if node.deferred.is_empty() {
            return 0;
        }
        let deferred = std::mem::take(&mut node.deferred);
        node.collection
            .get_or_insert_with(|| EntityCollection::new(picking))
            .add_entities(&deferred);
        trace!(
            "materialized {} entities into node {}",
            deferred.len(),
            node.node_id
        );
        deferred.len()
    }

    pub(crate) fn mark_dequeued(&mut self, idx: NodeIndex) {
        if let Some(node) = self.nodes.get_mut(idx.index()) {
            node.in_queue = false;
        }
    }

    pub(crate) fn begin_frame(&mut self) {
        self.rendering.clear();
        self.second_pass.clear();
    }

    /// Runs both collect passes against this tree's terrain visibility map.
    pub(crate) fn collect(
        &mut self,
        visible: &VisibleNodeMap,
        ctx: &mut CollectContext<'_>,
        out: &mut Vec<CollectionRef>,
    ) {
        self.collect_pass1(visible, ctx, out);

        let second_pass = std::mem::take(&mut self.second_pass);
        for &idx in second_pass.iter().rev() {
            let rendering_node = self.nodes[idx.index()].node_id;
            self.collect_pass2(idx, rendering_node, ctx, out);
        }
        self.second_pass = second_pass;
    }

    /// Follows the terrain tree down to its rendering tiles. Nodes whose
    /// terrain tile is absent are skipped with their subtree.
    fn collect_pass1(
        &mut self,
        visible: &VisibleNodeMap,
        ctx: &mut CollectContext<'_>,
        out: &mut Vec<CollectionRef>,
    ) {
        let mut stack = vec![NodeIndex::ROOT];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx.index()];
            let Some(terrain) = visible.get(&node.node_id) else {
                continue;
            };
            if node.collection.is_some() {
                self.render_collection(idx, None, ctx, out);
            } else if let Some(children) = node.children {
                if terrain.is_rendering() {
                    self.second_pass.push(idx);
                } else {
                    stack.extend(children.into_iter().rev());
                }
            }
        }
    }

    /// Finer culling below a rendering terrain tile: frustum plus altitude.
    fn collect_pass2(
        &mut self,
        start: NodeIndex,
        rendering_node: u64,
        ctx: &mut CollectContext<'_>,
        out: &mut Vec<CollectionRef>,
    ) {
        let cam = ctx.camera;
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx.index()];
            let sphere = &node.bsphere;
            let alt_visible = cam.eye.distance(sphere.center) - sphere.radius
                < VISIBLE_DISTANCE * cam.height.max(0.0).sqrt()
                || cam.height > ALWAYS_VISIBLE_HEIGHT;

            if node.count == 0 || !alt_visible || !cam.frustum.contains_sphere(sphere) {
                continue;
            }
            if node.collection.is_some() {
                self.render_collection(idx, Some(rendering_node), ctx, out);
            } else if let Some(children) = node.children {
                stack.extend(children.into_iter().rev());
            }
        }
    }

    fn render_collection(
        &mut self,
        idx: NodeIndex,
        rendering_node: Option<u64>,
        ctx: &mut CollectContext<'_>,
        out: &mut Vec<CollectionRef>,
    ) {
        let region = self.region;
        let node = &mut self.nodes[idx.index()];
        self.rendering.insert(node.node_id);

        if node.has_deferred() && !node.in_queue {
            if ctx.defer {
                node.in_queue = true;
                let state = ctx.queue.push(NodeRef { region, node: idx });
                if state == Enqueued::Pending {
                    trace!("node {} waits for materialization", node.node_id);
                }
            } else {
                self.apply_collection(idx);
            }
        }

        let node = &mut self.nodes[idx.index()];
        if let Some(c) = node.collection.as_mut() {
            c.set_style(*ctx.style);
        }
        out.push(CollectionRef {
            region,
            node: idx,
            node_id: node.node_id,
            rendering_node,
        });
    }

    /// Drops every node and placement, leaving an empty root.
    pub fn clear(&mut self) {
        let root = EntityCollectionNode::new(self.space, &self.ellipsoid, 0, None, self.extent, 0);
        self.nodes = vec![root];
        self.placements.clear();
        self.rendering.clear();
        self.second_pass.clear();
        debug!("cleared {:?} entity tree", self.region);
    }
}

#[cfg(test)]
mod tests {
    use super::EntityTree;
    use crate::config::TreeConfig;
    use crate::entity::EntityId;
    use crate::spatial::node::{NodeIndex, NodeSpace};
    use crate::spatial::strategy::TreeRegion;
    use foundation::math::Ellipsoid;
    use foundation::{Extent, LonLat};

    fn geo_tree(capacity: usize, async_ingest: bool) -> EntityTree {
        let config = TreeConfig {
            node_capacity: capacity,
            async_ingest,
            ..TreeConfig::default()
        };
        EntityTree::new(
            TreeRegion::West,
            NodeSpace::Geographic,
            Extent::from_array([-180.0, -90.0, 0.0, 90.0]),
            config,
            Ellipsoid::WGS84,
        )
    }

    fn leaf_total(tree: &EntityTree) -> usize {
        tree.leaves().map(|(_, n)| n.count).sum()
    }

    #[test]
    fn stays_a_leaf_up_to_capacity() {
        let mut tree = geo_tree(4, false);
        for i in 0..4 {
            tree.insert(EntityId(i), LonLat::flat(-10.0 - i as f64, 5.0), false);
        }
        assert!(tree.root().is_leaf());
        assert_eq!(tree.collection(NodeIndex::ROOT).map(|c| c.len()), Some(4));
    }

    #[test]
    fn split_pushes_residents_down() {
        let mut tree = geo_tree(2, false);
        tree.insert(EntityId(1), LonLat::flat(-170.0, 80.0), false);
        tree.insert(EntityId(2), LonLat::flat(-10.0, 80.0), false);
        tree.insert(EntityId(3), LonLat::flat(-170.0, -80.0), false);

        let root = tree.root();
        assert!(!root.is_leaf());
        assert!(root.collection.is_none());
        assert_eq!(root.count, 3);
        assert_eq!(leaf_total(&tree), 3);

        let nw = tree.placement(EntityId(1)).unwrap().node;
        let ne = tree.placement(EntityId(2)).unwrap().node;
        let sw = tree.placement(EntityId(3)).unwrap().node;
        assert_eq!(tree.node(nw).unwrap().node_id, 1);
        assert_eq!(tree.node(ne).unwrap().node_id, 2);
        assert_eq!(tree.node(sw).unwrap().node_id, 3);
        assert!(tree.collection(nw).unwrap().contains(EntityId(1)));
    }

    #[test]
    fn boundary_point_goes_to_first_matching_quadrant() {
        let mut tree = geo_tree(0, false);
        // Exactly the root centre: inside all four quadrants.
        tree.insert(EntityId(7), LonLat::flat(-90.0, 0.0), false);
        let node = tree.placement(EntityId(7)).unwrap().node;
        // Capacity zero keeps splitting until max zoom.
        assert_eq!(tree.node(node).unwrap().zoom, TreeConfig::default().max_zoom);
        assert_eq!(leaf_total(&tree), 1);
    }

    #[test]
    fn deferred_entities_count_but_wait() {
        let mut tree = geo_tree(10, true);
        tree.insert(EntityId(1), LonLat::flat(-45.0, 10.0), false);
        tree.insert(EntityId(2), LonLat::flat(-45.0, 11.0), true);
        let root = tree.root();
        assert_eq!(root.count, 2);
        assert_eq!(root.deferred, vec![EntityId(1)]);
        assert_eq!(tree.collection(NodeIndex::ROOT).unwrap().entities(), &[EntityId(2)]);

        assert_eq!(tree.apply_collection(NodeIndex::ROOT), 1);
        assert!(tree.root().deferred.is_empty());
        assert_eq!(tree.collection(NodeIndex::ROOT).unwrap().len(), 2);
    }

    #[test]
    fn remove_updates_counts_and_drops_empty_batch() {
        let mut tree = geo_tree(1, false);
        tree.insert(EntityId(1), LonLat::flat(-170.0, 80.0), false);
        tree.insert(EntityId(2), LonLat::flat(-10.0, -80.0), false);
        let leaf = tree.placement(EntityId(1)).unwrap().node;

        assert!(tree.remove(EntityId(1)));
        assert!(!tree.remove(EntityId(1)));
        assert_eq!(tree.root().count, 1);
        assert!(tree.collection(leaf).is_none());
        assert_eq!(tree.node_count(), 5);
        assert_eq!(leaf_total(&tree), 1);
    }

    #[test]
    fn bulk_insert_matches_incremental_counts() {
        let mut bulk = geo_tree(3, false);
        let items: Vec<_> = (0..20)
            .map(|i| (EntityId(i), LonLat::flat(-170.0 + 8.0 * i as f64, -60.0 + 6.0 * i as f64)))
            .collect();
        bulk.insert_batch(&items, false);
        assert_eq!(bulk.len(), 20);
        assert_eq!(leaf_total(&bulk), 20);
        for (_, n) in bulk.leaves() {
            assert!(n.resident_len() <= 3);
        }
    }

    #[test]
    fn clear_resets_to_empty_root() {
        let mut tree = geo_tree(1, false);
        tree.insert(EntityId(1), LonLat::flat(-170.0, 80.0), false);
        tree.insert(EntityId(2), LonLat::flat(-10.0, -80.0), false);
        tree.clear();
        assert_eq!(tree.node_count(), 1);
        assert!(tree.is_empty());
        assert!(!tree.contains(EntityId(1)));
    }
}
