use std::collections::{HashMap, HashSet};

use foundation::math::Ellipsoid;
use foundation::math::mercator::{MAX_LAT, MIN_LAT, POLE};
use foundation::{Extent, LonLat};
use runtime::DeferredQueue;
use tracing::{debug, trace};

use crate::collection::{CollectionStyle, EntityCollection};
use crate::config::{GlobeKind, TreeConfig};
use crate::entity::{Entity, EntityId};
use crate::spatial::node::{NodeIndex, NodeSpace};
use crate::spatial::tree::{CollectContext, EntityTree};
use crate::visibility::{Camera, VisibleNodes};

/// Which independent tree of a strategy a node belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TreeRegion {
    /// Web-Mercator tree between the polar caps.
    Mercator,
    North,
    South,
    West,
    East,
}

/// A node of one of the strategy's trees.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub region: TreeRegion,
    pub node: NodeIndex,
}

/// A render batch collected for this frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CollectionRef {
    pub region: TreeRegion,
    pub node: NodeIndex,
    pub node_id: u64,
    /// Terrain tile the batch was reached through in the second pass; `None`
    /// when the batch's own tile was visible.
    pub rendering_node: Option<u64>,
}

/// Outcome of one deferred-materialization tick.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DeferredTick {
    pub materialized_nodes: usize,
    pub materialized_entities: usize,
    /// Pending nodes dropped because they were not rendering any more.
    pub skipped: usize,
}

/// Owns a layer's entity trees and its deferred-materialization queue.
///
/// Earth globes get a Mercator tree plus two polar caps in lon/lat; flat
/// equirectangular views get a west and an east hemisphere.
#[derive(Debug)]
pub struct EntityCollectionsTreeStrategy {
    globe: GlobeKind,
    config: TreeConfig,
    ellipsoid: Ellipsoid,
    trees: Vec<EntityTree>,
    regions: HashMap<EntityId, TreeRegion>,
    queue: DeferredQueue<NodeRef>,
    style: CollectionStyle,
    picking_enabled: bool,
    visible: bool,
}

impl EntityCollectionsTreeStrategy {
    pub fn new(globe: GlobeKind, config: TreeConfig, ellipsoid: Ellipsoid) -> Self {
        let tree = |region, space, extent: [f64; 4]| {
            EntityTree::new(region, space, Extent::from_array(extent), config, ellipsoid)
        };
        let trees = match globe {
            GlobeKind::Earth => vec![
                tree(TreeRegion::Mercator, NodeSpace::Mercator, [-POLE, -POLE, POLE, POLE]),
                tree(TreeRegion::North, NodeSpace::Geographic, [-180.0, MAX_LAT, 180.0, 90.0]),
                tree(TreeRegion::South, NodeSpace::Geographic, [-180.0, -90.0, 180.0, MIN_LAT]),
            ],
            GlobeKind::Equi => vec![
                tree(TreeRegion::West, NodeSpace::Geographic, [-180.0, -90.0, 0.0, 90.0]),
                tree(TreeRegion::East, NodeSpace::Geographic, [0.0, -90.0, 180.0, 90.0]),
            ],
        };
        Self {
            globe,
            config,
            ellipsoid,
            trees,
            regions: HashMap::new(),
            queue: DeferredQueue::new(),
            style: CollectionStyle::default(),
            picking_enabled: true,
            visible: true,
        }
    }

    pub fn earth(config: TreeConfig) -> Self {
        Self::new(GlobeKind::Earth, config, Ellipsoid::WGS84)
    }

    pub fn equi(config: TreeConfig) -> Self {
        Self::new(GlobeKind::Equi, config, Ellipsoid::WGS84)
    }

    pub fn globe(&self) -> GlobeKind {
        self.globe
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn trees(&self) -> &[EntityTree] {
        &self.trees
    }

    pub fn tree(&self, region: TreeRegion) -> Option<&EntityTree> {
        self.trees.iter().find(|t| t.region() == region)
    }

    fn tree_mut(&mut self, region: TreeRegion) -> Option<&mut EntityTree> {
        self.trees.iter_mut().find(|t| t.region() == region)
    }

    /// Tree an entity at `ll` belongs to.
    pub fn route(&self, ll: LonLat) -> TreeRegion {
        match self.globe {
            GlobeKind::Earth if ll.lat > MAX_LAT => TreeRegion::North,
            GlobeKind::Earth if ll.lat < MIN_LAT => TreeRegion::South,
            GlobeKind::Earth => TreeRegion::Mercator,
            GlobeKind::Equi if ll.lon < 0.0 => TreeRegion::West,
            GlobeKind::Equi => TreeRegion::East,
        }
    }

    /// Indexes one entity. Re-inserting an indexed entity moves it.
    pub fn insert_entity(&mut self, entity: &Entity, immediate: bool) {
        if self.regions.contains_key(&entity.id) {
            self.remove_entity(entity.id);
        }
        let ll = entity.geographic_position(&self.ellipsoid);
        let region = self.route(ll);
        if let Some(tree) = self.tree_mut(region) {
            tree.insert(entity.id, ll, immediate);
            self.regions.insert(entity.id, region);
        }
    }

    /// Bulk insert, partitioned per tree. Materialization is deferred when
    /// the tree ingests asynchronously.
    pub fn insert_entities(&mut self, entities: &[Entity]) {
        let mut batches: HashMap<TreeRegion, Vec<(EntityId, LonLat)>> = HashMap::new();
        let mut pending: HashSet<EntityId> = HashSet::with_capacity(entities.len());
        for entity in entities {
            if let Some(prev) = self.regions.get(&entity.id).copied() {
                if pending.contains(&entity.id) {
                    // Repeated within this batch: the later copy wins.
                    if let Some(batch) = batches.get_mut(&prev) {
                        batch.retain(|(id, _)| *id != entity.id);
                    }
                } else {
                    self.remove_entity(entity.id);
                }
            }
            pending.insert(entity.id);
            let ll = entity.geographic_position(&self.ellipsoid);
            let region = self.route(ll);
            self.regions.insert(entity.id, region);
            batches.entry(region).or_default().push((entity.id, ll));
        }
        for tree in &mut self.trees {
            if let Some(batch) = batches.get(&tree.region()) {
                tree.insert_batch(batch, false);
            }
        }
    }

    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        let Some(region) = self.regions.remove(&id) else {
            return false;
        };
        self.tree_mut(region).is_some_and(|t| t.remove(id))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.regions.contains_key(&id)
    }

    /// Number of indexed entities across all trees.
    pub fn len(&self) -> usize {
        self.trees.iter().map(EntityTree::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Node currently owning the entity.
    pub fn node_of(&self, id: EntityId) -> Option<NodeRef> {
        let region = *self.regions.get(&id)?;
        let placement = self.tree(region)?.placement(id)?;
        Some(NodeRef {
            region,
            node: placement.node,
        })
    }

    /// Whether the entity's node contributed a batch in the last collect.
    pub fn is_entity_visible(&self, id: EntityId) -> bool {
        self.node_of(id).is_some_and(|r| self.is_rendering(r))
    }

    pub fn is_rendering(&self, r: NodeRef) -> bool {
        self.tree(r.region).is_some_and(|t| t.is_rendering(r.node))
    }

    pub fn picking_enabled(&self) -> bool {
        self.picking_enabled
    }

    pub fn set_picking_enabled(&mut self, enabled: bool) {
        self.picking_enabled = enabled;
        for tree in &mut self.trees {
            tree.set_picking_enabled(enabled);
        }
    }

    pub fn style(&self) -> &CollectionStyle {
        &self.style
    }

    /// Applied to every batch as it is collected.
    pub fn set_style(&mut self, style: CollectionStyle) {
        self.style = style;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// A hidden layer collects nothing and therefore queues no work.
    pub fn set_visibility(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Appends this frame's render batches to `out`.
    ///
    /// Rendering bookkeeping is reset first, then each tree runs both passes
    /// against its own terrain visibility map.
    pub fn collect_visible_entity_collections(
        &mut self,
        visible: &VisibleNodes,
        camera: &Camera,
        out: &mut Vec<CollectionRef>,
    ) {
        for tree in &mut self.trees {
            tree.begin_frame();
        }
        if !self.visible {
            return;
        }

        let mut ctx = CollectContext {
            camera,
            style: &self.style,
            defer: self.config.async_ingest,
            queue: &mut self.queue,
        };
        for tree in &mut self.trees {
            if let Some(map) = visible.get(tree.region()) {
                tree.collect(map, &mut ctx, out);
            }
        }
    }

    pub fn collection(&self, r: &CollectionRef) -> Option<&EntityCollection> {
        self.tree(r.region)?.collection(r.node)
    }

    /// Runs one tick of deferred materialization.
    ///
    /// Applies what was scheduled, then pulls the most recently queued nodes
    /// into the free slots, dropping those that are no longer rendering.
    pub fn run_deferred(&mut self) -> DeferredTick {
        let mut tick = DeferredTick::default();

        for r in self.queue.take_scheduled() {
            let moved = self.tree_mut(r.region).map_or(0, |t| t.apply_collection(r.node));
            if moved > 0 {
                tick.materialized_nodes += 1;
                tick.materialized_entities += moved;
            }
        }

        let trees = &self.trees;
        let skipped = self.queue.refill(|r| {
            trees
                .iter()
                .find(|t| t.region() == r.region)
                .is_some_and(|t| t.is_rendering(r.node))
        });
        tick.skipped = skipped.len();
        for r in skipped {
            trace!("skipped deferred node {:?} in {:?}: not rendering", r.node, r.region);
            if let Some(tree) = self.tree_mut(r.region) {
                tree.mark_dequeued(r.node);
            }
        }
        tick
    }

    /// Nodes waiting behind the in-flight one.
    pub fn pending_len(&self) -> usize {
        self.queue.pending_len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    /// Drops every tree's content and all queued work.
    pub fn dispose(&mut self) {
        self.queue.clear();
        self.regions.clear();
        for tree in &mut self.trees {
            tree.clear();
        }
        debug!("disposed {:?} entity trees", self.globe);
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityCollectionsTreeStrategy, TreeRegion};
    use crate::config::TreeConfig;
    use crate::entity::{Entity, EntityId, EntityKind};
    use crate::visibility::{Camera, TerrainNodeState, VisibleNodes};
    use foundation::LonLat;
    use foundation::math::Ellipsoid;

    fn label(id: u64, lon: f64, lat: f64) -> Entity {
        Entity::at_lon_lat(EntityId(id), EntityKind::Label, LonLat::flat(lon, lat))
    }

    fn sync_config() -> TreeConfig {
        TreeConfig {
            node_capacity: 4,
            async_ingest: false,
            ..TreeConfig::default()
        }
    }

    #[test]
    fn earth_routes_polar_caps() {
        let mut s = EntityCollectionsTreeStrategy::earth(sync_config());
        s.insert_entity(&label(1, 10.0, 86.0), false);
        s.insert_entity(&label(2, 10.0, -86.0), false);
        s.insert_entity(&label(3, 10.0, 85.0), false);

        assert_eq!(s.node_of(EntityId(1)).unwrap().region, TreeRegion::North);
        assert_eq!(s.node_of(EntityId(2)).unwrap().region, TreeRegion::South);
        assert_eq!(s.node_of(EntityId(3)).unwrap().region, TreeRegion::Mercator);
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn equi_routes_by_longitude() {
        let mut s = EntityCollectionsTreeStrategy::equi(sync_config());
        s.insert_entity(&label(1, -0.5, 0.0), false);
        s.insert_entity(&label(2, 0.0, 0.0), false);
        assert_eq!(s.node_of(EntityId(1)).unwrap().region, TreeRegion::West);
        assert_eq!(s.node_of(EntityId(2)).unwrap().region, TreeRegion::East);
        assert!(s.tree(TreeRegion::Mercator).is_none());
    }

    #[test]
    fn cartesian_only_entity_is_routed_by_derived_latitude() {
        let ell = Ellipsoid::WGS84;
        let p = ell.lon_lat_to_cartesian(LonLat::flat(30.0, 88.0));
        let mut s = EntityCollectionsTreeStrategy::earth(sync_config());
        s.insert_entity(&Entity::at_cartesian(EntityId(5), EntityKind::Billboard, p), false);
        assert_eq!(s.node_of(EntityId(5)).unwrap().region, TreeRegion::North);
    }

    #[test]
    fn reinsert_moves_entity() {
        let mut s = EntityCollectionsTreeStrategy::earth(sync_config());
        s.insert_entity(&label(1, 10.0, 10.0), false);
        s.insert_entity(&label(1, 10.0, 89.0), false);
        assert_eq!(s.len(), 1);
        assert_eq!(s.tree(TreeRegion::Mercator).unwrap().len(), 0);
        assert_eq!(s.node_of(EntityId(1)).unwrap().region, TreeRegion::North);
    }

    #[test]
    fn hidden_layer_collects_and_queues_nothing() {
        let mut s = EntityCollectionsTreeStrategy::equi(TreeConfig::default());
        s.insert_entity(&label(1, 20.0, 20.0), false);
        s.set_visibility(false);

        let mut visible = VisibleNodes::new();
        visible.insert(TreeRegion::East, 0, TerrainNodeState::Rendering);
        let cam = Camera::above(&Ellipsoid::WGS84, LonLat::new(20.0, 20.0, 1.0e6));
        let mut out = Vec::new();
        s.collect_visible_entity_collections(&visible, &cam, &mut out);
        assert!(out.is_empty());
        assert!(s.is_idle());
    }

    #[test]
    fn picking_flag_reaches_existing_batches() {
        let mut s = EntityCollectionsTreeStrategy::earth(sync_config());
        for i in 0..10 {
            s.insert_entity(&label(i, -100.0 + 20.0 * i as f64, 0.0), false);
        }
        s.set_picking_enabled(false);
        let tree = s.tree(TreeRegion::Mercator).unwrap();
        assert!(
            tree.nodes()
                .filter_map(|(_, n)| n.collection.as_ref())
                .all(|c| !c.picking_enabled())
        );
    }

    #[test]
    fn bulk_reimport_moves_entities_and_keeps_last_duplicate() {
        let mut s = EntityCollectionsTreeStrategy::earth(sync_config());
        let first: Vec<Entity> = (0..500)
            .map(|i| label(i, -170.0 + (i % 340) as f64, 0.0))
            .collect();
        s.insert_entities(&first);
        assert_eq!(s.tree(TreeRegion::Mercator).unwrap().len(), 500);

        let mut again: Vec<Entity> = (0..500)
            .map(|i| label(i, -170.0 + (i % 340) as f64, 89.0))
            .collect();
        again.push(label(0, 5.0, -89.0));
        s.insert_entities(&again);

        assert_eq!(s.len(), 500);
        assert_eq!(s.tree(TreeRegion::Mercator).unwrap().len(), 0);
        assert_eq!(s.tree(TreeRegion::North).unwrap().len(), 499);
        assert_eq!(s.tree(TreeRegion::South).unwrap().len(), 1);
        assert_eq!(s.node_of(EntityId(0)).unwrap().region, TreeRegion::South);
    }

    #[test]
    fn dispose_forgets_everything() {
        let mut s = EntityCollectionsTreeStrategy::earth(TreeConfig::default());
        s.insert_entities(&[label(1, 0.0, 0.0), label(2, 0.0, 89.0)]);
        s.dispose();
        assert!(s.is_empty());
        assert!(!s.contains(EntityId(1)));
        assert!(s.is_idle());
    }
}
