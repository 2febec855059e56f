use std::collections::BTreeMap;

use foundation::math::Ellipsoid;
use gpu::BufferBackend;
use scene::{
    Camera, CollectionRef, CollectionStyle, DeferredTick, Entity, EntityCollectionsTreeStrategy,
    EntityId, GlobeKind, TreeConfig, VisibleNodes,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{Geometry, GeometryId};
use crate::geometry_handler::{GeometryHandler, HandlerError, UpdateSummary};
use crate::layer::{Layer, LayerId};
use crate::tiles::TileMaterials;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorLayerConfig {
    pub tree: TreeConfig,
    pub style: CollectionStyle,
    pub globe: GlobeKind,
    pub picking_enabled: bool,
    pub visible: bool,
}

impl Default for VectorLayerConfig {
    fn default() -> Self {
        Self {
            tree: TreeConfig::default(),
            style: CollectionStyle::default(),
            globe: GlobeKind::default(),
            picking_enabled: true,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerError {
    UnknownEntity(EntityId),
    DuplicateEntity(EntityId),
    Handler(HandlerError),
}

impl std::fmt::Display for LayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerError::UnknownEntity(id) => write!(f, "entity {} is not in the layer", id.0),
            LayerError::DuplicateEntity(id) => write!(f, "entity {} is already in the layer", id.0),
            LayerError::Handler(err) => write!(f, "geometry handler: {err}"),
        }
    }
}

impl std::error::Error for LayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LayerError::Handler(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HandlerError> for LayerError {
    fn from(err: HandlerError) -> Self {
        LayerError::Handler(err)
    }
}

/// An entity with its optional vector shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub entity: Entity,
    pub geometry: Option<Geometry>,
}

impl Feature {
    pub fn point(entity: Entity) -> Self {
        Self {
            entity,
            geometry: None,
        }
    }

    pub fn with_geometry(entity: Entity, geometry: Geometry) -> Self {
        Self {
            entity,
            geometry: Some(geometry),
        }
    }
}

#[derive(Debug, Clone)]
struct EntityRecord {
    entity: Entity,
    picking_color: [u8; 3],
    has_geometry: bool,
}

/// What one frame produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutput {
    pub collections: Vec<CollectionRef>,
    pub deferred: DeferredTick,
}

/// Vector layer: point-like entities go to the spatial trees, shapes to
/// the geometry handler.
#[derive(Debug)]
pub struct VectorLayer {
    id: LayerId,
    config: VectorLayerConfig,
    ellipsoid: Ellipsoid,
    entities: BTreeMap<EntityId, EntityRecord>,
    picking: BTreeMap<[u8; 3], EntityId>,
    next_picking: u32,
    strategy: EntityCollectionsTreeStrategy,
    handler: GeometryHandler,
}

impl VectorLayer {
    pub fn new(id: u64, config: VectorLayerConfig) -> Self {
        let ellipsoid = Ellipsoid::WGS84;
        let mut strategy = EntityCollectionsTreeStrategy::new(config.globe, config.tree, ellipsoid);
        strategy.set_style(config.style);
        strategy.set_picking_enabled(config.picking_enabled);
        strategy.set_visibility(config.visible);
        Self {
            id: LayerId(id),
            config,
            ellipsoid,
            entities: BTreeMap::new(),
            picking: BTreeMap::new(),
            next_picking: 0,
            strategy,
            handler: GeometryHandler::new(),
        }
    }

    pub fn config(&self) -> &VectorLayerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Stored entity, positions resolved.
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id).map(|r| &r.entity)
    }

    pub fn picking_color(&self, id: EntityId) -> Option<[u8; 3]> {
        self.entities.get(&id).map(|r| r.picking_color)
    }

    /// Reverse lookup of a color read back from the picking framebuffer.
    pub fn entity_at_picking_color(&self, rgb: [u8; 3]) -> Option<EntityId> {
        self.picking.get(&rgb).copied()
    }

    pub fn strategy(&self) -> &EntityCollectionsTreeStrategy {
        &self.strategy
    }

    pub fn geometry_handler(&self) -> &GeometryHandler {
        &self.handler
    }

    pub fn geometry_handler_mut(&mut self) -> &mut GeometryHandler {
        &mut self.handler
    }

    fn assign_picking_color(&mut self, id: EntityId) -> [u8; 3] {
        // Zero stays reserved for "nothing picked".
        loop {
            self.next_picking = (self.next_picking + 1) & 0x00ff_ffff;
            let n = self.next_picking;
            let rgb = [(n >> 16) as u8, (n >> 8) as u8, n as u8];
            if n != 0 && !self.picking.contains_key(&rgb) {
                self.picking.insert(rgb, id);
                return rgb;
            }
        }
    }

    /// Registers the entity and its picking color, and hands its shape to the
    /// geometry handler. Returns the resolved entity.
    fn register(&mut self, feature: Feature) -> Result<Entity, LayerError> {
        let Feature {
            mut entity,
            geometry,
        } = feature;
        entity.resolve_position(&self.ellipsoid);
        let id = entity.id;
        let rgb = self.assign_picking_color(id);

        let has_geometry = geometry.is_some();
        if let Some(mut geometry) = geometry {
            geometry.picking_color = rgb.map(|c| f32::from(c) / 255.0);
            if let Err(err) = self.handler.add(GeometryId(id.0), geometry) {
                self.picking.remove(&rgb);
                return Err(err.into());
            }
        }

        self.entities.insert(
            id,
            EntityRecord {
                entity: entity.clone(),
                picking_color: rgb,
                has_geometry,
            },
        );
        Ok(entity)
    }

    pub fn add(&mut self, feature: Feature) -> Result<(), LayerError> {
        let id = feature.entity.id;
        if self.entities.contains_key(&id) {
            return Err(LayerError::DuplicateEntity(id));
        }
        let entity = self.register(feature)?;
        if entity.kind.is_point_like() {
            let immediate = !self.config.tree.async_ingest;
            self.strategy.insert_entity(&entity, immediate);
        }
        Ok(())
    }

    /// Adds a batch; nothing is added when any id is already present or
    /// repeated within the batch.
    pub fn add_features(&mut self, features: Vec<Feature>) -> Result<(), LayerError> {
        let mut seen = std::collections::BTreeSet::new();
        for f in &features {
            let id = f.entity.id;
            if self.entities.contains_key(&id) || !seen.insert(id) {
                return Err(LayerError::DuplicateEntity(id));
            }
        }

        let count = features.len();
        let mut points = Vec::new();
        for feature in features {
            let entity = self.register(feature)?;
            if entity.kind.is_point_like() {
                points.push(entity);
            }
        }
        self.strategy.insert_entities(&points);
        debug!(
            "layer {} added {count} features, {} point-like",
            self.id.0,
            points.len()
        );
        Ok(())
    }

    pub fn remove_entity(&mut self, id: EntityId) -> Result<Entity, LayerError> {
        let record = self
            .entities
            .remove(&id)
            .ok_or(LayerError::UnknownEntity(id))?;
        self.picking.remove(&record.picking_color);
        self.strategy.remove_entity(id);
        if record.has_geometry {
            self.handler.remove(GeometryId(id.0))?;
        }
        Ok(record.entity)
    }

    pub fn set_visibility(&mut self, visible: bool) {
        self.config.visible = visible;
        self.strategy.set_visibility(visible);
    }

    pub fn set_picking_enabled(&mut self, enabled: bool) {
        self.config.picking_enabled = enabled;
        self.strategy.set_picking_enabled(enabled);
    }

    pub fn set_style(&mut self, style: CollectionStyle) {
        self.config.style = style;
        self.strategy.set_style(style);
    }

    /// Collects this frame's render batches, then runs one deferred
    /// materialization tick.
    pub fn frame(&mut self, visible: &VisibleNodes, camera: &Camera) -> FrameOutput {
        let mut collections = Vec::new();
        self.strategy
            .collect_visible_entity_collections(visible, camera, &mut collections);
        let deferred = self.strategy.run_deferred();
        FrameOutput {
            collections,
            deferred,
        }
    }

    /// Uploads changed geometry arrays and refreshes tiles under them.
    pub fn update(
        &mut self,
        backend: &mut dyn BufferBackend,
        tiles: Option<&mut dyn TileMaterials>,
    ) -> UpdateSummary {
        self.handler.update(backend, tiles)
    }

    pub fn clear(&mut self) {
        self.strategy.dispose();
        self.handler.clear();
        self.entities.clear();
        self.picking.clear();
        debug!("layer {} cleared", self.id.0);
    }

    /// Clears the layer and releases its GPU buffers.
    pub fn dispose(
        &mut self,
        backend: &mut dyn BufferBackend,
        tiles: Option<&mut dyn TileMaterials>,
    ) -> usize {
        self.clear();
        self.handler.dispose(backend, tiles)
    }
}

impl Layer for VectorLayer {
    fn id(&self) -> LayerId {
        self.id
    }

    fn is_visible(&self) -> bool {
        self.config.visible
    }
}
