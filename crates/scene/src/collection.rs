use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// Draw-time parameters a layer pushes onto each of its render batches.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionStyle {
    pub fading_opacity: f32,
    /// `[near, far, far_scale]` distance scaling for billboards and labels.
    pub scale_by_distance: [f32; 3],
    pub picking_scale: [f32; 3],
    pub polygon_offset_units: f32,
}

impl Default for CollectionStyle {
    fn default() -> Self {
        Self {
            fading_opacity: 1.0,
            scale_by_distance: [f32::MAX; 3],
            picking_scale: [1.0; 3],
            polygon_offset_units: 0.0,
        }
    }
}

/// Render batch: a group of point-like entities drawn together in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityCollection {
    entities: Vec<EntityId>,
    picking_enabled: bool,
    style: CollectionStyle,
}

impl EntityCollection {
    pub fn new(picking_enabled: bool) -> Self {
        Self {
            entities: Vec::new(),
            picking_enabled,
            style: CollectionStyle::default(),
        }
    }

    pub fn add_entities(&mut self, entities: &[EntityId]) {
        self.entities.extend_from_slice(entities);
    }

    /// Removes `id`, keeping draw order of the rest.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        match self.entities.iter().position(|e| *e == id) {
            Some(pos) => {
                self.entities.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains(&id)
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn picking_enabled(&self) -> bool {
        self.picking_enabled
    }

    pub fn set_picking_enabled(&mut self, enabled: bool) {
        self.picking_enabled = enabled;
    }

    pub fn style(&self) -> &CollectionStyle {
        &self.style
    }

    pub fn set_style(&mut self, style: CollectionStyle) {
        self.style = style;
    }

    pub(crate) fn into_entities(self) -> Vec<EntityId> {
        self.entities
    }
}
