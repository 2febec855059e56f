use std::collections::{BTreeMap, BTreeSet};

use foundation::Extent;

/// A terrain tile currently loaded by the planet, as seen by one layer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LoadedTile {
    pub key: u64,
    /// Lon/lat bounds.
    pub extent: Extent,
    /// Final level-of-detail tile for this frame.
    pub rendering: bool,
    pub material_ready: bool,
}

/// Per-layer tile imagery owned by the terrain subsystem.
pub trait TileMaterials {
    fn loaded_tiles(&self) -> Vec<LoadedTile>;

    /// Drop the tile's material; it is redrawn from scratch when next needed.
    fn clear_material(&mut self, key: u64);

    /// Redraw the material while keeping the current texture on screen.
    fn mark_for_redraw(&mut self, key: u64);
}

/// Invalidates materials overlapping removed or changed geometry.
///
/// Returns the number of tiles touched.
pub(crate) fn refresh_tiles(
    materials: &mut dyn TileMaterials,
    removed: &[Extent],
    updated: &[Extent],
) -> usize {
    let mut touched = 0;
    for extent in removed {
        for tile in materials.loaded_tiles() {
            if tile.material_ready && extent.overlaps(&tile.extent) {
                materials.clear_material(tile.key);
                touched += 1;
            }
        }
    }
    for extent in updated {
        for tile in materials.loaded_tiles() {
            if !tile.material_ready || !extent.overlaps(&tile.extent) {
                continue;
            }
            if tile.rendering {
                materials.mark_for_redraw(tile.key);
            } else {
                materials.clear_material(tile.key);
            }
            touched += 1;
        }
    }
    touched
}

/// In-memory tile materials for headless runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MaterialCache {
    tiles: BTreeMap<u64, LoadedTile>,
    redraw: BTreeSet<u64>,
}

impl MaterialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tile with a ready material.
    pub fn load(&mut self, key: u64, extent: Extent, rendering: bool) {
        self.tiles.insert(
            key,
            LoadedTile {
                key,
                extent,
                rendering,
                material_ready: true,
            },
        );
        self.redraw.remove(&key);
    }

    pub fn tile(&self, key: u64) -> Option<&LoadedTile> {
        self.tiles.get(&key)
    }

    pub fn needs_redraw(&self, key: u64) -> bool {
        self.redraw.contains(&key)
    }
}

impl TileMaterials for MaterialCache {
    fn loaded_tiles(&self) -> Vec<LoadedTile> {
        self.tiles.values().copied().collect()
    }

    fn clear_material(&mut self, key: u64) {
        if let Some(tile) = self.tiles.get_mut(&key) {
            tile.material_ready = false;
        }
        self.redraw.remove(&key);
    }

    fn mark_for_redraw(&mut self, key: u64) {
        if let Some(tile) = self.tiles.get_mut(&key) {
            tile.material_ready = false;
            self.redraw.insert(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MaterialCache, TileMaterials, refresh_tiles};
    use foundation::Extent;

    fn cache() -> MaterialCache {
        let mut c = MaterialCache::new();
        c.load(1, Extent::from_array([0.0, 0.0, 10.0, 10.0]), false);
        c.load(2, Extent::from_array([10.0, 0.0, 20.0, 10.0]), true);
        c.load(3, Extent::from_array([50.0, 50.0, 60.0, 60.0]), true);
        c
    }

    #[test]
    fn removed_extent_clears_overlapping_tiles() {
        let mut c = cache();
        let touched = refresh_tiles(&mut c, &[Extent::from_array([5.0, 5.0, 15.0, 6.0])], &[]);
        assert_eq!(touched, 2);
        assert!(!c.tile(1).unwrap().material_ready);
        assert!(!c.tile(2).unwrap().material_ready);
        assert!(!c.needs_redraw(2));
        assert!(c.tile(3).unwrap().material_ready);
    }

    #[test]
    fn updated_geometry_redraws_rendering_tiles_in_place() {
        let mut c = cache();
        let touched = refresh_tiles(&mut c, &[], &[Extent::from_array([9.0, 1.0, 11.0, 2.0])]);
        assert_eq!(touched, 2);
        assert!(!c.needs_redraw(1));
        assert!(c.needs_redraw(2));

        // Already invalidated tiles are left alone.
        assert_eq!(refresh_tiles(&mut c, &[], &[Extent::from_array([9.0, 1.0, 11.0, 2.0])]), 0);
        assert_eq!(c.loaded_tiles().len(), 3);
    }
}
