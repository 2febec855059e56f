//! Shared polygon/line arrays for every geometry of a vector layer.
//!
//! Each geometry owns one contiguous span per array. Spans are kept in a side
//! table keyed by [`GeometryId`]; removing a geometry drains its spans and
//! shifts whatever sits after them, and index values pointing past the
//! drained vertices are lowered by the drained vertex count. Both adjustments
//! compare offsets rather than handler order, so they stay valid after
//! [`GeometryHandler::bring_to_front`] has reordered the index arrays.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use foundation::Extent;
use foundation::math::precision::split_into;
use gpu::{BufferBackend, BufferDescriptor, BufferHandle};
use tracing::debug;

use crate::geometry::{Coordinates, Geometry, GeometryId};
use crate::line::{LineAttributes, LineBuffers, append_line_data};
use crate::symbology::Rgba;
use crate::tiles::{TileMaterials, refresh_tiles};
use crate::triangulate::{Fill, project_path, project_ring, triangulate_polygon};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HandlerError {
    UnknownGeometry(GeometryId),
    AlreadyAdded(GeometryId),
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::UnknownGeometry(id) => write!(f, "geometry {} is not in the handler", id.0),
            HandlerError::AlreadyAdded(id) => write!(f, "geometry {} is already in the handler", id.0),
        }
    }
}

impl std::error::Error for HandlerError {}

/// GPU-resident arrays, rebuilt independently when dirty.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GpuArray {
    PolyVertices,
    PolyIndexes,
    PolyColors,
    PolyPickingColors,
    LineVertices,
    LineIndexes,
    LineOrders,
    LineColors,
    LinePickingColors,
    LineThickness,
    LineStrokes,
    LineStrokeColors,
}

impl GpuArray {
    pub const ALL: [GpuArray; 12] = [
        GpuArray::PolyVertices,
        GpuArray::PolyIndexes,
        GpuArray::PolyColors,
        GpuArray::PolyPickingColors,
        GpuArray::LineVertices,
        GpuArray::LineIndexes,
        GpuArray::LineOrders,
        GpuArray::LineColors,
        GpuArray::LinePickingColors,
        GpuArray::LineThickness,
        GpuArray::LineStrokes,
        GpuArray::LineStrokeColors,
    ];

    /// Buffer labels; vertex arrays upload a high and a low buffer.
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            GpuArray::PolyVertices => &["poly_vertices_high", "poly_vertices_low"],
            GpuArray::PolyIndexes => &["poly_indexes"],
            GpuArray::PolyColors => &["poly_colors"],
            GpuArray::PolyPickingColors => &["poly_picking_colors"],
            GpuArray::LineVertices => &["line_vertices_high", "line_vertices_low"],
            GpuArray::LineIndexes => &["line_indexes"],
            GpuArray::LineOrders => &["line_orders"],
            GpuArray::LineColors => &["line_colors"],
            GpuArray::LinePickingColors => &["line_picking_colors"],
            GpuArray::LineThickness => &["line_thickness"],
            GpuArray::LineStrokes => &["line_strokes"],
            GpuArray::LineStrokeColors => &["line_stroke_colors"],
        }
    }
}

/// A `[start, start + len)` range of one shared array.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    fn between(start: usize, end: usize) -> Self {
        debug_assert!(end >= start);
        Self {
            start,
            len: end - start,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    /// Same span measured in an array with `num / den` entries per entry of this one.
    fn scaled(&self, num: usize, den: usize) -> Span {
        Span {
            start: self.start * num / den,
            len: self.len * num / den,
        }
    }

    /// Moves this span down if it sat after `removed`.
    fn shift_past(&mut self, removed: Span) {
        if self.start > removed.start {
            debug_assert!(self.start >= removed.end());
            self.start -= removed.len;
        }
    }
}

/// Where one geometry lives in the shared arrays.
///
/// Vertex spans count floats (two per vertex); the color, order and width
/// spans are derived from them.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct GeometrySlots {
    pub poly_vertices: Span,
    pub poly_indexes: Span,
    pub line_vertices: Span,
    pub line_indexes: Span,
}

impl GeometrySlots {
    /// Four floats per polygon vertex.
    pub fn poly_colors(&self) -> Span {
        self.poly_vertices.scaled(2, 1)
    }

    /// Four floats per line vertex.
    pub fn line_colors(&self) -> Span {
        self.line_vertices.scaled(2, 1)
    }

    /// One float per line vertex.
    pub fn line_per_vertex(&self) -> Span {
        self.line_vertices.scaled(1, 2)
    }
}

/// Shared polygon arrays.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PolyBuffers {
    /// Two floats per vertex.
    pub vertices_high: Vec<f32>,
    pub vertices_low: Vec<f32>,
    /// Four floats per vertex.
    pub colors: Vec<f32>,
    pub picking_colors: Vec<f32>,
    pub indexes: Vec<u32>,
}

impl PolyBuffers {
    pub fn vertex_count(&self) -> usize {
        self.vertices_high.len() / 2
    }
}

#[derive(Debug, Clone)]
struct GeometryRecord {
    geometry: Geometry,
    slots: GeometrySlots,
    extent: Option<Extent>,
    // Untouched vertex values; the shared arrays hold them times 0 or 1.
    poly_high: Vec<f32>,
    poly_low: Vec<f32>,
    line_high: Vec<f32>,
    line_low: Vec<f32>,
}

/// Result of one [`GeometryHandler::update`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    pub rebuilt: Vec<GpuArray>,
    pub tiles_refreshed: usize,
}

#[derive(Debug, Default)]
pub struct GeometryHandler {
    records: BTreeMap<GeometryId, GeometryRecord>,
    order: Vec<GeometryId>,
    poly: PolyBuffers,
    line: LineBuffers,
    dirty: BTreeSet<GpuArray>,
    handles: BTreeMap<GpuArray, Vec<BufferHandle>>,
    updated: Vec<GeometryId>,
    removed_extents: Vec<Extent>,
}

fn drain_span<T>(values: &mut Vec<T>, span: Span) {
    debug_assert!(span.end() <= values.len());
    values.drain(span.range());
}

/// Lowers every index at or past the removed vertex range.
fn reindex(indexes: &mut [u32], removed_vertices: Span) {
    let end = removed_vertices.end() as u32;
    let by = removed_vertices.len as u32;
    for ix in indexes.iter_mut().filter(|ix| **ix >= end) {
        *ix -= by;
    }
}

fn write_color(values: &mut [f32], span: Span, color: Rgba) {
    for chunk in values[span.range()].chunks_exact_mut(4) {
        chunk.copy_from_slice(&color);
    }
}

fn write_scaled(target: &mut [f32], start: usize, source: &[f32], factor: f32) {
    for (dst, src) in target[start..start + source.len()].iter_mut().zip(source) {
        *dst = *src * factor;
    }
}

impl GeometryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: GeometryId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.records.get(&id).map(|r| &r.geometry)
    }

    pub fn slots(&self, id: GeometryId) -> Option<GeometrySlots> {
        self.records.get(&id).map(|r| r.slots)
    }

    /// Draw order, back to front.
    pub fn order(&self) -> &[GeometryId] {
        &self.order
    }

    pub fn poly(&self) -> &PolyBuffers {
        &self.poly
    }

    pub fn line(&self) -> &LineBuffers {
        &self.line
    }

    pub fn is_dirty(&self, array: GpuArray) -> bool {
        self.dirty.contains(&array)
    }

    pub fn buffer_handles(&self, array: GpuArray) -> &[BufferHandle] {
        self.handles.get(&array).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Triangulates and expands `geometry` into the shared arrays.
    pub fn add(&mut self, id: GeometryId, geometry: Geometry) -> Result<(), HandlerError> {
        if self.records.contains_key(&id) {
            return Err(HandlerError::AlreadyAdded(id));
        }

        let pc = geometry.picking_color;
        let attrs = LineAttributes {
            color: geometry.style.line_color,
            picking_color: [pc[0], pc[1], pc[2], 1.0],
            thickness: geometry.style.line_width,
            stroke_color: geometry.style.stroke_color,
            stroke_width: geometry.style.stroke_width,
        };

        let line_start = self.line.vertices_high.len();
        let line_index_start = self.line.indexes.len();
        let mut fill = Fill::default();

        match &geometry.coordinates {
            Coordinates::Polygon(rings) => {
                let projected: Vec<_> = rings.iter().map(|r| project_ring(r)).collect();
                triangulate_polygon(&projected, &mut fill);
                append_line_data(&projected, true, &attrs, &mut self.line);
            }
            Coordinates::MultiPolygon(polygons) => {
                for rings in polygons {
                    let projected: Vec<_> = rings.iter().map(|r| project_ring(r)).collect();
                    triangulate_polygon(&projected, &mut fill);
                    append_line_data(&projected, true, &attrs, &mut self.line);
                }
            }
            Coordinates::LineString(path) => {
                append_line_data(&[project_path(path)], false, &attrs, &mut self.line);
            }
            Coordinates::MultiLineString(paths) => {
                let projected: Vec<_> = paths.iter().map(|p| project_path(p)).collect();
                append_line_data(&projected, false, &attrs, &mut self.line);
            }
            // Points are drawn as entities, not vector geometry.
            Coordinates::Point(_) => {}
        }

        let poly_start = self.poly.vertices_high.len();
        let poly_index_start = self.poly.indexes.len();
        let base = self.poly.vertex_count() as u32;
        self.poly
            .indexes
            .extend(fill.indexes.iter().map(|&i| i + base));
        let mut poly_high = Vec::new();
        let mut poly_low = Vec::new();
        split_into(&fill.vertices, &mut poly_high, &mut poly_low);
        for _ in 0..fill.vertex_count() {
            self.poly.colors.extend_from_slice(&geometry.style.fill_color);
            self.poly.picking_colors.extend_from_slice(&attrs.picking_color);
        }
        self.poly.vertices_high.extend_from_slice(&poly_high);
        self.poly.vertices_low.extend_from_slice(&poly_low);

        let slots = GeometrySlots {
            poly_vertices: Span::between(poly_start, self.poly.vertices_high.len()),
            poly_indexes: Span::between(poly_index_start, self.poly.indexes.len()),
            line_vertices: Span::between(line_start, self.line.vertices_high.len()),
            line_indexes: Span::between(line_index_start, self.line.indexes.len()),
        };
        let line_high = self.line.vertices_high[slots.line_vertices.range()].to_vec();
        let line_low = self.line.vertices_low[slots.line_vertices.range()].to_vec();

        debug!(
            "geometry {} added: {} fill vertices, {} line vertices",
            id.0,
            slots.poly_vertices.len / 2,
            slots.line_vertices.len / 2
        );

        let visible = geometry.visible;
        let extent = geometry.extent();
        self.records.insert(
            id,
            GeometryRecord {
                geometry,
                slots,
                extent,
                poly_high,
                poly_low,
                line_high,
                line_low,
            },
        );
        self.order.push(id);
        if !visible {
            self.apply_visibility(id, false);
        }
        self.mark_all_dirty();
        self.mark_updated(id);
        Ok(())
    }

    /// Removes the geometry's spans from every array and returns it.
    pub fn remove(&mut self, id: GeometryId) -> Result<Geometry, HandlerError> {
        let record = self
            .records
            .remove(&id)
            .ok_or(HandlerError::UnknownGeometry(id))?;
        self.order.retain(|g| *g != id);
        let s = record.slots;

        drain_span(&mut self.poly.vertices_high, s.poly_vertices);
        drain_span(&mut self.poly.vertices_low, s.poly_vertices);
        drain_span(&mut self.poly.colors, s.poly_colors());
        drain_span(&mut self.poly.picking_colors, s.poly_colors());
        drain_span(&mut self.poly.indexes, s.poly_indexes);
        reindex(&mut self.poly.indexes, s.poly_vertices.scaled(1, 2));

        drain_span(&mut self.line.vertices_high, s.line_vertices);
        drain_span(&mut self.line.vertices_low, s.line_vertices);
        drain_span(&mut self.line.orders, s.line_per_vertex());
        drain_span(&mut self.line.thickness, s.line_per_vertex());
        drain_span(&mut self.line.strokes, s.line_per_vertex());
        drain_span(&mut self.line.colors, s.line_colors());
        drain_span(&mut self.line.picking_colors, s.line_colors());
        drain_span(&mut self.line.stroke_colors, s.line_colors());
        drain_span(&mut self.line.indexes, s.line_indexes);
        reindex(&mut self.line.indexes, s.line_vertices.scaled(1, 2));

        for other in self.records.values_mut() {
            let o = &mut other.slots;
            o.poly_vertices.shift_past(s.poly_vertices);
            o.poly_indexes.shift_past(s.poly_indexes);
            o.line_vertices.shift_past(s.line_vertices);
            o.line_indexes.shift_past(s.line_indexes);
        }

        debug!(
            "geometry {} removed, {} geometries remain",
            id.0,
            self.records.len()
        );

        if let Some(extent) = record.extent {
            self.removed_extents.push(extent);
        }
        self.updated.retain(|g| *g != id);
        self.mark_all_dirty();
        Ok(record.geometry)
    }

    /// Hides by zeroing the vertex spans in place; showing restores the
    /// stored values exactly.
    pub fn set_visibility(&mut self, id: GeometryId, visible: bool) -> Result<(), HandlerError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(HandlerError::UnknownGeometry(id))?;
        record.geometry.visible = visible;
        self.apply_visibility(id, visible);
        self.dirty.insert(GpuArray::PolyVertices);
        self.dirty.insert(GpuArray::LineVertices);
        self.mark_updated(id);
        Ok(())
    }

    fn apply_visibility(&mut self, id: GeometryId, visible: bool) {
        let Some(record) = self.records.get(&id) else {
            return;
        };
        let v = if visible { 1.0 } else { 0.0 };
        let s = record.slots;
        write_scaled(&mut self.poly.vertices_high, s.poly_vertices.start, &record.poly_high, v);
        write_scaled(&mut self.poly.vertices_low, s.poly_vertices.start, &record.poly_low, v);
        write_scaled(&mut self.line.vertices_high, s.line_vertices.start, &record.line_high, v);
        write_scaled(&mut self.line.vertices_low, s.line_vertices.start, &record.line_low, v);
    }

    pub fn set_fill_color(&mut self, id: GeometryId, color: Rgba) -> Result<(), HandlerError> {
        let record = self.record_mut(id)?;
        record.geometry.style.fill_color = color;
        let span = record.slots.poly_colors();
        write_color(&mut self.poly.colors, span, color);
        self.dirty.insert(GpuArray::PolyColors);
        self.mark_updated(id);
        Ok(())
    }

    pub fn set_line_color(&mut self, id: GeometryId, color: Rgba) -> Result<(), HandlerError> {
        let record = self.record_mut(id)?;
        record.geometry.style.line_color = color;
        let span = record.slots.line_colors();
        write_color(&mut self.line.colors, span, color);
        self.dirty.insert(GpuArray::LineColors);
        self.mark_updated(id);
        Ok(())
    }

    pub fn set_stroke_color(&mut self, id: GeometryId, color: Rgba) -> Result<(), HandlerError> {
        let record = self.record_mut(id)?;
        record.geometry.style.stroke_color = color;
        let span = record.slots.line_colors();
        write_color(&mut self.line.stroke_colors, span, color);
        self.dirty.insert(GpuArray::LineStrokeColors);
        self.mark_updated(id);
        Ok(())
    }

    pub fn set_line_width(&mut self, id: GeometryId, width: f32) -> Result<(), HandlerError> {
        let record = self.record_mut(id)?;
        record.geometry.style.line_width = width;
        let span = record.slots.line_per_vertex();
        self.line.thickness[span.range()].fill(width);
        self.dirty.insert(GpuArray::LineThickness);
        self.mark_updated(id);
        Ok(())
    }

    pub fn set_stroke_width(&mut self, id: GeometryId, width: f32) -> Result<(), HandlerError> {
        let record = self.record_mut(id)?;
        record.geometry.style.stroke_width = width;
        let span = record.slots.line_per_vertex();
        self.line.strokes[span.range()].fill(width);
        self.dirty.insert(GpuArray::LineStrokes);
        self.mark_updated(id);
        Ok(())
    }

    /// Moves the geometry's index spans to the end so it draws last.
    /// Vertex data stays where it is.
    pub fn bring_to_front(&mut self, id: GeometryId) -> Result<(), HandlerError> {
        let s = self.record_mut(id)?.slots;

        let poly: Vec<u32> = self.poly.indexes.drain(s.poly_indexes.range()).collect();
        let line: Vec<u32> = self.line.indexes.drain(s.line_indexes.range()).collect();
        for (other_id, other) in self.records.iter_mut() {
            if *other_id != id {
                other.slots.poly_indexes.shift_past(s.poly_indexes);
                other.slots.line_indexes.shift_past(s.line_indexes);
            }
        }

        let new_poly = Span {
            start: self.poly.indexes.len(),
            len: poly.len(),
        };
        let new_line = Span {
            start: self.line.indexes.len(),
            len: line.len(),
        };
        self.poly.indexes.extend(poly);
        self.line.indexes.extend(line);

        let record = self.record_mut(id)?;
        record.slots.poly_indexes = new_poly;
        record.slots.line_indexes = new_line;

        self.order.retain(|g| *g != id);
        self.order.push(id);
        debug!("geometry {} brought to front", id.0);

        self.dirty.insert(GpuArray::PolyIndexes);
        self.dirty.insert(GpuArray::LineIndexes);
        self.mark_updated(id);
        Ok(())
    }

    /// Drops every geometry; their extents are refreshed on the next update.
    pub fn clear(&mut self) {
        let extents = self.records.values().filter_map(|r| r.extent);
        self.removed_extents.extend(extents);
        self.records.clear();
        self.order.clear();
        self.updated.clear();
        self.poly = PolyBuffers::default();
        self.line.clear();
        self.mark_all_dirty();
    }

    /// Clears the handler and deletes every buffer it uploaded. Returns the
    /// number of tiles refreshed under the dropped geometry.
    pub fn dispose(
        &mut self,
        backend: &mut dyn BufferBackend,
        tiles: Option<&mut dyn TileMaterials>,
    ) -> usize {
        self.clear();
        let mut released = 0;
        for handle in std::mem::take(&mut self.handles).into_values().flatten() {
            backend.delete_buffer(handle);
            released += 1;
        }
        self.dirty.clear();

        let refreshed = match tiles {
            Some(materials) => refresh_tiles(materials, &self.removed_extents, &[]),
            None => 0,
        };
        self.removed_extents.clear();
        debug!("geometry handler disposed, {released} buffers released");
        refreshed
    }

    /// Re-uploads dirty arrays and invalidates tile materials under changed
    /// geometry. Does nothing until the backend is initialized.
    pub fn update(
        &mut self,
        backend: &mut dyn BufferBackend,
        tiles: Option<&mut dyn TileMaterials>,
    ) -> UpdateSummary {
        if !backend.is_initialized() || self.dirty.is_empty() {
            return UpdateSummary::default();
        }

        let rebuilt: Vec<GpuArray> = std::mem::take(&mut self.dirty).into_iter().collect();
        for &array in &rebuilt {
            self.rebuild(backend, array);
        }

        let tiles_refreshed = match tiles {
            Some(materials) => {
                let updated: Vec<Extent> = self
                    .updated
                    .iter()
                    .filter_map(|id| self.records.get(id).and_then(|r| r.extent))
                    .collect();
                refresh_tiles(materials, &self.removed_extents, &updated)
            }
            None => 0,
        };
        self.updated.clear();
        self.removed_extents.clear();

        UpdateSummary {
            rebuilt,
            tiles_refreshed,
        }
    }

    fn rebuild(&mut self, backend: &mut dyn BufferBackend, array: GpuArray) {
        for handle in self.handles.remove(&array).unwrap_or_default() {
            backend.delete_buffer(handle);
        }

        let labels = array.labels();
        let descriptors: Vec<BufferDescriptor<'_>> = match array {
            GpuArray::PolyVertices => vec![
                BufferDescriptor::vertex(labels[0], &self.poly.vertices_high, 2),
                BufferDescriptor::vertex(labels[1], &self.poly.vertices_low, 2),
            ],
            GpuArray::PolyIndexes => vec![BufferDescriptor::index(labels[0], &self.poly.indexes)],
            GpuArray::PolyColors => vec![BufferDescriptor::vertex(labels[0], &self.poly.colors, 4)],
            GpuArray::PolyPickingColors => {
                vec![BufferDescriptor::vertex(labels[0], &self.poly.picking_colors, 4)]
            }
            GpuArray::LineVertices => vec![
                BufferDescriptor::vertex(labels[0], &self.line.vertices_high, 2),
                BufferDescriptor::vertex(labels[1], &self.line.vertices_low, 2),
            ],
            GpuArray::LineIndexes => vec![BufferDescriptor::index(labels[0], &self.line.indexes)],
            GpuArray::LineOrders => vec![BufferDescriptor::vertex(labels[0], &self.line.orders, 1)],
            GpuArray::LineColors => vec![BufferDescriptor::vertex(labels[0], &self.line.colors, 4)],
            GpuArray::LinePickingColors => {
                vec![BufferDescriptor::vertex(labels[0], &self.line.picking_colors, 4)]
            }
            GpuArray::LineThickness => {
                vec![BufferDescriptor::vertex(labels[0], &self.line.thickness, 1)]
            }
            GpuArray::LineStrokes => vec![BufferDescriptor::vertex(labels[0], &self.line.strokes, 1)],
            GpuArray::LineStrokeColors => {
                vec![BufferDescriptor::vertex(labels[0], &self.line.stroke_colors, 4)]
            }
        };

        let created: Vec<BufferHandle> = descriptors
            .iter()
            .map(|desc| backend.create_buffer(desc))
            .collect();
        debug!(
            "rebuilt {array:?}: {} buffer(s), {} items",
            created.len(),
            descriptors.first().map(|d| d.num_items).unwrap_or(0)
        );
        self.handles.insert(array, created);
    }

    fn record_mut(&mut self, id: GeometryId) -> Result<&mut GeometryRecord, HandlerError> {
        self.records
            .get_mut(&id)
            .ok_or(HandlerError::UnknownGeometry(id))
    }

    fn mark_all_dirty(&mut self) {
        self.dirty.extend(GpuArray::ALL);
    }

    fn mark_updated(&mut self, id: GeometryId) {
        if !self.updated.contains(&id) {
            self.updated.push(id);
        }
    }
}
