//! Screen-space line expansion data.
//!
//! Every path vertex is written four times (orders `1, -1, 2, -2`) so the
//! vertex stage can push the copies apart by the line width. A path gets a
//! phantom point before its first vertex and after its last one; the shader
//! reads each index as `prev`, with `current` and `next` four and eight
//! vertices further along the same buffer.

use foundation::math::precision::split_f64;

use crate::symbology::Rgba;
use crate::triangulate::Projected;

const ORDERS: [f32; 4] = [1.0, -1.0, 2.0, -2.0];

/// Shared line arrays of a geometry handler.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LineBuffers {
    /// Two floats per vertex.
    pub vertices_high: Vec<f32>,
    pub vertices_low: Vec<f32>,
    /// One float per vertex.
    pub orders: Vec<f32>,
    pub indexes: Vec<u32>,
    /// Four floats per vertex.
    pub colors: Vec<f32>,
    pub picking_colors: Vec<f32>,
    /// One float per vertex.
    pub thickness: Vec<f32>,
    pub strokes: Vec<f32>,
    pub stroke_colors: Vec<f32>,
}

impl LineBuffers {
    pub fn vertex_count(&self) -> usize {
        self.vertices_high.len() / 2
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Per-vertex attributes shared by every point of one geometry's lines.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LineAttributes {
    pub color: Rgba,
    pub picking_color: Rgba,
    pub thickness: f32,
    pub stroke_color: Rgba,
    pub stroke_width: f32,
}

fn push_group(out: &mut LineBuffers, point: Projected, attrs: &LineAttributes) {
    let (hx, lx) = split_f64(point[0]);
    let (hy, ly) = split_f64(point[1]);
    for order in ORDERS {
        out.vertices_high.extend_from_slice(&[hx, hy]);
        out.vertices_low.extend_from_slice(&[lx, ly]);
        out.orders.push(order);
        out.thickness.push(attrs.thickness);
        out.strokes.push(attrs.stroke_width);
        out.colors.extend_from_slice(&attrs.color);
        out.stroke_colors.extend_from_slice(&attrs.stroke_color);
        out.picking_colors.extend_from_slice(&attrs.picking_color);
    }
}

fn extrapolate(from: Projected, away: Projected) -> Projected {
    [from[0] + from[0] - away[0], from[1] + from[1] - away[1]]
}

/// Appends the expansion of `paths` to `out`.
///
/// Indexes start at the current vertex count, so the call is valid however
/// the index array was reordered before. Empty paths are skipped; if every
/// path is empty nothing is written.
pub fn append_line_data(
    paths: &[Vec<Projected>],
    closed: bool,
    attrs: &LineAttributes,
    out: &mut LineBuffers,
) {
    let paths: Vec<&Vec<Projected>> = paths.iter().filter(|p| !p.is_empty()).collect();
    if paths.is_empty() {
        return;
    }

    let mut index = out.vertex_count() as u32;
    out.indexes.extend_from_slice(&[index, index]);

    for (j, path) in paths.iter().enumerate() {
        let start = index;
        let first = path[0];
        let last = path[path.len() - 1];

        let before = if closed {
            last
        } else {
            extrapolate(first, *path.get(1).unwrap_or(&first))
        };
        push_group(out, before, attrs);

        for &point in path.iter() {
            push_group(out, point, attrs);
            out.indexes.extend_from_slice(&[index, index + 1, index + 2, index + 3]);
            index += 4;
        }

        let after = if closed {
            out.indexes
                .extend_from_slice(&[start, start + 1, start + 1, start + 1]);
            first
        } else {
            out.indexes.extend_from_slice(&[index - 1; 4]);
            let prev = if path.len() > 1 { path[path.len() - 2] } else { last };
            extrapolate(last, prev)
        };
        push_group(out, after, attrs);

        if j + 1 < paths.len() {
            index += 8;
            out.indexes.extend_from_slice(&[index, index]);
        }
    }
}
