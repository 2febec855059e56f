//! Polygon fill triangulation in Mercator space.

use earcutr::earcut;
use foundation::math::mercator;
use tracing::warn;

use crate::geometry::Position;

/// Projected `[x, y]` in Mercator meters.
pub type Projected = [f64; 2];

/// Triangulated polygon interiors, vertex-local indexes.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Fill {
    /// Flat `x, y` pairs.
    pub vertices: Vec<f64>,
    pub indexes: Vec<u32>,
}

impl Fill {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Forward-projects a path. Non-finite coordinates collapse to the origin.
pub fn project_path(path: &[Position]) -> Vec<Projected> {
    path.iter()
        .map(|p| {
            let lon = if p[0].is_finite() { p[0] } else { 0.0 };
            let lat = if p[1].is_finite() { p[1] } else { 0.0 };
            [mercator::forward_lon(lon), mercator::forward_lat(lat)]
        })
        .collect()
}

/// Like [`project_path`], dropping a closing duplicate point.
///
/// Rings are stored open: earcut treats the repeated point as an extra
/// vertex, and closed outlines already wrap back to their first point.
pub fn project_ring(ring: &[Position]) -> Vec<Projected> {
    let mut out = project_path(ring);
    drop_closing_duplicate(&mut out);
    out
}

fn drop_closing_duplicate(points: &mut Vec<Projected>) {
    let closed = matches!(
        points.as_slice(),
        [first, .., last] if (first[0] - last[0]).abs() < 1e-9 && (first[1] - last[1]).abs() < 1e-9
    );
    if closed {
        points.pop();
    }
}

/// Ear-cuts one polygon (outer ring first, then holes) and appends the
/// result to `fill`, offsetting indexes by the vertices already there.
///
/// Rings with fewer than three points are ignored; a degenerate outer ring
/// contributes nothing. Triangulation failure leaves `fill` untouched.
pub fn triangulate_polygon(rings: &[Vec<Projected>], fill: &mut Fill) {
    let Some(outer) = rings.first() else {
        return;
    };
    if outer.len() < 3 {
        return;
    }

    let mut coords: Vec<f64> = Vec::new();
    let mut holes: Vec<usize> = Vec::new();
    for (i, ring) in rings.iter().enumerate() {
        if ring.len() < 3 {
            continue;
        }
        if i > 0 {
            holes.push(coords.len() / 2);
        }
        for p in ring {
            coords.extend_from_slice(p);
        }
    }

    let local = match earcut(&coords, &holes, 2) {
        Ok(ix) => ix,
        Err(err) => {
            warn!("polygon triangulation failed, fill skipped: {err:?}");
            return;
        }
    };

    let base = fill.vertex_count() as u32;
    fill.indexes.extend(local.into_iter().map(|i| i as u32 + base));
    fill.vertices.extend_from_slice(&coords);
}
