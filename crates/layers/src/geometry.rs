use foundation::{Extent, LonLat};
use serde::{Deserialize, Serialize};

use crate::symbology::GeometryStyle;

/// `[lon, lat]` in degrees.
pub type Position = [f64; 2];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u64);

/// Raw shape coordinates, GeoJSON-shaped (`{"type": ..., "coordinates": ...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Coordinates {
    Point(Position),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    /// Outer ring first, then holes.
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Coordinates {
    /// Every ring or path, flattened across parts.
    pub fn paths(&self) -> Vec<&[Position]> {
        match self {
            Coordinates::Point(p) => vec![std::slice::from_ref(p)],
            Coordinates::LineString(path) => vec![path.as_slice()],
            Coordinates::MultiLineString(paths) | Coordinates::Polygon(paths) => {
                paths.iter().map(Vec::as_slice).collect()
            }
            Coordinates::MultiPolygon(polygons) => polygons
                .iter()
                .flat_map(|rings| rings.iter().map(Vec::as_slice))
                .collect(),
        }
    }
}

/// A vector shape with its style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(flatten)]
    pub coordinates: Coordinates,
    #[serde(default)]
    pub style: GeometryStyle,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    /// Assigned by the owning layer.
    #[serde(skip)]
    pub picking_color: [f32; 3],
}

fn visible_by_default() -> bool {
    true
}

impl Geometry {
    pub fn new(coordinates: Coordinates) -> Self {
        Self {
            coordinates,
            style: GeometryStyle::default(),
            visible: true,
            picking_color: [0.0; 3],
        }
    }

    pub fn with_style(mut self, style: GeometryStyle) -> Self {
        self.style = style;
        self
    }

    /// Lon/lat bounds; `None` when there are no coordinates.
    pub fn extent(&self) -> Option<Extent> {
        let paths = self.coordinates.paths();
        Extent::from_points(
            paths
                .into_iter()
                .flatten()
                .map(|p| LonLat::flat(p[0], p[1])),
        )
    }
}
