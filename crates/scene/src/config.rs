use serde::{Deserialize, Serialize};

/// Which set of spatial trees a layer indexes its entities into.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobeKind {
    /// Spherical globe on Mercator tiles: one Mercator tree plus two polar caps.
    #[default]
    Earth,
    /// Flat equirectangular display: west and east hemisphere trees.
    Equi,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Entities a leaf holds before it splits into quadrants.
    pub node_capacity: usize,
    /// Defer materialization of inserted entities to the per-frame scheduler.
    pub async_ingest: bool,
    /// Leaves at this depth never split.
    pub max_zoom: u32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            node_capacity: 60,
            async_ingest: true,
            max_zoom: 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GlobeKind, TreeConfig};

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: TreeConfig = serde_json::from_str(r#"{"node_capacity":30}"#).unwrap();
        assert_eq!(cfg.node_capacity, 30);
        assert!(cfg.async_ingest);
        assert_eq!(cfg.max_zoom, 24);
    }

    #[test]
    fn globe_kind_is_snake_case() {
        let g: GlobeKind = serde_json::from_str(r#""equi""#).unwrap();
        assert_eq!(g, GlobeKind::Equi);
        assert_eq!(GlobeKind::default(), GlobeKind::Earth);
    }
}
