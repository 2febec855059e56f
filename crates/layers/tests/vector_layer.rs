use foundation::{Extent, LonLat};
use gpu::HeadlessBackend;
use layers::{
    Coordinates, Feature, Geometry, GeometryId, GeometryStyle, GpuArray, MaterialCache,
    VectorLayer, VectorLayerConfig,
};
use pretty_assertions::assert_eq;
use scene::{
    Camera, Entity, EntityId, EntityKind, EntityTree, TerrainNodeState, TreeConfig, TreeRegion,
    VisibleNodes,
};

fn billboards(count: u64) -> Vec<Feature> {
    (0..count)
        .map(|i| {
            let lon = -150.0 + (i % 30) as f64 * 10.0;
            let lat = -50.0 + (i / 30) as f64 * 10.0;
            Feature::point(Entity::at_lon_lat(
                EntityId(i),
                EntityKind::Billboard,
                LonLat::flat(lon, lat),
            ))
        })
        .collect()
}

fn parcel(id: u64, lon: f64, lat: f64) -> Feature {
    let ring = vec![
        [lon, lat],
        [lon + 2.0, lat],
        [lon + 2.0, lat + 2.0],
        [lon, lat + 2.0],
        [lon, lat],
    ];
    let hole = vec![
        [lon + 0.5, lat + 0.5],
        [lon + 1.5, lat + 0.5],
        [lon + 1.5, lat + 1.5],
        [lon + 0.5, lat + 0.5],
    ];
    Feature::with_geometry(
        Entity::at_lon_lat(EntityId(id), EntityKind::Shape, LonLat::default()),
        Geometry::new(Coordinates::Polygon(vec![ring, hole])).with_style(GeometryStyle {
            line_width: 2.0,
            ..GeometryStyle::default()
        }),
    )
}

fn everything_visible(tree: &EntityTree) -> VisibleNodes {
    let mut visible = VisibleNodes::new();
    for (_, node) in tree.nodes() {
        visible.insert(tree.region(), node.node_id, TerrainNodeState::Walkthrough);
    }
    visible
}

#[test]
fn bulk_ingest_materializes_over_frames() {
    let config = VectorLayerConfig {
        tree: TreeConfig {
            node_capacity: 20,
            ..TreeConfig::default()
        },
        ..VectorLayerConfig::default()
    };
    let mut layer = VectorLayer::new(7, config);
    layer.add_features(billboards(240)).unwrap();

    let tree = layer.strategy().tree(TreeRegion::Mercator).unwrap();
    let visible = everything_visible(tree);
    let camera = Camera::above(&foundation::math::Ellipsoid::WGS84, LonLat::new(0.0, 0.0, 2.0e7));

    let mut frames = 0;
    let mut materialized = 0;
    loop {
        let out = layer.frame(&visible, &camera);
        materialized += out.deferred.materialized_entities;
        frames += 1;
        assert!(out.deferred.materialized_nodes <= 1);
        if layer.strategy().is_idle() {
            break;
        }
        assert!(frames < 1000, "scheduler never drained");
    }
    assert_eq!(materialized, 240);

    let out = layer.frame(&visible, &camera);
    let batched: usize = out
        .collections
        .iter()
        .filter_map(|r| layer.strategy().collection(r))
        .map(|c| c.len())
        .sum();
    assert_eq!(batched, 240);
    assert!(out
        .collections
        .iter()
        .filter_map(|r| layer.strategy().collection(r))
        .all(|c| c.picking_enabled()));
}

#[test]
fn geometry_changes_reach_gpu_and_tiles() {
    let mut layer = VectorLayer::new(1, VectorLayerConfig::default());
    layer.add(parcel(100, 10.0, 10.0)).unwrap();
    layer.add(parcel(101, 20.0, 10.0)).unwrap();

    let mut backend = HeadlessBackend::uninitialized();
    let mut tiles = MaterialCache::new();
    tiles.load(1, Extent::from_array([9.0, 9.0, 13.0, 13.0]), false);
    tiles.load(2, Extent::from_array([19.0, 9.0, 23.0, 13.0]), true);

    // Nothing happens before the context exists; changes stay queued.
    assert!(layer.update(&mut backend, Some(&mut tiles)).rebuilt.is_empty());
    assert!(tiles.tile(1).unwrap().material_ready);

    backend.set_initialized(true);
    let summary = layer.update(&mut backend, Some(&mut tiles));
    assert_eq!(summary.rebuilt.len(), GpuArray::ALL.len());
    assert_eq!(summary.tiles_refreshed, 2);
    assert!(!tiles.tile(1).unwrap().material_ready);
    assert!(tiles.needs_redraw(2));

    let poly = layer.geometry_handler().poly().clone();
    assert_eq!(
        backend.find("poly_vertices_low").unwrap().as_f32(),
        poly.vertices_low
    );
    assert_eq!(backend.find("poly_indexes").unwrap().as_u32(), poly.indexes);

    // Removing the first parcel leaves the second exactly as if added alone.
    layer.remove_entity(EntityId(100)).unwrap();
    let mut alone = VectorLayer::new(2, VectorLayerConfig::default());
    alone.add(parcel(101, 20.0, 10.0)).unwrap();
    assert_eq!(
        layer.geometry_handler().line().indexes,
        alone.geometry_handler().line().indexes
    );
    assert_eq!(
        layer.geometry_handler().poly().vertices_high,
        alone.geometry_handler().poly().vertices_high
    );
    assert_eq!(
        layer.geometry_handler().slots(GeometryId(101)),
        alone.geometry_handler().slots(GeometryId(101))
    );

    tiles.load(1, Extent::from_array([9.0, 9.0, 13.0, 13.0]), false);
    let summary = layer.update(&mut backend, Some(&mut tiles));
    assert_eq!(summary.tiles_refreshed, 1);
    assert!(!tiles.tile(1).unwrap().material_ready);
    assert_eq!(
        backend.find("line_indexes").unwrap().as_u32(),
        layer.geometry_handler().line().indexes
    );
}

#[test]
fn clear_drops_entities_and_geometry() {
    let mut layer = VectorLayer::new(3, VectorLayerConfig::default());
    layer.add_features(billboards(50)).unwrap();
    layer.add(parcel(500, 0.0, 0.0)).unwrap();
    layer.clear();

    assert!(layer.is_empty());
    assert!(layer.strategy().is_empty());
    assert!(layer.strategy().is_idle());
    assert!(layer.geometry_handler().is_empty());
    assert_eq!(layer.entity_at_picking_color([0, 0, 1]), None);
}

#[test]
fn dispose_releases_gpu_buffers() {
    let mut layer = VectorLayer::new(4, VectorLayerConfig::default());
    layer.add(parcel(600, 10.0, 10.0)).unwrap();
    let mut backend = HeadlessBackend::new();
    layer.update(&mut backend, None);
    assert!(backend.live_count() > 0);

    let mut tiles = MaterialCache::new();
    tiles.load(1, Extent::from_array([9.0, 9.0, 13.0, 13.0]), false);
    assert_eq!(layer.dispose(&mut backend, Some(&mut tiles)), 1);
    assert_eq!(backend.live_count(), 0);
    assert!(layer.is_empty());
    assert!(layer.geometry_handler().is_empty());
}
