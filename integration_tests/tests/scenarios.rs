mod common;

use std::sync::Arc;

use sar_core::{
    BehaviorConfig, DirectorySource, ElevationProvenance, ElevationSource, Phase, SearchService,
    SimulationConfig, TileId,
};

#[test]
fn banff_starts_with_all_mass_on_one_cell() {
    let service = SearchService::offline();
    let output = service
        .simulate(&common::request(common::banff(), 5.0, 100.0, Some(1.0)), None)
        .expect("simulation");

    let start = output.snapshot(0).expect("tick 0");
    assert_eq!(start.grid.nonzero_count(), 1);
    assert_eq!(start.max, 1.0);
    let (row, col) = output.geometry.center_cell();
    assert_eq!(start.grid.get(row, col), 1.0);
    assert_eq!(output.geometry.width, 101);
}

#[test]
fn banff_has_spread_after_one_hour() {
    let service = SearchService::offline();
    let output = service
        .simulate(&common::request(common::banff(), 5.0, 100.0, Some(1.0)), None)
        .expect("simulation");

    let hour = output.snapshot(4).expect("tick 4");
    assert!(hour.max > 0.0 && hour.max < 1.0, "max was {}", hour.max);
    assert!(hour.grid.nonzero_count() > 1);
    assert!((hour.grid.total() - 1.0).abs() < 1e-9);
    assert!((hour.elapsed_hours - 1.0).abs() < 1e-12);
    assert_eq!(hour.phase, Phase::Panic);
}

#[test]
fn default_horizon_yields_forty_nine_grids() {
    let service = SearchService::offline();
    let output = service
        .simulate(&common::request(common::banff(), 2.0, 200.0, None), None)
        .expect("simulation");
    assert_eq!(output.snapshots.len(), 49);

    let report = output.to_report(service.config().export_epsilon);
    assert_eq!(report.frames.len(), 49);
    assert_eq!(report.frames.keys().copied().max(), Some(48));
    assert_eq!(
        report.last_frame().map(|frame| frame.timestamp.as_str()),
        Some("2024-07-01T20:00:00+00:00")
    );
    assert_eq!(report.terrain.elevation, "synthetic");
}

#[test]
fn raster_tiles_feed_the_terrain_model() -> anyhow::Result<()> {
    let mirror = tempfile::tempdir()?;
    let cache_dir = tempfile::tempdir()?;
    let tile = TileId::containing(common::banff().lat, common::banff().lon);
    common::write_tile(mirror.path(), tile, 121)?;

    let mut config = SimulationConfig::default();
    config.tiles = config.tiles.with_cache_dir(cache_dir.path());
    let service = SearchService::with_sources(
        Arc::new(config),
        BehaviorConfig::builtin(),
        Some(Arc::new(DirectorySource::new(mirror.path())) as Arc<dyn ElevationSource>),
        None,
    );

    let output = service.simulate(&common::request(common::banff(), 2.0, 100.0, Some(0.5)), None)?;
    assert!(matches!(
        output.diagnostics.elevation,
        ElevationProvenance::Raster { tile: t, .. } if t == tile
    ));
    assert!(cache_dir.path().join(tile.file_name()).exists());

    let stats = service.tile_cache().expect("tile cache").get_cache_stats();
    assert_eq!(stats.downloads, 1);
    assert_eq!(stats.memory_cache_size, 1);

    let report = output.to_report(1e-4);
    assert_eq!(report.terrain.elevation_tile.as_deref(), Some("N51W116"));
    Ok(())
}

#[test]
fn report_round_trips_through_json() -> anyhow::Result<()> {
    let service = SearchService::offline();
    let output = service.simulate(&common::request(common::banff(), 1.0, 100.0, Some(0.5)), None)?;
    let report = output.to_report(1e-4);
    let json = sar_schema::report_to_json(&report)?;
    let parsed = sar_schema::report_from_json(&json)?;
    assert_eq!(parsed, report);
    Ok(())
}
