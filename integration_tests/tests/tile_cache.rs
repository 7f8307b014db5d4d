mod common;

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sar_core::{haversine_km, max_safe_radius_km, ElevationError, LatLon, TileId};

#[test]
fn evicted_tiles_come_back_from_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = common::SyntheticTileSource::new(31);
    let cache = common::tile_cache(dir.path(), 4, source.clone());

    let tiles: Vec<TileId> = (0..5).map(|i| TileId::new(45 + i, -120)).collect();
    for tile in &tiles {
        cache.get_tile(*tile)?;
    }
    assert_eq!(source.fetch_count(), 5);
    assert!(!cache.is_in_memory(tiles[0]));
    assert!(cache.has_disk_copy(tiles[0]));

    let again = cache.get_tile(tiles[0])?;
    assert_eq!(again.id(), tiles[0]);
    assert_eq!(source.fetch_count(), 5, "evicted tile was downloaded again");
    assert_eq!(source.fetches_of(tiles[0]), 1);

    let stats = cache.get_cache_stats();
    assert_eq!(stats.disk_hits, 1);
    assert_eq!(stats.downloads, 5);
    assert_eq!(stats.memory_cache_size, 4);
    assert_eq!(stats.memory_cache_max, 4);
    assert_eq!(stats.disk_tiles, 5);
    Ok(())
}

#[test]
fn memory_hits_do_not_touch_the_source() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = common::SyntheticTileSource::new(31);
    let cache = common::tile_cache(dir.path(), 4, source.clone());

    let first = cache.get_elevation_at_point(51.5, -115.5)?;
    let second = cache.get_elevation_at_point(51.25, -115.75)?;
    assert!(first > 1000.0 && second > 1000.0);
    assert_eq!(source.fetch_count(), 1);
    assert_eq!(cache.get_cache_stats().memory_hits, 1);
    Ok(())
}

#[test]
fn search_at_the_safe_radius_is_allowed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = common::SyntheticTileSource::new(31);
    let cache = common::tile_cache(dir.path(), 4, source.clone());
    let center = common::banff();

    let safe = cache.max_safe_radius_km(center.lat, center.lon);
    assert!(safe > 0.0);
    let tile = cache.get_elevation_for_search(center.lat, center.lon, safe)?;
    assert_eq!(tile.id(), TileId::new(51, -116));

    let err = cache
        .get_elevation_for_search(center.lat, center.lon, safe + 1.0)
        .unwrap_err();
    match err {
        ElevationError::MultiTileSpan {
            requested_km,
            max_safe_km,
            ..
        } => {
            assert_eq!(requested_km, safe + 1.0);
            assert_eq!(max_safe_km, safe);
        }
        other => panic!("expected MultiTileSpan, got {other:?}"),
    }
    assert_eq!(source.fetch_count(), 1);
    Ok(())
}

#[test]
fn safe_radius_stays_inside_the_tile() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for _ in 0..200 {
        let lat = rng.gen_range(-59.9..59.9);
        let lon = rng.gen_range(-179.9..179.9);
        let safe = max_safe_radius_km(lat, lon, 0.995);
        let tile = TileId::containing(lat, lon);
        let center = LatLon::new(lat, lon);

        for step in 0..=20 {
            let t = f64::from(step) / 20.0;
            let along_lon = tile.west() + t;
            let along_lat = tile.south() + t;
            let edges = [
                LatLon::new(tile.north(), along_lon),
                LatLon::new(tile.south(), along_lon),
                LatLon::new(along_lat, tile.west()),
                LatLon::new(along_lat, tile.east()),
            ];
            for edge in edges {
                let distance = haversine_km(center, edge);
                assert!(
                    safe < distance,
                    "safe radius {safe} reaches {edge:?} ({distance} km) from {center:?}"
                );
            }
        }
    }
}

#[test]
fn concurrent_misses_share_one_fetch() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = common::SyntheticTileSource::slow(31, Duration::from_millis(150));
    let cache = common::tile_cache(dir.path(), 4, source.clone());
    let tile = TileId::new(51, -116);

    let rasters: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|_| scope.spawn(|| cache.get_tile(tile)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("loader thread"))
            .collect()
    });

    assert_eq!(source.fetch_count(), 1);
    let first = rasters[0].as_ref().expect("tile");
    for raster in &rasters {
        assert!(Arc::ptr_eq(first, raster.as_ref().expect("tile")));
    }
    Ok(())
}

#[test]
fn unavailable_tiles_are_reported() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = common::tile_cache(dir.path(), 4, Arc::new(common::OfflineSource));

    let err = cache.get_tile(TileId::new(10, 10)).unwrap_err();
    assert!(matches!(err, ElevationError::TileUnavailable { .. }));
    let stats = cache.get_cache_stats();
    assert_eq!(stats.failed_downloads, 1);
    assert_eq!(stats.downloads, 0);
    assert!(!cache.has_disk_copy(TileId::new(10, 10)));
    Ok(())
}

#[test]
fn corrupt_disk_copy_is_replaced() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let tile = TileId::new(46, 7);
    std::fs::write(dir.path().join(tile.file_name()), [1u8, 2, 3])?;

    let source = common::SyntheticTileSource::new(31);
    let cache = common::tile_cache(dir.path(), 4, source.clone());
    let raster = cache.get_tile(tile)?;
    assert_eq!(raster.size(), 31);
    assert_eq!(source.fetch_count(), 1);
    assert_eq!(
        std::fs::metadata(dir.path().join(tile.file_name()))?.len(),
        (31 * 31 * 2) as u64
    );
    Ok(())
}
