#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use sar_core::config::TileCacheConfig;
use sar_core::{
    ElevationSource, ElevationTileCache, ExperienceLevel, LatLon, RasterTile, Sex,
    SimulationRequest, SourceError, SubjectProfile, TileId, WeatherModifier,
};

static INIT: Once = Once::new();

/// Point the config loaders at the fixture copy for this test binary.
pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_path("test_simulation_config.json");
        debug_assert!(
            config_path.exists(),
            "missing test simulation config at {}",
            config_path.display()
        );
        std::env::set_var("SAR_SIMULATION_CONFIG_PATH", &config_path);
    });
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Last-known location used across scenario tests (Banff, Alberta).
pub fn banff() -> LatLon {
    LatLon::new(51.1784, -115.5708)
}

pub fn last_seen() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap()
}

pub fn request(
    last_known: LatLon,
    radius_km: f64,
    resolution_m: f64,
    horizon_hours: Option<f64>,
) -> SimulationRequest {
    SimulationRequest {
        last_known,
        time_last_seen: last_seen(),
        profile: SubjectProfile::new(20, Sex::Male, ExperienceLevel::Medium),
        radius_km,
        resolution_m,
        weather: WeatherModifier::default(),
        horizon_hours,
    }
}

pub fn random_profile(rng: &mut impl Rng) -> SubjectProfile {
    let sex = match rng.gen_range(0..3) {
        0 => Sex::Male,
        1 => Sex::Female,
        _ => Sex::Unknown,
    };
    let experience = match rng.gen_range(0..3) {
        0 => ExperienceLevel::Low,
        1 => ExperienceLevel::Medium,
        _ => ExperienceLevel::High,
    };
    SubjectProfile::new(rng.gen_range(3..=90), sex, experience)
}

/// Tile whose heights climb eastward from a base derived from the tile id.
pub fn ramp_tile(tile: TileId, size: usize) -> RasterTile {
    let base = 1000.0 + (tile.lat.rem_euclid(10) * 50) as f32;
    let samples = (0..size * size)
        .map(|idx| base + (idx % size) as f32 * 2.0)
        .collect();
    RasterTile::from_samples(tile, size, samples).expect("valid ramp raster")
}

pub fn write_tile(dir: &Path, tile: TileId, size: usize) -> anyhow::Result<PathBuf> {
    let path = dir.join(tile.file_name());
    std::fs::write(&path, ramp_tile(tile, size).to_hgt_bytes())?;
    Ok(path)
}

/// In-process elevation source that counts fetches and can be slowed down.
pub struct SyntheticTileSource {
    size: usize,
    delay: Option<Duration>,
    fetches: AtomicUsize,
    fetched: Mutex<Vec<TileId>>,
}

impl SyntheticTileSource {
    pub fn new(size: usize) -> Arc<Self> {
        Arc::new(Self {
            size,
            delay: None,
            fetches: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(size: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            size,
            delay: Some(delay),
            fetches: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fetches_of(&self, tile: TileId) -> usize {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .filter(|&&fetched| fetched == tile)
            .count()
    }
}

impl ElevationSource for SyntheticTileSource {
    fn fetch_tile(&self, tile: TileId) -> Result<Vec<u8>, SourceError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(tile);
        Ok(ramp_tile(tile, self.size).to_hgt_bytes())
    }

    fn describe(&self) -> String {
        "synthetic test tiles".to_string()
    }
}

/// Source that never has anything.
pub struct OfflineSource;

impl ElevationSource for OfflineSource {
    fn fetch_tile(&self, tile: TileId) -> Result<Vec<u8>, SourceError> {
        Err(SourceError::Remote {
            tile,
            message: "network unreachable".to_string(),
        })
    }
}

pub fn tile_cache(
    dir: &Path,
    capacity: usize,
    source: Arc<dyn ElevationSource>,
) -> Arc<ElevationTileCache> {
    Arc::new(ElevationTileCache::new(
        TileCacheConfig::default()
            .with_cache_dir(dir)
            .with_memory_capacity(capacity),
        source,
    ))
}
