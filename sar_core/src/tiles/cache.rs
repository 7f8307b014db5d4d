use std::{
    collections::{HashMap, HashSet},
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{max_safe_radius_km, ElevationError, ElevationSource, RasterTile, TileId};
use crate::config::TileCacheConfig;

type TileResult = Result<Arc<RasterTile>, ElevationError>;

/// Two-level tile cache: a bounded in-memory LRU in front of an unbounded disk
/// directory, in front of an [`ElevationSource`].
///
/// Concurrent misses on the same tile share one load; the second caller blocks on
/// the first caller's result instead of fetching again.
pub struct ElevationTileCache {
    config: TileCacheConfig,
    source: Arc<dyn ElevationSource>,
    memory: Mutex<LruCache<TileId, Arc<RasterTile>>>,
    in_flight: Mutex<HashMap<TileId, Arc<OnceLock<TileResult>>>>,
    downloaded: Mutex<HashSet<PathBuf>>,
    counters: TileCounters,
}

#[derive(Default)]
struct TileCounters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    downloads: AtomicU64,
    failed_downloads: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileCacheStats {
    pub memory_cache_size: usize,
    pub memory_cache_max: usize,
    pub disk_tiles: usize,
    pub disk_bytes: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub downloads: u64,
    pub failed_downloads: u64,
}

impl ElevationTileCache {
    pub fn new(config: TileCacheConfig, source: Arc<dyn ElevationSource>) -> Self {
        let capacity =
            NonZeroUsize::new(config.memory_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        info!(
            target: "sar::tiles",
            capacity = capacity.get(),
            cache_dir = %config.cache_dir.display(),
            source = %source.describe(),
            "tile_cache.created"
        );
        Self {
            config,
            source,
            memory: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
            downloaded: Mutex::new(HashSet::new()),
            counters: TileCounters::default(),
        }
    }

    pub fn config(&self) -> &TileCacheConfig {
        &self.config
    }

    pub fn max_safe_radius_km(&self, lat: f64, lon: f64) -> f64 {
        max_safe_radius_km(lat, lon, self.config.safe_radius_margin)
    }

    /// Elevation in meters at a point, bilinearly sampled from its tile.
    pub fn get_elevation_at_point(&self, lat: f64, lon: f64) -> Result<f64, ElevationError> {
        let tile = TileId::containing(lat, lon);
        let raster = self.get_tile(tile)?;
        raster
            .sample_bilinear(lat, lon)
            .ok_or_else(|| ElevationError::TileUnavailable {
                tile,
                reason: format!("point ({lat}, {lon}) outside raster"),
            })
    }

    /// The single tile covering a search circle. Fails before any loading when the
    /// circle would cross a tile edge.
    pub fn get_elevation_for_search(
        &self,
        center_lat: f64,
        center_lon: f64,
        radius_km: f64,
    ) -> Result<Arc<RasterTile>, ElevationError> {
        let tile = TileId::containing(center_lat, center_lon);
        let max_safe_km = self.max_safe_radius_km(center_lat, center_lon);
        if !(radius_km <= max_safe_km) {
            warn!(
                target: "sar::tiles",
                %tile,
                requested_km = radius_km,
                max_safe_km,
                "tile_cache.multi_tile_span"
            );
            return Err(ElevationError::MultiTileSpan {
                tile,
                requested_km: radius_km,
                max_safe_km,
            });
        }
        self.get_tile(tile)
    }

    pub fn get_tile(&self, tile: TileId) -> TileResult {
        if let Some(raster) = self.memory.lock().get(&tile).cloned() {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(raster);
        }

        let slot = Arc::clone(
            self.in_flight
                .lock()
                .entry(tile)
                .or_insert_with(|| Arc::new(OnceLock::new())),
        );
        let result = slot.get_or_init(|| self.load_tile(tile)).clone();

        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(&tile)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
        {
            in_flight.remove(&tile);
        }
        result
    }

    pub fn is_in_memory(&self, tile: TileId) -> bool {
        self.memory.lock().contains(&tile)
    }

    pub fn has_disk_copy(&self, tile: TileId) -> bool {
        self.tile_path(tile).is_file()
    }

    pub fn get_cache_stats(&self) -> TileCacheStats {
        let (memory_cache_size, memory_cache_max) = {
            let memory = self.memory.lock();
            (memory.len(), memory.cap().get())
        };
        let (disk_tiles, disk_bytes) = disk_usage(&self.config.cache_dir);
        TileCacheStats {
            memory_cache_size,
            memory_cache_max,
            disk_tiles,
            disk_bytes,
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.counters.disk_hits.load(Ordering::Relaxed),
            downloads: self.counters.downloads.load(Ordering::Relaxed),
            failed_downloads: self.counters.failed_downloads.load(Ordering::Relaxed),
        }
    }

    fn tile_path(&self, tile: TileId) -> PathBuf {
        self.config.cache_dir.join(tile.file_name())
    }

    fn load_tile(&self, tile: TileId) -> TileResult {
        let path = self.tile_path(tile);

        if path.is_file() {
            match fs::read(&path).map_err(|err| err.to_string()).and_then(|bytes| {
                RasterTile::from_hgt_bytes(tile, &bytes).map_err(|err| err.to_string())
            }) {
                Ok(raster) => {
                    self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(target: "sar::tiles", %tile, "tile_cache.disk_hit");
                    return Ok(self.promote(tile, raster));
                }
                Err(reason) => {
                    warn!(
                        target: "sar::tiles",
                        %tile,
                        path = %path.display(),
                        %reason,
                        "tile_cache.disk_copy_rejected"
                    );
                    let _ = fs::remove_file(&path);
                }
            }
        }

        let bytes = match self.source.fetch_tile(tile) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.counters.failed_downloads.fetch_add(1, Ordering::Relaxed);
                warn!(target: "sar::tiles", %tile, error = %err, "tile_cache.download_failed");
                return Err(ElevationError::TileUnavailable {
                    tile,
                    reason: err.to_string(),
                });
            }
        };
        self.counters.downloads.fetch_add(1, Ordering::Relaxed);

        let raster = RasterTile::from_hgt_bytes(tile, &bytes)?;
        info!(
            target: "sar::tiles",
            %tile,
            bytes = bytes.len(),
            voids = raster.void_count(),
            "tile_cache.download"
        );
        self.persist(&path, &bytes);
        Ok(self.promote(tile, raster))
    }

    fn promote(&self, tile: TileId, raster: RasterTile) -> Arc<RasterTile> {
        let raster = Arc::new(raster);
        if let Some((evicted, _)) = self.memory.lock().push(tile, Arc::clone(&raster)) {
            if evicted != tile {
                debug!(target: "sar::tiles", tile = %evicted, "tile_cache.evict");
            }
        }
        raster
    }

    fn persist(&self, path: &Path, bytes: &[u8]) {
        let written = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::write(path, bytes));
        match written {
            Ok(()) => {
                self.downloaded.lock().insert(path.to_path_buf());
            }
            Err(err) => {
                // the tile stays usable from memory; only the disk copy is missing
                warn!(
                    target: "sar::tiles",
                    path = %path.display(),
                    error = %err,
                    "tile_cache.persist_failed"
                );
            }
        }
    }
}

impl Drop for ElevationTileCache {
    fn drop(&mut self) {
        if !self.config.cleanup_on_shutdown {
            return;
        }
        let downloaded = std::mem::take(self.downloaded.get_mut());
        let mut removed = 0usize;
        for path in downloaded {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        info!(target: "sar::tiles", removed, "tile_cache.cleanup");
    }
}

fn disk_usage(dir: &Path) -> (usize, u64) {
    let Ok(entries) = fs::read_dir(dir) else {
        return (0, 0);
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "hgt"))
        .filter_map(|entry| entry.metadata().ok())
        .fold((0, 0), |(count, bytes), meta| (count + 1, bytes + meta.len()))
}
