use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::{
    config::TerrainCacheConfig,
    geometry::LatLon,
    terrain::{TerrainBuilder, TerrainInfluenceModel},
    tiles::ElevationError,
};

/// Cache key: center snapped to a fixed number of decimals, radius in meters,
/// resolution in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerrainKey {
    lat_units: i64,
    lon_units: i64,
    precision: u32,
    radius_m: i64,
    resolution_mm: i64,
}

impl TerrainKey {
    pub fn new(center: LatLon, radius_km: f64, resolution_m: f64, precision: u32) -> Self {
        let scale = 10f64.powi(precision as i32);
        Self {
            lat_units: (center.lat * scale).round() as i64,
            lon_units: (center.lon * scale).round() as i64,
            precision,
            radius_m: (radius_km * 1000.0).round() as i64,
            resolution_mm: (resolution_m * 1000.0).round() as i64,
        }
    }

    /// The snapped center the model is built around.
    pub fn center(&self) -> LatLon {
        let scale = 10f64.powi(self.precision as i32);
        LatLon::new(self.lat_units as f64 / scale, self.lon_units as f64 / scale)
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_m as f64 / 1000.0
    }

    pub fn resolution_m(&self) -> f64 {
        self.resolution_mm as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TerrainCacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// LRU of built terrain models. Hits hand out the same `Arc`; models are never
/// mutated after insertion so readers need no lock.
///
/// Two concurrent misses on one key may both build; the first insert wins and
/// the other caller receives the winner's model.
pub struct TerrainModelCache {
    builder: TerrainBuilder,
    precision: u32,
    models: Mutex<LruCache<TerrainKey, Arc<TerrainInfluenceModel>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TerrainModelCache {
    pub fn new(builder: TerrainBuilder, config: &TerrainCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            builder,
            precision: config.center_precision_decimals,
            models: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn builder(&self) -> &TerrainBuilder {
        &self.builder
    }

    pub fn key_for(&self, center: LatLon, radius_km: f64, resolution_m: f64) -> TerrainKey {
        TerrainKey::new(center, radius_km, resolution_m, self.precision)
    }

    pub fn get_or_build(
        &self,
        center: LatLon,
        radius_km: f64,
        resolution_m: f64,
    ) -> Result<Arc<TerrainInfluenceModel>, ElevationError> {
        // the single-tile limit applies to the requested point, not the rounded key
        self.builder.check_radius(center, radius_km)?;
        let key = self.key_for(center, radius_km, resolution_m);
        if let Some(model) = self.models.lock().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(target: "sar::terrain", ?key, "terrain_cache.hit");
            return Ok(model);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(target: "sar::terrain", ?key, "terrain_cache.miss");
        let built = Arc::new(
            self.builder
                .build_around(center, key.center(), radius_km, resolution_m)?,
        );

        let mut models = self.models.lock();
        if let Some(existing) = models.get(&key).cloned() {
            return Ok(existing);
        }
        if let Some((evicted, _)) = models.push(key, Arc::clone(&built)) {
            if evicted != key {
                debug!(target: "sar::terrain", key = ?evicted, "terrain_cache.evicted");
            }
        }
        Ok(built)
    }

    pub fn contains(&self, center: LatLon, radius_km: f64, resolution_m: f64) -> bool {
        self.models
            .lock()
            .contains(&self.key_for(center, radius_km, resolution_m))
    }

    pub fn len(&self) -> usize {
        self.models.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> TerrainCacheStats {
        let models = self.models.lock();
        TerrainCacheStats {
            entries: models.len(),
            capacity: models.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;

    fn cache(capacity: usize) -> TerrainModelCache {
        TerrainModelCache::new(
            TerrainBuilder::new(SimulationConfig::builtin()),
            &TerrainCacheConfig {
                capacity,
                center_precision_decimals: 4,
            },
        )
    }

    #[test]
    fn nearby_centers_share_a_key() {
        let a = TerrainKey::new(LatLon::new(51.17841, -115.57079), 5.0, 100.0, 4);
        let b = TerrainKey::new(LatLon::new(51.17839, -115.57081), 5.0, 100.0, 4);
        let c = TerrainKey::new(LatLon::new(51.1790, -115.5708), 5.0, 100.0, 4);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, TerrainKey::new(LatLon::new(51.1784, -115.5708), 5.0, 50.0, 4));
        assert!((a.center().lat - 51.1784).abs() < 1e-9);
    }

    #[test]
    fn hit_returns_same_arc() {
        let cache = cache(4);
        let center = LatLon::new(51.1784, -115.5708);
        let first = cache.get_or_build(center, 1.0, 100.0).expect("build");
        let second = cache.get_or_build(center, 1.0, 100.0).expect("hit");
        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn least_recent_model_is_evicted() {
        let cache = cache(2);
        let a = LatLon::new(46.1, 7.1);
        let b = LatLon::new(46.2, 7.2);
        let c = LatLon::new(46.3, 7.3);
        cache.get_or_build(a, 0.5, 100.0).unwrap();
        cache.get_or_build(b, 0.5, 100.0).unwrap();
        cache.get_or_build(a, 0.5, 100.0).unwrap();
        cache.get_or_build(c, 0.5, 100.0).unwrap();
        assert!(cache.contains(a, 0.5, 100.0));
        assert!(!cache.contains(b, 0.5, 100.0));
        assert!(cache.contains(c, 0.5, 100.0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn safe_radius_is_judged_at_the_requested_point() {
        let cache = cache(4);
        let margin = cache.builder().config().tiles.safe_radius_margin;
        // rounding to 4 decimals moves this point toward its nearest (south) edge
        let lkl = LatLon::new(51.17844, -115.5708);
        let safe = crate::tiles::max_safe_radius_km(lkl.lat, lkl.lon, margin);
        assert!(safe > crate::tiles::max_safe_radius_km(51.1784, -115.5708, margin));

        let model = cache.get_or_build(lkl, safe, 2000.0).expect("exact safe radius");
        assert!((model.geometry().origin.lat - 51.1784).abs() < 1e-9);
        let err = cache
            .get_or_build(lkl, safe + 0.01, 2000.0)
            .expect_err("past the tile edge");
        assert!(matches!(err, ElevationError::MultiTileSpan { .. }));
    }

    #[test]
    fn span_errors_are_not_cached() {
        let cache = cache(4);
        let err = cache
            .get_or_build(LatLon::new(51.5, -115.5), 60.0, 500.0)
            .expect_err("too wide");
        assert!(matches!(err, ElevationError::MultiTileSpan { .. }));
        assert!(cache.is_empty());
    }
}
