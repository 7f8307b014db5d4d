use std::sync::Arc;

use rayon::prelude::*;

use super::{
    DataLayers, ElevationProvenance, FeatureSource, TerrainDiagnostics, TerrainInfluenceModel,
};
use crate::{
    config::SimulationConfig,
    geometry::{GridGeometry, LatLon},
    heightfield::SyntheticElevation,
    tiles::{self, ElevationError, ElevationTileCache, RasterTile, TileId},
};

/// Assembles [`TerrainInfluenceModel`]s from the injected elevation and feature
/// collaborators. Either collaborator may be absent.
#[derive(Clone)]
pub struct TerrainBuilder {
    config: Arc<SimulationConfig>,
    tiles: Option<Arc<ElevationTileCache>>,
    features: Option<Arc<dyn FeatureSource>>,
}

impl TerrainBuilder {
    pub fn new(config: Arc<SimulationConfig>) -> Self {
        Self {
            config,
            tiles: None,
            features: None,
        }
    }

    pub fn with_tiles(mut self, tiles: Arc<ElevationTileCache>) -> Self {
        self.tiles = Some(tiles);
        self
    }

    pub fn with_features(mut self, features: Arc<dyn FeatureSource>) -> Self {
        self.features = Some(features);
        self
    }

    pub fn tiles(&self) -> Option<&Arc<ElevationTileCache>> {
        self.tiles.as_ref()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Build the model for a search area. Only a radius that would span tiles is
    /// an error; every other missing input degrades to a neutral layer.
    pub fn build(
        &self,
        center: LatLon,
        radius_km: f64,
        resolution_m: f64,
    ) -> Result<TerrainInfluenceModel, ElevationError> {
        self.build_around(center, center, radius_km, resolution_m)
    }

    /// Fails with `MultiTileSpan` when a circle of `radius_km` around `anchor`
    /// leaves the anchor's tile.
    pub fn check_radius(&self, anchor: LatLon, radius_km: f64) -> Result<(), ElevationError> {
        let max_safe_km =
            tiles::max_safe_radius_km(anchor.lat, anchor.lon, self.config.tiles.safe_radius_margin);
        if radius_km <= max_safe_km {
            return Ok(());
        }
        Err(ElevationError::MultiTileSpan {
            tile: TileId::containing(anchor.lat, anchor.lon),
            requested_km: radius_km,
            max_safe_km,
        })
    }

    /// Like [`build`](Self::build), but the tile and the single-tile check follow
    /// `anchor` (the requested location) while the grid is laid out around
    /// `center`, which may be a rounded copy of it. Cells that land past the
    /// tile edge are sampled at the edge.
    pub fn build_around(
        &self,
        anchor: LatLon,
        center: LatLon,
        radius_km: f64,
        resolution_m: f64,
    ) -> Result<TerrainInfluenceModel, ElevationError> {
        self.check_radius(anchor, radius_km)?;

        let geometry = GridGeometry::for_search(center, radius_km, resolution_m);
        let mut degraded = Vec::new();

        let (elevation, provenance) = match &self.tiles {
            Some(cache) => match cache.get_elevation_for_search(anchor.lat, anchor.lon, radius_km) {
                Ok(raster) => (
                    sample_raster(&geometry, &raster),
                    ElevationProvenance::Raster {
                        tile: raster.id(),
                        void_samples: raster.void_count(),
                    },
                ),
                Err(err @ ElevationError::MultiTileSpan { .. }) => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        target: "sar::terrain",
                        error = %err,
                        "terrain.degraded=synthetic_elevation"
                    );
                    degraded.push(format!("elevation: {err}"));
                    (self.synthetic(&geometry), ElevationProvenance::Synthetic)
                }
            },
            None => {
                degraded.push("elevation: no tile cache configured".to_string());
                (self.synthetic(&geometry), ElevationProvenance::Synthetic)
            }
        };

        let mut layers = DataLayers::empty();
        layers.set(
            DataLayers::ELEVATION,
            matches!(provenance, ElevationProvenance::Raster { .. }),
        );
        let diagnostics = TerrainDiagnostics {
            elevation: provenance,
            layers,
            degraded: Vec::new(),
        };
        let mut model = TerrainInfluenceModel::from_elevation(geometry, elevation, diagnostics);

        let features = self
            .features
            .as_ref()
            .and_then(|source| source.features(&model.geometry().bounds()));
        match features {
            Some(features) => model = model.with_features(&features, &self.config.terrain),
            None => {
                tracing::debug!(target: "sar::terrain", "terrain.degraded=neutral_attraction");
                degraded.push("features: none available, attraction neutral".to_string());
            }
        }
        for reason in degraded {
            model.note_degraded(reason);
        }

        let geometry = model.geometry();
        tracing::info!(
            target: "sar::terrain",
            lat = center.lat,
            lon = center.lon,
            radius_km,
            resolution_m,
            width = geometry.width,
            height = geometry.height,
            elevation = model.diagnostics().elevation.as_str(),
            layers = ?model.diagnostics().layers.names(),
            "terrain.built"
        );
        Ok(model)
    }

    fn synthetic(&self, geometry: &GridGeometry) -> Vec<f32> {
        let field = SyntheticElevation::for_area(geometry.origin, &self.config.terrain);
        sample_cells(geometry, |point| field.sample(point))
    }
}

impl std::fmt::Debug for TerrainBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainBuilder")
            .field("tiles", &self.tiles.is_some())
            .field("features", &self.features.is_some())
            .finish()
    }
}

/// Bilinear sample at each cell center. Corners of the square grid can poke past
/// the radius circle; those are clamped onto the tile edge.
fn sample_raster(geometry: &GridGeometry, raster: &RasterTile) -> Vec<f32> {
    let tile = raster.id();
    sample_cells(geometry, |point| {
        let lat = point.lat.clamp(tile.south(), tile.north());
        let lon = point.lon.clamp(tile.west(), tile.east());
        raster.sample_bilinear(lat, lon).unwrap_or_default()
    })
}

fn sample_cells(geometry: &GridGeometry, sample: impl Fn(LatLon) -> f64 + Sync) -> Vec<f32> {
    let mut out = vec![0.0f32; geometry.len()];
    out.par_chunks_mut(geometry.width.max(1))
        .enumerate()
        .for_each(|(row, cells)| {
            for (col, value) in cells.iter_mut().enumerate() {
                *value = sample(geometry.cell_center(row, col)) as f32;
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use geo::line_string;

    use super::*;
    use crate::{
        config::TileCacheConfig,
        terrain::{StaticFeatures, TerrainFeatures},
        tiles::{ElevationSource, SourceError},
    };

    struct RampSource {
        fetches: AtomicUsize,
    }

    impl ElevationSource for RampSource {
        fn fetch_tile(&self, tile: TileId) -> Result<Vec<u8>, SourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let size = 121usize;
            let samples: Vec<f32> = (0..size * size).map(|idx| (idx % size) as f32 * 5.0).collect();
            let raster = RasterTile::from_samples(tile, size, samples).expect("raster");
            Ok(raster.to_hgt_bytes())
        }
    }

    struct Offline;

    impl ElevationSource for Offline {
        fn fetch_tile(&self, tile: TileId) -> Result<Vec<u8>, SourceError> {
            Err(SourceError::Remote {
                tile,
                message: "offline".to_string(),
            })
        }
    }

    fn cache(source: Arc<dyn ElevationSource>, dir: &std::path::Path) -> Arc<ElevationTileCache> {
        Arc::new(ElevationTileCache::new(
            TileCacheConfig::default().with_cache_dir(dir),
            source,
        ))
    }

    #[test]
    fn raster_elevation_is_sampled() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(RampSource {
            fetches: AtomicUsize::new(0),
        });
        let builder = TerrainBuilder::new(SimulationConfig::builtin())
            .with_tiles(cache(source.clone(), dir.path()));
        let model = builder
            .build(LatLon::new(51.5, -115.5), 2.0, 200.0)
            .expect("build");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert!(matches!(model.diagnostics().elevation, ElevationProvenance::Raster { .. }));
        assert!(model.diagnostics().layers.contains(DataLayers::ELEVATION));
        let (row, col) = model.geometry().center_cell();
        assert!(model.get_elevation(row, col + 1) > model.get_elevation(row, col - 1));
    }

    #[test]
    fn unavailable_tile_falls_back_to_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let builder = TerrainBuilder::new(SimulationConfig::builtin())
            .with_tiles(cache(Arc::new(Offline), dir.path()));
        let model = builder
            .build(LatLon::new(51.1784, -115.5708), 1.0, 100.0)
            .expect("degraded build still succeeds");
        let diagnostics = model.diagnostics();
        assert_eq!(diagnostics.elevation, ElevationProvenance::Synthetic);
        assert!(diagnostics.is_degraded());
        assert!(diagnostics.degraded.iter().any(|r| r.starts_with("elevation:")));
        assert!(model.get_elevation(0, 0) > 0.0);
    }

    #[test]
    fn oversized_radius_is_rejected_without_tiles() {
        let builder = TerrainBuilder::new(SimulationConfig::builtin());
        let err = builder
            .build(LatLon::new(51.5, -115.5), 40.0, 500.0)
            .expect_err("spans tiles");
        assert!(matches!(err, ElevationError::MultiTileSpan { .. }));
    }

    #[test]
    fn features_are_applied_when_supplied() {
        let center = LatLon::new(46.5, 7.5);
        let features = TerrainFeatures {
            trails: geo::MultiLineString::new(vec![line_string![
                (x: center.lon - 0.01, y: center.lat),
                (x: center.lon + 0.01, y: center.lat),
            ]]),
            ..TerrainFeatures::default()
        };
        let builder = TerrainBuilder::new(SimulationConfig::builtin())
            .with_features(Arc::new(StaticFeatures::new(features)));
        let model = builder.build(center, 1.0, 100.0).expect("build");
        let (row, col) = model.geometry().center_cell();
        assert!(model.get_attraction(row, col) > 3.9);
        assert!(model.diagnostics().layers.contains(DataLayers::TRAILS));
        assert!(!model.diagnostics().degraded.iter().any(|r| r.starts_with("features")));
    }
}
