//! Per-area terrain layers that weight movement: elevation, slope, trail and
//! water attraction, vegetation density.
//!
//! A [`TerrainInfluenceModel`] is built once per search area by
//! [`TerrainBuilder`] and then shared read-only (`Arc`) across ticks and
//! requests. Missing inputs never fail a build; they fall back to neutral
//! layers and are listed in [`TerrainDiagnostics`].

mod builder;
mod features;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{config::TerrainConfig, geometry::GridGeometry, tiles::TileId};

pub use builder::TerrainBuilder;
pub use features::{FeatureSource, StaticFeatures, TerrainFeatures};

bitflags! {
    /// Terrain layers backed by real data rather than neutral defaults.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DataLayers: u8 {
        const ELEVATION = 1 << 0;
        const TRAILS = 1 << 1;
        const ROADS = 1 << 2;
        const WATER = 1 << 3;
        const VEGETATION = 1 << 4;
    }
}

impl DataLayers {
    pub fn names(&self) -> Vec<String> {
        self.iter_names().map(|(name, _)| name.to_ascii_lowercase()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElevationProvenance {
    Raster { tile: TileId, void_samples: usize },
    Synthetic,
}

impl ElevationProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElevationProvenance::Raster { .. } => "raster",
            ElevationProvenance::Synthetic => "synthetic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainDiagnostics {
    pub elevation: ElevationProvenance,
    pub layers: DataLayers,
    /// Human-readable reasons for each fallback taken during the build.
    pub degraded: Vec<String>,
}

impl TerrainDiagnostics {
    pub fn synthetic() -> Self {
        Self {
            elevation: ElevationProvenance::Synthetic,
            layers: DataLayers::empty(),
            degraded: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn status(&self) -> sar_schema::TerrainStatus {
        let elevation_tile = match self.elevation {
            ElevationProvenance::Raster { tile, .. } => Some(tile.file_stem()),
            ElevationProvenance::Synthetic => None,
        };
        sar_schema::TerrainStatus {
            elevation: self.elevation.as_str().to_string(),
            elevation_tile,
            layers: self.layers.names(),
            degraded: self.degraded.clone(),
        }
    }
}

/// Immutable terrain layers for one search grid. Layers are stored as `f32`
/// and widened on access.
#[derive(Debug, Clone)]
pub struct TerrainInfluenceModel {
    geometry: GridGeometry,
    elevation: Vec<f32>,
    slope: Vec<f32>,
    trail_attraction: Vec<f32>,
    water_attraction: Vec<f32>,
    vegetation: Vec<f32>,
    /// Ceiling on the trail × water product.
    attraction_cap: f64,
    diagnostics: TerrainDiagnostics,
}

impl TerrainInfluenceModel {
    /// Flat ground with no features; every multiplier is neutral.
    pub fn neutral(geometry: GridGeometry) -> Self {
        let elevation = vec![0.0; geometry.len()];
        Self::from_elevation(geometry, elevation, TerrainDiagnostics::synthetic())
    }

    /// Elevation only, attraction neutral. `elevation` is row-major over `geometry`.
    pub fn from_elevation(
        geometry: GridGeometry,
        elevation: Vec<f32>,
        diagnostics: TerrainDiagnostics,
    ) -> Self {
        debug_assert_eq!(elevation.len(), geometry.len());
        let slope = slope_grid(&geometry, &elevation);
        let len = geometry.len();
        Self {
            geometry,
            elevation,
            slope,
            trail_attraction: vec![1.0; len],
            water_attraction: vec![1.0; len],
            vegetation: vec![0.0; len],
            attraction_cap: f64::INFINITY,
            diagnostics,
        }
    }

    /// Rasterize `features` onto this grid, replacing the attraction and vegetation layers.
    pub fn with_features(mut self, features: &TerrainFeatures, config: &TerrainConfig) -> Self {
        let geometry = &self.geometry;
        let cell_m = geometry.cell_size_m;
        self.attraction_cap = config
            .trail_max_multiplier
            .max(config.road_max_multiplier)
            .max(config.water_max_multiplier)
            .max(1.0);

        let trails = features.has_trails().then(|| {
            let mask = features::rasterize_lines(geometry, &features.trails);
            features::distance_transform(geometry.width, geometry.height, &mask)
        });
        let roads = features.has_roads().then(|| {
            let mask = features::rasterize_lines(geometry, &features.roads);
            features::distance_transform(geometry.width, geometry.height, &mask)
        });
        if trails.is_some() || roads.is_some() {
            for idx in 0..self.trail_attraction.len() {
                let trail = trails.as_ref().map_or(1.0, |d| {
                    features::decayed_attraction(
                        f64::from(d[idx]) * cell_m,
                        config.trail_max_multiplier,
                        config.trail_decay_m,
                    )
                });
                let road = roads.as_ref().map_or(1.0, |d| {
                    features::decayed_attraction(
                        f64::from(d[idx]) * cell_m,
                        config.road_max_multiplier,
                        config.trail_decay_m,
                    )
                });
                self.trail_attraction[idx] = trail.max(road) as f32;
            }
        }
        self.diagnostics.layers.set(DataLayers::TRAILS, trails.is_some());
        self.diagnostics.layers.set(DataLayers::ROADS, roads.is_some());

        if features.has_water() {
            let mut mask = features::rasterize_lines(geometry, &features.streams);
            let lakes = features::rasterize_polygons(geometry, &features.water);
            for (cell, lake) in mask.iter_mut().zip(lakes) {
                *cell |= lake;
            }
            let distance = features::distance_transform(geometry.width, geometry.height, &mask);
            for (value, d) in self.water_attraction.iter_mut().zip(distance) {
                *value = features::decayed_attraction(
                    f64::from(d) * cell_m,
                    config.water_max_multiplier,
                    config.water_decay_m,
                ) as f32;
            }
        }
        self.diagnostics.layers.set(DataLayers::WATER, features.has_water());

        if features.has_vegetation() {
            self.vegetation = features::rasterize_density(geometry, &features.vegetation);
        }
        self.diagnostics
            .layers
            .set(DataLayers::VEGETATION, features.has_vegetation());
        self
    }

    pub(crate) fn note_degraded(&mut self, reason: impl Into<String>) {
        self.diagnostics.degraded.push(reason.into());
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn diagnostics(&self) -> &TerrainDiagnostics {
        &self.diagnostics
    }

    #[inline]
    fn idx(&self, row: usize, col: usize) -> usize {
        self.geometry.index(row, col)
    }

    #[inline]
    pub fn get_elevation(&self, row: usize, col: usize) -> f64 {
        f64::from(self.elevation[self.idx(row, col)])
    }

    /// Grade magnitude (rise over run) from central differences.
    #[inline]
    pub fn get_slope(&self, row: usize, col: usize) -> f64 {
        f64::from(self.slope[self.idx(row, col)])
    }

    /// Combined trail/road and water attraction; 1.0 is neutral. Never exceeds
    /// the strongest single layer's multiplier.
    #[inline]
    pub fn get_attraction(&self, row: usize, col: usize) -> f64 {
        let idx = self.idx(row, col);
        (f64::from(self.trail_attraction[idx]) * f64::from(self.water_attraction[idx]))
            .min(self.attraction_cap)
    }

    #[inline]
    pub fn trail_attraction(&self, row: usize, col: usize) -> f64 {
        f64::from(self.trail_attraction[self.idx(row, col)])
    }

    #[inline]
    pub fn water_attraction(&self, row: usize, col: usize) -> f64 {
        f64::from(self.water_attraction[self.idx(row, col)])
    }

    /// Vegetation density in `0..=1`.
    #[inline]
    pub fn vegetation(&self, row: usize, col: usize) -> f64 {
        f64::from(self.vegetation[self.idx(row, col)])
    }
}

fn slope_grid(geometry: &GridGeometry, elevation: &[f32]) -> Vec<f32> {
    let (width, height) = (geometry.width, geometry.height);
    let cell = geometry.cell_size_m.max(f64::EPSILON);
    let at = |row: usize, col: usize| f64::from(elevation[row * width + col]);

    let gradient = |lo: usize, hi: usize, a: f64, b: f64| {
        if hi > lo {
            (b - a) / ((hi - lo) as f64 * cell)
        } else {
            0.0
        }
    };

    let mut slope = Vec::with_capacity(elevation.len());
    for row in 0..height {
        let (up, down) = (row.saturating_sub(1), (row + 1).min(height - 1));
        for col in 0..width {
            let (left, right) = (col.saturating_sub(1), (col + 1).min(width - 1));
            let dx = gradient(left, right, at(row, left), at(row, right));
            let dy = gradient(up, down, at(up, col), at(down, col));
            slope.push(dx.hypot(dy) as f32);
        }
    }
    slope
}
