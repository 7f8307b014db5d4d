//! Request-level entry point wiring configuration, caches and the engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    behavior::{BehaviorModel, SubjectProfile},
    config::{self, horizon_ticks, BehaviorConfig, SimulationConfig},
    engine::{
        CancellationToken, Scenario, SimulationError, TickSnapshot, TimeEvolutionEngine,
        WeatherModifier,
    },
    geometry::{GridGeometry, LatLon},
    grid::ProbabilityGrid,
    terrain::{FeatureSource, TerrainBuilder, TerrainDiagnostics},
    terrain_cache::TerrainModelCache,
    tiles::{ElevationSource, ElevationTileCache},
};

/// Finest grid spacing accepted from callers.
pub const MIN_RESOLUTION_M: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub last_known: LatLon,
    pub time_last_seen: DateTime<Utc>,
    pub profile: SubjectProfile,
    pub radius_km: f64,
    pub resolution_m: f64,
    #[serde(default)]
    pub weather: WeatherModifier,
    /// Overrides the configured horizon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon_hours: Option<f64>,
}

impl SimulationRequest {
    pub fn validate(&self) -> Result<(), SimulationError> {
        let invalid = |msg: String| Err(SimulationError::InvalidRequest(msg));
        if !self.last_known.is_valid() {
            return invalid(format!(
                "last known location ({}, {}) is not a valid coordinate",
                self.last_known.lat, self.last_known.lon
            ));
        }
        if !(self.radius_km.is_finite() && self.radius_km > 0.0) {
            return invalid(format!("radius_km must be positive, got {}", self.radius_km));
        }
        if !(self.resolution_m.is_finite() && self.resolution_m >= MIN_RESOLUTION_M) {
            return invalid(format!(
                "resolution_m must be at least {MIN_RESOLUTION_M}, got {}",
                self.resolution_m
            ));
        }
        if let Some(hours) = self.horizon_hours {
            if !(hours.is_finite() && hours >= 0.0) {
                return invalid(format!("horizon_hours must be non-negative, got {hours}"));
            }
        }
        if !(self.weather.speed_multiplier.is_finite() && self.weather.speed_multiplier >= 0.0) {
            return invalid(format!(
                "weather speed multiplier must be non-negative, got {}",
                self.weather.speed_multiplier
            ));
        }
        Ok(())
    }

    /// Reject requests whose grid or travel reach exceeds the configured limits.
    pub fn check_limits(&self, config: &SimulationConfig) -> Result<(), SimulationError> {
        let side = GridGeometry::side_for(self.radius_km, self.resolution_m);
        let cells = side.checked_mul(side).unwrap_or(usize::MAX);
        if cells > config.max_grid_cells {
            return Err(SimulationError::InvalidRequest(format!(
                "a {:.2} km radius at {} m resolution needs {side}x{side} cells; the limit is {}",
                self.radius_km, self.resolution_m, config.max_grid_cells
            )));
        }
        if self.weather.speed_multiplier > config.max_speed_multiplier {
            return Err(SimulationError::InvalidRequest(format!(
                "weather speed multiplier {} exceeds the limit of {}",
                self.weather.speed_multiplier, config.max_speed_multiplier
            )));
        }
        Ok(())
    }
}

/// Everything a run produced. Grids stay full-precision; export trimming
/// happens in [`SimulationOutput::to_report`].
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub geometry: GridGeometry,
    pub last_known: LatLon,
    pub snapshots: Vec<TickSnapshot>,
    pub diagnostics: TerrainDiagnostics,
    pub hotspot_count: usize,
}

impl SimulationOutput {
    pub fn snapshot(&self, tick: u32) -> Option<&TickSnapshot> {
        self.snapshots.get(tick as usize)
    }

    pub fn final_grid(&self) -> Option<&ProbabilityGrid> {
        self.snapshots.last().map(|snapshot| &snapshot.grid)
    }
}

pub struct SearchService {
    config: Arc<SimulationConfig>,
    engine: TimeEvolutionEngine,
    terrain: Arc<TerrainModelCache>,
}

impl SearchService {
    pub fn new(
        config: Arc<SimulationConfig>,
        behavior: Arc<BehaviorConfig>,
        terrain: Arc<TerrainModelCache>,
    ) -> Self {
        let engine = TimeEvolutionEngine::new(
            Arc::clone(&config),
            BehaviorModel::new(behavior, config.tick_hours()),
        );
        Self {
            config,
            engine,
            terrain,
        }
    }

    /// Build the tile cache (when a source is given) and terrain cache from config.
    pub fn with_sources(
        config: Arc<SimulationConfig>,
        behavior: Arc<BehaviorConfig>,
        elevation: Option<Arc<dyn ElevationSource>>,
        features: Option<Arc<dyn FeatureSource>>,
    ) -> Self {
        let mut builder = TerrainBuilder::new(Arc::clone(&config));
        if let Some(source) = elevation {
            let tiles = ElevationTileCache::new(config.tiles.clone(), source);
            builder = builder.with_tiles(Arc::new(tiles));
        }
        if let Some(features) = features {
            builder = builder.with_features(features);
        }
        let terrain = Arc::new(TerrainModelCache::new(builder, &config.terrain_cache));
        Self::new(config, behavior, terrain)
    }

    /// Builtin constants, no tile cache, no features.
    pub fn offline() -> Self {
        Self::with_sources(SimulationConfig::builtin(), BehaviorConfig::builtin(), None, None)
    }

    /// Configuration from the environment (see [`config::SIMULATION_CONFIG_ENV`]).
    pub fn from_env(
        elevation: Option<Arc<dyn ElevationSource>>,
        features: Option<Arc<dyn FeatureSource>>,
    ) -> Self {
        let (simulation, _) = config::load_simulation_config_from_env();
        let (behavior, _) = config::load_behavior_config_from_env();
        Self::with_sources(simulation, behavior, elevation, features)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn engine(&self) -> &TimeEvolutionEngine {
        &self.engine
    }

    pub fn terrain_cache(&self) -> &Arc<TerrainModelCache> {
        &self.terrain
    }

    pub fn tile_cache(&self) -> Option<&Arc<ElevationTileCache>> {
        self.terrain.builder().tiles()
    }

    pub fn simulate(
        &self,
        request: &SimulationRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<SimulationOutput, SimulationError> {
        request.validate()?;
        request.check_limits(&self.config)?;
        let terrain = self
            .terrain
            .get_or_build(request.last_known, request.radius_km, request.resolution_m)?;

        let horizon = match request.horizon_hours {
            Some(hours) => horizon_ticks(hours, self.config.tick_hours()),
            None => self.config.horizon_ticks(),
        };
        let scenario = Scenario {
            last_known: request.last_known,
            start_time: request.time_last_seen,
            profile: request.profile,
            weather: request.weather,
            horizon_ticks: horizon,
        };
        info!(
            target: "sar::service",
            lat = request.last_known.lat,
            lon = request.last_known.lon,
            radius_km = request.radius_km,
            resolution_m = request.resolution_m,
            ticks = horizon,
            elevation = terrain.diagnostics().elevation.as_str(),
            degraded = terrain.diagnostics().is_degraded(),
            "service.simulate"
        );

        let snapshots = self.engine.run(&terrain, &scenario, cancel)?;
        Ok(SimulationOutput {
            geometry: terrain.geometry().clone(),
            last_known: request.last_known,
            snapshots,
            diagnostics: terrain.diagnostics().clone(),
            hotspot_count: self.config.hotspot_count,
        })
    }
}
