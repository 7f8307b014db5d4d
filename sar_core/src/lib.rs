//! Lost-person probability core.
//!
//! Given a last-known location, the time the subject was last seen and a
//! subject profile, [`SearchService::simulate`] builds (or reuses) a terrain
//! model for the search area and diffuses probability mass across it in
//! 15-minute ticks, returning one grid per tick.
//!
//! Elevation comes from single 1°×1° raster tiles behind [`ElevationTileCache`];
//! when a tile cannot be had the terrain falls back to synthetic relief and says
//! so in its diagnostics.

pub mod behavior;
pub mod config;
pub mod engine;
pub mod geometry;
pub mod grid;
mod heightfield;
pub mod pool;
mod report;
pub mod service;
pub mod strategy;
pub mod terrain;
pub mod terrain_cache;
pub mod tiles;

pub use behavior::{
    compute_phase, BehaviorModel, ExperienceLevel, Phase, PhaseParameters, Sex, SubjectProfile,
};
pub use config::{
    load_behavior_config_from_env, load_simulation_config_from_env, BehaviorConfig, ConfigError,
    ConfigMetadata, SimulationConfig,
};
pub use engine::{
    tick, CancellationToken, Scenario, SimulationError, TickSnapshot, TimeEvolutionEngine,
    WeatherModifier,
};
pub use geometry::{haversine_km, GridGeometry, LatLon};
pub use grid::{GridStats, ProbabilityGrid};
pub use heightfield::SyntheticElevation;
pub use pool::{JobHandle, SimulationPool};
pub use service::{SearchService, SimulationOutput, SimulationRequest};
pub use strategy::{Strategy, StrategyWeights};
pub use terrain::{
    DataLayers, ElevationProvenance, FeatureSource, StaticFeatures, TerrainBuilder,
    TerrainDiagnostics, TerrainFeatures, TerrainInfluenceModel,
};
pub use terrain_cache::{TerrainCacheStats, TerrainKey, TerrainModelCache};
pub use tiles::{
    max_safe_radius_km, DirectorySource, ElevationError, ElevationSource, ElevationTileCache,
    RasterTile, SourceError, TileCacheStats, TileId,
};
