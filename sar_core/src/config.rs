use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

pub const BUILTIN_SIMULATION_CONFIG: &str = include_str!("data/simulation_config.json");
pub const BUILTIN_BEHAVIOR_CONFIG: &str = include_str!("data/behavior_config.json");

pub const SIMULATION_CONFIG_ENV: &str = "SAR_SIMULATION_CONFIG_PATH";
pub const BEHAVIOR_CONFIG_ENV: &str = "SAR_BEHAVIOR_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Engine and cache tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub tick_minutes: u32,
    pub horizon_hours: f64,
    /// Cells below this value are omitted from exports only.
    pub export_epsilon: f64,
    /// Sources holding less than this keep their mass in place for the tick.
    pub negligible_mass: f64,
    pub hotspot_count: usize,
    /// Grids smaller than this run the tick on the calling thread.
    pub parallel_min_cells: usize,
    /// Requests whose grid would hold more cells than this are rejected.
    pub max_grid_cells: usize,
    pub max_speed_multiplier: f64,
    pub terrain: TerrainConfig,
    pub tiles: TileCacheConfig,
    pub terrain_cache: TerrainCacheConfig,
}

impl SimulationConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_SIMULATION_CONFIG)
                .expect("builtin simulation config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        read_config(path)
    }

    pub fn tick_hours(&self) -> f64 {
        f64::from(self.tick_minutes.max(1)) / 60.0
    }

    /// Number of diffusion steps in the horizon; the output holds one more grid (t=0).
    pub fn horizon_ticks(&self) -> u32 {
        horizon_ticks(self.horizon_hours, self.tick_hours())
    }
}

pub(crate) fn horizon_ticks(horizon_hours: f64, tick_hours: f64) -> u32 {
    if !(horizon_hours > 0.0) || !(tick_hours > 0.0) {
        return 0;
    }
    (horizon_hours / tick_hours).round() as u32
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_minutes: 15,
            horizon_hours: 12.0,
            export_epsilon: 1e-4,
            negligible_mass: 1e-12,
            hotspot_count: 10,
            parallel_min_cells: 2048,
            max_grid_cells: 1_000_000,
            max_speed_multiplier: 3.0,
            terrain: TerrainConfig::default(),
            tiles: TileCacheConfig::default(),
            terrain_cache: TerrainCacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub tobler_slope_coefficient: f64,
    pub tobler_slope_offset: f64,
    /// Extra multiplier on the slope coefficient for uphill moves.
    pub uphill_penalty: f64,
    /// Grades beyond this are clamped before costing.
    pub max_grade: f64,
    pub trail_max_multiplier: f64,
    pub trail_decay_m: f64,
    pub road_max_multiplier: f64,
    pub water_max_multiplier: f64,
    pub water_decay_m: f64,
    /// Fraction of movement lost in fully dense vegetation.
    pub vegetation_slowdown: f64,
    pub synthetic_base_elevation_m: f64,
    pub synthetic_relief_m: f64,
    pub synthetic_feature_scale_m: f64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            tobler_slope_coefficient: 3.5,
            tobler_slope_offset: 0.05,
            uphill_penalty: 1.6,
            max_grade: 1.5,
            trail_max_multiplier: 4.0,
            trail_decay_m: 250.0,
            road_max_multiplier: 3.0,
            water_max_multiplier: 1.5,
            water_decay_m: 150.0,
            vegetation_slowdown: 0.5,
            synthetic_base_elevation_m: 1400.0,
            synthetic_relief_m: 250.0,
            synthetic_feature_scale_m: 4000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileCacheConfig {
    pub memory_capacity: usize,
    pub cache_dir: PathBuf,
    pub cleanup_on_shutdown: bool,
    /// Scale applied to the distance to the nearest tile edge.
    pub safe_radius_margin: f64,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 4,
            cache_dir: PathBuf::from("elevation_tiles"),
            cleanup_on_shutdown: false,
            safe_radius_margin: 0.995,
        }
    }
}

impl TileCacheConfig {
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = capacity;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainCacheConfig {
    pub capacity: usize,
    pub center_precision_decimals: u32,
}

impl Default for TerrainCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            center_precision_decimals: 4,
        }
    }
}

/// Constants driving the behavioral phase model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub phases: PhaseBoundaries,
    pub panic: PhaseProfile,
    pub transition: PhaseProfile,
    pub exhaustion: ExhaustionProfile,
    pub shelter: PhaseProfile,
    pub age_bands: Vec<AgeBand>,
    pub sex: SexMultipliers,
    pub experience: ExperienceProfiles,
}

impl BehaviorConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_BEHAVIOR_CONFIG)
                .expect("builtin behavior config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        read_config(path)
    }

    /// Walking speed for an age; ages past the last band use the last band.
    pub fn speed_for_age(&self, age: u32) -> f64 {
        self.age_bands
            .iter()
            .find(|band| age <= band.max_age)
            .or_else(|| self.age_bands.last())
            .map(|band| band.speed_kmh)
            .unwrap_or(2.0)
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            phases: PhaseBoundaries::default(),
            panic: PhaseProfile {
                speed_multiplier: 1.3,
                uphill_bias: 0.6,
                weights: StrategyWeightConfig {
                    stay_put: 0.10,
                    route_travel: 0.15,
                    backtrack: 0.10,
                    direct_travel: 0.40,
                    random_travel: 0.25,
                },
            },
            transition: PhaseProfile {
                speed_multiplier: 1.0,
                uphill_bias: 0.2,
                weights: StrategyWeightConfig {
                    stay_put: 0.10,
                    route_travel: 0.40,
                    backtrack: 0.15,
                    direct_travel: 0.15,
                    random_travel: 0.20,
                },
            },
            exhaustion: ExhaustionProfile::default(),
            shelter: PhaseProfile {
                speed_multiplier: 0.3,
                uphill_bias: 0.0,
                weights: StrategyWeightConfig {
                    stay_put: 0.60,
                    route_travel: 0.15,
                    backtrack: 0.10,
                    direct_travel: 0.05,
                    random_travel: 0.10,
                },
            },
            age_bands: vec![
                AgeBand::new(6, 0.8),
                AgeBand::new(12, 1.4),
                AgeBand::new(17, 2.2),
                AgeBand::new(35, 2.6),
                AgeBand::new(55, 2.3),
                AgeBand::new(70, 1.8),
                AgeBand::new(150, 1.3),
            ],
            sex: SexMultipliers::default(),
            experience: ExperienceProfiles::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseBoundaries {
    pub panic_end_hours: f64,
    pub transition_end_hours: f64,
    pub exhaustion_end_hours: f64,
}

impl Default for PhaseBoundaries {
    fn default() -> Self {
        Self {
            panic_end_hours: 3.0,
            transition_end_hours: 6.0,
            exhaustion_end_hours: 12.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseProfile {
    pub speed_multiplier: f64,
    pub uphill_bias: f64,
    pub weights: StrategyWeightConfig,
}

impl Default for PhaseProfile {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            uphill_bias: 0.0,
            weights: StrategyWeightConfig::default(),
        }
    }
}

/// Exhaustion interpolates linearly from its start values to its end values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExhaustionProfile {
    pub speed_start: f64,
    pub speed_end: f64,
    pub uphill_bias: f64,
    pub weights_start: StrategyWeightConfig,
    pub weights_end: StrategyWeightConfig,
}

impl Default for ExhaustionProfile {
    fn default() -> Self {
        Self {
            speed_start: 0.8,
            speed_end: 0.6,
            uphill_bias: 0.0,
            weights_start: StrategyWeightConfig {
                stay_put: 0.20,
                route_travel: 0.35,
                backtrack: 0.10,
                direct_travel: 0.10,
                random_travel: 0.25,
            },
            weights_end: StrategyWeightConfig {
                stay_put: 0.45,
                route_travel: 0.25,
                backtrack: 0.05,
                direct_travel: 0.05,
                random_travel: 0.20,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyWeightConfig {
    pub stay_put: f64,
    pub route_travel: f64,
    pub backtrack: f64,
    pub direct_travel: f64,
    pub random_travel: f64,
}

impl Default for StrategyWeightConfig {
    fn default() -> Self {
        Self {
            stay_put: 0.2,
            route_travel: 0.2,
            backtrack: 0.2,
            direct_travel: 0.2,
            random_travel: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeBand {
    pub max_age: u32,
    pub speed_kmh: f64,
}

impl AgeBand {
    pub fn new(max_age: u32, speed_kmh: f64) -> Self {
        Self { max_age, speed_kmh }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SexMultipliers {
    pub male: f64,
    pub female: f64,
    pub unknown: f64,
}

impl Default for SexMultipliers {
    fn default() -> Self {
        Self {
            male: 1.0,
            female: 0.9,
            unknown: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceProfile {
    pub trail_adherence: f64,
    pub random_scale: f64,
}

impl Default for ExperienceProfile {
    fn default() -> Self {
        Self {
            trail_adherence: 1.0,
            random_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceProfiles {
    pub low: ExperienceProfile,
    pub medium: ExperienceProfile,
    pub high: ExperienceProfile,
}

impl Default for ExperienceProfiles {
    fn default() -> Self {
        Self {
            low: ExperienceProfile {
                trail_adherence: 0.7,
                random_scale: 1.3,
            },
            medium: ExperienceProfile::default(),
            high: ExperienceProfile {
                trail_adherence: 1.5,
                random_scale: 0.7,
            },
        }
    }
}

/// Where a loaded config came from; `None` means the embedded copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMetadata {
    path: Option<PathBuf>,
}

impl ConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn is_builtin(&self) -> bool {
        self.path.is_none()
    }
}

fn read_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&contents)?)
}

fn load_from_env<T: DeserializeOwned>(
    env_var: &str,
    data_file: &str,
    label: &str,
    builtin: fn() -> Arc<T>,
) -> (Arc<T>, ConfigMetadata) {
    let candidate = match env::var(env_var) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("src/data")
            .join(data_file),
    };

    match read_config::<T>(&candidate) {
        Ok(config) => {
            tracing::info!(
                target: "sar::config",
                config = label,
                path = %candidate.display(),
                "config.loaded=file"
            );
            return (Arc::new(config), ConfigMetadata::new(Some(candidate)));
        }
        Err(err) => {
            tracing::warn!(
                target: "sar::config",
                config = label,
                path = %candidate.display(),
                error = %err,
                "config.load_failed"
            );
        }
    }

    tracing::info!(target: "sar::config", config = label, "config.loaded=builtin");
    (builtin(), ConfigMetadata::new(None))
}

pub fn load_simulation_config_from_env() -> (Arc<SimulationConfig>, ConfigMetadata) {
    load_from_env(
        SIMULATION_CONFIG_ENV,
        "simulation_config.json",
        "simulation",
        SimulationConfig::builtin,
    )
}

pub fn load_behavior_config_from_env() -> (Arc<BehaviorConfig>, ConfigMetadata) {
    load_from_env(
        BEHAVIOR_CONFIG_ENV,
        "behavior_config.json",
        "behavior",
        BehaviorConfig::builtin,
    )
}
