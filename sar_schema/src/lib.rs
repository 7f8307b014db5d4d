//! Serializable output contract for the search-area probability core.
//!
//! The API layer owns the wire format; this crate only fixes the shape of
//! what the core hands back and offers JSON / bincode encoders for it.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct GridMetadata {
    pub width: u32,
    pub height: u32,
    pub cell_size_m: f64,
    /// Latitude of the grid center (row `height / 2`).
    pub origin_lat: f64,
    /// Longitude of the grid center (column `width / 2`).
    pub origin_lon: f64,
    /// Degrees per row; negative because row 0 is the north edge.
    pub lat_step_deg: f64,
    pub lon_step_deg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Provenance of the terrain layers a simulation ran against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct TerrainStatus {
    /// `"raster"` or `"synthetic"`.
    pub elevation: String,
    #[serde(default)]
    pub elevation_tile: Option<String>,
    pub layers: Vec<String>,
    #[serde(default)]
    pub degraded: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Hotspot {
    pub row: u32,
    pub col: u32,
    pub lat: f64,
    pub lon: f64,
    pub probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ProbabilityFrame {
    pub tick: u32,
    pub elapsed_hours: f64,
    /// RFC 3339 timestamp of the tick.
    pub timestamp: String,
    pub phase: String,
    pub max_probability: f64,
    pub mean_probability: f64,
    /// Cells at or above the export epsilon.
    pub visible_cells: u32,
    /// `[row][col]` matrix; values below the export epsilon are written as 0.
    pub matrix: Vec<Vec<f64>>,
    #[serde(default)]
    pub hotspots: Vec<Hotspot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ProbabilityReport {
    pub schema_version: u32,
    pub metadata: GridMetadata,
    pub last_known: LatLon,
    pub terrain: TerrainStatus,
    pub export_epsilon: f64,
    /// Frames keyed by tick index (tick 0 is the time last seen).
    pub frames: BTreeMap<u32, ProbabilityFrame>,
}

impl ProbabilityReport {
    pub fn new(
        metadata: GridMetadata,
        last_known: LatLon,
        terrain: TerrainStatus,
        export_epsilon: f64,
    ) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            metadata,
            last_known,
            terrain,
            export_epsilon,
            frames: BTreeMap::new(),
        }
    }

    pub fn push_frame(&mut self, frame: ProbabilityFrame) {
        self.frames.insert(frame.tick, frame);
    }

    pub fn frame(&self, tick: u32) -> Option<&ProbabilityFrame> {
        self.frames.get(&tick)
    }

    pub fn last_frame(&self) -> Option<&ProbabilityFrame> {
        self.frames.values().next_back()
    }
}

pub fn encode_report(report: &ProbabilityReport) -> bincode::Result<Vec<u8>> {
    bincode::serialize(report)
}

pub fn decode_report(bytes: &[u8]) -> bincode::Result<ProbabilityReport> {
    bincode::deserialize(bytes)
}

pub fn report_to_json(report: &ProbabilityReport) -> serde_json::Result<String> {
    serde_json::to_string(report)
}

pub fn report_to_json_pretty(report: &ProbabilityReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

pub fn report_from_json(json: &str) -> serde_json::Result<ProbabilityReport> {
    serde_json::from_str(json)
}

/// JSON Schema describing [`ProbabilityReport`].
pub fn report_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(ProbabilityReport)
}
