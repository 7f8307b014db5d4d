//! Time-evolution engine: moves probability mass across the search grid one
//! tick at a time.
//!
//! Each tick reads the frozen previous grid and writes a fresh one. Sources are
//! processed in fixed bands of rows; every band scatters into its own buffer
//! and the buffers are summed in band order, so the result is bit-identical
//! whether bands run on the rayon pool or inline.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    behavior::{BehaviorModel, Phase, PhaseParameters, SubjectProfile},
    config::{SimulationConfig, TerrainConfig},
    geometry::LatLon,
    grid::ProbabilityGrid,
    strategy::{MoveContext, Strategy},
    terrain::TerrainInfluenceModel,
    tiles::ElevationError,
};

const BAND_ROWS: usize = 16;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(
        "search radius {requested_km:.2} km exceeds the single-tile limit of {max_safe_km:.2} km"
    )]
    MultiTileSpan { requested_km: f64, max_safe_km: f64 },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("terrain unavailable: {0}")]
    Terrain(ElevationError),
    #[error("simulation cancelled after {completed_ticks} ticks")]
    Cancelled { completed_ticks: u32 },
    #[error("simulation pool is shut down")]
    PoolClosed,
}

impl From<ElevationError> for SimulationError {
    fn from(err: ElevationError) -> Self {
        match err {
            ElevationError::MultiTileSpan {
                requested_km,
                max_safe_km,
                ..
            } => SimulationError::MultiTileSpan {
                requested_km,
                max_safe_km,
            },
            other => SimulationError::Terrain(other),
        }
    }
}

/// Weather input for a run. The default leaves movement untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherModifier {
    pub speed_multiplier: f64,
    /// Pins all mass in place, e.g. during a storm.
    pub force_shelter: bool,
}

impl Default for WeatherModifier {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            force_shelter: false,
        }
    }
}

/// Shared flag checked between ticks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct TickSnapshot {
    pub tick: u32,
    pub elapsed_hours: f64,
    pub timestamp: DateTime<Utc>,
    /// Phase that drove the interval ending at this tick (tick 0: the starting phase).
    pub phase: Phase,
    pub grid: ProbabilityGrid,
    pub max: f64,
    pub mean: f64,
}

impl TickSnapshot {
    fn capture(
        tick: u32,
        elapsed_hours: f64,
        timestamp: DateTime<Utc>,
        phase: Phase,
        grid: &ProbabilityGrid,
    ) -> Self {
        Self {
            tick,
            elapsed_hours,
            timestamp,
            phase,
            max: grid.max(),
            mean: grid.mean(),
            grid: grid.clone(),
        }
    }
}

/// One run's fixed inputs.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub last_known: LatLon,
    pub start_time: DateTime<Utc>,
    pub profile: SubjectProfile,
    pub weather: WeatherModifier,
    pub horizon_ticks: u32,
}

#[derive(Debug, Clone)]
pub struct TimeEvolutionEngine {
    config: Arc<SimulationConfig>,
    behavior: BehaviorModel,
}

impl TimeEvolutionEngine {
    pub fn new(config: Arc<SimulationConfig>, behavior: BehaviorModel) -> Self {
        Self { config, behavior }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn behavior(&self) -> &BehaviorModel {
        &self.behavior
    }

    /// All mass on the cell nearest the last-known location.
    pub fn initial_grid(
        &self,
        terrain: &TerrainInfluenceModel,
        last_known: LatLon,
    ) -> (ProbabilityGrid, (usize, usize)) {
        let geometry = terrain.geometry();
        let (row, col) = geometry.nearest_cell(last_known);
        (
            ProbabilityGrid::point_mass(geometry.width, geometry.height, row, col),
            (row, col),
        )
    }

    /// Run the scenario, returning `horizon_ticks + 1` snapshots (tick 0 included).
    pub fn run(
        &self,
        terrain: &TerrainInfluenceModel,
        scenario: &Scenario,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<TickSnapshot>, SimulationError> {
        let tick_hours = self.config.tick_hours();
        let tick_minutes = i64::from(self.config.tick_minutes.max(1));
        let (mut grid, lkl_cell) = self.initial_grid(terrain, scenario.last_known);

        let mut snapshots = Vec::with_capacity(scenario.horizon_ticks as usize + 1);
        snapshots.push(TickSnapshot::capture(
            0,
            0.0,
            scenario.start_time,
            self.behavior.phase_at(0.0),
            &grid,
        ));

        for tick_index in 1..=scenario.horizon_ticks {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                info!(
                    target: "sar::engine",
                    completed_ticks = tick_index - 1,
                    "engine.cancelled"
                );
                return Err(SimulationError::Cancelled {
                    completed_ticks: tick_index - 1,
                });
            }

            // the interval is governed by the phase at its start
            let params = self
                .behavior
                .compute_phase(&scenario.profile, f64::from(tick_index - 1) * tick_hours);
            grid = tick(&grid, terrain, &params, &scenario.weather, lkl_cell, &self.config);

            let elapsed_hours = f64::from(tick_index) * tick_hours;
            let offset = chrono::Duration::minutes(tick_minutes * i64::from(tick_index));
            let timestamp = scenario.start_time + offset;
            let snapshot =
                TickSnapshot::capture(tick_index, elapsed_hours, timestamp, params.phase, &grid);
            debug!(
                target: "sar::engine",
                tick = tick_index,
                phase = params.phase.as_str(),
                max = snapshot.max,
                radius_m = params.base_distance_m * scenario.weather.speed_multiplier,
                speed = params.speed_multiplier(),
                "engine.tick"
            );
            snapshots.push(snapshot);
        }

        info!(
            target: "sar::engine",
            ticks = scenario.horizon_ticks,
            width = grid.width(),
            height = grid.height(),
            final_max = grid.max(),
            "engine.completed"
        );
        Ok(snapshots)
    }
}

/// Advance `grid` by one tick.
///
/// Each source cell keeps its StayPut share and splits every moving strategy's
/// share over the stencil of cells within the travel radius, in proportion to
/// slope cost × attraction × vegetation × inverse distance × the strategy's
/// directional factor. Stencil cells off the grid take part in the
/// normalization but their mass is dropped; the result is rescaled to 1.
///
/// A travel radius shorter than one cell moves only to the four neighbours,
/// with the moving shares scaled down by the radius in cells.
pub fn tick(
    grid: &ProbabilityGrid,
    terrain: &TerrainInfluenceModel,
    params: &PhaseParameters,
    weather: &WeatherModifier,
    last_known_cell: (usize, usize),
    config: &SimulationConfig,
) -> ProbabilityGrid {
    let geometry = terrain.geometry();
    debug_assert_eq!((grid.width(), grid.height()), (geometry.width, geometry.height));

    let radius_cells =
        params.base_distance_m * weather.speed_multiplier.max(0.0) / geometry.cell_size_m;
    if weather.force_shelter || !(radius_cells > 0.0) || params.weights.stay() >= 1.0 {
        return grid.clone();
    }

    let kernel = Kernel {
        terrain,
        params,
        terrain_config: &config.terrain,
        stencil: Stencil::new(radius_cells.max(1.0), geometry.width, geometry.height),
        move_scale: radius_cells.min(1.0),
        last_known: (last_known_cell.0 as isize, last_known_cell.1 as isize),
        negligible_mass: config.negligible_mass,
    };

    let width = grid.width();
    let height = grid.height();
    let band_starts: Vec<usize> = (0..height).step_by(BAND_ROWS).collect();
    let source = grid.as_slice();
    let run_band = |start: usize| kernel.spread_band(source, width, height, start);

    let bands: Vec<(usize, Vec<f64>)> = if grid.len() >= config.parallel_min_cells {
        band_starts.par_iter().map(|&start| run_band(start)).collect()
    } else {
        band_starts.iter().map(|&start| run_band(start)).collect()
    };

    let mut next = ProbabilityGrid::zeros(width, height);
    let cells = next.as_mut_slice();
    for (top, band) in bands {
        let offset = top * width;
        for (cell, value) in cells[offset..offset + band.len()].iter_mut().zip(band) {
            *cell += value;
        }
    }

    let retained = next.normalize();
    if !(retained > 0.0 && retained.is_finite()) {
        warn!(target: "sar::engine", retained, "engine.mass_lost");
        return grid.clone();
    }
    next
}

#[derive(Debug, Clone, Copy)]
struct Offset {
    dr: isize,
    dc: isize,
    distance_cells: f64,
}

/// Cell offsets within the travel radius, excluding the source itself. Offsets
/// no source on a `width` x `height` grid could land on are left out.
#[derive(Debug, Clone)]
struct Stencil {
    offsets: Vec<Offset>,
    reach: usize,
}

impl Stencil {
    fn new(radius_cells: f64, width: usize, height: usize) -> Self {
        let max_dr = height.saturating_sub(1) as isize;
        let max_dc = width.saturating_sub(1) as isize;
        let reach = (radius_cells.floor().max(0.0) as isize).min(max_dr.max(max_dc));
        let limit = radius_cells * radius_cells + 1e-9;
        let mut offsets = Vec::new();
        for dr in -reach.min(max_dr)..=reach.min(max_dr) {
            for dc in -reach.min(max_dc)..=reach.min(max_dc) {
                let squared = (dr * dr + dc * dc) as f64;
                if squared == 0.0 || squared > limit {
                    continue;
                }
                offsets.push(Offset {
                    dr,
                    dc,
                    distance_cells: squared.sqrt(),
                });
            }
        }
        Self {
            offsets,
            reach: reach as usize,
        }
    }
}

struct Kernel<'a> {
    terrain: &'a TerrainInfluenceModel,
    params: &'a PhaseParameters,
    terrain_config: &'a TerrainConfig,
    stencil: Stencil,
    /// Fraction of the moving shares that actually moves (below 1 for sub-cell radii).
    move_scale: f64,
    last_known: (isize, isize),
    negligible_mass: f64,
}

impl Kernel<'_> {
    /// Scatter sources in rows `start..start + BAND_ROWS` into a buffer covering
    /// every row they can reach. Returns the buffer's first row and contents.
    fn spread_band(
        &self,
        source: &[f64],
        width: usize,
        height: usize,
        start: usize,
    ) -> (usize, Vec<f64>) {
        let end = (start + BAND_ROWS).min(height);
        let top = start.saturating_sub(self.stencil.reach);
        let bottom = (end + self.stencil.reach).min(height);
        let mut band = vec![0.0; (bottom - top) * width];
        let mut scratch = Vec::with_capacity(self.stencil.offsets.len());

        for row in start..end {
            for col in 0..width {
                let mass = source[row * width + col];
                if mass > 0.0 {
                    self.spread_cell(mass, row, col, top, width, &mut band, &mut scratch);
                }
            }
        }
        (top, band)
    }

    #[allow(clippy::too_many_arguments)]
    fn spread_cell(
        &self,
        mass: f64,
        row: usize,
        col: usize,
        top: usize,
        width: usize,
        band: &mut [f64],
        scratch: &mut Vec<(Option<usize>, [f64; 4])>,
    ) {
        let here = (row - top) * width + col;
        if mass < self.negligible_mass {
            band[here] += mass;
            return;
        }

        let terrain = self.terrain;
        let geometry = terrain.geometry();
        let cell_m = geometry.cell_size_m;
        let source_elevation = terrain.get_elevation(row, col);
        let outward = (
            (row as isize - self.last_known.0) as f64,
            (col as isize - self.last_known.1) as f64,
        );
        let outward_len = outward.0.hypot(outward.1);

        scratch.clear();
        let mut normalizers = [0.0f64; 4];
        for offset in &self.stencil.offsets {
            let (r, c) = (row as isize + offset.dr, col as isize + offset.dc);
            let falloff = 1.0 / offset.distance_cells;
            let (dest, base, grade, trail) = if geometry.contains(r, c) {
                let (r, c) = (r as usize, c as usize);
                let rise = terrain.get_elevation(r, c) - source_elevation;
                let grade = rise / (offset.distance_cells * cell_m);
                let slowdown = self.terrain_config.vegetation_slowdown * terrain.vegetation(r, c);
                let vegetation = (1.0 - slowdown).max(0.0);
                let base = falloff
                    * tobler_cost(grade, self.terrain_config)
                    * terrain.get_attraction(r, c)
                    * vegetation;
                (
                    Some((r - top) * width + c),
                    base,
                    grade,
                    terrain.trail_attraction(r, c),
                )
            } else {
                (None, falloff, 0.0, 1.0)
            };

            let mv = MoveContext {
                outward_cos: (outward_len > 0.0).then(|| {
                    (outward.0 * offset.dr as f64 + outward.1 * offset.dc as f64)
                        / (outward_len * offset.distance_cells)
                }),
                grade,
                trail_attraction: trail,
                trail_adherence: self.params.trail_adherence,
                uphill_bias: self.params.uphill_bias,
            };
            let mut weights = [0.0; 4];
            for (slot, strategy) in Strategy::MOVING.iter().enumerate() {
                weights[slot] = base * strategy.move_factor(&mv);
                normalizers[slot] += weights[slot];
            }
            scratch.push((dest, weights));
        }

        let shares = &self.params.weights;
        let moving = self.move_scale * mass;
        let mut stay = mass - moving * shares.moving();
        let mut per_unit = [0.0f64; 4];
        for (slot, strategy) in Strategy::MOVING.iter().enumerate() {
            let share = shares.get(*strategy) * moving;
            if normalizers[slot] > 0.0 && normalizers[slot].is_finite() {
                per_unit[slot] = share / normalizers[slot];
            } else {
                stay += share;
            }
        }
        band[here] += stay;

        for (dest, weights) in scratch.iter() {
            if let Some(idx) = dest {
                let moved: f64 = weights.iter().zip(per_unit).map(|(w, unit)| w * unit).sum();
                band[*idx] += moved;
            }
        }
    }
}

/// Tobler-style hiking cost relative to flat ground (1.0 at zero grade).
/// Uphill grades are charged `uphill_penalty` times the downhill coefficient.
pub fn tobler_cost(grade: f64, config: &TerrainConfig) -> f64 {
    let grade = grade.clamp(-config.max_grade, config.max_grade);
    let coefficient = if grade > 0.0 {
        config.tobler_slope_coefficient * config.uphill_penalty
    } else {
        config.tobler_slope_coefficient
    };
    let offset = config.tobler_slope_offset;
    (-coefficient * (grade + offset).abs()).exp()
        / (-config.tobler_slope_coefficient * offset).exp()
}
