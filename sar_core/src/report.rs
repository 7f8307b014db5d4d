use sar_schema::{Hotspot, ProbabilityFrame, ProbabilityReport};

use crate::{engine::TickSnapshot, geometry::GridGeometry, service::SimulationOutput};

impl SimulationOutput {
    /// Export form of the run. Cells below `epsilon` are written as zero; the
    /// working grids are untouched.
    pub fn to_report(&self, epsilon: f64) -> ProbabilityReport {
        let mut report = ProbabilityReport::new(
            self.geometry.metadata(),
            self.last_known.into(),
            self.diagnostics.status(),
            epsilon,
        );
        for snapshot in &self.snapshots {
            report.push_frame(frame(&self.geometry, snapshot, epsilon, self.hotspot_count));
        }
        report
    }
}

fn frame(
    geometry: &GridGeometry,
    snapshot: &TickSnapshot,
    epsilon: f64,
    hotspot_count: usize,
) -> ProbabilityFrame {
    let hotspots = snapshot
        .grid
        .top_cells(hotspot_count, epsilon)
        .into_iter()
        .map(|(row, col, probability)| {
            let center = geometry.cell_center(row, col);
            Hotspot {
                row: row as u32,
                col: col as u32,
                lat: center.lat,
                lon: center.lon,
                probability,
            }
        })
        .collect();

    ProbabilityFrame {
        tick: snapshot.tick,
        elapsed_hours: snapshot.elapsed_hours,
        timestamp: snapshot.timestamp.to_rfc3339(),
        phase: snapshot.phase.as_str().to_string(),
        max_probability: snapshot.max,
        mean_probability: snapshot.mean,
        visible_cells: snapshot.grid.count_above(epsilon) as u32,
        matrix: snapshot.grid.to_matrix(epsilon),
        hotspots,
    }
}
