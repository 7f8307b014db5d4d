//! Vector terrain features and their rasterization onto a search grid.
//!
//! Coordinates follow `geo` convention: `x` is longitude, `y` latitude.

use geo::{BoundingRect, Contains, LineString, MultiLineString, MultiPolygon, Point, Polygon};

use crate::geometry::{GeoBounds, GridGeometry, LatLon};

/// Trail, road, water and vegetation geometry for one area.
#[derive(Debug, Clone)]
pub struct TerrainFeatures {
    pub trails: MultiLineString<f64>,
    pub roads: MultiLineString<f64>,
    pub streams: MultiLineString<f64>,
    pub water: MultiPolygon<f64>,
    /// Polygons with a density in `0..=1`.
    pub vegetation: Vec<(Polygon<f64>, f64)>,
}

impl Default for TerrainFeatures {
    fn default() -> Self {
        Self {
            trails: MultiLineString::new(vec![]),
            roads: MultiLineString::new(vec![]),
            streams: MultiLineString::new(vec![]),
            water: MultiPolygon::new(vec![]),
            vegetation: Vec::new(),
        }
    }
}

impl TerrainFeatures {
    pub fn has_trails(&self) -> bool {
        !self.trails.0.is_empty()
    }

    pub fn has_roads(&self) -> bool {
        !self.roads.0.is_empty()
    }

    pub fn has_water(&self) -> bool {
        !self.streams.0.is_empty() || !self.water.0.is_empty()
    }

    pub fn has_vegetation(&self) -> bool {
        !self.vegetation.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !(self.has_trails() || self.has_roads() || self.has_water() || self.has_vegetation())
    }
}

/// Supplies trail/road/water features for an area. `None` means nothing is known
/// and the terrain model falls back to neutral attraction.
pub trait FeatureSource: Send + Sync {
    fn features(&self, bounds: &GeoBounds) -> Option<TerrainFeatures>;
}

/// Fixed feature set, handed out for any area it was built for.
#[derive(Debug, Clone, Default)]
pub struct StaticFeatures {
    features: TerrainFeatures,
}

impl StaticFeatures {
    pub fn new(features: TerrainFeatures) -> Self {
        Self { features }
    }
}

impl FeatureSource for StaticFeatures {
    fn features(&self, _bounds: &GeoBounds) -> Option<TerrainFeatures> {
        (!self.features.is_empty()).then(|| self.features.clone())
    }
}

/// Cell mask of everything a set of polylines passes through.
pub(crate) fn rasterize_lines(geometry: &GridGeometry, lines: &MultiLineString<f64>) -> Vec<bool> {
    let mut mask = vec![false; geometry.len()];
    for line in lines {
        mark_line(geometry, line, &mut mask);
    }
    mask
}

fn mark_line(geometry: &GridGeometry, line: &LineString<f64>, mask: &mut [bool]) {
    for segment in line.lines() {
        let (r0, c0) = geometry.fractional_cell(LatLon::new(segment.start.y, segment.start.x));
        let (r1, c1) = geometry.fractional_cell(LatLon::new(segment.end.y, segment.end.x));
        // half-cell sampling never skips a cell the segment crosses
        let steps = ((r1 - r0).abs().max((c1 - c0).abs()) * 2.0).ceil().max(1.0) as usize;
        for step in 0..=steps {
            let t = step as f64 / steps as f64;
            let row = (r0 + (r1 - r0) * t).round() as isize;
            let col = (c0 + (c1 - c0) * t).round() as isize;
            if geometry.contains(row, col) {
                mask[geometry.index(row as usize, col as usize)] = true;
            }
        }
    }
}

/// Cell mask of polygon interiors, tested at cell centers.
pub(crate) fn rasterize_polygons<'a>(
    geometry: &GridGeometry,
    polygons: impl IntoIterator<Item = &'a Polygon<f64>>,
) -> Vec<bool> {
    let mut mask = vec![false; geometry.len()];
    for polygon in polygons {
        for_each_cell_in(geometry, polygon, |idx| mask[idx] = true);
    }
    mask
}

/// Per-cell vegetation density; overlapping polygons keep the densest value.
pub(crate) fn rasterize_density(
    geometry: &GridGeometry,
    polygons: &[(Polygon<f64>, f64)],
) -> Vec<f32> {
    let mut density = vec![0.0f32; geometry.len()];
    for (polygon, value) in polygons {
        let value = value.clamp(0.0, 1.0) as f32;
        for_each_cell_in(geometry, polygon, |idx| density[idx] = density[idx].max(value));
    }
    density
}

fn for_each_cell_in(geometry: &GridGeometry, polygon: &Polygon<f64>, mut visit: impl FnMut(usize)) {
    let Some(rect) = polygon.bounding_rect() else {
        return;
    };
    let (row_a, col_a) = geometry.nearest_cell(LatLon::new(rect.max().y, rect.min().x));
    let (row_b, col_b) = geometry.nearest_cell(LatLon::new(rect.min().y, rect.max().x));
    for row in row_a.min(row_b)..=row_a.max(row_b) {
        for col in col_a.min(col_b)..=col_a.max(col_b) {
            let center = geometry.cell_center(row, col);
            if polygon.contains(&Point::new(center.lon, center.lat)) {
                visit(geometry.index(row, col));
            }
        }
    }
}

/// Two-pass chamfer distance (in cells) to the nearest marked cell.
/// Cells are `f32::INFINITY` when nothing is marked.
pub(crate) fn distance_transform(width: usize, height: usize, mask: &[bool]) -> Vec<f32> {
    const ORTHO: f32 = 1.0;
    const DIAG: f32 = std::f32::consts::SQRT_2;

    let mut dist: Vec<f32> = mask
        .iter()
        .map(|&marked| if marked { 0.0 } else { f32::INFINITY })
        .collect();
    if width == 0 || height == 0 {
        return dist;
    }
    let at = |row: usize, col: usize| row * width + col;

    for row in 0..height {
        for col in 0..width {
            let mut best = dist[at(row, col)];
            if col > 0 {
                best = best.min(dist[at(row, col - 1)] + ORTHO);
            }
            if row > 0 {
                best = best.min(dist[at(row - 1, col)] + ORTHO);
                if col > 0 {
                    best = best.min(dist[at(row - 1, col - 1)] + DIAG);
                }
                if col + 1 < width {
                    best = best.min(dist[at(row - 1, col + 1)] + DIAG);
                }
            }
            dist[at(row, col)] = best;
        }
    }

    for row in (0..height).rev() {
        for col in (0..width).rev() {
            let mut best = dist[at(row, col)];
            if col + 1 < width {
                best = best.min(dist[at(row, col + 1)] + ORTHO);
            }
            if row + 1 < height {
                best = best.min(dist[at(row + 1, col)] + ORTHO);
                if col + 1 < width {
                    best = best.min(dist[at(row + 1, col + 1)] + DIAG);
                }
                if col > 0 {
                    best = best.min(dist[at(row + 1, col - 1)] + DIAG);
                }
            }
            dist[at(row, col)] = best;
        }
    }
    dist
}

/// `1 + (max - 1) * exp(-d / decay)`; 1.0 far away, `max` on the feature.
pub(crate) fn decayed_attraction(distance_m: f64, max_multiplier: f64, decay_m: f64) -> f64 {
    if !distance_m.is_finite() || max_multiplier <= 1.0 {
        return 1.0;
    }
    1.0 + (max_multiplier - 1.0) * (-distance_m / decay_m.max(1.0)).exp()
}

#[cfg(test)]
mod tests {
    use geo::{line_string, polygon};

    use super::*;

    fn grid() -> GridGeometry {
        GridGeometry::for_search(LatLon::new(46.0, 7.0), 1.0, 100.0)
    }

    #[test]
    fn default_features_are_empty() {
        let features = TerrainFeatures::default();
        assert!(features.is_empty());
        assert!(!features.has_trails() && !features.has_water());
        let source = StaticFeatures::default();
        assert!(source.features(&grid().bounds()).is_none());
    }

    #[test]
    fn line_marks_connected_cells() {
        let geometry = grid();
        let west = geometry.cell_center(10, 2);
        let east = geometry.cell_center(10, 18);
        let lines = MultiLineString::new(vec![line_string![
            (x: west.lon, y: west.lat),
            (x: east.lon, y: east.lat),
        ]]);
        let mask = rasterize_lines(&geometry, &lines);
        for col in 2..=18 {
            assert!(mask[geometry.index(10, col)], "col {col} missing");
        }
        assert_eq!(mask.iter().filter(|&&m| m).count(), 17);
    }

    #[test]
    fn polygon_covers_interior_cells_only() {
        let geometry = grid();
        let nw = geometry.cell_center(4, 4);
        let se = geometry.cell_center(8, 8);
        let pad_lat = geometry.lat_step.abs() / 2.0;
        let pad_lon = geometry.lon_step / 2.0;
        let poly = polygon![
            (x: nw.lon - pad_lon, y: nw.lat + pad_lat),
            (x: se.lon + pad_lon, y: nw.lat + pad_lat),
            (x: se.lon + pad_lon, y: se.lat - pad_lat),
            (x: nw.lon - pad_lon, y: se.lat - pad_lat),
        ];
        let mask = rasterize_polygons(&geometry, [&poly]);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 25);
        assert!(mask[geometry.index(6, 6)]);
        assert!(!mask[geometry.index(3, 6)]);

        let density = rasterize_density(&geometry, &[(poly, 0.8)]);
        assert!((density[geometry.index(5, 5)] - 0.8).abs() < 1e-6);
        assert_eq!(density[geometry.index(0, 0)], 0.0);
    }

    #[test]
    fn chamfer_distance_from_single_seed() {
        let mut mask = vec![false; 25];
        mask[12] = true;
        let dist = distance_transform(5, 5, &mask);
        assert_eq!(dist[12], 0.0);
        assert_eq!(dist[13], 1.0);
        assert!((dist[18] - std::f32::consts::SQRT_2).abs() < 1e-6);
        assert!((dist[0] - 2.0 * std::f32::consts::SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn empty_mask_is_infinitely_far() {
        let dist = distance_transform(3, 3, &[false; 9]);
        assert!(dist.iter().all(|d| d.is_infinite()));
        assert_eq!(decayed_attraction(f64::INFINITY, 4.0, 250.0), 1.0);
    }

    #[test]
    fn attraction_decays_with_distance() {
        assert_eq!(decayed_attraction(0.0, 4.0, 250.0), 4.0);
        let near = decayed_attraction(100.0, 4.0, 250.0);
        let far = decayed_attraction(1000.0, 4.0, 250.0);
        assert!(near > far && far > 1.0);
    }
}
