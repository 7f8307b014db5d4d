//! Equirectangular grid geometry around a search center.
//!
//! Good enough at search-area scale; no projection library is involved.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Mean Earth radius (IUGG).
pub const MEAN_EARTH_RADIUS_KM: f64 = 6371.0088;
pub const METERS_PER_DEGREE_LAT: f64 = MEAN_EARTH_RADIUS_KM * 1000.0 * PI / 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl From<LatLon> for sar_schema::LatLon {
    fn from(value: LatLon) -> Self {
        sar_schema::LatLon {
            lat: value.lat,
            lon: value.lon,
        }
    }
}

pub fn meters_per_degree_lon(lat: f64) -> f64 {
    METERS_PER_DEGREE_LAT * lat.to_radians().cos()
}

/// Great-circle distance on the mean sphere.
pub fn haversine_km(a: LatLon, b: LatLon) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * MEAN_EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl GeoBounds {
    pub fn contains(&self, point: LatLon) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lon >= self.west
            && point.lon <= self.east
    }
}

/// Maps grid cells to coordinates. Row 0 is the north edge, column 0 the west edge;
/// cell `(height / 2, width / 2)` sits on `origin`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    pub origin: LatLon,
    pub width: usize,
    pub height: usize,
    pub cell_size_m: f64,
    /// Degrees per row, negative so rows run southward.
    pub lat_step: f64,
    pub lon_step: f64,
}

impl GridGeometry {
    /// Square, odd-sized grid covering `radius_km` on every side of `center`.
    pub fn for_search(center: LatLon, radius_km: f64, resolution_m: f64) -> Self {
        let cells = Self::side_for(radius_km, resolution_m);
        Self::new(center, cells, cells, resolution_m)
    }

    /// Side length in cells of the grid [`for_search`](Self::for_search) lays out.
    pub fn side_for(radius_km: f64, resolution_m: f64) -> usize {
        let span = (2.0 * radius_km * 1000.0 / resolution_m).ceil().max(1.0) as usize;
        span | 1
    }

    pub fn new(origin: LatLon, width: usize, height: usize, cell_size_m: f64) -> Self {
        let lon_meters = meters_per_degree_lon(origin.lat).max(1.0);
        Self {
            origin,
            width,
            height,
            cell_size_m,
            lat_step: -cell_size_m / METERS_PER_DEGREE_LAT,
            lon_step: cell_size_m / lon_meters,
        }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.height && col < self.width);
        row * self.width + col
    }

    #[inline]
    pub fn contains(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.height && (col as usize) < self.width
    }

    pub fn center_cell(&self) -> (usize, usize) {
        (self.height / 2, self.width / 2)
    }

    pub fn cell_center(&self, row: usize, col: usize) -> LatLon {
        let row_offset = row as f64 - (self.height / 2) as f64;
        let col_offset = col as f64 - (self.width / 2) as f64;
        LatLon::new(
            self.origin.lat + row_offset * self.lat_step,
            self.origin.lon + col_offset * self.lon_step,
        )
    }

    /// Fractional (row, col) of a coordinate; may fall outside the grid.
    pub fn fractional_cell(&self, point: LatLon) -> (f64, f64) {
        let row = (point.lat - self.origin.lat) / self.lat_step + (self.height / 2) as f64;
        let col = (point.lon - self.origin.lon) / self.lon_step + (self.width / 2) as f64;
        (row, col)
    }

    pub fn cell_for(&self, point: LatLon) -> Option<(usize, usize)> {
        let (row, col) = self.fractional_cell(point);
        let (row, col) = (row.round() as isize, col.round() as isize);
        self.contains(row, col).then(|| (row as usize, col as usize))
    }

    /// Nearest cell, clamped onto the grid.
    pub fn nearest_cell(&self, point: LatLon) -> (usize, usize) {
        let (row, col) = self.fractional_cell(point);
        let row = row.round().clamp(0.0, self.height.saturating_sub(1) as f64) as usize;
        let col = col.round().clamp(0.0, self.width.saturating_sub(1) as f64) as usize;
        (row, col)
    }

    /// Outer edges of the grid (cell borders, not centers).
    pub fn bounds(&self) -> GeoBounds {
        let north_west = self.cell_center(0, 0);
        let south_east =
            self.cell_center(self.height.saturating_sub(1), self.width.saturating_sub(1));
        GeoBounds {
            north: north_west.lat - self.lat_step / 2.0,
            south: south_east.lat + self.lat_step / 2.0,
            west: north_west.lon - self.lon_step / 2.0,
            east: south_east.lon + self.lon_step / 2.0,
        }
    }

    pub fn metadata(&self) -> sar_schema::GridMetadata {
        sar_schema::GridMetadata {
            width: self.width as u32,
            height: self.height as u32,
            cell_size_m: self.cell_size_m,
            origin_lat: self.origin.lat,
            origin_lon: self.origin.lon,
            lat_step_deg: self.lat_step,
            lon_step_deg: self.lon_step,
        }
    }
}
