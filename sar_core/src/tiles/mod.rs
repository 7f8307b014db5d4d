//! Single-tile elevation rasters and their two-level cache.
//!
//! Tiles are 1°×1° SRTM-style `.hgt` rasters. A search area must fit inside one
//! tile; queries that would need stitching fail with
//! [`ElevationError::MultiTileSpan`] instead.

mod cache;
mod raster;
mod source;

use std::{fmt, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::MEAN_EARTH_RADIUS_KM;

pub use cache::{ElevationTileCache, TileCacheStats};
pub use raster::{RasterTile, HGT_VOID};
#[cfg(feature = "http-source")]
pub use source::HttpSource;
pub use source::{DirectorySource, ElevationSource};

/// Integer (lat-floor, lon-floor) identifier of a 1°×1° tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    pub lat: i32,
    pub lon: i32,
}

impl TileId {
    pub const fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    pub fn containing(lat: f64, lon: f64) -> Self {
        Self {
            lat: lat.floor() as i32,
            lon: lon.floor() as i32,
        }
    }

    pub fn south(&self) -> f64 {
        f64::from(self.lat)
    }

    pub fn north(&self) -> f64 {
        f64::from(self.lat) + 1.0
    }

    pub fn west(&self) -> f64 {
        f64::from(self.lon)
    }

    pub fn east(&self) -> f64 {
        f64::from(self.lon) + 1.0
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south() && lat <= self.north() && lon >= self.west() && lon <= self.east()
    }

    /// SRTM file stem, e.g. `N51W116`.
    pub fn file_stem(&self) -> String {
        let ns = if self.lat >= 0 { 'N' } else { 'S' };
        let ew = if self.lon >= 0 { 'E' } else { 'W' };
        format!("{ns}{:02}{ew}{:03}", self.lat.unsigned_abs(), self.lon.unsigned_abs())
    }

    pub fn file_name(&self) -> String {
        format!("{}.hgt", self.file_stem())
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_stem())
    }
}

/// Largest search radius around `(lat, lon)` that stays inside the containing tile.
///
/// Takes the great-circle distance to each of the four tile edges (parallels along
/// the meridian, meridians along the perpendicular great circle) and scales the
/// smallest by `margin`, which must be below 1 for the result to stay strictly
/// inside the tile.
pub fn max_safe_radius_km(lat: f64, lon: f64, margin: f64) -> f64 {
    let tile = TileId::containing(lat, lon);
    let cos_lat = lat.to_radians().cos();
    let to_parallel = |dlat: f64| MEAN_EARTH_RADIUS_KM * dlat.to_radians();
    let to_meridian = |dlon: f64| {
        MEAN_EARTH_RADIUS_KM * (cos_lat * dlon.to_radians().sin()).clamp(-1.0, 1.0).asin()
    };

    let nearest_edge = [
        to_parallel(tile.north() - lat),
        to_parallel(lat - tile.south()),
        to_meridian(lon - tile.west()),
        to_meridian(tile.east() - lon),
    ]
    .into_iter()
    .fold(f64::INFINITY, f64::min);

    (nearest_edge * margin).max(0.0)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElevationError {
    #[error("elevation tile {tile} unavailable: {reason}")]
    TileUnavailable { tile: TileId, reason: String },
    #[error(
        "search radius {requested_km:.2} km does not fit inside elevation tile {tile}; \
         max safe radius here is {max_safe_km:.2} km"
    )]
    MultiTileSpan {
        tile: TileId,
        requested_km: f64,
        max_safe_km: f64,
    },
    #[error("invalid elevation raster for tile {tile}: {reason}")]
    InvalidRaster { tile: TileId, reason: String },
}

/// Failures reported by an [`ElevationSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("tile {tile} not found at source")]
    NotFound { tile: TileId },
    #[error("failed to read tile {tile} from {path:?}: {source}")]
    Read {
        tile: TileId,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("remote fetch for tile {tile} failed: {message}")]
    Remote { tile: TileId, message: String },
}
