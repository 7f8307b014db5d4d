use super::{ElevationError, TileId};

/// Void marker used by SRTM `.hgt` files.
pub const HGT_VOID: i16 = -32768;

/// Square elevation raster covering one tile. Row 0 is the north edge, column 0
/// the west edge; the outermost rows/columns sit exactly on the tile borders.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTile {
    id: TileId,
    size: usize,
    samples: Vec<f32>,
    void_count: usize,
}

impl RasterTile {
    /// Decode big-endian `i16` samples. Voids are filled with the tile's mean valid height.
    pub fn from_hgt_bytes(id: TileId, bytes: &[u8]) -> Result<Self, ElevationError> {
        if bytes.len() % 2 != 0 {
            return Err(invalid(id, format!("odd byte length {}", bytes.len())));
        }
        let count = bytes.len() / 2;
        let size = (count as f64).sqrt().round() as usize;
        if size < 2 || size * size != count {
            return Err(invalid(id, format!("{count} samples do not form a square raster")));
        }

        let raw: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        let (sum, valid) = raw
            .iter()
            .filter(|&&value| value != HGT_VOID)
            .fold((0.0f64, 0usize), |(sum, n), &value| (sum + f64::from(value), n + 1));
        if valid == 0 {
            return Err(invalid(id, "raster holds only void samples".to_string()));
        }
        let fill = (sum / valid as f64) as f32;

        let samples = raw
            .iter()
            .map(|&value| if value == HGT_VOID { fill } else { f32::from(value) })
            .collect();

        Ok(Self {
            id,
            size,
            samples,
            void_count: count - valid,
        })
    }

    pub fn from_samples(
        id: TileId,
        size: usize,
        samples: Vec<f32>,
    ) -> Result<Self, ElevationError> {
        if size < 2 || samples.len() != size * size {
            return Err(invalid(
                id,
                format!("{} samples for a {size}x{size} raster", samples.len()),
            ));
        }
        Ok(Self {
            id,
            size,
            samples,
            void_count: 0,
        })
    }

    /// Encode back to `.hgt` bytes (heights rounded to whole meters).
    pub fn to_hgt_bytes(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|&value| (value.round() as i16).to_be_bytes())
            .collect()
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn void_count(&self) -> usize {
        self.void_count
    }

    #[inline]
    fn at(&self, row: usize, col: usize) -> f64 {
        f64::from(self.samples[row * self.size + col])
    }

    fn fractional(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        if !self.id.contains(lat, lon) {
            return None;
        }
        let span = (self.size - 1) as f64;
        Some(((self.id.north() - lat) * span, (lon - self.id.west()) * span))
    }

    pub fn sample_nearest(&self, lat: f64, lon: f64) -> Option<f64> {
        let (row, col) = self.fractional(lat, lon)?;
        Some(self.at(row.round() as usize, col.round() as usize))
    }

    /// Bilinear interpolation between the four surrounding posts.
    pub fn sample_bilinear(&self, lat: f64, lon: f64) -> Option<f64> {
        let (row, col) = self.fractional(lat, lon)?;
        let last = self.size - 1;
        let r0 = (row.floor() as usize).min(last);
        let c0 = (col.floor() as usize).min(last);
        let r1 = (r0 + 1).min(last);
        let c1 = (c0 + 1).min(last);
        let fr = row - r0 as f64;
        let fc = col - c0 as f64;

        let top = self.at(r0, c0) * (1.0 - fc) + self.at(r0, c1) * fc;
        let bottom = self.at(r1, c0) * (1.0 - fc) + self.at(r1, c1) * fc;
        Some(top * (1.0 - fr) + bottom * fr)
    }
}

fn invalid(tile: TileId, reason: String) -> ElevationError {
    ElevationError::InvalidRaster { tile, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn decodes_big_endian_square_raster() {
        let tile = TileId::new(10, 20);
        let bytes = encode(&[100, 200, 300, 400]);
        let raster = RasterTile::from_hgt_bytes(tile, &bytes).expect("valid");
        assert_eq!(raster.size(), 2);
        // north-west post
        assert_eq!(raster.sample_nearest(11.0, 20.0), Some(100.0));
        // south-east post
        assert_eq!(raster.sample_nearest(10.0, 21.0), Some(400.0));
    }

    #[test]
    fn bilinear_interpolates_between_posts() {
        let tile = TileId::new(10, 20);
        let bytes = encode(&[100, 200, 300, 400]);
        let raster = RasterTile::from_hgt_bytes(tile, &bytes).expect("valid");
        let center = raster.sample_bilinear(10.5, 20.5).expect("inside");
        assert!((center - 250.0).abs() < 1e-9);
        assert_eq!(raster.sample_bilinear(12.0, 20.5), None);
    }

    #[test]
    fn voids_are_filled_with_mean() {
        let tile = TileId::new(0, 0);
        let raster =
            RasterTile::from_hgt_bytes(tile, &encode(&[10, HGT_VOID, 20, 30])).expect("valid");
        assert_eq!(raster.void_count(), 1);
        assert_eq!(raster.sample_nearest(1.0, 1.0), Some(20.0));
    }

    #[test]
    fn rejects_malformed_rasters() {
        let tile = TileId::new(0, 0);
        assert!(RasterTile::from_hgt_bytes(tile, &[0, 1, 2]).is_err());
        assert!(RasterTile::from_hgt_bytes(tile, &encode(&[1, 2, 3])).is_err());
        assert!(RasterTile::from_hgt_bytes(tile, &encode(&[HGT_VOID; 4])).is_err());
    }

    #[test]
    fn hgt_encoding_round_trips_whole_meters() {
        let tile = TileId::new(51, -116);
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let raster = RasterTile::from_samples(tile, 3, samples).expect("valid");
        let decoded = RasterTile::from_hgt_bytes(tile, &raster.to_hgt_bytes()).expect("decode");
        assert_eq!(decoded, raster);
    }
}
