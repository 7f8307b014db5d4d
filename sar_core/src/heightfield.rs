//! Deterministic stand-in elevation used when no raster tile is available.

use crate::{
    config::TerrainConfig,
    geometry::{meters_per_degree_lon, LatLon, METERS_PER_DEGREE_LAT},
    tiles::TileId,
};

/// Fractal value-noise terrain. Seeded from the containing tile so overlapping
/// search areas see the same hills.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticElevation {
    seed: u32,
    base_m: f64,
    relief_m: f64,
    feature_scale_m: f64,
}

impl SyntheticElevation {
    pub fn for_area(center: LatLon, config: &TerrainConfig) -> Self {
        let tile = TileId::containing(center.lat, center.lon);
        Self {
            seed: mix_seed(0x9E37_0001, tile.lat, tile.lon),
            base_m: config.synthetic_base_elevation_m,
            relief_m: config.synthetic_relief_m.max(0.0),
            feature_scale_m: config.synthetic_feature_scale_m.max(1.0),
        }
    }

    fn is_flat(&self) -> bool {
        self.relief_m == 0.0
    }

    pub fn sample(&self, point: LatLon) -> f64 {
        if self.is_flat() {
            return self.base_m;
        }
        let x = point.lon * meters_per_degree_lon(point.lat) / self.feature_scale_m;
        let y = point.lat * METERS_PER_DEGREE_LAT / self.feature_scale_m;

        let rolling = fbm_noise(x, y, 4, 2.0, 0.5, self.seed);
        let ridge_source = fbm_noise(x * 2.3, y * 2.3, 3, 2.1, 0.45, self.seed ^ 0xC0F3_0001);
        let ridged = (1.0 - (ridge_source - 0.5).abs() * 2.0)
            .clamp(0.0, 1.0)
            .powf(1.6);

        self.base_m + self.relief_m * (rolling * 0.75 + ridged * 0.25)
    }
}

fn fbm_noise(x: f64, y: f64, octaves: u32, lacunarity: f64, gain: f64, seed: u32) -> f64 {
    let mut frequency = 1.0;
    let mut amplitude = 1.0;
    let mut sum = 0.0;
    let mut normaliser = 0.0;
    for i in 0..octaves {
        sum += value_noise(x * frequency, y * frequency, seed.wrapping_add(i)) * amplitude;
        normaliser += amplitude;
        frequency *= lacunarity;
        amplitude *= gain;
    }
    (sum / normaliser).clamp(0.0, 1.0)
}

fn value_noise(x: f64, y: f64, seed: u32) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let xf = x - x0;
    let yf = y - y0;
    let (xi, yi) = (x0 as i64, y0 as i64);

    let v00 = hash2(xi, yi, seed);
    let v10 = hash2(xi + 1, yi, seed);
    let v01 = hash2(xi, yi + 1, seed);
    let v11 = hash2(xi + 1, yi + 1, seed);

    let i1 = lerp(v00, v10, smooth_step(xf));
    let i2 = lerp(v01, v11, smooth_step(xf));
    lerp(i1, i2, smooth_step(yf))
}

fn smooth_step(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn hash2(x: i64, y: i64, seed: u32) -> f64 {
    let mut n = x as u32;
    n = n.wrapping_mul(0x6C8E_9CF5) ^ (y as u32).wrapping_mul(0xB529_7A4D) ^ seed;
    n ^= n >> 13;
    n = n.wrapping_mul(0x1B56_C4E9);
    n ^= n >> 11;
    f64::from((n >> 8) & 0xFFFF) / 65535.0
}

fn mix_seed(base: u32, lat: i32, lon: i32) -> u32 {
    base ^ (lat as u32).rotate_left(7) ^ (lon as u32).rotate_left(19)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_is_deterministic_and_bounded() {
        let config = TerrainConfig::default();
        let center = LatLon::new(51.1784, -115.5708);
        let a = SyntheticElevation::for_area(center, &config);
        let b = SyntheticElevation::for_area(LatLon::new(51.9, -115.1), &config);
        assert_eq!(a, b);
        for step in 0..50 {
            let point = LatLon::new(center.lat + step as f64 * 0.001, center.lon);
            let h = a.sample(point);
            assert_eq!(h, b.sample(point));
            assert!(h >= config.synthetic_base_elevation_m);
            assert!(h <= config.synthetic_base_elevation_m + config.synthetic_relief_m);
        }
    }

    #[test]
    fn synthetic_has_relief() {
        let field = SyntheticElevation::for_area(LatLon::new(46.0, 7.5), &TerrainConfig::default());
        let samples: Vec<f64> = (0..40)
            .map(|i| field.sample(LatLon::new(46.0 + i as f64 * 0.01, 7.5)))
            .collect();
        let min = samples.iter().copied().fold(f64::MAX, f64::min);
        let max = samples.iter().copied().fold(f64::MIN, f64::max);
        assert!(max - min > 1.0);
    }

    #[test]
    fn flat_field_is_constant() {
        let config = TerrainConfig {
            synthetic_base_elevation_m: 300.0,
            synthetic_relief_m: 0.0,
            ..TerrainConfig::default()
        };
        let field = SyntheticElevation::for_area(LatLon::new(46.0, 7.5), &config);
        assert_eq!(field.sample(LatLon::new(0.0, 0.0)), 300.0);
        assert_eq!(field.sample(LatLon::new(60.0, 100.0)), 300.0);
    }
}
