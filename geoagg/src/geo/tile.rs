//! Web-Mercator XYZ tiles.

use super::bbox::BoundingBox;
use super::geohash;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const MIN_ZOOM: u32 = 0;
pub const MAX_ZOOM: u32 = 22;

/// Geohash precision added on top of a tile's covering prefix when a tile
/// request carries no explicit aggregation.
const TILE_PRECISION_OFFSET: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Tile {
    pub fn new(x: u32, y: u32, z: u32) -> Result<Self> {
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&z) {
            return Err(Error::invalid(
                "z",
                format!("zoom {} must be between {} and {}", z, MIN_ZOOM, MAX_ZOOM),
            ));
        }
        let n = 1u64 << z;
        if u64::from(x) >= n {
            return Err(Error::invalid(
                "x",
                format!("x {} is outside [0, {}) at zoom {}", x, n, z),
            ));
        }
        if u64::from(y) >= n {
            return Err(Error::invalid(
                "y",
                format!("y {} is outside [0, {}) at zoom {}", y, n, z),
            ));
        }
        Ok(Self { x, y, z })
    }

    pub fn bbox(&self) -> BoundingBox {
        let n = (1u64 << self.z) as f64;
        BoundingBox {
            west: tile_lon(self.x as f64, n),
            east: tile_lon(self.x as f64 + 1.0, n),
            north: tile_lat(self.y as f64, n),
            south: tile_lat(self.y as f64 + 1.0, n),
        }
    }

    /// Geohash precision used when the caller does not describe an aggregation.
    pub fn default_precision(&self) -> usize {
        (geohash::covering_prefix(&self.bbox()).len() + TILE_PRECISION_OFFSET)
            .clamp(1, geohash::MAX_PRECISION)
    }
}

fn tile_lon(x: f64, n: f64) -> f64 {
    x / n * 360.0 - 180.0
}

fn tile_lat(y: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

/// Bounding box of tile `x/y` at zoom `z`.
pub fn tile_to_bbox(x: u32, y: u32, z: u32) -> Result<BoundingBox> {
    Ok(Tile::new(x, y, z)?.bbox())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.1
    }

    #[test]
    fn test_zoom_zero_covers_mercator_world() {
        let b = tile_to_bbox(0, 0, 0).unwrap();
        assert_eq!(b.west, -180.0);
        assert_eq!(b.east, 180.0);
        assert!(approx(b.north, 85.05));
        assert!(approx(b.south, -85.05));
    }

    #[test]
    fn test_tile_z2() {
        let b = tile_to_bbox(2, 1, 2).unwrap();
        assert!(approx(b.west, 0.0));
        assert!(approx(b.east, 90.0));
        assert!(approx(b.south, 0.0));
        assert!(approx(b.north, 66.51));

        let b = tile_to_bbox(3, 0, 2).unwrap();
        assert!(approx(b.west, 90.0));
        assert!(approx(b.east, 180.0));
        assert!(approx(b.south, 66.51));
        assert!(approx(b.north, 85.05));
    }

    #[test]
    fn test_invalid_tiles() {
        assert!(tile_to_bbox(1, 0, 0).is_err());
        assert!(tile_to_bbox(0, 1, 0).is_err());
        assert!(tile_to_bbox(1, 0, 23).is_err());
        assert!(tile_to_bbox(4, 0, 2).is_err());
    }

    #[test]
    fn test_default_precision_grows_with_zoom() {
        let world = Tile::new(0, 0, 0).unwrap();
        assert_eq!(world.default_precision(), 2);

        let deep = Tile::new(4100, 2700, 13).unwrap();
        assert!(deep.default_precision() > world.default_precision());
        assert!(deep.default_precision() <= geohash::MAX_PRECISION);
    }
}
