//! Geo-tiling arithmetic: XYZ tiles, geohash cells and bounding boxes.
//!
//! Everything here is a pure function of its inputs and has no knowledge of
//! aggregation requests or responses.

pub mod bbox;
pub mod geohash;
pub mod geometry;
pub mod tile;

pub use bbox::BoundingBox;
pub use geometry::{GeoPoint, Geometry};
pub use tile::{tile_to_bbox, Tile};

use crate::error::Result;

/// Intersect `bbox` with every pwithin OR-group in turn.
///
/// Each group is reduced to the envelope of its boxes first. Returns `None`
/// as soon as the running box becomes empty.
pub fn restrict_to_pwithin(bbox: BoundingBox, groups: &[Vec<BoundingBox>]) -> Option<BoundingBox> {
    groups.iter().try_fold(bbox, |acc, group| match BoundingBox::envelope(group) {
        Some(env) => acc.intersect(&env),
        None => Some(acc),
    })
}

/// Default descriptor for a geo-aggregation addressed by geohash.
pub fn default_geohash_descriptor(centroid_path: &str, precision: usize) -> String {
    format!("geohash:{}:interval-{}", centroid_path, precision)
}

/// Box of a geohash-addressed request, narrowed by pwithin groups.
pub fn geohash_request_bbox(hash: &str, groups: &[Vec<BoundingBox>]) -> Result<Option<BoundingBox>> {
    Ok(restrict_to_pwithin(geohash::decode_bbox(hash)?, groups))
}
