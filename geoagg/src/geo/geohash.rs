//! Geohash encoding and decoding.

use super::bbox::BoundingBox;
use super::geometry::GeoPoint;
use crate::error::{Error, Result};

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Longest geohash the engine aggregates on.
pub const MAX_PRECISION: usize = 12;

fn decode_char(c: char) -> Option<u8> {
    if !c.is_ascii() {
        return None;
    }
    let lower = c.to_ascii_lowercase() as u8;
    BASE32.iter().position(|&b| b == lower).map(|p| p as u8)
}

/// Decode a geohash to the box of the cell it names. A leading `#` is ignored.
pub fn decode_bbox(hash: &str) -> Result<BoundingBox> {
    let hash = hash.strip_prefix('#').unwrap_or(hash);
    if hash.is_empty() || hash.chars().count() > MAX_PRECISION {
        return Err(Error::invalid(
            "geohash",
            format!(
                "'{}' must be between 1 and {} characters long",
                hash, MAX_PRECISION
            ),
        ));
    }

    let (mut west, mut east) = (-180.0f64, 180.0f64);
    let (mut south, mut north) = (-90.0f64, 90.0f64);
    let mut even = true;

    for c in hash.chars() {
        let bits = decode_char(c).ok_or_else(|| {
            Error::invalid("geohash", format!("'{}' is not a geohash character", c))
        })?;
        for shift in (0..5).rev() {
            let bit = (bits >> shift) & 1 == 1;
            if even {
                let mid = (west + east) / 2.0;
                if bit {
                    west = mid;
                } else {
                    east = mid;
                }
            } else {
                let mid = (south + north) / 2.0;
                if bit {
                    south = mid;
                } else {
                    north = mid;
                }
            }
            even = !even;
        }
    }

    Ok(BoundingBox {
        west,
        south,
        east,
        north,
    })
}

/// Centre of the cell named by `hash`.
pub fn decode_center(hash: &str) -> Result<GeoPoint> {
    Ok(decode_bbox(hash)?.center())
}

/// Encode a point at the given precision (clamped to `1..=12`).
pub fn encode(point: &GeoPoint, precision: usize) -> String {
    let precision = precision.clamp(1, MAX_PRECISION);
    let (mut west, mut east) = (-180.0f64, 180.0f64);
    let (mut south, mut north) = (-90.0f64, 90.0f64);
    let mut even = true;
    let mut out = String::with_capacity(precision);
    let mut bits = 0u8;
    let mut count = 0;

    while out.len() < precision {
        if even {
            let mid = (west + east) / 2.0;
            if point.lon >= mid {
                bits = (bits << 1) | 1;
                west = mid;
            } else {
                bits <<= 1;
                east = mid;
            }
        } else {
            let mid = (south + north) / 2.0;
            if point.lat >= mid {
                bits = (bits << 1) | 1;
                south = mid;
            } else {
                bits <<= 1;
                north = mid;
            }
        }
        even = !even;
        count += 1;
        if count == 5 {
            out.push(BASE32[bits as usize] as char);
            bits = 0;
            count = 0;
        }
    }
    out
}

/// Longest geohash whose cell fully contains `bbox`; empty when no single
/// cell does (the box straddles a first-level cell border).
pub fn covering_prefix(bbox: &BoundingBox) -> String {
    let sw = encode(&GeoPoint::new(bbox.south, bbox.west), MAX_PRECISION);
    let mut prefix = String::new();
    for len in 1..=MAX_PRECISION {
        let candidate = &sw[..len];
        match decode_bbox(candidate) {
            Ok(cell) if cell.contains_box(bbox) => prefix = candidate.to_string(),
            _ => break,
        }
    }
    prefix
}
