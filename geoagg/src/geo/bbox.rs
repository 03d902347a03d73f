use super::geometry::{GeoPoint, Geometry};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Axis-aligned lon/lat box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Build a box, checking coordinate ranges and ordering.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        for (name, lon) in [("west", west), ("east", east)] {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(Error::invalid(
                    name,
                    format!("longitude {} must be within [-180, 180]", lon),
                ));
            }
        }
        for (name, lat) in [("south", south), ("north", north)] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(Error::invalid(
                    name,
                    format!("latitude {} must be within [-90, 90]", lat),
                ));
            }
        }
        if south >= north {
            return Err(Error::invalid(
                "south",
                format!("south {} must be lower than north {}", south, north),
            ));
        }
        if west >= east {
            return Err(Error::invalid(
                "west",
                format!("west {} must be lower than east {}", west, east),
            ));
        }
        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    /// Whole-world box.
    pub fn world() -> Self {
        Self {
            west: -180.0,
            south: -90.0,
            east: 180.0,
            north: 90.0,
        }
    }

    /// Intersection of two boxes, `None` when they do not overlap.
    ///
    /// Touching boxes share only an edge and are treated as disjoint.
    pub fn intersect(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let west = self.west.max(other.west);
        let east = self.east.min(other.east);
        let south = self.south.max(other.south);
        let north = self.north.min(other.north);
        if west < east && south < north {
            Some(BoundingBox {
                west,
                south,
                east,
                north,
            })
        } else {
            None
        }
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            west: self.west.min(other.west),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            north: self.north.max(other.north),
        }
    }

    /// Envelope of a non-empty list of boxes.
    pub fn envelope<'a>(boxes: impl IntoIterator<Item = &'a BoundingBox>) -> Option<BoundingBox> {
        boxes
            .into_iter()
            .fold(None, |acc: Option<BoundingBox>, b| match acc {
                Some(acc) => Some(acc.union(b)),
                None => Some(*b),
            })
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lon >= self.west
            && point.lon <= self.east
            && point.lat >= self.south
            && point.lat <= self.north
    }

    /// True when `other` lies entirely inside this box.
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        other.west >= self.west
            && other.east <= self.east
            && other.south >= self.south
            && other.north <= self.north
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: (self.south + self.north) / 2.0,
            lon: (self.west + self.east) / 2.0,
        }
    }

    /// Closed GeoJSON polygon ring, counter-clockwise from the south-west corner.
    pub fn to_polygon(&self) -> Geometry {
        Geometry::Polygon {
            coordinates: vec![vec![
                [self.west, self.south],
                [self.east, self.south],
                [self.east, self.north],
                [self.west, self.north],
                [self.west, self.south],
            ]],
        }
    }
}

impl FromStr for BoundingBox {
    type Err = Error;

    /// Parses `west,south,east,north`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(Error::invalid(
                "pwithin",
                format!("'{}' is not a west,south,east,north box", s),
            ));
        }
        let mut coords = [0f64; 4];
        for (slot, part) in coords.iter_mut().zip(parts.iter()) {
            *slot = part.parse::<f64>().map_err(|_| {
                Error::invalid("pwithin", format!("'{}' is not a number in '{}'", part, s))
            })?;
        }
        BoundingBox::new(coords[0], coords[1], coords[2], coords[3])
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}
