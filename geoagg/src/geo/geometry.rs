use super::bbox::BoundingBox;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Read a point in any of the encodings the engine accepts for geo points:
    /// `"lat,lon"`, `{"lat": .., "lon": ..}` or `[lon, lat]`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => {
                let (lat, lon) = s.split_once(',')?;
                Some(Self {
                    lat: lat.trim().parse().ok()?,
                    lon: lon.trim().parse().ok()?,
                })
            }
            Value::Object(map) => Some(Self {
                lat: map.get("lat")?.as_f64()?,
                lon: map.get("lon")?.as_f64()?,
            }),
            Value::Array(items) if items.len() == 2 => Some(Self {
                lon: items[0].as_f64()?,
                lat: items[1].as_f64()?,
            }),
            _ => None,
        }
    }

    pub fn to_geometry(self) -> Geometry {
        Geometry::Point {
            coordinates: [self.lon, self.lat],
        }
    }
}

/// The subset of GeoJSON geometries used in filters and responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
    LineString { coordinates: Vec<[f64; 2]> },
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
}

impl Geometry {
    fn positions(&self) -> Vec<[f64; 2]> {
        match self {
            Geometry::Point { coordinates } => vec![*coordinates],
            Geometry::LineString { coordinates } => coordinates.clone(),
            Geometry::Polygon { coordinates } => coordinates.iter().flatten().copied().collect(),
        }
    }

    /// Bounding box of all positions. May be degenerate (a point or a
    /// horizontal line).
    pub fn bounds(&self) -> Option<BoundingBox> {
        let positions = self.positions();
        let first = positions.first()?;
        let init = BoundingBox {
            west: first[0],
            south: first[1],
            east: first[0],
            north: first[1],
        };
        Some(positions.iter().fold(init, |b, [lon, lat]| BoundingBox {
            west: b.west.min(*lon),
            south: b.south.min(*lat),
            east: b.east.max(*lon),
            north: b.north.max(*lat),
        }))
    }

    /// Read a GeoJSON geometry out of a document value.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_encodings() {
        let expected = GeoPoint::new(10.0, -20.0);
        assert_eq!(GeoPoint::from_value(&json!("10,-20")), Some(expected));
        assert_eq!(
            GeoPoint::from_value(&json!({"lat": 10.0, "lon": -20.0})),
            Some(expected)
        );
        assert_eq!(GeoPoint::from_value(&json!([-20.0, 10.0])), Some(expected));
        assert_eq!(GeoPoint::from_value(&json!("nope")), None);
        assert_eq!(GeoPoint::from_value(&json!(42)), None);
    }

    #[test]
    fn test_polygon_bounds() {
        let g: Geometry = serde_json::from_value(json!({
            "type": "Polygon",
            "coordinates": [[[9.0, 19.0], [11.0, 19.0], [11.0, 21.0], [9.0, 21.0], [9.0, 19.0]]]
        }))
        .unwrap();
        let b = g.bounds().unwrap();
        assert_eq!((b.west, b.south, b.east, b.north), (9.0, 19.0, 11.0, 21.0));
        assert_eq!(Geometry::from_value(&json!({"type": "Circle"})), None);
    }

    #[test]
    fn test_geometry_serializes_as_geojson() {
        let g = GeoPoint::new(1.5, 2.5).to_geometry();
        assert_eq!(
            serde_json::to_value(&g).unwrap(),
            json!({"type": "Point", "coordinates": [2.5, 1.5]})
        );
    }
}
