//! Engine search response, read only as far as aggregations need.

use crate::error::{Error, Result};
use crate::geo::{BoundingBox, GeoPoint};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub hits: Hits,
    #[serde(default)]
    pub aggregations: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: TotalHits,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    #[serde(default = "default_relation")]
    pub relation: String,
}

fn default_relation() -> String {
    "eq".to_string()
}

/// A multi-bucket aggregation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketAggregation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_other_doc_count: Option<u64>,
    pub buckets: Vec<EngineBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineBucket {
    pub key: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_as_string: Option<String>,
    pub doc_count: u64,
    /// Sub-aggregation results by name.
    #[serde(flatten)]
    pub sub: Map<String, Value>,
}

fn malformed(message: String) -> Error {
    Error::BackendUnavailable(format!("malformed engine response: {}", message))
}

fn bucket_aggregation(name: &str, value: Option<&Value>) -> Result<BucketAggregation> {
    let value = value.ok_or_else(|| malformed(format!("aggregation '{}' is missing", name)))?;
    BucketAggregation::deserialize(value)
        .map_err(|e| malformed(format!("aggregation '{}' has no usable buckets: {}", name, e)))
}

impl EngineResponse {
    pub fn total(&self) -> u64 {
        self.hits.total.value
    }

    /// Top-level bucket aggregation `name`.
    pub fn bucket_aggregation(&self, name: &str) -> Result<BucketAggregation> {
        bucket_aggregation(name, self.aggregations.get(name))
    }
}

impl EngineBucket {
    /// Nested bucket aggregation `name`.
    pub fn bucket_aggregation(&self, name: &str) -> Result<BucketAggregation> {
        bucket_aggregation(name, self.sub.get(name))
    }

    /// Single-value metric. `Ok(None)` when the engine returned `null`.
    pub fn metric_value(&self, name: &str) -> Result<Option<f64>> {
        let metric = self
            .sub
            .get(name)
            .ok_or_else(|| malformed(format!("metric '{}' is missing", name)))?;
        match metric.get("value") {
            Some(Value::Null) | None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| malformed(format!("metric '{}' is not a number", name))),
        }
    }

    /// Result of a `geo_centroid` sub-aggregation. `None` for empty buckets.
    pub fn centroid(&self, name: &str) -> Result<Option<GeoPoint>> {
        let metric = self
            .sub
            .get(name)
            .ok_or_else(|| malformed(format!("centroid '{}' is missing", name)))?;
        match metric.get("location") {
            None | Some(Value::Null) => Ok(None),
            Some(location) => GeoPoint::from_value(location)
                .map(Some)
                .ok_or_else(|| malformed(format!("centroid '{}' has no location", name))),
        }
    }

    /// Result of a `geo_bounds` sub-aggregation. `None` for empty buckets.
    pub fn bounds(&self, name: &str) -> Result<Option<BoundingBox>> {
        let metric = self
            .sub
            .get(name)
            .ok_or_else(|| malformed(format!("bounds '{}' is missing", name)))?;
        let Some(bounds) = metric.get("bounds") else {
            return Ok(None);
        };
        let corner = |key: &str| bounds.get(key).and_then(GeoPoint::from_value);
        match (corner("top_left"), corner("bottom_right")) {
            (Some(tl), Some(br)) => Ok(Some(BoundingBox {
                west: tl.lon,
                south: br.lat,
                east: br.lon,
                north: tl.lat,
            })),
            _ => Err(malformed(format!("bounds '{}' lack corners", name))),
        }
    }
}
