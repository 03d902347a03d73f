//! Engine bucket responses → [`AggregationResponse`] trees.

use crate::aggregations::{Aggregation, AggregationType, MetricFunction};
use crate::engine::builder::{aggregation_name, GEOBBOX_BUCKET, GEOCENTROID_BUCKET};
use crate::engine::{BucketAggregation, EngineBucket, EngineResponse};
use crate::error::{Error, Result};
use crate::geo::{geohash, Geometry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One node of the result tree. The root carries `name`, `totalnb` and
/// `queryTime`; every other node is a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(default, rename = "keyAsString", skip_serializing_if = "Option::is_none")]
    pub key_as_string: Option<String>,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totalnb: Option<u64>,
    #[serde(default, rename = "queryTime", skip_serializing_if = "Option::is_none")]
    pub query_time: Option<u64>,
    #[serde(default, rename = "sumOtherDocCount", skip_serializing_if = "Option::is_none")]
    pub sum_other_doc_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Geometry>,
    #[serde(default, rename = "BBOX", skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Geometry>,
    #[serde(default)]
    pub elements: Vec<AggregationElement>,
}

/// Metric results come first, nested buckets after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregationElement {
    Metric(AggregationMetric),
    Bucket(AggregationResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationMetric {
    /// Metric kind (`avg`, `sum`, ...).
    #[serde(rename = "type")]
    pub metric_type: String,
    pub field: String,
    pub value: Option<f64>,
}

impl AggregationResponse {
    fn bucket(key: Value, key_as_string: Option<String>, count: u64) -> Self {
        Self {
            name: None,
            key: Some(key),
            key_as_string,
            count,
            totalnb: None,
            query_time: None,
            sum_other_doc_count: None,
            centroid: None,
            bbox: None,
            elements: Vec::new(),
        }
    }

    /// Child buckets, skipping metric elements.
    pub fn buckets(&self) -> impl Iterator<Item = &AggregationResponse> {
        self.elements.iter().filter_map(|e| match e {
            AggregationElement::Bucket(b) => Some(b),
            AggregationElement::Metric(_) => None,
        })
    }

    pub fn metrics(&self) -> impl Iterator<Item = &AggregationMetric> {
        self.elements.iter().filter_map(|e| match e {
            AggregationElement::Metric(m) => Some(m),
            AggregationElement::Bucket(_) => None,
        })
    }

    /// Number of bucket levels below this node.
    pub fn depth(&self) -> usize {
        self.buckets().map(|b| 1 + b.depth()).max().unwrap_or(0)
    }
}

/// Rebuild the result tree for `pipeline` out of `engine`.
pub fn format_response(
    pipeline: &[Aggregation],
    engine: &EngineResponse,
    query_time: u64,
) -> Result<AggregationResponse> {
    let (first, rest) = pipeline
        .split_first()
        .ok_or_else(|| Error::BadRequest("at least one aggregation must be specified".to_string()))?;
    let top = engine.bucket_aggregation(aggregation_name(first))?;

    Ok(AggregationResponse {
        name: Some(first.agg_type.to_string()),
        key: None,
        key_as_string: None,
        count: engine.total(),
        totalnb: Some(engine.total()),
        query_time: Some(query_time),
        sum_other_doc_count: top.sum_other_doc_count,
        centroid: None,
        bbox: None,
        elements: format_buckets(first, rest, &top)?,
    })
}

fn format_buckets(
    agg: &Aggregation,
    rest: &[Aggregation],
    aggregation: &BucketAggregation,
) -> Result<Vec<AggregationElement>> {
    aggregation
        .buckets
        .iter()
        .map(|b| format_bucket(agg, rest, b).map(AggregationElement::Bucket))
        .collect()
}

fn format_bucket(agg: &Aggregation, rest: &[Aggregation], bucket: &EngineBucket) -> Result<AggregationResponse> {
    let mut node = match agg.agg_type {
        AggregationType::Geohash => {
            let hash = bucket
                .key
                .as_str()
                .ok_or_else(|| Error::BackendUnavailable(format!("geohash bucket key {} is not a string", bucket.key)))?;
            let center = geohash::decode_center(hash)
                .map_err(|e| Error::BackendUnavailable(format!("geohash bucket key: {}", e)))?;
            AggregationResponse::bucket(serde_json::to_value(center)?, Some(hash.to_string()), bucket.doc_count)
        }
        _ => {
            let key_as_string = bucket.key_as_string.clone().or_else(|| match &bucket.key {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            });
            AggregationResponse::bucket(bucket.key.clone(), key_as_string, bucket.doc_count)
        }
    };

    if let (Some(fct), Some(name)) = (agg.collect_fct, agg.metric_name()) {
        match fct {
            MetricFunction::Geocentroid => {
                node.centroid = bucket.centroid(name)?.map(|p| p.to_geometry());
            }
            MetricFunction::Geobbox => {
                node.bbox = bucket.bounds(name)?.map(|b| b.to_polygon());
            }
            _ => node.elements.push(AggregationElement::Metric(AggregationMetric {
                metric_type: name.to_string(),
                field: agg.collect_field.clone().unwrap_or_default(),
                value: bucket.metric_value(name)?,
            })),
        }
    }
    if agg.with_geo_centroid && node.centroid.is_none() {
        node.centroid = bucket.centroid(GEOCENTROID_BUCKET)?.map(|p| p.to_geometry());
    }
    if agg.with_geo_bbox && node.bbox.is_none() {
        node.bbox = bucket.bounds(GEOBBOX_BUCKET)?.map(|b| b.to_polygon());
    }

    if let Some((next, rest)) = rest.split_first() {
        let nested = bucket.bucket_aggregation(aggregation_name(next))?;
        node.elements.extend(format_buckets(next, rest, &nested)?);
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregations::parse_pipeline;
    use crate::collection::CollectionReference;
    use serde_json::json;

    fn pipeline(descriptors: &[&str]) -> Vec<Aggregation> {
        let mut c = CollectionReference::new("geodata", "dataset");
        c.centroid_path = "geo_params.centroid".to_string();
        c.timestamp_path = "params.startdate".to_string();
        parse_pipeline(descriptors, &c).unwrap()
    }

    fn engine(aggregations: Value) -> EngineResponse {
        serde_json::from_value(json!({
            "took": 1,
            "hits": {"total": {"value": 10}},
            "aggregations": aggregations
        }))
        .unwrap()
    }

    #[test]
    fn test_two_level_tree_keeps_engine_order() {
        let p = pipeline(&[
            "term:params.job:collect_field-params.startdate:collect_fct-sum",
            "geohash:geo_params.centroid:interval-1:collect_fct-geocentroid",
        ]);
        let e = engine(json!({"term": {
            "sum_other_doc_count": 3,
            "buckets": [
                {"key": "Dancer", "doc_count": 4, "sum": {"value": 40.0},
                 "geohash": {"buckets": [
                     {"key": "u", "doc_count": 3, "geocentroid": {"location": {"lat": 50.0, "lon": 10.0}, "count": 3}},
                     {"key": "s", "doc_count": 1, "geocentroid": {"location": {"lat": 1.0, "lon": 1.0}, "count": 1}}
                 ]}},
                {"key": "Actor", "doc_count": 3, "sum": {"value": 30.0},
                 "geohash": {"buckets": []}}
            ]
        }}));
        let tree = format_response(&p, &e, 7).unwrap();

        assert_eq!(tree.name.as_deref(), Some("term"));
        assert_eq!(tree.totalnb, Some(10));
        assert_eq!(tree.query_time, Some(7));
        assert_eq!(tree.sum_other_doc_count, Some(3));
        assert_eq!(tree.depth(), 2);

        let keys: Vec<_> = tree.buckets().map(|b| b.key_as_string.clone().unwrap()).collect();
        assert_eq!(keys, vec!["Dancer", "Actor"]);

        let dancer = tree.buckets().next().unwrap();
        assert!(matches!(&dancer.elements[0], AggregationElement::Metric(m) if m.metric_type == "sum" && m.value == Some(40.0)));
        let cells: Vec<_> = dancer.buckets().collect();
        assert_eq!(cells[0].key_as_string.as_deref(), Some("u"));
        assert_eq!(cells[0].key, Some(json!({"lat": 67.5, "lon": 22.5})));
        assert_eq!(
            cells[0].centroid,
            Some(Geometry::Point { coordinates: [10.0, 50.0] })
        );
        assert_eq!(cells[0].sum_other_doc_count, None);
    }

    #[test]
    fn test_bbox_from_bucket_flag() {
        let p = pipeline(&["geohash:geo_params.centroid:interval-1:withGeoBBOX"]);
        let e = engine(json!({"geohash": {"buckets": [
            {"key": "s", "doc_count": 2, "geobbox_bucket": {"bounds": {
                "top_left": {"lat": 20.0, "lon": 10.0},
                "bottom_right": {"lat": 10.0, "lon": 20.0}
            }}}
        ]}}));
        let tree = format_response(&p, &e, 0).unwrap();
        let cell = tree.buckets().next().unwrap();
        assert_eq!(
            cell.bbox,
            Some(Geometry::Polygon {
                coordinates: vec![vec![[10.0, 10.0], [20.0, 10.0], [20.0, 20.0], [10.0, 20.0], [10.0, 10.0]]]
            })
        );
        assert!(cell.elements.is_empty());
    }

    #[test]
    fn test_shape_mismatch_is_backend_unavailable() {
        let p = pipeline(&["term:params.job", "term:params.job"]);
        let e = engine(json!({"term": {"buckets": [{"key": "Coder", "doc_count": 1}]}}));
        assert!(matches!(
            format_response(&p, &e, 0),
            Err(Error::BackendUnavailable(_))
        ));

        let e = engine(json!({"histogram": {"buckets": []}}));
        assert!(matches!(
            format_response(&p, &e, 0),
            Err(Error::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_response_json_round_trip() {
        let p = pipeline(&["datehistogram:interval-1day:collect_field-params.startdate:collect_fct-max"]);
        let e = engine(json!({"datehistogram": {"buckets": [
            {"key": 0, "key_as_string": "1970-01-01", "doc_count": 10, "max": {"value": 5.0}}
        ]}}));
        let tree = format_response(&p, &e, 2).unwrap();
        let text = serde_json::to_value(&tree).unwrap();
        assert_eq!(text["elements"][0]["keyAsString"], "1970-01-01");
        assert_eq!(text["elements"][0]["elements"][0], json!({"type": "max", "field": "params.startdate", "value": 5.0}));
        let back: AggregationResponse = serde_json::from_value(text).unwrap();
        assert_eq!(back, tree);
    }
}
