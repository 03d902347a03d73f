//! Engine search request DSL (the Elasticsearch subset geoagg emits).
//!
//! Every type serializes to the engine's JSON. Aggregations keep insertion
//! order on the wire.

use crate::aggregations::Order;
use crate::geo::Geometry;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

/// Root search request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    /// Number of hits to return. Aggregation requests never ask for hits.
    pub size: u32,
    pub track_total_hits: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryClause>,
    #[serde(skip_serializing_if = "Aggs::is_empty")]
    pub aggs: Aggs,
}

impl SearchRequest {
    pub fn aggregations(query: Option<QueryClause>, aggs: Aggs) -> Self {
        Self {
            size: 0,
            track_total_hits: true,
            query,
            aggs,
        }
    }
}

/// Query clauses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryClause {
    Bool(BoolQuery),
    Term(FieldValue<Value>),
    Range(FieldValue<RangeBounds>),
    Wildcard(FieldValue<WildcardValue>),
    SimpleQueryString(SimpleQueryString),
    GeoBoundingBox(FieldValue<GeoBoundingBox>),
    GeoShape(FieldValue<GeoShape>),
}

impl QueryClause {
    /// OR of `clauses`, collapsing the single-clause case.
    pub fn any_of(mut clauses: Vec<QueryClause>) -> QueryClause {
        if clauses.len() == 1 {
            if let Some(clause) = clauses.pop() {
                return clause;
            }
        }
        QueryClause::Bool(BoolQuery {
            should: clauses,
            minimum_should_match: Some(1),
            ..Default::default()
        })
    }

    /// Negation of `clauses` (none of them may match).
    pub fn none_of(clauses: Vec<QueryClause>) -> QueryClause {
        QueryClause::Bool(BoolQuery {
            must_not: clauses,
            ..Default::default()
        })
    }

    pub fn term(field: &str, value: impl Into<Value>) -> QueryClause {
        QueryClause::Term(FieldValue::new(field, value.into()))
    }

    pub fn range(field: &str, bounds: RangeBounds) -> QueryClause {
        QueryClause::Range(FieldValue::new(field, bounds))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoolQuery {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<QueryClause>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<QueryClause>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<QueryClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_should_match: Option<u32>,
}

/// `{"<field>": <value>}`, the shape shared by most leaf queries.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue<T> {
    pub field: String,
    pub value: T,
}

impl<T> FieldValue<T> {
    pub fn new(field: &str, value: T) -> Self {
        Self {
            field: field.to_string(),
            value,
        }
    }
}

impl<T: Serialize> Serialize for FieldValue<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.field, &self.value)?;
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RangeBounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl RangeBounds {
    /// True when `v` lies within every bound that is set.
    pub fn contains(&self, v: f64) -> bool {
        self.gt.map_or(true, |b| v > b)
            && self.gte.map_or(true, |b| v >= b)
            && self.lt.map_or(true, |b| v < b)
            && self.lte.map_or(true, |b| v <= b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WildcardValue {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimpleQueryString {
    pub query: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    pub default_operator: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoBoundingBox {
    pub top_left: LatLon,
    pub bottom_right: LatLon,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoShape {
    pub shape: Geometry,
    pub relation: String,
}

/// Named aggregations in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggs(pub Vec<(String, AggNode)>);

impl Aggs {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, name: impl Into<String>, node: AggNode) {
        self.0.push((name.into(), node));
    }

    pub fn get(&self, name: &str) -> Option<&AggNode> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, node)| node)
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl Serialize for Aggs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, node)| (name, node)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggNode {
    #[serde(flatten)]
    pub kind: AggKind,
    #[serde(skip_serializing_if = "Aggs::is_empty")]
    pub aggs: Aggs,
}

impl AggNode {
    pub fn leaf(kind: AggKind) -> Self {
        Self {
            kind,
            aggs: Aggs::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggKind {
    GeohashGrid(GeohashGrid),
    DateHistogram(DateHistogram),
    Histogram(Histogram),
    Terms(Terms),
    Avg(FieldRef),
    Cardinality(FieldRef),
    Max(FieldRef),
    Min(FieldRef),
    Sum(FieldRef),
    GeoCentroid(FieldRef),
    GeoBounds(FieldRef),
    BucketSort(BucketSort),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldRef {
    pub field: String,
}

impl FieldRef {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeohashGrid {
    pub field: String,
    pub precision: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateHistogram {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_interval: Option<String>,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<BucketOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub field: String,
    pub interval: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<BucketOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Terms {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<BucketOrder>,
}

/// Pipeline sub-aggregation reordering the buckets of its parent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSort {
    pub sort: Vec<BucketOrder>,
}

/// `{"<key>": "asc"|"desc"}` where key is `_count`, `_key` or a metric name.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketOrder {
    pub key: String,
    pub order: Order,
}

impl BucketOrder {
    pub const COUNT: &'static str = "_count";
    pub const KEY: &'static str = "_key";

    pub fn new(key: impl Into<String>, order: Order) -> Self {
        Self {
            key: key.into(),
            order,
        }
    }
}

impl Serialize for BucketOrder {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.key, self.order.as_str())?;
        map.end()
    }
}
