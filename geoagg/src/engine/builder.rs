//! Compiles filters and aggregation pipelines into engine requests.

use super::request::{
    AggKind, AggNode, Aggs, BoolQuery, BucketOrder, BucketSort, DateHistogram, FieldRef,
    FieldValue, GeoBoundingBox, GeoShape, GeohashGrid, Histogram, LatLon, QueryClause,
    RangeBounds, SearchRequest, SimpleQueryString, Terms, WildcardValue,
};
use crate::aggregations::{Aggregation, AggregationType, MetricFunction, OrderOn};
use crate::collection::CollectionReference;
use crate::filter::{ExprValue, Expression, Operator, ParsedFilter, ShapeFilter};
use crate::geo::BoundingBox;
use serde_json::Value;

/// Date format used when a date histogram does not name one.
pub const DEFAULT_DATE_FORMAT: &str = "yyyy-MM-dd-HH:mm:ss";

pub const GEOCENTROID_BUCKET: &str = "geocentroid_bucket";
pub const GEOBBOX_BUCKET: &str = "geobbox_bucket";
const BUCKET_SORT: &str = "bucket_sort";

/// Name of the engine aggregation built for a pipeline node.
pub fn aggregation_name(agg: &Aggregation) -> &'static str {
    agg.agg_type.as_str()
}

pub struct RequestBuilder<'a> {
    collection: &'a CollectionReference,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(collection: &'a CollectionReference) -> Self {
        Self { collection }
    }

    /// Full request: the user filter AND the partition filter, then the
    /// nested aggregations of `pipeline`.
    pub fn build(
        &self,
        filter: &ParsedFilter,
        partition: Option<&ParsedFilter>,
        pipeline: &[Aggregation],
    ) -> SearchRequest {
        let mut clauses = self.filter_clauses(filter);
        if let Some(partition) = partition {
            clauses.extend(self.filter_clauses(partition));
        }
        let query = if clauses.is_empty() {
            None
        } else {
            Some(QueryClause::Bool(BoolQuery {
                filter: clauses,
                ..Default::default()
            }))
        };
        SearchRequest::aggregations(query, self.aggregations(pipeline))
    }

    /// AND-ed clauses for one filter.
    pub fn filter_clauses(&self, filter: &ParsedFilter) -> Vec<QueryClause> {
        let mut clauses = Vec::new();

        for entry in &filter.expressions {
            clauses.push(QueryClause::any_of(
                entry.iter().map(expression_clause).collect(),
            ));
        }

        for q in &filter.queries {
            clauses.push(QueryClause::SimpleQueryString(SimpleQueryString {
                query: q.text.clone(),
                fields: q.field.iter().cloned().collect(),
                default_operator: "and".to_string(),
            }));
        }

        if filter.before.is_some() || filter.after.is_some() {
            clauses.push(QueryClause::range(
                &self.collection.timestamp_path,
                RangeBounds {
                    lt: filter.before.map(|b| b as f64),
                    gt: filter.after.map(|a| a as f64),
                    ..Default::default()
                },
            ));
        }

        for group in &filter.pwithin {
            clauses.push(QueryClause::any_of(
                group.iter().map(|b| self.bbox_clause(b)).collect(),
            ));
        }
        for group in &filter.notpwithin {
            clauses.push(QueryClause::none_of(
                group.iter().map(|b| self.bbox_clause(b)).collect(),
            ));
        }

        for shape in &filter.shapes {
            clauses.push(QueryClause::any_of(self.shape_clauses(shape)));
        }
        for shape in &filter.not_shapes {
            clauses.push(QueryClause::none_of(self.shape_clauses(shape)));
        }

        clauses
    }

    fn bbox_clause(&self, bbox: &BoundingBox) -> QueryClause {
        QueryClause::GeoBoundingBox(FieldValue::new(
            &self.collection.centroid_path,
            GeoBoundingBox {
                top_left: LatLon {
                    lat: bbox.north,
                    lon: bbox.west,
                },
                bottom_right: LatLon {
                    lat: bbox.south,
                    lon: bbox.east,
                },
            },
        ))
    }

    fn shape_clauses(&self, filter: &ShapeFilter) -> Vec<QueryClause> {
        filter
            .shapes
            .iter()
            .map(|shape| {
                QueryClause::GeoShape(FieldValue::new(
                    &self.collection.geometry_path,
                    GeoShape {
                        shape: shape.clone(),
                        relation: filter.relation.as_str().to_string(),
                    },
                ))
            })
            .collect()
    }

    /// Nested aggregation clauses: node `i + 1` goes inside node `i`.
    pub fn aggregations(&self, pipeline: &[Aggregation]) -> Aggs {
        let mut aggs = Aggs::default();
        if let Some((first, rest)) = pipeline.split_first() {
            aggs.push(aggregation_name(first), self.aggregation_node(first, rest));
        }
        aggs
    }

    fn aggregation_node(&self, agg: &Aggregation, rest: &[Aggregation]) -> AggNode {
        let order = self.bucket_order(agg);
        let field = agg.field.clone().unwrap_or_default();

        let kind = match agg.agg_type {
            AggregationType::Geohash => AggKind::GeohashGrid(GeohashGrid {
                field,
                precision: agg.interval.map(|i| i.value).unwrap_or(1),
            }),
            AggregationType::Datehistogram => {
                let (calendar_interval, fixed_interval) = date_interval(agg);
                AggKind::DateHistogram(DateHistogram {
                    field: self.collection.timestamp_path.clone(),
                    calendar_interval,
                    fixed_interval,
                    format: agg
                        .format
                        .clone()
                        .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string()),
                    order: order.clone(),
                })
            }
            AggregationType::Histogram => AggKind::Histogram(Histogram {
                field,
                interval: agg.interval.map(|i| f64::from(i.value)).unwrap_or(1.0),
                order: order.clone(),
            }),
            AggregationType::Term => AggKind::Terms(Terms {
                field,
                size: agg.size,
                include: agg.include.clone(),
                order: order.clone(),
            }),
        };

        let mut sub = Aggs::default();
        if let (Some(fct), Some(name)) = (agg.collect_fct, agg.metric_name()) {
            let collect_field = agg
                .collect_field
                .as_deref()
                .unwrap_or(&self.collection.centroid_path);
            sub.push(name, AggNode::leaf(metric_kind(fct, collect_field)));
        }
        if agg.with_geo_centroid {
            sub.push(
                GEOCENTROID_BUCKET,
                AggNode::leaf(AggKind::GeoCentroid(FieldRef::new(&self.collection.centroid_path))),
            );
        }
        if agg.with_geo_bbox {
            sub.push(
                GEOBBOX_BUCKET,
                AggNode::leaf(AggKind::GeoBounds(FieldRef::new(&self.collection.centroid_path))),
            );
        }
        // geohash_grid cannot order its own buckets
        if agg.agg_type == AggregationType::Geohash {
            if let Some(order) = order {
                sub.push(BUCKET_SORT, AggNode::leaf(AggKind::BucketSort(BucketSort { sort: vec![order] })));
            }
        }
        if let Some((next, rest)) = rest.split_first() {
            sub.push(aggregation_name(next), self.aggregation_node(next, rest));
        }

        AggNode { kind, aggs: sub }
    }

    fn bucket_order(&self, agg: &Aggregation) -> Option<BucketOrder> {
        let (order, on) = (agg.order?, agg.on?);
        let key = match on {
            OrderOn::Count => BucketOrder::COUNT,
            OrderOn::Field => BucketOrder::KEY,
            OrderOn::Result => agg.metric_name()?,
        };
        Some(BucketOrder::new(key, order))
    }
}

fn metric_kind(fct: MetricFunction, field: &str) -> AggKind {
    let field = FieldRef::new(field);
    match fct {
        MetricFunction::Avg => AggKind::Avg(field),
        MetricFunction::Cardinality => AggKind::Cardinality(field),
        MetricFunction::Max => AggKind::Max(field),
        MetricFunction::Min => AggKind::Min(field),
        MetricFunction::Sum => AggKind::Sum(field),
        MetricFunction::Geocentroid => AggKind::GeoCentroid(field),
        MetricFunction::Geobbox => AggKind::GeoBounds(field),
    }
}

/// Single units are calendar-aware; multiples of fixed-length units become
/// fixed intervals.
fn date_interval(agg: &Aggregation) -> (Option<String>, Option<String>) {
    let Some(interval) = agg.interval else {
        return (None, None);
    };
    let Some(unit) = interval.unit else {
        return (None, None);
    };
    let text = format!("{}{}", interval.value, unit.engine_suffix());
    if interval.value == 1 || unit.fixed_millis().is_none() {
        (Some(text), None)
    } else {
        (None, Some(text))
    }
}

fn expression_clause(expr: &Expression) -> QueryClause {
    let field = expr.field.as_str();
    let number = || match expr.values.first() {
        Some(ExprValue::Number(n)) => Some(*n),
        _ => None,
    };
    match expr.op {
        Operator::Eq => QueryClause::any_of(expr.values.iter().map(|v| term_clause(field, v)).collect()),
        Operator::Ne => QueryClause::none_of(expr.values.iter().map(|v| term_clause(field, v)).collect()),
        Operator::Like => QueryClause::any_of(
            expr.values
                .iter()
                .map(|v| {
                    QueryClause::Wildcard(FieldValue::new(
                        field,
                        WildcardValue {
                            value: format!("*{}*", value_text(v)),
                        },
                    ))
                })
                .collect(),
        ),
        Operator::Gte => QueryClause::range(field, RangeBounds { gte: number(), ..Default::default() }),
        Operator::Gt => QueryClause::range(field, RangeBounds { gt: number(), ..Default::default() }),
        Operator::Lte => QueryClause::range(field, RangeBounds { lte: number(), ..Default::default() }),
        Operator::Lt => QueryClause::range(field, RangeBounds { lt: number(), ..Default::default() }),
        Operator::Range => QueryClause::any_of(
            expr.values
                .iter()
                .filter_map(|v| match v {
                    ExprValue::Range { min, max } => Some(QueryClause::range(
                        field,
                        RangeBounds {
                            gte: Some(*min),
                            lte: Some(*max),
                            ..Default::default()
                        },
                    )),
                    _ => None,
                })
                .collect(),
        ),
    }
}

fn term_clause(field: &str, value: &ExprValue) -> QueryClause {
    QueryClause::term(field, Value::String(value_text(value)))
}

fn value_text(value: &ExprValue) -> String {
    match value {
        ExprValue::Text(t) => t.clone(),
        ExprValue::Number(n) => n.to_string(),
        ExprValue::Range { min, max } => format!("[{}<{}]", min, max),
    }
}
