use super::interval::Interval;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    Geohash,
    Datehistogram,
    Histogram,
    Term,
}

impl AggregationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationType::Geohash => "geohash",
            AggregationType::Datehistogram => "datehistogram",
            AggregationType::Histogram => "histogram",
            AggregationType::Term => "term",
        }
    }
}

impl FromStr for AggregationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "geohash" => Ok(AggregationType::Geohash),
            "datehistogram" => Ok(AggregationType::Datehistogram),
            "histogram" => Ok(AggregationType::Histogram),
            "term" => Ok(AggregationType::Term),
            other => Err(Error::invalid(
                "type",
                format!(
                    "'{}' is not one of geohash, datehistogram, histogram, term",
                    other
                ),
            )),
        }
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric computed over the documents of each bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricFunction {
    Avg,
    Cardinality,
    Max,
    Min,
    Sum,
    Geocentroid,
    Geobbox,
}

impl MetricFunction {
    /// Name of the metric sub-aggregation and of the metric element.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricFunction::Avg => "avg",
            MetricFunction::Cardinality => "cardinality",
            MetricFunction::Max => "max",
            MetricFunction::Min => "min",
            MetricFunction::Sum => "sum",
            MetricFunction::Geocentroid => "geocentroid",
            MetricFunction::Geobbox => "geobbox",
        }
    }

    /// Geo metrics operate on a point field and produce geometry, not a scalar.
    pub fn is_geo(&self) -> bool {
        matches!(self, MetricFunction::Geocentroid | MetricFunction::Geobbox)
    }
}

impl FromStr for MetricFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "AVG" => Ok(MetricFunction::Avg),
            "CARDINALITY" => Ok(MetricFunction::Cardinality),
            "MAX" => Ok(MetricFunction::Max),
            "MIN" => Ok(MetricFunction::Min),
            "SUM" => Ok(MetricFunction::Sum),
            "GEOCENTROID" => Ok(MetricFunction::Geocentroid),
            "GEOBBOX" => Ok(MetricFunction::Geobbox),
            _ => Err(Error::invalid(
                "collect_fct",
                format!("'{}' is not a metric function", s),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn as_str(&self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }
}

impl FromStr for Order {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Order::Asc),
            "desc" => Ok(Order::Desc),
            _ => Err(Error::invalid("order", format!("'{}' is not asc or desc", s))),
        }
    }
}

/// What the bucket `order` applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderOn {
    Count,
    Field,
    Result,
}

impl OrderOn {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderOn::Count => "count",
            OrderOn::Field => "field",
            OrderOn::Result => "result",
        }
    }
}

impl FromStr for OrderOn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "count" => Ok(OrderOn::Count),
            "field" => Ok(OrderOn::Field),
            "result" => Ok(OrderOn::Result),
            _ => Err(Error::invalid(
                "on",
                format!("'{}' is not count, field or result", s),
            )),
        }
    }
}

/// One node of an aggregation pipeline.
///
/// Built by the descriptor parser or deserialized from a request body; in both
/// cases [`crate::aggregations::rules::validate`] must pass before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    #[serde(rename = "type")]
    pub agg_type: AggregationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, rename = "collect_field", skip_serializing_if = "Option::is_none")]
    pub collect_field: Option<String>,
    #[serde(default, rename = "collect_fct", skip_serializing_if = "Option::is_none")]
    pub collect_fct: Option<MetricFunction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<OrderOn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    #[serde(default, rename = "withGeoCentroid", skip_serializing_if = "is_false")]
    pub with_geo_centroid: bool,
    #[serde(default, rename = "withGeoBBOX", skip_serializing_if = "is_false")]
    pub with_geo_bbox: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Aggregation {
    pub fn new(agg_type: AggregationType) -> Self {
        Self {
            agg_type,
            field: None,
            interval: None,
            format: None,
            collect_field: None,
            collect_fct: None,
            order: None,
            on: None,
            size: None,
            include: None,
            with_geo_centroid: false,
            with_geo_bbox: false,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_collect(mut self, field: Option<&str>, fct: MetricFunction) -> Self {
        self.collect_field = field.map(str::to_string);
        self.collect_fct = Some(fct);
        self
    }

    pub fn with_order(mut self, order: Order, on: OrderOn) -> Self {
        self.order = Some(order);
        self.on = Some(on);
        self
    }

    /// Name of the engine metric sub-aggregation, if any.
    pub fn metric_name(&self) -> Option<&'static str> {
        self.collect_fct.map(|f| f.as_str())
    }
}

impl fmt::Display for Aggregation {
    /// Canonical descriptor form: type, field, then parameters in a fixed order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.agg_type.as_str())?;
        if let Some(field) = &self.field {
            write!(f, ":{}", field)?;
        }
        if let Some(interval) = &self.interval {
            write!(f, ":interval-{}", interval)?;
        }
        if let Some(format) = &self.format {
            write!(f, ":format-{}", format)?;
        }
        if let Some(field) = &self.collect_field {
            write!(f, ":collect_field-{}", field)?;
        }
        if let Some(fct) = &self.collect_fct {
            write!(f, ":collect_fct-{}", fct.as_str())?;
        }
        if let Some(order) = &self.order {
            write!(f, ":order-{}", order.as_str())?;
        }
        if let Some(on) = &self.on {
            write!(f, ":on-{}", on.as_str())?;
        }
        if let Some(size) = &self.size {
            write!(f, ":size-{}", size)?;
        }
        if let Some(include) = &self.include {
            write!(f, ":include-{}", include)?;
        }
        if self.with_geo_centroid {
            f.write_str(":withGeoCentroid-true")?;
        }
        if self.with_geo_bbox {
            f.write_str(":withGeoBBOX-true")?;
        }
        Ok(())
    }
}
