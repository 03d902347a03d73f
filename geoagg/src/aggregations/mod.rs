//! Aggregation descriptors, the nodes they describe, and pipelines of nodes.

pub mod descriptor;
pub mod interval;
pub mod model;
pub mod pipeline;
pub mod rules;

pub use descriptor::{parse_aggregation, parse_descriptor};
pub use interval::{CalendarUnit, Interval};
pub use model::{Aggregation, AggregationType, MetricFunction, Order, OrderOn};
pub use pipeline::{parse_pipeline, AggregationsRequest};
