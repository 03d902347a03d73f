//! Result trees and their GeoJSON rendering.

pub mod formatter;
pub mod geojson;

pub use formatter::{format_response, AggregationElement, AggregationMetric, AggregationResponse};
pub use geojson::{Feature, FeatureCollection, FeatureProperties};
