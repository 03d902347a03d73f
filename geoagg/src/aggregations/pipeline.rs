use super::descriptor::parse_aggregation;
use super::model::Aggregation;
use super::rules;
use crate::collection::CollectionReference;
use crate::error::{Error, Result};
use crate::filter::Filter;
use serde::{Deserialize, Serialize};

/// Parse descriptors in request order. Node `i + 1` nests inside the buckets
/// of node `i`.
pub fn parse_pipeline<S: AsRef<str>>(
    descriptors: &[S],
    collection: &CollectionReference,
) -> Result<Vec<Aggregation>> {
    if descriptors.is_empty() {
        return Err(Error::BadRequest(
            "at least one aggregation must be specified".to_string(),
        ));
    }
    descriptors
        .iter()
        .map(|d| parse_aggregation(d.as_ref(), collection))
        .collect()
}

/// A filter together with an aggregation pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationsRequest {
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
}

impl AggregationsRequest {
    pub fn from_descriptors<S: AsRef<str>>(
        filter: Filter,
        descriptors: &[S],
        collection: &CollectionReference,
    ) -> Result<Self> {
        Ok(Self {
            filter,
            aggregations: parse_pipeline(descriptors, collection)?,
        })
    }

    /// Run the per-type rules on every node. Needed for requests that did not
    /// come through the descriptor parser, such as JSON bodies.
    pub fn validate(&self, collection: &CollectionReference) -> Result<()> {
        if self.aggregations.is_empty() {
            return Err(Error::BadRequest(
                "at least one aggregation must be specified".to_string(),
            ));
        }
        for agg in &self.aggregations {
            rules::validate(agg, collection)?;
        }
        self.filter.parse()?;
        Ok(())
    }

    /// Canonical descriptors of the pipeline, in order.
    pub fn descriptors(&self) -> Vec<String> {
        self.aggregations.iter().map(|a| a.to_string()).collect()
    }
}
