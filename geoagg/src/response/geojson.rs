use super::formatter::{AggregationElement, AggregationResponse};
use crate::error::{Error, Result};
use crate::geo::{GeoPoint, Geometry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geohash: Option<String>,
    #[serde(default)]
    pub elements: Vec<AggregationElement>,
}

impl FeatureCollection {
    pub fn empty() -> Self {
        Self::default()
    }

    /// One feature per top-level bucket. The geometry is the bucket's BBOX,
    /// else its centroid, else its geo-point key.
    pub fn from_response(response: &AggregationResponse) -> Result<Self> {
        let features = response
            .buckets()
            .map(|bucket| {
                Ok(Feature {
                    geometry: bucket_geometry(bucket)?,
                    properties: FeatureProperties {
                        count: bucket.count,
                        geohash: bucket.key_as_string.clone(),
                        elements: bucket.elements.clone(),
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { features })
    }
}

fn bucket_geometry(bucket: &AggregationResponse) -> Result<Geometry> {
    if let Some(bbox) = &bucket.bbox {
        return Ok(bbox.clone());
    }
    if let Some(centroid) = &bucket.centroid {
        return Ok(centroid.clone());
    }
    bucket
        .key
        .as_ref()
        .and_then(GeoPoint::from_value)
        .map(GeoPoint::to_geometry)
        .ok_or_else(|| {
            Error::BackendUnavailable(format!(
                "bucket '{}' has no geometry",
                bucket.key_as_string.as_deref().unwrap_or_default()
            ))
        })
}
