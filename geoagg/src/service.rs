//! Explore service: parse, compile, run and format aggregation requests.

use crate::aggregations::{
    parse_aggregation, parse_pipeline, Aggregation, AggregationType, AggregationsRequest,
};
use crate::collection::{CollectionCatalog, CollectionReference};
use crate::engine::{AggregationBackend, RequestBuilder, SearchRequest};
use crate::error::{Error, Result};
use crate::filter::{Filter, ParsedFilter};
use crate::geo::{self, BoundingBox, Tile};
use crate::response::{format_response, AggregationResponse, FeatureCollection};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Compile `request` for `collection` without running it.
pub fn compile(
    collection: &CollectionReference,
    request: &AggregationsRequest,
    partition: Option<&Filter>,
) -> Result<SearchRequest> {
    request.validate(collection)?;
    let filter = request.filter.parse()?;
    let partition = partition.map(Filter::parse).transpose()?;
    Ok(RequestBuilder::new(collection).build(&filter, partition.as_ref(), &request.aggregations))
}

fn ensure_geohash_first(pipeline: &[Aggregation]) -> Result<()> {
    match pipeline.first() {
        Some(first) if first.agg_type == AggregationType::Geohash => Ok(()),
        Some(first) => Err(Error::invalid(
            "agg",
            format!(
                "geo-aggregations must start with a geohash aggregation, got '{}'",
                first.agg_type
            ),
        )),
        None => Err(Error::BadRequest(
            "at least one aggregation must be specified".to_string(),
        )),
    }
}

pub struct ExploreService {
    catalog: Arc<dyn CollectionCatalog>,
    backend: Arc<dyn AggregationBackend>,
    timeout: Duration,
}

impl ExploreService {
    pub fn new(
        catalog: Arc<dyn CollectionCatalog>,
        backend: Arc<dyn AggregationBackend>,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            backend,
            timeout,
        }
    }

    pub fn catalog(&self) -> &dyn CollectionCatalog {
        self.catalog.as_ref()
    }

    pub fn collection(&self, name: &str) -> Result<Arc<CollectionReference>> {
        self.catalog.get(name)
    }

    /// Run an aggregation request and return the result tree.
    pub async fn aggregate(
        &self,
        collection: &CollectionReference,
        request: &AggregationsRequest,
        partition: Option<&Filter>,
    ) -> Result<AggregationResponse> {
        request.validate(collection)?;
        let filter = request.filter.parse()?;
        let partition = partition.map(Filter::parse).transpose()?;
        self.execute(collection, &request.aggregations, &filter, partition.as_ref())
            .await
    }

    /// Run a geohash-first aggregation request and return one feature per cell.
    pub async fn geoaggregate(
        &self,
        collection: &CollectionReference,
        request: &AggregationsRequest,
        partition: Option<&Filter>,
    ) -> Result<FeatureCollection> {
        ensure_geohash_first(&request.aggregations)?;
        let tree = self.aggregate(collection, request, partition).await?;
        FeatureCollection::from_response(&tree)
    }

    /// Geo-aggregation restricted to the cell named by `hash`.
    ///
    /// Without descriptors the cell is aggregated at the precision of `hash`.
    pub async fn geoaggregate_geohash(
        &self,
        collection: &CollectionReference,
        hash: &str,
        descriptors: &[String],
        filter: &Filter,
        partition: Option<&Filter>,
    ) -> Result<FeatureCollection> {
        let parsed = filter.parse()?;
        let Some(bbox) = geo::geohash_request_bbox(hash, &parsed.pwithin)? else {
            tracing::debug!(geohash = %hash, "Geohash cell lies outside pwithin, nothing to aggregate");
            return Ok(FeatureCollection::empty());
        };
        let precision = hash.trim_start_matches('#').len();
        self.geoaggregate_within(collection, bbox, precision, descriptors, parsed, partition)
            .await
    }

    /// Geo-aggregation restricted to an XYZ tile.
    pub async fn geoaggregate_tile(
        &self,
        collection: &CollectionReference,
        tile: Tile,
        descriptors: &[String],
        filter: &Filter,
        partition: Option<&Filter>,
    ) -> Result<FeatureCollection> {
        let parsed = filter.parse()?;
        let Some(bbox) = geo::restrict_to_pwithin(tile.bbox(), &parsed.pwithin) else {
            tracing::debug!(z = tile.z, x = tile.x, y = tile.y, "Tile lies outside pwithin, nothing to aggregate");
            return Ok(FeatureCollection::empty());
        };
        self.geoaggregate_within(
            collection,
            bbox,
            tile.default_precision(),
            descriptors,
            parsed,
            partition,
        )
        .await
    }

    async fn geoaggregate_within(
        &self,
        collection: &CollectionReference,
        bbox: BoundingBox,
        precision: usize,
        descriptors: &[String],
        mut filter: ParsedFilter,
        partition: Option<&Filter>,
    ) -> Result<FeatureCollection> {
        let pipeline = if descriptors.is_empty() {
            let descriptor = geo::default_geohash_descriptor(&collection.centroid_path, precision);
            vec![parse_aggregation(&descriptor, collection)?]
        } else {
            parse_pipeline(descriptors, collection)?
        };
        ensure_geohash_first(&pipeline)?;

        // The restricted box already accounts for every pwithin group.
        filter.pwithin = vec![vec![bbox]];
        let partition = partition.map(Filter::parse).transpose()?;
        let tree = self
            .execute(collection, &pipeline, &filter, partition.as_ref())
            .await?;
        FeatureCollection::from_response(&tree)
    }

    async fn execute(
        &self,
        collection: &CollectionReference,
        pipeline: &[Aggregation],
        filter: &ParsedFilter,
        partition: Option<&ParsedFilter>,
    ) -> Result<AggregationResponse> {
        let request = RequestBuilder::new(collection).build(filter, partition, pipeline);
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                collection = %collection.name,
                request = %serde_json::to_string(&request)?,
                "Compiled engine request"
            );
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.timeout,
            self.backend.search(&collection.index, &request),
        )
        .await;
        let elapsed = started.elapsed();
        metrics::histogram!("geoagg_engine_duration_seconds", "backend" => self.backend.name())
            .record(elapsed.as_secs_f64());

        let engine = match outcome {
            Ok(Ok(engine)) => engine,
            Ok(Err(e)) => {
                tracing::warn!(
                    collection = %collection.name,
                    backend = self.backend.name(),
                    error = %e,
                    "Engine request failed"
                );
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    collection = %collection.name,
                    backend = self.backend.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Engine request timed out"
                );
                return Err(Error::BackendUnavailable(format!(
                    "engine did not answer within {} ms",
                    self.timeout.as_millis()
                )));
            }
        };

        let query_time = elapsed.as_millis() as u64;
        let tree = format_response(pipeline, &engine, query_time)?;
        tracing::info!(
            collection = %collection.name,
            aggregations = pipeline.len(),
            total = engine.total(),
            buckets = tree.buckets().count(),
            query_time_ms = query_time,
            "Aggregation completed"
        );
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::StaticCatalog;
    use crate::engine::{EngineResponse, MemoryBackend};
    use async_trait::async_trait;
    use serde_json::json;

    fn collection() -> CollectionReference {
        let mut c = CollectionReference::new("geodata", "dataset");
        c.centroid_path = "geo_params.centroid".to_string();
        c.geometry_path = "geo_params.geometry".to_string();
        c.timestamp_path = "params.startdate".to_string();
        c
    }

    fn doc(id: &str, job: &str, lat: f64, lon: f64) -> serde_json::Value {
        json!({
            "id": id,
            "params": {"job": job, "startdate": 1000},
            "geo_params": {"centroid": format!("{},{}", lat, lon)}
        })
    }

    fn service() -> ExploreService {
        let backend = MemoryBackend::new();
        backend.insert(
            "dataset",
            vec![
                doc("a", "Actor", 10.0, 10.0),
                doc("b", "Actor", 11.0, 11.0),
                doc("c", "Coder", -10.0, -10.0),
            ],
        );
        ExploreService::new(
            Arc::new(StaticCatalog::new(vec![collection()])),
            Arc::new(backend),
            Duration::from_secs(5),
        )
    }

    fn request(descriptors: &[&str]) -> AggregationsRequest {
        AggregationsRequest::from_descriptors(Filter::default(), descriptors, &collection()).unwrap()
    }

    #[tokio::test]
    async fn test_aggregate_terms() {
        let svc = service();
        let c = svc.collection("geodata").unwrap();
        let tree = svc.aggregate(&c, &request(&["term:params.job"]), None).await.unwrap();
        assert_eq!(tree.totalnb, Some(3));
        let keys: Vec<_> = tree.buckets().map(|b| (b.key_as_string.clone().unwrap(), b.count)).collect();
        assert_eq!(keys, vec![("Actor".to_string(), 2), ("Coder".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_partition_filter_is_anded() {
        let svc = service();
        let c = svc.collection("geodata").unwrap();
        let partition = Filter {
            f: vec!["params.job:eq:Coder".to_string()],
            ..Default::default()
        };
        let tree = svc
            .aggregate(&c, &request(&["term:params.job"]), Some(&partition))
            .await
            .unwrap();
        assert_eq!(tree.totalnb, Some(1));
    }

    #[tokio::test]
    async fn test_geoaggregate_requires_geohash_first() {
        let svc = service();
        let c = svc.collection("geodata").unwrap();
        let err = svc
            .geoaggregate(&c, &request(&["term:params.job"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref field, .. } if field == "agg"));
    }

    #[tokio::test]
    async fn test_geohash_addressed_defaults_to_hash_precision() {
        let svc = service();
        let c = svc.collection("geodata").unwrap();
        let fc = svc
            .geoaggregate_geohash(&c, "s", &[], &Filter::default(), None)
            .await
            .unwrap();
        assert_eq!(fc.features.len(), 1);
        assert_eq!(fc.features[0].properties.count, 2);
        assert_eq!(fc.features[0].properties.geohash.as_deref(), Some("s"));
    }

    #[tokio::test]
    async fn test_disjoint_pwithin_short_circuits() {
        let svc = service();
        let c = svc.collection("geodata").unwrap();
        let filter = Filter {
            pwithin: vec!["-20,-20,-5,-5".to_string()],
            ..Default::default()
        };
        let fc = svc
            .geoaggregate_geohash(&c, "s", &[], &filter, None)
            .await
            .unwrap();
        assert_eq!(fc, FeatureCollection::empty());

        let tile = Tile::new(1, 0, 1).unwrap();
        let fc = svc.geoaggregate_tile(&c, tile, &[], &filter, None).await.unwrap();
        assert_eq!(fc, FeatureCollection::empty());
    }

    #[tokio::test]
    async fn test_tile_restricts_documents() {
        let svc = service();
        let c = svc.collection("geodata").unwrap();
        let tile = Tile::new(0, 1, 1).unwrap();
        let fc = svc
            .geoaggregate_tile(&c, tile, &[], &Filter::default(), None)
            .await
            .unwrap();
        let total: u64 = fc.features.iter().map(|f| f.properties.count).sum();
        assert_eq!(total, 1);
    }

    struct SlowBackend;

    #[async_trait]
    impl AggregationBackend for SlowBackend {
        async fn search(&self, _index: &str, _request: &SearchRequest) -> Result<EngineResponse> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(EngineResponse::default())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_timeout_is_backend_unavailable() {
        let svc = ExploreService::new(
            Arc::new(StaticCatalog::new(vec![collection()])),
            Arc::new(SlowBackend),
            Duration::from_millis(100),
        );
        let c = svc.collection("geodata").unwrap();
        let err = svc
            .aggregate(&c, &request(&["term:params.job"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }

    #[test]
    fn test_compile_ands_partition() {
        let partition = Filter {
            q: vec!["Actor".to_string()],
            ..Default::default()
        };
        let req = AggregationsRequest::from_descriptors(
            Filter {
                f: vec!["params.job:eq:Actor".to_string()],
                ..Default::default()
            },
            &["term:params.job"],
            &collection(),
        )
        .unwrap();
        let compiled = compile(&collection(), &req, Some(&partition)).unwrap();
        let value = serde_json::to_value(&compiled).unwrap();
        assert_eq!(value["query"]["bool"]["filter"].as_array().unwrap().len(), 2);
        assert_eq!(value["size"], 0);
    }
}
