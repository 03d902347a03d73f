use crate::aggregations::AggregationsRequest;
use crate::collection::CollectionReference;
use crate::error::{Error, Result};
use crate::filter::{Filter, PARTITION_FILTER_HEADER};
use crate::geo::Tile;
use crate::service::ExploreService;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

const JSON: &str = "application/json";
const GEOJSON: &str = "application/geo+json";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ExploreService>,
}

/// Everything the query string carries besides the path.
#[derive(Debug, Default)]
struct RequestOptions {
    aggs: Vec<String>,
    filter: Filter,
    pretty: bool,
    max_age: Option<u64>,
}

impl RequestOptions {
    fn from_query(pairs: &[(String, String)]) -> Result<Self> {
        let filter = Filter::from_query_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
        let mut options = Self {
            filter,
            ..Default::default()
        };
        for (key, value) in pairs {
            match key.as_str() {
                "agg" => options.aggs.push(value.clone()),
                "pretty" => options.pretty = value.is_empty() || value == "true",
                "max-age-cache" => {
                    options.max_age = Some(value.parse().map_err(|_| {
                        Error::invalid("max-age-cache", format!("'{}' is not a number of seconds", value))
                    })?)
                }
                _ => {}
            }
        }
        Ok(options)
    }

    fn respond<T: Serialize>(&self, value: &T, content_type: &'static str) -> Result<Response> {
        let body = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        let mut response = (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response();
        if let Some(age) = self.max_age {
            let value = HeaderValue::from_str(&format!("max-age={}", age))
                .map_err(|e| Error::invalid("max-age-cache", e.to_string()))?;
            response.headers_mut().insert(header::CACHE_CONTROL, value);
        }
        Ok(response)
    }
}

fn partition_filter(headers: &HeaderMap) -> Result<Option<Filter>> {
    headers
        .get(PARTITION_FILTER_HEADER)
        .map(|value| {
            let text = value
                .to_str()
                .map_err(|_| Error::invalid(PARTITION_FILTER_HEADER, "header is not valid UTF-8"))?;
            Filter::from_header(text)
        })
        .transpose()
}

fn request_body(body: &[u8]) -> Result<AggregationsRequest> {
    serde_json::from_slice(body)
        .map_err(|e| Error::invalid("body", format!("not a valid aggregation request: {}", e)))
}

fn parse_coordinate(name: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| Error::invalid(name, format!("'{}' is not a tile coordinate", value)))
}

fn count_request(endpoint: &'static str) {
    metrics::counter!("geoagg_requests_total", "endpoint" => endpoint).increment(1);
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /collections
pub async fn list_collections(State(state): State<AppState>) -> Json<Vec<CollectionReference>> {
    count_request("collections");
    let mut collections: Vec<CollectionReference> = state
        .service
        .catalog()
        .list()
        .into_iter()
        .map(|c| c.as_ref().clone())
        .collect();
    collections.sort_by(|a, b| a.name.cmp(&b.name));
    Json(collections)
}

/// GET /collections/:collection
pub async fn get_collection(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Json<CollectionReference>> {
    count_request("collection");
    Ok(Json(state.service.collection(&collection)?.as_ref().clone()))
}

/// GET /:collection/_aggregate
pub async fn aggregate_get(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Response> {
    count_request("aggregate");
    let options = RequestOptions::from_query(&params)?;
    let partition = partition_filter(&headers)?;
    let collection = state.service.collection(&collection)?;
    let request = AggregationsRequest::from_descriptors(options.filter.clone(), &options.aggs, &collection)?;
    let tree = state
        .service
        .aggregate(&collection, &request, partition.as_ref())
        .await?;
    options.respond(&tree, JSON)
}

/// POST /:collection/_aggregate
pub async fn aggregate_post(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    count_request("aggregate");
    let options = RequestOptions::from_query(&params)?;
    let partition = partition_filter(&headers)?;
    let collection = state.service.collection(&collection)?;
    let request = request_body(&body)?;
    let tree = state
        .service
        .aggregate(&collection, &request, partition.as_ref())
        .await?;
    options.respond(&tree, JSON)
}

/// GET /:collection/_geoaggregate
pub async fn geoaggregate_get(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Response> {
    count_request("geoaggregate");
    let options = RequestOptions::from_query(&params)?;
    let partition = partition_filter(&headers)?;
    let collection = state.service.collection(&collection)?;
    let request = AggregationsRequest::from_descriptors(options.filter.clone(), &options.aggs, &collection)?;
    let features = state
        .service
        .geoaggregate(&collection, &request, partition.as_ref())
        .await?;
    options.respond(&features, GEOJSON)
}

/// POST /:collection/_geoaggregate
pub async fn geoaggregate_post(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    count_request("geoaggregate");
    let options = RequestOptions::from_query(&params)?;
    let partition = partition_filter(&headers)?;
    let collection = state.service.collection(&collection)?;
    let request = request_body(&body)?;
    let features = state
        .service
        .geoaggregate(&collection, &request, partition.as_ref())
        .await?;
    options.respond(&features, GEOJSON)
}

/// GET /:collection/_geoaggregate/:geohash
pub async fn geoaggregate_geohash(
    State(state): State<AppState>,
    Path((collection, geohash)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Response> {
    count_request("geoaggregate_geohash");
    let options = RequestOptions::from_query(&params)?;
    let partition = partition_filter(&headers)?;
    let collection = state.service.collection(&collection)?;
    let features = state
        .service
        .geoaggregate_geohash(
            &collection,
            &geohash,
            &options.aggs,
            &options.filter,
            partition.as_ref(),
        )
        .await?;
    options.respond(&features, GEOJSON)
}

/// GET /:collection/_geoaggregate/:z/:x/:y
pub async fn geoaggregate_tile(
    State(state): State<AppState>,
    Path((collection, z, x, y)): Path<(String, String, String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Response> {
    count_request("geoaggregate_tile");
    let tile = Tile::new(
        parse_coordinate("x", &x)?,
        parse_coordinate("y", &y)?,
        parse_coordinate("z", &z)?,
    )?;
    let options = RequestOptions::from_query(&params)?;
    let partition = partition_filter(&headers)?;
    let collection = state.service.collection(&collection)?;
    let features = state
        .service
        .geoaggregate_tile(&collection, tile, &options.aggs, &options.filter, partition.as_ref())
        .await?;
    options.respond(&features, GEOJSON)
}
