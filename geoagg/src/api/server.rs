use super::handlers::{self, AppState};
use crate::config::CorsConfig;
use crate::error::Error;
use crate::service::ExploreService;
use crate::Result;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct ApiServer {
    service: Arc<ExploreService>,
    cors: CorsLayer,
}

impl ApiServer {
    /// Server answering cross-origin requests from any origin.
    pub fn new(service: Arc<ExploreService>) -> Self {
        Self {
            service,
            cors: explore_cors(AllowOrigin::any()),
        }
    }

    /// Server with CORS taken from `[server.cors]`. Origins that are not valid
    /// header values are a configuration error.
    pub fn with_cors(service: Arc<ExploreService>, cors_config: CorsConfig) -> Result<Self> {
        let cors = if !cors_config.enabled {
            CorsLayer::new()
        } else if cors_config.origins.iter().any(|o| o == "*") {
            explore_cors(AllowOrigin::any())
        } else {
            let origins = cors_config
                .origins
                .iter()
                .map(|o| {
                    HeaderValue::from_str(o)
                        .map_err(|_| Error::Config(format!("invalid CORS origin '{}'", o)))
                })
                .collect::<Result<Vec<_>>>()?;
            explore_cors(AllowOrigin::list(origins))
        };
        Ok(Self { service, cors })
    }

    /// # Endpoints
    ///
    /// - `GET /health`
    /// - `GET /collections`, `GET /collections/{collection}`
    /// - `GET|POST /{collection}/_aggregate`
    /// - `GET|POST /{collection}/_geoaggregate`
    /// - `GET /{collection}/_geoaggregate/{geohash}`
    /// - `GET /{collection}/_geoaggregate/{z}/{x}/{y}`
    pub fn router(&self) -> Router {
        let state = AppState {
            service: self.service.clone(),
        };

        Router::new()
            .route("/health", get(handlers::health))
            // Catalog
            .route("/collections", get(handlers::list_collections))
            .route("/collections/:collection", get(handlers::get_collection))
            // Aggregations
            .route(
                "/:collection/_aggregate",
                get(handlers::aggregate_get).post(handlers::aggregate_post),
            )
            .route(
                "/:collection/_geoaggregate",
                get(handlers::geoaggregate_get).post(handlers::geoaggregate_post),
            )
            .route(
                "/:collection/_geoaggregate/:geohash",
                get(handlers::geoaggregate_geohash),
            )
            .route(
                "/:collection/_geoaggregate/:z/:x/:y",
                get(handlers::geoaggregate_tile),
            )
            .with_state(state)
            .layer(self.cors.clone())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

/// Browsers may send the partition header and read the cache lifetime.
fn explore_cors(origin: AllowOrigin) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("partition-filter"),
        ])
        .expose_headers([header::CACHE_CONTROL])
}

