use super::request::SearchRequest;
use super::response::EngineResponse;
use crate::error::Result;
use async_trait::async_trait;

/// Backing search engine that runs compiled aggregation requests.
#[async_trait]
pub trait AggregationBackend: Send + Sync {
    /// Run `request` against `index`.
    async fn search(&self, index: &str, request: &SearchRequest) -> Result<EngineResponse>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
