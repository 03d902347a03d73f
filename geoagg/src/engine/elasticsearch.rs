//! Elasticsearch backend over HTTP.

use super::backend::AggregationBackend;
use super::request::SearchRequest;
use super::response::EngineResponse;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

pub struct ElasticsearchBackend {
    client: Client,
    url: String,
}

impl ElasticsearchBackend {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    pub fn search_url(&self, index: &str) -> String {
        format!("{}/{}/_search", self.url, index)
    }
}

#[async_trait]
impl AggregationBackend for ElasticsearchBackend {
    async fn search(&self, index: &str, request: &SearchRequest) -> Result<EngineResponse> {
        let response = self
            .client
            .post(self.search_url(index))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("elasticsearch request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BackendUnavailable(format!(
                "elasticsearch search on '{}' failed ({}): {}",
                index, status, body
            )));
        }

        response
            .json::<EngineResponse>()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("unreadable elasticsearch response: {}", e)))
    }

    fn name(&self) -> &'static str {
        "elasticsearch"
    }
}
