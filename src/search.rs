//! Search-engine access and parallel query fan-out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::data_models::RawResult;
use crate::error::ServiceError;

const SERVICE: &str = "serper";
const DEFAULT_BASE_URL: &str = "https://google.serper.dev";

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// One page of organic results. `page` is 1-based.
    async fn search(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<RawResult>, ServiceError>;
}

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: u32,
    page: u32,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<RawResult>,
}

/// Google search through the Serper API.
pub struct SerperClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SerperClient {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::http(SERVICE, e))?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let api_key = config.require("SERPER_API_KEY", &config.serper_api_key)?;
        Ok(Self::new(api_key, config.http_timeout)?.with_base_url(&config.serper_base_url))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SearchBackend for SerperClient {
    async fn search(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<RawResult>, ServiceError> {
        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest {
                q: query,
                num: page_size,
                page,
            })
            .send()
            .await
            .map_err(|e| ServiceError::http(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::decode(SERVICE, e.to_string()))?;
        Ok(parsed.organic)
    }
}

/// Pages of a paginated fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub start_page: u32,
    pub pages: u32,
    pub page_size: u32,
}

impl PageWindow {
    pub fn page_numbers(self) -> std::ops::Range<u32> {
        self.start_page..self.start_page.saturating_add(self.pages)
    }
}

/// Everything a fan-out produced: the hits of every successful call and a
/// message for every failed one.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub results: Vec<RawResult>,
    pub failures: Vec<String>,
}

pub struct SearchExecutor {
    backend: Arc<dyn SearchBackend>,
}

impl SearchExecutor {
    pub fn new(backend: Arc<dyn SearchBackend>) -> SearchExecutor {
        SearchExecutor { backend }
    }

    /// Issues one call per (query, page) pair, all concurrently.
    ///
    /// Results are flattened in query order then page order. Failed calls are
    /// logged and reported in [`SearchOutcome::failures`].
    pub async fn search_many(&self, queries: &[String], window: PageWindow) -> SearchOutcome {
        let calls = queries.iter().flat_map(|query| {
            window.page_numbers().map(move |page| async move {
                let outcome = self.backend.search(query, page, window.page_size).await;
                (query, page, outcome)
            })
        });

        let mut outcome = SearchOutcome::default();
        for (query, page, result) in join_all(calls).await {
            match result {
                Ok(hits) => outcome.results.extend(hits),
                Err(e) => {
                    log::error!("search failed for {query:?} page {page}: {e}");
                    outcome
                        .failures
                        .push(format!("Search failed for query \"{query}\" (page {page}): {e}"));
                }
            }
        }
        outcome
    }
}
