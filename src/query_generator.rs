use std::sync::Arc;

use crate::error::{PipelineError, ServiceError};
use crate::oracle::LlmOracle;
use crate::parse::parse_json;
use crate::prompts::{DORK_GENERATOR_SYSTEM, MULTI_DORK_GENERATOR_SYSTEM};
use crate::rate_limiter::RetryPolicy;

const MULTI_DORK_MAX_TOKENS: u32 = 512;
const SINGLE_DORK_MAX_TOKENS: u32 = 256;

/// Turns a recruiting request into search-engine queries ("dorks").
pub struct QueryGenerator {
    oracle: Arc<dyn LlmOracle>,
    retry: RetryPolicy,
}

impl QueryGenerator {
    pub fn new(oracle: Arc<dyn LlmOracle>) -> QueryGenerator {
        QueryGenerator {
            oracle,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> QueryGenerator {
        self.retry = retry;
        self
    }

    /// Up to three query variants, falling back to a single query when the
    /// multi-variant answer is unusable. Never returns an empty list.
    pub async fn generate_queries(&self, request: &str) -> Result<Vec<String>, PipelineError> {
        match self.generate_variants(request).await {
            Ok(queries) if !queries.is_empty() => return Ok(queries),
            Ok(_) => log::warn!("multi-query generation returned no usable queries"),
            Err(e) => log::warn!("multi-query generation failed: {e}"),
        }

        let single = self
            .generate_single(request)
            .await
            .map_err(|e| PipelineError::QueryGeneration(e.to_string()))?;
        if single.is_empty() {
            return Err(PipelineError::QueryGeneration(
                "oracle returned an empty query".to_string(),
            ));
        }
        Ok(vec![single])
    }

    async fn generate_variants(&self, request: &str) -> Result<Vec<String>, ServiceError> {
        let raw = self
            .retry
            .run_if(
                || {
                    self.oracle
                        .complete(MULTI_DORK_GENERATOR_SYSTEM, request, MULTI_DORK_MAX_TOKENS)
                },
                ServiceError::is_transient,
            )
            .await?;

        let variants: Vec<serde_json::Value> = match parse_json(&raw) {
            Ok(variants) => variants,
            Err(e) => {
                log::debug!("multi-query answer is not a JSON array: {e}");
                return Ok(Vec::new());
            }
        };
        Ok(variants
            .iter()
            .filter_map(|v| v.as_str())
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect())
    }

    /// One query string, trimmed.
    pub async fn generate_single(&self, request: &str) -> Result<String, ServiceError> {
        let raw = self
            .retry
            .run_if(
                || {
                    self.oracle
                        .complete(DORK_GENERATOR_SYSTEM, request, SINGLE_DORK_MAX_TOKENS)
                },
                ServiceError::is_transient,
            )
            .await?;
        Ok(raw.trim().to_string())
    }
}
