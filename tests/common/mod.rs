#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use talent_harvest::config::PipelineSettings;
use talent_harvest::data_models::{Candidate, CandidateData, RawResult, SearchHistory, SearchRequest};
use talent_harvest::db::{CandidateStore, MemoryCandidateStore};
use talent_harvest::error::ServiceError;
use talent_harvest::oracle::LlmOracle;
use talent_harvest::pipeline::{Pipeline, SearchEvent};
use talent_harvest::prompts::{
    CANDIDATE_RANKER_SYSTEM, DORK_GENERATOR_SYSTEM, MULTI_DORK_GENERATOR_SYSTEM,
    STRUCTURED_EXTRACTOR_SYSTEM,
};
use talent_harvest::scrapper::PageScraper;
use talent_harvest::search::SearchBackend;

pub const PRIMARY_DORK: &str = r#"site:linkedin.com/in "rust" "distributed systems""#;

/// Millisecond delays so pipeline tests run fast.
pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        scrape_delay: Duration::from_millis(1),
        llm_delay: Duration::from_millis(1),
        retry_base_delay: Duration::from_millis(1),
        ..PipelineSettings::default()
    }
}

pub fn linkedin_result(slug: &str, position: u32) -> RawResult {
    RawResult::new(
        &format!("Person {slug} - Rust Engineer - Acme | LinkedIn"),
        &format!("https://www.linkedin.com/in/{slug}"),
        "Rust engineer working on distributed systems",
        position,
    )
}

/// Returns canned results for page 1 of every query and nothing afterwards.
pub struct FakeSearch {
    pub results: Vec<RawResult>,
    pub calls: Mutex<Vec<(String, u32)>>,
    /// Queries containing this text fail with HTTP 502.
    pub fail_matching: Option<String>,
}

impl FakeSearch {
    pub fn new(results: Vec<RawResult>) -> Arc<Self> {
        Arc::new(Self {
            results,
            calls: Mutex::new(Vec::new()),
            fail_matching: None,
        })
    }

    pub fn failing_on(results: Vec<RawResult>, pattern: &str) -> Arc<Self> {
        Arc::new(Self {
            results,
            calls: Mutex::new(Vec::new()),
            fail_matching: Some(pattern.to_string()),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        let mut queries: Vec<String> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(q, _)| q.clone())
            .collect();
        queries.dedup();
        queries
    }
}

#[async_trait]
impl SearchBackend for FakeSearch {
    async fn search(
        &self,
        query: &str,
        page: u32,
        _page_size: u32,
    ) -> Result<Vec<RawResult>, ServiceError> {
        self.calls.lock().unwrap().push((query.to_string(), page));
        if self
            .fail_matching
            .as_deref()
            .is_some_and(|pattern| query.contains(pattern))
        {
            return Err(ServiceError::Status {
                service: "fake-search",
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        if page == 1 && query == PRIMARY_DORK {
            Ok(self.results.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

/// Serves a fixed markdown page, optionally after a delay.
pub struct FakeScraper {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub fail: bool,
}

impl FakeScraper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: false,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: true,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageScraper for FakeScraper {
    async fn scrape(&self, url: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(ServiceError::Status {
                service: "fake-scraper",
                status: 403,
                body: String::new(),
            });
        }
        Ok(format!(
            "# Profile\n{url}\nOpen to work. Code at https://github.com/someone\nStaff Engineer at Acme since 2019"
        ))
    }
}

/// Answers each system prompt with a canned reply.
pub struct FakeOracle {
    pub multi_dork: String,
    pub single_dork: String,
    pub calls: Mutex<Vec<String>>,
    /// Extraction requests whose page text contains this URL fail with HTTP 500.
    pub fail_extraction_for: Option<String>,
}

impl FakeOracle {
    pub fn new() -> Arc<Self> {
        Self::with_multi_dork(&serde_json::json!([PRIMARY_DORK]).to_string())
    }

    pub fn with_multi_dork(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            multi_dork: reply.to_string(),
            single_dork: PRIMARY_DORK.to_string(),
            calls: Mutex::new(Vec::new()),
            fail_extraction_for: None,
        })
    }

    pub fn failing_extraction_for(url: &str) -> Arc<Self> {
        Arc::new(Self {
            multi_dork: serde_json::json!([PRIMARY_DORK]).to_string(),
            single_dork: PRIMARY_DORK.to_string(),
            calls: Mutex::new(Vec::new()),
            fail_extraction_for: Some(url.to_string()),
        })
    }

    pub fn calls_for(&self, system: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == system)
            .count()
    }
}

#[async_trait]
impl LlmOracle for FakeOracle {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        _max_tokens: u32,
    ) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push(system.to_string());
        if system == STRUCTURED_EXTRACTOR_SYSTEM
            && self
                .fail_extraction_for
                .as_deref()
                .is_some_and(|url| user.contains(url))
        {
            return Err(ServiceError::Status {
                service: "fake-oracle",
                status: 500,
                body: "internal error".to_string(),
            });
        }
        let reply = if system == MULTI_DORK_GENERATOR_SYSTEM {
            self.multi_dork.clone()
        } else if system == DORK_GENERATOR_SYSTEM {
            self.single_dork.clone()
        } else if system == STRUCTURED_EXTRACTOR_SYSTEM {
            serde_json::json!({
                "full_name": "Jane Doe",
                "current_role": "Staff Engineer",
                "current_company": "Acme",
                "location": "Berlin",
                "tech_stack": ["Rust", "Kafka"],
                "career_highlights": ["Led storage rewrite"],
                "company_pedigree": [],
                "experience": [
                    {"title": "Staff Engineer", "company": "Acme", "months": 48},
                    {"title": "Engineer", "company": "Initech", "months": 24}
                ],
                "education": []
            })
            .to_string()
        } else if system == CANDIDATE_RANKER_SYSTEM {
            r#"```json
{"fitScore": 82, "fitReasoning": "Deep Rust and distributed systems background."}
```"#
                .to_string()
        } else {
            return Err(ServiceError::decode("fake-oracle", "unexpected prompt"));
        };
        Ok(reply)
    }
}

/// A store whose connection is down.
pub struct UnreachableStore;

#[async_trait]
impl CandidateStore for UnreachableStore {
    async fn ping(&self) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }
    async fn upsert(&self, _data: &CandidateData) -> anyhow::Result<Candidate> {
        anyhow::bail!("connection refused")
    }
    async fn select_by_urls(&self, _urls: &[String]) -> anyhow::Result<Vec<Candidate>> {
        anyhow::bail!("connection refused")
    }
    async fn select_fresh(
        &self,
        _urls: &[String],
        _cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<String>> {
        anyhow::bail!("connection refused")
    }
    async fn record_search(&self, _history: &SearchHistory) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }
}

/// In-memory store that refuses to save one profile.
pub struct RejectingStore {
    pub inner: MemoryCandidateStore,
    pub rejected_url: String,
}

impl RejectingStore {
    pub fn new(rejected_url: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCandidateStore::new(),
            rejected_url: rejected_url.to_string(),
        })
    }
}

#[async_trait]
impl CandidateStore for RejectingStore {
    async fn ping(&self) -> anyhow::Result<()> {
        self.inner.ping().await
    }
    async fn upsert(&self, data: &CandidateData) -> anyhow::Result<Candidate> {
        if data.profile_url == self.rejected_url {
            anyhow::bail!("write conflict on {}", data.profile_url);
        }
        self.inner.upsert(data).await
    }
    async fn select_by_urls(&self, urls: &[String]) -> anyhow::Result<Vec<Candidate>> {
        self.inner.select_by_urls(urls).await
    }
    async fn select_fresh(
        &self,
        urls: &[String],
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<String>> {
        self.inner.select_fresh(urls, cutoff).await
    }
    async fn record_search(&self, history: &SearchHistory) -> anyhow::Result<()> {
        self.inner.record_search(history).await
    }
}

pub struct Harness {
    pub search: Arc<FakeSearch>,
    pub scraper: Arc<FakeScraper>,
    pub oracle: Arc<FakeOracle>,
    pub store: Arc<MemoryCandidateStore>,
}

impl Harness {
    pub fn new(results: Vec<RawResult>) -> Self {
        Self {
            search: FakeSearch::new(results),
            scraper: FakeScraper::new(),
            oracle: FakeOracle::new(),
            store: Arc::new(MemoryCandidateStore::new()),
        }
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline_with_store(self.store.clone())
    }

    pub fn pipeline_with_store(&self, store: Arc<dyn CandidateStore>) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            self.search.clone(),
            self.scraper.clone(),
            self.oracle.clone(),
            store,
            fast_settings(),
        ))
    }
}

/// Runs `request` to completion and collects every event.
pub async fn collect_events(pipeline: &Arc<Pipeline>, request: SearchRequest) -> Vec<SearchEvent> {
    pipeline
        .run(request, CancellationToken::new())
        .collect()
        .await
}

pub fn candidates(events: &[SearchEvent]) -> Vec<&Candidate> {
    events
        .iter()
        .filter_map(|e| match e {
            SearchEvent::Candidate(c) => Some(c.as_ref()),
            _ => None,
        })
        .collect()
}

pub fn error_messages(events: &[SearchEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            SearchEvent::Error { message } => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

pub fn names(events: &[SearchEvent]) -> Vec<&'static str> {
    events.iter().map(SearchEvent::name).collect()
}
