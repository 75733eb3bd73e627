//! The search-and-enrichment run, observed as a stream of [`SearchEvent`]s.
//!
//! Phases, in order: generating queries, searching, deduplicating (with
//! previews and cache lookup), enriching in batches, complete. Every run ends
//! with a `done` event unless it was cancelled.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache_gate::CacheGate;
use crate::config::{Config, PipelineSettings};
use crate::data_models::{Candidate, DeduplicatedResult, PreviewCandidate, SearchHistory, SearchRequest};
use crate::db::CandidateStore;
use crate::dedup::deduplicate;
use crate::enrichment::EnrichmentWorker;
use crate::error::{PipelineError, ServiceError};
use crate::oracle::{AnthropicOracle, LlmOracle};
use crate::query_diversifier;
use crate::query_generator::QueryGenerator;
use crate::rate_limiter::{RateLimiter, RetryPolicy};
use crate::scrapper::{PageScraper, ScrapeBreaker, scraper_from_config};
use crate::search::{PageWindow, SearchBackend, SearchExecutor, SerperClient};

const EVENT_BUFFER: usize = 64;
const QUERY_GENERATION_RETRIES: u32 = 3;
const NO_PROFILES_MESSAGE: &str = "No profiles found. Try a different query.";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Generating,
    Searching,
    Deduplicating,
    Enriching,
    Complete,
}

/// Counters attached to progress events; only the ones known so far are set.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched: Option<usize>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Progress {
    pub phase: Phase,
    pub detail: String,
    pub progress: u8,
    pub counts: Counts,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DoneSummary {
    pub count: usize,
    pub has_more: bool,
    pub next_offset: u32,
}

/// One observable step of a search run.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum SearchEvent {
    Progress(Progress),
    Queries(Vec<String>),
    Dork(String),
    Preview(PreviewCandidate),
    Candidate(Box<Candidate>),
    Activity(String),
    Status(String),
    Error { message: String },
    Done(DoneSummary),
}

impl SearchEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SearchEvent::Progress(_) => "progress",
            SearchEvent::Queries(_) => "queries",
            SearchEvent::Dork(_) => "dork",
            SearchEvent::Preview(_) => "preview",
            SearchEvent::Candidate(_) => "candidate",
            SearchEvent::Activity(_) => "activity",
            SearchEvent::Status(_) => "status",
            SearchEvent::Error { .. } => "error",
            SearchEvent::Done(_) => "done",
        }
    }

    /// The event body without its name.
    pub fn payload(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(mut value) => value
                .get_mut("data")
                .map(serde_json::Value::take)
                .unwrap_or_default(),
            Err(e) => {
                log::error!("failed to serialize {} event: {e}", self.name());
                serde_json::Value::Null
            }
        }
    }

    fn error(message: impl Into<String>) -> SearchEvent {
        SearchEvent::Error {
            message: message.into(),
        }
    }
}

/// Sending half of a run's event stream.
struct EventSink {
    tx: mpsc::Sender<SearchEvent>,
    cancel: CancellationToken,
    candidates: AtomicUsize,
}

impl EventSink {
    async fn send(&self, event: SearchEvent) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if matches!(event, SearchEvent::Candidate(_)) {
            self.candidates.fetch_add(1, Ordering::SeqCst);
        }
        self.tx.send(event).await.map_err(|_| {
            self.cancel.cancel();
            PipelineError::Cancelled
        })
    }

    async fn progress(
        &self,
        phase: Phase,
        detail: impl Into<String>,
        progress: u8,
        counts: Counts,
    ) -> Result<(), PipelineError> {
        self.send(SearchEvent::Progress(Progress {
            phase,
            detail: detail.into(),
            progress,
            counts,
        }))
        .await
    }

    fn candidates_sent(&self) -> usize {
        self.candidates.load(Ordering::SeqCst)
    }
}

/// Enrichment progress after `done` of `total` profiles, within 55..=95.
pub fn enrichment_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 55;
    }
    let share = (done as f64 / total as f64 * 40.0).round() as u8;
    (55 + share).min(95)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

pub struct Pipeline {
    query_generator: QueryGenerator,
    search: SearchExecutor,
    store: Arc<dyn CandidateStore>,
    cache_gate: CacheGate,
    worker: EnrichmentWorker,
    settings: PipelineSettings,
}

impl Pipeline {
    /// Limiters are created here and shared by every run of this pipeline.
    pub fn new(
        search_backend: Arc<dyn SearchBackend>,
        scraper: Arc<dyn PageScraper>,
        oracle: Arc<dyn LlmOracle>,
        store: Arc<dyn CandidateStore>,
        settings: PipelineSettings,
    ) -> Pipeline {
        let scrape_limiter = Arc::new(RateLimiter::new(
            settings.scrape_max_concurrent,
            settings.scrape_delay,
        ));
        let llm_limiter = Arc::new(RateLimiter::new(
            settings.llm_max_concurrent,
            settings.llm_delay,
        ));
        let llm_retry = RetryPolicy::new(settings.llm_max_retries, settings.retry_base_delay);

        Pipeline {
            query_generator: QueryGenerator::new(oracle.clone()).with_retry_policy(
                RetryPolicy::new(QUERY_GENERATION_RETRIES, settings.retry_base_delay),
            ),
            search: SearchExecutor::new(search_backend),
            cache_gate: CacheGate::new(store.clone(), settings.cache_max_age_hours),
            worker: EnrichmentWorker::new(
                scraper,
                oracle,
                store.clone(),
                scrape_limiter,
                llm_limiter,
                llm_retry,
            ),
            store,
            settings,
        }
    }

    /// Serper, Firecrawl (or direct fetching) and Anthropic clients from `config`.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn CandidateStore>,
    ) -> Result<Pipeline, ServiceError> {
        let search = Arc::new(SerperClient::from_config(config)?);
        let scraper: Arc<dyn PageScraper> = Arc::from(scraper_from_config(config)?);
        let oracle = Arc::new(AnthropicOracle::from_config(config)?);
        Ok(Pipeline::new(
            search,
            scraper,
            oracle,
            store,
            config.pipeline.clone(),
        ))
    }

    pub fn query_generator(&self) -> &QueryGenerator {
        &self.query_generator
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Starts a run in the background and returns its event stream.
    ///
    /// The run stops when `cancel` fires or the stream is dropped; a stopped
    /// run sends nothing further.
    pub fn run(
        self: &Arc<Self>,
        request: SearchRequest,
        cancel: CancellationToken,
    ) -> ReceiverStream<SearchEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let pipeline = Arc::clone(self);
        let run_id = nanoid::nanoid!(10);
        let cancel = cancel.child_token();

        let span = tracing::info_span!("search", run_id = %run_id);
        tokio::spawn(
            async move {
                log::info!("search started: {:?}", request.query);
                let sink = EventSink {
                    tx,
                    cancel: cancel.clone(),
                    candidates: AtomicUsize::new(0),
                };
                tokio::select! {
                    _ = cancel.cancelled() => log::info!("search cancelled"),
                    _ = sink.tx.closed() => {
                        log::info!("event stream dropped, cancelling search");
                        cancel.cancel();
                    }
                    _ = pipeline.drive(&request, &sink) => {}
                }
            }
            .instrument(span),
        );

        ReceiverStream::new(rx)
    }

    async fn drive(&self, request: &SearchRequest, sink: &EventSink) {
        let outcome = AssertUnwindSafe(self.execute(request, sink))
            .catch_unwind()
            .await;

        let message = match outcome {
            Ok(Ok(())) | Ok(Err(PipelineError::Cancelled)) => return,
            Ok(Err(e)) => {
                log::error!("search pipeline error: {e}");
                e.to_string()
            }
            Err(panic) => {
                log::error!("search pipeline panicked: {}", panic_message(&*panic));
                "Search pipeline failed".to_string()
            }
        };

        let done = SearchEvent::Done(DoneSummary {
            count: sink.candidates_sent(),
            has_more: false,
            next_offset: 0,
        });
        // The client may already be gone; nothing more to do then.
        if sink.send(SearchEvent::error(message)).await.is_ok() {
            let _ = sink.send(done).await;
        }
    }

    async fn execute(&self, request: &SearchRequest, sink: &EventSink) -> Result<(), PipelineError> {
        let query = request.query.trim();

        // Phase 1: queries
        sink.progress(
            Phase::Generating,
            "Generating search queries...",
            5,
            Counts::default(),
        )
        .await?;

        let dorks = self.query_generator.generate_queries(query).await?;
        let mut queries = dorks.clone();
        if request.wide_net {
            queries.extend(query_diversifier::expand(query));
        }
        let primary = dorks
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::QueryGeneration("no queries generated".to_string()))?;

        sink.send(SearchEvent::Queries(queries.clone())).await?;
        sink.send(SearchEvent::Dork(primary.clone())).await?;
        sink.progress(
            Phase::Generating,
            format!("Generated {} search queries", queries.len()),
            15,
            Counts {
                queries: Some(queries.len()),
                ..Default::default()
            },
        )
        .await?;

        // Phase 2: search
        sink.progress(
            Phase::Searching,
            "Searching across all queries...",
            20,
            Counts {
                queries: Some(queries.len()),
                ..Default::default()
            },
        )
        .await?;

        let results_per_page = self.settings.results_per_page;
        let window = PageWindow {
            start_page: request.start_page(results_per_page),
            pages: request.pages_to_fetch(self.settings.max_pages),
            page_size: results_per_page,
        };
        let outcome = self.search.search_many(&queries, window).await;
        for failure in outcome.failures {
            sink.send(SearchEvent::error(failure)).await?;
        }
        let raw_count = outcome.results.len();

        sink.progress(
            Phase::Searching,
            format!("Found {raw_count} raw results"),
            40,
            Counts {
                queries: Some(queries.len()),
                raw_results: Some(raw_count),
                ..Default::default()
            },
        )
        .await?;

        // Phase 3: dedup, previews, cache
        sink.progress(
            Phase::Deduplicating,
            "Deduplicating results...",
            42,
            Counts {
                raw_results: Some(raw_count),
                ..Default::default()
            },
        )
        .await?;

        let unique = deduplicate(outcome.results);
        if unique.is_empty() {
            sink.send(SearchEvent::Status(NO_PROFILES_MESSAGE.to_string()))
                .await?;
            sink.send(SearchEvent::Done(DoneSummary {
                count: 0,
                has_more: false,
                next_offset: 0,
            }))
            .await?;
            return Ok(());
        }

        for result in &unique {
            sink.send(SearchEvent::Preview(PreviewCandidate::from_result(result)))
                .await?;
        }
        sink.progress(
            Phase::Deduplicating,
            format!("{} unique profiles", unique.len()),
            50,
            Counts {
                raw_results: Some(raw_count),
                unique_results: Some(unique.len()),
                ..Default::default()
            },
        )
        .await?;

        self.store
            .ping()
            .await
            .map_err(|e| PipelineError::StoreUnavailable(format!("{e:#}")))?;

        let urls: Vec<String> = unique.iter().map(|r| r.link().to_string()).collect();
        let split = self.cache_gate.partition(&urls).await;
        let mut pending: HashSet<String> = split.to_process.into_iter().collect();
        let mut cached_count = 0;

        if !split.cached.is_empty() {
            match self.store.select_by_urls(&split.cached).await {
                Ok(candidates) => {
                    let found: HashSet<String> =
                        candidates.iter().map(|c| c.profile_url().to_string()).collect();
                    for candidate in candidates {
                        cached_count += 1;
                        sink.send(SearchEvent::Candidate(Box::new(candidate)))
                            .await?;
                    }
                    pending.extend(split.cached.into_iter().filter(|u| !found.contains(u)));
                }
                Err(e) => {
                    log::warn!("failed to load cached candidates, enriching them again: {e:#}");
                    pending.extend(split.cached);
                }
            }
        }
        if cached_count > 0 {
            sink.send(SearchEvent::Activity(format!(
                "Loaded {cached_count} recently enriched candidates from cache"
            )))
            .await?;
        }

        let to_enrich: Vec<&DeduplicatedResult> = unique
            .iter()
            .filter(|r| pending.contains(r.link()))
            .collect();

        sink.progress(
            Phase::Deduplicating,
            format!("{cached_count} cached, {} to enrich", to_enrich.len()),
            55,
            Counts {
                raw_results: Some(raw_count),
                unique_results: Some(unique.len()),
                cached: Some(cached_count),
                ..Default::default()
            },
        )
        .await?;

        let history = SearchHistory {
            natural_language_query: query.to_string(),
            generated_dork: primary,
            result_count: unique.len() as u32,
            query_count: queries.len() as u32,
            wide_net: request.wide_net,
            pages_fetched: window.pages,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.record_search(&history).await {
            log::error!("failed to save search history: {e:#}");
        }

        // Phase 4: enrichment
        let breaker = ScrapeBreaker::new(self.settings.scrape_failure_threshold);
        let mut breaker_reported = false;
        let mut enriched = 0;
        let batch_size = self.settings.enrich_batch_size.max(1);
        let total = to_enrich.len();

        for (index, batch) in to_enrich.chunks(batch_size).enumerate() {
            let first = index * batch_size;
            let last = first + batch.len();
            sink.progress(
                Phase::Enriching,
                format!("Enriching profiles {}-{} of {}...", first + 1, last, total),
                enrichment_progress(last, total),
                Counts {
                    raw_results: Some(raw_count),
                    unique_results: Some(unique.len()),
                    cached: Some(cached_count),
                    enriched: Some(enriched),
                    ..Default::default()
                },
            )
            .await?;

            let outcomes = join_all(
                batch
                    .iter()
                    .map(|result| self.worker.enrich(result, query, &breaker)),
            )
            .await;

            for (result, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(Some(candidate)) => {
                        enriched += 1;
                        sink.send(SearchEvent::Candidate(Box::new(candidate)))
                            .await?;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::error!("error processing {}: {e}", result.link());
                        sink.send(SearchEvent::error(format!(
                            "Failed to process {}",
                            result.link()
                        )))
                        .await?;
                    }
                }
            }

            if breaker.is_open() && !breaker_reported {
                breaker_reported = true;
                sink.send(SearchEvent::Activity(format!(
                    "Scraping paused after {} consecutive failures; using search snippets for the remaining profiles",
                    self.settings.scrape_failure_threshold
                )))
                .await?;
            }
        }

        // Phase 5: done
        let count = sink.candidates_sent();
        let unique_count = unique.len() as u32;
        let has_more = unique_count
            >= request
                .page_budget(self.settings.max_pages)
                .saturating_mul(results_per_page);
        let next_offset = request.offset.saturating_add(unique_count);

        sink.progress(
            Phase::Complete,
            format!("Found {count} candidates"),
            100,
            Counts {
                raw_results: Some(raw_count),
                unique_results: Some(unique.len()),
                cached: Some(cached_count),
                enriched: Some(enriched),
                ..Default::default()
            },
        )
        .await?;
        sink.send(SearchEvent::Done(DoneSummary {
            count,
            has_more,
            next_offset,
        }))
        .await?;

        log::info!("search finished with {count} candidates");
        Ok(())
    }
}
