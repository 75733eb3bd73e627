mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use talent_harvest::data_models::{Candidate, CandidateData, SearchRequest};
use talent_harvest::pipeline::{DoneSummary, Phase, SearchEvent};
use talent_harvest::prompts::DORK_GENERATOR_SYSTEM;

use common::*;

fn twelve_results_with_two_duplicates() -> Vec<talent_harvest::data_models::RawResult> {
    let mut results: Vec<_> = (0..10)
        .map(|i| linkedin_result(&format!("p{i}"), i + 1))
        .collect();
    let mut dup_slash = linkedin_result("p3", 11);
    dup_slash.link.push('/');
    let mut dup_query = linkedin_result("p7", 12);
    dup_query.link.push_str("?trk=public_profile");
    results.push(dup_slash);
    results.push(dup_query);
    results
}

fn last_done(events: &[SearchEvent]) -> &DoneSummary {
    match events.last() {
        Some(SearchEvent::Done(done)) => done,
        other => panic!("expected a final done event, got {other:?}"),
    }
}

fn activities(events: &[SearchEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            SearchEvent::Activity(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_full_run_enriches_every_unique_profile() {
    let harness = Harness::new(twelve_results_with_two_duplicates());
    let pipeline = harness.pipeline();

    let events = collect_events(&pipeline, SearchRequest::new("senior rust engineers")).await;

    let found = candidates(&events);
    assert_eq!(found.len(), 10);
    for candidate in &found {
        let score = candidate.data.fit_score.expect("fit score is always set");
        assert!((1..=100).contains(&score));
        assert_eq!(score, 82);
        assert_eq!(candidate.data.full_name, "Jane Doe");
        assert_eq!(
            candidate.data.github_url.as_deref(),
            Some("https://github.com/someone")
        );
        assert!(candidate.data.total_yoe > 0.0);
        assert!(candidate.data.raw_scraped_markdown.is_some());
    }

    let previews = names(&events).iter().filter(|n| **n == "preview").count();
    assert_eq!(previews, 10);

    let done = last_done(&events);
    assert_eq!(done.count, 10);
    assert!(!done.has_more);
    assert_eq!(done.next_offset, 10);

    assert_eq!(harness.store.len(), 10);
    let history = harness.store.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].result_count, 10);
    assert_eq!(history[0].generated_dork, PRIMARY_DORK);
    assert_eq!(harness.scraper.call_count(), 10);
}

#[tokio::test]
async fn test_events_arrive_in_phase_order() {
    let harness = Harness::new(twelve_results_with_two_duplicates());
    let events = collect_events(&harness.pipeline(), SearchRequest::new("rust")).await;

    let all = names(&events);
    assert_eq!(all[..3], ["progress", "queries", "dork"]);
    assert!(matches!(&events[1], SearchEvent::Queries(q) if q == &vec![PRIMARY_DORK.to_string()]));
    assert!(matches!(&events[2], SearchEvent::Dork(d) if d == PRIMARY_DORK));

    let progress: Vec<(Phase, u8)> = events
        .iter()
        .filter_map(|e| match e {
            SearchEvent::Progress(p) => Some((p.phase, p.progress)),
            _ => None,
        })
        .collect();
    assert_eq!(progress.first(), Some(&(Phase::Generating, 5)));
    assert_eq!(progress.last(), Some(&(Phase::Complete, 100)));
    assert!(progress.windows(2).all(|w| w[0].1 <= w[1].1));

    let first_candidate = all.iter().position(|n| *n == "candidate");
    let last_preview = all.iter().rposition(|n| *n == "preview");
    assert!(last_preview < first_candidate);
}

#[tokio::test]
async fn test_no_results_ends_with_status_and_empty_done() {
    let harness = Harness::new(Vec::new());
    let events = collect_events(&harness.pipeline(), SearchRequest::new("nobody")).await;

    let all = names(&events);
    assert_eq!(all[all.len() - 2..], ["status", "done"]);
    assert_eq!(
        last_done(&events),
        &DoneSummary {
            count: 0,
            has_more: false,
            next_offset: 0
        }
    );
    assert_eq!(harness.scraper.call_count(), 0);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_unreachable_store_reports_error_then_done() {
    let harness = Harness::new(twelve_results_with_two_duplicates());
    let pipeline = harness.pipeline_with_store(Arc::new(UnreachableStore));

    let events = collect_events(&pipeline, SearchRequest::new("rust")).await;

    let error = events
        .iter()
        .find_map(|e| match e {
            SearchEvent::Error { message } => Some(message.clone()),
            _ => None,
        })
        .expect("an error event");
    assert!(error.contains("candidate store unavailable"), "{error}");
    assert!(candidates(&events).is_empty());
    assert_eq!(last_done(&events).count, 0);
    assert_eq!(harness.scraper.call_count(), 0);
}

#[tokio::test]
async fn test_unusable_multi_query_answer_falls_back_to_single() {
    let mut harness = Harness::new(twelve_results_with_two_duplicates());
    harness.oracle = FakeOracle::with_multi_dork("Sorry, I can only write one query.");

    let events = collect_events(&harness.pipeline(), SearchRequest::new("rust")).await;

    assert!(
        events
            .iter()
            .any(|e| matches!(e, SearchEvent::Dork(d) if d == PRIMARY_DORK))
    );
    assert_eq!(harness.oracle.calls_for(DORK_GENERATOR_SYSTEM), 1);
    assert_eq!(candidates(&events).len(), 10);
}

#[tokio::test]
async fn test_fresh_cache_entries_skip_enrichment() {
    let harness = Harness::new(twelve_results_with_two_duplicates());
    let now = Utc::now();
    harness.store.insert_candidate(Candidate {
        id: "cached-1".to_string(),
        data: CandidateData {
            full_name: "Cached Person".to_string(),
            profile_url: "https://www.linkedin.com/in/p0".to_string(),
            fit_score: Some(91),
            ..Default::default()
        },
        created_at: now,
        updated_at: now,
    });

    let events = collect_events(&harness.pipeline(), SearchRequest::new("rust")).await;

    let found = candidates(&events);
    assert_eq!(found.len(), 10);
    assert_eq!(found[0].id, "cached-1");
    assert_eq!(found[0].data.fit_score, Some(91));
    assert_eq!(harness.scraper.call_count(), 9);
    assert!(
        activities(&events)
            .iter()
            .any(|a| a.starts_with("Loaded 1 recently enriched"))
    );
    assert_eq!(last_done(&events).count, 10);
}

#[tokio::test]
async fn test_stale_cache_entries_are_enriched_again() {
    let harness = Harness::new(twelve_results_with_two_duplicates());
    let stale = Utc::now() - chrono::Duration::hours(48);
    harness.store.insert_candidate(Candidate {
        id: "stale-1".to_string(),
        data: CandidateData {
            full_name: "Old Record".to_string(),
            profile_url: "https://www.linkedin.com/in/p0".to_string(),
            ..Default::default()
        },
        created_at: stale,
        updated_at: stale,
    });

    let events = collect_events(&harness.pipeline(), SearchRequest::new("rust")).await;

    assert_eq!(harness.scraper.call_count(), 10);
    let refreshed = harness
        .store
        .get("https://www.linkedin.com/in/p0")
        .expect("record is still there");
    assert_eq!(refreshed.id, "stale-1");
    assert_eq!(refreshed.data.full_name, "Jane Doe");
    assert!(refreshed.updated_at > stale);
    assert_eq!(candidates(&events).len(), 10);
}

#[tokio::test]
async fn test_wide_net_adds_cross_platform_queries() {
    let harness = Harness::new(twelve_results_with_two_duplicates());
    let mut request = SearchRequest::new("senior rust engineer");
    request.wide_net = true;

    let events = collect_events(&harness.pipeline(), request).await;

    let queries = events
        .iter()
        .find_map(|e| match e {
            SearchEvent::Queries(q) => Some(q.clone()),
            _ => None,
        })
        .expect("queries event");
    assert_eq!(queries.len(), 3);
    assert_eq!(queries[0], PRIMARY_DORK);
    assert!(queries[1].contains("github.com"));
    assert!(queries[2].contains("stackoverflow.com"));
    // three queries, three pages each
    assert_eq!(harness.search.calls.lock().unwrap().len(), 9);
}

#[tokio::test]
async fn test_full_first_page_reports_more_results() {
    let harness = Harness::new(twelve_results_with_two_duplicates());
    let mut request = SearchRequest::new("rust");
    request.max_pages = 1;

    let events = collect_events(&harness.pipeline(), request).await;

    let done = last_done(&events);
    assert!(done.has_more);
    assert_eq!(done.next_offset, 10);
}

#[tokio::test]
async fn test_follow_up_request_fetches_one_page_at_offset() {
    let harness = Harness::new(twelve_results_with_two_duplicates());
    let mut request = SearchRequest::new("rust");
    request.offset = 10;

    collect_events(&harness.pipeline(), request).await;

    let calls = harness.search.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![(PRIMARY_DORK.to_string(), 2)]);
}

#[tokio::test]
async fn test_scrape_breaker_falls_back_to_snippets() {
    let mut harness = Harness::new(twelve_results_with_two_duplicates());
    harness.scraper = FakeScraper::failing();

    let events = collect_events(&harness.pipeline(), SearchRequest::new("rust")).await;

    // the first batch trips the breaker, later profiles are never scraped
    assert_eq!(harness.scraper.call_count(), 3);
    assert!(
        activities(&events)
            .iter()
            .any(|a| a.starts_with("Scraping paused after 3 consecutive failures"))
    );
    let found = candidates(&events);
    assert_eq!(found.len(), 10);
    assert!(found.iter().all(|c| c.data.raw_scraped_markdown.is_none()));
}

#[tokio::test]
async fn test_cancelled_before_start_emits_nothing() {
    let harness = Harness::new(twelve_results_with_two_duplicates());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let events: Vec<SearchEvent> = harness
        .pipeline()
        .run(SearchRequest::new("rust"), cancel)
        .collect()
        .await;

    assert!(events.is_empty());
    assert!(harness.store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_stream_stops_enrichment() {
    let mut harness = Harness::new(twelve_results_with_two_duplicates());
    harness.scraper = FakeScraper::slow(Duration::from_secs(30));
    let pipeline = harness.pipeline();

    let mut stream = pipeline.run(SearchRequest::new("rust"), CancellationToken::new());
    while let Some(event) = stream.next().await {
        if event.name() == "preview" {
            break;
        }
    }
    drop(stream);

    // long enough for every scrape to finish had the run kept going
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_page_count_is_capped_by_settings() {
    let harness = Harness::new(twelve_results_with_two_duplicates());
    let mut request = SearchRequest::new("rust");
    request.max_pages = u32::MAX;

    let events = collect_events(&harness.pipeline(), request).await;

    assert_eq!(
        harness.search.calls.lock().unwrap().len(),
        fast_settings().max_pages as usize
    );
    assert!(error_messages(&events).is_empty());
    assert_eq!(last_done(&events).count, 10);
}

#[tokio::test]
async fn test_failed_extraction_skips_only_that_profile() {
    let failing_url = "https://www.linkedin.com/in/p4";
    let mut harness = Harness::new(twelve_results_with_two_duplicates());
    harness.oracle = FakeOracle::failing_extraction_for(failing_url);

    let events = collect_events(&harness.pipeline(), SearchRequest::new("rust")).await;

    assert_eq!(
        error_messages(&events),
        vec![format!("Failed to process {failing_url}")]
    );
    let found = candidates(&events);
    assert_eq!(found.len(), 9);
    assert!(found.iter().all(|c| c.profile_url() != failing_url));
    assert_eq!(last_done(&events).count, 9);
    assert!(harness.store.get(failing_url).is_none());
}

#[tokio::test]
async fn test_store_write_failure_drops_candidate_silently() {
    let rejected_url = "https://www.linkedin.com/in/p2";
    let harness = Harness::new(twelve_results_with_two_duplicates());
    let store = RejectingStore::new(rejected_url);

    let events = collect_events(
        &harness.pipeline_with_store(store.clone()),
        SearchRequest::new("rust"),
    )
    .await;

    assert!(error_messages(&events).is_empty());
    let found = candidates(&events);
    assert_eq!(found.len(), 9);
    assert!(found.iter().all(|c| c.profile_url() != rejected_url));
    assert_eq!(last_done(&events).count, 9);
    assert_eq!(store.inner.len(), 9);
}

#[tokio::test]
async fn test_failed_search_query_is_reported_and_run_completes() {
    let mut harness = Harness::new(Vec::new());
    harness.search = FakeSearch::failing_on(twelve_results_with_two_duplicates(), "github.com");
    let mut request = SearchRequest::new("senior rust engineer");
    request.wide_net = true;

    let events = collect_events(&harness.pipeline(), request).await;

    let errors = error_messages(&events);
    // one failure per page of the GitHub query
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|m| m.starts_with("Search failed for query")));
    assert!(errors.iter().all(|m| m.contains("github.com")));
    assert_eq!(candidates(&events).len(), 10);
    assert_eq!(last_done(&events).count, 10);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_enrichment_stops_the_run() {
    let mut harness = Harness::new(twelve_results_with_two_duplicates());
    harness.scraper = FakeScraper::slow(Duration::from_secs(30));
    let pipeline = harness.pipeline();
    let cancel = CancellationToken::new();

    let mut stream = pipeline.run(SearchRequest::new("rust"), cancel.clone());
    while let Some(event) = stream.next().await {
        if matches!(&event, SearchEvent::Progress(p) if p.phase == Phase::Enriching) {
            break;
        }
    }
    cancel.cancel();

    let rest: Vec<SearchEvent> = stream.collect().await;
    assert!(rest.iter().all(|e| !matches!(e, SearchEvent::Done(_))));
    assert!(candidates(&rest).is_empty());

    tokio::time::sleep(Duration::from_secs(600)).await;
    // at most the first batch had started scraping
    assert!(harness.scraper.call_count() <= fast_settings().enrich_batch_size);
    assert!(harness.store.is_empty());
}
