//! Per-profile enrichment: scrape, extract, analyse, rank, persist.

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Deserialize;

use crate::analytics::{CareerAnalytics, detect_open_to_work};
use crate::contact::extract_contact_info;
use crate::data_models::{
    Candidate, CandidateData, DeduplicatedResult, ExperienceEntry, Platform, StructuredProfile,
};
use crate::db::CandidateStore;
use crate::error::ServiceError;
use crate::oracle::LlmOracle;
use crate::parse::{lenient_number, parse_or_else};
use crate::prompts::{CANDIDATE_RANKER_SYSTEM, STRUCTURED_EXTRACTOR_SYSTEM};
use crate::rate_limiter::{RateLimiter, RetryPolicy};
use crate::scrapper::{PageScraper, ScrapeBreaker};

const EXTRACTION_MAX_TOKENS: u32 = 1024;
const RANKING_MAX_TOKENS: u32 = 256;
const DEFAULT_FIT_SCORE: u8 = 50;
const DEFAULT_FIT_REASONING: &str = "Unable to generate reasoning.";

/// Where a profile is in its enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStage {
    Pending,
    Scraped,
    ScrapeFailed,
    Extracted,
    ExtractionFallback,
    Ranked,
    RankingFallback,
    Persisted,
    PersistFailed,
}

impl fmt::Display for ProfileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfileStage::Pending => "pending",
            ProfileStage::Scraped => "scraped",
            ProfileStage::ScrapeFailed => "scrape-failed",
            ProfileStage::Extracted => "extracted",
            ProfileStage::ExtractionFallback => "extraction-fallback",
            ProfileStage::Ranked => "ranked",
            ProfileStage::RankingFallback => "ranking-fallback",
            ProfileStage::Persisted => "persisted",
            ProfileStage::PersistFailed => "persist-failed",
        };
        f.write_str(name)
    }
}

fn transition(url: &str, stage: ProfileStage) {
    log::debug!("{url}: {stage}");
}

static SCORE_DIGITS: OnceLock<Regex> = OnceLock::new();

fn score_digits() -> &'static Regex {
    SCORE_DIGITS.get_or_init(|| Regex::new(r"\d{1,3}").expect("score pattern is valid"))
}

/// What the ranking oracle said about a candidate.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RankingVerdict {
    #[serde(deserialize_with = "lenient_number")]
    pub fit_score: Option<f64>,
    pub fit_reasoning: Option<String>,
}

impl RankingVerdict {
    /// First 1-3 digit number in a free-text answer, if any.
    pub fn salvage(raw: &str) -> RankingVerdict {
        RankingVerdict {
            fit_score: score_digits()
                .find(raw)
                .and_then(|m| m.as_str().parse::<f64>().ok()),
            fit_reasoning: None,
        }
    }

    /// Score clamped to 1..=100; a missing or zero score means the default.
    pub fn score(&self) -> u8 {
        match self.fit_score {
            Some(score) if score != 0.0 => score.round().clamp(1.0, 100.0) as u8,
            _ => DEFAULT_FIT_SCORE,
        }
    }

    pub fn reasoning(&self) -> String {
        self.fit_reasoning
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_FIT_REASONING)
            .to_string()
    }
}

/// Text the extraction oracle sees when the page itself is unavailable.
pub fn snippet_text(result: &DeduplicatedResult) -> String {
    format!(
        "Name from title: {}\nSnippet: {}\nURL: {}",
        result.title(),
        result.result.snippet,
        result.link()
    )
}

/// Analytics for the assembled candidate: computed from experience when there
/// is any, otherwise the oracle's own estimates.
pub fn resolve_analytics(
    profile: &StructuredProfile,
    experience: &[ExperienceEntry],
) -> CareerAnalytics {
    if !experience.is_empty() {
        return CareerAnalytics::from_experience(experience);
    }
    let non_negative = |v: Option<f64>| v.filter(|n| *n > 0.0).unwrap_or(0.0);
    CareerAnalytics {
        total_yoe: non_negative(profile.total_yoe),
        avg_tenure: non_negative(profile.avg_tenure),
        stability_score: non_negative(profile.stability_score).round().min(100.0) as u8,
        growth_velocity: non_negative(profile.growth_velocity),
        company_pedigree: profile.pedigree_tags(),
    }
}

/// Plain-text profile summary handed to the ranking oracle.
pub fn profile_summary(
    profile: &StructuredProfile,
    experience: &[ExperienceEntry],
    total_yoe: f64,
) -> String {
    let or_na = |s: &str| {
        if s.trim().is_empty() {
            "N/A".to_string()
        } else {
            s.to_string()
        }
    };

    let mut lines = vec![
        format!("Name: {}", profile.full_name),
        format!("Current Role: {}", or_na(&profile.current_role)),
        format!(
            "Location: {}",
            or_na(profile.location.as_deref().unwrap_or_default())
        ),
        format!("YOE: {total_yoe}"),
        format!("Tech Stack: {}", or_na(&profile.tech_stack.join(", "))),
        format!(
            "Career Highlights: {}",
            or_na(&profile.career_highlights.join("; "))
        ),
    ];
    if !experience.is_empty() {
        let roles: Vec<String> = experience
            .iter()
            .map(|e| format!("{} at {}", e.title, e.company))
            .collect();
        lines.push(format!("Experience: {}", roles.join("; ")));
    }
    lines.join("\n")
}

pub fn ranking_input(query: &str, summary: &str) -> String {
    format!("Search Query: \"{query}\"\n\nCandidate Profile:\n{summary}")
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Builds the record persisted for one profile.
pub fn assemble_candidate(
    result: &DeduplicatedResult,
    profile: StructuredProfile,
    verdict: &RankingVerdict,
    markdown: Option<String>,
) -> CandidateData {
    let experience: Vec<ExperienceEntry> = profile
        .experience
        .iter()
        .cloned()
        .map(ExperienceEntry::normalized)
        .collect();
    let analytics = resolve_analytics(&profile, &experience);
    let contact = markdown
        .as_deref()
        .map(extract_contact_info)
        .unwrap_or_default();

    let role = non_empty(Some(&profile.current_role));
    let is_open_to_work = profile.is_open_to_work
        || detect_open_to_work(role.as_deref(), markdown.as_deref());
    let github_url = contact.github_url.or_else(|| {
        if result.source == Platform::Github {
            return Some(result.link().to_string());
        }
        result
            .linked_profiles
            .iter()
            .find(|p| p.platform == Platform::Github)
            .map(|p| p.url.clone())
    });
    let current_company = non_empty(profile.current_company.as_deref())
        .or_else(|| non_empty(experience.first().map(|e| e.company.as_str())));

    CandidateData {
        full_name: non_empty(Some(&profile.full_name)).unwrap_or_else(|| "Unknown".to_string()),
        headline: role.clone(),
        location: non_empty(profile.location.as_deref()),
        current_title: role,
        current_company,
        profile_url: result.link().to_string(),
        experience,
        education: profile.education,
        skills: profile.tech_stack.clone(),
        email: contact.email,
        github_url,
        twitter_url: contact.twitter_url,
        fit_score: Some(verdict.score()),
        fit_reasoning: Some(verdict.reasoning()),
        raw_scraped_markdown: markdown,
        total_yoe: analytics.total_yoe,
        avg_tenure: analytics.avg_tenure,
        stability_score: analytics.stability_score,
        growth_velocity: analytics.growth_velocity,
        is_open_to_work,
        company_pedigree: analytics.company_pedigree,
        tech_stack: profile.tech_stack,
        career_highlights: profile.career_highlights,
    }
}

/// Runs the enrichment steps for single profiles, sharing throttles across
/// every profile of every run.
pub struct EnrichmentWorker {
    scraper: Arc<dyn PageScraper>,
    oracle: Arc<dyn LlmOracle>,
    store: Arc<dyn CandidateStore>,
    scrape_limiter: Arc<RateLimiter>,
    llm_limiter: Arc<RateLimiter>,
    llm_retry: RetryPolicy,
}

impl EnrichmentWorker {
    pub fn new(
        scraper: Arc<dyn PageScraper>,
        oracle: Arc<dyn LlmOracle>,
        store: Arc<dyn CandidateStore>,
        scrape_limiter: Arc<RateLimiter>,
        llm_limiter: Arc<RateLimiter>,
        llm_retry: RetryPolicy,
    ) -> EnrichmentWorker {
        EnrichmentWorker {
            scraper,
            oracle,
            store,
            scrape_limiter,
            llm_limiter,
            llm_retry,
        }
    }

    /// Enriches and persists one profile.
    ///
    /// `Err` means an LLM call failed after its retries. `Ok(None)` means the
    /// candidate could not be stored.
    pub async fn enrich(
        &self,
        result: &DeduplicatedResult,
        query: &str,
        breaker: &ScrapeBreaker,
    ) -> Result<Option<Candidate>, ServiceError> {
        let url = result.link();
        transition(url, ProfileStage::Pending);

        let markdown = self.scrape(url, breaker).await;
        transition(
            url,
            if markdown.is_some() {
                ProfileStage::Scraped
            } else {
                ProfileStage::ScrapeFailed
            },
        );

        let source_text = markdown.clone().unwrap_or_else(|| snippet_text(result));
        let raw_profile = self
            .ask(STRUCTURED_EXTRACTOR_SYSTEM, &source_text, EXTRACTION_MAX_TOKENS)
            .await?;
        let mut extraction_fell_back = false;
        let profile: StructuredProfile = parse_or_else(&raw_profile, || {
            extraction_fell_back = true;
            StructuredProfile::from_title(result.title())
        });
        transition(
            url,
            if extraction_fell_back {
                ProfileStage::ExtractionFallback
            } else {
                ProfileStage::Extracted
            },
        );

        let experience: Vec<ExperienceEntry> = profile
            .experience
            .iter()
            .cloned()
            .map(ExperienceEntry::normalized)
            .collect();
        let total_yoe = resolve_analytics(&profile, &experience).total_yoe;
        let summary = profile_summary(&profile, &experience, total_yoe);
        let raw_verdict = self
            .ask(
                CANDIDATE_RANKER_SYSTEM,
                &ranking_input(query, &summary),
                RANKING_MAX_TOKENS,
            )
            .await?;
        let mut ranking_fell_back = false;
        let verdict: RankingVerdict = parse_or_else(&raw_verdict, || {
            ranking_fell_back = true;
            RankingVerdict::salvage(&raw_verdict)
        });
        transition(
            url,
            if ranking_fell_back {
                ProfileStage::RankingFallback
            } else {
                ProfileStage::Ranked
            },
        );

        let data = assemble_candidate(result, profile, &verdict, markdown);
        match self.store.upsert(&data).await {
            Ok(candidate) => {
                transition(url, ProfileStage::Persisted);
                Ok(Some(candidate))
            }
            Err(e) => {
                transition(url, ProfileStage::PersistFailed);
                log::error!("upsert failed for {url}: {e:#}");
                Ok(None)
            }
        }
    }

    async fn scrape(&self, url: &str, breaker: &ScrapeBreaker) -> Option<String> {
        if breaker.is_open() {
            log::debug!("scrape breaker open, skipping {url}");
            return None;
        }

        let outcome = self
            .scrape_limiter
            .execute(|| async {
                // the breaker may have tripped while this call was queued
                if breaker.is_open() {
                    return None;
                }
                Some(self.scraper.scrape(url).await)
            })
            .await?;

        match outcome {
            Ok(markdown) => {
                breaker.record_success();
                Some(markdown)
            }
            Err(e) => {
                if breaker.record_failure() {
                    log::warn!(
                        "{} consecutive scrape failures, skipping remaining scrapes this run",
                        breaker.consecutive_failures()
                    );
                } else {
                    log::error!("scrape failed for {url}: {e}");
                }
                None
            }
        }
    }

    /// One LLM call, retried inside a single limiter slot.
    async fn ask(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, ServiceError> {
        self.llm_limiter
            .execute(|| {
                self.llm_retry.run_if(
                    || self.oracle.complete(system, user, max_tokens),
                    ServiceError::is_transient,
                )
            })
            .await
    }
}
