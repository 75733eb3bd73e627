use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dedup::strip_platform_suffix;
use crate::error::RequestError;
use crate::parse::{lenient_months, lenient_number, null_as_default};

/// Profile platform a search hit belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    Github,
    Stackoverflow,
}

impl Platform {
    /// Classifies a URL by host substring; anything unrecognised counts as LinkedIn.
    pub fn detect(url: &str) -> Platform {
        let url = url.to_lowercase();
        if url.contains("linkedin.com") {
            Platform::Linkedin
        } else if url.contains("github.com") {
            Platform::Github
        } else if url.contains("stackoverflow.com") {
            Platform::Stackoverflow
        } else {
            Platform::Linkedin
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linkedin => "linkedin",
            Platform::Github => "github",
            Platform::Stackoverflow => "stackoverflow",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One organic hit returned by the search engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawResult {
    #[serde(default)]
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub position: u32,
}

impl RawResult {
    pub fn new(title: &str, link: &str, snippet: &str, position: u32) -> RawResult {
        RawResult {
            title: title.to_string(),
            link: link.to_string(),
            snippet: snippet.to_string(),
            position,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LinkedProfile {
    pub platform: Platform,
    pub url: String,
}

/// A canonical search hit after URL and cross-platform deduplication.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeduplicatedResult {
    #[serde(flatten)]
    pub result: RawResult,
    pub source: Platform,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_profiles: Vec<LinkedProfile>,
}

impl DeduplicatedResult {
    pub fn link(&self) -> &str {
        &self.result.link
    }

    pub fn title(&self) -> &str {
        &self.result.title
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ExperienceEntry {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub company: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(deserialize_with = "lenient_months")]
    pub months: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl ExperienceEntry {
    pub fn new(title: &str, company: &str, months: u32) -> ExperienceEntry {
        ExperienceEntry {
            title: title.to_string(),
            company: company.to_string(),
            months,
            ..Default::default()
        }
    }

    /// Drops blank dates and composes `duration` from the start/end pair.
    pub fn normalized(mut self) -> ExperienceEntry {
        self.start_date = self.start_date.filter(|d| !d.trim().is_empty());
        self.end_date = self.end_date.filter(|d| !d.trim().is_empty());
        if let (Some(start), Some(end)) = (&self.start_date, &self.end_date) {
            self.duration = Some(format!("{start} - {end}"));
        }
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Education {
    #[serde(deserialize_with = "null_as_default")]
    pub school: String,
    pub degree: Option<String>,
    pub field: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PedigreeTag {
    Faang,
    Unicorn,
    Yc,
}

impl PedigreeTag {
    pub fn from_label(label: &str) -> Option<PedigreeTag> {
        match label.trim().to_lowercase().as_str() {
            "faang" => Some(PedigreeTag::Faang),
            "unicorn" => Some(PedigreeTag::Unicorn),
            "yc" => Some(PedigreeTag::Yc),
            _ => None,
        }
    }
}

/// What the extraction oracle claims about a profile. Nothing here is trusted:
/// every field is optional on the wire and `null` is tolerated everywhere.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct StructuredProfile {
    #[serde(deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub current_role: String,
    pub current_company: Option<String>,
    pub location: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub total_yoe: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub avg_tenure: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_open_to_work: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub tech_stack: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub career_highlights: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub company_pedigree: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub experience: Vec<ExperienceEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub education: Vec<Education>,
    #[serde(deserialize_with = "lenient_number")]
    pub stability_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub growth_velocity: Option<f64>,
}

impl StructuredProfile {
    /// Best-effort profile built from a search title such as
    /// `"Jane Doe - Staff Engineer - Acme | LinkedIn"`.
    pub fn from_title(title: &str) -> StructuredProfile {
        let cleaned = crate::parse::strip_linkedin_suffix(title);
        let mut parts = crate::parse::split_title(&cleaned).into_iter();
        let full_name = parts
            .next()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        let current_role = parts.next().unwrap_or_default();

        StructuredProfile {
            full_name,
            current_role,
            total_yoe: Some(0.0),
            avg_tenure: Some(0.0),
            ..Default::default()
        }
    }

    pub fn pedigree_tags(&self) -> Vec<PedigreeTag> {
        let mut tags: Vec<PedigreeTag> = self
            .company_pedigree
            .iter()
            .filter_map(|l| PedigreeTag::from_label(l))
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }
}

/// Candidate fields as assembled by enrichment, before the store assigns
/// identity and timestamps.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CandidateData {
    pub full_name: String,
    pub headline: Option<String>,
    pub location: Option<String>,
    pub current_title: Option<String>,
    pub current_company: Option<String>,
    pub profile_url: String,
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<Education>,
    pub skills: Vec<String>,
    pub email: Option<String>,
    pub github_url: Option<String>,
    pub twitter_url: Option<String>,
    pub fit_score: Option<u8>,
    pub fit_reasoning: Option<String>,
    pub raw_scraped_markdown: Option<String>,
    pub total_yoe: f64,
    pub avg_tenure: f64,
    pub stability_score: u8,
    pub growth_velocity: f64,
    pub is_open_to_work: bool,
    pub company_pedigree: Vec<PedigreeTag>,
    pub tech_stack: Vec<String>,
    pub career_highlights: Vec<String>,
}

/// A persisted candidate, keyed by `profile_url`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    #[serde(flatten)]
    pub data: CandidateData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    pub fn profile_url(&self) -> &str {
        &self.data.profile_url
    }
}

/// Placeholder card streamed right after deduplication.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PreviewCandidate {
    pub id: String,
    pub name: String,
    pub snippet: String,
    pub url: String,
    pub source: Platform,
}

impl PreviewCandidate {
    pub fn from_result(result: &DeduplicatedResult) -> PreviewCandidate {
        let encoded: String = STANDARD.encode(result.link()).chars().take(12).collect();
        PreviewCandidate {
            id: format!("preview-{encoded}"),
            name: strip_platform_suffix(result.title()),
            snippet: result.result.snippet.clone(),
            url: result.link().to_string(),
            source: result.source,
        }
    }
}

fn default_max_pages() -> u32 {
    3
}

/// Input to one pipeline run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub wide_net: bool,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default)]
    pub offset: u32,
}

impl SearchRequest {
    pub fn new(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            wide_net: false,
            max_pages: default_max_pages(),
            offset: 0,
        }
    }

    /// Rejects a blank query or a `max_pages` outside `1..=page_limit`.
    pub fn validate(&self, page_limit: u32) -> Result<(), RequestError> {
        if self.query.trim().is_empty() {
            return Err(RequestError::EmptyQuery);
        }
        if self.max_pages == 0 || self.max_pages > page_limit {
            return Err(RequestError::MaxPagesOutOfRange { max: page_limit });
        }
        Ok(())
    }

    /// `max_pages` capped at `page_limit`, never below one.
    pub fn page_budget(&self, page_limit: u32) -> u32 {
        self.max_pages.min(page_limit).max(1)
    }

    /// Pages to request per query: a follow-up page (`offset > 0`) fetches exactly one.
    pub fn pages_to_fetch(&self, page_limit: u32) -> u32 {
        if self.offset > 0 {
            1
        } else {
            self.page_budget(page_limit)
        }
    }

    pub fn start_page(&self, results_per_page: u32) -> u32 {
        if self.offset > 0 {
            (self.offset / results_per_page.max(1)).saturating_add(1)
        } else {
            1
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchHistory {
    pub natural_language_query: String,
    pub generated_dork: String,
    pub result_count: u32,
    pub query_count: u32,
    pub wide_net: bool,
    pub pages_fetched: u32,
    pub created_at: DateTime<Utc>,
}
