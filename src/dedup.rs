//! Result deduplication across search queries and platforms.
//!
//! Exact duplicates (same normalised URL) are dropped, first seen wins.
//! A GitHub or StackOverflow hit whose person-name matches an already
//! accepted profile on another platform is folded into that profile's
//! `linked_profiles` instead of becoming a separate entry.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::data_models::{DeduplicatedResult, LinkedProfile, Platform, RawResult};

/// Token-overlap ratio a name pair must exceed to be treated as one person.
pub const NAME_MATCH_THRESHOLD: f64 = 0.7;

static PLATFORM_SUFFIX: OnceLock<Regex> = OnceLock::new();
static PARENTHETICAL: OnceLock<Regex> = OnceLock::new();

fn platform_suffix() -> &'static Regex {
    PLATFORM_SUFFIX.get_or_init(|| {
        Regex::new(r"(?i)\s*[-–|·]\s*(LinkedIn|GitHub|Stack Overflow).*$")
            .expect("platform suffix pattern is valid")
    })
}

fn parenthetical() -> &'static Regex {
    PARENTHETICAL
        .get_or_init(|| Regex::new(r"\s*\(.*?\)\s*").expect("parenthetical pattern is valid"))
}

/// Identity key for a profile URL: lowercase host + path, no query, no trailing slash.
///
/// Unparsable input is lowercased with trailing slashes removed.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default().to_lowercase();
            let path = parsed.path().trim_end_matches('/').to_lowercase();
            format!("{host}{path}")
        }
        Err(_) => raw.to_lowercase().trim_end_matches('/').to_string(),
    }
}

/// Removes a `- LinkedIn` / `| GitHub` / `· Stack Overflow` tail from a result title.
pub fn strip_platform_suffix(title: &str) -> String {
    platform_suffix().replace(title, "").trim().to_string()
}

/// Lowercased person name from a result title, without platform tail or
/// parenthetical annotations.
pub fn extract_name_from_title(title: &str) -> String {
    let stripped = strip_platform_suffix(title);
    parenthetical()
        .replace_all(&stripped, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Fraction of tokens of `a` that match some token of `b`, over the longer
/// token count. Tokens match when equal or when one prefixes the other.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a_parts: Vec<&str> = a.split_whitespace().collect();
    let b_parts: Vec<&str> = b.split_whitespace().collect();
    if a_parts.is_empty() || b_parts.is_empty() {
        return 0.0;
    }

    let matches = a_parts
        .iter()
        .filter(|part| {
            b_parts
                .iter()
                .any(|bp| bp == *part || bp.starts_with(**part) || part.starts_with(*bp))
        })
        .count();

    matches as f64 / a_parts.len().max(b_parts.len()) as f64
}

/// Whether a hit points at an individual's profile we know how to enrich.
pub fn is_profile_result(link: &str, source: Platform) -> bool {
    link.to_lowercase().contains("linkedin.com/in/")
        || matches!(source, Platform::Github | Platform::Stackoverflow)
}

/// Collapse raw hits into one canonical entry per person.
///
/// Non-profile hits are discarded before merging. Output keeps first
/// acceptance order.
pub fn deduplicate(results: Vec<RawResult>) -> Vec<DeduplicatedResult> {
    let mut accepted: Vec<DeduplicatedResult> = Vec::new();
    let mut seen_urls: HashSet<String> = HashSet::new();
    // normalised name -> index into `accepted`, in insertion order
    let mut name_index: Vec<(String, usize)> = Vec::new();
    let mut name_positions: HashMap<String, usize> = HashMap::new();

    for result in results {
        let source = Platform::detect(&result.link);
        if !is_profile_result(&result.link, source) {
            log::debug!("dropping non-profile result {}", result.link);
            continue;
        }

        let key = normalize_url(&result.link);
        if !seen_urls.insert(key) {
            continue;
        }

        let name = extract_name_from_title(&result.title);

        if !name.is_empty() && source != Platform::Linkedin {
            let target = name_index.iter().find_map(|(existing_name, idx)| {
                let existing = &accepted[*idx];
                (name_similarity(&name, existing_name) > NAME_MATCH_THRESHOLD
                    && existing.source != source)
                    .then_some(*idx)
            });
            if let Some(idx) = target {
                log::debug!(
                    "linking {} to {} as the same person",
                    result.link,
                    accepted[idx].link()
                );
                accepted[idx].linked_profiles.push(LinkedProfile {
                    platform: source,
                    url: result.link,
                });
                continue;
            }
        }

        let idx = accepted.len();
        accepted.push(DeduplicatedResult {
            result,
            source,
            linked_profiles: Vec::new(),
        });
        if !name.is_empty() {
            match name_positions.get(&name) {
                Some(pos) => name_index[*pos].1 = idx,
                None => {
                    name_positions.insert(name.clone(), name_index.len());
                    name_index.push((name, idx));
                }
            }
        }
    }

    accepted
}
