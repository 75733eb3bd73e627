//! Defensive parsing of oracle output.
//!
//! The LLM is asked for JSON but answers with whatever it likes: code fences,
//! a sentence of preamble, `null` where a list belongs, numbers as strings.
//! Every call site goes through [`parse_or_else`] so the fallback policy is
//! the same everywhere.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::sync::OnceLock;

static CODE_FENCE: OnceLock<Regex> = OnceLock::new();
static LINKEDIN_SUFFIX: OnceLock<Regex> = OnceLock::new();
static TITLE_SEPARATOR: OnceLock<Regex> = OnceLock::new();

fn code_fence() -> &'static Regex {
    CODE_FENCE.get_or_init(|| {
        Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("code fence pattern is valid")
    })
}

fn linkedin_suffix() -> &'static Regex {
    LINKEDIN_SUFFIX.get_or_init(|| {
        Regex::new(r"(?i)\s*[|·\-–]\s*LinkedIn$").expect("linkedin suffix pattern is valid")
    })
}

fn title_separator() -> &'static Regex {
    TITLE_SEPARATOR
        .get_or_init(|| Regex::new(r"\s*[\-–·]\s*").expect("title separator pattern is valid"))
}

/// Parses JSON out of raw oracle text.
///
/// Tries the trimmed text as-is, then with a surrounding markdown code fence
/// removed, then the outermost `{...}` / `[...]` span.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let trimmed = raw.trim();
    let first_err = match serde_json::from_str(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(inner) = code_fence().captures(trimmed).and_then(|c| c.get(1))
        && let Ok(value) = serde_json::from_str(inner.as_str())
    {
        return Ok(value);
    }

    if let Some(span) = outermost_json_span(trimmed)
        && let Ok(value) = serde_json::from_str(span)
    {
        return Ok(value);
    }

    Err(first_err)
}

/// Parses `raw` as `T`, or returns `fallback()` when it is not valid JSON of that shape.
pub fn parse_or_else<T, F>(raw: &str, fallback: F) -> T
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match parse_json(raw) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("oracle output rejected ({e}), using fallback");
            fallback()
        }
    }
}

fn outermost_json_span(text: &str) -> Option<&str> {
    let start = text.find(|c| c == '{' || c == '[')?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Removes a trailing `| LinkedIn` (or `- LinkedIn`, `· LinkedIn`) from a result title.
pub fn strip_linkedin_suffix(title: &str) -> String {
    linkedin_suffix().replace(title, "").trim().to_string()
}

/// Splits a result title on dash / middle-dot separators.
pub fn split_title(title: &str) -> Vec<String> {
    title_separator()
        .split(title)
        .map(|p| p.trim().to_string())
        .collect()
}

/// Deserializes `null` as `T::default()`.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberLike {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

/// Accepts a JSON number, a numeric string, or `null`.
pub fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<NumberLike>::deserialize(deserializer)?;
    Ok(match value {
        Some(NumberLike::Number(n)) => Some(n),
        Some(NumberLike::Text(s)) => s.trim().parse::<f64>().ok(),
        Some(NumberLike::Other(_)) | None => None,
    }
    .filter(|n| n.is_finite()))
}

/// Like [`lenient_number`], rounded to whole non-negative months.
pub fn lenient_months<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?
        .filter(|n| *n > 0.0)
        .map(|n| n.round().min(u32::MAX as f64) as u32)
        .unwrap_or(0))
}
