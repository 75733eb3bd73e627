//! Career analytics computed from a candidate's experience history.
//!
//! Everything here is pure. Tenure is grouped per company (lowercased,
//! trimmed) so that several roles at one employer count as one stint.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{NaiveDate, Utc};
use regex::Regex;

use crate::data_models::{ExperienceEntry, PedigreeTag};

const FAANG_COMPANIES: &[&str] = &[
    "google", "alphabet", "meta", "facebook", "amazon", "apple", "netflix", "microsoft",
    "deepmind", "instagram", "whatsapp", "youtube", "aws", "azure", "github", "linkedin",
    "openai", "anthropic",
];

const UNICORN_COMPANIES: &[&str] = &[
    "stripe", "spacex", "databricks", "canva", "revolut", "checkout.com", "klarna",
    "instacart", "discord", "figma", "notion", "vercel", "datadog", "snowflake", "cloudflare",
    "plaid", "ramp", "brex", "scale ai", "anduril", "rippling", "deel", "gusto",
];

const YC_COMPANIES: &[&str] = &[
    "airbnb", "stripe", "dropbox", "coinbase", "doordash", "instacart", "reddit", "twitch",
    "cruise", "gitlab", "zapier", "algolia", "segment", "retool", "supabase", "vercel",
    "posthog", "cal.com", "resend", "railway", "render", "fly.io", "linear",
];

const OPEN_TO_WORK_SIGNALS: &[&str] = &[
    "open to work",
    "actively seeking",
    "looking for",
    "new opportunities",
    "available for",
    "seeking new",
    "open to new",
    "in transition",
    "between roles",
    "exploring opportunities",
    "#opentowork",
    "ready for my next",
];

/// A company stint of at least this many months counts as stable.
const STABLE_TENURE_MONTHS: u32 = 24;

static YEARS: OnceLock<Regex> = OnceLock::new();
static MONTHS: OnceLock<Regex> = OnceLock::new();
static DATE_RANGE: OnceLock<Regex> = OnceLock::new();

fn years_re() -> &'static Regex {
    YEARS.get_or_init(|| Regex::new(r"(?i)(\d+)\s*(?:yr|year)").expect("years pattern is valid"))
}

fn months_re() -> &'static Regex {
    MONTHS
        .get_or_init(|| Regex::new(r"(?i)(\d+)\s*(?:mo|month)").expect("months pattern is valid"))
}

fn date_range_re() -> &'static Regex {
    DATE_RANGE.get_or_init(|| {
        Regex::new(r"(?i)(\w+\s+\d{4})\s*[-–]\s*(\w+\s+\d{4}|Present|Current)")
            .expect("date range pattern is valid")
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Months described by a free-text duration, relative to today.
pub fn parse_months_from_duration(duration: &str) -> u32 {
    parse_months_from_duration_at(duration, Utc::now().date_naive())
}

/// Months described by a free-text duration such as `"2 yrs 3 mos"` or
/// `"Jan 2020 - Present"`, with `today` standing in for Present/Current.
pub fn parse_months_from_duration_at(duration: &str, today: NaiveDate) -> u32 {
    if duration.trim().is_empty() {
        return 0;
    }

    let capture_number = |re: &Regex| {
        re.captures(duration)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    };

    let mut months = 0u32;
    if let Some(years) = capture_number(years_re()) {
        months = months.saturating_add(years.saturating_mul(12));
    }
    if let Some(extra) = capture_number(months_re()) {
        months = months.saturating_add(extra);
    }

    if months == 0
        && let Some(caps) = date_range_re().captures(duration)
    {
        let start = caps.get(1).and_then(|m| parse_month_year(m.as_str()));
        let end = caps.get(2).and_then(|m| {
            let raw = m.as_str();
            if raw.eq_ignore_ascii_case("present") || raw.eq_ignore_ascii_case("current") {
                Some(today)
            } else {
                parse_month_year(raw)
            }
        });
        if let (Some(start), Some(end)) = (start, end) {
            let days = (end - start).num_days() as f64;
            months = ((days / 30.0).round().max(1.0)) as u32;
        }
    }

    months
}

/// Parses `"Jan 2020"` or `"January 2020"` to the first of that month.
fn parse_month_year(raw: &str) -> Option<NaiveDate> {
    let candidate = format!("1 {}", raw.trim());
    NaiveDate::parse_from_str(&candidate, "%d %b %Y")
        .or_else(|_| NaiveDate::parse_from_str(&candidate, "%d %B %Y"))
        .ok()
}

fn entry_months(entry: &ExperienceEntry) -> u32 {
    if entry.months > 0 {
        entry.months
    } else {
        entry
            .duration
            .as_deref()
            .map(parse_months_from_duration)
            .unwrap_or(0)
    }
}

/// Months per distinct company, in first-seen order. Entries without a company are skipped.
fn company_tenures(experience: &[ExperienceEntry]) -> Vec<(String, u32, usize)> {
    let mut tenures: Vec<(String, u32, usize)> = Vec::new();
    for entry in experience {
        let company = entry.company.trim().to_lowercase();
        if company.is_empty() {
            continue;
        }
        let months = entry_months(entry);
        match tenures.iter_mut().find(|(c, _, _)| *c == company) {
            Some((_, total, roles)) => {
                *total += months;
                *roles += 1;
            }
            None => tenures.push((company, months, 1)),
        }
    }
    tenures
}

/// Total years of experience, one decimal.
pub fn total_yoe(experience: &[ExperienceEntry]) -> f64 {
    let total: u64 = experience.iter().map(|e| u64::from(entry_months(e))).sum();
    round1(total as f64 / 12.0)
}

/// Average years per distinct company, one decimal.
pub fn avg_tenure(experience: &[ExperienceEntry]) -> f64 {
    let tenures = company_tenures(experience);
    if tenures.is_empty() {
        return 0.0;
    }
    let total: u64 = tenures.iter().map(|(_, m, _)| u64::from(*m)).sum();
    round1(total as f64 / tenures.len() as f64 / 12.0)
}

/// Percentage of distinct companies with two or more years of tenure.
pub fn stability_score(experience: &[ExperienceEntry]) -> u8 {
    let tenures = company_tenures(experience);
    if tenures.is_empty() {
        return 0;
    }
    let stable = tenures
        .iter()
        .filter(|(_, m, _)| *m >= STABLE_TENURE_MONTHS)
        .count();
    ((stable as f64 / tenures.len() as f64) * 100.0).round() as u8
}

/// Promotions per four years, counting extra roles at the same company as promotions.
pub fn growth_velocity(experience: &[ExperienceEntry]) -> f64 {
    if experience.len() < 2 {
        return 0.0;
    }

    let (promotions, months) = company_tenures(experience)
        .into_iter()
        .filter(|(_, _, roles)| *roles > 1)
        .fold((0usize, 0u64), |(p, m), (_, months, roles)| {
            (p + roles - 1, m + u64::from(months))
        });

    if months == 0 {
        return 0.0;
    }
    round1(promotions as f64 / months as f64 * 48.0)
}

/// Pedigree tags earned by any employer. A company may appear on several lists.
pub fn company_pedigree(experience: &[ExperienceEntry]) -> Vec<PedigreeTag> {
    let mut tags = BTreeSet::new();
    for entry in experience {
        let company = entry.company.trim().to_lowercase();
        if company.is_empty() {
            continue;
        }
        let listed = |list: &[&str]| list.iter().any(|name| company.contains(name));
        if listed(FAANG_COMPANIES) {
            tags.insert(PedigreeTag::Faang);
        }
        if listed(UNICORN_COMPANIES) {
            tags.insert(PedigreeTag::Unicorn);
        }
        if listed(YC_COMPANIES) {
            tags.insert(PedigreeTag::Yc);
        }
    }
    tags.into_iter().collect()
}

/// Looks for job-seeking phrases in the headline and scraped page.
pub fn detect_open_to_work(headline: Option<&str>, raw_markdown: Option<&str>) -> bool {
    let text = format!(
        "{} {}",
        headline.unwrap_or_default(),
        raw_markdown.unwrap_or_default()
    )
    .to_lowercase();
    OPEN_TO_WORK_SIGNALS.iter().any(|s| text.contains(s))
}

/// The analytics block attached to a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CareerAnalytics {
    pub total_yoe: f64,
    pub avg_tenure: f64,
    pub stability_score: u8,
    pub growth_velocity: f64,
    pub company_pedigree: Vec<PedigreeTag>,
}

impl CareerAnalytics {
    pub fn from_experience(experience: &[ExperienceEntry]) -> CareerAnalytics {
        CareerAnalytics {
            total_yoe: total_yoe(experience),
            avg_tenure: avg_tenure(experience),
            stability_score: stability_score(experience),
            growth_velocity: growth_velocity(experience),
            company_pedigree: company_pedigree(experience),
        }
    }
}
