//! Contact links found in scraped profile text.

use std::sync::OnceLock;

use regex::Regex;

static EMAIL: OnceLock<Regex> = OnceLock::new();
static GITHUB: OnceLock<Regex> = OnceLock::new();
static TWITTER: OnceLock<Regex> = OnceLock::new();

fn email() -> &'static Regex {
    EMAIL.get_or_init(|| {
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email pattern is valid")
    })
}

fn github() -> &'static Regex {
    GITHUB.get_or_init(|| {
        Regex::new(r"(?:https?://)?(?:www\.)?github\.com/[a-zA-Z0-9-]+")
            .expect("github pattern is valid")
    })
}

fn twitter() -> &'static Regex {
    TWITTER.get_or_init(|| {
        Regex::new(r"(?:https?://)?(?:www\.)?(?:twitter\.com|x\.com)/[a-zA-Z0-9_]+")
            .expect("twitter pattern is valid")
    })
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub github_url: Option<String>,
    pub twitter_url: Option<String>,
}

/// First email address, GitHub link and Twitter/X link in `markdown`.
pub fn extract_contact_info(markdown: &str) -> ContactInfo {
    let first = |re: &Regex| re.find(markdown).map(|m| m.as_str().to_string());
    ContactInfo {
        email: first(email()),
        github_url: first(github()),
        twitter_url: first(twitter()),
    }
}
