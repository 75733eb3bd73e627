//! Keyword-driven GitHub / StackOverflow queries for wide-net searches.

use std::sync::OnceLock;

use regex::Regex;

const TECH_KEYWORDS: &[&str] = &[
    "react",
    "angular",
    "vue",
    "python",
    "java",
    "rust",
    "go",
    "typescript",
    "node",
    "aws",
    "gcp",
    "azure",
    "kubernetes",
    "docker",
    "terraform",
    "swift",
    "kotlin",
    "flutter",
    "rails",
    "django",
    "graphql",
    "sql",
    "mongodb",
    "redis",
    "kafka",
    "spark",
    "ml",
    "ai",
    "llm",
];

const ROLE_KEYWORDS: &[&str] = &[
    "engineer",
    "developer",
    "architect",
    "manager",
    "designer",
    "scientist",
    "analyst",
    "devops",
    "sre",
    "lead",
    "director",
    "vp",
];

static PUNCTUATION: OnceLock<Regex> = OnceLock::new();

fn punctuation() -> &'static Regex {
    PUNCTUATION.get_or_init(|| Regex::new(r"[^\w\s]").expect("punctuation pattern is valid"))
}

fn is_keyword(token: &str, keywords: &[&str]) -> bool {
    let lower = token.to_lowercase();
    keywords.contains(&lower.as_str())
}

/// Query tokens with punctuation removed, in input order and original case.
pub fn tokenize(query: &str) -> Vec<String> {
    punctuation()
        .replace_all(query, "")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// `[github_query, stackoverflow_query]` for a natural-language request.
pub fn expand(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let terms = tokenize(query);
    let tech: Vec<&str> = terms
        .iter()
        .map(String::as_str)
        .filter(|t| is_keyword(t, TECH_KEYWORDS))
        .collect();
    let roles: Vec<&str> = terms
        .iter()
        .map(String::as_str)
        .filter(|t| is_keyword(t, ROLE_KEYWORDS))
        .collect();
    let leading_terms = terms.iter().take(3).cloned().collect::<Vec<_>>().join(" ");

    let github = if tech.is_empty() {
        format!("site:github.com {leading_terms}")
    } else {
        let role = roles
            .first()
            .map(|r| format!(" \"{r}\""))
            .unwrap_or_default();
        format!("site:github.com {}{role} followers", tech.join(" OR "))
    };

    let stackoverflow = if tech.is_empty() {
        format!("site:stackoverflow.com/users {leading_terms}")
    } else {
        let top = if lower.contains("senior") || lower.contains("staff") {
            " top"
        } else {
            ""
        };
        format!(
            "site:stackoverflow.com/users {}{top}",
            tech.iter().take(3).copied().collect::<Vec<_>>().join(" ")
        )
    };

    vec![github, stackoverflow]
}
