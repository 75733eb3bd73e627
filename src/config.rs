use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    dotenv().ok(); // Load .env file if present
    Config::from_env()
});

#[derive(Debug, Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_db_name: String,
    pub serper_api_key: Option<String>,
    pub serper_base_url: String,
    pub firecrawl_api_key: Option<String>,
    pub firecrawl_base_url: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    pub server_addr: String,
    pub http_timeout: Duration,
    pub scrape_timeout: Duration,
    pub pipeline: PipelineSettings,
}

impl Config {
    pub fn from_env() -> Config {
        Config {
            mongo_uri: get_env_or_default("MONGO_URI", "mongodb://localhost:27017"),
            mongo_db_name: get_env_or_default("MONGO_DB_NAME", "talent_harvest"),
            serper_api_key: get_env("SERPER_API_KEY"),
            serper_base_url: get_env_or_default("SERPER_BASE_URL", "https://google.serper.dev"),
            firecrawl_api_key: get_env("FIRECRAWL_API_KEY"),
            firecrawl_base_url: get_env_or_default(
                "FIRECRAWL_BASE_URL",
                "https://api.firecrawl.dev",
            ),
            anthropic_api_key: get_env("ANTHROPIC_API_KEY"),
            anthropic_base_url: get_env_or_default(
                "ANTHROPIC_BASE_URL",
                "https://api.anthropic.com",
            ),
            anthropic_model: get_env_or_default("ANTHROPIC_MODEL", "claude-sonnet-4-20250514"),
            server_addr: get_env_or_default("SERVER_ADDR", "0.0.0.0:3000"),
            http_timeout: Duration::from_secs(get_parsed_or("HTTP_TIMEOUT_SECS", 30)),
            scrape_timeout: Duration::from_millis(get_parsed_or("SCRAPE_TIMEOUT_MS", 15_000)),
            pipeline: PipelineSettings::from_env(),
        }
    }

    /// Returns the value of a secret that a client cannot be built without.
    pub fn require<'a>(
        &self,
        key: &'static str,
        value: &'a Option<String>,
    ) -> Result<&'a str, ConfigError> {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(key))
    }
}

/// Tunables for one pipeline instance. Every field maps to an environment
/// variable so throughput can be adjusted without a rebuild.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub scrape_max_concurrent: usize,
    pub scrape_delay: Duration,
    pub llm_max_concurrent: usize,
    pub llm_delay: Duration,
    pub enrich_batch_size: usize,
    pub cache_max_age_hours: i64,
    pub results_per_page: u32,
    /// Upper bound on `maxPages` a request may ask for.
    pub max_pages: u32,
    pub scrape_failure_threshold: u32,
    pub llm_max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            scrape_max_concurrent: 3,
            scrape_delay: Duration::from_millis(500),
            llm_max_concurrent: 2,
            llm_delay: Duration::from_millis(300),
            enrich_batch_size: 3,
            cache_max_age_hours: 24,
            results_per_page: 10,
            max_pages: 10,
            scrape_failure_threshold: 3,
            llm_max_retries: 2,
            retry_base_delay: Duration::from_millis(1000),
        }
    }
}

impl PipelineSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            scrape_max_concurrent: get_parsed_or(
                "SCRAPE_MAX_CONCURRENT",
                defaults.scrape_max_concurrent,
            )
            .max(1),
            scrape_delay: Duration::from_millis(get_parsed_or("SCRAPE_DELAY_MS", 500)),
            llm_max_concurrent: get_parsed_or("LLM_MAX_CONCURRENT", defaults.llm_max_concurrent)
                .max(1),
            llm_delay: Duration::from_millis(get_parsed_or("LLM_DELAY_MS", 300)),
            enrich_batch_size: get_parsed_or("ENRICH_BATCH_SIZE", defaults.enrich_batch_size)
                .max(1),
            cache_max_age_hours: non_negative_hours(
                get_parsed_or("CACHE_MAX_AGE_HOURS", defaults.cache_max_age_hours),
                defaults.cache_max_age_hours,
            ),
            results_per_page: get_parsed_or("RESULTS_PER_PAGE", defaults.results_per_page),
            max_pages: get_parsed_or("MAX_PAGES", defaults.max_pages).max(1),
            scrape_failure_threshold: get_parsed_or(
                "SCRAPE_FAILURE_THRESHOLD",
                defaults.scrape_failure_threshold,
            ),
            llm_max_retries: get_parsed_or("LLM_MAX_RETRIES", defaults.llm_max_retries),
            retry_base_delay: Duration::from_millis(get_parsed_or("RETRY_BASE_DELAY_MS", 1000)),
        }
    }
}

fn non_negative_hours(hours: i64, default: i64) -> i64 {
    if hours < 0 {
        log::warn!("CACHE_MAX_AGE_HOURS must not be negative, using {default}");
        return default;
    }
    hours
}

fn get_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_parsed_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("ignoring unparsable value for {key}: {raw:?}");
            default
        }),
        Err(_) => default,
    }
}
