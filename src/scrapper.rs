use async_trait::async_trait;
use html2text::from_read;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::error::ServiceError;

const FIRECRAWL: &str = "firecrawl";
const DIRECT: &str = "direct-fetch";
const DEFAULT_FIRECRAWL_URL: &str = "https://api.firecrawl.dev";

// Page furniture that only adds noise to the extracted profile text.
const EXCLUDED_TAGS: &[&str] = &[
    "img",
    "svg",
    "picture",
    "video",
    "iframe",
    "style",
    "link[rel=stylesheet]",
    "nav",
    "footer",
    "header",
    "script",
    "noscript",
];

#[async_trait]
pub trait PageScraper: Send + Sync {
    /// Markdown-ish text of the page at `url`.
    async fn scrape(&self, url: &str) -> Result<String, ServiceError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'static str; 1],
    exclude_tags: &'static [&'static str],
    wait_for: u64,
    timeout: u64,
}

#[derive(Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<ScrapeData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
}

/// Firecrawl `/v1/scrape` client.
pub struct FirecrawlScraper {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl FirecrawlScraper {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self, ServiceError> {
        // Firecrawl enforces `timeout` server side; the client waits a little longer.
        let http = reqwest::Client::builder()
            .timeout(timeout + Duration::from_secs(5))
            .build()
            .map_err(|e| ServiceError::http(FIRECRAWL, e))?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: DEFAULT_FIRECRAWL_URL.to_string(),
            timeout,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PageScraper for FirecrawlScraper {
    async fn scrape(&self, url: &str) -> Result<String, ServiceError> {
        let body = ScrapeRequest {
            url,
            formats: ["markdown"],
            exclude_tags: EXCLUDED_TAGS,
            wait_for: 0,
            timeout: self.timeout.as_millis() as u64,
        };

        let response = self
            .http
            .post(format!("{}/v1/scrape", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::http(FIRECRAWL, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                service: FIRECRAWL,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ScrapeResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::decode(FIRECRAWL, e.to_string()))?;

        match parsed.data.and_then(|d| d.markdown) {
            Some(markdown) if parsed.success && !markdown.trim().is_empty() => Ok(markdown),
            _ => Err(ServiceError::decode(
                FIRECRAWL,
                parsed
                    .error
                    .unwrap_or_else(|| "scrape returned no markdown".to_string()),
            )),
        }
    }
}

/// Fetches the page directly and converts its HTML to text.
pub struct HtmlScraper {
    http: reqwest::Client,
}

impl HtmlScraper {
    pub fn new(timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("talent-harvest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::http(DIRECT, e))?;
        Ok(Self { http })
    }

    fn html_to_text(raw_html: &[u8]) -> Result<String, ServiceError> {
        from_read(raw_html, 80).map_err(|e| ServiceError::decode(DIRECT, e.to_string()))
    }
}

#[async_trait]
impl PageScraper for HtmlScraper {
    async fn scrape(&self, url: &str) -> Result<String, ServiceError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ServiceError::http(DIRECT, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                service: DIRECT,
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ServiceError::http(DIRECT, e))?;
        let text = Self::html_to_text(&bytes)?;
        if text.trim().is_empty() {
            return Err(ServiceError::decode(DIRECT, "page has no text content"));
        }
        Ok(text)
    }
}

/// Firecrawl when a key is configured, direct fetching otherwise.
pub fn scraper_from_config(config: &Config) -> Result<Box<dyn PageScraper>, ServiceError> {
    match config.firecrawl_api_key.as_deref() {
        Some(key) => Ok(Box::new(
            FirecrawlScraper::new(key, config.scrape_timeout)?
                .with_base_url(&config.firecrawl_base_url),
        )),
        None => {
            log::info!("FIRECRAWL_API_KEY not set, scraping pages directly");
            Ok(Box::new(HtmlScraper::new(config.scrape_timeout)?))
        }
    }
}

/// Consecutive-failure breaker for the scrapes of one search run.
///
/// Once `threshold` scrapes in a row have failed, the rest of the run skips
/// scraping. Any success resets the count.
#[derive(Debug)]
pub struct ScrapeBreaker {
    consecutive_failures: AtomicU32,
    threshold: u32,
}

impl ScrapeBreaker {
    pub fn new(threshold: u32) -> ScrapeBreaker {
        ScrapeBreaker {
            consecutive_failures: AtomicU32::new(0),
            threshold: threshold.max(1),
        }
    }

    pub fn is_open(&self) -> bool {
        self.consecutive_failures.load(Ordering::SeqCst) >= self.threshold
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Returns `true` for the failure that trips the breaker.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        failures == self.threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }
}
