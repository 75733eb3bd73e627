//! Error types shared across the pipeline.
//!
//! External collaborators (search engine, scraper, LLM) report
//! [`ServiceError`]; a whole search run fails with [`PipelineError`].
//! Storage code uses `anyhow` with context, like the rest of the db layer.

/// Missing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
}

/// Failure talking to an external HTTP service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Transport-level failure (connect, timeout, body read).
    #[error("{service} request failed: {message}")]
    Http {
        service: &'static str,
        message: String,
    },

    /// The service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("{service} response could not be decoded: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ServiceError {
    pub fn http(service: &'static str, err: reqwest::Error) -> Self {
        ServiceError::Http {
            service,
            message: err.to_string(),
        }
    }

    pub fn decode(service: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Decode {
            service,
            message: message.into(),
        }
    }

    /// Whether repeating the same call could plausibly succeed.
    ///
    /// Client errors other than 408 and 429 are permanent, as is bad configuration.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Http { .. } | ServiceError::Decode { .. } => true,
            ServiceError::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            ServiceError::Config(_) => false,
        }
    }
}

/// Run-level failure of a search pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("query generation failed: {0}")]
    QueryGeneration(String),

    #[error("candidate store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("search cancelled")]
    Cancelled,
}

/// A search request that cannot be run as given.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("Query is required")]
    EmptyQuery,

    #[error("maxPages must be between 1 and {max}")]
    MaxPagesOutOfRange { max: u32 },
}
