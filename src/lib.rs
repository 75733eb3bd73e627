pub mod analytics;
pub mod api;
pub mod cache_gate;
pub mod config;
pub mod contact;
pub mod data_models;
pub mod db;
pub mod dedup;
pub mod enrichment;
pub mod error;
pub mod oracle;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod query_diversifier;
pub mod query_generator;
pub mod rate_limiter;
pub mod scrapper;
pub mod search;
