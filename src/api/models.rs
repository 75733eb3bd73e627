use serde::{Deserialize, Serialize};

pub use crate::data_models::SearchRequest;

#[derive(Debug, Deserialize)]
pub struct GenerateQueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateQueryResponse {
    /// Primary query, shown to the user as "the" dork.
    pub dork: String,
    pub queries: Vec<String>,
}
