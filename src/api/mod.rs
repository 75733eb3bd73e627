use axum::{Router, routing::post};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::pipeline::Pipeline;

pub mod handlers;
pub mod models;

pub fn create_router(pipeline: Arc<Pipeline>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/search", post(handlers::search_handler))
        .route(
            "/api/search/generate-query",
            post(handlers::generate_query_handler),
        )
        .with_state(pipeline)
        .layer(cors)
}
