use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{Pipeline, SearchEvent};

use super::models::{GenerateQueryRequest, GenerateQueryResponse, SearchRequest};

fn to_sse(event: &SearchEvent) -> Event {
    Event::default()
        .event(event.name())
        .json_data(event.payload())
        .unwrap_or_else(|e| {
            log::error!("failed to encode {} event: {e}", event.name());
            Event::default()
                .event("error")
                .data(r#"{"message":"Failed to encode event"}"#)
        })
}

/// Streams one search run as Server-Sent Events. Closing the connection
/// cancels the run.
pub async fn search_handler(
    State(pipeline): State<Arc<Pipeline>>,
    Json(request): Json<SearchRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    request
        .validate(pipeline.settings().max_pages)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let events = pipeline.run(request, cancel);

    let stream = events.map(move |event| {
        // dropped with the response body, cancelling the run
        let _ = &guard;
        Ok(to_sse(&event))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn generate_query_handler(
    State(pipeline): State<Arc<Pipeline>>,
    Json(request): Json<GenerateQueryRequest>,
) -> Result<Json<GenerateQueryResponse>, (StatusCode, String)> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }

    let queries = pipeline
        .query_generator()
        .generate_queries(query)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Query generation error: {}", e),
            )
        })?;

    Ok(Json(GenerateQueryResponse {
        dork: queries.first().cloned().unwrap_or_default(),
        queries,
    }))
}
