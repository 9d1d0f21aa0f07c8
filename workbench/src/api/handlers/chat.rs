//! `POST /chat` and `POST /chat/stream`.
//!
//! Both run the same pipeline. The JSON endpoint returns the finished
//! [`ChatResponse`] as its body; the stream endpoint replays the answer as
//! `delta` events followed by exactly one `end` event carrying that same body,
//! or one `error` event.

use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::StreamExt;
use serde_json::json;

use crate::api::extractors::AppJson;
use crate::api::response::{ApiError, ErrorResponse};
use crate::api::state::AppState;
use crate::error::Result;
use crate::models::{ChatRequest, ChatResponse};
use crate::pipeline::StreamEvent;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[utoipa::path(
    post,
    path = "/chat",
    tag = "chat",
    operation_id = "chat.chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Grounded answer with sources and timings", body = ChatResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 502, description = "Retrieve or Generate failed", body = ErrorResponse),
        (status = 503, description = "Retriever or generator not configured", body = ErrorResponse),
        (status = 504, description = "Retrieve or Generate timed out", body = ErrorResponse),
    )
)]
pub async fn chat(
    State(state): State<AppState>,
    AppJson(request): AppJson<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let outcome = state.pipeline.respond(request).await?;
    state.metrics.record_timing(&outcome.response.timings);
    tracing::info!(
        from_cache = outcome.from_cache,
        sources = outcome.response.sources.len(),
        total_ms = outcome.response.timings.total_ms,
        "Chat served"
    );
    Ok(Json(outcome.response))
}

/// Validation and configuration problems are reported as a normal JSON error
/// before the event stream opens.
#[utoipa::path(
    post,
    path = "/chat/stream",
    tag = "chat",
    operation_id = "chat.stream",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "`delta` events, then one `end` or `error` event", content_type = "text/event-stream", body = String),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 503, description = "Retriever or generator not configured", body = ErrorResponse),
    )
)]
pub async fn chat_stream(
    State(state): State<AppState>,
    AppJson(request): AppJson<ChatRequest>,
) -> Result<impl IntoResponse> {
    let request = state.pipeline.normalize(request)?;

    let events = state.stream.stream(request).map(|event| match event {
        StreamEvent::Delta(text) => Event::default()
            .event("delta")
            .json_data(json!({ "text": text })),
        StreamEvent::Completed(response) => Event::default().event("end").json_data(response),
        StreamEvent::Failed(error) => {
            let error = ApiError::from(&error);
            Event::default()
                .event("error")
                .json_data(json!({ "code": error.code, "message": error.message }))
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}
