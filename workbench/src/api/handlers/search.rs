//! `POST /search`: retrieval only, no generation. `GET /documents/stats`:
//! record counts per index namespace.

use axum::extract::{Query, State};
use axum::Json;

use crate::api::extractors::AppJson;
use crate::api::response::ErrorResponse;
use crate::api::state::AppState;
use crate::error::Result;
use crate::models::{IndexStatsParams, IndexStatsResponse, SearchRequest, SearchResponse};

#[utoipa::path(
    post,
    path = "/search",
    tag = "search",
    operation_id = "search.search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Ranked hits from the vector index", body = SearchResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 502, description = "Retriever failed", body = ErrorResponse),
        (status = 503, description = "No retriever configured", body = ErrorResponse),
        (status = 504, description = "Retriever timed out", body = ErrorResponse),
    )
)]
pub async fn search(
    State(state): State<AppState>,
    AppJson(request): AppJson<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let outcome = state.search.search(request).await?;
    tracing::debug!(
        namespace = %outcome.response.namespace,
        hits = outcome.response.hits.len(),
        from_cache = outcome.from_cache,
        "Search served"
    );
    Ok(Json(outcome.response))
}

#[utoipa::path(
    get,
    path = "/documents/stats",
    tag = "search",
    operation_id = "search.stats",
    params(IndexStatsParams),
    responses(
        (status = 200, description = "Record counts per namespace", body = IndexStatsResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 502, description = "Retriever failed", body = ErrorResponse),
        (status = 503, description = "No retriever configured", body = ErrorResponse),
    )
)]
pub async fn index_stats(
    State(state): State<AppState>,
    Query(params): Query<IndexStatsParams>,
) -> Result<Json<IndexStatsResponse>> {
    let stats = state.search.index_stats(params.namespace.as_deref()).await?;
    Ok(Json(stats))
}
