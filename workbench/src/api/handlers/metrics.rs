use axum::extract::State;
use axum::Json;

use crate::api::state::AppState;
use crate::metrics::MetricsSnapshot;

/// `GET /metrics`
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "metrics",
    responses(
        (status = 200, description = "Request counts, error counts, latency summaries and cache counters", body = MetricsSnapshot),
    )
)]
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
