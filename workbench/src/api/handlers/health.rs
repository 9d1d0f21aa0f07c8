use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::state::AppState;

pub const SERVICE_NAME: &str = "workbench";

/// Liveness plus which collaborators are usable right now.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthData {
    pub status: String,
    pub service: String,
    pub version: String,
    pub retriever: bool,
    pub llm: bool,
    pub web_search: bool,
}

/// `GET /health`
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service health status", body = HealthData),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthData> {
    Json(HealthData {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        retriever: state.retriever.is_available(),
        llm: state.generator.is_available(),
        web_search: state.pipeline.web_search_configured(),
    })
}
