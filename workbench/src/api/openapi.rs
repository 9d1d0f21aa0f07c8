use axum::Json;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme};
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};

use super::handlers;
use super::response;
use crate::cache::CacheStats;
use crate::metrics::{FieldSummary, MetricsSnapshot, TimingSummary};
use crate::models;
use crate::pipeline::Stage;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Workbench API",
        version = "1.0.0",
        description = "Retrieval-augmented chat: vector retrieval, web-search fallback and grounded answer generation.",
    ),
    paths(
        handlers::health::health_check,
        handlers::search::search,
        handlers::search::index_stats,
        handlers::chat::chat,
        handlers::chat::chat_stream,
        handlers::metrics::get_metrics,
    ),
    components(schemas(
        // Errors
        response::ErrorCode,
        response::ApiError,
        response::ErrorResponse,
        Stage,
        // Search
        models::SearchRequest,
        models::SearchHit,
        models::SearchResponse,
        models::NamespaceStat,
        models::IndexStatsResponse,
        // Chat
        models::Role,
        models::ChatMessage,
        models::ChatRequest,
        models::SourceHit,
        models::ChatTimings,
        models::TraceMetadata,
        models::ChatResponse,
        // Metrics
        FieldSummary,
        TimingSummary,
        CacheStats,
        MetricsSnapshot,
        handlers::health::HealthData,
    )),
    tags(
        (name = "health", description = "Health check"),
        (name = "search", description = "Retrieval-only vector search"),
        (name = "chat", description = "Retrieval-augmented answers, as JSON or Server-Sent Events"),
        (name = "metrics", description = "Request, error, latency and cache aggregates"),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
        );
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn redoc_router<S: Clone + Send + Sync + 'static>() -> axum::Router<S> {
    Redoc::with_url("/redoc", ApiDoc::openapi()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/health",
            "/search",
            "/documents/stats",
            "/chat",
            "/chat/stream",
            "/metrics",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }
}
