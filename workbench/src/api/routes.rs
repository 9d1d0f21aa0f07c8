use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::gate::{CHAT_ROUTE, SEARCH_ROUTE};

use super::handlers;
use super::middleware::{auth_middleware, metrics_middleware, rate_limit_middleware, RouteGate};
use super::openapi;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/openapi.json", get(openapi::openapi_json))
        .merge(openapi::redoc_router());

    let chat_routes = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route("/chat/stream", post(handlers::chat::chat_stream))
        .route_layer(middleware::from_fn_with_state(
            RouteGate {
                gate: state.gate.clone(),
                route: CHAT_ROUTE,
                trust_forwarded_for: state.config.rate_limit.trust_forwarded_for,
            },
            rate_limit_middleware,
        ));

    let search_routes = Router::new()
        .route("/search", post(handlers::search::search))
        .route("/documents/stats", get(handlers::search::index_stats))
        .route_layer(middleware::from_fn_with_state(
            RouteGate {
                gate: state.gate.clone(),
                route: SEARCH_ROUTE,
                trust_forwarded_for: state.config.rate_limit.trust_forwarded_for,
            },
            rate_limit_middleware,
        ));

    // Auth wraps the rate limit so rejected keys do not spend a client's budget.
    let protected_routes = Router::new()
        .merge(chat_routes)
        .merge(search_routes)
        .route("/metrics", get(handlers::metrics::get_metrics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics_middleware,
        ))
        .layer(cors_layer(&state.config.server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}
