//! # Request Middleware
//!
//! Three layers sit in front of the handlers:
//!
//! - [`auth_middleware`] checks the API key on non-public routes. With no keys
//!   configured the gate is open.
//! - [`rate_limit_middleware`] charges the request against the per-client
//!   window of one route. Clients are keyed on the peer address; the
//!   `X-Forwarded-For` header is read only when the deployment opts in.
//!   Denials never reach the pipeline.
//! - [`metrics_middleware`] counts every request and every `>= 400` response
//!   by matched route template, including rate-limit denials and auth
//!   failures. Requests that match no route share one bucket.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::state::AppState;
use crate::error::WorkbenchError;
use crate::gate::{GateDecision, RequestGate};
use crate::metrics::MetricsRegistry;

use super::response::{ErrorCode, ErrorResponse};

const API_KEY_HEADER: &str = "X-API-Key";
const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";
const ANONYMOUS_CLIENT: &str = "anonymous";
pub const UNMATCHED_PATH: &str = "<unmatched>";

/// Accepts `X-API-Key: <key>` or `Authorization: Bearer <key>`.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let keys = &state.config.server.api_keys;
    if keys.is_empty() {
        return next.run(request).await;
    }

    let Some(token) = presented_key(request.headers()) else {
        return ErrorResponse::new(ErrorCode::Unauthorized, "Missing API key")
            .into_response();
    };

    if keys.iter().any(|key| key == token) {
        next.run(request).await
    } else {
        ErrorResponse::new(ErrorCode::Unauthorized, "Invalid API key").into_response()
    }
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        return Some(key);
    }

    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

/// State for one route's rate-limit layer.
#[derive(Clone)]
pub struct RouteGate {
    pub gate: RequestGate,
    pub route: &'static str,
    pub trust_forwarded_for: bool,
}

pub async fn rate_limit_middleware(
    State(route_gate): State<RouteGate>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_key(&request, route_gate.trust_forwarded_for);
    match route_gate.gate.check(route_gate.route, &client) {
        GateDecision::Allow => next.run(request).await,
        decision @ GateDecision::Deny { .. } => {
            let retry_after_secs = decision.retry_after_secs().unwrap_or(1);
            tracing::info!(
                route = route_gate.route,
                client = %client,
                retry_after_secs,
                "Request rate limited"
            );
            WorkbenchError::RateLimited { retry_after_secs }.into_response()
        }
    }
}

/// Peer address, then a shared bucket. With `trust_forwarded_for` the first
/// `X-Forwarded-For` hop wins over both.
fn client_key(request: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get(FORWARDED_FOR_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}

pub async fn metrics_middleware(
    State(metrics): State<MetricsRegistry>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string());
    metrics.record_request(&path);

    let response = next.run(request).await;
    if response.status().as_u16() >= 400 {
        metrics.record_error(&path);
    }
    response
}
