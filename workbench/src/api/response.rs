//! # API Error Contract
//!
//! Successful calls return their payload as the bare JSON body. Every failure
//! returns an [`ErrorResponse`] envelope:
//!
//! ```json
//! { "error": { "code": "rate_limited", "message": "...", "retryAfter": 12 } }
//! ```
//!
//! Clients branch on `error.code`, never on the message text. Upstream
//! failures also carry the failing pipeline `stage`.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::WorkbenchError;
use crate::pipeline::Stage;

/// Machine-readable error code included in every error response.
///
/// Serialized as a snake_case string on the wire (e.g. `"invalid_request"`).
/// Each variant maps to a fixed HTTP status code via [`ErrorCode::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request was malformed or failed validation. HTTP 400.
    InvalidRequest,
    /// Missing or invalid API key. HTTP 401.
    Unauthorized,
    /// HTTP 404.
    NotFound,
    /// The per-client request budget for this route is spent. HTTP 429.
    RateLimited,
    /// An unexpected server-side error occurred. Internal details are never
    /// leaked to the client. HTTP 500.
    InternalError,
    /// A retriever or generator call failed. HTTP 502.
    UpstreamError,
    /// A required collaborator is not configured. HTTP 503.
    ConfigurationError,
    /// A retriever or generator call exceeded its stage timeout. HTTP 504.
    UpstreamTimeout,
}

impl ErrorCode {
    /// Returns the HTTP status code corresponding to this error code.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamError => StatusCode::BAD_GATEWAY,
            Self::ConfigurationError => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::NotFound => write!(f, "not_found"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::InternalError => write!(f, "internal_error"),
            Self::UpstreamError => write!(f, "upstream_error"),
            Self::ConfigurationError => write!(f, "configuration_error"),
            Self::UpstreamTimeout => write!(f, "upstream_timeout"),
        }
    }
}

/// Structured error payload within the API envelope.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error classification.
    pub code: ErrorCode,
    /// Human-readable description safe to display to end users.
    pub message: String,
    /// Pipeline stage that failed, for upstream errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Seconds until the rate-limit window rolls over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stage: None,
            retry_after: None,
        }
    }
}

/// Failure envelope. The HTTP status is derived from the error code.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: ApiError,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::from(ApiError::new(code, message))
    }

    pub fn status(&self) -> StatusCode {
        self.error.code.status()
    }
}

impl From<ApiError> for ErrorResponse {
    fn from(error: ApiError) -> Self {
        Self { error }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self.error.retry_after;

        let mut response = match serde_json::to_value(&self) {
            Ok(body) => (status, Json(body)).into_response(),
            Err(_) => {
                let body = serde_json::json!({
                    "error": {
                        "code": "internal_error",
                        "message": "An internal error occurred"
                    }
                });
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
        };

        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<&WorkbenchError> for ApiError {
    /// Internal error details are **never** leaked to the client. For
    /// `internal_error` responses a generic message is returned and the real
    /// error is logged via `tracing::error!`.
    fn from(err: &WorkbenchError) -> Self {
        match err {
            WorkbenchError::Validation(msg) => ApiError::new(ErrorCode::InvalidRequest, msg.clone()),

            WorkbenchError::Json(e) => {
                ApiError::new(ErrorCode::InvalidRequest, format!("Invalid JSON: {e}"))
            }

            WorkbenchError::Unauthorized(_) => {
                ApiError::new(ErrorCode::Unauthorized, "Authentication required")
            }

            WorkbenchError::NotFound(msg) => ApiError::new(ErrorCode::NotFound, msg.clone()),

            WorkbenchError::RateLimited { retry_after_secs } => ApiError {
                retry_after: Some(*retry_after_secs),
                ..ApiError::new(ErrorCode::RateLimited, err.to_string())
            },

            WorkbenchError::Configuration(msg) => {
                ApiError::new(ErrorCode::ConfigurationError, msg.clone())
            }

            WorkbenchError::Upstream { stage, .. } => {
                tracing::warn!(error = %err, "Upstream failure mapped to response");
                ApiError {
                    stage: Some(*stage),
                    ..ApiError::new(ErrorCode::UpstreamError, format!("The {stage} stage failed"))
                }
            }

            WorkbenchError::Timeout { stage, .. } => ApiError {
                stage: Some(*stage),
                ..ApiError::new(ErrorCode::UpstreamTimeout, err.to_string())
            },

            internal @ (WorkbenchError::Provider(_)
            | WorkbenchError::Http(_)
            | WorkbenchError::Internal(_)) => {
                tracing::error!(error = %internal, "Internal error mapped to response");
                ApiError::new(ErrorCode::InternalError, "An internal error occurred")
            }
        }
    }
}

impl From<WorkbenchError> for ErrorResponse {
    fn from(err: WorkbenchError) -> Self {
        Self::from(ApiError::from(&err))
    }
}
