use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::api::response::ErrorResponse;
use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum WorkbenchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure reported by a collaborator client before the pipeline assigns it a stage.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("{stage} stage failed: {message}")]
    Upstream { stage: Stage, message: String },

    #[error("{stage} stage timed out after {timeout_ms} ms")]
    Timeout { stage: Stage, timeout_ms: u64 },

    #[error("Rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl WorkbenchError {
    /// Attribute a collaborator failure to the pipeline stage that made the call.
    ///
    /// Validation, configuration and already-staged errors pass through untouched.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            err @ (WorkbenchError::Validation(_)
            | WorkbenchError::Configuration(_)
            | WorkbenchError::Upstream { .. }
            | WorkbenchError::Timeout { .. }) => err,
            other => WorkbenchError::Upstream {
                stage,
                message: other.to_string(),
            },
        }
    }

    /// The stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            WorkbenchError::Upstream { stage, .. } | WorkbenchError::Timeout { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

impl IntoResponse for WorkbenchError {
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WorkbenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_gain_a_stage() {
        let err = WorkbenchError::Provider("connection reset".into()).at_stage(Stage::Retrieve);
        match err {
            WorkbenchError::Upstream { stage, message } => {
                assert_eq!(stage, Stage::Retrieve);
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn staged_errors_keep_their_stage() {
        let err = WorkbenchError::Timeout {
            stage: Stage::Generate,
            timeout_ms: 50,
        }
        .at_stage(Stage::Retrieve);
        assert_eq!(err.stage(), Some(Stage::Generate));
    }

    #[test]
    fn configuration_errors_are_not_restaged() {
        let err = WorkbenchError::Configuration("missing key".into()).at_stage(Stage::Generate);
        assert!(matches!(err, WorkbenchError::Configuration(_)));
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn display_names_the_stage() {
        let err = WorkbenchError::Upstream {
            stage: Stage::WebSearch,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "web_search stage failed: boom");
    }
}
