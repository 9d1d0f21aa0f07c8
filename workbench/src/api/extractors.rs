use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;

use crate::error::WorkbenchError;

/// `axum::Json` whose rejections surface as `invalid_request` envelopes.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(WorkbenchError))]
pub struct AppJson<T>(pub T);

impl From<JsonRejection> for WorkbenchError {
    fn from(rejection: JsonRejection) -> Self {
        map_json_rejection(rejection)
    }
}

fn map_json_rejection(rejection: JsonRejection) -> WorkbenchError {
    match rejection {
        JsonRejection::JsonDataError(err) => {
            let message = err.body_text();
            if let Some(field) = extract_missing_field(&message) {
                WorkbenchError::Validation(format!("Missing required field: {field}"))
            } else {
                WorkbenchError::Validation(format!("Invalid JSON: {message}"))
            }
        }
        JsonRejection::JsonSyntaxError(err) => {
            WorkbenchError::Validation(format!("JSON syntax error: {}", err.body_text()))
        }
        JsonRejection::MissingJsonContentType(_) => WorkbenchError::Validation(
            "Missing `Content-Type: application/json` header".to_string(),
        ),
        JsonRejection::BytesRejection(_) => {
            WorkbenchError::Internal("Failed to read request body".to_string())
        }
        _ => WorkbenchError::Validation(rejection.body_text()),
    }
}

fn extract_missing_field(message: &str) -> Option<&str> {
    let prefix = "missing field `";
    let start = message.find(prefix)? + prefix.len();
    let remaining = message.get(start..)?;
    let end = remaining.find('`')?;
    remaining.get(..end)
}
