use std::time::Duration;

use reqwest::{header::HeaderMap, Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Result, WorkbenchError};

pub(crate) fn build_client(timeout_secs: u64, label: &str) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| WorkbenchError::Provider(format!("Failed to create {label} HTTP client: {e}")))
}

/// POST a JSON body, retrying transport failures, 429s and 5xx responses with
/// exponential backoff. Auth failures and other 4xx responses are returned
/// immediately.
pub(crate) async fn post_json<B, T>(
    client: &Client,
    url: &str,
    headers: &HeaderMap,
    body: &B,
    max_retries: u32,
    label: &str,
) -> Result<T>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let mut last_error = None;
    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_millis(100 * 2_u64.pow(attempt - 1));
            tokio::time::sleep(delay).await;
        }

        let response = client
            .post(url)
            .headers(headers.clone())
            .json(body)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();

                if status.is_success() {
                    return resp.json::<T>().await.map_err(|e| {
                        WorkbenchError::Provider(format!("Failed to parse {label} response: {e}"))
                    });
                }

                if status == StatusCode::TOO_MANY_REQUESTS {
                    let retry_after = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                        .unwrap_or_else(|| "unknown".to_string());
                    tracing::warn!(provider = label, attempt, %retry_after, "Provider rate limited request");
                    last_error = Some(WorkbenchError::Provider(format!(
                        "{label} rate limit exceeded, retry after {retry_after}"
                    )));
                    continue;
                }

                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    return Err(WorkbenchError::Provider(format!(
                        "{label} authentication failed with status {status}"
                    )));
                }

                let text = resp.text().await.unwrap_or_default();
                if status.is_server_error() {
                    tracing::warn!(provider = label, attempt, %status, "Provider server error");
                    last_error = Some(WorkbenchError::Provider(format!(
                        "{label} server error {status}: {text}"
                    )));
                    continue;
                }

                return Err(WorkbenchError::Provider(format!(
                    "{label} API error {status}: {text}"
                )));
            }
            Err(e) => {
                tracing::warn!(provider = label, attempt, error = %e, "Provider request failed");
                last_error = Some(WorkbenchError::Provider(format!("{label} request failed: {e}")));
                continue;
            }
        }
    }

    Err(last_error.unwrap_or_else(|| WorkbenchError::Provider(format!("{label} request failed"))))
}
