use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
};
use serde::{Deserialize, Serialize};

use crate::config::WebSearchConfig;
use crate::error::{Result, WorkbenchError};

use super::{http, WebResult, WebSearchOutcome, WebSearcher};

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: u32,
    search_depth: &'static str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

struct Connection {
    client: Client,
    url: String,
    headers: HeaderMap,
    max_retries: u32,
}

/// Web search through the Tavily API. Unconfigured instances report
/// [`WebSearchOutcome::NotConfigured`] instead of failing.
pub struct TavilySearcher {
    connection: Option<Connection>,
}

impl TavilySearcher {
    pub fn new(config: Option<&WebSearchConfig>) -> Result<Self> {
        let Some(config) = config else {
            return Ok(Self { connection: None });
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key)).map_err(|e| {
                WorkbenchError::Configuration(format!("Invalid Tavily API key header: {e}"))
            })?,
        );

        Ok(Self {
            connection: Some(Connection {
                client: http::build_client(config.timeout_secs, "Tavily")?,
                url: format!("{}/search", config.base_url.trim_end_matches('/')),
                headers,
                max_retries: config.max_retries,
            }),
        })
    }

    pub fn unconfigured() -> Self {
        Self { connection: None }
    }
}

#[async_trait]
impl WebSearcher for TavilySearcher {
    async fn search(&self, query: &str, max_results: u32) -> Result<WebSearchOutcome> {
        let Some(connection) = &self.connection else {
            return Ok(WebSearchOutcome::NotConfigured);
        };

        let request = TavilyRequest {
            query,
            max_results,
            search_depth: "basic",
        };
        let response: TavilyResponse = http::post_json(
            &connection.client,
            &connection.url,
            &connection.headers,
            &request,
            connection.max_retries,
            "Tavily",
        )
        .await?;

        Ok(WebSearchOutcome::Results(
            response
                .results
                .into_iter()
                .map(|result| WebResult {
                    title: result
                        .title
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| result.url.clone()),
                    url: result.url,
                    snippet: result.content,
                })
                .collect(),
        ))
    }

    fn is_configured(&self) -> bool {
        self.connection.is_some()
    }
}
