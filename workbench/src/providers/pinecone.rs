use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RetrieverConfig;
use crate::error::{Result, WorkbenchError};
use crate::models::Metadata;

use super::{http, RetrievedRecord, Retriever};

const API_VERSION: &str = "2025-01";

#[derive(Debug, Serialize)]
struct SearchRecordsRequest<'a> {
    query: SearchQuery<'a>,
}

#[derive(Debug, Serialize)]
struct SearchQuery<'a> {
    inputs: QueryInputs<'a>,
    top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Metadata>,
}

#[derive(Debug, Serialize)]
struct QueryInputs<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchRecordsResponse {
    result: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: f64,
    #[serde(default)]
    fields: Metadata,
}

#[derive(Debug, Deserialize)]
struct DescribeIndexStatsResponse {
    #[serde(default)]
    namespaces: BTreeMap<String, NamespaceSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceSummary {
    #[serde(default)]
    vector_count: u64,
}

struct Connection {
    client: Client,
    host: String,
    headers: HeaderMap,
    text_field: String,
    max_retries: u32,
}

/// Retriever backed by a Pinecone index with integrated embedding.
pub struct PineconeRetriever {
    connection: std::result::Result<Connection, String>,
}

impl PineconeRetriever {
    pub fn new(config: Option<&RetrieverConfig>) -> Self {
        let connection = match config {
            Some(config) => Connection::open(config).map_err(|e| e.to_string()),
            None => Err("Vector index is not configured (set PINECONE_HOST)".to_string()),
        };
        if let Err(reason) = &connection {
            tracing::warn!(%reason, "Retriever unavailable");
        }
        Self { connection }
    }

    fn connection(&self) -> Result<&Connection> {
        self.connection
            .as_ref()
            .map_err(|reason| WorkbenchError::Configuration(reason.clone()))
    }
}

impl Connection {
    fn open(config: &RetrieverConfig) -> Result<Self> {
        let Some(api_key) = config.api_key.as_deref() else {
            return Err(WorkbenchError::Configuration(
                "PINECONE_API_KEY is required for the vector index".to_string(),
            ));
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(api_key).map_err(|e| {
                WorkbenchError::Configuration(format!("Invalid Pinecone API key header: {e}"))
            })?,
        );
        headers.insert("X-Pinecone-API-Version", HeaderValue::from_static(API_VERSION));

        let host = config.host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };

        Ok(Self {
            client: http::build_client(config.timeout_secs, "Pinecone")?,
            host,
            headers,
            text_field: config.text_field.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Retriever for PineconeRetriever {
    async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: u32,
        filters: Option<&Metadata>,
    ) -> Result<Vec<RetrievedRecord>> {
        let connection = self.connection()?;
        let url = format!("{}/records/namespaces/{}/search", connection.host, namespace);
        let request = SearchRecordsRequest {
            query: SearchQuery {
                inputs: QueryInputs { text: query },
                top_k,
                filter: filters.filter(|f| !f.is_empty()),
            },
        };

        let response: SearchRecordsResponse = http::post_json(
            &connection.client,
            &url,
            &connection.headers,
            &request,
            connection.max_retries,
            "Pinecone",
        )
        .await?;

        Ok(response
            .result
            .hits
            .into_iter()
            .map(|hit| {
                let text = match hit.fields.get(&connection.text_field) {
                    Some(Value::String(text)) => text.clone(),
                    _ => String::new(),
                };
                RetrievedRecord {
                    id: hit.id,
                    score: hit.score,
                    text,
                    metadata: hit.fields,
                }
            })
            .collect())
    }

    async fn namespace_stats(&self) -> Result<BTreeMap<String, u64>> {
        let connection = self.connection()?;
        let url = format!("{}/describe_index_stats", connection.host);

        let response: DescribeIndexStatsResponse = http::post_json(
            &connection.client,
            &url,
            &connection.headers,
            &serde_json::json!({}),
            connection.max_retries,
            "Pinecone",
        )
        .await?;

        Ok(response
            .namespaces
            .into_iter()
            .map(|(name, summary)| (name, summary.vector_count))
            .collect())
    }

    fn is_available(&self) -> bool {
        self.connection.is_ok()
    }
}
