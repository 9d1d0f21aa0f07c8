use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheKey, ResponseCache};
use crate::error::{Result, WorkbenchError};
use crate::models::{
    IndexStatsResponse, NamespaceStat, SearchHit, SearchRequest, SearchResponse,
};
use crate::pipeline::{PipelineSettings, Stage, MAX_TOP_K};
use crate::providers::Retriever;

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub response: SearchResponse,
    pub from_cache: bool,
}

/// Retrieval-only lookups against the vector index, cached in the search namespace.
#[derive(Clone)]
pub struct SearchService {
    retriever: Arc<dyn Retriever>,
    cache: ResponseCache,
    default_namespace: String,
    default_top_k: u32,
    timeout: Duration,
}

impl SearchService {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        cache: ResponseCache,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            retriever,
            cache,
            default_namespace: settings.default_namespace.clone(),
            default_top_k: settings.default_top_k,
            timeout: settings.retrieve_timeout,
        }
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchOutcome> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(WorkbenchError::Validation(
                "query must not be empty".to_string(),
            ));
        }

        let top_k = request.top_k.unwrap_or(self.default_top_k);
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(WorkbenchError::Validation(format!(
                "top_k must be between 1 and {MAX_TOP_K}, got {top_k}"
            )));
        }

        let namespace = request
            .namespace
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| self.default_namespace.clone());

        if !self.retriever.is_available() {
            return Err(WorkbenchError::Configuration(
                "No retriever is configured".to_string(),
            ));
        }

        let key = CacheKey::for_search(&namespace, &query, top_k, request.filters.as_ref());
        // Keys ignore case and spacing; the echoed query is always the caller's.
        if let Some(cached) = self.cache.search().get(&key) {
            return Ok(SearchOutcome {
                response: SearchResponse { query, ..cached },
                from_cache: true,
            });
        }

        let records = match tokio::time::timeout(
            self.timeout,
            self.retriever
                .search(&namespace, &query, top_k, request.filters.as_ref()),
        )
        .await
        {
            Ok(Ok(records)) => records,
            Ok(Err(error)) => return Err(error.at_stage(Stage::Retrieve)),
            Err(_) => {
                return Err(WorkbenchError::Timeout {
                    stage: Stage::Retrieve,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        };

        let response = SearchResponse {
            namespace,
            query,
            top_k,
            hits: records
                .into_iter()
                .map(|record| SearchHit {
                    id: record.id,
                    score: record.score,
                    fields: record.metadata,
                })
                .collect(),
        };
        tracing::info!(
            namespace = %response.namespace,
            hits = response.hits.len(),
            "Search complete"
        );

        self.cache.search().put(key, response.clone());
        Ok(SearchOutcome {
            response,
            from_cache: false,
        })
    }

    /// Record counts per namespace, optionally narrowed to one namespace.
    /// Never cached.
    pub async fn index_stats(&self, namespace: Option<&str>) -> Result<IndexStatsResponse> {
        if !self.retriever.is_available() {
            return Err(WorkbenchError::Configuration(
                "No retriever is configured".to_string(),
            ));
        }
        let namespace = namespace.map(str::trim).filter(|ns| !ns.is_empty());

        let counts = match tokio::time::timeout(self.timeout, self.retriever.namespace_stats()).await
        {
            Ok(Ok(counts)) => counts,
            Ok(Err(error)) => return Err(error.at_stage(Stage::Retrieve)),
            Err(_) => {
                return Err(WorkbenchError::Timeout {
                    stage: Stage::Retrieve,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        };

        Ok(IndexStatsResponse {
            namespaces: counts
                .into_iter()
                .filter(|(name, _)| namespace.map_or(true, |wanted| name.as_str() == wanted))
                .map(|(name, vector_count)| (name, NamespaceStat { vector_count }))
                .collect(),
        })
    }
}
