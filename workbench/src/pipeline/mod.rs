//! The chat orchestration state machine:
//! Normalize → Retrieve → Decide → (WebSearch) → Generate → Format.

pub mod prompt;
mod state;
mod stream;

pub use state::{NormalizedRequest, PipelineState, RouteDecision, Stage};
pub use stream::{segment_answer, StreamAdapter, StreamEvent};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::cache::{CacheKey, ResponseCache};
use crate::config::RagConfig;
use crate::error::{Result, WorkbenchError};
use crate::models::{
    ChatMessage, ChatRequest, ChatResponse, Metadata, RetrievalHit, SourceHit, WEB_SOURCE,
};
use crate::providers::{
    Collaborators, Generator, RetrievedRecord, Retriever, WebSearchOutcome, WebSearcher,
};
use crate::trace::TraceContext;

pub const MAX_TOP_K: u32 = 100;
pub const MAX_WEB_RESULTS: u32 = 20;

/// Request defaults and the outer timeout for each external call.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub default_namespace: String,
    pub default_top_k: u32,
    pub default_min_score: f64,
    pub default_max_web_results: u32,
    pub retrieve_timeout: Duration,
    pub web_search_timeout: Duration,
    pub generate_timeout: Duration,
}

impl From<&RagConfig> for PipelineSettings {
    fn from(config: &RagConfig) -> Self {
        Self {
            default_namespace: config.default_namespace.clone(),
            default_top_k: config.default_top_k,
            default_min_score: config.min_score,
            default_max_web_results: config.max_web_results,
            retrieve_timeout: Duration::from_secs(config.retrieve_timeout_secs),
            web_search_timeout: Duration::from_secs(config.web_search_timeout_secs),
            generate_timeout: Duration::from_secs(config.generate_timeout_secs),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

/// A chat response plus whether it came from the cache.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub response: ChatResponse,
    pub from_cache: bool,
}

#[derive(Clone)]
pub struct OrchestrationPipeline {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    web_searcher: Option<Arc<dyn WebSearcher>>,
    cache: ResponseCache,
    settings: Arc<PipelineSettings>,
    trace: TraceContext,
}

impl OrchestrationPipeline {
    pub fn new(
        collaborators: Collaborators,
        cache: ResponseCache,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            retriever: collaborators.retriever,
            generator: collaborators.generator,
            web_searcher: collaborators.web_searcher,
            cache,
            settings: Arc::new(settings),
            trace: TraceContext::disabled(),
        }
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = trace;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn web_search_configured(&self) -> bool {
        self.web_searcher
            .as_ref()
            .is_some_and(|searcher| searcher.is_configured())
    }

    /// Stage 1: validate bounds, apply defaults, drop empty history turns and
    /// confirm the required collaborators are usable. Makes no external call.
    pub fn normalize(&self, request: ChatRequest) -> Result<NormalizedRequest> {
        let received_at = Instant::now();
        let settings = &self.settings;

        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(WorkbenchError::Validation(
                "query must not be empty".to_string(),
            ));
        }

        let top_k = request.top_k.unwrap_or(settings.default_top_k);
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(WorkbenchError::Validation(format!(
                "top_k must be between 1 and {MAX_TOP_K}, got {top_k}"
            )));
        }

        let min_score = request.min_score.unwrap_or(settings.default_min_score);
        if !(0.0..=1.0).contains(&min_score) {
            return Err(WorkbenchError::Validation(format!(
                "min_score must be between 0 and 1, got {min_score}"
            )));
        }

        let max_web_results = request
            .max_web_results
            .unwrap_or(settings.default_max_web_results);
        if !(1..=MAX_WEB_RESULTS).contains(&max_web_results) {
            return Err(WorkbenchError::Validation(format!(
                "max_web_results must be between 1 and {MAX_WEB_RESULTS}, got {max_web_results}"
            )));
        }

        let namespace = request
            .namespace
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| settings.default_namespace.clone());

        let chat_history: Vec<ChatMessage> = request
            .chat_history
            .unwrap_or_default()
            .into_iter()
            .filter(|turn| !turn.content.trim().is_empty())
            .collect();

        if !self.retriever.is_available() {
            return Err(WorkbenchError::Configuration(
                "No retriever is configured".to_string(),
            ));
        }
        if !self.generator.is_available() {
            return Err(WorkbenchError::Configuration(
                "No generator is configured".to_string(),
            ));
        }

        let use_web_fallback = request.use_web_fallback.unwrap_or(true);
        let cache_key = chat_history.is_empty().then(|| {
            CacheKey::for_chat(
                &namespace,
                &query,
                top_k,
                min_score,
                use_web_fallback,
                max_web_results,
            )
        });

        Ok(NormalizedRequest {
            query,
            namespace,
            top_k,
            use_web_fallback,
            min_score,
            max_web_results,
            chat_history,
            cache_key,
            received_at,
        })
    }

    /// Cached answer for a history-free request. Requests with history never
    /// read the cache.
    pub fn cached(&self, request: &NormalizedRequest) -> Option<ChatResponse> {
        let key = request.cache_key.as_ref()?;
        self.cache.chat().get(key)
    }

    /// Store a completed answer. Requests with history are never written.
    pub fn remember(&self, request: &NormalizedRequest, response: &ChatResponse) {
        if let Some(key) = &request.cache_key {
            self.cache.chat().put(key.clone(), response.clone());
        }
    }

    /// Full request path: normalize, cache lookup, execute, cache store.
    pub async fn respond(&self, request: ChatRequest) -> Result<PipelineOutcome> {
        let request = self.normalize(request)?;

        if let Some(response) = self.cached(&request) {
            return Ok(PipelineOutcome {
                response,
                from_cache: true,
            });
        }

        let response = self.execute(request.clone()).await?;
        self.remember(&request, &response);
        Ok(PipelineOutcome {
            response,
            from_cache: false,
        })
    }

    /// Stages 2 through 6 for an already normalized request. Never touches the cache.
    pub async fn execute(&self, request: NormalizedRequest) -> Result<ChatResponse> {
        let mut state = PipelineState::new(request);

        self.retrieve(&mut state).await?;
        state.decision = self.decide(&state);
        if state.decision == RouteDecision::WebSearch {
            self.web_search(&mut state).await;
        }
        self.generate(&mut state).await?;
        Ok(self.format(state))
    }

    async fn retrieve(&self, state: &mut PipelineState) -> Result<()> {
        let started = Instant::now();
        let request = &state.request;
        let records = with_timeout(
            Stage::Retrieve,
            self.settings.retrieve_timeout,
            self.retriever.search(
                &request.namespace,
                &request.query,
                request.top_k,
                None,
            ),
        )
        .await?;

        let mut hits: Vec<RetrievalHit> = records.into_iter().map(hit_from_record).collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));

        state.timings.retrieve_ms = elapsed_ms(started);
        state.retrieved = hits;
        tracing::info!(
            namespace = %state.request.namespace,
            hits = state.retrieved.len(),
            top_score = ?state.top_score(),
            elapsed_ms = state.timings.retrieve_ms,
            "Retrieve stage complete"
        );
        Ok(())
    }

    /// Web search runs iff the caller allows it, a searcher is configured, and
    /// retrieval came back empty or below `min_score`.
    pub fn decide(&self, state: &PipelineState) -> RouteDecision {
        let request = &state.request;
        let searcher_configured = self.web_search_configured();
        let top_score = state.top_score();
        let weak_retrieval = match top_score {
            None => true,
            Some(score) => score < request.min_score,
        };

        let decision = if request.use_web_fallback && searcher_configured && weak_retrieval {
            RouteDecision::WebSearch
        } else {
            RouteDecision::Generate
        };

        tracing::info!(
            use_web_fallback = request.use_web_fallback,
            searcher_configured,
            hits = state.retrieved.len(),
            top_score = ?top_score,
            min_score = request.min_score,
            decision = ?decision,
            "Decide stage complete"
        );
        decision
    }

    /// Best effort: any failure leaves `web_hits` empty and the run continues.
    async fn web_search(&self, state: &mut PipelineState) {
        let Some(searcher) = &self.web_searcher else {
            return;
        };
        let started = Instant::now();
        let outcome = with_timeout(
            Stage::WebSearch,
            self.settings.web_search_timeout,
            searcher.search(&state.request.query, state.request.max_web_results),
        )
        .await;
        state.timings.web_ms = elapsed_ms(started);

        match outcome {
            Ok(WebSearchOutcome::Results(results)) => {
                state.web_hits = results
                    .into_iter()
                    .map(|result| RetrievalHit {
                        source: WEB_SOURCE.to_string(),
                        title: if result.title.is_empty() {
                            result.url.clone()
                        } else {
                            result.title
                        },
                        url: result.url,
                        score: 0.0,
                        text: result.snippet,
                        metadata: Metadata::new(),
                    })
                    .collect();
                tracing::info!(
                    hits = state.web_hits.len(),
                    elapsed_ms = state.timings.web_ms,
                    "WebSearch stage complete"
                );
            }
            Ok(WebSearchOutcome::NotConfigured) => {
                tracing::warn!("Web search requested but no provider is configured");
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    elapsed_ms = state.timings.web_ms,
                    "Web search failed, continuing with retrieved sources"
                );
            }
        }
    }

    async fn generate(&self, state: &mut PipelineState) -> Result<()> {
        let started = Instant::now();
        let sources: Vec<RetrievalHit> = state.sources().cloned().collect();
        let messages =
            prompt::build_messages(&state.request.chat_history, &state.request.query, &sources);
        let handles = self.trace.handles();

        let answer = with_timeout(
            Stage::Generate,
            self.settings.generate_timeout,
            self.generator.generate(&messages, handles.as_ref()),
        )
        .await?;

        state.timings.generate_ms = elapsed_ms(started);
        state.answer = answer.trim().to_string();
        tracing::info!(
            sources = sources.len(),
            answer_len = state.answer.len(),
            elapsed_ms = state.timings.generate_ms,
            "Generate stage complete"
        );
        Ok(())
    }

    fn format(&self, state: PipelineState) -> ChatResponse {
        let mut timings = state.timings;
        timings.total_ms = elapsed_ms(state.request.received_at);

        let PipelineState {
            retrieved,
            web_hits,
            answer,
            ..
        } = state;

        ChatResponse {
            answer,
            sources: retrieved
                .into_iter()
                .chain(web_hits)
                .map(SourceHit::from)
                .collect(),
            timings,
            trace: self.trace.metadata(),
        }
    }
}

async fn with_timeout<T, F>(stage: Stage, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(error.at_stage(stage)),
        Err(_) => {
            tracing::warn!(stage = %stage, timeout_ms = limit.as_millis() as u64, "Stage timed out");
            Err(WorkbenchError::Timeout {
                stage,
                timeout_ms: limit.as_millis() as u64,
            })
        }
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

fn metadata_str(metadata: &Metadata, key: &str) -> String {
    match metadata.get(key) {
        Some(Value::String(value)) => value.clone(),
        _ => String::new(),
    }
}

fn hit_from_record(record: RetrievedRecord) -> RetrievalHit {
    RetrievalHit {
        source: metadata_str(&record.metadata, "source"),
        title: metadata_str(&record.metadata, "title"),
        url: metadata_str(&record.metadata, "url"),
        score: if record.score.is_nan() {
            0.0
        } else {
            record.score.clamp(0.0, 1.0)
        },
        text: record.text,
        metadata: record.metadata,
    }
}
