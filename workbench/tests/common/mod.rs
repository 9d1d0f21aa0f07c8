// Shared fakes and helpers for integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use workbench::cache::ResponseCache;
use workbench::error::{Result, WorkbenchError};
use workbench::models::Metadata;
use workbench::pipeline::{OrchestrationPipeline, PipelineSettings};
use workbench::providers::{
    Collaborators, Generator, PromptMessage, RetrievedRecord, Retriever, WebResult,
    WebSearchOutcome, WebSearcher,
};
use workbench::trace::TraceHandles;

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn record(id: &str, score: f64) -> RetrievedRecord {
    let mut metadata = Metadata::new();
    metadata.insert("title".to_string(), json!(format!("Doc {id}")));
    metadata.insert("source".to_string(), json!("kb"));
    metadata.insert("url".to_string(), json!(format!("https://kb.example/{id}")));
    metadata.insert("chunk_text".to_string(), json!(format!("text of {id}")));
    RetrievedRecord {
        id: id.to_string(),
        score,
        text: format!("text of {id}"),
        metadata,
    }
}

#[derive(Default)]
pub struct FakeRetriever {
    records: Vec<RetrievedRecord>,
    failure: Option<String>,
    delay: Option<Duration>,
    unavailable: bool,
    stats: BTreeMap<String, u64>,
    calls: AtomicUsize,
}

impl FakeRetriever {
    /// One record per score, in the given (possibly unsorted) order.
    pub fn with_scores(scores: &[f64]) -> Self {
        Self {
            records: scores
                .iter()
                .enumerate()
                .map(|(i, score)| record(&format!("r{i}"), *score))
                .collect(),
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_namespace(mut self, namespace: &str, vector_count: u64) -> Self {
        self.stats.insert(namespace.to_string(), vector_count);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn search(
        &self,
        _namespace: &str,
        _query: &str,
        top_k: u32,
        _filters: Option<&Metadata>,
    ) -> Result<Vec<RetrievedRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(WorkbenchError::Provider(message.clone()));
        }
        Ok(self
            .records
            .iter()
            .take(top_k as usize)
            .cloned()
            .collect())
    }

    async fn namespace_stats(&self) -> Result<BTreeMap<String, u64>> {
        if let Some(message) = &self.failure {
            return Err(WorkbenchError::Provider(message.clone()));
        }
        Ok(self.stats.clone())
    }

    fn is_available(&self) -> bool {
        !self.unavailable
    }
}

pub struct FakeGenerator {
    answer: String,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<PromptMessage>>,
    saw_trace: Mutex<Option<bool>>,
}

impl FakeGenerator {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
            saw_trace: Mutex::new(None),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::answering("")
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<PromptMessage> {
        self.last_messages.lock().unwrap().clone()
    }

    /// Whether the last call received trace handles, `None` before any call.
    pub fn saw_trace(&self) -> Option<bool> {
        *self.saw_trace.lock().unwrap()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(
        &self,
        messages: &[PromptMessage],
        trace: Option<&TraceHandles>,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();
        *self.saw_trace.lock().unwrap() = Some(trace.is_some());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(message) => Err(WorkbenchError::Provider(message.clone())),
            None => Ok(self.answer.clone()),
        }
    }
}

pub struct FakeWebSearcher {
    results: Vec<WebResult>,
    failure: Option<String>,
    configured: bool,
    calls: AtomicUsize,
}

impl FakeWebSearcher {
    pub fn returning(results: Vec<WebResult>) -> Self {
        Self {
            results,
            failure: None,
            configured: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn single(title: &str, url: &str, snippet: &str) -> Self {
        Self::returning(vec![WebResult {
            title: title.to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
        }])
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::returning(Vec::new())
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::returning(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearcher for FakeWebSearcher {
    async fn search(&self, _query: &str, max_results: u32) -> Result<WebSearchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.configured {
            return Ok(WebSearchOutcome::NotConfigured);
        }
        if let Some(message) = &self.failure {
            return Err(WorkbenchError::Provider(message.clone()));
        }
        Ok(WebSearchOutcome::Results(
            self.results
                .iter()
                .take(max_results as usize)
                .cloned()
                .collect(),
        ))
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

pub fn collaborators(
    retriever: Arc<FakeRetriever>,
    generator: Arc<FakeGenerator>,
    web_searcher: Option<Arc<FakeWebSearcher>>,
) -> Collaborators {
    Collaborators {
        retriever,
        generator,
        web_searcher: web_searcher.map(|searcher| searcher as Arc<dyn WebSearcher>),
    }
}

pub fn pipeline(
    retriever: Arc<FakeRetriever>,
    generator: Arc<FakeGenerator>,
    web_searcher: Option<Arc<FakeWebSearcher>>,
    cache: ResponseCache,
) -> OrchestrationPipeline {
    OrchestrationPipeline::new(
        collaborators(retriever, generator, web_searcher),
        cache,
        PipelineSettings::default(),
    )
}

pub fn pipeline_with_settings(
    retriever: Arc<FakeRetriever>,
    generator: Arc<FakeGenerator>,
    web_searcher: Option<Arc<FakeWebSearcher>>,
    cache: ResponseCache,
    settings: PipelineSettings,
) -> OrchestrationPipeline {
    OrchestrationPipeline::new(
        collaborators(retriever, generator, web_searcher),
        cache,
        settings,
    )
}
