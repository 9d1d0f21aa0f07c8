//! Narrow capability interfaces for the external services the pipeline
//! calls, plus their HTTP implementations.

mod http;
mod pinecone;
mod tavily;

pub use pinecone::PineconeRetriever;
pub use tavily::TavilySearcher;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Metadata;
use crate::trace::TraceHandles;

/// One record returned by the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedRecord {
    pub id: String,
    pub score: f64,
    pub text: String,
    pub metadata: Metadata,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Top `top_k` records for `query`, best first.
    async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: u32,
        filters: Option<&Metadata>,
    ) -> Result<Vec<RetrievedRecord>>;

    /// Record count for every namespace in the index.
    async fn namespace_stats(&self) -> Result<BTreeMap<String, u64>>;

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce an answer for a role-tagged conversation. `trace` is passed
    /// through untouched from the request's trace context.
    async fn generate(
        &self,
        messages: &[PromptMessage],
        trace: Option<&TraceHandles>,
    ) -> Result<String>;

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Distinguishes "no search provider" from "provider found nothing".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebSearchOutcome {
    NotConfigured,
    Results(Vec<WebResult>),
}

#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(&self, query: &str, max_results: u32) -> Result<WebSearchOutcome>;

    fn is_configured(&self) -> bool;
}

/// The set of collaborators a pipeline is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub retriever: Arc<dyn Retriever>,
    pub generator: Arc<dyn Generator>,
    pub web_searcher: Option<Arc<dyn WebSearcher>>,
}
