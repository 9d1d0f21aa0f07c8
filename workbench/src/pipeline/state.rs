use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use utoipa::ToSchema;

use crate::cache::CacheKey;
use crate::models::{ChatMessage, ChatTimings, RetrievalHit};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normalize,
    Retrieve,
    Decide,
    WebSearch,
    Generate,
    Format,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::Retrieve => "retrieve",
            Stage::Decide => "decide",
            Stage::WebSearch => "web_search",
            Stage::Generate => "generate",
            Stage::Format => "format",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request with every default applied.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub query: String,
    pub namespace: String,
    pub top_k: u32,
    pub use_web_fallback: bool,
    pub min_score: f64,
    pub max_web_results: u32,
    pub chat_history: Vec<ChatMessage>,
    /// Chat cache key. Absent whenever the request carries history.
    pub cache_key: Option<CacheKey>,
    pub received_at: Instant,
}

impl NormalizedRequest {
    pub fn is_cacheable(&self) -> bool {
        self.cache_key.is_some()
    }
}

/// Outcome of the Decide stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    WebSearch,
    Generate,
}

/// Mutable context for one pipeline run.
#[derive(Debug)]
pub struct PipelineState {
    pub request: NormalizedRequest,
    pub retrieved: Vec<RetrievalHit>,
    pub decision: RouteDecision,
    pub web_hits: Vec<RetrievalHit>,
    pub answer: String,
    pub timings: ChatTimings,
}

impl PipelineState {
    pub fn new(request: NormalizedRequest) -> Self {
        Self {
            request,
            retrieved: Vec::new(),
            decision: RouteDecision::Generate,
            web_hits: Vec::new(),
            answer: String::new(),
            timings: ChatTimings::default(),
        }
    }

    pub fn top_score(&self) -> Option<f64> {
        self.retrieved.iter().map(|hit| hit.score).reduce(f64::max)
    }

    /// Retrieved hits first, then web hits.
    pub fn sources(&self) -> impl Iterator<Item = &RetrievalHit> {
        self.retrieved.iter().chain(self.web_hits.iter())
    }
}
