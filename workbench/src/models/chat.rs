use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Metadata;

/// Source label attached to hits produced by the web search fallback.
pub const WEB_SOURCE: &str = "web";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Incoming chat request. Omitted fields take the service defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_web_fallback: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_web_results: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_history: Option<Vec<ChatMessage>>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// A single piece of evidence, from the vector index or the web.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    pub source: String,
    pub title: String,
    pub url: String,
    pub score: f64,
    pub text: String,
    pub metadata: Metadata,
}

/// Wire form of a [`RetrievalHit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SourceHit {
    pub source: String,
    pub title: String,
    pub url: String,
    pub score: f64,
    pub chunk_text: String,
}

impl From<RetrievalHit> for SourceHit {
    fn from(hit: RetrievalHit) -> Self {
        Self {
            source: hit.source,
            title: hit.title,
            url: hit.url,
            score: hit.score,
            chunk_text: hit.text,
        }
    }
}

/// Per-stage latency in milliseconds. `web_ms` stays 0 when web search is skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatTimings {
    pub retrieve_ms: f64,
    pub web_ms: f64,
    pub generate_ms: f64,
    pub total_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TraceMetadata {
    pub project: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceHit>,
    pub timings: ChatTimings,
    pub trace: TraceMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn chat_request_accepts_minimal_body() {
        let req: ChatRequest = serde_json::from_str(r#"{"query":"what is RAG"}"#).unwrap();
        assert_eq!(req, ChatRequest::new("what is RAG"));
    }

    #[test]
    fn chat_request_accepts_null_history() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"query":"q","chat_history":null,"top_k":3}"#).unwrap();
        assert!(req.chat_history.is_none());
        assert_eq!(req.top_k, Some(3));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let result: Result<ChatMessage, _> =
            serde_json::from_str(r#"{"role":"system","content":"hi"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn chat_response_round_trips() {
        let response = ChatResponse {
            answer: "RAG pairs retrieval with generation [1].".into(),
            sources: vec![SourceHit {
                source: "arxiv".into(),
                title: "Retrieval-Augmented Generation".into(),
                url: "https://arxiv.org/abs/2005.11401".into(),
                score: 0.82,
                chunk_text: "We explore a general-purpose fine-tuning recipe".into(),
            }],
            timings: ChatTimings {
                retrieve_ms: 12.5,
                web_ms: 0.0,
                generate_ms: 340.25,
                total_ms: 353.0,
            },
            trace: TraceMetadata {
                project: Some("rag-demo".into()),
                enabled: true,
            },
        };

        let json = serde_json::to_string(&response).unwrap();
        let parsed: ChatResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn timings_always_carry_all_fields() {
        let json = serde_json::to_value(ChatTimings::default()).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 4);
        for key in ["retrieve_ms", "web_ms", "generate_ms", "total_ms"] {
            assert!(keys.iter().any(|k| k == key), "missing {key}");
        }
    }
}
