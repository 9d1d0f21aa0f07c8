use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use crate::config::{parse_llm_provider_model, LlmConfig};
use crate::error::{Result, WorkbenchError};
use crate::llm::api::LlmApiClient;
use crate::providers::{Generator, PromptMessage};
use crate::trace::TraceHandles;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    Groq,
    OpenAI,
    OpenRouter,
    Ollama,
    Unavailable { reason: String },
}

/// Answer generator over an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct LlmProvider {
    backend: LlmBackend,
    client: Option<Arc<LlmApiClient>>,
}

impl LlmProvider {
    pub fn new(config: Option<&LlmConfig>) -> Self {
        let Some(config) = config else {
            return Self::unavailable("No LLM configuration provided (set LLM_MODEL)");
        };

        let (provider, _model) = parse_llm_provider_model(&config.model);
        let backend = match provider.to_lowercase().as_str() {
            "openai" => LlmBackend::OpenAI,
            "openrouter" => LlmBackend::OpenRouter,
            "ollama" => LlmBackend::Ollama,
            _ => LlmBackend::Groq,
        };

        match LlmApiClient::new(config) {
            Ok(client) => Self {
                backend,
                client: Some(Arc::new(client)),
            },
            Err(error) => {
                tracing::warn!(error = %error, model = %config.model, "LLM unavailable");
                Self::unavailable(&error.to_string())
            }
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            backend: LlmBackend::Unavailable {
                reason: reason.to_string(),
            },
            client: None,
        }
    }

    pub fn backend(&self) -> &LlmBackend {
        &self.backend
    }

    pub fn base_url(&self) -> Option<&str> {
        self.client.as_deref().map(LlmApiClient::base_url)
    }

    pub fn model(&self) -> Option<&str> {
        self.client.as_deref().map(LlmApiClient::model)
    }

    fn client(&self) -> Result<&LlmApiClient> {
        match (&self.backend, self.client.as_deref()) {
            (_, Some(client)) => Ok(client),
            (LlmBackend::Unavailable { reason }, None) => {
                Err(WorkbenchError::Configuration(reason.clone()))
            }
            (_, None) => Err(WorkbenchError::Configuration(
                "LLM client is not initialised".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Generator for LlmProvider {
    async fn generate(
        &self,
        messages: &[PromptMessage],
        trace: Option<&TraceHandles>,
    ) -> Result<String> {
        let client = self.client()?;
        let span = match trace {
            Some(handles) => tracing::info_span!(
                "llm.generate",
                run_id = %handles.run_id(),
                project = handles.project().unwrap_or_default(),
                model = client.model(),
            ),
            None => tracing::debug_span!("llm.generate", model = client.model()),
        };
        client.chat(messages).instrument(span).await
    }

    fn is_available(&self) -> bool {
        !matches!(self.backend, LlmBackend::Unavailable { .. })
    }
}
