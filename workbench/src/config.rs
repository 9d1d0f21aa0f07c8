use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

/// Split a comma-separated variable into trimmed, non-empty items.
fn parse_env_list(var: &str) -> Vec<String> {
    env::var(var)
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Read a variable, treating blank values as unset.
fn env_non_empty(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub retriever: Option<RetrieverConfig>,
    pub llm: Option<LlmConfig>,
    pub web_search: Option<WebSearchConfig>,
    pub rag: RagConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub metrics: MetricsConfig,
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_keys: Vec<String>,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
            api_keys: Vec::new(),
            allowed_origins: Vec::new(),
        }
    }
}

/// Vector index connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrieverConfig {
    pub host: String,
    pub api_key: Option<String>,
    pub text_field: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// LLM configuration for chat/completion models
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Request defaults and per-stage timeouts for the chat pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct RagConfig {
    pub default_namespace: String,
    pub default_top_k: u32,
    pub min_score: f64,
    pub max_web_results: u32,
    pub retrieve_timeout_secs: u64,
    pub web_search_timeout_secs: u64,
    pub generate_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            default_namespace: "dev".to_string(),
            default_top_k: 5,
            min_score: 0.25,
            max_web_results: 5,
            retrieve_timeout_secs: 15,
            web_search_timeout_secs: 15,
            generate_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub search_ttl_secs: u64,
    pub chat_ttl_secs: u64,
    pub search_capacity: usize,
    pub chat_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_ttl_secs: 60,
            chat_ttl_secs: 60,
            search_capacity: 1024,
            chat_capacity: 512,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_secs: u64,
    pub chat_limit: u32,
    pub search_limit: u32,
    /// Key clients on the first `X-Forwarded-For` hop. Only safe behind a
    /// proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            chat_limit: 30,
            search_limit: 60,
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub sample_capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { sample_capacity: 20 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub project: Option<String>,
}

impl TraceConfig {
    /// Tracing is only active when switched on and given credentials.
    pub fn is_active(&self) -> bool {
        self.enabled && self.api_key.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        let http_timeout = parse_env_or("HTTP_TIMEOUT_SECONDS", 10);

        Self {
            server: ServerConfig {
                host: env::var("WORKBENCH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_opt("WORKBENCH_PORT")
                    .or_else(|| parse_env_opt("PORT"))
                    .unwrap_or(7860),
                api_keys: parse_env_list("WORKBENCH_API_KEYS"),
                allowed_origins: parse_env_list("ALLOWED_ORIGINS")
                    .into_iter()
                    .filter(|origin| origin != "*")
                    .collect(),
            },
            retriever: env_non_empty("PINECONE_HOST").map(|host| RetrieverConfig {
                host,
                api_key: env_non_empty("PINECONE_API_KEY"),
                text_field: env::var("PINECONE_TEXT_FIELD")
                    .unwrap_or_else(|_| "chunk_text".to_string()),
                timeout_secs: http_timeout,
                max_retries: parse_env_or("HTTP_MAX_RETRIES", 3),
            }),
            llm: env_non_empty("LLM_MODEL").map(|model| LlmConfig {
                model,
                api_key: env_non_empty("LLM_API_KEY"),
                base_url: env_non_empty("LLM_BASE_URL"),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 30),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 3),
                temperature: parse_env_or("LLM_TEMPERATURE", 0.2),
            }),
            web_search: env_non_empty("TAVILY_API_KEY").map(|api_key| WebSearchConfig {
                api_key,
                base_url: env::var("TAVILY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.tavily.com".to_string()),
                timeout_secs: http_timeout,
                max_retries: parse_env_or("HTTP_MAX_RETRIES", 3),
            }),
            rag: RagConfig {
                default_namespace: env::var("PINECONE_NAMESPACE")
                    .unwrap_or_else(|_| "dev".to_string()),
                default_top_k: parse_env_or("RAG_DEFAULT_TOP_K", 5),
                min_score: parse_env_or("RAG_MIN_SCORE", 0.25),
                max_web_results: parse_env_or("RAG_MAX_WEB_RESULTS", 5),
                retrieve_timeout_secs: parse_env_or("RETRIEVE_TIMEOUT_SECS", 15),
                web_search_timeout_secs: parse_env_or("WEB_SEARCH_TIMEOUT_SECS", 15),
                generate_timeout_secs: parse_env_or("GENERATE_TIMEOUT_SECS", 60),
            },
            cache: CacheConfig {
                enabled: parse_env_or("CACHE_ENABLED", true),
                search_ttl_secs: parse_env_or("SEARCH_CACHE_TTL_SECS", 60),
                chat_ttl_secs: parse_env_or("CHAT_CACHE_TTL_SECS", 60),
                search_capacity: parse_env_or("SEARCH_CACHE_CAPACITY", 1024),
                chat_capacity: parse_env_or("CHAT_CACHE_CAPACITY", 512),
            },
            rate_limit: RateLimitConfig {
                enabled: parse_env_or("RATE_LIMIT_ENABLED", true),
                window_secs: parse_env_or("RATE_LIMIT_WINDOW_SECS", 60),
                chat_limit: parse_env_or("RATE_LIMIT_CHAT", 30),
                search_limit: parse_env_or("RATE_LIMIT_SEARCH", 60),
                trust_forwarded_for: parse_env_or("RATE_LIMIT_TRUST_FORWARDED", false),
            },
            metrics: MetricsConfig {
                sample_capacity: parse_env_or("METRICS_SAMPLE_CAPACITY", 20),
            },
            trace: TraceConfig {
                enabled: parse_env_or("TRACING_ENABLED", false),
                api_key: env_non_empty("TRACING_API_KEY"),
                project: env_non_empty("TRACING_PROJECT"),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["groq", "openai", "openrouter", "ollama"];

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Unprefixed names go to the default hosted provider
    ("groq", model)
}
