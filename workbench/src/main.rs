use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use workbench::api::{create_router, AppState};
use workbench::config::Config;
use workbench::llm::LlmProvider;
use workbench::providers::{
    Collaborators, Generator, PineconeRetriever, TavilySearcher, WebSearcher,
};

const PRUNE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "workbench")]
#[command(about = "Retrieval-augmented chat service with web-search fallback")]
struct Args {
    /// Bind address, overrides WORKBENCH_HOST
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides WORKBENCH_PORT / PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let fmt_layer = if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workbench=info,tower_http=debug".into()),
        )
        .with(fmt_layer)
        .init();

    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if config.server.api_keys.is_empty() {
        tracing::warn!(
            "WORKBENCH_API_KEYS is not set. /chat, /search and /metrics are open to any caller."
        );
    }

    let retriever = PineconeRetriever::new(config.retriever.as_ref());
    match &config.retriever {
        Some(retriever_config) => {
            tracing::info!("Initializing retriever: {}...", retriever_config.host)
        }
        None => tracing::warn!("PINECONE_HOST is not set - /chat and /search will return 503"),
    }

    if let Some(llm_config) = &config.llm {
        tracing::info!("Initializing LLM provider: {}...", llm_config.model);
    }
    let llm = LlmProvider::new(config.llm.as_ref());
    if !llm.is_available() {
        tracing::warn!("LLM unavailable - /chat will return 503");
    }

    let web_searcher = match TavilySearcher::new(config.web_search.as_ref()) {
        Ok(searcher) => searcher,
        Err(e) => {
            tracing::warn!("Failed to initialize web search: {} - continuing without it", e);
            TavilySearcher::unconfigured()
        }
    };
    if !web_searcher.is_configured() {
        tracing::info!("Web search fallback disabled");
    }

    if config.trace.is_active() {
        tracing::info!(
            project = ?config.trace.project,
            "Generation tracing enabled"
        );
    }

    let collaborators = Collaborators {
        retriever: Arc::new(retriever),
        generator: Arc::new(llm),
        web_searcher: Some(Arc::new(web_searcher)),
    };
    let state = AppState::new(config.clone(), collaborators);

    let cancel_token = CancellationToken::new();

    tracing::info!("Starting cache and rate-limit housekeeping...");
    let cache = state.cache.clone();
    let gate = state.gate.clone();
    let token = cancel_token.child_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("Housekeeping shutting down...");
                    break;
                }
                _ = tokio::time::sleep(PRUNE_INTERVAL) => {
                    let expired = cache.prune_expired();
                    let windows = gate.prune();
                    if expired > 0 || windows > 0 {
                        tracing::debug!(expired, windows, "Pruned expired cache entries and rate-limit windows");
                    }
                }
            }
        }
    });

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Workbench starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/health", addr);
    tracing::info!("  API docs:     http://{}/redoc", addr);
    tracing::info!("  OpenAPI document: http://{}/openapi.json", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(cancel_token))
    .await?;

    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling background tasks...");
    cancel_token.cancel();
}
