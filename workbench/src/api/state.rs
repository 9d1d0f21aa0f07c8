use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::gate::RequestGate;
use crate::metrics::MetricsRegistry;
use crate::pipeline::{OrchestrationPipeline, PipelineSettings, StreamAdapter};
use crate::providers::{Collaborators, Generator, Retriever};
use crate::services::SearchService;
use crate::trace::TraceContext;

/// Everything a request handler needs. Built once at startup; clones share
/// the same cache, gate and metrics.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub retriever: Arc<dyn Retriever>,
    pub generator: Arc<dyn Generator>,
    pub pipeline: OrchestrationPipeline,
    pub stream: StreamAdapter,
    pub search: SearchService,
    pub cache: ResponseCache,
    pub gate: RequestGate,
    pub metrics: MetricsRegistry,
}

impl AppState {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let cache = ResponseCache::new(&config.cache);
        let gate = RequestGate::from_config(&config.rate_limit);
        let metrics = MetricsRegistry::new(config.metrics.sample_capacity, cache.clone());
        let settings = PipelineSettings::from(&config.rag);

        let retriever = collaborators.retriever.clone();
        let generator = collaborators.generator.clone();
        let search = SearchService::new(retriever.clone(), cache.clone(), &settings);
        let pipeline = OrchestrationPipeline::new(collaborators, cache.clone(), settings)
            .with_trace(TraceContext::new(&config.trace));
        let stream = StreamAdapter::new(pipeline.clone(), metrics.clone());

        Self {
            config,
            retriever,
            generator,
            pipeline,
            stream,
            search,
            cache,
            gate,
            metrics,
        }
    }
}
