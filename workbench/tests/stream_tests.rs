mod common;

use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;

use common::{pipeline, FakeGenerator, FakeRetriever};
use workbench::cache::ResponseCache;
use workbench::config::CacheConfig;
use workbench::metrics::MetricsRegistry;
use workbench::models::{ChatMessage, ChatRequest, Role};
use workbench::pipeline::{OrchestrationPipeline, Stage, StreamAdapter, StreamEvent};

const ANSWER: &str = "Retrieval-augmented generation grounds answers in documents [1].";

struct Harness {
    pipeline: OrchestrationPipeline,
    adapter: StreamAdapter,
    cache: ResponseCache,
    metrics: MetricsRegistry,
    retriever: Arc<FakeRetriever>,
}

fn harness(generator: FakeGenerator) -> Harness {
    let cache = ResponseCache::new(&CacheConfig::default());
    let metrics = MetricsRegistry::new(20, cache.clone());
    let retriever = Arc::new(FakeRetriever::with_scores(&[0.8]));
    let pipeline = pipeline(retriever.clone(), Arc::new(generator), None, cache.clone());
    let adapter = StreamAdapter::new(pipeline.clone(), metrics.clone());
    Harness {
        pipeline,
        adapter,
        cache,
        metrics,
        retriever,
    }
}

#[tokio::test]
async fn test_deltas_then_single_terminal_event() {
    let h = harness(FakeGenerator::answering(ANSWER));
    let request = h.pipeline.normalize(ChatRequest::new("what is RAG")).unwrap();

    let events: Vec<StreamEvent> = h.adapter.stream(request).collect().await;

    let (last, deltas) = events.split_last().unwrap();
    let text: String = deltas
        .iter()
        .map(|event| match event {
            StreamEvent::Delta(fragment) => fragment.as_str(),
            other => panic!("Expected only deltas before the end, got: {other:?}"),
        })
        .collect();
    assert_eq!(text, ANSWER);
    assert!(deltas.len() > 1);

    let response = match last {
        StreamEvent::Completed(response) => response,
        other => panic!("Expected a completed event, got: {other:?}"),
    };
    assert_eq!(response.answer, ANSWER);
    assert_eq!(response.sources.len(), 1);

    // Fully drained: cached and sampled exactly once.
    assert_eq!(h.cache.chat().len(), 1);
    assert_eq!(h.metrics.snapshot().sample_count, 1);
}

#[tokio::test]
async fn test_stream_matches_json_contract() {
    let h = harness(FakeGenerator::answering(ANSWER));
    let request = h.pipeline.normalize(ChatRequest::new("what is RAG")).unwrap();
    let events: Vec<StreamEvent> = h.adapter.stream(request).collect().await;
    let streamed = match events.last() {
        Some(StreamEvent::Completed(response)) => response.clone(),
        other => panic!("Expected a completed event, got: {other:?}"),
    };

    // The JSON path now reads the entry the stream wrote.
    let outcome = h.pipeline.respond(ChatRequest::new("what is RAG")).await.unwrap();
    assert!(outcome.from_cache);
    assert_eq!(outcome.response, streamed);
}

#[tokio::test]
async fn test_early_disconnect_caches_and_records_nothing() {
    let h = harness(FakeGenerator::answering(ANSWER));
    let request = h.pipeline.normalize(ChatRequest::new("what is RAG")).unwrap();

    {
        let mut events = Box::pin(h.adapter.stream(request));
        let first = events.next().await;
        assert!(matches!(first, Some(StreamEvent::Delta(_))));
    }

    assert!(h.cache.chat().is_empty());
    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.sample_count, 0);
    assert_eq!(snapshot.total_samples, 0);
}

#[tokio::test]
async fn test_drop_right_after_terminal_event_records_nothing() {
    let h = harness(FakeGenerator::answering("short answer"));
    let request = h.pipeline.normalize(ChatRequest::new("q")).unwrap();

    {
        let mut events = Box::pin(h.adapter.stream(request));
        while let Some(event) = events.next().await {
            if matches!(event, StreamEvent::Completed(_)) {
                break;
            }
        }
    }

    assert!(h.cache.chat().is_empty());
    assert_eq!(h.metrics.snapshot().sample_count, 0);
}

#[tokio::test]
async fn test_failure_emits_one_error_event() {
    let h = harness(FakeGenerator::failing("model overloaded"));
    let request = h.pipeline.normalize(ChatRequest::new("q")).unwrap();

    let events: Vec<StreamEvent> = h.adapter.stream(request).collect().await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Failed(error) => assert_eq!(error.stage(), Some(Stage::Generate)),
        other => panic!("Expected a failure event, got: {other:?}"),
    }
    assert!(h.cache.chat().is_empty());
    assert_eq!(h.metrics.snapshot().sample_count, 0);
}

#[tokio::test]
async fn test_stream_serves_cached_answer() {
    let h = harness(FakeGenerator::answering(ANSWER));
    h.pipeline.respond(ChatRequest::new("what is RAG")).await.unwrap();
    assert_eq!(h.retriever.calls(), 1);

    let request = h.pipeline.normalize(ChatRequest::new("what is RAG")).unwrap();
    let events: Vec<StreamEvent> = h.adapter.stream(request).collect().await;

    assert!(matches!(events.last(), Some(StreamEvent::Completed(_))));
    assert_eq!(h.retriever.calls(), 1);
    assert_eq!(h.cache.stats().chat_hits, 1);
}

#[tokio::test]
async fn test_stream_with_history_bypasses_cache() {
    let h = harness(FakeGenerator::answering(ANSWER));
    let mut chat = ChatRequest::new("and then?");
    chat.chat_history = Some(vec![ChatMessage {
        role: Role::User,
        content: "tell me about RAG".to_string(),
    }]);
    let request = h.pipeline.normalize(chat).unwrap();

    let events: Vec<StreamEvent> = h.adapter.stream(request).collect().await;

    assert!(matches!(events.last(), Some(StreamEvent::Completed(_))));
    assert!(h.cache.chat().is_empty());
    assert_eq!(h.cache.stats().chat_misses, 0);
    assert_eq!(h.metrics.snapshot().sample_count, 1);
}
