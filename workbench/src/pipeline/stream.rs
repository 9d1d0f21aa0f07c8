//! Incremental delivery of a chat answer over a long-lived connection.

use async_stream::stream;
use futures::Stream;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::WorkbenchError;
use crate::metrics::MetricsRegistry;
use crate::models::ChatResponse;

use super::{NormalizedRequest, OrchestrationPipeline};

#[derive(Debug)]
pub enum StreamEvent {
    /// Next fragment of the answer text.
    Delta(String),
    /// Terminal event carrying the same response the JSON endpoint returns.
    Completed(ChatResponse),
    /// Terminal event for a run that aborted before producing an answer.
    Failed(WorkbenchError),
}

/// Replays a completed answer as word-sized fragments followed by one
/// terminal event.
#[derive(Clone)]
pub struct StreamAdapter {
    pipeline: OrchestrationPipeline,
    metrics: MetricsRegistry,
}

impl StreamAdapter {
    pub fn new(pipeline: OrchestrationPipeline, metrics: MetricsRegistry) -> Self {
        Self { pipeline, metrics }
    }

    /// The cache write and timing sample happen only after the consumer has
    /// taken the terminal event and polled once more. A consumer that goes
    /// away earlier drops the stream and neither happens.
    pub fn stream(&self, request: NormalizedRequest) -> impl Stream<Item = StreamEvent> + Send {
        let pipeline = self.pipeline.clone();
        let metrics = self.metrics.clone();

        stream! {
            let (response, from_cache) = match pipeline.cached(&request) {
                Some(response) => (response, true),
                None => match pipeline.execute(request.clone()).await {
                    Ok(response) => (response, false),
                    Err(error) => {
                        tracing::warn!(error = %error, "Streaming chat aborted");
                        yield StreamEvent::Failed(error);
                        return;
                    }
                },
            };

            for fragment in segment_answer(&response.answer) {
                yield StreamEvent::Delta(fragment);
            }
            yield StreamEvent::Completed(response.clone());

            if !from_cache {
                pipeline.remember(&request, &response);
            }
            metrics.record_timing(&response.timings);
            tracing::debug!(from_cache, "Streaming chat delivered");
        }
    }
}

/// Split text on word boundaries, folding whitespace into the preceding
/// fragment. Concatenating the fragments reproduces the input exactly.
pub fn segment_answer(answer: &str) -> Vec<String> {
    let mut fragments: Vec<String> = Vec::new();
    for piece in answer.split_word_bounds() {
        if piece.chars().all(char::is_whitespace) {
            if let Some(last) = fragments.last_mut() {
                last.push_str(piece);
                continue;
            }
        }
        fragments.push(piece.to_string());
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_reassemble_exactly() {
        let answer = "RAG pairs retrieval with generation [1].\n\nIt grounds answers, cafés included.";
        let fragments = segment_answer(answer);
        assert!(fragments.len() > 5);
        assert_eq!(fragments.concat(), answer);
    }

    #[test]
    fn whitespace_attaches_to_previous_fragment() {
        assert_eq!(segment_answer("hello  world"), vec!["hello  ", "world"]);
    }

    #[test]
    fn leading_whitespace_is_kept() {
        assert_eq!(segment_answer("  hi"), vec!["  ", "hi"]);
    }

    #[test]
    fn empty_answer_has_no_fragments() {
        assert!(segment_answer("").is_empty());
    }
}
