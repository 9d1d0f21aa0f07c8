//! Prompt assembly for the generation stage.

use crate::models::{ChatMessage, RetrievalHit, Role};
use crate::providers::PromptMessage;

pub const SYSTEM_PROMPT: &str = r#"You are a research assistant answering questions from retrieved evidence.

Rules:
- Base your answer only on the numbered context passages you are given.
- Cite passages inline by their label, for example [1] or [2][3].
- Keep answers short and precise.
- Do not state anything the passages do not support.

When the passages are not enough to answer, say that the available context does not cover the question and suggest retrying with web search enabled."#;

/// Render sources as a numbered block, labels starting at `[1]`.
///
/// ```text
/// [1] (arxiv) Attention Is All You Need
/// https://arxiv.org/abs/1706.03762
/// The dominant sequence transduction models...
/// ```
pub fn context_block(sources: &[RetrievalHit]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(idx, hit)| {
            let source = if hit.source.is_empty() {
                "unknown"
            } else {
                hit.source.as_str()
            };

            let mut entry = format!("[{}] ({})", idx + 1, source);
            if !hit.title.is_empty() {
                entry.push(' ');
                entry.push_str(&hit.title);
            }
            for line in [&hit.url, &hit.text] {
                if !line.is_empty() {
                    entry.push('\n');
                    entry.push_str(line);
                }
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn question_prompt(question: &str, context: &str) -> String {
    let context = if context.is_empty() {
        "(no passages were found)"
    } else {
        context
    };

    format!(
        r#"Answer the question using the numbered context passages below. They come from a document index and, when needed, from a web search.

Context:
{context}

Question:
{question}

Cite every passage you rely on by its label. If the passages do not answer the question, say so plainly and recommend enabling web search."#
    )
}

/// System prompt, then prior turns in order, then the question with its context.
pub fn build_messages(
    history: &[ChatMessage],
    question: &str,
    sources: &[RetrievalHit],
) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::system(SYSTEM_PROMPT));

    for turn in history {
        messages.push(match turn.role {
            Role::User => PromptMessage::user(turn.content.clone()),
            Role::Assistant => PromptMessage::assistant(turn.content.clone()),
        });
    }

    messages.push(PromptMessage::user(question_prompt(
        question,
        &context_block(sources),
    )));
    messages
}
