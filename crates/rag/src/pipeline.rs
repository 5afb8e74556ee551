use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::Serialize;

use docqa_core::{simulate_confidence, ConfidenceBand};
use docqa_llm::{ChatModel, LlmRequest, LlmResponse, ProviderError};

use crate::prompts::{answer_prompt, summary_prompt, SummarySettings, NOT_FOUND_ANSWER};
use crate::store::{RetrievedChunk, VectorStore};

pub const DEFAULT_TOP_K: usize = 5;
/// Deepest retrieval a caller may request for one question.
pub const DEFAULT_QUERY_TOP_K: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub confidence: f32,
    pub band: ConfidenceBand,
    pub not_found: bool,
    pub used_chunks: Vec<RetrievedChunk>,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

pub fn summarize(
    text: &str,
    llm: &dyn ChatModel,
    settings: &SummarySettings,
    retry: &RetryPolicy,
) -> Result<Summary> {
    let prompt = summary_prompt(text, settings);
    let response = call_llm_with_retry(llm, &LlmRequest::user(prompt), retry, "summary")?;
    Ok(Summary {
        text: response.content.trim().to_string(),
        prompt_tokens: response.prompt_tokens,
        completion_tokens: response.completion_tokens,
    })
}

/// Answers `question` from the `top_k` closest chunks only.
pub fn answer_question(
    store: &VectorStore,
    llm: &dyn ChatModel,
    question: &str,
    top_k: usize,
    retry: &RetryPolicy,
) -> Result<RagAnswer> {
    let question = question.trim();
    if question.is_empty() {
        return Err(anyhow!("question must not be empty"));
    }
    let used_chunks = store.query(question, top_k)?;
    if used_chunks.is_empty() {
        tracing::warn!("no chunks retrieved; asking with an empty context");
    }
    let context = used_chunks
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let prompt = answer_prompt(&context, question);
    let response = call_llm_with_retry(llm, &LlmRequest::user(prompt), retry, "ask")?;
    let answer = response.content.trim().to_string();
    let confidence = simulate_confidence(&answer);
    Ok(RagAnswer {
        not_found: is_not_found(&answer),
        band: ConfidenceBand::from_score(confidence),
        confidence,
        answer,
        used_chunks,
        model: llm.label(),
        prompt_tokens: response.prompt_tokens,
        completion_tokens: response.completion_tokens,
    })
}

fn is_not_found(answer: &str) -> bool {
    let sentinel = NOT_FOUND_ANSWER.trim_end_matches('.');
    answer
        .trim_matches(|c: char| c == '"' || c.is_whitespace())
        .trim_end_matches('.')
        .eq_ignore_ascii_case(sentinel)
}

pub(crate) fn call_llm_with_retry(
    llm: &dyn ChatModel,
    request: &LlmRequest,
    retry: &RetryPolicy,
    stage: &str,
) -> Result<LlmResponse> {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let started = Instant::now();
        match llm.complete(request) {
            Ok(resp) => {
                tracing::info!(
                    stage,
                    model = %llm.label(),
                    prompt_tokens = resp.prompt_tokens,
                    completion_tokens = resp.completion_tokens,
                    total_tokens = resp.total_tokens(),
                    elapsed = ?started.elapsed(),
                    "llm call finished"
                );
                return Ok(resp);
            }
            Err(err) => {
                tracing::warn!(
                    stage,
                    attempt,
                    max_attempts,
                    error = %err,
                    "llm call failed"
                );
                if attempt >= max_attempts || ProviderError::is_final(&err) {
                    return Err(err.context(format!("{stage} failed after {attempt} attempt(s)")));
                }
                thread::sleep(retry.base_delay * attempt);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingClient;
    use docqa_core::{chunk_text, ChunkConfig};
    use std::cell::{Cell, RefCell};

    struct Scripted {
        replies: RefCell<Vec<Result<String>>>,
        prompts: RefCell<Vec<String>>,
        calls: Cell<usize>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: RefCell::new(replies),
                prompts: RefCell::new(Vec::new()),
                calls: Cell::new(0),
            }
        }
    }

    impl ChatModel for Scripted {
        fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
            self.calls.set(self.calls.get() + 1);
            self.prompts.borrow_mut().push(request.user.clone());
            let content = self.replies.borrow_mut().remove(0)?;
            Ok(LlmResponse {
                content,
                prompt_tokens: 11,
                completion_tokens: 7,
            })
        }

        fn label(&self) -> String {
            "stub:scripted".to_string()
        }
    }

    fn penguin_store() -> VectorStore {
        let text = "Penguins live in Antarctica and hunt fish. \
                    Volcanoes erupt molten rock called lava. \
                    Libraries lend books to readers for free.";
        let chunks = chunk_text(text, ChunkConfig::new(7, 1).unwrap()).unwrap();
        VectorStore::build(chunks, EmbeddingClient::hash()).unwrap()
    }

    #[test]
    fn answer_uses_retrieved_context() {
        let store = penguin_store();
        let llm = Scripted::new(vec![Ok("They live in Antarctica.".to_string())]);
        let answer =
            answer_question(&store, &llm, "Where do penguins live?", 1, &RetryPolicy::default())
                .unwrap();
        assert_eq!(answer.answer, "They live in Antarctica.");
        assert_eq!(answer.used_chunks.len(), 1);
        assert!(answer.used_chunks[0].chunk.text.contains("Penguins"));
        assert_eq!(answer.confidence, 89.0);
        assert_eq!(answer.band, ConfidenceBand::High);
        assert!(!answer.not_found);
        assert_eq!(answer.model, "stub:scripted");
        let prompts = llm.prompts.borrow();
        assert!(prompts[0].contains("Question:\nWhere do penguins live?"));
        assert!(prompts[0].contains("Penguins live in Antarctica"));
    }

    #[test]
    fn sentinel_reply_is_flagged() {
        let store = penguin_store();
        let llm = Scripted::new(vec![Ok(format!("\"{NOT_FOUND_ANSWER}\""))]);
        let answer =
            answer_question(&store, &llm, "Who wrote Hamlet?", 5, &RetryPolicy::default()).unwrap();
        assert!(answer.not_found);
    }

    #[test]
    fn empty_question_is_rejected_before_calling_the_model() {
        let store = penguin_store();
        let llm = Scripted::new(vec![]);
        assert!(answer_question(&store, &llm, "   ", 5, &RetryPolicy::default()).is_err());
        assert_eq!(llm.calls.get(), 0);
    }

    #[test]
    fn transient_failures_are_retried() {
        let llm = Scripted::new(vec![
            Err(anyhow!("503")),
            Ok("A short summary.".to_string()),
        ]);
        let summary = summarize(
            "Some document text.",
            &llm,
            &SummarySettings::default(),
            &RetryPolicy::immediate(3),
        )
        .unwrap();
        assert_eq!(summary.text, "A short summary.");
        assert_eq!(llm.calls.get(), 2);
    }

    #[test]
    fn persistent_failures_surface() {
        let llm = Scripted::new(vec![Err(anyhow!("boom")), Err(anyhow!("boom"))]);
        let err = summarize(
            "text",
            &llm,
            &SummarySettings::default(),
            &RetryPolicy::immediate(2),
        )
        .unwrap_err();
        assert!(err.to_string().contains("summary failed after 2 attempt(s)"));
    }

    #[test]
    fn settled_provider_errors_are_not_resent() {
        let rejected = ProviderError::Rejected {
            provider: "openai".to_string(),
            status: reqwest::StatusCode::BAD_REQUEST,
            body: "context length exceeded".to_string(),
        };
        let llm = Scripted::new(vec![Err(rejected.into()), Ok("unused".to_string())]);
        let err = summarize(
            "text",
            &llm,
            &SummarySettings::default(),
            &RetryPolicy::immediate(3),
        )
        .unwrap_err();
        assert_eq!(llm.calls.get(), 1);
        assert!(err.to_string().contains("summary failed after 1 attempt(s)"));
        assert!(format!("{err:#}").contains("status 400 Bad Request"));
    }
}
