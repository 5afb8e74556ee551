pub mod challenge;
pub mod embedding;
pub mod pipeline;
pub mod prompts;
pub mod session;
pub mod store;

pub use challenge::{parse_questions, Challenge};
pub use embedding::{EmbeddingBackend, EmbeddingClient, EmbeddingProvider, EmbeddingSettings};
pub use pipeline::{
    answer_question, summarize, RagAnswer, RetryPolicy, Summary, DEFAULT_QUERY_TOP_K,
    DEFAULT_TOP_K,
};
pub use prompts::{ChallengeSettings, SummarySettings, NOT_FOUND_ANSWER};
pub use session::{DocumentSession, Mode, SessionSettings};
pub use store::{RetrievedChunk, VectorStore};
pub use docqa_llm::{ChatModel, LlmClient, LlmProvider, LlmRequest, LlmResponse, ProviderError};
