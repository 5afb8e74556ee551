use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};

use docqa_core::{
    extract_text, extract_text_from_bytes, Chunk, ChunkConfig, DocumentStats, ExtractedText,
    SourceFormat, TokenizerKind, WordChunker,
};
use docqa_llm::ChatModel;

use crate::challenge::Challenge;
use crate::embedding::EmbeddingClient;
use crate::pipeline::{answer_question, summarize, RagAnswer, RetryPolicy, Summary, DEFAULT_TOP_K};
use crate::prompts::{ChallengeSettings, SummarySettings};
use crate::store::VectorStore;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub chunking: ChunkConfig,
    pub top_k: usize,
    pub tokenizer: TokenizerKind,
    pub summary: SummarySettings,
    pub challenge: ChallengeSettings,
    pub retry: RetryPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            chunking: ChunkConfig::default(),
            top_k: DEFAULT_TOP_K,
            tokenizer: TokenizerKind::Cl100k,
            summary: SummarySettings::default(),
            challenge: ChallengeSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Ask,
    Challenge,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "ask" | "ask anything" => Ok(Mode::Ask),
            "challenge" | "challenge me" => Ok(Mode::Challenge),
            other => Err(anyhow!("unknown mode {other} (expected ask or challenge)")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Ask => f.write_str("Ask Anything"),
            Mode::Challenge => f.write_str("Challenge Me"),
        }
    }
}

/// Everything known about the one loaded document. Loading another document
/// replaces the whole session state.
pub struct DocumentSession {
    source: String,
    format: SourceFormat,
    text: String,
    stats: DocumentStats,
    store: VectorStore,
    challenge: Option<Challenge>,
    settings: SessionSettings,
}

impl DocumentSession {
    pub fn open(
        path: &Path,
        settings: SessionSettings,
        embeddings: EmbeddingClient,
    ) -> Result<Self> {
        let extracted =
            extract_text(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_extracted(path.display().to_string(), extracted, settings, embeddings)
    }

    pub fn from_upload(
        name: &str,
        bytes: &[u8],
        settings: SessionSettings,
        embeddings: EmbeddingClient,
    ) -> Result<Self> {
        let extracted =
            extract_text_from_bytes(name, bytes).with_context(|| format!("failed to read {name}"))?;
        Self::from_extracted(name.to_string(), extracted, settings, embeddings)
    }

    pub fn from_text(
        source: impl Into<String>,
        text: impl Into<String>,
        settings: SessionSettings,
        embeddings: EmbeddingClient,
    ) -> Result<Self> {
        let extracted = ExtractedText {
            text: text.into(),
            pages: 1,
            format: SourceFormat::Text,
        };
        Self::from_extracted(source.into(), extracted, settings, embeddings)
    }

    fn from_extracted(
        source: String,
        extracted: ExtractedText,
        settings: SessionSettings,
        embeddings: EmbeddingClient,
    ) -> Result<Self> {
        let started = Instant::now();
        let chunker = WordChunker::new(settings.chunking)?;
        let chunks = chunker.chunk(&extracted.text);
        let stats = DocumentStats::collect(
            &extracted.text,
            chunks.len(),
            extracted.pages,
            settings.tokenizer,
        )?;
        let store = VectorStore::build(chunks, embeddings)?;
        tracing::info!(
            source = %source,
            format = extracted.format.as_str(),
            words = stats.words,
            chunks = stats.chunks,
            elapsed = ?started.elapsed(),
            "document loaded"
        );
        Ok(Self {
            source,
            format: extracted.format,
            text: extracted.text,
            stats,
            store,
            challenge: None,
            settings,
        })
    }

    /// Loads another document in place of the current one.
    pub fn reload(&mut self, path: &Path) -> Result<()> {
        *self = Self::open(
            path,
            self.settings.clone(),
            self.store.embeddings().clone(),
        )?;
        Ok(())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn stats(&self) -> &DocumentStats {
        &self.stats
    }

    pub fn chunks(&self) -> &[Chunk] {
        self.store.chunks()
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn summarize(&self, llm: &dyn ChatModel) -> Result<Summary> {
        summarize(&self.text, llm, &self.settings.summary, &self.settings.retry)
    }

    pub fn ask(&self, llm: &dyn ChatModel, question: &str) -> Result<RagAnswer> {
        self.ask_with_top_k(llm, question, self.settings.top_k)
    }

    pub fn ask_with_top_k(
        &self,
        llm: &dyn ChatModel,
        question: &str,
        top_k: usize,
    ) -> Result<RagAnswer> {
        answer_question(&self.store, llm, question, top_k, &self.settings.retry)
    }

    /// Generates a fresh set of questions, discarding earlier answers.
    pub fn generate_challenge(&mut self, llm: &dyn ChatModel) -> Result<&Challenge> {
        let challenge = Challenge::generate(
            self.store.chunks(),
            llm,
            &self.settings.challenge,
            &self.settings.retry,
        )?;
        Ok(self.challenge.insert(challenge))
    }

    pub fn challenge(&self) -> Option<&Challenge> {
        self.challenge.as_ref()
    }

    pub fn challenge_mut(&mut self) -> Option<&mut Challenge> {
        self.challenge.as_mut()
    }

    pub fn answer_challenge(&mut self, index: usize, answer: impl Into<String>) -> Result<()> {
        self.challenge_mut()
            .ok_or_else(|| anyhow!("no challenge questions generated yet"))?
            .set_answer(index, answer)
    }

    pub fn evaluate_challenge(&mut self, llm: &dyn ChatModel) -> Result<String> {
        let challenge = self
            .challenge
            .as_mut()
            .ok_or_else(|| anyhow!("no challenge questions generated yet"))?;
        let evaluation = challenge.evaluate(
            self.store.chunks(),
            llm,
            &self.settings.challenge,
            &self.settings.retry,
        )?;
        Ok(evaluation.to_string())
    }
}
