use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use docqa_core::{ChunkConfig, TokenizerKind};
use docqa_llm::{LlmClient, LlmProvider};
use docqa_rag::{
    ChallengeSettings, EmbeddingClient, EmbeddingProvider, EmbeddingSettings, SessionSettings,
    SummarySettings, DEFAULT_QUERY_TOP_K,
};

pub const DEFAULT_CONFIG: &str = "docqa.toml";

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub embedding: EmbeddingSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
    #[serde(default)]
    pub summary: SummarySection,
    #[serde(default)]
    pub challenge: ChallengeSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct LlmSection {
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmbeddingSection {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub dimensions: Option<usize>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetrievalSection {
    pub chunk_size: Option<usize>,
    pub overlap: Option<usize>,
    pub top_k: Option<usize>,
    pub tokenizer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummarySection {
    pub max_chars: Option<usize>,
    pub words: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChallengeSection {
    pub questions: Option<usize>,
    pub question_chunks: Option<usize>,
    pub evaluation_chunks: Option<usize>,
}

/// Values given on the command line; they win over the file and environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub embedding: EmbeddingSettings,
    pub session: SessionSettings,
}

impl ResolvedConfig {
    pub fn llm_client(&self) -> Result<LlmClient> {
        LlmClient::new(self.provider, self.model.clone())
            .with_context(|| format!("failed to set up {} client", self.provider))
    }

    pub fn embedding_client(&self) -> Result<EmbeddingClient> {
        EmbeddingClient::from_settings(&self.embedding)
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).map_err(|e| anyhow!("invalid config {}: {e}", path.display()))
}

impl AppConfig {
    /// Applies `DOCQA_*` variables read through `lookup` on top of the file.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("DOCQA_PROVIDER") {
            self.llm.provider = Some(provider);
        }
        if let Some(model) = lookup("DOCQA_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(provider) = lookup("DOCQA_EMBEDDING_PROVIDER") {
            self.embedding.provider = Some(provider);
        }
        if let Some(raw) = lookup("DOCQA_TOP_K") {
            let top_k = raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("DOCQA_TOP_K must be a positive integer, got {raw:?}"))?;
            self.retrieval.top_k = Some(top_k);
        }
        Ok(())
    }

    pub fn resolve(&self, overrides: &Overrides) -> Result<ResolvedConfig> {
        let provider: LlmProvider = overrides
            .provider
            .as_deref()
            .or(self.llm.provider.as_deref())
            .unwrap_or("gemini")
            .parse()?;
        let model = overrides
            .model
            .clone()
            .or_else(|| self.llm.model.clone())
            .unwrap_or_else(|| provider.default_model().to_string());

        let embedding_defaults = EmbeddingSettings::default();
        let embedding = EmbeddingSettings {
            provider: match self.embedding.provider.as_deref() {
                Some(raw) => raw.parse::<EmbeddingProvider>()?,
                None => embedding_defaults.provider,
            },
            model: self.embedding.model.clone(),
            dimensions: self
                .embedding
                .dimensions
                .unwrap_or(embedding_defaults.dimensions),
            batch_size: self
                .embedding
                .batch_size
                .unwrap_or(embedding_defaults.batch_size),
        };

        let defaults = SessionSettings::default();
        let chunking = ChunkConfig::new(
            self.retrieval
                .chunk_size
                .unwrap_or(defaults.chunking.chunk_size),
            self.retrieval.overlap.unwrap_or(defaults.chunking.overlap),
        )?;
        let top_k = overrides
            .top_k
            .or(self.retrieval.top_k)
            .unwrap_or(defaults.top_k);
        if !(1..=DEFAULT_QUERY_TOP_K).contains(&top_k) {
            return Err(anyhow!(
                "top_k must be between 1 and {DEFAULT_QUERY_TOP_K}, got {top_k}"
            ));
        }
        let tokenizer = match self.retrieval.tokenizer.as_deref() {
            Some(name) => TokenizerKind::from_name(name)?,
            None => defaults.tokenizer,
        };
        let summary = SummarySettings {
            max_chars: self.summary.max_chars.unwrap_or(defaults.summary.max_chars),
            words: self.summary.words.unwrap_or(defaults.summary.words),
        };
        let challenge = ChallengeSettings {
            questions: self
                .challenge
                .questions
                .unwrap_or(defaults.challenge.questions),
            question_chunks: self
                .challenge
                .question_chunks
                .unwrap_or(defaults.challenge.question_chunks),
            evaluation_chunks: self
                .challenge
                .evaluation_chunks
                .unwrap_or(defaults.challenge.evaluation_chunks),
        };

        Ok(ResolvedConfig {
            provider,
            model,
            embedding,
            session: SessionSettings {
                chunking,
                top_k,
                tokenizer,
                summary,
                challenge,
                retry: defaults.retry,
            },
        })
    }
}
