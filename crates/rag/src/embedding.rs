use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use docqa_core::{normalize, HashEmbedder, HashEmbedderConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Hash,
    OpenAi,
    Gemini,
}

impl FromStr for EmbeddingProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "hash" | "local" => Ok(Self::Hash),
            "openai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(anyhow!("unknown embedding provider {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: Option<String>,
    /// Only used by the hash backend; hosted models fix their own size.
    pub dimensions: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hash,
            model: None,
            dimensions: HashEmbedderConfig::default().dimensions,
            batch_size: 64,
        }
    }
}

#[derive(Clone)]
pub enum EmbeddingBackend {
    Hash(HashEmbedder),
    OpenAi(OpenAiEmbeddingClient),
    Gemini(GeminiEmbeddingClient),
}

/// Turns text into unit-length vectors so that inner product is cosine
/// similarity.
#[derive(Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
    batch_size: usize,
}

impl EmbeddingClient {
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let backend = match settings.provider {
            EmbeddingProvider::Hash => EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig {
                dimensions: settings.dimensions,
                ..HashEmbedderConfig::default()
            })),
            EmbeddingProvider::OpenAi => EmbeddingBackend::OpenAi(OpenAiEmbeddingClient::new(
                settings
                    .model
                    .as_deref()
                    .unwrap_or("text-embedding-3-small"),
            )?),
            EmbeddingProvider::Gemini => EmbeddingBackend::Gemini(GeminiEmbeddingClient::new(
                settings.model.as_deref().unwrap_or("text-embedding-004"),
            )?),
        };
        Ok(Self {
            backend,
            batch_size: settings.batch_size.max(1),
        })
    }

    pub fn hash() -> Self {
        Self {
            backend: EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig::default())),
            batch_size: EmbeddingSettings::default().batch_size,
        }
    }

    pub fn label(&self) -> String {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => format!("hash:{}", embedder.dimensions()),
            EmbeddingBackend::OpenAi(client) => format!("openai:{}", client.model),
            EmbeddingBackend::Gemini(client) => format!("gemini:{}", client.model),
        }
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let out: Vec<Vec<f32>> = match &self.backend {
            EmbeddingBackend::Hash(embedder) => inputs
                .par_iter()
                .map(|text| embedder.embed_text(text))
                .collect(),
            EmbeddingBackend::OpenAi(client) => self.batched(inputs, |b| client.embed_batch(b))?,
            EmbeddingBackend::Gemini(client) => self.batched(inputs, |b| client.embed_batch(b))?,
        };
        unit_vectors(out, inputs.len())
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let inputs = vec![text.to_string()];
        self.embed_batch(&inputs)?
            .pop()
            .ok_or_else(|| anyhow!("embedding backend returned no vector"))
    }

    fn batched(
        &self,
        inputs: &[String],
        call: impl Fn(&[String]) -> Result<Vec<Vec<f32>>>,
    ) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(inputs.len());
        for (idx, batch) in inputs.chunks(self.batch_size).enumerate() {
            tracing::debug!(batch = idx, size = batch.len(), "embedding batch");
            out.extend(call(batch)?);
        }
        Ok(out)
    }
}

/// Checks that every input got a vector and scales each one to unit length.
fn unit_vectors(mut vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(anyhow!(
            "embedding backend returned {} vectors for {expected} inputs",
            vectors.len()
        ));
    }
    for vector in vectors.iter_mut() {
        normalize(vector);
    }
    Ok(vectors)
}

#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    http: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiEmbeddingClient {
    pub fn new(model: &str) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY is required for openai embeddings"))?;
        Ok(Self {
            http: Client::new(),
            model: model.to_string(),
            api_key,
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        })
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .context("openai embeddings request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "openai embeddings request failed: {}",
                response.status()
            ));
        }
        let parsed: OpenAiEmbeddingResponse = response
            .json()
            .context("failed to decode openai embeddings")?;
        Ok(parsed.into_vectors())
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

impl OpenAiEmbeddingResponse {
    /// Vectors in input order; the API does not promise `data` is sorted.
    fn into_vectors(mut self) -> Vec<Vec<f32>> {
        self.data.sort_by_key(|item| item.index);
        self.data.into_iter().map(|item| item.embedding).collect()
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Clone)]
pub struct GeminiEmbeddingClient {
    http: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiEmbeddingClient {
    pub fn new(model: &str) -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("API_KEY"))
            .map_err(|_| anyhow!("GEMINI_API_KEY or API_KEY is required for gemini embeddings"))?;
        Ok(Self {
            http: Client::new(),
            model: model.to_string(),
            api_key,
            base_url: env::var("GEMINI_BASE_URL").unwrap_or_else(|_| {
                "https://generativelanguage.googleapis.com/v1beta".to_string()
            }),
        })
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let model_path = format!("models/{}", self.model);
        let requests: Vec<_> = inputs
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": model_path,
                    "content": { "parts": [ { "text": text } ] },
                })
            })
            .collect();
        let url = format!(
            "{}/{}:batchEmbedContents",
            self.base_url.trim_end_matches('/'),
            model_path
        );
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .context("gemini embeddings request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "gemini embeddings request failed: {}",
                response.status()
            ));
        }
        let parsed: GeminiEmbeddingResponse = response
            .json()
            .context("failed to decode gemini embeddings")?;
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[derive(Deserialize)]
struct GeminiEmbeddingResponse {
    #[serde(default)]
    embeddings: Vec<GeminiEmbedding>,
}

#[derive(Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}
