use std::time::Instant;

use anyhow::{Context, Result};

use docqa_core::Chunk;
use docqa_index::FlatIpIndex;

use crate::embedding::EmbeddingClient;

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub position: usize,
}

/// Chunks of the current document and their embeddings. Rebuilt from scratch
/// for every document; nothing is merged across builds.
#[derive(Clone)]
pub struct VectorStore {
    chunks: Vec<Chunk>,
    index: FlatIpIndex,
    embeddings: EmbeddingClient,
}

impl VectorStore {
    pub fn empty(embeddings: EmbeddingClient) -> Self {
        Self {
            chunks: Vec::new(),
            index: FlatIpIndex::new(0),
            embeddings,
        }
    }

    pub fn build(chunks: Vec<Chunk>, embeddings: EmbeddingClient) -> Result<Self> {
        if chunks.is_empty() {
            tracing::warn!("building an empty vector store");
            return Ok(Self::empty(embeddings));
        }
        let started = Instant::now();
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embeddings
            .embed_batch(&texts)
            .context("failed to embed document chunks")?;
        let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
        let mut index = FlatIpIndex::new(dim);
        index.add(&vectors)?;
        tracing::info!(
            chunks = chunks.len(),
            dim,
            embedder = %embeddings.label(),
            elapsed = ?started.elapsed(),
            "vector index built"
        );
        Ok(Self {
            chunks,
            index,
            embeddings,
        })
    }

    /// Replaces every chunk and vector with a fresh build over `chunks`.
    pub fn rebuild(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        *self = Self::build(chunks, self.embeddings.clone())?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn dim(&self) -> usize {
        self.index.dim()
    }

    pub fn embeddings(&self) -> &EmbeddingClient {
        &self.embeddings
    }

    /// Top `top_k` chunks for `question`, best first.
    pub fn query(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let query = self
            .embeddings
            .embed(question)
            .context("failed to embed question")?;
        self.query_vector(&query, top_k)
    }

    fn query_vector(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self.index.search(query, top_k)?;
        let retrieved: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter_map(|hit| {
                self.chunks.get(hit.position).map(|chunk| RetrievedChunk {
                    chunk: chunk.clone(),
                    score: hit.score,
                    position: hit.position,
                })
            })
            .collect();
        for hit in &retrieved {
            tracing::debug!(position = hit.position, score = hit.score, "retrieved chunk");
        }
        Ok(retrieved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::{chunk_text, ChunkConfig};

    fn chunks(text: &str) -> Vec<Chunk> {
        chunk_text(text, ChunkConfig::new(4, 0).unwrap()).unwrap()
    }

    #[test]
    fn retrieves_the_matching_chunk_first() {
        let store = VectorStore::build(
            chunks("rust borrow checker lifetimes tomato basil pasta sauce ocean tides moon gravity"),
            EmbeddingClient::hash(),
        )
        .unwrap();
        assert_eq!(store.len(), 3);
        let hits = store.query("how does the moon affect tides", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn top_k_is_capped_by_chunk_count() {
        let store =
            VectorStore::build(chunks("one two three four five six"), EmbeddingClient::hash())
                .unwrap();
        assert_eq!(store.query("three", 100).unwrap().len(), 2);
    }

    #[test]
    fn empty_store_returns_nothing() {
        let store = VectorStore::build(Vec::new(), EmbeddingClient::hash()).unwrap();
        assert!(store.is_empty());
        assert!(store.query("anything", 5).unwrap().is_empty());
    }

    #[test]
    fn querying_does_not_change_the_store() {
        let store =
            VectorStore::build(chunks("alpha beta gamma delta epsilon"), EmbeddingClient::hash())
                .unwrap();
        let first = store.query("gamma", 5).unwrap();
        let second = store.query("gamma", 5).unwrap();
        let a: Vec<_> = first.iter().map(|h| (h.position, h.score)).collect();
        let b: Vec<_> = second.iter().map(|h| (h.position, h.score)).collect();
        assert_eq!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn rebuild_replaces_previous_chunks() {
        let mut store =
            VectorStore::build(chunks("old words in the old document"), EmbeddingClient::hash())
                .unwrap();
        store.rebuild(chunks("fresh")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.chunks()[0].text, "fresh");
        let hits = store.query("old document", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "fresh");
    }
}
