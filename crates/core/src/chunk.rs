use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DocQaError, Result};

const CHUNK_VERSION: u32 = 1;

pub const DEFAULT_CHUNK_SIZE: usize = 150;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Words per window.
    pub chunk_size: usize,
    /// Words shared between consecutive windows.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(DocQaError::InvalidChunking {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    /// Words the window advances per step. Always at least one for a valid
    /// config.
    pub fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }

    /// Number of windows produced for `words` tokens.
    pub fn expected_chunks(&self, words: usize) -> usize {
        words.div_ceil(self.step())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub index: usize,
    /// First word (inclusive).
    pub word_start: usize,
    /// Last word (exclusive).
    pub word_end: usize,
    pub text: String,
}

impl Chunk {
    pub fn word_count(&self) -> usize {
        self.word_end - self.word_start
    }
}

pub struct WordChunker {
    config: ChunkConfig,
}

impl WordChunker {
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }
        let fingerprint = document_fingerprint(text);
        let step = self.config.step();
        let mut chunks = Vec::with_capacity(self.config.expected_chunks(words.len()));
        for (index, start) in (0..words.len()).step_by(step).enumerate() {
            let end = (start + self.config.chunk_size).min(words.len());
            chunks.push(Chunk {
                chunk_id: stable_chunk_id(&fingerprint, index, start, end),
                index,
                word_start: start,
                word_end: end,
                text: words[start..end].join(" "),
            });
        }
        tracing::debug!(
            words = words.len(),
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size,
            overlap = self.config.overlap,
            "chunked document"
        );
        chunks
    }
}

/// Convenience wrapper over [`WordChunker`].
pub fn chunk_text(text: &str, config: ChunkConfig) -> Result<Vec<Chunk>> {
    Ok(WordChunker::new(config)?.chunk(text))
}

pub fn document_fingerprint(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

fn stable_chunk_id(fingerprint: &str, index: usize, word_start: usize, word_end: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(CHUNK_VERSION.to_be_bytes());
    hasher.update(index.to_be_bytes());
    hasher.update(word_start.to_be_bytes());
    hasher.update(word_end.to_be_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(ChunkConfig::new(10, 10).is_err());
        assert!(ChunkConfig::new(0, 0).is_err());
        assert!(ChunkConfig::new(10, 9).is_ok());
    }

    #[test]
    fn empty_text_has_no_chunks() {
        let chunker = WordChunker::new(ChunkConfig::default()).unwrap();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk(" \n\t ").is_empty());
    }

    #[test]
    fn default_windows_overlap_by_fifty_words() {
        let chunker = WordChunker::new(ChunkConfig::default()).unwrap();
        let chunks = chunker.chunk(&numbered(320));
        assert_eq!(chunks.len(), 4);
        assert_eq!((chunks[0].word_start, chunks[0].word_end), (0, 150));
        assert_eq!((chunks[1].word_start, chunks[1].word_end), (100, 250));
        assert_eq!((chunks[2].word_start, chunks[2].word_end), (200, 320));
        assert_eq!((chunks[3].word_start, chunks[3].word_end), (300, 320));
        assert!(chunks[1].text.starts_with("w100 "));
        assert!(chunks[3].text.ends_with("w319"));
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = chunk_text("one  two\nthree", ChunkConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "one two three");
    }

    #[test]
    fn chunk_ids_are_stable_and_distinct() {
        let config = ChunkConfig::new(4, 1).unwrap();
        let first = chunk_text(&numbered(12), config).unwrap();
        let second = chunk_text(&numbered(12), config).unwrap();
        assert_eq!(first, second);
        assert_ne!(first[0].chunk_id, first[1].chunk_id);
        let other = chunk_text(&numbered(13), config).unwrap();
        assert_ne!(first[0].chunk_id, other[0].chunk_id);
    }
}
