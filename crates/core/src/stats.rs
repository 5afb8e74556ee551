use serde::Serialize;

use crate::error::{DocQaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    Cl100k,
    O200k,
    P50k,
}

impl TokenizerKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "cl100k" | "cl100k_base" => Ok(Self::Cl100k),
            "o200k" | "o200k_base" => Ok(Self::O200k),
            "p50k" | "p50k_base" | "gpt2" => Ok(Self::P50k),
            other => Err(DocQaError::Tokenizer(format!("unknown tokenizer {other}"))),
        }
    }

    pub fn build(&self) -> Result<tiktoken_rs::CoreBPE> {
        let bpe = match self {
            TokenizerKind::Cl100k => tiktoken_rs::cl100k_base(),
            TokenizerKind::O200k => tiktoken_rs::o200k_base(),
            TokenizerKind::P50k => tiktoken_rs::p50k_base(),
        };
        bpe.map_err(|e| DocQaError::Tokenizer(e.to_string()))
    }
}

pub fn estimate_tokens(text: &str, tokenizer: TokenizerKind) -> Result<usize> {
    let encoder = tokenizer.build()?;
    Ok(encoder.encode_with_special_tokens(text).len())
}

/// Word and character counts of raw document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextStats {
    pub words: usize,
    pub characters: usize,
}

impl TextStats {
    pub fn measure(text: &str) -> Self {
        Self {
            words: text.split_whitespace().count(),
            characters: text.chars().count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    pub words: usize,
    pub characters: usize,
    pub tokens: usize,
    pub chunks: usize,
    pub pages: usize,
}

impl DocumentStats {
    pub fn collect(
        text: &str,
        chunks: usize,
        pages: usize,
        tokenizer: TokenizerKind,
    ) -> Result<Self> {
        let basic = TextStats::measure(text);
        Ok(Self {
            words: basic.words,
            characters: basic.characters,
            tokens: estimate_tokens(text, tokenizer)?,
            chunks,
            pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_words_and_scalar_characters() {
        let stats = TextStats::measure("Zürich  is\nlovely ");
        assert_eq!(stats.words, 3);
        assert_eq!(stats.characters, 18);
    }

    #[test]
    fn tokenizer_names_resolve() {
        assert_eq!(TokenizerKind::from_name("cl100k_base").unwrap(), TokenizerKind::Cl100k);
        assert_eq!(TokenizerKind::from_name("GPT2").unwrap(), TokenizerKind::P50k);
        assert!(TokenizerKind::from_name("sentencepiece").is_err());
    }

    #[test]
    fn document_stats_include_tokens() {
        let stats = DocumentStats::collect("hello world", 1, 1, TokenizerKind::Cl100k).unwrap();
        assert_eq!(stats.words, 2);
        assert!(stats.tokens >= 2);
        assert_eq!(stats.chunks, 1);
    }
}
