mod chunk;
mod embedding;
mod error;
mod extract;
mod highlight;
mod stats;

pub use chunk::{
    chunk_text, document_fingerprint, Chunk, ChunkConfig, WordChunker, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE,
};
pub use embedding::{dot, normalize, HashEmbedder, HashEmbedderConfig};
pub use error::{DocQaError, Result};
pub use extract::{extract_text, extract_text_from_bytes, ExtractedText, SourceFormat};
pub use highlight::{
    highlight_text, simulate_confidence, ConfidenceBand, DEFAULT_HIGHLIGHT_WINDOW, NO_CONTEXT,
};
pub use stats::{estimate_tokens, DocumentStats, TextStats, TokenizerKind};
