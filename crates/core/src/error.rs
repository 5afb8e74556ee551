use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocQaError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported input format: {0:?}")]
    UnsupportedInput(PathBuf),
    #[error("text input is not valid utf-8: {0:?}")]
    InvalidUtf8(PathBuf),
    #[error("pdf extraction failed: {0}")]
    Pdf(String),
    #[error("invalid chunking: overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidChunking { chunk_size: usize, overlap: usize },
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DocQaError>;

