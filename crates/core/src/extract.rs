use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DocQaError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Pdf,
    Text,
}

impl SourceFormat {
    pub fn from_name(name: &Path) -> Option<Self> {
        let ext = name.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "txt",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub pages: usize,
    pub format: SourceFormat,
}

/// Reads a `.pdf` or `.txt` file into plain text.
pub fn extract_text(path: &Path) -> Result<ExtractedText> {
    let format =
        SourceFormat::from_name(path).ok_or_else(|| DocQaError::UnsupportedInput(path.into()))?;
    match format {
        SourceFormat::Pdf => {
            let pages = pdf_extract::extract_text_by_pages(path)
                .map_err(|e| DocQaError::Pdf(format!("{}: {e}", path.display())))?;
            Ok(join_pages(pages))
        }
        SourceFormat::Text => {
            let bytes = fs::read(path)?;
            decode_text(path, bytes)
        }
    }
}

/// Same as [`extract_text`] for an upload already held in memory. The name
/// only selects the format.
pub fn extract_text_from_bytes(name: &str, bytes: &[u8]) -> Result<ExtractedText> {
    let path = Path::new(name);
    let format =
        SourceFormat::from_name(path).ok_or_else(|| DocQaError::UnsupportedInput(path.into()))?;
    match format {
        SourceFormat::Pdf => {
            let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
                .map_err(|e| DocQaError::Pdf(format!("{name}: {e}")))?;
            Ok(join_pages(pages))
        }
        SourceFormat::Text => decode_text(path, bytes.to_vec()),
    }
}

fn join_pages(pages: Vec<String>) -> ExtractedText {
    let count = pages.len();
    tracing::debug!(pages = count, "extracted pdf text");
    ExtractedText {
        text: pages.join("\n"),
        pages: count,
        format: SourceFormat::Pdf,
    }
}

fn decode_text(path: &Path, bytes: Vec<u8>) -> Result<ExtractedText> {
    let text = String::from_utf8(bytes).map_err(|_| DocQaError::InvalidUtf8(path.into()))?;
    Ok(ExtractedText {
        text,
        pages: 1,
        format: SourceFormat::Text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_text_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.TXT");
        std::fs::write(&path, "alpha beta\ngamma").unwrap();
        let extracted = extract_text(&path).unwrap();
        assert_eq!(extracted.text, "alpha beta\ngamma");
        assert_eq!(extracted.format, SourceFormat::Text);
        assert_eq!(extracted.pages, 1);
    }

    #[test]
    fn rejects_unknown_extensions() {
        let err = extract_text_from_bytes("slides.pptx", b"irrelevant").unwrap_err();
        assert!(matches!(err, DocQaError::UnsupportedInput(_)));
        let err = extract_text_from_bytes("README", b"irrelevant").unwrap_err();
        assert!(matches!(err, DocQaError::UnsupportedInput(_)));
    }

    #[test]
    fn rejects_invalid_utf8() {
        let err = extract_text_from_bytes("broken.txt", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, DocQaError::InvalidUtf8(_)));
    }

    #[test]
    fn in_memory_text_upload() {
        let extracted = extract_text_from_bytes("upload.txt", "héllo wörld".as_bytes()).unwrap();
        assert_eq!(extracted.text, "héllo wörld");
    }
}
