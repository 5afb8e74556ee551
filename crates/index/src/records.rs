use std::io::Write;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One line of a chunk export.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub source: String,
    pub chunk_index: usize,
    pub word_start: usize,
    pub word_end: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

pub struct JsonlWriter<W> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let mut buf = serde_json::to_vec(record)?;
        buf.push(b'\n');
        self.writer.write_all(&buf)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
