use std::fmt::Write as _;

use docqa_core::{highlight_text, Chunk, DocumentStats, DEFAULT_HIGHLIGHT_WINDOW};
use docqa_rag::{Challenge, RagAnswer};

pub fn stats_block(source: &str, stats: &DocumentStats) -> String {
    format!(
        "Document: {source}\n  pages: {}\n  words: {}\n  characters: {}\n  tokens: {}\n  chunks: {}\n",
        stats.pages, stats.words, stats.characters, stats.tokens, stats.chunks
    )
}

pub fn answer_block(answer: &RagAnswer) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Answer: {}", answer.answer);
    let _ = writeln!(
        out,
        "Confidence: {:.0}% ({}, {})",
        answer.confidence,
        answer.band.as_str(),
        answer.band.color()
    );
    if answer.not_found {
        let _ = writeln!(out, "Note: the document does not appear to cover this question.");
    }
    let _ = write!(out, "Model: {}", answer.model);
    if answer.prompt_tokens.saturating_add(answer.completion_tokens) > 0 {
        let _ = write!(
            out,
            " (prompt {} / completion {} tokens)",
            answer.prompt_tokens, answer.completion_tokens
        );
    }
    out.push('\n');
    out
}

/// Retrieved chunks, best first. The best chunk is cut down to the area
/// around the answer with the answer marked.
pub fn context_block(answer: &RagAnswer) -> String {
    let mut out = String::new();
    let Some(best) = answer.used_chunks.first() else {
        let _ = writeln!(out, "Context: none retrieved");
        return out;
    };
    let _ = writeln!(out, "Context:");
    let _ = writeln!(
        out,
        "  [chunk {} | score {:.3}] {}",
        best.chunk.index,
        best.score,
        highlight_text(&best.chunk.text, &answer.answer, DEFAULT_HIGHLIGHT_WINDOW)
    );
    for hit in answer.used_chunks.iter().skip(1) {
        let _ = writeln!(
            out,
            "  [chunk {} | score {:.3}] {}",
            hit.chunk.index, hit.score, hit.chunk.text
        );
    }
    out
}

pub fn questions_block(challenge: &Challenge) -> String {
    let mut out = String::new();
    for (idx, question) in challenge.questions().iter().enumerate() {
        let answer = &challenge.answers()[idx];
        if answer.is_empty() {
            let _ = writeln!(out, "{}. {}", idx + 1, question);
        } else {
            let _ = writeln!(out, "{}. {}\n   > {}", idx + 1, question, answer);
        }
    }
    out
}

pub fn chunk_listing(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        let _ = writeln!(
            out,
            "#{} words {}..{} ({})",
            chunk.index, chunk.word_start, chunk.word_end, chunk.chunk_id
        );
        let _ = writeln!(out, "  {}", preview(&chunk.text, 80));
    }
    out
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
