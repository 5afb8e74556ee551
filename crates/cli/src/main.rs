mod cli;
mod config;
mod render;
mod repl;

use std::env;
use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use docqa_index::{ChunkRecord, JsonlWriter};
use docqa_rag::{DocumentSession, EmbeddingClient};

use crate::cli::{Cli, Commands};
use crate::config::{load_config, ResolvedConfig, DEFAULT_CONFIG};
use crate::repl::Repl;

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut file_config = load_config(&config_path)?;
    file_config.apply_env(|key| env::var(key).ok())?;
    let resolved = file_config.resolve(&cli.overrides())?;
    tracing::debug!(
        provider = %resolved.provider,
        model = %resolved.model,
        top_k = resolved.session.top_k,
        "configuration resolved"
    );

    match cli.command {
        Commands::Stats { input, json } => {
            let session = open_offline(&input, &resolved)?;
            if json {
                let value = json!({
                    "source": session.source(),
                    "format": session.format().as_str(),
                    "stats": session.stats(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print!("{}", render::stats_block(session.source(), session.stats()));
            }
        }
        Commands::Summarize { input } => {
            let llm = resolved.llm_client()?;
            let session = open_offline(&input, &resolved)?;
            let summary = session.summarize(&llm)?;
            println!("{}", summary.text);
        }
        Commands::Ask {
            input,
            question,
            show_context,
            ..
        } => {
            let llm = resolved.llm_client()?;
            let session = open_indexed(&input, &resolved)?;
            let answer = session.ask(&llm, &question.join(" "))?;
            print!("{}", render::answer_block(&answer));
            if show_context {
                print!("{}", render::context_block(&answer));
            }
        }
        Commands::Challenge { input, answers } => {
            let llm = resolved.llm_client()?;
            let mut session = open_offline(&input, &resolved)?;
            let questions = session.generate_challenge(&llm)?.questions().to_vec();
            let replies = match answers {
                Some(path) => read_answer_file(&path)?,
                None => prompt_answers(&questions, io::stdin().lock(), &mut io::stdout())?,
            };
            for (idx, reply) in replies.into_iter().take(questions.len()).enumerate() {
                session.answer_challenge(idx, reply)?;
            }
            if let Some(challenge) = session.challenge() {
                print!("{}", render::questions_block(challenge));
            }
            println!();
            println!("{}", session.evaluate_challenge(&llm)?);
        }
        Commands::Chunks { input, out } => {
            let session = open_offline(&input, &resolved)?;
            match out {
                Some(path) => {
                    let written = export_chunks(&session, &path)?;
                    println!("wrote {written} chunks to {}", path.display());
                }
                None => print!("{}", render::chunk_listing(session.chunks())),
            }
        }
        Commands::Chat { input } => {
            let llm = resolved.llm_client()?;
            let session = open_indexed(&input, &resolved)?;
            let mut repl = Repl::new(session, &llm);
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            repl.run(stdin.lock(), &mut stdout)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Session with the configured embedder, for commands that search the index.
fn open_indexed(input: &Path, resolved: &ResolvedConfig) -> Result<DocumentSession> {
    DocumentSession::open(
        input,
        resolved.session.clone(),
        resolved.embedding_client()?,
    )
}

/// Session with the local hash embedder, for commands that never search the
/// index and should not spend hosted embedding calls.
fn open_offline(input: &Path, resolved: &ResolvedConfig) -> Result<DocumentSession> {
    DocumentSession::open(input, resolved.session.clone(), EmbeddingClient::hash())
}

fn read_answer_file(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read answers {}", path.display()))?;
    Ok(contents.lines().map(|line| line.trim().to_string()).collect())
}

fn prompt_answers<R: BufRead, W: Write>(
    questions: &[String],
    input: R,
    out: &mut W,
) -> Result<Vec<String>> {
    let mut lines = input.lines();
    let mut replies = Vec::with_capacity(questions.len());
    for (idx, question) in questions.iter().enumerate() {
        writeln!(out, "{}. {}", idx + 1, question)?;
        write!(out, "> ")?;
        out.flush()?;
        let line = lines
            .next()
            .ok_or_else(|| anyhow!("input ended before question {} was answered", idx + 1))?
            .context("failed to read answer")?;
        replies.push(line.trim().to_string());
    }
    Ok(replies)
}

fn export_chunks(session: &DocumentSession, path: &Path) -> Result<usize> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = JsonlWriter::new(BufWriter::new(file));
    for chunk in session.chunks() {
        writer.write_record(&ChunkRecord {
            chunk_id: chunk.chunk_id.clone(),
            source: session.source().to_string(),
            chunk_index: chunk.index,
            word_start: chunk.word_start,
            word_end: chunk.word_end,
            text: chunk.text.clone(),
            score: None,
        })?;
    }
    let written = writer.written();
    writer.finish()?;
    tracing::info!(chunks = written, path = %path.display(), "exported chunks");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_rag::SessionSettings;
    use std::io::Cursor;

    #[test]
    fn prompts_one_answer_per_question() {
        let questions = vec!["Why?".to_string(), "How?".to_string()];
        let mut out: Vec<u8> = Vec::new();
        let replies =
            prompt_answers(&questions, Cursor::new("because\n  slowly \n"), &mut out).unwrap();
        assert_eq!(replies, vec!["because", "slowly"]);
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.starts_with("1. Why?\n> 2. How?\n> "));
    }

    #[test]
    fn short_input_is_an_error() {
        let questions = vec!["Why?".to_string(), "How?".to_string()];
        let err = prompt_answers(&questions, Cursor::new("only one\n"), &mut io::sink())
            .unwrap_err();
        assert!(err.to_string().contains("question 2"));
    }

    #[test]
    fn chunks_export_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let session = DocumentSession::from_text(
            "notes.txt",
            "word ".repeat(250),
            SessionSettings::default(),
            EmbeddingClient::hash(),
        )
        .unwrap();
        let path = dir.path().join("chunks.jsonl");
        assert_eq!(export_chunks(&session, &path).unwrap(), 3);
        let lines: Vec<String> = fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines.len(), 3);
        let last: ChunkRecord = serde_json::from_str(&lines[2]).unwrap();
        assert_eq!(last.chunk_index, 2);
        assert_eq!((last.word_start, last.word_end), (200, 250));
        assert_eq!(last.source, "notes.txt");
        assert!(last.score.is_none());
    }

    #[test]
    fn answer_files_are_read_line_by_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.txt");
        fs::write(&path, "first\n second \n\nfourth").unwrap();
        assert_eq!(
            read_answer_file(&path).unwrap(),
            vec!["first", "second", "", "fourth"]
        );
    }
}
