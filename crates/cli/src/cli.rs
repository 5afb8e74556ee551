use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::config::Overrides;

#[derive(Parser, Debug)]
#[command(
    name = "docqa",
    version,
    about = "Ask questions about a PDF or text document, or let it quiz you"
)]
pub struct Cli {
    /// TOML configuration file (defaults to docqa.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// LLM provider: gemini, openai, anthropic or local
    #[arg(long, global = true)]
    pub provider: Option<String>,
    #[arg(long, global = true)]
    pub model: Option<String>,
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        let top_k = match &self.command {
            Commands::Ask { top_k, .. } => *top_k,
            _ => None,
        };
        Overrides {
            provider: self.provider.clone(),
            model: self.model.clone(),
            top_k,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Word, character, token, chunk and page counts
    Stats {
        input: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Short summary of the document
    Summarize { input: PathBuf },
    /// Answer one question from the document
    Ask {
        input: PathBuf,
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
        #[arg(long = "top-k")]
        top_k: Option<usize>,
        #[arg(long = "show-context", action = ArgAction::SetTrue)]
        show_context: bool,
    },
    /// Generate comprehension questions and grade the answers
    Challenge {
        input: PathBuf,
        /// One answer per line instead of prompting on stdin
        #[arg(long)]
        answers: Option<PathBuf>,
    },
    /// List the chunks or export them as JSONL
    Chunks {
        input: PathBuf,
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
    },
    /// Interactive session over one document
    Chat { input: PathBuf },
}
