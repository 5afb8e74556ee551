use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use docqa_llm::ChatModel;
use docqa_rag::{DocumentSession, Mode};

use crate::render;

const HELP: &str = "\
Commands:
  :mode ask|challenge   switch between Ask Anything and Challenge Me
  :load <file>          replace the current document
  :generate             generate new challenge questions
  :answer <n> <text>    record the answer to question n
  :submit               grade the recorded answers
  :stats                document statistics
  :summary              summarize the document again
  :help                 this message
  :quit                 leave
In Ask mode any other line is a question. In Challenge mode it answers the
next unanswered question.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Empty,
    Mode(Mode),
    Load(PathBuf),
    Generate,
    Answer { index: usize, text: String },
    Submit,
    Stats,
    Summary,
    Help,
    Quit,
    Text(String),
}

pub fn parse_command(line: &str) -> Result<ReplCommand> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplCommand::Empty);
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(ReplCommand::Text(line.to_string()));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name.to_lowercase().as_str() {
        "mode" => Ok(ReplCommand::Mode(arg.parse()?)),
        "load" => {
            if arg.is_empty() {
                return Err(anyhow!(":load needs a file path"));
            }
            Ok(ReplCommand::Load(PathBuf::from(arg)))
        }
        "generate" => Ok(ReplCommand::Generate),
        "answer" => {
            let (number, text) = arg
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("usage: :answer <n> <text>"))?;
            let number: usize = number
                .parse()
                .with_context(|| format!("question number must be an integer, got {number}"))?;
            if number == 0 {
                return Err(anyhow!("questions are numbered from 1"));
            }
            Ok(ReplCommand::Answer {
                index: number - 1,
                text: text.trim().to_string(),
            })
        }
        "submit" => Ok(ReplCommand::Submit),
        "stats" => Ok(ReplCommand::Stats),
        "summary" => Ok(ReplCommand::Summary),
        "help" | "h" | "?" => Ok(ReplCommand::Help),
        "quit" | "q" | "exit" => Ok(ReplCommand::Quit),
        other => Err(anyhow!("unknown command :{other} (try :help)")),
    }
}

/// Interactive loop over one document session. Command errors are printed
/// and the loop keeps going.
pub struct Repl<'a> {
    session: DocumentSession,
    llm: &'a dyn ChatModel,
    mode: Mode,
}

impl<'a> Repl<'a> {
    pub fn new(session: DocumentSession, llm: &'a dyn ChatModel) -> Self {
        Self {
            session,
            llm,
            mode: Mode::Ask,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn session(&self) -> &DocumentSession {
        &self.session
    }

    /// Prints stats and a summary of the loaded document.
    pub fn greet<W: Write>(&self, out: &mut W) -> Result<()> {
        write!(
            out,
            "{}",
            render::stats_block(self.session.source(), self.session.stats())
        )?;
        match self.session.summarize(self.llm) {
            Ok(summary) => writeln!(out, "\nSummary:\n{}\n", summary.text)?,
            Err(err) => writeln!(out, "\nsummary unavailable: {err:#}\n")?,
        }
        writeln!(out, "Mode: {} (:help for commands)", self.mode)?;
        Ok(())
    }

    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        self.greet(out)?;
        let mut lines = input.lines();
        loop {
            write!(out, "{}> ", prompt_label(self.mode))?;
            out.flush()?;
            let Some(line) = lines.next() else {
                writeln!(out)?;
                break;
            };
            let line = line.context("failed to read input")?;
            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(err) => {
                    writeln!(out, "error: {err:#}")?;
                    continue;
                }
            };
            if command == ReplCommand::Quit {
                break;
            }
            if let Err(err) = self.handle(command, out) {
                tracing::debug!(error = ?err, "repl command failed");
                writeln!(out, "error: {err:#}")?;
            }
        }
        Ok(())
    }

    pub fn handle<W: Write>(&mut self, command: ReplCommand, out: &mut W) -> Result<()> {
        match command {
            ReplCommand::Empty | ReplCommand::Quit => {}
            ReplCommand::Help => writeln!(out, "{HELP}")?,
            ReplCommand::Mode(mode) => {
                self.mode = mode;
                writeln!(out, "Mode: {mode}")?;
                if mode == Mode::Challenge && self.session.challenge().is_none() {
                    self.generate(out)?;
                }
            }
            ReplCommand::Load(path) => {
                self.session.reload(&path)?;
                self.greet(out)?;
            }
            ReplCommand::Generate => self.generate(out)?,
            ReplCommand::Answer { index, text } => {
                self.session.answer_challenge(index, text)?;
                writeln!(out, "Recorded answer {}.", index + 1)?;
            }
            ReplCommand::Submit => {
                let evaluation = self.session.evaluate_challenge(self.llm)?;
                writeln!(out, "{evaluation}")?;
            }
            ReplCommand::Stats => write!(
                out,
                "{}",
                render::stats_block(self.session.source(), self.session.stats())
            )?,
            ReplCommand::Summary => {
                let summary = self.session.summarize(self.llm)?;
                writeln!(out, "{}", summary.text)?;
            }
            ReplCommand::Text(text) => match self.mode {
                Mode::Ask => {
                    let answer = self.session.ask(self.llm, &text)?;
                    write!(out, "{}", render::answer_block(&answer))?;
                }
                Mode::Challenge => self.answer_next(text, out)?,
            },
        }
        Ok(())
    }

    fn generate<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let challenge = self.session.generate_challenge(self.llm)?;
        write!(out, "{}", render::questions_block(challenge))?;
        Ok(())
    }

    fn answer_next<W: Write>(&mut self, text: String, out: &mut W) -> Result<()> {
        let challenge = self
            .session
            .challenge()
            .ok_or_else(|| anyhow!("no questions yet, use :generate"))?;
        let Some(index) = challenge.answers().iter().position(|a| a.is_empty()) else {
            writeln!(out, "All questions answered. Use :submit or :answer <n> <text>.")?;
            return Ok(());
        };
        self.session.answer_challenge(index, text)?;
        writeln!(out, "Recorded answer {}.", index + 1)?;
        Ok(())
    }
}

fn prompt_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Ask => "ask",
        Mode::Challenge => "challenge",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_llm::LlmClient;
    use docqa_rag::{EmbeddingClient, RetryPolicy, SessionSettings};
    use std::io::Cursor;

    const TEXT: &str = "Lighthouses guide ships along dangerous coastlines at night. \
Keepers once trimmed the lamp wicks every few hours. \
Modern lighthouses run automatically with electric lamps and sensors.";

    fn session() -> DocumentSession {
        let settings = SessionSettings {
            retry: RetryPolicy::immediate(1),
            ..SessionSettings::default()
        };
        DocumentSession::from_text("lighthouses.txt", TEXT, settings, EmbeddingClient::hash())
            .unwrap()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("  ").unwrap(), ReplCommand::Empty);
        assert_eq!(
            parse_command(":mode challenge").unwrap(),
            ReplCommand::Mode(Mode::Challenge)
        );
        assert_eq!(
            parse_command(":answer 2  at night ").unwrap(),
            ReplCommand::Answer {
                index: 1,
                text: "at night".to_string()
            }
        );
        assert_eq!(
            parse_command(":load docs/new report.pdf").unwrap(),
            ReplCommand::Load(PathBuf::from("docs/new report.pdf"))
        );
        assert_eq!(
            parse_command("What do keepers do?").unwrap(),
            ReplCommand::Text("What do keepers do?".to_string())
        );
        assert!(parse_command(":answer 0 nothing").is_err());
        assert!(parse_command(":answer two words").is_err());
        assert!(parse_command(":mode quiz").is_err());
        assert!(parse_command(":load").is_err());
        assert!(parse_command(":dance").is_err());
    }

    #[test]
    fn ask_mode_answers_plain_lines() {
        let llm = LlmClient::local().unwrap();
        let mut repl = Repl::new(session(), &llm);
        let input = Cursor::new("What did keepers trim?\n:quit\n");
        let mut out: Vec<u8> = Vec::new();
        repl.run(input, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Summary:"));
        assert!(out.contains("Answer: Keepers once trimmed the lamp wicks every few hours."));
        assert!(out.contains("Confidence: "));
    }

    #[test]
    fn challenge_mode_collects_and_grades_answers() {
        let llm = LlmClient::local().unwrap();
        let mut repl = Repl::new(session(), &llm);
        let input = Cursor::new(
            ":mode challenge\nguide ships along coastlines\n:answer 3 electric sensors\nbananas\n:submit\n",
        );
        let mut out: Vec<u8> = Vec::new();
        repl.run(input, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(repl.mode(), Mode::Challenge);
        assert!(out.contains("1. What does the document state about"));
        assert!(out.contains("Recorded answer 1."));
        assert!(out.contains("Recorded answer 3."));
        assert!(out.contains("Recorded answer 2."));
        assert!(out.contains("**Q1:"));
        let challenge = repl.session().challenge().unwrap();
        assert_eq!(challenge.answers()[1], "bananas");
        assert!(challenge.evaluation().is_some());
    }

    #[test]
    fn errors_do_not_end_the_loop() {
        let llm = LlmClient::local().unwrap();
        let mut repl = Repl::new(session(), &llm);
        let input = Cursor::new(":submit\n:bogus\n:stats\n");
        let mut out: Vec<u8> = Vec::new();
        repl.run(input, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("error: no challenge questions generated yet"));
        assert!(out.contains("error: unknown command :bogus"));
        assert_eq!(out.matches("words: 26").count(), 2);
    }

    #[test]
    fn load_replaces_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tides.txt");
        std::fs::write(&path, "Tides follow the moon.").unwrap();
        let llm = LlmClient::local().unwrap();
        let mut repl = Repl::new(session(), &llm);
        repl.handle(ReplCommand::Mode(Mode::Challenge), &mut std::io::sink())
            .unwrap();
        repl.handle(ReplCommand::Load(path.clone()), &mut std::io::sink())
            .unwrap();
        assert_eq!(repl.session().source(), path.display().to_string());
        assert_eq!(repl.session().stats().words, 4);
        assert!(repl.session().challenge().is_none());
    }
}
