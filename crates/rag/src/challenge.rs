use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use docqa_core::Chunk;
use docqa_llm::{ChatModel, LlmRequest};

use crate::pipeline::{call_llm_with_retry, RetryPolicy};
use crate::prompts::{evaluation_prompt, question_prompt, ChallengeSettings};

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-•0-9. ]+|[-•0-9. ]+$").expect("valid regex"));

/// Extracts up to `count` questions from a one-per-line model reply. List
/// numbering and bullets are stripped from both ends of each line.
pub fn parse_questions(raw: &str, count: usize) -> Vec<String> {
    raw.trim()
        .lines()
        .map(|line| LIST_MARKER.replace_all(line, "").into_owned())
        .filter(|line| !line.trim().is_empty())
        .take(count)
        .collect()
}

/// One round of "Challenge Me": generated questions, the user's answers and
/// the grader's verdict once submitted.
#[derive(Debug, Clone, Default)]
pub struct Challenge {
    questions: Vec<String>,
    answers: Vec<String>,
    evaluation: Option<String>,
}

impl Challenge {
    pub fn generate(
        chunks: &[Chunk],
        llm: &dyn ChatModel,
        settings: &ChallengeSettings,
        retry: &RetryPolicy,
    ) -> Result<Self> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let prompt = question_prompt(&texts, settings);
        let response = call_llm_with_retry(llm, &LlmRequest::user(prompt), retry, "questions")?;
        let questions = parse_questions(&response.content, settings.questions);
        if questions.is_empty() {
            return Err(anyhow!("model returned no questions"));
        }
        tracing::info!(questions = questions.len(), "challenge questions generated");
        Ok(Self::with_questions(questions))
    }

    pub fn with_questions(questions: Vec<String>) -> Self {
        let answers = vec![String::new(); questions.len()];
        Self {
            questions,
            answers,
            evaluation: None,
        }
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    pub fn evaluation(&self) -> Option<&str> {
        self.evaluation.as_deref()
    }

    pub fn set_answer(&mut self, index: usize, answer: impl Into<String>) -> Result<()> {
        let slot = self.answers.get_mut(index).ok_or_else(|| {
            anyhow!(
                "question {} does not exist ({} generated)",
                index + 1,
                self.questions.len()
            )
        })?;
        *slot = answer.into();
        self.evaluation = None;
        Ok(())
    }

    pub fn evaluate(
        &mut self,
        chunks: &[Chunk],
        llm: &dyn ChatModel,
        settings: &ChallengeSettings,
        retry: &RetryPolicy,
    ) -> Result<&str> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let prompt = evaluation_prompt(&self.questions, &self.answers, &texts, settings);
        let response = call_llm_with_retry(llm, &LlmRequest::user(prompt), retry, "evaluation")?;
        let evaluation = self.evaluation.insert(response.content.trim().to_string());
        Ok(evaluation.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_llm::LlmResponse;
    use std::cell::RefCell;

    struct Canned {
        reply: String,
        prompts: RefCell<Vec<String>>,
    }

    impl ChatModel for Canned {
        fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
            self.prompts.borrow_mut().push(request.user.clone());
            Ok(LlmResponse {
                content: self.reply.clone(),
                ..LlmResponse::default()
            })
        }

        fn label(&self) -> String {
            "stub:canned".to_string()
        }
    }

    fn canned(reply: &str) -> Canned {
        Canned {
            reply: reply.to_string(),
            prompts: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn strips_numbering_and_bullets() {
        let raw = "1. What is X?\n\n- • Why does Y happen?\n3) How is Z measured?\n4. Extra?";
        let parsed = parse_questions(raw, 3);
        assert_eq!(
            parsed,
            vec!["What is X?", "Why does Y happen?", ") How is Z measured?"]
        );
    }

    #[test]
    fn keeps_inner_digits() {
        let parsed = parse_questions("2. Why did 1990 matter?", 3);
        assert_eq!(parsed, vec!["Why did 1990 matter?"]);
    }

    #[test]
    fn generation_rejects_empty_replies() {
        let llm = canned("\n \n1.\n");
        let err = Challenge::generate(
            &[],
            &llm,
            &ChallengeSettings::default(),
            &RetryPolicy::immediate(1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no questions"));
    }

    #[test]
    fn answers_reset_and_grade() {
        let llm = canned("Q1? \nQ2?\nQ3?\nQ4?");
        let mut challenge = Challenge::generate(
            &[],
            &llm,
            &ChallengeSettings::default(),
            &RetryPolicy::immediate(1),
        )
        .unwrap();
        assert_eq!(challenge.questions().len(), 3);
        assert_eq!(challenge.answers(), &["", "", ""]);
        challenge.set_answer(1, "because").unwrap();
        assert!(challenge.set_answer(3, "nope").is_err());

        let grader = canned("---\n**Q1: Q1?**\n- **Evaluation**: Partial\n---");
        let verdict = challenge
            .evaluate(
                &[],
                &grader,
                &ChallengeSettings::default(),
                &RetryPolicy::immediate(1),
            )
            .unwrap()
            .to_string();
        assert!(verdict.contains("Partial"));
        assert_eq!(challenge.evaluation(), Some(verdict.as_str()));
        assert!(grader.prompts.borrow()[0].contains("Q2: Q2?\nA2: because"));

        challenge.set_answer(0, "changed").unwrap();
        assert!(challenge.evaluation().is_none());
    }
}
