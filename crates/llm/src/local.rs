//! Deterministic offline responder. It recognises the prompt shapes the
//! assistant sends and answers extractively from the text embedded in them,
//! which keeps the whole pipeline runnable without network access.

use std::collections::HashSet;

use crate::{LlmRequest, LlmResponse};

pub const NOT_FOUND_ANSWER: &str = "Answer not found in the provided document.";

const SUMMARY_MARKER: &str = "summarize the following document in";
const QUESTIONS_MARKER: &str = "only return the questions";
const EVALUATOR_MARKER: &str = "you are an exam evaluator";

pub(crate) fn respond(req: &LlmRequest) -> LlmResponse {
    let lower = req.user.to_lowercase();
    let content = if lower.starts_with(SUMMARY_MARKER) {
        summarize(&req.user)
    } else if lower.contains(QUESTIONS_MARKER) {
        questions(&req.user)
    } else if lower.contains(EVALUATOR_MARKER) {
        evaluate(&req.user)
    } else if let (Some(doc), Some(question)) = (
        section(&req.user, "Document:", Some("Question:")),
        section(&req.user, "Question:", None),
    ) {
        answer(&doc, &question)
    } else {
        first_words(&req.user, 40)
    };
    LlmResponse {
        content,
        prompt_tokens: 0,
        completion_tokens: 0,
    }
}

fn summarize(prompt: &str) -> String {
    let limit = prompt
        .split_whitespace()
        .nth(5)
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(150);
    let body = prompt.split_once("\n\n").map(|(_, b)| b).unwrap_or("");
    first_words(body, limit)
}

fn questions(prompt: &str) -> String {
    let count = prompt
        .split_whitespace()
        .skip_while(|w| !w.eq_ignore_ascii_case("generate"))
        .nth(1)
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(3);
    let body = prompt
        .split_once("\n\n")
        .map(|(_, rest)| rest)
        .and_then(|rest| rest.rsplit_once("\n\n").map(|(body, _)| body))
        .unwrap_or(prompt);
    sentences(body)
        .into_iter()
        .filter(|s| s.split_whitespace().count() >= 5)
        .take(count)
        .enumerate()
        .map(|(idx, sentence)| {
            let topic = first_words(sentence, 8);
            format!(
                "{}. What does the document state about \"{}\"?",
                idx + 1,
                topic.trim_end_matches(|c: char| matches!(c, '.' | '?' | '!' | ','))
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn evaluate(prompt: &str) -> String {
    let document = section(prompt, "Document:", Some("User's Answers:")).unwrap_or_default();
    let answers = section(prompt, "User's Answers:", Some("Evaluate each answer")).unwrap_or_default();
    let doc_terms = terms(&document);
    let mut pairs: Vec<(String, String)> = Vec::new();
    for line in answers.lines() {
        let Some((tag, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if numbered_tag(tag, 'Q') {
            pairs.push((value, String::new()));
        } else if numbered_tag(tag, 'A') {
            if let Some(last) = pairs.last_mut() {
                last.1 = value;
            }
        }
    }
    let mut out = String::new();
    for (idx, (question, user_answer)) in pairs.iter().enumerate() {
        let answer_terms = terms(user_answer);
        let hits = answer_terms.intersection(&doc_terms).count();
        let verdict = if answer_terms.is_empty() || hits == 0 {
            "Incorrect"
        } else if hits * 2 >= answer_terms.len() {
            "Correct"
        } else {
            "Partial"
        };
        let best = best_sentence(&document, &terms(question))
            .unwrap_or_else(|| NOT_FOUND_ANSWER.to_string());
        out.push_str(&format!(
            "---\n**Q{}: {}**\n\n- **User Answer**: {}\n- **Evaluation**: {}\n- **Justification**: {} of {} answer terms appear in the document.\n- **Correct Answer**: {}\n- **Supporting Chunk(s)**: {}\n",
            idx + 1,
            question,
            user_answer,
            verdict,
            hits,
            answer_terms.len(),
            best,
            best
        ));
    }
    out.push_str("---\n");
    out
}

fn numbered_tag(tag: &str, letter: char) -> bool {
    tag.trim()
        .strip_prefix(letter)
        .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn answer(document: &str, question: &str) -> String {
    best_sentence(document, &terms(question)).unwrap_or_else(|| NOT_FOUND_ANSWER.to_string())
}

fn best_sentence(document: &str, wanted: &HashSet<String>) -> Option<String> {
    let mut best: Option<(usize, &str)> = None;
    for sentence in sentences(document) {
        let score = terms(sentence).intersection(wanted).count();
        if score > 0 && best.map(|(s, _)| score > s).unwrap_or(true) {
            best = Some((score, sentence));
        }
    }
    best.map(|(_, s)| s.to_string())
}

/// Text after `start` up to `end` (or the end of the prompt), trimmed.
fn section(text: &str, start: &str, end: Option<&str>) -> Option<String> {
    let (_, rest) = text.split_once(start)?;
    let body = match end.and_then(|marker| rest.find(marker)) {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    Some(body.trim().to_string())
}

fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        let boundary = matches!(ch, '.' | '?' | '!')
            && chars.peek().map(|(_, next)| next.is_whitespace()).unwrap_or(true);
        if boundary {
            let end = idx + ch.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn terms(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.chars().count() > 3)
        .collect()
}

fn first_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(prompt: &str) -> String {
        respond(&LlmRequest::user(prompt)).content
    }

    #[test]
    fn answers_from_best_matching_sentence() {
        let prompt = "ONLY use the text.\n\nDocument:\nCats sleep a lot. Penguins live in Antarctica. Dogs bark.\n\nQuestion:\nWhere do penguins live?\n";
        assert_eq!(ask(prompt), "Penguins live in Antarctica.");
    }

    #[test]
    fn reports_not_found_without_overlap() {
        let prompt = "Document:\nCats sleep a lot.\n\nQuestion:\nWhat is quantum chromodynamics?\n";
        assert_eq!(ask(prompt), NOT_FOUND_ANSWER);
    }

    #[test]
    fn generates_requested_number_of_questions() {
        let prompt = "You are a tutor assistant. Based on the document below, generate 2 logic-based questions:\n\nThe mitochondria produces energy for the cell. Ribosomes assemble proteins from amino acids. Short one.\n\nOnly return the questions, one per line.";
        let out = ask(prompt);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("1. What does the document state about \"The mitochondria"));
    }

    #[test]
    fn grades_answers_against_document() {
        let prompt = "You are an exam evaluator. Below are some questions and user's answers.\n\nDocument:\nPenguins live in Antarctica.\n\nUser's Answers:\nQ1: Where do penguins live?\nA1: Antarctica\nQ2: What do penguins eat?\nA2: \n\nEvaluate each answer using STRICT document facts only.";
        let out = ask(prompt);
        assert!(out.contains("**Q1: Where do penguins live?**"));
        assert!(out.contains("- **Evaluation**: Correct"));
        assert!(out.contains("- **Evaluation**: Incorrect"));
    }
}
