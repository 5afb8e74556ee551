use serde::{Deserialize, Serialize};

pub use docqa_llm::NOT_FOUND_ANSWER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarySettings {
    /// Leading characters of the document sent to the model.
    pub max_chars: usize,
    pub words: usize,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            max_chars: 3000,
            words: 150,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeSettings {
    pub questions: usize,
    /// Leading chunks shown to the question writer.
    pub question_chunks: usize,
    /// Leading chunks shown to the grader.
    pub evaluation_chunks: usize,
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            questions: 3,
            question_chunks: 10,
            evaluation_chunks: 15,
        }
    }
}

pub fn summary_prompt(text: &str, settings: &SummarySettings) -> String {
    let head: String = text.chars().take(settings.max_chars).collect();
    format!(
        "Summarize the following document in {} words:\n\n{}",
        settings.words, head
    )
}

pub fn answer_prompt(context: &str, question: &str) -> String {
    format!(
        "ONLY use the text provided in the \"Context\" section below. \
Do NOT use any outside knowledge or make up facts. \
If the answer is NOT found in the context, respond ONLY with: \"{NOT_FOUND_ANSWER}\" \
Mention paragraph if applicable.\n\n\
Document:\n{context}\n\n\
Question:\n{question}\n"
    )
}

pub fn question_prompt<S: AsRef<str>>(chunks: &[S], settings: &ChallengeSettings) -> String {
    let joined = join_leading(chunks, settings.question_chunks);
    format!(
        "You are a tutor assistant. Based on the document below, generate {} logic-based or comprehension-focused questions:\n\n{}\n\nOnly return the questions, one per line.",
        settings.questions, joined
    )
}

/// Pairs questions with answers up to the shorter of the two lists.
pub fn evaluation_prompt<S: AsRef<str>>(
    questions: &[String],
    answers: &[String],
    chunks: &[S],
    settings: &ChallengeSettings,
) -> String {
    let qna = questions
        .iter()
        .zip(answers)
        .enumerate()
        .map(|(i, (q, a))| format!("Q{n}: {q}\nA{n}: {a}", n = i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    let context = join_leading(chunks, settings.evaluation_chunks);
    format!(
        "You are an exam evaluator. Below are some questions and user's answers.

Document:
{context}

User's Answers:
{qna}

Evaluate each answer using STRICT document facts only. Use the format:

---
**Qx: [question]**

- **User Answer**: [user's answer]
- **Evaluation**: Correct / Incorrect / Partial
- **Justification**: [why you marked it]
- **Correct Answer**: [best answer from document]
- **Supporting Chunk(s)**: [chunk or section where answer was found]
---
"
    )
}

fn join_leading<S: AsRef<str>>(chunks: &[S], limit: usize) -> String {
    chunks
        .iter()
        .take(limit)
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join("\n\n")
}
