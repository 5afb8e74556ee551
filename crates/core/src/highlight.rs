use serde::Serialize;

pub const NO_CONTEXT: &str = "No context available.";
pub const DEFAULT_HIGHLIGHT_WINDOW: usize = 100;
const ELLIPSIS: &str = "...";
const MARK: &str = "**";

/// Returns an excerpt of `text` around the first case-insensitive match of
/// `needle`, with every match inside the excerpt wrapped in markers. Falls
/// back to the head of the text when there is no match.
pub fn highlight_text(text: &str, needle: &str, window: usize) -> String {
    if text.is_empty() || needle.is_empty() {
        return NO_CONTEXT.to_string();
    }
    let hay: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = needle.chars().collect();
    let Some(pos) = (0..hay.len()).find(|&i| matches_at(&hay, &pattern, i)) else {
        let head: String = hay.iter().take(window).collect();
        if hay.len() > window {
            return format!("{head}{ELLIPSIS}");
        }
        return head;
    };
    let start = pos.saturating_sub(window);
    let end = (pos + pattern.len() + window).min(hay.len());
    let mut out = String::with_capacity((end - start) * 2);
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    let mut idx = start;
    while idx < end {
        if idx + pattern.len() <= end && matches_at(&hay, &pattern, idx) {
            out.push_str(MARK);
            out.extend(&hay[idx..idx + pattern.len()]);
            out.push_str(MARK);
            idx += pattern.len();
        } else {
            out.push(hay[idx]);
            idx += 1;
        }
    }
    if end < hay.len() {
        out.push_str(ELLIPSIS);
    }
    out
}

fn matches_at(hay: &[char], pattern: &[char], at: usize) -> bool {
    if at + pattern.len() > hay.len() {
        return false;
    }
    hay[at..at + pattern.len()]
        .iter()
        .zip(pattern)
        .all(|(a, b)| a.to_lowercase().eq(b.to_lowercase()))
}

/// Length-based stand-in for a model confidence score, in percent.
pub fn simulate_confidence(answer: &str) -> f32 {
    let len = answer.chars().count();
    let raw = if len < 20 {
        40.0 + len as f32 * 2.0
    } else {
        85.0 + (len % 10) as f32
    };
    (raw * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn from_score(score: f32) -> Self {
        if score >= 80.0 {
            Self::High
        } else if score >= 60.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Self::High => "green",
            Self::Medium => "orange",
            Self::Low => "red",
        }
    }
}
