//! Search keyword parsing
//!
//! Users type dates the way they say them (`2025年7月`, `7月17日`). Such keywords are
//! rewritten into a dash form (`2025-7`, `7-17`) and compared against the capture date
//! rendered both with and without zero padding.

use chrono::{Datelike, NaiveDateTime};

/// One whitespace-separated search term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchKeyword {
    /// The keyword as typed.
    pub text: String,
    /// Dash-normalized form, present when the keyword contains digits.
    pub date_pattern: Option<String>,
}

impl SearchKeyword {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            date_pattern: normalize_date_keyword(text),
        }
    }

    /// Split a free-text query into keywords.
    pub fn parse_query(query: &str) -> Vec<Self> {
        query.split_whitespace().map(Self::new).collect()
    }

    /// Case-insensitive substring match against free text.
    pub fn matches_text(&self, haystack: &str) -> bool {
        haystack.to_lowercase().contains(&self.text.to_lowercase())
    }

    /// Whether the date pattern matches the capture date in either rendering.
    pub fn matches_date(&self, capture_time: &NaiveDateTime) -> bool {
        let Some(pattern) = &self.date_pattern else {
            return false;
        };
        date_forms(capture_time).iter().any(|form| form.contains(pattern.as_str()))
    }
}

/// `2025年7月` → `2025-7`, `2025年7月17日` → `2025-7-17`, `7月` → `7`.
///
/// Returns `None` when the result has no digit, so `夜晚` never turns into a date probe.
pub fn normalize_date_keyword(keyword: &str) -> Option<String> {
    let normalized: String = keyword
        .trim()
        .chars()
        .filter(|c| *c != '日')
        .map(|c| if c == '年' || c == '月' { '-' } else { c })
        .collect();
    let normalized = normalized.trim_matches('-').to_string();

    if normalized.chars().any(|c| c.is_ascii_digit()) {
        Some(normalized)
    } else {
        None
    }
}

/// `YYYY-MM-DD` and `YYYY-M-D` renderings of a capture time.
pub fn date_forms(capture_time: &NaiveDateTime) -> [String; 2] {
    [
        capture_time.format("%Y-%m-%d").to_string(),
        format!(
            "{}-{}-{}",
            capture_time.year(),
            capture_time.month(),
            capture_time.day()
        ),
    ]
}

/// Escape `%`, `_` and `\` for use inside an ILIKE pattern.
pub(crate) fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
