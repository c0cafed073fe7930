//! Text helpers shared by services
//!
//! Mention/hashtag extraction, input validation and truncation.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").expect("valid mention regex"));
static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").expect("valid hashtag regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// `@name` tokens in order of first appearance, without duplicates
pub fn extract_mentions(content: &str) -> Vec<String> {
    unique_captures(&MENTION_RE, content)
}

/// `#tag` tokens in order of first appearance, without duplicates
pub fn extract_hashtags(content: &str) -> Vec<String> {
    unique_captures(&HASHTAG_RE, content)
}

fn unique_captures(re: &Regex, content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    re.captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// At least 8 characters with a lowercase letter, an uppercase letter and a digit
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Character count of the trimmed value lies in `min..=max`
pub fn length_between(value: &str, min: usize, max: usize) -> bool {
    let len = value.trim().chars().count();
    len >= min && len <= max
}

/// Cut to `max` characters, appending `...` when something was dropped
pub fn truncate_text(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut)
}
