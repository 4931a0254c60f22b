use std::collections::HashSet;

use regex::Regex;

const PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"', '`'];

/// Compiles a pattern literal, degrading to a never-matching regex.
pub(crate) fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| Regex::new(r"\b\B").unwrap())
}

/// Collapses every whitespace run (including non-breaking spaces) to a single
/// space and trims both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{00A0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercased, whitespace-collapsed form of a chat message.
pub fn normalize_question(text: &str) -> String {
    normalize_whitespace(&text.to_lowercase())
}

/// Replaces parentheses and sentence punctuation with spaces, then collapses
/// whitespace. Case is preserved.
pub fn strip_punctuation(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| {
            if c == '(' || c == ')' || PUNCTUATION.contains(&c) {
                ' '
            } else {
                c
            }
        })
        .collect();
    normalize_whitespace(&replaced)
}

/// Lowercase + [`strip_punctuation`]; the shared key used for name matching.
pub fn normalize_for_match(text: &str) -> String {
    strip_punctuation(&text.to_lowercase())
}

/// Lowercases and replaces every character that is not alphanumeric with a
/// space, so titles compare on their words only.
pub fn normalize_title(text: &str) -> String {
    let replaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    normalize_whitespace(&replaced)
}

pub fn title_words(text: &str) -> HashSet<String> {
    normalize_title(text)
        .split(' ')
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns `value` trimmed, or `None` when nothing is left.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn push_unique_term(terms: &mut Vec<String>, seen: &mut HashSet<String>, term: &str) {
    let cleaned = term.trim().to_ascii_lowercase();
    if cleaned.is_empty() {
        return;
    }
    if seen.insert(cleaned.clone()) {
        terms.push(cleaned);
    }
}

/// Truncates on a char boundary to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(normalize_whitespace("  a \t b\u{00A0}\n c  "), "a b c");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn punctuation_and_parentheses_are_dropped() {
        assert_eq!(strip_punctuation("(Brgy. Mamatid),"), "Brgy Mamatid");
        assert_eq!(normalize_for_match("(Barangay Mamatid)"), "barangay mamatid");
    }

    #[test]
    fn title_normalization_keeps_words_only() {
        assert_eq!(
            normalize_title("Honoraria - Administrative"),
            "honoraria administrative"
        );
        let words = title_words("Road Concreting (Phase 2)");
        assert!(words.contains("phase"));
        assert!(words.contains("2"));
        assert!(!words.contains("(phase"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("₱1,000", 2), "₱1");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
