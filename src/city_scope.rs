use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::models::CityRef;
use crate::text::{compile, normalize_for_match, normalize_whitespace};

static CITY_WIDE_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\bcity\s*-?\s*wide\b"));
static CITY_OF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\bcity of\s+([a-z][a-z\s-]{1,80})"));
static IN_NAME_CITY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(?:in|for)\s+([a-z][a-z\s-]{1,80}?)\s+city\b"));
static CITY_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\bcity\s+([a-z][a-z\s-]{1,80})"));
static NAME_CITY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b([a-z][a-z\s-]{1,80}?)\s+city\b"));

const CITY_STOP_WORDS: &[&str] = &[
    "fy", "fiscal", "year", "total", "investment", "program", "top", "projects", "budget", "for",
    "and", "in", "of", "the", "at", "what", "is", "show", "all", "barangays",
];

/// Read access to the active city directory.
pub trait CityDirectory {
    fn list_active_cities(&self) -> Result<Vec<CityRef>>;
}

/// Case, punctuation, "city of" and "city" insensitive key for city names.
pub fn normalize_city_name_for_match(name: &str) -> String {
    let normalized = normalize_for_match(name);
    let mut kept = Vec::new();
    let mut after_city = false;
    for word in normalized.split(' ') {
        if word == "city" {
            after_city = true;
            continue;
        }
        if word == "of" && after_city {
            after_city = false;
            continue;
        }
        after_city = false;
        kept.push(word);
    }
    normalize_whitespace(&kept.join(" "))
}

fn is_stop_word(word: &str) -> bool {
    CITY_STOP_WORDS.contains(&word)
}

/// Words before the first stop word.
fn leading_name(raw: &str) -> Option<String> {
    let words: Vec<&str> = raw
        .split_whitespace()
        .take_while(|word| !is_stop_word(word))
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Words after the last stop word.
fn trailing_name(raw: &str) -> Option<String> {
    let all: Vec<&str> = raw.split_whitespace().collect();
    let start = all
        .iter()
        .rposition(|word| is_stop_word(word))
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let words = &all[start..];
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Extracts a city name candidate ("City of Calamba", "in Calamba City",
/// "City Calamba", "Calamba City"). The candidate is lowercased and still
/// needs [`resolve_city_by_name_exact`].
pub fn detect_explicit_city_mention(message: &str) -> Option<String> {
    let normalized = normalize_for_match(message);
    let normalized = normalize_whitespace(&CITY_WIDE_RE.replace_all(&normalized, " "));
    if normalized.is_empty() {
        return None;
    }

    if let Some(caps) = CITY_OF_RE.captures(&normalized) {
        return caps.get(1).and_then(|m| leading_name(m.as_str()));
    }
    if let Some(caps) = IN_NAME_CITY_RE.captures(&normalized) {
        if let Some(name) = caps.get(1).and_then(|m| trailing_name(m.as_str())) {
            return Some(name);
        }
    }
    if let Some(caps) = CITY_NAME_RE.captures(&normalized) {
        if let Some(name) = caps.get(1).and_then(|m| leading_name(m.as_str())) {
            return Some(name);
        }
    }
    NAME_CITY_RE
        .captures(&normalized)
        .and_then(|caps| caps.get(1).and_then(|m| trailing_name(m.as_str())))
}

/// Resolves a candidate to exactly one active city. Zero or several matches
/// yield `None`; directory failures propagate.
pub fn resolve_city_by_name_exact(
    directory: &dyn CityDirectory,
    candidate_name: &str,
) -> Result<Option<CityRef>> {
    let normalized_candidate = normalize_city_name_for_match(candidate_name);
    if normalized_candidate.is_empty() {
        return Ok(None);
    }

    let mut matches: Vec<CityRef> = directory
        .list_active_cities()?
        .into_iter()
        .filter(|city| {
            let raw = city.name.trim();
            !raw.is_empty() && normalize_city_name_for_match(raw) == normalized_candidate
        })
        .collect();

    if matches.len() != 1 {
        return Ok(None);
    }
    Ok(matches.pop().map(|city| CityRef {
        id: city.id,
        name: city.name.trim().to_string(),
    }))
}
