//! Barangay scope detection and resolution.
//!
//! Detection works on raw chat text and only ever yields a candidate *name*;
//! turning a name into a [`BarangayRef`] is the directory's job, and a name
//! that matches zero or several directory rows stays unresolved.

use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::models::{BarangayRef, LineItemScope, ParsedQuestion, ScopeReason, ScopeResolution};
use crate::text::{compile, normalize_for_match, normalize_whitespace, strip_punctuation};

static EXPLICIT_BARANGAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)\b(?:barangay|brgy\.?)\s+([a-z0-9][a-z0-9 .,'-]{0,80}?)(?:\s+(?:for|fy|fiscal|year|total|investment|program|grand)\b|[.,;:!?)]|$)",
    )
});

static BARE_SCOPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"\b(?:of|for|in)\s+([a-z][a-z\s-]{1,40}?)(?:\s+(?:for|fy|fiscal|year|total|investment|program|grand)\b|$)",
    )
});

static LOOSE_SCOPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b(?:in|sa)\s+([a-z0-9][a-z0-9 .,'-]{1,80}?)(?:\s+(?:for|fy|fiscal|year)\b|[.,;!?)]|$)")
});

static OWN_BARANGAY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:our|my)\s+(?:barangay|brgy)\b"));

static BARANGAY_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^(?:barangay|brgy)\s+"));

static SCOPE_KIND_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)^(?:barangay|city|municipality)\s+"));

const DETECTOR_STOP_WORDS: &[&str] = &[
    "our", "my", "aming", "namin", "for", "fy", "fiscal", "year", "in", "sa", "of", "the",
];

/// Words that make "Barangay X" a facility or office title rather than a place.
const FACILITY_WORDS: &[&str] = &[
    "hall", "health", "station", "center", "centre", "clinic", "office", "officials",
    "council", "tanod", "nutrition", "day", "daycare", "gym", "gymnasium", "plaza", "court",
    "covered", "multi", "multipurpose", "building", "road", "roads", "street", "streets",
    "water", "drainage", "library", "park", "chapel", "development", "disaster",
    "peacekeeping", "secretary", "treasurer", "captain", "chairman",
];

/// Lookup of barangays by normalized name.
pub trait BarangayDirectory {
    /// Every active barangay whose normalized name equals `normalized_name`.
    fn find_by_normalized_name(&self, normalized_name: &str) -> Result<Vec<BarangayRef>>;

    /// All active barangay names, normalized with [`normalize_barangay_name_for_match`].
    fn known_names_normalized(&self) -> Result<HashSet<String>>;
}

/// Lowercases, drops parentheses and punctuation, strips a leading
/// "barangay"/"brgy" and collapses whitespace.
pub fn normalize_barangay_name_for_match(name: &str) -> String {
    let normalized = normalize_for_match(name);
    BARANGAY_PREFIX_RE
        .replace(&normalized, "")
        .trim()
        .to_string()
}

pub fn has_own_barangay_cue(message: &str) -> bool {
    OWN_BARANGAY_RE.is_match(message)
}

fn cleanup_detected_name(raw: &str) -> Option<String> {
    let cleaned = strip_punctuation(raw);
    if cleaned.is_empty() {
        return None;
    }

    let for_match = normalize_barangay_name_for_match(&cleaned);
    let first_token = for_match.split(' ').next().unwrap_or_default();
    if first_token.is_empty()
        || DETECTOR_STOP_WORDS.contains(&first_token)
        || FACILITY_WORDS.contains(&first_token)
    {
        return None;
    }

    Some(cleaned)
}

/// Finds "Barangay NAME" / "Brgy. NAME" in a message and returns the cleaned
/// NAME, skipping captures that start with a stop word such as "our" or that
/// name a facility ("Barangay Hall", "Barangay Health Station").
pub fn detect_explicit_barangay_mention(message: &str) -> Option<String> {
    let normalized = normalize_whitespace(&message.replace(['(', ')'], " "));
    if normalized.is_empty() {
        return None;
    }

    let mut start = 0;
    while let Some(caps) = EXPLICIT_BARANGAY_RE.captures_at(&normalized, start) {
        let name = caps.get(1)?;
        if let Some(candidate) = cleanup_detected_name(name.as_str()) {
            return Some(candidate);
        }
        start = name.start();
    }

    None
}

/// Looser "of/for/in NAME" detection. Only names present in
/// `known_names_normalized` are accepted, since there is no "barangay"
/// keyword to anchor on. Returns the normalized name.
pub fn detect_bare_barangay_scope_mention(
    message: &str,
    known_names_normalized: &HashSet<String>,
) -> Option<String> {
    if known_names_normalized.is_empty() {
        return None;
    }
    let normalized = normalize_for_match(message);
    if normalized.is_empty() {
        return None;
    }

    let mut start = 0;
    while let Some(caps) = BARE_SCOPE_RE.captures_at(&normalized, start) {
        let name = caps.get(1)?;
        let candidate = normalize_barangay_name_for_match(name.as_str());
        if !candidate.is_empty() && known_names_normalized.contains(&candidate) {
            return Some(candidate);
        }
        start = name.start();
    }

    let standalone = normalize_barangay_name_for_match(&normalized);
    if !standalone.is_empty() && known_names_normalized.contains(&standalone) {
        return Some(standalone);
    }

    None
}

/// "in NAME" / "sa NAME" capture used as a last resort before falling back
/// to the user's own scope. A leading scope kind word is stripped.
pub fn parse_loose_scope_name(message: &str) -> Option<String> {
    let caps = LOOSE_SCOPE_RE.captures(message)?;
    let raw = caps.get(1)?.as_str().trim();
    let stripped = SCOPE_KIND_PREFIX_RE.replace(raw, "").trim().to_string();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Resolves a name through the directory; anything but exactly one match is
/// treated as unresolved.
pub fn resolve_barangay_by_name_exact(
    directory: &dyn BarangayDirectory,
    name: &str,
) -> Result<Option<BarangayRef>> {
    let normalized = normalize_barangay_name_for_match(name);
    if normalized.is_empty() {
        return Ok(None);
    }

    let mut matches = directory.find_by_normalized_name(&normalized)?;
    if matches.len() != 1 {
        return Ok(None);
    }
    Ok(matches.pop())
}

/// Longest leading run of words in `name` that is a known barangay name, so
/// "Mamatid road concreting budget" yields "mamatid".
fn longest_known_prefix(name: &str, known_names_normalized: &HashSet<String>) -> Option<String> {
    let normalized = normalize_barangay_name_for_match(name);
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    (1..=words.len())
        .rev()
        .map(|len| words[..len].join(" "))
        .find(|prefix| known_names_normalized.contains(prefix))
}

/// Detects a barangay named in the message and resolves it through the
/// directory: the keyword-anchored form first (whole capture, then its longest
/// known prefix), then a bare known name.
pub fn resolve_explicit_barangay(
    message: &str,
    directory: &dyn BarangayDirectory,
) -> Result<Option<BarangayRef>> {
    let mention = detect_explicit_barangay_mention(message);
    if let Some(name) = &mention {
        if let Some(found) = resolve_barangay_by_name_exact(directory, name)? {
            return Ok(Some(found));
        }
    }

    let known = directory.known_names_normalized()?;
    if let Some(prefix) = mention
        .as_deref()
        .and_then(|name| longest_known_prefix(name, &known))
    {
        if let Some(found) = resolve_barangay_by_name_exact(directory, &prefix)? {
            return Ok(Some(found));
        }
    }

    if let Some(name) = detect_bare_barangay_scope_mention(message, &known) {
        return resolve_barangay_by_name_exact(directory, &name);
    }

    Ok(None)
}

/// Precedence: an "our/my barangay" cue with a known user scope, then an
/// independently resolved explicit barangay, then the user's default scope,
/// then unknown.
pub fn resolve_totals_scope(
    message: &str,
    user_barangay: Option<&BarangayRef>,
    explicit_barangay: Option<&BarangayRef>,
) -> ScopeResolution {
    if let Some(user) = user_barangay {
        if has_own_barangay_cue(message) {
            return ScopeResolution::resolved(user, ScopeReason::ExplicitOurBarangay);
        }
    }

    if let Some(explicit) = explicit_barangay {
        return ScopeResolution::resolved(explicit, ScopeReason::ExplicitBarangay);
    }

    if let Some(user) = user_barangay {
        return ScopeResolution::resolved(user, ScopeReason::DefaultUserBarangay);
    }

    ScopeResolution::unknown()
}

/// Same precedence as [`resolve_totals_scope`], except that an explicit
/// "all barangays" cue selects the global scope outright.
pub fn resolve_line_item_scope(
    question: &ParsedQuestion,
    message: &str,
    user_barangay: Option<&BarangayRef>,
    explicit_barangay: Option<&BarangayRef>,
) -> LineItemScope {
    if question.has_global_scope_cue {
        return LineItemScope::Global;
    }
    LineItemScope::Barangay(resolve_totals_scope(
        message,
        user_barangay,
        explicit_barangay,
    ))
}

/// "Mamatid" -> "Barangay Mamatid"; names already prefixed are kept.
pub fn display_barangay_name(name: Option<&str>) -> Option<String> {
    let trimmed = name.map(str::trim).filter(|n| !n.is_empty())?;
    if trimmed.to_ascii_lowercase().starts_with("barangay ") {
        Some(trimmed.to_string())
    } else {
        Some(format!("Barangay {trimmed}"))
    }
}

/// Attribution text shown next to an answer when the scope was not stated by
/// the user. Explicit scopes need no disclosure.
pub fn build_scope_disclosure(scope: &LineItemScope) -> Option<String> {
    match scope {
        LineItemScope::Global => Some("(Scope: all barangays)".to_string()),
        LineItemScope::Barangay(resolution)
            if resolution.scope_reason == ScopeReason::DefaultUserBarangay =>
        {
            let name = display_barangay_name(resolution.barangay_name.as_deref())
                .unwrap_or_else(|| "your barangay".to_string());
            Some(format!("({name} - based on your account scope)"))
        }
        LineItemScope::Barangay(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::parse_line_item_question;

    struct StaticDirectory(Vec<BarangayRef>);

    impl BarangayDirectory for StaticDirectory {
        fn find_by_normalized_name(&self, normalized_name: &str) -> Result<Vec<BarangayRef>> {
            Ok(self
                .0
                .iter()
                .filter(|b| normalize_barangay_name_for_match(&b.name) == normalized_name)
                .cloned()
                .collect())
        }

        fn known_names_normalized(&self) -> Result<HashSet<String>> {
            Ok(self
                .0
                .iter()
                .map(|b| normalize_barangay_name_for_match(&b.name))
                .collect())
        }
    }

    struct FailingDirectory;

    impl BarangayDirectory for FailingDirectory {
        fn find_by_normalized_name(&self, _: &str) -> Result<Vec<BarangayRef>> {
            anyhow::bail!("directory offline")
        }

        fn known_names_normalized(&self) -> Result<HashSet<String>> {
            anyhow::bail!("directory offline")
        }
    }

    fn brgy(id: &str, name: &str) -> BarangayRef {
        BarangayRef {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn explicit_mention_is_normalized_across_surface_forms() {
        let messages = [
            "What is the total investment program (Barangay Mamatid)?",
            "Total investment program of Barangay Mamatid for FY 2026",
            "Show the grand total for Brgy. Mamatid, please",
            "brgy Mamatid total investment",
        ];
        for message in messages {
            assert_eq!(
                detect_explicit_barangay_mention(message).as_deref(),
                Some("Mamatid"),
                "{message}"
            );
        }
    }

    #[test]
    fn multi_word_names_stop_at_stop_tokens() {
        assert_eq!(
            detect_explicit_barangay_mention("Barangay San Isidro Labrador fiscal year 2025")
                .as_deref(),
            Some("San Isidro Labrador")
        );
    }

    #[test]
    fn facility_titles_are_not_place_names() {
        assert_eq!(
            detect_explicit_barangay_mention(
                "How much is the Barangay Health Station renovation in FY 2026?"
            ),
            None
        );
        assert_eq!(
            detect_explicit_barangay_mention("Barangay Hall repainting in Barangay Pulo")
                .as_deref(),
            Some("Pulo")
        );
    }

    #[test]
    fn own_barangay_is_not_a_place_name() {
        assert_eq!(
            detect_explicit_barangay_mention("What is the total for our barangay in FY 2026?"),
            None
        );
        assert_eq!(detect_explicit_barangay_mention("budget of my brgy."), None);
    }

    #[test]
    fn rejected_capture_does_not_hide_later_mention() {
        assert_eq!(
            detect_explicit_barangay_mention("Compare our barangay in Barangay Pulo")
                .as_deref(),
            Some("Pulo")
        );
    }

    #[test]
    fn bare_mention_requires_known_name() {
        let known: HashSet<String> = ["mamatid".to_string(), "san isidro".to_string()]
            .into_iter()
            .collect();
        assert_eq!(
            detect_bare_barangay_scope_mention("Total investment program of Mamatid", &known)
                .as_deref(),
            Some("mamatid")
        );
        assert_eq!(
            detect_bare_barangay_scope_mention("budget for health for san isidro", &known)
                .as_deref(),
            Some("san isidro")
        );
        assert_eq!(
            detect_bare_barangay_scope_mention("Total for road repairs", &known),
            None
        );
        assert_eq!(
            detect_bare_barangay_scope_mention("Mamatid", &known).as_deref(),
            Some("mamatid")
        );
        assert_eq!(
            detect_bare_barangay_scope_mention("for mamatid", &HashSet::new()),
            None
        );
    }

    #[test]
    fn default_user_scope_when_no_cue() {
        let user = brgy("brgy-1", "Mamatid");
        let scope = resolve_totals_scope(
            "What is the total investment program for FY 2026?",
            Some(&user),
            None,
        );
        assert_eq!(
            scope,
            ScopeResolution {
                barangay_id: Some("brgy-1".to_string()),
                barangay_name: Some("Mamatid".to_string()),
                scope_reason: ScopeReason::DefaultUserBarangay,
            }
        );
    }

    #[test]
    fn our_barangay_cue_uses_user_scope() {
        let user = brgy("brgy-1", "Mamatid");
        let scope = resolve_totals_scope(
            "What is the total investment program in our barangay for FY 2026?",
            Some(&user),
            None,
        );
        assert_eq!(scope.scope_reason, ScopeReason::ExplicitOurBarangay);
        assert_eq!(scope.barangay_id.as_deref(), Some("brgy-1"));
    }

    #[test]
    fn our_barangay_cue_beats_named_barangay() {
        let user = brgy("brgy-1", "Mamatid");
        let named = brgy("brgy-2", "Poblacion");
        let scope = resolve_totals_scope(
            "Compare my barangay with Barangay Poblacion",
            Some(&user),
            Some(&named),
        );
        assert_eq!(scope.scope_reason, ScopeReason::ExplicitOurBarangay);
        assert_eq!(scope.barangay_id.as_deref(), Some("brgy-1"));
    }

    #[test]
    fn explicit_barangay_beats_default() {
        let user = brgy("brgy-1", "Mamatid");
        let named = brgy("brgy-2", "Poblacion");
        let scope = resolve_totals_scope(
            "What is the total investment program (Barangay Mamatid)?",
            Some(&user),
            Some(&named),
        );
        assert_eq!(scope.scope_reason, ScopeReason::ExplicitBarangay);
        assert_eq!(scope.barangay_id.as_deref(), Some("brgy-2"));
        assert_eq!(scope.barangay_name.as_deref(), Some("Poblacion"));
    }

    #[test]
    fn no_scope_is_unknown() {
        let scope = resolve_totals_scope("Total investment program in our barangay?", None, None);
        assert_eq!(scope, ScopeResolution::unknown());
    }

    #[test]
    fn directory_resolution_requires_single_match() {
        let directory = StaticDirectory(vec![
            brgy("brgy-1", "Mamatid"),
            brgy("brgy-2", "Pulo"),
            brgy("brgy-3", "Pulo"),
        ]);
        let found = resolve_explicit_barangay("Total for Brgy. Mamatid FY 2026", &directory)
            .unwrap();
        assert_eq!(found.map(|b| b.id), Some("brgy-1".to_string()));

        let ambiguous = resolve_explicit_barangay("Total for Barangay Pulo", &directory).unwrap();
        assert!(ambiguous.is_none());

        let bare = resolve_explicit_barangay("total investment of mamatid", &directory).unwrap();
        assert_eq!(bare.map(|b| b.id), Some("brgy-1".to_string()));
    }

    #[test]
    fn name_followed_by_title_words_resolves_by_prefix() {
        let directory = StaticDirectory(vec![
            brgy("brgy-1", "Mamatid"),
            brgy("brgy-4", "San Isidro"),
        ]);
        let found = resolve_explicit_barangay(
            "What is the Barangay Mamatid road concreting budget for FY 2026?",
            &directory,
        )
        .unwrap();
        assert_eq!(found.map(|b| b.id), Some("brgy-1".to_string()));

        let multi_word =
            resolve_explicit_barangay("Brgy. San Isidro feeding program budget", &directory)
                .unwrap();
        assert_eq!(multi_word.map(|b| b.id), Some("brgy-4".to_string()));

        let unknown =
            resolve_explicit_barangay("Barangay Atlantis road concreting budget", &directory)
                .unwrap();
        assert!(unknown.is_none());
    }

    #[test]
    fn directory_errors_propagate() {
        let err = resolve_explicit_barangay("Total for Barangay Pulo", &FailingDirectory)
            .unwrap_err();
        assert!(err.to_string().contains("directory offline"));
    }

    #[test]
    fn loose_scope_name_strips_kind_prefix() {
        assert_eq!(
            parse_loose_scope_name("What is the total in City Calamba for FY 2026?").as_deref(),
            Some("Calamba")
        );
        assert_eq!(
            parse_loose_scope_name("Magkano ang budget sa Mamatid?").as_deref(),
            Some("Mamatid")
        );
        assert_eq!(parse_loose_scope_name("Top projects"), None);
    }

    #[test]
    fn line_item_scope_honors_global_cue() {
        let question = parse_line_item_question("Road concreting budget across all barangays");
        let user = brgy("brgy-1", "Mamatid");
        let scope = resolve_line_item_scope(
            &question,
            "Road concreting budget across all barangays",
            Some(&user),
            None,
        );
        assert_eq!(scope, LineItemScope::Global);
        assert_eq!(
            build_scope_disclosure(&scope).as_deref(),
            Some("(Scope: all barangays)")
        );
    }

    #[test]
    fn disclosure_only_for_default_scope() {
        let user = brgy("brgy-1", "Mamatid");
        let default_scope = LineItemScope::Barangay(ScopeResolution::resolved(
            &user,
            ScopeReason::DefaultUserBarangay,
        ));
        let disclosure = build_scope_disclosure(&default_scope).unwrap();
        assert_eq!(disclosure, "(Barangay Mamatid - based on your account scope)");

        let explicit = LineItemScope::Barangay(ScopeResolution::resolved(
            &user,
            ScopeReason::ExplicitBarangay,
        ));
        assert!(build_scope_disclosure(&explicit).is_none());
    }
}
