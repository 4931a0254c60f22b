use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::aggregation::detect_aggregation_intent;
use crate::models::{DocLimitField, FactField, ParsedQuestion};
use crate::text::{compile, normalize_question, push_unique_term};

static REF_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(\d{4}(?:-[a-z0-9]{1,4}){1,3})\b"));
static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^(?:19|20)\d{2}-\d{2}-\d{2}$"));
static LABELED_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:fy|fiscal\s+year)\s*(20\d{2})\b"));
static BARE_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(20\d{2})\b"));
static TOKEN_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"[^a-z0-9]+"));

static GLOBAL_SCOPE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\ball\s+barangays\b",
        r"(?i)\bacross\s+all\s+barangays\b",
        r"(?i)\ball\s+published\s+aips\b",
        r"(?i)\bcity\s*[-\s]?wide\b",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

const FACT_CUES: &[(FactField, &[&str])] = &[
    (
        FactField::Total,
        &["how much", "amount", "allocat", "budget", "cost"],
    ),
    (
        FactField::Schedule,
        &[
            "schedule",
            "timeline",
            "start",
            "end date",
            "target completion",
            "when",
        ],
    ),
    (
        FactField::FundSource,
        &[
            "fund source",
            "funding source",
            "source of fund",
            "funded by",
        ],
    ),
    (
        FactField::ImplementingAgency,
        &[
            "implementing agency",
            "implementing office",
            "implemented by",
            "who will implement",
        ],
    ),
    (
        FactField::ExpectedOutput,
        &["expected output", "target output", "deliverable", "output"],
    ),
];

const DOC_LIMIT_CUES: &[(DocLimitField, &[&str])] = &[
    (DocLimitField::Contractor, &["contractor"]),
    (
        DocLimitField::Supplier,
        &["supplier", "winning bidder", "awarded to", "bidder"],
    ),
    (DocLimitField::ProcurementMode, &["procurement"]),
    (
        DocLimitField::ExactAddress,
        &["site address", "exact address", "exact location"],
    ),
    (
        DocLimitField::BeneficiaryCount,
        &["beneficiary count", "beneficiaries", "how many beneficiar"],
    ),
];

fn noise_terms() -> HashSet<&'static str> {
    [
        "what", "whats", "which", "where", "when", "how", "much", "many", "who", "will", "does",
        "did", "was", "were", "allocated", "allocation", "amount", "budget", "cost", "for", "the",
        "and", "from", "with", "this", "that", "there", "about", "tell", "please", "our", "my",
        "in", "on", "of", "to", "is", "are", "fy", "year", "fiscal", "program", "project",
        "total", "schedule", "timeline", "fund", "source", "agency", "implementing", "output",
        "expected", "barangay", "brgy", "all", "published", "aips", "ref", "code",
    ]
    .into_iter()
    .collect()
}

/// Extracts the requested fact fields, fiscal year and title tokens from a
/// line-item question. Unrecognized questions yield no fact fields.
pub fn parse_line_item_question(message: &str) -> ParsedQuestion {
    let normalized_question = normalize_question(message);
    let mentioned_ref_code = extract_aip_ref_code(message);
    let title_tokens = collect_title_tokens(&normalized_question);
    let title_phrase = detect_title_phrase(&title_tokens);

    ParsedQuestion {
        fact_fields: detect_fact_fields(&normalized_question),
        requested_fiscal_year: extract_fiscal_year(message),
        has_global_scope_cue: has_global_scope_cue(message),
        doc_limit_field: detect_doc_limit_field(&normalized_question),
        mentioned_ref_code,
        title_tokens,
        title_phrase,
        normalized_question,
    }
}

pub fn detect_fact_fields(normalized_question: &str) -> Vec<FactField> {
    FACT_CUES
        .iter()
        .filter(|(_, cues)| cues.iter().any(|cue| normalized_question.contains(cue)))
        .map(|(field, _)| *field)
        .collect()
}

pub fn detect_doc_limit_field(normalized_question: &str) -> Option<DocLimitField> {
    DOC_LIMIT_CUES
        .iter()
        .find(|(_, cues)| cues.iter().any(|cue| normalized_question.contains(cue)))
        .map(|(field, _)| *field)
}

pub fn has_global_scope_cue(message: &str) -> bool {
    GLOBAL_SCOPE_RES.iter().any(|re| re.is_match(message))
}

/// AIP reference codes look like `8000-003-002-006` or `1000-A-001`: a
/// four-digit head plus one to three hyphenated segments. Bare years and ISO
/// dates are not ref codes.
pub fn extract_aip_ref_code(message: &str) -> Option<String> {
    REF_CODE_RE
        .captures_iter(message)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|code| !ISO_DATE_RE.is_match(code))
        .map(str::to_ascii_uppercase)
}

/// The single most relevant fiscal year: an "FY 2026" / "fiscal year 2026"
/// mention wins over a bare year, and years inside ref codes are ignored.
pub fn extract_fiscal_year(message: &str) -> Option<i32> {
    if let Some(caps) = LABELED_YEAR_RE.captures(message) {
        return caps.get(1).and_then(|m| m.as_str().parse().ok());
    }

    let without_codes = REF_CODE_RE.replace_all(message, " ");
    BARE_YEAR_RE
        .captures(&without_codes)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn collect_title_tokens(normalized_question: &str) -> Vec<String> {
    let noise = noise_terms();
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();

    for token in TOKEN_SPLIT_RE.split(normalized_question) {
        if token.len() < 3 || noise.contains(token) {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        push_unique_term(&mut tokens, &mut seen, token);
    }

    tokens
}

fn detect_title_phrase(title_tokens: &[String]) -> Option<String> {
    if title_tokens.len() < 2 {
        return None;
    }
    let phrase = title_tokens.join(" ");
    if phrase.len() >= 6 {
        Some(phrase)
    } else {
        None
    }
}

/// A question about one specific line item rather than an aggregate.
pub fn is_line_item_specific_query(message: &str) -> bool {
    if detect_aggregation_intent(message).is_aggregate() {
        return false;
    }
    let parsed = parse_line_item_question(message);
    parsed.is_fact_question() || parsed.mentioned_ref_code.is_some()
}
