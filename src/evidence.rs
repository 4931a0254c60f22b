//! Quotable evidence for AIP totals pulled out of OCR'd page text.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::{compile, normalize_whitespace, truncate_chars};

const PASSAGE_MAX_CHARS: usize = 200;
const FALLBACK_MAX_CHARS: usize = 180;
const PAGE_EVIDENCE_MAX_CHARS: usize = 400;

static TIP_PHRASE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)total\s+investment\s+program"));
static INVESTMENT_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)investment"));
static PROGRAM_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)program"));
static GRAND_TOTAL_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)grand\s+total"));
static INVESTMENT_PROGRAM_GRAND_TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)investment\s+program\s+grand\s+total"));
static DIGIT_RUN_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\d[\d,]*(?:\.\d+)?"));
static MONEY_SHAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{1,2})?$"));
static SIGNATURE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?is)\b(?:prepared|approved|reviewed|noted)\s+by\b.*$"));

static INVESTMENT_CONTEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:investment|program|aip)\b"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Canonical {
    TotalInvestmentProgram,
    InvestmentProgramGrandTotal,
}

impl Canonical {
    fn phrase(self) -> &'static str {
        match self {
            Canonical::TotalInvestmentProgram => "TOTAL INVESTMENT PROGRAM",
            Canonical::InvestmentProgramGrandTotal => "INVESTMENT PROGRAM Grand Total",
        }
    }
}

/// Takes `text[start..]` up to `max_chars` characters, cut short at the first
/// of `stops`.
fn bounded_passage<'a>(text: &'a str, start: usize, max_chars: usize, stops: &[char]) -> &'a str {
    let tail = truncate_chars(&text[start..], max_chars);
    match tail.find(stops) {
        Some(end) => &tail[..end],
        None => tail,
    }
}

fn find_passage(raw: &str) -> Option<(&str, Canonical)> {
    if let Some(found) = TIP_PHRASE_RE.find(raw) {
        let passage = bounded_passage(raw, found.start(), PASSAGE_MAX_CHARS, &['|', '\n']);
        return Some((passage, Canonical::TotalInvestmentProgram));
    }

    if INVESTMENT_RE.is_match(raw) && PROGRAM_RE.is_match(raw) && GRAND_TOTAL_RE.is_match(raw) {
        if let Some(found) = INVESTMENT_RE.find(raw) {
            let passage = bounded_passage(raw, found.start(), PASSAGE_MAX_CHARS, &['\n']);
            return Some((passage, Canonical::InvestmentProgramGrandTotal));
        }
    }

    INVESTMENT_PROGRAM_GRAND_TOTAL_RE.find(raw).map(|found| {
        (
            bounded_passage(raw, found.start(), PASSAGE_MAX_CHARS, &['\n']),
            Canonical::InvestmentProgramGrandTotal,
        )
    })
}

/// Whole digit runs that read as amounts. A run is never split, so
/// "1,234,567.891" yields nothing rather than "1,234,567.89" and "1".
fn money_tokens(text: &str) -> impl Iterator<Item = &str> {
    DIGIT_RUN_RE
        .find_iter(text)
        .map(|run| run.as_str().trim_end_matches(','))
        .filter(|token| MONEY_SHAPE_RE.is_match(token))
}

fn strip_signature_block(text: &str) -> String {
    SIGNATURE_RE.replace(text, "").into_owned()
}

/// Recovers a short, clean excerpt for an AIP total from noisy table text.
///
/// The passage starting at the total's label is re-rendered as a canonical
/// phrase followed by the passage's last money-like token; OCR rows often
/// carry page or row numbers before the real total. Text without any total
/// label falls back to its first 180 characters.
pub fn format_totals_evidence(raw_text: &str) -> String {
    let Some((passage, canonical)) = find_passage(raw_text) else {
        let stripped = normalize_whitespace(&strip_signature_block(raw_text));
        return truncate_chars(&stripped, FALLBACK_MAX_CHARS).trim().to_string();
    };

    let passage = strip_signature_block(passage);
    match money_tokens(&passage).last() {
        Some(amount) => format!("{} {}", canonical.phrase(), amount),
        None => normalize_whitespace(&passage),
    }
}

/// The best "total investment program" figure found in a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AipTotal {
    pub source_label: String,
    pub fiscal_year: i32,
    pub barangay_name: Option<String>,
    pub value: f64,
    pub currency: String,
    /// 1-based page number.
    pub page_no: usize,
    pub evidence_text: String,
}

#[derive(Debug, Clone)]
struct TotalCandidate {
    keyword_rank: u8,
    confidence: u32,
    value: f64,
    page_no: usize,
    evidence_text: String,
}

impl TotalCandidate {
    /// Higher keyword rank, then confidence, then value, then earlier page.
    fn better_than(&self, other: &TotalCandidate) -> bool {
        let ordering = self
            .keyword_rank
            .cmp(&other.keyword_rank)
            .then(self.confidence.cmp(&other.confidence))
            .then(self.value.total_cmp(&other.value))
            .then(other.page_no.cmp(&self.page_no));
        ordering == Ordering::Greater
    }
}

fn keyword_rank(line_upper: &str, context: &str) -> Option<(u8, &'static str)> {
    if line_upper.contains("TOTAL INVESTMENT PROGRAM") {
        return Some((4, "TOTAL INVESTMENT PROGRAM"));
    }
    if line_upper.contains("TOTAL INVESTMENT") {
        return Some((3, "TOTAL INVESTMENT"));
    }
    if line_upper.contains("GRAND TOTAL") {
        return Some((2, "GRAND TOTAL"));
    }
    if line_upper.contains("TOTAL:") && INVESTMENT_CONTEXT_RE.is_match(context) {
        return Some((1, "TOTAL:"));
    }
    None
}

/// Right-most amount in the text; totals rows end with the figure.
fn parse_rightmost_amount(text: &str) -> Option<f64> {
    let cleaned = money_tokens(text).last()?.replace(',', "");
    cleaned.trim().parse::<f64>().ok()
}

fn build_candidate(
    line: &str,
    previous: &str,
    next: &str,
    page_no: usize,
) -> Option<TotalCandidate> {
    let parts: Vec<&str> = [previous, line, next]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect();
    let context = parts.join(" ");
    let (rank, keyword) = keyword_rank(&line.to_uppercase(), &context)?;

    let (value, amount_in_line) = match parse_rightmost_amount(line) {
        Some(value) => (value, true),
        None => (parse_rightmost_amount(&context)?, false),
    };

    let mut confidence = u32::from(rank) * 100;
    if amount_in_line {
        confidence += 20;
    }
    if keyword == "TOTAL INVESTMENT PROGRAM" {
        confidence += 15;
    }
    if INVESTMENT_CONTEXT_RE.is_match(&context) {
        confidence += 5;
    }

    Some(TotalCandidate {
        keyword_rank: rank,
        confidence,
        value,
        page_no,
        evidence_text: truncate_chars(&parts.join(" | "), PAGE_EVIDENCE_MAX_CHARS).to_string(),
    })
}

/// Scans page texts line by line for the document's total investment program
/// figure. Lines are ranked by their total keyword; an amount on the keyword
/// line itself beats one found only on a neighbouring line.
pub fn extract_totals_from_pages<S: AsRef<str>>(
    pages: &[S],
    fiscal_year: i32,
    barangay_name: Option<&str>,
) -> Option<AipTotal> {
    let mut best: Option<TotalCandidate> = None;

    for (page_idx, page) in pages.iter().enumerate() {
        let lines: Vec<String> = page
            .as_ref()
            .lines()
            .map(normalize_whitespace)
            .filter(|line| !line.is_empty())
            .collect();

        for (idx, line) in lines.iter().enumerate() {
            let previous = if idx > 0 { lines[idx - 1].as_str() } else { "" };
            let next = lines.get(idx + 1).map(String::as_str).unwrap_or("");
            let Some(candidate) = build_candidate(line, previous, next, page_idx + 1) else {
                continue;
            };
            let replace = match &best {
                Some(current) => candidate.better_than(current),
                None => true,
            };
            if replace {
                best = Some(candidate);
            }
        }
    }

    let best = best?;
    Some(AipTotal {
        source_label: "total_investment_program".to_string(),
        fiscal_year,
        barangay_name: barangay_name
            .map(normalize_whitespace)
            .filter(|name| !name.is_empty()),
        value: best.value,
        currency: "PHP".to_string(),
        page_no: best.page_no,
        evidence_text: best.evidence_text,
    })
}
