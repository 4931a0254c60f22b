use std::cmp::Ordering;

use crate::config::RankingConfig;
use crate::models::{CandidateRecord, ParsedQuestion, RankedCandidate};
use crate::text::{normalize_title, title_words};

/// Lowercase with everything but alphanumerics and hyphens removed.
pub fn normalize_ref_code(code: Option<&str>) -> Option<String> {
    let normalized: String = code?
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

fn base_similarity(candidate: &CandidateRecord) -> f64 {
    if candidate.similarity.is_finite() {
        candidate.similarity
    } else {
        0.0
    }
}

fn score_candidate(
    question: &ParsedQuestion,
    question_ref: Option<&str>,
    requested_fiscal_year: Option<i32>,
    candidate: &CandidateRecord,
    config: &RankingConfig,
) -> RankedCandidate {
    let words = title_words(&candidate.program_project_title);
    let token_overlap = question
        .title_tokens
        .iter()
        .filter(|token| words.contains(token.as_str()))
        .count();

    let year_match = match (requested_fiscal_year, candidate.fiscal_year) {
        (Some(requested), Some(year)) => requested == year,
        _ => false,
    };

    let ref_code_match = match (
        question_ref,
        normalize_ref_code(candidate.aip_ref_code.as_deref()),
    ) {
        (Some(wanted), Some(code)) => wanted == code,
        _ => false,
    };

    let title_phrase_match = question
        .title_phrase
        .as_deref()
        .map(|phrase| normalize_title(&candidate.program_project_title).contains(phrase))
        .unwrap_or(false);

    let mut rank_score = base_similarity(candidate);
    rank_score += (token_overlap as f64 * config.token_overlap_step).min(config.token_overlap_cap);
    if year_match {
        rank_score += config.fiscal_year_boost;
    }
    if ref_code_match {
        rank_score += config.ref_code_boost;
    }

    RankedCandidate {
        candidate: candidate.clone(),
        rank_score,
        token_overlap,
        year_match,
        ref_code_match,
        title_phrase_match,
    }
}

/// Reorders retrieved candidates by similarity plus fiscal-year, title-overlap
/// and ref-code boosts. Ties fall back to raw similarity, then to input order.
pub fn rerank_line_item_candidates(
    question: &ParsedQuestion,
    requested_fiscal_year: Option<i32>,
    candidates: &[CandidateRecord],
) -> Vec<RankedCandidate> {
    rerank_line_item_candidates_with_config(
        question,
        requested_fiscal_year,
        candidates,
        &RankingConfig::default(),
    )
}

pub fn rerank_line_item_candidates_with_config(
    question: &ParsedQuestion,
    requested_fiscal_year: Option<i32>,
    candidates: &[CandidateRecord],
    config: &RankingConfig,
) -> Vec<RankedCandidate> {
    let question_ref = normalize_ref_code(question.mentioned_ref_code.as_deref());

    let mut ranked: Vec<RankedCandidate> = candidates
        .iter()
        .map(|candidate| {
            score_candidate(
                question,
                question_ref.as_deref(),
                requested_fiscal_year,
                candidate,
                config,
            )
        })
        .collect();

    // sort_by is stable, so equal keys keep their retrieval order.
    ranked.sort_by(|a, b| compare_ranked(b, a));
    ranked
}

fn compare_ranked(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    a.rank_score.total_cmp(&b.rank_score).then_with(|| {
        base_similarity(&a.candidate).total_cmp(&base_similarity(&b.candidate))
    })
}
