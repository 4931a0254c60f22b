//! Deciding when two line items are too close to call, and handling the
//! follow-up reply once the user has been asked to pick one.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::answer::format_php_amount;
use crate::config::RankingConfig;
use crate::models::{LineItemRow, LineItemScope, ParsedQuestion, RankedCandidate};
use crate::question::extract_aip_ref_code;
use crate::scope::display_barangay_name;
use crate::text::{non_empty, normalize_question, normalize_title};

pub const CANCEL_REPLY_MESSAGE: &str =
    "Okay - please restate the project title or provide the Ref code.";

const CANCEL_PHRASES: &[&str] = &[
    "none of the above",
    "none of these",
    "none",
    "cancel",
    "never mind",
    "nevermind",
];

/// One selectable line item in a clarification prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClarificationOption {
    pub line_item_id: String,
    pub title: String,
    pub aip_ref_code: Option<String>,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarificationReply {
    /// Zero-based index into the pending options.
    Selected(usize),
    Cancelled,
    Unmatched,
}

/// True when the top two candidates are separated by less than the ambiguity
/// threshold. Fewer than two candidates never need clarification.
pub fn should_ask_line_item_clarification(ranked: &[RankedCandidate]) -> bool {
    should_ask_line_item_clarification_with_config(ranked, &RankingConfig::default())
}

pub fn should_ask_line_item_clarification_with_config(
    ranked: &[RankedCandidate],
    config: &RankingConfig,
) -> bool {
    let [top, second, ..] = ranked else {
        return false;
    };
    let gap = (top.rank_score - second.rank_score).abs();
    gap.is_finite() && gap < config.ambiguity_threshold
}

/// A signal in the question that pins the top candidate regardless of how
/// close the runner-up scored.
pub fn has_strong_disambiguator(question: &ParsedQuestion, top: &RankedCandidate) -> bool {
    if top.ref_code_match {
        return true;
    }
    if question.title_phrase.is_some() && top.title_phrase_match {
        return true;
    }

    let normalized_question = normalize_title(&question.normalized_question);
    let normalized_title = normalize_title(&top.candidate.program_project_title);
    !normalized_question.is_empty()
        && !normalized_title.is_empty()
        && normalized_question.contains(&normalized_title)
}

pub fn should_ask_line_item_clarification_for(
    question: &ParsedQuestion,
    ranked: &[RankedCandidate],
    config: &RankingConfig,
) -> bool {
    match ranked.first() {
        Some(top) if ranked.len() >= 2 => {
            !has_strong_disambiguator(question, top)
                && should_ask_line_item_clarification_with_config(ranked, config)
        }
        _ => false,
    }
}

fn scope_label(scope: &LineItemScope) -> String {
    match scope {
        LineItemScope::Global => "All barangays".to_string(),
        LineItemScope::Barangay(resolution) => {
            display_barangay_name(resolution.barangay_name.as_deref())
                .unwrap_or_else(|| "Barangay (unspecified)".to_string())
        }
    }
}

/// Distinct option labels for the ranked candidates, preferring the fetched
/// row's values over the candidate's and stopping at `max_options`.
pub fn build_clarification_options(
    ranked: &[RankedCandidate],
    rows_by_id: &HashMap<String, LineItemRow>,
    scope: &LineItemScope,
    max_options: usize,
) -> Vec<ClarificationOption> {
    let scope_label = scope_label(scope);
    let mut seen = HashSet::new();
    let mut options = Vec::new();

    for entry in ranked {
        if options.len() >= max_options {
            break;
        }
        let candidate = &entry.candidate;
        let row = rows_by_id.get(&candidate.line_item_id);

        let title = row
            .and_then(|r| non_empty(Some(r.program_project_title.as_str())))
            .or_else(|| non_empty(Some(candidate.program_project_title.as_str())));
        let Some(title) = title else {
            continue;
        };
        let ref_code = row
            .and_then(|r| non_empty(r.aip_ref_code.as_deref()))
            .or_else(|| non_empty(candidate.aip_ref_code.as_deref()));
        let total = format_php_amount(row.and_then(|r| r.total));
        let year = row
            .map(|r| r.fiscal_year.to_string())
            .or_else(|| candidate.fiscal_year.map(|y| y.to_string()))
            .unwrap_or_else(|| "Any".to_string());

        let ref_text = ref_code
            .map(|code| format!(" (Ref {code})"))
            .unwrap_or_default();
        let label = format!("{title}{ref_text} - Total: {total} - FY {year} - {scope_label}");

        if !seen.insert(label.clone()) {
            continue;
        }
        options.push(ClarificationOption {
            line_item_id: candidate.line_item_id.clone(),
            title: title.to_string(),
            aip_ref_code: ref_code.map(str::to_string),
            label,
        });
    }

    options
}

pub fn build_clarification_prompt(options: &[ClarificationOption]) -> String {
    let mut prompt =
        String::from("I found multiple line items that match. Which one did you mean?");
    for (idx, option) in options.iter().enumerate() {
        prompt.push_str(&format!("\n{}. {}", idx + 1, option.label));
    }
    prompt.push('\n');
    prompt.push_str(&clarification_reminder(options.len()));
    prompt
}

pub fn clarification_reminder(option_count: usize) -> String {
    format!("Please reply with 1-{}, or type the Ref code.", option_count.max(1))
}

/// Interprets a reply to a pending clarification: an option number, a ref
/// code or exact title naming exactly one option, or a cancel phrase.
pub fn resolve_clarification_reply(
    reply: &str,
    options: &[ClarificationOption],
) -> ClarificationReply {
    let normalized = normalize_question(reply);
    let trimmed = normalized.trim_end_matches(['.', '!', '?', ')']).trim();
    let trimmed = trimmed
        .strip_prefix("option ")
        .or_else(|| trimmed.strip_prefix('#'))
        .unwrap_or(trimmed)
        .trim();

    if let Ok(number) = trimmed.parse::<usize>() {
        if (1..=options.len()).contains(&number) {
            return ClarificationReply::Selected(number - 1);
        }
        return ClarificationReply::Unmatched;
    }

    if CANCEL_PHRASES.contains(&trimmed) {
        return ClarificationReply::Cancelled;
    }

    if let Some(code) = extract_aip_ref_code(reply) {
        let matches: Vec<usize> = options
            .iter()
            .enumerate()
            .filter(|(_, option)| {
                option
                    .aip_ref_code
                    .as_deref()
                    .map(|own| own.eq_ignore_ascii_case(&code))
                    .unwrap_or(false)
            })
            .map(|(idx, _)| idx)
            .collect();
        if let [only] = matches.as_slice() {
            return ClarificationReply::Selected(*only);
        }
        return ClarificationReply::Unmatched;
    }

    let reply_title = normalize_title(reply);
    if !reply_title.is_empty() {
        let matches: Vec<usize> = options
            .iter()
            .enumerate()
            .filter(|(_, option)| normalize_title(&option.title) == reply_title)
            .map(|(idx, _)| idx)
            .collect();
        if let [only] = matches.as_slice() {
            return ClarificationReply::Selected(*only);
        }
    }

    ClarificationReply::Unmatched
}
