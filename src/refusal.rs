use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::DocLimitField;
use crate::text::compile;

const MAX_SUGGESTIONS: usize = 3;

static UNSUPPORTED_CUES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bwho stole\b",
        r"\bembezzl",
        r"\bcorrupt(?:ion)?\b",
        r"\bpredict\b",
        r"\bforecast\b",
        r"\bnext year\b.*\bbudget\b",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefusalIntent {
    LineItemFact,
    Aggregation,
    UnanswerableField,
    PipelineFallback,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingParam {
    FiscalYear,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefusalStatus {
    Refusal,
    Clarification,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    DocumentLimitation,
    MissingRequiredParameter,
    AmbiguousScope,
    UnsupportedRequest,
    RetrievalFailure,
}

impl RefusalReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RefusalReason::DocumentLimitation => "document_limitation",
            RefusalReason::MissingRequiredParameter => "missing_required_parameter",
            RefusalReason::AmbiguousScope => "ambiguous_scope",
            RefusalReason::UnsupportedRequest => "unsupported_request",
            RefusalReason::RetrievalFailure => "retrieval_failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefusalContext {
    pub intent: RefusalIntent,
    pub query_text: String,
    pub fiscal_year: Option<i32>,
    pub scope_label: Option<String>,
    pub explicit_scope_requested: bool,
    pub scope_resolved: bool,
    pub missing_param: Option<MissingParam>,
    pub doc_limit_field: Option<DocLimitField>,
}

impl RefusalContext {
    pub fn new(intent: RefusalIntent, query_text: impl Into<String>) -> Self {
        Self {
            intent,
            query_text: query_text.into(),
            fiscal_year: None,
            scope_label: None,
            explicit_scope_requested: false,
            scope_resolved: true,
            missing_param: None,
            doc_limit_field: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefusalMessage {
    pub status: RefusalStatus,
    pub reason: RefusalReason,
    pub message: String,
    pub suggestions: Vec<String>,
}

fn suggestion_list(suggestions: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    suggestions
        .iter()
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty() && seen.insert(*entry))
        .take(MAX_SUGGESTIONS)
        .map(str::to_string)
        .collect()
}

fn document_field_label(field: DocLimitField) -> &'static str {
    match field {
        DocLimitField::Contractor | DocLimitField::Supplier => {
            "contractors, suppliers, or winning bidders"
        }
        DocLimitField::ProcurementMode => "procurement mode",
        DocLimitField::ExactAddress => "the exact site address",
        DocLimitField::BeneficiaryCount => "beneficiary counts",
    }
}

pub(crate) fn has_unsupported_cue(query_text: &str) -> bool {
    let normalized = query_text.to_lowercase();
    UNSUPPORTED_CUES.iter().any(|re| re.is_match(&normalized))
}

const RETRIEVAL_SUGGESTIONS: &[&str] = &[
    "Try the exact project title as written in the AIP.",
    "Provide the Ref code (e.g., 8000-003-002-006).",
    "Remove extra filters (scope/year) to broaden search.",
];

/// Picks the user-facing message for a turn that cannot be answered. The
/// checks run from the most to the least specific cause.
pub fn build_refusal_message(ctx: &RefusalContext) -> RefusalMessage {
    if let Some(field) = ctx.doc_limit_field {
        return RefusalMessage {
            status: RefusalStatus::Refusal,
            reason: RefusalReason::DocumentLimitation,
            message: format!(
                "The published AIP does not list {}. I can answer amounts, fund sources, and schedules when they are present.",
                document_field_label(field)
            ),
            suggestions: suggestion_list(&[
                "Ask for the project's amount, fund source, or schedule.",
                "Provide a Ref code if available.",
                "Ask for top projects or totals by sector/fund source.",
            ]),
        };
    }

    if ctx.missing_param == Some(MissingParam::FiscalYear)
        && ctx.intent == RefusalIntent::Aggregation
    {
        return RefusalMessage {
            status: RefusalStatus::Clarification,
            reason: RefusalReason::MissingRequiredParameter,
            message: "Which fiscal year should I use (e.g., FY 2025 or FY 2026)?".to_string(),
            suggestions: suggestion_list(&["Reply with a fiscal year, such as FY 2026."]),
        };
    }

    if ctx.explicit_scope_requested && !ctx.scope_resolved {
        return RefusalMessage {
            status: RefusalStatus::Clarification,
            reason: RefusalReason::AmbiguousScope,
            message: "I couldn't match the requested barangay/city name. Please specify the exact name (e.g., 'Barangay Pulo') or choose 'across all barangays'.".to_string(),
            suggestions: suggestion_list(&[
                "Use the exact scope name, such as Barangay Pulo.",
                "Say 'across all barangays' to use global scope.",
            ]),
        };
    }

    if has_unsupported_cue(&ctx.query_text) {
        return RefusalMessage {
            status: RefusalStatus::Refusal,
            reason: RefusalReason::UnsupportedRequest,
            message: "I can only answer based on published AIP data. Please ask about totals, line-item amounts, fund sources, or schedules.".to_string(),
            suggestions: suggestion_list(&[
                "Ask for a project amount, fund source, or schedule.",
                "Ask for totals by sector, fund source, or top projects.",
            ]),
        };
    }

    let message = if ctx.intent == RefusalIntent::UnanswerableField {
        "I couldn't find a matching published AIP entry. Try using the exact project title or a Ref code.".to_string()
    } else {
        let scope_text = ctx
            .scope_label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(|label| format!(" for {label}"))
            .unwrap_or_default();
        let year_text = ctx
            .fiscal_year
            .map(|year| format!(" for FY {year}"))
            .unwrap_or_default();
        format!(
            "I couldn't find a matching published AIP entry{scope_text}{year_text}. Try using the exact project title or a Ref code."
        )
    };

    RefusalMessage {
        status: RefusalStatus::Refusal,
        reason: RefusalReason::RetrievalFailure,
        message,
        suggestions: suggestion_list(RETRIEVAL_SUGGESTIONS),
    }
}
